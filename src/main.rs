use anyhow::Context;
use clap::Parser;
use flv_bus::{DemuxEvent, Demuxer};

mod config;
mod output;

use config::Args;

fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .filter_module("flv_bus", level)
        .filter_module("flv_demux", level)
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.log_level);

    if let Err(e) = run(args).await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("create {}", args.output_dir.display()))?;

    let demuxer = Demuxer::new(args.demux_config());
    let mut handle = if args.is_stdin() {
        log::info!("reading FLV from stdin");
        demuxer.spawn(tokio::io::stdin())
    } else {
        let file = tokio::fs::File::open(&args.input)
            .await
            .with_context(|| format!("open {}", args.input))?;
        log::info!("reading FLV from {}", args.input);
        demuxer.spawn(file)
    };

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, stopping");
            cancel.cancel();
        }
    });

    let mut writers = Vec::new();
    while let Some(event) = handle.next_event().await {
        match event {
            DemuxEvent::Header(header) => {
                log::debug!(
                    "header flags {:#04x}, data offset {}",
                    header.flags(),
                    header.data_offset()
                );
            }
            DemuxEvent::Track(announce) => {
                let path = output::output_path(&args.output_dir, announce.id, announce.audio.as_ref());
                log::info!("track {} -> {}", announce.id, path.display());
                writers.push(tokio::spawn(output::write_track(announce.stream, path)));
            }
            DemuxEvent::Metadata(record) => {
                if !args.quiet {
                    println!("{}", serde_json::to_string(&record)?);
                }
            }
            DemuxEvent::FormatError(message) => {
                log::error!("invalid FLV input: {}", message);
            }
        }
    }

    let result = handle.wait().await;
    for writer in writers {
        let (path, written) = writer.await??;
        log::info!("wrote {} bytes to {}", written, path.display());
    }
    result.context("demux failed")
}
