use std::path::PathBuf;

use clap::Parser;
use flv_bus::{DemuxConfig, config::DEFAULT_READ_CHUNK_SIZE};

/// Splits an FLV container into one file per audio and video track.
///
/// AAC tracks are written as ADTS, MP3 tracks as plain MP3 frames, anything
/// else as the raw tag payloads. Metadata tags are printed as JSON lines.
#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// FLV file to read, `-` for stdin
    #[arg(default_value = "-")]
    pub input: String,

    /// Directory the track files are written to
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Bytes requested from the input per read
    #[arg(short, long, default_value_t = DEFAULT_READ_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Do not print metadata records
    #[arg(short, long)]
    pub quiet: bool,

    /// Log level: off, error, warn, info, debug or trace
    #[arg(short, long, default_value = "info")]
    pub log_level: log::LevelFilter,
}

impl Args {
    pub fn is_stdin(&self) -> bool {
        self.input == "-"
    }

    pub fn demux_config(&self) -> DemuxConfig {
        DemuxConfig::builder()
            .read_chunk_size(self.chunk_size)
            .build()
    }
}
