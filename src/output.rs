use std::path::{Path, PathBuf};

use anyhow::Context;
use flv_bus::{TrackId, TrackKind, TrackStream, tag::AudioTagHeader};
use futures::StreamExt;
use tokio::io::{AsyncWriteExt, BufWriter};

/// `audio-<id>.aac`, `audio-<id>.mp3`, `audio-<id>.raw` or `video-<id>.raw`.
pub fn track_file_name(id: TrackId, audio: Option<&AudioTagHeader>) -> String {
    let ext = match (id.kind, audio) {
        (TrackKind::Audio, Some(header)) if header.is_aac() => "aac",
        (TrackKind::Audio, Some(header)) if header.is_mp3() => "mp3",
        _ => "raw",
    };
    format!("{}.{}", id, ext)
}

/// Copies every payload of `stream` into `path`, returning the path and the
/// number of bytes written once the track has ended.
pub async fn write_track(mut stream: TrackStream, path: PathBuf) -> anyhow::Result<(PathBuf, u64)> {
    let file = tokio::fs::File::create(&path)
        .await
        .with_context(|| format!("create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    let mut written = 0u64;
    while let Some(payload) = stream.next().await {
        writer.write_all(&payload).await?;
        written += payload.len() as u64;
    }
    writer.flush().await?;

    log::debug!("track {} done, {} bytes", stream.id(), written);
    Ok((path, written))
}

pub fn output_path(dir: &Path, id: TrackId, audio: Option<&AudioTagHeader>) -> PathBuf {
    dir.join(track_file_name(id, audio))
}
