//! Track registry and the per-track output streams.
//!
//! Every track owns a capacity-1 channel. Each enqueued item carries a
//! oneshot acknowledgment which the consumer fires the moment it pulls the
//! item, and [`TrackSink::enqueue`] does not return before that happens. The
//! decoder therefore never has more than one unacknowledged item per track and
//! advances at the pace of the slowest consumer.

use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{FlvError, Result},
    tag::AudioTagHeader,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl Display for TrackKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId {
    pub kind: TrackKind,
    pub stream_id: u32,
}

impl TrackId {
    pub fn audio(stream_id: u32) -> Self {
        Self {
            kind: TrackKind::Audio,
            stream_id,
        }
    }

    pub fn video(stream_id: u32) -> Self {
        Self {
            kind: TrackKind::Video,
            stream_id,
        }
    }
}

impl Display for TrackId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.kind, self.stream_id)
    }
}

pub enum TrackCmd {
    Data { payload: Bytes, ack: oneshot::Sender<()> },
    EOF,
}

/// Consumer side of one track. Yields payloads in tag order and ends once
/// the demuxer has finished with the track.
pub struct TrackStream {
    id: TrackId,
    inner: mpsc::Receiver<TrackCmd>,
    ended: bool,
}

impl TrackStream {
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Items sitting in the channel, not yet pulled. Never more than one.
    pub fn queued(&self) -> usize {
        self.inner.len()
    }
}

impl Stream for TrackStream {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.ended {
            return Poll::Ready(None);
        }
        match this.inner.poll_recv(cx) {
            Poll::Ready(Some(TrackCmd::Data { payload, ack })) => {
                let _ = ack.send(());
                Poll::Ready(Some(payload))
            }
            Poll::Ready(Some(TrackCmd::EOF)) | Poll::Ready(None) => {
                this.ended = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Producer side of one track.
pub struct TrackSink {
    id: TrackId,
    tx: Option<mpsc::Sender<TrackCmd>>,
}

impl TrackSink {
    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }

    /// Queues `payload` and waits until the consumer has pulled it.
    ///
    /// A consumer that dropped its stream detaches the track: the payload is
    /// discarded and later calls return immediately.
    pub async fn enqueue(&mut self, payload: Bytes, cancel: &CancellationToken) -> Result<()> {
        let Some(tx) = self.tx.as_ref() else {
            log::debug!("track {} detached, dropping {} bytes", self.id, payload.len());
            return Ok(());
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        let cmd = TrackCmd::Data {
            payload,
            ack: ack_tx,
        };

        let delivered = tokio::select! {
            _ = cancel.cancelled() => return Err(FlvError::Aborted),
            sent = tx.send(cmd) => match sent {
                Ok(()) => tokio::select! {
                    _ = cancel.cancelled() => return Err(FlvError::Aborted),
                    ack = ack_rx => ack.is_ok(),
                },
                Err(_) => false,
            },
        };

        if !delivered {
            log::info!("track {} consumer went away, detaching", self.id);
            self.tx = None;
        }
        Ok(())
    }

    /// Sends the end marker and closes the channel.
    pub fn end(&mut self) {
        if let Some(tx) = self.tx.take() {
            // The last payload was acknowledged, so the slot is free. If an
            // abort left it occupied, dropping the sender still ends the stream.
            let _ = tx.try_send(TrackCmd::EOF);
            log::debug!("track {} ended", self.id);
        }
    }
}

impl Drop for TrackSink {
    fn drop(&mut self) {
        self.end();
    }
}

/// Creates the two halves of a track.
pub fn track_channel(id: TrackId) -> (TrackSink, TrackStream) {
    let (tx, rx) = mpsc::channel(1);
    (
        TrackSink { id, tx: Some(tx) },
        TrackStream {
            id,
            inner: rx,
            ended: false,
        },
    )
}

/// Handed to the caller the first time a track is seen.
pub struct TrackAnnounce {
    pub id: TrackId,
    /// Audio header of the first tag, for audio tracks.
    pub audio: Option<AudioTagHeader>,
    pub stream: TrackStream,
}

impl std::fmt::Debug for TrackAnnounce {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackAnnounce")
            .field("id", &self.id)
            .field("audio", &self.audio)
            .finish()
    }
}

/// Maps track ids to their sinks, creating them on first sight.
pub struct TrackRegistry {
    tracks: HashMap<TrackId, TrackSink>,
    order: Vec<TrackId>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self {
            tracks: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Returns the sink for `id`, plus the consumer stream when the track
    /// was created by this call.
    pub fn get_or_create(&mut self, id: TrackId) -> (&mut TrackSink, Option<TrackStream>) {
        let mut created = None;
        let sink = self.tracks.entry(id).or_insert_with(|| {
            log::info!("creating track {}", id);
            let (sink, stream) = track_channel(id);
            created = Some(stream);
            sink
        });
        if created.is_some() {
            self.order.push(id);
        }
        (sink, created)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Track ids in creation order.
    pub fn ids(&self) -> &[TrackId] {
        &self.order
    }

    /// Ends every track, in creation order.
    pub fn end_all(&mut self) {
        for id in &self.order {
            if let Some(sink) = self.tracks.get_mut(id) {
                sink.end();
            }
        }
    }
}

impl Default for TrackRegistry {
    fn default() -> Self {
        Self::new()
    }
}
