//! Routes parsed tags to their tracks.

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    aac::{AacPacket, AacRepacker},
    amf::{AmfDecoder, AmfValue},
    error::{FlvError, Result},
    header::FlvHeader,
    sink::{TrackAnnounce, TrackId, TrackRegistry, TrackStream},
    tag::{AudioTagHeader, Tag, TagType},
};

/// One decoded script-data tag, e.g. `onMetaData` or `onCuePoint`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRecord {
    pub name: String,
    pub value: AmfValue,
    /// Timestamp of the carrying tag, in milliseconds.
    pub timestamp: u32,
    pub stream_id: u32,
}

/// Everything the demuxer reports besides track payloads.
#[derive(Debug)]
pub enum DemuxEvent {
    /// The container header. Always the first event of a valid input.
    Header(FlvHeader),
    /// A track was seen for the first time. Sent before its first payload.
    Track(TrackAnnounce),
    Metadata(MetadataRecord),
    /// Decoding stopped on malformed input. Always the last event.
    FormatError(String),
}

pub type DemuxEventSender = mpsc::UnboundedSender<DemuxEvent>;
pub type DemuxEventReceiver = mpsc::UnboundedReceiver<DemuxEvent>;

pub struct Dispatcher {
    registry: TrackRegistry,
    aac: HashMap<TrackId, AacRepacker>,
    events: DemuxEventSender,
    amf: Arc<dyn AmfDecoder>,
    cancel: CancellationToken,
}

fn announce(
    events: &DemuxEventSender,
    id: TrackId,
    audio: Option<AudioTagHeader>,
    stream: TrackStream,
) {
    match &audio {
        Some(header) => log::info!(
            "announcing track {}: sound format {}, {} Hz, {} bit, {}",
            id,
            header.sound_format,
            header.sample_rate_hz(),
            header.bits_per_sample(),
            if header.is_stereo() { "stereo" } else { "mono" }
        ),
        None => log::info!("announcing track {}", id),
    }
    let event = DemuxEvent::Track(TrackAnnounce { id, audio, stream });
    if events.send(event).is_err() {
        // the stream is dropped with the event, so the track detaches
        log::debug!("no event receiver for track {}", id);
    }
}

impl Dispatcher {
    pub fn new(
        events: DemuxEventSender,
        amf: Arc<dyn AmfDecoder>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry: TrackRegistry::new(),
            aac: HashMap::new(),
            events,
            amf,
            cancel,
        }
    }

    /// Routes one tag, returning once every payload it produced has been
    /// pulled by its consumer.
    pub async fn dispatch(&mut self, tag: Tag) -> Result<()> {
        log::debug!(
            "dispatching {:?} tag, stream {}, timestamp {}, {} bytes",
            tag.tag_type,
            tag.stream_id,
            tag.timestamp,
            tag.body.len()
        );
        match tag.tag_type {
            TagType::Audio => self.dispatch_audio(tag.stream_id, tag.body).await,
            TagType::Video => self.dispatch_video(tag.stream_id, tag.body).await,
            TagType::Metadata => self.dispatch_metadata(&tag),
        }
    }

    async fn dispatch_audio(&mut self, stream_id: u32, body: Bytes) -> Result<()> {
        if body.is_empty() {
            return Err(FlvError::format("audio tag without sound header"));
        }
        let header = AudioTagHeader::from_byte(body[0]);
        let data = body.slice(1..);
        let id = TrackId::audio(stream_id);

        let (sink, created) = self.registry.get_or_create(id);
        if let Some(stream) = created {
            announce(&self.events, id, Some(header), stream);
        }

        if !header.is_aac() {
            return sink.enqueue(data, &self.cancel).await;
        }

        let repacker = self.aac.entry(id).or_default();
        match repacker.repack(data)? {
            AacPacket::Frame { header, payload } => {
                sink.enqueue(header, &self.cancel).await?;
                sink.enqueue(payload, &self.cancel).await
            }
            AacPacket::Config(_) | AacPacket::Skip(_) => Ok(()),
        }
    }

    async fn dispatch_video(&mut self, stream_id: u32, body: Bytes) -> Result<()> {
        let id = TrackId::video(stream_id);
        let (sink, created) = self.registry.get_or_create(id);
        if let Some(stream) = created {
            announce(&self.events, id, None, stream);
        }
        sink.enqueue(body, &self.cancel).await
    }

    fn dispatch_metadata(&mut self, tag: &Tag) -> Result<()> {
        let body = &tag.body[..];
        let mut cursor = 0;
        let name = match self.amf.decode(body, &mut cursor)? {
            AmfValue::String(name) => name,
            other => {
                return Err(FlvError::format(format!(
                    "metadata name is not a string: {:?}",
                    other
                )));
            }
        };
        let value = self.amf.decode(body, &mut cursor)?;
        if cursor < body.len() {
            log::debug!("{} trailing bytes after metadata {}", body.len() - cursor, name);
        }

        log::info!("metadata {}", name);
        let _ = self.events.send(DemuxEvent::Metadata(MetadataRecord {
            name,
            value,
            timestamp: tag.timestamp,
            stream_id: tag.stream_id,
        }));
        Ok(())
    }

    /// Hands the parsed container header to the caller.
    pub fn header(&self, header: FlvHeader) {
        let _ = self.events.send(DemuxEvent::Header(header));
    }

    /// Reports a fatal format error to the caller.
    pub fn report(&self, err: &FlvError) {
        if let FlvError::Format(message) = err {
            let _ = self.events.send(DemuxEvent::FormatError(message.clone()));
        }
    }

    /// Tracks seen so far, in creation order.
    pub fn tracks(&self) -> &[TrackId] {
        self.registry.ids()
    }

    /// Ends every track's stream.
    pub fn finish(&mut self) {
        log::debug!("ending {} tracks", self.registry.len());
        self.registry.end_all();
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::{
        amf::Amf0Decoder,
        tag::{SOUND_FORMAT_AAC, SOUND_FORMAT_MP3},
    };

    fn dispatcher() -> (Dispatcher, DemuxEventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(tx, Arc::new(Amf0Decoder), CancellationToken::new());
        (dispatcher, rx)
    }

    fn tag(tag_type: TagType, stream_id: u32, body: &[u8]) -> Tag {
        Tag {
            tag_type,
            timestamp: 0,
            stream_id,
            body: Bytes::copy_from_slice(body),
        }
    }

    #[tokio::test]
    async fn test_audio_announced_before_payload() -> anyhow::Result<()> {
        let (mut dispatcher, mut events) = dispatcher();
        let task = tokio::spawn(async move {
            dispatcher
                .dispatch(tag(TagType::Audio, 3, &[SOUND_FORMAT_MP3 << 4 | 0x0F, 0xAB, 0xCD]))
                .await?;
            dispatcher.finish();
            Ok::<_, FlvError>(())
        });

        let Some(DemuxEvent::Track(announce)) = events.recv().await else {
            panic!("Expected track announce");
        };
        assert_eq!(announce.id, TrackId::audio(3));
        let audio = announce.audio.expect("audio header");
        assert!(audio.is_mp3());
        assert_eq!(audio.sound_rate, 3);

        let mut stream = announce.stream;
        assert_eq!(stream.next().await, Some(Bytes::from_static(&[0xAB, 0xCD])));
        assert_eq!(stream.next().await, None);
        task.await??;
        Ok(())
    }

    #[tokio::test]
    async fn test_aac_sequence_header_emits_nothing() -> anyhow::Result<()> {
        let (mut dispatcher, mut events) = dispatcher();
        let aac = SOUND_FORMAT_AAC << 4 | 0x0F;
        dispatcher.dispatch(tag(TagType::Audio, 0, &[aac, 0x00, 0x12, 0x10])).await?;
        dispatcher.finish();

        let Some(DemuxEvent::Track(announce)) = events.recv().await else {
            panic!("Expected track announce");
        };
        assert!(announce.audio.is_some_and(|a| a.is_aac()));
        let items: Vec<_> = announce.stream.collect().await;
        assert!(items.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_metadata_record() -> anyhow::Result<()> {
        let (mut dispatcher, mut events) = dispatcher();
        let body: &[u8] = &[
            0x02, 0x00, 0x0A, b'o', b'n', b'M', b'e', b't', b'a', b'D', b'a', b't', b'a', // name
            0x00, 0x40, 0x24, 0, 0, 0, 0, 0, 0, // 10.0
        ];
        let mut cue = tag(TagType::Metadata, 2, body);
        cue.timestamp = 1500;
        dispatcher.dispatch(cue).await?;

        let Some(DemuxEvent::Metadata(record)) = events.recv().await else {
            panic!("Expected metadata");
        };
        assert_eq!(record.name, "onMetaData");
        assert_eq!(record.value, AmfValue::Number(10.0));
        assert_eq!(record.timestamp, 1500);
        assert_eq!(record.stream_id, 2);
        assert!(dispatcher.tracks().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_metadata_name_must_be_string() {
        let (mut dispatcher, _events) = dispatcher();
        let body: &[u8] = &[0x00, 0x40, 0x24, 0, 0, 0, 0, 0, 0];
        let err = dispatcher
            .dispatch(tag(TagType::Metadata, 0, body))
            .await
            .unwrap_err();
        assert!(err.is_format());
    }

    #[tokio::test]
    async fn test_empty_audio_body() {
        let (mut dispatcher, _events) = dispatcher();
        let err = dispatcher
            .dispatch(tag(TagType::Audio, 0, &[]))
            .await
            .unwrap_err();
        assert!(err.is_format());
        assert!(dispatcher.tracks().is_empty());
    }
}
