use std::io;

use tokio::{io::AsyncRead, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    config::DemuxConfig,
    dispatch::{DemuxEvent, DemuxEventReceiver, DemuxEventSender, Dispatcher},
    error::{FlvError, Result},
    input::ByteSource,
    parser::{ParseEvent, TagParser},
};

/// Drives the tag parser over a byte source and hands every tag to the
/// dispatcher. One demuxer decodes one container.
#[derive(Debug, Default, Clone)]
pub struct Demuxer {
    config: DemuxConfig,
}

impl Demuxer {
    pub fn new(config: DemuxConfig) -> Self {
        Self { config }
    }

    /// Decodes `reader` on the current task until the input ends, a fatal
    /// error occurs or `cancel` fires. Every track is ended before this
    /// returns, whatever the outcome.
    pub async fn run<R>(
        &self,
        reader: R,
        events: DemuxEventSender,
        cancel: CancellationToken,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut source = ByteSource::new(reader, self.config.read_chunk_size);
        let mut parser = TagParser::new();
        let mut dispatcher =
            Dispatcher::new(events, self.config.amf_decoder.clone(), cancel.clone());

        let result = Self::decode(&mut parser, &mut source, &mut dispatcher, &cancel).await;
        match &result {
            Ok(()) => log::info!(
                "end of input, {} tracks: {:?}",
                dispatcher.tracks().len(),
                dispatcher.tracks()
            ),
            Err(FlvError::Aborted) => log::warn!("demux aborted"),
            Err(e) => {
                log::error!("demux failed: {}", e);
                dispatcher.report(e);
            }
        }
        dispatcher.finish();
        result
    }

    async fn decode<R>(
        parser: &mut TagParser,
        source: &mut ByteSource<R>,
        dispatcher: &mut Dispatcher,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let need = parser.need();
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(FlvError::Aborted),
                read = source.read_exact(need) => read?,
            };

            let Some(chunk) = chunk else {
                if parser.can_end() {
                    return Ok(());
                }
                return Err(FlvError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("input ended while {} bytes were expected", need),
                )));
            };

            match parser.feed(chunk)? {
                Some(ParseEvent::Header(header)) => {
                    log::info!(
                        "FLV v{}, audio: {}, video: {}",
                        header.version(),
                        header.has_audio(),
                        header.has_video()
                    );
                    dispatcher.header(header);
                }
                Some(ParseEvent::Tag(tag)) => dispatcher.dispatch(tag).await?,
                None => {}
            }
        }
    }

    /// Starts decoding `reader` on a new task.
    pub fn spawn<R>(self, reader: R) -> DemuxHandle
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let cancel_clone = cancel.clone();
        let task = tokio::spawn(async move { self.run(reader, tx, cancel_clone).await });

        DemuxHandle {
            events: rx,
            cancel,
            task,
        }
    }
}

/// Decodes `reader` with the default configuration.
pub fn demux<R>(reader: R) -> DemuxHandle
where
    R: AsyncRead + Unpin + Send + 'static,
{
    Demuxer::default().spawn(reader)
}

/// Caller side of a spawned demux task.
pub struct DemuxHandle {
    events: DemuxEventReceiver,
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl DemuxHandle {
    /// Next event, or `None` once the task has finished and every event
    /// was taken.
    pub async fn next_event(&mut self) -> Option<DemuxEvent> {
        self.events.recv().await
    }

    /// Stops decoding. A pending payload stops waiting for its consumer and
    /// every track is ended.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the task and returns its outcome.
    pub async fn wait(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(FlvError::Aborted),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

#[cfg(test)]
#[path = "demuxer_test.rs"]
mod demuxer_test;
