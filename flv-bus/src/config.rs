use std::sync::Arc;

use crate::amf::{Amf0Decoder, AmfDecoder};

pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Settings for one demux run.
#[derive(Clone)]
pub struct DemuxConfig {
    pub read_chunk_size: usize,
    pub amf_decoder: Arc<dyn AmfDecoder>,
}

impl DemuxConfig {
    pub fn builder() -> DemuxConfigBuilder {
        DemuxConfigBuilder::default()
    }
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for DemuxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemuxConfig")
            .field("read_chunk_size", &self.read_chunk_size)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct DemuxConfigBuilder {
    read_chunk_size: Option<usize>,
    amf_decoder: Option<Arc<dyn AmfDecoder>>,
}

impl DemuxConfigBuilder {
    /// Bytes requested from the reader per read call. Zero is raised to one.
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = Some(size.max(1));
        self
    }

    /// Replace the AMF0 decoder used for metadata tags
    pub fn amf_decoder(mut self, decoder: impl AmfDecoder + 'static) -> Self {
        self.amf_decoder = Some(Arc::new(decoder));
        self
    }

    pub fn build(self) -> DemuxConfig {
        let amf_decoder: Arc<dyn AmfDecoder> = match self.amf_decoder {
            Some(decoder) => decoder,
            None => Arc::new(Amf0Decoder),
        };
        DemuxConfig {
            read_chunk_size: self.read_chunk_size.unwrap_or(DEFAULT_READ_CHUNK_SIZE),
            amf_decoder,
        }
    }
}
