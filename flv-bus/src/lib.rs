//! Streaming FLV demuxer.
//!
//! Bytes go in through any [`tokio::io::AsyncRead`]; each audio and video
//! track comes out as its own [`TrackStream`], and script-data tags come out
//! as [`MetadataRecord`]s. Decoding only moves on once the consumer of a
//! track has pulled the previous payload.

pub mod aac;
pub mod amf;
pub mod config;
pub mod demuxer;
pub mod dispatch;
pub mod error;
pub mod header;
pub mod input;
pub mod parser;
pub mod sink;
pub mod tag;

pub use config::DemuxConfig;
pub use demuxer::{DemuxHandle, Demuxer, demux};
pub use dispatch::{DemuxEvent, MetadataRecord};
pub use error::{FlvError, Result};
pub use input::RawInput;
pub use sink::{TrackAnnounce, TrackId, TrackKind, TrackStream};
