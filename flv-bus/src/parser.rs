//! Incremental FLV container state machine.
//!
//! The parser never reads on its own. The caller asks [`TagParser::need`] how
//! many bytes the next field takes, obtains exactly that many from wherever
//! the input lives, and hands them to [`TagParser::feed`]:
//!
//! ```text
//! Signature(3) -> Version(1) -> Flags(1) -> DataOffset(4) -> [padding]
//!   -> loop { PreviousTagSize(4) -> TagType(1) -> BodyLength(3)
//!             -> Timestamp(4) -> StreamId(3) -> Body(BodyLength) }
//! ```
//!
//! A format error moves the parser into a failed state it never leaves.
//! Header padding is skipped in pieces of at most [`MAX_SKIP_CHUNK`] bytes.

use bytes::{Buf, Bytes};
use log::{debug, warn};

use crate::{
    error::{FlvError, Result},
    header::{FLV_HEADER_LENGTH, FLV_SIGNATURE, FLV_VERSION, FlvHeader},
    tag::{Tag, TagHeader, TagType},
};

/// Largest single request made while skipping header padding.
pub const MAX_SKIP_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Signature,
    Version,
    Flags,
    DataOffset,
    HeaderPadding(usize),
    PreviousTagSize,
    TagType,
    BodyLength,
    Timestamp,
    StreamId,
    Body(usize),
    Failed,
}

#[derive(Debug, Clone)]
pub enum ParseEvent {
    Header(FlvHeader),
    Tag(Tag),
}

#[derive(Debug)]
pub struct TagParser {
    state: State,
    version: u8,
    flags: u8,
    current: TagHeader,
}

impl TagParser {
    pub fn new() -> Self {
        Self {
            state: State::Signature,
            version: 0,
            flags: 0,
            current: TagHeader {
                tag_type: 0,
                body_length: 0,
                timestamp: 0,
                stream_id: 0,
            },
        }
    }

    /// Number of bytes the next call to [`feed`](Self::feed) expects.
    /// Never zero unless the parser has failed.
    pub fn need(&self) -> usize {
        match self.state {
            State::Signature => 3,
            State::Version | State::Flags | State::TagType => 1,
            State::DataOffset | State::PreviousTagSize | State::Timestamp => 4,
            State::BodyLength | State::StreamId => 3,
            State::HeaderPadding(n) => n.min(MAX_SKIP_CHUNK),
            State::Body(n) => n,
            State::Failed => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state == State::Failed
    }

    /// True before the header and between tags, where running out of input
    /// is a clean end rather than truncation.
    pub fn can_end(&self) -> bool {
        matches!(
            self.state,
            State::Signature | State::PreviousTagSize | State::TagType
        )
    }

    pub fn feed(&mut self, buf: Bytes) -> Result<Option<ParseEvent>> {
        if self.state == State::Failed {
            return Err(FlvError::format("decoder already failed"));
        }
        let need = self.need();
        if buf.len() != need {
            self.state = State::Failed;
            return Err(FlvError::format(format!(
                "expected {} bytes, got {}",
                need,
                buf.len()
            )));
        }

        let result = self.step(buf);
        if result.is_err() {
            self.state = State::Failed;
        }
        result
    }

    fn step(&mut self, mut buf: Bytes) -> Result<Option<ParseEvent>> {
        match self.state {
            State::Signature => {
                debug!("signature: {:?}", String::from_utf8_lossy(&buf));
                if &buf[..] != FLV_SIGNATURE {
                    return Err(FlvError::format(format!(
                        "invalid FLV signature: {:?}",
                        String::from_utf8_lossy(&buf)
                    )));
                }
                self.state = State::Version;
            }
            State::Version => {
                let version = buf.get_u8();
                debug!("version: {}", version);
                if version != FLV_VERSION {
                    return Err(FlvError::format(format!(
                        "expected flv version 1, got: {}",
                        version
                    )));
                }
                self.version = version;
                self.state = State::Flags;
            }
            State::Flags => {
                self.flags = buf.get_u8();
                debug!("flags: {:#04X}", self.flags);
                self.state = State::DataOffset;
            }
            State::DataOffset => {
                let data_offset = buf.get_u32();
                debug!("data offset: {}", data_offset);
                let header = FlvHeader {
                    version: self.version,
                    flags: self.flags,
                    data_offset,
                };

                let offset = data_offset as usize;
                self.state = if offset > FLV_HEADER_LENGTH {
                    State::HeaderPadding(offset - FLV_HEADER_LENGTH)
                } else {
                    if offset < FLV_HEADER_LENGTH {
                        warn!("data offset {} is smaller than the header", data_offset);
                    }
                    State::PreviousTagSize
                };
                return Ok(Some(ParseEvent::Header(header)));
            }
            State::HeaderPadding(n) => {
                let remaining = n - buf.len();
                debug!("skipped {} bytes of header padding, {} left", buf.len(), remaining);
                self.state = if remaining == 0 {
                    State::PreviousTagSize
                } else {
                    State::HeaderPadding(remaining)
                };
            }
            State::PreviousTagSize => {
                debug!("previous tag size: {}", buf.get_u32());
                self.state = State::TagType;
            }
            State::TagType => {
                self.current.tag_type = buf.get_u8();
                debug!("tag type: {:#04X}", self.current.tag_type);
                self.state = State::BodyLength;
            }
            State::BodyLength => {
                self.current.body_length = buf.get_uint(3) as u32;
                debug!("tag body length: {}", self.current.body_length);
                self.state = State::Timestamp;
            }
            State::Timestamp => {
                self.current.timestamp = buf.get_u32();
                debug!("tag timestamp: {}", self.current.timestamp);
                self.state = State::StreamId;
            }
            State::StreamId => {
                self.current.stream_id = buf.get_uint(3) as u32;
                debug!("tag stream id: {}", self.current.stream_id);
                let len = self.current.body_length as usize;
                // the tag type is checked with the body, so an empty tag of
                // unknown type is skipped like any other empty tag
                self.state = if len == 0 {
                    debug!("empty tag body, skipping to the next tag");
                    State::PreviousTagSize
                } else {
                    State::Body(len)
                };
            }
            State::Body(_) => {
                debug!("tag body: {} bytes", buf.len());
                let tag_type = TagType::try_from(self.current.tag_type)?;
                self.state = State::PreviousTagSize;
                return Ok(Some(ParseEvent::Tag(Tag {
                    tag_type,
                    timestamp: self.current.timestamp,
                    stream_id: self.current.stream_id,
                    body: buf,
                })));
            }
            State::Failed => unreachable!("checked in feed"),
        }
        Ok(None)
    }
}

impl Default for TagParser {
    fn default() -> Self {
        Self::new()
    }
}
