use bytes::Bytes;

use crate::error::FlvError;

pub const TAG_AUDIO: u8 = 0x08;
pub const TAG_VIDEO: u8 = 0x09;
pub const TAG_METADATA: u8 = 0x12;

/// SoundFormat values that matter to the demuxer.
pub const SOUND_FORMAT_MP3: u8 = 2;
pub const SOUND_FORMAT_AAC: u8 = 10;
pub const SOUND_FORMAT_MP3_8K: u8 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagType {
    Audio,
    Video,
    Metadata,
}

impl TryFrom<u8> for TagType {
    type Error = FlvError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            TAG_AUDIO => Ok(TagType::Audio),
            TAG_VIDEO => Ok(TagType::Video),
            TAG_METADATA => Ok(TagType::Metadata),
            other => Err(FlvError::format(format!("unknown tag type: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TagHeader {
    pub tag_type: u8,
    pub body_length: u32,
    pub timestamp: u32,
    pub stream_id: u32,
}

/// One parsed tag. Lives only until the dispatcher has routed its body.
#[derive(Debug, Clone)]
pub struct Tag {
    pub tag_type: TagType,
    pub timestamp: u32,
    pub stream_id: u32,
    pub body: Bytes,
}

/// First byte of an audio tag body:
/// `format(4) | rate(2) | size(1) | type(1)`, MSB first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTagHeader {
    pub sound_format: u8,
    pub sound_rate: u8,
    pub sound_size: u8,
    pub sound_type: u8,
}

impl AudioTagHeader {
    pub fn from_byte(b: u8) -> Self {
        Self {
            sound_format: (b & 0xF0) >> 4,
            sound_rate: (b & 0x0C) >> 2,
            sound_size: (b & 0x02) >> 1,
            sound_type: b & 0x01,
        }
    }

    pub fn is_aac(&self) -> bool {
        self.sound_format == SOUND_FORMAT_AAC
    }

    pub fn is_mp3(&self) -> bool {
        self.sound_format == SOUND_FORMAT_MP3 || self.sound_format == SOUND_FORMAT_MP3_8K
    }

    /// Nominal rate from the tag header. AAC always signals 44 kHz here, the
    /// real rate comes from the AudioSpecificConfig.
    pub fn sample_rate_hz(&self) -> u32 {
        match self.sound_rate {
            0 => 5512,
            1 => 11025,
            2 => 22050,
            _ => 44100,
        }
    }

    pub fn bits_per_sample(&self) -> u8 {
        if self.sound_size == 0 { 8 } else { 16 }
    }

    pub fn is_stereo(&self) -> bool {
        self.sound_type == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_type() {
        assert_eq!(TagType::try_from(0x08).unwrap(), TagType::Audio);
        assert_eq!(TagType::try_from(0x09).unwrap(), TagType::Video);
        assert_eq!(TagType::try_from(0x12).unwrap(), TagType::Metadata);

        let err = TagType::try_from(0x07).unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("unknown tag type: 7"));
    }

    #[test]
    fn test_audio_tag_header() {
        // AAC, 44 kHz, 16-bit, stereo
        let header = AudioTagHeader::from_byte(0xAF);
        assert_eq!(header.sound_format, 10);
        assert_eq!(header.sound_rate, 3);
        assert_eq!(header.sound_size, 1);
        assert_eq!(header.sound_type, 1);
        assert!(header.is_aac());
        assert_eq!(header.sample_rate_hz(), 44100);
        assert_eq!(header.bits_per_sample(), 16);
        assert!(header.is_stereo());

        // MP3, 22 kHz, 8-bit, mono
        let header = AudioTagHeader::from_byte(0x28);
        assert!(header.is_mp3());
        assert_eq!(header.sample_rate_hz(), 22050);
        assert_eq!(header.bits_per_sample(), 8);
        assert!(!header.is_stereo());
    }
}
