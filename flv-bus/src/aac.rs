//! AAC sequence-header parsing and ADTS framing.
//!
//! FLV carries AAC as bare raw frames plus one AudioSpecificConfig
//! (ISO/IEC 14496-3) in a sequence-header tag. Players of elementary AAC
//! streams want ADTS instead, so every raw frame gets a synthesized 7-byte
//! ADTS header built from the stored config.

use bytes::Bytes;

use crate::error::{FlvError, Result};

pub const AAC_PACKET_SEQUENCE_HEADER: u8 = 0;
pub const AAC_PACKET_RAW: u8 = 1;

pub const ADTS_HEADER_LENGTH: usize = 7;
const ADTS_MAX_FRAME_LENGTH: usize = 0x1FFF;
const ADTS_BUFFER_FULLNESS_VBR: u16 = 0x7FF;

const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Per-track codec state taken from the AudioSpecificConfig.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AacConfig {
    /// audio-object-type minus one, as ADTS wants it
    pub profile: u8,
    pub sampling_frequency_index: u8,
    pub channel_configuration: u8,
}

impl AacConfig {
    /// Reads the leading bits of an AudioSpecificConfig:
    /// `audioObjectType(5) | samplingFrequencyIndex(4) | channelConfiguration(4)`.
    pub fn parse(config: &[u8]) -> Result<Self> {
        if config.len() < 2 {
            return Err(FlvError::format(format!(
                "AAC sequence header too short: {} bytes",
                config.len()
            )));
        }

        let bits = u16::from_be_bytes([config[0], config[1]]);
        let object_type = (bits >> 11) as u8;
        if object_type == 0 {
            return Err(FlvError::format("AAC audio object type 0 is invalid"));
        }

        Ok(Self {
            profile: object_type - 1,
            sampling_frequency_index: ((bits >> 7) & 0x0F) as u8,
            channel_configuration: ((bits >> 3) & 0x0F) as u8,
        })
    }

    /// Sample rate in Hz, if the index is one of the table entries.
    pub fn sample_rate(&self) -> Option<u32> {
        SAMPLING_FREQUENCIES
            .get(self.sampling_frequency_index as usize)
            .copied()
    }

    /// Builds the 7-byte ADTS header for a raw frame of `payload_len` bytes.
    ///
    /// ```text
    /// syncword(12) id(1) layer(2) protection_absent(1)
    /// profile(2) sf_index(4) private(1) channel_config(3)
    /// original(1) home(1) copyright_id(1) copyright_start(1)
    /// frame_length(13) buffer_fullness(11) raw_blocks(2)
    /// ```
    pub fn adts_header(&self, payload_len: usize) -> Result<[u8; ADTS_HEADER_LENGTH]> {
        let frame_length = payload_len + ADTS_HEADER_LENGTH;
        if frame_length > ADTS_MAX_FRAME_LENGTH {
            return Err(FlvError::format(format!(
                "AAC frame too large for ADTS: {} bytes",
                payload_len
            )));
        }
        let frame_length = frame_length as u16;
        let profile = self.profile & 0x03;
        let sf_index = self.sampling_frequency_index & 0x0F;
        let channels = self.channel_configuration & 0x07;

        Ok([
            0xFF,
            // syncword low nibble, MPEG-4, layer 0, no CRC
            0xF1,
            (profile << 6) | (sf_index << 2) | (channels >> 2),
            ((channels & 0x03) << 6) | ((frame_length >> 11) as u8 & 0x03),
            (frame_length >> 3) as u8,
            (((frame_length & 0x07) as u8) << 5) | ((ADTS_BUFFER_FULLNESS_VBR >> 6) as u8),
            (((ADTS_BUFFER_FULLNESS_VBR & 0x3F) as u8) << 2),
        ])
    }
}

/// What one AAC audio tag turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AacPacket {
    /// Sequence header; nothing to emit.
    Config(AacConfig),
    /// ADTS header and raw payload, to be delivered as two items in order.
    Frame { header: Bytes, payload: Bytes },
    /// Unknown packet type, dropped.
    Skip(u8),
}

/// AAC codec state for one audio track.
#[derive(Debug, Default)]
pub struct AacRepacker {
    config: Option<AacConfig>,
}

impl AacRepacker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<&AacConfig> {
        self.config.as_ref()
    }

    /// Handles the body of an AAC audio tag, past the audio header byte.
    /// `body[0]` is the AAC packet type.
    pub fn repack(&mut self, body: Bytes) -> Result<AacPacket> {
        if body.is_empty() {
            return Err(FlvError::format("AAC tag without packet type"));
        }
        let packet_type = body[0];
        let data = body.slice(1..);

        match packet_type {
            AAC_PACKET_SEQUENCE_HEADER => {
                let config = AacConfig::parse(&data)?;
                log::debug!(
                    "AAC config: profile {}, sampling index {} ({:?} Hz), channels {}",
                    config.profile,
                    config.sampling_frequency_index,
                    config.sample_rate(),
                    config.channel_configuration
                );
                self.config = Some(config);
                Ok(AacPacket::Config(config))
            }
            AAC_PACKET_RAW => {
                let config = self.config.as_ref().ok_or_else(|| {
                    FlvError::format("AAC raw frame before sequence header")
                })?;
                let header = config.adts_header(data.len())?;
                Ok(AacPacket::Frame {
                    header: Bytes::copy_from_slice(&header),
                    payload: data,
                })
            }
            other => {
                log::warn!("unknown AAC packet type {}, skipping", other);
                Ok(AacPacket::Skip(other))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reads `len` bits starting at bit `offset` (MSB first).
    fn bits(data: &[u8], offset: usize, len: usize) -> u32 {
        let mut value = 0u32;
        for i in offset..offset + len {
            let bit = (data[i / 8] >> (7 - i % 8)) & 1;
            value = (value << 1) | bit as u32;
        }
        value
    }

    #[test]
    fn test_parse_config() -> anyhow::Result<()> {
        // AAC LC (2), 44.1 kHz (4), stereo (2)
        let config = AacConfig::parse(&[0x12, 0x10])?;
        assert_eq!(config.profile, 1);
        assert_eq!(config.sampling_frequency_index, 4);
        assert_eq!(config.channel_configuration, 2);
        assert_eq!(config.sample_rate(), Some(44100));

        // object type 3, 16 kHz (8), mono (1)
        let config = AacConfig::parse(&[0x1C, 0x08, 0x56, 0xE5])?;
        assert_eq!(config.profile, 2);
        assert_eq!(config.sampling_frequency_index, 8);
        assert_eq!(config.channel_configuration, 1);
        Ok(())
    }

    #[test]
    fn test_parse_config_errors() {
        assert!(AacConfig::parse(&[0x12]).unwrap_err().is_format());
        assert!(AacConfig::parse(&[0x00, 0x10]).unwrap_err().is_format());
    }

    #[test]
    fn test_adts_header_layout() -> anyhow::Result<()> {
        let config = AacConfig {
            profile: 2,
            sampling_frequency_index: 4,
            channel_configuration: 1,
        };
        let payload_len = 300;
        let header = config.adts_header(payload_len)?;

        assert_eq!(bits(&header, 0, 12), 0xFFF);
        assert_eq!(bits(&header, 12, 1), 0);
        assert_eq!(bits(&header, 13, 2), 0);
        assert_eq!(bits(&header, 15, 1), 1);
        assert_eq!(bits(&header, 16, 2), 2);
        assert_eq!(bits(&header, 18, 4), 4);
        assert_eq!(bits(&header, 22, 1), 0);
        assert_eq!(bits(&header, 23, 3), 1);
        assert_eq!(bits(&header, 26, 4), 0);
        assert_eq!(bits(&header, 30, 13), payload_len as u32 + 7);
        assert_eq!(bits(&header, 43, 11), 0x7FF);
        assert_eq!(bits(&header, 54, 2), 0);
        Ok(())
    }

    #[test]
    fn test_adts_header_large_frame() -> anyhow::Result<()> {
        // frame length 0x1000 exercises the two high bits in byte 3
        let config = AacConfig {
            profile: 1,
            sampling_frequency_index: 3,
            channel_configuration: 6,
        };
        let header = config.adts_header(0x1000 - 7)?;
        assert_eq!(header[3] & 0x03, 0x02);
        assert_eq!(bits(&header, 30, 13), 0x1000);
        assert_eq!(bits(&header, 23, 3), 6);

        assert!(config.adts_header(0x1FFF - 6).unwrap_err().is_format());
        Ok(())
    }

    #[test]
    fn test_repack() -> anyhow::Result<()> {
        let mut repacker = AacRepacker::new();

        let err = repacker
            .repack(Bytes::from_static(&[AAC_PACKET_RAW, 0x21, 0x00]))
            .unwrap_err();
        assert!(err.to_string().contains("before sequence header"));

        let packet = repacker.repack(Bytes::from_static(&[AAC_PACKET_SEQUENCE_HEADER, 0x12, 0x10]))?;
        assert!(matches!(packet, AacPacket::Config(_)));
        assert_eq!(repacker.config().map(|c| c.profile), Some(1));

        let packet = repacker.repack(Bytes::from_static(&[AAC_PACKET_RAW, 0x21, 0x00, 0x49]))?;
        match packet {
            AacPacket::Frame { header, payload } => {
                assert_eq!(header.len(), ADTS_HEADER_LENGTH);
                assert_eq!(bits(&header, 30, 13), 3 + 7);
                assert_eq!(&payload[..], &[0x21, 0x00, 0x49]);
            }
            _ => panic!("Expected frame"),
        }

        assert_eq!(
            repacker.repack(Bytes::from_static(&[0x05, 0x00]))?,
            AacPacket::Skip(5)
        );
        assert!(repacker.repack(Bytes::new()).is_err());
        Ok(())
    }
}
