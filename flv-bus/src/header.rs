pub const FLV_SIGNATURE: &[u8; 3] = b"FLV";
pub const FLV_VERSION: u8 = 1;
pub const FLV_HEADER_LENGTH: usize = 9;

const FLAG_AUDIO: u8 = 0x04;
const FLAG_VIDEO: u8 = 0x01;

/// The 9-byte container header. Signature and version are validated while
/// parsing, so only the variable fields are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlvHeader {
    pub(crate) version: u8,
    pub(crate) flags: u8,
    pub(crate) data_offset: u32,
}

impl FlvHeader {
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn data_offset(&self) -> u32 {
        self.data_offset
    }

    pub fn has_audio(&self) -> bool {
        (self.flags & FLAG_AUDIO) != 0
    }

    pub fn has_video(&self) -> bool {
        (self.flags & FLAG_VIDEO) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let header = FlvHeader {
            version: 1,
            flags: 0x05,
            data_offset: 9,
        };
        assert!(header.has_audio());
        assert!(header.has_video());

        let header = FlvHeader {
            flags: 0x04,
            ..header
        };
        assert!(header.has_audio());
        assert!(!header.has_video());
    }
}
