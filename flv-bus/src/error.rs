use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlvError>;

#[derive(Debug, Error)]
pub enum FlvError {
    /// Malformed container data. Always fatal, decoding never resumes.
    #[error("format error: {0}")]
    Format(String),
    /// Raised by the byte source, including truncated input.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("demux aborted")]
    Aborted,
}

impl FlvError {
    pub fn format(msg: impl Into<String>) -> Self {
        FlvError::Format(msg.into())
    }

    pub fn is_format(&self) -> bool {
        matches!(self, FlvError::Format(_))
    }
}
