use thiserror::Error;

/// Decode failures at the frame/message layer. `Incomplete` is not an
/// error to the multiplexer — it means "wait for more bytes" — but is
/// still modeled here since several callers want to match on it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not enough bytes buffered to decode a frame")]
    Incomplete,

    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    #[error("checksum mismatch: got {got:#04x}, expected {expected:#04x}")]
    ChecksumMismatch { got: u8, expected: u8 },

    #[error("field codec error: {0}")]
    Field(#[from] velbus_wire::Error),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
