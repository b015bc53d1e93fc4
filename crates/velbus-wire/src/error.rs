use thiserror::Error;

/// Failure of a single field codec. Callers of a message's `from_bytes`
/// treat any of these as "this candidate doesn't match" and move on to
/// the next one in the opcode's trial-parse list.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("not enough bits remaining: needed {needed}, had {had}")]
    Truncated { needed: u32, had: u32 },

    #[error("value {value} out of range for {bits}-bit unsigned field")]
    OutOfRange { value: u64, bits: u8 },

    #[error("unrecognized enum value {value:#x}")]
    UnknownEnumValue { value: u64 },

    #[error("index field does not have exactly one bit set: {bits:#x}")]
    NotExactlyOneBitSet { bits: u64 },

    #[error("unrecognized blind-number byte {byte:#04x}")]
    InvalidBlindNumber { byte: u8 },

    #[error("schema is not a whole number of bytes ({bits} bits)")]
    SchemaNotByteAligned { bits: u32 },

    #[error("{count} trailing bits left unconsumed after decode")]
    TrailingBits { count: u32 },

    #[error("bytes are not valid UTF-8")]
    InvalidUtf8,
}

pub type Result<T> = std::result::Result<T, Error>;
