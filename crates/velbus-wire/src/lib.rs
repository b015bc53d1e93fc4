//! Primitive fixed-bit-width field kinds and the bit-packing engine they
//! sit on. This crate has no notion of frames or messages — it only
//! knows how to turn a stream of typed fields into bytes and back.

pub mod bitio;
pub mod error;
pub mod fields;

pub use bitio::{BitReader, BitWriter};
pub use error::{Error, Result};
pub use fields::BlindTimeout;
