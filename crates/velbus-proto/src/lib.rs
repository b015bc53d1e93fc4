//! Frame envelope, message schemas, and module-info schemas for the
//! Velbus wire protocol. Builds on `velbus_wire`'s bit-packing engine.

pub mod error;
pub mod frame;
pub mod message;
pub mod moduleinfo;

pub use error::{DecodeError, Result};
pub use frame::VelbusFrame;
pub use message::Message;
pub use moduleinfo::ModuleInfo;
