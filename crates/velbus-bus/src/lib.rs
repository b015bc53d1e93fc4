//! Bus multiplexer (serial + TCP fan-out, flow control) and the
//! request/response correlation primitive built on top of it.

pub mod error;
pub mod mux;
pub mod query;

pub use error::BusError;
pub use mux::{BusHandle, Listener, ListenerGuard};
pub use query::{query, CachedTimeout, DEFAULT_QUERY_TIMEOUT};
