use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame decode error: {0}")]
    Decode(#[from] velbus_proto::DecodeError),

    #[error("query timed out waiting for a matching reply")]
    Timeout,

    #[error("query timed out at {at:?} (cached)")]
    CachedTimeout { at: std::time::Instant },

    #[error("bus interface reported BusOff; the process is terminating")]
    BusOff,
}

impl BusError {
    /// Mirrors `SemOsError::http_status` for the thin HTTP contract
    /// surface in `velbus-gatewayd`.
    pub fn http_status(&self) -> u16 {
        match self {
            BusError::Timeout | BusError::CachedTimeout { .. } => 504,
            BusError::BusOff => 503,
            BusError::Decode(_) => 502,
            BusError::Io(_) => 500,
        }
    }
}
