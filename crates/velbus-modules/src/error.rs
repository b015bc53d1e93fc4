use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module at address {address:#04x} has no registered handler")]
    Unknown { address: u8 },

    #[error("no handler method for {method} {path}")]
    NotFound { method: String, path: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("query to module timed out")]
    Timeout,

    #[error("cached query timeout from a prior attempt")]
    CachedTimeout { at: std::time::Instant },

    #[error("bus error: {0}")]
    Bus(#[from] velbus_bus::BusError),
}

impl ModuleError {
    pub fn http_status(&self) -> u16 {
        match self {
            ModuleError::Unknown { .. } => 404,
            ModuleError::NotFound { .. } => 404,
            ModuleError::BadRequest(_) => 400,
            ModuleError::Timeout | ModuleError::CachedTimeout { .. } => 504,
            ModuleError::Bus(e) => e.http_status(),
        }
    }
}
