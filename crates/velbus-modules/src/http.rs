//! The thin HTTP-dispatch contract `velbus-gatewayd`'s axum router
//! delegates into (§4.7, §6). This crate does not know about axum —
//! only about verbs, path segments, and JSON bodies.

use serde_json::Value;
use velbus_state::JsonPatch;

use crate::error::ModuleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    /// The `{name}_{METHOD}` suffix used to look up a handler method,
    /// e.g. `relay_GET`.
    pub fn suffix(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
    /// `Age` is the only header a `CachedTimeoutError` response needs
    /// (§6); modeled loosely rather than as a full header map.
    pub age_seconds: Option<u64>,
}

impl HttpResponse {
    pub fn ok(body: Value) -> Self {
        HttpResponse {
            status: 200,
            body,
            age_seconds: None,
        }
    }
}

pub type HttpResult = Result<HttpResponse, ModuleError>;

/// A real WebSocket/MQTT adapter implements this to observe state
/// mutations (§6). The gateway binary registers a `tracing`-based
/// stand-in and, in tests, an in-memory recorder.
pub trait StateSubscriber: Send + Sync {
    fn on_patch(&self, address: u8, patch: &JsonPatch);
}
