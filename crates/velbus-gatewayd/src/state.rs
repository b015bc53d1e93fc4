//! Shared application state threaded through the axum router — the
//! `Daemon` value §9's "Global state" design note calls for in place of
//! true process globals.

use std::sync::Arc;

use velbus_bus::BusHandle;
use velbus_modules::ModuleRegistry;

use crate::ws::WsHub;

#[derive(Clone)]
pub struct Daemon {
    pub registry: Arc<ModuleRegistry>,
    pub bus: BusHandle,
    pub ws_hub: Arc<WsHub>,
}
