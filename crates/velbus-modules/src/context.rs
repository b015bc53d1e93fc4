use std::time::Duration;

use velbus_bus::BusHandle;

/// Bundles what a handler needs to issue a query or command frame
/// without owning the bus itself — mirrors the `bus` parameter threaded
/// through the original's HTTP handler methods (§4.7).
#[derive(Clone)]
pub struct ModuleContext {
    pub bus: BusHandle,
    pub address: u8,
    pub query_timeout: Duration,
}

pub fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Channel c's pushbutton press/release edge is reported in bit
/// `(8 - c)` counting from the LSB of the 8-bit bitmap (wiring quirk
/// carried over from the original source); `bits` is MSB-first so the
/// LSB lives at index 7.
pub fn pushbutton_bit(bits: &[bool], channel: u8) -> bool {
    let idx = 8usize.saturating_sub(channel as usize);
    bits.get(idx).copied().unwrap_or(false)
}
