//! Environment-sourced configuration (§6 "Environment/CLI"). A real CLI
//! argument parser is an out-of-scope collaborator per the core design;
//! this binary reads the same knobs from the environment instead so it
//! stays runnable without one.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub serial_port: String,
    pub serial_baud: u32,
    pub tcp_port: u16,
    pub bind_addr: String,
    pub query_timeout: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let serial_port =
            std::env::var("VELBUS_SERIAL_PORT").expect("VELBUS_SERIAL_PORT must be set");
        let serial_baud = std::env::var("VELBUS_BAUD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(38_400);
        let tcp_port = std::env::var("VELBUS_TCP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8445);
        let bind_addr =
            std::env::var("VELBUS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
        let query_timeout_ms = std::env::var("VELBUS_QUERY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2_000);

        GatewayConfig {
            serial_port,
            serial_baud,
            tcp_port,
            bind_addr,
            query_timeout: Duration::from_millis(query_timeout_ms),
        }
    }

    pub fn tcp_bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.tcp_port)
    }
}
