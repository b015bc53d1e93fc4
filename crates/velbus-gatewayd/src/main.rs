//! velbus-gatewayd — the Velbus field-bus gateway daemon.
//!
//! Reads config from the environment:
//!   VELBUS_SERIAL_PORT      — serial device path (required)
//!   VELBUS_BAUD             — baud rate (default: 38400)
//!   VELBUS_TCP_PORT         — raw-frame TCP fan-out port (default: 8445)
//!   VELBUS_BIND_ADDR        — HTTP/WebSocket listen address (default: 0.0.0.0:8080)
//!   VELBUS_QUERY_TIMEOUT_MS — default query timeout in ms (default: 2000)

mod config;
mod router;
mod state;
mod ws;

use std::sync::Arc;

use tokio::net::TcpListener;

use velbus_bus::BusHandle;
use velbus_modules::ModuleRegistry;
use velbus_proto::frame::VelbusFrame;
use velbus_proto::message::{InterfaceStatusRequest, Message};

use crate::config::GatewayConfig;
use crate::state::Daemon;
use crate::ws::WsHub;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,velbus_gatewayd=debug".into()),
        )
        .init();

    let config = GatewayConfig::from_env();
    tracing::info!(
        serial_port = %config.serial_port,
        baud = config.serial_baud,
        tcp_port = config.tcp_port,
        "starting velbus-gatewayd"
    );

    let bus = BusHandle::new();

    let registry = Arc::new(ModuleRegistry::new(bus.clone(), config.query_timeout));
    let ws_hub = Arc::new(WsHub::new());
    registry.add_subscriber(ws_hub.clone()).await;

    // Feed every frame observed on the bus into the module registry.
    // `observe` is async (it locks the slot map); the listener callback
    // itself must stay synchronous, so it just spawns the work.
    let registry_for_listener = registry.clone();
    let _observe_guard = bus
        .subscribe(Box::new(move |frame: &VelbusFrame| {
            let registry = registry_for_listener.clone();
            let frame = frame.clone();
            tokio::spawn(async move {
                registry.observe(&frame).await;
            });
        }))
        .await;

    // Best-effort startup probe. A dead or misconfigured serial link
    // shouldn't keep the HTTP/TCP surfaces from coming up — the daemon
    // serves cached-timeout errors until the bus responds.
    if let Err(e) = bus.broadcast(Message::InterfaceStatusRequest(InterfaceStatusRequest)).await {
        tracing::warn!(error = %e, "startup InterfaceStatusRequest probe failed");
    }

    let serial_bus = bus.clone();
    let serial_port = config.serial_port.clone();
    let serial_baud = config.serial_baud;
    tokio::spawn(async move {
        if let Err(e) = serial_bus.run_serial(&serial_port, serial_baud).await {
            tracing::error!(error = %e, "serial link terminated, exiting");
            std::process::exit(1);
        }
    });

    let tcp_bus = bus.clone();
    let tcp_bind_addr = config.tcp_bind_addr();
    tokio::spawn(async move {
        if let Err(e) = tcp_bus.run_tcp_server(&tcp_bind_addr).await {
            tracing::error!(error = %e, "raw-frame tcp fan-out terminated");
        }
    });

    let daemon = Daemon { registry, bus, ws_hub };
    let app = router::build_router(daemon);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", config.bind_addr));
    tracing::info!(addr = %config.bind_addr, "http/websocket control plane listening");

    axum::serve(listener, app).await.expect("http server error");
}
