//! `/module_state` WebSocket mirror (§6). A thin adapter: the client
//! sends a JSON-Patch-op array (`{"op":"add"|"replace"|"remove","path":
//! "/1f","value":true}`) to subscribe/unsubscribe per address, the
//! server streams back JSON-Patch operations for every subscribed
//! address plus the initial snapshot on subscribe. Kept separate from
//! `ModuleRegistry` itself — the registry only knows it has *some*
//! `StateSubscriber`s.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use velbus_modules::StateSubscriber;
use velbus_state::JsonPatch;

use crate::state::Daemon;

struct WsClient {
    subscriptions: HashSet<u8>,
    tx: mpsc::UnboundedSender<Value>,
}

/// Registered WebSocket clients and their per-address subscriptions.
#[derive(Default)]
pub struct WsHub {
    clients: Mutex<HashMap<u64, WsClient>>,
    next_id: AtomicU64,
}

impl WsHub {
    pub fn new() -> Self {
        WsHub {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn register(&self, tx: mpsc::UnboundedSender<Value>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().unwrap().insert(
            id,
            WsClient {
                subscriptions: HashSet::new(),
                tx,
            },
        );
        id
    }

    fn deregister(&self, id: u64) {
        self.clients.lock().unwrap().remove(&id);
    }

    fn set_subscription(&self, id: u64, address: u8, subscribed: bool) {
        if let Some(client) = self.clients.lock().unwrap().get_mut(&id) {
            if subscribed {
                client.subscriptions.insert(address);
            } else {
                client.subscriptions.remove(&address);
            }
        }
    }

    fn send_to(&self, id: u64, value: Value) {
        if let Some(client) = self.clients.lock().unwrap().get(&id) {
            let _ = client.tx.send(value);
        }
    }

    /// `DELETE /module`: every client is told the whole tree was reset.
    pub fn broadcast_flush(&self) {
        for client in self.clients.lock().unwrap().values() {
            let _ = client.tx.send(json!({"op": "replace", "path": "/", "value": {}}));
        }
    }

    /// `DELETE /module/<hh>`: only clients subscribed to that address hear about it.
    pub fn notify_evicted(&self, address: u8) {
        let key = format!("{address:02x}");
        for client in self.clients.lock().unwrap().values() {
            if client.subscriptions.contains(&address) {
                let _ = client.tx.send(json!({"op": "remove", "path": format!("/{key}")}));
            }
        }
    }
}

impl StateSubscriber for WsHub {
    fn on_patch(&self, address: u8, patch: &JsonPatch) {
        if patch.is_empty() {
            return;
        }
        let key = format!("{address:02x}");
        for client in self.clients.lock().unwrap().values() {
            if !client.subscriptions.contains(&address) {
                continue;
            }
            for op in patch {
                let _ = client.tx.send(op.prefixed(&[key.clone()]).to_wire_json());
            }
        }
    }
}

/// Parses one `{"op","path","value"}` entry of a client's subscription
/// request into `(address, hex-path-without-slash, subscribe)`. `path`
/// must be exactly `/xx` (two hex digits). `add`/`replace` require a
/// boolean `value`; `remove` must carry no `value` at all.
fn parse_patch_op(op: &Value) -> Result<(u8, String, bool), &'static str> {
    let obj = op.as_object().ok_or("op is not an object")?;
    let path = obj.get("path").and_then(Value::as_str).ok_or("missing path")?;
    let addr_hex = path.strip_prefix('/').ok_or("path must start with /")?;
    if addr_hex.len() != 2 || !addr_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err("path must be /xx (two hex digits)");
    }
    let address = u8::from_str_radix(addr_hex, 16).map_err(|_| "path is not a valid hex address")?;

    match obj.get("op").and_then(Value::as_str) {
        Some("add") | Some("replace") => {
            let value = obj.get("value").ok_or("missing value")?;
            let subscribe = value.as_bool().ok_or("value must be a boolean")?;
            Ok((address, addr_hex.to_string(), subscribe))
        }
        Some("remove") => {
            if obj.contains_key("value") {
                return Err("remove must not carry a value");
            }
            Ok((address, addr_hex.to_string(), false))
        }
        _ => Err("unsupported op"),
    }
}

pub async fn module_state_ws(ws: WebSocketUpgrade, State(daemon): State<Daemon>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, daemon))
}

async fn handle_socket(socket: WebSocket, daemon: Daemon) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let id = daemon.ws_hub.register(tx);

    let writer = tokio::spawn(async move {
        while let Some(value) = rx.recv().await {
            if sink.send(WsMessage::Text(value.to_string())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let WsMessage::Text(text) = msg else { continue };
        let Ok(Value::Array(ops)) = serde_json::from_str::<Value>(&text) else {
            warn!(client_id = id, "malformed /module_state client message, ignoring");
            continue;
        };
        for op in ops {
            match parse_patch_op(&op) {
                Ok((address, addr_hex, subscribe)) => {
                    daemon.ws_hub.set_subscription(id, address, subscribe);
                    if subscribe {
                        let value = daemon.registry.module_state(address).await.unwrap_or(Value::Null);
                        daemon.ws_hub.send_to(
                            id,
                            json!({"op": "add", "path": format!("/{addr_hex}"), "value": value}),
                        );
                    } else {
                        daemon
                            .ws_hub
                            .send_to(id, json!({"op": "remove", "path": format!("/{addr_hex}")}));
                    }
                }
                Err(reason) => {
                    warn!(client_id = id, reason, "malformed /module_state patch op, ignoring");
                }
            }
        }
    }

    daemon.ws_hub.deregister(id);
    writer.abort();
    debug!(client_id = id, "module_state client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_with_true_subscribes_and_replace_with_false_unsubscribes() {
        assert_eq!(
            parse_patch_op(&json!({"op": "add", "path": "/1f", "value": true})).unwrap(),
            (0x1f, "1f".to_string(), true)
        );
        assert_eq!(
            parse_patch_op(&json!({"op": "replace", "path": "/05", "value": false})).unwrap(),
            (0x05, "05".to_string(), false)
        );
    }

    #[test]
    fn remove_unsubscribes_and_rejects_a_value() {
        assert_eq!(
            parse_patch_op(&json!({"op": "remove", "path": "/1f"})).unwrap(),
            (0x1f, "1f".to_string(), false)
        );
        assert!(parse_patch_op(&json!({"op": "remove", "path": "/1f", "value": true})).is_err());
    }

    #[test]
    fn rejects_malformed_paths_and_ops() {
        assert!(parse_patch_op(&json!({"op": "add", "path": "1f", "value": true})).is_err());
        assert!(parse_patch_op(&json!({"op": "add", "path": "/1", "value": true})).is_err());
        assert!(parse_patch_op(&json!({"op": "add", "path": "/zz", "value": true})).is_err());
        assert!(parse_patch_op(&json!({"op": "add", "path": "/1f", "value": "yes"})).is_err());
        assert!(parse_patch_op(&json!({"op": "frobnicate", "path": "/1f"})).is_err());
        assert!(parse_patch_op(&json!("not an object")).is_err());
    }
}
