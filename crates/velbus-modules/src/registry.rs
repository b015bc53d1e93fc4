//! Per-address module resolution and HTTP fan-out (§4.6). Resolving a
//! fresh address sends `ModuleTypeRequest`, waits for `ModuleType`, and
//! constructs the matching `ModuleHandler`; concurrent resolutions for
//! the same address share one in-flight future instead of each sending
//! their own request. A resolution that times out is remembered for a
//! short TTL so a flood of requests to a dead address doesn't each pay
//! the full query timeout (§4.6 step 5, §7).

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::Shared;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::Mutex;

use velbus_bus::{query, BusHandle, CachedTimeout};
use velbus_proto::frame::VelbusFrame;
use velbus_proto::message::{Message, ModuleTypeRequest};

use crate::context::ModuleContext;
use crate::error::ModuleError;
use crate::handler::ModuleHandler;
use crate::http::{HttpMethod, HttpResult, StateSubscriber};

const CACHED_TIMEOUT_TTL: Duration = Duration::from_secs(30);

type ResolveFuture = Shared<Pin<Box<dyn std::future::Future<Output = ()> + Send>>>;

enum Slot {
    Resolved(Arc<Mutex<ModuleHandler>>),
    TimedOut(CachedTimeout),
    InFlight(ResolveFuture),
}

type SlotMap = Arc<Mutex<HashMap<u8, Slot>>>;

pub struct ModuleRegistry {
    bus: BusHandle,
    query_timeout: Duration,
    slots: SlotMap,
    subscribers: Mutex<Vec<Arc<dyn StateSubscriber>>>,
}

impl ModuleRegistry {
    pub fn new(bus: BusHandle, query_timeout: Duration) -> Self {
        ModuleRegistry {
            bus,
            query_timeout,
            slots: Arc::new(Mutex::new(HashMap::new())),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub async fn add_subscriber(&self, subscriber: Arc<dyn StateSubscriber>) {
        self.subscribers.lock().await.push(subscriber);
    }

    async fn notify(&self, address: u8, patch: &velbus_state::JsonPatch) {
        if patch.is_empty() {
            return;
        }
        for subscriber in self.subscribers.lock().await.iter() {
            subscriber.on_patch(address, patch);
        }
    }

    fn context(&self, address: u8) -> ModuleContext {
        ModuleContext {
            bus: self.bus.clone(),
            address,
            query_timeout: self.query_timeout,
        }
    }

    /// Feeds a frame observed on the bus into whatever handler is
    /// already resolved for its address. Addresses that have not been
    /// resolved yet are silently ignored — `dispatch_http` (or an
    /// explicit discovery sweep) is what triggers resolution.
    pub async fn observe(&self, frame: &VelbusFrame) {
        let handler = {
            let slots = self.slots.lock().await;
            match slots.get(&frame.address) {
                Some(Slot::Resolved(handler)) => Some(handler.clone()),
                _ => None,
            }
        };
        if let Some(handler) = handler {
            let patch = handler.lock().await.message(frame);
            self.notify(frame.address, &patch).await;
        }
    }

    /// Resolves `address`, using a cached handler or in-flight
    /// resolution if one already exists.
    async fn resolve(&self, address: u8) -> Result<Arc<Mutex<ModuleHandler>>, ModuleError> {
        let pending = {
            let mut slots = self.slots.lock().await;
            match slots.get(&address) {
                Some(Slot::Resolved(handler)) => return Ok(handler.clone()),
                Some(Slot::TimedOut(at)) if at.is_fresh(CACHED_TIMEOUT_TTL) => {
                    return Err(ModuleError::CachedTimeout { at: at.at });
                }
                Some(Slot::InFlight(fut)) => fut.clone(),
                _ => {
                    let fut = spawn_resolution(self.slots.clone(), self.bus.clone(), address, self.query_timeout);
                    slots.insert(address, Slot::InFlight(fut.clone()));
                    fut
                }
            }
        };

        pending.await;

        let slots = self.slots.lock().await;
        match slots.get(&address) {
            Some(Slot::Resolved(handler)) => Ok(handler.clone()),
            Some(Slot::TimedOut(at)) => Err(ModuleError::CachedTimeout { at: at.at }),
            _ => Err(ModuleError::Unknown { address }),
        }
    }

    pub async fn dispatch_http(
        &self,
        address: u8,
        method: HttpMethod,
        path: &[String],
        body: Option<Value>,
    ) -> HttpResult {
        let handler = self.resolve(address).await?;
        let ctx = self.context(address);
        let mut handler = handler.lock().await;
        handler.dispatch_http(&ctx, method, path, body).await
    }

    pub async fn module_state(&self, address: u8) -> Option<Value> {
        let slots = self.slots.lock().await;
        match slots.get(&address) {
            Some(Slot::Resolved(handler)) => Some(handler.lock().await.state_value()),
            _ => None,
        }
    }

    /// Drops every cached resolution, forcing the next request for each
    /// address to re-run `ModuleTypeRequest` (the `DELETE /module[/addr]`
    /// contract in §6).
    pub async fn forget(&self, address: Option<u8>) {
        let mut slots = self.slots.lock().await;
        match address {
            Some(addr) => {
                slots.remove(&addr);
            }
            None => slots.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::http::HttpMethod;

    #[tokio::test]
    async fn cached_timeout_short_circuits_repeat_lookups() {
        // No responder is attached, so every ModuleTypeRequest query for
        // this address times out.
        let bus = BusHandle::new();
        let registry = ModuleRegistry::new(bus, Duration::from_millis(50));

        let first_start = Instant::now();
        let first = registry.dispatch_http(0xaa, HttpMethod::Get, &["type".to_string()], None).await;
        let first_elapsed = first_start.elapsed();
        assert!(matches!(first, Err(ModuleError::CachedTimeout { .. })));
        assert!(first_elapsed >= Duration::from_millis(50));

        let second_start = Instant::now();
        let second = registry.dispatch_http(0xaa, HttpMethod::Get, &["type".to_string()], None).await;
        let second_elapsed = second_start.elapsed();
        assert!(matches!(second, Err(ModuleError::CachedTimeout { .. })));
        assert!(
            second_elapsed < Duration::from_millis(25),
            "cached timeout should short-circuit well under the query timeout, took {second_elapsed:?}"
        );
    }
}

fn spawn_resolution(slots: SlotMap, bus: BusHandle, address: u8, query_timeout: Duration) -> ResolveFuture {
    let fut: Pin<Box<dyn std::future::Future<Output = ()> + Send>> = Box::pin(async move {
        let result = query(
            &bus,
            VelbusFrame::new(address, Message::ModuleTypeRequest(ModuleTypeRequest)),
            move |f| f.address == address && matches!(&f.message, Message::ModuleType(_)),
            query_timeout,
        )
        .await;

        let mut slots = slots.lock().await;
        match result {
            Ok(frame) => {
                if let Message::ModuleType(m) = &frame.message {
                    let handler = ModuleHandler::from_module_info(&m.module_info);
                    slots.insert(address, Slot::Resolved(Arc::new(Mutex::new(handler))));
                }
            }
            Err(_) => {
                slots.insert(address, Slot::TimedOut(CachedTimeout::now()));
            }
        }
    });
    fut.shared()
}
