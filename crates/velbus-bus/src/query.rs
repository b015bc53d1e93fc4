//! Request/response correlation: send a frame, await the first reply
//! matching a predicate, with a timeout. Built directly on the
//! multiplexer's listener set — no separate dispatch path.

use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::time::timeout;

use velbus_proto::frame::VelbusFrame;

use crate::error::BusError;
use crate::mux::BusHandle;

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Sends `frame` and waits for the first frame satisfying `predicate`
/// (address match is the caller's responsibility, folded into the
/// predicate so callers can filter by channel too, per §4.4). On
/// timeout, returns `BusError::Timeout` — callers needing the
/// `CachedTimeoutError` server-timestamp behavior wrap this themselves.
pub async fn query<F>(
    handle: &BusHandle,
    frame: VelbusFrame,
    predicate: F,
    query_timeout: Duration,
) -> Result<VelbusFrame, BusError>
where
    F: Fn(&VelbusFrame) -> bool + Send + Sync + 'static,
{
    let (tx, rx) = oneshot::channel();
    let tx = std::sync::Mutex::new(Some(tx));

    let guard = handle
        .subscribe(Box::new(move |candidate: &VelbusFrame| {
            if predicate(candidate) {
                if let Some(sender) = tx.lock().unwrap().take() {
                    let _ = sender.send(candidate.clone());
                }
            }
        }))
        .await;

    handle.inject(&frame).await?;

    let result = timeout(query_timeout, rx).await;
    drop(guard);

    match result {
        Ok(Ok(matched)) => Ok(matched),
        Ok(Err(_)) => Err(BusError::Timeout),
        Err(_) => Err(BusError::Timeout),
    }
}

/// Wraps a timed-out query with the instant it failed, so a cache can
/// short-circuit repeated callers within the TTL (§4.6 step 5, §7).
#[derive(Debug, Clone)]
pub struct CachedTimeout {
    pub at: Instant,
}

impl CachedTimeout {
    pub fn now() -> Self {
        CachedTimeout { at: Instant::now() }
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.at.elapsed() < ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::BusHandle;
    use velbus_proto::message::{Message, ModuleType, ModuleTypeRequest};
    use velbus_proto::moduleinfo::ModuleInfo;

    #[tokio::test]
    async fn resolves_on_first_predicate_match() {
        let bus = BusHandle::new();
        let responder_bus = bus.clone();
        tokio::spawn(async move {
            // A frame from an unrelated address must not satisfy the
            // predicate; only the matching address/kind combination may.
            let _ = responder_bus
                .inject(&VelbusFrame::new(0x02, Message::ModuleType(ModuleType { module_info: ModuleInfo::Unknown(Default::default()) })))
                .await;
            let _ = responder_bus
                .inject(&VelbusFrame::new(0x01, Message::ModuleType(ModuleType { module_info: ModuleInfo::Unknown(Default::default()) })))
                .await;
        });

        let result = query(
            &bus,
            VelbusFrame::new(0x01, Message::ModuleTypeRequest(ModuleTypeRequest)),
            |f| f.address == 0x01 && matches!(&f.message, Message::ModuleType(_)),
            Duration::from_millis(500),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(result.unwrap().address, 0x01);
    }

    #[tokio::test]
    async fn times_out_when_nothing_matches() {
        let bus = BusHandle::new();
        let result = query(
            &bus,
            VelbusFrame::new(0x01, Message::ModuleTypeRequest(ModuleTypeRequest)),
            |f| f.address == 0x01 && matches!(&f.message, Message::ModuleType(_)),
            Duration::from_millis(30),
        )
        .await;
        assert!(matches!(result, Err(BusError::Timeout)));
    }
}
