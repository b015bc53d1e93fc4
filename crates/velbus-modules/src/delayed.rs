//! Generic delayed-call engine (§4.7): a time-ordered queue whose
//! reassignment cancels the outstanding timer and arms a new one at
//! the head. Parameterized over the scheduled payload type so each
//! handler (VMB4DC's dim steps, VMBDALI's dim steps) reuses the same
//! machinery instead of re-deriving it.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{Mutex, Notify};

use crate::error::ModuleError;

#[derive(Debug, Clone)]
pub struct DelayedCall<T> {
    /// `None` sorts first and means "run immediately".
    pub when: Option<Instant>,
    pub payload: T,
}

impl<T> DelayedCall<T> {
    pub fn now(payload: T) -> Self {
        DelayedCall { when: None, payload }
    }

    pub fn at(when: Instant, payload: T) -> Self {
        DelayedCall {
            when: Some(when),
            payload,
        }
    }
}

/// A list of exactly one entry scheduled for `None` ("run immediately")
/// is indistinguishable from a plain synchronous request — used to
/// reject simulated-only (scheduled/multi-step) requests on the
/// non-enhanced endpoint.
pub fn is_trivial<T>(calls: &[DelayedCall<T>]) -> bool {
    matches!(calls, [DelayedCall { when: None, .. }])
}

/// Parses a `DelayedCall.when` value: a `null` (run immediately), a
/// number of seconds from now, or an ISO-8601 string with an offset.
/// Naive datetimes aren't accepted here — HTTP bodies always carry an
/// explicit offset or none at all.
pub fn parse_when(value: Option<&Value>) -> Result<Option<Instant>, ModuleError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let secs = n
                .as_f64()
                .ok_or_else(|| ModuleError::BadRequest("when must be a finite number".into()))?;
            Ok(Some(Instant::now() + Duration::from_secs_f64(secs.max(0.0))))
        }
        Some(Value::String(s)) => {
            let target = chrono::DateTime::parse_from_rfc3339(s)
                .map_err(|e| ModuleError::BadRequest(format!("invalid ISO-8601 when: {e}")))?;
            let now = chrono::Utc::now();
            let delta = target.with_timezone(&chrono::Utc) - now;
            let secs = delta.num_milliseconds().max(0) as f64 / 1000.0;
            Ok(Some(Instant::now() + Duration::from_secs_f64(secs)))
        }
        Some(other) => Err(ModuleError::BadRequest(format!(
            "when must be null, a number, or an ISO-8601 string, got {other}"
        ))),
    }
}

pub struct DelayedCallQueue<T> {
    state: Arc<Mutex<Vec<DelayedCall<T>>>>,
    notify: Arc<Notify>,
}

impl<T> Clone for DelayedCallQueue<T> {
    fn clone(&self) -> Self {
        DelayedCallQueue {
            state: self.state.clone(),
            notify: self.notify.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> DelayedCallQueue<T> {
    pub fn new() -> Self {
        DelayedCallQueue {
            state: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Cancels the prior timer and installs `calls` as the new queue,
    /// sorted `when`-ascending with `None` first.
    pub async fn set(&self, mut calls: Vec<DelayedCall<T>>) {
        calls.sort_by(|a, b| match (a.when, b.when) {
            (None, None) => std::cmp::Ordering::Equal,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(&y),
        });
        *self.state.lock().await = calls;
        self.notify.notify_waiters();
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.is_empty()
    }

    /// Clones out the currently pending payloads, for a `GET` on the
    /// enhanced endpoint to report what's scheduled.
    pub async fn snapshot(&self) -> Vec<T> {
        self.state.lock().await.iter().map(|c| c.payload.clone()).collect()
    }

    /// Runs forever, invoking `on_fire` for each entry as it becomes
    /// due. A reassignment via `set` while waiting cancels the current
    /// wait and re-evaluates the (possibly different) head.
    pub async fn run<F, Fut>(&self, mut on_fire: F)
    where
        F: FnMut(T) -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        loop {
            let next_when = self.state.lock().await.first().map(|c| c.when);
            match next_when {
                None => {
                    self.notify.notified().await;
                    continue;
                }
                Some(when) => {
                    let sleep = match when {
                        None => tokio::time::sleep(std::time::Duration::ZERO),
                        Some(instant) => {
                            let now = Instant::now();
                            tokio::time::sleep(instant.saturating_duration_since(now))
                        }
                    };
                    tokio::select! {
                        _ = sleep => {}
                        _ = self.notify.notified() => { continue; }
                    }
                }
            }

            let due: Vec<T> = {
                let mut q = self.state.lock().await;
                let now = Instant::now();
                let mut due = Vec::new();
                q.retain(|c| {
                    let is_due = c.when.map(|w| w <= now).unwrap_or(true);
                    if is_due {
                        due.push(c.payload.clone());
                    }
                    !is_due
                });
                due
            };
            for payload in due {
                on_fire(payload).await;
            }
        }
    }
}

impl<T: Clone + Send + 'static> Default for DelayedCallQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn is_trivial_requires_exactly_one_immediate_entry() {
        assert!(is_trivial(&[DelayedCall::now(1)]));
        assert!(!is_trivial(&[DelayedCall::now(1), DelayedCall::now(2)]));
        assert!(!is_trivial(&[DelayedCall::at(Instant::now(), 1)]));
        assert!(!is_trivial::<u32>(&[]));
    }

    #[test]
    fn parse_when_accepts_null_number_and_iso8601() {
        assert!(parse_when(None).unwrap().is_none());
        assert!(parse_when(Some(&Value::Null)).unwrap().is_none());
        assert!(parse_when(Some(&Value::from(1.5))).unwrap().is_some());

        let future = chrono::Utc::now() + chrono::Duration::seconds(5);
        let iso = Value::from(future.to_rfc3339());
        assert!(parse_when(Some(&iso)).unwrap().is_some());

        assert!(parse_when(Some(&Value::from("not a date"))).is_err());
        assert!(parse_when(Some(&Value::Bool(true))).is_err());
    }

    #[tokio::test]
    async fn fires_in_non_decreasing_when_order() {
        let queue: DelayedCallQueue<u32> = DelayedCallQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let now = Instant::now();
        queue
            .set(vec![
                DelayedCall::at(now + Duration::from_millis(40), 2),
                DelayedCall::at(now + Duration::from_millis(10), 1),
            ])
            .await;

        let order_clone = order.clone();
        let runner = tokio::spawn(async move {
            queue
                .run(|payload| {
                    let order = order_clone.clone();
                    async move {
                        order.lock().await.push(payload);
                    }
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(80)).await;
        runner.abort();
        assert_eq!(*order.lock().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn reassignment_cancels_pending_entry() {
        let queue: DelayedCallQueue<u32> = DelayedCallQueue::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let now = Instant::now();
        queue
            .set(vec![DelayedCall::at(now + Duration::from_millis(100), 99)])
            .await;

        let fired_clone = fired.clone();
        let queue_clone = queue.clone();
        let runner = tokio::spawn(async move {
            queue_clone
                .run(|_| {
                    let fired = fired_clone.clone();
                    async move {
                        fired.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.set(vec![DelayedCall::now(1)]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        runner.abort();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
