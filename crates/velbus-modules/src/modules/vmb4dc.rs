//! VMB4DC: 4-channel dimmer driver (§4.8), using `DelayedCallQueue` for
//! the `e_dimvalue` scheduled-step list described in the original's
//! "gradual dim" helper.

use std::time::Duration;

use serde_json::{json, Value};

use velbus_bus::query;
use velbus_proto::frame::VelbusFrame;
use velbus_proto::message::{Message, ModuleStatusRequest, SetDimvalue};
use velbus_state::{JsonPatch, JsonPatchOp, ObservableDict};

use crate::context::{unix_now, ModuleContext};
use crate::delayed::{is_trivial, parse_when, DelayedCall, DelayedCallQueue};
use crate::error::ModuleError;
use crate::http::{HttpMethod, HttpResponse, HttpResult};

const CHANNELS: u8 = 4;

#[derive(Debug, Clone)]
struct DimStep {
    channel: u8,
    dimvalue: u8,
    dimspeed: u16,
}

/// Parses a plain `PUT /dimvalue` body: an integer 0..=100, or a
/// `{dimvalue, dimspeed}` object. Arrays are rejected here — they are
/// only valid on the enhanced `/e_dimvalue` endpoint.
fn parse_dimvalue_scalar(body: &Value) -> Result<(u8, u16), ModuleError> {
    if let Some(n) = body.as_u64() {
        Ok((n.min(100) as u8, 0))
    } else if let Value::Object(obj) = body {
        let dimvalue = obj
            .get("dimvalue")
            .and_then(Value::as_u64)
            .ok_or_else(|| ModuleError::BadRequest("missing dimvalue".into()))?
            .min(100) as u8;
        let dimspeed = obj.get("dimspeed").and_then(Value::as_u64).unwrap_or(0) as u16;
        Ok((dimvalue, dimspeed))
    } else {
        Err(ModuleError::BadRequest(
            "expected integer 0..=100 or a {dimvalue,dimspeed} object".into(),
        ))
    }
}

/// Parses an `e_dimvalue` step list: an array of `{dimvalue, dimspeed,
/// when}` objects, with `when` following the polymorphic null/number/
/// ISO-8601 contract.
fn parse_dimvalue_calls(channel: u8, body: &Value) -> Result<Vec<DelayedCall<DimStep>>, ModuleError> {
    let steps = body
        .as_array()
        .ok_or_else(|| ModuleError::BadRequest("expected an array of steps".into()))?;
    if steps.is_empty() {
        return Err(ModuleError::BadRequest("empty list".into()));
    }
    steps
        .iter()
        .map(|step| {
            let dimvalue = step
                .get("dimvalue")
                .and_then(Value::as_u64)
                .ok_or_else(|| ModuleError::BadRequest("step missing dimvalue".into()))?
                .min(100) as u8;
            let dimspeed = step.get("dimspeed").and_then(Value::as_u64).unwrap_or(0) as u16;
            let when = parse_when(step.get("when"))?;
            Ok(DelayedCall {
                when,
                payload: DimStep { channel, dimvalue, dimspeed },
            })
        })
        .collect()
}

pub struct Vmb4DcHandler {
    state: ObservableDict,
    e_dimvalue: DelayedCallQueue<DimStep>,
}

impl Vmb4DcHandler {
    pub fn new() -> Self {
        Vmb4DcHandler {
            state: ObservableDict::new(),
            e_dimvalue: DelayedCallQueue::new(),
        }
    }

    /// Spawns the scheduled-step runner; callers own the returned handle's
    /// lifetime (the registry keeps one per resolved VMB4DC address).
    pub fn spawn_runner(&self, ctx: ModuleContext) -> tokio::task::JoinHandle<()> {
        let queue = self.e_dimvalue.clone();
        tokio::spawn(async move {
            queue
                .run(|step: DimStep| {
                    let ctx = ctx.clone();
                    async move {
                        let _ = ctx
                            .bus
                            .inject(&VelbusFrame::new(
                                ctx.address,
                                Message::SetDimvalue(SetDimvalue {
                                    channel: step.channel,
                                    dimvalue: step.dimvalue,
                                    dimspeed: step.dimspeed,
                                }),
                            ))
                            .await;
                    }
                })
                .await;
        })
    }

    fn set_dimvalue(&mut self, channel: u8, dimvalue: u8) -> JsonPatch {
        let key = channel.to_string();
        let (obj, created) = self.state.entry_object(&key);
        let mut patch: JsonPatch = created.into_iter().collect();
        let value = Value::from(dimvalue);
        if obj.get("dimvalue") != Some(&value) {
            obj.insert("dimvalue".to_string(), value.clone());
            patch.push(JsonPatchOp::add(vec![key.clone(), "dimvalue".to_string()], value));
            let now = Value::from(unix_now());
            obj.insert("last_change".to_string(), now.clone());
            patch.push(JsonPatchOp::add(vec![key, "last_change".to_string()], now));
        }
        patch
    }

    pub fn message(&mut self, frame: &VelbusFrame) -> JsonPatch {
        match &frame.message {
            Message::DimmercontrollerStatus(m) => self.set_dimvalue(m.channel, m.dimvalue),
            _ => JsonPatch::new(),
        }
    }

    pub fn state_value(&self) -> Value {
        self.state.to_value()
    }

    pub async fn dispatch_http(
        &mut self,
        ctx: &ModuleContext,
        method: HttpMethod,
        path: &[String],
        body: Option<Value>,
    ) -> HttpResult {
        match path {
            [channel_str, rest @ ..] if rest.first().map(String::as_str) == Some("dimvalue") => {
                let channel = self.parse_channel(channel_str)?;
                self.dispatch_dimvalue(ctx, channel, method, body).await
            }
            [channel_str, rest @ ..] if rest.first().map(String::as_str) == Some("e_dimvalue") => {
                let channel = self.parse_channel(channel_str)?;
                self.dispatch_e_dimvalue(ctx, channel, method, body).await
            }
            _ => Err(ModuleError::NotFound {
                method: method.suffix().to_string(),
                path: path.join("/"),
            }),
        }
    }

    fn parse_channel(&self, channel_str: &str) -> Result<u8, ModuleError> {
        let channel: u8 = channel_str
            .parse()
            .map_err(|_| ModuleError::BadRequest("channel must be numeric".into()))?;
        if channel < 1 || channel > CHANNELS {
            return Err(ModuleError::BadRequest("channel out of range".into()));
        }
        Ok(channel)
    }

    async fn read_dimvalue(&mut self, ctx: &ModuleContext, channel: u8) -> Result<Value, ModuleError> {
        let key = channel.to_string();
        if let Some(v) = self.state.get(&key).and_then(|v| v.get("dimvalue")) {
            return Ok(v.clone());
        }
        let address = ctx.address;
        let reply = query(
            &ctx.bus,
            VelbusFrame::new(
                ctx.address,
                Message::ModuleStatusRequest(ModuleStatusRequest { channel }),
            ),
            move |f| {
                f.address == address
                    && matches!(&f.message, Message::DimmercontrollerStatus(m) if m.channel == channel)
            },
            ctx.query_timeout,
        )
        .await?;
        self.message(&reply);
        Ok(self
            .state
            .get(&key)
            .and_then(|v| v.get("dimvalue"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// `PUT /dimvalue`: a plain integer or a `{dimvalue, dimspeed}`
    /// object, applied immediately and cancelling any pending scheduled
    /// steps. Arrays are rejected — only `/e_dimvalue` schedules steps.
    async fn dispatch_dimvalue(
        &mut self,
        ctx: &ModuleContext,
        channel: u8,
        method: HttpMethod,
        body: Option<Value>,
    ) -> HttpResult {
        match method {
            HttpMethod::Get => Ok(HttpResponse::ok(self.read_dimvalue(ctx, channel).await?)),
            HttpMethod::Put => {
                let body = body.ok_or_else(|| ModuleError::BadRequest("missing body".into()))?;
                if body.is_array() {
                    return Err(ModuleError::BadRequest(
                        "arrays are only accepted on /e_dimvalue".into(),
                    ));
                }
                let (dimvalue, dimspeed) = parse_dimvalue_scalar(&body)?;
                ctx.bus
                    .inject(&VelbusFrame::new(
                        ctx.address,
                        Message::SetDimvalue(SetDimvalue { channel, dimvalue, dimspeed }),
                    ))
                    .await?;
                self.e_dimvalue.set(vec![]).await;
                Ok(HttpResponse::ok(json!({"ok": true})))
            }
            _ => Err(ModuleError::NotFound {
                method: method.suffix().to_string(),
                path: format!("{channel}/dimvalue"),
            }),
        }
    }

    /// `PUT /e_dimvalue`: an array of `{dimvalue, dimspeed, when}` steps.
    /// A trivial (single, immediate) list is injected directly instead of
    /// round-tripping through the scheduler.
    async fn dispatch_e_dimvalue(
        &mut self,
        ctx: &ModuleContext,
        channel: u8,
        method: HttpMethod,
        body: Option<Value>,
    ) -> HttpResult {
        match method {
            HttpMethod::Get => Ok(HttpResponse::ok(self.read_dimvalue(ctx, channel).await?)),
            HttpMethod::Put => {
                let body = body.ok_or_else(|| ModuleError::BadRequest("missing body".into()))?;
                let calls = parse_dimvalue_calls(channel, &body)?;
                if is_trivial(&calls) {
                    let step = calls[0].payload.clone();
                    ctx.bus
                        .inject(&VelbusFrame::new(
                            ctx.address,
                            Message::SetDimvalue(SetDimvalue {
                                channel,
                                dimvalue: step.dimvalue,
                                dimspeed: step.dimspeed,
                            }),
                        ))
                        .await?;
                    self.e_dimvalue.set(vec![]).await;
                } else {
                    self.e_dimvalue.set(calls).await;
                }
                Ok(HttpResponse::ok(json!({"ok": true})))
            }
            _ => Err(ModuleError::NotFound {
                method: method.suffix().to_string(),
                path: format!("{channel}/e_dimvalue"),
            }),
        }
    }
}

impl Default for Vmb4DcHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn scheduled_steps_fire_in_order_and_cancellation_cancels_the_rest() {
        let bus = velbus_bus::BusHandle::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let _guard = bus
            .subscribe(Box::new(move |f: &VelbusFrame| {
                if let Message::SetDimvalue(m) = &f.message {
                    received_clone.lock().unwrap().push(m.dimvalue);
                }
            }))
            .await;

        let mut h = Vmb4DcHandler::new();
        let ctx = ModuleContext {
            bus: bus.clone(),
            address: 0x05,
            query_timeout: Duration::from_millis(200),
        };
        let _runner = h.spawn_runner(ctx.clone());

        h.dispatch_http(
            &ctx,
            HttpMethod::Put,
            &["1".to_string(), "e_dimvalue".to_string()],
            Some(json!([{"dimvalue": 100}, {"dimvalue": 20, "when": 0.05}])),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*received.lock().unwrap(), vec![100]);

        // Interrupting with a direct PUT cancels the still-pending second step.
        h.dispatch_http(
            &ctx,
            HttpMethod::Put,
            &["1".to_string(), "dimvalue".to_string()],
            Some(json!(42)),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*received.lock().unwrap(), vec![100, 42]);
    }

    #[tokio::test]
    async fn dimvalue_rejects_an_array_body() {
        let mut h = Vmb4DcHandler::new();
        let ctx = ModuleContext {
            bus: velbus_bus::BusHandle::new(),
            address: 0x05,
            query_timeout: Duration::from_millis(200),
        };
        let err = h
            .dispatch_http(
                &ctx,
                HttpMethod::Put,
                &["1".to_string(), "dimvalue".to_string()],
                Some(json!([{"dimvalue": 100}])),
            )
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[tokio::test]
    async fn dimvalue_accepts_a_dimvalue_dimspeed_object() {
        let bus = velbus_bus::BusHandle::new();
        let received = Arc::new(Mutex::new(None));
        let received_clone = received.clone();
        let _guard = bus
            .subscribe(Box::new(move |f: &VelbusFrame| {
                if let Message::SetDimvalue(m) = &f.message {
                    *received_clone.lock().unwrap() = Some((m.dimvalue, m.dimspeed));
                }
            }))
            .await;

        let mut h = Vmb4DcHandler::new();
        let ctx = ModuleContext {
            bus: bus.clone(),
            address: 0x05,
            query_timeout: Duration::from_millis(200),
        };
        h.dispatch_http(
            &ctx,
            HttpMethod::Put,
            &["1".to_string(), "dimvalue".to_string()],
            Some(json!({"dimvalue": 100, "dimspeed": 5})),
        )
        .await
        .unwrap();

        assert_eq!(*received.lock().unwrap(), Some((100, 5)));
    }
}
