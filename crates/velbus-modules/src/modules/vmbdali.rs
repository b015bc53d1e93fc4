//! VMBDALI: up to 96-channel DALI bridge. State is deliberately opaque
//! (raw `setting`/`setting_value` bytes, matching `DaliDeviceSettings`'s
//! pass-through decode) rather than a per-channel dimvalue model.
//!
//! `SET_DIMVALUE` for DALI addresses a flat channel byte (unlike
//! VMB4DC's one-hot index), which the shared `SetDimvalue` message
//! cannot encode past channel 4; the outgoing command is built as raw
//! bytes here instead of adding a second wire schema without a source
//! to ground it against (see DESIGN.md).

use std::time::Duration;

use serde_json::{json, Value};

use velbus_proto::frame::VelbusFrame;
use velbus_proto::message::{Message, UnknownMessage};
use velbus_state::{JsonPatch, JsonPatchOp, ObservableDict};

use crate::context::ModuleContext;
use crate::delayed::{is_trivial, parse_when, DelayedCall, DelayedCallQueue};
use crate::error::ModuleError;
use crate::http::{HttpMethod, HttpResponse, HttpResult};

const MAX_CHANNEL: u8 = 96;

#[derive(Debug, Clone)]
struct DimStep {
    channel: u8,
    dimvalue: u8,
    dimspeed: u16,
}

fn set_dimvalue_frame(address: u8, channel: u8, dimvalue: u8, dimspeed: u16) -> VelbusFrame {
    let [hi, lo] = dimspeed.to_be_bytes();
    let data = vec![0x07, channel, dimvalue, hi, lo];
    VelbusFrame::new(address, Message::Unknown(UnknownMessage { data }))
}

/// Parses a plain `PUT /dimvalue` body: an integer 0..=100, or a
/// `{dimvalue, dimspeed}` object. Arrays are rejected — only
/// `/e_dimvalue` schedules steps.
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

pub struct VmbDaliHandler {
    state: ObservableDict,
    e_dimvalue: DelayedCallQueue<DimStep>,
}

impl Default for VmbDaliHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl VmbDaliHandler {
    pub fn new() -> Self {
        VmbDaliHandler {
            state: ObservableDict::new(),
            e_dimvalue: DelayedCallQueue::new(),
        }
    }

    pub fn spawn_runner(&self, ctx: ModuleContext) -> tokio::task::JoinHandle<()> {
        let queue = self.e_dimvalue.clone();
        tokio::spawn(async move {
            queue
                .run(|step: DimStep| {
                    let ctx = ctx.clone();
                    async move {
                        let _ = ctx
                            .bus
                            .inject(&set_dimvalue_frame(
                                ctx.address,
                                step.channel,
                                step.dimvalue,
                                step.dimspeed,
                            ))
                            .await;
                    }
                })
                .await;
        })
    }

    pub fn message(&mut self, frame: &VelbusFrame) -> JsonPatch {
        match &frame.message {
            Message::DaliDeviceSettings(m) => {
                let key = m.channel.to_string();
                let (obj, created) = self.state.entry_object(&key);
                let mut patch: JsonPatch = created.into_iter().collect();
                let setting = Value::from(m.setting);
                let setting_value = json!(m.setting_value);
                if obj.get("setting") != Some(&setting) || obj.get("setting_value") != Some(&setting_value) {
                    obj.insert("setting".to_string(), setting.clone());
                    obj.insert("setting_value".to_string(), setting_value.clone());
                    patch.push(JsonPatchOp::add(
                        vec![key.clone(), "setting".to_string()],
                        setting,
                    ));
                    patch.push(JsonPatchOp::add(
                        vec![key, "setting_value".to_string()],
                        setting_value,
                    ));
                }
                patch
            }
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
        if channel < 1 || channel > MAX_CHANNEL {
            return Err(ModuleError::BadRequest("channel out of range".into()));
        }
        Ok(channel)
    }

    /// `PUT /dimvalue`: a plain integer or a `{dimvalue, dimspeed}`
    /// object, applied immediately. Arrays are rejected.
    async fn dispatch_dimvalue(
        &self,
        ctx: &ModuleContext,
        channel: u8,
        method: HttpMethod,
        body: Option<Value>,
    ) -> HttpResult {
        match method {
            HttpMethod::Put => {
                let body = body.ok_or_else(|| ModuleError::BadRequest("missing body".into()))?;
                if body.is_array() {
                    return Err(ModuleError::BadRequest(
                        "arrays are only accepted on /e_dimvalue".into(),
                    ));
                }
                let (dimvalue, dimspeed) = parse_dimvalue_scalar(&body)?;
                ctx.bus
                    .inject(&set_dimvalue_frame(ctx.address, channel, dimvalue, dimspeed))
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
    async fn dispatch_e_dimvalue(
        &self,
        ctx: &ModuleContext,
        channel: u8,
        method: HttpMethod,
        body: Option<Value>,
    ) -> HttpResult {
        match method {
            HttpMethod::Put => {
                let body = body.ok_or_else(|| ModuleError::BadRequest("missing body".into()))?;
                let calls = parse_dimvalue_calls(channel, &body)?;
                if is_trivial(&calls) {
                    let step = calls[0].payload.clone();
                    ctx.bus
                        .inject(&set_dimvalue_frame(
                            ctx.address,
                            channel,
                            step.dimvalue,
                            step.dimspeed,
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

#[cfg(test)]
mod tests {
    use super::*;
    use velbus_proto::message::DaliDeviceSettings;

    #[test]
    fn device_settings_are_stored_opaque_per_channel() {
        let mut h = VmbDaliHandler::new();
        h.message(&VelbusFrame::new(
            0x40,
            Message::DaliDeviceSettings(DaliDeviceSettings {
                channel: 5,
                setting: 2,
                setting_value: vec![0x01, 0x02],
            }),
        ));
        assert_eq!(h.state_value()["5"]["setting"], Value::from(2));
        assert_eq!(h.state_value()["5"]["setting_value"], json!([1, 2]));
    }

    #[tokio::test]
    async fn direct_put_cancels_any_pending_scheduled_steps() {
        let mut h = VmbDaliHandler::new();
        let ctx = ModuleContext {
            bus: velbus_bus::BusHandle::new(),
            address: 0x40,
            query_timeout: Duration::from_millis(50),
        };
        h.dispatch_http(
            &ctx,
            HttpMethod::Put,
            &["3".to_string(), "e_dimvalue".to_string()],
            Some(json!([{"dimvalue": 100}, {"dimvalue": 20, "when": 10.0}])),
        )
        .await
        .unwrap();

        h.dispatch_http(
            &ctx,
            HttpMethod::Put,
            &["3".to_string(), "dimvalue".to_string()],
            Some(json!(5)),
        )
        .await
        .unwrap();

        assert!(h.e_dimvalue.is_empty().await);
    }
}
