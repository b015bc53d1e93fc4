//! VMB2BLE / VMB1BLS: V2 blind driver. Unlike VMB2BL the module reports
//! `blind_position` directly, so no elapsed-time estimation is needed —
//! position and status are taken verbatim from `BlindStatusV2`.

use serde_json::{json, Value};

use velbus_proto::frame::VelbusFrame;
use velbus_proto::message::{
    BlindStatusV2Kind, Message, SetBlindPosition, SwitchBlindOffV2, SwitchBlindV2,
};
use velbus_state::{JsonPatch, JsonPatchOp, ObservableDict};

use crate::context::ModuleContext;
use crate::error::ModuleError;
use crate::http::{HttpMethod, HttpResponse, HttpResult};

#[derive(Debug, Default)]
pub struct VmbBleHandler {
    state: ObservableDict,
}

impl VmbBleHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn status_str(kind: BlindStatusV2Kind) -> &'static str {
        match kind {
            BlindStatusV2Kind::Off => "off",
            BlindStatusV2Kind::Up => "up",
            BlindStatusV2Kind::Down => "down",
        }
    }

    pub fn message(&mut self, frame: &VelbusFrame) -> JsonPatch {
        match &frame.message {
            Message::BlindStatusV2(m) => {
                let key = m.channel.to_string();
                let (obj, created) = self.state.entry_object(&key);
                let mut patch: JsonPatch = created.into_iter().collect();
                let status = Value::from(Self::status_str(m.blind_status));
                if obj.get("status") != Some(&status) {
                    obj.insert("status".to_string(), status.clone());
                    patch.push(JsonPatchOp::add(vec![key.clone(), "status".to_string()], status));
                }
                let position = Value::from(m.blind_position);
                if obj.get("position") != Some(&position) {
                    obj.insert("position".to_string(), position.clone());
                    patch.push(JsonPatchOp::add(vec![key, "position".to_string()], position));
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
            [channel_str, rest @ ..] if rest.first().map(String::as_str) == Some("status") => {
                let channel: u8 = channel_str
                    .parse()
                    .map_err(|_| ModuleError::BadRequest("channel must be numeric".into()))?;
                self.dispatch_status(ctx, channel, method, body).await
            }
            _ => Err(ModuleError::NotFound {
                method: method.suffix().to_string(),
                path: path.join("/"),
            }),
        }
    }

    async fn dispatch_status(
        &mut self,
        ctx: &ModuleContext,
        channel: u8,
        method: HttpMethod,
        body: Option<Value>,
    ) -> HttpResult {
        match method {
            HttpMethod::Get => {
                let key = channel.to_string();
                Ok(HttpResponse::ok(
                    self.state.get(&key).cloned().unwrap_or_else(|| json!({})),
                ))
            }
            HttpMethod::Put => {
                let body = body.ok_or_else(|| ModuleError::BadRequest("missing body".into()))?;
                let message = if let Some(n) = body.as_u64() {
                    Message::SetBlindPosition(SetBlindPosition {
                        channel,
                        position: n.min(100) as u8,
                    })
                } else if let Some(status) = body.as_str() {
                    match status {
                        "up" => Message::SwitchBlindV2(SwitchBlindV2 {
                            up: true,
                            channel,
                            timeout: 0,
                        }),
                        "down" => Message::SwitchBlindV2(SwitchBlindV2 {
                            up: false,
                            channel,
                            timeout: 0,
                        }),
                        "off" => Message::SwitchBlindOffV2(SwitchBlindOffV2 { channel }),
                        other => {
                            return Err(ModuleError::BadRequest(format!(
                                "unknown blind status \"{other}\""
                            )))
                        }
                    }
                } else {
                    return Err(ModuleError::BadRequest(
                        "expected integer position 0..=100 or \"up\"|\"down\"|\"off\"".into(),
                    ));
                };
                ctx.bus.inject(&VelbusFrame::new(ctx.address, message)).await?;
                Ok(HttpResponse::ok(json!({"ok": true})))
            }
            _ => Err(ModuleError::NotFound {
                method: method.suffix().to_string(),
                path: format!("{channel}/status"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velbus_proto::message::{AutoMode, BlindLedStatusV1, LockedInhibitedForced};

    fn blind_status(channel: u8, kind: BlindStatusV2Kind, position: u8) -> VelbusFrame {
        VelbusFrame::new(
            0x07,
            Message::BlindStatusV2(velbus_proto::message::BlindStatusV2 {
                channel,
                default_timeout: 15,
                blind_status: kind,
                led_status: BlindLedStatusV1::Off,
                blind_position: position,
                locked_inhibited_forced: LockedInhibitedForced::Normal,
                sunset_enabled: false,
                sunrise_enabled: false,
                alarm2_global: false,
                alarm2_on: false,
                alarm1_global: false,
                alarm1_on: false,
                auto_mode: AutoMode::Disabled,
            }),
        )
    }

    #[test]
    fn reported_position_is_used_verbatim_with_no_estimation() {
        let mut h = VmbBleHandler::new();
        let patch = h.message(&blind_status(1, BlindStatusV2Kind::Down, 42));
        assert_eq!(h.state_value()["1"]["position"], Value::from(42));
        assert_eq!(h.state_value()["1"]["status"], Value::from("down"));
        assert_eq!(patch.len(), 3); // object creation, plus one `add` each for status and position
    }

    #[tokio::test]
    async fn get_status_returns_cached_state_without_a_query() {
        let mut h = VmbBleHandler::new();
        h.message(&blind_status(2, BlindStatusV2Kind::Up, 7));

        let ctx = ModuleContext {
            bus: velbus_bus::BusHandle::new(),
            address: 0x07,
            query_timeout: std::time::Duration::from_millis(50),
        };
        let resp = h
            .dispatch_http(&ctx, HttpMethod::Get, &["2".to_string(), "status".to_string()], None)
            .await
            .unwrap();
        assert_eq!(resp.body["status"], Value::from("up"));
        assert_eq!(resp.body["position"], Value::from(7));
    }
}
