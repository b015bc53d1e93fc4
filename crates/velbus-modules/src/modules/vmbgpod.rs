//! VMBGPOD / VMBGPO glass panel: cached temperature reading plus a
//! tri-state pushbutton (`true`/`false`/`"long"`) — no distinct Python
//! `ModuleInfo` variant exists for the bare VMBGPO, so both share this
//! handler (recorded in the grounding ledger).

use serde_json::{json, Value};

use velbus_bus::query;
use velbus_proto::frame::VelbusFrame;
use velbus_proto::message::{Message, SensorTemperatureRequest};
use velbus_state::{JsonPatch, ObservableDict};

use crate::context::{unix_now, ModuleContext};
use crate::error::ModuleError;
use crate::http::{HttpMethod, HttpResponse, HttpResult};

const MAX_AGE_SECS: u64 = 300;
const CHANNEL: u8 = 1;

#[derive(Debug, Default)]
pub struct VmbGpodHandler {
    state: ObservableDict,
}

impl VmbGpodHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&mut self, frame: &VelbusFrame) -> JsonPatch {
        match &frame.message {
            Message::SensorTemperature(m) => {
                let now = unix_now();
                let temperature = json!({"value": m.current_temperature, "timestamp": now});
                vec![self.state.set("temperature", temperature)]
            }
            Message::PushButtonStatus(m) => {
                let idx = 8usize.saturating_sub(CHANNEL as usize);
                let pushbutton = if m.long_pressed.get(idx).copied().unwrap_or(false) {
                    Some(Value::from("long"))
                } else if m.just_pressed.get(idx).copied().unwrap_or(false) {
                    Some(Value::Bool(true))
                } else if m.just_released.get(idx).copied().unwrap_or(false) {
                    Some(Value::Bool(false))
                } else {
                    None
                };
                match pushbutton {
                    Some(value) => vec![self.state.set("pushbutton", value)],
                    None => JsonPatch::new(),
                }
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
        _body: Option<Value>,
    ) -> HttpResult {
        match (method, path) {
            (HttpMethod::Get, [p]) if p == "temperature" => self.get_temperature(ctx).await,
            (HttpMethod::Get, [p]) if p == "pushbutton" => Ok(HttpResponse::ok(
                self.state.get("pushbutton").cloned().unwrap_or(Value::Bool(false)),
            )),
            _ => Err(ModuleError::NotFound {
                method: method.suffix().to_string(),
                path: path.join("/"),
            }),
        }
    }

    async fn get_temperature(&mut self, ctx: &ModuleContext) -> HttpResult {
        let cached = self.state.get("temperature").cloned();
        if let Some(cached) = cached {
            let timestamp = cached.get("timestamp").and_then(Value::as_u64).unwrap_or(0);
            let age = unix_now().saturating_sub(timestamp);
            if age < MAX_AGE_SECS {
                return Ok(HttpResponse {
                    status: 200,
                    body: cached,
                    age_seconds: Some(age),
                });
            }
        }
        let address = ctx.address;
        let reply = query(
            &ctx.bus,
            VelbusFrame::new(
                ctx.address,
                Message::SensorTemperatureRequest(SensorTemperatureRequest {
                    auto_send_interval: 0,
                }),
            ),
            move |f| f.address == address && matches!(&f.message, Message::SensorTemperature(_)),
            ctx.query_timeout,
        )
        .await?;
        self.message(&reply);
        Ok(HttpResponse {
            status: 200,
            body: self.state.get("temperature").cloned().unwrap_or(Value::Null),
            age_seconds: Some(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velbus_proto::message::{PushButtonStatus, SensorTemperature};

    fn bits_for(channel: u8) -> Vec<bool> {
        let mut bits = vec![false; 8];
        bits[8 - channel as usize] = true;
        bits
    }

    #[test]
    fn pushbutton_reports_tri_state() {
        let mut h = VmbGpodHandler::new();
        h.message(&VelbusFrame::new(
            0x20,
            Message::PushButtonStatus(PushButtonStatus {
                just_pressed: bits_for(CHANNEL),
                just_released: vec![false; 8],
                long_pressed: vec![false; 8],
            }),
        ));
        assert_eq!(h.state_value()["pushbutton"], Value::Bool(true));

        h.message(&VelbusFrame::new(
            0x20,
            Message::PushButtonStatus(PushButtonStatus {
                just_pressed: vec![false; 8],
                just_released: vec![false; 8],
                long_pressed: bits_for(CHANNEL),
            }),
        ));
        assert_eq!(h.state_value()["pushbutton"], Value::from("long"));
    }

    #[tokio::test]
    async fn fresh_temperature_reading_served_from_cache() {
        let mut h = VmbGpodHandler::new();
        h.message(&VelbusFrame::new(
            0x20,
            Message::SensorTemperature(SensorTemperature {
                current_temperature: 22.5,
                minimum_temperature: 10.0,
                maximum_temperature: 30.0,
            }),
        ));

        let ctx = ModuleContext {
            bus: velbus_bus::BusHandle::new(),
            address: 0x20,
            query_timeout: std::time::Duration::from_millis(50),
        };
        let resp = h
            .dispatch_http(&ctx, HttpMethod::Get, &["temperature".to_string()], None)
            .await
            .unwrap();
        assert_eq!(resp.body["value"], Value::from(22.5));
        assert_eq!(resp.age_seconds, Some(0));
    }
}
