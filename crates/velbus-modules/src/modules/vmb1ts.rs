//! VMB1TS: single-channel temperature sensor with heater output.
//! `GET /temperature` honors a max-age cache window computed from the
//! timestamp of the last reading, per §6's `Cache-Control` contract.

use serde_json::{json, Value};

use velbus_bus::query;
use velbus_proto::frame::VelbusFrame;
use velbus_proto::message::{Message, SensorTemperatureRequest};
use velbus_state::{JsonPatch, JsonPatchOp, ObservableDict};

use crate::context::{unix_now, ModuleContext};
use crate::error::ModuleError;
use crate::http::{HttpMethod, HttpResponse, HttpResult};

const MAX_AGE_SECS: u64 = 300;

#[derive(Debug, Default)]
pub struct Vmb1TsHandler {
    state: ObservableDict,
}

impl Vmb1TsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&mut self, frame: &VelbusFrame) -> JsonPatch {
        match &frame.message {
            Message::TemperatureSensorStatus(m) => {
                let mut patch = JsonPatch::new();
                let heater = Value::Bool(m.heater);
                if self.state.get("heater") != Some(&heater) {
                    patch.push(self.state.set("heater", heater));
                }
                let now = unix_now();
                let temperature = json!({"value": m.temperature, "timestamp": now});
                patch.push(self.state.set("temperature", temperature));
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
        _body: Option<Value>,
    ) -> HttpResult {
        match (method, path) {
            (HttpMethod::Get, [p]) if p == "temperature" => self.get_temperature(ctx).await,
            (HttpMethod::Get, [p]) if p == "heater" => Ok(HttpResponse::ok(
                self.state.get("heater").cloned().unwrap_or(Value::Bool(false)),
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
            move |f| f.address == address && matches!(&f.message, Message::TemperatureSensorStatus(_)),
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
    use velbus_proto::message::{HeaterCooler, TemperatureMode, TemperatureSensorStatus, TimerMode};

    fn status(heater: bool, temperature: f64) -> VelbusFrame {
        VelbusFrame::new(
            0x01,
            Message::TemperatureSensorStatus(TemperatureSensorStatus {
                heater_cooler: HeaterCooler::Heater,
                temperature_mode: TemperatureMode::Comfort,
                auto_send_temperature_enabled: true,
                timer_mode: TimerMode::Run,
                mode_push_button_locked: false,
                all_room_program_present: false,
                program_step_received: TemperatureMode::Comfort,
                zone_program_present: false,
                sensor_program_present: false,
                valve_unjamming_enabled: false,
                pump_unjamming_enabled: false,
                high_alarm: false,
                low_alarm: false,
                heater,
                cooler: false,
                comfort_or_day: true,
                boost: false,
                pump: false,
                temperature,
                set_temperature: 21.0,
                sleep_timer: 0,
            }),
        )
    }

    #[tokio::test]
    async fn fresh_reading_is_served_from_cache_without_a_query() {
        let mut h = Vmb1TsHandler::new();
        h.message(&status(true, 21.5));

        let ctx = ModuleContext {
            bus: velbus_bus::BusHandle::new(),
            address: 0x01,
            query_timeout: std::time::Duration::from_millis(50),
        };
        let resp = h
            .dispatch_http(&ctx, HttpMethod::Get, &["temperature".to_string()], None)
            .await
            .unwrap();
        assert_eq!(resp.body["value"], Value::from(21.5));
        assert_eq!(resp.age_seconds, Some(0));
    }

    #[test]
    fn heater_state_tracked_independently() {
        let mut h = Vmb1TsHandler::new();
        h.message(&status(true, 20.0));
        assert_eq!(h.state_value()["heater"], Value::Bool(true));
        h.message(&status(false, 20.0));
        assert_eq!(h.state_value()["heater"], Value::Bool(false));
    }
}
