//! VMB4RYNO: 5-channel relay driver (§4.8).

use serde_json::{json, Value};
use velbus_bus::query;
use velbus_proto::frame::VelbusFrame;
use velbus_proto::message::{Message, RelayState, StartRelayTimer, SwitchRelay};
use velbus_state::{ObservableDict, JsonPatch};

use crate::context::{pushbutton_bit, unix_now, ModuleContext};
use crate::delayed::{is_trivial, parse_when, DelayedCall, DelayedCallQueue};
use crate::error::ModuleError;
use crate::http::{HttpMethod, HttpResponse, HttpResult};

const CHANNELS: u8 = 5;

#[derive(Debug, Clone, Copy)]
enum RelayStepStatus {
    Switch(bool),
    Timer(u32),
}

#[derive(Debug, Clone, Copy)]
struct RelayStep {
    channel: u8,
    status: RelayStepStatus,
}

fn parse_status_scalar(v: &Value) -> Result<RelayStepStatus, ModuleError> {
    if let Some(b) = v.as_bool() {
        Ok(RelayStepStatus::Switch(b))
    } else if let Some(n) = v.as_u64() {
        Ok(RelayStepStatus::Timer(n as u32))
    } else {
        Err(ModuleError::BadRequest("expected bool or integer seconds".into()))
    }
}

/// Upgrades a scalar/object/list body into a homogeneous list of
/// `{status, when}` entries, mirroring `RelayStep.to_list`/`from_any`.
fn parse_relay_calls(channel: u8, body: &Value) -> Result<Vec<DelayedCall<RelayStep>>, ModuleError> {
    let entries: Vec<&Value> = match body {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    if entries.is_empty() {
        return Err(ModuleError::BadRequest("empty list".into()));
    }
    entries
        .into_iter()
        .map(|entry| {
            let (status, when) = if let Value::Object(obj) = entry {
                let status_value = obj
                    .get("status")
                    .ok_or_else(|| ModuleError::BadRequest("step missing status".into()))?;
                (parse_status_scalar(status_value)?, parse_when(obj.get("when"))?)
            } else {
                (parse_status_scalar(entry)?, None)
            };
            Ok(DelayedCall {
                when,
                payload: RelayStep { channel, status },
            })
        })
        .collect()
}

#[derive(Default)]
pub struct Vmb4RynoHandler {
    state: ObservableDict,
    e_relay: DelayedCallQueue<RelayStep>,
}

impl Vmb4RynoHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the `e_relay` scheduled-step runner; callers own the
    /// returned handle's lifetime (the registry keeps one per resolved
    /// VMB4RYNO address).
    pub fn spawn_runner(&self, ctx: ModuleContext) -> tokio::task::JoinHandle<()> {
        let queue = self.e_relay.clone();
        tokio::spawn(async move {
            queue
                .run(|step: RelayStep| {
                    let ctx = ctx.clone();
                    async move {
                        let message = match step.status {
                            RelayStepStatus::Switch(on) => {
                                Message::SwitchRelay(SwitchRelay { relay: step.channel, on })
                            }
                            RelayStepStatus::Timer(delay_time) => {
                                Message::StartRelayTimer(StartRelayTimer {
                                    relay: step.channel,
                                    delay_time,
                                })
                            }
                        };
                        let _ = ctx.bus.inject(&VelbusFrame::new(ctx.address, message)).await;
                    }
                })
                .await;
        })
    }

    fn channel_key(channel: u8) -> String {
        channel.to_string()
    }

    fn set_relay(&mut self, channel: u8, value: Value) -> JsonPatch {
        let key = Self::channel_key(channel);
        let (obj, created) = self.state.entry_object(&key);
        let changed = obj.get("relay") != Some(&value);
        let mut patch: JsonPatch = created.into_iter().collect();
        if changed {
            obj.insert("relay".to_string(), value.clone());
            patch.push(velbus_state::JsonPatchOp::add(
                vec![key.clone(), "relay".to_string()],
                value,
            ));
            let now = Value::from(unix_now());
            obj.insert("last_change".to_string(), now.clone());
            patch.push(velbus_state::JsonPatchOp::add(
                vec![key, "last_change".to_string()],
                now,
            ));
        }
        patch
    }

    pub fn message(&mut self, frame: &VelbusFrame) -> JsonPatch {
        match &frame.message {
            Message::RelayStatus(m) => {
                let value = if m.delay_timer == 0 {
                    Value::Bool(matches!(m.relay_status, RelayState::On))
                } else {
                    Value::from(unix_now() + m.delay_timer as u64)
                };
                self.set_relay(m.relay, value)
            }
            Message::PushButtonStatus(m) => {
                let mut patch = JsonPatch::new();
                for channel in 1..=CHANNELS {
                    if pushbutton_bit(&m.just_pressed, channel) {
                        let key = Self::channel_key(channel);
                        let has_timer = self
                            .state
                            .get(&key)
                            .and_then(|v| v.get("relay"))
                            .map(|v| v.is_number())
                            .unwrap_or(false);
                        if !has_timer {
                            patch.extend(self.set_relay(channel, Value::Bool(true)));
                        }
                    }
                    if pushbutton_bit(&m.just_released, channel) {
                        patch.extend(self.set_relay(channel, Value::Bool(false)));
                    }
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
            [channel_str, rest @ ..] if rest.first().map(String::as_str) == Some("relay") => {
                let channel: u8 = channel_str
                    .parse()
                    .map_err(|_| ModuleError::BadRequest("channel must be numeric".into()))?;
                self.dispatch_relay(ctx, channel, method, body, false).await
            }
            [channel_str, rest @ ..] if rest.first().map(String::as_str) == Some("e_relay") => {
                let channel: u8 = channel_str
                    .parse()
                    .map_err(|_| ModuleError::BadRequest("channel must be numeric".into()))?;
                self.dispatch_relay(ctx, channel, method, body, true).await
            }
            _ => Err(ModuleError::NotFound {
                method: method.suffix().to_string(),
                path: path.join("/"),
            }),
        }
    }

    async fn dispatch_relay(
        &mut self,
        ctx: &ModuleContext,
        channel: u8,
        method: HttpMethod,
        body: Option<Value>,
        enhanced: bool,
    ) -> HttpResult {
        match method {
            HttpMethod::Get => {
                let key = Self::channel_key(channel);
                if let Some(v) = self.state.get(&key).and_then(|v| v.get("relay")) {
                    return Ok(HttpResponse::ok(v.clone()));
                }
                let address = ctx.address;
                let reply = query(
                    &ctx.bus,
                    VelbusFrame::new(ctx.address, Message::ModuleStatusRequest(
                        velbus_proto::message::ModuleStatusRequest { channel },
                    )),
                    move |f| f.address == address && matches!(&f.message, Message::RelayStatus(m) if m.relay == channel),
                    ctx.query_timeout,
                )
                .await?;
                self.message(&reply);
                let key = Self::channel_key(channel);
                Ok(HttpResponse::ok(
                    self.state.get(&key).and_then(|v| v.get("relay")).cloned().unwrap_or(Value::Null),
                ))
            }
            HttpMethod::Put => {
                let body = body.ok_or_else(|| ModuleError::BadRequest("missing body".into()))?;
                let calls = parse_relay_calls(channel, &body)?;
                if !enhanced && !is_trivial(&calls) {
                    return Err(ModuleError::BadRequest(
                        "non-native request on native endpoint".into(),
                    ));
                }
                if is_trivial(&calls) {
                    // A single immediate entry is acted on directly rather
                    // than round-tripped through the scheduler, cancelling
                    // whatever else was pending.
                    let step = calls[0].payload;
                    let message = match step.status {
                        RelayStepStatus::Switch(on) => Message::SwitchRelay(SwitchRelay { relay: channel, on }),
                        RelayStepStatus::Timer(delay_time) => {
                            Message::StartRelayTimer(StartRelayTimer { relay: channel, delay_time })
                        }
                    };
                    ctx.bus.inject(&VelbusFrame::new(ctx.address, message)).await?;
                    self.e_relay.set(vec![]).await;
                } else {
                    self.e_relay.set(calls).await;
                }
                Ok(HttpResponse::ok(json!({"ok": true})))
            }
            _ => Err(ModuleError::NotFound {
                method: method.suffix().to_string(),
                path: format!("{channel}/relay"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velbus_proto::message::{DisableInhibitForced, LedStatus};

    fn relay_status(channel: u8, status: RelayState) -> VelbusFrame {
        VelbusFrame::new(
            0x01,
            Message::RelayStatus(velbus_proto::message::RelayStatus {
                relay: channel,
                disable_inhibit_force: DisableInhibitForced::Normal,
                relay_status: status,
                led_status: LedStatus::Off,
                delay_timer: 0,
            }),
        )
    }

    fn pushbutton(just_pressed: [bool; 8], just_released: [bool; 8]) -> VelbusFrame {
        VelbusFrame::new(
            0x01,
            Message::PushButtonStatus(velbus_proto::message::PushButtonStatus {
                just_pressed: just_pressed.to_vec(),
                just_released: just_released.to_vec(),
                long_pressed: vec![false; 8],
            }),
        )
    }

    #[test]
    fn pushbutton_press_and_release_drive_relay() {
        let mut h = Vmb4RynoHandler::new();
        h.message(&relay_status(4, RelayState::Off));

        // channel 4's edge bit lives at index 8-4=4 of the MSB-first bitmap.
        let mut pressed = [false; 8];
        pressed[4] = true;
        let patch = h.message(&pushbutton(pressed, [false; 8]));
        assert_eq!(h.state_value()["4"]["relay"], Value::Bool(true));
        assert!(patch
            .iter()
            .any(|op| op.path == vec!["4".to_string(), "relay".to_string()] && op.value == Some(Value::Bool(true))));

        let mut released = [false; 8];
        released[4] = true;
        h.message(&pushbutton([false; 8], released));
        assert_eq!(h.state_value()["4"]["relay"], Value::Bool(false));
    }

    #[test]
    fn running_timer_suppresses_press_drive() {
        let mut h = Vmb4RynoHandler::new();
        h.message(&relay_status(4, RelayState::IntervalTimer));
        h.message(&VelbusFrame::new(
            0x01,
            Message::RelayStatus(velbus_proto::message::RelayStatus {
                relay: 4,
                disable_inhibit_force: DisableInhibitForced::Normal,
                relay_status: RelayState::IntervalTimer,
                led_status: LedStatus::Off,
                delay_timer: 30,
            }),
        ));
        assert!(h.state_value()["4"]["relay"].is_number());

        let mut pressed = [false; 8];
        pressed[4] = true;
        h.message(&pushbutton(pressed, [false; 8]));
        // press edge must not clobber the pending-timer timestamp
        assert!(h.state_value()["4"]["relay"].is_number());
    }

    #[tokio::test]
    async fn native_relay_endpoint_rejects_a_scheduled_list() {
        let mut h = Vmb4RynoHandler::new();
        let ctx = ModuleContext {
            bus: velbus_bus::BusHandle::new(),
            address: 0x01,
            query_timeout: std::time::Duration::from_millis(50),
        };
        let err = h
            .dispatch_http(
                &ctx,
                HttpMethod::Put,
                &["4".to_string(), "relay".to_string()],
                Some(json!([{"status": true}, {"status": false, "when": 5.0}])),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModuleError::BadRequest(_)));
    }

    #[tokio::test]
    async fn enhanced_endpoint_accepts_and_schedules_a_step_list() {
        let mut h = Vmb4RynoHandler::new();
        let ctx = ModuleContext {
            bus: velbus_bus::BusHandle::new(),
            address: 0x01,
            query_timeout: std::time::Duration::from_millis(50),
        };
        h.dispatch_http(
            &ctx,
            HttpMethod::Put,
            &["4".to_string(), "e_relay".to_string()],
            Some(json!([{"status": true}, {"status": false, "when": 5.0}])),
        )
        .await
        .unwrap();
        assert!(!h.e_relay.is_empty().await);
    }

    #[tokio::test]
    async fn native_relay_endpoint_injects_a_trivial_switch_directly() {
        let bus = velbus_bus::BusHandle::new();
        let received = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let _guard = bus
            .subscribe(Box::new(move |f: &VelbusFrame| {
                if let Message::SwitchRelay(m) = &f.message {
                    received_clone.lock().unwrap().push(m.on);
                }
            }))
            .await;

        let mut h = Vmb4RynoHandler::new();
        let ctx = ModuleContext {
            bus,
            address: 0x01,
            query_timeout: std::time::Duration::from_millis(50),
        };
        h.dispatch_http(&ctx, HttpMethod::Put, &["4".to_string(), "relay".to_string()], Some(json!(true)))
            .await
            .unwrap();
        assert_eq!(*received.lock().unwrap(), vec![true]);
    }
}
