//! VMB2BL: 2-channel V1 blind driver (§4.8, scenario 5). Unlike the V2
//! blinds the module never reports a position directly — only
//! up/down/off and a default timeout — so position is estimated from
//! elapsed movement time, clamped to `0..=100`.

use std::time::Instant;

use serde_json::{json, Value};

use velbus_proto::frame::VelbusFrame;
use velbus_proto::message::{
    BlindStatusKind, Message, SwitchBlindOffV1, SwitchBlindV1,
};
use velbus_state::{JsonPatch, JsonPatchOp, ObservableDict};

use crate::context::ModuleContext;
use crate::error::ModuleError;
use crate::http::{HttpMethod, HttpResponse, HttpResult};

const CHANNELS: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy)]
struct Movement {
    direction: Direction,
    started_at: Instant,
    started_position: u8,
    timeout_secs: u32,
}

#[derive(Debug, Default)]
struct ChannelState {
    position: u8,
    movement: Option<Movement>,
    /// Last default timeout reported in a `BlindStatusV1`, used as the
    /// full-travel time (up or down) for the position travel formula.
    default_timeout_secs: u32,
}

impl ChannelState {
    /// Resolves the current estimated position, finalizing `movement`
    /// into `position` if the timeout has already elapsed.
    fn estimate(&mut self) -> u8 {
        if let Some(m) = self.movement {
            let elapsed = m.started_at.elapsed().as_secs_f64();
            let fraction = (elapsed / m.timeout_secs.max(1) as f64).min(1.0);
            let delta = (fraction * 100.0).round() as i32;
            // position is "percent closed": moving down increases it
            // toward 100, moving up decreases it toward 0 (scenario 5).
            let estimated = match m.direction {
                Direction::Down => m.started_position as i32 + delta,
                Direction::Up => m.started_position as i32 - delta,
            };
            self.position = estimated.clamp(0, 100) as u8;
            if fraction >= 1.0 {
                self.movement = None;
            }
        }
        self.position
    }
}

pub struct Vmb2BlHandler {
    state: ObservableDict,
    channels: [ChannelState; 3], // index 1..=2 used, 0 unused
}

impl Default for Vmb2BlHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Vmb2BlHandler {
    pub fn new() -> Self {
        Vmb2BlHandler {
            state: ObservableDict::new(),
            channels: [ChannelState::default(), ChannelState::default(), ChannelState::default()],
        }
    }

    fn publish(&mut self, channel: u8, status: &str) -> JsonPatch {
        let position = self.channels[channel as usize].estimate();
        let key = channel.to_string();
        let (obj, created) = self.state.entry_object(&key);
        let mut patch: JsonPatch = created.into_iter().collect();
        let status_value = Value::from(status);
        if obj.get("status") != Some(&status_value) {
            obj.insert("status".to_string(), status_value.clone());
            patch.push(JsonPatchOp::add(vec![key.clone(), "status".to_string()], status_value));
        }
        let position_value = Value::from(position);
        if obj.get("position") != Some(&position_value) {
            obj.insert("position".to_string(), position_value.clone());
            patch.push(JsonPatchOp::add(vec![key, "position".to_string()], position_value));
        }
        patch
    }

    pub fn message(&mut self, frame: &VelbusFrame) -> JsonPatch {
        match &frame.message {
            Message::BlindStatusV1(m) => {
                let channel = m.channel;
                if channel == 0 || channel as usize >= self.channels.len() {
                    return JsonPatch::new();
                }
                let timeout_secs = m.default_timeout.to_secs();
                let cs = &mut self.channels[channel as usize];
                cs.default_timeout_secs = timeout_secs;
                match m.blind_status {
                    BlindStatusKind::Off => {
                        cs.estimate();
                        cs.movement = None;
                        self.publish(channel, "off")
                    }
                    BlindStatusKind::Blind1Up | BlindStatusKind::Blind2Up => {
                        let started_position = cs.estimate();
                        cs.movement = Some(Movement {
                            direction: Direction::Up,
                            started_at: Instant::now(),
                            started_position,
                            timeout_secs,
                        });
                        self.publish(channel, "up")
                    }
                    BlindStatusKind::Blind1Down | BlindStatusKind::Blind2Down => {
                        let started_position = cs.estimate();
                        cs.movement = Some(Movement {
                            direction: Direction::Down,
                            started_at: Instant::now(),
                            started_position,
                            timeout_secs,
                        });
                        self.publish(channel, "down")
                    }
                }
            }
            _ => JsonPatch::new(),
        }
    }

    pub fn state_value(&mut self) -> Value {
        for channel in 1..=CHANNELS {
            let status = self
                .state
                .get(&channel.to_string())
                .and_then(|v| v.get("status"))
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(status) = status {
                self.publish(channel, &status);
            }
        }
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
            [channel_str, rest @ ..] if rest.first().map(String::as_str) == Some("position") => {
                let channel: u8 = channel_str
                    .parse()
                    .map_err(|_| ModuleError::BadRequest("channel must be numeric".into()))?;
                if channel < 1 || channel > CHANNELS {
                    return Err(ModuleError::BadRequest("channel out of range".into()));
                }
                self.dispatch_position(ctx, channel, method, body).await
            }
            _ => Err(ModuleError::NotFound {
                method: method.suffix().to_string(),
                path: path.join("/"),
            }),
        }
    }

    async fn dispatch_position(
        &mut self,
        ctx: &ModuleContext,
        channel: u8,
        method: HttpMethod,
        body: Option<Value>,
    ) -> HttpResult {
        match method {
            HttpMethod::Get => {
                self.channels[channel as usize].estimate();
                let key = channel.to_string();
                Ok(HttpResponse::ok(
                    self.state.get(&key).cloned().unwrap_or_else(|| json!({})),
                ))
            }
            HttpMethod::Put => {
                let body = body.ok_or_else(|| ModuleError::BadRequest("missing body".into()))?;
                let request = parse_position_request(&body)?;
                let message = match request {
                    PositionRequest::Up => Message::SwitchBlindV1(SwitchBlindV1 {
                        up: true,
                        channel,
                        timeout: 0,
                    }),
                    PositionRequest::Down => Message::SwitchBlindV1(SwitchBlindV1 {
                        up: false,
                        channel,
                        timeout: 0,
                    }),
                    PositionRequest::Stop => Message::SwitchBlindOffV1(SwitchBlindOffV1 { channel }),
                    PositionRequest::Target(target) => {
                        let cs = &mut self.channels[channel as usize];
                        let current = cs.estimate();
                        if target == current {
                            Message::SwitchBlindOffV1(SwitchBlindOffV1 { channel })
                        } else {
                            let raw = (target as f64 - current as f64) / 100.0
                                * cs.default_timeout_secs as f64;
                            let up = raw < 0.0;
                            let mut travel = raw.abs().round() as u32;
                            if travel == 0 {
                                travel = 1;
                            }
                            Message::SwitchBlindV1(SwitchBlindV1 { up, channel, timeout: travel })
                        }
                    }
                };
                ctx.bus.inject(&VelbusFrame::new(ctx.address, message)).await?;
                Ok(HttpResponse::ok(json!({"ok": true})))
            }
            _ => Err(ModuleError::NotFound {
                method: method.suffix().to_string(),
                path: format!("{channel}/position"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PositionRequest {
    Up,
    Down,
    Stop,
    Target(u8),
}

/// Parses a `PUT /position` body. `"up"`/`"0"` and `"down"`/`"100"` are
/// full-travel shorthands (no travel-time calculation); `"stop"` halts
/// movement; any other integer 0..=100 targets a specific position via
/// the travel-time formula.
fn parse_position_request(body: &Value) -> Result<PositionRequest, ModuleError> {
    match body {
        Value::String(s) => match s.as_str() {
            "up" | "0" => Ok(PositionRequest::Up),
            "down" | "100" => Ok(PositionRequest::Down),
            "stop" => Ok(PositionRequest::Stop),
            other => Err(ModuleError::BadRequest(format!(
                "unknown blind position \"{other}\""
            ))),
        },
        Value::Number(n) => {
            let target = n
                .as_u64()
                .ok_or_else(|| ModuleError::BadRequest("position must be 0..=100".into()))?
                .min(100) as u8;
            Ok(PositionRequest::Target(target))
        }
        _ => Err(ModuleError::BadRequest(
            "expected \"up\"|\"down\"|\"stop\" or an integer 0..=100".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn position_estimation_clamps_and_finalizes() {
        let mut cs = ChannelState { position: 50, movement: None, default_timeout_secs: 15 };
        cs.movement = Some(Movement {
            direction: Direction::Down,
            started_at: Instant::now() - Duration::from_secs(15),
            started_position: 50,
            timeout_secs: 15,
        });
        assert_eq!(cs.estimate(), 100);
        assert!(cs.movement.is_none(), "movement finalizes once the timeout elapses");
    }

    #[test]
    fn position_estimation_partial_movement() {
        let mut cs = ChannelState { position: 100, movement: None, default_timeout_secs: 15 };
        cs.movement = Some(Movement {
            direction: Direction::Up,
            started_at: Instant::now() - Duration::from_secs(3),
            started_position: 100,
            timeout_secs: 15,
        });
        assert_eq!(cs.estimate(), 80);
        assert!(cs.movement.is_some(), "movement is still in progress before the timeout elapses");
    }

    #[test]
    fn off_status_finalizes_without_further_movement() {
        let mut h = Vmb2BlHandler::new();
        h.channels[1].movement = Some(Movement {
            direction: Direction::Down,
            started_at: Instant::now() - Duration::from_secs(20),
            started_position: 0,
            timeout_secs: 15,
        });
        h.message(&VelbusFrame::new(
            0x05,
            Message::BlindStatusV1(velbus_proto::message::BlindStatusV1 {
                channel: 1,
                default_timeout: velbus_proto::message::BlindTimeout::T15Sec,
                blind_status: BlindStatusKind::Off,
                led_status: velbus_proto::message::BlindLedStatusV1::Off,
                delay_time: 0,
            }),
        ));
        assert_eq!(h.state_value()["1"]["position"], Value::from(100));
        assert_eq!(h.state_value()["1"]["status"], Value::from("off"));
    }

    #[tokio::test]
    async fn position_put_computes_travel_time_toward_the_target() {
        let bus = velbus_bus::BusHandle::new();
        let received = Arc::new(Mutex::new(None));
        let received_clone = received.clone();
        let _guard = bus
            .subscribe(Box::new(move |f: &VelbusFrame| {
                if let Message::SwitchBlindV1(m) = &f.message {
                    *received_clone.lock().unwrap() = Some((m.up, m.timeout));
                }
            }))
            .await;

        let mut h = Vmb2BlHandler::new();
        h.channels[1].position = 0;
        h.channels[1].default_timeout_secs = 20;
        let ctx = ModuleContext {
            bus: bus.clone(),
            address: 0x05,
            query_timeout: Duration::from_millis(50),
        };

        h.dispatch_http(
            &ctx,
            HttpMethod::Put,
            &["1".to_string(), "position".to_string()],
            Some(json!(50)),
        )
        .await
        .unwrap();

        // (50 - 0) / 100 * 20 = 10s, moving down.
        assert_eq!(*received.lock().unwrap(), Some((false, 10)));
    }

    #[tokio::test]
    async fn position_put_accepts_stop_and_up_down_shorthands() {
        let mut h = Vmb2BlHandler::new();
        let ctx = ModuleContext {
            bus: velbus_bus::BusHandle::new(),
            address: 0x05,
            query_timeout: Duration::from_millis(50),
        };

        for body in [json!("up"), json!("down"), json!("stop"), json!("0"), json!("100")] {
            h.dispatch_http(
                &ctx,
                HttpMethod::Put,
                &["2".to_string(), "position".to_string()],
                Some(body),
            )
            .await
            .unwrap();
        }
    }
}
