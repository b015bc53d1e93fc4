//! VMB6IN: 6-channel input module. Read-only — inputs are driven by
//! whatever is wired to the module, not by HTTP PUT.

use serde_json::Value;

use velbus_proto::frame::VelbusFrame;
use velbus_proto::message::Message;
use velbus_state::{JsonPatch, JsonPatchOp, ObservableDict};

use crate::context::{pushbutton_bit, ModuleContext};
use crate::error::ModuleError;
use crate::http::{HttpMethod, HttpResponse, HttpResult};

const CHANNELS: u8 = 6;

#[derive(Debug, Default)]
pub struct Vmb6InHandler {
    state: ObservableDict,
}

impl Vmb6InHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_input(&mut self, channel: u8, value: bool) -> JsonPatch {
        let key = channel.to_string();
        let (obj, created) = self.state.entry_object(&key);
        let mut patch: JsonPatch = created.into_iter().collect();
        let value = Value::Bool(value);
        if obj.get("input") != Some(&value) {
            obj.insert("input".to_string(), value.clone());
            patch.push(JsonPatchOp::add(vec![key, "input".to_string()], value));
        }
        patch
    }

    pub fn message(&mut self, frame: &VelbusFrame) -> JsonPatch {
        match &frame.message {
            Message::ModuleStatus6In(m) => {
                let mut patch = JsonPatch::new();
                for channel in 1..=CHANNELS {
                    patch.extend(self.set_input(channel, pushbutton_bit(&m.input_status, channel)));
                }
                patch
            }
            Message::PushButtonStatus(m) => {
                let mut patch = JsonPatch::new();
                for channel in 1..=CHANNELS {
                    if pushbutton_bit(&m.just_pressed, channel) {
                        patch.extend(self.set_input(channel, true));
                    }
                    if pushbutton_bit(&m.just_released, channel) {
                        patch.extend(self.set_input(channel, false));
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
        _ctx: &ModuleContext,
        method: HttpMethod,
        path: &[String],
        _body: Option<Value>,
    ) -> HttpResult {
        match (method, path) {
            (HttpMethod::Get, [channel_str, rest]) if rest == "input" => {
                let channel: u8 = channel_str
                    .parse()
                    .map_err(|_| ModuleError::BadRequest("channel must be numeric".into()))?;
                let key = channel.to_string();
                Ok(HttpResponse::ok(
                    self.state
                        .get(&key)
                        .and_then(|v| v.get("input"))
                        .cloned()
                        .unwrap_or(Value::Bool(false)),
                ))
            }
            _ => Err(ModuleError::NotFound {
                method: method.suffix().to_string(),
                path: path.join("/"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velbus_proto::message::{ModuleStatus6In, PushButtonStatus};

    fn bits_for(channel: u8) -> Vec<bool> {
        let mut bits = vec![false; 8];
        bits[8 - channel as usize] = true;
        bits
    }

    #[test]
    fn module_status_sets_all_six_inputs() {
        let mut h = Vmb6InHandler::new();
        let input_status = bits_for(3);
        h.message(&VelbusFrame::new(0x09, Message::ModuleStatus6In(ModuleStatus6In { input_status })));
        assert_eq!(h.state_value()["3"]["input"], Value::Bool(true));
        assert_eq!(h.state_value()["1"]["input"], Value::Bool(false));
    }

    #[test]
    fn pushbutton_edges_set_and_clear_input() {
        let mut h = Vmb6InHandler::new();
        h.message(&VelbusFrame::new(
            0x09,
            Message::PushButtonStatus(PushButtonStatus {
                just_pressed: bits_for(2),
                just_released: vec![false; 8],
                long_pressed: vec![false; 8],
            }),
        ));
        assert_eq!(h.state_value()["2"]["input"], Value::Bool(true));

        h.message(&VelbusFrame::new(
            0x09,
            Message::PushButtonStatus(PushButtonStatus {
                just_pressed: vec![false; 8],
                just_released: bits_for(2),
                long_pressed: vec![false; 8],
            }),
        ));
        assert_eq!(h.state_value()["2"]["input"], Value::Bool(false));
    }
}
