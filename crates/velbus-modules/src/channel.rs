//! Channel-id extraction for per-channel message routing (§4.7,
//! "Routing"). A frame whose message carries a `channel` attribute is
//! delivered only to that channel's sub-handler; otherwise every
//! channel (and the parent) sees it.

use velbus_proto::message::Message;

/// Returns the 1-based channel a message targets, if it names one.
pub fn parse_channel(message: &Message) -> Option<u8> {
    match message {
        Message::RelayStatus(m) => Some(m.relay),
        Message::DimmercontrollerStatus(m) => Some(m.channel),
        Message::BlindStatusV1(m) => Some(m.channel),
        Message::BlindStatusV2(m) => Some(m.channel),
        Message::SetBlindPosition(m) => Some(m.channel),
        Message::SwitchBlindV1(m) => Some(m.channel),
        Message::SwitchBlindV2(m) => Some(m.channel),
        Message::SwitchBlindOffV1(m) => Some(m.channel),
        Message::SwitchBlindOffV2(m) => Some(m.channel),
        Message::SetDimvalue(m) => Some(m.channel),
        Message::DaliDeviceSettings(m) => Some(m.channel),
        Message::DaliDeviceSettingsRequest(m) => Some(m.channel),
        _ => None,
    }
}
