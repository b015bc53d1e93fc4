//! `Message`: the typed payload inside a `VelbusFrame`. Each variant
//! owns a fixed schema of bit-width-typed fields; opcode dispatch tries
//! each candidate decoder registered for a given first payload byte in
//! order, falling back to `UnknownMessage`.

use velbus_wire::bitio::{BitReader, BitWriter};
use velbus_wire::fields;
pub use velbus_wire::BlindTimeout;

use crate::error::{DecodeError, Result};
use crate::moduleinfo::ModuleInfo;

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ModuleTypeRequest(ModuleTypeRequest),
    ModuleType(ModuleType),
    ModuleStatusRequest(ModuleStatusRequest),
    SensorTemperatureRequest(SensorTemperatureRequest),
    RelayStatus(RelayStatus),
    DimmercontrollerStatus(DimmercontrollerStatus),
    BlindStatusV1(BlindStatusV1),
    BlindStatusV2(BlindStatusV2),
    ModuleStatus8Pbu(ModuleStatus8Pbu),
    ModuleStatus6In(ModuleStatus6In),
    TemperatureSensorStatus(TemperatureSensorStatus),
    SensorTemperature(SensorTemperature),
    SensorTemperatureShort(SensorTemperatureShort),
    PushButtonStatus(PushButtonStatus),
    RealTimeClockStatus(RealTimeClockStatus),
    BusActive(BusActive),
    BusOff(BusOff),
    RxBufFull(RxBufFull),
    RxBufReady(RxBufReady),
    InterfaceStatusRequest(InterfaceStatusRequest),
    SwitchRelay(SwitchRelay),
    StartRelayTimer(StartRelayTimer),
    SetDimvalue(SetDimvalue),
    SwitchBlindV1(SwitchBlindV1),
    SwitchBlindV2(SwitchBlindV2),
    SwitchBlindOffV1(SwitchBlindOffV1),
    SwitchBlindOffV2(SwitchBlindOffV2),
    SetBlindPosition(SetBlindPosition),
    ManageLed(ManageLed),
    SensorName12(SensorName12),
    SensorName3(SensorName3),
    DaliDeviceSettingsRequest(DaliDeviceSettingsRequest),
    DaliDeviceSettings(DaliDeviceSettings),
    Unknown(UnknownMessage),
}

impl Message {
    /// Default priority (the envelope's `pp` bits) a sender should use
    /// when it hasn't been told otherwise; carried over from each
    /// message's attrs default in the original source.
    pub fn default_priority(&self) -> u8 {
        use Message::*;
        match self {
            PushButtonStatus(_) | SwitchRelay(_) | StartRelayTimer(_) | SetDimvalue(_)
            | SwitchBlindV1(_) | SwitchBlindV2(_) | SwitchBlindOffV1(_) | SwitchBlindOffV2(_)
            | SetBlindPosition(_) | BusActive(_) | BusOff(_) | RxBufFull(_) | RxBufReady(_)
            | InterfaceStatusRequest(_) | DimmercontrollerStatus(_) => 0,
            _ => 3,
        }
    }

    pub fn is_remote_transmit_request(&self) -> bool {
        matches!(self, Message::ModuleTypeRequest(_))
    }

    /// Encode the payload (opcode byte included where applicable).
    /// Empty for the RTR-with-no-payload `ModuleTypeRequest`.
    pub fn to_bytes(&self) -> Vec<u8> {
        use Message::*;
        match self {
            ModuleTypeRequest(_) => Vec::new(),
            ModuleType(m) => m.to_bytes(),
            ModuleStatusRequest(m) => m.to_bytes(),
            SensorTemperatureRequest(m) => m.to_bytes(),
            RelayStatus(m) => m.to_bytes(),
            DimmercontrollerStatus(m) => m.to_bytes(),
            BlindStatusV1(m) => m.to_bytes(),
            BlindStatusV2(m) => m.to_bytes(),
            ModuleStatus8Pbu(m) => m.to_bytes(),
            ModuleStatus6In(m) => m.to_bytes(),
            TemperatureSensorStatus(m) => m.to_bytes(),
            SensorTemperature(m) => m.to_bytes(),
            SensorTemperatureShort(m) => m.to_bytes(),
            PushButtonStatus(m) => m.to_bytes(),
            RealTimeClockStatus(m) => m.to_bytes(),
            BusActive(m) => m.to_bytes(),
            BusOff(m) => m.to_bytes(),
            RxBufFull(m) => m.to_bytes(),
            RxBufReady(m) => m.to_bytes(),
            InterfaceStatusRequest(m) => m.to_bytes(),
            SwitchRelay(m) => m.to_bytes(),
            StartRelayTimer(m) => m.to_bytes(),
            SetDimvalue(m) => m.to_bytes(),
            SwitchBlindV1(m) => m.to_bytes(),
            SwitchBlindV2(m) => m.to_bytes(),
            SwitchBlindOffV1(m) => m.to_bytes(),
            SwitchBlindOffV2(m) => m.to_bytes(),
            SetBlindPosition(m) => m.to_bytes(),
            ManageLed(m) => m.to_bytes(),
            SensorName12(m) => m.to_bytes(),
            SensorName3(m) => m.to_bytes(),
            DaliDeviceSettingsRequest(m) => m.to_bytes(),
            DaliDeviceSettings(m) => m.to_bytes(),
            Unknown(m) => m.data.clone(),
        }
    }

    /// Trial-parse dispatch: `data` is the full frame payload
    /// (`data[0]` is the opcode). `rtr`/`len==0` is handled by the
    /// caller (`VelbusFrame::from_bytes`) before reaching here.
    pub fn decode(data: &[u8]) -> Message {
        if data.is_empty() {
            return Message::Unknown(UnknownMessage { data: data.to_vec() });
        }
        let candidates: &[fn(&[u8]) -> Result<Message>] = match data[0] {
            0x00 => &[decode_push_button_status],
            0x01 | 0x02 => &[decode_switch_relay],
            0x03 => &[decode_start_relay_timer],
            0x04 => &[decode_switch_blind_off_v1, decode_switch_blind_off_v2],
            0x05 | 0x06 => &[decode_switch_blind_v1, decode_switch_blind_v2],
            0x07 => &[decode_set_dimvalue],
            0x0a => &[decode_bus_active],
            0x0b => &[decode_rx_buf_full],
            0x0c => &[decode_rx_buf_ready],
            0x0e => &[decode_interface_status_request],
            0x1c => &[decode_set_blind_position],
            0xb8 => &[decode_dimmercontroller_status],
            0xd8 => &[decode_real_time_clock_status],
            0xe5 => &[decode_sensor_temperature_request],
            0xe6 => &[decode_sensor_temperature, decode_sensor_temperature_short],
            0xe7 => &[decode_dali_device_settings_request],
            0xe8 => &[decode_dali_device_settings],
            0xea => &[decode_temperature_sensor_status],
            0xec => &[decode_blind_status_v1, decode_blind_status_v2],
            0xed => &[decode_module_status_6in, decode_module_status_8pbu],
            0xf0 | 0xf1 => &[decode_sensor_name12],
            0xf2 => &[decode_sensor_name3],
            0xf5..=0xf9 => &[decode_manage_led],
            0xfa => &[decode_module_status_request],
            0xfb => &[decode_relay_status],
            0xff => &[decode_module_type],
            _ => &[],
        };
        for candidate in candidates {
            if let Ok(msg) = candidate(data) {
                return msg;
            }
        }
        Message::Unknown(UnknownMessage { data: data.to_vec() })
    }
}

fn cmd_byte(r: &mut BitReader, expected: &[u8]) -> Result<u8> {
    let raw = r.read_bits(8)? as u8;
    if expected.contains(&raw) {
        Ok(raw)
    } else {
        Err(DecodeError::Field(velbus_wire::Error::UnknownEnumValue { value: raw as u64 }))
    }
}

fn finish(r: BitReader) -> Result<()> {
    r.finish().map_err(DecodeError::from)
}

// --- ModuleTypeRequest -----------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModuleTypeRequest;

// --- ModuleType --------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleType {
    pub module_info: ModuleInfo,
}

impl ModuleType {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0xffu8];
        out.extend(self.module_info.to_bytes());
        out
    }
}

fn decode_module_type(data: &[u8]) -> Result<Message> {
    if data.len() < 2 {
        return Err(DecodeError::Malformed("ModuleType payload too short"));
    }
    if data[0] != 0xff {
        return Err(DecodeError::Malformed("not a ModuleType opcode"));
    }
    let module_info = ModuleInfo::from_bytes(&data[1..]);
    Ok(Message::ModuleType(ModuleType { module_info }))
}

// --- ModuleStatusRequest ------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleStatusRequest {
    pub channel: u8,
}

impl ModuleStatusRequest {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0xfa, 8);
        w.push_bits(self.channel as u64, 8);
        w.finish().unwrap()
    }
}

fn decode_module_status_request(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0xfa])?;
    let channel = r.read_bits(8)? as u8;
    finish(r)?;
    Ok(Message::ModuleStatusRequest(ModuleStatusRequest { channel }))
}

// --- SensorTemperatureRequest --------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorTemperatureRequest {
    pub auto_send_interval: u8,
}

impl SensorTemperatureRequest {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0xe5, 8);
        w.push_bits(self.auto_send_interval as u64, 8);
        w.finish().unwrap()
    }
}

fn decode_sensor_temperature_request(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0xe5])?;
    let auto_send_interval = r.read_bits(8)? as u8;
    finish(r)?;
    Ok(Message::SensorTemperatureRequest(SensorTemperatureRequest {
        auto_send_interval,
    }))
}

// --- RelayStatus ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableInhibitForced {
    Normal,
    Inhibited,
    ForcedOn,
    Disabled,
}

impl DisableInhibitForced {
    fn from_raw(v: u64) -> Result<Self> {
        Ok(match v {
            0 => Self::Normal,
            1 => Self::Inhibited,
            2 => Self::ForcedOn,
            3 => Self::Disabled,
            other => return Err(velbus_wire::Error::UnknownEnumValue { value: other }.into()),
        })
    }
    fn to_raw(self) -> u64 {
        match self {
            Self::Normal => 0,
            Self::Inhibited => 1,
            Self::ForcedOn => 2,
            Self::Disabled => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedStatus {
    Off,
    On,
    SlowBlink,
    FastBlink,
    VeryFastBlink,
}

impl LedStatus {
    fn from_raw(v: u64) -> Result<Self> {
        Ok(match v {
            0x00 => Self::Off,
            0x80 => Self::On,
            0x40 => Self::SlowBlink,
            0x20 => Self::FastBlink,
            0x10 => Self::VeryFastBlink,
            other => return Err(velbus_wire::Error::UnknownEnumValue { value: other }.into()),
        })
    }
    fn to_raw(self) -> u64 {
        match self {
            Self::Off => 0x00,
            Self::On => 0x80,
            Self::SlowBlink => 0x40,
            Self::FastBlink => 0x20,
            Self::VeryFastBlink => 0x10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Off,
    On,
    IntervalTimer,
}

impl RelayState {
    fn from_raw(v: u64) -> Result<Self> {
        Ok(match v {
            0 => Self::Off,
            1 => Self::On,
            3 => Self::IntervalTimer,
            other => return Err(velbus_wire::Error::UnknownEnumValue { value: other }.into()),
        })
    }
    fn to_raw(self) -> u64 {
        match self {
            Self::Off => 0,
            Self::On => 1,
            Self::IntervalTimer => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStatus {
    pub relay: u8,
    pub disable_inhibit_force: DisableInhibitForced,
    pub relay_status: RelayState,
    pub led_status: LedStatus,
    pub delay_timer: u32,
}

impl RelayStatus {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0xfb, 8);
        fields::encode_index(&mut w, 8, 8, self.relay).unwrap();
        w.push_bits(self.disable_inhibit_force.to_raw(), 8);
        w.push_bits(self.relay_status.to_raw(), 8);
        w.push_bits(self.led_status.to_raw(), 8);
        w.push_bits(self.delay_timer as u64, 24);
        w.finish().unwrap()
    }
}

fn decode_relay_status(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0xfb])?;
    let relay = fields::decode_index(&mut r, 8, 8)?;
    let disable_inhibit_force = DisableInhibitForced::from_raw(r.read_bits(8)?)?;
    let relay_status = RelayState::from_raw(r.read_bits(8)?)?;
    let led_status = LedStatus::from_raw(r.read_bits(8)?)?;
    let delay_timer = r.read_bits(24)? as u32;
    finish(r)?;
    Ok(Message::RelayStatus(RelayStatus {
        relay,
        disable_inhibit_force,
        relay_status,
        led_status,
        delay_timer,
    }))
}

// --- DimmercontrollerStatus ----------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimmercontrollerStatus {
    pub channel: u8,
    pub disable_inhibit_force: DisableInhibitForced,
    pub dimvalue: u8,
    pub led_status: LedStatus,
    pub delay_time: u32,
}

impl DimmercontrollerStatus {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0xb8, 8);
        fields::encode_index(&mut w, 8, 4, self.channel).unwrap();
        w.push_bits(self.disable_inhibit_force.to_raw(), 8);
        w.push_bits(self.dimvalue as u64, 8);
        w.push_bits(self.led_status.to_raw(), 8);
        w.push_bits(self.delay_time as u64, 24);
        w.finish().unwrap()
    }
}

fn decode_dimmercontroller_status(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0xb8])?;
    let channel = fields::decode_index(&mut r, 8, 4)?;
    let disable_inhibit_force = DisableInhibitForced::from_raw(r.read_bits(8)?)?;
    let dimvalue = r.read_bits(8)? as u8;
    let led_status = LedStatus::from_raw(r.read_bits(8)?)?;
    let delay_time = r.read_bits(24)? as u32;
    finish(r)?;
    Ok(Message::DimmercontrollerStatus(DimmercontrollerStatus {
        channel,
        disable_inhibit_force,
        dimvalue,
        led_status,
        delay_time,
    }))
}

// --- BlindStatus V1/V2 -----------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlindStatusKind {
    Off,
    Blind1Up,
    Blind1Down,
    Blind2Up,
    Blind2Down,
}

impl BlindStatusKind {
    fn from_raw(v: u64) -> Result<Self> {
        Ok(match v {
            0 => Self::Off,
            1 => Self::Blind1Up,
            2 => Self::Blind1Down,
            4 => Self::Blind2Up,
            8 => Self::Blind2Down,
            other => return Err(velbus_wire::Error::UnknownEnumValue { value: other }.into()),
        })
    }
    fn to_raw(self) -> u64 {
        match self {
            Self::Off => 0,
            Self::Blind1Up => 1,
            Self::Blind1Down => 2,
            Self::Blind2Up => 4,
            Self::Blind2Down => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlindLedStatusV1 {
    Off,
    DownOn,
    DownSlowBlink,
    DownFastBlink,
    DownVeryFastBlink,
    UpOn,
    UpSlowBlink,
    UpFastBlink,
    UpVeryFastBlink,
}

impl BlindLedStatusV1 {
    fn from_raw(v: u64) -> Result<Self> {
        Ok(match v {
            0x00 => Self::Off,
            0x80 => Self::DownOn,
            0x40 => Self::DownSlowBlink,
            0x20 => Self::DownFastBlink,
            0x10 => Self::DownVeryFastBlink,
            0x08 => Self::UpOn,
            0x04 => Self::UpSlowBlink,
            0x02 => Self::UpFastBlink,
            0x01 => Self::UpVeryFastBlink,
            other => return Err(velbus_wire::Error::UnknownEnumValue { value: other }.into()),
        })
    }
    fn to_raw(self) -> u64 {
        match self {
            Self::Off => 0x00,
            Self::DownOn => 0x80,
            Self::DownSlowBlink => 0x40,
            Self::DownFastBlink => 0x20,
            Self::DownVeryFastBlink => 0x10,
            Self::UpOn => 0x08,
            Self::UpSlowBlink => 0x04,
            Self::UpFastBlink => 0x02,
            Self::UpVeryFastBlink => 0x01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlindStatusV1 {
    pub channel: u8,
    pub default_timeout: BlindTimeout,
    pub blind_status: BlindStatusKind,
    pub led_status: BlindLedStatusV1,
    pub delay_time: u32,
}

impl BlindStatusV1 {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0xec, 8);
        fields::encode_blind_number(&mut w, self.channel).unwrap();
        w.push_bits(0, 6);
        fields::encode_blind_timeout(&mut w, self.default_timeout);
        w.push_bits(self.blind_status.to_raw(), 8);
        w.push_bits(self.led_status.to_raw(), 8);
        w.push_bits(self.delay_time as u64, 24);
        w.finish().unwrap()
    }
}

fn decode_blind_status_v1(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0xec])?;
    let channel = fields::decode_blind_number(&mut r)?;
    let reserved = r.read_bits(6)?;
    let default_timeout = fields::decode_blind_timeout(&mut r)?;
    let _ = reserved;
    let blind_status = BlindStatusKind::from_raw(r.read_bits(8)?)?;
    let led_status = BlindLedStatusV1::from_raw(r.read_bits(8)?)?;
    let delay_time = r.read_bits(24)? as u32;
    finish(r)?;
    Ok(Message::BlindStatusV1(BlindStatusV1 {
        channel,
        default_timeout,
        blind_status,
        led_status,
        delay_time,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlindStatusV2Kind {
    Off,
    Up,
    Down,
}

impl BlindStatusV2Kind {
    fn from_raw(v: u64) -> Result<Self> {
        Ok(match v {
            0 => Self::Off,
            1 => Self::Up,
            2 => Self::Down,
            other => return Err(velbus_wire::Error::UnknownEnumValue { value: other }.into()),
        })
    }
    fn to_raw(self) -> u64 {
        match self {
            Self::Off => 0,
            Self::Up => 1,
            Self::Down => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockedInhibitedForced {
    Normal,
    Inhibited,
    InhibitPresetDown,
    InhibitPresetUp,
    ForcedDown,
    ForcedUp,
    Locked,
}

impl LockedInhibitedForced {
    fn from_raw(v: u64) -> Result<Self> {
        Ok(match v {
            0 => Self::Normal,
            1 => Self::Inhibited,
            2 => Self::InhibitPresetDown,
            3 => Self::InhibitPresetUp,
            4 => Self::ForcedDown,
            5 => Self::ForcedUp,
            6 => Self::Locked,
            other => return Err(velbus_wire::Error::UnknownEnumValue { value: other }.into()),
        })
    }
    fn to_raw(self) -> u64 {
        match self {
            Self::Normal => 0,
            Self::Inhibited => 1,
            Self::InhibitPresetDown => 2,
            Self::InhibitPresetUp => 3,
            Self::ForcedDown => 4,
            Self::ForcedUp => 5,
            Self::Locked => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoMode {
    Disabled,
    Mode1,
    Mode2,
    Mode3,
}

impl AutoMode {
    fn from_raw(v: u64) -> Result<Self> {
        Ok(match v {
            0 => Self::Disabled,
            1 => Self::Mode1,
            2 => Self::Mode2,
            3 => Self::Mode3,
            other => return Err(velbus_wire::Error::UnknownEnumValue { value: other }.into()),
        })
    }
    fn to_raw(self) -> u64 {
        match self {
            Self::Disabled => 0,
            Self::Mode1 => 1,
            Self::Mode2 => 2,
            Self::Mode3 => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlindStatusV2 {
    pub channel: u8,
    pub default_timeout: u8,
    pub blind_status: BlindStatusV2Kind,
    pub led_status: BlindLedStatusV1,
    pub blind_position: u8,
    pub locked_inhibited_forced: LockedInhibitedForced,
    pub sunset_enabled: bool,
    pub sunrise_enabled: bool,
    pub alarm2_global: bool,
    pub alarm2_on: bool,
    pub alarm1_global: bool,
    pub alarm1_on: bool,
    pub auto_mode: AutoMode,
}

impl BlindStatusV2 {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0xec, 8);
        fields::encode_index(&mut w, 8, 2, self.channel).unwrap();
        w.push_bits(self.default_timeout as u64, 8);
        w.push_bits(self.blind_status.to_raw(), 8);
        w.push_bits(self.led_status.to_raw(), 8);
        w.push_bits(self.blind_position as u64, 8);
        w.push_bits(self.locked_inhibited_forced.to_raw(), 8);
        w.push_bits(self.sunset_enabled as u64, 1);
        w.push_bits(self.sunrise_enabled as u64, 1);
        w.push_bits(self.alarm2_global as u64, 1);
        w.push_bits(self.alarm2_on as u64, 1);
        w.push_bits(self.alarm1_global as u64, 1);
        w.push_bits(self.alarm1_on as u64, 1);
        w.push_bits(self.auto_mode.to_raw(), 2);
        w.finish().unwrap()
    }
}

fn decode_blind_status_v2(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0xec])?;
    let channel = fields::decode_index(&mut r, 8, 2)?;
    let default_timeout = r.read_bits(8)? as u8;
    let blind_status = BlindStatusV2Kind::from_raw(r.read_bits(8)?)?;
    let led_status = BlindLedStatusV1::from_raw(r.read_bits(8)?)?;
    let blind_position = r.read_bits(8)? as u8;
    let locked_inhibited_forced = LockedInhibitedForced::from_raw(r.read_bits(8)?)?;
    let sunset_enabled = r.read_bits(1)? == 1;
    let sunrise_enabled = r.read_bits(1)? == 1;
    let alarm2_global = r.read_bits(1)? == 1;
    let alarm2_on = r.read_bits(1)? == 1;
    let alarm1_global = r.read_bits(1)? == 1;
    let alarm1_on = r.read_bits(1)? == 1;
    let auto_mode = AutoMode::from_raw(r.read_bits(2)?)?;
    finish(r)?;
    Ok(Message::BlindStatusV2(BlindStatusV2 {
        channel,
        default_timeout,
        blind_status,
        led_status,
        blind_position,
        locked_inhibited_forced,
        sunset_enabled,
        sunrise_enabled,
        alarm2_global,
        alarm2_on,
        alarm1_global,
        alarm1_on,
        auto_mode,
    }))
}

// --- ModuleStatus (8PBU / 6IN) --------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalGlobal {
    Local,
    Global,
}

impl LocalGlobal {
    fn from_raw(v: u64) -> Self {
        if v == 1 {
            Self::Global
        } else {
            Self::Local
        }
    }
    fn to_raw(self) -> u64 {
        matches!(self, Self::Global) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramMode {
    No,
    Summer,
    Winter,
    Holiday,
}

impl ProgramMode {
    fn from_raw(v: u64) -> Result<Self> {
        Ok(match v {
            0 => Self::No,
            1 => Self::Summer,
            2 => Self::Winter,
            3 => Self::Holiday,
            other => return Err(velbus_wire::Error::UnknownEnumValue { value: other }.into()),
        })
    }
    fn to_raw(self) -> u64 {
        match self {
            Self::No => 0,
            Self::Summer => 1,
            Self::Winter => 2,
            Self::Holiday => 3,
        }
    }
}

/// Decoded from the full 7-byte `ModuleStatus` payload (8-channel
/// pushbutton modules). `ModuleStatus6In`, the shorter form, is tried
/// first by the opcode dispatcher and wins on modules that only ever
/// emit the smaller frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleStatus8Pbu {
    pub channel_pressed: Vec<bool>,
    pub channel_enabled: Vec<bool>,
    pub channel_not_inverted: Vec<bool>,
    pub channel_locked: Vec<bool>,
    pub channel_program_disabled: Vec<bool>,
    pub prog_sunset_enabled: bool,
    pub prog_sunrise_enabled: bool,
    pub alarm2: LocalGlobal,
    pub alarm2_enabled: bool,
    pub alarm1: LocalGlobal,
    pub alarm1_enabled: bool,
    pub program: ProgramMode,
}

impl ModuleStatus8Pbu {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0xed, 8);
        fields::encode_bitmap(&mut w, 8, &self.channel_pressed).unwrap();
        fields::encode_bitmap(&mut w, 8, &self.channel_enabled).unwrap();
        fields::encode_bitmap(&mut w, 8, &self.channel_not_inverted).unwrap();
        fields::encode_bitmap(&mut w, 8, &self.channel_locked).unwrap();
        fields::encode_bitmap(&mut w, 8, &self.channel_program_disabled).unwrap();
        w.push_bits(self.prog_sunset_enabled as u64, 1);
        w.push_bits(self.prog_sunrise_enabled as u64, 1);
        w.push_bits(self.alarm2.to_raw(), 1);
        w.push_bits(self.alarm2_enabled as u64, 1);
        w.push_bits(self.alarm1.to_raw(), 1);
        w.push_bits(self.alarm1_enabled as u64, 1);
        w.push_bits(self.program.to_raw(), 2);
        w.finish().unwrap()
    }
}

fn decode_module_status_8pbu(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0xed])?;
    let channel_pressed = fields::decode_bitmap(&mut r, 8)?;
    let channel_enabled = fields::decode_bitmap(&mut r, 8)?;
    let channel_not_inverted = fields::decode_bitmap(&mut r, 8)?;
    let channel_locked = fields::decode_bitmap(&mut r, 8)?;
    let channel_program_disabled = fields::decode_bitmap(&mut r, 8)?;
    let prog_sunset_enabled = r.read_bits(1)? == 1;
    let prog_sunrise_enabled = r.read_bits(1)? == 1;
    let alarm2 = LocalGlobal::from_raw(r.read_bits(1)?);
    let alarm2_enabled = r.read_bits(1)? == 1;
    let alarm1 = LocalGlobal::from_raw(r.read_bits(1)?);
    let alarm1_enabled = r.read_bits(1)? == 1;
    let program = ProgramMode::from_raw(r.read_bits(2)?)?;
    finish(r)?;
    Ok(Message::ModuleStatus8Pbu(ModuleStatus8Pbu {
        channel_pressed,
        channel_enabled,
        channel_not_inverted,
        channel_locked,
        channel_program_disabled,
        prog_sunset_enabled,
        prog_sunrise_enabled,
        alarm2,
        alarm2_enabled,
        alarm1,
        alarm1_enabled,
        program,
    }))
}

/// Shorter `ModuleStatus` form carried by 6-channel input modules: just
/// the per-channel pressed bitmap, read as `input_status`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleStatus6In {
    pub input_status: Vec<bool>,
}

impl ModuleStatus6In {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0xed, 8);
        fields::encode_bitmap(&mut w, 8, &self.input_status).unwrap();
        w.finish().unwrap()
    }
}

fn decode_module_status_6in(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0xed])?;
    let input_status = fields::decode_bitmap(&mut r, 8)?;
    finish(r)?;
    Ok(Message::ModuleStatus6In(ModuleStatus6In { input_status }))
}

// --- TemperatureSensorStatus ----------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterCooler {
    Heater,
    Cooler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureMode {
    Safe,
    Night,
    Day,
    Comfort,
}

impl TemperatureMode {
    fn from_raw(v: u64) -> Result<Self> {
        Ok(match v {
            0 => Self::Safe,
            1 => Self::Night,
            2 => Self::Day,
            4 => Self::Comfort,
            other => return Err(velbus_wire::Error::UnknownEnumValue { value: other }.into()),
        })
    }
    fn to_raw(self) -> u64 {
        match self {
            Self::Safe => 0,
            Self::Night => 1,
            Self::Day => 2,
            Self::Comfort => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    Run,
    Manual,
    SleepTimer,
    Disabled,
}

impl TimerMode {
    fn from_raw(v: u64) -> Result<Self> {
        Ok(match v {
            0 => Self::Run,
            1 => Self::Manual,
            2 => Self::SleepTimer,
            3 => Self::Disabled,
            other => return Err(velbus_wire::Error::UnknownEnumValue { value: other }.into()),
        })
    }
    fn to_raw(self) -> u64 {
        match self {
            Self::Run => 0,
            Self::Manual => 1,
            Self::SleepTimer => 2,
            Self::Disabled => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureSensorStatus {
    pub heater_cooler: HeaterCooler,
    pub temperature_mode: TemperatureMode,
    pub auto_send_temperature_enabled: bool,
    pub timer_mode: TimerMode,
    pub mode_push_button_locked: bool,
    pub all_room_program_present: bool,
    pub program_step_received: TemperatureMode,
    pub zone_program_present: bool,
    pub sensor_program_present: bool,
    pub valve_unjamming_enabled: bool,
    pub pump_unjamming_enabled: bool,
    pub high_alarm: bool,
    pub low_alarm: bool,
    pub heater: bool,
    pub cooler: bool,
    pub comfort_or_day: bool,
    pub boost: bool,
    pub pump: bool,
    pub temperature: f64,
    pub set_temperature: f64,
    pub sleep_timer: u16,
}

impl TemperatureSensorStatus {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0xea, 8);
        w.push_bits(matches!(self.heater_cooler, HeaterCooler::Cooler) as u64, 1);
        w.push_bits(self.temperature_mode.to_raw(), 3);
        w.push_bits(self.auto_send_temperature_enabled as u64, 1);
        w.push_bits(self.timer_mode.to_raw(), 2);
        w.push_bits(self.mode_push_button_locked as u64, 1);
        w.push_bits(self.all_room_program_present as u64, 1);
        w.push_bits(self.program_step_received.to_raw(), 3);
        w.push_bits(self.zone_program_present as u64, 1);
        w.push_bits(self.sensor_program_present as u64, 1);
        w.push_bits(self.valve_unjamming_enabled as u64, 1);
        w.push_bits(self.pump_unjamming_enabled as u64, 1);
        w.push_bits(0, 1);
        w.push_bits(self.high_alarm as u64, 1);
        w.push_bits(self.low_alarm as u64, 1);
        w.push_bits(self.heater as u64, 1);
        w.push_bits(self.cooler as u64, 1);
        w.push_bits(self.comfort_or_day as u64, 1);
        w.push_bits(self.boost as u64, 1);
        w.push_bits(self.pump as u64, 1);
        fields::encode_fixed_point(&mut w, 7, 1, self.temperature).unwrap();
        fields::encode_fixed_point(&mut w, 7, 1, self.set_temperature).unwrap();
        w.push_bits(self.sleep_timer as u64, 16);
        w.finish().unwrap()
    }
}

fn decode_temperature_sensor_status(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0xea])?;
    let heater_cooler = if r.read_bits(1)? == 1 {
        HeaterCooler::Cooler
    } else {
        HeaterCooler::Heater
    };
    let temperature_mode = TemperatureMode::from_raw(r.read_bits(3)?)?;
    let auto_send_temperature_enabled = r.read_bits(1)? == 1;
    let timer_mode = TimerMode::from_raw(r.read_bits(2)?)?;
    let mode_push_button_locked = r.read_bits(1)? == 1;
    let all_room_program_present = r.read_bits(1)? == 1;
    let program_step_received = TemperatureMode::from_raw(r.read_bits(3)?)?;
    let zone_program_present = r.read_bits(1)? == 1;
    let sensor_program_present = r.read_bits(1)? == 1;
    let valve_unjamming_enabled = r.read_bits(1)? == 1;
    let pump_unjamming_enabled = r.read_bits(1)? == 1;
    let _reserved = r.read_bits(1)?;
    let high_alarm = r.read_bits(1)? == 1;
    let low_alarm = r.read_bits(1)? == 1;
    let heater = r.read_bits(1)? == 1;
    let cooler = r.read_bits(1)? == 1;
    let comfort_or_day = r.read_bits(1)? == 1;
    let boost = r.read_bits(1)? == 1;
    let pump = r.read_bits(1)? == 1;
    let temperature = fields::decode_fixed_point(&mut r, 7, 1)?;
    let set_temperature = fields::decode_fixed_point(&mut r, 7, 1)?;
    let sleep_timer = r.read_bits(16)? as u16;
    finish(r)?;
    Ok(Message::TemperatureSensorStatus(TemperatureSensorStatus {
        heater_cooler,
        temperature_mode,
        auto_send_temperature_enabled,
        timer_mode,
        mode_push_button_locked,
        all_room_program_present,
        program_step_received,
        zone_program_present,
        sensor_program_present,
        valve_unjamming_enabled,
        pump_unjamming_enabled,
        high_alarm,
        low_alarm,
        heater,
        cooler,
        comfort_or_day,
        boost,
        pump,
        temperature,
        set_temperature,
        sleep_timer,
    }))
}

// --- SensorTemperature / SensorTemperatureShort ---------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorTemperature {
    pub current_temperature: f64,
    pub minimum_temperature: f64,
    pub maximum_temperature: f64,
}

impl SensorTemperature {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0xe6, 8);
        fields::encode_fixed_point(&mut w, 7, 9, self.current_temperature).unwrap();
        fields::encode_fixed_point(&mut w, 7, 9, self.minimum_temperature).unwrap();
        fields::encode_fixed_point(&mut w, 7, 9, self.maximum_temperature).unwrap();
        w.finish().unwrap()
    }
}

fn decode_sensor_temperature(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0xe6])?;
    let current_temperature = fields::decode_fixed_point(&mut r, 7, 9)?;
    let minimum_temperature = fields::decode_fixed_point(&mut r, 7, 9)?;
    let maximum_temperature = fields::decode_fixed_point(&mut r, 7, 9)?;
    finish(r)?;
    Ok(Message::SensorTemperature(SensorTemperature {
        current_temperature,
        minimum_temperature,
        maximum_temperature,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorTemperatureShort {
    pub current_temperature: f64,
    pub minimum_temperature: f64,
    pub maximum_temperature: f64,
}

impl SensorTemperatureShort {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0xe6, 8);
        fields::encode_fixed_point(&mut w, 7, 1, self.current_temperature).unwrap();
        fields::encode_fixed_point(&mut w, 7, 1, self.minimum_temperature).unwrap();
        fields::encode_fixed_point(&mut w, 7, 1, self.maximum_temperature).unwrap();
        w.finish().unwrap()
    }
}

fn decode_sensor_temperature_short(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0xe6])?;
    let current_temperature = fields::decode_fixed_point(&mut r, 7, 1)?;
    let minimum_temperature = fields::decode_fixed_point(&mut r, 7, 1)?;
    let maximum_temperature = fields::decode_fixed_point(&mut r, 7, 1)?;
    finish(r)?;
    Ok(Message::SensorTemperatureShort(SensorTemperatureShort {
        current_temperature,
        minimum_temperature,
        maximum_temperature,
    }))
}

// --- PushButtonStatus ------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PushButtonStatus {
    pub just_pressed: Vec<bool>,
    pub just_released: Vec<bool>,
    pub long_pressed: Vec<bool>,
}

impl PushButtonStatus {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0x00, 8);
        fields::encode_bitmap(&mut w, 8, &self.just_pressed).unwrap();
        fields::encode_bitmap(&mut w, 8, &self.just_released).unwrap();
        fields::encode_bitmap(&mut w, 8, &self.long_pressed).unwrap();
        w.finish().unwrap()
    }
}

fn decode_push_button_status(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0x00])?;
    let just_pressed = fields::decode_bitmap(&mut r, 8)?;
    let just_released = fields::decode_bitmap(&mut r, 8)?;
    let long_pressed = fields::decode_bitmap(&mut r, 8)?;
    finish(r)?;
    Ok(Message::PushButtonStatus(PushButtonStatus {
        just_pressed,
        just_released,
        long_pressed,
    }))
}

// --- RealTimeClockStatus ---------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    fn from_raw(v: u64) -> Result<Self> {
        Ok(match v {
            0 => Self::Monday,
            1 => Self::Tuesday,
            2 => Self::Wednesday,
            3 => Self::Thursday,
            4 => Self::Friday,
            5 => Self::Saturday,
            6 => Self::Sunday,
            other => return Err(velbus_wire::Error::UnknownEnumValue { value: other }.into()),
        })
    }
    fn to_raw(self) -> u64 {
        match self {
            Self::Monday => 0,
            Self::Tuesday => 1,
            Self::Wednesday => 2,
            Self::Thursday => 3,
            Self::Friday => 4,
            Self::Saturday => 5,
            Self::Sunday => 6,
        }
    }

    /// `chrono::Weekday::num_days_from_monday()`-compatible conversion,
    /// used by `RealTimeClockStatus::now()`.
    pub fn from_days_from_monday(n: u32) -> Self {
        Self::from_raw(n as u64 % 7).expect("n % 7 is always in range")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealTimeClockStatus {
    pub day_of_week: DayOfWeek,
    pub hour: u8,
    pub minute: u8,
}

impl RealTimeClockStatus {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0xd8, 8);
        w.push_bits(self.day_of_week.to_raw(), 8);
        w.push_bits(self.hour as u64, 8);
        w.push_bits(self.minute as u64, 8);
        w.finish().unwrap()
    }

    /// Builds a status frame from the current wall-clock time. Exposed
    /// for a `send_rtc`-style utility; never called automatically.
    pub fn now(now: chrono::DateTime<chrono::Utc>) -> Self {
        use chrono::{Datelike, Timelike};
        RealTimeClockStatus {
            day_of_week: DayOfWeek::from_days_from_monday(now.weekday().num_days_from_monday()),
            hour: now.hour() as u8,
            minute: now.minute() as u8,
        }
    }
}

fn decode_real_time_clock_status(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0xd8])?;
    let day_of_week = DayOfWeek::from_raw(r.read_bits(8)?)?;
    let hour = r.read_bits(8)? as u8;
    let minute = r.read_bits(8)? as u8;
    finish(r)?;
    Ok(Message::RealTimeClockStatus(RealTimeClockStatus {
        day_of_week,
        hour,
        minute,
    }))
}

// --- Bus control markers ----------------------------------------------------

macro_rules! zero_field_message {
    ($name:ident, $opcode:expr, $decode_fn:ident, $variant:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name;

        impl $name {
            fn to_bytes(&self) -> Vec<u8> {
                vec![$opcode]
            }
        }

        fn $decode_fn(data: &[u8]) -> Result<Message> {
            let mut r = BitReader::new(data);
            cmd_byte(&mut r, &[$opcode])?;
            finish(r)?;
            Ok(Message::$variant($name))
        }
    };
}

zero_field_message!(BusActive, 0x0a, decode_bus_active, BusActive);
zero_field_message!(RxBufFull, 0x0b, decode_rx_buf_full, RxBufFull);
zero_field_message!(RxBufReady, 0x0c, decode_rx_buf_ready, RxBufReady);
zero_field_message!(
    InterfaceStatusRequest,
    0x0e,
    decode_interface_status_request,
    InterfaceStatusRequest
);

/// Not carried by any single opcode byte in the original source (the
/// interface signals loss of the physical bus out of band); kept as a
/// first-class variant so the multiplexer's fatal-exit path (§4.3) has
/// a concrete type to match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusOff;

impl BusOff {
    fn to_bytes(&self) -> Vec<u8> {
        Vec::new()
    }
}

// --- Commands ----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchRelay {
    pub relay: u8,
    pub on: bool,
}

impl SwitchRelay {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(if self.on { 0x02 } else { 0x01 }, 8);
        fields::encode_index(&mut w, 8, 8, self.relay).unwrap();
        w.finish().unwrap()
    }
}

fn decode_switch_relay(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    let cmd = cmd_byte(&mut r, &[0x01, 0x02])?;
    let relay = fields::decode_index(&mut r, 8, 8)?;
    finish(r)?;
    Ok(Message::SwitchRelay(SwitchRelay {
        relay,
        on: cmd == 0x02,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRelayTimer {
    pub relay: u8,
    pub delay_time: u32,
}

impl StartRelayTimer {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0x03, 8);
        fields::encode_index(&mut w, 8, 8, self.relay).unwrap();
        w.push_bits(self.delay_time as u64, 24);
        w.finish().unwrap()
    }
}

fn decode_start_relay_timer(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0x03])?;
    let relay = fields::decode_index(&mut r, 8, 8)?;
    let delay_time = r.read_bits(24)? as u32;
    finish(r)?;
    Ok(Message::StartRelayTimer(StartRelayTimer { relay, delay_time }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetDimvalue {
    pub channel: u8,
    pub dimvalue: u8,
    pub dimspeed: u16,
}

impl SetDimvalue {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0x07, 8);
        fields::encode_index(&mut w, 8, 4, self.channel).unwrap();
        w.push_bits(self.dimvalue as u64, 8);
        w.push_bits(self.dimspeed as u64, 16);
        w.finish().unwrap()
    }
}

fn decode_set_dimvalue(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0x07])?;
    let channel = fields::decode_index(&mut r, 8, 4)?;
    let dimvalue = r.read_bits(8)? as u8;
    let dimspeed = r.read_bits(16)? as u16;
    finish(r)?;
    Ok(Message::SetDimvalue(SetDimvalue {
        channel,
        dimvalue,
        dimspeed,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchBlindV1 {
    pub up: bool,
    pub channel: u8,
    pub timeout: u32,
}

impl SwitchBlindV1 {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(if self.up { 0x05 } else { 0x06 }, 8);
        fields::encode_blind_number(&mut w, self.channel).unwrap();
        w.push_bits(self.timeout as u64, 24);
        w.finish().unwrap()
    }
}

fn decode_switch_blind_v1(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    let cmd = cmd_byte(&mut r, &[0x05, 0x06])?;
    let channel = fields::decode_blind_number(&mut r)?;
    let timeout = r.read_bits(24)? as u32;
    finish(r)?;
    Ok(Message::SwitchBlindV1(SwitchBlindV1 {
        up: cmd == 0x05,
        channel,
        timeout,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchBlindV2 {
    pub up: bool,
    pub channel: u8,
    pub timeout: u32,
}

impl SwitchBlindV2 {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(if self.up { 0x05 } else { 0x06 }, 8);
        fields::encode_index(&mut w, 8, 2, self.channel).unwrap();
        w.push_bits(self.timeout as u64, 24);
        w.finish().unwrap()
    }
}

fn decode_switch_blind_v2(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    let cmd = cmd_byte(&mut r, &[0x05, 0x06])?;
    let channel = fields::decode_index(&mut r, 8, 2)?;
    let timeout = r.read_bits(24)? as u32;
    finish(r)?;
    Ok(Message::SwitchBlindV2(SwitchBlindV2 {
        up: cmd == 0x05,
        channel,
        timeout,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchBlindOffV1 {
    pub channel: u8,
}

impl SwitchBlindOffV1 {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0x04, 8);
        fields::encode_blind_number(&mut w, self.channel).unwrap();
        w.finish().unwrap()
    }
}

fn decode_switch_blind_off_v1(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0x04])?;
    let channel = fields::decode_blind_number(&mut r)?;
    finish(r)?;
    Ok(Message::SwitchBlindOffV1(SwitchBlindOffV1 { channel }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchBlindOffV2 {
    pub channel: u8,
}

impl SwitchBlindOffV2 {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0x04, 8);
        fields::encode_index(&mut w, 8, 2, self.channel).unwrap();
        w.finish().unwrap()
    }
}

fn decode_switch_blind_off_v2(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0x04])?;
    let channel = fields::decode_index(&mut r, 8, 2)?;
    finish(r)?;
    Ok(Message::SwitchBlindOffV2(SwitchBlindOffV2 { channel }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetBlindPosition {
    pub channel: u8,
    pub position: u8,
}

impl SetBlindPosition {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0x1c, 8);
        fields::encode_index(&mut w, 8, 2, self.channel).unwrap();
        w.push_bits(self.position as u64, 8);
        w.finish().unwrap()
    }
}

fn decode_set_blind_position(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0x1c])?;
    let channel = fields::decode_index(&mut r, 8, 2)?;
    let position = r.read_bits(8)? as u8;
    finish(r)?;
    Ok(Message::SetBlindPosition(SetBlindPosition { channel, position }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedAction {
    Clear,
    Set,
    SlowBlink,
    FastBlink,
    VeryFastBlink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManageLed {
    pub action: LedAction,
    pub led: u8,
}

impl ManageLed {
    fn opcode(&self) -> u8 {
        match self.action {
            LedAction::Clear => 0xf5,
            LedAction::Set => 0xf6,
            LedAction::SlowBlink => 0xf7,
            LedAction::FastBlink => 0xf8,
            LedAction::VeryFastBlink => 0xf9,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(self.opcode() as u64, 8);
        fields::encode_index(&mut w, 8, 8, self.led).unwrap();
        w.finish().unwrap()
    }
}

fn decode_manage_led(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    let cmd = cmd_byte(&mut r, &[0xf5, 0xf6, 0xf7, 0xf8, 0xf9])?;
    let led = fields::decode_index(&mut r, 8, 8)?;
    finish(r)?;
    let action = match cmd {
        0xf5 => LedAction::Clear,
        0xf6 => LedAction::Set,
        0xf7 => LedAction::SlowBlink,
        0xf8 => LedAction::FastBlink,
        _ => LedAction::VeryFastBlink,
    };
    Ok(Message::ManageLed(ManageLed { action, led }))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorName12 {
    pub part2: bool,
    pub sensor_number: u8,
    pub sensor_name: [u8; 6],
}

impl SensorName12 {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(if self.part2 { 0xf1 } else { 0xf0 }, 8);
        w.push_bits(self.sensor_number as u64, 8);
        w.finish().map(|mut v| {
            v.extend_from_slice(&self.sensor_name);
            v
        }).unwrap()
    }
}

fn decode_sensor_name12(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    let cmd = cmd_byte(&mut r, &[0xf0, 0xf1])?;
    let sensor_number = r.read_bits(8)? as u8;
    let rest = fields::decode_bytes(&mut r, 6)?;
    finish(r)?;
    let mut sensor_name = [0u8; 6];
    sensor_name.copy_from_slice(&rest);
    Ok(Message::SensorName12(SensorName12 {
        part2: cmd == 0xf1,
        sensor_number,
        sensor_name,
    }))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorName3 {
    pub sensor_number: u8,
    pub sensor_name: [u8; 4],
}

impl SensorName3 {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0xf2, 8);
        w.push_bits(self.sensor_number as u64, 8);
        let mut v = w.finish().unwrap();
        v.extend_from_slice(&self.sensor_name);
        v
    }
}

fn decode_sensor_name3(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0xf2])?;
    let sensor_number = r.read_bits(8)? as u8;
    let rest = fields::decode_bytes(&mut r, 4)?;
    finish(r)?;
    let mut sensor_name = [0u8; 4];
    sensor_name.copy_from_slice(&rest);
    Ok(Message::SensorName3(SensorName3 {
        sensor_number,
        sensor_name,
    }))
}

// --- DALI ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaliSettingsSource {
    Cache,
    Device,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaliDeviceSettingsRequest {
    pub channel: u8,
    pub source: DaliSettingsSource,
}

impl DaliDeviceSettingsRequest {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0xe7, 8);
        w.push_bits(self.channel as u64, 8);
        w.push_bits(matches!(self.source, DaliSettingsSource::Device) as u64, 8);
        w.finish().unwrap()
    }
}

fn decode_dali_device_settings_request(data: &[u8]) -> Result<Message> {
    let mut r = BitReader::new(data);
    cmd_byte(&mut r, &[0xe7])?;
    let channel = r.read_bits(8)? as u8;
    let source = if r.read_bits(8)? == 1 {
        DaliSettingsSource::Device
    } else {
        DaliSettingsSource::Cache
    };
    finish(r)?;
    Ok(Message::DaliDeviceSettingsRequest(DaliDeviceSettingsRequest {
        channel,
        source,
    }))
}

/// `setting_value` stays opaque bytes rather than the original's
/// per-setting decoded union — VMBDALI state is deliberately not
/// interpreted beyond pass-through (see SPEC_FULL.md §4.1–4.8).
#[derive(Debug, Clone, PartialEq)]
pub struct DaliDeviceSettings {
    pub channel: u8,
    pub setting: u8,
    pub setting_value: Vec<u8>,
}

impl DaliDeviceSettings {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0xe8u8, self.channel, self.setting];
        out.extend_from_slice(&self.setting_value);
        out
    }
}

fn decode_dali_device_settings(data: &[u8]) -> Result<Message> {
    if data.len() < 4 {
        return Err(DecodeError::Malformed("DaliDeviceSettings payload too short"));
    }
    if data[0] != 0xe8 {
        return Err(DecodeError::Malformed("not a DaliDeviceSettings opcode"));
    }
    Ok(Message::DaliDeviceSettings(DaliDeviceSettings {
        channel: data[1],
        setting: data[2],
        setting_value: data[3..].to_vec(),
    }))
}

// --- UnknownMessage ----------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnknownMessage {
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blind_status_v1_scenario() {
        let data = [0xecu8, 0x0c, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];
        let msg = Message::decode(&data);
        match msg {
            Message::BlindStatusV1(v1) => {
                assert_eq!(v1.channel, 2);
                assert_eq!(v1.default_timeout.to_secs(), 30);
                assert_eq!(v1.blind_status, BlindStatusKind::Off);
                assert_eq!(v1.led_status, BlindLedStatusV1::Off);
                assert_eq!(v1.delay_time, 0);
            }
            other => panic!("expected BlindStatusV1, got {other:?}"),
        }
        assert_eq!(msg.to_bytes(), data.to_vec());
    }

    #[test]
    fn sensor_temperature_scenario() {
        let data = [0xe6u8, 0x00, 0x20, 0xfe, 0x00, 0x02, 0x00];
        let msg = Message::decode(&data);
        match msg {
            Message::SensorTemperature(t) => {
                assert!((t.current_temperature - 0.0625).abs() < 1e-9);
                assert!((t.minimum_temperature - -1.0).abs() < 1e-9);
                assert!((t.maximum_temperature - 1.0).abs() < 1e-9);
            }
            other => panic!("expected SensorTemperature, got {other:?}"),
        }
    }

    #[test]
    fn relay_switch_round_trip() {
        let on = Message::SwitchRelay(SwitchRelay { relay: 3, on: true });
        let bytes = on.to_bytes();
        let decoded = Message::decode(&bytes);
        assert_eq!(decoded, on);
    }

    #[test]
    fn unknown_opcode_falls_back() {
        let data = [0x99u8, 0x01, 0x02];
        let msg = Message::decode(&data);
        assert_eq!(msg, Message::Unknown(UnknownMessage { data: data.to_vec() }));
    }
}
