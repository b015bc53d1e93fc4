//! `ModuleType`'s inner payload: identifies the hardware family and
//! carries per-family attributes (serial, build date, blind timeouts…).
//! Resolved by the same trial-parse dispatch pattern as the outer frame.

use velbus_wire::bitio::{BitReader, BitWriter};
use velbus_wire::fields;
use velbus_wire::BlindTimeout;

use crate::error::{DecodeError, Result};

macro_rules! module_type_byte {
    ($w:expr, $code:expr) => {
        $w.push_bits($code as u64, 8);
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vmb4ryno {
    pub serial: u16,
    pub memory_map_version: u8,
    pub build_year: u8,
    pub build_week: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vmb2Bl {
    pub timeout_blind2: BlindTimeout,
    pub timeout_blind1: BlindTimeout,
    pub build_year: u8,
    pub build_week: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vmb2Ble {
    pub serial: u16,
    pub memory_map_version: u8,
    pub build_year: u8,
    pub build_week: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vmb4Dc {
    pub serial: u16,
    pub memory_map_version: u8,
    pub build_year: u8,
    pub build_week: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vmb6In {
    pub leds_on: Vec<bool>,
    pub leds_slow_blink: Vec<bool>,
    pub leds_fast_blink: Vec<bool>,
    pub build_year: u8,
    pub build_week: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vmb1Ts {
    pub zone_number: u8,
    pub build_year: u8,
    pub build_week: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vmbgpod {
    pub serial: u16,
    pub memory_map_version: u8,
    pub build_year: u8,
    pub build_week: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VmbDali {
    pub serial: u16,
    pub memory_map_version: u8,
    pub build_year: u8,
    pub build_week: u8,
    pub terminator: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModuleInfo {
    Vmb4ryno(Vmb4ryno),
    Vmb2Bl(Vmb2Bl),
    /// Also instantiated for VMB1BLS; the original source has no
    /// distinct VMB1BLS ModuleType code in the retrieved pack, so both
    /// share this ModuleInfo variant (see DESIGN.md).
    Vmb2Ble(Vmb2Ble),
    Vmb4Dc(Vmb4Dc),
    Vmb6In(Vmb6In),
    Vmb1Ts(Vmb1Ts),
    /// Also covers VMBGPO for the same reason as VMB1BLS above.
    Vmbgpod(Vmbgpod),
    VmbDali(VmbDali),
    Unknown(UnknownModuleInfo),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnknownModuleInfo {
    pub data: Vec<u8>,
}

impl ModuleInfo {
    pub const VMB4RYNO: u8 = 0x11;
    pub const VMB2BL: u8 = 0x09;
    pub const VMB2BLE: u8 = 0x1d;
    pub const VMB4DC: u8 = 0x12;
    pub const VMB6IN: u8 = 0x05;
    pub const VMB1TS: u8 = 0x0c;
    pub const VMBGPOD: u8 = 0x28;
    pub const VMBDALI: u8 = 0x45;

    pub fn module_type_code(&self) -> u8 {
        match self {
            ModuleInfo::Vmb4ryno(_) => Self::VMB4RYNO,
            ModuleInfo::Vmb2Bl(_) => Self::VMB2BL,
            ModuleInfo::Vmb2Ble(_) => Self::VMB2BLE,
            ModuleInfo::Vmb4Dc(_) => Self::VMB4DC,
            ModuleInfo::Vmb6In(_) => Self::VMB6IN,
            ModuleInfo::Vmb1Ts(_) => Self::VMB1TS,
            ModuleInfo::Vmbgpod(_) => Self::VMBGPOD,
            ModuleInfo::VmbDali(_) => Self::VMBDALI,
            ModuleInfo::Unknown(_) => 0,
        }
    }

    /// Trial-parse dispatch over the candidate decoders registered for
    /// `data[0]`. Falls back to `UnknownModuleInfo` carrying the raw
    /// bytes on exhaustion, mirroring the frame-level fallback.
    pub fn from_bytes(data: &[u8]) -> Self {
        if data.is_empty() {
            return ModuleInfo::Unknown(UnknownModuleInfo { data: data.to_vec() });
        }
        let candidates: &[fn(&[u8]) -> Result<ModuleInfo>] = match data[0] {
            Self::VMB4RYNO => &[decode_vmb4ryno],
            Self::VMB2BL => &[decode_vmb2bl],
            Self::VMB2BLE => &[decode_vmb2ble],
            Self::VMB4DC => &[decode_vmb4dc],
            Self::VMB6IN => &[decode_vmb6in],
            Self::VMB1TS => &[decode_vmb1ts],
            Self::VMBGPOD => &[decode_vmbgpod],
            Self::VMBDALI => &[decode_vmbdali],
            _ => &[],
        };
        for candidate in candidates {
            if let Ok(info) = candidate(data) {
                return info;
            }
        }
        ModuleInfo::Unknown(UnknownModuleInfo { data: data.to_vec() })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        match self {
            ModuleInfo::Unknown(u) => return u.data.clone(),
            ModuleInfo::Vmb4ryno(m) => {
                module_type_byte!(w, Self::VMB4RYNO);
                w.push_bits(m.serial as u64, 16);
                w.push_bits(m.memory_map_version as u64, 8);
                w.push_bits(m.build_year as u64, 8);
                w.push_bits(m.build_week as u64, 8);
            }
            ModuleInfo::Vmb2Bl(m) => {
                module_type_byte!(w, Self::VMB2BL);
                w.push_bits(0, 4);
                fields::encode_blind_timeout(&mut w, m.timeout_blind2);
                fields::encode_blind_timeout(&mut w, m.timeout_blind1);
                w.push_bits(m.build_year as u64, 8);
                w.push_bits(m.build_week as u64, 8);
            }
            ModuleInfo::Vmb2Ble(m) => {
                module_type_byte!(w, Self::VMB2BLE);
                w.push_bits(m.serial as u64, 16);
                w.push_bits(m.memory_map_version as u64, 8);
                w.push_bits(m.build_year as u64, 8);
                w.push_bits(m.build_week as u64, 8);
            }
            ModuleInfo::Vmb4Dc(m) => {
                module_type_byte!(w, Self::VMB4DC);
                w.push_bits(m.serial as u64, 16);
                w.push_bits(m.memory_map_version as u64, 8);
                w.push_bits(m.build_year as u64, 8);
                w.push_bits(m.build_week as u64, 8);
            }
            ModuleInfo::Vmb6In(m) => {
                module_type_byte!(w, Self::VMB6IN);
                fields::encode_bitmap(&mut w, 8, &m.leds_on).ok();
                fields::encode_bitmap(&mut w, 8, &m.leds_slow_blink).ok();
                fields::encode_bitmap(&mut w, 8, &m.leds_fast_blink).ok();
                w.push_bits(m.build_year as u64, 8);
                w.push_bits(m.build_week as u64, 8);
            }
            ModuleInfo::Vmb1Ts(m) => {
                module_type_byte!(w, Self::VMB1TS);
                w.push_bits(m.zone_number as u64, 8);
                w.push_bits(m.build_year as u64, 8);
                w.push_bits(m.build_week as u64, 8);
            }
            ModuleInfo::Vmbgpod(m) => {
                module_type_byte!(w, Self::VMBGPOD);
                w.push_bits(m.serial as u64, 16);
                w.push_bits(m.memory_map_version as u64, 8);
                w.push_bits(m.build_year as u64, 8);
                w.push_bits(m.build_week as u64, 8);
            }
            ModuleInfo::VmbDali(m) => {
                module_type_byte!(w, Self::VMBDALI);
                w.push_bits(m.serial as u64, 16);
                w.push_bits(m.memory_map_version as u64, 8);
                w.push_bits(m.build_year as u64, 8);
                w.push_bits(m.build_week as u64, 8);
                w.push_bits(m.terminator as u64, 8);
            }
        }
        w.finish().expect("module info schema is byte-aligned by construction")
    }
}

fn decode_vmb4ryno(data: &[u8]) -> Result<ModuleInfo> {
    let mut r = BitReader::new(data);
    r.read_bits(8)?;
    let serial = r.read_bits(16)? as u16;
    let memory_map_version = r.read_bits(8)? as u8;
    let build_year = r.read_bits(8)? as u8;
    let build_week = r.read_bits(8)? as u8;
    r.finish().map_err(DecodeError::from)?;
    Ok(ModuleInfo::Vmb4ryno(Vmb4ryno {
        serial,
        memory_map_version,
        build_year,
        build_week,
    }))
}

fn decode_vmb2bl(data: &[u8]) -> Result<ModuleInfo> {
    let mut r = BitReader::new(data);
    r.read_bits(8)?;
    r.read_bits(4)?;
    let timeout_blind2 = fields::decode_blind_timeout(&mut r)?;
    let timeout_blind1 = fields::decode_blind_timeout(&mut r)?;
    let build_year = r.read_bits(8)? as u8;
    let build_week = r.read_bits(8)? as u8;
    r.finish().map_err(DecodeError::from)?;
    Ok(ModuleInfo::Vmb2Bl(Vmb2Bl {
        timeout_blind2,
        timeout_blind1,
        build_year,
        build_week,
    }))
}

fn decode_vmb2ble(data: &[u8]) -> Result<ModuleInfo> {
    let mut r = BitReader::new(data);
    r.read_bits(8)?;
    let serial = r.read_bits(16)? as u16;
    let memory_map_version = r.read_bits(8)? as u8;
    let build_year = r.read_bits(8)? as u8;
    let build_week = r.read_bits(8)? as u8;
    r.finish().map_err(DecodeError::from)?;
    Ok(ModuleInfo::Vmb2Ble(Vmb2Ble {
        serial,
        memory_map_version,
        build_year,
        build_week,
    }))
}

fn decode_vmb4dc(data: &[u8]) -> Result<ModuleInfo> {
    let mut r = BitReader::new(data);
    r.read_bits(8)?;
    let serial = r.read_bits(16)? as u16;
    let memory_map_version = r.read_bits(8)? as u8;
    let build_year = r.read_bits(8)? as u8;
    let build_week = r.read_bits(8)? as u8;
    r.finish().map_err(DecodeError::from)?;
    Ok(ModuleInfo::Vmb4Dc(Vmb4Dc {
        serial,
        memory_map_version,
        build_year,
        build_week,
    }))
}

fn decode_vmb6in(data: &[u8]) -> Result<ModuleInfo> {
    let mut r = BitReader::new(data);
    r.read_bits(8)?;
    let leds_on = fields::decode_bitmap(&mut r, 8)?;
    let leds_slow_blink = fields::decode_bitmap(&mut r, 8)?;
    let leds_fast_blink = fields::decode_bitmap(&mut r, 8)?;
    let build_year = r.read_bits(8)? as u8;
    let build_week = r.read_bits(8)? as u8;
    r.finish().map_err(DecodeError::from)?;
    Ok(ModuleInfo::Vmb6In(Vmb6In {
        leds_on,
        leds_slow_blink,
        leds_fast_blink,
        build_year,
        build_week,
    }))
}

fn decode_vmb1ts(data: &[u8]) -> Result<ModuleInfo> {
    let mut r = BitReader::new(data);
    r.read_bits(8)?;
    let zone_number = r.read_bits(8)? as u8;
    let build_year = r.read_bits(8)? as u8;
    let build_week = r.read_bits(8)? as u8;
    r.finish().map_err(DecodeError::from)?;
    Ok(ModuleInfo::Vmb1Ts(Vmb1Ts {
        zone_number,
        build_year,
        build_week,
    }))
}

fn decode_vmbgpod(data: &[u8]) -> Result<ModuleInfo> {
    let mut r = BitReader::new(data);
    r.read_bits(8)?;
    let serial = r.read_bits(16)? as u16;
    let memory_map_version = r.read_bits(8)? as u8;
    let build_year = r.read_bits(8)? as u8;
    let build_week = r.read_bits(8)? as u8;
    r.finish().map_err(DecodeError::from)?;
    Ok(ModuleInfo::Vmbgpod(Vmbgpod {
        serial,
        memory_map_version,
        build_year,
        build_week,
    }))
}

fn decode_vmbdali(data: &[u8]) -> Result<ModuleInfo> {
    let mut r = BitReader::new(data);
    r.read_bits(8)?;
    let serial = r.read_bits(16)? as u16;
    let memory_map_version = r.read_bits(8)? as u8;
    let build_year = r.read_bits(8)? as u8;
    let build_week = r.read_bits(8)? as u8;
    let terminator = r.read_bits(8)? as u8;
    r.finish().map_err(DecodeError::from)?;
    Ok(ModuleInfo::VmbDali(VmbDali {
        serial,
        memory_map_version,
        build_year,
        build_week,
        terminator,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_module_envelope_scenario() {
        // Scenario 1's frame is 0f fb 73 07 ff ff 8b a4 01 16 12 26 04;
        // the ModuleType opcode (0xff) and its payload are the last six
        // bytes before the checksum/tail. Module type byte 0x8b is
        // unregistered, so the payload falls back to Unknown.
        let data = [0xffu8, 0x8b, 0xa4, 0x01, 0x16, 0x12];
        let payload = &data[1..];
        let info = ModuleInfo::from_bytes(payload);
        assert_eq!(
            info,
            ModuleInfo::Unknown(UnknownModuleInfo { data: payload.to_vec() })
        );
        assert_eq!(info.to_bytes(), payload.to_vec());
    }

    #[test]
    fn vmb4ryno_round_trip() {
        let info = ModuleInfo::Vmb4ryno(Vmb4ryno {
            serial: 0x1234,
            memory_map_version: 1,
            build_year: 24,
            build_week: 9,
        });
        let bytes = info.to_bytes();
        let decoded = ModuleInfo::from_bytes(&bytes);
        assert_eq!(decoded, info);
    }
}
