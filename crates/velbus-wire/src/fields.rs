//! Field-kind codecs: the fixed-bit-width primitive types every message
//! schema is built out of. Each `decode_*` validates on the way in so a
//! caller trying several candidate message types can treat failure as
//! "try the next candidate" rather than a hard error.

use crate::bitio::{BitReader, BitWriter};
use crate::error::{Error, Result};

/// Unsigned integer, range-checked against its bit width.
pub fn decode_uint(r: &mut BitReader, bits: u8) -> Result<u32> {
    Ok(r.read_bits(bits)? as u32)
}

pub fn encode_uint(w: &mut BitWriter, bits: u8, value: u32) -> Result<()> {
    let max = if bits >= 32 { u32::MAX as u64 } else { (1u64 << bits) - 1 };
    if value as u64 > max {
        return Err(Error::OutOfRange {
            value: value as u64,
            bits,
        });
    }
    w.push_bits(value as u64, bits);
    Ok(())
}

/// Signed two's-complement fixed-point: `integer_bits + fractional_bits`
/// raw bits, decoded as `raw / 2^fractional_bits`.
pub fn decode_fixed_point(r: &mut BitReader, integer_bits: u8, fractional_bits: u8) -> Result<f64> {
    let total = integer_bits + fractional_bits;
    let raw = r.read_bits(total)?;
    let signed = sign_extend(raw, total);
    Ok(signed as f64 / (1u64 << fractional_bits) as f64)
}

pub fn encode_fixed_point(
    w: &mut BitWriter,
    integer_bits: u8,
    fractional_bits: u8,
    value: f64,
) -> Result<()> {
    let total = integer_bits + fractional_bits;
    let scaled = (value * (1i64 << fractional_bits) as f64).round() as i64;
    let min = -(1i64 << (total - 1));
    let max = (1i64 << (total - 1)) - 1;
    if scaled < min || scaled > max {
        return Err(Error::OutOfRange {
            value: scaled as u64,
            bits: total,
        });
    }
    let mask = if total >= 64 { u64::MAX } else { (1u64 << total) - 1 };
    w.push_bits(scaled as u64 & mask, total);
    Ok(())
}

fn sign_extend(raw: u64, bits: u8) -> i64 {
    let shift = 64 - bits as u32;
    ((raw << shift) as i64) >> shift
}

/// `Bitmap(bits)`: an ordered sequence of booleans, MSB first — so
/// `bitmap[0]` is the highest-order bit of the field.
pub fn decode_bitmap(r: &mut BitReader, bits: u8) -> Result<Vec<bool>> {
    let raw = r.read_bits(bits)?;
    Ok((0..bits).map(|i| (raw >> (bits - 1 - i)) & 1 == 1).collect())
}

pub fn encode_bitmap(w: &mut BitWriter, bits: u8, values: &[bool]) -> Result<()> {
    debug_assert_eq!(values.len(), bits as usize);
    let mut raw: u64 = 0;
    for &v in values {
        raw = (raw << 1) | v as u64;
    }
    w.push_bits(raw, bits);
    Ok(())
}

/// `Index(bits, max_bits)`: a 1-based index into a `max_bits`-wide
/// one-hot bitmap. Decode requires exactly one set bit.
pub fn decode_index(r: &mut BitReader, bits: u8, max_bits: u8) -> Result<u8> {
    let raw = r.read_bits(bits)?;
    if raw.count_ones() != 1 {
        return Err(Error::NotExactlyOneBitSet { bits: raw });
    }
    let pos = raw.trailing_zeros();
    if pos >= max_bits as u32 {
        return Err(Error::NotExactlyOneBitSet { bits: raw });
    }
    Ok(pos as u8 + 1)
}

pub fn encode_index(w: &mut BitWriter, bits: u8, max_bits: u8, index: u8) -> Result<()> {
    if index == 0 || index > max_bits {
        return Err(Error::OutOfRange {
            value: index as u64,
            bits,
        });
    }
    w.push_bits(1u64 << (index - 1), bits);
    Ok(())
}

/// `BlindNumber`: the byte-level Index variant used by blind messages.
/// Only `0b0011` (channel 1) and `0b1100` (channel 2) are legal.
pub fn decode_blind_number(r: &mut BitReader) -> Result<u8> {
    let raw = r.read_bits(8)? as u8;
    match raw {
        0b0011 => Ok(1),
        0b1100 => Ok(2),
        other => Err(Error::InvalidBlindNumber { byte: other }),
    }
}

pub fn encode_blind_number(w: &mut BitWriter, channel: u8) -> Result<()> {
    let raw = match channel {
        1 => 0b0011u64,
        2 => 0b1100u64,
        other => {
            return Err(Error::OutOfRange {
                value: other as u64,
                bits: 8,
            })
        }
    };
    w.push_bits(raw, 8);
    Ok(())
}

/// `BlindTimeout`: a 2-bit enum mapping to {15s, 30s, 60s, 120s}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlindTimeout {
    T15Sec,
    T30Sec,
    T1Min,
    T2Min,
}

impl BlindTimeout {
    pub fn to_secs(self) -> u32 {
        match self {
            BlindTimeout::T15Sec => 15,
            BlindTimeout::T30Sec => 30,
            BlindTimeout::T1Min => 60,
            BlindTimeout::T2Min => 120,
        }
    }

    fn from_raw(raw: u64) -> Result<Self> {
        match raw {
            0 => Ok(BlindTimeout::T15Sec),
            1 => Ok(BlindTimeout::T30Sec),
            2 => Ok(BlindTimeout::T1Min),
            3 => Ok(BlindTimeout::T2Min),
            other => Err(Error::UnknownEnumValue { value: other }),
        }
    }

    fn to_raw(self) -> u64 {
        match self {
            BlindTimeout::T15Sec => 0,
            BlindTimeout::T30Sec => 1,
            BlindTimeout::T1Min => 2,
            BlindTimeout::T2Min => 3,
        }
    }
}

pub fn decode_blind_timeout(r: &mut BitReader) -> Result<BlindTimeout> {
    BlindTimeout::from_raw(r.read_bits(2)?)
}

pub fn encode_blind_timeout(w: &mut BitWriter, value: BlindTimeout) {
    w.push_bits(value.to_raw(), 2);
}

/// Opaque, byte-aligned field of exactly `n` bytes.
pub fn decode_bytes(r: &mut BitReader, n: usize) -> Result<Vec<u8>> {
    Ok(r.read_bytes(n)?.to_vec())
}

pub fn encode_bytes(w: &mut BitWriter, bytes: &[u8]) {
    w.push_bytes(bytes);
}

/// Decode a `Bytes` field as UTF-8, for JSON export; trailing NULs are
/// trimmed the way the original source pads fixed-width name fields.
pub fn bytes_to_utf8(bytes: &[u8]) -> Result<String> {
    let trimmed: &[u8] = match bytes.iter().position(|&b| b == 0) {
        Some(i) => &bytes[..i],
        None => bytes,
    };
    String::from_utf8(trimmed.to_vec()).map_err(|_| Error::InvalidUtf8)
}

/// Closed-set enum codec: decode fails on any raw value not present in
/// `table`.
pub fn decode_enum<T: Copy>(r: &mut BitReader, bits: u8, table: &[(u64, T)]) -> Result<T> {
    let raw = r.read_bits(bits)?;
    table
        .iter()
        .find(|(k, _)| *k == raw)
        .map(|(_, v)| *v)
        .ok_or(Error::UnknownEnumValue { value: raw })
}

pub fn encode_enum<T: Copy + PartialEq>(
    w: &mut BitWriter,
    bits: u8,
    table: &[(u64, T)],
    value: T,
) -> Result<()> {
    let raw = table
        .iter()
        .find(|(_, v)| *v == value)
        .map(|(k, _)| *k)
        .ok_or(Error::UnknownEnumValue { value: 0 })?;
    w.push_bits(raw, bits);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trip_identity() {
        for k in 1..=5u8 {
            let mut w = BitWriter::new();
            encode_index(&mut w, 5, 5, k).unwrap();
            w.push_bits(0, 3); // pad to a byte boundary
            let bytes = w.finish().unwrap();
            let mut r = BitReader::new(&bytes);
            let decoded = decode_index(&mut r, 5, 5).unwrap();
            assert_eq!(decoded, k);
        }
    }

    #[test]
    fn index_rejects_multi_bit() {
        let mut r = BitReader::new(&[0b11000000]);
        assert!(decode_index(&mut r, 5, 5).is_err());
    }

    #[test]
    fn blind_number_known_values() {
        let mut r = BitReader::new(&[0b0011]);
        assert_eq!(decode_blind_number(&mut r).unwrap(), 1);
        let mut r = BitReader::new(&[0b1100]);
        assert_eq!(decode_blind_number(&mut r).unwrap(), 2);
        let mut r = BitReader::new(&[0b1010]);
        assert!(decode_blind_number(&mut r).is_err());
    }

    #[test]
    fn fixed_point_decode() {
        let mut r = BitReader::new(&[0x00, 0x20]);
        let v = decode_fixed_point(&mut r, 7, 9).unwrap();
        assert!((v - 0.0625).abs() < 1e-9);

        let mut r = BitReader::new(&[0xfe, 0x00]);
        let v = decode_fixed_point(&mut r, 7, 9).unwrap();
        assert!((v - -1.0).abs() < 1e-9);

        let mut r = BitReader::new(&[0x02, 0x00]);
        let v = decode_fixed_point(&mut r, 7, 9).unwrap();
        assert!((v - 1.0).abs() < 1e-9);
    }

    #[test]
    fn blind_timeout_round_trip() {
        for (raw, expect) in [(0, 15u32), (1, 30), (2, 60), (3, 120)] {
            let mut r = BitReader::new(&[(raw as u8) << 6]);
            let t = decode_blind_timeout(&mut r).unwrap();
            assert_eq!(t.to_secs(), expect);
        }
    }
}
