//! The wire envelope around a `Message`:
//! `SOF | 0b111110pp | addr | 0b0rlllll | payload[l] | checksum | EOF`.

use crate::error::{DecodeError, Result};
use crate::message::Message;

pub const SOF: u8 = 0x0f;
pub const EOF: u8 = 0x04;

#[derive(Debug, Clone, PartialEq)]
pub struct VelbusFrame {
    pub address: u8,
    pub priority: u8,
    pub remote_transmit_request: bool,
    pub message: Message,
}

impl VelbusFrame {
    pub fn new(address: u8, message: Message) -> Self {
        let priority = message.default_priority();
        let remote_transmit_request = message.is_remote_transmit_request();
        VelbusFrame {
            address,
            priority,
            remote_transmit_request,
            message,
        }
    }

    /// Parse one frame from the front of `data`. Returns
    /// `(frame, bytes_consumed)`. `DecodeError::Incomplete` means "wait
    /// for more bytes to arrive on the line" — it is never fatal.
    pub fn from_bytes(data: &[u8]) -> Result<(VelbusFrame, usize)> {
        if data.len() < 6 {
            return Err(DecodeError::Incomplete);
        }
        if data[0] != SOF {
            return Err(DecodeError::Malformed("missing start-of-frame byte"));
        }
        let priority_byte = data[1];
        if priority_byte & 0b1111_1100 != 0b1111_1000 {
            return Err(DecodeError::Malformed("bad priority/fixed-bits byte"));
        }
        let priority = priority_byte & 0b0000_0011;
        let address = data[2];
        let length_byte = data[3];
        if length_byte & 0b1000_0000 != 0 {
            return Err(DecodeError::Malformed("reserved length bit set"));
        }
        let remote_transmit_request = (length_byte & 0b0100_0000) != 0;
        let length = (length_byte & 0b0011_1111) as usize;

        let frame_len = 4 + length + 2;
        if data.len() < frame_len {
            return Err(DecodeError::Incomplete);
        }
        let payload = &data[4..4 + length];
        let checksum_byte = data[4 + length];
        let eof_byte = data[4 + length + 1];
        if eof_byte != EOF {
            return Err(DecodeError::Malformed("missing end-of-frame byte"));
        }
        let expected = checksum(&data[..4 + length]);
        if checksum_byte != expected {
            return Err(DecodeError::ChecksumMismatch {
                got: checksum_byte,
                expected,
            });
        }

        let message = if remote_transmit_request && length == 0 {
            Message::ModuleTypeRequest(crate::message::ModuleTypeRequest)
        } else {
            Message::decode(payload)
        };

        Ok((
            VelbusFrame {
                address,
                priority,
                remote_transmit_request,
                message,
            },
            frame_len,
        ))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = self.message.to_bytes();
        let length = payload.len() as u8;
        debug_assert!(length <= 0x3f, "payload too long to encode in 6 length bits");
        let mut head = vec![
            SOF,
            0b1111_1000 | (self.priority & 0b11),
            self.address,
            (if self.remote_transmit_request { 0b0100_0000 } else { 0 }) | length,
        ];
        head.extend_from_slice(&payload);
        let sum = checksum(&head);
        head.push(sum);
        head.push(EOF);
        head
    }
}

/// Two's-complement negation mod 256 of every byte preceding the
/// checksum (SOF through the last payload byte).
fn checksum(bytes: &[u8]) -> u8 {
    let sum: u8 = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    (!sum).wrapping_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ModuleTypeRequest, SwitchRelay};

    #[test]
    fn round_trip_switch_relay() {
        let frame = VelbusFrame::new(0x01, Message::SwitchRelay(SwitchRelay { relay: 1, on: true }));
        let bytes = frame.to_bytes();
        let (decoded, consumed) = VelbusFrame::from_bytes(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, frame);
    }

    #[test]
    fn incomplete_on_short_buffer() {
        let err = VelbusFrame::from_bytes(&[0x0f, 0x00]).unwrap_err();
        assert_eq!(err, DecodeError::Incomplete);
    }

    #[test]
    fn checksum_mismatch_detected() {
        let frame = VelbusFrame::new(0x01, Message::SwitchRelay(SwitchRelay { relay: 1, on: true }));
        let mut bytes = frame.to_bytes();
        let last_payload_idx = bytes.len() - 2;
        bytes[last_payload_idx] ^= 0xff;
        let err = VelbusFrame::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::ChecksumMismatch { .. }));
    }

    #[test]
    fn module_type_request_rtr_empty_payload() {
        let frame = VelbusFrame::new(0x05, Message::ModuleTypeRequest(ModuleTypeRequest));
        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), 6);
        let (decoded, consumed) = VelbusFrame::from_bytes(&bytes).unwrap();
        assert_eq!(consumed, 6);
        assert!(decoded.remote_transmit_request);
        assert_eq!(decoded.message, Message::ModuleTypeRequest(ModuleTypeRequest));
    }
}
