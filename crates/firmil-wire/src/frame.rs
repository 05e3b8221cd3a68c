//! Outbound frames
//!
//! ```text
//! IL frame     F0 7B 7F cmd seq payload... F7
//! sysex frame  F0 id payload... F7
//! message      cmd data...                    (plain Firmata, no framing)
//! ```

use std::fmt;

use crate::command::ExecutorCommand;
use crate::error::{WireError, WireResult};
use crate::packing;

/// Start of a sysex frame
pub const FRAME_START: u8 = 0xF0;
/// End of a sysex frame
pub const FRAME_END: u8 = 0xF7;
/// Sysex sub-command for scheduler and IL data
pub const SCHEDULER_DATA: u8 = 0x7B;
/// Group tag selecting the IL command family
pub const GROUP_TAG: u8 = 0x7F;
/// Bytes before the payload of an IL frame, including the sequence number
pub const IL_HEADER_LEN: usize = 5;
/// Message size assumed until the device reports its own
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64;

/// Standard Firmata command and sysex identifiers
pub mod firmata {
    /// Digital port report, low nibble is the port
    pub const DIGITAL_MESSAGE: u8 = 0x90;
    /// Analog channel report, low nibble is the channel
    pub const ANALOG_MESSAGE: u8 = 0xE0;
    /// Enable analog reporting
    pub const REPORT_ANALOG_PIN: u8 = 0xC0;
    /// Enable digital reporting
    pub const REPORT_DIGITAL_PIN: u8 = 0xD0;
    /// Set a pin mode
    pub const SET_PIN_MODE: u8 = 0xF4;
    /// Set a single digital pin
    pub const SET_DIGITAL_VALUE: u8 = 0xF5;
    /// Protocol version report
    pub const PROTOCOL_VERSION: u8 = 0xF9;
    /// Reset the board
    pub const SYSTEM_RESET: u8 = 0xFF;
    /// System variable query or update
    pub const SYSTEM_VARIABLE: u8 = 0x63;
    /// Capability query
    pub const CAPABILITY_QUERY: u8 = 0x6B;
    /// Capability response
    pub const CAPABILITY_RESPONSE: u8 = 0x6C;
    /// Pin state query
    pub const PIN_STATE_QUERY: u8 = 0x6D;
    /// Pin state response
    pub const PIN_STATE_RESPONSE: u8 = 0x6E;
    /// Text sent as two 7-bit bytes per character byte
    pub const STRING_DATA: u8 = 0x71;
    /// Firmware name and version
    pub const REPORT_FIRMWARE: u8 = 0x79;
}

/// What a frame carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Scheduler IL command with its sequence number
    Il {
        /// Command code
        command: ExecutorCommand,
        /// 7-bit sequence number echoed by the acknowledgement
        sequence: u8,
    },
    /// Other sysex request
    Sysex(u8),
    /// Plain Firmata message
    Message(u8),
}

/// Immutable encoded frame
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    bytes: Vec<u8>,
}

impl Frame {
    /// What this frame carries
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// IL command, if this is an IL frame
    pub fn command(&self) -> Option<ExecutorCommand> {
        match self.kind {
            FrameKind::Il { command, .. } => Some(command),
            _ => None,
        }
    }

    /// Sequence number, if this is an IL frame
    pub fn sequence(&self) -> Option<u8> {
        match self.kind {
            FrameKind::Il { sequence, .. } => Some(sequence),
            _ => None,
        }
    }

    /// Encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encoded length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the frame is empty (never true for a built frame)
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Space-separated upper-case hex
    pub fn to_hex(&self) -> String {
        let parts: Vec<String> = self.bytes.iter().map(|b| format!("{:02X}", b)).collect();
        parts.join(" ")
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:?}, [{}])", self.kind, self.to_hex())
    }
}

/// Incremental frame writer
#[derive(Debug)]
pub struct FrameBuilder {
    kind: FrameKind,
    bytes: Vec<u8>,
    sysex: bool,
}

impl FrameBuilder {
    /// Start an IL command frame
    pub fn il(command: ExecutorCommand, sequence: u8) -> Self {
        let sequence = sequence & 0x7F;
        Self {
            kind: FrameKind::Il { command, sequence },
            bytes: vec![FRAME_START, SCHEDULER_DATA, GROUP_TAG, command.to_byte(), sequence],
            sysex: true,
        }
    }

    /// Start a sysex frame with the given identifier
    pub fn sysex(id: u8) -> Self {
        Self {
            kind: FrameKind::Sysex(id),
            bytes: vec![FRAME_START, id],
            sysex: true,
        }
    }

    /// Start a plain Firmata message
    pub fn message(command: u8) -> Self {
        Self {
            kind: FrameKind::Message(command),
            bytes: vec![command],
            sysex: false,
        }
    }

    /// Append a raw payload byte, which must be 7-bit safe
    pub fn byte(mut self, b: u8) -> WireResult<Self> {
        if b & 0x80 != 0 {
            return Err(WireError::HighBitSet {
                offset: self.bytes.len(),
                byte: b,
            });
        }
        self.bytes.push(b);
        Ok(self)
    }

    /// Append a packed u32
    pub fn u32(mut self, value: u32) -> Self {
        packing::put_u32(&mut self.bytes, value);
        self
    }

    /// Append a packed i32
    pub fn i32(mut self, value: i32) -> Self {
        packing::put_i32(&mut self.bytes, value);
        self
    }

    /// Append a 14-bit value, rejecting values that would be narrowed
    pub fn int14(mut self, field: &'static str, value: u32) -> WireResult<Self> {
        if value > u32::from(packing::INT14_MASK) {
            return Err(WireError::out_of_range(field, value, 14));
        }
        packing::put_int14(&mut self.bytes, value as u16);
        Ok(self)
    }

    /// Append bytes as two 7-bit bytes each
    pub fn two_7bit(mut self, bytes: &[u8]) -> Self {
        packing::put_two_7bit(&mut self.bytes, bytes);
        self
    }

    /// Append bytes as a 7-bit stream
    pub fn stream_7bit(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend(packing::encode_7bit(bytes));
        self
    }

    /// Payload bytes written so far, header included
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing has been written (never true)
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Terminate and check against the maximum message size
    pub fn finish(mut self, max_message_size: usize) -> WireResult<Frame> {
        if self.sysex {
            self.bytes.push(FRAME_END);
        }
        if self.bytes.len() > max_message_size {
            return Err(WireError::MessageTooLarge {
                size: self.bytes.len(),
                max: max_message_size,
            });
        }
        Ok(Frame {
            kind: self.kind,
            bytes: self.bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_il_frame_layout() {
        let frame = FrameBuilder::il(ExecutorCommand::KillTask, 0x85)
            .u32(7)
            .finish(DEFAULT_MAX_MESSAGE_SIZE)
            .unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[0xF0, 0x7B, 0x7F, 0x06, 0x05, 0x07, 0, 0, 0, 0, 0xF7]
        );
        assert_eq!(frame.sequence(), Some(0x05));
        assert_eq!(frame.command(), Some(ExecutorCommand::KillTask));
        assert_eq!(frame.to_hex(), "F0 7B 7F 06 05 07 00 00 00 00 F7");
    }

    #[test]
    fn test_message_has_no_framing() {
        let frame = FrameBuilder::message(firmata::SET_DIGITAL_VALUE)
            .byte(13)
            .and_then(|b| b.byte(1))
            .and_then(|b| b.finish(DEFAULT_MAX_MESSAGE_SIZE))
            .unwrap();
        assert_eq!(frame.as_bytes(), &[0xF5, 13, 1]);
        assert_eq!(frame.command(), None);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let err = FrameBuilder::sysex(0x10)
            .two_7bit(&[0; 40])
            .finish(DEFAULT_MAX_MESSAGE_SIZE)
            .unwrap_err();
        assert!(matches!(err, WireError::MessageTooLarge { size: 83, max: 64 }));
    }

    #[test]
    fn test_payload_byte_must_be_7bit() {
        assert!(FrameBuilder::sysex(0x10).byte(0x80).is_err());
        assert!(
            FrameBuilder::sysex(0x10)
                .int14("size", 0x4000)
                .is_err()
        );
    }
}
