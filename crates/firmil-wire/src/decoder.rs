//! Streaming inbound decoder
//!
//! Bytes arrive in arbitrary chunks. The decoder classifies them into sysex
//! replies, plain Firmata reports and free-running diagnostic text, and never
//! emits a partial frame:
//!
//! - a frame start inside a frame discards the buffered bytes and restarts
//! - a high-bit byte inside a frame discards the frame up to the next status byte,
//!   which is then decoded normally
//! - bytes outside any frame are diagnostic text, split at newlines

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::frame::{FRAME_END, FRAME_START, firmata};
use crate::reply::decode_string_data;

/// Longest sysex payload buffered before the frame is treated as corrupt
pub const MAX_FRAME_LEN: usize = 4096;
/// Longest text line buffered before it is flushed
pub const MAX_TEXT_LEN: usize = 1024;

/// Classification of inbound traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplyType {
    /// Structured binary reply
    SysexCommand,
    /// Human-readable diagnostics; no framing guarantees
    AsciiData,
}

/// One decoded unit of inbound traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Complete sysex payload, framing bytes stripped
    Sysex(Vec<u8>),
    /// Diagnostic text
    Text(String),
    /// Digital port report
    DigitalReport {
        /// Port number, eight pins each
        port: u8,
        /// Pin bits of the port
        value: u16,
    },
    /// Analog channel report
    AnalogReport {
        /// Analog channel
        channel: u8,
        /// Sample
        value: u16,
    },
    /// Protocol version sent when the link opens
    ProtocolVersion {
        /// Major version
        major: u8,
        /// Minor version
        minor: u8,
    },
    /// Protocol version sent again: the device restarted
    DeviceReset {
        /// Major version
        major: u8,
        /// Minor version
        minor: u8,
    },
}

impl Inbound {
    /// Reply classification
    pub fn reply_type(&self) -> ReplyType {
        match self {
            Self::Text(_) => ReplyType::AsciiData,
            _ => ReplyType::SysexCommand,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Sysex,
    Skipping,
    Message { command: u8, remaining: u8 },
}

/// Incremental decoder for one link
#[derive(Debug)]
pub struct Decoder {
    state: State,
    frame: Vec<u8>,
    message: Vec<u8>,
    text: Vec<u8>,
    version_seen: bool,
    resyncs: u64,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Create a decoder waiting for its first byte
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            frame: Vec::new(),
            message: Vec::with_capacity(2),
            text: Vec::new(),
            version_seen: false,
            resyncs: 0,
        }
    }

    /// Frames discarded so far
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Whether a frame is partly buffered
    pub fn in_frame(&self) -> bool {
        matches!(self.state, State::Sysex)
    }

    /// Drop all buffered state, including the protocol version seen
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Feed a chunk and collect what it completes
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Inbound> {
        let mut out = Vec::new();
        for &b in bytes {
            self.step(b, &mut out);
        }
        out
    }

    fn resync(&mut self, reason: &'static str) {
        self.resyncs += 1;
        warn!(discarded = self.frame.len(), reason, "discarding corrupt frame");
        self.frame.clear();
    }

    fn step(&mut self, b: u8, out: &mut Vec<Inbound>) {
        match self.state {
            State::Sysex => self.step_sysex(b, out),
            State::Skipping => match b {
                FRAME_START => self.state = State::Sysex,
                FRAME_END => self.state = State::Idle,
                _ if b & 0x80 != 0 => {
                    self.state = State::Idle;
                    self.step_idle(b, out);
                }
                _ => {}
            },
            State::Message { command, remaining } => {
                if b & 0x80 != 0 {
                    self.resyncs += 1;
                    debug!(command, "message interrupted");
                    self.message.clear();
                    self.state = State::Idle;
                    self.step_idle(b, out);
                    return;
                }
                self.message.push(b);
                if remaining > 1 {
                    self.state = State::Message {
                        command,
                        remaining: remaining - 1,
                    };
                } else {
                    self.state = State::Idle;
                    self.finish_message(command, out);
                }
            }
            State::Idle => self.step_idle(b, out),
        }
    }

    fn step_sysex(&mut self, b: u8, out: &mut Vec<Inbound>) {
        match b {
            FRAME_END => {
                self.state = State::Idle;
                let payload = std::mem::take(&mut self.frame);
                match payload.first().copied() {
                    None => {
                        self.resync("empty frame");
                    }
                    Some(firmata::STRING_DATA) => match decode_string_data(&payload[1..]) {
                        Ok(text) => out.push(Inbound::Text(text)),
                        Err(_) => self.resync("undecodable text"),
                    },
                    Some(_) => out.push(Inbound::Sysex(payload)),
                }
            }
            FRAME_START => self.resync("frame restarted before its end"),
            _ if b & 0x80 != 0 => {
                self.resync("control byte inside frame");
                self.state = State::Skipping;
            }
            _ => {
                self.frame.push(b);
                if self.frame.len() > MAX_FRAME_LEN {
                    self.resync("frame too long");
                    self.state = State::Skipping;
                }
            }
        }
    }

    fn step_idle(&mut self, b: u8, out: &mut Vec<Inbound>) {
        if b == FRAME_START {
            self.state = State::Sysex;
            return;
        }
        if b & 0x80 == 0 {
            self.push_text(b, out);
            return;
        }
        let data_bytes = match b {
            firmata::PROTOCOL_VERSION | firmata::SET_PIN_MODE => 2,
            0xF0..=0xFF => 0,
            _ => match b & 0xF0 {
                firmata::DIGITAL_MESSAGE | firmata::ANALOG_MESSAGE => 2,
                firmata::REPORT_ANALOG_PIN | firmata::REPORT_DIGITAL_PIN => 1,
                _ => 0,
            },
        };
        if data_bytes > 0 {
            self.message.clear();
            self.state = State::Message {
                command: b,
                remaining: data_bytes,
            };
        }
    }

    fn push_text(&mut self, b: u8, out: &mut Vec<Inbound>) {
        if b == b'\n' || self.text.len() >= MAX_TEXT_LEN {
            let mut line = std::mem::take(&mut self.text);
            if b != b'\n' {
                self.text.push(b);
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.is_empty() {
                out.push(Inbound::Text(String::from_utf8_lossy(&line).into_owned()));
            }
        } else {
            self.text.push(b);
        }
    }

    fn finish_message(&mut self, command: u8, out: &mut Vec<Inbound>) {
        let data = std::mem::take(&mut self.message);
        let word = || {
            data.first().map_or(0, |lo| u16::from(*lo)) | data.get(1).map_or(0, |hi| u16::from(*hi) << 7)
        };
        match command {
            firmata::PROTOCOL_VERSION => {
                let (major, minor) = (data.first().copied().unwrap_or(0), data.get(1).copied().unwrap_or(0));
                if self.version_seen {
                    warn!(major, minor, "protocol version repeated, device was reset");
                    out.push(Inbound::DeviceReset { major, minor });
                } else {
                    self.version_seen = true;
                    debug!(major, minor, "protocol version");
                    out.push(Inbound::ProtocolVersion { major, minor });
                }
            }
            c if c & 0xF0 == firmata::DIGITAL_MESSAGE => out.push(Inbound::DigitalReport {
                port: c & 0x0F,
                value: word(),
            }),
            c if c & 0xF0 == firmata::ANALOG_MESSAGE => out.push(Inbound::AnalogReport {
                channel: c & 0x0F,
                value: word(),
            }),
            // Host-bound echoes of requests carry nothing to report
            _ => {}
        }
    }
}
