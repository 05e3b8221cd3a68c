//! Structured reply parsing
//!
//! Replies arrive as sysex payloads with the framing bytes stripped. The
//! first byte selects the layout:
//!
//! ```text
//! 7B 7F cmd err seq                      ack
//! 7B 7E cmd err seq                      nack
//! 7B 7D 01 id id state count data...     task termination
//! 7B 7D 13 ...                           interpreter capabilities
//! 63 op type status id id pin value*5    system variable
//! 6E pin mode state...                   pin state
//! 6C (mode res)* 7F ...                  pin capabilities
//! ```

use firmil_types::{TaskId, TaskState};
use serde::{Deserialize, Serialize};

use crate::command::{ExecutorCommand, RuntimeState};
use crate::error::{CommandError, SystemVariableError, WireError, WireResult};
use crate::frame::{DEFAULT_MAX_MESSAGE_SIZE, SCHEDULER_DATA, firmata};
use crate::messages::{NO_PIN, SystemVariable};
use crate::packing;
use crate::pin::{PinCapability, SupportedMode};

/// End of one pin's list in a capability response
const PIN_END: u8 = 0x7F;
const ACK_LEN: usize = 5;
const TERMINATION_HEADER: usize = 7;
const CAPABILITIES_LEN: usize = 28;
const SYSTEM_VARIABLE_LEN: usize = 12;

/// Interpreter capabilities reported by QueryHardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareCapabilities {
    /// Firmware protocol and native table version
    pub protocol_version: u16,
    /// Bytes of a native int
    pub int_size: u8,
    /// Bytes of a pointer
    pub pointer_size: u8,
    /// Total program flash
    pub flash_size: u32,
    /// Program flash in use
    pub flash_used: u32,
    /// Heap available to the interpreter
    pub ram_size: u32,
    /// Largest frame the device accepts, never above the default
    pub max_message_size: usize,
}

/// Data attached to a task termination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationData {
    /// Result slot image of a completed task
    Values(Vec<u8>),
    /// Exception report of a faulted or aborted task
    Exception {
        /// System exception code below `0xFF`, otherwise the managed exception type token
        code: u32,
        /// Exception type or faulting method token, then the stack tokens
        tokens: Vec<u32>,
    },
}

/// A task stopped running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTermination {
    /// Task that stopped
    pub task_id: TaskId,
    /// Final state
    pub state: TaskState,
    /// Result or exception report
    pub data: TerminationData,
}

/// Reply to a system variable request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemVariableReply {
    /// Variable queried; `None` for ids this host does not know
    pub variable: Option<SystemVariable>,
    /// Raw variable id
    pub id: u16,
    /// Pin the variable applies to
    pub pin: Option<u8>,
    /// Data type reported by the device (1 = integer)
    pub data_type: u8,
    /// Exchange status
    pub status: SystemVariableError,
    /// Value read back
    pub value: i32,
}

/// Mode and state of one pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinState {
    /// Pin number
    pub pin: u8,
    /// Raw mode byte
    pub mode: u8,
    /// Pin state; for outputs the last written value
    pub state: u32,
}

/// A decoded sysex reply
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Command accepted
    Ack {
        /// Command acknowledged
        command: ExecutorCommand,
        /// Sequence number echoed
        sequence: u8,
    },
    /// Command rejected
    Nack {
        /// Command rejected
        command: ExecutorCommand,
        /// Reason
        error: CommandError,
        /// Sequence number echoed
        sequence: u8,
    },
    /// Task stopped
    TaskTermination(TaskTermination),
    /// Interpreter capabilities
    Capabilities(HardwareCapabilities),
    /// System variable value
    SystemVariable(SystemVariableReply),
    /// Pin mode and state
    PinState(PinState),
    /// Supported modes of every pin
    PinCapabilities(Vec<PinCapability>),
    /// Firmware name and version
    Firmware {
        /// Major version
        major: u8,
        /// Minor version
        minor: u8,
        /// Firmware name
        name: String,
    },
    /// Text sent by the firmware
    Text(String),
    /// Sysex this host does not interpret, passed on as-is
    Other(Vec<u8>),
}

/// Parse one sysex payload without its framing bytes
pub fn parse_reply(payload: &[u8]) -> WireResult<Reply> {
    let Some(&id) = payload.first() else {
        return Err(WireError::unexpected("empty sysex"));
    };
    packing::check_7bit(payload)?;
    match id {
        SCHEDULER_DATA => parse_scheduler(payload),
        firmata::SYSTEM_VARIABLE => parse_system_variable(payload).map(Reply::SystemVariable),
        firmata::PIN_STATE_RESPONSE => parse_pin_state(payload).map(Reply::PinState),
        firmata::CAPABILITY_RESPONSE => Ok(Reply::PinCapabilities(parse_capabilities(payload))),
        firmata::STRING_DATA => Ok(Reply::Text(decode_string_data(&payload[1..])?)),
        firmata::REPORT_FIRMWARE => {
            need(payload, 3)?;
            Ok(Reply::Firmware {
                major: payload[1],
                minor: payload[2],
                name: decode_string_data(&payload[3..])?,
            })
        }
        _ => Ok(Reply::Other(payload.to_vec())),
    }
}

/// Reassemble text sent as two 7-bit bytes per byte, cut at the first NUL
pub fn decode_string_data(data: &[u8]) -> WireResult<String> {
    let bytes = packing::get_two_7bit(data)?;
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

fn need(payload: &[u8], len: usize) -> WireResult<()> {
    if payload.len() < len {
        return Err(WireError::Truncated {
            needed: len,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn command_at(payload: &[u8], at: usize) -> WireResult<ExecutorCommand> {
    ExecutorCommand::from_byte(payload[at]).ok_or(WireError::UnknownCommand(payload[at]))
}

fn parse_scheduler(payload: &[u8]) -> WireResult<Reply> {
    need(payload, 3)?;
    match ExecutorCommand::from_byte(payload[1]) {
        Some(ExecutorCommand::Ack) => {
            need(payload, ACK_LEN)?;
            Ok(Reply::Ack {
                command: command_at(payload, 2)?,
                sequence: payload[4],
            })
        }
        Some(ExecutorCommand::Nack) => {
            need(payload, ACK_LEN)?;
            let error = CommandError::from_byte(payload[3])
                .ok_or_else(|| WireError::unexpected(format!("command error {}", payload[3])))?;
            Ok(Reply::Nack {
                command: command_at(payload, 2)?,
                error,
                sequence: payload[4],
            })
        }
        Some(ExecutorCommand::Reply) if payload[2] == RuntimeState::TaskTermination as u8 => {
            parse_termination(payload).map(Reply::TaskTermination)
        }
        Some(ExecutorCommand::Reply) if payload[2] == ExecutorCommand::QueryHardware.to_byte() => {
            parse_hardware(payload).map(Reply::Capabilities)
        }
        _ => Ok(Reply::Other(payload.to_vec())),
    }
}

fn parse_termination(payload: &[u8]) -> WireResult<TaskTermination> {
    need(payload, TERMINATION_HEADER)?;
    let task_id = TaskId::new(packing::get_int14(payload, 3)?);
    let state = TaskState::from_wire(payload[5])?;
    let count = usize::from(payload[6]);
    let data = if matches!(state, TaskState::Aborted | TaskState::KilledByException) {
        let ints = (0..count)
            .map(|i| packing::get_u32(payload, TERMINATION_HEADER + i * packing::U32_LEN))
            .collect::<WireResult<Vec<u32>>>()?;
        let (code, tokens) = match ints.split_first() {
            Some((code, rest)) => (*code, rest.to_vec()),
            None => (0, Vec::new()),
        };
        TerminationData::Exception { code, tokens }
    } else {
        need(payload, TERMINATION_HEADER + count * 2)?;
        TerminationData::Values(packing::get_two_7bit(
            &payload[TERMINATION_HEADER..TERMINATION_HEADER + count * 2],
        )?)
    };
    Ok(TaskTermination {
        task_id,
        state,
        data,
    })
}

fn parse_hardware(payload: &[u8]) -> WireResult<HardwareCapabilities> {
    need(payload, CAPABILITIES_LEN)?;
    let reported = packing::get_u32(payload, 23)? as usize;
    Ok(HardwareCapabilities {
        protocol_version: packing::get_int14(payload, 4)?,
        int_size: payload[6],
        pointer_size: payload[7],
        flash_size: packing::get_u32(payload, 8)?,
        flash_used: packing::get_u32(payload, 13)?,
        ram_size: packing::get_u32(payload, 18)?,
        max_message_size: reported.min(DEFAULT_MAX_MESSAGE_SIZE),
    })
}

fn parse_system_variable(payload: &[u8]) -> WireResult<SystemVariableReply> {
    need(payload, SYSTEM_VARIABLE_LEN)?;
    let id = packing::get_int14(payload, 4)?;
    let status = SystemVariableError::from_byte(payload[3])
        .ok_or_else(|| WireError::unexpected(format!("system variable status {}", payload[3])))?;
    Ok(SystemVariableReply {
        variable: SystemVariable::from_id(id),
        id,
        pin: (payload[6] != NO_PIN).then_some(payload[6]),
        data_type: payload[2],
        status,
        value: packing::get_i32(payload, 7)?,
    })
}

fn parse_pin_state(payload: &[u8]) -> WireResult<PinState> {
    need(payload, 4)?;
    let state = payload[3..]
        .iter()
        .take(5)
        .enumerate()
        .fold(0u32, |acc, (i, b)| acc | (u32::from(*b) << (7 * i)));
    Ok(PinState {
        pin: payload[1],
        mode: payload[2],
        state,
    })
}

fn parse_capabilities(payload: &[u8]) -> Vec<PinCapability> {
    let mut pins = Vec::new();
    let mut current = PinCapability::default();
    let mut rest = &payload[1..];
    while let Some((&mode, tail)) = rest.split_first() {
        if mode == PIN_END {
            let next = current.pin.saturating_add(1);
            pins.push(std::mem::replace(
                &mut current,
                PinCapability {
                    pin: next,
                    modes: Vec::new(),
                },
            ));
            rest = tail;
            continue;
        }
        let Some((&resolution, tail)) = tail.split_first() else {
            break;
        };
        current.modes.push(SupportedMode { mode, resolution });
        rest = tail;
    }
    pins
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::PinMode;

    #[test]
    fn test_ack_and_nack() {
        assert_eq!(
            parse_reply(&[0x7B, 0x7F, 0x03, 0x00, 0x11]).unwrap(),
            Reply::Ack {
                command: ExecutorCommand::LoadIl,
                sequence: 0x11
            }
        );
        assert_eq!(
            parse_reply(&[0x7B, 0x7E, 0x03, 0x05, 0x11]).unwrap(),
            Reply::Nack {
                command: ExecutorCommand::LoadIl,
                error: CommandError::Timeout,
                sequence: 0x11
            }
        );
    }

    #[test]
    fn test_undecodable_reply_is_an_error() {
        assert!(parse_reply(&[0x7B, 0x7E, 0x03, 0x09, 0x11]).is_err());
        assert!(parse_reply(&[0x7B, 0x7F, 0x02, 0x00, 0x11]).is_err());
        assert!(parse_reply(&[0x7B, 0x7F, 0x03]).is_err());
        assert!(parse_reply(&[]).is_err());
    }

    #[test]
    fn test_completed_task_result() {
        let mut payload = vec![0x7B, 0x7D, 0x01, 0x05, 0x00, 0x00, 0x04];
        packing::put_two_7bit(&mut payload, &42i32.to_le_bytes());
        let Reply::TaskTermination(t) = parse_reply(&payload).unwrap() else {
            panic!("expected termination");
        };
        assert_eq!(t.task_id, TaskId::new(5));
        assert_eq!(t.state, TaskState::Completed);
        assert_eq!(t.data, TerminationData::Values(42i32.to_le_bytes().to_vec()));
    }

    #[test]
    fn test_faulted_task_report() {
        let mut payload = vec![0x7B, 0x7D, 0x01, 0x02, 0x00, 0x03, 0x02];
        packing::put_u32(&mut payload, 5);
        packing::put_u32(&mut payload, 21);
        let Reply::TaskTermination(t) = parse_reply(&payload).unwrap() else {
            panic!("expected termination");
        };
        assert_eq!(t.state, TaskState::Aborted);
        assert_eq!(
            t.data,
            TerminationData::Exception {
                code: 5,
                tokens: vec![21]
            }
        );
    }

    #[test]
    fn test_hardware_capabilities_capped() {
        let mut payload = vec![0x7B, 0x7D, 0x13, 0x00];
        packing::put_int14(&mut payload, 1);
        payload.extend([4, 4]);
        packing::put_u32(&mut payload, 256 * 1024);
        packing::put_u32(&mut payload, 1000);
        packing::put_u32(&mut payload, 32 * 1024);
        packing::put_u32(&mut payload, 512);
        let Reply::Capabilities(caps) = parse_reply(&payload).unwrap() else {
            panic!("expected capabilities");
        };
        assert_eq!(caps.protocol_version, 1);
        assert_eq!(caps.flash_size, 256 * 1024);
        assert_eq!(caps.ram_size, 32 * 1024);
        assert_eq!(caps.max_message_size, 64);
    }

    #[test]
    fn test_system_variable_reply() {
        let mut payload = vec![0x63, 0x00, 0x01, 0x00, 0x00, 0x00, 0x7F];
        packing::put_i32(&mut payload, 128);
        let Reply::SystemVariable(v) = parse_reply(&payload).unwrap() else {
            panic!("expected system variable");
        };
        assert_eq!(v.variable, Some(SystemVariable::MaxSysexSize));
        assert_eq!(v.pin, None);
        assert_eq!(v.status, SystemVariableError::Success);
        assert_eq!(v.value, 128);
    }

    #[test]
    fn test_pin_capabilities() {
        let payload = [0x6C, 0, 1, 1, 1, 0x7F, 0, 1, 3, 8, 0x7F];
        let Reply::PinCapabilities(pins) = parse_reply(&payload).unwrap() else {
            panic!("expected capabilities");
        };
        assert_eq!(pins.len(), 2);
        assert!(pins[1].supports(PinMode::Pwm));
        assert!(!pins[0].supports(PinMode::Pwm));
        assert_eq!(pins[1].pin, 1);
    }

    #[test]
    fn test_string_data() {
        let mut payload = vec![0x71];
        packing::put_two_7bit(&mut payload, b"boot ok\0junk");
        assert_eq!(parse_reply(&payload).unwrap(), Reply::Text("boot ok".into()));
    }
}
