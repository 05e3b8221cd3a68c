//! # firmil wire
//!
//! Firmata sysex framing for the IL scheduler command family, plus decoding of
//! everything the device sends back over the same link.
//!
//! ## Design Principles
//!
//! - **7-bit payloads**: Every payload byte has its high bit clear; integers are split into 7-bit groups
//! - **Immutable frames**: Encoders return finished [`Frame`]s sized against the negotiated maximum
//! - **Resynchronizing decode**: Corrupt frames are discarded whole, never partially interpreted
//! - **No silent drops**: A reply that does not match its layout is an error

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod command;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod messages;
pub mod packing;
pub mod pin;
pub mod reply;

pub use command::{ExecutorCommand, RuntimeState};
pub use decoder::{Decoder, Inbound, ReplyType};
pub use error::{CommandError, SystemVariableError, WireError, WireResult};
pub use frame::{DEFAULT_MAX_MESSAGE_SIZE, Frame, FrameBuilder, FrameKind};
pub use messages::{FlashHeader, MessageEncoder, SignatureKind, SlotDescriptor, SystemVariable};
pub use pin::{PinCapability, PinMode, SupportedMode};
pub use reply::{
    HardwareCapabilities, PinState, Reply, SystemVariableReply, TaskTermination, TerminationData,
    parse_reply,
};
