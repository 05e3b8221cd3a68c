//! Command encoders
//!
//! [`MessageEncoder`] turns program pieces into IL frames, splitting bulk data
//! so that every frame fits the negotiated maximum message size, and stamps
//! each IL frame with the next 7-bit sequence number. A sequence number is
//! only used up by a frame that encodes; a call producing several frames
//! uses none of them if any frame fails.

use firmil_types::{
    ClassDeclaration, ClauseKind, ExceptionRegion, MemberDetail, MethodFlags, NativeMethod,
    TaskId, Token, Value, VariableKind,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::command::ExecutorCommand;
use crate::error::{WireError, WireResult};
use crate::frame::{
    DEFAULT_MAX_MESSAGE_SIZE, FRAME_END, Frame, FrameBuilder, GROUP_TAG, IL_HEADER_LEN,
    SCHEDULER_DATA, firmata,
};
use crate::packing;
use crate::pin::PinMode;

/// Slot entries per MethodSignature frame
pub const SIGNATURE_SLOTS_PER_FRAME: usize = 16;
/// Interface tokens per Interfaces frame
pub const INTERFACES_PER_FRAME: usize = 8;
/// Framing and header bytes of a LoadIl frame
const LOAD_IL_OVERHEAD: usize = 15;
/// Framing and header bytes of a ConstantData frame
const CONSTANT_DATA_OVERHEAD: usize = 21;
/// Pin byte meaning "no pin" in a system variable request
pub const NO_PIN: u8 = 127;

/// Which slots a MethodSignature frame describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SignatureKind {
    /// Method arguments
    Arguments = 0,
    /// Method locals
    Locals = 1,
}

/// Kind and byte size of one argument or local slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDescriptor {
    /// Slot tag
    pub kind: VariableKind,
    /// Storage size in bytes
    pub size: u32,
}

impl SlotDescriptor {
    /// Slot of the kind's natural size
    pub const fn of(kind: VariableKind) -> Self {
        Self {
            kind,
            size: kind.slot_size() as u32,
        }
    }
}

/// Identifiers of queryable system variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum SystemVariable {
    /// Largest sysex message the device accepts
    MaxSysexSize = 0,
    /// Size of the device input buffer
    InputBufferSize = 1,
    /// Put the device to sleep
    EnterSleepMode = 102,
    /// Enable wake-up interrupts
    SleepModeInterruptEnable = 103,
}

impl SystemVariable {
    /// Decode a variable id
    pub fn from_id(id: u16) -> Option<Self> {
        Some(match id {
            0 => Self::MaxSysexSize,
            1 => Self::InputBufferSize,
            102 => Self::EnterSleepMode,
            103 => Self::SleepModeInterruptEnable,
            _ => return None,
        })
    }
}

/// Program header written to flash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashHeader {
    /// Layout version of the stored program
    pub data_version: u32,
    /// Hash identifying the stored program
    pub hash: u32,
    /// Method started after boot, [`Token::NONE`] for none
    pub startup_token: Token,
    /// Startup behavior flags
    pub startup_flags: u32,
}

/// Stateful encoder for one session
#[derive(Debug, Clone)]
pub struct MessageEncoder {
    max_message_size: usize,
    next_sequence: u8,
}

impl Default for MessageEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl MessageEncoder {
    /// Create an encoder for the given maximum message size
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            next_sequence: 0,
        }
    }

    /// Negotiated maximum message size
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Adopt the size reported by the device
    pub fn set_max_message_size(&mut self, size: usize) {
        self.max_message_size = size;
    }

    /// Sequence number the next IL frame will carry
    pub fn peek_sequence(&self) -> u8 {
        self.next_sequence
    }

    /// Constant bytes carried by one ConstantData frame
    ///
    /// Chunks are whole 7-byte groups, each packing into exactly eight bytes.
    pub fn constant_chunk(&self) -> usize {
        self.max_message_size.saturating_sub(CONSTANT_DATA_OVERHEAD) / 8 * 7
    }

    fn il(&self, command: ExecutorCommand) -> FrameBuilder {
        FrameBuilder::il(command, self.next_sequence)
    }

    fn finish(&mut self, builder: FrameBuilder) -> WireResult<Frame> {
        let frame = self.seal(builder)?;
        if let Some(sequence) = frame.sequence() {
            self.next_sequence = (sequence + 1) & 0x7F;
        }
        Ok(frame)
    }

    /// Finish a frame that carries no sequence number
    fn seal(&self, builder: FrameBuilder) -> WireResult<Frame> {
        let frame = builder.finish(self.max_message_size)?;
        trace!(frame = ?frame, "encoded");
        Ok(frame)
    }

    /// Run a multi-frame encode, giving back its sequence numbers on failure
    fn batch<R>(&mut self, encode: impl FnOnce(&mut Self) -> WireResult<R>) -> WireResult<R> {
        let start = self.next_sequence;
        let result = encode(self);
        if result.is_err() {
            self.next_sequence = start;
        }
        result
    }

    /// Declare a method
    pub fn declare_method(
        &mut self,
        token: Token,
        flags: MethodFlags,
        max_stack: u8,
        arg_count: u8,
        native: NativeMethod,
    ) -> WireResult<Frame> {
        flags.validate()?;
        let builder = self
            .il(ExecutorCommand::DeclareMethod)
            .u32(token.value())
            .int14("method flags", u32::from(flags.to_bits()))?
            .byte(seven_bit("max stack", max_stack)?)?
            .byte(seven_bit("argument count", arg_count)?)?
            .u32(u32::from(native.id()));
        self.finish(builder)
    }

    /// Describe argument or local slots, at most sixteen per frame
    pub fn method_signature(
        &mut self,
        token: Token,
        kind: SignatureKind,
        slots: &[SlotDescriptor],
    ) -> WireResult<Vec<Frame>> {
        self.batch(|enc| {
            slots
                .chunks(SIGNATURE_SLOTS_PER_FRAME)
                .map(|chunk| {
                    let mut builder = enc
                        .il(ExecutorCommand::MethodSignature)
                        .u32(token.value())
                        .byte(kind as u8)?
                        .byte(chunk.len() as u8)?;
                    for slot in chunk {
                        builder = builder
                            .byte(slot.kind.to_byte())?
                            .int14("slot size", slot.size)?;
                    }
                    enc.finish(builder)
                })
                .collect()
        })
    }

    /// Upload a method body in chunks
    ///
    /// Each frame carries the token, the total length and the chunk offset,
    /// followed by the chunk as a 7-bit stream.
    pub fn load_il(&mut self, token: Token, code: &[u8]) -> WireResult<Vec<Frame>> {
        let per_frame = self.max_message_size.saturating_sub(LOAD_IL_OVERHEAD) * 7 / 8;
        if per_frame == 0 {
            return Err(WireError::MessageSizeTooSmall(self.max_message_size));
        }
        let total = code.len() as u32;
        self.batch(|enc| {
            code.chunks(per_frame)
                .enumerate()
                .map(|(i, chunk)| {
                    let builder = enc
                        .il(ExecutorCommand::LoadIl)
                        .u32(token.value())
                        .int14("method length", total)?
                        .int14("chunk offset", (i * per_frame) as u32)?
                        .stream_7bit(chunk);
                    enc.finish(builder)
                })
                .collect()
        })
    }

    /// One frame per exception clause, in declaration order
    pub fn exception_clauses(
        &mut self,
        token: Token,
        regions: &[ExceptionRegion],
    ) -> WireResult<Vec<Frame>> {
        self.batch(|enc| {
            regions
                .iter()
                .map(|r| {
                    let builder = enc
                        .il(ExecutorCommand::ExceptionClauses)
                        .u32(token.value())
                        .u32(r.kind as u32)
                        .u32(r.try_offset)
                        .u32(r.try_length)
                        .u32(r.handler_offset)
                        .u32(r.handler_length)
                        .u32(r.class_or_filter);
                    enc.finish(builder)
                })
                .collect()
        })
    }

    /// Declare a class: one frame per member, the last tagged as the end,
    /// then its interfaces eight per frame
    ///
    /// Reference type sizes are sent divided by four; value types are sent
    /// unscaled. Member kinds are sent as two 7-bit bytes so the static
    /// marker survives.
    pub fn class_declaration(&mut self, decl: &ClassDeclaration) -> WireResult<Vec<Frame>> {
        self.batch(|enc| enc.class_frames(decl))
    }

    fn class_frames(&mut self, decl: &ClassDeclaration) -> WireResult<Vec<Frame>> {
        let dynamic = if decl.is_value_type {
            decl.dynamic_size
        } else {
            decl.dynamic_size >> 2
        };
        let statics = decl.static_size >> 2;
        let flags = u32::from(decl.flags());
        let mut frames = Vec::with_capacity(decl.members.len().max(1) + decl.interfaces.len());

        let header = |builder: FrameBuilder, index: usize| -> WireResult<FrameBuilder> {
            builder
                .u32(decl.token.value())
                .u32(decl.parent.value())
                .int14("instance size", dynamic)?
                .int14("static size", statics)?
                .int14("class flags", flags)?
                .int14("member index", index as u32)
        };

        if decl.members.is_empty() {
            let builder = header(self.il(ExecutorCommand::ClassDeclarationEnd), 0)?;
            frames.push(self.finish(builder)?);
        }
        let last = decl.members.len().saturating_sub(1);
        for (index, member) in decl.members.iter().enumerate() {
            let command = if index == last {
                ExecutorCommand::ClassDeclarationEnd
            } else {
                ExecutorCommand::ClassDeclaration
            };
            let mut builder = header(self.il(command), index)?
                .two_7bit(&[member.wire_kind()])
                .u32(member.token.value());
            builder = match &member.detail {
                MemberDetail::Field { size, .. } => builder.int14("field size", u32::from(*size))?,
                MemberDetail::Method { base_tokens } => base_tokens
                    .iter()
                    .fold(builder, |b, t| b.u32(t.value())),
            };
            frames.push(self.finish(builder)?);
        }

        for chunk in decl.interfaces.chunks(INTERFACES_PER_FRAME) {
            let builder = chunk.iter().fold(
                self.il(ExecutorCommand::Interfaces).u32(decl.token.value()),
                |b, t| b.u32(t.value()),
            );
            frames.push(self.finish(builder)?);
        }
        Ok(frames)
    }

    /// Reserve device memory for constants and strings
    pub fn set_constant_memory_size(&mut self, constant_size: u32, string_size: u32) -> WireResult<Frame> {
        let builder = self
            .il(ExecutorCommand::SetConstantMemorySize)
            .u32(constant_size)
            .u32(string_size);
        self.finish(builder)
    }

    /// Upload constant data in chunks sized by [`constant_chunk`](Self::constant_chunk)
    pub fn constant_data(&mut self, token: Token, data: &[u8]) -> WireResult<Vec<Frame>> {
        let per_frame = self.constant_chunk();
        if per_frame == 0 {
            return Err(WireError::MessageSizeTooSmall(self.max_message_size));
        }
        let total = data.len() as u32;
        self.batch(|enc| {
            data.chunks(per_frame)
                .enumerate()
                .map(|(i, chunk)| {
                    let builder = enc
                        .il(ExecutorCommand::ConstantData)
                        .u32(token.value())
                        .u32(total)
                        .u32((i * per_frame) as u32)
                        .stream_7bit(chunk);
                    enc.finish(builder)
                })
                .collect()
        })
    }

    /// Start a task running `token` with the given arguments
    pub fn start_task(&mut self, token: Token, task: TaskId, args: &[Value]) -> WireResult<Frame> {
        let builder = args.iter().fold(
            self.il(ExecutorCommand::StartTask)
                .u32(token.value())
                .int14("task id", u32::from(task.value()))?,
            |b, v| b.two_7bit(&v.to_bytes()),
        );
        self.finish(builder)
    }

    /// Request cooperative termination of the task running `token`
    pub fn kill_task(&mut self, token: Token) -> WireResult<Frame> {
        let builder = self.il(ExecutorCommand::KillTask).u32(token.value());
        self.finish(builder)
    }

    /// Clear uploaded code; `force` also stops running tasks
    pub fn reset_executor(&mut self, force: bool) -> WireResult<Frame> {
        let builder = self.il(ExecutorCommand::ResetExecutor).byte(u8::from(force))?;
        self.finish(builder)
    }

    /// Ask for interpreter capabilities
    pub fn query_hardware(&mut self) -> WireResult<Frame> {
        let builder = self.il(ExecutorCommand::QueryHardware).u32(0);
        self.finish(builder)
    }

    /// Erase the stored program
    pub fn erase_flash(&mut self) -> WireResult<Frame> {
        let builder = self.il(ExecutorCommand::EraseFlash).byte(1)?;
        self.finish(builder)
    }

    /// Persist the uploaded program
    pub fn copy_to_flash(&mut self) -> WireResult<Frame> {
        let builder = self.il(ExecutorCommand::CopyToFlash).byte(0)?;
        self.finish(builder)
    }

    /// Write the stored program header
    pub fn write_flash_header(&mut self, header: &FlashHeader) -> WireResult<Frame> {
        let builder = self
            .il(ExecutorCommand::WriteFlashHeader)
            .u32(header.data_version)
            .u32(header.hash)
            .u32(header.startup_token.value())
            .u32(header.startup_flags);
        self.finish(builder)
    }

    /// Ask whether the stored program matches
    pub fn check_flash_version(&mut self, data_version: u32, hash: u32) -> WireResult<Frame> {
        let builder = self
            .il(ExecutorCommand::CheckFlashVersion)
            .u32(data_version)
            .u32(hash);
        self.finish(builder)
    }

    /// Query (`value` is `None`) or set an integer system variable
    pub fn system_variable(
        &self,
        variable: SystemVariable,
        pin: Option<u8>,
        value: Option<i32>,
    ) -> WireResult<Frame> {
        let pin = match pin {
            Some(p) if p < NO_PIN => p,
            _ => NO_PIN,
        };
        let builder = FrameBuilder::sysex(firmata::SYSTEM_VARIABLE)
            .byte(u8::from(value.is_some()))?
            .byte(1)?
            .byte(0)?
            .int14("variable id", variable as u32)?
            .byte(pin)?
            .i32(value.unwrap_or(0));
        self.seal(builder)
    }

    /// Ask for the mode and state of a pin
    pub fn pin_state_query(&self, pin: u8) -> WireResult<Frame> {
        let builder = FrameBuilder::sysex(firmata::PIN_STATE_QUERY).byte(pin)?;
        self.seal(builder)
    }

    /// Ask for the modes every pin supports
    pub fn capability_query(&self) -> WireResult<Frame> {
        self.seal(FrameBuilder::sysex(firmata::CAPABILITY_QUERY))
    }

    /// Set a pin mode
    pub fn set_pin_mode(&self, pin: u8, mode: PinMode) -> WireResult<Frame> {
        let builder = FrameBuilder::message(firmata::SET_PIN_MODE)
            .byte(pin)?
            .byte(mode.to_byte())?;
        self.seal(builder)
    }

    /// Drive a digital pin
    pub fn set_digital_value(&self, pin: u8, high: bool) -> WireResult<Frame> {
        let builder = FrameBuilder::message(firmata::SET_DIGITAL_VALUE)
            .byte(pin)?
            .byte(u8::from(high))?;
        self.seal(builder)
    }
}

fn seven_bit(field: &'static str, value: u8) -> WireResult<u8> {
    if value & 0x80 != 0 {
        return Err(WireError::out_of_range(field, value, 7));
    }
    Ok(value)
}

/// Read back an ExceptionClauses frame as `(method token, region)`
pub fn decode_exception_clause(frame: &[u8]) -> WireResult<(Token, ExceptionRegion)> {
    let header = [
        crate::frame::FRAME_START,
        SCHEDULER_DATA,
        GROUP_TAG,
        ExecutorCommand::ExceptionClauses.to_byte(),
    ];
    if frame.len() < 4 || frame[..4] != header || frame.last() != Some(&FRAME_END) {
        return Err(WireError::unexpected("not an ExceptionClauses frame"));
    }
    let field = |i: usize| packing::get_u32(frame, IL_HEADER_LEN + i * packing::U32_LEN);
    let kind_code = field(1)?;
    let kind = u8::try_from(kind_code)
        .ok()
        .and_then(ClauseKind::from_byte)
        .ok_or_else(|| WireError::unexpected(format!("clause kind {}", kind_code)))?;
    Ok((
        Token::new(field(0)?),
        ExceptionRegion {
            kind,
            try_offset: field(2)?,
            try_length: field(3)?,
            handler_offset: field(4)?,
            handler_length: field(5)?,
            class_or_filter: field(6)?,
        },
    ))
}
