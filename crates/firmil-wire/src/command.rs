//! Scheduler command codes

use serde::{Deserialize, Serialize};

/// IL command family codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ExecutorCommand {
    /// No command
    None = 0,
    /// Declare a method with its flags
    DeclareMethod = 1,
    /// Upload one chunk of a method body
    LoadIl = 3,
    /// Start a task
    StartTask = 4,
    /// Clear all uploaded code
    ResetExecutor = 5,
    /// Request termination of a task
    KillTask = 6,
    /// Argument or local slot kinds
    MethodSignature = 7,
    /// One member of a class
    ClassDeclaration = 8,
    /// Last member of a class
    ClassDeclarationEnd = 9,
    /// One chunk of constant data
    ConstantData = 10,
    /// Implemented interfaces of a class
    Interfaces = 11,
    /// Persist the uploaded program
    CopyToFlash = 12,
    /// Write the flash program header
    WriteFlashHeader = 13,
    /// Compare the flash program version
    CheckFlashVersion = 14,
    /// Erase the flash program
    EraseFlash = 15,
    /// One exception clause of a method
    ExceptionClauses = 16,
    /// Reserve constant and string memory
    SetConstantMemorySize = 17,
    /// Query interpreter capabilities
    QueryHardware = 19,
    /// Reply carrying data
    Reply = 0x7D,
    /// Negative acknowledgement
    Nack = 0x7E,
    /// Acknowledgement
    Ack = 0x7F,
}

impl ExecutorCommand {
    /// Decode a command byte
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => Self::None,
            1 => Self::DeclareMethod,
            3 => Self::LoadIl,
            4 => Self::StartTask,
            5 => Self::ResetExecutor,
            6 => Self::KillTask,
            7 => Self::MethodSignature,
            8 => Self::ClassDeclaration,
            9 => Self::ClassDeclarationEnd,
            10 => Self::ConstantData,
            11 => Self::Interfaces,
            12 => Self::CopyToFlash,
            13 => Self::WriteFlashHeader,
            14 => Self::CheckFlashVersion,
            15 => Self::EraseFlash,
            16 => Self::ExceptionClauses,
            17 => Self::SetConstantMemorySize,
            19 => Self::QueryHardware,
            0x7D => Self::Reply,
            0x7E => Self::Nack,
            0x7F => Self::Ack,
            _ => return None,
        })
    }

    /// Command byte
    #[inline]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }

    /// Get display name
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::DeclareMethod => "DeclareMethod",
            Self::LoadIl => "LoadIl",
            Self::StartTask => "StartTask",
            Self::ResetExecutor => "ResetExecutor",
            Self::KillTask => "KillTask",
            Self::MethodSignature => "MethodSignature",
            Self::ClassDeclaration => "ClassDeclaration",
            Self::ClassDeclarationEnd => "ClassDeclarationEnd",
            Self::ConstantData => "ConstantData",
            Self::Interfaces => "Interfaces",
            Self::CopyToFlash => "CopyToFlash",
            Self::WriteFlashHeader => "WriteFlashHeader",
            Self::CheckFlashVersion => "CheckFlashVersion",
            Self::EraseFlash => "EraseFlash",
            Self::ExceptionClauses => "ExceptionClauses",
            Self::SetConstantMemorySize => "SetConstantMemorySize",
            Self::QueryHardware => "QueryHardware",
            Self::Reply => "Reply",
            Self::Nack => "Nack",
            Self::Ack => "Ack",
        }
    }

    /// Whether repeating the command after a failure is harmless
    pub const fn is_idempotent(self) -> bool {
        matches!(
            self,
            Self::QueryHardware | Self::KillTask | Self::ResetExecutor | Self::CheckFlashVersion
        )
    }

    /// All request codes, in code order
    pub const REQUESTS: [ExecutorCommand; 17] = [
        Self::DeclareMethod,
        Self::LoadIl,
        Self::StartTask,
        Self::ResetExecutor,
        Self::KillTask,
        Self::MethodSignature,
        Self::ClassDeclaration,
        Self::ClassDeclarationEnd,
        Self::ConstantData,
        Self::Interfaces,
        Self::CopyToFlash,
        Self::WriteFlashHeader,
        Self::CheckFlashVersion,
        Self::EraseFlash,
        Self::ExceptionClauses,
        Self::SetConstantMemorySize,
        Self::QueryHardware,
    ];
}

impl std::fmt::Display for ExecutorCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Reply subjects that are not commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RuntimeState {
    /// A task finished, faulted or was aborted
    TaskTermination = 1,
}
