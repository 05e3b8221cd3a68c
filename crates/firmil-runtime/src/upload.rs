//! Program upload
//!
//! Frames are sent one at a time, each waiting for its acknowledgement. The
//! device keeps partial state after a failure, so a failed upload is never
//! resumed; it is reported `NotCommitted` and must be restarted from scratch.
//! Tasks cannot be started until an upload commits.

use firmil_wire::{ExecutorCommand, Frame, WireError};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::session::Session;
use crate::transport::Transport;

/// Where an upload stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UploadState {
    /// Frames are still being sent
    Pending,
    /// Every frame was acknowledged
    Committed,
    /// A frame failed; the device holds an unusable partial program
    NotCommitted,
}

/// Result of sending a program
#[derive(Debug)]
pub struct Upload {
    /// Final state
    pub state: UploadState,
    /// Frames acknowledged before the upload ended
    pub acknowledged: usize,
    /// Command that failed
    pub failed_command: Option<ExecutorCommand>,
    /// Why the upload failed
    pub error: Option<RuntimeError>,
}

impl Upload {
    fn pending() -> Self {
        Self {
            state: UploadState::Pending,
            acknowledged: 0,
            failed_command: None,
            error: None,
        }
    }

    fn fail(mut self, command: Option<ExecutorCommand>, error: RuntimeError) -> Self {
        warn!(
            command = ?command,
            acknowledged = self.acknowledged,
            error = %error,
            "upload not committed"
        );
        self.state = UploadState::NotCommitted;
        self.failed_command = command;
        self.error = Some(error);
        self
    }

    /// Whether every frame was acknowledged
    pub fn is_committed(&self) -> bool {
        self.state == UploadState::Committed
    }

    /// Acknowledged frame count, or the failure
    pub fn into_result(self) -> RuntimeResult<usize> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.acknowledged),
        }
    }
}

impl<T: Transport> Session<T> {
    /// Send an encoded program, stopping at the first failure
    pub async fn upload(&self, frames: &[Frame]) -> Upload {
        let mut upload = Upload::pending();
        let limit = self.max_message_size();
        if let Some(frame) = frames.iter().find(|f| f.len() > limit) {
            let error = WireError::MessageTooLarge {
                size: frame.len(),
                max: limit,
            };
            return upload.fail(frame.command(), error.into());
        }
        self.set_program_loaded(false);
        if self.config().reset_before_upload
            && let Err(e) = self.reset_executor(false).await
        {
            return upload.fail(Some(ExecutorCommand::ResetExecutor), e);
        }
        for frame in frames {
            let sent = match frame.command() {
                Some(_) => self.command(frame).await,
                None => self.send(frame),
            };
            if let Err(e) = sent {
                return upload.fail(frame.command(), e);
            }
            upload.acknowledged += 1;
        }
        upload.state = UploadState::Committed;
        self.set_program_loaded(true);
        info!(frames = upload.acknowledged, "upload committed");
        upload
    }
}
