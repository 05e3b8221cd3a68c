//! # firmil runtime
//!
//! Host side of running an uploaded program: one [`Session`] per device link.
//!
//! ## Design Principles
//!
//! - **Explicit state**: The last command status, negotiated capabilities and live tasks belong to the session
//! - **Bounded waits**: Every request waits for its reply under a timeout, and a timeout is recoverable
//! - **Single owner**: Tasks are disposed of through the session that started them; disposal is advisory
//! - **Fail closed**: A protocol mismatch poisons the session rather than guessing at the device

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod delay;
pub mod error;
pub mod hardware;
pub mod session;
pub mod task;
pub mod transport;
pub mod upload;

pub use config::SessionConfig;
pub use delay::{MicrosecondTicks, TickSource, busy_wait};
pub use error::{RuntimeError, RuntimeResult};
pub use hardware::PinTable;
pub use session::Session;
pub use task::{CancellationToken, MANAGED_EXCEPTION_BASE, Task, TaskOutcome, TaskRegistry};
pub use transport::Transport;
pub use upload::{Upload, UploadState};
