//! Session settings

use firmil_wire::DEFAULT_MAX_MESSAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for one device session
///
/// Loaded from the `[session]` table of `firmil.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long to wait for each reply, in milliseconds.
    /// Default: 3000
    pub reply_timeout_ms: u64,

    /// Attempts for requests that are safe to repeat.
    /// Default: 3
    pub retries: u32,

    /// Pause between attempts, in milliseconds.
    /// Default: 20
    pub retry_delay_ms: u64,

    /// Frame size used until the device reports its own.
    /// Default: 64
    pub max_message_size: usize,

    /// Clear the executor before each upload.
    /// Default: true
    pub reset_before_upload: bool,

    /// How long a disposed task may go without reporting its end before the
    /// session forgets it, in milliseconds.
    /// Default: 5000
    pub dispose_grace_ms: u64,

    /// Pause between a pin write and its read-back, in microseconds.
    /// Default: 100
    pub pin_settle_us: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 3000,
            retries: 3,
            retry_delay_ms: 20,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            reset_before_upload: true,
            dispose_grace_ms: 5000,
            pin_settle_us: 100,
        }
    }
}

impl SessionConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reply timeout
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the number of attempts for repeatable requests (at least one)
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Set the pause between attempts
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enable or disable the executor reset before uploads
    pub fn reset_before_upload(mut self, enabled: bool) -> Self {
        self.reset_before_upload = enabled;
        self
    }

    /// Set the grace period for disposed tasks
    pub fn dispose_grace(mut self, grace: Duration) -> Self {
        self.dispose_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the pin settle pause in microseconds
    pub fn pin_settle_us(mut self, micros: u32) -> Self {
        self.pin_settle_us = micros;
        self
    }

    /// Reply timeout as a duration
    pub fn reply_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Retry pause as a duration
    pub fn retry_delay_duration(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Disposal grace period as a duration
    pub fn dispose_grace_duration(&self) -> Duration {
        Duration::from_millis(self.dispose_grace_ms)
    }

    /// Attempts for a request, never zero
    pub(crate) fn attempts(&self) -> u32 {
        self.retries.max(1)
    }
}
