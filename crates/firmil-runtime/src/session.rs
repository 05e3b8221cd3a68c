//! Device session
//!
//! A [`Session`] owns everything one link needs: the outbound encoder, the
//! inbound decoder, replies waiting to be claimed, the live tasks and the
//! status of the last command. Each request waits for its matching reply
//! under [`SessionConfig::reply_timeout_ms`]; requests that are safe to
//! repeat are retried after a timeout.
//!
//! A device restart loses the uploaded program. Tasks are refused until the
//! next upload commits; token assignments made for the lost program belong to
//! the compiler and are discarded there with `Resolver::reset`.

use firmil_types::{NATIVE_TABLE_VERSION, TaskState, Token, Value};
use firmil_wire::{
    CommandError, Decoder, Frame, FrameKind, HardwareCapabilities, Inbound, MessageEncoder, Reply,
    SystemVariable, SystemVariableError, WireResult, parse_reply,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Notify;
use tracing::{debug, error, info, trace, warn};

use crate::config::SessionConfig;
use crate::delay::{MicrosecondTicks, busy_wait};
use crate::error::{RuntimeError, RuntimeResult};
use crate::hardware::PinTable;
use crate::task::{Task, TaskOutcome, TaskRegistry};
use crate::transport::Transport;

/// Unclaimed replies kept before the oldest is dropped
const MAX_PENDING_REPLIES: usize = 64;
const READ_CHUNK: usize = 256;

/// One host-to-device link
pub struct Session<T: Transport> {
    transport: T,
    config: SessionConfig,
    encoder: Mutex<MessageEncoder>,
    decoder: Mutex<Decoder>,
    pending: Mutex<VecDeque<Reply>>,
    arrived: Notify,
    tasks: TaskRegistry,
    pub(crate) pins: PinTable,
    last_error: Mutex<CommandError>,
    last_inbound_error: Mutex<Option<String>>,
    program_lost: AtomicBool,
    ticks: MicrosecondTicks,
    capabilities: Mutex<Option<HardwareCapabilities>>,
    firmata_version: Mutex<Option<(u8, u8)>>,
    poisoned: AtomicBool,
}

impl<T: Transport> Session<T> {
    /// Create a session writing through `transport`
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            encoder: Mutex::new(MessageEncoder::new(config.max_message_size)),
            transport,
            config,
            decoder: Mutex::new(Decoder::new()),
            pending: Mutex::new(VecDeque::new()),
            arrived: Notify::new(),
            tasks: TaskRegistry::new(),
            pins: PinTable::default(),
            last_error: Mutex::new(CommandError::None),
            last_inbound_error: Mutex::new(None),
            program_lost: AtomicBool::new(false),
            ticks: MicrosecondTicks::new(),
            capabilities: Mutex::new(None),
            firmata_version: Mutex::new(None),
            poisoned: AtomicBool::new(false),
        }
    }

    /// Session settings
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Status of the last command exchange
    pub fn last_error(&self) -> CommandError {
        *self.last_error.lock()
    }

    /// Most recent inbound unit that could not be decoded
    pub fn last_inbound_error(&self) -> Option<String> {
        self.last_inbound_error.lock().clone()
    }

    /// Whether tasks can be started against the device's program
    ///
    /// False after a device restart, an executor reset or an upload that did
    /// not commit, until the next committed upload.
    pub fn is_program_loaded(&self) -> bool {
        !self.program_lost.load(Ordering::Acquire)
    }

    pub(crate) fn set_program_loaded(&self, loaded: bool) {
        self.program_lost.store(!loaded, Ordering::Release);
    }

    /// Capabilities negotiated by [`connect`](Self::connect)
    pub fn capabilities(&self) -> Option<HardwareCapabilities> {
        *self.capabilities.lock()
    }

    /// Firmata protocol version announced by the device
    pub fn firmata_version(&self) -> Option<(u8, u8)> {
        *self.firmata_version.lock()
    }

    /// Whether a protocol mismatch ended the session
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Live tasks
    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// Largest frame the session currently sends
    pub fn max_message_size(&self) -> usize {
        self.encoder.lock().max_message_size()
    }

    /// Decode inbound bytes and route what they complete
    ///
    /// Every unit is processed; the first undecodable reply is returned after
    /// the rest of the chunk has been routed. Each failure is also kept as
    /// [`last_inbound_error`](Self::last_inbound_error).
    pub fn feed(&self, bytes: &[u8]) -> RuntimeResult<()> {
        let units = self.decoder.lock().push(bytes);
        let mut first_error = None;
        for unit in units {
            if let Err(e) = self.dispatch(unit) {
                warn!(error = %e, "undecodable reply");
                *self.last_inbound_error.lock() = Some(e.to_string());
                first_error.get_or_insert(e);
            }
        }
        self.arrived.notify_waiters();
        first_error.map_or(Ok(()), Err)
    }

    /// Feed everything `reader` yields until it reaches end of file
    ///
    /// Undecodable input is logged and recorded; only a read failure ends
    /// the pump.
    pub async fn pump<R: AsyncRead + Unpin>(&self, mut reader: R) -> RuntimeResult<()> {
        let mut buf = [0u8; READ_CHUNK];
        let mut rejected = 0usize;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                if rejected > 0 {
                    warn!(chunks = rejected, "pump finished with undecodable input");
                }
                return Ok(());
            }
            if let Err(e) = self.feed(&buf[..n]) {
                rejected += 1;
                warn!(error = %e, "skipping undecodable input");
            }
        }
    }

    fn dispatch(&self, unit: Inbound) -> RuntimeResult<()> {
        match unit {
            Inbound::Sysex(payload) => match parse_reply(&payload)? {
                Reply::TaskTermination(termination) => {
                    self.tasks.terminate(&termination);
                }
                Reply::Text(text) => info!(target: "firmil::device", "{text}"),
                reply => {
                    trace!(?reply, "reply");
                    let mut pending = self.pending.lock();
                    if pending.len() >= MAX_PENDING_REPLIES
                        && let Some(dropped) = pending.pop_front()
                    {
                        warn!(?dropped, "unclaimed reply dropped");
                    }
                    pending.push_back(reply);
                }
            },
            Inbound::Text(text) => info!(target: "firmil::device", "{text}"),
            Inbound::DigitalReport { port, value } => self.pins.record_port(port, value),
            Inbound::AnalogReport { channel, value } => trace!(channel, value, "analog report"),
            Inbound::ProtocolVersion { major, minor } => {
                *self.firmata_version.lock() = Some((major, minor));
            }
            Inbound::DeviceReset { major, minor } => {
                warn!(major, minor, live_tasks = self.tasks.len(), "device restarted");
                *self.firmata_version.lock() = Some((major, minor));
                *self.last_error.lock() = CommandError::DeviceReset;
                self.set_program_loaded(false);
                self.tasks.abort_all();
                self.pins.clear();
            }
        }
        Ok(())
    }

    pub(crate) fn encode<R>(&self, f: impl FnOnce(&mut MessageEncoder) -> WireResult<R>) -> RuntimeResult<R> {
        Ok(f(&mut self.encoder.lock())?)
    }

    pub(crate) fn ensure_usable(&self) -> RuntimeResult<()> {
        if self.is_poisoned() {
            return Err(RuntimeError::Poisoned);
        }
        Ok(())
    }

    /// Write a frame that expects no reply
    pub(crate) fn send(&self, frame: &Frame) -> RuntimeResult<()> {
        self.ensure_usable()?;
        self.transport.send(frame.as_bytes())?;
        Ok(())
    }

    /// Wait until `poll` yields, or the reply timeout elapses
    pub(crate) async fn wait_until<R>(&self, request: &str, mut poll: impl FnMut() -> Option<R>) -> RuntimeResult<R> {
        let timeout = self.config.reply_timeout_duration();
        let waiting = async {
            loop {
                let notified = self.arrived.notified();
                let mut notified = std::pin::pin!(notified);
                notified.as_mut().enable();
                if let Some(found) = poll() {
                    return found;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, waiting)
            .await
            .map_err(|_| RuntimeError::Timeout {
                request: request.to_string(),
                elapsed: timeout,
            })
    }

    fn take_reply(&self, matches: &mut impl FnMut(&Reply) -> bool) -> Option<Reply> {
        let mut pending = self.pending.lock();
        let at = pending.iter().position(|r| matches(r))?;
        pending.remove(at)
    }

    /// Send `frame` and claim the first reply accepted by `matches`
    ///
    /// A nack for the frame's own command and sequence always ends the wait.
    pub(crate) async fn exchange(&self, frame: &Frame, mut matches: impl FnMut(&Reply) -> bool) -> RuntimeResult<Reply> {
        self.ensure_usable()?;
        let request = describe(frame);
        let repeatable = frame.command().is_none_or(|c| c.is_idempotent());
        let attempts = if repeatable { self.config.attempts() } else { 1 };
        let mut accept = |reply: &Reply| is_nack_for(frame, reply) || matches(reply);

        let mut last = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                debug!(request = %request, attempt, "retrying");
                tokio::time::sleep(self.config.retry_delay_duration()).await;
            }
            self.transport.send(frame.as_bytes())?;
            match self.wait_until(&request, || self.take_reply(&mut accept)).await {
                Ok(reply) => return self.settle(reply),
                Err(e @ RuntimeError::Timeout { .. }) => {
                    warn!(request = %request, attempt, "no reply");
                    *self.last_error.lock() = CommandError::Timeout;
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| RuntimeError::internal("no attempt made")))
    }

    fn settle(&self, reply: Reply) -> RuntimeResult<Reply> {
        if let Reply::Nack { command, error, .. } = reply {
            *self.last_error.lock() = error;
            debug!(%command, %error, "command rejected");
            return Err(RuntimeError::Command { command, error });
        }
        *self.last_error.lock() = CommandError::None;
        Ok(reply)
    }

    /// Spin for `micros` microseconds on the session's tick counter
    ///
    /// Used between a pin write and its read-back; returns the counter wraps
    /// seen while waiting.
    pub fn delay_us(&self, micros: u32) -> u32 {
        busy_wait(&self.ticks, micros)
    }

    /// Send an IL command and wait for its acknowledgement
    pub async fn command(&self, frame: &Frame) -> RuntimeResult<()> {
        let FrameKind::Il { command, sequence } = frame.kind() else {
            return Err(RuntimeError::internal("only IL commands are acknowledged"));
        };
        self.exchange(frame, |reply| {
            matches!(reply, Reply::Ack { command: c, sequence: s } if *c == command && *s == sequence)
        })
        .await
        .map(|_| ())
    }

    /// Query interpreter capabilities and adopt the reported message size
    ///
    /// A device reporting another protocol version poisons the session.
    pub async fn connect(&self) -> RuntimeResult<HardwareCapabilities> {
        let frame = self.encode(|e| e.query_hardware())?;
        let reply = self
            .exchange(&frame, |reply| matches!(reply, Reply::Capabilities(_)))
            .await?;
        let Reply::Capabilities(caps) = reply else {
            return Err(RuntimeError::internal("capability query claimed another reply"));
        };
        if caps.protocol_version != NATIVE_TABLE_VERSION {
            self.poisoned.store(true, Ordering::Release);
            error!(
                expected = NATIVE_TABLE_VERSION,
                actual = caps.protocol_version,
                "device speaks another protocol"
            );
            return Err(RuntimeError::ProtocolMismatch {
                expected: NATIVE_TABLE_VERSION,
                actual: caps.protocol_version,
            });
        }
        self.encoder.lock().set_max_message_size(caps.max_message_size);
        *self.capabilities.lock() = Some(caps);
        info!(
            flash = caps.flash_size,
            ram = caps.ram_size,
            max_message_size = caps.max_message_size,
            "connected"
        );
        Ok(caps)
    }

    /// Clear uploaded code; `force` also stops running tasks
    pub async fn reset_executor(&self, force: bool) -> RuntimeResult<()> {
        let frame = self.encode(|e| e.reset_executor(force))?;
        self.command(&frame).await?;
        self.set_program_loaded(false);
        Ok(())
    }

    /// Erase the stored program
    pub async fn erase_flash(&self) -> RuntimeResult<()> {
        let frame = self.encode(|e| e.erase_flash())?;
        self.command(&frame).await
    }

    /// Whether the stored program has this version and hash
    pub async fn is_program_stored(&self, data_version: u32, hash: u32) -> RuntimeResult<bool> {
        let frame = self.encode(|e| e.check_flash_version(data_version, hash))?;
        match self.command(&frame).await {
            Ok(()) => {
                self.set_program_loaded(true);
                Ok(true)
            }
            Err(RuntimeError::Command {
                error: CommandError::InvalidArguments,
                ..
            }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read an integer system variable
    pub async fn system_variable(&self, variable: SystemVariable, pin: Option<u8>) -> RuntimeResult<i32> {
        self.system_variable_exchange(variable, pin, None).await
    }

    /// Write an integer system variable and return the value read back
    pub async fn set_system_variable(
        &self,
        variable: SystemVariable,
        pin: Option<u8>,
        value: i32,
    ) -> RuntimeResult<i32> {
        self.system_variable_exchange(variable, pin, Some(value)).await
    }

    async fn system_variable_exchange(
        &self,
        variable: SystemVariable,
        pin: Option<u8>,
        value: Option<i32>,
    ) -> RuntimeResult<i32> {
        let id = variable as u16;
        let frame = self.encode(|e| e.system_variable(variable, pin, value))?;
        let reply = self
            .exchange(&frame, |reply| matches!(reply, Reply::SystemVariable(v) if v.id == id))
            .await?;
        let Reply::SystemVariable(reply) = reply else {
            return Err(RuntimeError::internal("system variable query claimed another reply"));
        };
        if reply.status != SystemVariableError::Success {
            return Err(RuntimeError::SystemVariable {
                id,
                status: reply.status,
            });
        }
        Ok(reply.value)
    }

    /// Start `method` as a new task
    ///
    /// Refused while [`is_program_loaded`](Self::is_program_loaded) is false.
    pub async fn start_task(&self, method: Token, args: &[Value]) -> RuntimeResult<Task> {
        self.ensure_usable()?;
        if !self.is_program_loaded() {
            return Err(RuntimeError::ProgramNotLoaded);
        }
        self.tasks.evict_disposed(self.config.dispose_grace_duration());
        let task = self.tasks.allocate(method)?;
        let started = async {
            let frame = self.encode(|e| e.start_task(method, task.id(), args))?;
            self.tasks.set_state(task.id(), TaskState::Running);
            self.command(&frame).await
        };
        if let Err(e) = started.await {
            self.tasks.remove(task.id());
            return Err(e);
        }
        debug!(task = %task.id(), method = %method, "task started");
        Ok(task)
    }

    /// Run static constructors in order, stopping at the first that fails
    ///
    /// Takes the `type_initializers` of a compiled program, after its upload
    /// has committed. Each waits up to the reply timeout to end.
    pub async fn run_type_initializers(&self, initializers: &[Token]) -> RuntimeResult<()> {
        for &token in initializers {
            let task = self.start_task(token, &[]).await?;
            let outcome = task.wait(self.config.reply_timeout_duration()).await?;
            if !matches!(outcome, TaskOutcome::Completed(_)) {
                error!(initializer = %token, ?outcome, "type initializer failed");
                return Err(RuntimeError::TypeInitializer {
                    token,
                    outcome: Box::new(outcome),
                });
            }
            debug!(initializer = %token, "type initializer completed");
        }
        if !initializers.is_empty() {
            info!(count = initializers.len(), "type initializers completed");
        }
        Ok(())
    }

    /// Dispose of a task, requesting termination if it is still running
    ///
    /// Returns the state at the time of disposal; a task may keep running
    /// until the device reaches its next suspension point.
    pub async fn dispose(&self, task: Task) -> RuntimeResult<TaskState> {
        let state = task.state();
        if state.is_terminal() {
            return Ok(state);
        }
        task.cancellation().cancel();
        if state == TaskState::NotStarted {
            self.tasks.remove(task.id());
            return Ok(state);
        }
        self.tasks.evict_disposed(self.config.dispose_grace_duration());
        let frame = self.encode(|e| e.kill_task(task.method()))?;
        self.command(&frame).await?;
        self.tasks.mark_disposed(task.id());
        Ok(task.state())
    }
}

fn describe(frame: &Frame) -> String {
    match frame.kind() {
        FrameKind::Il { command, sequence } => format!("{command} #{sequence}"),
        FrameKind::Sysex(id) => format!("sysex 0x{id:02X}"),
        FrameKind::Message(command) => format!("message 0x{command:02X}"),
    }
}

fn is_nack_for(frame: &Frame, reply: &Reply) -> bool {
    match (frame.kind(), reply) {
        (
            FrameKind::Il { command, sequence },
            Reply::Nack {
                command: c,
                sequence: s,
                ..
            },
        ) => *c == command && *s == sequence,
        _ => false,
    }
}
