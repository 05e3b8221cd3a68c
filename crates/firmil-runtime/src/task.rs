//! Tasks running on the device
//!
//! A [`Task`] is the host's handle on one method execution. The session that
//! started it is its only owner: it records state changes as termination
//! replies arrive and is the only way to dispose of the task. Disposing is
//! advisory; the device stops the task at its next suspension point, so a
//! disposed task may still be running for a while. The registry forgets a
//! disposed task when its termination arrives or once its grace period ends.

use firmil_types::{SystemException, TaskId, TaskState, Token, Value, VariableKind};
use firmil_wire::{TaskTermination, TerminationData};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{RuntimeError, RuntimeResult};

/// Codes below this are interpreter faults; the rest are exception type tokens
pub const MANAGED_EXCEPTION_BASE: u32 = 0xFF;

/// Reports kept per task before the oldest is dropped
const MAX_QUEUED_REPORTS: usize = 32;

/// Cooperative cancellation flag shared between a task and its observers
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create an untriggered token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; later calls have no effect
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Wait until cancellation is requested
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// How a task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Returned normally with this result slot image
    Completed(Vec<u8>),
    /// Interpreter fault
    Faulted {
        /// Raw fault code
        code: u32,
        /// Decoded fault; `None` for codes this host does not know
        exception: Option<SystemException>,
        /// Method or instruction where the fault was raised
        location: Option<Token>,
        /// Method tokens of the call stack, innermost first
        stack: Vec<Token>,
    },
    /// Unhandled managed exception
    Exception {
        /// Class token of the exception
        exception_type: Token,
        /// Method or instruction where the exception was thrown
        location: Option<Token>,
        /// Method tokens of the call stack, innermost first
        stack: Vec<Token>,
    },
    /// Stopped on request
    Aborted,
}

impl TaskOutcome {
    /// Interpret a termination report
    ///
    /// An exception code below [`MANAGED_EXCEPTION_BASE`] is a
    /// [`SystemException`]; anything above is the managed exception's type
    /// token. Code zero means no exception was raised.
    pub fn from_termination(termination: &TaskTermination) -> Self {
        let (code, tokens) = match &termination.data {
            TerminationData::Values(bytes) => return Self::Completed(bytes.clone()),
            TerminationData::Exception { code: 0, .. } => return Self::Aborted,
            TerminationData::Exception { code, tokens } => (*code, tokens.as_slice()),
        };
        let (location, rest) = match tokens.split_first() {
            Some((first, rest)) => ((*first != 0).then(|| Token::new(*first)), rest),
            None => (None, &[][..]),
        };
        let stack = stack_of(rest);
        if code >= MANAGED_EXCEPTION_BASE {
            return Self::Exception {
                exception_type: Token::new(code),
                location,
                stack,
            };
        }
        let exception = SystemException::try_from_code(code).ok();
        if exception.is_none() {
            warn!(code, task = %termination.task_id, "unknown fault code");
        }
        Self::Faulted {
            code,
            exception,
            location,
            stack,
        }
    }

    /// Final task state this outcome corresponds to
    pub fn state(&self) -> TaskState {
        match self {
            Self::Completed(_) => TaskState::Completed,
            Self::Faulted { .. } | Self::Exception { .. } => TaskState::KilledByException,
            Self::Aborted => TaskState::Aborted,
        }
    }

    /// Result read as `kind`, for a completed task
    pub fn value(&self, kind: VariableKind) -> Option<Value> {
        match self {
            Self::Completed(bytes) => Value::from_bytes(kind, bytes).ok(),
            _ => None,
        }
    }
}

/// Stack tokens follow an optional zero separator
fn stack_of(tokens: &[u32]) -> Vec<Token> {
    let tail = match tokens.iter().position(|t| *t == 0) {
        Some(at) => &tokens[at + 1..],
        None => tokens,
    };
    tail.iter().map(|t| Token::new(*t)).collect()
}

#[derive(Debug)]
struct TaskShared {
    id: TaskId,
    method: Token,
    state: Mutex<TaskState>,
    outcome: Mutex<Option<TaskOutcome>>,
    reports: Mutex<VecDeque<TaskTermination>>,
    disposed_at: Mutex<Option<Instant>>,
    changed: Notify,
    cancel: CancellationToken,
}

impl TaskShared {
    fn record(&self, report: &TaskTermination) {
        let mut reports = self.reports.lock();
        if reports.len() >= MAX_QUEUED_REPORTS
            && let Some(dropped) = reports.pop_front()
        {
            warn!(task = %self.id, state = ?dropped.state, "task report dropped");
        }
        reports.push_back(report.clone());
    }

    fn finish(&self, outcome: TaskOutcome) {
        *self.state.lock() = outcome.state();
        *self.outcome.lock() = Some(outcome);
        self.changed.notify_waiters();
    }
}

/// Host handle on one device task
#[derive(Debug)]
pub struct Task {
    shared: Arc<TaskShared>,
}

impl Task {
    /// Task id
    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    /// Method the task runs
    pub fn method(&self) -> Token {
        self.shared.method
    }

    /// Last known state
    pub fn state(&self) -> TaskState {
        *self.shared.state.lock()
    }

    /// Outcome, once the task has ended
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.shared.outcome.lock().clone()
    }

    /// Oldest report not yet taken, in arrival order
    ///
    /// Every state report is queued, including intermediate ones that carry
    /// values while the task keeps running.
    pub fn next_report(&self) -> Option<TaskTermination> {
        self.shared.reports.lock().pop_front()
    }

    /// Token triggered when disposal is requested
    pub fn cancellation(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Wait for the task to end
    pub async fn wait(&self, timeout: Duration) -> RuntimeResult<TaskOutcome> {
        let waiting = async {
            loop {
                let notified = self.shared.changed.notified();
                let mut notified = std::pin::pin!(notified);
                notified.as_mut().enable();
                if let Some(outcome) = self.outcome() {
                    return outcome;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, waiting)
            .await
            .map_err(|_| RuntimeError::Timeout {
                request: self.id().to_string(),
                elapsed: timeout,
            })
    }
}

/// Tasks started by one session
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<FxHashMap<TaskId, Arc<TaskShared>>>,
    next: Mutex<u16>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks not yet known to have ended
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether no task is live
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Register a task for `method` under a free id
    pub fn allocate(&self, method: Token) -> RuntimeResult<Task> {
        let mut tasks = self.tasks.lock();
        let mut next = self.next.lock();
        for _ in 0..TaskId::MAX {
            *next = if *next >= TaskId::MAX { 1 } else { *next + 1 };
            let id = TaskId::new(*next);
            if tasks.contains_key(&id) {
                continue;
            }
            let shared = Arc::new(TaskShared {
                id,
                method,
                state: Mutex::new(TaskState::NotStarted),
                outcome: Mutex::new(None),
                reports: Mutex::new(VecDeque::new()),
                disposed_at: Mutex::new(None),
                changed: Notify::new(),
                cancel: CancellationToken::new(),
            });
            tasks.insert(id, Arc::clone(&shared));
            return Ok(Task { shared });
        }
        Err(RuntimeError::TasksExhausted)
    }

    /// Record a state change of a live task
    pub fn set_state(&self, id: TaskId, state: TaskState) {
        if let Some(task) = self.tasks.lock().get(&id) {
            *task.state.lock() = state;
            task.changed.notify_waiters();
        }
    }

    /// Apply a termination report; returns false for ids this session never started
    pub fn terminate(&self, termination: &TaskTermination) -> bool {
        if !termination.state.is_terminal() {
            let Some(task) = self.tasks.lock().get(&termination.task_id).cloned() else {
                warn!(task = %termination.task_id, state = ?termination.state, "report for unknown task");
                return false;
            };
            task.record(termination);
            *task.state.lock() = termination.state;
            task.changed.notify_waiters();
            return true;
        }
        let Some(task) = self.tasks.lock().remove(&termination.task_id) else {
            warn!(task = %termination.task_id, "termination for unknown task");
            return false;
        };
        task.record(termination);
        let outcome = TaskOutcome::from_termination(termination);
        debug!(task = %task.id, state = ?outcome.state(), "task ended");
        task.finish(outcome);
        true
    }

    /// Start the grace period of a task whose disposal was requested
    pub fn mark_disposed(&self, id: TaskId) {
        if let Some(task) = self.tasks.lock().get(&id) {
            task.disposed_at.lock().get_or_insert_with(Instant::now);
        }
    }

    /// Forget disposed tasks whose grace period has ended; returns how many
    pub fn evict_disposed(&self, grace: Duration) -> usize {
        let evicted: Vec<_> = {
            let mut tasks = self.tasks.lock();
            let expired: Vec<TaskId> = tasks
                .values()
                .filter(|t| t.disposed_at.lock().is_some_and(|at| at.elapsed() >= grace))
                .map(|t| t.id)
                .collect();
            expired.iter().filter_map(|id| tasks.remove(id)).collect()
        };
        for task in &evicted {
            warn!(task = %task.id, method = %task.method, "disposed task never reported its end");
            task.finish(TaskOutcome::Aborted);
        }
        evicted.len()
    }

    /// Forget a task without waiting for its end
    pub fn remove(&self, id: TaskId) {
        self.tasks.lock().remove(&id);
    }

    /// End every live task; used when the device restarts
    pub fn abort_all(&self) {
        let drained: Vec<_> = self.tasks.lock().drain().map(|(_, t)| t).collect();
        for task in drained {
            task.cancel.cancel();
            task.finish(TaskOutcome::Aborted);
        }
    }
}
