//! Task representation and one-shot result delivery.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

/// Priority assigned to freshly constructed tasks.
pub const DEFAULT_PRIORITY: i8 = 0;

/// Rethrowable payload captured from a panicking task body.
pub type PanicPayload = Box<dyn Any + Send + 'static>;

/// A prepared closure plus the producing half of its one-shot result
/// channel.
///
/// The closure's return type is erased at construction: the typed sender is
/// captured inside the boxed entry, so queues and workers handle every task
/// uniformly. Tasks are move-only and their channel fulfils exactly once —
/// either with the closure's value or with the panic it raised.
pub struct Task {
    func: Box<dyn FnOnce() -> bool + Send + 'static>,
    priority: i8,
}

impl Task {
    /// Wrap a closure into a task, handing back the consumer for its
    /// eventual outcome.
    ///
    /// Captured state moves into the closure; the engine never sees `R`.
    pub fn new<F, R>(func: F) -> (Task, TaskHandle<R>)
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (sender, receiver) = bounded(1);

        let entry = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(func));
            let clean = outcome.is_ok();
            // The submitter may have dropped the handle already.
            let _ = sender.send(outcome);
            clean
        });

        (
            Task {
                func: entry,
                priority: DEFAULT_PRIORITY,
            },
            TaskHandle { receiver },
        )
    }

    /// Run the closure and fulfil the channel. Consumes the task.
    ///
    /// A panicking body is captured and routed through the channel; the
    /// returned flag reports whether the body completed without panicking
    /// and exists only for telemetry.
    pub fn invoke(self) -> bool {
        (self.func)()
    }

    /// Task priority. Higher values pop first under the `Prio` policy.
    pub fn priority(&self) -> i8 {
        self.priority
    }

    /// Set the task priority.
    ///
    /// Meaningful only before the task is enqueued; `Rand` queues overwrite
    /// it during push.
    pub fn set_priority(&mut self, priority: i8) {
        self.priority = priority;
    }

    /// Builder-style variant of [`set_priority`](Task::set_priority).
    pub fn with_priority(mut self, priority: i8) -> Self {
        self.priority = priority;
        self
    }
}

// Tasks order by priority alone.
impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Eq for Task {}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Task {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority.cmp(&other.priority)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// One-shot consumer for a task's outcome.
///
/// Reading the outcome synchronises with the worker's write at invocation
/// end, so any memory effect of the task body is visible to the caller
/// afterwards.
pub struct TaskHandle<R> {
    receiver: Receiver<std::thread::Result<R>>,
}

impl<R> TaskHandle<R> {
    /// Block until the task fulfils, returning its value or the error that
    /// ended it.
    pub fn join(self) -> std::result::Result<R, JoinError> {
        match self.receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(JoinError::Panicked(payload)),
            Err(_) => Err(JoinError::Lost),
        }
    }

    /// Non-blocking probe. `None` means the task has not fulfilled yet.
    pub fn try_join(&self) -> Option<std::result::Result<R, JoinError>> {
        match self.receiver.try_recv() {
            Ok(Ok(value)) => Some(Ok(value)),
            Ok(Err(payload)) => Some(Err(JoinError::Panicked(payload))),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(JoinError::Lost)),
        }
    }

    /// Like [`join`](TaskHandle::join), but gives up after `timeout`.
    /// `None` distinguishes a timeout from a fulfilled outcome.
    pub fn join_timeout(&self, timeout: Duration) -> Option<std::result::Result<R, JoinError>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(Ok(value)) => Some(Ok(value)),
            Ok(Err(payload)) => Some(Err(JoinError::Panicked(payload))),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(JoinError::Lost)),
        }
    }
}

impl<R> fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").finish_non_exhaustive()
    }
}

/// Why a [`TaskHandle`] could not produce a value.
pub enum JoinError {
    /// The task body panicked; the payload can be rethrown.
    Panicked(PanicPayload),
    /// The task was destroyed without ever fulfilling its channel.
    Lost,
}

impl JoinError {
    /// Whether this error carries a panic payload.
    pub fn is_panic(&self) -> bool {
        matches!(self, JoinError::Panicked(_))
    }

    /// Take the panic payload, e.g. to rethrow with
    /// `std::panic::resume_unwind`.
    ///
    /// # Panics
    ///
    /// Panics if this error is not [`JoinError::Panicked`]; check
    /// [`is_panic`](JoinError::is_panic) first.
    pub fn into_panic(self) -> PanicPayload {
        match self {
            JoinError::Panicked(payload) => payload,
            JoinError::Lost => panic!("JoinError is not a panic"),
        }
    }

    fn message(&self) -> &str {
        match self {
            JoinError::Panicked(payload) => {
                if let Some(s) = payload.downcast_ref::<&str>() {
                    s
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s
                } else {
                    "unknown panic"
                }
            }
            JoinError::Lost => "task dropped before it could fulfil",
        }
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::Panicked(_) => write!(f, "task panicked: {}", self.message()),
            JoinError::Lost => write!(f, "{}", self.message()),
        }
    }
}

impl fmt::Debug for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::Panicked(_) => f
                .debug_tuple("Panicked")
                .field(&self.message().to_string())
                .finish(),
            JoinError::Lost => f.debug_tuple("Lost").finish(),
        }
    }
}

impl std::error::Error for JoinError {}
