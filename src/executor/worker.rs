//! Worker thread lifecycle and take-and-run loop.

use crate::executor::queue::TaskQueue;
use crate::telemetry::Metrics;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Identifier a pool assigns to each worker it creates.
pub type WorkerId = usize;

/// Worker lifecycle status.
///
/// ```text
/// Created --run()--> Running --cancel()--> CancelWait --(loop observes)--> Cancelled
///    ^                  ^                                                     |
///    |                  +-------- uncancel() (CancelWait -> Running) ---------+
///    +--------------- uncancel() (Created/Cancelled -> run()) ----------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerStatus {
    /// Constructed, no thread spawned yet.
    Created = 0,
    /// The background thread is driving the loop.
    Running = 1,
    /// Asked to stop; the loop has not observed the request yet.
    CancelWait = 2,
    /// The loop observed the request and exited.
    Cancelled = 3,
}

impl WorkerStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerStatus::Created,
            1 => WorkerStatus::Running,
            2 => WorkerStatus::CancelWait,
            _ => WorkerStatus::Cancelled,
        }
    }
}

// Shared between the owning Worker and its thread, so moving the owner
// between pool collections never invalidates the thread's view.
struct WorkerState {
    status: AtomicU8,
    lock: Mutex<()>,
    cancel_notify: Condvar,
}

impl WorkerState {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(WorkerStatus::Created as u8),
            lock: Mutex::new(()),
            cancel_notify: Condvar::new(),
        }
    }

    fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: WorkerStatus) {
        self.status.store(status as u8, Ordering::Release);
    }
}

/// One background thread pulling tasks off a shared queue.
///
/// Move-only; state transitions go through the shared inner block under its
/// own mutex, which both the owner and the thread take.
pub struct Worker {
    id: WorkerId,
    name: String,
    stack_size: Option<usize>,
    queue: Arc<TaskQueue>,
    thread: Option<JoinHandle<()>>,
    state: Arc<WorkerState>,
    metrics: Arc<Metrics>,
}

impl Worker {
    /// Create a worker in the `Created` state. No thread is spawned until
    /// [`run`](Worker::run).
    pub fn new(
        queue: Arc<TaskQueue>,
        id: WorkerId,
        name_prefix: &str,
        stack_size: Option<usize>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            id,
            name: format!("{name_prefix}-{id}"),
            stack_size,
            queue,
            thread: None,
            state: Arc::new(WorkerState::new()),
            metrics,
        }
    }

    /// Worker id assigned at creation.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Spawn the background thread and move to `Running`.
    ///
    /// Fails (returns `false`) if the worker is already `Running` or
    /// `CancelWait`, or if the OS refuses the thread.
    pub fn run(&mut self) -> bool {
        let guard = self.state.lock.lock();

        if self.is_running() || self.is_cancel_wait() {
            return false;
        }

        // A Cancelled worker still holds its exited thread's handle.
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }

        let queue = Arc::clone(&self.queue);
        let state = Arc::clone(&self.state);
        let metrics = Arc::clone(&self.metrics);

        let mut builder = thread::Builder::new().name(self.name.clone());
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }

        match builder.spawn(move || worker_loop(&queue, &state, &metrics)) {
            Ok(handle) => {
                self.thread = Some(handle);
                self.state.set_status(WorkerStatus::Running);
                drop(guard);
                true
            }
            Err(_) => false,
        }
    }

    /// Ask the worker to stop at its next loop boundary.
    ///
    /// Fails (returns `false`) if there is nothing to cancel (`Created`) or
    /// the worker is already `Cancelled`. Does not wait, and does not wake
    /// the queue; callers holding a reference to it should follow up with
    /// [`TaskQueue::wakeup_all`].
    pub fn cancel(&self) -> bool {
        let _guard = self.state.lock.lock();

        if self.is_cancelled() || self.is_created() {
            return false;
        }

        self.state.set_status(WorkerStatus::CancelWait);
        true
    }

    /// Take back a pending cancellation, or restart an exited worker.
    ///
    /// `Running` fails, `CancelWait` flips back to `Running`, and
    /// `Created`/`Cancelled` delegate to [`run`](Worker::run).
    pub fn uncancel(&mut self) -> bool {
        {
            let _guard = self.state.lock.lock();

            if self.is_running() {
                return false;
            }

            if self.is_cancel_wait() {
                self.state.set_status(WorkerStatus::Running);
                return true;
            }
        }

        self.run()
    }

    /// Block until the worker reaches `Cancelled`.
    pub fn wait_for_cancel(&self) {
        let mut guard = self.state.lock.lock();
        while !self.is_cancelled() {
            self.state.cancel_notify.wait(&mut guard);
        }
    }

    /// Block until the worker reaches `Cancelled` or `timeout` elapses.
    /// Returns whether the worker was cancelled in time.
    pub fn wait_for_cancel_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.state.lock.lock();
        while !self.is_cancelled() {
            if self
                .state
                .cancel_notify
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                return self.is_cancelled();
            }
        }
        true
    }

    /// Current lifecycle status.
    pub fn status(&self) -> WorkerStatus {
        self.state.status()
    }

    /// Whether the worker is `Created`.
    pub fn is_created(&self) -> bool {
        self.status() == WorkerStatus::Created
    }

    /// Whether the worker is `Running`.
    pub fn is_running(&self) -> bool {
        self.status() == WorkerStatus::Running
    }

    /// Whether the worker is `CancelWait`.
    pub fn is_cancel_wait(&self) -> bool {
        self.status() == WorkerStatus::CancelWait
    }

    /// Whether the worker is `Cancelled`.
    pub fn is_cancelled(&self) -> bool {
        self.status() == WorkerStatus::Cancelled
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(handle) = self.thread.take() {
            self.cancel();
            self.queue.wakeup_all();
            let _ = handle.join();
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn worker_loop(queue: &TaskQueue, state: &WorkerState, metrics: &Metrics) {
    loop {
        let task = queue.pop_until(|| state.status() == WorkerStatus::CancelWait);

        if let Some(task) = task {
            // The task captures its own panics; the flag is telemetry only.
            let clean = task.invoke();
            metrics.record_task_execution();
            if !clean {
                metrics.record_task_panic();
            }
        }

        let guard = state.lock.lock();
        if state.status() == WorkerStatus::CancelWait {
            state.set_status(WorkerStatus::Cancelled);
            drop(guard);
            state.cancel_notify.notify_all();
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueuePolicy;
    use crate::executor::task::Task;
    use parking_lot::Mutex as PlMutex;

    fn test_worker(queue: &Arc<TaskQueue>) -> Worker {
        Worker::new(
            Arc::clone(queue),
            0,
            "test-worker",
            None,
            Arc::new(Metrics::new()),
        )
    }

    fn cancel_and_wait(worker: &Worker, queue: &TaskQueue) {
        worker.cancel();
        queue.wakeup_all();
        worker.wait_for_cancel();
    }

    #[test]
    fn single_worker_executes_a_task() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Fifo));
        let mut worker = test_worker(&queue);
        assert!(worker.run());

        let (task, handle) = Task::new(|| 42);
        queue.push(task);

        assert_eq!(handle.join().unwrap(), 42);
        cancel_and_wait(&worker, &queue);
    }

    #[test]
    fn multiple_workers_share_a_queue() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Fifo));
        let mut worker1 = test_worker(&queue);
        let mut worker2 = test_worker(&queue);
        assert!(worker1.run());
        assert!(worker2.run());

        let handles: Vec<_> = (1..=3)
            .map(|value| {
                let (task, handle) = Task::new(move || value);
                queue.push(task);
                handle
            })
            .collect();

        for (index, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), index as i32 + 1);
        }
    }

    #[test]
    fn lifo_queue_drains_in_reverse_with_one_worker() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Lifo));
        let completion_order = Arc::new(PlMutex::new(Vec::new()));

        // Fill the queue before any worker exists, then drain with one.
        let handles: Vec<_> = (0..3)
            .map(|value| {
                let order = Arc::clone(&completion_order);
                let (task, handle) = Task::new(move || {
                    order.lock().push(value);
                    value
                });
                queue.push(task);
                handle
            })
            .collect();

        let mut worker = test_worker(&queue);
        assert!(worker.run());

        for (value, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), value);
        }
        assert_eq!(*completion_order.lock(), vec![2, 1, 0]);
    }

    #[test]
    fn run_fails_while_running() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Fifo));
        let mut worker = test_worker(&queue);

        assert!(worker.run());
        assert!(!worker.run());
        assert!(worker.is_running());
    }

    #[test]
    fn cancel_fails_before_run_and_after_exit() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Fifo));
        let mut worker = test_worker(&queue);

        assert!(!worker.cancel());
        assert!(worker.is_created());

        worker.run();
        cancel_and_wait(&worker, &queue);

        // Already cancelled: repeated cancels are no-ops.
        assert!(!worker.cancel());
        assert!(worker.is_cancelled());
    }

    #[test]
    fn repeated_cancel_while_pending_keeps_cancel_wait() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Fifo));
        let mut worker = test_worker(&queue);
        worker.run();

        // Park the loop on a long task so CancelWait is not observed yet.
        let (task, _handle) = Task::new(|| thread::sleep(Duration::from_millis(100)));
        queue.push(task);
        thread::sleep(Duration::from_millis(20));

        assert!(worker.cancel());
        assert!(worker.is_cancel_wait());
        assert!(worker.cancel());
        assert!(worker.is_cancel_wait());

        queue.wakeup_all();
        worker.wait_for_cancel();
    }

    #[test]
    fn uncancel_reverts_a_pending_cancel() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Fifo));
        let mut worker = test_worker(&queue);
        worker.run();

        let (task, _handle) = Task::new(|| thread::sleep(Duration::from_millis(100)));
        queue.push(task);
        thread::sleep(Duration::from_millis(20));

        worker.cancel();
        assert!(worker.uncancel());
        assert!(worker.is_running());

        // Still serving tasks after the revert.
        let (task, handle) = Task::new(|| 7);
        queue.push(task);
        assert_eq!(handle.join().unwrap(), 7);

        cancel_and_wait(&worker, &queue);
    }

    #[test]
    fn uncancel_respawns_a_cancelled_worker() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Fifo));
        let mut worker = test_worker(&queue);
        worker.run();
        cancel_and_wait(&worker, &queue);

        assert!(worker.uncancel());
        assert!(worker.is_running());

        let (task, handle) = Task::new(|| "revived");
        queue.push(task);
        assert_eq!(handle.join().unwrap(), "revived");

        cancel_and_wait(&worker, &queue);
    }

    #[test]
    fn uncancel_fails_while_running() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Fifo));
        let mut worker = test_worker(&queue);
        worker.run();

        assert!(!worker.uncancel());
        assert!(worker.is_running());
    }

    #[test]
    fn uncancel_starts_a_created_worker() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Fifo));
        let mut worker = test_worker(&queue);

        assert!(worker.uncancel());
        assert!(worker.is_running());
    }

    #[test]
    fn wait_for_cancel_timeout_reports_timeouts() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Fifo));
        let mut worker = test_worker(&queue);
        worker.run();

        // No cancel requested: the wait must time out.
        assert!(!worker.wait_for_cancel_timeout(Duration::from_millis(20)));

        worker.cancel();
        queue.wakeup_all();
        assert!(worker.wait_for_cancel_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn panicking_task_does_not_kill_the_worker() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Fifo));
        let mut worker = test_worker(&queue);
        worker.run();

        let (bad, bad_handle) = Task::new(|| -> i32 { panic!("task failed") });
        let (good, good_handle) = Task::new(|| 11);
        queue.push(bad);
        queue.push(good);

        assert!(bad_handle.join().unwrap_err().is_panic());
        assert_eq!(good_handle.join().unwrap(), 11);
        assert!(worker.is_running());
    }

    #[test]
    fn drop_joins_a_running_worker() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Fifo));
        let mut worker = test_worker(&queue);
        worker.run();

        let (task, handle) = Task::new(|| 3);
        queue.push(task);
        assert_eq!(handle.join().unwrap(), 3);

        // Must not hang.
        drop(worker);
    }
}
