//! Thread-safe, policy-agnostic task queue.

use crate::config::QueuePolicy;
use crate::executor::policy::PolicyQueue;
use crate::executor::task::Task;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Shared queue feeding a pool's workers.
///
/// One mutex serialises the policy object, one condvar wakes waiters, and
/// an atomic counter mirrors the policy's element count for lock-free
/// observation. Waiters never return a task without decrementing the
/// counter; pushers never notify without incrementing first.
pub struct TaskQueue {
    inner: Mutex<PolicyQueue>,
    ready: Condvar,
    size: AtomicUsize,
}

impl TaskQueue {
    /// Create a queue with the given pop discipline.
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            inner: Mutex::new(PolicyQueue::new(policy)),
            ready: Condvar::new(),
            size: AtomicUsize::new(0),
        }
    }

    /// Enqueue a task and wake one waiter.
    pub fn push(&self, task: Task) {
        let mut inner = self.inner.lock();
        inner.push(task);
        self.size.fetch_add(1, Ordering::Release);
        drop(inner);

        self.ready.notify_one();
    }

    /// Dequeue a task, blocking until one is available.
    pub fn pop(&self) -> Task {
        let mut inner = self.inner.lock();
        loop {
            if let Some(task) = Self::take(&self.size, &mut inner) {
                return task;
            }
            self.ready.wait(&mut inner);
        }
    }

    /// Dequeue a task, blocking at most `timeout`. `None` means the queue
    /// stayed empty for the whole window.
    pub fn pop_for(&self, timeout: Duration) -> Option<Task> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(task) = Self::take(&self.size, &mut inner) {
                return Some(task);
            }
            if self.ready.wait_until(&mut inner, deadline).timed_out() {
                // One last look; a push may have landed right at the deadline.
                return Self::take(&self.size, &mut inner);
            }
        }
    }

    /// Dequeue a task, or give up as soon as `interrupt` evaluates true.
    ///
    /// The predicate runs under the queue lock and is checked before the
    /// queue itself, so an interrupted waiter never takes one more task.
    /// Wake sleeping waiters with [`wakeup_all`](TaskQueue::wakeup_all)
    /// after changing whatever state the predicate reads.
    pub fn pop_until<F>(&self, mut interrupt: F) -> Option<Task>
    where
        F: FnMut() -> bool,
    {
        let mut inner = self.inner.lock();
        loop {
            if interrupt() {
                return None;
            }
            if let Some(task) = Self::take(&self.size, &mut inner) {
                return Some(task);
            }
            self.ready.wait(&mut inner);
        }
    }

    /// Advisory element count; may be stale by one operation.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Advisory emptiness check.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wake every waiter without pushing, so pending
    /// [`pop_until`](TaskQueue::pop_until) calls re-evaluate their
    /// predicate.
    ///
    /// Call after the state the predicate reads has changed.
    pub fn wakeup_all(&self) {
        // Taking the lock first means no waiter can be between its
        // predicate check and the wait when the notify fires.
        let _inner = self.inner.lock();
        self.ready.notify_all();
    }

    fn take(size: &AtomicUsize, inner: &mut PolicyQueue) -> Option<Task> {
        let task = inner.pop()?;
        size.fetch_sub(1, Ordering::Release);
        Some(task)
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_then_pop() {
        let queue = TaskQueue::new(QueuePolicy::Fifo);

        let (task, handle) = Task::new(|| 9);
        queue.push(task);
        assert_eq!(queue.len(), 1);

        queue.pop().invoke();
        assert_eq!(handle.join().unwrap(), 9);
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_blocks_until_push() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Fifo));

        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let task = queue.pop();
                task.invoke();
            })
        };

        let (task, handle) = Task::new(|| "crossed");
        queue.push(task);

        assert_eq!(handle.join().unwrap(), "crossed");
        waiter.join().unwrap();
    }

    #[test]
    fn pop_for_times_out_on_empty_queue() {
        let queue = TaskQueue::new(QueuePolicy::Fifo);
        let start = Instant::now();

        assert!(queue.pop_for(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn pop_for_returns_available_task() {
        let queue = TaskQueue::new(QueuePolicy::Fifo);

        let (task, _handle) = Task::new(|| 1);
        queue.push(task);

        assert!(queue.pop_for(Duration::from_millis(20)).is_some());
    }

    #[test]
    fn pop_until_prefers_the_interrupt() {
        let queue = TaskQueue::new(QueuePolicy::Fifo);

        let (task, _handle) = Task::new(|| 1);
        queue.push(task);

        // Interrupt wins even though a task is waiting.
        assert!(queue.pop_until(|| true).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn wakeup_all_reevaluates_the_predicate() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Fifo));
        let stop = Arc::new(AtomicBool::new(false));

        let waiter = {
            let queue = Arc::clone(&queue);
            let stop = Arc::clone(&stop);
            thread::spawn(move || queue.pop_until(|| stop.load(Ordering::Acquire)))
        };

        // Let the waiter reach the condvar, then flip the flag and wake it.
        thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::Release);
        queue.wakeup_all();

        assert!(waiter.join().unwrap().is_none());
    }

    #[test]
    fn many_pushes_wake_many_waiters() {
        let queue = Arc::new(TaskQueue::new(QueuePolicy::Fifo));
        let mut waiters = Vec::new();

        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            waiters.push(thread::spawn(move || queue.pop().invoke()));
        }

        let handles: Vec<_> = (0..4)
            .map(|value| {
                let (task, handle) = Task::new(move || value);
                queue.push(task);
                handle
            })
            .collect();

        let mut values: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        values.sort_unstable();
        assert_eq!(values, vec![0, 1, 2, 3]);

        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(queue.len(), 0);
    }
}
