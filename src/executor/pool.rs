//! Thread pool: one shared queue and two collections of workers.

use crate::config::Config;
use crate::error::Result;
use crate::executor::queue::TaskQueue;
use crate::executor::task::{Task, TaskHandle};
use crate::executor::worker::{Worker, WorkerId};
use crate::telemetry::{Metrics, MetricsSnapshot};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Snapshot of worker states across both pool collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Report {
    /// Workers in the active collection.
    pub running: usize,
    /// Parked workers that have not yet observed their cancellation.
    pub cancel_wait: usize,
    /// Parked workers whose thread has exited.
    pub cancelled: usize,
}

// Both collections live behind the one pool lock; every composite
// operation holds it end to end. Lock order is pool -> worker inner ->
// queue, and workers never take the pool lock.
struct WorkerSet {
    active: VecDeque<Worker>,
    parked: VecDeque<Worker>,
    next_id: WorkerId,
}

/// A resizable pool of workers draining one policy-driven queue.
///
/// Shrinking parks workers instead of discarding them; a later grow reuses
/// parked workers before spawning fresh OS threads.
pub struct ThreadPool {
    config: Config,
    queue: Arc<TaskQueue>,
    workers: Mutex<WorkerSet>,
    metrics: Arc<Metrics>,
}

impl ThreadPool {
    /// Build a pool from a validated configuration and bring up
    /// `init_workers` (clamped into `[min_workers, max_workers]`) workers.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let pool = Self {
            queue: Arc::new(TaskQueue::new(config.policy)),
            workers: Mutex::new(WorkerSet {
                active: VecDeque::new(),
                parked: VecDeque::new(),
                next_id: 0,
            }),
            metrics: Arc::new(Metrics::new()),
            config,
        };

        pool.resize_workers(pool.config.init_workers);
        Ok(pool)
    }

    /// The configuration the pool was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Wrap a closure into a task, enqueue it, and hand back the consumer
    /// for its outcome. Submission cannot fail.
    pub fn submit<F, R>(&self, func: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (task, handle) = Task::new(func);
        self.submit_task(task);
        handle
    }

    /// Enqueue a prepared task, e.g. one built with a non-default priority.
    /// Its handle was taken at construction.
    pub fn submit_task(&self, task: Task) {
        self.metrics.record_task_submitted();
        self.queue.push(task);
    }

    /// Change the active worker count to `new_size`, clamped into
    /// `[min_workers, max_workers]`.
    ///
    /// Growing reuses parked workers before creating fresh ones. Shrinking
    /// parks and cancels workers, then wakes the queue so blocked workers
    /// re-check their state; the reduction takes effect at each worker's
    /// next loop boundary, and in-flight tasks are never interrupted. With
    /// `remove_cancelled` set, fully cancelled parked workers are dropped
    /// afterwards.
    pub fn resize_workers(&self, new_size: usize) {
        let mut set = self.workers.lock();

        let new_size = self.config.clamp_workers(new_size);
        let prev_size = set.active.len();

        if prev_size == new_size {
            return;
        }

        if prev_size < new_size {
            let mut deficit = new_size - prev_size;
            deficit -= self.reuse_workers(&mut set, deficit);

            for _ in 0..deficit {
                let worker = self.spawn_worker(&mut set);
                set.active.push_back(worker);
            }
            return;
        }

        self.cancel_workers(&mut set, prev_size - new_size);

        if self.config.remove_cancelled {
            set.parked.retain(|worker| !worker.is_cancelled());
        }
    }

    /// Cancel every active worker. Queued tasks stay queued; a later
    /// [`resize_workers`](ThreadPool::resize_workers) picks them back up.
    pub fn release(&self) {
        let mut set = self.workers.lock();
        let active = set.active.len();
        self.cancel_workers(&mut set, active);
    }

    /// Count worker states across both collections.
    pub fn report(&self) -> Report {
        let set = self.workers.lock();

        let mut report = Report {
            running: set.active.len(),
            ..Report::default()
        };

        for worker in &set.parked {
            if worker.is_cancelled() {
                report.cancelled += 1;
            } else if worker.is_cancel_wait() {
                report.cancel_wait += 1;
            }
        }

        report
    }

    /// Snapshot of the pool's task counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // Move parked workers back to active, waking each. Returns how many
    // were actually reused.
    fn reuse_workers(&self, set: &mut WorkerSet, need: usize) -> usize {
        let mut reused = 0;
        while reused < need {
            let Some(mut worker) = set.parked.pop_front() else {
                break;
            };
            worker.uncancel();
            set.active.push_back(worker);
            reused += 1;
        }
        reused
    }

    // Move active workers to parked and mark each for cancellation, then
    // wake the queue so blocked workers observe the request.
    fn cancel_workers(&self, set: &mut WorkerSet, need: usize) -> usize {
        let mut cancelled = 0;
        while cancelled < need {
            let Some(worker) = set.active.pop_front() else {
                break;
            };
            worker.cancel();
            set.parked.push_back(worker);
            cancelled += 1;
        }

        self.queue.wakeup_all();
        cancelled
    }

    fn spawn_worker(&self, set: &mut WorkerSet) -> Worker {
        let id = set.next_id;
        set.next_id += 1;

        let mut worker = Worker::new(
            Arc::clone(&self.queue),
            id,
            &self.config.thread_name_prefix,
            self.config.stack_size,
            Arc::clone(&self.metrics),
        );
        worker.run();
        worker
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.release();
        // Dropping the collections joins each worker's thread.
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report();
        f.debug_struct("ThreadPool")
            .field("policy", &self.config.policy)
            .field("report", &report)
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}
