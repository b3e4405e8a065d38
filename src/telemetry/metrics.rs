//! Metrics collection for pool monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Task counters shared by a pool and its workers.
#[derive(Debug)]
pub struct Metrics {
    tasks_submitted: AtomicU64,
    tasks_executed: AtomicU64,
    tasks_panicked: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            tasks_submitted: AtomicU64::new(0),
            tasks_executed: AtomicU64::new(0),
            tasks_panicked: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a task entering the queue
    pub fn record_task_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed task invocation
    pub fn record_task_execution(&self) {
        self.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a task whose body panicked
    pub fn record_task_panic(&self) {
        self.tasks_panicked.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            tasks_panicked: self.tasks_panicked.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.tasks_submitted.store(0, Ordering::Relaxed);
        self.tasks_executed.store(0, Ordering::Relaxed);
        self.tasks_panicked.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of counters at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Time since the collector was created.
    pub uptime: Duration,
    /// Tasks handed to the queue.
    pub tasks_submitted: u64,
    /// Task invocations completed by workers.
    pub tasks_executed: u64,
    /// Invocations whose body panicked.
    pub tasks_panicked: u64,
}

impl MetricsSnapshot {
    /// Submitted tasks not yet executed at snapshot time.
    pub fn backlog(&self) -> u64 {
        self.tasks_submitted.saturating_sub(self.tasks_executed)
    }

    /// Calculate tasks per second
    pub fn tasks_per_second(&self) -> f64 {
        let seconds = self.uptime.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.tasks_executed as f64 / seconds
    }
}
