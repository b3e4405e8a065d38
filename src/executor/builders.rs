//! Preset pool configurations for common workload shapes.
//!
//! Each preset returns a [`ConfigBuilder`] whose fields can still be
//! overridden before building; the presets add no behavior of their own.

use crate::config::{Config, ConfigBuilder, QueuePolicy};

const FALLBACK_MAX_WORKERS: usize = 16;
const FALLBACK_MIN_WORKERS: usize = 1;
const FALLBACK_INIT_WORKERS: usize = 8;

const IO_BOUND_MAX_WORKERS: usize = 200;
const IO_BOUND_INIT_WORKERS: usize = 30;

// CPU count, falling back to the blank shape when it is unavailable.
fn ncpus() -> usize {
    match num_cpus::get() {
        0 => FALLBACK_MAX_WORKERS,
        n => n,
    }
}

/// Fixed fallback shape, independent of the host.
pub fn blank() -> ConfigBuilder {
    Config::builder()
        .policy(QueuePolicy::Fifo)
        .max_workers(FALLBACK_MAX_WORKERS)
        .min_workers(FALLBACK_MIN_WORKERS)
        .init_workers(FALLBACK_INIT_WORKERS)
        .remove_cancelled(false)
}

/// General-purpose shape: up to one worker per CPU, half warm at start.
pub fn common() -> ConfigBuilder {
    let ncpus = ncpus();
    blank().max_workers(ncpus).init_workers(ncpus / 2)
}

/// CPU-bound shape: leave half the CPUs to the rest of the process.
pub fn cpu_bound() -> ConfigBuilder {
    let ncpus = ncpus();
    blank()
        .max_workers(ncpus / 2 + 1)
        .init_workers(ncpus / 2)
}

/// I/O-bound shape: workers spend most of their time blocked, so far more
/// of them than CPUs.
pub fn io_bound() -> ConfigBuilder {
    blank()
        .max_workers(IO_BOUND_MAX_WORKERS)
        .init_workers(IO_BOUND_INIT_WORKERS)
}

/// Timer/housekeeping shape: a small fixed set, all warm.
pub fn time_bound() -> ConfigBuilder {
    let workers = (ncpus() / 2).max(FALLBACK_MIN_WORKERS);
    blank().max_workers(workers).init_workers(workers)
}
