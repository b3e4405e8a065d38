//! taskmill - a policy-driven, resizable task-execution engine.
//!
//! A pool of worker threads drains one shared queue whose pop order is
//! picked at build time (FIFO, LIFO, priority, or random). Submitting a
//! closure hands back a one-shot handle for its outcome; panicking bodies
//! deliver their panic through the handle instead of taking the worker
//! down. The active worker count can be resized at runtime without
//! dropping queued work, and cancelled workers are parked for reuse
//! rather than discarded.
//!
//! # Quick Start
//!
//! ```no_run
//! use taskmill::prelude::*;
//!
//! let pool = builders::common().build_pool().unwrap();
//!
//! let handle = pool.submit(|| 1 + 1);
//! assert_eq!(handle.join().unwrap(), 2);
//!
//! // Scale with the load, then wind back down.
//! pool.resize_workers(8);
//! pool.resize_workers(1);
//! ```
//!
//! # Features
//!
//! - **Queue policies**: FIFO, LIFO, priority, and randomized pop order
//! - **Runtime resizing**: grow and shrink the worker set without losing
//!   queued tasks
//! - **Worker reuse**: parked workers are woken before new threads spawn
//! - **Panic isolation**: a failing task fulfils its own handle and leaves
//!   its siblings alone
//! - **Telemetry**: cheap task counters, snapshot-able at any time

// Lint configuration
#![warn(missing_docs, missing_debug_implementations)]
#![allow(dead_code)]

pub mod config;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod telemetry;

// Re-export key types at crate root
pub use config::{Config, ConfigBuilder, QueuePolicy};
pub use error::{Error, Result};
pub use executor::builders;
pub use executor::{JoinError, Report, Task, TaskHandle, ThreadPool};
