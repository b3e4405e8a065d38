//! Convenient re-exports for common taskmill types.
//!
//! This module provides a single import for most use cases:
//! ```
//! use taskmill::prelude::*;
//! ```

pub use crate::config::{Config, ConfigBuilder, QueuePolicy};
pub use crate::error::{Error, Result};
pub use crate::executor::{JoinError, Report, Task, TaskHandle, ThreadPool};

#[doc(inline)]
pub use crate::executor::builders;
