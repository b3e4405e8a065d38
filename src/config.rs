use crate::error::{Error, Result};
use crate::executor::ThreadPool;

/// Pop discipline of the shared task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueuePolicy {
    /// Pop in push order.
    Fifo,
    /// Pop in reverse push order.
    Lifo,
    /// Pop the highest-priority task first.
    Prio,
    /// Like `Prio`, but each push overwrites the priority with a random draw.
    Rand,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        QueuePolicy::Fifo
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub policy: QueuePolicy,
    pub max_workers: usize,
    pub min_workers: usize,
    pub init_workers: usize,
    pub remove_cancelled: bool,

    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy: QueuePolicy::default(),
            max_workers: 16,
            min_workers: 1,
            init_workers: 8,
            remove_cancelled: false,
            thread_name_prefix: "taskmill-worker".to_string(),
            stack_size: Some(2 * 1024 * 1024),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::config("max_workers must be > 0"));
        }

        if self.max_workers < self.min_workers {
            return Err(Error::config("max_workers is smaller than min_workers"));
        }

        Ok(())
    }

    /// Clamp a worker count into `[min_workers, max_workers]`.
    pub fn clamp_workers(&self, count: usize) -> usize {
        count.max(self.min_workers).min(self.max_workers)
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn policy(mut self, policy: QueuePolicy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn max_workers(mut self, count: usize) -> Self {
        self.config.max_workers = count;
        self
    }

    pub fn min_workers(mut self, count: usize) -> Self {
        self.config.min_workers = count;
        self
    }

    pub fn init_workers(mut self, count: usize) -> Self {
        self.config.init_workers = count;
        self
    }

    pub fn remove_cancelled(mut self, remove: bool) -> Self {
        self.config.remove_cancelled = remove;
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Validate the configuration and spin up a pool from it.
    pub fn build_pool(self) -> Result<ThreadPool> {
        ThreadPool::new(self.build()?)
    }
}
