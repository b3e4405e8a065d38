//! Error types for the taskmill engine.

/// Result type alias for taskmill operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or driving a pool.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Executor error
    #[error("executor error: {0}")]
    Executor(String),
}

impl Error {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Create an executor error
    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }
}
