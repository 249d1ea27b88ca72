//! WolfLeader Error Types

use thiserror::Error;

/// Result type alias for WolfLeader operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfLeader error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Service lifecycle errors
    #[error("Leader election service has been shut down")]
    AlreadyShutdown,

    #[error("Leader election service is shutting down")]
    ServiceShutdown,

    #[error("Leader election service is shutting down after a fatal error: {0}")]
    Fatal(#[source] Box<Error>),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    // Callback errors
    #[error("Callback '{operation}' failed: {source}")]
    Callback {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Callback '{operation}' panicked: {message}")]
    CallbackPanicked {
        operation: &'static str,
        message: String,
    },

    // Executor errors
    #[error("Executor rejected work: {0}")]
    ExecutorRejected(String),

    #[error("Dispatched work was dropped before it ran")]
    DispatchDropped,

    #[error("No tokio runtime available")]
    NoRuntime,
}

impl Error {
    /// Check if this error means the service is (or is going) down
    pub fn is_shutdown(&self) -> bool {
        matches!(
            self,
            Error::AlreadyShutdown | Error::ServiceShutdown | Error::Fatal(_)
        )
    }

    /// Check if this error was raised by contender or listener code
    pub fn is_callback_failure(&self) -> bool {
        matches!(self, Error::Callback { .. } | Error::CallbackPanicked { .. })
    }
}
