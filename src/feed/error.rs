use thiserror::Error;

/// Failures the connection manager reports to its owner.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("gave up after {attempts} reconnect attempts")]
    MaxAttemptsExceeded { attempts: u32 },

    #[error("not subscribed within {secs}s")]
    HandshakeTimeout { secs: u64 },

    #[error("connection already started")]
    AlreadyStarted,

    #[error("connection manager is not running")]
    NotRunning,

    #[error("connection task failed: {0}")]
    Task(String),
}
