//! Error types for satupgrade-exec

use std::time::Duration;

use thiserror::Error;

/// Errors raised while running a command on a host
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Could not open a connection to the host
    #[error("connection to {host} failed: {reason}")]
    ConnectionFailed {
        /// Host we tried to reach
        host: String,
        /// Underlying transport error
        reason: String,
    },

    /// SSH authentication was rejected
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Command ran but exited non-zero
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        /// Command line that was executed
        command: String,
        /// Exit status code
        status: i32,
        /// Captured stderr
        stderr: String,
    },

    /// Command did not finish in time
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Limit that was exceeded
        timeout: Duration,
    },

    /// SSH key could not be loaded
    #[error("SSH key error: {0}")]
    SshKeyError(String),

    /// Local process could not be spawned
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// Channel or pipe I/O failed
    #[error("I/O error: {0}")]
    IoError(String),

    /// No live session to run the command on
    #[error("not connected")]
    NotConnected,
}

impl ExecError {
    /// Whether the failure is about reaching the host rather than the command itself.
    ///
    /// Readiness probes keep polling on these and give up on anything else.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            ExecError::ConnectionFailed { .. } | ExecError::Timeout { .. } | ExecError::NotConnected
        )
    }
}
