//! Error types for satupgrade-pkg

use satupgrade_exec::ExecError;
use thiserror::Error;

/// Errors from repository and package operations
#[derive(Error, Debug, Clone)]
pub enum PackageError {
    /// A repository could not be enabled or disabled
    #[error("failed to {action} repository {repo}: {message}")]
    RepositoryToggle {
        /// "enable" or "disable"
        action: &'static str,
        /// Repository label
        repo: String,
        /// Tool output explaining the failure
        message: String,
    },

    /// A plan asked to enable and disable the same repository
    #[error("repository plan {label} both enables and disables: {overlap:?}")]
    ConflictingPlan {
        /// Plan label
        label: String,
        /// Labels present in both sets
        overlap: Vec<String>,
    },

    /// A tool exited non-zero
    #[error("command failed: {status} - {message}")]
    CommandFailed {
        /// Exit status
        status: i32,
        /// Error message
        message: String,
    },

    /// The command never ran to completion on the host
    #[error("execution error: {0}")]
    Execution(#[from] ExecError),
}

impl PackageError {
    /// Map a non-zero [`ExecError::CommandFailed`] onto [`PackageError::CommandFailed`]
    pub(crate) fn from_exec(e: ExecError) -> Self {
        match e {
            ExecError::CommandFailed { status, stderr, .. } => PackageError::CommandFailed {
                status,
                message: stderr,
            },
            other => PackageError::Execution(other),
        }
    }
}
