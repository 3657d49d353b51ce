//! Workflow error taxonomy

use std::time::Duration;

use satupgrade_exec::ExecError;
use satupgrade_pkg::PackageError;
use thiserror::Error;

use crate::state::WorkflowPhase;

/// Fatal conditions that abort an upgrade workflow
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    /// Contradictory or missing configuration, detected before any remote action
    #[error("configuration error: {0}")]
    Config(String),

    /// A host could not be reached over SSH
    #[error("host {host} is not reachable: {reason}")]
    Unreachable {
        /// Host that did not answer
        host: String,
        /// Last error seen
        reason: String,
    },

    /// Capsule batch contained hosts that did not answer ping
    #[error("non-responsive hosts: {}", .0.join(", "))]
    NonResponsiveHosts(Vec<String>),

    /// Pulp content migration reported failure
    #[error("content migration failed on {host}")]
    MigrationFailed {
        /// Satellite being migrated
        host: String,
    },

    /// Maintenance tool or installer reported failure
    #[error("upgrade failed on {host}: {reason}")]
    UpgradeFailed {
        /// Host being upgraded
        host: String,
        /// Failure reported by the tooling
        reason: String,
    },

    /// Post-upgrade checks did not pass
    #[error("upgrade validation failed on {host}: {reason}")]
    ValidationFailed {
        /// Host that failed validation
        host: String,
        /// Check that failed
        reason: String,
    },

    /// A bounded wait expired
    #[error("timed out after {timeout:?} waiting for {waiting_for} on {host}")]
    Timeout {
        /// Host being waited on
        host: String,
        /// What the wait was for
        waiting_for: &'static str,
        /// Limit that expired
        timeout: Duration,
    },

    /// A remote step failed
    #[error("{step} failed on {host}: {source}")]
    Step {
        /// Host the step ran on
        host: String,
        /// Step name
        step: &'static str,
        /// Underlying tool error
        source: PackageError,
    },

    /// Command could not be executed
    #[error("remote execution failed on {host}: {source}")]
    Exec {
        /// Host the command targeted
        host: String,
        /// Underlying transport error
        source: ExecError,
    },

    /// Coordinator tried to move its state machine backwards
    #[error("invalid phase transition from {from} to {to}")]
    InvalidTransition {
        /// Current phase
        from: WorkflowPhase,
        /// Requested phase
        to: WorkflowPhase,
    },
}

/// Coarse classification of [`WorkflowError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Detected before any remote action
    Configuration,
    /// Host unreachable or SSH not ready
    Connectivity,
    /// Tooling reported failure (upgrade, migration, validation, remote step)
    UpgradePath,
    /// Bounded wait expired
    Timeout,
    /// Coordinator bug
    Internal,
}

impl WorkflowError {
    /// Taxonomy bucket of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Config(_) => ErrorKind::Configuration,
            WorkflowError::Unreachable { .. } | WorkflowError::NonResponsiveHosts(_) => {
                ErrorKind::Connectivity
            }
            WorkflowError::Exec { source, .. } if source.is_connectivity() => {
                ErrorKind::Connectivity
            }
            WorkflowError::Step {
                source: PackageError::Execution(e),
                ..
            } if e.is_connectivity() => ErrorKind::Connectivity,
            WorkflowError::MigrationFailed { .. }
            | WorkflowError::UpgradeFailed { .. }
            | WorkflowError::ValidationFailed { .. }
            | WorkflowError::Step { .. }
            | WorkflowError::Exec { .. } => ErrorKind::UpgradePath,
            WorkflowError::Timeout { .. } => ErrorKind::Timeout,
            WorkflowError::InvalidTransition { .. } => ErrorKind::Internal,
        }
    }

    /// Wrap a tool error with the host and step it came from
    pub fn step(host: &str, step: &'static str) -> impl FnOnce(PackageError) -> Self {
        let host = host.to_string();
        move |source| WorkflowError::Step { host, step, source }
    }

    /// Wrap a transport error with the host it came from
    pub fn exec(host: &str) -> impl FnOnce(ExecError) -> Self {
        let host = host.to_string();
        move |source| WorkflowError::Exec { host, source }
    }
}
