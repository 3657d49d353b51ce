//! The execution capability the workflows are written against

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::ExecError;
use crate::result::CommandResult;

/// Runs shell commands on one host
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Host this executor talks to
    fn host(&self) -> &str;

    /// Run a command; a non-zero exit is still `Ok`
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Run a command, failing with [`ExecError::Timeout`] past `timeout`
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Run a command and turn a non-zero exit into [`ExecError::CommandFailed`]
    async fn run_checked(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        let result = self.run(cmd).await?;
        if result.success() {
            Ok(result)
        } else {
            Err(ExecError::CommandFailed {
                command: cmd.to_string(),
                status: result.status,
                stderr: result.stderr,
            })
        }
    }

    /// Run a command whose failure must not stop the caller.
    ///
    /// Errors and non-zero exits are logged and reported as `None`.
    async fn run_tolerant(&self, cmd: &str) -> Option<CommandResult> {
        match self.run_checked(cmd).await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(host = %self.host(), command = %cmd, error = %e, "ignoring command failure");
                None
            }
        }
    }

    /// Forget any cached connection so the next command reconnects
    async fn reset(&self) {}

    /// Whether a session is currently held open
    fn is_connected(&self) -> bool {
        false
    }

    /// Short name for logs ("ssh", "local", ...)
    fn executor_type(&self) -> &'static str;
}
