//! `foreman-maintain`: the product's own upgrade and service tooling

use std::sync::Arc;

use satupgrade_exec::RemoteExecutor;
use tracing::{info, instrument, warn};

use crate::error::PackageError;

/// `foreman-maintain` on one Satellite or Capsule host
pub struct ForemanMaintain {
    executor: Arc<dyn RemoteExecutor>,
}

/// Lock state of the package-installation check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageLock {
    Lock,
    Unlock,
}

impl PackageLock {
    fn as_arg(self) -> &'static str {
        match self {
            PackageLock::Lock => "lock",
            PackageLock::Unlock => "unlock",
        }
    }
}

impl ForemanMaintain {
    /// Create a wrapper running commands through `executor`
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { executor }
    }

    async fn checked(&self, cmd: &str) -> Result<(), PackageError> {
        self.executor
            .run_checked(cmd)
            .await
            .map(|_| ())
            .map_err(PackageError::from_exec)
    }

    /// Build the `upgrade run` command line
    #[must_use]
    pub fn upgrade_command(target_version: &str, whitelist: &[String]) -> String {
        let mut cmd = format!("foreman-maintain upgrade run --target-version {target_version} -y");
        if !whitelist.is_empty() {
            cmd.push_str(&format!(" --whitelist=\"{}\"", whitelist.join(", ")));
        }
        cmd
    }

    /// Run the upgrade to `target_version`, skipping the listed checks
    ///
    /// # Errors
    /// Returns `PackageError::CommandFailed` if the upgrade reports failure
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn upgrade(&self, target_version: &str, whitelist: &[String]) -> Result<(), PackageError> {
        info!("running foreman-maintain upgrade");
        self.checked(&Self::upgrade_command(target_version, whitelist))
            .await
    }

    /// Update the maintenance tool's own packages
    ///
    /// # Errors
    /// Returns `PackageError` if the package update fails
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn packages_update(&self) -> Result<(), PackageError> {
        self.checked("foreman-maintain packages update -y").await
    }

    /// Lock or unlock the package-installation check
    ///
    /// # Errors
    /// Returns `PackageError` if the state cannot be changed
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn set_package_lock(&self, state: PackageLock) -> Result<(), PackageError> {
        self.checked(&format!("foreman-maintain packages {} -y", state.as_arg()))
            .await
    }

    /// Restart every product service
    ///
    /// # Errors
    /// Returns `PackageError` if the restart fails
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn service_restart(&self) -> Result<(), PackageError> {
        self.checked("foreman-maintain service restart").await
    }

    /// Migrate Pulp 2 content to Pulp 3; `false` means the migration reported failure
    ///
    /// # Errors
    /// Returns `PackageError::Execution` if the command could not be run at all
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn content_prepare(&self) -> Result<bool, PackageError> {
        let result = self
            .executor
            .run("foreman-maintain content prepare")
            .await?;
        if !result.success() {
            warn!(status = result.status, output = %result.combined_output(), "content migration failed");
        }
        Ok(result.success())
    }

    /// Run the health checks
    ///
    /// # Errors
    /// Returns `PackageError::CommandFailed` if any check fails
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn health_check(&self) -> Result<(), PackageError> {
        self.checked("foreman-maintain health check --assumeyes").await
    }
}
