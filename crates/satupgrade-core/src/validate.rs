//! Post-upgrade validation and capsule sync gate

use std::sync::Arc;

use satupgrade_exec::RemoteExecutor;
use satupgrade_pkg::{ForemanMaintain, Hammer};
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, info, instrument};

use crate::config::Timeouts;
use crate::error::WorkflowError;
use crate::host::{HostRef, Role};

/// Confirms an upgrade took and capsule content is in sync
pub struct ValidationGate {
    to_version: String,
    timeouts: Timeouts,
}

impl ValidationGate {
    /// Gate expecting hosts to report `to_version`
    pub fn new(to_version: impl Into<String>, timeouts: Timeouts) -> Self {
        Self {
            to_version: to_version.into(),
            timeouts,
        }
    }

    /// Health check plus installed product version; `strict` also requires `hammer ping`
    ///
    /// # Errors
    /// Returns `WorkflowError::ValidationFailed` naming the failing check
    #[instrument(skip(self, executor), fields(host = %host.hostname))]
    pub async fn validate_upgrade(
        &self,
        host: &HostRef,
        executor: &Arc<dyn RemoteExecutor>,
        strict: bool,
    ) -> Result<(), WorkflowError> {
        let failed = |reason: String| WorkflowError::ValidationFailed {
            host: host.hostname.clone(),
            reason,
        };

        ForemanMaintain::new(executor.clone())
            .health_check()
            .await
            .map_err(|e| failed(format!("health check: {e}")))?;

        let package = match host.role {
            Role::Satellite => "satellite",
            Role::Capsule => "satellite-capsule",
        };
        let installed = executor
            .run_checked(&format!("rpm -q --queryformat '%{{VERSION}}' {package}"))
            .await
            .map_err(|e| failed(format!("{package} version query: {e}")))?
            .stdout;
        let installed = installed.trim();
        if !version_matches(installed, &self.to_version) {
            return Err(failed(format!(
                "{package} reports version {installed}, expected {}",
                self.to_version
            )));
        }

        if strict {
            Hammer::new(executor.clone())
                .ping()
                .await
                .map_err(|e| failed(format!("hammer ping: {e}")))?;
        }

        info!(version = installed, "upgrade validated");
        Ok(())
    }

    /// Start a content sync to `capsule` and wait for it to finish
    ///
    /// # Errors
    /// Returns `WorkflowError::Timeout` if the sync outlives the sync timeout
    pub async fn sync_capsule(
        &self,
        satellite: &Arc<dyn RemoteExecutor>,
        capsule: &str,
    ) -> Result<(), WorkflowError> {
        self.trigger_capsule_sync(satellite, capsule).await?;
        self.await_capsule_sync(satellite, capsule).await
    }

    /// Start a content sync to `capsule` from its Satellite
    ///
    /// # Errors
    /// Returns `WorkflowError::Step` if the task cannot be started, `WorkflowError::Timeout` if the
    /// Satellite does not answer within the sync timeout
    pub async fn trigger_capsule_sync(
        &self,
        satellite: &Arc<dyn RemoteExecutor>,
        capsule: &str,
    ) -> Result<(), WorkflowError> {
        let hammer = Hammer::new(satellite.clone());
        timeout(self.timeouts.sync_timeout, hammer.synchronize_capsule(capsule))
            .await
            .map_err(|_| self.sync_timed_out(capsule))?
            .map_err(WorkflowError::step(satellite.host(), "capsule sync"))
    }

    /// Poll the Satellite until no sync to `capsule` is running
    ///
    /// # Errors
    /// Returns `WorkflowError::Timeout` past the sync timeout, `WorkflowError::Step` if status cannot be read
    #[instrument(skip(self, satellite), fields(satellite = %satellite.host()))]
    pub async fn await_capsule_sync(
        &self,
        satellite: &Arc<dyn RemoteExecutor>,
        capsule: &str,
    ) -> Result<(), WorkflowError> {
        let hammer = Hammer::new(satellite.clone());
        let deadline = Instant::now() + self.timeouts.sync_timeout;

        loop {
            let active = timeout_at(deadline, hammer.capsule_sync_active(capsule))
                .await
                .map_err(|_| self.sync_timed_out(capsule))?
                .map_err(WorkflowError::step(satellite.host(), "capsule sync status"))?;
            if !active {
                info!("capsule sync completed");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.sync_timed_out(capsule));
            }
            debug!("capsule sync still running");
            sleep(self.timeouts.sync_interval.min(deadline - now)).await;
        }
    }

    fn sync_timed_out(&self, capsule: &str) -> WorkflowError {
        WorkflowError::Timeout {
            host: capsule.to_string(),
            waiting_for: "capsule sync",
            timeout: self.timeouts.sync_timeout,
        }
    }
}

/// `6.10` matches `6.10` and `6.10.3`, but not `6.1`
fn version_matches(installed: &str, expected: &str) -> bool {
    installed == expected
        || installed
            .strip_prefix(expected)
            .is_some_and(|rest| rest.starts_with('.'))
}
