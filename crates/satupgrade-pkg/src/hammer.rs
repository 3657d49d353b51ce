//! `hammer`: Satellite-side CLI for capsules, products and settings

use std::sync::Arc;

use satupgrade_exec::RemoteExecutor;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::PackageError;

/// `hammer` on the Satellite
pub struct Hammer {
    executor: Arc<dyn RemoteExecutor>,
}

impl Hammer {
    /// Create a wrapper running commands through the Satellite's executor
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { executor }
    }

    async fn checked(&self, cmd: &str) -> Result<String, PackageError> {
        self.executor
            .run_checked(cmd)
            .await
            .map(|r| r.stdout)
            .map_err(PackageError::from_exec)
    }

    /// `hammer ping`: every backend service answers
    ///
    /// # Errors
    /// Returns `PackageError::CommandFailed` if a service is down
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn ping(&self) -> Result<(), PackageError> {
        self.checked("hammer ping").await.map(|_| ())
    }

    /// Assign a capsule to the upgrade organization and location
    ///
    /// # Errors
    /// Returns `PackageError` if the capsule cannot be updated
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn assign_capsule(
        &self,
        capsule: &str,
        organization_id: u32,
        location_id: u32,
    ) -> Result<(), PackageError> {
        self.checked(&format!(
            "hammer capsule update --name {capsule} --organization-ids {organization_id} --location-ids {location_id}"
        ))
        .await?;
        info!(capsule, "capsule attached to satellite organization");
        Ok(())
    }

    /// Create a yum repository (and its product) pointing at a custom URL.
    ///
    /// Both may already exist from an earlier run, so failures are only logged.
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn ensure_custom_repository(
        &self,
        organization_id: u32,
        product: &str,
        name: &str,
        url: &str,
    ) {
        self.executor
            .run_tolerant(&format!(
                "hammer product create --name '{product}' --organization-id {organization_id}"
            ))
            .await;
        self.executor
            .run_tolerant(&format!(
                "hammer repository create --product '{product}' --name '{name}' --content-type yum --url '{url}' --organization-id {organization_id}"
            ))
            .await;
    }

    /// Synchronize a repository into the Satellite
    ///
    /// # Errors
    /// Returns `PackageError` if the sync task fails
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn synchronize_repository(
        &self,
        organization_id: u32,
        product: &str,
        name: &str,
    ) -> Result<(), PackageError> {
        self.checked(&format!(
            "hammer repository synchronize --product '{product}' --name '{name}' --organization-id {organization_id}"
        ))
        .await
        .map(|_| ())
    }

    /// Attach a lifecycle environment to a capsule; already attached is fine
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn add_lifecycle_environment(
        &self,
        capsule: &str,
        environment: &str,
        organization_id: u32,
    ) {
        self.executor
            .run_tolerant(&format!(
                "hammer capsule content add-lifecycle-environment --name {capsule} --lifecycle-environment '{environment}' --organization-id {organization_id}"
            ))
            .await;
    }

    /// Create an HTTP proxy and make it the default for content
    ///
    /// # Errors
    /// Returns `PackageError` if the default cannot be set
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn configure_http_proxy(
        &self,
        name: &str,
        url: &str,
        organization_id: u32,
    ) -> Result<(), PackageError> {
        // may exist from an earlier run
        self.executor
            .run_tolerant(&format!(
                "hammer http-proxy create --name '{name}' --url '{url}' --organization-ids {organization_id}"
            ))
            .await;
        self.checked(&format!(
            "hammer settings set --name content_default_http_proxy --value '{name}'"
        ))
        .await?;
        info!(proxy = name, "default content HTTP proxy configured");
        Ok(())
    }

    /// Start a content sync to a capsule without waiting for it
    ///
    /// # Errors
    /// Returns `PackageError` if the task cannot be started
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn synchronize_capsule(&self, capsule: &str) -> Result<(), PackageError> {
        self.checked(&format!(
            "hammer capsule content synchronize --name {capsule} --async"
        ))
        .await?;
        info!(capsule, "capsule sync triggered");
        Ok(())
    }

    /// Whether a content sync to the capsule is still running
    ///
    /// # Errors
    /// Returns `PackageError` if the status cannot be read or parsed
    pub async fn capsule_sync_active(&self, capsule: &str) -> Result<bool, PackageError> {
        let output = self
            .checked(&format!(
                "hammer --output json capsule content synchronization-status --name {capsule}"
            ))
            .await?;
        let status: Value = serde_json::from_str(&output).map_err(|e| {
            PackageError::CommandFailed {
                status: 0,
                message: format!("unparsable sync status for {capsule}: {e}"),
            }
        })?;
        let active = sync_in_progress(&status);
        debug!(capsule, active, "capsule sync status");
        Ok(active)
    }
}

/// Read `hammer capsule content synchronization-status` JSON
fn sync_in_progress(status: &Value) -> bool {
    match status.get("Active Sync Tasks") {
        Some(Value::Array(tasks)) => !tasks.is_empty(),
        Some(Value::Object(tasks)) => !tasks.is_empty(),
        Some(Value::String(s)) => !s.trim().is_empty(),
        _ => false,
    }
}
