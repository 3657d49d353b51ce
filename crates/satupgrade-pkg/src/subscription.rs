//! `subscription-manager`: registration and CDN repository toggles

use std::sync::Arc;

use async_trait::async_trait;
use satupgrade_exec::RemoteExecutor;
use tracing::{debug, info, instrument};

use crate::error::PackageError;
use crate::traits::RepositoryBackend;
use crate::types::ALL_REPOS;

/// `subscription-manager` on one host
pub struct SubscriptionManager {
    executor: Arc<dyn RemoteExecutor>,
}

impl SubscriptionManager {
    /// Create a manager running commands through `executor`
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { executor }
    }

    async fn toggle(&self, action: &'static str, repo: &str) -> Result<(), PackageError> {
        let cmd = format!("subscription-manager repos --{action}='{repo}'");
        let result = self.executor.run(&cmd).await?;

        if !result.success() {
            return Err(PackageError::RepositoryToggle {
                action,
                repo: repo.to_string(),
                message: result.combined_output().trim().to_string(),
            });
        }

        debug!(host = %self.executor.host(), repo, action, "repository toggled");
        Ok(())
    }

    /// Register with portal credentials, replacing any existing registration
    ///
    /// # Errors
    /// Returns `PackageError` if registration fails
    #[instrument(skip_all, fields(host = %self.executor.host()))]
    pub async fn register_with_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), PackageError> {
        self.executor
            .run_checked(&format!(
                "subscription-manager register --force --username='{username}' --password='{password}'"
            ))
            .await
            .map_err(PackageError::from_exec)?;
        info!(username, "host registered");
        Ok(())
    }

    /// Attach a subscription pool
    ///
    /// # Errors
    /// Returns `PackageError` if the pool cannot be attached
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn attach_pool(&self, pool_id: &str) -> Result<(), PackageError> {
        self.executor
            .run_checked(&format!("subscription-manager attach --pool={pool_id}"))
            .await
            .map_err(PackageError::from_exec)?;
        Ok(())
    }

    /// Register against an organization with an activation key
    ///
    /// # Errors
    /// Returns `PackageError` if registration fails
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn register_with_activation_key(
        &self,
        organization: &str,
        activation_key: &str,
    ) -> Result<(), PackageError> {
        self.executor
            .run_checked(&format!(
                "subscription-manager register --org=\"{organization}\" --activationkey={activation_key} --force"
            ))
            .await
            .map_err(PackageError::from_exec)?;
        info!(activation_key, "activation key registered all available repositories");
        Ok(())
    }

    /// Repository ids currently enabled on the host
    ///
    /// # Errors
    /// Returns `PackageError` if the listing fails
    pub async fn enabled_repos(&self) -> Result<Vec<String>, PackageError> {
        let result = self
            .executor
            .run_checked("subscription-manager repos --list-enabled")
            .await
            .map_err(PackageError::from_exec)?;
        Ok(parse_repo_ids(&result.stdout))
    }

    /// Log every repository the registration makes available
    ///
    /// # Errors
    /// Returns `PackageError` if the listing fails
    pub async fn list_repos(&self) -> Result<Vec<String>, PackageError> {
        let result = self
            .executor
            .run_checked("subscription-manager repos --list")
            .await
            .map_err(PackageError::from_exec)?;
        let ids = parse_repo_ids(&result.stdout);
        info!(host = %self.executor.host(), count = ids.len(), "available repositories");
        Ok(ids)
    }
}

/// Pull `Repo ID:` values out of `subscription-manager repos` output
fn parse_repo_ids(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Repo ID:"))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

#[async_trait]
impl RepositoryBackend for SubscriptionManager {
    async fn enable(&self, repo: &str) -> Result<(), PackageError> {
        self.toggle("enable", repo).await
    }

    async fn disable(&self, repo: &str) -> Result<(), PackageError> {
        self.toggle("disable", repo).await
    }

    async fn disable_all(&self) -> Result<(), PackageError> {
        self.toggle("disable", ALL_REPOS).await
    }

    fn host(&self) -> &str {
        self.executor.host()
    }
}
