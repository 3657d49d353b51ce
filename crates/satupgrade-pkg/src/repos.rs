//! Repository state manager: applies repository action plans to a host

use std::sync::Arc;

use satupgrade_exec::RemoteExecutor;
use tracing::{debug, info, instrument, warn};

use crate::error::PackageError;
use crate::subscription::SubscriptionManager;
use crate::traits::RepositoryBackend;
use crate::types::{ALL_REPOS, CustomRepo, RepositoryActionPlan};
use crate::yum::YumManager;

/// Applies [`RepositoryActionPlan`]s and hand-written repo definitions to one host
pub struct RepositoryStateManager {
    backend: Arc<dyn RepositoryBackend>,
    yum: YumManager,
}

impl RepositoryStateManager {
    /// Manager over an explicit toggle backend
    pub fn new(backend: Arc<dyn RepositoryBackend>, yum: YumManager) -> Self {
        Self { backend, yum }
    }

    /// Manager toggling through `subscription-manager` on the executor's host
    pub fn for_host(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self::new(
            Arc::new(SubscriptionManager::new(executor.clone())),
            YumManager::new(executor),
        )
    }

    /// Apply a plan.
    ///
    /// A wildcard disable runs first, then the remaining disables, then the
    /// enables. With `warn_only` a repository that cannot be toggled is
    /// logged and skipped; otherwise the first failure is returned.
    ///
    /// # Errors
    /// Returns the first `PackageError` when `warn_only` is false
    #[instrument(skip(self, plan), fields(host = %self.backend.host(), plan = %plan.label))]
    pub async fn apply(&self, plan: &RepositoryActionPlan, warn_only: bool) -> Result<(), PackageError> {
        if plan.is_empty() {
            debug!("empty repository plan, nothing to toggle");
            return Ok(());
        }
        info!(
            enable = ?plan.to_enable,
            disable = ?plan.to_disable,
            warn_only,
            "applying repository plan"
        );

        if plan.disables_all() {
            tolerate(self.backend.disable_all().await, warn_only)?;
        }

        for repo in plan.to_disable.iter().filter(|r| *r != ALL_REPOS) {
            tolerate(self.backend.disable(repo).await, warn_only)?;
        }

        for repo in &plan.to_enable {
            tolerate(self.backend.enable(repo).await, warn_only)?;
        }

        Ok(())
    }

    /// Write a custom repository definition
    ///
    /// # Errors
    /// Returns `PackageError` if the repo file cannot be written
    pub async fn define(&self, repo: &CustomRepo) -> Result<(), PackageError> {
        self.yum.write_repo_file(repo).await
    }

    /// Point the host at a base OS compose
    ///
    /// # Errors
    /// Returns `PackageError` if the repo file cannot be written
    pub async fn add_base_os(&self, base_url: &str) -> Result<(), PackageError> {
        let repo = CustomRepo {
            repository: "rhel_base_os".to_string(),
            repository_name: "RHEL base OS".to_string(),
            base_url: base_url.to_string(),
            enable: true,
            gpg: false,
        };
        info!(host = %self.backend.host(), base_url, "adding base OS repository");
        self.define(&repo).await
    }

    /// Clean yum caches so the next resolution sees fresh metadata
    ///
    /// # Errors
    /// Returns `PackageError` if `yum clean all` fails
    pub async fn cleanup(&self) -> Result<(), PackageError> {
        self.yum.clean_cache().await
    }

    /// Drop stale repo files
    pub async fn remove_repo_files(&self, names: &[&str]) {
        self.yum.remove_repo_files(names).await;
    }
}

fn tolerate(result: Result<(), PackageError>, warn_only: bool) -> Result<(), PackageError> {
    match result {
        Err(e) if warn_only => {
            warn!(error = %e, "skipping repository toggle failure");
            Ok(())
        }
        other => other,
    }
}
