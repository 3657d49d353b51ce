//! Upgrade executor: content migration and the two upgrade strategies

use std::sync::Arc;

use chrono::{DateTime, Utc};
use satupgrade_exec::RemoteExecutor;
use satupgrade_pkg::{ForemanMaintain, PackageLock, RepositoryStateManager, YumManager};
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::bugs::KnownBugs;
use crate::error::WorkflowError;
use crate::host::{HostRef, Role};
use crate::policy::{PolicySelector, RepoPhase, RepoStep, UpgradePath};
use crate::workaround::{self, WorkaroundTask};
use crate::workflow::apply_repo_steps;

/// Release-pinning repo files that block a manual upgrade
const PINNING_REPO_FILES: [&str; 2] = ["rhel-optional", "rhel-released"];

/// Strategy an upgrade ran with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStrategy {
    MaintenanceTool,
    Manual,
}

impl From<&UpgradePath> for UpgradeStrategy {
    fn from(path: &UpgradePath) -> Self {
        match path {
            UpgradePath::MaintenanceTool { .. } => UpgradeStrategy::MaintenanceTool,
            UpgradePath::Manual { .. } => UpgradeStrategy::Manual,
        }
    }
}

/// Result of one upgrade execution
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeOutcome {
    pub strategy: UpgradeStrategy,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: bool,
    #[serde(skip)]
    failure: Option<WorkflowError>,
}

impl UpgradeOutcome {
    /// Wall-clock time the upgrade took
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// The outcome if it succeeded, otherwise the error that failed it
    ///
    /// # Errors
    /// Returns the recorded failure
    pub fn into_result(self) -> Result<Self, WorkflowError> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Runs upgrades the way the policy selected
pub struct UpgradeExecutor<'a> {
    policy: &'a PolicySelector<'a>,
}

impl<'a> UpgradeExecutor<'a> {
    /// Executor following `policy`
    #[must_use]
    pub fn new(policy: &'a PolicySelector<'a>) -> Self {
        Self { policy }
    }

    /// Pulp 2 to Pulp 3 content migration, wrapped by the worker workaround while its bug is open
    ///
    /// # Errors
    /// Returns `WorkflowError::MigrationFailed` if the migration reports failure
    #[instrument(skip_all, fields(host = %satellite.host()))]
    pub async fn migrate_content(
        &self,
        satellite: &Arc<dyn RemoteExecutor>,
        bugs: &KnownBugs,
    ) -> Result<(), WorkflowError> {
        let workaround = self.policy.migration_workaround(bugs);
        if workaround {
            workaround::pulp_migration_workers(satellite.as_ref(), WorkaroundTask::Apply).await;
        }

        info!("running content migration");
        let status = ForemanMaintain::new(satellite.clone()).content_prepare().await;

        if workaround {
            workaround::pulp_migration_workers(satellite.as_ref(), WorkaroundTask::Revert).await;
        }

        match status {
            Ok(true) => {
                info!("content migration finished");
                Ok(())
            }
            Ok(false) => Err(WorkflowError::MigrationFailed {
                host: satellite.host().to_string(),
            }),
            Err(e) => Err(WorkflowError::step(satellite.host(), "content migration")(e)),
        }
    }

    /// Upgrade `host` with the strategy the policy selected for its role.
    ///
    /// A manual capsule upgrade needs `satellite` to generate certificates.
    #[instrument(skip_all, fields(host = %host.hostname, role = %host.role))]
    pub async fn execute(
        &self,
        host: &HostRef,
        executor: &Arc<dyn RemoteExecutor>,
        satellite: Option<&Arc<dyn RemoteExecutor>>,
    ) -> UpgradeOutcome {
        let path = self.policy.upgrade_path(host.role);
        let strategy = UpgradeStrategy::from(&path);
        let started_at = Utc::now();
        info!(?strategy, "starting upgrade");

        let result = match (&path, host.role) {
            (
                UpgradePath::MaintenanceTool {
                    target_version,
                    whitelist,
                },
                role,
            ) => {
                self.maintenance_tool(executor, role, target_version, whitelist)
                    .await
            }
            (UpgradePath::Manual { refresh_packages }, Role::Satellite) => {
                self.manual_satellite(executor, *refresh_packages).await
            }
            (UpgradePath::Manual { .. }, Role::Capsule) => match satellite {
                Some(satellite) => self.manual_capsule(executor, satellite).await,
                None => Err(WorkflowError::Config(format!(
                    "manual upgrade of capsule {} needs its satellite to generate certificates",
                    host.hostname
                ))),
            },
        };

        let outcome = UpgradeOutcome {
            strategy,
            started_at,
            finished_at: Utc::now(),
            succeeded: result.is_ok(),
            failure: result.err(),
        };

        match &outcome.failure {
            None => info!(
                ?strategy,
                duration_secs = outcome.duration().num_seconds(),
                "upgrade finished"
            ),
            Some(err) => error!(?strategy, error = %err, "upgrade failed"),
        }
        outcome
    }

    async fn maintenance_tool(
        &self,
        executor: &Arc<dyn RemoteExecutor>,
        role: Role,
        target_version: &str,
        whitelist: &[String],
    ) -> Result<(), WorkflowError> {
        let host = executor.host();
        let maintain = ForemanMaintain::new(executor.clone());
        if role == Role::Capsule {
            maintain
                .packages_update()
                .await
                .map_err(WorkflowError::step(host, "maintenance packages update"))?;
        }
        maintain
            .upgrade(target_version, whitelist)
            .await
            .map_err(|e| WorkflowError::UpgradeFailed {
                host: host.to_string(),
                reason: e.to_string(),
            })
    }

    async fn manual_satellite(
        &self,
        executor: &Arc<dyn RemoteExecutor>,
        refresh_packages: bool,
    ) -> Result<(), WorkflowError> {
        let host = executor.host();
        let maintain = ForemanMaintain::new(executor.clone());
        let repos = RepositoryStateManager::for_host(executor.clone());

        open_firewall(executor.as_ref(), Role::Satellite).await;

        if refresh_packages {
            repos.remove_repo_files(&PINNING_REPO_FILES).await;
            info!("updating system packages");
            maintain
                .set_package_lock(PackageLock::Unlock)
                .await
                .map_err(WorkflowError::step(host, "package unlock"))?;
            // re-enable target repositories; custom definitions are already written
            let target: Vec<RepoStep> = self
                .policy
                .repo_steps(Role::Satellite, RepoPhase::Target)
                .into_iter()
                .filter(|step| matches!(step, RepoStep::Apply { .. }))
                .collect();
            apply_repo_steps(host, &repos, &target).await?;
            repos
                .cleanup()
                .await
                .map_err(WorkflowError::step(host, "yum cleanup"))?;
            maintain
                .packages_update()
                .await
                .map_err(WorkflowError::step(host, "maintenance packages update"))?;
            YumManager::new(executor.clone())
                .update_all(true)
                .await
                .map_err(WorkflowError::step(host, "package update"))?;
        }

        let installer_steps = self.policy.repo_steps(Role::Satellite, RepoPhase::Installer);
        apply_repo_steps(host, &repos, &installer_steps).await?;

        run_installer(executor.as_ref(), "satellite-installer --scenario satellite --upgrade").await?;

        maintain
            .set_package_lock(PackageLock::Lock)
            .await
            .map_err(WorkflowError::step(host, "package lock"))
    }

    async fn manual_capsule(
        &self,
        capsule: &Arc<dyn RemoteExecutor>,
        satellite: &Arc<dyn RemoteExecutor>,
    ) -> Result<(), WorkflowError> {
        let cap = capsule.host();
        let sat = satellite.host();
        let certs = format!("/root/{cap}-certs.tar");

        satellite
            .run_checked(&format!(
                "capsule-certs-generate --foreman-proxy-fqdn {cap} --certs-tar {certs} --certs-update-all"
            ))
            .await
            .map_err(WorkflowError::exec(sat))?;
        satellite
            .run_checked(&format!(
                "scp -o StrictHostKeyChecking=no {certs} root@{cap}:{certs}"
            ))
            .await
            .map_err(WorkflowError::exec(sat))?;
        info!(capsule = cap, "capsule certificates generated and copied");

        YumManager::new(capsule.clone())
            .update_all(false)
            .await
            .map_err(WorkflowError::step(cap, "package update"))?;

        run_installer(
            capsule.as_ref(),
            &format!("satellite-installer --scenario capsule --certs-tar-file {certs} --certs-update-all"),
        )
        .await
    }
}

async fn run_installer(executor: &dyn RemoteExecutor, cmd: &str) -> Result<(), WorkflowError> {
    info!(host = %executor.host(), "running installer");
    executor
        .run_checked(cmd)
        .await
        .map(|_| ())
        .map_err(|e| WorkflowError::UpgradeFailed {
            host: executor.host().to_string(),
            reason: e.to_string(),
        })
}

/// Open the product's predefined firewalld service on the host
pub async fn open_firewall(executor: &dyn RemoteExecutor, role: Role) {
    let service = match role {
        Role::Satellite => "RH-Satellite-6",
        Role::Capsule => "RH-Satellite-6-capsule",
    };
    executor
        .run_tolerant(&format!(
            "firewall-cmd --permanent --add-service={service} && firewall-cmd --reload"
        ))
        .await;
}
