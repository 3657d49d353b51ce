//! Workflow coordinators
//!
//! Each coordinator owns a [`WorkflowState`](crate::state::WorkflowState) for
//! one run and sequences the policy, repository, upgrade, probe and
//! validation components. The first fatal condition ends the run with an
//! `Err`; nothing is retried.

mod capsule;
mod satellite;

use std::sync::Arc;

use satupgrade_exec::RemoteExecutor;
use satupgrade_pkg::RepositoryStateManager;

use crate::bugs::{BugTracker, KnownBugs};
use crate::config::ProductSettings;
use crate::error::WorkflowError;
use crate::host::{HostConnector, HostRef};
use crate::params::UpgradeParameters;
use crate::policy::RepoStep;
use crate::probe::HostProber;
use crate::validate::ValidationGate;

pub use capsule::{capsule_setup, capsule_upgrade, capsule_zstream_upgrade};
pub use satellite::{satellite_setup, satellite_upgrade};

/// Everything a coordinator needs for one run
pub struct UpgradeContext {
    params: UpgradeParameters,
    settings: ProductSettings,
    connector: Arc<dyn HostConnector>,
    bug_tracker: Arc<dyn BugTracker>,
    local: Arc<dyn RemoteExecutor>,
}

impl UpgradeContext {
    /// Bundle run parameters with the capabilities the workflows call
    ///
    /// `local` runs commands on the controller (reachability pings).
    pub fn new(
        params: UpgradeParameters,
        settings: ProductSettings,
        connector: Arc<dyn HostConnector>,
        bug_tracker: Arc<dyn BugTracker>,
        local: Arc<dyn RemoteExecutor>,
    ) -> Self {
        Self {
            params,
            settings,
            connector,
            bug_tracker,
            local,
        }
    }

    /// Parameters of this run
    #[must_use]
    pub fn params(&self) -> &UpgradeParameters {
        &self.params
    }

    /// Product settings of this run
    #[must_use]
    pub fn settings(&self) -> &ProductSettings {
        &self.settings
    }

    async fn connect(&self, host: &HostRef) -> Result<Arc<dyn RemoteExecutor>, WorkflowError> {
        self.connector
            .connect(host)
            .await
            .map_err(|e| WorkflowError::Unreachable {
                host: host.hostname.clone(),
                reason: e.to_string(),
            })
    }

    async fn known_bugs(&self) -> KnownBugs {
        KnownBugs::snapshot(self.bug_tracker.as_ref()).await
    }

    fn prober(&self) -> HostProber {
        HostProber::new(self.local.clone(), self.settings.timeouts.clone())
    }

    fn gate(&self) -> ValidationGate {
        ValidationGate::new(self.params.to_version.clone(), self.settings.timeouts.clone())
    }
}

/// Apply repository steps in order, stopping at the first strict failure
pub(crate) async fn apply_repo_steps(
    host: &str,
    repos: &RepositoryStateManager,
    steps: &[RepoStep],
) -> Result<(), WorkflowError> {
    for step in steps {
        match step {
            RepoStep::Apply { plan, warn_only } => repos
                .apply(plan, *warn_only)
                .await
                .map_err(WorkflowError::step(host, "repository plan"))?,
            RepoStep::Define(repo) => repos
                .define(repo)
                .await
                .map_err(WorkflowError::step(host, "repository setup"))?,
        }
    }
    Ok(())
}
