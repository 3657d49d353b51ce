//! Version and distribution policy
//!
//! Pure decision tables: which repository steps a workflow phase applies and
//! which upgrade path a role takes. Nothing here touches a host.

use satupgrade_pkg::{CustomRepo, RepositoryActionPlan};
use serde::Serialize;

use crate::bugs::KnownBugs;
use crate::config::ProductSettings;
use crate::content::RepositorySet;
use crate::error::WorkflowError;
use crate::host::Role;
use crate::params::{DistributionChannel, UpgradeParameters};

/// Version that requires the Pulp 2 to Pulp 3 content migration
pub const CONTENT_MIGRATION_VERSION: &str = "6.10";

/// Maintenance tool checks skipped when it must not manage repositories itself
const DOWNSTREAM_WHITELIST: [&str; 2] = ["repositories-validate", "repositories-setup"];

/// One unit of repository work
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum RepoStep {
    /// Toggle repositories; `warn_only` tolerates labels the host does not know
    Apply {
        plan: RepositoryActionPlan,
        warn_only: bool,
    },
    /// Write a hand-configured repository definition
    Define(CustomRepo),
}

impl RepoStep {
    fn strict(plan: RepositoryActionPlan) -> Self {
        RepoStep::Apply {
            plan,
            warn_only: false,
        }
    }

    fn tolerant(plan: RepositoryActionPlan) -> Self {
        RepoStep::Apply {
            plan,
            warn_only: true,
        }
    }
}

/// Point in a workflow where repository steps are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoPhase {
    /// Clean baseline before target repositories are configured
    Baseline,
    /// Repositories the upgrade resolves packages from
    Target,
    /// Manual path only, right before the installer runs
    Installer,
}

/// How a host is upgraded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum UpgradePath {
    /// `foreman-maintain upgrade run`
    MaintenanceTool {
        target_version: String,
        whitelist: Vec<String>,
    },
    /// Bulk package update followed by the installer
    Manual {
        /// Remove pinning repo files and refresh packages before the installer
        refresh_packages: bool,
    },
}

/// Decision tables for one upgrade run
#[derive(Debug)]
pub struct PolicySelector<'a> {
    params: &'a UpgradeParameters,
    settings: &'a ProductSettings,
    source: RepositorySet,
    target: RepositorySet,
}

impl<'a> PolicySelector<'a> {
    /// Selector for validated parameters
    ///
    /// # Errors
    /// Returns `WorkflowError::Config` if the parameters contradict each other
    pub fn new(params: &'a UpgradeParameters, settings: &'a ProductSettings) -> Result<Self, WorkflowError> {
        params.validate()?;
        Ok(Self {
            params,
            settings,
            source: RepositorySet::source(params, &settings.repos),
            target: RepositorySet::target(params, &settings.repos),
        })
    }

    /// Labels of the target version
    #[must_use]
    pub fn target_repos(&self) -> &RepositorySet {
        &self.target
    }

    /// Repository steps for `role` at `phase`, in application order
    #[must_use]
    pub fn repo_steps(&self, role: Role, phase: RepoPhase) -> Vec<RepoStep> {
        match role {
            Role::Satellite => self.satellite_steps(phase),
            Role::Capsule => self.capsule_steps(phase),
        }
    }

    fn satellite_steps(&self, phase: RepoPhase) -> Vec<RepoStep> {
        let p = self.params;
        let mut steps = Vec::new();
        match phase {
            RepoPhase::Baseline => {
                if !p.zstream {
                    steps.push(RepoStep::strict(RepositoryActionPlan::disable_all(
                        "disable all repositories",
                    )));
                }
            }
            RepoPhase::Target => {
                // the maintenance tool enables server and rhscl on its own
                if !p.satellite_maintenance_tool {
                    steps.push(RepoStep::strict(RepositoryActionPlan::enable(
                        "common satellite repositories",
                        [self.target.rhscl.clone(), self.target.server.clone()],
                    )));
                }
                match p.distribution {
                    DistributionChannel::Cdn => {
                        steps.push(RepoStep::strict(RepositoryActionPlan::enable(
                            "satellite maintenance repository",
                            [self.target.maintenance.clone()],
                        )));
                    }
                    DistributionChannel::Custom => {
                        steps.extend(
                            self.settings
                                .repos
                                .custom_satellite
                                .iter()
                                .cloned()
                                .map(RepoStep::Define),
                        );
                    }
                }
            }
            RepoPhase::Installer => {
                if p.distribution == DistributionChannel::Cdn {
                    steps.push(RepoStep::strict(RepositoryActionPlan::enable(
                        "satellite product repository",
                        [self.target.satellite.clone()],
                    )));
                }
            }
        }
        steps
    }

    fn capsule_steps(&self, phase: RepoPhase) -> Vec<RepoStep> {
        let p = self.params;
        let mut steps = Vec::new();
        match phase {
            RepoPhase::Baseline => {
                if p.changes_version() {
                    steps.push(RepoStep::tolerant(RepositoryActionPlan::disable(
                        "previous capsule repositories",
                        [self.source.tools.clone(), self.source.capsule.clone()],
                    )));
                }
            }
            RepoPhase::Target => {
                let plan = match (p.distribution, p.zstream) {
                    (DistributionChannel::Cdn, _) => RepositoryActionPlan::enable(
                        "capsule repositories",
                        [
                            self.target.tools.clone(),
                            self.target.capsule.clone(),
                            self.target.maintenance.clone(),
                        ],
                    ),
                    (DistributionChannel::Custom, false) => RepositoryActionPlan::disable(
                        "cdn maintenance repository",
                        [self.target.maintenance.clone()],
                    ),
                    (DistributionChannel::Custom, true) => RepositoryActionPlan::disable(
                        "cdn capsule repositories",
                        [
                            self.target.tools.clone(),
                            self.target.capsule.clone(),
                            self.target.maintenance.clone(),
                        ],
                    ),
                };
                steps.push(RepoStep::tolerant(plan));
                steps.push(RepoStep::tolerant(RepositoryActionPlan::enable(
                    "ansible repository",
                    [self.target.ansible.clone()],
                )));
            }
            RepoPhase::Installer => {}
        }
        steps
    }

    /// Whether the target version needs the content migration first
    #[must_use]
    pub fn requires_content_migration(&self) -> bool {
        self.params.to_version == CONTENT_MIGRATION_VERSION
    }

    /// Whether the Pulp worker workaround wraps the content migration
    #[must_use]
    pub fn migration_workaround(&self, bugs: &KnownBugs) -> bool {
        self.requires_content_migration() && bugs.pulp_migration_workers
    }

    /// Upgrade path for `role`
    #[must_use]
    pub fn upgrade_path(&self, role: Role) -> UpgradePath {
        let p = self.params;
        if p.uses_maintenance_tool(role) {
            let target_version = if p.zstream {
                format!("{}.z", p.to_version)
            } else {
                p.to_version.clone()
            };
            UpgradePath::MaintenanceTool {
                target_version,
                whitelist: self.whitelist(),
            }
        } else {
            UpgradePath::Manual {
                refresh_packages: !p.zstream,
            }
        }
    }

    /// Checks the maintenance tool skips
    #[must_use]
    pub fn whitelist(&self) -> Vec<String> {
        let mut whitelist = self.settings.maintenance.whitelist.clone();
        if self.params.downstream_fm_upgrade {
            whitelist.extend(DOWNSTREAM_WHITELIST.iter().map(ToString::to_string));
        }
        whitelist
    }
}
