//! satupgrade-core: upgrade orchestration for Satellite and Capsule hosts
//!
//! Coordinators in [`workflow`] sequence the [`PolicySelector`] decision
//! tables, repository plans, the [`UpgradeExecutor`], the [`HostProber`]
//! and the [`ValidationGate`], tracking progress in a forward-only
//! [`WorkflowState`]. Failures come back as a typed [`WorkflowError`].

pub mod bugs;
pub mod config;
pub mod content;
pub mod error;
pub mod host;
pub mod params;
pub mod policy;
pub mod probe;
pub mod state;
pub mod upgrade;
pub mod validate;
pub mod workaround;
pub mod workflow;

pub use bugs::{BugTracker, KnownBugs, StaticBugTracker};
pub use config::{
    CapsuleRepoUrls, CapsuleSettings, MaintenanceSettings, ProductSettings, RepoSettings,
    SubscriptionSettings, Timeouts,
};
pub use content::RepositorySet;
pub use error::{ErrorKind, WorkflowError};
pub use host::{HostConnector, HostRef, Role};
pub use params::{DistributionChannel, OsVariant, UpgradeParameters};
pub use policy::{PolicySelector, RepoPhase, RepoStep, UpgradePath};
pub use probe::HostProber;
pub use state::{PhaseRecord, WorkflowPhase, WorkflowReport, WorkflowState};
pub use upgrade::{UpgradeExecutor, UpgradeOutcome, UpgradeStrategy};
pub use validate::ValidationGate;
pub use workflow::{
    UpgradeContext, capsule_setup, capsule_upgrade, capsule_zstream_upgrade, satellite_setup,
    satellite_upgrade,
};
