//! satupgrade-pkg: repository and package tooling on RHEL hosts
//!
//! Wraps the host-side tools the upgrade drives: `subscription-manager` for
//! repository toggles and registration, `yum` for repo files and bulk
//! updates, `foreman-maintain` for the product's own upgrade machinery and
//! `hammer` for Satellite-side capsule management.
//! [`RepositoryStateManager`] applies [`RepositoryActionPlan`]s on top of them.

pub mod error;
pub mod hammer;
pub mod maintain;
pub mod repos;
pub mod subscription;
pub mod traits;
pub mod types;
pub mod yum;

pub use error::PackageError;
pub use hammer::Hammer;
pub use maintain::{ForemanMaintain, PackageLock};
pub use repos::RepositoryStateManager;
pub use subscription::SubscriptionManager;
pub use traits::RepositoryBackend;
pub use types::{ALL_REPOS, CustomRepo, RepositoryActionPlan, UpdateResult};
pub use yum::YumManager;
