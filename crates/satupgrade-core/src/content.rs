//! Product content labels

use serde::Serialize;

use crate::config::RepoSettings;
use crate::params::UpgradeParameters;

/// Repository labels grouped by purpose for one product version
///
/// Built from parameters and static product metadata, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositorySet {
    pub tools: String,
    pub capsule: String,
    pub maintenance: String,
    pub server: String,
    pub rhscl: String,
    pub ansible: String,
    /// Satellite product repository, enabled only on the manual path
    pub satellite: String,
    /// Base OS compose URL for custom capsule setup
    pub custom_base_os: Option<String>,
}

impl RepositorySet {
    /// Labels for `version` on the hosts described by `params`
    #[must_use]
    pub fn for_version(version: &str, params: &UpgradeParameters, repos: &RepoSettings) -> Self {
        let major = params.os_major();
        Self {
            tools: format!("rhel-{major}-server-satellite-tools-{version}-rpms"),
            capsule: format!("rhel-{major}-server-satellite-capsule-{version}-rpms"),
            maintenance: format!("rhel-{major}-server-satellite-maintenance-6-rpms"),
            server: format!("rhel-{major}-server-rpms"),
            rhscl: format!("rhel-server-rhscl-{major}-rpms"),
            ansible: format!(
                "rhel-{major}-server-ansible-{}-rpms",
                repos.ansible_repo_version
            ),
            satellite: format!("rhel-{major}-server-satellite-{version}-rpms"),
            custom_base_os: repos.base_os.get(&params.os).cloned(),
        }
    }

    /// Labels of the version being upgraded from
    #[must_use]
    pub fn source(params: &UpgradeParameters, repos: &RepoSettings) -> Self {
        Self::for_version(&params.from_version, params, repos)
    }

    /// Labels of the version being upgraded to
    #[must_use]
    pub fn target(params: &UpgradeParameters, repos: &RepoSettings) -> Self {
        Self::for_version(&params.to_version, params, repos)
    }
}
