//! Repository plans, custom repo definitions and update results

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::PackageError;

/// Wildcard label meaning "every repository known to the host"
pub const ALL_REPOS: &str = "*";

/// Repositories to enable and disable in one step.
///
/// Both sides are sets: order inside a plan carries no meaning, and the
/// constructor rejects a label appearing on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryActionPlan {
    /// Short description for logs
    pub label: String,
    /// Labels to enable
    pub to_enable: BTreeSet<String>,
    /// Labels to disable; may contain [`ALL_REPOS`]
    pub to_disable: BTreeSet<String>,
}

impl RepositoryActionPlan {
    /// Build a plan from both sides
    ///
    /// # Errors
    /// Returns `PackageError::ConflictingPlan` if a label is in both sets
    pub fn new<E, D>(label: impl Into<String>, enable: E, disable: D) -> Result<Self, PackageError>
    where
        E: IntoIterator,
        E::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let label = label.into();
        let to_enable: BTreeSet<String> = enable.into_iter().map(Into::into).collect();
        let to_disable: BTreeSet<String> = disable.into_iter().map(Into::into).collect();

        let overlap: Vec<String> = to_enable.intersection(&to_disable).cloned().collect();
        if !overlap.is_empty() {
            return Err(PackageError::ConflictingPlan { label, overlap });
        }

        Ok(Self {
            label,
            to_enable,
            to_disable,
        })
    }

    /// Plan that only enables
    pub fn enable<E>(label: impl Into<String>, repos: E) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            label: label.into(),
            to_enable: repos.into_iter().map(Into::into).collect(),
            to_disable: BTreeSet::new(),
        }
    }

    /// Plan that only disables
    pub fn disable<D>(label: impl Into<String>, repos: D) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            label: label.into(),
            to_enable: BTreeSet::new(),
            to_disable: repos.into_iter().map(Into::into).collect(),
        }
    }

    /// Plan that disables everything
    pub fn disable_all(label: impl Into<String>) -> Self {
        Self::disable(label, [ALL_REPOS])
    }

    /// Whether the plan starts by disabling every repository
    #[must_use]
    pub fn disables_all(&self) -> bool {
        self.to_disable.contains(ALL_REPOS)
    }

    /// Whether the plan does nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_enable.is_empty() && self.to_disable.is_empty()
    }
}

/// A yum repository configured by hand instead of through CDN naming
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRepo {
    /// Section id and file name under `/etc/yum.repos.d`
    pub repository: String,
    /// Human readable name
    pub repository_name: String,
    /// Base URL of the compose
    pub base_url: String,
    /// Whether the repo is enabled after setup
    #[serde(default = "default_true")]
    pub enable: bool,
    /// Whether packages must pass GPG verification
    #[serde(default)]
    pub gpg: bool,
}

fn default_true() -> bool {
    true
}

impl CustomRepo {
    /// Repo file path on the host
    #[must_use]
    pub fn file_path(&self) -> String {
        format!("/etc/yum.repos.d/{}.repo", self.repository)
    }

    /// Contents of the `.repo` file
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "[{}]\nname={}\nbaseurl={}\nenabled={}\ngpgcheck={}\n",
            self.repository,
            self.repository_name,
            self.base_url,
            u8::from(self.enable),
            u8::from(self.gpg),
        )
    }
}

/// Result of a bulk package update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateResult {
    /// Whether yum reported completion
    pub success: bool,
    /// Packages reported as upgraded
    pub upgraded_count: u32,
    /// Tool output when not successful
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_plan_rejected() {
        let err = RepositoryActionPlan::new(
            "capsule",
            ["rhel-7-server-satellite-capsule-6.10-rpms"],
            ["rhel-7-server-satellite-capsule-6.10-rpms", "other"],
        )
        .unwrap_err();

        match err {
            PackageError::ConflictingPlan { overlap, .. } => {
                assert_eq!(overlap, vec!["rhel-7-server-satellite-capsule-6.10-rpms"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn disable_all_plan() {
        let plan = RepositoryActionPlan::disable_all("baseline");
        assert!(plan.disables_all());
        assert!(plan.to_enable.is_empty());
        assert!(!plan.is_empty());
    }

    #[test]
    fn render_custom_repo() {
        let repo = CustomRepo {
            repository: "sat6".to_string(),
            repository_name: "Satellite 6.10".to_string(),
            base_url: "http://compose.example.com/Satellite/x86_64/os/".to_string(),
            enable: true,
            gpg: false,
        };

        assert_eq!(repo.file_path(), "/etc/yum.repos.d/sat6.repo");
        assert_eq!(
            repo.render(),
            "[sat6]\nname=Satellite 6.10\nbaseurl=http://compose.example.com/Satellite/x86_64/os/\nenabled=1\ngpgcheck=0\n"
        );
    }
}
