//! Per-run upgrade parameters

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::host::Role;

/// Where product packages come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionChannel {
    /// Vendor content delivery network, repositories by label
    Cdn,
    /// Hand-configured compose URLs
    Custom,
}

/// Operating system of the managed hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsVariant {
    Rhel6,
    Rhel7,
    Rhel8,
}

impl OsVariant {
    /// Major version number used in repository labels
    #[must_use]
    pub fn major(self) -> u8 {
        match self {
            OsVariant::Rhel6 => 6,
            OsVariant::Rhel7 => 7,
            OsVariant::Rhel8 => 8,
        }
    }
}

impl fmt::Display for OsVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rhel{}", self.major())
    }
}

impl FromStr for OsVariant {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rhel6" => Ok(OsVariant::Rhel6),
            "rhel7" => Ok(OsVariant::Rhel7),
            "rhel8" => Ok(OsVariant::Rhel8),
            other => Err(WorkflowError::Config(format!(
                "unsupported OS variant {other:?} (expected rhel6, rhel7 or rhel8)"
            ))),
        }
    }
}

/// Immutable description of one upgrade run.
///
/// Every coordinator calls [`UpgradeParameters::validate`] before touching a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeParameters {
    /// Version currently installed, e.g. `6.9`
    pub from_version: String,
    /// Version to upgrade to, e.g. `6.10`
    pub to_version: String,
    /// OS of the managed hosts
    pub os: OsVariant,
    /// Package source
    pub distribution: DistributionChannel,
    /// Upgrade the Satellite through `foreman-maintain`
    #[serde(default = "default_true")]
    pub satellite_maintenance_tool: bool,
    /// Upgrade capsules through `foreman-maintain`
    #[serde(default = "default_true")]
    pub capsule_maintenance_tool: bool,
    /// Same-version maintenance upgrade
    #[serde(default)]
    pub zstream: bool,
    /// Route capsule content through an HTTP proxy
    #[serde(default)]
    pub http_proxy: bool,
    /// Reboot hosts after the upgrade (kernel updates)
    #[serde(default = "default_true")]
    pub reboot_after_upgrade: bool,
    /// Let the maintenance tool skip its own repository validation and setup
    #[serde(default)]
    pub downstream_fm_upgrade: bool,
}

fn default_true() -> bool {
    true
}

impl UpgradeParameters {
    /// Parameters for a full upgrade with defaults for the optional switches
    pub fn new(
        from_version: impl Into<String>,
        to_version: impl Into<String>,
        os: OsVariant,
        distribution: DistributionChannel,
    ) -> Self {
        Self {
            from_version: from_version.into(),
            to_version: to_version.into(),
            os,
            distribution,
            satellite_maintenance_tool: true,
            capsule_maintenance_tool: true,
            zstream: false,
            http_proxy: false,
            reboot_after_upgrade: true,
            downstream_fm_upgrade: false,
        }
    }

    /// Same parameters flagged as a zStream run
    #[must_use]
    pub fn into_zstream(mut self) -> Self {
        self.zstream = true;
        self
    }

    /// Check the invariants that must hold before any remote action
    ///
    /// # Errors
    /// Returns `WorkflowError::Config` for empty versions or a zStream run across versions
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.from_version.trim().is_empty() || self.to_version.trim().is_empty() {
            return Err(WorkflowError::Config(
                "both from_version and to_version must be set".to_string(),
            ));
        }
        if self.zstream && self.from_version != self.to_version {
            return Err(WorkflowError::Config(format!(
                "zStream upgrade cannot be performed as FROM ({}) and TO ({}) versions are not the same",
                self.from_version, self.to_version
            )));
        }
        Ok(())
    }

    /// Whether the run crosses product versions
    #[must_use]
    pub fn changes_version(&self) -> bool {
        self.from_version != self.to_version
    }

    /// Whether `role` is upgraded with the maintenance tool
    #[must_use]
    pub fn uses_maintenance_tool(&self, role: Role) -> bool {
        match role {
            Role::Satellite => self.satellite_maintenance_tool,
            Role::Capsule => self.capsule_maintenance_tool,
        }
    }

    /// OS major version used in repository labels
    #[must_use]
    pub fn os_major(&self) -> u8 {
        self.os.major()
    }
}
