//! Product settings consumed by the workflows
//!
//! Credentials, static repository tables and wait limits. Loaded by the
//! binary from TOML; tests build them in code.

use std::collections::BTreeMap;
use std::time::Duration;

use satupgrade_pkg::CustomRepo;
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::params::OsVariant;

/// Everything the workflows need besides [`crate::UpgradeParameters`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductSettings {
    /// Registration credentials
    #[serde(default)]
    pub subscription: SubscriptionSettings,
    /// Static repository tables
    #[serde(default)]
    pub repos: RepoSettings,
    /// Capsule placement on the Satellite
    #[serde(default)]
    pub capsule: CapsuleSettings,
    /// Checks the maintenance tool may skip
    #[serde(default)]
    pub maintenance: MaintenanceSettings,
    /// Bounded waits
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Registration credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionSettings {
    /// Customer portal user for the Satellite
    pub rhn_username: Option<String>,
    /// Customer portal password for the Satellite
    pub rhn_password: Option<String>,
    /// Pool attached to the Satellite
    pub rhn_poolid: Option<String>,
    /// Organization capsules register into
    #[serde(default = "default_organization")]
    pub organization: String,
    /// Activation key per capsule OS
    #[serde(default)]
    pub capsule_activation_keys: BTreeMap<OsVariant, String>,
}

fn default_organization() -> String {
    "Default_Organization".to_string()
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            rhn_username: None,
            rhn_password: None,
            rhn_poolid: None,
            organization: default_organization(),
            capsule_activation_keys: BTreeMap::new(),
        }
    }
}

impl SubscriptionSettings {
    /// Activation key for capsules on `os`
    ///
    /// # Errors
    /// Returns `WorkflowError::Config` if none is configured
    pub fn activation_key(&self, os: OsVariant) -> Result<&str, WorkflowError> {
        self.capsule_activation_keys
            .get(&os)
            .map(String::as_str)
            .ok_or_else(|| WorkflowError::Config(format!("no capsule activation key for {os}")))
    }
}

/// Custom capsule content URLs (custom channel only)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapsuleRepoUrls {
    /// Capsule compose
    pub capsule: Option<String>,
    /// Satellite tools compose
    pub tools: Option<String>,
    /// Maintenance compose
    pub maintenance: Option<String>,
}

impl CapsuleRepoUrls {
    /// `(repository name, url)` pairs that are set
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("capsule_repo", self.capsule.as_deref()),
            ("sattools_repo", self.tools.as_deref()),
            ("satmaintenance_repo", self.maintenance.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, url)| url.map(|u| (name, u)))
        .collect()
    }
}

/// Static repository tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSettings {
    /// Repositories set up by hand on the Satellite for the custom channel
    #[serde(default)]
    pub custom_satellite: Vec<CustomRepo>,
    /// Capsule content synced into the Satellite for the custom channel
    #[serde(default)]
    pub custom_capsule: CapsuleRepoUrls,
    /// Base OS compose per OS variant, added to capsules during setup
    #[serde(default)]
    pub base_os: BTreeMap<OsVariant, String>,
    /// Version in the ansible repository label
    #[serde(default = "default_ansible_repo_version")]
    pub ansible_repo_version: String,
}

fn default_ansible_repo_version() -> String {
    "2.9".to_string()
}

impl Default for RepoSettings {
    fn default() -> Self {
        Self {
            custom_satellite: Vec::new(),
            custom_capsule: CapsuleRepoUrls::default(),
            base_os: BTreeMap::new(),
            ansible_repo_version: default_ansible_repo_version(),
        }
    }
}

/// Where capsules live on the Satellite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapsuleSettings {
    /// Organization id capsules are assigned to
    #[serde(default = "default_id")]
    pub organization_id: u32,
    /// Location id capsules are assigned to
    #[serde(default = "default_location_id")]
    pub location_id: u32,
    /// Lifecycle environment synced to capsules
    #[serde(default = "default_lifecycle_environment")]
    pub lifecycle_environment: String,
    /// Product holding custom capsule repositories on the Satellite
    #[serde(default = "default_product")]
    pub product: String,
    /// Proxy URL used when the run asks for an HTTP proxy
    pub http_proxy_url: Option<String>,
    /// Name of the proxy entity on the Satellite
    #[serde(default = "default_proxy_name")]
    pub http_proxy_name: String,
}

fn default_id() -> u32 {
    1
}

fn default_location_id() -> u32 {
    2
}

fn default_lifecycle_environment() -> String {
    "Library".to_string()
}

fn default_product() -> String {
    "capsule_upgrade".to_string()
}

fn default_proxy_name() -> String {
    "proxy_for_upgrade".to_string()
}

impl Default for CapsuleSettings {
    fn default() -> Self {
        Self {
            organization_id: default_id(),
            location_id: default_location_id(),
            lifecycle_environment: default_lifecycle_environment(),
            product: default_product(),
            http_proxy_url: None,
            http_proxy_name: default_proxy_name(),
        }
    }
}

/// Checks the maintenance tool is told to skip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceSettings {
    /// Always-skipped checks
    #[serde(default = "default_whitelist")]
    pub whitelist: Vec<String>,
}

fn default_whitelist() -> Vec<String> {
    vec!["disk-performance".to_string()]
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            whitelist: default_whitelist(),
        }
    }
}

/// Limits for every blocking wait in a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    /// Ping attempts before a host counts as non-responsive
    #[serde(default = "default_ping_attempts")]
    pub ping_attempts: u32,
    /// Pause between ping attempts
    #[serde(default = "default_ping_interval", with = "secs")]
    pub ping_interval: Duration,
    /// SSH attempts before a host counts as unreachable
    #[serde(default = "default_ssh_attempts")]
    pub ssh_attempts: u32,
    /// Pause between SSH attempts
    #[serde(default = "default_ssh_interval", with = "secs")]
    pub ssh_interval: Duration,
    /// Limit for a single SSH readiness probe
    #[serde(default = "default_probe_timeout", with = "secs")]
    pub probe_timeout: Duration,
    /// Pause after issuing a reboot before probing
    #[serde(default = "default_reboot_grace", with = "secs")]
    pub reboot_grace: Duration,
    /// Reboot re-await limit for the Satellite
    #[serde(default = "default_satellite_reboot", with = "secs")]
    pub satellite_reboot: Duration,
    /// Reboot re-await limit for capsules
    #[serde(default = "default_capsule_reboot", with = "secs")]
    pub capsule_reboot: Duration,
    /// Capsule sync completion limit
    #[serde(default = "default_sync_timeout", with = "secs")]
    pub sync_timeout: Duration,
    /// Pause between sync status polls
    #[serde(default = "default_sync_interval", with = "secs")]
    pub sync_interval: Duration,
}

fn default_ping_attempts() -> u32 {
    3
}

fn default_ping_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_ssh_attempts() -> u32 {
    10
}

fn default_ssh_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_reboot_grace() -> Duration {
    Duration::from_secs(30)
}

fn default_satellite_reboot() -> Duration {
    Duration::from_secs(180)
}

fn default_capsule_reboot() -> Duration {
    Duration::from_secs(160)
}

fn default_sync_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_sync_interval() -> Duration {
    Duration::from_secs(30)
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ping_attempts: default_ping_attempts(),
            ping_interval: default_ping_interval(),
            ssh_attempts: default_ssh_attempts(),
            ssh_interval: default_ssh_interval(),
            probe_timeout: default_probe_timeout(),
            reboot_grace: default_reboot_grace(),
            satellite_reboot: default_satellite_reboot(),
            capsule_reboot: default_capsule_reboot(),
            sync_timeout: default_sync_timeout(),
            sync_interval: default_sync_interval(),
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
