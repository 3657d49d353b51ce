//! Configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use satupgrade_core::{DistributionChannel, OsVariant, ProductSettings, UpgradeParameters};
use satupgrade_exec::KeySource;
use serde::{Deserialize, Serialize};

/// Top-level configuration for satupgrade
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Run parameters; versions may also come from the command line
    #[serde(default)]
    pub upgrade: UpgradeSection,
    /// Credentials, repository tables and wait limits
    #[serde(default)]
    pub product: ProductSettings,
    /// Bug tracker used for workaround decisions
    #[serde(default)]
    pub bugzilla: BugzillaConfig,
    /// How to reach the managed hosts
    #[serde(default)]
    pub ssh: SshConfig,
    /// Logging
    #[serde(default)]
    pub log: LogConfig,
}

/// The `[upgrade]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeSection {
    pub from_version: Option<String>,
    pub to_version: Option<String>,
    #[serde(default = "default_os")]
    pub os: OsVariant,
    #[serde(default = "default_distribution")]
    pub distribution: DistributionChannel,
    #[serde(default = "default_true")]
    pub satellite_maintenance_tool: bool,
    #[serde(default = "default_true")]
    pub capsule_maintenance_tool: bool,
    #[serde(default)]
    pub zstream: bool,
    #[serde(default)]
    pub http_proxy: bool,
    #[serde(default = "default_true")]
    pub reboot_after_upgrade: bool,
    #[serde(default)]
    pub downstream_fm_upgrade: bool,
}

impl Default for UpgradeSection {
    fn default() -> Self {
        Self {
            from_version: None,
            to_version: None,
            os: default_os(),
            distribution: default_distribution(),
            satellite_maintenance_tool: true,
            capsule_maintenance_tool: true,
            zstream: false,
            http_proxy: false,
            reboot_after_upgrade: true,
            downstream_fm_upgrade: false,
        }
    }
}

fn default_os() -> OsVariant {
    OsVariant::Rhel7
}

fn default_distribution() -> DistributionChannel {
    DistributionChannel::Cdn
}

fn default_true() -> bool {
    true
}

impl UpgradeSection {
    /// Build run parameters
    ///
    /// # Errors
    /// Returns error if either version is missing
    pub fn to_parameters(&self) -> eyre::Result<UpgradeParameters> {
        let (Some(from), Some(to)) = (self.from_version.as_deref(), self.to_version.as_deref())
        else {
            eyre::bail!("from_version and to_version must be set in [upgrade] or with --from/--to");
        };

        let mut params = UpgradeParameters::new(from, to, self.os, self.distribution);
        params.satellite_maintenance_tool = self.satellite_maintenance_tool;
        params.capsule_maintenance_tool = self.capsule_maintenance_tool;
        params.zstream = self.zstream;
        params.http_proxy = self.http_proxy;
        params.reboot_after_upgrade = self.reboot_after_upgrade;
        params.downstream_fm_upgrade = self.downstream_fm_upgrade;
        Ok(params)
    }
}

/// The `[bugzilla]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BugzillaConfig {
    /// Bugzilla base URL
    #[serde(default = "default_bugzilla_url")]
    pub url: String,
    /// Query Bugzilla; when off, `open_bugs` is used as-is
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Bugs treated as open when lookups are disabled
    #[serde(default)]
    pub open_bugs: Vec<u32>,
    /// Per-request timeout in seconds
    #[serde(default = "default_bugzilla_timeout")]
    pub timeout_secs: u64,
}

impl Default for BugzillaConfig {
    fn default() -> Self {
        Self {
            url: default_bugzilla_url(),
            enabled: true,
            open_bugs: Vec::new(),
            timeout_secs: default_bugzilla_timeout(),
        }
    }
}

fn default_bugzilla_url() -> String {
    "https://bugzilla.redhat.com".to_string()
}

fn default_bugzilla_timeout() -> u64 {
    30
}

/// The `[ssh]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Private key file
    pub key: Option<PathBuf>,
    /// Environment variable holding a base64-encoded private key; wins over `key`
    pub key_env: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            port: default_port(),
            key: None,
            key_env: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_user() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    30
}

impl SshConfig {
    /// Where the private key comes from
    pub fn key_source(&self) -> KeySource {
        match (&self.key_env, &self.key) {
            (Some(var), _) => KeySource::Env(var.clone()),
            (None, Some(path)) => KeySource::Path(path.clone()),
            (None, None) => KeySource::default(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// The `[log]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("failed to read {}: {e}", path.display()))?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// First config file found on the default search path
    ///
    /// `$SATUPGRADE_CONFIG` wins, then `./satupgrade.toml`,
    /// `/etc/satupgrade/satupgrade.toml` and the user config directory.
    pub fn default_path() -> Option<PathBuf> {
        let mut candidates = vec![
            PathBuf::from("satupgrade.toml"),
            PathBuf::from("/etc/satupgrade/satupgrade.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("satupgrade/satupgrade.toml"));
        }
        locate(std::env::var("SATUPGRADE_CONFIG").ok(), &candidates)
    }

    /// Defaults plus credentials from the environment
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config
    }

    /// Credentials from the environment replace those in the file
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let subscription = &mut self.product.subscription;
        for (name, slot) in [
            ("RHN_USERNAME", &mut subscription.rhn_username),
            ("RHN_PASSWORD", &mut subscription.rhn_password),
            ("RHN_POOLID", &mut subscription.rhn_poolid),
        ] {
            if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        }
    }
}

fn locate(env_path: Option<String>, candidates: &[PathBuf]) -> Option<PathBuf> {
    if let Some(path) = env_path.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    candidates.iter().find(|path| path.exists()).cloned()
}
