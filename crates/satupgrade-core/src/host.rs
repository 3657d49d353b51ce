//! Host references and the connector that turns them into executors

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use satupgrade_exec::{ExecError, RemoteExecutor};
use serde::{Deserialize, Serialize};

/// Role of a node in the deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Satellite,
    Capsule,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Satellite => write!(f, "satellite"),
            Role::Capsule => write!(f, "capsule"),
        }
    }
}

/// A node taking part in the upgrade
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostRef {
    /// Hostname or address
    pub hostname: String,
    /// Satellite or capsule
    pub role: Role,
    /// Owning Satellite of a capsule, used for sync checks
    pub satellite: Option<String>,
}

impl HostRef {
    /// A Satellite host
    pub fn satellite(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            role: Role::Satellite,
            satellite: None,
        }
    }

    /// A capsule registered to `satellite`
    pub fn capsule(hostname: impl Into<String>, satellite: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            role: Role::Capsule,
            satellite: Some(satellite.into()),
        }
    }

    /// A capsule whose Satellite is not needed by the workflow
    pub fn standalone_capsule(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            role: Role::Capsule,
            satellite: None,
        }
    }

    /// Reference to this capsule's Satellite
    #[must_use]
    pub fn owning_satellite(&self) -> Option<HostRef> {
        self.satellite.as_deref().map(HostRef::satellite)
    }
}

impl fmt::Display for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.role, self.hostname)
    }
}

/// Creates executors for hosts
///
/// Lets tests inject scripted executors in place of SSH sessions.
#[async_trait]
pub trait HostConnector: Send + Sync {
    /// Executor for `host`; the connection itself is opened lazily
    async fn connect(&self, host: &HostRef) -> Result<Arc<dyn RemoteExecutor>, ExecError>;
}
