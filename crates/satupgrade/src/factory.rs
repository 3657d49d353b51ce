//! Executor factory for the managed hosts

use std::sync::Arc;

use async_trait::async_trait;
use satupgrade_core::{HostConnector, HostRef};
use satupgrade_exec::{
    ConnectionInfo, ExecError, KeySource, LocalExecutor, RemoteExecutor, SshExecutor,
};

use crate::config::SshConfig;

/// Connects to hosts over SSH, or locally for the controller itself
pub struct SshConnector {
    ssh: SshConfig,
    key_source: KeySource,
}

impl SshConnector {
    pub fn new(ssh: SshConfig) -> Self {
        let key_source = ssh.key_source();
        Self { ssh, key_source }
    }

    fn create_executor(&self, hostname: &str) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        if is_local(hostname) {
            return Ok(Arc::new(LocalExecutor::new()));
        }

        let conn_info = ConnectionInfo::new(hostname)
            .with_user(self.ssh.user.clone())
            .with_port(self.ssh.port)
            .with_connect_timeout(self.ssh.connect_timeout());
        let executor = SshExecutor::new(conn_info, &self.key_source)?;
        Ok(Arc::new(executor))
    }
}

fn is_local(hostname: &str) -> bool {
    hostname == "localhost" || hostname == "127.0.0.1"
}

#[async_trait]
impl HostConnector for SshConnector {
    async fn connect(&self, host: &HostRef) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        tracing::debug!(host = %host, "creating executor");
        self.create_executor(&host.hostname)
    }
}
