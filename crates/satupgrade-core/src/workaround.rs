//! Host-side workarounds for known product bugs
//!
//! Every workaround is best effort: failures are logged by the executor and
//! the workflow carries on.

use satupgrade_exec::RemoteExecutor;
use tracing::{info, instrument};

use crate::bugs::{CAPSULE_MANAGE_REPOS, PULP_MIGRATION_WORKERS};

const PULP_WORKERS_FILE: &str = "/etc/default/pulp_workers";

/// Direction of the Pulp worker workaround
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkaroundTask {
    Apply,
    Revert,
}

/// Run the content migration with a single Pulp worker, or restore the saved setting
#[instrument(skip(executor), fields(host = %executor.host(), bug = PULP_MIGRATION_WORKERS))]
pub async fn pulp_migration_workers(executor: &dyn RemoteExecutor, task: WorkaroundTask) {
    let cmd = match task {
        WorkaroundTask::Apply => format!(
            "cp -n {PULP_WORKERS_FILE} {PULP_WORKERS_FILE}.satupgrade && \
             sed -i 's/^PULP_WORKERS=.*/PULP_WORKERS=1/' {PULP_WORKERS_FILE} && \
             systemctl restart pulp_workers"
        ),
        WorkaroundTask::Revert => format!(
            "mv -f {PULP_WORKERS_FILE}.satupgrade {PULP_WORKERS_FILE} && \
             systemctl restart pulp_workers"
        ),
    };
    info!(?task, "pulp worker workaround");
    executor.run_tolerant(&cmd).await;
}

/// Let subscription-manager manage the capsule's repo files again
#[instrument(skip(executor), fields(host = %executor.host(), bug = CAPSULE_MANAGE_REPOS))]
pub async fn capsule_manage_repos(executor: &dyn RemoteExecutor) {
    executor
        .run_tolerant("subscription-manager config --rhsm.manage_repos=1")
        .await;
}
