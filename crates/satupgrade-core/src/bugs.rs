//! Bug tracker lookups gating workarounds

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

/// Pulp worker pool starves the 6.10 content migration
pub const PULP_MIGRATION_WORKERS: u32 = 1_967_131;

/// Capsule template needs `rhsm.manage_repos` switched back on
pub const CAPSULE_MANAGE_REPOS: u32 = 1_829_115;

/// Read-only bug status lookup
///
/// Implementations decide how to treat lookup failures; the Bugzilla client
/// reports them as open so a workaround is never silently skipped.
#[async_trait]
pub trait BugTracker: Send + Sync {
    /// Whether bug `id` is still open
    async fn is_bug_open(&self, id: u32) -> bool;
}

/// Bug tracker backed by a fixed list of open bugs
#[derive(Debug, Clone, Default)]
pub struct StaticBugTracker {
    open: BTreeSet<u32>,
}

impl StaticBugTracker {
    /// Tracker reporting exactly `open` as open
    pub fn new(open: impl IntoIterator<Item = u32>) -> Self {
        Self {
            open: open.into_iter().collect(),
        }
    }
}

#[async_trait]
impl BugTracker for StaticBugTracker {
    async fn is_bug_open(&self, id: u32) -> bool {
        self.open.contains(&id)
    }
}

/// Status of every bug a workflow cares about, fetched once at workflow start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KnownBugs {
    pub pulp_migration_workers: bool,
    pub capsule_manage_repos: bool,
}

impl KnownBugs {
    /// Query `tracker` for each tracked bug
    pub async fn snapshot(tracker: &dyn BugTracker) -> Self {
        let bugs = Self {
            pulp_migration_workers: tracker.is_bug_open(PULP_MIGRATION_WORKERS).await,
            capsule_manage_repos: tracker.is_bug_open(CAPSULE_MANAGE_REPOS).await,
        };
        debug!(?bugs, "bug status snapshot");
        bugs
    }
}
