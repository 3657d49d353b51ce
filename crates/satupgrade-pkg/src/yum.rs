//! yum: repo files, cache and bulk updates (RHEL 6/7/8)

use std::sync::Arc;

use satupgrade_exec::RemoteExecutor;
use tracing::{debug, info, instrument, warn};

use crate::error::PackageError;
use crate::types::{CustomRepo, UpdateResult};

/// yum on one host
pub struct YumManager {
    executor: Arc<dyn RemoteExecutor>,
}

impl YumManager {
    /// Create a manager running commands through `executor`
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { executor }
    }

    /// Parse `yum update` output
    fn parse_update_output(output: &str) -> UpdateResult {
        let success = output.contains("Complete!") || output.contains("No packages marked for update");

        // "Updated:" / "Upgraded:" headers are followed by one indented line per package
        let mut upgraded = 0u32;
        let mut in_block = false;
        for line in output.lines() {
            if line.starts_with("Updated:") || line.starts_with("Upgraded:") {
                in_block = true;
                continue;
            }
            if in_block {
                if line.starts_with(' ') && !line.trim().is_empty() {
                    // name.arch epoch:version pairs
                    #[allow(clippy::cast_possible_truncation)]
                    let count = (line.split_whitespace().count() / 2) as u32;
                    upgraded += count;
                } else {
                    in_block = false;
                }
            }
        }

        UpdateResult {
            success,
            upgraded_count: upgraded,
            error: if success {
                None
            } else {
                Some(output.to_string())
            },
        }
    }

    /// Update every installed package
    ///
    /// # Errors
    /// Returns `PackageError::CommandFailed` if yum exits non-zero
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn update_all(&self, quiet: bool) -> Result<UpdateResult, PackageError> {
        info!("updating system packages");

        let cmd = if quiet { "yum -y -q update" } else { "yum -y update" };
        let result = self.executor.run(cmd).await?;

        if !result.success() {
            return Err(PackageError::CommandFailed {
                status: result.status,
                message: result.combined_output(),
            });
        }

        // -q suppresses the summary; trust the exit status then
        let mut update = Self::parse_update_output(&result.stdout);
        if quiet && !update.success {
            update = UpdateResult {
                success: true,
                ..UpdateResult::default()
            };
        }

        info!(upgraded = update.upgraded_count, "system packages updated");
        Ok(update)
    }

    /// Drop yum metadata and cached packages
    ///
    /// # Errors
    /// Returns `PackageError` if `yum clean all` fails
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn clean_cache(&self) -> Result<(), PackageError> {
        self.executor
            .run_checked("yum clean all")
            .await
            .map_err(PackageError::from_exec)?;
        // cache dir may already be gone
        self.executor.run_tolerant("rm -rf /var/cache/yum").await;
        debug!("yum cache cleaned");
        Ok(())
    }

    /// Write a `.repo` file for a hand-configured repository
    ///
    /// # Errors
    /// Returns `PackageError` if the file cannot be written
    #[instrument(skip(self, repo), fields(host = %self.executor.host(), repo = %repo.repository))]
    pub async fn write_repo_file(&self, repo: &CustomRepo) -> Result<(), PackageError> {
        let cmd = format!(
            "cat > {path} <<'SATUPGRADE_REPO'\n{body}SATUPGRADE_REPO",
            path = repo.file_path(),
            body = repo.render()
        );
        self.executor
            .run_checked(&cmd)
            .await
            .map_err(PackageError::from_exec)?;
        info!(base_url = %repo.base_url, enabled = repo.enable, "repository file written");
        Ok(())
    }

    /// Remove repo files by name (without the `.repo` suffix); missing files are fine
    #[instrument(skip(self), fields(host = %self.executor.host()))]
    pub async fn remove_repo_files(&self, names: &[&str]) {
        for name in names {
            let cmd = format!("rm -f /etc/yum.repos.d/{name}.repo");
            if self.executor.run_tolerant(&cmd).await.is_none() {
                warn!(file = %name, "repo file could not be removed");
            }
        }
    }
}
