//! Host readiness probing: ping, SSH readiness, reboot and re-await

use std::sync::Arc;
use std::time::Duration;

use satupgrade_exec::RemoteExecutor;
use tokio::time::{Instant, sleep, sleep_until, timeout, timeout_at};
use tracing::{debug, info, instrument, warn};

use crate::config::Timeouts;
use crate::error::WorkflowError;

const READY_PROBE: &str = "echo ok";

/// Bounded waits on host availability
pub struct HostProber {
    /// Executor on the controller, used for network pings
    local: Arc<dyn RemoteExecutor>,
    timeouts: Timeouts,
}

impl HostProber {
    /// Prober pinging from `local` with the configured limits
    pub fn new(local: Arc<dyn RemoteExecutor>, timeouts: Timeouts) -> Self {
        Self { local, timeouts }
    }

    /// Whether `host` answers ping within the configured attempts
    #[instrument(skip(self))]
    pub async fn await_reachable(&self, host: &str) -> bool {
        let wait_secs = self.timeouts.ping_interval.as_secs().max(1);
        let cmd = format!("ping -c1 -W{wait_secs} {host}");
        let attempts = self.timeouts.ping_attempts.max(1);

        for attempt in 1..=attempts {
            match self.local.run(&cmd).await {
                Ok(result) if result.success() => {
                    debug!(attempt, "host answers ping");
                    return true;
                }
                Ok(result) => debug!(attempt, status = result.status, "no ping reply"),
                Err(e) => warn!(attempt, error = %e, "ping could not be run"),
            }
            if attempt < attempts {
                sleep(self.timeouts.ping_interval).await;
            }
        }

        warn!(attempts, "host is not responding to ping");
        false
    }

    /// Wait until the host accepts SSH commands
    ///
    /// # Errors
    /// Returns `WorkflowError::Unreachable` once every attempt has failed
    #[instrument(skip(self, executor), fields(host = %executor.host()))]
    pub async fn await_ssh_ready(&self, executor: &dyn RemoteExecutor) -> Result<(), WorkflowError> {
        let attempts = self.timeouts.ssh_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.probe(executor).await {
                Ok(()) => {
                    info!(attempt, "host is ready over SSH");
                    return Ok(());
                }
                Err(reason) => {
                    debug!(attempt, reason = %reason, "SSH not ready");
                    last_error = reason;
                }
            }
            if attempt < attempts {
                sleep(self.timeouts.ssh_interval).await;
            }
        }

        Err(WorkflowError::Unreachable {
            host: executor.host().to_string(),
            reason: format!("SSH not ready after {attempts} attempts: {last_error}"),
        })
    }

    /// Reboot the host and wait for SSH to come back within `limit`.
    ///
    /// `limit` covers the reboot command itself, so a session that hangs
    /// instead of closing still ends in a timeout.
    ///
    /// # Errors
    /// Returns `WorkflowError::Timeout` if the host is not back in time
    #[instrument(skip(self, executor), fields(host = %executor.host()))]
    pub async fn reboot_and_await(
        &self,
        executor: &dyn RemoteExecutor,
        limit: Duration,
    ) -> Result<(), WorkflowError> {
        let deadline = Instant::now() + limit;
        info!(?limit, "rebooting host");

        // the session usually drops before reboot exits
        let send_limit = self.timeouts.probe_timeout.min(limit);
        match timeout(send_limit, executor.run_with_timeout("reboot", send_limit)).await {
            Ok(Ok(result)) if result.success() => debug!("reboot accepted"),
            Ok(Ok(result)) => warn!(status = result.status, "reboot exited with an error"),
            Ok(Err(e)) => debug!(error = %e, "session closed by reboot"),
            Err(_) => debug!("reboot did not return, assuming the session is gone"),
        }
        executor.reset().await;

        sleep_until(deadline.min(Instant::now() + self.timeouts.reboot_grace)).await;

        loop {
            if let Ok(Ok(())) = timeout_at(deadline, self.probe(executor)).await {
                info!("host is back after reboot");
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.timeouts.ssh_interval.min(deadline - now)).await;
        }

        executor.reset().await;
        Err(WorkflowError::Timeout {
            host: executor.host().to_string(),
            waiting_for: "SSH after reboot",
            timeout: limit,
        })
    }

    async fn probe(&self, executor: &dyn RemoteExecutor) -> Result<(), String> {
        let limit = self.timeouts.probe_timeout;
        match timeout(limit, executor.run_with_timeout(READY_PROBE, limit)).await {
            Ok(Ok(result)) if result.success() => Ok(()),
            Ok(Ok(result)) => Err(format!("probe exited with {}", result.status)),
            Ok(Err(e)) => {
                executor.reset().await;
                Err(e.to_string())
            }
            Err(_) => {
                executor.reset().await;
                Err(format!("probe did not answer within {limit:?}"))
            }
        }
    }
}
