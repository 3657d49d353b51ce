//! Capsule setup and upgrades

use std::sync::Arc;

use satupgrade_exec::RemoteExecutor;
use satupgrade_pkg::{ForemanMaintain, Hammer, RepositoryStateManager, SubscriptionManager};
use tracing::{debug, info, warn};

use super::{UpgradeContext, apply_repo_steps};
use crate::bugs::CAPSULE_MANAGE_REPOS;
use crate::error::WorkflowError;
use crate::host::{HostRef, Role};
use crate::params::{DistributionChannel, UpgradeParameters};
use crate::policy::{PolicySelector, RepoPhase};
use crate::state::{WorkflowPhase, WorkflowReport, WorkflowState};
use crate::upgrade::{UpgradeExecutor, UpgradeOutcome, open_firewall};
use crate::workaround;

const SATELLITE_KEY: &str = "~/.ssh/id_rsa";

/// Prepare a batch of capsules registered to `satellite`.
///
/// Every capsule is checked even after one fails; a capsule that is
/// unreachable or cannot restart its services counts as non-responsive,
/// and any non-responsive host aborts the batch before keys are copied or
/// content is synced. With `upgradable` the capsules are also attached to
/// the Satellite and, once its content is in place, given their base OS
/// repository.
///
/// # Errors
/// Returns `WorkflowError::NonResponsiveHosts` listing every capsule that failed its checks
pub async fn capsule_setup(
    ctx: &UpgradeContext,
    satellite: &str,
    capsules: &[String],
    upgradable: bool,
) -> Result<WorkflowReport<Vec<HostRef>>, WorkflowError> {
    let mut state = WorkflowState::new("capsule_setup");
    let result = run_setup(ctx, &mut state, satellite, capsules, upgradable).await;
    state.finish(result)
}

async fn run_setup(
    ctx: &UpgradeContext,
    state: &mut WorkflowState,
    satellite: &str,
    capsules: &[String],
    upgradable: bool,
) -> Result<Vec<HostRef>, WorkflowError> {
    ctx.params.validate()?;
    let settings = &ctx.settings;
    let Some(base_url) = settings.repos.base_os.get(&ctx.params.os).cloned() else {
        return Err(WorkflowError::Config(format!(
            "no base OS repository configured for {}",
            ctx.params.os
        )));
    };
    if capsules.is_empty() {
        return Err(WorkflowError::Config("no capsules to set up".to_string()));
    }
    let proxy_url = if upgradable && ctx.params.http_proxy {
        let url = settings.capsule.http_proxy_url.clone().ok_or_else(|| {
            WorkflowError::Config("http_proxy is set but capsule.http_proxy_url is not".to_string())
        })?;
        Some(url)
    } else {
        None
    };
    let bugs = ctx.known_bugs().await;
    let prober = ctx.prober();

    state.advance(WorkflowPhase::PreflightCheck)?;
    let mut ready: Vec<(HostRef, Arc<dyn RemoteExecutor>)> = Vec::new();
    let mut non_responsive = Vec::new();
    for hostname in capsules {
        state.set_current_host(hostname.as_str());
        let host = HostRef::capsule(hostname.as_str(), satellite);

        if !prober.await_reachable(hostname).await {
            non_responsive.push(hostname.clone());
            continue;
        }
        let executor = match ctx.connect(&host).await {
            Ok(executor) => executor,
            Err(e) => {
                warn!(host = %hostname, error = %e, "capsule has no usable connection");
                non_responsive.push(hostname.clone());
                continue;
            }
        };
        if let Err(e) = prober.await_ssh_ready(executor.as_ref()).await {
            warn!(host = %hostname, error = %e, "capsule is not ready over SSH");
            non_responsive.push(hostname.clone());
            continue;
        }

        workaround::capsule_manage_repos(executor.as_ref()).await;
        if !bugs.capsule_manage_repos {
            warn!(
                host = %hostname,
                bug = CAPSULE_MANAGE_REPOS,
                "bug is fixed, update the capsule template for this capsule version"
            );
        }
        if let Err(e) = ForemanMaintain::new(executor.clone()).service_restart().await {
            warn!(host = %hostname, error = %e, "capsule services failed to restart");
            non_responsive.push(hostname.clone());
            continue;
        }

        ready.push((host, executor));
    }

    if !non_responsive.is_empty() {
        warn!(hosts = ?non_responsive, "non-responsive capsules, aborting batch");
        return Err(WorkflowError::NonResponsiveHosts(non_responsive));
    }

    state.advance(WorkflowPhase::Execute)?;
    state.set_current_host(satellite);
    let sat = ctx.connect(&HostRef::satellite(satellite)).await?;
    copy_ssh_key(sat.as_ref(), &ready).await?;

    if upgradable {
        let hammer = Hammer::new(sat.clone());
        let placement = &settings.capsule;
        for (host, _) in &ready {
            hammer
                .assign_capsule(&host.hostname, placement.organization_id, placement.location_id)
                .await
                .map_err(WorkflowError::step(satellite, "capsule assignment"))?;
            hammer
                .add_lifecycle_environment(
                    &host.hostname,
                    &placement.lifecycle_environment,
                    placement.organization_id,
                )
                .await;
        }

        if let Some(url) = proxy_url {
            hammer
                .configure_http_proxy(&placement.http_proxy_name, &url, placement.organization_id)
                .await
                .map_err(WorkflowError::step(satellite, "http proxy"))?;
        }

        // CDN capsules get their content through the activation key
        if ctx.params.distribution == DistributionChannel::Custom {
            for (name, url) in settings.repos.custom_capsule.entries() {
                hammer
                    .ensure_custom_repository(placement.organization_id, &placement.product, name, url)
                    .await;
                hammer
                    .synchronize_repository(placement.organization_id, &placement.product, name)
                    .await
                    .map_err(WorkflowError::step(satellite, "capsule repository sync"))?;
            }
        }

        for (host, executor) in &ready {
            state.set_current_host(host.hostname.as_str());
            let repos = RepositoryStateManager::for_host(executor.clone());
            repos
                .add_base_os(&base_url)
                .await
                .map_err(WorkflowError::step(&host.hostname, "base OS repository"))?;
            repos
                .cleanup()
                .await
                .map_err(WorkflowError::step(&host.hostname, "yum cleanup"))?;
        }
    }

    let hosts: Vec<HostRef> = ready.into_iter().map(|(host, _)| host).collect();
    for host in &hosts {
        info!(host = %host.hostname, "capsule is ready for upgrade");
    }
    Ok(hosts)
}

/// Let the Satellite reach every capsule over SSH with its root key
async fn copy_ssh_key(
    satellite: &dyn RemoteExecutor,
    capsules: &[(HostRef, Arc<dyn RemoteExecutor>)],
) -> Result<(), WorkflowError> {
    satellite
        .run_checked(&format!(
            "test -f {SATELLITE_KEY} || ssh-keygen -q -t rsa -N '' -f {SATELLITE_KEY}"
        ))
        .await
        .map_err(WorkflowError::exec(satellite.host()))?;
    let public_key = satellite
        .run_checked(&format!("cat {SATELLITE_KEY}.pub"))
        .await
        .map_err(WorkflowError::exec(satellite.host()))?
        .stdout;
    let public_key = public_key.trim();

    for (host, executor) in capsules {
        executor
            .run_checked(&format!(
                "mkdir -p ~/.ssh && chmod 700 ~/.ssh && \
                 (grep -qxF '{public_key}' ~/.ssh/authorized_keys 2>/dev/null || \
                 echo '{public_key}' >> ~/.ssh/authorized_keys)"
            ))
            .await
            .map_err(WorkflowError::exec(&host.hostname))?;
        debug!(capsule = %host.hostname, "satellite key authorized");
    }
    info!(count = capsules.len(), "satellite SSH key copied to capsules");
    Ok(())
}

/// Upgrade a capsule across versions, with content sync checks before and after
///
/// # Errors
/// Returns the first fatal `WorkflowError`
pub async fn capsule_upgrade(
    ctx: &UpgradeContext,
    capsule: &str,
    satellite: &str,
) -> Result<WorkflowReport<UpgradeOutcome>, WorkflowError> {
    let mut state = WorkflowState::new("capsule_upgrade");
    state.set_current_host(capsule);
    let host = HostRef::capsule(capsule, satellite);
    let result = run_upgrade(ctx, &ctx.params, &mut state, &host).await;
    state.finish(result)
}

/// Upgrade a capsule to the latest zStream of its current version.
///
/// `satellite` is only needed for the manual path, to generate certificates.
///
/// # Errors
/// Returns `WorkflowError::Config` without issuing any command if from and to versions differ
pub async fn capsule_zstream_upgrade(
    ctx: &UpgradeContext,
    capsule: &str,
    satellite: Option<&str>,
) -> Result<WorkflowReport<UpgradeOutcome>, WorkflowError> {
    let mut state = WorkflowState::new("capsule_zstream_upgrade");
    state.set_current_host(capsule);
    let host = match satellite {
        Some(satellite) => HostRef::capsule(capsule, satellite),
        None => HostRef::standalone_capsule(capsule),
    };
    let params = ctx.params.clone().into_zstream();
    let result = run_upgrade(ctx, &params, &mut state, &host).await;
    state.finish(result)
}

async fn run_upgrade(
    ctx: &UpgradeContext,
    params: &UpgradeParameters,
    state: &mut WorkflowState,
    host: &HostRef,
) -> Result<UpgradeOutcome, WorkflowError> {
    let policy = PolicySelector::new(params, &ctx.settings)?;
    let subscription = &ctx.settings.subscription;
    let activation_key = subscription.activation_key(params.os)?;
    let hostname = host.hostname.as_str();
    // sync checks only bracket a true upgrade
    let check_sync = !params.zstream;
    info!(
        from = %params.from_version,
        to = %params.to_version,
        zstream = params.zstream,
        "capsule upgrade"
    );

    state.advance(WorkflowPhase::PreflightCheck)?;
    let satellite = match host.owning_satellite() {
        Some(sat) => Some(ctx.connect(&sat).await?),
        None => None,
    };
    let executor = ctx.connect(host).await?;
    let prober = ctx.prober();
    let gate = ctx.gate();
    if check_sync {
        let sat = require_satellite(satellite.as_ref(), hostname)?;
        info!("checking capsule sync before upgrade");
        gate.sync_capsule(sat, hostname).await?;
    }
    prober.await_ssh_ready(executor.as_ref()).await?;
    if check_sync {
        open_firewall(executor.as_ref(), Role::Capsule).await;
    }

    state.advance(WorkflowPhase::RepoBaseline)?;
    let subscriptions = SubscriptionManager::new(executor.clone());
    subscriptions
        .register_with_activation_key(&subscription.organization, activation_key)
        .await
        .map_err(WorkflowError::step(hostname, "registration"))?;
    subscriptions
        .list_repos()
        .await
        .map_err(WorkflowError::step(hostname, "repository listing"))?;
    let repos = RepositoryStateManager::for_host(executor.clone());
    apply_repo_steps(
        hostname,
        &repos,
        &policy.repo_steps(Role::Capsule, RepoPhase::Baseline),
    )
    .await?;

    state.advance(WorkflowPhase::RepoTargetConfig)?;
    apply_repo_steps(
        hostname,
        &repos,
        &policy.repo_steps(Role::Capsule, RepoPhase::Target),
    )
    .await?;
    if let Ok(enabled) = subscriptions.enabled_repos().await {
        debug!(?enabled, "capsule repositories after configuration");
    }

    state.advance(WorkflowPhase::Execute)?;
    let outcome = UpgradeExecutor::new(&policy)
        .execute(host, &executor, satellite.as_ref())
        .await
        .into_result()?;

    if params.reboot_after_upgrade {
        state.advance(WorkflowPhase::Reboot)?;
        prober
            .reboot_and_await(executor.as_ref(), ctx.settings.timeouts.capsule_reboot)
            .await?;
    }

    state.advance(WorkflowPhase::PostValidate)?;
    prober.await_ssh_ready(executor.as_ref()).await?;
    gate.validate_upgrade(host, &executor, false).await?;

    if check_sync {
        state.advance(WorkflowPhase::SyncCheck)?;
        let sat = require_satellite(satellite.as_ref(), hostname)?;
        info!("checking capsule sync after upgrade");
        gate.sync_capsule(sat, hostname).await?;
    }

    Ok(outcome)
}

fn require_satellite<'a>(
    satellite: Option<&'a Arc<dyn RemoteExecutor>>,
    capsule: &str,
) -> Result<&'a Arc<dyn RemoteExecutor>, WorkflowError> {
    satellite.ok_or_else(|| {
        WorkflowError::Config(format!("capsule {capsule} has no satellite to sync from"))
    })
}
