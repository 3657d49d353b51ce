//! Satellite setup and upgrade

use satupgrade_pkg::{ForemanMaintain, RepositoryStateManager, SubscriptionManager};
use tracing::{info, warn};

use super::{UpgradeContext, apply_repo_steps};
use crate::error::WorkflowError;
use crate::host::{HostRef, Role};
use crate::params::DistributionChannel;
use crate::policy::{PolicySelector, RepoPhase};
use crate::state::{WorkflowPhase, WorkflowReport, WorkflowState};
use crate::upgrade::{UpgradeExecutor, UpgradeOutcome};

/// Make a Satellite ready for upgrade: SSH, repo cleanup, registration, service restart
///
/// # Errors
/// Returns the first fatal `WorkflowError`
pub async fn satellite_setup(
    ctx: &UpgradeContext,
    hostname: &str,
) -> Result<WorkflowReport<HostRef>, WorkflowError> {
    let mut state = WorkflowState::new("satellite_setup");
    state.set_current_host(hostname);
    let result = run_setup(ctx, &mut state, hostname).await;
    state.finish(result)
}

async fn run_setup(
    ctx: &UpgradeContext,
    state: &mut WorkflowState,
    hostname: &str,
) -> Result<HostRef, WorkflowError> {
    ctx.params.validate()?;
    let subscription = &ctx.settings.subscription;
    let (Some(username), Some(password)) = (
        subscription.rhn_username.as_deref(),
        subscription.rhn_password.as_deref(),
    ) else {
        return Err(WorkflowError::Config(
            "rhn_username and rhn_password are required to register the satellite".to_string(),
        ));
    };

    state.advance(WorkflowPhase::PreflightCheck)?;
    let host = HostRef::satellite(hostname);
    let executor = ctx.connect(&host).await?;
    ctx.prober().await_ssh_ready(executor.as_ref()).await?;

    state.advance(WorkflowPhase::RepoBaseline)?;
    RepositoryStateManager::for_host(executor.clone())
        .cleanup()
        .await
        .map_err(WorkflowError::step(hostname, "yum cleanup"))?;

    state.advance(WorkflowPhase::RepoTargetConfig)?;
    let subscriptions = SubscriptionManager::new(executor.clone());
    subscriptions
        .register_with_credentials(username, password)
        .await
        .map_err(WorkflowError::step(hostname, "registration"))?;
    match subscription.rhn_poolid.as_deref() {
        Some(pool) => subscriptions
            .attach_pool(pool)
            .await
            .map_err(WorkflowError::step(hostname, "pool attach"))?,
        None => warn!(host = hostname, "no rhn_poolid configured, skipping pool attach"),
    }

    state.advance(WorkflowPhase::Execute)?;
    ForemanMaintain::new(executor)
        .service_restart()
        .await
        .map_err(WorkflowError::step(hostname, "service restart"))?;

    info!(host = hostname, "satellite is ready for upgrade");
    Ok(host)
}

/// Upgrade the Satellite to the target version, or to the latest zStream when `params.zstream` is set
///
/// # Errors
/// Returns the first fatal `WorkflowError`; contradictory parameters fail before any remote command
pub async fn satellite_upgrade(
    ctx: &UpgradeContext,
    hostname: &str,
) -> Result<WorkflowReport<UpgradeOutcome>, WorkflowError> {
    let mut state = WorkflowState::new("satellite_upgrade");
    state.set_current_host(hostname);
    let result = run_upgrade(ctx, &mut state, hostname).await;
    state.finish(result)
}

async fn run_upgrade(
    ctx: &UpgradeContext,
    state: &mut WorkflowState,
    hostname: &str,
) -> Result<UpgradeOutcome, WorkflowError> {
    let policy = PolicySelector::new(&ctx.params, &ctx.settings)?;
    let bugs = ctx.known_bugs().await;
    info!(
        from = %ctx.params.from_version,
        to = %ctx.params.to_version,
        zstream = ctx.params.zstream,
        "satellite upgrade"
    );

    state.advance(WorkflowPhase::PreflightCheck)?;
    let host = HostRef::satellite(hostname);
    let executor = ctx.connect(&host).await?;
    let prober = ctx.prober();
    prober.await_ssh_ready(executor.as_ref()).await?;

    let repos = RepositoryStateManager::for_host(executor.clone());
    state.advance(WorkflowPhase::RepoBaseline)?;
    apply_repo_steps(
        hostname,
        &repos,
        &policy.repo_steps(Role::Satellite, RepoPhase::Baseline),
    )
    .await?;

    state.advance(WorkflowPhase::RepoTargetConfig)?;
    apply_repo_steps(
        hostname,
        &repos,
        &policy.repo_steps(Role::Satellite, RepoPhase::Target),
    )
    .await?;
    if ctx.params.distribution == DistributionChannel::Custom {
        ForemanMaintain::new(executor.clone())
            .packages_update()
            .await
            .map_err(WorkflowError::step(hostname, "maintenance packages update"))?;
    }

    let upgrader = UpgradeExecutor::new(&policy);
    if policy.requires_content_migration() {
        state.advance(WorkflowPhase::Migration)?;
        upgrader.migrate_content(&executor, &bugs).await?;
    }

    state.advance(WorkflowPhase::Execute)?;
    let outcome = upgrader.execute(&host, &executor, None).await.into_result()?;

    if ctx.params.reboot_after_upgrade {
        state.advance(WorkflowPhase::Reboot)?;
        prober
            .reboot_and_await(executor.as_ref(), ctx.settings.timeouts.satellite_reboot)
            .await?;
    }

    state.advance(WorkflowPhase::PostValidate)?;
    prober.await_ssh_ready(executor.as_ref()).await?;
    ctx.gate().validate_upgrade(&host, &executor, true).await?;

    Ok(outcome)
}
