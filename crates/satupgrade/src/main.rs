//! satupgrade
//!
//! Drives Satellite and Capsule setup and upgrades over SSH

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use satupgrade_core::{
    BugTracker, PolicySelector, RepoPhase, RepoStep, RepositorySet, Role, StaticBugTracker,
    UpgradeContext, UpgradePath, WorkflowError,
};
use satupgrade_exec::LocalExecutor;
use serde::Serialize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod bugzilla;
mod config;
mod factory;

use bugzilla::BugzillaClient;
use config::{Config, LogConfig};
use factory::SshConnector;

#[derive(Parser)]
#[command(name = "satupgrade")]
#[command(about = "Satellite and Capsule upgrade orchestration", long_about = None)]
struct Cli {
    /// Config file (default: $SATUPGRADE_CONFIG, ./satupgrade.toml, /etc/satupgrade/satupgrade.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Version currently installed
    #[arg(long, global = true)]
    from: Option<String>,

    /// Version to upgrade to
    #[arg(long, global = true)]
    to: Option<String>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register and prepare a Satellite for upgrade
    #[command(name = "satellite-setup")]
    SatelliteSetup {
        #[arg(long)]
        satellite: String,
    },
    /// Upgrade a Satellite
    #[command(name = "satellite-upgrade")]
    SatelliteUpgrade {
        #[arg(long)]
        satellite: String,
        /// Same-version maintenance upgrade
        #[arg(long)]
        zstream: bool,
    },
    /// Prepare capsules for upgrade
    #[command(name = "capsule-setup")]
    CapsuleSetup {
        #[arg(long)]
        satellite: String,
        #[arg(long = "capsule", required = true)]
        capsules: Vec<String>,
        /// Only bring the capsules up; skip repository and Satellite-side preparation
        #[arg(long)]
        no_upgradable: bool,
    },
    /// Upgrade a capsule to the target version
    #[command(name = "capsule-upgrade")]
    CapsuleUpgrade {
        #[arg(long)]
        capsule: String,
        #[arg(long)]
        satellite: String,
    },
    /// Upgrade a capsule to the latest zStream
    #[command(name = "capsule-zstream-upgrade")]
    CapsuleZstreamUpgrade {
        #[arg(long)]
        capsule: String,
        /// Needed only for the manual (certificate) upgrade path
        #[arg(long)]
        satellite: Option<String>,
    },
    /// Print the repository steps and upgrade path for a role without touching any host
    #[command(name = "plan")]
    Plan {
        #[arg(long, value_enum)]
        role: PlanRole,
        /// Plan a same-version maintenance upgrade
        #[arg(long)]
        zstream: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PlanRole {
    Satellite,
    Capsule,
}

impl From<PlanRole> for Role {
    fn from(role: PlanRole) -> Self {
        match role {
            PlanRole::Satellite => Role::Satellite,
            PlanRole::Capsule => Role::Capsule,
        }
    }
}

/// Decisions for one role, printed by `plan`
#[derive(Serialize)]
struct Plan {
    role: Role,
    target_repos: RepositorySet,
    baseline: Vec<RepoStep>,
    target: Vec<RepoStep>,
    installer: Vec<RepoStep>,
    content_migration: bool,
    upgrade_path: UpgradePath,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let path = cli.config.clone().or_else(Config::default_path);
    let mut config = match &path {
        Some(path) => Config::load(path)?,
        None => Config::from_env(),
    };
    init_tracing(&config.log, cli.json_logs);
    match &path {
        Some(path) => tracing::info!(path = %path.display(), "loaded config"),
        None => tracing::warn!("no config file found, using defaults"),
    }

    if let Some(from) = cli.from {
        config.upgrade.from_version = Some(from);
    }
    if let Some(to) = cli.to {
        config.upgrade.to_version = Some(to);
    }
    if let Commands::SatelliteUpgrade { zstream: true, .. } | Commands::Plan { zstream: true, .. } =
        cli.command
    {
        config.upgrade.zstream = true;
    }
    let params = config.upgrade.to_parameters()?;

    let bug_tracker = bug_tracker(&config)?;
    let ctx = UpgradeContext::new(
        params,
        config.product,
        Arc::new(SshConnector::new(config.ssh)),
        bug_tracker,
        Arc::new(LocalExecutor::new()),
    );

    match &cli.command {
        Commands::SatelliteSetup { satellite } => {
            finish(satupgrade_core::satellite_setup(&ctx, satellite).await)
        }
        Commands::SatelliteUpgrade { satellite, .. } => {
            finish(satupgrade_core::satellite_upgrade(&ctx, satellite).await)
        }
        Commands::CapsuleSetup {
            satellite,
            capsules,
            no_upgradable,
        } => finish(
            satupgrade_core::capsule_setup(&ctx, satellite, capsules, !no_upgradable).await,
        ),
        Commands::CapsuleUpgrade { capsule, satellite } => {
            finish(satupgrade_core::capsule_upgrade(&ctx, capsule, satellite).await)
        }
        Commands::CapsuleZstreamUpgrade { capsule, satellite } => finish(
            satupgrade_core::capsule_zstream_upgrade(&ctx, capsule, satellite.as_deref()).await,
        ),
        Commands::Plan { role, .. } => finish(plan(&ctx, Role::from(*role))),
    }
}

/// Print a successful report as JSON, log a failure
fn finish<T: Serialize>(result: Result<T, WorkflowError>) -> Result<ExitCode> {
    match result {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(kind = ?e.kind(), error = %e, "workflow failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn plan(ctx: &UpgradeContext, role: Role) -> Result<Plan, WorkflowError> {
    let policy = PolicySelector::new(ctx.params(), ctx.settings())?;
    Ok(Plan {
        role,
        baseline: policy.repo_steps(role, RepoPhase::Baseline),
        target: policy.repo_steps(role, RepoPhase::Target),
        installer: policy.repo_steps(role, RepoPhase::Installer),
        content_migration: policy.requires_content_migration(),
        upgrade_path: policy.upgrade_path(role),
        target_repos: policy.target_repos().clone(),
    })
}

fn bug_tracker(config: &Config) -> Result<Arc<dyn BugTracker>> {
    if !config.bugzilla.enabled {
        return Ok(Arc::new(StaticBugTracker::new(
            config.bugzilla.open_bugs.iter().copied(),
        )));
    }
    let client = BugzillaClient::new(
        &config.bugzilla.url,
        Duration::from_secs(config.bugzilla.timeout_secs),
    )?;
    Ok(Arc::new(client))
}

fn init_tracing(log: &LogConfig, json_logs: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let registry = tracing_subscriber::registry().with(filter);

    if json_logs || log.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
