use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use satupgrade_core::*;
use satupgrade_exec::{CommandResult, ExecError, RemoteExecutor};
use satupgrade_pkg::CustomRepo;

const SAT: &str = "sat.example.com";

type Log = Arc<Mutex<Vec<(String, String)>>>;

/// Executor answering by command prefix and recording every command into a shared log
struct ScriptedHost {
    name: String,
    log: Log,
    rules: Vec<(String, i32, String)>,
}

impl ScriptedHost {
    fn new(name: &str, log: &Log) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            rules: Vec::new(),
        }
    }

    fn respond(mut self, prefix: &str, status: i32, stdout: &str) -> Self {
        self.rules
            .push((prefix.to_string(), status, stdout.to_string()));
        self
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedHost {
    fn host(&self) -> &str {
        &self.name
    }

    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.log
            .lock()
            .unwrap()
            .push((self.name.clone(), cmd.to_string()));
        let result = self
            .rules
            .iter()
            .find(|(prefix, _, _)| cmd.starts_with(prefix.as_str()))
            .map_or_else(
                || CommandResult::exited(0, ""),
                |(_, status, stdout)| CommandResult::exited(*status, stdout.as_str()),
            );
        Ok(result)
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        _timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.run(cmd).await
    }

    fn executor_type(&self) -> &'static str {
        "scripted"
    }
}

/// Hands out the scripted executors by hostname
struct RecordingConnector {
    hosts: HashMap<String, Arc<ScriptedHost>>,
}

#[async_trait]
impl HostConnector for RecordingConnector {
    async fn connect(&self, host: &HostRef) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        match self.hosts.get(&host.hostname) {
            Some(executor) => {
                let executor: Arc<dyn RemoteExecutor> = executor.clone();
                Ok(executor)
            }
            None => Err(ExecError::ConnectionFailed {
                host: host.hostname.clone(),
                reason: "unknown host".to_string(),
            }),
        }
    }
}

struct Rig {
    log: Log,
    ctx: UpgradeContext,
}

impl Rig {
    fn new(
        params: UpgradeParameters,
        settings: ProductSettings,
        hosts: Vec<ScriptedHost>,
        local: ScriptedHost,
        open_bugs: &[u32],
    ) -> Self {
        let log = local.log.clone();
        let connector = RecordingConnector {
            hosts: hosts
                .into_iter()
                .map(|h| (h.name.clone(), Arc::new(h)))
                .collect(),
        };
        let ctx = UpgradeContext::new(
            params,
            settings,
            Arc::new(connector),
            Arc::new(StaticBugTracker::new(open_bugs.iter().copied())),
            Arc::new(local),
        );
        Self { log, ctx }
    }

    fn commands_on(&self, host: &str) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }

    fn all_commands(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().clone()
    }
}

fn settings() -> ProductSettings {
    let mut settings = ProductSettings::default();
    settings.timeouts = Timeouts {
        ping_attempts: 1,
        ping_interval: Duration::ZERO,
        ssh_attempts: 2,
        ssh_interval: Duration::ZERO,
        probe_timeout: Duration::from_secs(1),
        reboot_grace: Duration::ZERO,
        satellite_reboot: Duration::from_secs(5),
        capsule_reboot: Duration::from_secs(5),
        sync_timeout: Duration::from_secs(5),
        sync_interval: Duration::ZERO,
    };
    settings.subscription.rhn_username = Some("rhn-user".to_string());
    settings.subscription.rhn_password = Some("rhn-pass".to_string());
    settings
        .subscription
        .capsule_activation_keys
        .insert(OsVariant::Rhel7, "ak-capsule-rhel7".to_string());
    settings
        .repos
        .base_os
        .insert(OsVariant::Rhel7, "http://compose/rhel7/os".to_string());
    settings
}

fn custom_repo(id: &str, url: &str) -> CustomRepo {
    CustomRepo {
        repository: id.to_string(),
        repository_name: id.to_string(),
        base_url: url.to_string(),
        enable: true,
        gpg: false,
    }
}

fn satellite(log: &Log, version: &str) -> ScriptedHost {
    ScriptedHost::new(SAT, log)
        .respond("rpm -q", 0, version)
        .respond("hammer --output json", 0, "{}")
        .respond("cat ~/.ssh/id_rsa.pub", 0, "ssh-rsa AAAAB3Nza root@sat.example.com\n")
}

fn capsule(name: &str, log: &Log, version: &str) -> ScriptedHost {
    ScriptedHost::new(name, log).respond("rpm -q", 0, version)
}

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn position(commands: &[String], prefix: &str) -> usize {
    commands
        .iter()
        .position(|c| c.starts_with(prefix))
        .unwrap_or_else(|| panic!("no command starting with {prefix:?} in {commands:#?}"))
}

#[tokio::test]
async fn cdn_satellite_upgrade_6_9_to_6_10() {
    let log = new_log();
    let params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn);
    let rig = Rig::new(
        params,
        settings(),
        vec![satellite(&log, "6.10.1")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    let report = satellite_upgrade(&rig.ctx, SAT).await.unwrap();

    assert_eq!(
        rig.commands_on(SAT),
        vec![
            "echo ok",
            "subscription-manager repos --disable='*'",
            "subscription-manager repos --enable='rhel-7-server-satellite-maintenance-6-rpms'",
            "foreman-maintain content prepare",
            "foreman-maintain upgrade run --target-version 6.10 -y --whitelist=\"disk-performance\"",
            "reboot",
            "echo ok",
            "echo ok",
            "foreman-maintain health check --assumeyes",
            "rpm -q --queryformat '%{VERSION}' satellite",
            "hammer ping",
        ]
    );
    assert_eq!(
        report.phases(),
        vec![
            WorkflowPhase::Start,
            WorkflowPhase::PreflightCheck,
            WorkflowPhase::RepoBaseline,
            WorkflowPhase::RepoTargetConfig,
            WorkflowPhase::Migration,
            WorkflowPhase::Execute,
            WorkflowPhase::Reboot,
            WorkflowPhase::PostValidate,
            WorkflowPhase::Done,
        ]
    );
    assert_eq!(report.value.strategy, UpgradeStrategy::MaintenanceTool);
    assert!(report.value.succeeded);
}

#[tokio::test]
async fn satellite_zstream_mismatch_issues_no_command() {
    let log = new_log();
    let params =
        UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn).into_zstream();
    let rig = Rig::new(
        params,
        settings(),
        vec![satellite(&log, "6.10.1")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    let err = satellite_upgrade(&rig.ctx, SAT).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(rig.all_commands().is_empty());
}

#[tokio::test]
async fn capsule_zstream_mismatch_issues_no_command() {
    let log = new_log();
    let params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn);
    let rig = Rig::new(
        params,
        settings(),
        vec![satellite(&log, "6.9.7"), capsule("cap1.example.com", &log, "6.9.7")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    let err = capsule_zstream_upgrade(&rig.ctx, "cap1.example.com", Some(SAT))
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Config(_)));
    assert!(rig.all_commands().is_empty());
}

#[tokio::test]
async fn disable_all_precedes_every_enable() {
    let log = new_log();
    let mut params = UpgradeParameters::new("6.8", "6.9", OsVariant::Rhel7, DistributionChannel::Cdn);
    params.satellite_maintenance_tool = false;
    let rig = Rig::new(
        params,
        settings(),
        vec![satellite(&log, "6.9.0")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    satellite_upgrade(&rig.ctx, SAT).await.unwrap();

    let commands = rig.commands_on(SAT);
    let disable_all = position(&commands, "subscription-manager repos --disable='*'");
    let first_enable = position(&commands, "subscription-manager repos --enable=");
    assert!(disable_all < first_enable);
    assert!(commands.contains(&"subscription-manager repos --enable='rhel-7-server-rpms'".to_string()));
    assert!(commands.contains(
        &"subscription-manager repos --enable='rhel-7-server-satellite-6.9-rpms'".to_string()
    ));
    assert!(!commands.iter().any(|c| c == "foreman-maintain content prepare"));
}

#[tokio::test]
async fn pulp_worker_workaround_wraps_migration() {
    let log = new_log();
    let params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn);
    let rig = Rig::new(
        params,
        settings(),
        vec![satellite(&log, "6.10.0")],
        ScriptedHost::new("localhost", &log),
        &[bugs::PULP_MIGRATION_WORKERS],
    );

    satellite_upgrade(&rig.ctx, SAT).await.unwrap();

    let commands = rig.commands_on(SAT);
    let apply = position(&commands, "cp -n /etc/default/pulp_workers");
    let migrate = position(&commands, "foreman-maintain content prepare");
    let revert = position(&commands, "mv -f /etc/default/pulp_workers.satupgrade");
    let upgrade = position(&commands, "foreman-maintain upgrade run");
    assert!(apply < migrate && migrate < revert && revert < upgrade);
}

#[tokio::test]
async fn failed_migration_stops_before_upgrade() {
    let log = new_log();
    let params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn);
    let sat = satellite(&log, "6.10.0").respond("foreman-maintain content prepare", 1, "");
    let rig = Rig::new(
        params,
        settings(),
        vec![sat],
        ScriptedHost::new("localhost", &log),
        &[bugs::PULP_MIGRATION_WORKERS],
    );

    let err = satellite_upgrade(&rig.ctx, SAT).await.unwrap_err();

    assert!(matches!(err, WorkflowError::MigrationFailed { ref host } if host == SAT));
    let commands = rig.commands_on(SAT);
    // the workaround is still reverted
    assert!(commands.last().unwrap().starts_with("mv -f /etc/default/pulp_workers.satupgrade"));
    assert!(!commands.iter().any(|c| c.starts_with("foreman-maintain upgrade")));
    assert!(!commands.iter().any(|c| c == "reboot"));
}

#[tokio::test]
async fn custom_channel_defines_each_repository_once() {
    let log = new_log();
    let params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Custom);
    let mut settings = settings();
    settings.repos.custom_satellite = vec![
        custom_repo("sat6", "http://compose/Satellite/x86_64/os"),
        custom_repo("satmaintenance", "http://compose/Maintenance/x86_64/os"),
    ];
    let rig = Rig::new(
        params,
        settings,
        vec![satellite(&log, "6.10.0")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    satellite_upgrade(&rig.ctx, SAT).await.unwrap();

    let commands = rig.commands_on(SAT);
    for file in ["sat6", "satmaintenance"] {
        let writes = commands
            .iter()
            .filter(|c| c.starts_with(&format!("cat > /etc/yum.repos.d/{file}.repo")))
            .count();
        assert_eq!(writes, 1, "{file} written {writes} times");
    }
    assert!(!commands.iter().any(|c| c.starts_with("subscription-manager repos --enable")));
    let packages = position(&commands, "foreman-maintain packages update");
    assert!(position(&commands, "cat > /etc/yum.repos.d/satmaintenance.repo") < packages);
}

#[tokio::test]
async fn manual_custom_upgrade_refreshes_packages_around_installer() {
    let log = new_log();
    let mut params = UpgradeParameters::new("6.8", "6.9", OsVariant::Rhel7, DistributionChannel::Custom);
    params.satellite_maintenance_tool = false;
    params.reboot_after_upgrade = false;
    let mut settings = settings();
    settings.repos.custom_satellite = vec![custom_repo("sat6", "http://compose/Satellite/x86_64/os")];
    let rig = Rig::new(
        params,
        settings,
        vec![satellite(&log, "6.9.0")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    let report = satellite_upgrade(&rig.ctx, SAT).await.unwrap();

    assert_eq!(report.value.strategy, UpgradeStrategy::Manual);
    let commands = rig.commands_on(SAT);
    let unlock = position(&commands, "foreman-maintain packages unlock");
    let update = position(&commands, "yum -y -q update");
    let installer = position(&commands, "satellite-installer --scenario satellite --upgrade");
    let lock = position(&commands, "foreman-maintain packages lock");
    assert!(position(&commands, "rm -f /etc/yum.repos.d/rhel-optional.repo") < unlock);
    assert!(unlock < update && update < installer && installer < lock);
    assert!(!commands.iter().any(|c| c.contains("server-satellite-6.9-rpms")));
    assert!(!commands.iter().any(|c| c == "reboot"));
    let writes = commands
        .iter()
        .filter(|c| c.starts_with("cat > /etc/yum.repos.d/sat6.repo"))
        .count();
    assert_eq!(writes, 1);
}

#[tokio::test]
async fn manual_refresh_reenables_target_repositories_after_unlock() {
    let log = new_log();
    let mut params = UpgradeParameters::new("6.8", "6.9", OsVariant::Rhel7, DistributionChannel::Cdn);
    params.satellite_maintenance_tool = false;
    params.reboot_after_upgrade = false;
    let rig = Rig::new(
        params,
        settings(),
        vec![satellite(&log, "6.9.0")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    satellite_upgrade(&rig.ctx, SAT).await.unwrap();

    let commands = rig.commands_on(SAT);
    let unlock = position(&commands, "foreman-maintain packages unlock");
    let update = position(&commands, "yum -y -q update");
    let server = "subscription-manager repos --enable='rhel-7-server-rpms'";
    let reenabled = commands
        .iter()
        .enumerate()
        .any(|(i, c)| c == server && unlock < i && i < update);
    assert!(reenabled, "{server} not re-run between unlock and update in {commands:#?}");
    let maintenance = commands
        .iter()
        .filter(|c| c.contains("--enable='rhel-7-server-satellite-maintenance-6-rpms'"))
        .count();
    assert_eq!(maintenance, 2);
}

#[tokio::test]
async fn capsule_setup_aborts_batch_on_unreachable_host() {
    let log = new_log();
    let params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn);
    let local = ScriptedHost::new("localhost", &log).respond("ping -c1 -W1 cap2.example.com", 1, "");
    let rig = Rig::new(
        params,
        settings(),
        vec![
            satellite(&log, "6.10.0"),
            capsule("cap1.example.com", &log, "6.9.0"),
            capsule("cap2.example.com", &log, "6.9.0"),
            capsule("cap3.example.com", &log, "6.9.0"),
        ],
        local,
        &[],
    );
    let capsules: Vec<String> = ["cap1.example.com", "cap2.example.com", "cap3.example.com"]
        .iter()
        .map(ToString::to_string)
        .collect();

    let err = capsule_setup(&rig.ctx, SAT, &capsules, true).await.unwrap_err();

    match err {
        WorkflowError::NonResponsiveHosts(hosts) => {
            assert_eq!(hosts, vec!["cap2.example.com".to_string()]);
        }
        other => panic!("unexpected error {other}"),
    }
    // probing continued past the failing host
    assert!(rig
        .commands_on("localhost")
        .contains(&"ping -c1 -W1 cap3.example.com".to_string()));
    assert!(rig.commands_on("cap3.example.com").contains(&"echo ok".to_string()));
    // nothing reached the key copy or sync step
    assert!(rig.commands_on(SAT).is_empty());
    assert!(!rig
        .all_commands()
        .iter()
        .any(|(_, c)| c.contains("authorized_keys") || c.contains("rhel_base_os")));
}

#[tokio::test]
async fn capsule_setup_prepares_upgradable_capsules() {
    let log = new_log();
    let params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Custom);
    let mut settings = settings();
    settings.repos.custom_capsule = CapsuleRepoUrls {
        capsule: Some("http://compose/Capsule/x86_64/os".to_string()),
        tools: None,
        maintenance: None,
    };
    let rig = Rig::new(
        params,
        settings,
        vec![
            satellite(&log, "6.10.0"),
            capsule("cap1.example.com", &log, "6.9.0"),
            capsule("cap2.example.com", &log, "6.9.0"),
        ],
        ScriptedHost::new("localhost", &log),
        &[bugs::CAPSULE_MANAGE_REPOS],
    );
    let capsules = vec!["cap1.example.com".to_string(), "cap2.example.com".to_string()];

    let report = capsule_setup(&rig.ctx, SAT, &capsules, true).await.unwrap();

    assert_eq!(report.value.len(), 2);
    for cap in &capsules {
        let commands = rig.commands_on(cap);
        assert!(commands.contains(&"subscription-manager config --rhsm.manage_repos=1".to_string()));
        assert!(commands.iter().any(|c| c.starts_with("cat > /etc/yum.repos.d/rhel_base_os.repo")));
        assert!(commands
            .iter()
            .any(|c| c.contains("ssh-rsa AAAAB3Nza root@sat.example.com")));
    }
    let sat = rig.commands_on(SAT);
    assert!(sat.contains(
        &"hammer capsule update --name cap2.example.com --organization-ids 1 --location-ids 2"
            .to_string()
    ));
    assert!(sat.iter().any(|c| c.starts_with(
        "hammer repository synchronize --product 'capsule_upgrade' --name 'capsule_repo'"
    )));

    // base OS and cleanup come last, once the satellite content is synced
    let all = rig.all_commands();
    let repo_sync = all
        .iter()
        .position(|(h, c)| h == SAT && c.starts_with("hammer repository synchronize"))
        .unwrap();
    let first_base_os = all
        .iter()
        .position(|(_, c)| c.contains("rhel_base_os"))
        .unwrap();
    assert!(repo_sync < first_base_os);
    for cap in &capsules {
        let commands = rig.commands_on(cap);
        let base_os = position(&commands, "cat > /etc/yum.repos.d/rhel_base_os.repo");
        assert!(position(&commands, "foreman-maintain service restart") < base_os);
        assert!(base_os < position(&commands, "yum clean all"));
    }
}

#[tokio::test]
async fn capsule_setup_checks_every_capsule_after_restart_failure() {
    let log = new_log();
    let params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn);
    let rig = Rig::new(
        params,
        settings(),
        vec![
            satellite(&log, "6.10.0"),
            capsule("cap1.example.com", &log, "6.9.0").respond("foreman-maintain service restart", 1, ""),
            capsule("cap2.example.com", &log, "6.9.0").respond("echo ok", 1, ""),
            capsule("cap3.example.com", &log, "6.9.0"),
        ],
        ScriptedHost::new("localhost", &log),
        &[],
    );
    let capsules: Vec<String> = ["cap1.example.com", "cap2.example.com", "cap3.example.com"]
        .iter()
        .map(ToString::to_string)
        .collect();

    let err = capsule_setup(&rig.ctx, SAT, &capsules, true).await.unwrap_err();

    match err {
        WorkflowError::NonResponsiveHosts(hosts) => {
            assert_eq!(
                hosts,
                vec!["cap1.example.com".to_string(), "cap2.example.com".to_string()]
            );
        }
        other => panic!("unexpected error {other}"),
    }
    let pings = rig.commands_on("localhost");
    for cap in &capsules {
        assert!(pings.contains(&format!("ping -c1 -W1 {cap}")), "{cap} was not pinged");
    }
    assert!(rig
        .commands_on("cap3.example.com")
        .contains(&"foreman-maintain service restart".to_string()));
    assert!(rig.commands_on(SAT).is_empty());
}

#[tokio::test]
async fn capsule_setup_configures_http_proxy() {
    let log = new_log();
    let mut params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn);
    params.http_proxy = true;
    let mut settings = settings();
    settings.capsule.http_proxy_url = Some("http://proxy.example.com:3128".to_string());
    let rig = Rig::new(
        params,
        settings,
        vec![satellite(&log, "6.10.0"), capsule("cap1.example.com", &log, "6.9.0")],
        ScriptedHost::new("localhost", &log),
        &[bugs::CAPSULE_MANAGE_REPOS],
    );

    capsule_setup(&rig.ctx, SAT, &["cap1.example.com".to_string()], true)
        .await
        .unwrap();

    let sat = rig.commands_on(SAT);
    let create = position(
        &sat,
        "hammer http-proxy create --name 'proxy_for_upgrade' --url 'http://proxy.example.com:3128' --organization-ids 1",
    );
    let default = position(
        &sat,
        "hammer settings set --name content_default_http_proxy --value 'proxy_for_upgrade'",
    );
    assert!(create < default);
}

#[tokio::test]
async fn capsule_setup_proxy_without_url_is_config_error() {
    let log = new_log();
    let mut params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn);
    params.http_proxy = true;
    let rig = Rig::new(
        params,
        settings(),
        vec![satellite(&log, "6.10.0"), capsule("cap1.example.com", &log, "6.9.0")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    let err = capsule_setup(&rig.ctx, SAT, &["cap1.example.com".to_string()], true)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Config(_)));
    assert!(rig.all_commands().is_empty());
}

#[tokio::test]
async fn capsule_setup_continues_when_manage_repos_bug_is_fixed() {
    let log = new_log();
    let params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn);
    let rig = Rig::new(
        params,
        settings(),
        vec![satellite(&log, "6.10.0"), capsule("cap1.example.com", &log, "6.9.0")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    let report = capsule_setup(&rig.ctx, SAT, &["cap1.example.com".to_string()], true)
        .await
        .unwrap();

    assert_eq!(report.value, vec![HostRef::capsule("cap1.example.com", SAT)]);
    let commands = rig.commands_on("cap1.example.com");
    assert!(commands.contains(&"subscription-manager config --rhsm.manage_repos=1".to_string()));
    assert!(commands.contains(&"foreman-maintain service restart".to_string()));
}

#[tokio::test]
async fn manual_capsule_upgrade_uses_satellite_certificates() {
    let log = new_log();
    let mut params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn);
    params.capsule_maintenance_tool = false;
    let cap = "cap1.example.com";
    let rig = Rig::new(
        params,
        settings(),
        vec![satellite(&log, "6.10.0"), capsule(cap, &log, "6.10.0")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    let report = capsule_upgrade(&rig.ctx, cap, SAT).await.unwrap();

    assert_eq!(report.value.strategy, UpgradeStrategy::Manual);
    let certs = format!("/root/{cap}-certs.tar");
    let sat = rig.commands_on(SAT);
    let generate = position(
        &sat,
        &format!("capsule-certs-generate --foreman-proxy-fqdn {cap} --certs-tar {certs}"),
    );
    let copy = position(&sat, &format!("scp -o StrictHostKeyChecking=no {certs} root@{cap}:{certs}"));
    assert!(generate < copy);

    let commands = rig.commands_on(cap);
    let update = position(&commands, "yum -y update");
    let installer = position(
        &commands,
        &format!("satellite-installer --scenario capsule --certs-tar-file {certs} --certs-update-all"),
    );
    assert!(update < installer);
    assert!(!commands.iter().any(|c| c.starts_with("foreman-maintain upgrade")));
}

#[tokio::test]
async fn manual_capsule_zstream_without_satellite_is_config_error() {
    let log = new_log();
    let mut params = UpgradeParameters::new("6.9", "6.9", OsVariant::Rhel7, DistributionChannel::Cdn);
    params.capsule_maintenance_tool = false;
    let cap = "cap1.example.com";
    let rig = Rig::new(
        params,
        settings(),
        vec![capsule(cap, &log, "6.9.8")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    let err = capsule_zstream_upgrade(&rig.ctx, cap, None).await.unwrap_err();

    assert!(matches!(err, WorkflowError::Config(_)));
    let commands = rig.commands_on(cap);
    assert!(!commands.iter().any(|c| c.starts_with("satellite-installer")));
    assert!(!commands.iter().any(|c| c.starts_with("yum -y update")));
}

#[tokio::test]
async fn capsule_setup_requires_base_os_for_the_os() {
    let log = new_log();
    let params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel8, DistributionChannel::Cdn);
    let rig = Rig::new(
        params,
        settings(),
        vec![capsule("cap1.example.com", &log, "6.9.0")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    let err = capsule_setup(&rig.ctx, SAT, &["cap1.example.com".to_string()], true)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Config(_)));
    assert!(rig.all_commands().is_empty());
}

#[tokio::test]
async fn capsule_upgrade_is_bracketed_by_sync_checks() {
    let log = new_log();
    let params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn);
    let cap = "cap1.example.com";
    let rig = Rig::new(
        params,
        settings(),
        vec![satellite(&log, "6.10.0"), capsule(cap, &log, "6.10.0")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    let report = capsule_upgrade(&rig.ctx, cap, SAT).await.unwrap();

    assert_eq!(
        rig.commands_on(SAT),
        vec![
            format!("hammer capsule content synchronize --name {cap} --async"),
            format!("hammer --output json capsule content synchronization-status --name {cap}"),
            format!("hammer capsule content synchronize --name {cap} --async"),
            format!("hammer --output json capsule content synchronization-status --name {cap}"),
        ]
    );

    let commands = rig.commands_on(cap);
    let register = position(
        &commands,
        "subscription-manager register --org=\"Default_Organization\" --activationkey=ak-capsule-rhel7",
    );
    let disable_old = position(
        &commands,
        "subscription-manager repos --disable='rhel-7-server-satellite-capsule-6.9-rpms'",
    );
    let enable_new = position(
        &commands,
        "subscription-manager repos --enable='rhel-7-server-satellite-capsule-6.10-rpms'",
    );
    let ansible = position(
        &commands,
        "subscription-manager repos --enable='rhel-7-server-ansible-2.9-rpms'",
    );
    let packages = position(&commands, "foreman-maintain packages update");
    let upgrade = position(&commands, "foreman-maintain upgrade run --target-version 6.10");
    assert!(register < disable_old && disable_old < enable_new && enable_new < ansible);
    assert!(ansible < packages && packages < upgrade);
    assert!(commands.contains(&"rpm -q --queryformat '%{VERSION}' satellite-capsule".to_string()));
    assert!(!commands.contains(&"hammer ping".to_string()));
    assert_eq!(report.phases().last(), Some(&WorkflowPhase::Done));
    assert!(report.phases().contains(&WorkflowPhase::SyncCheck));
}

#[tokio::test]
async fn capsule_validation_failure_names_host() {
    let log = new_log();
    let params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn);
    let cap = "cap1.example.com";
    let rig = Rig::new(
        params,
        settings(),
        vec![satellite(&log, "6.10.0"), capsule(cap, &log, "6.9.7")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    let err = capsule_upgrade(&rig.ctx, cap, SAT).await.unwrap_err();

    assert!(matches!(err, WorkflowError::ValidationFailed { ref host, .. } if host == cap));
    // no sync check after a failed validation
    assert_eq!(rig.commands_on(SAT).len(), 2);
}

#[tokio::test]
async fn capsule_sync_that_never_finishes_times_out() {
    let log = new_log();
    let params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn);
    let mut settings = settings();
    settings.timeouts.sync_timeout = Duration::ZERO;
    let cap = "cap1.example.com";
    let sat = ScriptedHost::new(SAT, &log).respond(
        "hammer --output json",
        0,
        r#"{"Active Sync Tasks": [{"Id": "1c3b0f4e"}]}"#,
    );
    let rig = Rig::new(
        params,
        settings,
        vec![sat, capsule(cap, &log, "6.10.0")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    let err = capsule_upgrade(&rig.ctx, cap, SAT).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(rig.commands_on(cap).is_empty());
}

#[tokio::test]
async fn capsule_zstream_upgrade_without_reboot() {
    let log = new_log();
    let mut params = UpgradeParameters::new("6.9", "6.9", OsVariant::Rhel7, DistributionChannel::Cdn);
    params.reboot_after_upgrade = false;
    let cap = "cap1.example.com";
    let rig = Rig::new(
        params,
        settings(),
        vec![capsule(cap, &log, "6.9.8")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    let report = capsule_zstream_upgrade(&rig.ctx, cap, None).await.unwrap();

    let commands = rig.commands_on(cap);
    assert!(commands.contains(
        &"foreman-maintain upgrade run --target-version 6.9.z -y --whitelist=\"disk-performance\""
            .to_string()
    ));
    assert!(!commands.iter().any(|c| c == "reboot"));
    assert!(!commands.iter().any(|c| c.contains("--disable=")));
    assert!(!report.phases().contains(&WorkflowPhase::Reboot));
    assert!(!report.phases().contains(&WorkflowPhase::SyncCheck));
}

#[tokio::test]
async fn satellite_setup_registers_and_restarts() {
    let log = new_log();
    let params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn);
    let mut settings = settings();
    settings.subscription.rhn_poolid = Some("8a85f98".to_string());
    let rig = Rig::new(
        params,
        settings,
        vec![satellite(&log, "6.9.7")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    let report = satellite_setup(&rig.ctx, SAT).await.unwrap();

    assert_eq!(report.value, HostRef::satellite(SAT));
    let commands = rig.commands_on(SAT);
    let clean = position(&commands, "yum clean all");
    let register = position(&commands, "subscription-manager register --force --username='rhn-user'");
    let attach = position(&commands, "subscription-manager attach --pool=8a85f98");
    let restart = position(&commands, "foreman-maintain service restart");
    assert!(clean < register && register < attach && attach < restart);
}

#[tokio::test]
async fn satellite_setup_without_credentials_is_config_error() {
    let log = new_log();
    let params = UpgradeParameters::new("6.9", "6.10", OsVariant::Rhel7, DistributionChannel::Cdn);
    let mut settings = settings();
    settings.subscription.rhn_password = None;
    let rig = Rig::new(
        params,
        settings,
        vec![satellite(&log, "6.9.7")],
        ScriptedHost::new("localhost", &log),
        &[],
    );

    let err = satellite_setup(&rig.ctx, SAT).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(rig.all_commands().is_empty());
}
