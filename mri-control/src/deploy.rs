use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use mri_common::JoinMap;
use mri_topology::TopologyGraph;
use mri_wire::rulelog::RuleLogWriter;
use tracing::{debug, error, info};

use crate::{
    ControlPlane, DeployError, ProgramDescriptor, Rule, RuleInstaller, Session, SessionRegistry,
    TableEntry,
};

/// Default address of the switches' control endpoints.
pub const DEFAULT_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
/// Control port of the first switch. The `n`th switch (in name order) listens on
/// `DEFAULT_BASE_PORT + n`.
pub const DEFAULT_BASE_PORT: u16 = 50051;

/// Options for [`deploy`].
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Address of the switches' control endpoints.
    address: IpAddr,
    /// Control port of the first switch.
    base_port: u16,
    /// The program loaded on every switch.
    program: ProgramDescriptor,
    /// Directory holding one rule log per switch.
    rules_dir: PathBuf,
    /// Whether to install the telemetry default entry after the forwarding rules.
    telemetry_entry: bool,
    /// Whether to read back and log the installed entries once done.
    read_back: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            base_port: DEFAULT_BASE_PORT,
            program: ProgramDescriptor::default(),
            rules_dir: PathBuf::from("rules"),
            telemetry_entry: true,
            read_back: true,
        }
    }
}

impl DeployOptions {
    /// Sets the address of the switches' control endpoints.
    pub fn address(mut self, address: IpAddr) -> Self {
        self.address = address;
        self
    }

    /// Sets the control port of the first switch. Every following switch uses the next port.
    pub fn base_port(mut self, base_port: u16) -> Self {
        self.base_port = base_port;
        self
    }

    /// Sets the program loaded on every switch.
    pub fn program(mut self, program: ProgramDescriptor) -> Self {
        self.program = program;
        self
    }

    /// Sets the directory the rule logs are written to.
    pub fn rules_dir(mut self, rules_dir: impl Into<PathBuf>) -> Self {
        self.rules_dir = rules_dir.into();
        self
    }

    /// Sets whether the telemetry default entry (`add_swtrace`) is installed.
    pub fn telemetry_entry(mut self, telemetry_entry: bool) -> Self {
        self.telemetry_entry = telemetry_entry;
        self
    }

    /// Sets whether the installed entries are read back once a switch is done.
    pub fn read_back(mut self, read_back: bool) -> Self {
        self.read_back = read_back;
        self
    }
}

/// A switch whose installation sequence ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOutcome {
    /// Switch name.
    pub switch: String,
    /// Device id, the numeric suffix of the name.
    pub device_id: u64,
    /// Control plane address the session was opened on.
    pub address: SocketAddr,
    /// Forwarding rules installed (and logged).
    pub rules: usize,
    /// Entries read back from the switch, if read back was enabled.
    pub read_back: Option<usize>,
}

/// Result of [`deploy`], per switch, in switch name order.
#[derive(Debug, Default)]
pub struct DeploymentReport {
    /// Switches that were fully programmed.
    pub succeeded: Vec<SwitchOutcome>,
    /// Switches that stopped, with the reason.
    pub failed: Vec<(String, DeployError)>,
}

impl DeploymentReport {
    /// Returns `true` if no switch failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Installs the compiled tables of `graph` on every switch.
///
/// The `n`th switch in name order gets device id `n` and is reached on `base_port + n`. Each
/// switch goes through its own sequence: open a session, claim mastership, load the program,
/// install its rules in id order, install the telemetry entry, read back.
///
/// Every switch's rule log is truncated before any session is opened, so a switch that fails
/// early never keeps the log of a previous run.
/// Switches proceed concurrently, one task each. A failure stops the sequence of that switch
/// only. Every opened session is added to `registry` so it can be released on shutdown.
pub async fn deploy<P: ControlPlane>(
    plane: Arc<P>,
    graph: &TopologyGraph,
    options: DeployOptions,
    registry: SessionRegistry<P::Session>,
) -> DeploymentReport {
    let options = Arc::new(options);
    let mut tasks = JoinMap::new();
    let mut report = DeploymentReport::default();

    for (index, node) in graph.switches().enumerate() {
        let switch = node.name().to_owned();
        let Some(switch_id) = node.switch_id() else { continue };

        let log = match RuleLogWriter::create(&options.rules_dir, &switch) {
            Ok(log) => log,
            Err(e) => {
                report.failed.push((switch, e.into()));
                continue;
            }
        };

        let Some(address) = u16::try_from(index)
            .ok()
            .and_then(|offset| options.base_port.checked_add(offset))
            .map(|port| SocketAddr::new(options.address, port))
        else {
            report.failed.push((switch.clone(), DeployError::AddressExhausted { switch, index }));
            continue;
        };

        let target = Target { switch: switch.clone(), switch_id, address, device_id: index as u64 };
        let rules = graph.rules(&switch).to_vec();

        let plane = Arc::clone(&plane);
        let options = Arc::clone(&options);
        let registry = registry.clone();

        tasks.spawn(switch.clone(), async move {
            let result =
                install_switch(plane.as_ref(), &target, log, rules, &options, &registry).await;
            (target.switch, result)
        });
    }

    info!(switches = tasks.len(), "Deploying forwarding state");

    let mut pending: Vec<String> = graph.switches().map(|node| node.name().to_owned()).collect();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((switch, result)) => {
                pending.retain(|name| *name != switch);
                match result {
                    Ok(outcome) => {
                        info!(%switch, rules = outcome.rules, "Switch ready");
                        report.succeeded.push(outcome);
                    }
                    Err(e) => {
                        error!(%switch, err = %e, "Installation failed");
                        report.failed.push((switch, e));
                    }
                }
            }
            Err(e) => error!(err = ?e, "Installation task panicked"),
        }
    }

    // Switches whose task neither succeeded nor failed (it panicked or was cancelled).
    for switch in pending {
        if !report.failed.iter().any(|(name, _)| *name == switch) {
            report.failed.push((switch, DeployError::Incomplete));
        }
    }

    report.succeeded.sort_by(|a, b| a.switch.cmp(&b.switch));
    report.failed.sort_by(|a, b| a.0.cmp(&b.0));

    info!(succeeded = report.succeeded.len(), failed = report.failed.len(), "Deployment finished");

    report
}

#[derive(Debug)]
struct Target {
    switch: String,
    switch_id: u16,
    address: SocketAddr,
    device_id: u64,
}

/// The installation sequence of one switch.
async fn install_switch<P: ControlPlane>(
    plane: &P,
    target: &Target,
    log: RuleLogWriter,
    rules: Vec<Rule>,
    options: &DeployOptions,
    registry: &SessionRegistry<P::Session>,
) -> Result<SwitchOutcome, DeployError> {
    let switch = target.switch.as_str();

    let session = Arc::new(plane.establish(switch, target.address, target.device_id).await?);
    registry.register(Arc::clone(&session));

    session.claim_mastership().await?;
    debug!(%switch, "Claimed mastership");

    session.set_forwarding_program(&options.program).await?;
    info!(%switch, p4info = %options.program.p4info.display(), "Installed forwarding program");

    let mut installer = RuleInstaller::new(Arc::clone(&session), log);
    let installed = installer.install_all(&rules).await?;

    if options.telemetry_entry {
        session.write_table_entry(&TableEntry::Swtrace { switch_id: target.switch_id }).await?;
        debug!(%switch, swid = target.switch_id, "Installed telemetry entry");
    }

    let read_back = if options.read_back {
        let entries = session.read_table_entries().await?;
        for entry in &entries {
            info!(%switch, "{entry}");
        }
        Some(entries.len())
    } else {
        None
    };

    Ok(SwitchOutcome {
        switch: target.switch.clone(),
        device_id: target.device_id,
        address: target.address,
        rules: installed,
        read_back,
    })
}

#[cfg(test)]
mod tests {
    use mri_topology::TopologyDescription;
    use mri_wire::rulelog;

    use super::*;
    use crate::{ControlError, InstallError, RecordingControlPlane};

    fn line() -> TopologyGraph {
        let description = TopologyDescription::from_json(
            r#"{
                "switches": ["s1", "s2", "s3"],
                "hosts": ["h1", "h3"],
                "links": [["s1", "h1"], ["s1", "s2"], ["s2", "s3"], ["s3", "h3"]]
            }"#,
        )
        .unwrap();

        description.compile().unwrap().0
    }

    #[tokio::test]
    async fn every_switch_gets_its_tables() {
        let _ = tracing_subscriber::fmt::try_init();

        let dir = tempfile::tempdir().unwrap();
        let graph = line();
        let plane = Arc::new(RecordingControlPlane::new());
        let registry = SessionRegistry::new();

        let options = DeployOptions::default().rules_dir(dir.path()).base_port(9559);
        let report = deploy(Arc::clone(&plane), &graph, options, registry.clone()).await;

        assert!(report.is_success(), "{:?}", report.failed);
        assert_eq!(report.succeeded.len(), 3);

        for (index, outcome) in report.succeeded.iter().enumerate() {
            let switch = outcome.switch.as_str();
            let rules = graph.rules(switch);

            assert_eq!(outcome.device_id, index as u64);
            assert_eq!(outcome.address.port(), 9559 + index as u16);
            assert_eq!(outcome.rules, rules.len());
            assert_eq!(outcome.read_back, Some(rules.len() + 1));

            let entries = plane.entries(switch);
            assert_eq!(entries.last(), Some(&TableEntry::Swtrace { switch_id: index as u16 + 1 }));
            assert_eq!(rulelog::read(rulelog::log_path(dir.path(), switch)).unwrap(), rules);
        }

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.shutdown_all().await, 3);
    }

    #[tokio::test]
    async fn failures_only_stop_their_own_switch() {
        let dir = tempfile::tempdir().unwrap();
        let graph = line();
        let plane = Arc::new(RecordingControlPlane::new());
        plane.refuse("s1");
        plane.fail_writes_after("s2", 1);

        let options = DeployOptions::default().rules_dir(dir.path());
        let report = deploy(Arc::clone(&plane), &graph, options, SessionRegistry::new()).await;

        assert!(!report.is_success());
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.succeeded[0].switch, "s3");

        let failures: Vec<_> = report.failed.iter().map(|(switch, _)| switch.as_str()).collect();
        assert_eq!(failures, ["s1", "s2"]);
        assert!(matches!(report.failed[0].1, DeployError::Control(ControlError::Connect { .. })));
        assert!(matches!(
            report.failed[1].1,
            DeployError::Install(InstallError::Control(ControlError::Rejected { .. }))
        ));

        // s2 logged exactly what it installed before the failure.
        assert_eq!(rulelog::read(rulelog::log_path(dir.path(), "s2")).unwrap().len(), 1);
        assert!(!plane.entries("s2").contains(&TableEntry::Swtrace { switch_id: 2 }));
    }

    #[tokio::test]
    async fn redeploying_clears_logs_of_switches_that_fail_early() {
        let dir = tempfile::tempdir().unwrap();
        let graph = line();

        let first = deploy(
            Arc::new(RecordingControlPlane::new()),
            &graph,
            DeployOptions::default().rules_dir(dir.path()),
            SessionRegistry::new(),
        )
        .await;
        assert!(first.is_success());
        assert_eq!(rulelog::read(rulelog::log_path(dir.path(), "s1")).unwrap(), graph.rules("s1"));

        let plane = Arc::new(RecordingControlPlane::new());
        plane.refuse("s1");
        let second = deploy(
            Arc::clone(&plane),
            &graph,
            DeployOptions::default().rules_dir(dir.path()),
            SessionRegistry::new(),
        )
        .await;

        let failures: Vec<_> = second.failed.iter().map(|(switch, _)| switch.as_str()).collect();
        assert_eq!(failures, ["s1"]);

        // Nothing was installed on s1 in this run, so its log names no rule.
        assert!(rulelog::read(rulelog::log_path(dir.path(), "s1")).unwrap().is_empty());
        assert_eq!(rulelog::read(rulelog::log_path(dir.path(), "s2")).unwrap(), graph.rules("s2"));
    }

    #[tokio::test]
    async fn unwritable_rule_logs_fail_the_switch_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the rules directory should be.
        let rules_dir = dir.path().join("rules");
        std::fs::write(&rules_dir, b"").unwrap();

        let plane = Arc::new(RecordingControlPlane::new());
        let options = DeployOptions::default().rules_dir(&rules_dir);
        let report = deploy(Arc::clone(&plane), &line(), options, SessionRegistry::new()).await;

        assert_eq!(report.failed.len(), 3);
        assert!(report.failed.iter().all(|(_, e)| matches!(e, DeployError::Log(_))));
        assert!(!plane.is_connected("s1"));
    }

    #[tokio::test]
    async fn optional_steps_can_be_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let graph = line();
        let plane = Arc::new(RecordingControlPlane::new());

        let options = DeployOptions::default()
            .rules_dir(dir.path())
            .telemetry_entry(false)
            .read_back(false);
        let report = deploy(Arc::clone(&plane), &graph, options, SessionRegistry::new()).await;

        assert!(report.is_success());
        assert!(report.succeeded.iter().all(|outcome| outcome.read_back.is_none()));
        assert_eq!(plane.entries("s2").len(), graph.rules("s2").len());
        assert!(!plane.requests("s2").iter().any(|request| request == "Read"));
    }
}
