use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::rc::Rc;

use topoprobe::checks::{probes, run_checks, CheckContext, CheckKind};
use topoprobe::config::Config;
use topoprobe::remote::{Connector, RemoteSession, RemoteTarget};
use topoprobe::topology::{Role, StaticTopology};
use topoprobe::verify::ExpectedOutcome;
use topoprobe::{Error, Hop, Result};

type Handler = Rc<dyn Fn(&str) -> Result<String>>;

/// A pretend network: hosts either refuse connections or answer commands.
#[derive(Default)]
struct FakeNetwork {
    handlers: HashMap<String, Handler>,
    down: HashSet<String>,
    connects: Cell<u32>,
}

impl FakeNetwork {
    fn host(mut self, host: &str, handler: impl Fn(&str) -> Result<String> + 'static) -> Self {
        self.handlers.insert(host.to_string(), Rc::new(handler));
        self
    }

    fn down(mut self, host: &str) -> Self {
        self.down.insert(host.to_string());
        self
    }

    fn open(&self, target: &RemoteTarget, hop: Hop) -> Result<Box<dyn RemoteSession>> {
        if self.down.contains(target.host()) {
            return Err(Error::connection(hop, target.host(), "connection refused"));
        }
        let handler = self
            .handlers
            .get(target.host())
            .cloned()
            .ok_or_else(|| Error::connection(hop, target.host(), "no route to host"))?;
        Ok(Box::new(FakeSession {
            host: target.host().to_string(),
            handler,
        }))
    }
}

impl Connector for FakeNetwork {
    fn connect(&self, target: &RemoteTarget) -> Result<Box<dyn RemoteSession>> {
        self.connects.set(self.connects.get() + 1);
        self.open(target, Hop::Direct)
    }

    fn connect_through(
        &self,
        bastion: &RemoteTarget,
        target: &RemoteTarget,
    ) -> Result<Box<dyn RemoteSession>> {
        self.connects.set(self.connects.get() + 1);
        self.open(bastion, Hop::Bastion)?;
        self.open(target, Hop::Target)
    }
}

struct FakeSession {
    host: String,
    handler: Handler,
}

impl RemoteSession for FakeSession {
    fn host(&self) -> &str {
        &self.host
    }

    fn execute(&mut self, command: &str) -> Result<String> {
        (self.handler)(command)
    }
}

fn config() -> Config {
    let mut config = Config::default();
    config.retry.max_attempts = 3;
    config.retry.delay_secs = 0;
    config
}

fn topology() -> StaticTopology {
    StaticTopology::new()
        .with_hosts(Role::Bastion, vec!["1.2.3.4".to_string()])
        .with_hosts(Role::Internal, vec!["10.0.0.5".to_string()])
        .with_hosts(Role::LoadBalancer, vec!["129.0.0.1".to_string()])
        .with_attribute("lb_is_public", "true")
}

/// Bastion that gets a 200 from every web host; the load balancer at
/// 129.0.0.1 never answers.
fn bastion(command: &str) -> Result<String> {
    if command.contains("129.0.0.1") {
        Err(Error::Execution {
            host: "1.2.3.4".to_string(),
            command: command.to_string(),
            exit_code: Some(7),
            stderr: String::new(),
            detail: "curl exited with status 7".to_string(),
        })
    } else if command.starts_with("curl") {
        Ok("200".to_string())
    } else {
        Ok(String::new())
    }
}

/// Web host running nginx on port 80 when `listening` is set.
fn web_host(listening: bool) -> impl Fn(&str) -> Result<String> {
    move |command: &str| {
        if command == "whoami" {
            Ok("opc\n".to_string())
        } else if command.contains("netstat") {
            Ok(if listening { "1\n" } else { "0\n" }.to_string())
        } else {
            Err(Error::Execution {
                host: "10.0.0.5".to_string(),
                command: command.to_string(),
                exit_code: Some(127),
                stderr: "command not found".to_string(),
                detail: "command not found".to_string(),
            })
        }
    }
}

#[test]
fn test_listener_through_bastion_passes() {
    let config = config();
    let topology = topology();
    let network = FakeNetwork::default()
        .host("1.2.3.4", bastion)
        .host("10.0.0.5", web_host(true));
    let ctx = CheckContext::new(&config, &topology, &network).unwrap();

    let summary = CheckKind::Listener.run(&ctx).unwrap();

    assert!(summary.contains("nginx"));
    assert_eq!(network.connects.get(), 1);
}

#[test]
fn test_missing_listener_reports_mismatch_after_retries() {
    let config = config();
    let topology = topology();
    let network = FakeNetwork::default()
        .host("1.2.3.4", bastion)
        .host("10.0.0.5", web_host(false));
    let ctx = CheckContext::new(&config, &topology, &network).unwrap();

    let err = CheckKind::Listener.run(&ctx).unwrap_err();

    assert_eq!(network.connects.get(), 3);
    match err.last_error() {
        Error::VerificationMismatch(failure) => {
            assert_eq!(failure.check, "listener");
            assert_eq!(failure.target, "10.0.0.5");
            assert_eq!(failure.expected, "1");
            assert_eq!(failure.actual, "0");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_bastion_and_target_failures_are_distinguishable() {
    let config = config();
    let topology = topology();

    let bastion_down = FakeNetwork::default()
        .down("1.2.3.4")
        .host("10.0.0.5", web_host(true));
    let ctx = CheckContext::new(&config, &topology, &bastion_down).unwrap();
    let err = CheckKind::SshInternal.run(&ctx).unwrap_err();
    assert_eq!(err.hop(), Some(Hop::Bastion));

    let target_down = FakeNetwork::default()
        .host("1.2.3.4", bastion)
        .down("10.0.0.5");
    let ctx = CheckContext::new(&config, &topology, &target_down).unwrap();
    let err = CheckKind::SshInternal.run(&ctx).unwrap_err();
    assert_eq!(err.hop(), Some(Hop::Target));
    assert_eq!(target_down.connects.get(), 3);
}

#[test]
fn test_same_check_twice_gives_same_verdict() {
    let config = config();
    let topology = topology();
    let network = FakeNetwork::default()
        .host("1.2.3.4", bastion)
        .host("10.0.0.5", web_host(true));
    let ctx = CheckContext::new(&config, &topology, &network).unwrap();

    let first = CheckKind::SshInternal.run(&ctx).unwrap();
    let second = CheckKind::SshInternal.run(&ctx).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_http_status_must_match_whole_code() {
    let config = config();
    let topology = topology();
    let network = FakeNetwork::default()
        .host("1.2.3.4", |_: &str| Ok("2001".to_string()))
        .host("10.0.0.5", web_host(true));
    let ctx = CheckContext::new(&config, &topology, &network).unwrap();

    let err = CheckKind::HttpInternal.run(&ctx).unwrap_err();

    assert!(matches!(err, Error::VerificationMismatch(_)));
    assert!(err.to_string().contains("expected \"200\", got \"2001\""));
}

#[test]
fn test_load_balancer_must_refuse_ssh() {
    let config = config();
    let topology = topology();

    let refusing = FakeNetwork::default().down("129.0.0.1");
    let ctx = CheckContext::new(&config, &topology, &refusing).unwrap();
    assert!(CheckKind::LoadBalancerSshClosed.run(&ctx).is_ok());
    assert_eq!(refusing.connects.get(), 1);

    let accepting = FakeNetwork::default().host("129.0.0.1", |_: &str| Ok(String::new()));
    let ctx = CheckContext::new(&config, &topology, &accepting).unwrap();
    assert!(CheckKind::LoadBalancerSshClosed.run(&ctx).is_err());
}

#[test]
fn test_failures_do_not_stop_other_checks() {
    let mut config = config();
    config
        .network
        .attributes
        .insert("vcn_cidr".to_string(), "10.0.0.0/16".to_string());
    let topology = topology().with_attribute("vcn_cidr", "10.1.0.0/16");
    let network = FakeNetwork::default()
        .host("1.2.3.4", bastion)
        .host("10.0.0.5", web_host(true))
        .down("129.0.0.1");
    let ctx = CheckContext::new(&config, &topology, &network).unwrap();

    let verdicts = run_checks(&ctx, CheckKind::all(), false);

    assert_eq!(verdicts.len(), CheckKind::all().len());
    let failed: Vec<CheckKind> = verdicts
        .iter()
        .filter(|v| !v.passed())
        .map(|v| v.check)
        .collect();
    // The load balancer never answers HTTP and the CIDR is wrong.
    assert_eq!(
        failed,
        vec![CheckKind::HttpLoadBalancer, CheckKind::NetworkAttributes]
    );
}

#[test]
fn test_fail_fast_stops_at_first_failure() {
    let config = config();
    let topology = topology();
    let network = FakeNetwork::default().down("1.2.3.4");
    let ctx = CheckContext::new(&config, &topology, &network).unwrap();

    let verdicts = run_checks(&ctx, CheckKind::all(), true);

    assert_eq!(verdicts.len(), 1);
    assert_eq!(verdicts[0].check, CheckKind::SshBastion);
    assert!(!verdicts[0].passed());
}

#[test]
fn test_configuration_error_is_not_retried() {
    let mut config = config();
    config.ssh.private_key = Some("/nonexistent/topoprobe/id_rsa".to_string());
    let topology = topology();
    let network = FakeNetwork::default()
        .host("1.2.3.4", bastion)
        .host("10.0.0.5", web_host(true));
    let ctx = CheckContext::new(&config, &topology, &network).unwrap();

    let err = CheckKind::SshInternal.run(&ctx).unwrap_err();

    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(network.connects.get(), 0);
}

#[test]
fn test_static_topology_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topoprobe.yml");
    fs::write(
        &path,
        r#"
retry:
  max_attempts: 2
  delay_secs: 0
topology:
  source: static
  hosts:
    bastion: ["1.2.3.4"]
    internal: ["10.0.0.5"]
"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    let topology = topoprobe::topology::from_settings(&config.topology).unwrap();
    let network = FakeNetwork::default()
        .host("1.2.3.4", bastion)
        .host("10.0.0.5", web_host(true));
    let ctx = CheckContext::new(&config, topology.as_ref(), &network).unwrap();

    let verdicts = run_checks(&ctx, &[CheckKind::SshBastion, CheckKind::SshInternal], false);

    assert!(verdicts.iter().all(|v| v.passed()));
}

#[test]
fn test_jump_without_expectation_returns_output() {
    let config = config();
    let topology = topology();
    let network = FakeNetwork::default()
        .host("1.2.3.4", bastion)
        .host("10.0.0.5", web_host(true));
    let ctx = CheckContext::new(&config, &topology, &network).unwrap();

    let report = probes::jump_probe(&ctx, "exec", "10.0.0.5", "whoami", None, true).unwrap();

    assert_eq!(report.output, "opc");
    assert_eq!(report.attempts, 1);
    assert_eq!(network.connects.get(), 1);
}

#[test]
fn test_jump_with_expectation_still_verifies() {
    let config = config();
    let topology = topology();
    let network = FakeNetwork::default()
        .host("1.2.3.4", bastion)
        .host("10.0.0.5", web_host(true));
    let ctx = CheckContext::new(&config, &topology, &network).unwrap();
    let expected = ExpectedOutcome::Exact("root".to_string());

    let err = probes::jump_probe(&ctx, "exec", "10.0.0.5", "whoami", Some(&expected), false)
        .unwrap_err();

    assert!(matches!(err, Error::VerificationMismatch(_)));
    assert_eq!(network.connects.get(), 1);
}
