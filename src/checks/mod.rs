//! Named topology checks.
//!
//! Each check resolves its hosts from the topology, runs one probe per host
//! under the retry policy, and verifies the result. Checks share nothing but
//! read-only context, so they can run in any order and one failing doesn't
//! stop the others.

pub mod probes;

use log::{error, info};
use std::fmt;
use std::str::FromStr;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::remote::connector::Connector;
use crate::remote::retry::RetryPolicy;
use crate::remote::target::RemoteTarget;
use crate::topology::{Role, TopologyProvider};
use crate::verify::{assert_equals, ExpectedOutcome, ProbeContext};

/// Read-only inputs every check runs against.
pub struct CheckContext<'a> {
    pub config: &'a Config,
    pub topology: &'a dyn TopologyProvider,
    pub connector: &'a dyn Connector,
    pub policy: RetryPolicy,
}

impl<'a> CheckContext<'a> {
    pub fn new(
        config: &'a Config,
        topology: &'a dyn TopologyProvider,
        connector: &'a dyn Connector,
    ) -> Result<Self> {
        Ok(Self {
            config,
            topology,
            connector,
            policy: config.retry_policy()?,
        })
    }

    /// Target for `host` with the configured identity.
    pub fn target(&self, host: &str) -> Result<RemoteTarget> {
        RemoteTarget::from_settings(host, &self.config.ssh)
    }

    /// The bastion every jump and remote HTTP probe goes through (the first declared).
    pub fn bastion(&self) -> Result<RemoteTarget> {
        let hosts = self.topology.hosts(Role::Bastion)?;
        match hosts.first() {
            Some(host) => self.target(host),
            None => Err(Error::Configuration("no bastion hosts".to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    SshBastion,
    SshInternal,
    Listener,
    HttpInternal,
    HttpLoadBalancer,
    LoadBalancerPublic,
    LoadBalancerSshClosed,
    NetworkAttributes,
}

impl CheckKind {
    pub fn all() -> &'static [CheckKind] {
        &[
            CheckKind::SshBastion,
            CheckKind::SshInternal,
            CheckKind::Listener,
            CheckKind::HttpInternal,
            CheckKind::HttpLoadBalancer,
            CheckKind::LoadBalancerPublic,
            CheckKind::LoadBalancerSshClosed,
            CheckKind::NetworkAttributes,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::SshBastion => "ssh-bastion",
            CheckKind::SshInternal => "ssh-internal",
            CheckKind::Listener => "listener",
            CheckKind::HttpInternal => "http-internal",
            CheckKind::HttpLoadBalancer => "http-load-balancer",
            CheckKind::LoadBalancerPublic => "load-balancer-public",
            CheckKind::LoadBalancerSshClosed => "load-balancer-ssh-closed",
            CheckKind::NetworkAttributes => "network-attributes",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CheckKind::SshBastion => "Every bastion accepts SSH and runs a command",
            CheckKind::SshInternal => "Every internal host is reachable through the bastion as the login user",
            CheckKind::Listener => "The service is listening on its port on every internal host",
            CheckKind::HttpInternal => "The service answers HTTP on every internal host, as seen from the bastion",
            CheckKind::HttpLoadBalancer => "The load balancer answers HTTP, as seen from the bastion",
            CheckKind::LoadBalancerPublic => "The load balancer is declared public",
            CheckKind::LoadBalancerSshClosed => "The load balancer does not accept SSH",
            CheckKind::NetworkAttributes => "Network attributes match their expected values",
        }
    }

    /// Runs this check, returning a short summary on success.
    pub fn run(&self, ctx: &CheckContext<'_>) -> Result<String> {
        match self {
            CheckKind::SshBastion => ssh_bastion(ctx, self.name()),
            CheckKind::SshInternal => ssh_internal(ctx, self.name()),
            CheckKind::Listener => listener(ctx, self.name()),
            CheckKind::HttpInternal => http_hosts(ctx, self.name(), Role::Internal),
            CheckKind::HttpLoadBalancer => http_hosts(ctx, self.name(), Role::LoadBalancer),
            CheckKind::LoadBalancerPublic => load_balancer_public(ctx, self.name()),
            CheckKind::LoadBalancerSshClosed => load_balancer_ssh_closed(ctx, self.name()),
            CheckKind::NetworkAttributes => network_attributes(ctx, self.name()),
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CheckKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CheckKind::all()
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = CheckKind::all().iter().map(|k| k.name()).collect();
                Error::Configuration(format!(
                    "unknown check '{}' (available: {})",
                    s,
                    names.join(", ")
                ))
            })
    }
}

/// Outcome of one check.
#[derive(Debug)]
pub struct Verdict {
    pub check: CheckKind,
    pub outcome: Result<String>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Runs `checks` in order, continuing past failures unless `fail_fast` is set.
pub fn run_checks(ctx: &CheckContext<'_>, checks: &[CheckKind], fail_fast: bool) -> Vec<Verdict> {
    let mut verdicts = Vec::with_capacity(checks.len());

    for check in checks {
        info!("Running check {}", check);
        let outcome = check.run(ctx);
        match &outcome {
            Ok(summary) => info!("{} passed: {}", check, summary),
            Err(e) => error!("{} failed: {}", check, e),
        }

        let failed = outcome.is_err();
        verdicts.push(Verdict {
            check: *check,
            outcome,
        });

        if failed && fail_fast {
            break;
        }
    }

    verdicts
}

fn ssh_bastion(ctx: &CheckContext<'_>, check: &str) -> Result<String> {
    let hosts = ctx.topology.hosts(Role::Bastion)?;
    for host in &hosts {
        probes::direct_probe(ctx, check, host, "exit 0", None, false)?;
    }
    Ok(format!("{} bastion(s) reachable", hosts.len()))
}

fn ssh_internal(ctx: &CheckContext<'_>, check: &str) -> Result<String> {
    let hosts = ctx.topology.hosts(Role::Internal)?;
    let expected = ExpectedOutcome::Exact(ctx.config.ssh.user.clone());
    for host in &hosts {
        probes::jump_probe(ctx, check, host, "whoami", Some(&expected), false)?;
    }
    Ok(format!("{} internal host(s) reachable via bastion", hosts.len()))
}

fn listener(ctx: &CheckContext<'_>, check: &str) -> Result<String> {
    let service = &ctx.config.service;
    let hosts = ctx.topology.hosts(Role::Internal)?;
    let command = probes::listener_count_command(&service.name, service.port);
    let expected = ExpectedOutcome::Count(service.listeners);
    for host in &hosts {
        probes::jump_probe(ctx, check, host, &command, Some(&expected), true)?;
    }
    Ok(format!(
        "{} listening on :{} on {} host(s)",
        service.name,
        service.port,
        hosts.len()
    ))
}

fn http_hosts(ctx: &CheckContext<'_>, check: &str, role: Role) -> Result<String> {
    let service = &ctx.config.service;
    let hosts = ctx.topology.hosts(role)?;
    for host in &hosts {
        probes::http_probe(ctx, check, host, service.port, &service.path, service.status)?;
    }
    Ok(format!("{} {} host(s) returned {}", hosts.len(), role, service.status))
}

fn load_balancer_public(ctx: &CheckContext<'_>, check: &str) -> Result<String> {
    let name = &ctx.config.topology.outputs.load_balancer_public;
    let actual = ctx.topology.attribute(name)?;
    assert_equals("true", &actual, &ProbeContext::new(check, "load balancer", name))
        .map_err(Error::VerificationMismatch)?;
    Ok("load balancer is public".to_string())
}

fn load_balancer_ssh_closed(ctx: &CheckContext<'_>, check: &str) -> Result<String> {
    let hosts = ctx.topology.hosts(Role::LoadBalancer)?;
    for host in &hosts {
        probes::refuse_probe(ctx, check, host)?;
    }
    Ok(format!("{} load balancer(s) refuse SSH", hosts.len()))
}

fn network_attributes(ctx: &CheckContext<'_>, check: &str) -> Result<String> {
    let expected = &ctx.config.network.attributes;
    if expected.is_empty() {
        return Ok("no expected attributes configured".to_string());
    }
    for (name, value) in expected {
        let actual = ctx.topology.attribute(name)?;
        assert_equals(value, &actual, &ProbeContext::new(check, "network", name))
            .map_err(Error::VerificationMismatch)?;
    }
    Ok(format!("{} attribute(s) match", expected.len()))
}
