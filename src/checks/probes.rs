//! Probe building blocks shared by the named checks.
//!
//! Each probe opens its own session per attempt inside the retry loop, so a
//! session never outlives the attempt that created it.

use log::info;

use crate::checks::CheckContext;
use crate::error::{Error, Result};
use crate::remote::retry::{self, ProbeReport, RetryPolicy};
use crate::verify::{ExpectedOutcome, Failure, ProbeContext};

/// Command printing only the HTTP status of `http://host:port{path}`.
pub fn curl_status_command(host: &str, port: u16, path: &str) -> String {
    format!(
        "curl -s -o /dev/null -w '%{{http_code}}' http://{}:{}{}",
        host, port, path
    )
}

/// Command counting sockets `service` is listening on at `port`.
pub fn listener_count_command(service: &str, port: u16) -> String {
    format!(
        "sudo netstat -tnlp | grep '{}' | grep ':{}' | wc -l",
        service, port
    )
}

/// Runs `command` on `host` through the first bastion and verifies the output, if asked.
///
/// With `retry_on_mismatch`, output that doesn't meet `expected` is retried
/// like an error until the policy runs out.
pub fn jump_probe(
    ctx: &CheckContext<'_>,
    check: &str,
    host: &str,
    command: &str,
    expected: Option<&ExpectedOutcome>,
    retry_on_mismatch: bool,
) -> Result<ProbeReport> {
    let bastion = ctx.bastion()?;
    let target = ctx.target(host)?;
    let probe_ctx = ProbeContext::new(check, host, command);
    let description = format!("ssh jump to {:?} with command {:?}", host, command);

    let probe = || {
        let mut session = ctx.connector.connect_through(&bastion, &target)?;
        session.execute(command)
    };

    let report = match expected {
        Some(expected) if retry_on_mismatch => {
            retry::run_until(&ctx.policy, &description, expected, &probe_ctx, probe)?
        }
        _ => retry::run(&ctx.policy, &description, probe)?,
    };

    if let Some(expected) = expected {
        verify(expected, &report, &probe_ctx)?;
    }
    Ok(report)
}

/// Runs `command` on `host` over a direct session and verifies the output, if asked.
pub fn direct_probe(
    ctx: &CheckContext<'_>,
    check: &str,
    host: &str,
    command: &str,
    expected: Option<&ExpectedOutcome>,
    retry_on_mismatch: bool,
) -> Result<ProbeReport> {
    let target = ctx.target(host)?;
    let probe_ctx = ProbeContext::new(check, host, command);
    let description = format!("ssh to {:?} with command {:?}", host, command);

    let probe = || {
        let mut session = ctx.connector.connect(&target)?;
        session.execute(command)
    };

    let report = match expected {
        Some(expected) if retry_on_mismatch => {
            retry::run_until(&ctx.policy, &description, expected, &probe_ctx, probe)?
        }
        _ => retry::run(&ctx.policy, &description, probe)?,
    };

    if let Some(expected) = expected {
        verify(expected, &report, &probe_ctx)?;
    }
    Ok(report)
}

/// Fetches `http://host:port{path}` from the bastion and checks the status code.
pub fn http_probe(
    ctx: &CheckContext<'_>,
    check: &str,
    host: &str,
    port: u16,
    path: &str,
    status: u16,
) -> Result<ProbeReport> {
    let bastion = ctx.bastion()?;
    let command = curl_status_command(host, port, path);
    let probe_ctx = ProbeContext::new(check, host, &format!("GET http://{}:{}{}", host, port, path));
    let description = format!("curl to {}:{}{} from {}", host, port, path, bastion.host());

    let report = retry::run(&ctx.policy, &description, || {
        let mut session = ctx.connector.connect(&bastion)?;
        session.execute(&command)
    })?;

    verify(&ExpectedOutcome::Status(status), &report, &probe_ctx)?;
    Ok(report)
}

/// Succeeds only if SSH to `host` can't be established.
pub fn refuse_probe(ctx: &CheckContext<'_>, check: &str, host: &str) -> Result<()> {
    let target = ctx.target(host)?;
    let description = format!("ssh to {:?} (expected to fail)", host);

    let attempt = retry::run(&RetryPolicy::once(), &description, || {
        ctx.connector.connect(&target).map(|_| String::new())
    });

    match attempt {
        Ok(_) => Err(Error::VerificationMismatch(Failure {
            check: check.to_string(),
            target: host.to_string(),
            probe: "ssh connect".to_string(),
            expected: "connection refused".to_string(),
            actual: "SSH session established".to_string(),
        })),
        Err(e) if e.hop().is_some() => {
            info!("{} refused SSH as expected: {}", host, e.last_error());
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn verify(expected: &ExpectedOutcome, report: &ProbeReport, context: &ProbeContext) -> Result<()> {
    expected
        .check(&report.output, context)
        .map_err(Error::VerificationMismatch)
}
