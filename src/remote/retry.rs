//! Bounded retry with a fixed delay for remote probes.
//!
//! Provisioning finishing doesn't mean services are ready (processes still
//! starting, addresses still propagating), so every probe runs inside a small
//! retry loop. The loop is always bounded by [`RetryPolicy::max_attempts`].

use crate::error::{Error, Result};
use crate::verify::{ExpectedOutcome, ProbeContext};
use log::{debug, warn};
use std::thread;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy allowing `max_attempts` total attempts with `delay` between them.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if `max_attempts` is zero.
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::Configuration(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            delay,
        })
    }

    /// A policy that tries exactly once.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Output of a probe that eventually succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    /// Trimmed output of the successful attempt
    pub output: String,
    /// Number of probe invocations, including the successful one
    pub attempts: u32,
}

/// Runs `probe` until it succeeds or the policy is exhausted.
///
/// Output is trimmed of surrounding whitespace so that results of different
/// probes compare the same way.
///
/// # Errors
///
/// Returns `Error::RetriesExhausted` wrapping the final attempt's error once
/// every attempt has failed. Configuration errors are returned immediately.
pub fn run<F>(policy: &RetryPolicy, description: &str, mut probe: F) -> Result<ProbeReport>
where
    F: FnMut() -> Result<String>,
{
    let mut attempt = 1;
    loop {
        let err = match probe() {
            Ok(output) => {
                debug!("{} succeeded on attempt {}", description, attempt);
                return Ok(ProbeReport {
                    output: output.trim().to_string(),
                    attempts: attempt,
                });
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        debug!("{} failed on attempt {}: {}", description, attempt, err);

        if attempt >= policy.max_attempts {
            return Err(Error::RetriesExhausted {
                description: description.to_string(),
                attempts: attempt,
                last: Box::new(err),
            });
        }

        warn!(
            "Retrying {} (attempt {}/{}) after {:?}",
            description,
            attempt + 1,
            policy.max_attempts,
            policy.delay
        );
        thread::sleep(policy.delay);
        attempt += 1;
    }
}

/// Like [`run`], but also retries while the output doesn't meet `expected`.
///
/// Used to poll for eventual consistency, e.g. waiting for a service to bind
/// its port. A mismatch on the final attempt surfaces as
/// `Error::VerificationMismatch` inside `Error::RetriesExhausted`.
pub fn run_until<F>(
    policy: &RetryPolicy,
    description: &str,
    expected: &ExpectedOutcome,
    context: &ProbeContext,
    mut probe: F,
) -> Result<ProbeReport>
where
    F: FnMut() -> Result<String>,
{
    run(policy, description, || {
        let output = probe()?;
        expected
            .check(output.trim(), context)
            .map_err(Error::VerificationMismatch)?;
        Ok(output)
    })
}
