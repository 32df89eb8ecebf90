//! Remote execution over SSH, directly or through a bastion.
//!
//! This module provides the connector that opens (possibly two-hop)
//! sessions, the bounded retry loop probes run inside, and diagnostics that
//! turn failures into actionable messages.

pub mod connector;
pub mod diagnostics;
pub mod retry;
pub mod target;
mod tunnel;

pub use connector::{Connector, RemoteSession, SshConnector, SshSession};
pub use retry::{ProbeReport, RetryPolicy};
pub use target::{KeyMaterial, RemoteTarget};
