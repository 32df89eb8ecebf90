//! Verifies a provisioned bastion/private-host topology.
//!
//! Hosts come from a [`topology::TopologyProvider`], sessions from a
//! [`remote::Connector`] (two-hop through the bastion for internal hosts),
//! every probe runs under a bounded [`remote::RetryPolicy`], and the output
//! is reduced to a verdict by [`verify`].

pub mod checks;
pub mod cli;
pub mod config;
pub mod error;
pub mod remote;
pub mod topology;
pub mod verify;

pub use error::{Error, Hop, Result};
