//! Resolving logical topology facts into host lists and attributes.
//!
//! The engine only ever asks two questions: which hosts play a role, and what
//! value a named attribute has. Where the answers come from (Terraform
//! outputs, or an inline list in the config file) is decided once by
//! [`from_settings`].

pub mod terraform;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::config::{OutputNames, StaticHosts, TopologySettings, TopologySource};
use crate::error::{Error, Result};

pub use terraform::TerraformOutputs;

/// The part a host plays in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Bastion,
    Internal,
    LoadBalancer,
}

impl Role {
    pub fn all() -> [Role; 3] {
        [Role::Bastion, Role::Internal, Role::LoadBalancer]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Bastion => write!(f, "bastion"),
            Role::Internal => write!(f, "internal"),
            Role::LoadBalancer => write!(f, "load balancer"),
        }
    }
}

/// Source of host lists and named attributes.
pub trait TopologyProvider {
    /// Hosts playing `role`, in declaration order.
    ///
    /// # Errors
    ///
    /// `Error::Configuration` if the role isn't declared or has no hosts.
    fn hosts(&self, role: Role) -> Result<Vec<String>>;

    /// A named attribute as a plain string.
    fn attribute(&self, name: &str) -> Result<String>;
}

/// Host lists and attributes given inline in the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    hosts: HashMap<Role, Vec<String>>,
    attributes: HashMap<String, String>,
}

impl StaticTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_hosts(hosts: &StaticHosts) -> Self {
        Self::new()
            .with_hosts(Role::Bastion, hosts.bastion.clone())
            .with_hosts(Role::Internal, hosts.internal.clone())
            .with_hosts(Role::LoadBalancer, hosts.load_balancer.clone())
            .with_attributes(hosts.attributes.clone())
    }

    pub fn with_hosts(mut self, role: Role, hosts: Vec<String>) -> Self {
        self.hosts.insert(role, hosts);
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes.extend(attributes);
        self
    }
}

impl TopologyProvider for StaticTopology {
    fn hosts(&self, role: Role) -> Result<Vec<String>> {
        let hosts: Vec<String> = self
            .hosts
            .get(&role)
            .map(|hosts| {
                hosts
                    .iter()
                    .map(|h| h.trim().to_string())
                    .filter(|h| !h.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if hosts.is_empty() {
            return Err(Error::Configuration(format!(
                "no {} hosts declared in topology.hosts",
                role
            )));
        }
        Ok(hosts)
    }

    fn attribute(&self, name: &str) -> Result<String> {
        self.attributes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("topology attribute '{}' not declared", name)))
    }
}

/// Builds the provider described by the config.
pub fn from_settings(settings: &TopologySettings) -> Result<Box<dyn TopologyProvider>> {
    match settings.source {
        TopologySource::Static => Ok(Box::new(StaticTopology::from_hosts(&settings.hosts))),
        TopologySource::Terraform => {
            let names: OutputNames = settings.outputs.clone();
            let outputs = if let Some(file) = &settings.outputs_file {
                TerraformOutputs::from_file(&crate::config::expand_path(file), names)?
            } else {
                let dir = settings.terraform_dir.as_deref().unwrap_or(".");
                TerraformOutputs::from_terraform_dir(Path::new(dir), names)?
            };
            Ok(Box::new(outputs))
        }
    }
}
