//! Topology read from `terraform output -json`.
//!
//! Only reads outputs of an already-applied configuration. Output values are
//! normalized the way provisioning modules tend to emit them: plain strings,
//! lists, lists of lists, and stringified lists such as `"[10.0.0.5 10.0.0.6]"`
//! all flatten to a list of addresses.

use log::{debug, info};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::Command;

use crate::config::OutputNames;
use crate::error::{Error, Result};
use crate::topology::{Role, TopologyProvider};

pub struct TerraformOutputs {
    values: HashMap<String, Value>,
    names: OutputNames,
}

impl TerraformOutputs {
    /// Parses the JSON printed by `terraform output -json`.
    ///
    /// Accepts both the `{"name": {"value": ...}}` envelope and a bare
    /// `{"name": value}` map.
    pub fn from_json(json: &str, names: OutputNames) -> Result<Self> {
        let raw: HashMap<String, Value> = serde_json::from_str(json).map_err(|e| {
            Error::Configuration(format!("terraform outputs are not valid JSON: {}", e))
        })?;

        let values = raw
            .into_iter()
            .map(|(name, value)| match value {
                Value::Object(mut envelope) if envelope.contains_key("value") => {
                    let inner = envelope.remove("value").unwrap_or(Value::Null);
                    (name, inner)
                }
                other => (name, other),
            })
            .collect::<HashMap<_, _>>();

        debug!("Loaded {} terraform outputs", values.len());
        Ok(Self { values, names })
    }

    pub fn from_file(path: &Path, names: OutputNames) -> Result<Self> {
        info!("Reading terraform outputs from {}", path.display());
        let json = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read terraform outputs from {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json, names)
    }

    /// Runs `terraform output -json` in `dir`.
    pub fn from_terraform_dir(dir: &Path, names: OutputNames) -> Result<Self> {
        info!("Running terraform output -json in {}", dir.display());
        let output = Command::new("terraform")
            .args(["output", "-json"])
            .current_dir(dir)
            .output()
            .map_err(|e| {
                Error::Configuration(format!(
                    "Failed to run terraform in {}: {}\n\n\
                     Suggestions:\n\
                     • Install terraform and make sure it is in PATH\n\
                     • Or capture outputs once and set topology.outputs_file",
                    dir.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Configuration(format!(
                "terraform output failed in {}: {}",
                dir.display(),
                stderr.trim()
            )));
        }

        Self::from_json(&String::from_utf8_lossy(&output.stdout), names)
    }

    fn output_name(&self, role: Role) -> &str {
        match role {
            Role::Bastion => self.names.bastion.as_str(),
            Role::Internal => self.names.internal.as_str(),
            Role::LoadBalancer => self.names.load_balancer.as_str(),
        }
    }

    fn value(&self, name: &str) -> Result<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("terraform output '{}' not found", name)))
    }
}

impl TopologyProvider for TerraformOutputs {
    fn hosts(&self, role: Role) -> Result<Vec<String>> {
        let name = self.output_name(role);
        let mut hosts = Vec::new();
        flatten_hosts(self.value(name)?, &mut hosts);

        if hosts.is_empty() {
            return Err(Error::Configuration(format!(
                "terraform output '{}' lists no {} hosts",
                name, role
            )));
        }
        Ok(hosts)
    }

    fn attribute(&self, name: &str) -> Result<String> {
        scalar(self.value(name)?).ok_or_else(|| {
            Error::Configuration(format!(
                "terraform output '{}' is not a single value",
                name
            ))
        })
    }
}

fn flatten_hosts(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.extend(split_list_string(s)),
        Value::Array(items) => {
            for item in items {
                flatten_hosts(item, out);
            }
        }
        Value::Number(n) => out.push(n.to_string()),
        _ => {}
    }
}

/// Splits `"[a b c]"`, `"a, b"` or `"a"` into its elements.
fn split_list_string(s: &str) -> Vec<String> {
    s.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(strip_quotes)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_quotes(s: &str) -> &str {
    s.trim().trim_matches('"')
}

/// A value as one string; single-element lists count as their element.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(strip_quotes(s).to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) if items.len() == 1 => scalar(&items[0]),
        _ => None,
    }
}
