//! Configuration management for topoprobe.
//!
//! Everything the engine needs (SSH identity, retry policy, where the
//! topology comes from, what the services should look like) is loaded once
//! by the CLI into a [`Config`] and passed down explicitly. Nothing below the
//! CLI reads the environment.
//!
//! # Configuration File Location
//!
//! `topoprobe.yml` in the working directory, or:
//! - Linux: `~/.config/topoprobe/config.yml`
//! - macOS: `~/Library/Application Support/topoprobe/config.yml`
//! - Windows: `C:\Users\<User>\AppData\Roaming\topoprobe\config.yml`
//!
//! # Example Configuration
//!
//! ```yaml
//! ssh:
//!   user: "opc"
//!   private_key: "~/.ssh/id_rsa"
//!   timeout: 30
//! retry:
//!   max_attempts: 3
//!   delay_secs: 5
//! topology:
//!   source: terraform
//!   terraform_dir: ".."
//! service:
//!   name: "nginx"
//!   port: 80
//!   status: 200
//!   listeners: 1
//! network:
//!   attributes:
//!     vcn_display_name: "Web VCN-default"
//!     vcn_cidr: "10.0.0.0/16"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::remote::retry::RetryPolicy;

/// Default SSH port
const DEFAULT_SSH_PORT: u16 = 22;

/// Default login user on provisioned hosts
const DEFAULT_SSH_USER: &str = "opc";

/// Default SSH connection timeout in seconds
const DEFAULT_TIMEOUT: u64 = 30;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_DELAY_SECS: u64 = 5;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub ssh: SshSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub topology: TopologySettings,

    #[serde(default)]
    pub service: ServiceSettings,

    #[serde(default)]
    pub network: NetworkSettings,
}

/// Identity used for every host in the topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshSettings {
    /// Login user on bastions and internal hosts
    #[serde(default = "default_ssh_user")]
    pub user: String,

    /// SSH port (default: 22)
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Path to the SSH private key (falls back to the SSH agent when unset)
    pub private_key: Option<String>,

    /// Path to the matching public key, if libssh2 can't derive it
    pub public_key: Option<String>,

    /// Passphrase for the private key
    pub passphrase: Option<String>,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Bounds for the retrying probe runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts in seconds
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

/// Where host lists and attributes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TopologySource {
    #[default]
    Terraform,
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TopologySettings {
    #[serde(default)]
    pub source: TopologySource,

    /// Directory to run `terraform output -json` in
    pub terraform_dir: Option<String>,

    /// Pre-captured `terraform output -json` file; takes precedence over `terraform_dir`
    pub outputs_file: Option<String>,

    /// Output names for each role
    #[serde(default)]
    pub outputs: OutputNames,

    /// Inline topology used when `source: static`
    #[serde(default)]
    pub hosts: StaticHosts,
}

/// Terraform output names resolved for each role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputNames {
    #[serde(default = "default_bastion_output")]
    pub bastion: String,

    #[serde(default = "default_internal_output")]
    pub internal: String,

    #[serde(default = "default_load_balancer_output")]
    pub load_balancer: String,

    /// Attribute holding "true" when the load balancer is public
    #[serde(default = "default_load_balancer_public_output")]
    pub load_balancer_public: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticHosts {
    #[serde(default)]
    pub bastion: Vec<String>,

    #[serde(default)]
    pub internal: Vec<String>,

    #[serde(default)]
    pub load_balancer: Vec<String>,

    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// The service expected on every internal host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Process name as shown by `netstat -p`
    #[serde(default = "default_service_name")]
    pub name: String,

    #[serde(default = "default_service_port")]
    pub port: u16,

    /// URL path for HTTP probes (e.g. "/health")
    #[serde(default)]
    pub path: String,

    /// Expected HTTP status
    #[serde(default = "default_status")]
    pub status: u16,

    /// Expected number of listening sockets
    #[serde(default = "default_listeners")]
    pub listeners: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Expected value for each named topology attribute
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

fn default_ssh_user() -> String {
    DEFAULT_SSH_USER.to_string()
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_delay_secs() -> u64 {
    DEFAULT_DELAY_SECS
}

fn default_bastion_output() -> String {
    "BastionPublicIP".to_string()
}

fn default_internal_output() -> String {
    "WebServerPrivateIPs".to_string()
}

fn default_load_balancer_output() -> String {
    "lb_ip".to_string()
}

fn default_load_balancer_public_output() -> String {
    "lb_is_public".to_string()
}

fn default_service_name() -> String {
    "nginx".to_string()
}

fn default_service_port() -> u16 {
    80
}

fn default_status() -> u16 {
    200
}

fn default_listeners() -> u64 {
    1
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            port: DEFAULT_SSH_PORT,
            private_key: None,
            public_key: None,
            passphrase: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_secs: DEFAULT_DELAY_SECS,
        }
    }
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            bastion: default_bastion_output(),
            internal: default_internal_output(),
            load_balancer: default_load_balancer_output(),
            load_balancer_public: default_load_balancer_public_output(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            port: default_service_port(),
            path: String::new(),
            status: default_status(),
            listeners: default_listeners(),
        }
    }
}

impl Config {
    /// Returns the per-user configuration file path for the current platform.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("topoprobe").join("config.yml"))
    }

    /// Loads `topoprobe.yml` from the working directory, then the per-user file.
    ///
    /// Returns `Ok(Config::default())` if neither exists.
    pub fn load() -> Result<Self> {
        let local = PathBuf::from("topoprobe.yml");
        if local.exists() {
            return Self::load_from(&local);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Loads configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to read config file: {}\n\n\
                     File path: {}\n\n\
                     Suggestions:\n\
                     • Check the path passed with --config\n\
                     • Check file permissions: ls -la {}",
                    e,
                    path.display(),
                    path.display()
                ),
            ))
        })?;

        let config: Config = serde_yaml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse config file: {}\n\n\
                 File path: {}\n\n\
                 Suggestions:\n\
                 • Check YAML syntax in the config file\n\
                 • Verify indentation uses spaces, not tabs",
                e,
                path.display()
            ))
        })?;
        config.validate()?;

        Ok(config)
    }

    /// Parses configuration from YAML text and validates it.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the engine can't run with.
    pub fn validate(&self) -> Result<()> {
        if self.ssh.user.trim().is_empty() {
            return Err(Error::Configuration("ssh.user must not be empty".to_string()));
        }
        if self.ssh.timeout == 0 {
            return Err(Error::Configuration(
                "ssh.timeout must be at least 1 second".to_string(),
            ));
        }
        self.retry_policy()?;
        Ok(())
    }

    /// Builds the retry policy for probes.
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_secs(self.retry.delay_secs),
        )
    }
}

impl SshSettings {
    /// Builder method to set the private key path.
    pub fn with_private_key(mut self, key_path: String) -> Self {
        self.private_key = Some(key_path);
        self
    }

    /// Builder method to set the SSH port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder method to set the timeout.
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Expands a leading `~/` to the home directory.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
