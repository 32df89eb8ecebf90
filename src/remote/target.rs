//! Addressable SSH endpoints.

use std::fmt;
use std::path::PathBuf;

use crate::config::{expand_path, SshSettings};
use crate::error::{Error, Result};

/// Authentication material for one login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// Private key on disk, with optional public half and passphrase.
    File {
        private_key: PathBuf,
        public_key: Option<PathBuf>,
        passphrase: Option<String>,
    },
    /// Whatever identities the running SSH agent offers.
    Agent,
}

/// A host the engine can log into, either directly or behind a bastion.
///
/// Built once from topology output and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    host: String,
    port: u16,
    user: String,
    key: KeyMaterial,
}

impl RemoteTarget {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>, key: KeyMaterial) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            key,
        }
    }

    /// Builds a target for `host` using the shared SSH identity.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the host is blank or a configured
    /// key file doesn't exist. These are never retried.
    pub fn from_settings(host: &str, settings: &SshSettings) -> Result<Self> {
        let host = host.trim();
        if host.is_empty() {
            return Err(Error::Configuration(
                "empty host address in topology".to_string(),
            ));
        }
        if settings.user.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "no login user configured for {}",
                host
            )));
        }

        let key = match &settings.private_key {
            Some(private_key) => {
                let private_key = expand_path(private_key);
                if !private_key.exists() {
                    return Err(Error::Configuration(format!(
                        "SSH private key not found: {}",
                        private_key.display()
                    )));
                }
                let public_key = match &settings.public_key {
                    Some(public_key) => {
                        let public_key = expand_path(public_key);
                        if !public_key.exists() {
                            return Err(Error::Configuration(format!(
                                "SSH public key not found: {}",
                                public_key.display()
                            )));
                        }
                        Some(public_key)
                    }
                    None => None,
                };
                KeyMaterial::File {
                    private_key,
                    public_key,
                    passphrase: settings.passphrase.clone(),
                }
            }
            None => KeyMaterial::Agent,
        };

        Ok(Self::new(host, settings.port, settings.user.clone(), key))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    /// Key path for diagnostics, if one is configured.
    pub fn key_path(&self) -> Option<String> {
        match &self.key {
            KeyMaterial::File { private_key, .. } => Some(private_key.display().to_string()),
            KeyMaterial::Agent => None,
        }
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == 22 {
            write!(f, "{}@{}", self.user, self.host)
        } else {
            write!(f, "{}@{}:{}", self.user, self.host, self.port)
        }
    }
}
