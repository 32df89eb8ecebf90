use std::fmt;
use thiserror::Error;

use crate::verify::Failure;

/// Which leg of a connection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    /// Single-hop connection straight to the target.
    Direct,
    /// First leg of a jump: caller to bastion.
    Bastion,
    /// Second leg of a jump: bastion to target.
    Target,
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hop::Direct => write!(f, "direct"),
            Hop::Bastion => write!(f, "bastion hop"),
            Hop::Target => write!(f, "target hop"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TopoprobeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection failed ({hop}) to {host}: {message}")]
    Connection {
        hop: Hop,
        host: String,
        message: String,
    },

    #[error("Execution failed on {host}: {detail}")]
    Execution {
        host: String,
        command: String,
        exit_code: Option<i32>,
        stderr: String,
        detail: String,
    },

    #[error("{0}")]
    VerificationMismatch(Failure),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{description} failed after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        description: String,
        attempts: u32,
        last: Box<TopoprobeError>,
    },
}

impl TopoprobeError {
    /// Builds a connection error for the given hop.
    pub fn connection(hop: Hop, host: &str, message: impl Into<String>) -> Self {
        Self::Connection {
            hop,
            host: host.to_string(),
            message: message.into(),
        }
    }

    /// Returns false for errors that another attempt cannot fix.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }

    /// The hop that failed, if this is (or wraps) a connection error.
    pub fn hop(&self) -> Option<Hop> {
        match self.last_error() {
            Self::Connection { hop, .. } => Some(*hop),
            _ => None,
        }
    }

    /// Unwraps retry context down to the error observed on the final attempt.
    pub fn last_error(&self) -> &TopoprobeError {
        match self {
            Self::RetriesExhausted { last, .. } => last.last_error(),
            other => other,
        }
    }
}

pub type Error = TopoprobeError;
pub type Result<T> = std::result::Result<T, Error>;
