use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::dnssec::DnsSecError;

#[derive(Error, Debug, Clone)]
pub enum AutotrustError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("{path}:{line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("{0}: trust anchor file is truncated or incomplete")]
    Truncated(PathBuf),

    #[error("Trust point {zone} has no VALID or MISSING keys in {path}")]
    NoTrustedKeys { zone: String, path: PathBuf },

    #[error("Trust point already managed: {0}")]
    DuplicateTrustPoint(String),

    #[error("Unknown trust point handle: {0}")]
    UnknownTrustPoint(u64),

    #[error("Probe task failed: {0}")]
    ProbeTask(String),

    #[error("DNSSEC error: {0}")]
    DnsSec(#[from] DnsSecError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AutotrustError {
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        AutotrustError::Io {
            path: path.into(),
            source: Arc::new(err),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        AutotrustError::Parse {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid hold-down time: {0}")]
    InvalidHoldDown(String),

    #[error("Invalid probe interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid pending count: {0}")]
    InvalidPendingCount(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, AutotrustError>;
