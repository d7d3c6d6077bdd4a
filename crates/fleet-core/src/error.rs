use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("not initialized: run 'fleet config init'")]
    NotInitialized,

    #[error("invalid scope '{0}': must be 2-8 ASCII letters or digits")]
    InvalidScope(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("role selection needs an inventory snapshot; explicit hosts carry no roles")]
    RolesUnavailable,

    #[error("inventory discovery failed: {0}")]
    Discovery(String),

    #[error("malformed inventory record at line {line}: {reason}")]
    InventoryRecord { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FleetError>;

/// Failure of one remote call against one target.
///
/// Never aborts a run: the dispatcher and orchestrator turn these into
/// per-target warnings.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("remote command exited with code {code}: {stderr}")]
    Command { code: i32, stderr: String },

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for RemoteError {
    fn from(e: std::io::Error) -> Self {
        RemoteError::Io(e.to_string())
    }
}
