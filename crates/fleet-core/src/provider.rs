//! Remote execution seams.
//!
//! The core never talks to hosts itself. Everything it needs from the outside
//! world goes through these traits, so the dispatcher and orchestrator can be
//! driven by SSH in production and by in-memory doubles in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::RemoteError;
use crate::reducer::ProbeUnit;
use crate::types::{Direction, ServiceState, Target};

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Reachability probing.
///
/// Implementations are moved into spawned tasks by the dispatcher, hence the
/// `'static` bound.
#[async_trait]
pub trait ProbeProvider: Send + Sync + 'static {
    /// Probe one target and return every attempt, in the order they ran.
    async fn probe(&self, target: &Target) -> RemoteResult<Vec<ProbeUnit>>;
}

/// Named OS-service control on one target.
#[async_trait]
pub trait ServiceController: Send + Sync {
    /// Request `direction` for every item. Returns once the request is
    /// accepted, not once the items have converged.
    async fn transition(
        &self,
        target: &Target,
        items: &[String],
        direction: Direction,
    ) -> RemoteResult<()>;

    /// Block until every item reports `desired` or `timeout` elapses.
    ///
    /// `Ok(false)` means the deadline passed first. Giving up never cancels
    /// the transition.
    async fn wait_for_state(
        &self,
        target: &Target,
        items: &[String],
        desired: ServiceState,
        timeout: Duration,
    ) -> RemoteResult<bool>;

    /// Read the current state of every item.
    async fn query_states(
        &self,
        target: &Target,
        items: &[String],
    ) -> RemoteResult<Vec<(String, ServiceState)>>;
}

/// Web-tier availability gate on one target.
#[async_trait]
pub trait WebTierController: Send + Sync {
    /// Whether the out-of-rotation marker file is present.
    async fn marker_present(&self, target: &Target) -> RemoteResult<bool>;

    /// Create (`true`) or remove (`false`) the marker file.
    async fn set_marker(&self, target: &Target, present: bool) -> RemoteResult<()>;

    /// Run the web-server reset command and capture its exit status and output.
    async fn reset(&self, target: &Target) -> RemoteResult<CommandOutput>;
}

/// Per-target go/no-go gate consulted before any mutation.
///
/// `action` is a short human-readable description of what is about to run,
/// e.g. `"stop nginx, cryptd"`. A declined target is skipped, not failed.
pub trait Confirm: Send + Sync {
    fn confirm(&self, target: &Target, action: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&Target, &str) -> bool + Send + Sync,
{
    fn confirm(&self, target: &Target, action: &str) -> bool {
        self(target, action)
    }
}
