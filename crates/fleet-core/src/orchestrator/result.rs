//! Run result data model for the lifecycle orchestrator.
//!
//! A `RunResult` is assembled phase by phase and returned once. Rows cover
//! every target/item pair that was attempted; declined targets are listed
//! separately and never produce rows or warnings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::types::{Direction, ServiceState, Target, Tier, Warning};

// ---------------------------------------------------------------------------
// PhaseResult
// ---------------------------------------------------------------------------

/// Outcome of one target's batch within one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub target: Target,
    pub tier: Tier,
    pub states: Vec<(String, ServiceState)>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// StateRow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRow {
    pub target: Target,
    pub item: String,
    pub tier: Tier,
    pub state: ServiceState,
}

// ---------------------------------------------------------------------------
// PhaseEvent
// ---------------------------------------------------------------------------

/// Observable ordering of a run: which phases ran and where the cooldown fell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PhaseEvent {
    PhaseStarted { tier: Tier, targets: usize },
    PhaseFinished { tier: Tier },
    Cooldown { millis: u64 },
}

impl PhaseEvent {
    pub fn cooldown(d: Duration) -> Self {
        PhaseEvent::Cooldown {
            millis: u64::try_from(d.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

// ---------------------------------------------------------------------------
// RunResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub direction: Direction,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub rows: Vec<StateRow>,
    pub warnings: Vec<Warning>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<Target>,
    pub timeline: Vec<PhaseEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl RunResult {
    pub fn new(direction: Direction) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            direction,
            started_at: Utc::now(),
            finished_at: None,
            rows: Vec::new(),
            warnings: Vec::new(),
            skipped: Vec::new(),
            timeline: Vec::new(),
            notice: None,
        }
    }

    /// An empty result carrying an explanation, e.g. when discovery found nothing.
    pub fn empty(direction: Direction, notice: impl Into<String>) -> Self {
        let mut result = Self::new(direction);
        result.notice = Some(notice.into());
        result.finished_at = Some(result.started_at);
        result
    }

    pub fn absorb(&mut self, phase: PhaseResult) {
        for (item, state) in phase.states {
            self.rows.push(StateRow {
                target: phase.target.clone(),
                item,
                tier: phase.tier,
                state,
            });
        }
        if let Some(reason) = phase.error {
            self.warnings.push(Warning {
                target: phase.target,
                reason,
            });
        }
    }

    pub fn state_of(&self, target: &Target, item: &str) -> Option<ServiceState> {
        self.rows
            .iter()
            .find(|r| &r.target == target && r.item == item)
            .map(|r| r.state)
    }

    pub fn cooldowns(&self) -> usize {
        self.timeline
            .iter()
            .filter(|e| matches!(e, PhaseEvent::Cooldown { .. }))
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
