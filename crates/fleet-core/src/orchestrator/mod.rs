//! Tiered fleet lifecycle orchestrator.
//!
//! `Orchestrator::apply` partitions work items into a Priority and a Normal
//! tier and runs one phase per tier. Within a phase every target's batch runs
//! concurrently; phases never overlap and are separated by a cooldown:
//!
//! ```text
//! stop:   Normal ──▶ [cooldown if Priority non-empty] ──▶ Priority
//! start:  Priority (may be empty) ──▶ cooldown ──▶ Normal
//! ```
//!
//! A failing or timed-out target only ever produces a warning.

pub mod result;

pub use result::{PhaseEvent, PhaseResult, RunResult, StateRow};

use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::provider::{Confirm, ServiceController};
use crate::types::{Direction, ServiceState, Target, Tier, WorkItem};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Target → item names, for one tier.
type Grouping = BTreeMap<Target, Vec<String>>;

#[derive(Debug, Clone, Copy)]
pub struct LifecycleOptions {
    /// Upper bound on each target's wait-for-state step.
    pub timeout: Duration,
    /// Pause between the two tiers.
    pub cooldown: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

pub struct Orchestrator<'a> {
    controller: &'a dyn ServiceController,
    options: LifecycleOptions,
    confirm: Option<&'a dyn Confirm>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(controller: &'a dyn ServiceController, options: LifecycleOptions) -> Self {
        Self {
            controller,
            options,
            confirm: None,
        }
    }

    /// Require `confirm` to approve each target before its batch runs.
    pub fn with_confirmation(mut self, confirm: &'a dyn Confirm) -> Self {
        self.confirm = Some(confirm);
        self
    }

    pub async fn apply(&self, direction: Direction, items: &[WorkItem]) -> RunResult {
        if items.is_empty() {
            return RunResult::empty(direction, "no work items matched; nothing to do");
        }

        let (priority, normal) = partition(items);
        let mut result = RunResult::new(direction);
        tracing::info!(
            run_id = %result.run_id,
            %direction,
            priority_targets = priority.len(),
            normal_targets = normal.len(),
            "lifecycle run starting"
        );

        match direction {
            Direction::Stop => {
                self.run_phase(Tier::Normal, direction, &normal, &mut result)
                    .await;
                if !priority.is_empty() {
                    self.cool_down(&mut result).await;
                    self.run_phase(Tier::Priority, direction, &priority, &mut result)
                        .await;
                }
            }
            Direction::Start => {
                // Unconditional on start, even with no priority items.
                self.run_phase(Tier::Priority, direction, &priority, &mut result)
                    .await;
                self.cool_down(&mut result).await;
                self.run_phase(Tier::Normal, direction, &normal, &mut result)
                    .await;
            }
        }

        result.finished_at = Some(Utc::now());
        tracing::info!(
            run_id = %result.run_id,
            rows = result.rows.len(),
            warnings = result.warnings.len(),
            "lifecycle run finished"
        );
        result
    }

    async fn cool_down(&self, result: &mut RunResult) {
        tracing::info!(secs = self.options.cooldown.as_secs_f64(), "cooling down between tiers");
        tokio::time::sleep(self.options.cooldown).await;
        result.timeline.push(PhaseEvent::cooldown(self.options.cooldown));
    }

    async fn run_phase(
        &self,
        tier: Tier,
        direction: Direction,
        groups: &Grouping,
        result: &mut RunResult,
    ) {
        if groups.is_empty() {
            return;
        }

        // Confirmation is interactive in practice, so ask one target at a time
        // before anything in this phase is launched.
        let mut approved = Vec::with_capacity(groups.len());
        for (target, items) in groups {
            if self.confirmed(target, direction, items) {
                approved.push((target, items));
            } else {
                tracing::info!(target = %target, %tier, "declined at confirmation, skipping");
                result.skipped.push(target.clone());
            }
        }

        tracing::info!(%tier, %direction, targets = approved.len(), "phase starting");
        result.timeline.push(PhaseEvent::PhaseStarted {
            tier,
            targets: approved.len(),
        });

        let batches = approved
            .into_iter()
            .map(|(target, items)| self.run_batch(tier, direction, target, items));
        for outcome in join_all(batches).await {
            if let Some(e) = &outcome.error {
                tracing::warn!(target = %outcome.target, %tier, error = %e, "target did not converge");
            }
            result.absorb(outcome);
        }

        result.timeline.push(PhaseEvent::PhaseFinished { tier });
        tracing::info!(%tier, "phase finished");
    }

    fn confirmed(&self, target: &Target, direction: Direction, items: &[String]) -> bool {
        match self.confirm {
            None => true,
            Some(gate) => gate.confirm(target, &format!("{direction} {}", items.join(", "))),
        }
    }

    /// Transition, wait for convergence (bounded by the timeout), then read back.
    async fn run_batch(
        &self,
        tier: Tier,
        direction: Direction,
        target: &Target,
        items: &[String],
    ) -> PhaseResult {
        let desired = direction.desired_state();

        if let Err(e) = self.controller.transition(target, items, direction).await {
            return PhaseResult {
                target: target.clone(),
                tier,
                states: unknown_states(items),
                error: Some(format!("{direction} request failed: {e}")),
            };
        }

        let timeout = self.options.timeout;
        let mut error = match tokio::time::timeout(
            timeout,
            self.controller
                .wait_for_state(target, items, desired, timeout),
        )
        .await
        {
            Ok(Ok(true)) => None,
            Ok(Ok(false)) | Err(_) => Some(format!(
                "timed out after {}s waiting for {desired}",
                timeout.as_secs_f64()
            )),
            Ok(Err(e)) => Some(format!("waiting for {desired} failed: {e}")),
        };

        let states = match self.controller.query_states(target, items).await {
            Ok(observed) => items
                .iter()
                .map(|item| {
                    let state = observed
                        .iter()
                        .find(|(name, _)| name == item)
                        .map(|(_, s)| *s)
                        .unwrap_or(ServiceState::Unknown);
                    (item.clone(), state)
                })
                .collect(),
            Err(e) => {
                error.get_or_insert_with(|| format!("reading final state failed: {e}"));
                unknown_states(items)
            }
        };

        PhaseResult {
            target: target.clone(),
            tier,
            states,
            error,
        }
    }
}

fn unknown_states(items: &[String]) -> Vec<(String, ServiceState)> {
    items
        .iter()
        .map(|i| (i.clone(), ServiceState::Unknown))
        .collect()
}

/// Split into (priority, normal), each grouped by target.
fn partition(items: &[WorkItem]) -> (Grouping, Grouping) {
    let mut priority = Grouping::new();
    let mut normal = Grouping::new();
    for item in items {
        let group = match item.tier {
            Tier::Priority => &mut priority,
            Tier::Normal => &mut normal,
        };
        let names = group.entry(item.target.clone()).or_default();
        if !names.contains(&item.name) {
            names.push(item.name.clone());
        }
    }
    (priority, normal)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::provider::RemoteResult;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    /// In-memory service controller that logs every call in order.
    #[derive(Default)]
    struct ScriptedController {
        log: Mutex<Vec<(Instant, String)>>,
        states: Mutex<HashMap<(String, String), ServiceState>>,
        failing: Vec<String>,
        stuck: Vec<String>,
        wait_delay: Duration,
        /// Sleep this long in `wait_for_state`, ignoring the deadline it is given.
        overrun: Option<Duration>,
    }

    impl ScriptedController {
        fn record(&self, call: &str, target: &Target) {
            self.log
                .lock()
                .unwrap()
                .push((Instant::now(), format!("{call}:{target}")));
        }

        fn calls(&self) -> Vec<String> {
            self.log.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
        }

        fn at(&self, call: &str) -> Instant {
            self.log
                .lock()
                .unwrap()
                .iter()
                .find(|(_, c)| c == call)
                .map(|(t, _)| *t)
                .unwrap_or_else(|| panic!("no call {call}"))
        }
    }

    #[async_trait]
    impl ServiceController for ScriptedController {
        async fn transition(
            &self,
            target: &Target,
            items: &[String],
            direction: Direction,
        ) -> RemoteResult<()> {
            self.record("transition", target);
            if self.failing.iter().any(|f| f == target.name()) {
                return Err(RemoteError::Other("transient rpc failure".into()));
            }
            let next = if self.stuck.iter().any(|s| s == target.name()) {
                match direction {
                    Direction::Start => ServiceState::StartPending,
                    Direction::Stop => ServiceState::StopPending,
                }
            } else {
                direction.desired_state()
            };
            let mut states = self.states.lock().unwrap();
            for item in items {
                states.insert((target.to_string(), item.clone()), next);
            }
            Ok(())
        }

        async fn wait_for_state(
            &self,
            target: &Target,
            items: &[String],
            desired: ServiceState,
            timeout: Duration,
        ) -> RemoteResult<bool> {
            self.record("wait", target);
            if let Some(overrun) = self.overrun {
                tokio::time::sleep(overrun).await;
                return Ok(true);
            }
            tokio::time::sleep(self.wait_delay).await;
            let converged = {
                let states = self.states.lock().unwrap();
                items.iter().all(|i| {
                    states.get(&(target.to_string(), i.clone())) == Some(&desired)
                })
            };
            if !converged {
                tokio::time::sleep(timeout).await;
            }
            Ok(converged)
        }

        async fn query_states(
            &self,
            target: &Target,
            items: &[String],
        ) -> RemoteResult<Vec<(String, ServiceState)>> {
            self.record("query", target);
            let states = self.states.lock().unwrap();
            Ok(items
                .iter()
                .map(|i| {
                    let s = states
                        .get(&(target.to_string(), i.clone()))
                        .copied()
                        .unwrap_or(ServiceState::Unknown);
                    (i.clone(), s)
                })
                .collect())
        }
    }

    fn item(target: &str, name: &str, tier: Tier) -> WorkItem {
        WorkItem {
            target: Target::new(target),
            name: name.to_string(),
            tier,
        }
    }

    fn options(cooldown_ms: u64) -> LifecycleOptions {
        LifecycleOptions {
            timeout: Duration::from_millis(200),
            cooldown: Duration::from_millis(cooldown_ms),
        }
    }

    fn a_normal_b_priority() -> Vec<WorkItem> {
        vec![
            item("A", "web", Tier::Normal),
            item("B", "cryptd", Tier::Priority),
        ]
    }

    #[tokio::test]
    async fn stop_runs_normal_then_cooldown_then_priority() {
        let ctl = ScriptedController::default();
        let orch = Orchestrator::new(&ctl, options(40));
        let result = orch.apply(Direction::Stop, &a_normal_b_priority()).await;

        assert_eq!(
            result.timeline,
            vec![
                PhaseEvent::PhaseStarted { tier: Tier::Normal, targets: 1 },
                PhaseEvent::PhaseFinished { tier: Tier::Normal },
                PhaseEvent::Cooldown { millis: 40 },
                PhaseEvent::PhaseStarted { tier: Tier::Priority, targets: 1 },
                PhaseEvent::PhaseFinished { tier: Tier::Priority },
            ]
        );
        assert_eq!(
            ctl.calls(),
            vec![
                "transition:A", "wait:A", "query:A",
                "transition:B", "wait:B", "query:B",
            ]
        );
        let gap = ctl.at("transition:B").duration_since(ctl.at("query:A"));
        assert!(gap >= Duration::from_millis(40), "cooldown not honoured: {gap:?}");
        assert_eq!(result.state_of(&Target::new("A"), "web"), Some(ServiceState::Stopped));
        assert_eq!(result.state_of(&Target::new("B"), "cryptd"), Some(ServiceState::Stopped));
        assert!(result.is_clean());
    }

    #[tokio::test]
    async fn stop_without_priority_items_skips_cooldown() {
        let ctl = ScriptedController::default();
        let orch = Orchestrator::new(&ctl, options(40));
        let items = vec![item("A", "web", Tier::Normal), item("C", "api", Tier::Normal)];
        let result = orch.apply(Direction::Stop, &items).await;

        assert_eq!(result.cooldowns(), 0);
        assert_eq!(result.rows.len(), 2);
    }

    #[tokio::test]
    async fn start_runs_priority_then_cooldown_then_normal() {
        let ctl = ScriptedController::default();
        let orch = Orchestrator::new(&ctl, options(40));
        let result = orch.apply(Direction::Start, &a_normal_b_priority()).await;

        assert_eq!(result.cooldowns(), 1);
        assert_eq!(
            ctl.calls(),
            vec![
                "transition:B", "wait:B", "query:B",
                "transition:A", "wait:A", "query:A",
            ]
        );
        let gap = ctl.at("transition:A").duration_since(ctl.at("query:B"));
        assert!(gap >= Duration::from_millis(40));
        assert_eq!(result.state_of(&Target::new("A"), "web"), Some(ServiceState::Running));
    }

    #[tokio::test]
    async fn start_always_cools_down_even_without_priority_items() {
        let ctl = ScriptedController::default();
        let orch = Orchestrator::new(&ctl, options(40));
        let started = Instant::now();
        let result = orch
            .apply(Direction::Start, &[item("A", "web", Tier::Normal)])
            .await;

        assert_eq!(result.cooldowns(), 1);
        assert_eq!(
            result.timeline,
            vec![
                PhaseEvent::Cooldown { millis: 40 },
                PhaseEvent::PhaseStarted { tier: Tier::Normal, targets: 1 },
                PhaseEvent::PhaseFinished { tier: Tier::Normal },
            ]
        );
        let gap = ctl.at("transition:A").duration_since(started);
        assert!(gap >= Duration::from_millis(40), "cooldown not honoured: {gap:?}");
    }

    #[tokio::test]
    async fn one_failing_target_does_not_abort_the_run() {
        let ctl = ScriptedController {
            failing: vec!["B".to_string()],
            ..Default::default()
        };
        let orch = Orchestrator::new(&ctl, options(0));
        let items = vec![
            item("A", "web", Tier::Normal),
            item("B", "web", Tier::Normal),
            item("C", "web", Tier::Normal),
        ];
        let result = orch.apply(Direction::Stop, &items).await;

        assert_eq!(result.state_of(&Target::new("A"), "web"), Some(ServiceState::Stopped));
        assert_eq!(result.state_of(&Target::new("C"), "web"), Some(ServiceState::Stopped));
        assert_eq!(result.state_of(&Target::new("B"), "web"), Some(ServiceState::Unknown));
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].target, Target::new("B"));
        assert!(result.warnings[0].reason.contains("transient rpc failure"));
    }

    #[tokio::test]
    async fn failure_in_one_tier_does_not_block_the_other() {
        let ctl = ScriptedController {
            failing: vec!["A".to_string()],
            ..Default::default()
        };
        let orch = Orchestrator::new(&ctl, options(0));
        let result = orch.apply(Direction::Stop, &a_normal_b_priority()).await;

        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.state_of(&Target::new("B"), "cryptd"), Some(ServiceState::Stopped));
    }

    #[tokio::test]
    async fn declined_target_is_neither_attempted_nor_reported() {
        let ctl = ScriptedController::default();
        let asked = AtomicUsize::new(0);
        let gate = |target: &Target, action: &str| {
            asked.fetch_add(1, Ordering::SeqCst);
            assert!(action.starts_with("stop "));
            target.name() != "B"
        };
        let orch = Orchestrator::new(&ctl, options(0)).with_confirmation(&gate);
        let items = vec![item("A", "web", Tier::Normal), item("B", "web", Tier::Normal)];
        let result = orch.apply(Direction::Stop, &items).await;

        assert_eq!(asked.load(Ordering::SeqCst), 2);
        assert!(ctl.calls().iter().all(|c| !c.ends_with(":B")));
        assert!(result.rows.iter().all(|r| r.target.name() != "B"));
        assert!(result.warnings.is_empty());
        assert_eq!(result.skipped, vec![Target::new("B")]);
    }

    #[tokio::test]
    async fn timed_out_wait_reports_observed_state_and_warns() {
        let ctl = ScriptedController {
            stuck: vec!["A".to_string()],
            ..Default::default()
        };
        let orch = Orchestrator::new(
            &ctl,
            LifecycleOptions {
                timeout: Duration::from_millis(30),
                cooldown: Duration::ZERO,
            },
        );
        let result = orch
            .apply(Direction::Stop, &[item("A", "web", Tier::Normal)])
            .await;

        assert_eq!(
            result.state_of(&Target::new("A"), "web"),
            Some(ServiceState::StopPending)
        );
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].reason.contains("timed out"));
        assert_eq!(ctl.calls().last().map(String::as_str), Some("query:A"));
    }

    #[tokio::test]
    async fn provider_ignoring_its_deadline_cannot_stall_a_phase() {
        let ctl = ScriptedController {
            overrun: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let orch = Orchestrator::new(
            &ctl,
            LifecycleOptions {
                timeout: Duration::from_millis(50),
                cooldown: Duration::ZERO,
            },
        );
        let items = vec![item("A", "web", Tier::Normal), item("B", "web", Tier::Normal)];

        let started = Instant::now();
        let result = orch.apply(Direction::Stop, &items).await;
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "phase waited on the provider: {:?}",
            started.elapsed()
        );
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings.iter().all(|w| w.reason.contains("timed out")));
        assert_eq!(result.state_of(&Target::new("A"), "web"), Some(ServiceState::Stopped));
        assert!(ctl.calls().contains(&"query:B".to_string()));
    }

    #[tokio::test]
    async fn batches_within_a_phase_run_concurrently() {
        let ctl = ScriptedController {
            wait_delay: Duration::from_millis(60),
            ..Default::default()
        };
        let orch = Orchestrator::new(&ctl, options(0));
        let items: Vec<_> = ["A", "B", "C", "D"]
            .iter()
            .map(|t| item(t, "web", Tier::Normal))
            .collect();

        let started = Instant::now();
        let result = orch.apply(Direction::Start, &items).await;
        assert_eq!(result.rows.len(), 4);
        assert!(
            started.elapsed() < Duration::from_millis(200),
            "batches ran sequentially: {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn empty_input_yields_notice() {
        let ctl = ScriptedController::default();
        let orch = Orchestrator::new(&ctl, options(0));
        let result = orch.apply(Direction::Start, &[]).await;
        assert!(result.rows.is_empty());
        assert!(result.notice.is_some());
        assert!(ctl.calls().is_empty());
    }

    #[test]
    fn partition_groups_by_tier_and_target() {
        let items = vec![
            item("A", "web", Tier::Normal),
            item("A", "cryptd", Tier::Priority),
            item("A", "api", Tier::Normal),
            item("A", "api", Tier::Normal),
        ];
        let (priority, normal) = partition(&items);
        assert_eq!(priority[&Target::new("A")], vec!["cryptd".to_string()]);
        assert_eq!(
            normal[&Target::new("A")],
            vec!["web".to_string(), "api".to_string()]
        );
    }
}
