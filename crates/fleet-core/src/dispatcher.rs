//! Bounded-concurrency probe dispatch.
//!
//! Each [`Dispatcher::dispatch`] call builds its own [`SlotPool`]: a fixed
//! array of `concurrency` slots, each holding at most one in-flight probe.
//! Targets are assigned round-robin to free slots. When every slot is busy
//! the call suspends until some probe finishes, drains it, and reuses the
//! slot. After the last target is submitted the remaining slots are drained.
//!
//! Completion is push-based: every spawned probe reports back over an mpsc
//! channel tagged with its slot index and a per-pool sequence number. A slot
//! is emptied with `Option::take` as part of the drain, so a job can only
//! ever be drained once.

use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{FleetError, Result};
use crate::provider::ProbeProvider;
use crate::reducer::{reduce, ProbeMode, ProbeReport, ProbeUnit};
use crate::types::Target;

pub const DEFAULT_CONCURRENCY: usize = 20;

// ---------------------------------------------------------------------------
// Jobs and slots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Failed,
}

struct Job {
    target: Target,
    seq: u64,
    handle: JoinHandle<()>,
}

struct Completion {
    slot: usize,
    seq: u64,
    outcome: std::result::Result<Vec<ProbeUnit>, String>,
}

/// A job removed from its slot together with its outcome.
struct Drained {
    slot: usize,
    target: Target,
    state: JobState,
    outcome: std::result::Result<Vec<ProbeUnit>, String>,
}

/// Per-call bookkeeping, returned alongside the reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub slots: usize,
    /// Jobs assigned, indexed by slot.
    pub launched: Vec<usize>,
    /// Jobs drained, indexed by slot.
    pub drained: Vec<usize>,
    pub peak_in_flight: usize,
}

struct SlotPool {
    slots: Vec<Option<Job>>,
    cursor: Option<usize>,
    in_flight: usize,
    next_seq: u64,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
    stats: DispatchStats,
}

impl SlotPool {
    fn new(size: usize) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            slots: (0..size).map(|_| None).collect(),
            cursor: None,
            in_flight: 0,
            next_seq: 0,
            done_tx,
            done_rx,
            stats: DispatchStats {
                slots: size,
                launched: vec![0; size],
                drained: vec![0; size],
                peak_in_flight: 0,
            },
        }
    }

    fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Advance the cursor by at most one full lap looking for an empty slot.
    fn next_free(&mut self) -> Option<usize> {
        let n = self.slots.len();
        for _ in 0..n {
            let next = match self.cursor {
                None => 0,
                Some(c) => (c + 1) % n,
            };
            self.cursor = Some(next);
            if self.slots[next].is_none() {
                return Some(next);
            }
        }
        None
    }

    fn launch<P: ProbeProvider>(&mut self, slot: usize, target: Target, provider: &Arc<P>) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let done_tx = self.done_tx.clone();
        let provider = Arc::clone(provider);
        let probe_target = target.clone();
        let handle = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(provider.probe(&probe_target))
                .catch_unwind()
                .await
            {
                Ok(Ok(units)) => Ok(units),
                Ok(Err(e)) => Err(e.to_string()),
                Err(payload) => Err(format!("probe panicked: {}", panic_message(payload.as_ref()))),
            };
            let _ = done_tx.send(Completion { slot, seq, outcome });
        });

        tracing::debug!(slot, seq, target = %target, "probe assigned");
        self.slots[slot] = Some(Job {
            target,
            seq,
            handle,
        });
        self.in_flight += 1;
        self.stats.launched[slot] += 1;
        self.stats.peak_in_flight = self.stats.peak_in_flight.max(self.in_flight);
    }

    fn drain(&mut self, done: Completion) -> Option<Drained> {
        let slot = &mut self.slots[done.slot];
        if !slot.as_ref().is_some_and(|job| job.seq == done.seq) {
            tracing::error!(slot = done.slot, seq = done.seq, "completion for a job no longer in its slot");
            return None;
        }
        let job = slot.take()?;
        self.in_flight -= 1;
        self.stats.drained[done.slot] += 1;

        let state = if done.outcome.is_ok() {
            JobState::Completed
        } else {
            JobState::Failed
        };
        tracing::debug!(slot = done.slot, seq = job.seq, target = %job.target, ?state, "probe drained");
        Some(Drained {
            slot: done.slot,
            target: job.target,
            state,
            outcome: done.outcome,
        })
    }

    /// Drain every job that has already reported, without waiting.
    fn drain_ready(&mut self) -> Vec<Drained> {
        let mut out = Vec::new();
        while let Ok(done) = self.done_rx.try_recv() {
            if let Some(d) = self.drain(done) {
                out.push(d);
            }
        }
        out
    }

    /// Suspend until the next job reports, then drain it.
    async fn drain_next(&mut self) -> Option<Drained> {
        let done = self.done_rx.recv().await?;
        self.drain(done)
    }

    fn take_stats(&mut self) -> DispatchStats {
        std::mem::take(&mut self.stats)
    }
}

impl Drop for SlotPool {
    fn drop(&mut self) {
        // Only reachable with jobs still present if the dispatch future was dropped.
        for job in self.slots.iter_mut().filter_map(Option::take) {
            job.handle.abort();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub reports: Vec<ProbeReport>,
    pub stats: DispatchStats,
}

pub struct Dispatcher<P> {
    provider: Arc<P>,
    concurrency: usize,
    mode: ProbeMode,
}

impl<P: ProbeProvider> Dispatcher<P> {
    pub fn new(provider: Arc<P>, concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(FleetError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            provider,
            concurrency,
            mode: ProbeMode::Quiet,
        })
    }

    pub fn with_mode(mut self, mode: ProbeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Probe every target with at most `concurrency` probes in flight.
    ///
    /// Returns exactly one report per submitted target, in completion order.
    pub async fn dispatch<I>(&self, targets: I) -> DispatchReport
    where
        I: IntoIterator<Item = Target>,
    {
        let mut pool = SlotPool::new(self.concurrency);
        let mut reports = Vec::new();

        for target in targets {
            for drained in pool.drain_ready() {
                reports.push(self.finish(drained));
            }

            let slot = loop {
                if let Some(slot) = pool.next_free() {
                    break slot;
                }
                tracing::trace!(in_flight = pool.in_flight(), "slot pool saturated");
                if let Some(drained) = pool.drain_next().await {
                    reports.push(self.finish(drained));
                }
            };
            pool.launch(slot, target, &self.provider);
        }

        while pool.in_flight() > 0 {
            if let Some(drained) = pool.drain_next().await {
                reports.push(self.finish(drained));
            }
        }

        DispatchReport {
            reports,
            stats: pool.take_stats(),
        }
    }

    fn finish(&self, drained: Drained) -> ProbeReport {
        if let Err(e) = &drained.outcome {
            tracing::warn!(target = %drained.target, slot = drained.slot, error = %e, "probe failed");
        }
        debug_assert_ne!(drained.state, JobState::Running);
        reduce(self.mode, drained.target, drained.outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
