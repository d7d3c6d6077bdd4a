//! Probe result reduction.
//!
//! A probe produces several raw attempts ("units"). Verbose mode hands them
//! through unchanged; quiet mode collapses them into one reachability verdict
//! per target.

use serde::{Deserialize, Serialize};

use crate::types::Target;

/// One raw probe attempt as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeUnit {
    pub address: String,
    /// Zero means the attempt got a reply.
    pub status_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl ProbeUnit {
    pub fn new(address: impl Into<String>, status_code: i32) -> Self {
        Self {
            address: address.into(),
            status_code,
            latency_ms: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    #[default]
    Quiet,
    Verbose,
}

/// Quiet-mode verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reachability {
    pub target: Target,
    pub success: bool,
}

/// What the dispatcher yields for one drained job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProbeReport {
    Quiet(Reachability),
    Verbose {
        target: Target,
        units: Vec<ProbeUnit>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ProbeReport {
    pub fn target(&self) -> &Target {
        match self {
            ProbeReport::Quiet(r) => &r.target,
            ProbeReport::Verbose { target, .. } => target,
        }
    }
}

/// Scan units in order and stop at the first success.
///
/// Units after the first success are never pulled from the iterator. No
/// units at all counts as unreachable.
pub fn reduce_quiet<I>(target: Target, units: I) -> Reachability
where
    I: IntoIterator<Item = ProbeUnit>,
{
    let success = units.into_iter().any(|u| u.is_success());
    Reachability { target, success }
}

/// Reduce one finished probe according to `mode`.
///
/// A provider error becomes `success: false` in quiet mode and an empty unit
/// list carrying the error text in verbose mode.
pub fn reduce(
    mode: ProbeMode,
    target: Target,
    outcome: Result<Vec<ProbeUnit>, String>,
) -> ProbeReport {
    match (mode, outcome) {
        (ProbeMode::Quiet, Ok(units)) => ProbeReport::Quiet(reduce_quiet(target, units)),
        (ProbeMode::Quiet, Err(_)) => ProbeReport::Quiet(Reachability {
            target,
            success: false,
        }),
        (ProbeMode::Verbose, Ok(units)) => ProbeReport::Verbose {
            target,
            units,
            error: None,
        },
        (ProbeMode::Verbose, Err(e)) => ProbeReport::Verbose {
            target,
            units: Vec::new(),
            error: Some(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn units(codes: &[i32]) -> Vec<ProbeUnit> {
        codes.iter().map(|&c| ProbeUnit::new("10.0.0.1", c)).collect()
    }

    #[test]
    fn quiet_short_circuits_on_first_success() {
        let pulled = Cell::new(0usize);
        let counted = units(&[1, 1, 0, 1]).into_iter().inspect(|_| {
            pulled.set(pulled.get() + 1);
        });
        let verdict = reduce_quiet(Target::new("a"), counted);
        assert!(verdict.success);
        assert_eq!(pulled.get(), 3, "fourth unit must not be inspected");
    }

    #[test]
    fn quiet_all_failures_is_unreachable() {
        let verdict = reduce_quiet(Target::new("a"), units(&[1, 1]));
        assert!(!verdict.success);
    }

    #[test]
    fn quiet_zero_units_is_unreachable() {
        let verdict = reduce_quiet(Target::new("a"), Vec::new());
        assert!(!verdict.success);
        assert_eq!(verdict.target, Target::new("a"));
    }

    #[test]
    fn verbose_passes_units_through_in_order() {
        let raw = units(&[1, 0, 2]);
        let report = reduce(ProbeMode::Verbose, Target::new("a"), Ok(raw.clone()));
        match report {
            ProbeReport::Verbose { units, error, .. } => {
                assert_eq!(units, raw);
                assert!(error.is_none());
            }
            other => panic!("expected verbose report, got {other:?}"),
        }
    }

    #[test]
    fn provider_error_reduces_per_mode() {
        let quiet = reduce(ProbeMode::Quiet, Target::new("a"), Err("boom".into()));
        assert_eq!(
            quiet,
            ProbeReport::Quiet(Reachability {
                target: Target::new("a"),
                success: false
            })
        );

        let verbose = reduce(ProbeMode::Verbose, Target::new("a"), Err("boom".into()));
        let ProbeReport::Verbose { units, error, .. } = verbose else {
            panic!("expected verbose")
        };
        assert!(units.is_empty());
        assert_eq!(error.as_deref(), Some("boom"));
    }

    #[test]
    fn quiet_report_json_shape() {
        let report = ProbeReport::Quiet(Reachability {
            target: Target::new("web-01"),
            success: true,
        });
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v, serde_json::json!({"target": "web-01", "success": true}));
    }
}
