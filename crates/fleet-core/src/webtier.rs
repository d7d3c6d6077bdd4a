//! Web-tier enable / disable / status across targets.
//!
//! Disabling drops a marker file that load balancers treat as "out of
//! rotation", then resets the web server. Enabling removes the marker and
//! resets. Every target runs concurrently; one target's failure is a
//! warning, never an abort.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::provider::{Confirm, WebTierController};
use crate::types::{Target, Warning};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebAction {
    Enable,
    Disable,
    Status,
}

impl WebAction {
    pub fn as_str(self) -> &'static str {
        match self {
            WebAction::Enable => "enable",
            WebAction::Disable => "disable",
            WebAction::Status => "status",
        }
    }

    fn mutates(self) -> bool {
        !matches!(self, WebAction::Status)
    }
}

impl fmt::Display for WebAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebTierRow {
    pub target: Target,
    /// In rotation (no marker). `None` when the marker could not be read.
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_code: Option<i32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebTierReport {
    pub rows: Vec<WebTierRow>,
    pub warnings: Vec<Warning>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<Target>,
}

/// Apply `action` to every target. Status never asks for confirmation.
pub async fn apply(
    controller: &dyn WebTierController,
    action: WebAction,
    targets: &[Target],
    confirm: Option<&dyn Confirm>,
) -> WebTierReport {
    let mut report = WebTierReport::default();

    let mut approved = Vec::with_capacity(targets.len());
    for target in targets {
        let ok = match confirm {
            Some(gate) if action.mutates() => gate.confirm(target, &format!("{action} web tier")),
            _ => true,
        };
        if ok {
            approved.push(target);
        } else {
            tracing::info!(target = %target, %action, "declined at confirmation, skipping");
            report.skipped.push(target.clone());
        }
    }

    let runs = approved
        .into_iter()
        .map(|target| apply_one(controller, action, target));
    for (row, warning) in join_all(runs).await {
        if let Some(w) = warning {
            tracing::warn!(target = %w.target, reason = %w.reason, "web tier action failed");
            report.warnings.push(w);
        }
        report.rows.push(row);
    }
    report
}

async fn apply_one(
    controller: &dyn WebTierController,
    action: WebAction,
    target: &Target,
) -> (WebTierRow, Option<Warning>) {
    let mut row = WebTierRow {
        target: target.clone(),
        enabled: None,
        reset_code: None,
        output: String::new(),
    };
    let warn = |reason: String| {
        Some(Warning {
            target: target.clone(),
            reason,
        })
    };

    if action.mutates() {
        let present = action == WebAction::Disable;
        if let Err(e) = controller.set_marker(target, present).await {
            return (row, warn(format!("{action} marker update failed: {e}")));
        }
        match controller.reset(target).await {
            Ok(out) => {
                row.reset_code = Some(out.code);
                row.output = combined_output(&out.stdout, &out.stderr);
                if !out.success() {
                    let reason = format!("reset exited with code {}", out.code);
                    row.enabled = Some(!present);
                    return (row, warn(reason));
                }
            }
            Err(e) => {
                row.enabled = Some(!present);
                return (row, warn(format!("reset failed: {e}")));
            }
        }
    }

    match controller.marker_present(target).await {
        Ok(present) => {
            row.enabled = Some(!present);
            (row, None)
        }
        Err(e) => (row, warn(format!("reading marker failed: {e}"))),
    }
}

fn combined_output(stdout: &str, stderr: &str) -> String {
    match (stdout.trim(), stderr.trim()) {
        ("", err) => err.to_string(),
        (out, "") => out.to_string(),
        (out, err) => format!("{out}\n{err}"),
    }
}
