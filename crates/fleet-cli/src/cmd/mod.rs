pub mod config;
pub mod inventory;
pub mod lifecycle;
pub mod probe;
pub mod web;

use anyhow::Context;
use clap::Args;
use fleet_core::config::Config;
use fleet_core::inventory::{self as inv, InventorySource, Scope, TargetFilter};
use fleet_core::paths;
use fleet_core::provider::Confirm;
use fleet_core::types::Target;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a command finished when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Clean,
    /// Some targets failed; the run itself completed.
    Partial,
}

impl Outcome {
    pub fn from_warnings(count: usize) -> Self {
        if count == 0 {
            Outcome::Clean
        } else {
            Outcome::Partial
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Clean => 0,
            Outcome::Partial => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Target selection
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Site / region code (2-8 letters or digits)
    #[arg(long)]
    pub scope: String,

    /// Explicit host names, comma separated (bypasses the inventory snapshot)
    #[arg(long, value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// Inventory snapshot to read instead of the configured one
    #[arg(long)]
    pub inventory: Option<PathBuf>,

    /// Keep only targets matching this pattern (repeatable)
    #[arg(long)]
    pub include: Vec<String>,

    /// Drop targets matching this pattern (repeatable, wins over --include)
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Keep only snapshot records tagged with this role (repeatable)
    #[arg(long = "role")]
    pub roles: Vec<String>,
}

pub struct Selection {
    pub scope: Scope,
    pub targets: Vec<Target>,
}

impl Selection {
    pub fn notice(&self) -> String {
        format!("no targets matched scope {}", self.scope)
    }
}

impl TargetArgs {
    /// Validate the scope and filters, then resolve the target list.
    ///
    /// Scope and pattern errors surface before any inventory is read.
    pub fn resolve(&self, root: &Path, config: &Config) -> anyhow::Result<Selection> {
        let scope = Scope::parse(&self.scope)?;
        let filter = TargetFilter::new(&self.include, &self.exclude)?.with_roles(&self.roles);
        let source = self.source(root, config);
        let targets =
            inv::resolve(&source, &scope, &filter).context("failed to resolve targets")?;
        Ok(Selection { scope, targets })
    }

    fn source(&self, root: &Path, config: &Config) -> InventorySource {
        if !self.hosts.is_empty() {
            return InventorySource::Hosts(self.hosts.clone());
        }
        let path = self
            .inventory
            .clone()
            .or_else(|| config.inventory_path(root))
            .unwrap_or_else(|| paths::default_inventory_path(root));
        InventorySource::Snapshot(path)
    }
}

// ---------------------------------------------------------------------------
// Confirmation prompt
// ---------------------------------------------------------------------------

/// Asks on stderr and reads the answer from stdin. Anything but y/yes declines.
pub struct StdinPrompt;

impl Confirm for StdinPrompt {
    fn confirm(&self, target: &Target, action: &str) -> bool {
        eprint!("proceed with {action} on {target}? [y/N] ");
        let _ = std::io::stderr().flush();
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// `None` when `--yes` was given.
pub fn confirmation(assume_yes: bool) -> Option<StdinPrompt> {
    (!assume_yes).then_some(StdinPrompt)
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start async runtime")
}
