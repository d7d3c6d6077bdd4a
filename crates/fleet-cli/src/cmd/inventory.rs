use crate::cmd::{Outcome, TargetArgs};
use crate::output::{print_json, print_notice, print_table};
use anyhow::Context;
use clap::Subcommand;
use fleet_core::config::Config;
use fleet_core::inventory::Snapshot;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum InventorySubcommand {
    /// List the targets a command with these filters would act on
    List {
        #[command(flatten)]
        targets: TargetArgs,
    },

    /// Write the resolved targets to a snapshot file
    Export {
        #[command(flatten)]
        targets: TargetArgs,

        /// Destination file
        #[arg(long)]
        out: PathBuf,
    },
}

pub fn run(root: &Path, subcmd: InventorySubcommand, json: bool) -> anyhow::Result<Outcome> {
    let config = Config::load_or_default(root)?;
    match subcmd {
        InventorySubcommand::List { targets } => {
            let selection = targets.resolve(root, &config)?;
            if selection.targets.is_empty() {
                print_notice(&selection.notice(), json)?;
            } else if json {
                print_json(&selection.targets)?;
            } else {
                print_table(
                    &["TARGET"],
                    selection
                        .targets
                        .iter()
                        .map(|t| vec![t.to_string()])
                        .collect(),
                );
            }
        }
        InventorySubcommand::Export { targets, out } => {
            let selection = targets.resolve(root, &config)?;
            Snapshot::write(&out, &selection.scope, &selection.targets)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "Exported {} target(s) for scope {} to {}",
                selection.targets.len(),
                selection.scope,
                out.display()
            );
        }
    }
    Ok(Outcome::Clean)
}
