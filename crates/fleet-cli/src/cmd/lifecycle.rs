use crate::cmd::{confirmation, runtime, Outcome, TargetArgs};
use crate::output::{print_json, print_notice, print_skipped, print_table, print_warnings};
use anyhow::Context;
use clap::Args;
use fleet_core::classifier::classify_items;
use fleet_core::config::Config;
use fleet_core::orchestrator::{Orchestrator, RunResult};
use fleet_core::types::Direction;
use fleet_remote::{RemoteRunner, SshServiceController};
use std::path::Path;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct LifecycleArgs {
    #[command(flatten)]
    pub targets: TargetArgs,

    /// Service name to act on (repeatable)
    #[arg(long = "service", required = true)]
    pub services: Vec<String>,

    /// Seconds to wait for each target to converge (default from config)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Seconds to pause between the priority and normal tiers (default from config)
    #[arg(long)]
    pub cooldown: Option<u64>,

    /// Do not ask for confirmation per target
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub fn run(
    root: &Path,
    direction: Direction,
    args: LifecycleArgs,
    json: bool,
) -> anyhow::Result<Outcome> {
    let config = Config::load_or_default(root)?;
    let selection = args.targets.resolve(root, &config)?;
    if selection.targets.is_empty() {
        if json {
            print_json(&RunResult::empty(direction, selection.notice()))?;
        } else {
            print_notice(&selection.notice(), false)?;
        }
        return Ok(Outcome::Clean);
    }

    let mut options = config.lifecycle_options();
    if let Some(secs) = args.timeout {
        options.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.cooldown {
        options.cooldown = Duration::from_secs(secs);
    }

    let runner = RemoteRunner::from_config(&config.remote);
    runner
        .check_available()
        .context("remote transport unavailable")?;
    let controller = SshServiceController::new(runner, config.remote.services.clone());

    let policy = config.tier_policy();
    let items = classify_items(&policy, &selection.targets, &args.services);

    let prompt = confirmation(args.yes);
    let mut orchestrator = Orchestrator::new(&controller, options);
    if let Some(p) = &prompt {
        orchestrator = orchestrator.with_confirmation(p);
    }

    let result = runtime()?.block_on(orchestrator.apply(direction, &items));
    print_run(&result, json)?;
    Ok(Outcome::from_warnings(result.warnings.len()))
}

fn print_run(result: &RunResult, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(result);
    }
    if let Some(notice) = &result.notice {
        println!("{notice}");
    }
    if !result.rows.is_empty() {
        print_table(
            &["TARGET", "SERVICE", "TIER", "STATE"],
            result
                .rows
                .iter()
                .map(|r| {
                    vec![
                        r.target.to_string(),
                        r.item.clone(),
                        r.tier.to_string(),
                        r.state.to_string(),
                    ]
                })
                .collect(),
        );
    }
    print_skipped(&result.skipped);
    print_warnings(&result.warnings);
    Ok(())
}
