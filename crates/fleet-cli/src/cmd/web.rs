use crate::cmd::{confirmation, runtime, Outcome, TargetArgs};
use crate::output::{print_json, print_notice, print_skipped, print_table, print_warnings};
use anyhow::Context;
use clap::{Args, Subcommand};
use fleet_core::config::Config;
use fleet_core::provider::Confirm;
use fleet_core::webtier::{self, WebAction, WebTierReport};
use fleet_remote::{RemoteRunner, SshWebTier};
use std::path::Path;

#[derive(Subcommand, Debug)]
pub enum WebSubcommand {
    /// Put targets back into load-balancer rotation
    Enable(WebArgs),
    /// Take targets out of load-balancer rotation
    Disable(WebArgs),
    /// Show whether each target is in rotation
    Status(WebArgs),
}

#[derive(Args, Debug)]
pub struct WebArgs {
    #[command(flatten)]
    pub targets: TargetArgs,

    /// Do not ask for confirmation per target
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub fn run(root: &Path, subcmd: WebSubcommand, json: bool) -> anyhow::Result<Outcome> {
    let (action, args) = match subcmd {
        WebSubcommand::Enable(a) => (WebAction::Enable, a),
        WebSubcommand::Disable(a) => (WebAction::Disable, a),
        WebSubcommand::Status(a) => (WebAction::Status, a),
    };

    let config = Config::load_or_default(root)?;
    let selection = args.targets.resolve(root, &config)?;
    if selection.targets.is_empty() {
        print_notice(&selection.notice(), json)?;
        return Ok(Outcome::Clean);
    }

    let runner = RemoteRunner::from_config(&config.remote);
    runner
        .check_available()
        .context("remote transport unavailable")?;
    let tier = SshWebTier::new(runner, config.remote.web.clone());

    let prompt = confirmation(args.yes);
    let gate = prompt.as_ref().map(|p| p as &dyn Confirm);
    let report =
        runtime()?.block_on(webtier::apply(&tier, action, &selection.targets, gate));

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    Ok(Outcome::from_warnings(report.warnings.len()))
}

fn print_report(report: &WebTierReport) {
    let rows = report
        .rows
        .iter()
        .map(|r| {
            let rotation = match r.enabled {
                Some(true) => "in",
                Some(false) => "out",
                None => "unknown",
            };
            vec![
                r.target.to_string(),
                rotation.to_string(),
                r.reset_code.map_or_else(String::new, |c| c.to_string()),
                r.output.lines().next().unwrap_or_default().to_string(),
            ]
        })
        .collect();
    print_table(&["TARGET", "ROTATION", "RESET", "OUTPUT"], rows);
    print_skipped(&report.skipped);
    print_warnings(&report.warnings);
}
