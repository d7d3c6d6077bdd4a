use crate::cmd::{runtime, Outcome, TargetArgs};
use crate::output::{print_json, print_notice, print_table};
use clap::Args;
use fleet_core::config::Config;
use fleet_core::dispatcher::Dispatcher;
use fleet_core::reducer::{ProbeMode, ProbeReport};
use fleet_remote::PingProber;
use std::path::Path;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub targets: TargetArgs,

    /// Maximum probes in flight (default from config)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Echo attempts per target (default from config)
    #[arg(long)]
    pub count: Option<u32>,

    /// Print every probe attempt instead of one verdict per target
    #[arg(long)]
    pub verbose_results: bool,
}

pub fn run(root: &Path, args: ProbeArgs, json: bool) -> anyhow::Result<Outcome> {
    let config = Config::load_or_default(root)?;
    let selection = args.targets.resolve(root, &config)?;
    if selection.targets.is_empty() {
        print_notice(&selection.notice(), json)?;
        return Ok(Outcome::Clean);
    }

    let mode = if args.verbose_results || !config.quiet {
        ProbeMode::Verbose
    } else {
        ProbeMode::Quiet
    };
    let prober = PingProber::new(
        config.remote.ping_program.clone(),
        args.count.unwrap_or(config.probe_count),
    );
    let dispatcher = Dispatcher::new(
        Arc::new(prober),
        args.concurrency.unwrap_or(config.concurrency),
    )?
    .with_mode(mode);

    tracing::info!(
        scope = %selection.scope,
        targets = selection.targets.len(),
        concurrency = dispatcher.concurrency(),
        "probing"
    );
    let mut report = runtime()?.block_on(dispatcher.dispatch(selection.targets));
    report.reports.sort_by(|a, b| a.target().cmp(b.target()));

    if json {
        print_json(&report.reports)?;
        return Ok(Outcome::Clean);
    }

    match mode {
        ProbeMode::Quiet => print_table(
            &["TARGET", "REACHABLE"],
            report
                .reports
                .iter()
                .filter_map(|r| match r {
                    ProbeReport::Quiet(q) => {
                        Some(vec![q.target.to_string(), yes_no(q.success).to_string()])
                    }
                    ProbeReport::Verbose { .. } => None,
                })
                .collect(),
        ),
        ProbeMode::Verbose => {
            let mut rows = Vec::new();
            for r in &report.reports {
                let ProbeReport::Verbose {
                    target,
                    units,
                    error,
                } = r
                else {
                    continue;
                };
                if let Some(e) = error {
                    rows.push(vec![target.to_string(), "-".into(), "-".into(), e.clone()]);
                }
                for u in units {
                    rows.push(vec![
                        target.to_string(),
                        u.status_code.to_string(),
                        u.latency_ms.map_or("-".to_string(), |ms| format!("{ms}ms")),
                        String::new(),
                    ]);
                }
            }
            print_table(&["TARGET", "STATUS", "LATENCY", "ERROR"], rows);
        }
    }
    Ok(Outcome::Clean)
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}
