use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::time::{sleep, Instant};

use fleet_core::config::ServiceCommands;
use fleet_core::error::RemoteError;
use fleet_core::provider::{RemoteResult, ServiceController};
use fleet_core::types::{Direction, ServiceState, Target};

use crate::process::{shell_quote, RemoteRunner};

static SERVICE_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn service_name_re() -> &'static Regex {
    SERVICE_NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.@:\-]*$").unwrap())
}

/// Service control through templated shell commands (systemd by default).
#[derive(Debug, Clone)]
pub struct SshServiceController {
    runner: RemoteRunner,
    commands: ServiceCommands,
}

impl SshServiceController {
    pub fn new(runner: RemoteRunner, commands: ServiceCommands) -> Self {
        Self { runner, commands }
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.commands.poll_interval_ms.max(1))
    }

    fn render(template: &str, items: &[String]) -> RemoteResult<String> {
        if let Some(bad) = items.iter().find(|i| !service_name_re().is_match(i)) {
            return Err(RemoteError::Other(format!("invalid service name '{bad}'")));
        }
        let joined = items
            .iter()
            .map(|i| shell_quote(i))
            .collect::<Vec<_>>()
            .join(" ");
        Ok(template.replace("{items}", &joined))
    }
}

#[async_trait]
impl ServiceController for SshServiceController {
    async fn transition(
        &self,
        target: &Target,
        items: &[String],
        direction: Direction,
    ) -> RemoteResult<()> {
        let template = match direction {
            Direction::Start => &self.commands.start,
            Direction::Stop => &self.commands.stop,
        };
        let command = Self::render(template, items)?;
        self.runner.run_checked(target, &command).await?;
        Ok(())
    }

    async fn wait_for_state(
        &self,
        target: &Target,
        items: &[String],
        desired: ServiceState,
        timeout: Duration,
    ) -> RemoteResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let states = self.query_states(target, items).await?;
            if states.iter().all(|(_, s)| *s == desired) {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tracing::debug!(target = %target, %desired, "not converged yet, polling");
            sleep(self.poll_interval().min(deadline - now)).await;
        }
    }

    async fn query_states(
        &self,
        target: &Target,
        items: &[String],
    ) -> RemoteResult<Vec<(String, ServiceState)>> {
        let command = Self::render(&self.commands.state, items)?;
        let out = self.runner.run_checked(target, &command).await?;
        Ok(parse_states(items, &out.stdout))
    }
}

/// One `ActiveState` line per item, in argument order. Missing lines are Unknown.
fn parse_states(items: &[String], stdout: &str) -> Vec<(String, ServiceState)> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    items
        .iter()
        .map(|item| {
            let state = lines
                .next()
                .map_or(ServiceState::Unknown, ServiceState::from_active_state);
            (item.clone(), state)
        })
        .collect()
}
