use async_trait::async_trait;

use fleet_core::config::WebCommands;
use fleet_core::error::RemoteError;
use fleet_core::provider::{CommandOutput, RemoteResult, WebTierController};
use fleet_core::types::Target;

use crate::process::{shell_quote, RemoteRunner};

/// Web-tier rotation control through a marker file and a reset command.
#[derive(Debug, Clone)]
pub struct SshWebTier {
    runner: RemoteRunner,
    commands: WebCommands,
}

impl SshWebTier {
    pub fn new(runner: RemoteRunner, commands: WebCommands) -> Self {
        Self { runner, commands }
    }

    fn marker(&self) -> String {
        shell_quote(&self.commands.marker_path)
    }
}

#[async_trait]
impl WebTierController for SshWebTier {
    async fn marker_present(&self, target: &Target) -> RemoteResult<bool> {
        let command = format!("if test -e {}; then echo present; else echo absent; fi", self.marker());
        let out = self.runner.run_checked(target, &command).await?;
        match out.stdout.trim() {
            "present" => Ok(true),
            "absent" => Ok(false),
            other => Err(RemoteError::Other(format!("unexpected marker probe output '{other}'"))),
        }
    }

    async fn set_marker(&self, target: &Target, present: bool) -> RemoteResult<()> {
        let command = if present {
            format!("touch {}", self.marker())
        } else {
            format!("rm -f {}", self.marker())
        };
        self.runner.run_checked(target, &command).await?;
        Ok(())
    }

    async fn reset(&self, target: &Target) -> RemoteResult<CommandOutput> {
        // A failing reset is reported through its exit code, not as an error.
        self.runner.run(target, &self.commands.reset_command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn local_tier(dir: &TempDir, reset: &str) -> SshWebTier {
        SshWebTier::new(
            RemoteRunner::local(),
            WebCommands {
                marker_path: dir.path().join("out of rotation").display().to_string(),
                reset_command: reset.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn marker_round_trip() {
        let dir = TempDir::new().unwrap();
        let web = local_tier(&dir, "true");
        let host = Target::new("w1");

        assert!(!web.marker_present(&host).await.unwrap());
        web.set_marker(&host, true).await.unwrap();
        assert!(web.marker_present(&host).await.unwrap());
        assert!(dir.path().join("out of rotation").exists());
        web.set_marker(&host, false).await.unwrap();
        assert!(!web.marker_present(&host).await.unwrap());
    }

    #[tokio::test]
    async fn reset_reports_code_and_output() {
        let dir = TempDir::new().unwrap();
        let web = local_tier(&dir, "echo reloading; echo busy >&2; exit 1");
        let out = web.reset(&Target::new("w1")).await.unwrap();
        assert_eq!(out.code, 1);
        assert_eq!(out.stdout.trim(), "reloading");
        assert_eq!(out.stderr.trim(), "busy");
    }

    #[tokio::test]
    async fn unwritable_marker_is_an_error() {
        let web = SshWebTier::new(
            RemoteRunner::local(),
            WebCommands {
                marker_path: "/nonexistent-dir/marker".into(),
                reset_command: "true".into(),
            },
        );
        let err = web.set_marker(&Target::new("w1"), true).await.unwrap_err();
        assert!(matches!(err, RemoteError::Command { .. }));
    }
}
