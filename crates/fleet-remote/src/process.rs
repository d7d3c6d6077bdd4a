use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;

use fleet_core::config::{RemoteConfig, Transport};
use fleet_core::error::RemoteError;
use fleet_core::provider::{CommandOutput, RemoteResult};
use fleet_core::types::Target;

/// Exit status ssh reserves for its own failures (connection refused, auth, ...).
const SSH_CONNECT_FAILURE: i32 = 255;

// ─── RemoteRunner ─────────────────────────────────────────────────────────

/// Runs one shell command on one target and captures its output.
///
/// With [`Transport::Ssh`] the command line is
/// `ssh <options> -o ConnectTimeout=N [-l user] <host> -- <command>`.
/// With [`Transport::Local`] it is `sh -c <command>` on this machine, with
/// the host name exported as `FLEET_TARGET`.
#[derive(Debug, Clone)]
pub struct RemoteRunner {
    transport: Transport,
    ssh_program: String,
    ssh_options: Vec<String>,
    user: Option<String>,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl RemoteRunner {
    pub fn from_config(cfg: &RemoteConfig) -> Self {
        Self {
            transport: cfg.transport,
            ssh_program: cfg.ssh_program.clone(),
            ssh_options: cfg.ssh_options.clone(),
            user: cfg.user.clone(),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            command_timeout: Duration::from_secs(cfg.command_timeout_secs),
        }
    }

    /// A runner that executes everything through the local shell.
    pub fn local() -> Self {
        Self::from_config(&RemoteConfig {
            transport: Transport::Local,
            ..RemoteConfig::default()
        })
    }

    pub fn with_command_timeout(mut self, limit: Duration) -> Self {
        self.command_timeout = limit;
        self
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Fail early when the transport binary is missing from `PATH`.
    pub fn check_available(&self) -> RemoteResult<()> {
        let program = self.program();
        which::which(program)
            .map(|_| ())
            .map_err(|_| RemoteError::Other(format!("'{program}' not found on PATH")))
    }

    fn program(&self) -> &str {
        match self.transport {
            Transport::Ssh => &self.ssh_program,
            Transport::Local => "sh",
        }
    }

    pub(crate) fn build_command(&self, target: &Target, command: &str) -> Command {
        let mut cmd = Command::new(self.program());
        match self.transport {
            Transport::Ssh => {
                cmd.args(&self.ssh_options)
                    .arg("-o")
                    .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs()));
                if let Some(user) = &self.user {
                    cmd.arg("-l").arg(user);
                }
                cmd.arg(target.name()).arg("--").arg(command);
            }
            Transport::Local => {
                cmd.arg("-c").arg(command).env("FLEET_TARGET", target.name());
            }
        }
        cmd
    }

    /// Run `command` and return its exit code and output, whatever the code.
    ///
    /// The child is killed when the command deadline passes.
    pub async fn run(&self, target: &Target, command: &str) -> RemoteResult<CommandOutput> {
        tracing::debug!(target = %target, command, "running remote command");
        let mut child = self
            .build_command(target, command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| RemoteError::Io("stdout not captured".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| RemoteError::Io("stderr not captured".into()))?;

        let collect = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (status, read_out, read_err) = tokio::join!(
                child.wait(),
                stdout.read_to_end(&mut out),
                stderr.read_to_end(&mut err)
            );
            read_out?;
            read_err?;
            Ok::<_, std::io::Error>((status?, out, err))
        };
        let outcome = timeout(self.command_timeout, collect).await;

        match outcome {
            Ok(Ok((status, out, err))) => Ok(CommandOutput {
                code: status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&out).into_owned(),
                stderr: String::from_utf8_lossy(&err).into_owned(),
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(_elapsed) => {
                let _ = child.kill().await;
                Err(RemoteError::Timeout(self.command_timeout))
            }
        }
    }

    /// Like [`RemoteRunner::run`], but a non-zero exit is an error.
    ///
    /// An ssh connection failure maps to [`RemoteError::Unreachable`].
    pub async fn run_checked(&self, target: &Target, command: &str) -> RemoteResult<CommandOutput> {
        let out = self.run(target, command).await?;
        if out.success() {
            return Ok(out);
        }
        let stderr = out.stderr.trim().to_string();
        if self.transport == Transport::Ssh && out.code == SSH_CONNECT_FAILURE {
            return Err(RemoteError::Unreachable(format!("{target}: {stderr}")));
        }
        Err(RemoteError::Command {
            code: out.code,
            stderr,
        })
    }
}

/// Quote `arg` for a POSIX shell.
pub(crate) fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@=+,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
