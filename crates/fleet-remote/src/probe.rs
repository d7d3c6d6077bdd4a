use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tokio::time::timeout;

use fleet_core::error::RemoteError;
use fleet_core::provider::{ProbeProvider, RemoteResult};
use fleet_core::reducer::ProbeUnit;
use fleet_core::types::Target;

/// Status code recorded for an attempt that produced no exit status at all.
const NO_REPLY: i32 = -1;

static LATENCY_RE: OnceLock<Regex> = OnceLock::new();

fn latency_re() -> &'static Regex {
    LATENCY_RE.get_or_init(|| Regex::new(r"time[=<]\s*([0-9]+(?:\.[0-9]+)?)\s*ms").unwrap())
}

/// ICMP reachability via the local `ping` binary, one echo per attempt.
#[derive(Debug, Clone)]
pub struct PingProber {
    program: String,
    attempts: u32,
    wait: Duration,
}

impl PingProber {
    pub fn new(program: impl Into<String>, attempts: u32) -> Self {
        Self {
            program: program.into(),
            attempts: attempts.max(1),
            wait: Duration::from_secs(2),
        }
    }

    /// Per-echo reply deadline, passed to `ping -W`.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    async fn attempt(&self, target: &Target) -> RemoteResult<ProbeUnit> {
        let wait_secs = self.wait.as_secs().max(1);
        let started = Instant::now();
        let run = Command::new(&self.program)
            .args(["-c", "1", "-W"])
            .arg(wait_secs.to_string())
            .arg(target.name())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        // ping enforces -W itself; the outer deadline only catches a hung binary.
        let output = match timeout(self.wait + Duration::from_secs(1), run).await {
            Ok(res) => res.map_err(|e| {
                RemoteError::Io(format!("cannot run '{}': {e}", self.program))
            })?,
            Err(_elapsed) => return Ok(ProbeUnit::new(target.name(), NO_REPLY)),
        };

        let code = output.status.code().unwrap_or(NO_REPLY);
        let mut unit = ProbeUnit::new(target.name(), code);
        if unit.is_success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            unit.latency_ms = parse_latency_ms(&stdout)
                .or_else(|| u64::try_from(started.elapsed().as_millis()).ok());
        }
        Ok(unit)
    }
}

#[async_trait]
impl ProbeProvider for PingProber {
    async fn probe(&self, target: &Target) -> RemoteResult<Vec<ProbeUnit>> {
        let mut units = Vec::with_capacity(self.attempts as usize);
        for _ in 0..self.attempts {
            units.push(self.attempt(target).await?);
        }
        Ok(units)
    }
}

/// Round-trip time reported by ping, rounded to whole milliseconds.
fn parse_latency_ms(output: &str) -> Option<u64> {
    let caps = latency_re().captures(output)?;
    let ms: f64 = caps.get(1)?.as_str().parse().ok()?;
    Some(ms.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_parsing() {
        let linux = "64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=0.412 ms";
        assert_eq!(parse_latency_ms(linux), Some(0));
        assert_eq!(parse_latency_ms("time=12.6 ms"), Some(13));
        assert_eq!(parse_latency_ms("time<1ms"), Some(1));
        assert_eq!(parse_latency_ms("Request timeout for icmp_seq 0"), None);
    }

    #[tokio::test]
    async fn one_unit_per_attempt() {
        let prober = PingProber::new("true", 3);
        let units = prober.probe(&Target::new("h1")).await.unwrap();
        assert_eq!(units.len(), 3);
        assert!(units.iter().all(|u| u.is_success() && u.address == "h1"));
    }

    #[tokio::test]
    async fn failed_echo_is_a_unit_not_an_error() {
        let units = PingProber::new("false", 2)
            .probe(&Target::new("h1"))
            .await
            .unwrap();
        assert_eq!(units.len(), 2);
        assert!(units.iter().all(|u| !u.is_success() && u.latency_ms.is_none()));
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let err = PingProber::new("no-such-ping-binary", 1)
            .probe(&Target::new("h1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Io(_)));
    }
}
