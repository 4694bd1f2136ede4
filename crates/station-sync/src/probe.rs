//! # Host Reachability Probe
//!
//! The first health-check step asks the operating system whether the node's
//! host answers ICMP echo at all, before any WebSocket is attempted.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

/// Answers "is this host up?".
#[async_trait]
pub trait HostProbe: Send + Sync {
    /// `Ok(false)` means the host did not answer; `Err` means the probe
    /// itself could not run.
    async fn is_reachable(&self, ip: &str) -> SyncResult<bool>;
}

/// Probe backed by the platform `ping` tool.
#[derive(Debug, Clone)]
pub struct SystemPing {
    timeout: Duration,
}

impl SystemPing {
    pub fn new(timeout: Duration) -> Self {
        SystemPing { timeout }
    }

    fn command(&self, ip: &str) -> Command {
        let secs = self.timeout.as_secs().max(1).to_string();
        let mut command = Command::new("ping");
        if cfg!(target_os = "windows") {
            let millis = self.timeout.as_millis().max(1).to_string();
            command.args(["-n", "1", "-w", &millis, ip]);
        } else if cfg!(target_os = "macos") {
            command.args(["-c", "1", "-t", &secs, ip]);
        } else {
            command.args(["-c", "1", "-W", &secs, ip]);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

impl Default for SystemPing {
    fn default() -> Self {
        SystemPing::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl HostProbe for SystemPing {
    async fn is_reachable(&self, ip: &str) -> SyncResult<bool> {
        let wait = self.timeout + Duration::from_secs(1);
        let status = match tokio::time::timeout(wait, self.command(ip).status()).await {
            Ok(status) => status.map_err(|e| SyncError::ProbeFailed(e.to_string()))?,
            Err(_) => {
                debug!(ip, "ping timed out");
                return Ok(false);
            }
        };
        debug!(ip, success = status.success(), "ping finished");
        Ok(status.success())
    }
}

/// Probe that trusts every host; used when ICMP is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeReachable;

#[async_trait]
impl HostProbe for AssumeReachable {
    async fn is_reachable(&self, _ip: &str) -> SyncResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_arguments() {
        let probe = SystemPing::new(Duration::from_millis(1500));
        let command = probe.command("10.0.0.9");
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args.first().map(String::as_str), Some(if cfg!(windows) { "-n" } else { "-c" }));
        assert_eq!(args.last().map(String::as_str), Some("10.0.0.9"));
    }

    #[tokio::test]
    async fn test_assume_reachable() {
        assert!(AssumeReachable.is_reachable("10.0.0.9").await.unwrap());
    }
}
