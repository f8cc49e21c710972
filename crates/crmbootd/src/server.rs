//! Start/stop the bundled web server during bootstrap.
//!
//! The install wizard talks HTTP to the application, so the server must
//! be up while the wizard runs and back down before the supervisor takes
//! over. Lifecycle management beyond that belongs to the supervisor, not
//! to this daemon.

use std::time::Duration;

use anyhow::{Context, bail};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::profile::ServerProfile;

pub struct AppServer<'a> {
    profile: &'a ServerProfile,
}

impl<'a> AppServer<'a> {
    pub fn new(profile: &'a ServerProfile) -> Self {
        Self { profile }
    }

    /// Start the server and wait out the configured grace period.
    pub async fn start(&self) -> anyhow::Result<()> {
        info!(command = ?self.profile.start, "starting application server");
        run_command(&self.profile.start).await?;
        tokio::time::sleep(Duration::from_secs(self.profile.startup_grace_secs)).await;
        Ok(())
    }

    /// Stop the server. Best-effort: the bootstrap already succeeded or
    /// failed on its own terms by the time this runs.
    pub async fn stop(&self) {
        info!(command = ?self.profile.stop, "stopping application server");
        if let Err(e) = run_command(&self.profile.stop).await {
            warn!(error = %e, "failed to stop application server");
        }
    }
}

async fn run_command(command: &[String]) -> anyhow::Result<()> {
    let Some((program, args)) = command.split_first() else {
        bail!("empty server command");
    };
    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .with_context(|| format!("spawning {program}"))?;
    if !status.success() {
        bail!("{program} exited with {status}");
    }
    debug!(program, "server command completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(start: &[&str], stop: &[&str]) -> ServerProfile {
        ServerProfile {
            start: start.iter().map(|s| s.to_string()).collect(),
            stop: stop.iter().map(|s| s.to_string()).collect(),
            startup_grace_secs: 0,
        }
    }

    #[tokio::test]
    async fn start_succeeds_with_a_zero_exit() {
        let profile = profile(&["true"], &["true"]);
        AppServer::new(&profile).start().await.unwrap();
    }

    #[tokio::test]
    async fn start_fails_on_nonzero_exit() {
        let profile = profile(&["false"], &["true"]);
        assert!(AppServer::new(&profile).start().await.is_err());
    }

    #[tokio::test]
    async fn stop_swallows_failures() {
        let profile = profile(&["true"], &["false"]);
        // Must not panic or propagate.
        AppServer::new(&profile).stop().await;
    }

    #[tokio::test]
    async fn empty_command_is_an_error() {
        let profile = profile(&[], &[]);
        assert!(AppServer::new(&profile).start().await.is_err());
    }
}
