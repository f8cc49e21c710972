//! Best-effort cron registration for the application's scheduled tasks.
//!
//! Registration writes a crontab fragment under `/etc/cron.d`, which
//! needs root. When the container runs unprivileged the orchestrator
//! skips this with a warning; the boot still succeeds either way.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use crate::profile::CronProfile;

const CRON_DIR: &str = "/etc/cron.d";

/// Whether the process can write system crontab fragments.
pub fn running_as_root() -> bool {
    // geteuid never fails.
    unsafe { libc::geteuid() == 0 }
}

/// Render the crontab fragment for the application.
pub fn render_entry(cron: &CronProfile) -> String {
    format!(
        "SHELL=/bin/sh\n{} {} {}\n",
        cron.schedule, cron.user, cron.command,
    )
}

/// Write the fragment to `/etc/cron.d/<app_name>`.
pub fn register(cron: &CronProfile, app_name: &str) -> anyhow::Result<()> {
    register_in(cron, app_name, Path::new(CRON_DIR)).map(|_| ())
}

fn register_in(cron: &CronProfile, app_name: &str, dir: &Path) -> anyhow::Result<PathBuf> {
    let path = dir.join(app_name);
    let mut file = std::fs::File::create(&path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(render_entry(cron).as_bytes())
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), schedule = %cron.schedule, "cron entry registered");
    Ok(path)
}
