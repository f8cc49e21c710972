//! crmbootd — container bootstrap daemon for the CRM application.
//!
//! On container start, decides whether the application needs first-time
//! setup or can resume from previously persisted state, drives whichever
//! path to completion, then execs the process supervisor.
//!
//! # Usage
//!
//! ```text
//! crmbootd run --profile /etc/crmboot.toml -- httpd -DFOREGROUND
//! crmbootd validate
//! crmbootd render-config
//! ```

mod cron;
mod orchestrator;
mod profile;
mod server;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use crmboot_settings::Settings;

use crate::orchestrator::Orchestrator;
use crate::profile::BootProfile;

#[derive(Parser)]
#[command(name = "crmbootd", about = "CRM container bootstrap daemon", version)]
struct Cli {
    /// Deployment profile (TOML). Compiled-in defaults when absent.
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bootstrap, then exec the supervisor command.
    Run {
        /// Supervisor command and arguments to exec after `Ready`.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        supervisor: Vec<String>,
    },
    /// Validate operator settings and exit.
    Validate,
    /// Print the silent-install seed document and exit.
    RenderConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crmbootd=debug,crmboot=debug".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let profile = match &cli.profile {
        Some(path) => BootProfile::from_file(path)
            .with_context(|| format!("loading profile {}", path.display()))?,
        None => BootProfile::default(),
    };

    // The single boundary where the ambient environment becomes Settings.
    let settings = Settings::from_env();

    match cli.command {
        Command::Validate => {
            let violations = profile.validate(&settings);
            if violations.is_empty() {
                info!("settings are valid");
                Ok(())
            } else {
                anyhow::bail!("{} validation error(s)", violations.len());
            }
        }
        Command::RenderConfig => {
            print!("{}", crmboot_confdoc::seed_silent_install(&settings).to_php());
            Ok(())
        }
        Command::Run { supervisor } => {
            let orchestrator = Orchestrator::new(profile, settings);
            if let Err(e) = orchestrator.run().await {
                error!(error = %e, "bootstrap failed");
                return Err(e);
            }
            info!("bootstrap complete, handing off to supervisor");
            exec_supervisor(supervisor)
        }
    }
}

/// Replace this process with the supervisor command.
///
/// An empty command means there is nothing to hand off to; exit cleanly
/// and let the container runtime decide what happens next.
fn exec_supervisor(supervisor: Vec<String>) -> anyhow::Result<()> {
    let Some((program, args)) = supervisor.split_first() else {
        return Ok(());
    };
    use std::os::unix::process::CommandExt;
    let err = std::process::Command::new(program).args(args).exec();
    // exec only returns on failure.
    Err(anyhow::Error::from(err)).with_context(|| format!("exec {program}"))
}
