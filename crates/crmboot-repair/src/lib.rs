//! crmboot-repair — rebuild the application's configuration in place.
//!
//! The skip-wizard path (and the resume-with-existing-database case)
//! never runs the HTTP installer. Instead, the application's own PHP
//! rebuild routines are driven through the PHP CLI against the minimal
//! seed config already on disk, producing the same complete
//! configuration and access-control files the wizard would have written.
//!
//! The rebuild routines are idempotent upstream: running them against an
//! already-complete configuration rewrites the same content. That
//! contract is exactly what makes this path safe to take on a container
//! that points at a previously-initialized database.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("spawning {php_bin}: {source}")]
    Spawn {
        php_bin: String,
        source: std::io::Error,
    },

    #[error("{routine} failed (exit {code:?}): {stderr}")]
    Rebuild {
        routine: &'static str,
        code: Option<i32>,
        stderr: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

// ── Repairer ─────────────────────────────────────────────────────────

/// Runs the application's config and ACL regeneration routines.
pub struct ConfigRepairer {
    php_bin: PathBuf,
    web_root: PathBuf,
}

impl ConfigRepairer {
    pub fn new(php_bin: impl Into<PathBuf>, web_root: impl Into<PathBuf>) -> Self {
        Self {
            php_bin: php_bin.into(),
            web_root: web_root.into(),
        }
    }

    /// Rebuild the full runtime configuration from the seed config.
    pub async fn rebuild_config(&self) -> Result<()> {
        info!(web_root = %self.web_root.display(), "rebuilding application config");
        self.run_php(
            "config rebuild",
            "define('sugarEntry', true);\
             require 'include/entryPoint.php';\
             require_once 'modules/Configurator/Configurator.php';\
             $configurator = new Configurator();\
             $configurator->loadConfig();\
             $configurator->saveConfig();",
        )
        .await
    }

    /// Regenerate access-control files.
    pub async fn rebuild_acl(&self) -> Result<()> {
        info!("rebuilding access-control files");
        self.run_php(
            "ACL rebuild",
            "define('sugarEntry', true);\
             require 'include/entryPoint.php';\
             require_once 'modules/ACLActions/ACLAction.php';\
             ACLAction::clearACLCache();\
             SugarACL::resetACLs();",
        )
        .await
    }

    /// Config rebuild followed by ACL rebuild.
    pub async fn rebuild_all(&self) -> Result<()> {
        self.rebuild_config().await?;
        self.rebuild_acl().await
    }

    async fn run_php(&self, routine: &'static str, script: &str) -> Result<()> {
        debug!(routine, php = %self.php_bin.display(), "invoking PHP CLI");
        let output = Command::new(&self.php_bin)
            .arg("-d")
            .arg("display_errors=stderr")
            .arg("-r")
            .arg(script)
            .current_dir(&self.web_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::Spawn {
                php_bin: self.php_bin.display().to_string(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(Error::Rebuild {
                routine,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        debug!(routine, "PHP routine completed");
        Ok(())
    }

    /// Where the repairer runs, for diagnostics.
    pub fn web_root(&self) -> &Path {
        &self.web_root
    }
}
