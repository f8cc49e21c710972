//! Deployment profile (`crmboot.toml`).
//!
//! Operator *settings* (credentials, hosts, flags) come from the
//! environment; the *profile* describes the image itself — where the
//! application lives, what to persist, how to start the bundled web
//! server. Images bake a profile in; the compiled-in defaults match the
//! standard layout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crmboot_db::RetryPolicy;
use crmboot_persist::PathSpec;
use crmboot_settings::{EnvCheck, Settings, Violation};
use crmboot_wizard::WizardPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootProfile {
    /// Application identifier, keys the persisted state and the marker.
    pub app_name: String,
    /// Application document root.
    pub web_root: PathBuf,
    /// Durable volume mount.
    pub volume_root: PathBuf,
    /// PHP CLI binary for the config repairer.
    pub php_bin: PathBuf,
    /// Where the wizard reaches the application during bootstrap.
    pub base_url: String,
    /// Runtime config file name, relative to `web_root`.
    pub config_file: String,
    /// Transient silent-install seed file name, relative to `web_root`.
    pub seed_file: String,
    /// Paths to persist, relative to `web_root` (`.` = the whole root).
    pub persist_paths: Vec<String>,
    /// Owner for created/rendered files, when running as root.
    pub owner: Option<Owner>,
    pub server: ServerProfile,
    pub retry: RetryProfile,
    pub cron: CronProfile,
    pub wizard: WizardProfile,
}

impl Default for BootProfile {
    fn default() -> Self {
        Self {
            app_name: "suitecrm".into(),
            web_root: "/opt/suitecrm/htdocs".into(),
            volume_root: "/bitnami".into(),
            php_bin: "php".into(),
            base_url: "http://127.0.0.1".into(),
            config_file: "config.php".into(),
            seed_file: "config_si.php".into(),
            persist_paths: vec![".".into()],
            owner: None,
            server: ServerProfile::default(),
            retry: RetryProfile::default(),
            cron: CronProfile::default(),
            wizard: WizardProfile::default(),
        }
    }
}

/// Numeric owner for files the bootstrap creates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

/// Commands that start/stop the bundled web server during bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerProfile {
    pub start: Vec<String>,
    pub stop: Vec<String>,
    /// Seconds to wait for the server to accept requests after start.
    pub startup_grace_secs: u64,
}

impl Default for ServerProfile {
    fn default() -> Self {
        Self {
            start: vec!["apachectl".into(), "start".into()],
            stop: vec!["apachectl".into(), "stop".into()],
            startup_grace_secs: 5,
        }
    }
}

/// Database wait policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryProfile {
    pub max_attempts: u32,
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
    pub attempt_timeout_secs: u64,
}

impl Default for RetryProfile {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_secs: policy.initial_delay.as_secs(),
            max_delay_secs: policy.max_delay.as_secs(),
            attempt_timeout_secs: policy.attempt_timeout.as_secs(),
        }
    }
}

/// Scheduled-task registration; skipped when `command` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CronProfile {
    pub schedule: String,
    pub user: String,
    pub command: String,
}

impl Default for CronProfile {
    fn default() -> Self {
        Self {
            schedule: "* * * * *".into(),
            user: "daemon".into(),
            command: "cd /opt/suitecrm/htdocs && php -f cron.php > /dev/null 2>&1".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WizardProfile {
    pub smtp_failure_fatal: bool,
}

// ── Derived values ───────────────────────────────────────────────────

impl BootProfile {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let profile: BootProfile = toml::from_str(&content)?;
        Ok(profile)
    }

    /// Absolute path of the runtime config file.
    pub fn config_path(&self) -> PathBuf {
        self.web_root.join(&self.config_file)
    }

    /// Absolute path of the transient seed file.
    pub fn seed_path(&self) -> PathBuf {
        self.web_root.join(&self.seed_file)
    }

    /// Persisted path specs resolved against the web root.
    pub fn persist_specs(&self) -> crmboot_persist::Result<Vec<PathSpec>> {
        self.persist_paths
            .iter()
            .map(|rel| {
                let live = if rel == "." {
                    self.web_root.clone()
                } else {
                    self.web_root.join(rel)
                };
                PathSpec::new(live)
            })
            .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_secs(self.retry.initial_delay_secs),
            max_delay: Duration::from_secs(self.retry.max_delay_secs),
            attempt_timeout: Duration::from_secs(self.retry.attempt_timeout_secs),
        }
    }

    pub fn wizard_policy(&self) -> WizardPolicy {
        WizardPolicy {
            smtp_failure_fatal: self.wizard.smtp_failure_fatal,
        }
    }

    /// Validate settings together with this image's infrastructure checks.
    pub fn validate(&self, settings: &Settings) -> Vec<Violation> {
        let web_root_check = WebRootCheck {
            web_root: self.web_root.clone(),
        };
        crmboot_settings::validate(settings, &[&web_root_check])
    }
}

/// The document root must exist before anything touches it.
struct WebRootCheck {
    web_root: PathBuf,
}

impl EnvCheck for WebRootCheck {
    fn name(&self) -> &str {
        "web-root"
    }

    fn check(&self) -> Result<(), String> {
        if self.web_root.is_dir() {
            Ok(())
        } else {
            Err(format!(
                "application web root {} does not exist",
                self.web_root.display(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_standard_layout() {
        let profile = BootProfile::default();
        assert_eq!(profile.config_path(), PathBuf::from("/opt/suitecrm/htdocs/config.php"));
        assert_eq!(profile.seed_path(), PathBuf::from("/opt/suitecrm/htdocs/config_si.php"));

        let specs = profile.persist_specs().unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].live, PathBuf::from("/opt/suitecrm/htdocs"));
        assert_eq!(specs[0].key, "htdocs");
    }

    #[test]
    fn profile_parses_with_partial_overrides() {
        let source = r#"
app_name = "crm"
web_root = "/srv/crm"

[retry]
max_attempts = 3

[wizard]
smtp_failure_fatal = true
"#;
        let profile: BootProfile = toml::from_str(source).unwrap();
        assert_eq!(profile.app_name, "crm");
        assert_eq!(profile.retry.max_attempts, 3);
        // Untouched sections keep their defaults.
        assert_eq!(profile.server.start, ["apachectl", "start"]);
        assert!(profile.wizard_policy().smtp_failure_fatal);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<BootProfile>("not_a_field = 1").is_err());
    }

    #[test]
    fn relative_persist_paths_resolve_under_web_root() {
        let profile = BootProfile {
            persist_paths: vec!["custom".into(), "upload".into()],
            ..BootProfile::default()
        };
        let specs = profile.persist_specs().unwrap();
        assert_eq!(specs[0].live, PathBuf::from("/opt/suitecrm/htdocs/custom"));
        assert_eq!(specs[1].key, "upload");
    }
}
