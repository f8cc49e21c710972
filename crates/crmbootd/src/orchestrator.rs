//! The bootstrap state machine.
//!
//! ```text
//!           marker absent                   marker present
//! Fresh ──► Initializing ──► Ready    Restoring ──► Ready
//!                 │                        │
//!                 └────────► Failed ◄──────┘
//! ```
//!
//! Validation always runs first and aborts before the database or the
//! filesystem is touched. `Initializing` branches on the skip-wizard
//! flag: either the HTTP install wizard runs against a temporarily
//! started web server, or the configuration is rebuilt offline from a
//! minimal seed. `Restoring` copies persisted state back and trusts the
//! restored config file — not the environment — for the database
//! endpoint. A failed initialization exits non-zero without rolling back
//! partial state; the operator recovers the volume manually.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use anyhow::{Context, bail};
use tracing::{info, warn};

use crmboot_confdoc::ConfDoc;
use crmboot_db::{DbEndpoint, wait_for_database};
use crmboot_persist::PersistenceStore;
use crmboot_repair::ConfigRepairer;
use crmboot_settings::{DbSettings, Settings};
use crmboot_wizard::{InstallWizard, WizardClient};

use crate::cron;
use crate::profile::{BootProfile, Owner};
use crate::server::AppServer;

/// Which way the boot goes, decided solely by the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPath {
    Fresh,
    Restore,
}

/// Marker present means a completed first run persisted its state.
pub fn choose_path(store: &PersistenceStore, app: &str) -> BootPath {
    if store.is_initialized(app) {
        BootPath::Restore
    } else {
        BootPath::Fresh
    }
}

pub struct Orchestrator {
    profile: BootProfile,
    settings: Settings,
}

impl Orchestrator {
    pub fn new(profile: BootProfile, settings: Settings) -> Self {
        Self { profile, settings }
    }

    /// Drive the state machine to `Ready`, or fail.
    pub async fn run(&self) -> anyhow::Result<()> {
        let violations = self.profile.validate(&self.settings);
        if !violations.is_empty() {
            bail!("aborting: {} validation error(s)", violations.len());
        }

        let store = PersistenceStore::new(&self.profile.volume_root);
        match choose_path(&store, &self.profile.app_name) {
            BootPath::Restore => {
                info!(app = %self.profile.app_name, "persisted state found, restoring");
                self.restore(&store).await?;
            }
            BootPath::Fresh => {
                info!(app = %self.profile.app_name, "no persisted state, initializing");
                self.initialize(&store).await?;
            }
        }

        // Ready. Cron is best-effort and never fails the boot.
        self.register_cron();
        Ok(())
    }

    // ── Restore path ─────────────────────────────────────────────────

    async fn restore(&self, store: &PersistenceStore) -> anyhow::Result<()> {
        let specs = self.profile.persist_specs()?;
        store.restore(&self.profile.app_name, &specs)?;

        let db = self
            .read_restored_endpoint()
            .context("reading database endpoint from restored config")?;
        wait_for_database(&DbEndpoint::from(&db), &self.profile.retry_policy()).await?;
        Ok(())
    }

    /// The restored config file is authoritative for the database
    /// endpoint; freshly supplied environment values are ignored here.
    fn read_restored_endpoint(&self) -> anyhow::Result<DbSettings> {
        let doc = ConfDoc::load(&self.profile.config_path())?;
        Ok(crmboot_confdoc::db_settings(&doc)?)
    }

    // ── Fresh path ───────────────────────────────────────────────────

    async fn initialize(&self, store: &PersistenceStore) -> anyhow::Result<()> {
        self.prepare_directories()?;

        if self.settings.skip_wizard() {
            info!("skip-wizard flag set, rebuilding config offline");
            self.initialize_offline().await?;
        } else {
            self.initialize_with_wizard().await?;
        }

        self.commit(store)
    }

    /// Persist first, then record the marker. A crash between the two
    /// leaves the marker absent, so the next boot re-initializes instead
    /// of restoring from a half-written store.
    fn commit(&self, store: &PersistenceStore) -> anyhow::Result<()> {
        store.persist(&self.profile.app_name, &self.profile.persist_specs()?)?;
        store.mark_initialized(&self.profile.app_name)?;
        Ok(())
    }

    fn prepare_directories(&self) -> anyhow::Result<()> {
        for dir in [
            self.profile.web_root.clone(),
            self.profile.volume_root.join(&self.profile.app_name),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating {}", dir.display()))?;
            apply_owner(&dir, self.profile.owner)?;
        }
        Ok(())
    }

    async fn initialize_with_wizard(&self) -> anyhow::Result<()> {
        wait_for_database(
            &DbEndpoint::from(&self.settings.db),
            &self.profile.retry_policy(),
        )
        .await?;

        // The wizard reads its parameters from the seed file on disk.
        let seed_path = self.profile.seed_path();
        crmboot_confdoc::seed_silent_install(&self.settings).store(&seed_path)?;
        apply_owner(&seed_path, self.profile.owner)?;

        let server = AppServer::new(&self.profile.server);
        server.start().await?;
        let result = self.drive_wizard().await;
        server.stop().await;

        // The seed holds credentials; never leave it behind.
        if let Err(e) = std::fs::remove_file(&seed_path) {
            warn!(path = %seed_path.display(), error = %e, "could not remove seed config");
        }
        result
    }

    async fn drive_wizard(&self) -> anyhow::Result<()> {
        let client = WizardClient::new(&self.profile.base_url);
        let mut wizard = InstallWizard::new(client, self.profile.wizard_policy());
        wizard.open_session().await?;
        wizard.run_silent_install().await?;
        if self.settings.smtp_configured() {
            wizard.configure_smtp(&self.settings.smtp).await?;
        }
        Ok(())
    }

    async fn initialize_offline(&self) -> anyhow::Result<()> {
        wait_for_database(
            &DbEndpoint::from(&self.settings.db),
            &self.profile.retry_policy(),
        )
        .await?;

        let config_path = self.profile.config_path();
        crmboot_confdoc::seed_runtime_config(&self.settings).store(&config_path)?;
        apply_owner(&config_path, self.profile.owner)?;

        ConfigRepairer::new(&self.profile.php_bin, &self.profile.web_root)
            .rebuild_all()
            .await?;
        Ok(())
    }

    // ── Ready ────────────────────────────────────────────────────────

    fn register_cron(&self) {
        if self.profile.cron.command.is_empty() {
            return;
        }
        if !cron::running_as_root() {
            warn!("not running as root, skipping cron registration");
            return;
        }
        if let Err(e) = cron::register(&self.profile.cron, &self.profile.app_name) {
            warn!(error = %e, "cron registration failed");
        }
    }
}

/// Chown a path when an owner is configured and we are privileged
/// enough to do it. Unprivileged runs keep whatever ownership the
/// filesystem gives them.
fn apply_owner(path: &Path, owner: Option<Owner>) -> anyhow::Result<()> {
    let Some(owner) = owner else {
        return Ok(());
    };
    if !cron::running_as_root() {
        warn!(path = %path.display(), "not running as root, keeping current ownership");
        return Ok(());
    }
    let c_path = CString::new(path.as_os_str().as_bytes())
        .with_context(|| format!("path {} contains a NUL byte", path.display()))?;
    let rc = unsafe { libc::chown(c_path.as_ptr(), owner.uid, owner.gid) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("chown {}", path.display()));
    }
    Ok(())
}
