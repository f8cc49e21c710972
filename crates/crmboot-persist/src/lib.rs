//! crmboot-persist — application state across container recreation.
//!
//! A declared set of live paths is copied verbatim into a durable volume
//! after a successful first-run initialization (`persist`), and copied
//! back in lieu of re-running initialization on later starts (`restore`).
//! A marker file keyed by application name records that initialization
//! completed; the orchestrator branches on it.
//!
//! Both operations are safe against an empty or missing durable store:
//! `restore` skips entries with nothing persisted, and `persist` creates
//! the store from scratch.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        source: std::io::Error,
    },

    #[error("walking {path}: {source}")]
    Walk {
        path: String,
        source: walkdir::Error,
    },

    #[error("path {0} has no file name to key storage by")]
    Unkeyable(String),
}

pub type Result<T> = std::result::Result<T, Error>;

fn io_err(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        op,
        path: path.display().to_string(),
        source,
    }
}

// ── Path specs ───────────────────────────────────────────────────────

/// One live path that must survive container recreation.
#[derive(Debug, Clone)]
pub struct PathSpec {
    /// Absolute live filesystem location.
    pub live: PathBuf,
    /// Subdirectory name inside the app's volume directory.
    pub key: String,
}

impl PathSpec {
    /// Key storage by the path's file name.
    pub fn new(live: impl Into<PathBuf>) -> Result<Self> {
        let live = live.into();
        let key = live
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Unkeyable(live.display().to_string()))?;
        Ok(Self { live, key })
    }

    /// Key storage explicitly, for specs whose file names collide.
    pub fn with_key(live: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            live: live.into(),
            key: key.into(),
        }
    }
}

// ── Store ────────────────────────────────────────────────────────────

/// Durable storage rooted at a volume mount.
#[derive(Debug, Clone)]
pub struct PersistenceStore {
    volume_root: PathBuf,
}

impl PersistenceStore {
    pub fn new(volume_root: impl Into<PathBuf>) -> Self {
        Self {
            volume_root: volume_root.into(),
        }
    }

    fn app_dir(&self, app: &str) -> PathBuf {
        self.volume_root.join(app)
    }

    fn marker_path(&self, app: &str) -> PathBuf {
        self.app_dir(app).join(".initialized")
    }

    /// Whether first-run initialization already completed.
    pub fn is_initialized(&self, app: &str) -> bool {
        self.marker_path(app).is_file()
    }

    /// Record that first-run initialization completed.
    pub fn mark_initialized(&self, app: &str) -> Result<()> {
        let marker = self.marker_path(app);
        if let Some(parent) = marker.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err("creating", parent, e))?;
        }
        std::fs::write(&marker, b"").map_err(|e| io_err("writing", &marker, e))?;
        debug!(app, marker = %marker.display(), "initialization marker written");
        Ok(())
    }

    /// Copy each live path into durable storage.
    ///
    /// Stale store contents for a spec are replaced wholesale so that a
    /// later restore reproduces the live tree exactly.
    pub fn persist(&self, app: &str, paths: &[PathSpec]) -> Result<()> {
        for spec in paths {
            let target = self.app_dir(app).join(&spec.key);
            if !spec.live.exists() {
                warn!(path = %spec.live.display(), "nothing to persist at declared path");
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_err("creating", parent, e))?;
            }
            remove_if_present(&target)?;
            copy_recursive(&spec.live, &target)?;
            debug!(from = %spec.live.display(), to = %target.display(), "persisted");
        }
        info!(app, count = paths.len(), "application state persisted");
        Ok(())
    }

    /// Copy durable storage back to the live locations.
    ///
    /// The marker is not touched — persisted data is itself the evidence
    /// that initialization happened. Specs with nothing in the store are
    /// skipped.
    pub fn restore(&self, app: &str, paths: &[PathSpec]) -> Result<()> {
        for spec in paths {
            let source = self.app_dir(app).join(&spec.key);
            if !source.exists() {
                debug!(key = %spec.key, "nothing persisted, skipping");
                continue;
            }
            if let Some(parent) = spec.live.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_err("creating", parent, e))?;
            }
            remove_if_present(&spec.live)?;
            copy_recursive(&source, &spec.live)?;
            debug!(from = %source.display(), to = %spec.live.display(), "restored");
        }
        info!(app, count = paths.len(), "application state restored");
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            std::fs::remove_dir_all(path).map_err(|e| io_err("removing", path, e))
        }
        Ok(_) => std::fs::remove_file(path).map_err(|e| io_err("removing", path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err("inspecting", path, e)),
    }
}

/// Recursive copy preserving file permissions and symlinks.
fn copy_recursive(src: &Path, dst: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(src).map_err(|e| io_err("inspecting", src, e))?;
    if !meta.is_dir() {
        return copy_entry(src, dst, &meta);
    }

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| Error::Walk {
            path: src.display().to_string(),
            source: e,
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .unwrap_or_else(|_| Path::new(""));
        let target = dst.join(rel);
        let meta = entry
            .metadata()
            .map_err(|e| Error::Walk {
                path: entry.path().display().to_string(),
                source: e,
            })?;
        if meta.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| io_err("creating", &target, e))?;
            std::fs::set_permissions(&target, meta.permissions())
                .map_err(|e| io_err("chmod", &target, e))?;
        } else {
            copy_entry(entry.path(), &target, &meta)?;
        }
    }
    Ok(())
}

fn copy_entry(src: &Path, dst: &Path, meta: &std::fs::Metadata) -> Result<()> {
    if meta.file_type().is_symlink() {
        let link = std::fs::read_link(src).map_err(|e| io_err("reading link", src, e))?;
        std::os::unix::fs::symlink(&link, dst).map_err(|e| io_err("linking", dst, e))?;
    } else {
        // fs::copy carries permission bits along with the contents.
        std::fs::copy(src, dst).map_err(|e| io_err("copying", src, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn marker_lifecycle() {
        let volume = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(volume.path());

        assert!(!store.is_initialized("suitecrm"));
        store.mark_initialized("suitecrm").unwrap();
        assert!(store.is_initialized("suitecrm"));
        // Marker is per-application.
        assert!(!store.is_initialized("other-app"));
    }

    #[test]
    fn persist_then_restore_round_trips() {
        let volume = tempfile::tempdir().unwrap();
        let live = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(volume.path());

        let app_root = live.path().join("htdocs");
        write(&app_root.join("config.php"), "<?php $sugar_config = array();");
        write(&app_root.join("custom/modules/widget.php"), "widget");
        write(&app_root.join("upload/attachment.bin"), "binary-ish");

        let paths = [PathSpec::new(&app_root).unwrap()];
        store.persist("suitecrm", &paths).unwrap();

        // Wreck the live tree, then restore.
        fs::remove_dir_all(&app_root).unwrap();
        store.restore("suitecrm", &paths).unwrap();

        assert_eq!(
            read(&app_root.join("config.php")),
            "<?php $sugar_config = array();",
        );
        assert_eq!(read(&app_root.join("custom/modules/widget.php")), "widget");
        assert_eq!(read(&app_root.join("upload/attachment.bin")), "binary-ish");
    }

    #[test]
    fn single_file_persists_into_an_empty_store() {
        let volume = tempfile::tempdir().unwrap();
        let live = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(volume.path());

        // No app directory exists in the volume yet.
        let conf = live.path().join("config.php");
        write(&conf, "contents");
        store
            .persist("suitecrm", &[PathSpec::new(&conf).unwrap()])
            .unwrap();

        assert_eq!(read(&volume.path().join("suitecrm/config.php")), "contents");
    }

    #[test]
    fn restore_replaces_local_drift() {
        let volume = tempfile::tempdir().unwrap();
        let live = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(volume.path());

        let conf = live.path().join("config.php");
        write(&conf, "persisted");
        let paths = [PathSpec::new(&conf).unwrap()];
        store.persist("suitecrm", &paths).unwrap();

        write(&conf, "drifted");
        store.restore("suitecrm", &paths).unwrap();
        assert_eq!(read(&conf), "persisted");
    }

    #[test]
    fn restore_from_an_empty_store_is_a_no_op() {
        let volume = tempfile::tempdir().unwrap();
        let live = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(volume.path());

        let conf = live.path().join("config.php");
        write(&conf, "untouched");
        store
            .restore("suitecrm", &[PathSpec::new(&conf).unwrap()])
            .unwrap();
        assert_eq!(read(&conf), "untouched");
    }

    #[test]
    fn persist_skips_missing_live_paths() {
        let volume = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(volume.path());

        let spec = PathSpec::with_key("/nonexistent/htdocs", "htdocs");
        store.persist("suitecrm", &[spec]).unwrap();
        assert!(!volume.path().join("suitecrm/htdocs").exists());
    }

    #[test]
    fn symlinks_survive_the_round_trip() {
        let volume = tempfile::tempdir().unwrap();
        let live = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(volume.path());

        let root = live.path().join("htdocs");
        write(&root.join("real.php"), "real");
        std::os::unix::fs::symlink("real.php", root.join("alias.php")).unwrap();

        let paths = [PathSpec::new(&root).unwrap()];
        store.persist("suitecrm", &paths).unwrap();
        fs::remove_dir_all(&root).unwrap();
        store.restore("suitecrm", &paths).unwrap();

        let link = fs::read_link(root.join("alias.php")).unwrap();
        assert_eq!(link, Path::new("real.php"));
    }
}
