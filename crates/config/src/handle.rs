use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

use crate::loader::{self, ConfigError, LoadReport};
use crate::snapshot::ConfigSnapshot;

/// Owner of the active snapshot and the file it was loaded from.
///
/// Publishing goes through a watch channel: readers always see one complete
/// snapshot, old or new, never a mix of both.
#[derive(Debug)]
pub struct ConfigHandle {
    path: PathBuf,
    tx: watch::Sender<Arc<ConfigSnapshot>>,
}

impl ConfigHandle {
    /// Load `path`, first writing the bundled default config if the file
    /// does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, LoadReport), ConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            write_default(&path)?;
            tracing::info!(path = %path.display(), "wrote default config");
        }
        let (snapshot, report) = loader::load_file(&path)?;
        let (tx, _rx) = watch::channel(Arc::new(snapshot));
        tracing::info!(
            path = %path.display(),
            warnings = report.warnings.len(),
            "config loaded"
        );
        Ok((Self { path, tx }, report))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A reader for the periodic trigger, spawn listeners, or anything else
    /// that needs the active snapshot.
    pub fn reader(&self) -> ConfigReader {
        ConfigReader {
            rx: self.tx.subscribe(),
        }
    }

    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.tx.borrow().clone()
    }

    /// Re-read the file and publish the result as one step. On error the
    /// active snapshot is left untouched.
    pub fn reload(&self) -> Result<LoadReport, ConfigError> {
        let (snapshot, report) = loader::load_file(&self.path)?;
        self.publish(snapshot);
        tracing::info!(
            path = %self.path.display(),
            warnings = report.warnings.len(),
            "config reloaded"
        );
        Ok(report)
    }

    /// Replace the active snapshot wholesale.
    pub fn publish(&self, snapshot: ConfigSnapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }
}

fn write_default(path: &Path) -> Result<(), ConfigError> {
    let err = |source| ConfigError::WriteDefault {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(err)?;
    }
    std::fs::write(path, crate::DEFAULT_CONFIG).map_err(err)
}

/// Read side of the published snapshot. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ConfigReader {
    rx: watch::Receiver<Arc<ConfigSnapshot>>,
}

impl ConfigReader {
    /// A reader pinned to one snapshot that never changes.
    pub fn fixed(snapshot: ConfigSnapshot) -> Self {
        let (_tx, rx) = watch::channel(Arc::new(snapshot));
        Self { rx }
    }

    /// The snapshot to capture for one pass or one spawn check.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.rx.borrow().clone()
    }

    /// Wait for the next published snapshot. `None` once the owning
    /// [`ConfigHandle`] is gone and nothing new can arrive.
    pub async fn changed(&mut self) -> Option<Arc<ConfigSnapshot>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use popguard_common::EntityKind;
    use std::time::Duration;

    #[test]
    fn open_writes_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugins").join("config.yml");
        let (handle, report) = ConfigHandle::open(&path).unwrap();
        assert!(path.exists());
        assert!(report.is_clean());
        assert_eq!(handle.current().spawn_radius, 512.0);
    }

    #[test]
    fn reload_replaces_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "entity_limits:\n  zombie: 5\n").unwrap();
        let (handle, _) = ConfigHandle::open(&path).unwrap();
        let reader = handle.reader();
        let before = reader.current();

        std::fs::write(&path, "scan_interval: 9\nentity_limits:\n  zombie: 2\n").unwrap();
        handle.reload().unwrap();

        // A snapshot captured before the reload keeps its values.
        assert_eq!(before.limit_for(EntityKind::Zombie), Some(5));
        assert_eq!(before.scan_interval, Duration::from_secs(5));

        let after = reader.current();
        assert_eq!(after.limit_for(EntityKind::Zombie), Some(2));
        assert_eq!(after.scan_interval, Duration::from_secs(9));
    }

    #[test]
    fn failed_reload_keeps_active_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "spawn_radius: 100\n").unwrap();
        let (handle, _) = ConfigHandle::open(&path).unwrap();

        std::fs::write(&path, "spawn_radius: [broken").unwrap();
        assert!(handle.reload().is_err());
        assert_eq!(handle.current().spawn_radius, 100.0);
    }

    #[tokio::test]
    async fn reader_observes_published_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let (handle, _) = ConfigHandle::open(&path).unwrap();
        let mut reader = handle.reader();

        handle.publish(ConfigSnapshot {
            spawn_radius: 7.0,
            ..ConfigSnapshot::default()
        });
        let next = reader.changed().await.unwrap();
        assert_eq!(next.spawn_radius, 7.0);
    }

    #[tokio::test]
    async fn fixed_reader_never_changes() {
        let mut reader = ConfigReader::fixed(ConfigSnapshot::default());
        assert_eq!(reader.current().spawn_radius, 512.0);
        assert!(reader.changed().await.is_none());
    }
}
