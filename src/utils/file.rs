use std::path::{Path, PathBuf};

use chrono::Local;
use log::{debug, info};

use crate::error::{CuratorError, Result};
use crate::models::ProxySet;

/// Checks if a file exists at the given path
pub fn file_exists(path: &Path) -> bool {
    path.exists()
}

/// What a save call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Written { backup: Option<PathBuf> },
    /// The set was empty; the destination was left alone.
    NothingToSave,
}

/// Where curated proxy sets live.
pub trait ProxyStore {
    /// Load a stored set. `Ok(None)` means nothing is stored yet.
    fn load(&self) -> Result<Option<ProxySet>>;

    /// Copy the current contents aside before they are overwritten.
    fn backup(&self) -> Result<Option<PathBuf>>;

    fn write(&self, proxies: &ProxySet) -> Result<()>;

    /// Back up, then overwrite. Empty sets are never written.
    fn save(&self, proxies: &ProxySet) -> Result<SaveOutcome> {
        if proxies.is_empty() {
            info!("No valid data to save");
            return Ok(SaveOutcome::NothingToSave);
        }
        let backup = self.backup()?;
        self.write(proxies)?;
        Ok(SaveOutcome::Written { backup })
    }
}

/// A YAML `proxies:` document on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn label(&self) -> String {
        self.path.display().to_string()
    }

    /// Load a set that must exist.
    pub fn load_required(&self) -> Result<ProxySet> {
        self.load()?.ok_or_else(|| {
            CuratorError::io(
                self.label(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            )
        })
    }
}

impl ProxyStore for FileStore {
    fn load(&self) -> Result<Option<ProxySet>> {
        if !file_exists(&self.path) {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| CuratorError::io(self.label(), e))?;
        let proxies = ProxySet::from_yaml_str(&content, &self.label())?;
        debug!("Loaded {} proxies from {}", proxies.len(), self.label());
        Ok(Some(proxies))
    }

    fn backup(&self) -> Result<Option<PathBuf>> {
        if !file_exists(&self.path) {
            return Ok(None);
        }
        let backup = backup_path(&self.path, &Local::now().format("%Y%m%d%H%M%S").to_string());
        std::fs::copy(&self.path, &backup).map_err(|e| CuratorError::io(self.label(), e))?;
        info!("Backup created at {}", backup.display());
        Ok(Some(backup))
    }

    fn write(&self, proxies: &ProxySet) -> Result<()> {
        let content = proxies
            .to_yaml_string()
            .map_err(|e| CuratorError::yaml(self.label(), e))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CuratorError::io(self.label(), e))?;
        }
        std::fs::write(&self.path, content).map_err(|e| CuratorError::io(self.label(), e))?;
        info!("Configuration has been written to {}", self.label());
        Ok(())
    }
}

/// `<path>_<timestamp>.bcp`
pub fn backup_path(path: &Path, timestamp: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!("_{}.bcp", timestamp));
    PathBuf::from(name)
}
