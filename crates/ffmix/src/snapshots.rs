//! Named snapshot persistence.
//!
//! A snapshot is an ordered list of (parameter, value) pairs covering the
//! persisted subset of the surface, serialized as JSON in the state
//! directory. One file per snapshot, written atomically (temp file then
//! rename). A distinguished `default` snapshot always exists and can never
//! be deleted; it is the reset target.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ffmix_proto::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// The reserved snapshot name. Created at startup, protected from delete.
pub const DEFAULT_SNAPSHOT: &str = "default";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot not found: {0}")]
    NotFound(String),

    #[error("the {DEFAULT_SNAPSHOT} snapshot cannot be deleted")]
    DefaultProtected,

    #[error("snapshot io failure on {path}: {source}")]
    Io {
        path: PathBuf,
        source: io::Error,
    },

    #[error("snapshot serialization failure on {path}: {source}")]
    Serde {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Ordered snapshot payload. Order matters: entries are applied in the
/// sequence they were captured (priority order at save time).
pub type SnapshotEntries = Vec<(String, Value)>;

/// Session settings persisted alongside the snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name of the last snapshot saved or loaded; used for autoload.
    pub last_state: String,
}

/// Filesystem-backed snapshot storage rooted at the state directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| SnapshotError::Io {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn settings_path(&self) -> PathBuf {
        self.dir.join("settings.json")
    }

    fn write_atomic<T: Serialize>(&self, path: &Path, payload: &T) -> Result<(), SnapshotError> {
        let json = serde_json::to_vec_pretty(payload).map_err(|e| SnapshotError::Serde {
            path: path.to_path_buf(),
            source: e,
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &json).map_err(|e| SnapshotError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, path).map_err(|e| SnapshotError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    /// Write a snapshot under `name`, replacing any existing one.
    pub fn save(&self, name: &str, entries: &SnapshotEntries) -> Result<(), SnapshotError> {
        let path = self.snapshot_path(name);
        self.write_atomic(&path, entries)?;
        debug!(snapshot = name, entries = entries.len(), "saved");
        Ok(())
    }

    /// Read a snapshot's entries in their saved order.
    pub fn load(&self, name: &str) -> Result<SnapshotEntries, SnapshotError> {
        let path = self.snapshot_path(name);
        let json = match fs::read(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SnapshotError::NotFound(name.to_string()))
            }
            Err(e) => return Err(SnapshotError::Io { path, source: e }),
        };
        serde_json::from_slice(&json).map_err(|e| SnapshotError::Serde { path, source: e })
    }

    /// Delete a snapshot. The default snapshot is protected.
    pub fn delete(&self, name: &str) -> Result<(), SnapshotError> {
        if name == DEFAULT_SNAPSHOT {
            return Err(SnapshotError::DefaultProtected);
        }
        let path = self.snapshot_path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(SnapshotError::NotFound(name.to_string()))
            }
            Err(e) => Err(SnapshotError::Io { path, source: e }),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.snapshot_path(name).exists()
    }

    /// All snapshot names, alpha-sorted. Recomputed after each save/delete.
    pub fn list(&self) -> Result<Vec<String>, SnapshotError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| SnapshotError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SnapshotError::Io {
                path: self.dir.clone(),
                source: e,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem == "settings" {
                continue;
            }
            names.push(stem.to_string());
        }
        names.sort();
        Ok(names)
    }

    pub fn load_settings(&self) -> Settings {
        let path = self.settings_path();
        fs::read(&path)
            .ok()
            .and_then(|json| serde_json::from_slice(&json).ok())
            .unwrap_or_default()
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), SnapshotError> {
        self.write_atomic(&self.settings_path(), settings)
    }
}
