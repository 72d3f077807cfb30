//! Durable storage for the registry snapshot.
//!
//! `load` never fails: a missing file is a fresh start, and an unreadable or
//! unusable file is moved aside to `<file>.corrupt` before starting empty.
//! `save` writes `<file>.tmp`, fsyncs it, then renames it over the target so
//! a crash mid-write leaves the previous snapshot intact.

pub mod migration;

use crate::errors::PersistenceError;
use crate::registry::model::{RegistrySnapshot, CURRENT_SCHEMA_VERSION};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Result of loading durable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub snapshot: RegistrySnapshot,
    /// The stored blob used an older schema and should be re-saved.
    pub migrated: bool,
}

impl LoadOutcome {
    fn empty() -> Self {
        Self {
            snapshot: RegistrySnapshot::default(),
            migrated: false,
        }
    }
}

/// Sole reader and writer of the durable state file.
#[derive(Debug, Clone)]
pub struct PersistenceManager {
    path: PathBuf,
}

impl PersistenceManager {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and migrate the stored snapshot.
    #[must_use]
    pub fn load(&self) -> LoadOutcome {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    target: "notifier.persistence",
                    path = %self.path.display(),
                    "No stored state, starting empty"
                );
                return LoadOutcome::empty();
            }
            Err(e) => {
                error!(
                    target: "notifier.persistence",
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read stored state, starting empty"
                );
                return LoadOutcome::empty();
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    target: "notifier.persistence",
                    path = %self.path.display(),
                    error = %e,
                    "Stored state is not valid JSON"
                );
                self.quarantine();
                return LoadOutcome::empty();
            }
        };

        let migrated = match migration::migrate(value) {
            Ok(migrated) => migrated,
            Err(e) => {
                warn!(
                    target: "notifier.persistence",
                    path = %self.path.display(),
                    error = %e,
                    "Stored state cannot be migrated"
                );
                self.quarantine();
                return LoadOutcome::empty();
            }
        };

        for fragment in &migrated.unrecognized {
            warn!(
                target: "notifier.persistence",
                fragment = %fragment,
                "Dropping unrecognized stored fragment"
            );
        }

        let was_migrated = migrated.was_migrated();
        let from_version = migrated.from_version;

        match serde_json::from_value::<RegistrySnapshot>(migrated.value) {
            Ok(mut snapshot) => {
                snapshot.version = CURRENT_SCHEMA_VERSION;
                info!(
                    target: "notifier.persistence",
                    rooms = snapshot.room_info.len(),
                    subscriptions = snapshot.subscription_count(),
                    from_version,
                    migrated = was_migrated,
                    "Loaded stored state"
                );
                LoadOutcome {
                    snapshot,
                    migrated: was_migrated,
                }
            }
            Err(e) => {
                warn!(
                    target: "notifier.persistence",
                    path = %self.path.display(),
                    error = %e,
                    "Stored state does not match the schema"
                );
                self.quarantine();
                LoadOutcome::empty()
            }
        }
    }

    /// Atomically replace the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if encoding or any filesystem step fails;
    /// the previous file is left untouched in that case.
    pub fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), PersistenceError> {
        let encoded = serde_json::to_vec_pretty(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| PersistenceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = self.sibling("tmp");
        let result = write_synced(&tmp, &encoded).and_then(|()| {
            fs::rename(&tmp, &self.path).map_err(|source| PersistenceError::Io {
                path: self.path.clone(),
                source,
            })
        });

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    /// Move an unusable file aside so it is kept for inspection.
    fn quarantine(&self) {
        let backup = self.sibling("corrupt");
        match fs::rename(&self.path, &backup) {
            Ok(()) => warn!(
                target: "notifier.persistence",
                backup = %backup.display(),
                "Moved unusable state aside, starting empty"
            ),
            Err(e) => error!(
                target: "notifier.persistence",
                path = %self.path.display(),
                error = %e,
                "Failed to move unusable state aside, starting empty"
            ),
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| OsString::from("state"), ToOwned::to_owned);
        name.push(".");
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs::File::create(path).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)
}
