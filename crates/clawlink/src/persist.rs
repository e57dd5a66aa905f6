//! Persistence of the device identity and gateway configuration.
//!
//! The engine only talks to the [`Persistence`] trait. [`JsonFilePersistence`]
//! keeps one JSON snapshot per record in a state directory;
//! [`MemoryPersistence`] is an in-process store with write-failure injection.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::identity::DeviceIdentity;

/// Key-value persistence collaborator.
pub trait Persistence {
    /// Load the stored device identity, if any.
    fn load_identity(&self) -> Option<DeviceIdentity>;

    /// Durably store the device identity.
    fn save_identity(&mut self, identity: &DeviceIdentity) -> Result<()>;

    /// Forget the stored device identity.
    fn clear_identity(&mut self) -> Result<()>;

    /// Load the stored gateway configuration, if any.
    fn load_config(&self) -> Option<GatewayConfig>;

    /// Store the gateway configuration.
    fn save_config(&mut self, config: &GatewayConfig) -> Result<()>;
}

/// A single JSON snapshot file.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// Store named `<name>.json` inside `dir`.
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            path: dir.join(format!("{name}.json")),
        }
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. Missing or corrupt files yield `None`.
    pub fn load<T: DeserializeOwned>(&self) -> Option<T> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read snapshot");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt snapshot");
                None
            }
        }
    }

    /// Write the snapshot atomically (temp file + rename).
    pub fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(value)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;

        // Owner-only: snapshots hold the device secret and shared credentials.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "snapshot written");
        Ok(())
    }

    /// Delete the snapshot. A missing file is not an error.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// File-backed persistence rooted at a state directory.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    identity: JsonStore,
    config: JsonStore,
}

impl JsonFilePersistence {
    /// Persist under `state_dir` (`identity.json`, `gateway.json`).
    pub fn new(state_dir: &Path) -> Self {
        Self {
            identity: JsonStore::new(state_dir, "identity"),
            config: JsonStore::new(state_dir, "gateway"),
        }
    }
}

fn persistence_failed(err: GatewayError) -> GatewayError {
    match err {
        GatewayError::PersistenceFailed(_) => err,
        other => GatewayError::PersistenceFailed(other.to_string()),
    }
}

impl Persistence for JsonFilePersistence {
    fn load_identity(&self) -> Option<DeviceIdentity> {
        self.identity
            .load::<DeviceIdentity>()
            .filter(DeviceIdentity::is_complete)
    }

    fn save_identity(&mut self, identity: &DeviceIdentity) -> Result<()> {
        self.identity.save(identity).map_err(persistence_failed)
    }

    fn clear_identity(&mut self) -> Result<()> {
        self.identity.remove().map_err(persistence_failed)
    }

    fn load_config(&self) -> Option<GatewayConfig> {
        self.config.load()
    }

    fn save_config(&mut self, config: &GatewayConfig) -> Result<()> {
        self.config.save(config).map_err(persistence_failed)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    identity: Option<DeviceIdentity>,
    config: Option<GatewayConfig>,
    fail_writes: bool,
    identity_writes: u32,
    config_writes: u32,
}

/// In-memory persistence. Clones share state, so a test can keep a handle
/// after moving one into the engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryPersistence {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with an identity.
    pub fn with_identity(identity: DeviceIdentity) -> Self {
        let store = Self::new();
        store.state().identity = Some(identity);
        store
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Currently stored identity.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.state().identity.clone()
    }

    /// Currently stored config.
    pub fn config(&self) -> Option<GatewayConfig> {
        self.state().config.clone()
    }

    /// Number of successful identity writes.
    pub fn identity_writes(&self) -> u32 {
        self.state().identity_writes
    }

    /// Number of successful config writes.
    pub fn config_writes(&self) -> u32 {
        self.state().config_writes
    }
}

impl Persistence for MemoryPersistence {
    fn load_identity(&self) -> Option<DeviceIdentity> {
        self.state().identity.clone()
    }

    fn save_identity(&mut self, identity: &DeviceIdentity) -> Result<()> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(GatewayError::PersistenceFailed(
                "identity write rejected".to_string(),
            ));
        }
        state.identity = Some(identity.clone());
        state.identity_writes += 1;
        Ok(())
    }

    fn clear_identity(&mut self) -> Result<()> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(GatewayError::PersistenceFailed(
                "identity clear rejected".to_string(),
            ));
        }
        state.identity = None;
        Ok(())
    }

    fn load_config(&self) -> Option<GatewayConfig> {
        self.state().config.clone()
    }

    fn save_config(&mut self, config: &GatewayConfig) -> Result<()> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(GatewayError::PersistenceFailed(
                "config write rejected".to_string(),
            ));
        }
        state.config = Some(config.clone());
        state.config_writes += 1;
        Ok(())
    }
}
