//! Device identity: a durable `(device_id, device_token)` pair.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::persist::Persistence;
use crate::signature::{random_token, sha256_hex};

const DEVICE_TOKEN_BYTES: usize = 32;

/// Identity of this device towards the gateway.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    /// Stable device identifier (hex SHA-256 of the secret it was created with).
    pub device_id: String,
    /// Device secret used to sign handshakes.
    pub device_token: String,
}

impl DeviceIdentity {
    /// Generate a fresh identity from OS randomness.
    #[must_use]
    pub fn generate() -> Self {
        let device_token = random_token(DEVICE_TOKEN_BYTES);
        let device_id = sha256_hex(device_token.as_bytes());
        Self {
            device_id,
            device_token,
        }
    }

    /// Both halves are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.device_id.is_empty() && !self.device_token.is_empty()
    }
}

impl std::fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("device_id", &self.device_id)
            .field("device_token", &"<redacted>")
            .finish()
    }
}

/// Holds the identity in memory and writes it through to persistence.
#[derive(Debug, Default)]
pub struct IdentityStore {
    current: Option<DeviceIdentity>,
}

impl IdentityStore {
    /// Restore whatever identity the persistence layer holds.
    pub fn restore<P: Persistence>(persist: &P) -> Self {
        let current = persist.load_identity().filter(DeviceIdentity::is_complete);
        if let Some(identity) = &current {
            debug!(device_id = %identity.device_id, "restored device identity");
        }
        Self { current }
    }

    /// Identity currently held, if any.
    #[must_use]
    pub fn current(&self) -> Option<&DeviceIdentity> {
        self.current.as_ref()
    }

    /// Return the identity, creating and persisting one on first use.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceFailed`](crate::error::GatewayError::PersistenceFailed) if a new identity could not
    /// be saved. The unsaved identity is discarded.
    pub fn ensure<P: Persistence>(&mut self, persist: &mut P) -> Result<DeviceIdentity> {
        if let Some(identity) = self.current.as_ref().filter(|id| id.is_complete()) {
            return Ok(identity.clone());
        }

        let identity = DeviceIdentity::generate();
        persist.save_identity(&identity)?;
        info!(device_id = %identity.device_id, "created device identity");
        self.current = Some(identity.clone());
        Ok(identity)
    }

    /// Forget the identity so the next [`ensure`](Self::ensure) creates a new one.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceFailed`](crate::error::GatewayError::PersistenceFailed) if the stored copy could not
    /// be removed. The in-memory copy is dropped regardless.
    pub fn clear<P: Persistence>(&mut self, persist: &mut P) -> Result<()> {
        self.current = None;
        persist.clear_identity()?;
        info!("device identity cleared");
        Ok(())
    }

    /// Adopt a device token issued by the gateway.
    ///
    /// Returns `Ok(false)` when the token is empty or unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceFailed`](crate::error::GatewayError::PersistenceFailed) if the updated identity
    /// could not be saved. The new token is still used for this session.
    pub fn adopt_issued_token<P: Persistence>(
        &mut self,
        token: &str,
        persist: &mut P,
    ) -> Result<bool> {
        let Some(identity) = self.current.as_mut() else {
            return Ok(false);
        };
        if token.is_empty() || identity.device_token == token {
            return Ok(false);
        }
        identity.device_token = token.to_string();
        let snapshot = identity.clone();
        info!(device_id = %snapshot.device_id, "adopted gateway-issued device token");
        persist.save_identity(&snapshot)?;
        Ok(true)
    }
}
