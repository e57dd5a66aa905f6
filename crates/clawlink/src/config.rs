//! Link configuration.
//!
//! - [`GatewayConfig`]: the runtime URL/credential set handed to
//!   [`GatewayEngine::configure`](crate::gateway::GatewayEngine::configure)
//! - [`EngineSettings`]: timing knobs and the client profile sent in the handshake
//! - [`LinkFileConfig`]: the on-disk JSON file read by the `clawlink` binary

use std::path::Path;
use std::time::Duration;

use clawlink_proto::AuthParams;
use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;
use crate::error::{GatewayError, Result};

/// Which shared credential the operator configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Shared gateway token.
    #[default]
    Token,
    /// Shared gateway password.
    Password,
}

/// A shared credential, selected by [`AuthMode`].
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Gateway token.
    Token(String),
    /// Gateway password.
    Password(String),
}

impl Credential {
    /// The secret used as the handshake signing key.
    #[must_use]
    pub fn secret(&self) -> &str {
        match self {
            Self::Token(s) | Self::Password(s) => s,
        }
    }

    /// The `auth` block of the connect params.
    #[must_use]
    pub fn to_auth_params(&self) -> AuthParams {
        match self {
            Self::Token(s) => AuthParams::token(s.clone()),
            Self::Password(s) => AuthParams::password(s.clone()),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Credential::Token(<redacted>)"),
            Self::Password(_) => f.write_str("Credential::Password(<redacted>)"),
        }
    }
}

/// Gateway URL and credentials.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    /// Gateway URL (`ws://` or `wss://`). Empty means "not configured".
    pub url: String,
    /// Which shared credential applies.
    pub auth_mode: AuthMode,
    /// Shared token, used when `auth_mode` is `token`.
    pub token: String,
    /// Shared password, used when `auth_mode` is `password`.
    pub password: String,
    /// Authenticate with the shared credential first instead of the device token.
    pub prefer_shared_credential: bool,
    /// Drop the stored device identity when this config is applied.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub reset_device_identity: bool,
}

impl GatewayConfig {
    /// Plain config for `url` with a shared token.
    pub fn with_token(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            ..Self::default()
        }
    }

    /// The active shared credential, if non-empty.
    #[must_use]
    pub fn shared_credential(&self) -> Option<Credential> {
        match self.auth_mode {
            AuthMode::Token if !self.token.is_empty() => Some(Credential::Token(self.token.clone())),
            AuthMode::Password if !self.password.is_empty() => {
                Some(Credential::Password(self.password.clone()))
            }
            _ => None,
        }
    }

    /// Whether a URL is set at all.
    #[must_use]
    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// Resolve the configured URL.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotConfigured`] when the URL is empty or invalid.
    pub fn endpoint(&self) -> Result<Endpoint> {
        if !self.has_url() {
            return Err(GatewayError::NotConfigured("gateway url is empty".to_string()));
        }
        Endpoint::parse(&self.url).map_err(|e| GatewayError::NotConfigured(e.to_string()))
    }

    /// True when switching from `self` to `other` invalidates an open session.
    #[must_use]
    pub fn materially_differs(&self, other: &Self) -> bool {
        self.url.trim() != other.url.trim()
            || self.auth_mode != other.auth_mode
            || self.token != other.token
            || self.password != other.password
            || self.prefer_shared_credential != other.prefer_shared_credential
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("url", &self.url)
            .field("auth_mode", &self.auth_mode)
            .field("token_set", &!self.token.is_empty())
            .field("password_set", &!self.password.is_empty())
            .field("prefer_shared_credential", &self.prefer_shared_credential)
            .field("reset_device_identity", &self.reset_device_identity)
            .finish()
    }
}

/// Client description sent in the `connect` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProfile {
    /// Client id.
    pub id: String,
    /// Human-readable device name.
    pub display_name: String,
    /// Client version.
    pub version: String,
    /// Platform string.
    pub platform: String,
    /// Client mode.
    pub mode: String,
    /// Requested role.
    pub role: String,
    /// Instance id, unique per process.
    pub instance_id: String,
    /// Advertised capabilities.
    pub caps: Vec<String>,
    /// Advertised invocation commands.
    pub commands: Vec<String>,
}

impl Default for ClientProfile {
    fn default() -> Self {
        Self {
            id: "clawlink".to_string(),
            display_name: "clawlink".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
            mode: "node".to_string(),
            role: "node".to_string(),
            instance_id: uuid::Uuid::new_v4().to_string(),
            caps: Vec::new(),
            commands: Vec::new(),
        }
    }
}

/// Engine timing knobs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Minimum spacing between connection attempts.
    pub retry_interval: Duration,
    /// Ceiling of the TLS-streak backoff.
    pub max_retry_interval: Duration,
    /// Streak value past which the backoff stops doubling.
    pub tls_streak_cap: u32,
    /// Telemetry period while ready.
    pub telemetry_interval: Duration,
    /// How long to wait for a `connect.challenge` before sending with a local nonce.
    pub challenge_wait: Duration,
    /// Handshake client profile.
    pub client: ClientProfile,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(4),
            max_retry_interval: Duration::from_secs(60),
            tls_streak_cap: 5,
            telemetry_interval: Duration::from_secs(30),
            challenge_wait: Duration::ZERO,
            client: ClientProfile::default(),
        }
    }
}

const fn default_retry_ms() -> u64 {
    4_000
}

const fn default_max_retry_ms() -> u64 {
    60_000
}

const fn default_telemetry_ms() -> u64 {
    30_000
}

/// Configuration file of the `clawlink` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkFileConfig {
    /// Gateway URL and credentials.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Display name; the host name is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Retry interval in milliseconds.
    #[serde(default = "default_retry_ms")]
    pub retry_interval_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_retry_ms")]
    pub max_retry_interval_ms: u64,
    /// Telemetry period in milliseconds.
    #[serde(default = "default_telemetry_ms")]
    pub telemetry_interval_ms: u64,
    /// Challenge wait in milliseconds.
    #[serde(default)]
    pub challenge_wait_ms: u64,
}

impl Default for LinkFileConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            display_name: None,
            retry_interval_ms: default_retry_ms(),
            max_retry_interval_ms: default_max_retry_ms(),
            telemetry_interval_ms: default_telemetry_ms(),
            challenge_wait_ms: 0,
        }
    }
}

impl LinkFileConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| GatewayError::Config(format!("invalid JSON: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.has_url() {
            Endpoint::parse(&self.gateway.url)
                .map_err(|e| GatewayError::Config(format!("gateway.url: {e}")))?;
        }

        if self.retry_interval_ms == 0 {
            return Err(GatewayError::Config(
                "retryIntervalMs must be greater than 0".to_string(),
            ));
        }

        if self.max_retry_interval_ms < self.retry_interval_ms {
            return Err(GatewayError::Config(
                "maxRetryIntervalMs must not be below retryIntervalMs".to_string(),
            ));
        }

        if self.telemetry_interval_ms == 0 {
            return Err(GatewayError::Config(
                "telemetryIntervalMs must be greater than 0".to_string(),
            ));
        }

        if let Some(name) = &self.display_name {
            if name.trim().is_empty() {
                return Err(GatewayError::Config(
                    "displayName cannot be blank".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Engine settings derived from this file.
    #[must_use]
    pub fn engine_settings(&self, client: ClientProfile) -> EngineSettings {
        EngineSettings {
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            max_retry_interval: Duration::from_millis(self.max_retry_interval_ms),
            telemetry_interval: Duration::from_millis(self.telemetry_interval_ms),
            challenge_wait: Duration::from_millis(self.challenge_wait_ms),
            client,
            ..EngineSettings::default()
        }
    }
}
