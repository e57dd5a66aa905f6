//! Handshake payloads: the `connect` request, the server challenge and the
//! `hello-ok` acknowledgement.

use serde::{Deserialize, Serialize};

/// Protocol revision spoken by this client.
pub const PROTOCOL_VERSION: u32 = 3;

/// Params of the `connect` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Lowest accepted protocol revision.
    pub min_protocol: u32,
    /// Highest accepted protocol revision.
    pub max_protocol: u32,
    /// Client description.
    pub client: ClientInfo,
    /// Connection role, always `node` for devices.
    pub role: String,
    /// Advertised capability namespaces.
    #[serde(default)]
    pub caps: Vec<String>,
    /// Invocable commands.
    #[serde(default)]
    pub commands: Vec<String>,
    /// Shared credential, present only when the shared secret authenticates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthParams>,
    /// Signed device proof.
    pub device: DeviceAuth,
}

/// Client description sent in `connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Stable client software id.
    pub id: String,
    /// Human-readable device name.
    pub display_name: String,
    /// Client software version.
    pub version: String,
    /// Platform string, e.g. `linux aarch64`.
    pub platform: String,
    /// Client mode, `node` for devices.
    pub mode: String,
    /// Per-process instance id.
    pub instance_id: String,
}

/// Shared credential. Exactly one field is set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthParams {
    /// Shared token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Shared password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl AuthParams {
    /// Token-based shared credential.
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            password: None,
        }
    }

    /// Password-based shared credential.
    #[must_use]
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            token: None,
            password: Some(password.into()),
        }
    }
}

/// Device proof: an HMAC-SHA256 over `v1|nonce|signedAt`, base64url encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAuth {
    /// Device identifier.
    pub id: String,
    /// Nonce that was signed.
    pub nonce: String,
    /// Milliseconds since the Unix epoch at signing time.
    pub signed_at: u64,
    /// Base64url (unpadded) signature.
    pub signature: String,
}

/// Payload of the `connect.challenge` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectChallenge {
    /// Server-issued nonce.
    pub nonce: String,
    /// Server time in milliseconds since the Unix epoch.
    #[serde(default, alias = "tsMs")]
    pub ts: u64,
}

/// Success payload of the `connect` response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HelloOk {
    /// Payload discriminator, `hello-ok`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Negotiated protocol revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<u32>,
    /// Issued credentials, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<HelloAuth>,
}

/// Credentials issued by the gateway on a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloAuth {
    /// Device token to use for subsequent handshakes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
    /// Granted role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}
