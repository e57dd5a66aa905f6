//! Per-connection handshake state and `connect` params.

use std::time::Duration;

use clawlink_proto::{ClientInfo, ConnectChallenge, ConnectParams, DeviceAuth, PROTOCOL_VERSION};

use crate::clock::MIN_VALID_UNIX_MS;
use crate::config::{ClientProfile, Credential};
use crate::identity::DeviceIdentity;
use crate::signature::sign_encoded;

/// State of one handshake. Dropped on success, failure or disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    /// Nonce that gets signed (local, or adopted from the gateway).
    pub nonce: String,
    /// Gateway time of the adopted challenge (0 = none seen).
    pub challenge_issued_at_ms: u64,
    /// Monotonic time the attempt was created.
    pub queued_at_ms: u64,
    /// The `connect` request is on the wire.
    pub request_sent: bool,
    /// Correlation id of the in-flight `connect` request.
    pub request_id: Option<String>,
    /// Signed with the device token rather than the shared credential.
    pub used_device_token: bool,
    /// A rejection of the device token may be retried with the shared credential.
    pub can_fallback_to_shared: bool,
    challenge_seen: bool,
}

impl ConnectAttempt {
    /// New attempt with a locally generated nonce.
    #[must_use]
    pub fn new(
        nonce: String,
        queued_at_ms: u64,
        used_device_token: bool,
        can_fallback_to_shared: bool,
    ) -> Self {
        Self {
            nonce,
            challenge_issued_at_ms: 0,
            queued_at_ms,
            request_sent: false,
            request_id: None,
            used_device_token,
            can_fallback_to_shared,
            challenge_seen: false,
        }
    }

    /// Whether a gateway challenge was adopted.
    #[must_use]
    pub fn challenge_seen(&self) -> bool {
        self.challenge_seen
    }

    /// Take over the gateway's nonce. Ignored once the request is sent.
    pub fn adopt_challenge(&mut self, challenge: &ConnectChallenge) -> bool {
        if self.request_sent || challenge.nonce.is_empty() {
            return false;
        }
        self.nonce.clone_from(&challenge.nonce);
        self.challenge_issued_at_ms = challenge.ts;
        self.challenge_seen = true;
        true
    }

    /// Whether the request should go out now.
    #[must_use]
    pub fn ready_to_send(&self, now_ms: u64, challenge_wait: Duration) -> bool {
        if self.request_sent {
            return false;
        }
        self.challenge_seen
            || challenge_wait.is_zero()
            || Duration::from_millis(now_ms.saturating_sub(self.queued_at_ms)) >= challenge_wait
    }

    /// Timestamp to sign.
    ///
    /// An unset wall clock is replaced by the challenge time plus the time
    /// elapsed since the attempt was queued.
    #[must_use]
    pub fn signed_at(&self, unix_ms: u64, now_ms: u64) -> u64 {
        if unix_ms < MIN_VALID_UNIX_MS && self.challenge_seen && self.challenge_issued_at_ms > 0 {
            return self
                .challenge_issued_at_ms
                .saturating_add(now_ms.saturating_sub(self.queued_at_ms));
        }
        unix_ms
    }

    /// Mark the request as sent under `request_id`.
    pub fn mark_sent(&mut self, request_id: String) {
        self.request_sent = true;
        self.request_id = Some(request_id);
    }

    /// Whether `id` answers this attempt's request.
    #[must_use]
    pub fn is_response_to(&self, id: &str) -> bool {
        self.request_id.as_deref() == Some(id)
    }

    /// Switch to the shared credential after a device-token rejection.
    ///
    /// Returns `false` if no fallback is available (already used, or the
    /// attempt did not use the device token).
    pub fn fall_back_to_shared(&mut self) -> bool {
        if !self.used_device_token || !self.can_fallback_to_shared {
            return false;
        }
        self.used_device_token = false;
        self.can_fallback_to_shared = false;
        self.request_sent = false;
        self.request_id = None;
        true
    }
}

/// Build the `connect` params for `attempt`.
///
/// With `shared` set the signature is keyed with the shared secret and the
/// credential is sent in `auth`; otherwise the device token keys it.
#[must_use]
pub fn build_connect_params(
    attempt: &ConnectAttempt,
    identity: &DeviceIdentity,
    shared: Option<&Credential>,
    profile: &ClientProfile,
    signed_at: u64,
) -> ConnectParams {
    let secret = shared.map_or(identity.device_token.as_str(), Credential::secret);
    let signature = sign_encoded(&attempt.nonce, signed_at, secret);

    ConnectParams {
        min_protocol: PROTOCOL_VERSION,
        max_protocol: PROTOCOL_VERSION,
        client: ClientInfo {
            id: profile.id.clone(),
            display_name: profile.display_name.clone(),
            version: profile.version.clone(),
            platform: profile.platform.clone(),
            mode: profile.mode.clone(),
            instance_id: profile.instance_id.clone(),
        },
        role: profile.role.clone(),
        caps: profile.caps.clone(),
        commands: profile.commands.clone(),
        auth: shared.map(Credential::to_auth_params),
        device: DeviceAuth {
            id: identity.device_id.clone(),
            nonce: attempt.nonce.clone(),
            signed_at,
            signature,
        },
    }
}
