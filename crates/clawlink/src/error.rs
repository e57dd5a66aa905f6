//! Error types for clawlink.

use thiserror::Error;

/// Why the gateway rejected an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRejectReason {
    /// The signature did not verify.
    BadSignature,
    /// The signing timestamp was outside the accepted window.
    ExpiredTimestamp,
    /// The gateway does not know this device.
    UnknownDevice,
    /// Any other authentication failure, carrying the gateway's code.
    Other(String),
}

impl AuthRejectReason {
    /// Classify a gateway error code.
    ///
    /// Returns `None` when the code does not describe an authentication failure.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let upper = code.to_ascii_uppercase();
        match upper.as_str() {
            "AUTH_BAD_SIGNATURE" | "INVALID_SIGNATURE" | "BAD_SIGNATURE" => {
                Some(Self::BadSignature)
            }
            "AUTH_EXPIRED" | "SIGNATURE_EXPIRED" | "TIMESTAMP_EXPIRED" => {
                Some(Self::ExpiredTimestamp)
            }
            "UNKNOWN_DEVICE" | "DEVICE_NOT_FOUND" | "AUTH_UNKNOWN_DEVICE" => {
                Some(Self::UnknownDevice)
            }
            _ if upper.contains("AUTH")
                || upper.contains("UNAUTHORIZED")
                || upper.contains("FORBIDDEN") =>
            {
                Some(Self::Other(code.to_string()))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for AuthRejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadSignature => write!(f, "bad signature"),
            Self::ExpiredTimestamp => write!(f, "expired timestamp"),
            Self::UnknownDevice => write!(f, "unknown device"),
            Self::Other(code) => write!(f, "{code}"),
        }
    }
}

/// Errors that can occur in gateway link operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway URL is structurally invalid.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Configuration file problem.
    #[error("configuration error: {0}")]
    Config(String),

    /// No usable gateway URL is configured.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The persistence collaborator rejected a write.
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    /// Transport open/send/close failure or unexpected closure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The gateway rejected the handshake.
    #[error("auth rejected ({reason}): {message}")]
    AuthRejected {
        /// Classified reason.
        reason: AuthRejectReason,
        /// Gateway-provided message.
        message: String,
    },

    /// Malformed base64url input or size mismatch.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// A send was attempted before the handshake completed.
    #[error("gateway not ready")]
    NotReady,

    /// A response arrived for an id with no outstanding request.
    #[error("request not found: {0}")]
    RequestNotFound(String),

    /// A frame could not be decoded or the gateway refused a request.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<clawlink_proto::ProtoError> for GatewayError {
    fn from(err: clawlink_proto::ProtoError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Result alias for gateway link operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("AUTH_BAD_SIGNATURE", Some(AuthRejectReason::BadSignature))]
    #[test_case("invalid_signature", Some(AuthRejectReason::BadSignature))]
    #[test_case("SIGNATURE_EXPIRED", Some(AuthRejectReason::ExpiredTimestamp))]
    #[test_case("DEVICE_NOT_FOUND", Some(AuthRejectReason::UnknownDevice))]
    #[test_case("AUTH_TOKEN_MISMATCH", Some(AuthRejectReason::Other("AUTH_TOKEN_MISMATCH".to_string())))]
    #[test_case("401_UNAUTHORIZED", Some(AuthRejectReason::Other("401_UNAUTHORIZED".to_string())))]
    #[test_case("PROTOCOL_MISMATCH", None)]
    #[test_case("INVALID_REQUEST", None)]
    fn test_reject_reason_classification(code: &str, expected: Option<AuthRejectReason>) {
        assert_eq!(AuthRejectReason::from_code(code), expected);
    }

    #[test]
    fn test_auth_rejected_display() {
        let err = GatewayError::AuthRejected {
            reason: AuthRejectReason::UnknownDevice,
            message: "device not paired".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "auth rejected (unknown device): device not paired"
        );
    }

    #[test]
    fn test_not_ready_display() {
        assert_eq!(GatewayError::NotReady.to_string(), "gateway not ready");
    }

    #[test]
    fn test_invalid_url_display() {
        let err = GatewayError::InvalidUrl("missing scheme".to_string());
        assert_eq!(err.to_string(), "invalid url: missing scheme");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GatewayError = io_err.into();
        assert!(err.to_string().contains("io error"));
    }

    #[test]
    fn test_proto_error_conversion() {
        let err: GatewayError = clawlink_proto::ProtoError::MissingField("id").into();
        assert_eq!(err.to_string(), "protocol error: missing required field: id");
    }
}
