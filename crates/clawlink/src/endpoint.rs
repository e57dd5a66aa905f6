//! Gateway endpoint resolution.

use url::{Host, Url};

use crate::error::{GatewayError, Result};

const INSECURE_PREFIX: &str = "ws://";
const SECURE_PREFIX: &str = "wss://";

/// A parsed gateway endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Whether the transport is TLS-encrypted (`wss://`).
    pub secure: bool,
    /// Host name or address, without IPv6 brackets.
    pub host: String,
    /// TCP port, defaulted from the scheme when absent.
    pub port: u16,
    /// Path including any query string; at least `/`.
    pub path: String,
}

impl Endpoint {
    /// Parse a gateway URL.
    ///
    /// Only the literal `ws://` and `wss://` prefixes are accepted. IPv6 hosts
    /// must be bracketed. The port defaults to 80/443 and the path to `/`.
    /// Numeric hosts follow WHATWG IPv4 parsing, so `ws://123` resolves to
    /// `0.0.0.123`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidUrl`] on a missing scheme, empty host,
    /// userinfo, a `#fragment`, or a non-numeric or out-of-range port.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let secure = if raw.starts_with(SECURE_PREFIX) {
            true
        } else if raw.starts_with(INSECURE_PREFIX) {
            false
        } else {
            return Err(GatewayError::InvalidUrl(
                "url must start with ws:// or wss://".to_string(),
            ));
        };

        let url = Url::parse(raw).map_err(|e| GatewayError::InvalidUrl(format!("{raw}: {e}")))?;

        if url.fragment().is_some() {
            return Err(GatewayError::InvalidUrl(
                "fragments are not allowed in the url".to_string(),
            ));
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(GatewayError::InvalidUrl(
                "credentials in the url are not supported".to_string(),
            ));
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(GatewayError::InvalidUrl("empty host".to_string())),
        };

        let port = url
            .port_or_known_default()
            .unwrap_or(if secure { 443 } else { 80 });
        if port == 0 {
            return Err(GatewayError::InvalidUrl("port 0 is not allowed".to_string()));
        }

        let mut path = url.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            secure,
            host,
            port,
            path,
        })
    }

    /// Scheme string for this endpoint.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        if self.secure { "wss" } else { "ws" }
    }

    /// Host formatted for an authority component (IPv6 re-bracketed).
    #[must_use]
    pub fn authority_host(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }

    /// Canonical URL with an explicit port.
    #[must_use]
    pub fn to_url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme(),
            self.authority_host(),
            self.port,
            self.path
        )
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_url())
    }
}
