//! Who is on the other end of a request: client address, user agent, cookies.

use sha2::{Digest, Sha256};

/// Session-token cookie name.
pub const SESSION_COOKIE: &str = "ado-ident";

/// Present when the browser holds a "remember me" credential.
pub const REMEMBER_COOKIE: &str = "remember_web";

/// Request facts the session and comment services need, extracted by the
/// HTTP adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Decrypted value of [`SESSION_COOKIE`].
    pub token: Option<String>,
    /// Whether [`REMEMBER_COOKIE`] was sent.
    pub has_remember_cookie: bool,
}

impl RequestContext {
    /// Salted SHA-256 of address and user agent, stored alongside comments.
    pub fn identity_hash(&self, salt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(self.ip_address.as_deref().unwrap_or_default().as_bytes());
        hasher.update(self.user_agent.as_deref().unwrap_or_default().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Picks the client address: `Cf-Connecting-Ip`, then the first
/// `X-Forwarded-For` entry, then the socket peer.
pub fn resolve_client_ip(
    cf_connecting_ip: Option<&str>,
    x_forwarded_for: Option<&str>,
    peer: Option<&str>,
) -> Option<String> {
    let forwarded = x_forwarded_for.and_then(|v| v.split(',').next());
    [cf_connecting_ip, forwarded, peer]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}
