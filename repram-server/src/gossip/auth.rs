//! Optional HMAC authentication for gossip and bootstrap messages (§4.2.7).
//!
//! When a cluster secret is configured, every gossip and bootstrap message
//! carries a keyed authenticator computed over the message's fields. With
//! no secret, the engine runs in open mode and accepts any syntactically
//! valid message — authenticating only one message class and not the other
//! would leave an unauthenticated join path that pollutes the registry, so
//! both classes are signed together or neither is.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the base64-encoded authenticator for `authenticated_bytes` under
/// `secret`. `authenticated_bytes` must be the canonical serialization of a
/// message's fields with its `auth_tag` field held out.
pub fn compute_tag(secret: &str, authenticated_bytes: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(authenticated_bytes);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Verifies `tag` against `authenticated_bytes` under `secret`. Constant-time
/// via `hmac`'s `verify_slice`.
pub fn verify_tag(secret: &str, authenticated_bytes: &[u8], tag: &str) -> bool {
    let Ok(decoded) = STANDARD.decode(tag.as_bytes()) else { return false };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(authenticated_bytes);
    mac.verify_slice(&decoded).is_ok()
}

/// The cluster's authentication mode: either every message is signed and
/// verified under a shared secret, or authentication is off entirely.
#[derive(Clone)]
pub enum ClusterAuth {
    Open,
    Secret(String),
}

impl ClusterAuth {
    pub fn from_config(secret: Option<String>) -> Self {
        match secret {
            Some(s) => ClusterAuth::Secret(s),
            None => ClusterAuth::Open,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, ClusterAuth::Secret(_))
    }

    /// Computes a tag for `authenticated_bytes`, or `None` in open mode.
    pub fn tag_for(&self, authenticated_bytes: &[u8]) -> Option<String> {
        match self {
            ClusterAuth::Open => None,
            ClusterAuth::Secret(secret) => Some(compute_tag(secret, authenticated_bytes)),
        }
    }

    /// Returns `true` if the message should be accepted: always `true` in
    /// open mode; in secret mode, `true` only if `tag` is `Some` and verifies.
    pub fn accepts(&self, authenticated_bytes: &[u8], tag: &Option<String>) -> bool {
        match self {
            ClusterAuth::Open => true,
            ClusterAuth::Secret(secret) => match tag {
                Some(t) => verify_tag(secret, authenticated_bytes, t),
                None => false,
            },
        }
    }
}
