use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum key length, in bytes.
pub const MAX_KEY_SIZE: usize = 1024;

/// Maximum payload size accepted by a PUT, in bytes.
pub const MAX_VALUE_SIZE: usize = 4 * 1024 * 1024;

/// Error kinds for REPRAM node and client operations.
///
/// These mirror the Error Kinds table in the node's design document:
/// validation errors are surfaced to callers, `AuthReject` never is.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepramError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Key exceeds maximum size of {0} bytes")]
    KeyTooLarge(usize),

    #[error("Value exceeds maximum size of {0} bytes")]
    ValueTooLarge(usize),

    #[error("Storage is full")]
    StorageFull,

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP {0}: {1}")]
    HttpError(u16, String),

    #[error("Request is missing a required header: {0}")]
    MissingHeader(String),

    #[error("Gossip or bootstrap message failed authentication")]
    AuthReject,
}

/// Result type for REPRAM operations.
pub type Result<T> = std::result::Result<T, RepramError>;

/// JSON body used for non-2xx HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A peer as known to the registry, as exchanged over bootstrap/SYNC.
///
/// This is the wire-level projection of a Peer Record (see the node's
/// design document, §3): it carries identity, address and enclave only —
/// failure counters and join timestamps are local bookkeeping and never
/// cross the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    pub node_id: String,
    pub address: String,
    pub enclave: String,
}

/// A replicated write, as sent between nodes over `/v1/gossip/message`.
///
/// `payload` is base64-encoded on the wire (see the `payload_b64` module)
/// so the message survives as plain JSON without embedding raw bytes as a
/// numeric array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipMessage {
    pub message_id: String,
    pub key: String,
    #[serde(with = "payload_b64")]
    pub payload: Vec<u8>,
    pub ttl_secs: u64,
    /// Unix-epoch milliseconds at which the message was created, for
    /// propagation of the original creation moment across nodes.
    pub created_at_unix_ms: u64,
    pub origin_node_id: String,
    pub hop_count: u32,
    /// Base64-encoded HMAC tag over every field above, present only when
    /// the cluster secret is configured (§4.2.7). `None` in open mode.
    pub auth_tag: Option<String>,
}

/// Sent by a joining or re-announcing node to `/v1/bootstrap`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapRequest {
    pub node_id: String,
    pub address: String,
    pub enclave: String,
    pub auth_tag: Option<String>,
}

/// Response to a `BootstrapRequest`: every peer the responder currently knows,
/// including itself, so the joiner can seed its registry in one round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapResponse {
    pub peers: Vec<PeerDescriptor>,
}

/// Periodic topology broadcast (§4.2.6). Sent to every known peer regardless
/// of enclave — topology knowledge is not enclave-scoped, only data is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    pub sender_id: String,
    pub address: String,
    pub enclave: String,
    pub peers: Vec<PeerDescriptor>,
    pub auth_tag: Option<String>,
}

/// Body returned by `/v1/gossip/message` on successful (or ACK-on-Full) apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipAck {
    pub acked: bool,
}

/// Serde helper serializing `Vec<u8>` as a base64 string instead of a JSON
/// array of numbers.
mod payload_b64 {
    use super::{Engine, STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
