use rand::Rng;
use sha2::{Digest, Sha256};

const SESSION_ID_PREFIX: &str = "mcp_";

/// Generate a session identifier.
/// Format: `mcp_` + 32 random bytes hex-encoded.
pub fn generate_session_id() -> String {
    format!("{SESSION_ID_PREFIX}{}", random_hex(32))
}

/// Cheap shape check used before touching the session table.
/// Unknown-but-well-formed ids still have to be looked up.
pub fn is_well_formed_session_id(raw: &str) -> bool {
    raw.strip_prefix(SESSION_ID_PREFIX)
        .is_some_and(|rest| rest.len() == 64 && rest.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// SHA-256 hex digest of a token string.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Short, log-safe fingerprint of a credential (first 8 hex chars of its SHA-256).
pub fn credential_fingerprint(token: &str) -> String {
    hash_token(token).chars().take(8).collect()
}

/// Generate `n` random bytes and return as hex string.
fn random_hex(n: usize) -> String {
    let bytes: Vec<u8> = (0..n).map(|_| rand::thread_rng().r#gen::<u8>()).collect();
    hex::encode(&bytes)
}
