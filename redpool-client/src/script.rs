//! Server-side script helper with a locally computed digest.

use sha1::{Digest, Sha1};

/// A Lua script plus the SHA-1 digest the store caches it under.
///
/// The digest is computed once at construction so callers can run
/// `eval_script` repeatedly without re-hashing or round-tripping the source.
#[derive(Debug, Clone)]
pub struct Script {
    source: String,
    digest: String,
}

impl Script {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let mut hasher = Sha1::new();
        hasher.update(source.as_bytes());
        let digest = to_hex(&hasher.finalize());
        Script { source, digest }
    }

    /// The script source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Lowercase hex SHA-1 digest, as the store reports it.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from_digit((byte >> 4) as u32, 16).expect("nibble in range"));
        out.push(char::from_digit((byte & 0x0f) as u32, 16).expect("nibble in range"));
    }
    out
}
