//! Cache Keys
//!
//! Normalization and content-addressed hashing of request keys. The hex digest
//! is both the map key of the known-set and the file name on disk.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Length of an identifier in hex characters (SHA-256)
pub const IDENTIFIER_LEN: usize = 64;

/// Strip the transport scheme from a request key.
///
/// `https://example.com/a` and `http://example.com/a` both normalize to
/// `example.com/a`. Keys without a scheme are returned unchanged, so
/// normalizing twice is harmless.
pub fn normalize_key(key: &str) -> Result<String> {
    let rest = match key.split_once("://") {
        Some((scheme, rest)) if is_scheme(scheme) => rest,
        // "://" inside a path or query is not a scheme separator
        _ => key,
    };

    if rest.is_empty() {
        return Err(Error::InvalidKey(format!("empty key '{}'", key)));
    }

    Ok(rest.to_string())
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Hex-encoded SHA-256 of `data`. Pure and deterministic.
pub fn hash_key(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    hex::encode(digest)
}

/// Normalized request key together with its identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Key as requested by the client (scheme included)
    original: String,
    /// Key with the scheme stripped
    normalized: String,
    /// Hex digest of `normalized`
    identifier: String,
}

impl CacheKey {
    /// Normalize and hash a request key
    pub fn parse(key: &str) -> Result<Self> {
        let normalized = normalize_key(key)?;
        let identifier = hash_key(&normalized);
        Ok(Self {
            original: key.to_string(),
            normalized,
            identifier,
        })
    }

    #[inline]
    pub fn original(&self) -> &str {
        &self.original
    }

    #[inline]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    #[inline]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.normalized, &self.identifier[..12])
    }
}

/// True if `name` looks like an identifier this cache could have written.
pub fn is_identifier(name: &str) -> bool {
    name.len() == IDENTIFIER_LEN && name.bytes().all(|b| b.is_ascii_hexdigit())
}

// =============================================================================
// Tests
// =============================================================================
