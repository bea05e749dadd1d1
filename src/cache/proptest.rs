//! Property-Based Tests for Keys and TTL Rules
//!
//! # Test Properties
//!
//! 1. **Determinism**: hashing the same key twice yields the same identifier
//! 2. **Scheme Independence**: scheme-only variants share one identifier
//! 3. **Fixed Shape**: identifiers are 64 lowercase hex characters
//! 4. **First Match Wins**: the resolved TTL belongs to the earliest matching rule

#![cfg(test)]

use std::time::Duration;

use proptest::prelude::*;

use super::key::{hash_key, is_identifier, normalize_key, CacheKey, IDENTIFIER_LEN};
use super::policy::{TtlPolicy, TtlRule};

// =============================================================================
// Property Strategies
// =============================================================================

/// Host/path style keys without a scheme
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9.-]{1,20}(/[A-Za-z0-9._~-]{0,12}){0,4}"
}

fn scheme_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["http", "https", "ftp", "s3"])
}

/// Path segments used both as rule prefixes and key material
fn segment_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,4}"
}

// =============================================================================
// Key Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: hashing is a pure function.
    #[test]
    fn prop_hash_is_deterministic(key in any::<String>()) {
        prop_assert_eq!(hash_key(&key), hash_key(&key));
    }

    /// Property: identifiers always have the same shape.
    #[test]
    fn prop_identifier_shape(key in any::<String>()) {
        let id = hash_key(&key);
        prop_assert_eq!(id.len(), IDENTIFIER_LEN);
        prop_assert!(is_identifier(&id));
        prop_assert!(id.bytes().all(|b| !b.is_ascii_uppercase()));
    }

    /// Property: keys differing only by scheme collide after normalization.
    #[test]
    fn prop_scheme_variants_collide(
        key in key_strategy(),
        a in scheme_strategy(),
        b in scheme_strategy(),
    ) {
        let first = CacheKey::parse(&format!("{}://{}", a, key))?;
        let second = CacheKey::parse(&format!("{}://{}", b, key))?;
        let bare = CacheKey::parse(&key)?;
        prop_assert_eq!(first.identifier(), second.identifier());
        prop_assert_eq!(first.identifier(), bare.identifier());
    }

    /// Property: normalizing is idempotent.
    #[test]
    fn prop_normalize_idempotent(key in key_strategy(), scheme in scheme_strategy()) {
        let once = normalize_key(&format!("{}://{}", scheme, key))?;
        let twice = normalize_key(&once)?;
        prop_assert_eq!(once, twice);
    }
}

// =============================================================================
// TTL Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: the effective TTL is that of the first rule whose prefix matches,
    /// or the default when none does.
    #[test]
    fn prop_first_match_wins(
        prefixes in prop::collection::vec(segment_strategy(), 1..6),
        key_segments in prop::collection::vec(segment_strategy(), 1..4),
    ) {
        let rules: Vec<TtlRule> = prefixes
            .iter()
            .enumerate()
            .map(|(i, prefix)| {
                TtlRule::new(format!("r{}", i), &format!("^/{}", prefix), Duration::from_secs(i as u64 + 1))
            })
            .collect::<Result<_, _>>()?;
        let default_ttl = Duration::from_secs(1000);
        let policy = TtlPolicy::new(rules, default_ttl);

        let key = format!("/{}", key_segments.join("/"));
        let expected = prefixes
            .iter()
            .position(|p| key.starts_with(&format!("/{}", p)))
            .map(|i| Duration::from_secs(i as u64 + 1))
            .unwrap_or(default_ttl);

        prop_assert_eq!(policy.ttl_for(&key), expected);
    }
}
