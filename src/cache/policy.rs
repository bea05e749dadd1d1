//! TTL Policy
//!
//! Ordered `(name, pattern, ttl)` rules evaluated against the normalized key.
//! The first rule whose pattern matches decides the TTL; when nothing matches
//! the configured default applies. Patterns are compiled once, when the policy
//! is built.

use std::fmt;
use std::time::Duration;

use regex::Regex;

use crate::config::{CacheConfig, TtlRuleConfig};
use crate::error::{Error, Result};

/// A compiled TTL rule
#[derive(Clone)]
pub struct TtlRule {
    name: String,
    pattern: Regex,
    ttl: Duration,
}

impl TtlRule {
    /// Compile a rule
    pub fn new(name: impl Into<String>, pattern: &str, ttl: Duration) -> Result<Self> {
        let name = name.into();
        let pattern = Regex::new(pattern).map_err(|e| Error::InvalidRule {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { name, pattern, ttl })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[inline]
    pub fn matches(&self, key: &str) -> bool {
        self.pattern.is_match(key)
    }
}

impl TryFrom<&TtlRuleConfig> for TtlRule {
    type Error = Error;

    fn try_from(config: &TtlRuleConfig) -> Result<Self> {
        Self::new(config.name.clone(), &config.regex, config.ttl)
    }
}

impl fmt::Debug for TtlRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlRule")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Outcome of a policy lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTtl<'a> {
    /// Name of the matching rule, `None` when the default applied
    pub rule: Option<&'a str>,
    /// Effective TTL
    pub ttl: Duration,
}

/// Ordered TTL rules plus default
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    rules: Vec<TtlRule>,
    default_ttl: Duration,
}

impl TtlPolicy {
    /// Policy from already compiled rules, evaluated in the given order
    pub fn new(rules: Vec<TtlRule>, default_ttl: Duration) -> Self {
        Self { rules, default_ttl }
    }

    /// Policy with no rules
    pub fn with_default(default_ttl: Duration) -> Self {
        Self::new(Vec::new(), default_ttl)
    }

    /// Compile the rules of a cache configuration
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let rules = config
            .ttl_rules
            .iter()
            .map(TtlRule::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(rules, config.default_ttl))
    }

    /// First matching rule wins, else the default
    pub fn resolve(&self, key: &str) -> ResolvedTtl<'_> {
        self.rules
            .iter()
            .find(|rule| rule.matches(key))
            .map(|rule| ResolvedTtl {
                rule: Some(rule.name()),
                ttl: rule.ttl(),
            })
            .unwrap_or(ResolvedTtl {
                rule: None,
                ttl: self.default_ttl,
            })
    }

    /// Effective TTL for a normalized key
    pub fn ttl_for(&self, key: &str) -> Duration {
        self.resolve(key).ttl
    }

    pub fn rules(&self) -> &[TtlRule] {
        &self.rules
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn images_policy() -> TtlPolicy {
        TtlPolicy::new(
            vec![
                TtlRule::new("a", "^/images/", Duration::from_secs(10)).unwrap(),
                TtlRule::new("b", "^/images/thumb", Duration::from_secs(3600)).unwrap(),
            ],
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_first_match_wins() {
        let policy = images_policy();
        let resolved = policy.resolve("/images/thumb/x.png");
        assert_eq!(resolved.rule, Some("a"));
        assert_eq!(resolved.ttl, Duration::from_secs(10));
    }

    #[test]
    fn test_default_when_no_rule_matches() {
        let policy = images_policy();
        let resolved = policy.resolve("/scripts/app.js");
        assert_eq!(resolved.rule, None);
        assert_eq!(resolved.ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_order_is_caller_supplied() {
        let policy = TtlPolicy::new(
            vec![
                TtlRule::new("b", "^/images/thumb", Duration::from_secs(3600)).unwrap(),
                TtlRule::new("a", "^/images/", Duration::from_secs(10)).unwrap(),
            ],
            Duration::from_secs(60),
        );
        assert_eq!(policy.ttl_for("/images/thumb/x.png"), Duration::from_secs(3600));
        assert_eq!(policy.ttl_for("/images/full/x.png"), Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = TtlRule::new("broken", "([", Duration::from_secs(1)).unwrap_err();
        assert_matches!(err, Error::InvalidRule { ref name, .. } if name == "broken");
    }

    #[test]
    fn test_from_config() {
        let config = CacheConfig::new("/tmp/x")
            .with_default_ttl(Duration::from_secs(5))
            .with_rule(TtlRuleConfig::new("deb", r"\.deb$", Duration::from_secs(86400)));
        let policy = TtlPolicy::from_config(&config).unwrap();

        assert_eq!(policy.rules().len(), 1);
        assert_eq!(policy.rules()[0].pattern(), r"\.deb$");
        assert_eq!(policy.ttl_for("mirror/pool/a.deb"), Duration::from_secs(86400));
        assert_eq!(policy.ttl_for("mirror/dists/Release"), Duration::from_secs(5));
    }
}
