//! Cache Configuration
//!
//! Read-only settings supplied when the cache is constructed. The library
//! never loads configuration on its own; [`CacheConfig::load`] exists for the
//! binary and for callers that keep their settings in YAML.
//!
//! ```yaml
//! cache_folder: /var/cache/tiercache
//! max_in_memory_item_size: 1048576
//! default_ttl: 24h
//! ttl_rules:
//!   - name: images
//!     regex: "^/images/"
//!     ttl: 10s
//!   - name: thumbnails
//!     regex: "^/images/thumb"
//!     ttl: 1h
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

/// Default in-memory item size threshold (1 MiB)
pub const DEFAULT_MAX_IN_MEMORY_ITEM_SIZE: u64 = 1024 * 1024;

/// Default TTL when no rule matches (24h)
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 3600);

/// Cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one file per identifier
    pub cache_folder: PathBuf,
    /// Items up to this many bytes are also kept in memory
    #[serde(default = "default_max_in_memory_item_size")]
    pub max_in_memory_item_size: u64,
    /// TTL applied when no rule matches
    #[serde(default = "default_ttl", deserialize_with = "deserialize_duration")]
    pub default_ttl: Duration,
    /// Ordered TTL rules, first match wins
    #[serde(default)]
    pub ttl_rules: Vec<TtlRuleConfig>,
}

/// One uncompiled TTL rule
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TtlRuleConfig {
    /// Rule name (used in logs)
    pub name: String,
    /// Regular expression matched against the normalized key
    pub regex: String,
    /// Freshness duration for matching keys
    #[serde(deserialize_with = "deserialize_duration")]
    pub ttl: Duration,
}

impl TtlRuleConfig {
    pub fn new(name: impl Into<String>, regex: impl Into<String>, ttl: Duration) -> Self {
        Self {
            name: name.into(),
            regex: regex.into(),
            ttl,
        }
    }
}

impl CacheConfig {
    /// Configuration with defaults for everything but the folder
    pub fn new(cache_folder: impl Into<PathBuf>) -> Self {
        Self {
            cache_folder: cache_folder.into(),
            max_in_memory_item_size: DEFAULT_MAX_IN_MEMORY_ITEM_SIZE,
            default_ttl: DEFAULT_TTL,
            ttl_rules: Vec::new(),
        }
    }

    pub fn with_max_in_memory_item_size(mut self, bytes: u64) -> Self {
        self.max_in_memory_item_size = bytes;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_rule(mut self, rule: TtlRuleConfig) -> Self {
        self.ttl_rules.push(rule);
        self
    }

    /// Parse a YAML document
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read and parse a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }
}

fn default_max_in_memory_item_size() -> u64 {
    DEFAULT_MAX_IN_MEMORY_ITEM_SIZE
}

fn default_ttl() -> Duration {
    DEFAULT_TTL
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

// =============================================================================
// Duration Parsing
// =============================================================================

/// Parse a Go-style duration string (e.g., "10s", "30m", "1h30m", "2d")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::DurationParse("empty duration string".to_string()));
    }

    let mut total_secs: u64 = 0;
    let mut num_buf = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            num_buf.push(c);
            continue;
        }

        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        num_buf.clear();

        let multiplier = match c {
            'd' | 'D' => 86400,
            'h' | 'H' => 3600,
            'm' | 'M' => 60,
            's' | 'S' => 1,
            _ => {
                return Err(Error::DurationParse(format!(
                    "unknown duration unit: {}",
                    c
                )))
            }
        };

        total_secs = num
            .checked_mul(multiplier)
            .and_then(|v| total_secs.checked_add(v))
            .ok_or_else(|| Error::DurationParse(format!("duration overflows: {}", s)))?;
    }

    // Trailing bare number is seconds
    if !num_buf.is_empty() {
        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        total_secs = total_secs
            .checked_add(num)
            .ok_or_else(|| Error::DurationParse(format!("duration overflows: {}", s)))?;
    }

    Ok(Duration::from_secs(total_secs))
}

// =============================================================================
// Tests
// =============================================================================
