//! Key-value backend access.
//!
//! The zone engine only needs to enumerate keys and read values, so the
//! backend is reached through the small [`KeyValueGateway`] trait. The
//! gateway is built once at startup and handed to the zone cache as an
//! `Arc<dyn KeyValueGateway>`.

pub mod memory;
pub mod redis_backend;

use async_trait::async_trait;

use crate::dns::name;
use crate::error::Result;

pub use self::memory::MemoryGateway;
pub use self::redis_backend::RedisGateway;

/// Separates the location from the zone inside a key
pub const KEY_SEPARATOR: char = ':';

#[async_trait]
pub trait KeyValueGateway: Send + Sync {
    /// Read a single value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Read several values; the result is aligned with `keys`
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    /// All keys matching a glob pattern, sorted and without duplicates
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;
}

/// Key layout: `{prefix}{location}:{zone}{suffix}`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySchema {
    pub prefix: String,
    pub suffix: String,
}

impl KeySchema {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn location_key(&self, location: &str, zone: &str) -> String {
        format!(
            "{}{}{}{}{}",
            self.prefix,
            location,
            KEY_SEPARATOR,
            name::normalize(zone),
            self.suffix
        )
    }

    /// Pattern matching every location of every zone
    pub fn all_keys_pattern(&self) -> String {
        format!("{}*{}", glob_escape(&self.prefix), glob_escape(&self.suffix))
    }

    /// Pattern matching every location of one zone
    pub fn zone_pattern(&self, zone: &str) -> String {
        format!(
            "{}*{}{}{}",
            glob_escape(&self.prefix),
            KEY_SEPARATOR,
            glob_escape(&name::normalize(zone)),
            glob_escape(&self.suffix)
        )
    }

    /// Split a key into (location, zone). The apex comes back as "".
    pub fn parse_key(&self, key: &str) -> Option<(String, String)> {
        let inner = key.strip_prefix(self.prefix.as_str())?;
        let inner = inner.strip_suffix(self.suffix.as_str())?;
        let (location, zone) = inner.split_once(KEY_SEPARATOR)?;
        if zone.is_empty() {
            return None;
        }

        let location = match location.trim() {
            "@" => String::new(),
            other => other.to_ascii_lowercase(),
        };
        Some((location, name::normalize(zone)))
    }
}

/// Escape glob metacharacters understood by Redis SCAN MATCH
pub fn glob_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
