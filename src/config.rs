use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::zone::transfer::MAX_ENVELOPE_BYTES;

/// Zone cache TTL and fallback record TTL, in seconds
pub const DEFAULT_TTL: u32 = 300;

/// Default upper bound for the records of one transfer envelope, in bytes
pub const DEFAULT_TRANSFER_MAX_BYTES: usize = 1000;

/// Default number of envelopes buffered between producer and transport
pub const DEFAULT_TRANSFER_CHANNEL_CAPACITY: usize = 4;

/// Backend options, mirroring the `redis { ... }` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// host:port or a full redis:// URL
    pub address: String,

    pub password: Option<String>,

    /// Logical database index
    pub database: u32,

    /// Key namespacing
    pub prefix: String,
    pub suffix: String,

    pub connect_timeout: Duration,
    pub read_timeout: Duration,

    /// Zone cache lifetime and the global default record TTL, in seconds
    pub ttl: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            password: None,
            database: 0,
            prefix: String::new(),
            suffix: String::new(),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(5),
            ttl: DEFAULT_TTL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsConfig {
    /// Address the UDP and TCP listeners bind to
    pub bind_addr: SocketAddr,

    pub redis: RedisConfig,

    /// Envelope budget for zone transfers
    pub transfer_max_bytes: usize,

    /// Envelopes buffered ahead of the transport during a transfer
    pub transfer_channel_capacity: usize,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 1053)),
            redis: RedisConfig::default(),
            transfer_max_bytes: DEFAULT_TRANSFER_MAX_BYTES,
            transfer_channel_capacity: DEFAULT_TRANSFER_CHANNEL_CAPACITY,
        }
    }
}

impl DnsConfig {
    /// Create a DnsConfig from environment variables
    /// Returns Err if critical configuration is invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::default().with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a `redis { ... }` block as written in a server configuration file.
    ///
    /// Missing arguments and unknown properties are errors. Numeric values
    /// that do not parse are logged and the default is kept.
    pub fn from_block(input: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut opened = false;
        let mut closed = false;

        for raw in input.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if closed {
                return Err(ConfigError::ParseError(format!(
                    "unexpected content after block: '{}'",
                    line
                )));
            }

            if !opened {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                if tokens.first() != Some(&"redis") || tokens.last() != Some(&"{") {
                    return Err(ConfigError::ParseError(format!(
                        "expected 'redis {{', found '{}'",
                        line
                    )));
                }
                opened = true;
                continue;
            }

            if line == "}" {
                closed = true;
                continue;
            }

            let mut tokens = line.split_whitespace();
            let key = tokens.next().unwrap_or_default();
            let value = tokens.next();
            config.set_property(key, value)?;
        }

        if !opened || !closed {
            return Err(ConfigError::ParseError("unterminated redis block".to_string()));
        }

        config.validate()?;
        debug!("Parsed configuration: {:?}", config);
        Ok(config)
    }

    fn set_property(&mut self, key: &str, value: Option<&str>) -> Result<(), ConfigError> {
        const KNOWN: &[&str] = &[
            "address",
            "password",
            "database",
            "prefix",
            "suffix",
            "connect_timeout",
            "read_timeout",
            "ttl",
            "transfer_max_bytes",
            "transfer_channel_capacity",
        ];
        if !KNOWN.contains(&key) {
            return Err(ConfigError::UnknownProperty(key.to_string()));
        }
        let value = value.ok_or_else(|| ConfigError::MissingArgument(key.to_string()))?;

        match key {
            "address" => self.redis.address = value.to_string(),
            "password" => self.redis.password = Some(value.to_string()),
            "prefix" => self.redis.prefix = value.to_string(),
            "suffix" => self.redis.suffix = value.to_string(),
            "database" => {
                if let Some(db) = parse_or_warn(key, value) {
                    self.redis.database = db;
                }
            }
            "connect_timeout" => {
                if let Some(secs) = parse_or_warn(key, value) {
                    self.redis.connect_timeout = Duration::from_secs(secs);
                }
            }
            "read_timeout" => {
                if let Some(secs) = parse_or_warn(key, value) {
                    self.redis.read_timeout = Duration::from_secs(secs);
                }
            }
            "ttl" => {
                if let Some(ttl) = parse_or_warn(key, value) {
                    self.redis.ttl = ttl;
                }
            }
            "transfer_max_bytes" => {
                if let Some(bytes) = parse_or_warn(key, value) {
                    self.transfer_max_bytes = bytes;
                }
            }
            "transfer_channel_capacity" => {
                if let Some(capacity) = parse_or_warn(key, value) {
                    self.transfer_channel_capacity = capacity;
                }
            }
            _ => unreachable!("property list checked above"),
        }
        Ok(())
    }

    /// Apply `BIFROST_*` overrides from a variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind_addr) = lookup("BIFROST_BIND_ADDR") {
            self.bind_addr = bind_addr
                .parse()
                .map_err(|_| ConfigError::InvalidBindAddress(bind_addr))?;
        }

        let properties = [
            ("BIFROST_REDIS_ADDRESS", "address"),
            ("BIFROST_REDIS_PASSWORD", "password"),
            ("BIFROST_REDIS_DATABASE", "database"),
            ("BIFROST_REDIS_PREFIX", "prefix"),
            ("BIFROST_REDIS_SUFFIX", "suffix"),
            ("BIFROST_CONNECT_TIMEOUT", "connect_timeout"),
            ("BIFROST_READ_TIMEOUT", "read_timeout"),
            ("BIFROST_TTL", "ttl"),
            ("BIFROST_TRANSFER_MAX_BYTES", "transfer_max_bytes"),
            ("BIFROST_TRANSFER_CHANNEL_CAPACITY", "transfer_channel_capacity"),
        ];
        for (variable, key) in properties {
            if let Some(value) = lookup(variable) {
                self.set_property(key, Some(value.as_str()))?;
            }
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis.address.trim().is_empty() {
            return Err(ConfigError::MissingProperty("address"));
        }
        if self.transfer_max_bytes == 0 || self.transfer_max_bytes > MAX_ENVELOPE_BYTES {
            return Err(ConfigError::ParseError(format!(
                "transfer_max_bytes must be between 1 and {}",
                MAX_ENVELOPE_BYTES
            )));
        }
        if self.transfer_channel_capacity == 0 {
            return Err(ConfigError::ParseError(
                "transfer_channel_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Error parsing config value {}: '{}', keeping default", key, value);
            None
        }
    }
}
