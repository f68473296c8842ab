use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{
    AsyncCommands, ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo,
    RedisResult,
};
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use super::KeyValueGateway;
use crate::config::RedisConfig;
use crate::error::{ConfigError, DnsError, Result};

/// Keys requested per SCAN round trip
const SCAN_COUNT: usize = 1000;

const DEFAULT_REDIS_PORT: u16 = 6379;

/// Redis-backed gateway sharing one multiplexed, auto-reconnecting connection
pub struct RedisGateway {
    client: ConnectionManager,
    read_timeout: Duration,
}

impl RedisGateway {
    /// Connect to Redis; fails when the server cannot be reached within `connect_timeout`
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(connection_info(config)?)
            .map_err(|e| DnsError::BackendUnavailable(format!("Failed to create Redis client: {}", e)))?;

        let connection_manager = timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                DnsError::BackendUnavailable(format!(
                    "Timed out connecting to Redis after {:?}",
                    config.connect_timeout
                ))
            })?
            .map_err(|e| DnsError::BackendUnavailable(format!("Failed to connect to Redis: {}", e)))?;

        info!(
            "Connected to Redis at {} (database {})",
            config.address, config.database
        );

        Ok(Self {
            client: connection_manager,
            read_timeout: config.read_timeout,
        })
    }

    /// Run one command, failing once `read_timeout` has passed
    async fn bounded<T>(&self, command: impl Future<Output = RedisResult<T>>) -> Result<T> {
        match timeout(self.read_timeout, command).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(DnsError::BackendUnavailable(format!(
                "Redis did not answer within {:?}",
                self.read_timeout
            ))),
        }
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.client.clone();
        let _: String = self
            .bounded(redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueGateway for RedisGateway {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.client.clone();
        let value: Option<String> = self.bounded(conn.get(key)).await?;
        Ok(value)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.client.clone();
        let values: Vec<Option<String>> = self
            .bounded(redis::cmd("MGET").arg(keys).query_async(&mut conn))
            .await?;
        Ok(values)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.client.clone();
        let mut keys = BTreeSet::new();
        let mut cursor: u64 = 0;

        loop {
            let mut command = redis::cmd("SCAN");
            command
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT);
            let (next_cursor, batch): (u64, Vec<String>) =
                self.bounded(command.query_async(&mut conn)).await?;

            keys.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!("SCAN {} returned {} keys", pattern, keys.len());
        Ok(keys.into_iter().collect())
    }
}

/// Connection parameters from the plugin options. A `redis://` or `rediss://`
/// URL in `address` is used as is; otherwise `address` is host[:port] and the
/// database and password options apply.
fn connection_info(config: &RedisConfig) -> Result<ConnectionInfo> {
    let address = config.address.trim();
    if address.contains("://") {
        return Ok(address.into_connection_info()?);
    }

    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) if !host.ends_with(':') => {
            let port = port.parse::<u16>().map_err(|_| {
                ConfigError::ParseError(format!("invalid Redis port in '{}'", address))
            })?;
            (host, port)
        }
        _ => (address, DEFAULT_REDIS_PORT),
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    Ok(ConnectionInfo {
        addr: ConnectionAddr::Tcp(host.to_string(), port),
        redis: RedisConnectionInfo {
            db: i64::from(config.database),
            password: config.password.clone().filter(|p| !p.is_empty()),
            ..Default::default()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(address: &str) -> RedisConfig {
        RedisConfig {
            address: address.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_connection_info_from_options() {
        let info = connection_info(&options("localhost:6379")).unwrap();
        assert_eq!(info.addr, ConnectionAddr::Tcp("localhost".to_string(), 6379));
        assert_eq!(info.redis.db, 0);
        assert_eq!(info.redis.password, None);

        let mut config = options("cache.internal");
        config.password = Some("p@ss word".to_string());
        config.database = 3;
        let info = connection_info(&config).unwrap();
        assert_eq!(info.addr, ConnectionAddr::Tcp("cache.internal".to_string(), 6379));
        assert_eq!(info.redis.db, 3);
        assert_eq!(info.redis.password.as_deref(), Some("p@ss word"));

        let info = connection_info(&options("[::1]:6380")).unwrap();
        assert_eq!(info.addr, ConnectionAddr::Tcp("::1".to_string(), 6380));
    }

    #[test]
    fn test_connection_info_from_url() {
        let info = connection_info(&options("redis://cache.internal:6380/2")).unwrap();
        assert_eq!(info.addr, ConnectionAddr::Tcp("cache.internal".to_string(), 6380));
        assert_eq!(info.redis.db, 2);

        assert!(connection_info(&options("localhost:notaport")).is_err());
    }
}
