//! Redis-backed [`KeyValueCache`], shared by every instance pointing at the same server.
//!
//! Requires Redis 6.0 or newer for `SET ... KEEPTTL`.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client, RedisError};
use std::time::Duration;
use tracing::{debug, info_span, Instrument};

use super::{cache::KeyValueCache, error::CacheError};

pub const DEFAULT_KEY_PREFIX: &str = "otp-auth:";

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    prefix: String,
}

fn backend(err: RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}

// Redis rejects a zero expiry.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl RedisCache {
    /// Connect to `url` (`redis://host:port/db`); every key is stored under `prefix`.
    ///
    /// # Errors
    /// Returns `CacheError::Backend` if the URL is invalid or the server is unreachable.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(backend)?;
        let conn = client
            .get_connection_manager()
            .instrument(info_span!("cache.connect", cache.system = "redis"))
            .await
            .map_err(backend)?;
        let prefix = prefix.into();
        debug!(prefix = %prefix, "Connected to Redis");
        Ok(Self { conn, prefix })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn replace_keep_ttl(&self, key: &str, value: String) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        // Nil when XX finds no live key.
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("KEEPTTL")
            .arg("XX")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn incr_expire(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let mut conn = self.conn.clone();
        let key = self.key(key);
        // MULTI/EXEC so no reader sees the counter without its expiry.
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(&key)
            .cmd("PEXPIRE")
            .arg(&key)
            .arg(ttl_millis(ttl))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(count)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
