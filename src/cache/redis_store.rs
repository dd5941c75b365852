//! Redis-backed cache store.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{bounded, CacheStore};
use crate::error::CacheError;

/// Cache store shared between server instances through Redis.
///
/// Payloads are stored as raw bytes with `SET key value EX ttl`. The
/// connection manager multiplexes requests and reconnects on its own; while
/// Redis is down every call fails with [`CacheError::Unavailable`].
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect to the Redis server at `url` (e.g. `redis://redis:6379/1`).
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let connection = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self { connection })
    }

    /// Connect and `PING`, giving up after `timeout`, including any retries
    /// made by the connection manager.
    pub async fn connect_within(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        bounded(timeout, async {
            let store = Self::connect(url).await?;
            store.ping().await?;
            Ok(store)
        })
        .await
    }

    /// Round-trip a `PING` to check connectivity.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut connection)
            .await
            .map(|_| ())
            .map_err(unavailable)
    }
}

fn unavailable(err: redis::RedisError) -> CacheError {
    CacheError::Unavailable(err.to_string())
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut connection = self.connection.clone();
        let value: Option<Vec<u8>> = connection.get(key).await.map_err(unavailable)?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, data: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        // Redis rejects EX 0
        let seconds = ttl.as_secs().max(1);
        connection
            .set_ex::<_, _, ()>(key, data.as_ref(), seconds)
            .await
            .map_err(unavailable)
    }
}
