//! Redis-backed store.
//!
//! Connections come from an `r2d2` pool over a `redis::Client`. A
//! [`RedisConnection`] wraps the pooled connection, so dropping it returns the
//! connection to the pool.

use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use redis::{Client, FromRedisValue};
use stash_core::{StashResult, StoreConfig, StoreError, StoreResult};

use super::{expiry_secs, KeyValueStore, StoreConnection};

/// Key-value store backed by a Redis connection pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool<Client>,
}

impl RedisStore {
    /// Wrap an existing pool.
    pub fn new(pool: Pool<Client>) -> Self {
        Self { pool }
    }

    /// Build a pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The URL cannot be parsed into a client
    /// - The pool cannot open its initial connections
    pub fn from_config(config: &StoreConfig) -> StashResult<Self> {
        config.validate()?;

        let client = Client::open(config.url.as_str()).map_err(|e| StoreError::Connection {
            reason: e.to_string(),
        })?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(config.connection_timeout)
            .build(client)
            .map_err(|e| StoreError::Connection {
                reason: format!("Failed to create pool: {}", e),
            })?;

        tracing::debug!(
            target: "stash::store",
            pool_size = config.pool_size,
            "Redis connection pool ready"
        );

        Ok(Self::new(pool))
    }

    /// The underlying pool, for observability.
    pub fn pool(&self) -> &Pool<Client> {
        &self.pool
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("RedisStore")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish()
    }
}

impl KeyValueStore for RedisStore {
    type Connection<'a> = RedisConnection;

    fn connection(&self) -> StoreResult<RedisConnection> {
        let conn = self.pool.get().map_err(|e| StoreError::Connection {
            reason: e.to_string(),
        })?;
        Ok(RedisConnection { conn })
    }
}

/// A pooled Redis connection.
pub struct RedisConnection {
    conn: PooledConnection<Client>,
}

impl RedisConnection {
    fn query<T: FromRedisValue>(&mut self, command: &'static str, cmd: &redis::Cmd) -> StoreResult<T> {
        cmd.query(&mut *self.conn)
            .map_err(|e| StoreError::command(command, e))
    }
}

impl StoreConnection for RedisConnection {
    fn exists(&mut self, key: &str) -> StoreResult<bool> {
        self.query("EXISTS", redis::cmd("EXISTS").arg(key))
    }

    fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.query("GET", redis::cmd("GET").arg(key))
    }

    fn set(&mut self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.query("SET", redis::cmd("SET").arg(key).arg(value))
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.query("EXPIRE", redis::cmd("EXPIRE").arg(key).arg(expiry_secs(ttl)))
    }

    fn set_with_expiry(&mut self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.query(
            "SET",
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(expiry_secs(ttl)),
        )
    }

    fn delete(&mut self, key: &str) -> StoreResult<u64> {
        self.query("DEL", redis::cmd("DEL").arg(key))
    }

    fn hash_exists(&mut self, bucket: &str, field: &str) -> StoreResult<bool> {
        self.query("HEXISTS", redis::cmd("HEXISTS").arg(bucket).arg(field))
    }

    fn hash_get(&mut self, bucket: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        self.query("HGET", redis::cmd("HGET").arg(bucket).arg(field))
    }

    fn hash_set(&mut self, bucket: &str, field: &str, value: &[u8]) -> StoreResult<()> {
        // HSET replies with the number of new fields; only success matters here.
        self.query::<u64>("HSET", redis::cmd("HSET").arg(bucket).arg(field).arg(value))
            .map(|_| ())
    }

    fn hash_delete(&mut self, bucket: &str, field: &str) -> StoreResult<u64> {
        self.query("HDEL", redis::cmd("HDEL").arg(bucket).arg(field))
    }
}
