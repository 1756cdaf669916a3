//! Redis implementation of the remote store contract.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tracing::debug;

use crate::config::RedisConfig;
use crate::error::{Error, Result};
use crate::pool::{DialFn, Pool, PoolConfig};
use crate::store::RemoteStore;

/// A [`RemoteStore`] over a pooled Redis client.
///
/// Connections are checked out from the pool per operation and never
/// held across calls.
pub struct RedisStore {
    pool: Pool<MultiplexedConnection>,
}

impl RedisStore {
    /// Build a store for the configured address and logical database.
    ///
    /// Constructing the store performs no I/O; connections are dialed
    /// lazily on first use.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration does not validate.
    pub fn connect(config: &RedisConfig) -> Result<Self> {
        config.validate()?;
        let (host, port) = config.endpoint()?;

        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, port),
            redis: RedisConnectionInfo {
                db: config.database,
                username: None,
                password: config.password.clone(),
                ..Default::default()
            },
        };
        let client = Client::open(info).map_err(|err| Error::BackendConnection(err.to_string()))?;

        let pool_config = PoolConfig {
            max_active: config.max_active,
            max_idle: config.max_idle,
            idle_timeout: config.idle_timeout,
            wait: config.wait_for_connection,
        };
        let dial: DialFn<MultiplexedConnection> = Box::new(move || {
            let client = client.clone();
            Box::pin(async move {
                client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|err| Error::BackendConnection(err.to_string()))
            })
        });

        debug!(addr = %config.addr, database = config.database, "redis store configured");
        Ok(Self {
            pool: Pool::new(pool_config, dial),
        })
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn load(&self, session_id: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.pool.get().await?;
        conn.get(session_id)
            .await
            .map_err(|err| Error::BackendRead(err.to_string()))
    }

    async fn store(&self, session_id: &str, payload: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.pool.get().await?;
        match ttl {
            Some(ttl) => conn.set_ex(session_id, payload, ttl.as_secs().max(1)).await,
            None => conn.set(session_id, payload).await,
        }
        .map_err(|err| Error::BackendWrite(err.to_string()))
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.del(session_id)
            .await
            .map_err(|err| Error::BackendWrite(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_rejects_invalid_address() {
        let config = RedisConfig::new("no-port-here");
        assert!(matches!(RedisStore::connect(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_connect_builds_without_io() {
        // No server is running; construction must still succeed
        // because dialing is lazy.
        let config = RedisConfig::new("127.0.0.1:6379").with_database(2);
        RedisStore::connect(&config).unwrap();
    }
}
