//! Bounded connection pool for the remote backend.
//!
//! Connections are checked out per call and returned on drop. The
//! active count is capped by a semaphore; checkout either waits for a
//! free slot or fails fast, per configuration. Idle connections are
//! reused until they sit unused past the idle timeout, then redialed.

use std::collections::VecDeque;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use crate::error::{Error, Result};

/// Dial function establishing one transport connection.
pub type DialFn<C> =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<C>> + Send>> + Send + Sync>;

/// Pool sizing and checkout policy.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of live connections. Capped below at one.
    pub max_active: usize,

    /// Maximum number of idle connections kept for reuse.
    pub max_idle: usize,

    /// Idle connections older than this are discarded at checkout.
    pub idle_timeout: Duration,

    /// Wait for a free slot when exhausted (true) or fail fast (false).
    pub wait: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_active: crate::config::DEFAULT_MAX_ACTIVE,
            max_idle: crate::config::DEFAULT_MAX_IDLE,
            idle_timeout: crate::config::DEFAULT_IDLE_TIMEOUT,
            wait: true,
        }
    }
}

struct Idle<C> {
    conn: C,
    parked_at: Instant,
}

/// A bounded pool of connections produced by a dial function.
pub struct Pool<C> {
    config: PoolConfig,
    dial: DialFn<C>,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<Idle<C>>>,
}

impl<C: Send + 'static> Pool<C> {
    /// Create a pool that dials new connections with `dial`.
    ///
    /// No connection is established until the first checkout.
    pub fn new(config: PoolConfig, dial: DialFn<C>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_active.max(1)));
        Self {
            config,
            dial,
            permits,
            idle: Mutex::new(VecDeque::new()),
        }
    }

    /// Check out a connection, reusing an idle one when possible.
    ///
    /// # Errors
    ///
    /// Returns `BackendConnection` when the pool is exhausted in
    /// fail-fast mode, or when dialing a new connection fails. In wait
    /// mode the call blocks until another checkout returns.
    pub async fn get(&self) -> Result<PooledConn<'_, C>> {
        let permit = if self.config.wait {
            self.permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| Error::BackendConnection("connection pool closed".to_string()))?
        } else {
            self.permits
                .clone()
                .try_acquire_owned()
                .map_err(|_| Error::BackendConnection("connection pool exhausted".to_string()))?
        };

        if let Some(conn) = self.checkout_idle() {
            trace!("reusing idle connection");
            return Ok(PooledConn {
                pool: self,
                conn: Some(conn),
                _permit: permit,
            });
        }

        let conn = (self.dial)().await?;
        trace!("dialed new connection");
        Ok(PooledConn {
            pool: self,
            conn: Some(conn),
            _permit: permit,
        })
    }

    /// Number of idle connections currently parked.
    pub fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }

    fn checkout_idle(&self) -> Option<C> {
        let mut idle = self.idle.lock();
        while let Some(parked) = idle.pop_front() {
            if parked.parked_at.elapsed() <= self.config.idle_timeout {
                return Some(parked.conn);
            }
            trace!("discarding connection past idle timeout");
        }
        None
    }

    fn park(&self, conn: C) {
        let mut idle = self.idle.lock();
        if idle.len() < self.config.max_idle {
            idle.push_back(Idle {
                conn,
                parked_at: Instant::now(),
            });
        }
    }
}

/// A checked-out connection; returns to the pool on drop.
pub struct PooledConn<'a, C: Send + 'static> {
    pool: &'a Pool<C>,
    conn: Option<C>,
    _permit: OwnedSemaphorePermit,
}

impl<C: Send + 'static> Deref for PooledConn<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn.as_ref().expect("connection already returned")
    }
}

impl<C: Send + 'static> DerefMut for PooledConn<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("connection already returned")
    }
}

impl<C: Send + 'static> Drop for PooledConn<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.park(conn);
        }
    }
}
