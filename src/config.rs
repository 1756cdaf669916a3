//! Backend selection and configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default expiration window for idle sessions.
pub const DEFAULT_EXPIRE: Duration = Duration::from_secs(1800);

/// Default maximum number of live backend connections.
pub const DEFAULT_MAX_ACTIVE: usize = 50;

/// Default maximum number of idle connections kept for reuse.
pub const DEFAULT_MAX_IDLE: usize = 15;

/// Default idle timeout after which a parked connection is discarded.
/// Should stay below the server's own idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(100);

/// Default backoff for the eager sweep cadence while the store is empty.
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_secs(1);

/// Default polling interval for the fixed sweep cadence.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(2);

/// Polling strategy for the expiration sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepCadence {
    /// Re-scan immediately while sessions exist; sleep `idle_backoff`
    /// when the store is empty. Trades CPU for eviction promptness.
    Eager { idle_backoff: Duration },

    /// Sleep `interval` between scans regardless of emptiness.
    Fixed { interval: Duration },
}

/// Selects and configures exactly one storage backend.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Process-memory sessions, lost on exit.
    Memory(MemoryConfig),

    /// Sessions mirrored into a Redis instance, shareable across processes.
    Redis(RedisConfig),
}

impl BackendConfig {
    /// Memory backend with default settings.
    pub fn memory() -> Self {
        Self::Memory(MemoryConfig::default())
    }

    /// Redis backend for the given `host:port` address, with default settings.
    pub fn redis(addr: impl Into<String>) -> Self {
        Self::Redis(RedisConfig::new(addr))
    }
}

/// Configuration for the in-memory backend.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Sessions idle longer than this are evicted by the sweeper.
    pub expire: Duration,

    /// Sweeper polling strategy.
    pub sweep: SweepCadence,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            expire: DEFAULT_EXPIRE,
            sweep: SweepCadence::Eager {
                idle_backoff: DEFAULT_IDLE_BACKOFF,
            },
        }
    }
}

impl MemoryConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expiration window.
    pub fn with_expire(mut self, expire: Duration) -> Self {
        self.expire = expire;
        self
    }

    /// Set the sweeper cadence.
    pub fn with_sweep_cadence(mut self, sweep: SweepCadence) -> Self {
        self.sweep = sweep;
        self
    }
}

/// Configuration for the Redis-backed backend.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Server address as `host:port`.
    pub addr: String,

    /// Optional AUTH credential.
    pub password: Option<String>,

    /// Logical database index selected on dial.
    pub database: i64,

    /// Maximum number of live connections.
    pub max_active: usize,

    /// Maximum number of idle connections kept for reuse.
    pub max_idle: usize,

    /// Idle timeout after which a parked connection is discarded.
    pub idle_timeout: Duration,

    /// When the pool is exhausted: wait for a free connection (true)
    /// or fail fast with a connection error (false).
    pub wait_for_connection: bool,

    /// Sessions idle longer than this are evicted by the sweeper.
    /// Also applied as the server-side TTL on every mirrored write.
    pub expire: Duration,

    /// Sweeper polling strategy.
    pub sweep: SweepCadence,
}

impl RedisConfig {
    /// Create a configuration for the given `host:port` address with
    /// default pool and expiration settings.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            password: None,
            database: 0,
            max_active: DEFAULT_MAX_ACTIVE,
            max_idle: DEFAULT_MAX_IDLE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            wait_for_connection: true,
            expire: DEFAULT_EXPIRE,
            sweep: SweepCadence::Fixed {
                interval: DEFAULT_SWEEP_INTERVAL,
            },
        }
    }

    /// Set the AUTH credential.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Select a logical database.
    pub fn with_database(mut self, database: i64) -> Self {
        self.database = database;
        self
    }

    /// Set the maximum number of live connections.
    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    /// Set the maximum number of idle connections kept for reuse.
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Set the idle timeout for parked connections.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Fail fast instead of waiting when the pool is exhausted.
    pub fn fail_fast(mut self) -> Self {
        self.wait_for_connection = false;
        self
    }

    /// Set the expiration window.
    pub fn with_expire(mut self, expire: Duration) -> Self {
        self.expire = expire;
        self
    }

    /// Set the sweeper cadence.
    pub fn with_sweep_cadence(mut self, sweep: SweepCadence) -> Self {
        self.sweep = sweep;
        self
    }

    /// Parse `addr` into a host and port.
    pub(crate) fn endpoint(&self) -> Result<(String, u16)> {
        let (host, port) = self
            .addr
            .rsplit_once(':')
            .ok_or_else(|| Error::Config(format!("address `{}` is not host:port", self.addr)))?;
        if host.is_empty() {
            return Err(Error::Config(format!(
                "address `{}` has an empty host",
                self.addr
            )));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| Error::Config(format!("address `{}` has an invalid port", self.addr)))?;
        Ok((host.to_string(), port))
    }

    /// Fail-fast validation, run once at startup.
    pub(crate) fn validate(&self) -> Result<()> {
        self.endpoint()?;
        if self.max_active == 0 {
            return Err(Error::Config("max_active must be at least 1".to_string()));
        }
        Ok(())
    }
}
