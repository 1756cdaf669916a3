//! Pluggable session store with automatic expiration.
//!
//! Sessions are keyed bags of JSON attributes. A [`SessionManager`]
//! owns the collection of live sessions for one backend, selected once
//! at startup:
//! - in-memory: sessions live in the process and die with it
//! - Redis-backed: every write mirrors the whole bag into Redis, so a
//!   session can be picked up by another process
//!
//! A background sweeper per manager evicts sessions whose staleness
//! clock has run past the configured expire window.
//!
//! # Example
//!
//! ```rust,ignore
//! use satchel::{init, BackendConfig};
//!
//! let manager = init(BackendConfig::memory())?;
//! let session = manager.create_session("abc123").await;
//! session.set("username", "zhangsan").await?;
//! let name = session.get("username").await?;
//! ```

mod config;
mod error;
mod manager;
mod pool;
mod redis_store;
mod session;
mod store;
mod sweep;

pub use config::{BackendConfig, MemoryConfig, RedisConfig, SweepCadence};
pub use config::{
    DEFAULT_EXPIRE, DEFAULT_IDLE_BACKOFF, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_ACTIVE,
    DEFAULT_MAX_IDLE, DEFAULT_SWEEP_INTERVAL,
};
pub use error::{Error, Result};
pub use manager::{init, MemoryManager, RedisManager, SessionManager};
pub use pool::{DialFn, Pool, PoolConfig, PooledConn};
pub use redis_store::RedisStore;
pub use session::{Attributes, MemorySession, RedisSession, Session};
pub use store::{InMemoryStore, RemoteStore};
