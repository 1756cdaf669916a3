//! Session lifecycle management.
//!
//! A manager owns the collection of live sessions for one backend:
//! create/get/delete plus the staleness clock reset, with one
//! expiration sweeper per manager evicting sessions whose clock has
//! run past the expire window. All collection access is behind a
//! single reader/writer lock; sweep deletions take the same lock as
//! explicit deletions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{BackendConfig, MemoryConfig, RedisConfig, SweepCadence};
use crate::error::{Error, Result};
use crate::redis_store::RedisStore;
use crate::session::{MemorySession, RedisSession, Session};
use crate::store::RemoteStore;
use crate::sweep::{SweepHandle, Sweepable};

/// Construct the process-wide manager for the selected backend.
///
/// Intended to be called once at startup; the caller owns the returned
/// handle and threads it through to application code. Each call builds
/// an independent manager with its own session collection and sweeper.
///
/// Must be called within a tokio runtime (the sweeper task is spawned
/// here).
///
/// # Errors
///
/// Returns `Config` if the selected backend's configuration does not
/// validate.
pub fn init(config: BackendConfig) -> Result<SessionManager> {
    match config {
        BackendConfig::Memory(config) => Ok(SessionManager::Memory(MemoryManager::new(config))),
        BackendConfig::Redis(config) => Ok(SessionManager::Redis(RedisManager::connect(config)?)),
    }
}

/// The manager for the selected backend.
pub enum SessionManager {
    Memory(MemoryManager),
    Redis(RedisManager),
}

impl SessionManager {
    /// Create a session, overwriting any existing entry with the same id.
    pub async fn create_session(&self, id: impl Into<String>) -> Session {
        match self {
            SessionManager::Memory(manager) => manager.create_session(id).await,
            SessionManager::Redis(manager) => manager.create_session(id).await,
        }
    }

    /// Look up a live session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the id was never created, was
    /// deleted, or has been swept.
    pub async fn get_session(&self, id: &str) -> Result<Session> {
        match self {
            SessionManager::Memory(manager) => manager.get_session(id).await,
            SessionManager::Redis(manager) => manager.get_session(id).await,
        }
    }

    /// Delete a session. Deleting an unknown id is a no-op.
    pub async fn del_session(&self, id: &str) -> Result<()> {
        match self {
            SessionManager::Memory(manager) => manager.del_session(id).await,
            SessionManager::Redis(manager) => manager.del_session(id).await,
        }
    }

    /// Refresh the staleness clock of a session, if present.
    pub async fn reset_last_update(&self, id: &str) {
        match self {
            SessionManager::Memory(manager) => manager.reset_last_update(id).await,
            SessionManager::Redis(manager) => manager.reset_last_update(id).await,
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        match self {
            SessionManager::Memory(manager) => manager.len().await,
            SessionManager::Redis(manager) => manager.len().await,
        }
    }

    /// Whether the manager holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop the expiration sweeper and consume the manager.
    pub async fn shutdown(self) {
        match self {
            SessionManager::Memory(manager) => manager.shutdown().await,
            SessionManager::Redis(manager) => manager.shutdown().await,
        }
    }
}

struct MemoryInner {
    sessions: RwLock<HashMap<String, Arc<MemorySession>>>,
    expire: Duration,
}

#[async_trait]
impl Sweepable for MemoryInner {
    async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn sweep_once(&self) -> usize {
        let expired: Vec<String> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, session)| session.is_expired(self.expire))
            .map(|(id, _)| id.clone())
            .collect();
        if expired.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        let mut removed = 0;
        for id in expired {
            // Re-check under the write lock; the clock may have been
            // reset since the scan.
            if sessions
                .get(&id)
                .is_some_and(|session| session.is_expired(self.expire))
            {
                sessions.remove(&id);
                debug!(session_id = %id, "expired session evicted");
                removed += 1;
            }
        }
        removed
    }
}

/// Manager for sessions held only in process memory.
pub struct MemoryManager {
    inner: Arc<MemoryInner>,
    sweeper: SweepHandle,
}

impl MemoryManager {
    /// Build the manager and start its sweeper.
    pub fn new(config: MemoryConfig) -> Self {
        let inner = Arc::new(MemoryInner {
            sessions: RwLock::new(HashMap::new()),
            expire: config.expire,
        });
        let sweeper = SweepHandle::spawn(inner.clone(), config.sweep);
        Self { inner, sweeper }
    }

    /// Create a session, overwriting any existing entry with the same id.
    pub async fn create_session(&self, id: impl Into<String>) -> Session {
        let id = id.into();
        let session = Arc::new(MemorySession::new(id.clone()));
        self.inner
            .sessions
            .write()
            .await
            .insert(id.clone(), session.clone());
        debug!(session_id = %id, "session created");
        Session::Memory(session)
    }

    /// Look up a live session.
    pub async fn get_session(&self, id: &str) -> Result<Session> {
        self.inner
            .sessions
            .read()
            .await
            .get(id)
            .cloned()
            .map(Session::Memory)
            .ok_or_else(|| Error::SessionNotFound { id: id.to_string() })
    }

    /// Delete a session. Deleting an unknown id is a no-op.
    pub async fn del_session(&self, id: &str) -> Result<()> {
        if self.inner.sessions.write().await.remove(id).is_some() {
            debug!(session_id = %id, "session deleted");
        }
        Ok(())
    }

    /// Refresh the staleness clock of a session, if present.
    pub async fn reset_last_update(&self, id: &str) {
        if let Some(session) = self.inner.sessions.read().await.get(id) {
            session.touch();
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Whether the manager holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.inner.sessions.read().await.is_empty()
    }

    /// Stop the expiration sweeper and consume the manager.
    pub async fn shutdown(self) {
        self.sweeper.stop().await;
    }
}

struct RedisInner {
    sessions: RwLock<HashMap<String, Arc<RedisSession>>>,
    store: Arc<dyn RemoteStore>,
    expire: Duration,
}

#[async_trait]
impl Sweepable for RedisInner {
    async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn sweep_once(&self) -> usize {
        let expired: Vec<String> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, session)| session.is_expired(self.expire))
            .map(|(id, _)| id.clone())
            .collect();
        if expired.is_empty() {
            return 0;
        }

        let mut evicted = Vec::new();
        {
            let mut sessions = self.sessions.write().await;
            for id in expired {
                if sessions
                    .get(&id)
                    .is_some_and(|session| session.is_expired(self.expire))
                {
                    sessions.remove(&id);
                    evicted.push(id);
                }
            }
        }

        // Remote deletes are best-effort: a failure on one session must
        // not abort the cycle, and the mirrored key still lapses via
        // its server-side TTL.
        for id in &evicted {
            match self.store.delete(id).await {
                Ok(()) => debug!(session_id = %id, "expired session evicted"),
                Err(err) => {
                    warn!(session_id = %id, error = %err, "failed to delete remote key for expired session");
                }
            }
        }
        evicted.len()
    }
}

/// Manager for sessions mirrored into a remote store.
pub struct RedisManager {
    inner: Arc<RedisInner>,
    sweeper: SweepHandle,
}

impl RedisManager {
    /// Build the manager against a Redis server and start its sweeper.
    ///
    /// No connection is established here; the pool dials lazily.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration does not validate.
    pub fn connect(config: RedisConfig) -> Result<Self> {
        let store = Arc::new(RedisStore::connect(&config)?);
        Ok(Self::with_store(store, config.expire, config.sweep))
    }

    /// Build the manager over an arbitrary remote store.
    ///
    /// This is the seam tests use to run the remote code path against
    /// [`InMemoryStore`](crate::InMemoryStore).
    pub fn with_store(store: Arc<dyn RemoteStore>, expire: Duration, sweep: SweepCadence) -> Self {
        let inner = Arc::new(RedisInner {
            sessions: RwLock::new(HashMap::new()),
            store,
            expire,
        });
        let sweeper = SweepHandle::spawn(inner.clone(), sweep);
        Self { inner, sweeper }
    }

    /// Create a session, overwriting any existing entry with the same id.
    ///
    /// The session mirrors its bag into the remote store with the
    /// manager's expire window as the server-side TTL.
    pub async fn create_session(&self, id: impl Into<String>) -> Session {
        let id = id.into();
        let session = Arc::new(RedisSession::new(
            id.clone(),
            self.inner.store.clone(),
            Some(self.inner.expire),
        ));
        self.inner
            .sessions
            .write()
            .await
            .insert(id.clone(), session.clone());
        debug!(session_id = %id, "session created");
        Session::Redis(session)
    }

    /// Look up a live session.
    pub async fn get_session(&self, id: &str) -> Result<Session> {
        self.inner
            .sessions
            .read()
            .await
            .get(id)
            .cloned()
            .map(Session::Redis)
            .ok_or_else(|| Error::SessionNotFound { id: id.to_string() })
    }

    /// Delete a session locally and remove its key from the remote
    /// store. Deleting an unknown id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `BackendConnection`/`BackendWrite` if the remote delete
    /// fails. The local entry is already gone by then; the mirrored
    /// key still lapses via its server-side TTL.
    pub async fn del_session(&self, id: &str) -> Result<()> {
        if self.inner.sessions.write().await.remove(id).is_none() {
            return Ok(());
        }
        self.inner.store.delete(id).await?;
        debug!(session_id = %id, "session deleted");
        Ok(())
    }

    /// Refresh the staleness clock of a session, if present.
    pub async fn reset_last_update(&self, id: &str) {
        if let Some(session) = self.inner.sessions.read().await.get(id) {
            session.touch();
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Whether the manager holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.inner.sessions.read().await.is_empty()
    }

    /// Stop the expiration sweeper and consume the manager.
    ///
    /// Live sessions are dropped locally; their remote keys lapse via
    /// their server-side TTL.
    pub async fn shutdown(self) {
        self.sweeper.stop().await;
    }
}
