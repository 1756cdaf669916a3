//! Per-backend session variants.
//!
//! A session is a bag of JSON attributes keyed by name, guarded by one
//! reader/writer lock so concurrent readers proceed in parallel and a
//! writer excludes all others. The Redis variant additionally mirrors
//! the whole bag into a remote store under the session id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::store::RemoteStore;

/// The full attribute set of one session, treated as an atomic unit
/// for remote reads and writes.
pub type Attributes = HashMap<String, Value>;

/// A session held only in process memory.
pub struct MemorySession {
    id: String,
    created_at: DateTime<Utc>,
    bag: RwLock<Attributes>,
    last_update: Mutex<Instant>,
}

impl MemorySession {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            bag: RwLock::new(Attributes::new()),
            last_update: Mutex::new(Instant::now()),
        }
    }

    /// The session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the session object was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Store an attribute.
    pub async fn set(&self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value).map_err(Error::Serialization)?;
        self.bag.write().await.insert(key.into(), value);
        Ok(())
    }

    /// Fetch an attribute.
    ///
    /// # Errors
    ///
    /// Returns `AttributeNotFound` if the key was never set.
    pub async fn get(&self, key: &str) -> Result<Value> {
        self.bag
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| Error::AttributeNotFound {
                key: key.to_string(),
            })
    }

    /// Remove an attribute. Removing an absent key is not an error.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.bag.write().await.remove(key);
        Ok(())
    }

    pub(crate) fn touch(&self) {
        *self.last_update.lock() = Instant::now();
    }

    pub(crate) fn is_expired(&self, expire: Duration) -> bool {
        self.last_update.lock().elapsed() > expire
    }
}

/// A session mirrored into a remote store.
///
/// The local bag is a cache of the remote bag: every write pushes the
/// whole bag to the store, and any local miss replaces the bag
/// wholesale with the fetched one. A miss may mean the key was never
/// set, or that the session is simply not resident in this process in
/// a multi-process deployment; the remote store is the cross-process
/// source of truth.
pub struct RedisSession {
    id: String,
    created_at: DateTime<Utc>,
    bag: RwLock<Attributes>,
    store: Arc<dyn RemoteStore>,
    remote_ttl: Option<Duration>,
    last_update: Mutex<Instant>,
}

impl RedisSession {
    pub(crate) fn new(
        id: impl Into<String>,
        store: Arc<dyn RemoteStore>,
        remote_ttl: Option<Duration>,
    ) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            bag: RwLock::new(Attributes::new()),
            store,
            remote_ttl,
            last_update: Mutex::new(Instant::now()),
        }
    }

    /// The session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the session object was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Store an attribute locally and write the whole bag through to
    /// the remote store.
    ///
    /// The local insert is not rolled back if the remote write fails;
    /// local state may run ahead of the store until the next
    /// successful write (at-most-eventually-consistent, write-through,
    /// no rollback).
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the bag cannot be encoded, or
    /// `BackendConnection`/`BackendWrite` if the remote write fails.
    pub async fn set(&self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value).map_err(Error::Serialization)?;
        let mut bag = self.bag.write().await;
        bag.insert(key.into(), value);
        let payload = serde_json::to_vec(&*bag).map_err(Error::Serialization)?;
        self.store.store(&self.id, &payload, self.remote_ttl).await
    }

    /// Fetch an attribute, consulting the local bag first.
    ///
    /// On a local miss the whole bag is refreshed from the remote
    /// store before the key is looked up again. The refresh replaces
    /// the local bag wholesale (last writer wins at bag granularity);
    /// locally buffered keys that never reached the store are lost.
    ///
    /// # Errors
    ///
    /// Returns `AttributeNotFound` if the key is absent after the
    /// refresh, `BackendConnection`/`BackendRead` on transport
    /// failure, or `Deserialization` if the stored payload does not
    /// decode.
    pub async fn get(&self, key: &str) -> Result<Value> {
        if let Some(value) = self.bag.read().await.get(key) {
            trace!(session_id = %self.id, key = %key, "attribute found locally");
            return Ok(value.clone());
        }

        let mut bag = self.bag.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(value) = bag.get(key) {
            return Ok(value.clone());
        }

        debug!(session_id = %self.id, key = %key, "local miss, refreshing bag from remote store");
        let Some(payload) = self.store.load(&self.id).await? else {
            return Err(Error::AttributeNotFound {
                key: key.to_string(),
            });
        };
        let fetched: Attributes =
            serde_json::from_slice(&payload).map_err(Error::Deserialization)?;
        *bag = fetched;

        bag.get(key).cloned().ok_or_else(|| Error::AttributeNotFound {
            key: key.to_string(),
        })
    }

    /// Remove an attribute locally and write the remaining bag through
    /// to the remote store. Removing an absent key is a no-op and
    /// touches neither the bag nor the store.
    pub async fn remove(&self, key: &str) -> Result<()> {
        let mut bag = self.bag.write().await;
        if bag.remove(key).is_none() {
            return Ok(());
        }
        let payload = serde_json::to_vec(&*bag).map_err(Error::Serialization)?;
        self.store.store(&self.id, &payload, self.remote_ttl).await
    }

    pub(crate) fn touch(&self) {
        *self.last_update.lock() = Instant::now();
    }

    pub(crate) fn is_expired(&self, expire: Duration) -> bool {
        self.last_update.lock().elapsed() > expire
    }
}

/// A live session handed out by a [`SessionManager`](crate::SessionManager).
///
/// Cheap to clone; clones refer to the same underlying session.
#[derive(Clone)]
pub enum Session {
    Memory(Arc<MemorySession>),
    Redis(Arc<RedisSession>),
}

impl Session {
    /// The session identifier.
    pub fn id(&self) -> &str {
        match self {
            Session::Memory(session) => session.id(),
            Session::Redis(session) => session.id(),
        }
    }

    /// When the session object was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Session::Memory(session) => session.created_at(),
            Session::Redis(session) => session.created_at(),
        }
    }

    /// Store an attribute.
    pub async fn set(&self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        match self {
            Session::Memory(session) => session.set(key, value).await,
            Session::Redis(session) => session.set(key, value).await,
        }
    }

    /// Fetch an attribute.
    pub async fn get(&self, key: &str) -> Result<Value> {
        match self {
            Session::Memory(session) => session.get(key).await,
            Session::Redis(session) => session.get(key).await,
        }
    }

    /// Remove an attribute.
    pub async fn remove(&self, key: &str) -> Result<()> {
        match self {
            Session::Memory(session) => session.remove(key).await,
            Session::Redis(session) => session.remove(key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_set_then_get() {
        let session = MemorySession::new("s1");

        session.set("username", "zhangsan").await.unwrap();
        assert_eq!(session.get("username").await.unwrap(), json!("zhangsan"));
    }

    #[tokio::test]
    async fn test_memory_get_missing_attribute() {
        let session = MemorySession::new("s1");

        let result = session.get("missing").await;
        assert!(matches!(
            result,
            Err(Error::AttributeNotFound { key }) if key == "missing"
        ));
    }

    #[tokio::test]
    async fn test_memory_non_string_values() {
        let session = MemorySession::new("s1");

        session.set("count", 42).await.unwrap();
        session.set("tags", vec!["a", "b"]).await.unwrap();

        assert_eq!(session.get("count").await.unwrap(), json!(42));
        assert_eq!(session.get("tags").await.unwrap(), json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_memory_remove() {
        let session = MemorySession::new("s1");

        session.set("k", "v").await.unwrap();
        session.remove("k").await.unwrap();
        session.remove("never-set").await.unwrap();

        assert!(session.get("k").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_concurrent_writers() {
        let session = Arc::new(MemorySession::new("s1"));

        let mut handles = Vec::new();
        for i in 0..8 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                session.set(format!("k{i}"), i).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..8 {
            assert_eq!(session.get(&format!("k{i}")).await.unwrap(), json!(i));
        }
    }

    #[tokio::test]
    async fn test_redis_set_writes_whole_bag_through() {
        let store = Arc::new(InMemoryStore::new());
        let session = RedisSession::new("s2", store.clone(), None);

        session.set("a", "1").await.unwrap();
        session.set("b", "2").await.unwrap();

        let raw = store.raw("s2").unwrap();
        let decoded: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(decoded, json!({"a": "1", "b": "2"}));
    }

    #[tokio::test]
    async fn test_redis_miss_refreshes_from_store() {
        let store = Arc::new(InMemoryStore::new());

        // First instance writes; second instance for the same id has a
        // fresh local bag, simulating another process.
        let writer = RedisSession::new("s1", store.clone(), None);
        writer.set("username", "zhangsan").await.unwrap();

        let reader = RedisSession::new("s1", store.clone(), None);
        assert_eq!(reader.get("username").await.unwrap(), json!("zhangsan"));
    }

    #[tokio::test]
    async fn test_redis_miss_with_empty_store() {
        let store = Arc::new(InMemoryStore::new());
        let session = RedisSession::new("s1", store, None);

        let result = session.get("anything").await;
        assert!(matches!(result, Err(Error::AttributeNotFound { .. })));
    }

    #[tokio::test]
    async fn test_redis_refresh_replaces_bag_wholesale() {
        let store = Arc::new(InMemoryStore::new());

        let writer = RedisSession::new("s1", store.clone(), None);
        writer.set("remote-key", "remote-value").await.unwrap();

        // A reader that never stored anything refreshes on miss and
        // afterwards sees exactly the remote bag.
        let reader = RedisSession::new("s1", store.clone(), None);
        let _ = reader.get("remote-key").await.unwrap();

        let result = reader.get("never-anywhere").await;
        assert!(matches!(result, Err(Error::AttributeNotFound { .. })));
    }

    #[tokio::test]
    async fn test_redis_corrupt_payload_is_deserialization_error() {
        let store = Arc::new(InMemoryStore::new());
        store.store("s1", b"not json", None).await.unwrap();

        let session = RedisSession::new("s1", store, None);
        let result = session.get("k").await;
        assert!(matches!(result, Err(Error::Deserialization(_))));
    }

    #[tokio::test]
    async fn test_redis_remove_writes_remaining_bag() {
        let store = Arc::new(InMemoryStore::new());
        let session = RedisSession::new("s1", store.clone(), None);

        session.set("a", "1").await.unwrap();
        session.set("b", "2").await.unwrap();
        session.remove("a").await.unwrap();

        let decoded: Value = serde_json::from_slice(&store.raw("s1").unwrap()).unwrap();
        assert_eq!(decoded, json!({"b": "2"}));

        // The session key itself survives attribute removal.
        session.remove("b").await.unwrap();
        assert!(store.raw("s1").is_some());
    }
}
