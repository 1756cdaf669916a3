//! Remote store contract for mirrored session bags.
//!
//! This module defines the seam between sessions and the transport so
//! the Redis-backed variant can be exercised without a live server.
//! Payloads are opaque bytes at this layer; bag serialization stays
//! with the session so wire-format failures and transport failures
//! surface as distinct errors.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;

/// Whole-bag key/value operations against a remote store.
///
/// One key per session id; the value is the serialized attribute bag,
/// always written as a whole-value overwrite.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one store handle is shared
/// by every session of a manager.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the payload stored under `session_id`.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    async fn load(&self, session_id: &str) -> Result<Option<Vec<u8>>>;

    /// Overwrite the payload stored under `session_id`.
    ///
    /// When `ttl` is given the key expires server-side after that
    /// duration; every write refreshes it.
    async fn store(&self, session_id: &str, payload: &[u8], ttl: Option<Duration>) -> Result<()>;

    /// Delete the key for `session_id`. Deleting an absent key is not
    /// an error.
    async fn delete(&self, session_id: &str) -> Result<()>;
}

/// An in-process [`RemoteStore`] backed by a plain map.
///
/// Stands in for the real server in tests and local development. The
/// `ttl` argument is ignored; expiry of in-process state is the
/// manager's job.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored payload for a session id, for inspection in tests.
    pub fn raw(&self, session_id: &str) -> Option<Vec<u8>> {
        self.entries.lock().get(session_id).cloned()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn load(&self, session_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(session_id).cloned())
    }

    async fn store(&self, session_id: &str, payload: &[u8], _ttl: Option<Duration>) -> Result<()> {
        self.entries
            .lock()
            .insert(session_id.to_string(), payload.to_vec());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.entries.lock().remove(session_id);
        Ok(())
    }
}
