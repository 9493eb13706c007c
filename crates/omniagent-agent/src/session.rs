//! In-memory session handles, keyed by session id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex, MutexGuard, Weak};
use std::time::Duration;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tokio::sync::Mutex;

use omniagent_core::config::SessionConfig;
use omniagent_core::types::{ChatMessage, SessionId};

/// Transcript of one session plus whether it was seeded from the store.
#[derive(Debug, Default)]
pub struct Transcript {
    pub messages: Vec<ChatMessage>,
    pub loaded: bool,
}

/// A live session. Runs on the same session serialize on `transcript`.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub transcript: Mutex<Transcript>,
}

impl Session {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            transcript: Mutex::new(Transcript::default()),
        }
    }
}

/// Bounded LRU + idle-timeout map from session id to [`Session`].
///
/// Eviction only drops memory; the next run on an evicted id reloads its
/// history from the store. A handle that is still held somewhere, such as
/// by an in-flight run, is handed out again instead of a fresh one, so
/// runs on one id stay serialized across evictions.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Cache<String, Arc<Session>>,
    live: Arc<SyncMutex<HashMap<String, Weak<Session>>>>,
}

impl SessionRegistry {
    pub fn new(capacity: u64, idle: Duration) -> Self {
        Self {
            sessions: Cache::builder()
                .max_capacity(capacity)
                .time_to_idle(idle)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
            live: Arc::new(SyncMutex::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        )
    }

    /// Existing handle for `id`, or a fresh unloaded one.
    pub fn get_or_create(&self, id: &SessionId) -> Arc<Session> {
        let key = id.as_str();
        let mut live = self.live();
        if let Some(session) = live.get(key).and_then(Weak::upgrade) {
            // Re-cache a handle that was evicted while still in use
            if !self.sessions.contains_key(key) {
                self.sessions.insert(key.to_string(), session.clone());
            }
            return session;
        }

        live.retain(|_, w| w.strong_count() > 0);
        let session = self
            .sessions
            .get_with(key.to_string(), || Arc::new(Session::new(id.clone())));
        live.insert(key.to_string(), Arc::downgrade(&session));
        session
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id.as_str())
    }

    /// Forget `id`. Holders of the old handle keep it; later lookups get a
    /// fresh one.
    pub fn remove(&self, id: &SessionId) {
        self.live().remove(id.as_str());
        self.sessions.invalidate(id.as_str());
    }

    fn live(&self) -> MutexGuard<'_, HashMap<String, Weak<Session>>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Approximate number of live entries.
    pub fn len(&self) -> u64 {
        self.sessions.run_pending_tasks();
        self.sessions.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("entries", &self.sessions.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_id_same_handle() {
        let registry = SessionRegistry::new(8, Duration::from_secs(60));
        let a = registry.get_or_create(&SessionId::from("a"));
        let again = registry.get_or_create(&SessionId::from("a"));
        let b = registry.get_or_create(&SessionId::from("b"));
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_drops_state() {
        let registry = SessionRegistry::new(8, Duration::from_secs(60));
        let id = SessionId::from("a");
        {
            let session = registry.get_or_create(&id);
            let mut t = session.transcript.lock().await;
            t.messages.push(ChatMessage::user("hi"));
            t.loaded = true;
        }
        registry.remove(&id);
        assert!(registry.get(&id).is_none());

        let fresh = registry.get_or_create(&id);
        let t = fresh.transcript.lock().await;
        assert!(t.messages.is_empty());
        assert!(!t.loaded);
    }

    #[tokio::test]
    async fn test_evicted_session_in_use_is_reused() {
        let registry = SessionRegistry::new(1, Duration::from_secs(60));
        let id = SessionId::from("busy");
        let held = registry.get_or_create(&id);
        let guard = held.transcript.lock().await;

        // Evicted from the cache while the run still holds it
        registry.sessions.invalidate(id.as_str());
        assert!(registry.get(&id).is_none());

        let again = registry.get_or_create(&id);
        assert!(Arc::ptr_eq(&held, &again));
        // Still serialized behind the in-flight holder
        assert!(again.transcript.try_lock().is_err());
        drop(guard);
        assert!(again.transcript.try_lock().is_ok());
    }

    #[test]
    fn test_released_session_is_not_pinned() {
        let registry = SessionRegistry::new(8, Duration::from_secs(60));
        let id = SessionId::from("done");
        let first = Arc::downgrade(&registry.get_or_create(&id));
        registry.sessions.invalidate(id.as_str());
        registry.sessions.run_pending_tasks();
        assert!(first.upgrade().is_none());

        let fresh = registry.get_or_create(&id);
        assert!(Arc::ptr_eq(&fresh, &registry.get_or_create(&id)));
        assert!(registry.live().len() == 1);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let registry = SessionRegistry::new(2, Duration::from_secs(60));
        for i in 0..10 {
            registry.get_or_create(&SessionId::from(format!("s{}", i)));
        }
        assert!(registry.len() <= 2);
    }
}
