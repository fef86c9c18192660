/// Session registry
///
/// Owns every session record. Each session lives in its own slot guarded by
/// its own mutex, so mutations of one session are serialized while distinct
/// sessions never wait on each other. The id map is behind a read-mostly
/// lock that is only held long enough to find or insert a slot.
///
/// Lock order is always map then slot, never the reverse. Code that already
/// holds a slot lock must not touch the map, and no store write happens
/// while the map lock is held.
use crate::db::SessionStore;
use crate::error::{Result, ServiceError};
use crate::models::{Session, SessionState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

struct SessionEntry {
    session: Session,
    /// Set when the session could not be written through on creation. The
    /// slot is about to leave the map and the session never existed.
    retired: bool,
}

type SessionSlot = Arc<Mutex<SessionEntry>>;

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionSlot>>,
    store: Option<Arc<dyn SessionStore>>,
}

impl SessionRegistry {
    /// Create an empty, memory-only registry
    pub fn new() -> Self {
        SessionRegistry {
            sessions: RwLock::new(HashMap::new()),
            store: None,
        }
    }

    /// Create a registry backed by `store`, restoring every persisted session
    pub fn with_store(store: Arc<dyn SessionStore>) -> Result<Self> {
        let restored = store.load_all()?;
        log::info!("Restored {} session(s) from storage", restored.len());

        let sessions: HashMap<String, SessionSlot> = restored
            .into_iter()
            .map(|session| {
                let id = session.id.clone();
                let entry = SessionEntry {
                    session,
                    retired: false,
                };
                (id, Arc::new(Mutex::new(entry)))
            })
            .collect();

        Ok(SessionRegistry {
            sessions: RwLock::new(sessions),
            store: Some(store),
        })
    }

    /// Create a session owned by `owner_key`.
    ///
    /// A missing or empty `session_id` gets a generated UUID. An id already
    /// in use fails with `DuplicateSession` unless that session is closed, in
    /// which case the closed session is replaced.
    ///
    /// The map lock only covers the duplicate check and the insert. The new
    /// slot is locked before it becomes visible and stays locked while it is
    /// written through, so other sessions are never held up by the store.
    pub fn create_session(&self, session_id: Option<&str>, owner_key: &str) -> Result<Session> {
        let id = match session_id.filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => loop {
                let candidate = Uuid::new_v4().to_string();
                if !self.sessions.read()?.contains_key(&candidate) {
                    break candidate;
                }
            },
        };

        let session = Session::new(&id, owner_key);

        loop {
            let mut sessions = self.sessions.write()?;
            let existing = match sessions.get(&id).cloned() {
                Some(existing) => existing,
                None => {
                    let slot = Arc::new(Mutex::new(SessionEntry {
                        session: session.clone(),
                        retired: false,
                    }));
                    let mut entry = slot.lock()?;
                    sessions.insert(id.clone(), slot.clone());
                    drop(sessions);

                    if let Err(e) = self.persist(&entry.session) {
                        log::error!("Failed to persist new session {}: {}", id, e);
                        entry.retired = true;
                        drop(entry);
                        self.discard(&id, &slot)?;
                        return Err(e);
                    }

                    log::info!("Created session {} owned by {}", id, owner_key);
                    return Ok(session);
                }
            };
            drop(sessions);

            let mut entry = existing.lock()?;
            if entry.retired {
                drop(entry);
                self.discard(&id, &existing)?;
                continue;
            }
            if !entry.session.is_closed() {
                return Err(ServiceError::DuplicateSession(id));
            }

            self.persist(&session)?;
            entry.session = session.clone();
            log::info!("Replaced closed session {} with one owned by {}", id, owner_key);
            return Ok(session);
        }
    }

    /// Snapshot of a session
    pub fn lookup(&self, session_id: &str) -> Result<Session> {
        self.read(session_id, |session| session.clone())
    }

    /// Close a session. Closing a closed session succeeds without change.
    pub fn close(&self, session_id: &str) -> Result<()> {
        self.update(session_id, |session| {
            if session.state != SessionState::Closed {
                session.state = SessionState::Closed;
                log::info!("Closed session {}", session.id);
            }
            Ok(())
        })
    }

    /// Run `f` against the current state of a session under its lock
    pub fn read<R>(&self, session_id: &str, f: impl FnOnce(&Session) -> R) -> Result<R> {
        let slot = self.slot(session_id)?;
        let entry = slot.lock()?;
        if entry.retired {
            return Err(ServiceError::SessionNotFound(session_id.to_string()));
        }
        Ok(f(&entry.session))
    }

    /// Mutate a session under its lock.
    ///
    /// When a store is attached and `f` changed the session, the new state is
    /// written through before the lock is released. A failed write restores
    /// the previous in-memory state and returns the storage error.
    pub fn update<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) -> Result<R>,
    ) -> Result<R> {
        let slot = self.slot(session_id)?;
        let mut entry = slot.lock()?;
        if entry.retired {
            return Err(ServiceError::SessionNotFound(session_id.to_string()));
        }

        let before = self.store.as_ref().map(|_| entry.session.clone());
        let result = f(&mut entry.session)?;

        if let Some(before) = before {
            if before != entry.session {
                if let Err(e) = self.persist(&entry.session) {
                    log::error!("Failed to persist session {}: {}", session_id, e);
                    entry.session = before;
                    return Err(e);
                }
            }
        }

        Ok(result)
    }

    /// Number of sessions known to the registry, closed ones included
    pub fn len(&self) -> Result<usize> {
        Ok(self.sessions.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn slot(&self, session_id: &str) -> Result<SessionSlot> {
        self.sessions
            .read()?
            .get(session_id)
            .cloned()
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))
    }

    /// Drop `slot` from the map if it is still the one registered for `session_id`
    fn discard(&self, session_id: &str, slot: &SessionSlot) -> Result<()> {
        let mut sessions = self.sessions.write()?;
        if sessions
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            sessions.remove(session_id);
        }
        Ok(())
    }

    fn persist(&self, session: &Session) -> Result<()> {
        match &self.store {
            Some(store) => store.save(session),
            None => Ok(()),
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteSessionStore;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    struct FailingStore;

    impl SessionStore for FailingStore {
        fn save(&self, _session: &Session) -> Result<()> {
            Err(ServiceError::Storage("disk full".to_string()))
        }

        fn load_all(&self) -> Result<Vec<Session>> {
            Ok(Vec::new())
        }
    }

    /// Store whose writes for one session id stall until released
    struct SlowStore {
        slow_id: &'static str,
        started: Mutex<mpsc::Sender<()>>,
        delay: Duration,
    }

    impl SessionStore for SlowStore {
        fn save(&self, session: &Session) -> Result<()> {
            if session.id == self.slow_id {
                self.started.lock()?.send(()).ok();
                thread::sleep(self.delay);
            }
            Ok(())
        }

        fn load_all(&self) -> Result<Vec<Session>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_create_then_lookup() {
        let registry = SessionRegistry::new();
        registry.create_session(Some("s1"), "owner_pk").unwrap();

        let session = registry.lookup("s1").unwrap();
        assert_eq!(session.participant_keys(), vec!["owner_pk"]);
        assert_eq!(session.state, SessionState::Created);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let registry = SessionRegistry::new();
        let a = registry.create_session(None, "owner_pk").unwrap();
        let b = registry.create_session(None, "owner_pk").unwrap();

        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
        assert_eq!(registry.len().unwrap(), 2);
    }

    #[test]
    fn test_empty_id_is_generated() {
        let registry = SessionRegistry::new();
        let session = registry.create_session(Some(""), "owner_pk").unwrap();

        assert!(!session.id.is_empty());
    }

    #[test]
    fn test_duplicate_session_rejected() {
        let registry = SessionRegistry::new();
        registry.create_session(Some("s1"), "alice").unwrap();

        let result = registry.create_session(Some("s1"), "bob");
        assert!(matches!(result, Err(ServiceError::DuplicateSession(id)) if id == "s1"));
        assert_eq!(registry.lookup("s1").unwrap().owner_key, "alice");
    }

    #[test]
    fn test_closed_session_id_can_be_reused() {
        let registry = SessionRegistry::new();
        registry.create_session(Some("s1"), "alice").unwrap();
        registry.close("s1").unwrap();

        let session = registry.create_session(Some("s1"), "bob").unwrap();
        assert_eq!(session.owner_key, "bob");
        assert_eq!(registry.lookup("s1").unwrap().state, SessionState::Created);
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn test_lookup_missing_session() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.lookup("missing"),
            Err(ServiceError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.create_session(Some("s1"), "alice").unwrap();

        registry.close("s1").unwrap();
        registry.close("s1").unwrap();

        assert_eq!(registry.lookup("s1").unwrap().state, SessionState::Closed);
        assert!(matches!(
            registry.close("missing"),
            Err(ServiceError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_update_missing_session() {
        let registry = SessionRegistry::new();

        let result = registry.update("missing", |_| Ok(()));
        assert!(matches!(result, Err(ServiceError::SessionNotFound(id)) if id == "missing"));
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let registry = SessionRegistry {
            sessions: RwLock::new(HashMap::new()),
            store: None,
        };
        registry.create_session(Some("s1"), "alice").unwrap();
        let registry = SessionRegistry {
            sessions: registry.sessions,
            store: Some(Arc::new(FailingStore)),
        };

        let result = registry.close("s1");

        assert!(matches!(result, Err(ServiceError::Storage(_))));
        assert_eq!(registry.lookup("s1").unwrap().state, SessionState::Created);
    }

    #[test]
    fn test_create_not_registered_when_write_fails() {
        let registry = SessionRegistry::with_store(Arc::new(FailingStore)).unwrap();

        assert!(registry.create_session(Some("s1"), "alice").is_err());
        assert!(registry.is_empty().unwrap());
        assert!(matches!(
            registry.lookup("s1"),
            Err(ServiceError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_closed_session_kept_when_replacement_write_fails() {
        let registry = SessionRegistry::new();
        registry.create_session(Some("s1"), "alice").unwrap();
        registry.close("s1").unwrap();
        let registry = SessionRegistry {
            sessions: registry.sessions,
            store: Some(Arc::new(FailingStore)),
        };

        assert!(registry.create_session(Some("s1"), "bob").is_err());

        let session = registry.lookup("s1").unwrap();
        assert_eq!(session.owner_key, "alice");
        assert_eq!(session.state, SessionState::Closed);
    }

    #[test]
    fn test_slow_create_does_not_block_other_sessions() {
        let (tx, rx) = mpsc::channel();
        let store = SlowStore {
            slow_id: "slow",
            started: Mutex::new(tx),
            delay: Duration::from_millis(800),
        };
        let registry = Arc::new(SessionRegistry::with_store(Arc::new(store)).unwrap());
        registry.create_session(Some("other"), "alice").unwrap();

        let creator = {
            let registry = registry.clone();
            thread::spawn(move || registry.create_session(Some("slow"), "bob"))
        };
        rx.recv().unwrap();

        let start = Instant::now();
        let session = registry.lookup("other").unwrap();
        registry.close("other").unwrap();
        let elapsed = start.elapsed();

        assert_eq!(session.owner_key, "alice");
        assert!(elapsed < Duration::from_millis(300), "took {:?}", elapsed);

        // the pending session itself is only visible once written through
        assert_eq!(registry.lookup("slow").unwrap().owner_key, "bob");
        assert!(creator.join().unwrap().is_ok());
    }

    #[test]
    fn test_restore_from_store() {
        let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::open_in_memory().unwrap());
        {
            let registry = SessionRegistry::with_store(store.clone()).unwrap();
            registry.create_session(Some("s1"), "alice").unwrap();
            registry.close("s1").unwrap();
        }

        let restored = SessionRegistry::with_store(store).unwrap();
        assert_eq!(restored.lookup("s1").unwrap().state, SessionState::Closed);
    }
}
