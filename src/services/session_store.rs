//! In-memory session store keyed by the id carried in the session cookie.

use crate::models::session::Session;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

pub const SESSION_COOKIE_NAME: &str = "photoframe.sid";

/// Result of looking up a session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup {
    Active(Session),
    /// The session existed but outlived `max_age`; it has been destroyed.
    Expired,
    Missing,
}

pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
    max_age: Duration,
}

impl SessionStore {
    pub fn new(max_age: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn lookup(&self, id: &Uuid) -> SessionLookup {
        self.lookup_at(id, Utc::now())
    }

    pub fn lookup_at(&self, id: &Uuid, now: DateTime<Utc>) -> SessionLookup {
        let mut sessions = self.sessions.lock();
        match sessions.get(id) {
            None => return SessionLookup::Missing,
            Some(session) if !session.is_expired(now, self.max_age) => {
                return SessionLookup::Active(session.clone());
            }
            Some(_) => {}
        }
        sessions.remove(id);
        debug!(session = %id, "session expired");
        SessionLookup::Expired
    }

    /// Apply `update` to the session `id`, creating a fresh session when the
    /// id is absent or unknown. Returns the id the caller should hand back
    /// in the cookie.
    pub fn upsert<F>(&self, id: Option<Uuid>, update: F) -> Uuid
    where
        F: FnOnce(&mut Session),
    {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        let id = match id {
            Some(id) if sessions.contains_key(&id) => id,
            _ => {
                let id = Uuid::new_v4();
                sessions.insert(id, Session::new(now));
                id
            }
        };
        if let Some(session) = sessions.get_mut(&id) {
            update(session);
        }
        id
    }

    /// Move the session `id` (or a fresh one) to a newly issued id and apply
    /// `update` to it. Used whenever a login changes what the session may
    /// do, so an id known before the login never carries the new privileges.
    pub fn rotate<F>(&self, id: Option<Uuid>, update: F) -> Uuid
    where
        F: FnOnce(&mut Session),
    {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        let mut session = id
            .and_then(|old| sessions.remove(&old))
            .unwrap_or_else(|| Session::new(now));
        update(&mut session);
        let fresh = Uuid::new_v4();
        sessions.insert(fresh, session);
        debug!(session = %fresh, "session id rotated");
        fresh
    }

    pub fn destroy(&self, id: &Uuid) -> bool {
        self.sessions.lock().remove(id).is_some()
    }

    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now, self.max_age));
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, "purged expired sessions");
        }
        removed
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::Role;

    #[test]
    fn upsert_creates_then_updates_in_place() {
        let store = SessionStore::default();
        let id = store.upsert(None, |s| s.role = Some(Role::Guest));
        let same = store.upsert(Some(id), |s| s.role = Some(Role::Admin));
        assert_eq!(id, same);
        assert_eq!(store.len(), 1);

        match store.lookup(&id) {
            SessionLookup::Active(session) => assert_eq!(session.role, Some(Role::Admin)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_id_gets_a_new_session() {
        let store = SessionStore::default();
        let stale = Uuid::new_v4();
        let id = store.upsert(Some(stale), |_| {});
        assert_ne!(id, stale);
        assert_eq!(store.lookup(&stale), SessionLookup::Missing);
    }

    #[test]
    fn expired_sessions_are_destroyed_on_lookup() {
        let store = SessionStore::default();
        let id = store.upsert(None, |s| {
            s.role = Some(Role::Admin);
            s.login_time = Some(Utc::now() - Duration::hours(25));
        });
        assert_eq!(store.lookup(&id), SessionLookup::Expired);
        assert_eq!(store.lookup(&id), SessionLookup::Missing);
    }

    #[test]
    fn purge_keeps_live_sessions() {
        let store = SessionStore::default();
        store.upsert(None, |s| s.login_time = Some(Utc::now() - Duration::hours(30)));
        let live = store.upsert(None, |s| s.role = Some(Role::Slideshow));
        assert_eq!(store.purge_expired(), 1);
        assert!(matches!(store.lookup(&live), SessionLookup::Active(_)));
    }

    #[test]
    fn destroy_removes_session() {
        let store = SessionStore::default();
        let id = store.upsert(None, |_| {});
        assert!(store.destroy(&id));
        assert!(store.is_empty());
    }

    #[test]
    fn rotate_issues_a_new_id_and_keeps_the_data() {
        let store = SessionStore::default();
        let old = store.upsert(None, |s| s.role = Some(Role::Slideshow));
        let fresh = store.rotate(Some(old), |s| s.login_time = Some(Utc::now()));

        assert_ne!(fresh, old);
        assert_eq!(store.lookup(&old), SessionLookup::Missing);
        assert_eq!(store.len(), 1);
        match store.lookup(&fresh) {
            SessionLookup::Active(session) => {
                assert_eq!(session.role, Some(Role::Slideshow));
                assert!(session.login_time.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }

        let planted = Uuid::new_v4();
        let id = store.rotate(Some(planted), |s| s.role = Some(Role::Admin));
        assert_ne!(id, planted);
        assert_eq!(store.lookup(&planted), SessionLookup::Missing);
        assert_eq!(store.len(), 2);
    }
}
