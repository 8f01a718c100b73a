//! In-memory session cache.
//!
//! Password verification happens once at login; afterward the session token
//! is the sole proof of identity, resolved entirely from this cache. There
//! is no backing database to fall back to on a cache miss.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::store::User;

const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Clone)]
struct SessionEntry {
    username: String,
    user: User,
    expires_at: Instant,
}

/// In-memory session store, keyed by opaque session token.
#[derive(Clone, Default)]
pub struct SessionCache {
    sessions: Arc<DashMap<String, SessionEntry>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new session for `username`, valid for the default TTL.
    pub fn insert(&self, token: String, username: String, user: User) {
        self.sessions.insert(
            token,
            SessionEntry {
                username,
                user,
                expires_at: Instant::now() + SESSION_TTL,
            },
        );
    }

    /// Resolve a session token to its `(username, User)`, if present and unexpired.
    pub fn get(&self, token: &str) -> Option<(String, User)> {
        let entry = self.sessions.get(token)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.sessions.remove(token);
            return None;
        }
        Some((entry.username.clone(), entry.user.clone()))
    }

    /// Remove a single session (e.g. on logout).
    pub fn evict(&self, token: &str) {
        self.sessions.remove(token);
    }

    /// Remove all expired sessions. Returns the number evicted.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.expires_at > now);
        before - self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            hash: "hash".into(),
            full_name: "Alice".into(),
            role: "reader".into(),
            custom_permissions: None,
        }
    }

    #[test]
    fn round_trips_a_session() {
        let cache = SessionCache::new();
        cache.insert("tok".into(), "alice".into(), user());
        let (username, resolved) = cache.get("tok").unwrap();
        assert_eq!(username, "alice");
        assert_eq!(resolved.full_name, "Alice");
    }

    #[test]
    fn evict_removes_session() {
        let cache = SessionCache::new();
        cache.insert("tok".into(), "alice".into(), user());
        cache.evict("tok");
        assert!(cache.get("tok").is_none());
    }

    #[test]
    fn cleanup_expired_is_a_noop_on_fresh_sessions() {
        let cache = SessionCache::new();
        cache.insert("tok".into(), "alice".into(), user());
        assert_eq!(cache.cleanup_expired(), 0);
    }
}
