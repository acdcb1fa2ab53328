//! Server-side sessions
//!
//! The cookie only carries an opaque token. Every lookup refreshes the idle
//! timer, and a background task drops sessions that went idle.

use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "sessionid";

#[derive(Debug, Clone)]
struct Session {
    user_id: i64,
    last_seen: Instant,
}

/// In-memory session table keyed by token
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            idle_timeout,
        }
    }

    /// Start a session for `user_id` and return its token
    pub fn create(&self, user_id: i64) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        self.sessions.insert(
            token.clone(),
            Session {
                user_id,
                last_seen: Instant::now(),
            },
        );
        debug!(user_id, "Session created");
        token
    }

    /// Resolve a token to its user id, refreshing the idle timer
    pub fn touch(&self, token: &str) -> Option<i64> {
        let now = Instant::now();
        let mut entry = self.sessions.get_mut(token)?;
        if now.duration_since(entry.last_seen) > self.idle_timeout {
            drop(entry);
            self.sessions.remove(token);
            return None;
        }
        entry.last_seen = now;
        Some(entry.user_id)
    }

    pub fn destroy(&self, token: &str) {
        self.sessions.remove(token);
    }

    /// Drop every session of a user, e.g. after the account was deleted
    pub fn destroy_for_user(&self, user_id: i64) {
        self.sessions.retain(|_, session| session.user_id != user_id);
    }

    /// Remove idle sessions, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let timeout = self.idle_timeout;
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let live = now.duration_since(session.last_seen) <= timeout;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Periodically purge idle sessions
    pub fn spawn_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        let period = (self.idle_timeout / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!(removed, "Purged idle sessions");
                }
            }
        })
    }
}

/// Session cookie without Max-Age, so it ends with the browser session
pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Cookie that clears the session on the client
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_resolves_live_sessions() {
        let store = SessionStore::new(Duration::from_secs(60));
        let token = store.create(7);
        assert_eq!(store.touch(&token), Some(7));
        assert_eq!(store.touch("unknown"), None);

        store.destroy(&token);
        assert_eq!(store.touch(&token), None);
        assert!(store.is_empty());
    }

    #[test]
    fn idle_sessions_expire() {
        let store = SessionStore::new(Duration::from_millis(10));
        let token = store.create(1);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(store.touch(&token), None);

        store.create(2);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(store.purge_expired(), 1);
    }

    #[test]
    fn purge_counts_only_removed_sessions_while_others_sign_in() {
        let store = SessionStore::new(Duration::from_millis(1));
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..2000 {
                    store.create(1);
                }
            })
        };
        let mut removed = 0;
        while !writer.is_finished() {
            removed += store.purge_expired();
        }
        writer.join().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        removed += store.purge_expired();
        assert_eq!(removed, 2000);
        assert!(store.is_empty());
    }

    #[test]
    fn destroy_for_user_keeps_other_users() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.create(1);
        store.create(1);
        let other = store.create(2);
        store.destroy_for_user(1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.touch(&other), Some(2));
    }

    #[test]
    fn session_cookie_has_no_max_age() {
        let cookie = session_cookie("abc".to_string());
        assert_eq!(cookie.max_age(), None);
        assert_eq!(cookie.http_only(), Some(true));
    }
}
