//! Controller session freshness.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Tokens older than this are re-issued before the next query.
pub const SESSION_FRESHNESS_SECS: i64 = 3600;

/// Authentication state for one controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Cookie header value; empty means unauthenticated.
    pub token: String,
    pub logged_in_at: Option<DateTime<Utc>>,
}

/// Outcome of [`SessionManager::ensure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Valid(String),
    NeedsLogin,
}

/// Owns the session and decides when a login is required.
#[derive(Debug, Default)]
pub struct SessionManager {
    session: Session,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure(&self, now: DateTime<Utc>) -> SessionState {
        if self.is_valid(now) {
            SessionState::Valid(self.session.token.clone())
        } else {
            SessionState::NeedsLogin
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        match self.session.logged_in_at {
            Some(at) if !self.session.token.is_empty() => {
                now - at < ChronoDuration::seconds(SESSION_FRESHNESS_SECS)
            }
            _ => false,
        }
    }

    pub fn record_login(&mut self, token: String, now: DateTime<Utc>) {
        self.session = Session {
            token,
            logged_in_at: Some(now),
        };
    }

    pub fn invalidate(&mut self) {
        self.session.token.clear();
    }
}
