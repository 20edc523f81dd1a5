//! Lifecycle of the saved steamcmd login session.

use chrono::{DateTime, Duration, Utc};

/// Where the saved session currently stands. The adapter moves this
/// forward as it observes login markers; nothing else writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never probed since startup.
    Unknown,
    /// A login succeeded without a second-factor prompt at this time.
    Verified(DateTime<Utc>),
    /// A re-auth signal or credential error was observed.
    Invalid,
}

/// The process-wide session object owned by the adapter.
///
/// While the session is verified and inside the caching window, fetches
/// run without a password argument and rely on the credential store the
/// external tool maintains on disk.
#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    state: SessionState,
    cache_window: Duration,
}

impl SessionLifecycle {
    pub fn new(cache_window: std::time::Duration) -> Self {
        Self {
            state: SessionState::Unknown,
            cache_window: Duration::from_std(cache_window).unwrap_or(Duration::minutes(30)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True when a verified login is still inside the caching window.
    pub fn is_cached(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            SessionState::Verified(at) => now - at < self.cache_window,
            _ => false,
        }
    }

    pub fn mark_verified(&mut self, now: DateTime<Utc>) {
        self.state = SessionState::Verified(now);
    }

    pub fn invalidate(&mut self) {
        self.state = SessionState::Invalid;
    }
}
