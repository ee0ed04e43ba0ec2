//! Server-side chat gate: per-(session, business) message windows held in
//! process memory.
//!
//! Sessions are derived from the client address and user agent, so the gate
//! is best-effort only. It backs the HTTP chat path; the durable
//! [`crate::quota::QuotaTracker`] remains the advisory per-business counter.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::domain::conversation::BusinessId;
use crate::quota::MAX_FREE_MESSAGES;

/// How long a session's consumption window lasts before it resets.
pub const SESSION_WINDOW_HOURS: i64 = 24;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    /// Stable short token for a client, derived from its address and user
    /// agent. Collisions just share an allowance; there is nothing secret
    /// here.
    pub fn derive(ip: &str, user_agent: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(ip.as_bytes());
        hasher.update(user_agent.as_bytes());
        let digest = hasher.finalize();

        let mut token = String::with_capacity(12);
        for byte in &digest[..6] {
            token.push_str(&format!("{byte:02x}"));
        }
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug)]
struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

pub struct SessionQuotaGate {
    limit: u32,
    window: Duration,
    entries: RwLock<HashMap<String, Window>>,
}

impl Default for SessionQuotaGate {
    fn default() -> Self {
        Self::new(MAX_FREE_MESSAGES, SESSION_WINDOW_HOURS)
    }
}

impl SessionQuotaGate {
    pub fn new(limit: u32, window_hours: i64) -> Self {
        Self {
            limit,
            window: Duration::hours(window_hours),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn entry_key(session: &SessionKey, business_id: &BusinessId) -> String {
        format!("{session}_{business_id}")
    }

    pub fn remaining(&self, session: &SessionKey, business_id: &BusinessId) -> u32 {
        self.remaining_at(session, business_id, Utc::now())
    }

    fn remaining_at(
        &self,
        session: &SessionKey,
        business_id: &BusinessId,
        now: DateTime<Utc>,
    ) -> u32 {
        let entries = self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        match entries.get(&Self::entry_key(session, business_id)) {
            Some(window) if now <= window.reset_at => self.limit.saturating_sub(window.count),
            _ => self.limit,
        }
    }

    /// Consume one message from the window, refusing once the limit is
    /// reached. Expired windows reset to a fresh allowance first.
    pub fn try_consume(&self, session: &SessionKey, business_id: &BusinessId) -> bool {
        self.try_consume_at(session, business_id, Utc::now())
    }

    fn try_consume_at(
        &self,
        session: &SessionKey,
        business_id: &BusinessId,
        now: DateTime<Utc>,
    ) -> bool {
        let key = Self::entry_key(session, business_id);
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner());

        match entries.get_mut(&key) {
            Some(window) if now <= window.reset_at => {
                if window.count >= self.limit {
                    return false;
                }
                window.count += 1;
                true
            }
            _ => {
                entries.insert(key, Window { count: 1, reset_at: now + self.window });
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::domain::conversation::BusinessId;

    use super::{SessionKey, SessionQuotaGate};

    fn business() -> BusinessId {
        BusinessId("biz-1".to_string())
    }

    #[test]
    fn derived_session_keys_are_stable_and_client_specific() {
        let first = SessionKey::derive("203.0.113.9", "Mozilla/5.0");
        let again = SessionKey::derive("203.0.113.9", "Mozilla/5.0");
        let other = SessionKey::derive("203.0.113.10", "Mozilla/5.0");

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(first.as_str().len(), 12);
    }

    #[test]
    fn gate_refuses_the_message_after_the_limit() {
        let gate = SessionQuotaGate::default();
        let session = SessionKey::derive("203.0.113.9", "Mozilla/5.0");

        for _ in 0..gate.limit() {
            assert!(gate.try_consume(&session, &business()));
        }
        assert!(!gate.try_consume(&session, &business()));
        assert_eq!(gate.remaining(&session, &business()), 0);
    }

    #[test]
    fn expired_windows_reset_to_a_fresh_allowance() {
        let gate = SessionQuotaGate::new(3, 24);
        let session = SessionKey::derive("203.0.113.9", "Mozilla/5.0");
        let start = Utc::now();

        for _ in 0..3 {
            assert!(gate.try_consume_at(&session, &business(), start));
        }
        assert!(!gate.try_consume_at(&session, &business(), start));

        let later = start + Duration::hours(25);
        assert_eq!(gate.remaining_at(&session, &business(), later), 3);
        assert!(gate.try_consume_at(&session, &business(), later));
        assert_eq!(gate.remaining_at(&session, &business(), later), 2);
    }

    #[test]
    fn sessions_do_not_share_windows() {
        let gate = SessionQuotaGate::new(1, 24);
        let first = SessionKey::derive("203.0.113.9", "Mozilla/5.0");
        let second = SessionKey::derive("203.0.113.10", "curl/8.0");

        assert!(gate.try_consume(&first, &business()));
        assert!(!gate.try_consume(&first, &business()));
        assert!(gate.try_consume(&second, &business()));
    }
}
