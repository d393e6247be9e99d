//! Session Store: per-conversation continuity with bounded memory.
//!
//! Each session is bound to one character for its lifetime and keeps a
//! sliding window of the most recent exchanges (oldest evicted first).
//! Sessions expire logically after an idle timeout; an expired session is
//! treated as absent and replaced on the next request.
//!
//! ## Concurrency
//!
//! The store is a `DashMap` keyed by session id, so requests against
//! different sessions never contend on a global lock. Each session sits
//! behind its own `parking_lot::Mutex`, which serialises appends within a
//! session and keeps sequence numbering and the eviction window consistent.
//! Lock order is always map shard → session, never the reverse.
//!
//! Every time-dependent operation has an `_at` variant taking the current
//! time explicitly; the plain variants use `Utc::now()`.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::types::{CharacterId, Exchange, SessionId};

// ---------------------------------------------------------------------------
// ConversationSession
// ---------------------------------------------------------------------------

/// One conversation between a user and a single character.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSession {
    id: SessionId,
    character_id: CharacterId,
    history: VecDeque<Exchange>,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    next_sequence: u64,
    max_history: usize,
}

impl ConversationSession {
    /// Create an empty session.
    #[must_use]
    pub fn new(
        id: SessionId,
        character_id: CharacterId,
        max_history: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let max_history = max_history.max(1);
        Self {
            id,
            character_id,
            history: VecDeque::with_capacity(max_history),
            created_at: now,
            last_activity_at: now,
            next_sequence: 1,
            max_history,
        }
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Character this session is bound to.
    #[must_use]
    pub fn character_id(&self) -> &CharacterId {
        &self.character_id
    }

    /// Exchanges in insertion order, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &Exchange> {
        self.history.iter()
    }

    /// Number of exchanges currently retained.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// When the session was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last read or write.
    #[must_use]
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    /// Append an exchange, evicting the oldest when the window is full.
    pub fn append_exchange(
        &mut self,
        user_text: impl Into<String>,
        character_text: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Exchange {
        let exchange = Exchange {
            user_text: user_text.into(),
            character_text: character_text.into(),
            timestamp: now,
            sequence_number: self.next_sequence,
        };
        self.next_sequence += 1;

        self.history.push_back(exchange.clone());
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
        self.last_activity_at = now;
        exchange
    }

    /// The last `max_exchanges` exchanges, oldest first. Returns fewer when
    /// history is shorter and an empty vec when there is none.
    #[must_use]
    pub fn recent_context(&self, max_exchanges: usize) -> Vec<Exchange> {
        let skip = self.history.len().saturating_sub(max_exchanges);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Whether the session has been idle longer than `timeout` at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity_at > timeout
    }

    /// Refresh the activity timestamp.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity_at {
            self.last_activity_at = now;
        }
    }

    /// Force the activity timestamp, e.g. when restoring a session.
    pub fn set_last_activity(&mut self, at: DateTime<Utc>) {
        self.last_activity_at = at;
    }
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Shared, cheaply clonable reference to a live session.
///
/// Two handles refer to the same session iff [`same_session`](Self::same_session)
/// is true.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    character_id: CharacterId,
    inner: Arc<Mutex<ConversationSession>>,
}

impl SessionHandle {
    fn new(session: ConversationSession) -> Self {
        Self {
            id: session.id.clone(),
            character_id: session.character_id.clone(),
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Character the session is bound to.
    #[must_use]
    pub fn character_id(&self) -> &CharacterId {
        &self.character_id
    }

    /// Identity comparison.
    #[must_use]
    pub fn same_session(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Append an exchange now.
    pub fn append_exchange(&self, user_text: &str, character_text: &str) -> Exchange {
        self.append_exchange_at(user_text, character_text, Utc::now())
    }

    /// Append an exchange at an explicit time.
    pub fn append_exchange_at(
        &self,
        user_text: &str,
        character_text: &str,
        now: DateTime<Utc>,
    ) -> Exchange {
        self.inner
            .lock()
            .append_exchange(user_text, character_text, now)
    }

    /// Recent exchanges; counts as activity.
    #[must_use]
    pub fn recent_context(&self, max_exchanges: usize) -> Vec<Exchange> {
        self.recent_context_at(max_exchanges, Utc::now())
    }

    /// Recent exchanges at an explicit time.
    #[must_use]
    pub fn recent_context_at(&self, max_exchanges: usize, now: DateTime<Utc>) -> Vec<Exchange> {
        let mut session = self.inner.lock();
        session.touch(now);
        session.recent_context(max_exchanges)
    }

    /// Number of retained exchanges.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.inner.lock().history_len()
    }

    /// Point-in-time copy of the session.
    #[must_use]
    pub fn snapshot(&self) -> ConversationSession {
        self.inner.lock().clone()
    }

    /// Run `f` with exclusive access to the session.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut ConversationSession) -> R) -> R {
        f(&mut self.inner.lock())
    }

    fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.inner.lock().is_expired(now, timeout)
    }

    fn touch(&self, now: DateTime<Utc>) {
        self.inner.lock().touch(now);
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Aggregate counts across the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Sessions currently held (live or not yet swept).
    pub active_sessions: usize,
    /// Exchanges retained across all sessions.
    pub total_exchanges: usize,
    /// Distinct characters with at least one session, sorted.
    pub characters_in_use: Vec<CharacterId>,
}

/// Owner of all conversation sessions.
pub struct SessionStore {
    sessions: DashMap<SessionId, SessionHandle>,
    config: SessionConfig,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Resolve or create a session for `character_id`.
    #[must_use]
    pub fn get_or_create(
        &self,
        character_id: &CharacterId,
        session_id: Option<&SessionId>,
    ) -> SessionHandle {
        self.get_or_create_at(character_id, session_id, Utc::now())
    }

    /// Resolve or create a session at an explicit time.
    ///
    /// - live session, same character → reused and refreshed;
    /// - live session, other character → returned unchanged, the caller
    ///   must treat the mismatch as an error;
    /// - expired session → discarded, a new session is minted under a fresh id;
    /// - unknown id → new session under that id;
    /// - no id → new session under a generated id.
    #[must_use]
    pub fn get_or_create_at(
        &self,
        character_id: &CharacterId,
        session_id: Option<&SessionId>,
        now: DateTime<Utc>,
    ) -> SessionHandle {
        let timeout = self.config.timeout();

        let Some(session_id) = session_id else {
            return self.create(character_id, SessionId::generate(), now);
        };

        match self.sessions.entry(session_id.clone()) {
            Entry::Occupied(entry) => {
                let handle = entry.get().clone();
                if handle.is_expired(now, timeout) {
                    entry.remove();
                    debug!(session = %session_id, "Discarded expired session");
                    return self.create(character_id, SessionId::generate(), now);
                }
                if handle.character_id() != character_id {
                    debug!(
                        session = %session_id,
                        bound = %handle.character_id(),
                        requested = %character_id,
                        "Session requested for a different character"
                    );
                    return handle;
                }
                handle.touch(now);
                handle
            }
            Entry::Vacant(entry) => {
                let handle = SessionHandle::new(ConversationSession::new(
                    session_id.clone(),
                    character_id.clone(),
                    self.config.max_history,
                    now,
                ));
                entry.insert(handle.clone());
                info!(session = %session_id, character = %character_id, "Created new session");
                handle
            }
        }
    }

    fn create(&self, character_id: &CharacterId, id: SessionId, now: DateTime<Utc>) -> SessionHandle {
        let handle = SessionHandle::new(ConversationSession::new(
            id.clone(),
            character_id.clone(),
            self.config.max_history,
            now,
        ));
        self.sessions.insert(id.clone(), handle.clone());
        info!(session = %id, character = %character_id, "Created new session");
        handle
    }

    /// Look up a live session; expired sessions read as absent.
    #[must_use]
    pub fn get(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.get_at(session_id, Utc::now())
    }

    /// Look up a live session at an explicit time.
    #[must_use]
    pub fn get_at(&self, session_id: &SessionId, now: DateTime<Utc>) -> Option<SessionHandle> {
        let handle = self.sessions.get(session_id).map(|entry| entry.value().clone())?;
        if handle.is_expired(now, self.config.timeout()) {
            return None;
        }
        handle.touch(now);
        Some(handle)
    }

    /// Remove sessions idle longer than `timeout`. Returns how many were removed.
    pub fn sweep_expired(&self, timeout: Duration) -> usize {
        self.sweep_expired_at(timeout, Utc::now())
    }

    /// Sweep at an explicit time.
    pub fn sweep_expired_at(&self, timeout: Duration, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, handle| !handle.is_expired(now, timeout));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            info!(removed, "Swept expired sessions");
        }
        removed
    }

    /// Number of sessions held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Aggregate statistics.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let mut total_exchanges = 0;
        let mut characters: Vec<CharacterId> = Vec::new();
        for entry in &self.sessions {
            total_exchanges += entry.value().history_len();
            characters.push(entry.value().character_id().clone());
        }
        characters.sort();
        characters.dedup();

        SessionStats {
            active_sessions: self.sessions.len(),
            total_exchanges,
            characters_in_use: characters,
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn gladiator() -> CharacterId {
        CharacterId::new("roman_gladiator")
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T12:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn window_keeps_ten_most_recent() {
        let store = SessionStore::default();
        let session = store.get_or_create_at(&gladiator(), None, t0());

        for i in 0..25 {
            session.append_exchange_at(&format!("q{i}"), &format!("a{i}"), t0());
        }

        let snapshot = session.snapshot();
        assert_eq!(snapshot.history_len(), 10);
        let first = snapshot.history().next().expect("non-empty");
        assert_eq!(first.user_text, "q15");
        assert_eq!(first.sequence_number, 16);
    }

    #[test]
    fn sequence_numbers_survive_eviction() {
        let mut session = ConversationSession::new("s".into(), gladiator(), 2, t0());
        let a = session.append_exchange("1", "1", t0());
        let b = session.append_exchange("2", "2", t0());
        let c = session.append_exchange("3", "3", t0());
        assert_eq!((a.sequence_number, b.sequence_number, c.sequence_number), (1, 2, 3));
        assert_eq!(session.history_len(), 2);
    }

    #[test]
    fn recent_context_handles_short_and_empty_history() {
        let store = SessionStore::default();
        let session = store.get_or_create_at(&gladiator(), None, t0());
        assert!(session.recent_context_at(3, t0()).is_empty());

        session.append_exchange_at("hello", "salve", t0());
        let context = session.recent_context_at(3, t0());
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].character_text, "salve");
    }

    #[test]
    fn recent_context_returns_tail_in_order() {
        let store = SessionStore::default();
        let session = store.get_or_create_at(&gladiator(), None, t0());
        for i in 0..5 {
            session.append_exchange_at(&format!("q{i}"), "a", t0());
        }
        let context = session.recent_context_at(2, t0());
        let texts: Vec<_> = context.iter().map(|e| e.user_text.as_str()).collect();
        assert_eq!(texts, vec!["q3", "q4"]);
    }

    #[test]
    fn live_session_is_reused() {
        let store = SessionStore::default();
        let id = SessionId::from("abc");
        let first = store.get_or_create_at(&gladiator(), Some(&id), t0());
        first.append_exchange_at("q", "a", t0());

        let second =
            store.get_or_create_at(&gladiator(), Some(&id), t0() + Duration::minutes(10));
        assert!(first.same_session(&second));
        assert_eq!(second.history_len(), 1);
        assert_eq!(
            second.snapshot().last_activity_at(),
            t0() + Duration::minutes(10)
        );
    }

    #[test]
    fn unknown_id_is_honoured() {
        let store = SessionStore::default();
        let id = SessionId::from("caller-chosen");
        let session = store.get_or_create_at(&gladiator(), Some(&id), t0());
        assert_eq!(session.id(), &id);
    }

    #[test]
    fn expired_session_is_replaced() {
        let store = SessionStore::default();
        let id = SessionId::from("stale");
        let old = store.get_or_create_at(&gladiator(), Some(&id), t0());
        old.append_exchange_at("q", "a", t0());

        let later = t0() + Duration::minutes(31);
        assert!(store.get_at(&id, later).is_none());

        let fresh = store.get_or_create_at(&gladiator(), Some(&id), later);
        assert!(!fresh.same_session(&old));
        assert_ne!(fresh.id(), &id);
        assert_eq!(fresh.history_len(), 0);
        assert!(store.get_at(&id, later).is_none());
    }

    #[test]
    fn session_at_exactly_timeout_is_still_live() {
        let store = SessionStore::default();
        let id = SessionId::from("edge");
        let _ = store.get_or_create_at(&gladiator(), Some(&id), t0());
        assert!(store.get_at(&id, t0() + Duration::minutes(30)).is_some());
    }

    #[test]
    fn other_character_gets_session_unchanged() {
        let store = SessionStore::default();
        let id = SessionId::from("shared");
        let original = store.get_or_create_at(&gladiator(), Some(&id), t0());

        let later = t0() + Duration::minutes(5);
        let returned =
            store.get_or_create_at(&CharacterId::new("egyptian_scribe"), Some(&id), later);
        assert!(returned.same_session(&original));
        assert_eq!(returned.character_id(), &gladiator());
        assert_eq!(returned.snapshot().last_activity_at(), t0());
    }

    #[test]
    fn sweep_removes_only_expired() {
        let store = SessionStore::default();
        let _ = store.get_or_create_at(&gladiator(), Some(&"old".into()), t0());
        let _ = store.get_or_create_at(
            &gladiator(),
            Some(&"new".into()),
            t0() + Duration::minutes(20),
        );

        let removed =
            store.sweep_expired_at(Duration::minutes(30), t0() + Duration::minutes(40));
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.get_at(&"new".into(), t0() + Duration::minutes(40)).is_some());
    }

    #[test]
    fn stats_aggregate_sessions() {
        let store = SessionStore::default();
        let a = store.get_or_create_at(&gladiator(), None, t0());
        let b = store.get_or_create_at(&CharacterId::new("egyptian_scribe"), None, t0());
        let c = store.get_or_create_at(&gladiator(), None, t0());
        a.append_exchange_at("q", "a", t0());
        b.append_exchange_at("q", "a", t0());
        c.append_exchange_at("q", "a", t0());
        c.append_exchange_at("q", "a", t0());

        let stats = store.stats();
        assert_eq!(stats.active_sessions, 3);
        assert_eq!(stats.total_exchanges, 4);
        assert_eq!(stats.characters_in_use.len(), 2);
    }
}
