//! Per-connection session state.
//!
//! One `Session` owns the current profile, the single active-query slot,
//! and the query history. Operations receive the session explicitly;
//! there is no process-wide connection state.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::SqlPipeError;
use crate::models::connection::ConnectionProfile;
use crate::models::history::HistoryStore;
use crate::models::query::RunningQuery;

/// Mutable state for one logical connection.
///
/// The active-query slot is the only shared mutable state between a user
/// issuing queries, the timeout timer, and process-exit handling; it is
/// guarded by a `parking_lot::Mutex`, and the `Running` → terminal
/// transition itself is arbitrated inside [`RunningQuery`].
pub struct Session {
    profile: RwLock<Option<Arc<ConnectionProfile>>>,
    active: Mutex<Option<Arc<RunningQuery>>>,
    history: RwLock<HistoryStore>,
}

impl Session {
    /// Create a session with no connection selected.
    pub fn new() -> Self {
        Self {
            profile: RwLock::new(None),
            active: Mutex::new(None),
            history: RwLock::new(HistoryStore::new()),
        }
    }

    /// Create a session already bound to a profile.
    pub fn with_profile(profile: ConnectionProfile) -> Self {
        let session = Self::new();
        session.switch_profile(profile);
        session
    }

    /// Switch to another connection, killing any in-flight query.
    ///
    /// The profile is replaced, not mutated.
    pub fn switch_profile(&self, profile: ConnectionProfile) {
        self.cancel_active();
        tracing::info!(connection = %profile.name, "Switched connection");
        *self.profile.write() = Some(Arc::new(profile));
    }

    /// The currently selected profile.
    pub fn profile(&self) -> Option<Arc<ConnectionProfile>> {
        self.profile.read().clone()
    }

    /// The currently selected profile, or a usage error if none is.
    pub fn current_profile(&self) -> Result<Arc<ConnectionProfile>, SqlPipeError> {
        self.profile().ok_or_else(|| SqlPipeError::usage("No active connection"))
    }

    /// Install a new active query, killing the previous one first.
    ///
    /// The kill happens synchronously under the slot lock before the new
    /// query is visible: two processes must never race to deliver results
    /// for the same session (last-write-wins, no queueing).
    pub fn begin_query(&self, query: Arc<RunningQuery>) {
        let mut slot = self.active.lock();
        if let Some(previous) = slot.take() {
            if previous.kill() {
                tracing::debug!(
                    superseded = %previous.id(),
                    by = %query.id(),
                    "Killed in-flight query"
                );
            }
        }
        *slot = Some(query);
    }

    /// Release the slot when a query finishes, if it still owns it.
    pub fn finish_query(&self, id: Uuid) {
        let mut slot = self.active.lock();
        if slot.as_ref().is_some_and(|q| q.id() == id) {
            *slot = None;
        }
    }

    /// The in-flight query, if any.
    pub fn active_query(&self) -> Option<Arc<RunningQuery>> {
        self.active.lock().clone()
    }

    /// Cancel the in-flight query. Returns false if there is none or it
    /// already finished.
    pub fn cancel_active(&self) -> bool {
        let query = self.active.lock().clone();
        match query {
            Some(query) => query.kill(),
            None => false,
        }
    }

    /// Record a query in history.
    pub fn record_history(&self, sql: &str) {
        self.history.write().record(sql);
    }

    /// History entries, most recent first.
    pub fn history(&self) -> Vec<String> {
        self.history.read().entries().to_vec()
    }

    /// The most recently recorded query, for prefilling input prompts.
    pub fn latest_history(&self) -> Option<String> {
        self.history.read().latest().map(String::from)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::connection::DriverKind;
    use crate::models::query::QueryState;

    fn profile() -> ConnectionProfile {
        ConnectionProfile::new("dev", DriverKind::Postgres, "db.local", "app", "alice")
    }

    #[test]
    fn test_current_profile_requires_connection() {
        let session = Session::new();
        assert!(session.current_profile().unwrap_err().is_usage());

        session.switch_profile(profile());
        assert_eq!(session.current_profile().unwrap().name, "dev");
    }

    #[test]
    fn test_begin_query_kills_previous() {
        let session = Session::with_profile(profile());
        let first = Arc::new(RunningQuery::new("dev", "SELECT 1"));
        let second = Arc::new(RunningQuery::new("dev", "SELECT 2"));

        session.begin_query(first.clone());
        session.begin_query(second.clone());

        assert_eq!(first.state(), QueryState::Killed);
        assert_eq!(second.state(), QueryState::Running);
        assert_eq!(session.active_query().unwrap().id(), second.id());
    }

    #[test]
    fn test_finish_query_only_clears_own_slot() {
        let session = Session::with_profile(profile());
        let first = Arc::new(RunningQuery::new("dev", "SELECT 1"));
        let second = Arc::new(RunningQuery::new("dev", "SELECT 2"));

        session.begin_query(first.clone());
        session.begin_query(second.clone());

        // The superseded query finishing must not evict its successor.
        session.finish_query(first.id());
        assert!(session.active_query().is_some());

        session.finish_query(second.id());
        assert!(session.active_query().is_none());
    }

    #[test]
    fn test_cancel_active_is_idempotent() {
        let session = Session::with_profile(profile());
        assert!(!session.cancel_active());

        let query = Arc::new(RunningQuery::new("dev", "SELECT 1"));
        session.begin_query(query);
        assert!(session.cancel_active());
        assert!(!session.cancel_active());
    }

    #[test]
    fn test_switch_profile_kills_active() {
        let session = Session::with_profile(profile());
        let query = Arc::new(RunningQuery::new("dev", "SELECT 1"));
        session.begin_query(query.clone());

        let mut other = profile();
        other.name = "staging".to_string();
        session.switch_profile(other);

        assert_eq!(query.state(), QueryState::Killed);
        assert_eq!(session.current_profile().unwrap().name, "staging");
    }

    #[test]
    fn test_history_round_trip() {
        let session = Session::new();
        session.record_history("SELECT 1");
        session.record_history("SELECT 2");
        session.record_history("SELECT 1");
        assert_eq!(session.history(), ["SELECT 1", "SELECT 2"]);
        assert_eq!(session.latest_history().as_deref(), Some("SELECT 1"));
    }
}
