//! Query lifecycle models.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Terminal and non-terminal states of a running query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum QueryState {
    /// Subprocess is alive
    Running = 0,
    /// Subprocess exited on its own
    Completed = 1,
    /// Terminated by an explicit cancel
    Killed = 2,
    /// Terminated by timeout expiry
    TimedOut = 3,
}

impl QueryState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Completed,
            2 => Self::Killed,
            3 => Self::TimedOut,
            _ => Self::Running,
        }
    }

    /// Check if the state is final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Informational message for states that are not plain completions.
    ///
    /// Timeout and manual cancel are deliberately distinct messages.
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            Self::Killed => Some("Query cancelled"),
            Self::TimedOut => Some("Query timed out"),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Killed => "killed",
            Self::TimedOut => "timed out",
        };
        f.write_str(label)
    }
}

/// Collapse runs of whitespace (including newlines) into single spaces.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Handle for one in-flight subprocess query.
///
/// The state leaves `Running` exactly once: every terminal transition goes
/// through [`RunningQuery::claim`], a compare-and-swap that arbitrates the
/// race between natural exit, manual kill, and timeout expiry.
pub struct RunningQuery {
    /// Unique query identifier
    id: Uuid,
    /// Connection name this query runs against
    connection: String,
    /// The SQL being executed
    sql: String,
    /// Cancellation token watched by the process supervisor
    cancel_token: CancellationToken,
    /// Wall-clock start time
    started_at: DateTime<Utc>,
    /// Monotonic start for elapsed measurement
    started_instant: Instant,
    state: AtomicU8,
}

impl RunningQuery {
    /// Create a handle for a query about to be spawned.
    pub fn new(connection: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection: connection.into(),
            sql: sql.into(),
            cancel_token: CancellationToken::new(),
            started_at: Utc::now(),
            started_instant: Instant::now(),
            state: AtomicU8::new(QueryState::Running as u8),
        }
    }

    /// Get the unique query identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the connection name.
    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Get the SQL being executed.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// One-line SQL preview with whitespace collapsed.
    pub fn sql_preview(&self) -> String {
        collapse_whitespace(&self.sql)
    }

    /// Get when execution started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get elapsed time since execution started.
    pub fn elapsed(&self) -> Duration {
        self.started_instant.elapsed()
    }

    /// Current state.
    pub fn state(&self) -> QueryState {
        QueryState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Check if a terminal state has been reached.
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Attempt the single `Running` → terminal transition.
    ///
    /// Returns true if this caller won; false if the query already reached
    /// a terminal state through another path.
    pub fn claim(&self, next: QueryState) -> bool {
        debug_assert!(next.is_terminal());
        self.state
            .compare_exchange(
                QueryState::Running as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Request cancellation.
    ///
    /// Idempotent: returns false if the query already completed or was
    /// already killed. On success the supervisor terminates the process
    /// group and still delivers the partial output.
    pub fn kill(&self) -> bool {
        if self.claim(QueryState::Killed) {
            tracing::debug!(query_id = %self.id, "Cancellation requested");
            self.cancel_token.cancel();
            true
        } else {
            false
        }
    }

    /// Mark the query as timed out; same mechanics as [`RunningQuery::kill`].
    pub(crate) fn time_out(&self) -> bool {
        if self.claim(QueryState::TimedOut) {
            tracing::debug!(query_id = %self.id, "Timeout expired");
            self.cancel_token.cancel();
            true
        } else {
            false
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Wait for cancellation.
    pub async fn cancelled(&self) {
        self.cancel_token.cancelled().await
    }
}

impl std::fmt::Debug for RunningQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningQuery")
            .field("id", &self.id)
            .field("connection", &self.connection)
            .field("sql", &self.sql)
            .field("started_at", &self.started_at)
            .field("state", &self.state())
            .finish()
    }
}

/// The single completion message delivered per query.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// The query handle ID
    pub query_id: Uuid,
    /// Terminal state of the query
    pub state: QueryState,
    /// Decoded standard output (partial if killed)
    pub stdout: String,
    /// Decoded standard error
    pub stderr: String,
    /// Process exit code, when the process exited on its own
    pub exit_code: Option<i32>,
    /// Wall time from spawn to delivery
    pub elapsed: Duration,
}

impl QueryOutcome {
    /// Elapsed time in whole seconds, as displayed to the user.
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Driver-level failure: error output with nothing on stdout.
    pub fn driver_error(&self) -> Option<&str> {
        if self.stdout.is_empty() && !self.stderr.is_empty() {
            Some(self.stderr.as_str())
        } else {
            None
        }
    }

    /// Informational message for killed/timed-out outcomes.
    pub fn notice(&self) -> Option<&'static str> {
        self.state.notice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_claim_is_exclusive() {
        let query = Arc::new(RunningQuery::new("dev", "SELECT 1"));
        let contenders: Vec<_> = (0..8)
            .map(|i| {
                let q = query.clone();
                std::thread::spawn(move || {
                    let state =
                        if i % 2 == 0 { QueryState::Completed } else { QueryState::Killed };
                    q.claim(state)
                })
            })
            .collect();
        let wins = contenders.into_iter().map(|h| h.join().unwrap()).filter(|&won| won).count();
        assert_eq!(wins, 1);
        assert!(query.is_finished());
    }

    #[test]
    fn test_kill_is_idempotent() {
        let query = RunningQuery::new("dev", "SELECT 1");
        assert!(query.kill());
        assert!(!query.kill());
        assert_eq!(query.state(), QueryState::Killed);
        assert!(query.is_cancelled());
    }

    #[test]
    fn test_kill_after_completion_is_noop() {
        let query = RunningQuery::new("dev", "SELECT 1");
        assert!(query.claim(QueryState::Completed));
        assert!(!query.kill());
        assert_eq!(query.state(), QueryState::Completed);
        assert!(!query.is_cancelled());
    }

    #[test]
    fn test_sql_preview_collapses_whitespace() {
        let query = RunningQuery::new("dev", "SELECT *\n  FROM users\n WHERE id = 1");
        assert_eq!(query.sql_preview(), "SELECT * FROM users WHERE id = 1");
    }

    #[test]
    fn test_notice_distinguishes_timeout_from_cancel() {
        assert_eq!(QueryState::Killed.notice(), Some("Query cancelled"));
        assert_eq!(QueryState::TimedOut.notice(), Some("Query timed out"));
        assert_eq!(QueryState::Completed.notice(), None);
    }

    #[test]
    fn test_driver_error_requires_empty_stdout() {
        let base = QueryOutcome {
            query_id: Uuid::new_v4(),
            state: QueryState::Completed,
            stdout: String::new(),
            stderr: "ERROR: syntax error".to_string(),
            exit_code: Some(1),
            elapsed: Duration::from_millis(10),
        };
        assert!(base.driver_error().is_some());

        let with_rows = QueryOutcome { stdout: "1|2\n".to_string(), ..base };
        assert!(with_rows.driver_error().is_none());
    }
}
