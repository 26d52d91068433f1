//! Subprocess execution with cancellation and timeout.
//!
//! Each query spawns the driver client as its own process group, streams
//! the query text to the child's standard input, drains stdout/stderr
//! concurrently, and supervises the child with a `select!` over natural
//! exit, cancellation, and the optional timeout. Exactly one
//! [`QueryOutcome`] is delivered per query on every path, including kills
//! with partial output.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use command_group::AsyncCommandGroup;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::oneshot;

use crate::error::SqlPipeError;
use crate::models::command::Invocation;
use crate::models::query::{QueryOutcome, QueryState, RunningQuery};

/// Interval between elapsed-time progress reports.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Progress side channel: invoked about once per second with elapsed time
/// while the query runs. Not part of the result contract.
pub type ProgressFn = Arc<dyn Fn(Duration) + Send + Sync>;

/// Per-run execution options.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Kill the process group after this long (None = no timeout)
    pub timeout: Option<Duration>,
    /// Optional elapsed-time reporter
    pub progress: Option<ProgressFn>,
}

impl RunOptions {
    /// Options with a timeout and no progress reporting.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout), progress: None }
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("timeout", &self.timeout)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Service owning the subprocess lifecycle.
pub struct ProcessRunner;

impl ProcessRunner {
    /// Run an invocation to completion and return its outcome.
    ///
    /// Awaiting this is the synchronous mode: the caller's task suspends
    /// until the process exits, is killed, or times out. The outcome's
    /// state records which of those happened; partial output captured
    /// before a kill is still returned.
    pub async fn run(
        invocation: Invocation,
        query: Arc<RunningQuery>,
        options: RunOptions,
    ) -> Result<QueryOutcome, SqlPipeError> {
        tracing::debug!(
            query_id = %query.id(),
            program = %invocation.program,
            "Spawning driver process"
        );

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Spawn as a process group so a kill reaches driver children too.
        let mut child = match command.group_spawn() {
            Ok(child) => child,
            Err(e) => {
                // Settle the handle so a later kill on it is a no-op.
                query.claim(QueryState::Completed);
                tracing::warn!(
                    query_id = %query.id(),
                    program = %invocation.program,
                    error = %e,
                    "Failed to spawn driver process"
                );
                return Err(SqlPipeError::spawn(invocation.program, e));
            }
        };

        let stdin = child.inner().stdin.take();
        let stdout = child.inner().stdout.take();
        let stderr = child.inner().stderr.take();
        let (Some(mut stdin), Some(stdout), Some(stderr)) = (stdin, stdout, stderr) else {
            query.claim(QueryState::Completed);
            return Err(SqlPipeError::internal("child pipes not available"));
        };

        // Feed the query and close stdin so drivers reading to EOF proceed.
        // Write errors are expected when the child exits without reading.
        let query_text = invocation.query_text.clone();
        let writer = tokio::spawn(async move {
            if stdin.write_all(query_text.as_bytes()).await.is_ok() {
                let _ = stdin.shutdown().await;
            }
        });

        // Drain both streams so the child never blocks on a full pipe.
        let stdout_reader = tokio::spawn(async move {
            let mut stdout = stdout;
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf).await;
            buf
        });
        let stderr_reader = tokio::spawn(async move {
            let mut stderr = stderr;
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        // Elapsed-time reporting runs beside the supervision select, so a
        // slow driver still produces ticks.
        let progress_task = options.progress.clone().map(|progress| {
            let handle = query.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
                ticker.tick().await; // skip the immediate first tick
                loop {
                    ticker.tick().await;
                    progress(handle.elapsed());
                }
            })
        });

        let mut exit_code: Option<i32> = None;
        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) => {
                        query.claim(QueryState::Completed);
                        exit_code = status.code();
                    }
                    Err(e) => {
                        query.claim(QueryState::Completed);
                        tracing::warn!(query_id = %query.id(), error = %e, "wait failed");
                    }
                }
            }
            _ = query.cancelled() => {
                // State was already claimed by the cancelling side.
                let _ = child.kill().await;
                let _ = child.wait().await;
            }
            _ = async {
                match options.timeout {
                    Some(timeout) => tokio::time::sleep(timeout).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                query.time_out();
                let _ = child.kill().await;
                let _ = child.wait().await;
            }
        }

        if let Some(task) = progress_task {
            task.abort();
        }

        // Pipes are closed by now; readers run to EOF and return what was
        // captured before any kill.
        let _ = writer.await;
        let stdout_bytes = stdout_reader.await.unwrap_or_default();
        let stderr_bytes = stderr_reader.await.unwrap_or_default();

        let stdout = invocation.encoding.decode(&stdout_bytes).replace('\r', "");
        let stderr = invocation.encoding.decode(&stderr_bytes).replace('\r', "");

        let outcome = QueryOutcome {
            query_id: query.id(),
            state: query.state(),
            stdout,
            stderr,
            exit_code,
            elapsed: query.elapsed(),
        };

        match outcome.state {
            QueryState::Completed => tracing::debug!(
                query_id = %query.id(),
                exit_code = ?outcome.exit_code,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "Query completed"
            ),
            state => tracing::warn!(
                query_id = %query.id(),
                %state,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "Query terminated early"
            ),
        }

        Ok(outcome)
    }

    /// Run on a fresh task; the caller's control flow never blocks.
    ///
    /// The returned receiver resolves exactly once, with the outcome or
    /// the spawn error.
    pub fn run_detached(
        invocation: Invocation,
        query: Arc<RunningQuery>,
        options: RunOptions,
    ) -> oneshot::Receiver<Result<QueryOutcome, SqlPipeError>> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = Self::run(invocation, query, options).await;
            let _ = tx.send(result);
        });
        rx
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::connection::TextEncoding;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn invocation(program: &str, args: &[&str], query_text: &str) -> Invocation {
        Invocation {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            query_text: query_text.to_string(),
            encoding: TextEncoding::Utf8,
        }
    }

    #[tokio::test]
    async fn test_stdin_round_trip() {
        let query = Arc::new(RunningQuery::new("dev", "select 1;"));
        let outcome = ProcessRunner::run(
            invocation("cat", &[], "select 1;\n"),
            query,
            RunOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.state, QueryState::Completed);
        assert_eq!(outcome.stdout, "select 1;\n");
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_stderr_only_is_driver_error() {
        let query = Arc::new(RunningQuery::new("dev", "bad"));
        let outcome = ProcessRunner::run(
            invocation("sh", &["-c", "echo boom >&2"], ""),
            query,
            RunOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.state, QueryState::Completed);
        assert_eq!(outcome.driver_error(), Some("boom\n"));
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let query = Arc::new(RunningQuery::new("dev", "select 1;"));
        let err = ProcessRunner::run(
            invocation("sqlpipe-test-missing-binary", &[], ""),
            query.clone(),
            RunOptions::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.category(), "Spawn");
        // The handle is settled; a later kill is a no-op.
        assert!(!query.kill());
    }

    #[tokio::test]
    async fn test_timeout_kills_sleeping_process() {
        let query = Arc::new(RunningQuery::new("dev", "select pg_sleep(5);"));
        let started = std::time::Instant::now();
        let outcome = ProcessRunner::run(
            invocation("sleep", &["5"], ""),
            query,
            RunOptions::with_timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap();
        assert_eq!(outcome.state, QueryState::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.notice(), Some("Query timed out"));
    }

    #[tokio::test]
    async fn test_kill_delivers_partial_output() {
        let query = Arc::new(RunningQuery::new("dev", "long"));
        let rx = ProcessRunner::run_detached(
            invocation("sh", &["-c", "echo partial; sleep 5"], ""),
            query.clone(),
            RunOptions::default(),
        );
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(query.kill());
        let outcome = rx.await.unwrap().unwrap();
        assert_eq!(outcome.state, QueryState::Killed);
        assert_eq!(outcome.stdout, "partial\n");
        assert_eq!(outcome.notice(), Some("Query cancelled"));
    }

    #[tokio::test]
    async fn test_carriage_returns_stripped() {
        let query = Arc::new(RunningQuery::new("dev", "select 1;"));
        let outcome = ProcessRunner::run(
            invocation("sh", &["-c", "printf 'a\\r\\nb\\r\\n'"], ""),
            query,
            RunOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.stdout, "a\nb\n");
    }

    #[tokio::test]
    async fn test_progress_reports_elapsed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let options = RunOptions {
            timeout: None,
            progress: Some(Arc::new(move |_elapsed| {
                counter.fetch_add(1, Ordering::Relaxed);
            })),
        };
        let query = Arc::new(RunningQuery::new("dev", "slow"));
        let outcome = ProcessRunner::run(invocation("sleep", &["1.3"], ""), query, options)
            .await
            .unwrap();
        assert_eq!(outcome.state, QueryState::Completed);
        assert!(calls.load(Ordering::Relaxed) >= 1);
    }
}
