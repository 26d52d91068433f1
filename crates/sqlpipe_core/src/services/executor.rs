//! Query orchestration: build, run, parse, per operation.
//!
//! One method per operation template. Listing operations route captured
//! text through [`ResultParser`]; free-form execute/explain return the raw
//! decoded outcome. Parameter validation happens before any command is
//! built, so a missing table name never spawns a process.

use std::io::Write;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::oneshot;

use crate::error::SqlPipeError;
use crate::models::command::{DriverRegistry, Invocation};
use crate::models::connection::ConnectionProfile;
use crate::models::query::{collapse_whitespace, QueryOutcome, QueryState, RunningQuery};
use crate::models::table::ParsedTable;
use crate::services::command::CommandBuilder;
use crate::services::parser::{ResultParser, DEFAULT_EXPORT_SEPARATOR};
use crate::services::runner::{ProcessRunner, ProgressFn, RunOptions};
use crate::session::Session;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Kill queries running longer than this (None = no timeout)
    pub timeout: Option<std::time::Duration>,
    /// Separator for delimiter-separated export
    pub export_separator: String,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self { timeout: None, export_separator: DEFAULT_EXPORT_SEPARATOR.to_string() }
    }
}

/// Orchestrates CommandBuilder, ProcessRunner, and ResultParser.
pub struct QueryExecutor {
    registry: Arc<DriverRegistry>,
    options: ExecutorOptions,
}

impl QueryExecutor {
    /// Executor over the built-in driver registry.
    pub fn new() -> Self {
        Self::with_registry(DriverRegistry::builtin())
    }

    /// Executor over a host-supplied registry.
    pub fn with_registry(registry: DriverRegistry) -> Self {
        Self { registry: Arc::new(registry), options: ExecutorOptions::default() }
    }

    /// Replace the executor options.
    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Run free-form query text and return the raw decoded outcome.
    ///
    /// The query is recorded in session history before it runs, so failed
    /// queries remain available for editing and replay.
    pub async fn execute(
        &self,
        session: &Session,
        sql: &str,
    ) -> Result<QueryOutcome, SqlPipeError> {
        let sql = require(sql, "query text")?;
        let profile = session.current_profile()?;
        session.record_history(sql);
        let invocation = CommandBuilder::build_raw(&profile, &self.registry, sql)?;
        self.run_tracked(session, &profile, invocation).await
    }

    /// Run free-form query text without blocking the caller.
    ///
    /// The previous in-flight query on this session is killed before the
    /// new process spawns. The receiver resolves exactly once with the
    /// outcome; an optional progress callback reports elapsed time about
    /// once per second while the query runs.
    pub fn execute_detached(
        &self,
        session: &Arc<Session>,
        sql: &str,
        progress: Option<ProgressFn>,
    ) -> Result<
        (Arc<RunningQuery>, oneshot::Receiver<Result<QueryOutcome, SqlPipeError>>),
        SqlPipeError,
    > {
        let sql = require(sql, "query text")?;
        let profile = session.current_profile()?;
        session.record_history(sql);
        let invocation = CommandBuilder::build_raw(&profile, &self.registry, sql)?;

        let query = Arc::new(RunningQuery::new(profile.name.as_str(), sql));
        session.begin_query(query.clone());

        let mut run_options = self.run_options();
        run_options.progress = progress;

        let (tx, rx) = oneshot::channel();
        let session = session.clone();
        let handle = query.clone();
        tokio::spawn(async move {
            let result = ProcessRunner::run(invocation, handle.clone(), run_options).await;
            session.finish_query(handle.id());
            let _ = tx.send(result.and_then(into_result));
        });

        Ok((query, rx))
    }

    /// Run the driver's EXPLAIN wrapper over query text.
    pub async fn explain(
        &self,
        session: &Session,
        sql: &str,
    ) -> Result<QueryOutcome, SqlPipeError> {
        let sql = require(sql, "query text")?;
        self.run_template(session, "explain", &[sql]).await
    }

    /// List table names.
    pub async fn list_tables(
        &self,
        session: &Session,
    ) -> Result<Vec<String>, SqlPipeError> {
        let outcome = self.run_template(session, "desc", &[]).await?;
        Ok(ResultParser::parse_string_list(&outcome.stdout))
    }

    /// List stored function names.
    pub async fn list_functions(
        &self,
        session: &Session,
    ) -> Result<Vec<String>, SqlPipeError> {
        let outcome = self.run_template(session, "func list", &[]).await?;
        Ok(ResultParser::parse_string_list(&outcome.stdout))
    }

    /// List column names of one table.
    pub async fn list_columns(
        &self,
        session: &Session,
        table: &str,
    ) -> Result<Vec<String>, SqlPipeError> {
        let table = require(table, "table name")?;
        let outcome = self.run_template(session, "column list", &[table]).await?;
        Ok(ResultParser::parse_string_list(&outcome.stdout))
    }

    /// Structured description of one table.
    pub async fn describe_table(
        &self,
        session: &Session,
        table: &str,
    ) -> Result<ParsedTable, SqlPipeError> {
        let table = require(table, "table name")?;
        let profile = session.current_profile()?;
        let outcome = self.run_template(session, "desc table", &[table]).await?;
        Ok(ResultParser::parse_table_description(profile.driver, table, &outcome.stdout))
    }

    /// Show up to 100 records of one table, raw.
    pub async fn show_records(
        &self,
        session: &Session,
        table: &str,
    ) -> Result<QueryOutcome, SqlPipeError> {
        let table = require(table, "table name")?;
        self.run_template(session, "show records", &[table]).await
    }

    /// Show the most recent records of one table, raw.
    pub async fn show_recent_records(
        &self,
        session: &Session,
        table: &str,
    ) -> Result<QueryOutcome, SqlPipeError> {
        let table = require(table, "table name")?;
        self.run_template(session, "show recent records", &[table]).await
    }

    /// Run query text and write its tabular output to `sink` as a
    /// delimiter-separated document.
    pub async fn export(
        &self,
        session: &Session,
        sql: &str,
        separator: Option<&str>,
        sink: &mut dyn Write,
    ) -> Result<(), SqlPipeError> {
        let sql = require(sql, "query text")?;
        let profile = session.current_profile()?;
        let invocation = CommandBuilder::build_raw(&profile, &self.registry, sql)?;
        let outcome = self.run_tracked(session, &profile, invocation).await?;
        let separator = separator.unwrap_or(&self.options.export_separator);
        let document = ResultParser::to_delimited(&outcome.stdout, separator);
        sink.write_all(document.as_bytes())?;
        Ok(())
    }

    /// Result banner for display panels: connection, time, collapsed
    /// query, then the result text.
    pub fn render_banner(profile: &ConnectionProfile, sql: &str, result: &str) -> String {
        format!(
            "{}    {}\nSQL> {}\n\n{}",
            profile.display_name(),
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            collapse_whitespace(sql),
            result
        )
    }

    async fn run_template(
        &self,
        session: &Session,
        template: &str,
        params: &[&str],
    ) -> Result<QueryOutcome, SqlPipeError> {
        let profile = session.current_profile()?;
        let invocation = CommandBuilder::build(&profile, &self.registry, template, params)?;
        self.run_tracked(session, &profile, invocation).await
    }

    async fn run_tracked(
        &self,
        session: &Session,
        profile: &ConnectionProfile,
        invocation: Invocation,
    ) -> Result<QueryOutcome, SqlPipeError> {
        let query =
            Arc::new(RunningQuery::new(profile.name.as_str(), invocation.query_text.trim_end()));
        session.begin_query(query.clone());
        let result = ProcessRunner::run(invocation, query.clone(), self.run_options()).await;
        session.finish_query(query.id());
        result.and_then(into_result)
    }

    fn run_options(&self) -> RunOptions {
        RunOptions { timeout: self.options.timeout, progress: None }
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a completed run with error output and no result to `DriverError`.
/// Killed and timed-out outcomes pass through as informational states.
fn into_result(outcome: QueryOutcome) -> Result<QueryOutcome, SqlPipeError> {
    if outcome.state == QueryState::Completed {
        if let Some(message) = outcome.driver_error().map(|m| m.trim_end().to_string()) {
            return Err(SqlPipeError::driver(message));
        }
    }
    Ok(outcome)
}

fn require<'a>(value: &'a str, what: &str) -> Result<&'a str, SqlPipeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(SqlPipeError::usage(format!("Missing {what}")))
    } else {
        Ok(trimmed)
    }
}
