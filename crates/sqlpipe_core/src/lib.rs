//! Query-execution engine for the SQLPipe editor plugin.
//!
//! Turns `(connection profile, query text)` into structured rows or error
//! text by piping SQL to a command-line database client (psql, mysql,
//! sqlite3, sqlcmd) as a subprocess. The editor UI is a pure consumer of
//! this crate:
//!
//! - **error**: Error taxonomy (configuration, usage, spawn, driver)
//! - **models**: Profiles, driver templates, query lifecycle, history
//! - **services**: Command building, subprocess execution, result parsing,
//!   per-operation orchestration
//! - **session**: Current profile, active-query slot, history
//! - **logging**: Structured logging setup

pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod session;


pub use error::{ErrorInfo, SqlPipeError};
pub use models::{
    ConnectionProfile, ConnectionProfileBuilder, DriverCommand, DriverKind, DriverRegistry,
    HistoryStore, Invocation, ParsedColumn, ParsedTable, ProfileSet, QueryOutcome, QueryState,
    QueryTemplate, RunningQuery, TextEncoding,
};
pub use services::{
    CommandBuilder, ExecutorOptions, ProcessRunner, ProgressFn, QueryExecutor, ResultParser,
    RunOptions,
};
pub use session::Session;
