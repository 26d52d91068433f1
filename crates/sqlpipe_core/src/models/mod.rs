//! Data models for the SQLPipe engine.
//!
//! This module contains all core data structures:
//! - `connection` - ConnectionProfile, DriverKind, TextEncoding, ProfileSet
//! - `command` - Invocation, QueryTemplate, DriverRegistry
//! - `query` - RunningQuery, QueryState, QueryOutcome
//! - `history` - HistoryStore
//! - `table` - ParsedTable, ParsedColumn

pub mod command;
pub mod connection;
pub mod history;
pub mod query;
pub mod table;

pub use command::{DriverCommand, DriverRegistry, Invocation, QueryTemplate};
pub use connection::{
    ConnectionProfile, ConnectionProfileBuilder, DriverKind, ProfileSet, TextEncoding,
};
pub use history::{HistoryStore, DEFAULT_HISTORY_CAPACITY};
pub use query::{QueryOutcome, QueryState, RunningQuery};
pub use table::{ParsedColumn, ParsedTable};
