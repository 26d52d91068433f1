//! Driver command templates and the per-execution invocation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SqlPipeError;
use crate::models::connection::{DriverKind, TextEncoding};

/// One concrete, ready-to-spawn command plus the query text to feed it.
///
/// Query text is always delivered via standard input, never interpolated
/// into the argument vector; SQL containing shell-special characters must
/// not require escaping.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Client executable path or name
    pub program: String,
    /// Ordered argument vector, passed without shell interpretation
    pub args: Vec<String>,
    /// SQL text streamed to the child's standard input
    pub query_text: String,
    /// Encoding used to decode captured output
    pub encoding: TextEncoding,
}

/// A named query template for one driver.
///
/// `query` carries one or two positional `{}` slots filled at build time
/// (e.g. a table name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTemplate {
    /// Extra client flags for this operation
    #[serde(default)]
    pub options: Vec<String>,
    /// Query text template
    pub query: String,
}

impl QueryTemplate {
    /// Create a template with no extra flags.
    pub fn new(query: impl Into<String>) -> Self {
        Self { options: Vec::new(), query: query.into() }
    }

    /// Create a template with extra client flags.
    pub fn with_options(options: &[&str], query: impl Into<String>) -> Self {
        Self { options: options.iter().map(|s| s.to_string()).collect(), query: query.into() }
    }
}

/// How to invoke one driver's CLI client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverCommand {
    /// Executable path or name (resolved via PATH)
    pub program: String,
    /// Base flags for free-form execution
    #[serde(default)]
    pub options: Vec<String>,
    /// Connection flags with `{host}`/`{port}`/`{username}`/`{password}`/
    /// `{database}`/`{service}` placeholders filled from the profile.
    /// An argument whose placeholder resolves to an absent value is
    /// dropped from the vector.
    #[serde(default)]
    pub connection_args: Vec<String>,
    /// Statements prepended to every query for this driver
    #[serde(default)]
    pub before: Vec<String>,
    /// Named operation templates
    #[serde(default)]
    pub templates: HashMap<String, QueryTemplate>,
}

impl DriverCommand {
    /// Look up a named template.
    pub fn template(&self, name: &str) -> Result<&QueryTemplate, SqlPipeError> {
        self.templates.get(name).ok_or_else(|| {
            SqlPipeError::config(format!("No query template '{name}' for driver '{}'", self.program))
        })
    }
}

/// Driver type → CLI invocation table, resolved from external configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverRegistry {
    drivers: HashMap<DriverKind, DriverCommand>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { drivers: HashMap::new() }
    }

    /// Register or replace a driver entry.
    pub fn insert(&mut self, kind: DriverKind, command: DriverCommand) {
        self.drivers.insert(kind, command);
    }

    /// Look up the invocation table for a driver.
    pub fn get(&self, kind: DriverKind) -> Result<&DriverCommand, SqlPipeError> {
        self.drivers
            .get(&kind)
            .ok_or_else(|| SqlPipeError::config(format!("Unknown driver type: {kind}")))
    }

    /// Parse a registry from host settings JSON.
    ///
    /// The expected shape is a map of driver type to invocation table,
    /// e.g. `{"postgres": {"program": "psql", ...}}`.
    pub fn from_json(json: &str) -> Result<Self, SqlPipeError> {
        serde_json::from_str(json)
            .map_err(|e| SqlPipeError::config(format!("Invalid driver settings: {e}")))
    }

    /// Built-in defaults for the four supported driver families.
    pub fn builtin() -> Self {
        let mut drivers = HashMap::new();

        let mut pg = HashMap::new();
        pg.insert("desc".to_string(), QueryTemplate::with_options(
            &["-t", "-A"],
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public' ORDER BY table_name;",
        ));
        pg.insert("desc table".to_string(), QueryTemplate::new("\\d {}"));
        pg.insert("show records".to_string(), QueryTemplate::new("SELECT * FROM {} LIMIT 100;"));
        pg.insert(
            "show recent records".to_string(),
            QueryTemplate::new("SELECT * FROM {} ORDER BY 1 DESC LIMIT 100;"),
        );
        pg.insert("func list".to_string(), QueryTemplate::with_options(
            &["-t", "-A"],
            "SELECT routine_name FROM information_schema.routines \
             WHERE routine_schema = 'public' ORDER BY routine_name;",
        ));
        pg.insert("column list".to_string(), QueryTemplate::with_options(
            &["-t", "-A"],
            "SELECT column_name FROM information_schema.columns \
             WHERE table_name = '{}' ORDER BY ordinal_position;",
        ));
        pg.insert("explain".to_string(), QueryTemplate::new("EXPLAIN {}"));
        drivers.insert(DriverKind::Postgres, DriverCommand {
            program: "psql".to_string(),
            options: vec![],
            connection_args: vec![
                "-h".into(), "{host}".into(),
                "-p".into(), "{port}".into(),
                "-U".into(), "{username}".into(),
                "{database}".into(),
            ],
            before: vec![],
            templates: pg,
        });

        let mut my = HashMap::new();
        my.insert("desc".to_string(), QueryTemplate::with_options(
            &["--silent", "--skip-column-names"],
            "SHOW TABLES;",
        ));
        my.insert("desc table".to_string(), QueryTemplate::with_options(&["-t"], "DESCRIBE {};"));
        my.insert(
            "show records".to_string(),
            QueryTemplate::with_options(&["-t"], "SELECT * FROM {} LIMIT 100;"),
        );
        my.insert(
            "show recent records".to_string(),
            QueryTemplate::with_options(&["-t"], "SELECT * FROM {} ORDER BY 1 DESC LIMIT 100;"),
        );
        my.insert("func list".to_string(), QueryTemplate::with_options(
            &["--silent", "--skip-column-names"],
            "SELECT routine_name FROM information_schema.routines \
             WHERE routine_schema = DATABASE() ORDER BY routine_name;",
        ));
        my.insert("column list".to_string(), QueryTemplate::with_options(
            &["--silent", "--skip-column-names"],
            "SELECT column_name FROM information_schema.columns \
             WHERE table_name = '{}' ORDER BY ordinal_position;",
        ));
        my.insert("explain".to_string(), QueryTemplate::with_options(&["-t"], "EXPLAIN {};"));
        drivers.insert(DriverKind::Mysql, DriverCommand {
            program: "mysql".to_string(),
            options: vec!["-t".into()],
            connection_args: vec![
                "-h".into(), "{host}".into(),
                "-P".into(), "{port}".into(),
                "-u".into(), "{username}".into(),
                "--password={password}".into(),
                "{database}".into(),
            ],
            before: vec![],
            templates: my,
        });

        let mut lite = HashMap::new();
        lite.insert("desc".to_string(), QueryTemplate::new(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name;",
        ));
        // SQLite introspection returns the original CREATE TABLE / CREATE
        // INDEX DDL text; both slots receive the table name.
        lite.insert("desc table".to_string(), QueryTemplate::new(
            "SELECT sql || ';' FROM sqlite_master WHERE name = '{}' OR tbl_name = '{}';",
        ));
        lite.insert("show records".to_string(), QueryTemplate::new("SELECT * FROM {} LIMIT 100;"));
        lite.insert(
            "show recent records".to_string(),
            QueryTemplate::new("SELECT * FROM {} ORDER BY rowid DESC LIMIT 100;"),
        );
        lite.insert("column list".to_string(), QueryTemplate::new(
            "SELECT name FROM pragma_table_info('{}');",
        ));
        lite.insert("explain".to_string(), QueryTemplate::new("EXPLAIN QUERY PLAN {}"));
        drivers.insert(DriverKind::Sqlite, DriverCommand {
            program: "sqlite3".to_string(),
            options: vec![],
            connection_args: vec!["{database}".into()],
            before: vec![".mode list".into()],
            templates: lite,
        });

        let mut ms = HashMap::new();
        ms.insert("desc".to_string(), QueryTemplate::with_options(
            &["-h", "-1", "-W"],
            "SELECT name FROM sys.tables ORDER BY name;",
        ));
        ms.insert("desc table".to_string(), QueryTemplate::new("EXEC sp_help '{}';"));
        ms.insert(
            "show records".to_string(),
            QueryTemplate::new("SELECT TOP 100 * FROM {};"),
        );
        ms.insert(
            "show recent records".to_string(),
            QueryTemplate::new("SELECT TOP 100 * FROM {} ORDER BY 1 DESC;"),
        );
        ms.insert("func list".to_string(), QueryTemplate::with_options(
            &["-h", "-1", "-W"],
            "SELECT name FROM sys.objects WHERE type IN ('FN', 'IF', 'TF') ORDER BY name;",
        ));
        ms.insert("column list".to_string(), QueryTemplate::with_options(
            &["-h", "-1", "-W"],
            "SELECT name FROM sys.columns WHERE object_id = OBJECT_ID('{}') ORDER BY column_id;",
        ));
        drivers.insert(DriverKind::Mssql, DriverCommand {
            program: "sqlcmd".to_string(),
            options: vec!["-s".into(), "|".into()],
            connection_args: vec![
                "-S".into(), "{host},{port}".into(),
                "-U".into(), "{username}".into(),
                "-P".into(), "{password}".into(),
                "-d".into(), "{database}".into(),
            ],
            before: vec![],
            templates: ms,
        });

        Self { drivers }
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
