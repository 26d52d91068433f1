//! Connection profile models.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SqlPipeError;

/// Database driver family, identifying which CLI client to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// PostgreSQL via `psql`
    Postgres,
    /// MySQL / MariaDB via `mysql`
    Mysql,
    /// SQLite via `sqlite3`
    Sqlite,
    /// SQL Server via `sqlcmd`
    Mssql,
}

impl DriverKind {
    /// Convert to string representation for storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
            Self::Mssql => "mssql",
        }
    }

    /// Parse from string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::Mysql),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "mssql" | "sqlserver" => Some(Self::Mssql),
            _ => None,
        }
    }

    /// Conventional server port for this driver family.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::Mysql => 3306,
            Self::Sqlite => 0,
            Self::Mssql => 1433,
        }
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text encoding used to decode subprocess output.
///
/// Decoding is total: undecodable bytes are replaced, never raised on,
/// because the client tool's output encoding is not fully controlled by
/// the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// UTF-8, invalid sequences replaced with U+FFFD (default)
    #[default]
    Utf8,
    /// ISO-8859-1, every byte maps to a code point
    Latin1,
}

impl TextEncoding {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "latin-1",
        }
    }

    /// Parse from string representation; unknown labels fall back to UTF-8.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "latin-1" | "latin1" | "iso-8859-1" => Self::Latin1,
            _ => Self::Utf8,
        }
    }

    /// Decode captured bytes, replacing anything undecodable.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

/// Resolved configuration for one named database target.
///
/// Constructed from external configuration at connection-selection time and
/// immutable thereafter; switching connections replaces the profile rather
/// than mutating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// Unique name within the configured set
    pub name: String,
    /// Driver family
    #[serde(rename = "type")]
    pub driver: DriverKind,
    /// Server hostname or IP (for SQLite, unused)
    #[serde(default)]
    pub host: String,
    /// Server port
    #[serde(default)]
    pub port: u16,
    /// Login username
    #[serde(default)]
    pub username: String,
    /// Login password, if the driver needs one on the command line
    #[serde(default)]
    pub password: Option<String>,
    /// Database name, or file path for SQLite
    pub database: String,
    /// Optional service name (e.g. a pg_service.conf entry)
    #[serde(default)]
    pub service: Option<String>,
    /// Output text encoding
    #[serde(default)]
    pub encoding: TextEncoding,
    /// Whether this profile is the configured default
    #[serde(default)]
    pub is_default: bool,
}

impl ConnectionProfile {
    /// Create a profile with required fields; port defaults per driver.
    pub fn new(
        name: impl Into<String>,
        driver: DriverKind,
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            driver,
            host: host.into(),
            port: driver.default_port(),
            username: username.into(),
            password: None,
            database: database.into(),
            service: None,
            encoding: TextEncoding::default(),
            is_default: false,
        }
    }

    /// Create a builder for complex configurations.
    pub fn builder() -> ConnectionProfileBuilder {
        ConnectionProfileBuilder::default()
    }

    /// Validate the profile.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Profile name is required".to_string());
        }
        if self.database.is_empty() {
            return Err("Database is required".to_string());
        }
        if self.driver != DriverKind::Sqlite && self.host.is_empty() {
            return Err("Host is required".to_string());
        }
        Ok(())
    }

    /// Display label in `driver: user@host` form.
    pub fn display_name(&self) -> String {
        format!("{}: {}@{}", self.driver, self.username, self.host)
    }
}

/// Builder for [`ConnectionProfile`].
#[derive(Debug, Default)]
pub struct ConnectionProfileBuilder {
    name: Option<String>,
    driver: Option<DriverKind>,
    host: Option<String>,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    database: Option<String>,
    service: Option<String>,
    encoding: TextEncoding,
    is_default: bool,
}

impl ConnectionProfileBuilder {
    /// Set the profile name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the driver family.
    pub fn driver(mut self, driver: DriverKind) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the database name or file path.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the service name.
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Set the output encoding.
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Mark this profile as the configured default.
    pub fn default_profile(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    /// Build the profile.
    pub fn build(self) -> Result<ConnectionProfile, String> {
        let driver = self.driver.ok_or("Driver is required")?;
        let profile = ConnectionProfile {
            name: self.name.ok_or("Name is required")?,
            driver,
            host: self.host.unwrap_or_default(),
            port: if self.port == 0 { driver.default_port() } else { self.port },
            username: self.username.unwrap_or_default(),
            password: self.password,
            database: self.database.ok_or("Database is required")?,
            service: self.service,
            encoding: self.encoding,
            is_default: self.is_default,
        };
        profile.validate()?;
        Ok(profile)
    }
}

/// The configured set of connection profiles, keyed by unique name.
///
/// Read-only from the engine's perspective; the host resolves it from its
/// settings once per connection switch.
#[derive(Debug, Default, Clone)]
pub struct ProfileSet {
    profiles: BTreeMap<String, Arc<ConnectionProfile>>,
}

impl ProfileSet {
    /// Build a set from profiles, enforcing name uniqueness.
    pub fn new(
        profiles: impl IntoIterator<Item = ConnectionProfile>,
    ) -> Result<Self, SqlPipeError> {
        let mut map = BTreeMap::new();
        for profile in profiles {
            let name = profile.name.clone();
            if map.insert(name.clone(), Arc::new(profile)).is_some() {
                return Err(SqlPipeError::config(format!("Duplicate connection name: {name}")));
            }
        }
        Ok(Self { profiles: map })
    }

    /// Parse a profile list from host settings JSON.
    pub fn from_json(json: &str) -> Result<Self, SqlPipeError> {
        let profiles: Vec<ConnectionProfile> = serde_json::from_str(json)
            .map_err(|e| SqlPipeError::config(format!("Invalid connection settings: {e}")))?;
        Self::new(profiles)
    }

    /// Look up a profile by name.
    pub fn get(&self, name: &str) -> Result<Arc<ConnectionProfile>, SqlPipeError> {
        self.profiles
            .get(name)
            .cloned()
            .ok_or_else(|| SqlPipeError::config(format!("Unknown connection: {name}")))
    }

    /// The configured default profile, if any.
    ///
    /// When several profiles are marked default, the lexicographically
    /// smallest name wins.
    pub fn default_profile(&self) -> Option<Arc<ConnectionProfile>> {
        self.profiles.values().find(|p| p.is_default).cloned()
    }

    /// All profile names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// Number of configured profiles.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, is_default: bool) -> ConnectionProfile {
        let mut p = ConnectionProfile::new(name, DriverKind::Postgres, "db.local", "app", "alice");
        p.is_default = is_default;
        p
    }

    #[test]
    fn test_default_tie_break_is_lexicographic() {
        let set = ProfileSet::new(vec![
            profile("staging", true),
            profile("production", true),
            profile("dev", false),
        ])
        .unwrap();
        assert_eq!(set.default_profile().unwrap().name, "production");
    }

    #[test]
    fn test_no_default_marked() {
        let set = ProfileSet::new(vec![profile("a", false), profile("b", false)]).unwrap();
        assert!(set.default_profile().is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = ProfileSet::new(vec![profile("a", false), profile("a", false)]).unwrap_err();
        assert_eq!(err.category(), "Configuration");
    }

    #[test]
    fn test_unknown_name_is_config_error() {
        let set = ProfileSet::new(vec![profile("a", false)]).unwrap();
        assert!(set.get("nope").is_err());
    }

    #[test]
    fn test_names_sorted() {
        let set =
            ProfileSet::new(vec![profile("zeta", false), profile("alpha", false)]).unwrap();
        assert_eq!(set.names(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_display_name_format() {
        let p = profile("x", false);
        assert_eq!(p.display_name(), "postgres: alice@db.local");
    }

    #[test]
    fn test_utf8_decode_replaces_invalid_bytes() {
        let decoded = TextEncoding::Utf8.decode(b"ok \xff\xfe end");
        assert!(decoded.starts_with("ok "));
        assert!(decoded.contains('\u{FFFD}'));
        assert!(decoded.ends_with(" end"));
    }

    #[test]
    fn test_latin1_decode_is_total() {
        let decoded = TextEncoding::Latin1.decode(&[0x63, 0x61, 0x66, 0xE9]);
        assert_eq!(decoded, "café");
    }

    #[test]
    fn test_profiles_parse_from_settings_json() {
        let set = ProfileSet::from_json(
            r#"[
                {"name": "prod", "type": "postgres", "host": "db.prod", "port": 5432,
                 "username": "app", "password": "s3cret", "database": "app",
                 "encoding": "utf-8", "is_default": true},
                {"name": "local", "type": "sqlite", "database": "/tmp/app.db"}
            ]"#,
        )
        .unwrap();
        assert_eq!(set.len(), 2);
        let prod = set.default_profile().unwrap();
        assert_eq!(prod.driver, DriverKind::Postgres);
        assert_eq!(prod.password.as_deref(), Some("s3cret"));
        assert_eq!(set.get("local").unwrap().driver, DriverKind::Sqlite);
    }

    #[test]
    fn test_malformed_settings_json_is_config_error() {
        let err = ProfileSet::from_json("{not json").unwrap_err();
        assert_eq!(err.category(), "Configuration");
    }

    #[test]
    fn test_builder_fills_driver_port() {
        let p = ConnectionProfile::builder()
            .name("local")
            .driver(DriverKind::Mysql)
            .host("127.0.0.1")
            .database("app")
            .username("root")
            .build()
            .unwrap();
        assert_eq!(p.port, 3306);
    }

    #[test]
    fn test_sqlite_profile_needs_no_host() {
        let p = ConnectionProfile::builder()
            .name("local")
            .driver(DriverKind::Sqlite)
            .database("/tmp/app.db")
            .build()
            .unwrap();
        assert_eq!(p.port, 0);
        assert!(p.validate().is_ok());
    }
}
