//! Error types for the SQLPipe engine.
//!
//! Terminal query states (`Killed`, `TimedOut`) are not errors; they live on
//! [`crate::models::QueryState`] and are surfaced as informational messages.

use thiserror::Error;

/// Main error type for the SQLPipe engine.
#[derive(Debug, Error)]
pub enum SqlPipeError {
    /// Unknown connection name, unknown driver, or missing query template.
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Missing required parameter or no active connection selected.
    ///
    /// Surfaced before any subprocess is spawned.
    #[error("{message}")]
    Usage {
        /// Human-readable error message.
        message: String,
    },

    /// The OS failed to create the subprocess.
    #[error("Failed to start {program}: {message}")]
    Spawn {
        /// The executable that could not be started.
        program: String,
        /// OS-level error text.
        message: String,
        /// Underlying I/O error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The driver wrote to its error stream and produced no output.
    ///
    /// The engine does not parse driver-specific error codes; the stderr
    /// text is surfaced verbatim.
    #[error("{message}")]
    Driver {
        /// Error text captured from the driver's stderr.
        message: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SqlPipeError {
    // ========== Constructors ==========

    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage { message: message.into() }
    }

    /// Create a new spawn error from an OS error.
    pub fn spawn(
        program: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Spawn {
            program: program.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new driver error from captured stderr text.
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Create a new internal error with source.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Box::new(source)) }
    }

    // ========== Methods ==========

    /// Check if this error should be surfaced before spawning anything.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage { .. })
    }

    /// Check if this error originated from the driver process.
    pub fn is_driver(&self) -> bool {
        matches!(self, Self::Driver { .. })
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "Configuration",
            Self::Usage { .. } => "Usage",
            Self::Spawn { .. } => "Spawn",
            Self::Driver { .. } => "Driver",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Config { .. } => Some("Check the connection and driver settings"),
            Self::Usage { .. } => None,
            Self::Spawn { .. } => Some("Check that the client binary is installed and on PATH"),
            Self::Driver { .. } => None,
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            error_type: format!("{} Error", self.category()),
            message: self.to_string(),
            hint: self.hint().map(String::from),
        }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Category name (e.g., "Driver Error").
    pub error_type: String,
    /// User-friendly message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
}

impl From<std::io::Error> for SqlPipeError {
    fn from(err: std::io::Error) -> Self {
        SqlPipeError::Internal { message: err.to_string(), source: Some(Box::new(err)) }
    }
}
