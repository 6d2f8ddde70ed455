//! Error types for the record database harness
//!
//! Every error that escapes a test procedure is structural: the harness
//! reports it as a bail-out rather than as a failed assertion.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Test Plan Errors ===
    #[error("{0}")]
    Bail(String),

    #[error("Test plan misuse: cannot {action} while plan is {state}")]
    PlanState { action: String, state: String },

    // === Dataset Load Errors ===
    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("Record type '{0}' is not defined in the schema")]
    UndefinedType(String),

    #[error("Record \"{name}\" of type '{existing}' redefined with new type '{requested}'")]
    TypeRedefined {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("Name \"{0}\" is already in use by another record or alias")]
    DuplicateName(String),

    #[error("Record \"{record}\": {message}")]
    InvalidField { record: String, message: String },

    #[error("Record \"{record}\": record support rejected it: {message}")]
    InitRecord { record: String, message: String },

    // === Binding Errors ===
    #[error("Bindings registered for {kind} '{name}', which the schema does not declare")]
    UnknownBinding { kind: &'static str, name: String },

    #[error("No support registered for {kind} '{name}'")]
    MissingBinding { kind: &'static str, name: String },

    #[error("Bindings must be registered exactly once, after the schema and before instance data")]
    BindingsState,

    // === Macro Errors ===
    #[error("Macro '{0}' is undefined")]
    UndefinedMacro(String),

    #[error("Macro '{0}' is defined recursively")]
    MacroRecursion(String),

    #[error("Unterminated macro reference in '{0}'")]
    MacroSyntax(String),

    #[error("Invalid macro definitions '{input}': {reason}")]
    MacroDefinition { input: String, reason: String },

    // === Lookup Errors ===
    #[error("Record \"{name}\" not found")]
    NotFound { name: String },

    #[error("Record \"{record}\" has no field '{field}'")]
    FieldNotFound { record: String, field: String },

    // === Configuration Errors ===
    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a plan state error
    pub fn plan_state(action: &str, state: &str) -> Self {
        Self::PlanState {
            action: action.to_string(),
            state: state.to_string(),
        }
    }

    /// Create a parse error at a file position
    pub fn parse(file: &str, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.to_string(),
            line,
            message: message.into(),
        }
    }

    /// Create a file read error
    pub fn file_read(path: &Path, error: impl ToString) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Create an invalid field error
    pub fn invalid_field(record: &str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            record: record.to_string(),
            message: message.into(),
        }
    }

    /// Whether this is a lookup miss rather than a structural failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::FieldNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bail_displays_reason_only() {
        let err = Error::Bail("Missing record \"x\"".to_string());
        assert_eq!(err.to_string(), "Missing record \"x\"");
    }

    #[test]
    fn test_not_found_classification() {
        assert!(Error::NotFound { name: "a".into() }.is_not_found());
        assert!(!Error::UndefinedType("ai".into()).is_not_found());
    }

    #[test]
    fn test_parse_error_position() {
        let err = Error::parse("x.db", 12, "expected '('");
        assert_eq!(err.to_string(), "x.db:12: expected '('");
    }
}
