/// sqlhost Error Module
///
/// This module defines the error taxonomy for the binding layer. Every
/// failure that crosses the engine boundary carries the engine's result code
/// and its textual diagnostic; nothing is swallowed or retried.
use crate::core::db::StatementState;
use rusqlite::ErrorCode;
use thiserror::Error;

/// Error type for every operation exposed by sqlhost.
///
/// The variants cover:
/// - Engine failures (open, prepare, bind, step) with the engine's message
/// - Host-side argument problems (unsupported value types, unnamed parameters)
/// - Result-cardinality violations for single-result queries
/// - Lifecycle misuse (finalized statements, closed connections)
/// - Configuration loading
#[derive(Error, Debug)]
pub enum SqlHostError {
    /// The engine could not open the requested database
    #[error("{path}: {message}")]
    Open {
        path: String,
        code: ErrorCode,
        message: String,
    },

    /// The SQL text could not be compiled
    #[error("prepare failed: {message}")]
    Prepare { code: ErrorCode, message: String },

    /// The engine rejected a parameter value
    #[error("bind failed: {message}")]
    Bind { code: ErrorCode, message: String },

    /// A host value of a type with no SQL counterpart was supplied for a parameter
    #[error("unsupported host type '{type_name}' at position {position}")]
    UnsupportedType {
        position: usize,
        type_name: &'static str,
    },

    /// Caller-local binding met an anonymous or numbered parameter
    #[error("anonymous and numbered parameters not supported (parameter {position})")]
    UnnamedParameter { position: usize },

    /// Advancing the statement returned neither a row nor completion
    #[error("step failed: {message}")]
    Step { code: ErrorCode, message: String },

    /// A single-result query produced no rows
    #[error("no results")]
    NoResults,

    /// A single-result query produced more than one row
    #[error("too many results")]
    TooManyResults,

    /// An update was run against a statement that produces rows
    #[error("statement returned rows; use a query method instead")]
    ReturnedRows,

    /// The statement's native handle has already been released
    #[error("statement has been finalized")]
    Finalized,

    /// The connection's native handle has already been released
    #[error("database '{path}' is closed")]
    Closed { path: String },

    /// The statement is not in a state that allows the operation
    #[error("cannot {operation} a statement in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: StatementState,
    },

    /// The connection already has an active savepoint transaction
    #[error("a transaction is already active on this connection")]
    NestedTransaction,

    /// A host call was made with malformed arguments or an unknown target
    #[error("{0}")]
    HostCall(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SqlHostError {
    /// The engine result code behind this error, if it came from the engine.
    pub fn engine_code(&self) -> Option<ErrorCode> {
        match self {
            SqlHostError::Open { code, .. }
            | SqlHostError::Prepare { code, .. }
            | SqlHostError::Bind { code, .. }
            | SqlHostError::Step { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Type alias for Result to use SqlHostError as the error type.
pub type Result<T> = std::result::Result<T, SqlHostError>;
