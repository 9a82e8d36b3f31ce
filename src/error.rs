//! Error types for the attendance tracker.

use thiserror::Error;

/// Result type alias for attendance operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while recording, reporting or notifying on attendance.
#[derive(Error, Debug)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("could not connect to the database: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("could not read workbook: {0}")]
    SpreadsheetRead(#[from] calamine::XlsxError),

    #[error("could not write workbook: {0}")]
    SpreadsheetWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("mail error: {0}")]
    Mail(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("import failed with {} error(s)", .0.len())]
    ImportFailed(Vec<String>),

    /// Rolls back a dry run that validated this many rows. Never returned to callers.
    #[error("dry run rolled back after {0} row(s)")]
    DryRunRollback(usize),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("not logged in, run `tpc login` first")]
    NotLoggedIn,

    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl From<lettre::error::Error> for Error {
    fn from(err: lettre::error::Error) -> Self {
        Error::Mail(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for Error {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        Error::Mail(err.to_string())
    }
}

impl From<lettre::address::AddressError> for Error {
    fn from(err: lettre::address::AddressError) -> Self {
        Error::Mail(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for Error {
    fn from(err: argon2::password_hash::Error) -> Self {
        Error::PasswordHash(err.to_string())
    }
}

/// Raised when a stored enumeration code does not name a known variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} code `{code}`")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: String,
}
