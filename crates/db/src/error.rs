//! Database error types.
//!
//! All errors of the persistence layer are consolidated into [`DbError`],
//! which converts automatically from the underlying error types.

use thiserror::Error;

/// Errors that can occur during database operations.
///
/// # Error Categories
///
/// - **Infrastructure errors**: [`Sqlite`](DbError::Sqlite), [`Pool`](DbError::Pool),
///   [`Io`](DbError::Io) - failures in the underlying systems
/// - **Data errors**: [`Encoding`](DbError::Encoding), [`Integrity`](DbError::Integrity),
///   [`NotFound`](DbError::NotFound) - problems with data format or existence
/// - **Schema errors**: [`Migration`](DbError::Migration) - schema version incompatibilities
/// - **Contract errors**: [`NestingViolation`](DbError::NestingViolation) - misuse of
///   the writer transaction API; never retried
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite database error.
    ///
    /// Wraps errors from rusqlite including query failures, constraint
    /// violations, and database corruption.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding error while reading or writing headers and markers.
    #[error("Encoding error: {0}")]
    Encoding(#[from] ledgersync_common::Error),

    /// Requested data was not found.
    ///
    /// Used when the absence of a row is unexpected, such as updating an
    /// entry that was never inserted.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Data integrity violation.
    ///
    /// A stored value could not be decoded into its typed form.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Schema migration error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Writer transaction nesting contract violated.
    ///
    /// Raised when nesting beyond two levels, ending a level other than the
    /// innermost, or checkpointing from inside a savepoint.
    #[error("Transaction nesting violation: {0}")]
    NestingViolation(String),
}
