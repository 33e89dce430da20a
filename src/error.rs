// Error types for the ledger and credential layers
//
// Library operations return typed errors so callers can tell
// "wrong password" from "comparison failed" and "duplicate phone" from
// "database down". The CLI wraps them in anyhow at the boundary.

use thiserror::Error;

/// Errors raised by ledger operations and ledger stores
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient points: {available} available, {requested} requested")]
    InsufficientPoints { available: u64, requested: u64 },

    #[error("ledger not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint (id, account_ref or phone_number) was violated
    #[error("duplicate ledger {field}")]
    Duplicate { field: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while hashing, comparing or persisting admin credentials
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hashing(#[source] bcrypt::BcryptError),

    #[error("password comparison failed: {0}")]
    Comparison(#[source] bcrypt::BcryptError),

    /// The record still carries a plaintext password
    #[error("password for {0} has not been hashed")]
    NotHashed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("admin user not found: {0}")]
    NotFound(String),

    #[error("duplicate admin user {field}")]
    Duplicate { field: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Name of the column behind a SQLite UNIQUE failure, if that is what `err` is.
///
/// SQLite reports these as `UNIQUE constraint failed: table.column`.
pub(crate) fn unique_violation_field(err: &rusqlite::Error) -> Option<String> {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && msg.starts_with("UNIQUE constraint failed") =>
        {
            let column = msg
                .rsplit('.')
                .next()
                .unwrap_or("unknown")
                .trim()
                .to_string();
            Some(column)
        }
        _ => None,
    }
}
