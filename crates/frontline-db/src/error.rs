//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] and [`fred`] errors. At the store boundary they collapse into
//! [`StoreError`], which is what the sync engine sees.

use frontline_core::store::StoreError;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored column or key held a value this build cannot interpret.
    #[error("Invalid stored value: {0}")]
    InvalidValue(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The store was used after `close`.
    #[error("Store is closed")]
    Closed,
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Serialization(e) => Self::Serialization(e.to_string()),
            DbError::InvalidValue(msg) => Self::Serialization(msg),
            DbError::Closed => Self::Closed,
            other => Self::Backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_errors_map_onto_store_errors() {
        assert_eq!(StoreError::from(DbError::Closed), StoreError::Closed);
        assert!(matches!(
            StoreError::from(DbError::InvalidValue(String::from("team Pirates"))),
            StoreError::Serialization(_)
        ));
        assert!(matches!(
            StoreError::from(DbError::Config(String::from("bad url"))),
            StoreError::Backend(_)
        ));
    }
}
