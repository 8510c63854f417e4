//! Error types for datamapper

use thiserror::Error;

/// Result type alias for datamapper operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types raised by the mapper.
///
/// Data-quality problems (failed validation rules, unsaved related objects, a
/// rolled back auto-transaction) are *not* errors: they are recorded on the
/// entity's [`ErrorSet`](crate::validation::ErrorSet) and `save`/`delete`
/// report `Ok(false)`.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend rejected a statement
    #[error("Query error: {0}")]
    Query(String),

    /// Error reported by the PostgreSQL driver
    #[cfg(feature = "postgres")]
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// No model definition is registered under this class name
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// A relation path segment could not be resolved
    #[error("Unable to relate {model} with {relation}")]
    UnknownRelation { model: String, relation: String },

    /// The parent context names a relation the model does not declare
    #[error("'{parent}' is not a valid parent relationship for {model}")]
    InvalidParent { model: String, parent: String },

    /// Model definition bug (bad relation metadata, unknown rule, empty table)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed query construction (function or subquery arguments, empty update)
    #[error("Query construction error: {0}")]
    QueryBuild(String),

    /// Value decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a query construction error
    pub fn query_build(message: impl Into<String>) -> Self {
        Self::QueryBuild(message.into())
    }

    pub(crate) fn unknown_relation(model: impl Into<String>, relation: impl Into<String>) -> Self {
        Self::UnknownRelation {
            model: model.into(),
            relation: relation.into(),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a configuration error (including unknown models/relations)
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::UnknownModel(_)
                | Self::UnknownRelation { .. }
                | Self::InvalidParent { .. }
        )
    }

    /// Check if the error originated in the database backend.
    ///
    /// Only these errors mark a running transaction as failed.
    pub fn is_database(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Query(_) => true,
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => true,
            _ => false,
        }
    }
}
