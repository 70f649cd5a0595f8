//! Error types for the mapper
//!
//! Covers schema construction, repository configuration, association
//! resolution, and the delegated database operations.

use std::fmt;

/// Result type alias for mapper operations
pub type MapperResult<T> = Result<T, MapperError>;

/// ORM error type alias
pub type OrmError = MapperError;

/// ORM result type alias
pub type OrmResult<T> = MapperResult<T>;

/// Error types for mapper operations
#[derive(Debug, Clone)]
pub enum MapperError {
    /// Schema spec is malformed (missing table, missing fields, duplicates)
    InvalidSchema(String),
    /// Repository configuration is malformed
    InvalidConfig(String),
    /// Repository configuration has no database section
    DatabaseConfigNotFound,
    /// Preload references an association the schema does not declare
    AssociationNotFound(String),
    /// Record vanished between existence check and mutation
    NotFound(String),
    /// Schema has no primary field but a primary-dependent operation was invoked
    MissingPrimaryKey(String),
    /// Field references a type name absent from the registry
    UnknownType(String),
    /// Type handler rejected a value
    Coercion(String),
    /// Database connection or query error
    Database(String),
    /// Transaction error
    Transaction(String),
    /// Serialization/deserialization error
    Serialization(String),
    /// Query delegate returned an outcome the operation cannot use
    Query(String),
}

impl fmt::Display for MapperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapperError::InvalidSchema(msg) => write!(f, "Invalid schema: {}", msg),
            MapperError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            MapperError::DatabaseConfigNotFound => {
                write!(f, "Repository configuration has no database section")
            }
            MapperError::AssociationNotFound(name) => {
                write!(f, "Association '{}' is not declared on the schema", name)
            }
            MapperError::NotFound(table) => write!(f, "Record not found in table '{}'", table),
            MapperError::MissingPrimaryKey(table) => {
                write!(f, "Schema for table '{}' declares no primary field", table)
            }
            MapperError::UnknownType(name) => {
                write!(f, "Type '{}' is not registered", name)
            }
            MapperError::Coercion(msg) => write!(f, "Coercion error: {}", msg),
            MapperError::Database(msg) => write!(f, "Database error: {}", msg),
            MapperError::Transaction(msg) => write!(f, "Transaction error: {}", msg),
            MapperError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            MapperError::Query(msg) => write!(f, "Query error: {}", msg),
        }
    }
}

impl std::error::Error for MapperError {}

// Convert from sqlx errors
impl From<sqlx::Error> for MapperError {
    fn from(err: sqlx::Error) -> Self {
        MapperError::Database(err.to_string())
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for MapperError {
    fn from(err: serde_json::Error) -> Self {
        MapperError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offending_identifier() {
        let err = MapperError::AssociationNotFound("children".to_string());
        assert!(err.to_string().contains("children"));

        let err = MapperError::MissingPrimaryKey("core_entities".to_string());
        assert!(err.to_string().contains("core_entities"));
    }

    #[test]
    fn serde_errors_map_to_serialization() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: MapperError = parse_err.into();
        assert!(matches!(err, MapperError::Serialization(_)));
    }
}
