//! Repository configuration
//!
//! Connection parameters stay opaque to the mapper core; the only things
//! configuration feeds the core are the merged type registry and, per
//! schema, a table name.

use crate::error::{MapperError, MapperResult};
use crate::types::{TypeHandler, TypeRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

fn default_max_connections() -> u32 {
    5
}

/// Database connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("repository configuration has no database section")]
    DatabaseMissing,

    #[error("database url is empty")]
    EmptyUrl,
}

impl From<ConfigError> for MapperError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::DatabaseMissing => MapperError::DatabaseConfigNotFound,
            ConfigError::EmptyUrl => MapperError::InvalidConfig(err.to_string()),
        }
    }
}

/// Validated repository configuration: database parameters plus the type
/// registry, merged once from built-ins and caller overrides.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    db: DatabaseConfig,
    types: TypeRegistry,
}

impl RepoConfig {
    /// Validate and build a config. Fails with `DatabaseConfigNotFound`
    /// when the database section is absent.
    pub fn create(
        db: Option<DatabaseConfig>,
        type_overrides: HashMap<String, Arc<dyn TypeHandler>>,
    ) -> MapperResult<RepoConfig> {
        let db = db.ok_or(ConfigError::DatabaseMissing)?;
        if db.url.is_empty() {
            return Err(ConfigError::EmptyUrl.into());
        }
        Ok(RepoConfig {
            db,
            types: TypeRegistry::with_overrides(type_overrides),
        })
    }

    pub fn database(&self) -> &DatabaseConfig {
        &self.db
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_section_is_its_own_error() {
        let err = RepoConfig::create(None, HashMap::new()).unwrap_err();
        assert!(matches!(err, MapperError::DatabaseConfigNotFound));
    }

    #[test]
    fn empty_url_is_invalid_config() {
        let err =
            RepoConfig::create(Some(DatabaseConfig::new("")), HashMap::new()).unwrap_err();
        assert!(matches!(err, MapperError::InvalidConfig(_)));
    }

    #[test]
    fn config_merges_types_over_builtins() {
        let config = RepoConfig::create(
            Some(DatabaseConfig::new("postgres://localhost/app")),
            HashMap::new(),
        )
        .unwrap();
        assert!(config.types().contains("uuid"));
        assert_eq!(config.database().max_connections, 5);
    }

    #[test]
    fn database_config_deserializes_with_defaults() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{"url": "postgres://localhost/app"}"#).unwrap();
        assert_eq!(config.max_connections, 5);
    }
}
