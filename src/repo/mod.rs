//! Repositories
//!
//! A repo binds an engine to a type registry and hands out mappers, one
//! per entity kind. Mappers from a plain repo may run concurrently since
//! each fetch uses its own connection; transactional work goes through
//! [`TransactionalRepo`], which pins one exclusive connection.

pub mod config;
pub mod transactional;

pub use config::{ConfigError, DatabaseConfig, RepoConfig};
pub use transactional::TransactionalRepo;

use crate::backends::{Engine, MemoryEngine, PostgresEngine};
use crate::error::MapperResult;
use crate::mapper::Mapper;
use crate::schema::{Schema, SchemaSpec};
use crate::types::{TypeHandler, TypeRegistry};
use std::collections::HashMap;
use std::sync::Arc;

/// Entry point: an engine plus the immutable type registry.
#[derive(Clone)]
pub struct Repo {
    engine: Arc<dyn Engine>,
    types: Arc<TypeRegistry>,
}

impl Repo {
    /// Connect a PostgreSQL-backed repo from a validated configuration.
    pub async fn create(config: RepoConfig) -> MapperResult<Repo> {
        let db = config.database();
        let engine = PostgresEngine::connect(&db.url, db.max_connections).await?;
        Ok(Repo {
            engine: Arc::new(engine),
            types: Arc::new(config.types().clone()),
        })
    }

    /// Repo over the embedded in-memory engine with built-in types.
    pub fn in_memory() -> Repo {
        Self::with_engine(Arc::new(MemoryEngine::new()), TypeRegistry::builtin())
    }

    /// Repo over the embedded engine with caller type overrides merged
    /// over the built-ins.
    pub fn in_memory_with_types(overrides: HashMap<String, Arc<dyn TypeHandler>>) -> Repo {
        Self::with_engine(
            Arc::new(MemoryEngine::new()),
            TypeRegistry::with_overrides(overrides),
        )
    }

    /// Repo over an arbitrary engine.
    pub fn with_engine(engine: Arc<dyn Engine>, types: TypeRegistry) -> Repo {
        Repo {
            engine,
            types: Arc::new(types),
        }
    }

    /// Validate a schema spec and build a mapper for its entity kind.
    pub fn mapper(&self, spec: SchemaSpec) -> MapperResult<Mapper> {
        Ok(self.mapper_for(Schema::create(spec)?))
    }

    /// Mapper for an already validated schema.
    pub fn mapper_for(&self, schema: Schema) -> Mapper {
        let delegate = self.engine.delegate(schema.table());
        Mapper::create(Arc::new(schema), self.types.clone(), delegate)
    }

    /// Acquire an exclusive session for transactional work.
    pub async fn transactional(&self) -> MapperResult<TransactionalRepo> {
        let session = self.engine.session().await?;
        Ok(TransactionalRepo::new(session, self.types.clone()))
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }
}
