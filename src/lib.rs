//! # ectomap: schema-driven entity mapper
//!
//! Maps flat relational rows into typed domain entities and back:
//! declarative schemas with fields and associations, a pluggable
//! type-coercion registry, and eager association resolution that
//! reconstructs a forest of related entities from a single joined
//! result set in one round trip, with no per-row queries.
//!
//! The mapper core drives any engine implementing the query delegate
//! contract; a PostgreSQL backend and an embedded in-memory backend
//! ship in [`backends`].

pub mod backends;
pub mod error;
pub mod mapper;
pub mod query;
pub mod repo;
pub mod schema;
pub mod types;
pub mod value;



// Re-export the core surface
pub use error::{MapperError, MapperResult, OrmError, OrmResult};
pub use mapper::{Mapper, Preload, PreloadSpec};
pub use query::{Filter, FilterOp, JoinClause, Projection, QueryDelegate, QueryOutcome};
pub use repo::{DatabaseConfig, Repo, RepoConfig, TransactionalRepo};
pub use schema::{
    Association, AssociationSpec, Cardinality, Field, FieldDefault, FieldSpec, Schema, SchemaSpec,
};
pub use types::{TypeHandler, TypeRegistry};
pub use value::{Entity, Related, Row};
