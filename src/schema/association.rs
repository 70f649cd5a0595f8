//! Association descriptors
//!
//! An association names a relation to another entity kind's schema. The
//! target schema is referenced through a provider closure and resolved
//! only when a preload needs it, so mutually associated entity kinds
//! never require an eager initialization order.

use crate::error::MapperResult;
use crate::schema::{Schema, SchemaSpec};
use std::fmt;
use std::sync::Arc;

/// Whether an association yields at most one or any number of entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Lazy reference to the target entity kind's schema spec.
pub type SchemaProvider = Arc<dyn Fn() -> SchemaSpec + Send + Sync>;

/// Declarative spec for one association.
#[derive(Clone)]
pub struct AssociationSpec {
    pub name: String,
    pub cardinality: Cardinality,
    pub schema_provider: SchemaProvider,
    pub local_key: String,
    pub foreign_key: String,
}

impl AssociationSpec {
    pub fn new(
        name: impl Into<String>,
        cardinality: Cardinality,
        schema_provider: impl Fn() -> SchemaSpec + Send + Sync + 'static,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cardinality,
            schema_provider: Arc::new(schema_provider),
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
        }
    }
}

impl fmt::Debug for AssociationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationSpec")
            .field("name", &self.name)
            .field("cardinality", &self.cardinality)
            .field("local_key", &self.local_key)
            .field("foreign_key", &self.foreign_key)
            .finish()
    }
}

/// A named relation descriptor on a schema.
#[derive(Clone)]
pub struct Association {
    name: String,
    cardinality: Cardinality,
    schema_provider: SchemaProvider,
    local_key: String,
    foreign_key: String,
}

impl Association {
    pub fn create(spec: AssociationSpec) -> Self {
        Self {
            name: spec.name,
            cardinality: spec.cardinality,
            schema_provider: spec.schema_provider,
            local_key: spec.local_key,
            foreign_key: spec.foreign_key,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Column on the owning table used for in-memory matching.
    pub fn local_key(&self) -> &str {
        &self.local_key
    }

    /// Column on the target table used for in-memory matching.
    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    /// Resolve the target entity kind's schema. Validation of the target
    /// spec happens here, at first use, not at declaration time.
    pub fn target_schema(&self) -> MapperResult<Schema> {
        Schema::create((self.schema_provider)())
    }
}

impl fmt::Debug for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Association")
            .field("name", &self.name)
            .field("cardinality", &self.cardinality)
            .field("local_key", &self.local_key)
            .field("foreign_key", &self.foreign_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;

    fn leaf_spec() -> SchemaSpec {
        SchemaSpec::new("leaves").field(FieldSpec::new("id", "integer").primary())
    }

    #[test]
    fn target_schema_resolves_lazily() {
        let association = Association::create(AssociationSpec::new(
            "leaves",
            Cardinality::Many,
            leaf_spec,
            "id",
            "branch_id",
        ));

        let target = association.target_schema().unwrap();
        assert_eq!(target.table(), "leaves");
    }

    #[test]
    fn invalid_target_spec_surfaces_at_resolution() {
        let association = Association::create(AssociationSpec::new(
            "broken",
            Cardinality::One,
            || SchemaSpec::new("nowhere"),
            "id",
            "owner_id",
        ));

        assert!(association.target_schema().is_err());
    }
}
