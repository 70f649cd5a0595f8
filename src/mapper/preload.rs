//! Pending preload requests
//!
//! A preload is a resolved association plus an optional table alias,
//! created per fetch and consumed by the resolver. The alias override
//! exists for the ambiguous cases, e.g. self-joins, where the target's
//! own table name would collide.

use crate::error::{MapperError, MapperResult};
use crate::schema::{Association, Schema};

/// One pending association resolution.
#[derive(Debug, Clone)]
pub struct Preload {
    association: Association,
    table_alias: Option<String>,
}

impl Preload {
    /// Resolve an association name against the schema. Fails with
    /// `AssociationNotFound` for names the schema does not declare.
    pub fn create(schema: &Schema, name: &str, table_alias: Option<String>) -> MapperResult<Preload> {
        let association = schema
            .find_association(name)
            .ok_or_else(|| MapperError::AssociationNotFound(name.to_string()))?;
        Ok(Preload {
            association: association.clone(),
            table_alias,
        })
    }

    pub fn association(&self) -> &Association {
        &self.association
    }

    pub fn table_alias(&self) -> Option<&str> {
        self.table_alias.as_deref()
    }

    /// Copy of this preload pinned to the given table alias.
    pub(crate) fn with_table_alias(&self, alias: String) -> Preload {
        Preload {
            association: self.association.clone(),
            table_alias: Some(alias),
        }
    }

    /// The alias the target's columns are projected under: the explicit
    /// override, or the target's own table name.
    pub fn effective_alias(&self, target: &Schema) -> String {
        self.table_alias
            .clone()
            .unwrap_or_else(|| target.table().to_string())
    }
}

/// Accepted shapes for a `preload` call: one name, a list of names, or
/// name-to-alias pairs.
#[derive(Debug, Clone)]
pub enum PreloadSpec {
    Name(String),
    Names(Vec<String>),
    Aliased(Vec<(String, String)>),
}

impl PreloadSpec {
    /// Flatten into `(name, alias)` entries.
    pub fn entries(self) -> Vec<(String, Option<String>)> {
        match self {
            PreloadSpec::Name(name) => vec![(name, None)],
            PreloadSpec::Names(names) => names.into_iter().map(|n| (n, None)).collect(),
            PreloadSpec::Aliased(pairs) => pairs
                .into_iter()
                .map(|(name, alias)| (name, Some(alias)))
                .collect(),
        }
    }
}

impl From<&str> for PreloadSpec {
    fn from(name: &str) -> Self {
        PreloadSpec::Name(name.to_string())
    }
}

impl From<String> for PreloadSpec {
    fn from(name: String) -> Self {
        PreloadSpec::Name(name)
    }
}

impl From<Vec<&str>> for PreloadSpec {
    fn from(names: Vec<&str>) -> Self {
        PreloadSpec::Names(names.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for PreloadSpec {
    fn from(names: Vec<String>) -> Self {
        PreloadSpec::Names(names)
    }
}

impl From<Vec<(&str, &str)>> for PreloadSpec {
    fn from(pairs: Vec<(&str, &str)>) -> Self {
        PreloadSpec::Aliased(
            pairs
                .into_iter()
                .map(|(name, alias)| (name.to_string(), alias.to_string()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AssociationSpec, Cardinality, FieldSpec, SchemaSpec};

    fn schema_with_children() -> Schema {
        Schema::create(
            SchemaSpec::new("parents")
                .field(FieldSpec::new("id", "integer").primary())
                .association(AssociationSpec::new(
                    "children",
                    Cardinality::Many,
                    || SchemaSpec::new("children").field(FieldSpec::new("id", "integer").primary()),
                    "id",
                    "parent_id",
                )),
        )
        .unwrap()
    }

    #[test]
    fn create_resolves_declared_associations() {
        let schema = schema_with_children();
        let preload = Preload::create(&schema, "children", None).unwrap();
        assert_eq!(preload.association().name(), "children");

        let target = preload.association().target_schema().unwrap();
        assert_eq!(preload.effective_alias(&target), "children");

        let aliased = Preload::create(&schema, "children", Some("kids".to_string())).unwrap();
        assert_eq!(aliased.effective_alias(&target), "kids");
    }

    #[test]
    fn unknown_association_fails() {
        let schema = schema_with_children();
        assert!(matches!(
            Preload::create(&schema, "siblings", None),
            Err(MapperError::AssociationNotFound(name)) if name == "siblings"
        ));
    }

    #[test]
    fn spec_shapes_flatten_to_entries() {
        let single: PreloadSpec = "children".into();
        assert_eq!(single.entries(), vec![("children".to_string(), None)]);

        let many: PreloadSpec = vec!["a", "b"].into();
        assert_eq!(many.entries().len(), 2);

        let aliased: PreloadSpec = vec![("children", "kids")].into();
        assert_eq!(
            aliased.entries(),
            vec![("children".to_string(), Some("kids".to_string()))]
        );
    }
}
