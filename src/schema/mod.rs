//! Declarative entity schemas
//!
//! A schema binds one entity kind to one table: an ordered field set plus
//! the associations to other entity kinds. Built once from a declarative
//! spec, immutable thereafter.

pub mod association;
pub mod field;

pub use association::{Association, AssociationSpec, Cardinality, SchemaProvider};
pub use field::{Field, FieldDefault, FieldSpec};

use crate::error::{MapperError, MapperResult};
use std::collections::HashSet;

/// Declarative spec for one entity kind.
#[derive(Debug, Clone)]
pub struct SchemaSpec {
    pub table: String,
    pub fields: Vec<FieldSpec>,
    pub associations: Vec<AssociationSpec>,
}

impl SchemaSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: Vec::new(),
            associations: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn association(mut self, association: AssociationSpec) -> Self {
        self.associations.push(association);
        self
    }
}

/// Table name plus ordered fields and named associations.
#[derive(Debug, Clone)]
pub struct Schema {
    table: String,
    fields: Vec<Field>,
    associations: Vec<Association>,
}

impl Schema {
    /// Validate a spec and build the schema. Fails with `InvalidSchema`
    /// when the table name is empty, no fields are declared, or two
    /// fields share a name. Associations are carried as declared; their
    /// target schemas are not resolved here.
    pub fn create(spec: SchemaSpec) -> MapperResult<Schema> {
        if spec.table.is_empty() {
            return Err(MapperError::InvalidSchema("table name is required".to_string()));
        }
        if spec.fields.is_empty() {
            return Err(MapperError::InvalidSchema(format!(
                "schema for table '{}' declares no fields",
                spec.table
            )));
        }

        let mut seen = HashSet::new();
        for field in &spec.fields {
            if !seen.insert(field.field_name.clone()) {
                return Err(MapperError::InvalidSchema(format!(
                    "duplicate field '{}' in schema for table '{}'",
                    field.field_name, spec.table
                )));
            }
        }

        Ok(Schema {
            table: spec.table,
            fields: spec.fields.into_iter().map(Field::create).collect(),
            associations: spec.associations.into_iter().map(Association::create).collect(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, field_name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.field_name() == field_name)
    }

    pub fn field_by_column(&self, column_name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.column_name() == column_name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(Field::field_name).collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(Field::column_name).collect()
    }

    /// The first field marked primary, or none. Construction does not
    /// enforce a primary count; primary-dependent operations validate at
    /// first use via [`primary_field_required`](Self::primary_field_required).
    pub fn primary_field(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.is_primary())
    }

    pub fn primary_field_required(&self) -> MapperResult<&Field> {
        self.primary_field()
            .ok_or_else(|| MapperError::MissingPrimaryKey(self.table.clone()))
    }

    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    pub fn find_association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name() == name)
    }

    /// Full aliased projection of this schema's columns under the given
    /// table alias: `"<alias>.<column> AS <alias>__<column>"`. The alias
    /// defaults to the table name. Grouping and deduplication downstream
    /// key on `<alias>__<primaryColumn>`.
    pub fn aliased_columns(&self, alias: Option<&str>) -> Vec<String> {
        let alias = alias.unwrap_or(&self.table);
        self.fields
            .iter()
            .map(|f| format!("{}.{} AS {}__{}", alias, f.column_name(), alias, f.column_name()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_spec() -> SchemaSpec {
        SchemaSpec::new("entries")
            .field(FieldSpec::new("id", "integer").primary())
            .field(FieldSpec::new("entryCode", "string"))
            .field(FieldSpec::new("body", "string").column("body_text"))
    }

    #[test]
    fn create_preserves_table_and_field_set() {
        let schema = Schema::create(entry_spec()).unwrap();

        assert_eq!(schema.table(), "entries");
        assert_eq!(schema.field_names(), vec!["id", "entryCode", "body"]);
        assert_eq!(schema.column_names(), vec!["id", "entry_code", "body_text"]);
    }

    #[test]
    fn create_rejects_empty_table_and_empty_fields() {
        let no_table = SchemaSpec::new("").field(FieldSpec::new("id", "integer"));
        assert!(matches!(Schema::create(no_table), Err(MapperError::InvalidSchema(_))));

        let no_fields = SchemaSpec::new("entries");
        assert!(matches!(Schema::create(no_fields), Err(MapperError::InvalidSchema(_))));
    }

    #[test]
    fn create_rejects_duplicate_field_names() {
        let spec = SchemaSpec::new("entries")
            .field(FieldSpec::new("id", "integer"))
            .field(FieldSpec::new("id", "uuid"));
        let err = Schema::create(spec).unwrap_err();
        assert!(err.to_string().contains("duplicate field 'id'"));
    }

    #[test]
    fn primary_field_is_first_marked_or_none() {
        let schema = Schema::create(entry_spec()).unwrap();
        assert_eq!(schema.primary_field().unwrap().field_name(), "id");

        let unkeyed = Schema::create(
            SchemaSpec::new("notes").field(FieldSpec::new("text", "string")),
        )
        .unwrap();
        assert!(unkeyed.primary_field().is_none());
        assert!(matches!(
            unkeyed.primary_field_required(),
            Err(MapperError::MissingPrimaryKey(table)) if table == "notes"
        ));
    }

    #[test]
    fn aliased_columns_follow_the_wire_convention() {
        let schema = Schema::create(entry_spec()).unwrap();

        assert_eq!(
            schema.aliased_columns(None)[1],
            "entries.entry_code AS entries__entry_code"
        );
        assert_eq!(
            schema.aliased_columns(Some("parents"))[0],
            "parents.id AS parents__id"
        );
    }
}
