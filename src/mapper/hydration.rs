//! Row hydration
//!
//! Converts a flat raw row into an entity by mapping each schema field's
//! storage column through its type handler. A column absent from the row
//! leaves the field unassigned; the entity ends up with exactly the
//! fields the row carried.

use crate::error::MapperResult;
use crate::schema::Schema;
use crate::types::TypeRegistry;
use crate::value::{Entity, Row};

/// Hydrate from a row keyed by plain column names.
pub fn hydrate(schema: &Schema, types: &TypeRegistry, row: &Row) -> MapperResult<Entity> {
    let mut entity = Entity::new();
    for field in schema.fields() {
        if let Some(raw) = row.get(field.column_name()) {
            entity.set(field.field_name(), types.load(field.type_name(), raw.clone())?);
        }
    }
    Ok(entity)
}

/// Hydrate from a joined row keyed by `<alias>__<column>`.
pub fn hydrate_aliased(
    schema: &Schema,
    types: &TypeRegistry,
    row: &Row,
    alias: &str,
) -> MapperResult<Entity> {
    let mut entity = Entity::new();
    for field in schema.fields() {
        let key = format!("{}__{}", alias, field.column_name());
        if let Some(raw) = row.get(&key) {
            entity.set(field.field_name(), types.load(field.type_name(), raw.clone())?);
        }
    }
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, SchemaSpec};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::create(
            SchemaSpec::new("entries")
                .field(FieldSpec::new("id", "integer").primary())
                .field(FieldSpec::new("entryCode", "string"))
                .field(FieldSpec::new("active", "boolean")),
        )
        .unwrap()
    }

    #[test]
    fn hydrate_coerces_and_renames_columns_to_fields() {
        let row: Row = [
            ("id".to_string(), json!("5")),
            ("entry_code".to_string(), json!("abc")),
            ("active".to_string(), json!(1)),
        ]
        .into_iter()
        .collect();

        let entity = hydrate(&schema(), &TypeRegistry::builtin(), &row).unwrap();
        assert_eq!(entity.get("id"), Some(&json!(5)));
        assert_eq!(entity.get("entryCode"), Some(&json!("abc")));
        assert_eq!(entity.get("active"), Some(&json!(true)));
    }

    #[test]
    fn absent_columns_leave_fields_unassigned() {
        let row: Row = [("id".to_string(), json!(1))].into_iter().collect();
        let entity = hydrate(&schema(), &TypeRegistry::builtin(), &row).unwrap();
        assert!(!entity.contains("entryCode"));
    }

    #[test]
    fn hydrate_aliased_reads_prefixed_keys() {
        let row: Row = [
            ("entries__id".to_string(), json!(1)),
            ("entries__entry_code".to_string(), json!("abc")),
            // keys under another alias are ignored
            ("others__id".to_string(), json!(9)),
        ]
        .into_iter()
        .collect();

        let entity = hydrate_aliased(&schema(), &TypeRegistry::builtin(), &row, "entries").unwrap();
        assert_eq!(entity.get("id"), Some(&json!(1)));
        assert_eq!(entity.get("entryCode"), Some(&json!("abc")));
    }
}
