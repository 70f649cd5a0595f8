//! Association resolution
//!
//! Reconstructs a forest of entities from one flat joined rowset. A
//! single SQL join duplicates base rows once per matching related row
//! (and once per sibling relation); this module deduplicates by primary
//! key, hydrates each distinct entity exactly once, matches related
//! entities in memory by local/foreign key, and attaches them by
//! cardinality. One round trip total; matching cost is bases times
//! extracted targets per association, bounded by the materialized result.

use crate::error::{MapperError, MapperResult};
use crate::mapper::hydration::hydrate_aliased;
use crate::mapper::preload::Preload;
use crate::schema::{Association, Cardinality, Schema};
use crate::types::TypeRegistry;
use crate::value::{value_key, values_equal, Entity, Related, Row};
use std::collections::HashSet;

/// One association together with the entities extracted for it.
struct AssociationEntitiesPair {
    association: Association,
    target: Schema,
    entities: Vec<Entity>,
}

/// Extract one entity per distinct primary-key value under the given
/// alias, preserving first-appearance order. Rows without the key (or
/// with a null key, as a join miss produces) are skipped; when duplicate
/// rows share a key the first-seen row's column values win.
fn extract_entities(
    rows: &[Row],
    schema: &Schema,
    alias: &str,
    types: &TypeRegistry,
) -> MapperResult<Vec<Entity>> {
    let primary = schema.primary_field_required()?;
    let key_column = format!("{}__{}", alias, primary.column_name());

    let mut seen = HashSet::new();
    let mut entities = Vec::new();
    for row in rows {
        let key = match row.get(&key_column) {
            Some(key) if !key.is_null() => key,
            _ => continue,
        };
        if seen.insert(value_key(key)) {
            entities.push(hydrate_aliased(schema, types, row, alias)?);
        }
    }
    Ok(entities)
}

/// The field a matching column maps to, or an `InvalidSchema` error
/// naming the gap.
fn key_field<'s>(schema: &'s Schema, column: &str) -> MapperResult<&'s crate::schema::Field> {
    schema.field_by_column(column).ok_or_else(|| {
        MapperError::InvalidSchema(format!(
            "no field of table '{}' maps column '{}'",
            schema.table(),
            column
        ))
    })
}

/// Resolve a preloaded rowset into base entities with populated
/// relations.
pub fn resolve(
    rows: &[Row],
    schema: &Schema,
    preloads: &[Preload],
    types: &TypeRegistry,
) -> MapperResult<Vec<Entity>> {
    let bases = extract_entities(rows, schema, schema.table(), types)?;

    let mut pairs = Vec::with_capacity(preloads.len());
    for preload in preloads {
        let association = preload.association().clone();
        let target = association.target_schema()?;
        let alias = preload.effective_alias(&target);
        let entities = extract_entities(rows, &target, &alias, types)?;
        pairs.push(AssociationEntitiesPair {
            association,
            target,
            entities,
        });
    }

    let mut resolved = Vec::with_capacity(bases.len());
    for base in bases {
        let mut entity = base;
        for pair in &pairs {
            let matches = matching_entities(&entity, schema, pair, types)?;
            let related = match pair.association.cardinality() {
                Cardinality::One => Related::One(matches.into_iter().next().map(Box::new)),
                Cardinality::Many => Related::Many(matches),
            };
            entity.set_relation(pair.association.name(), related);
        }
        resolved.push(entity);
    }
    Ok(resolved)
}

/// All extracted target entities whose foreign-key field matches the base
/// entity's local-key field, both sides coerced through the registry
/// before comparison. A null or unassigned local key matches nothing.
fn matching_entities(
    base: &Entity,
    schema: &Schema,
    pair: &AssociationEntitiesPair,
    types: &TypeRegistry,
) -> MapperResult<Vec<Entity>> {
    let local_field = key_field(schema, pair.association.local_key())?;
    let foreign_field = key_field(&pair.target, pair.association.foreign_key())?;

    let local_value = match base.get(local_field.field_name()) {
        Some(value) if !value.is_null() => types.load(local_field.type_name(), value.clone())?,
        _ => return Ok(Vec::new()),
    };

    let mut matches = Vec::new();
    for candidate in &pair.entities {
        let foreign_value = match candidate.get(foreign_field.field_name()) {
            Some(value) if !value.is_null() => {
                types.load(foreign_field.type_name(), value.clone())?
            }
            _ => continue,
        };
        if values_equal(&local_value, &foreign_value) {
            matches.push(candidate.clone());
        }
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AssociationSpec, FieldSpec, SchemaSpec};
    use serde_json::json;

    fn child_spec() -> SchemaSpec {
        SchemaSpec::new("children")
            .field(FieldSpec::new("id", "integer").primary())
            .field(FieldSpec::new("parentId", "integer"))
    }

    fn parent_schema() -> Schema {
        Schema::create(
            SchemaSpec::new("parents")
                .field(FieldSpec::new("id", "integer").primary())
                .field(FieldSpec::new("name", "string"))
                .association(AssociationSpec::new(
                    "children",
                    Cardinality::Many,
                    child_spec,
                    "id",
                    "parent_id",
                ))
                .association(AssociationSpec::new(
                    "firstChild",
                    Cardinality::One,
                    child_spec,
                    "id",
                    "parent_id",
                )),
        )
        .unwrap()
    }

    fn joined_row(parent_id: i64, name: &str, child: Option<(i64, i64)>) -> Row {
        let mut row: Row = [
            ("parents__id".to_string(), json!(parent_id)),
            ("parents__name".to_string(), json!(name)),
        ]
        .into_iter()
        .collect();
        if let Some((child_id, child_parent)) = child {
            row.insert("children__id".to_string(), json!(child_id));
            row.insert("children__parent_id".to_string(), json!(child_parent));
        }
        row
    }

    fn preloads(schema: &Schema, names: &[&str]) -> Vec<Preload> {
        names
            .iter()
            .map(|n| Preload::create(schema, n, None).unwrap())
            .collect()
    }

    #[test]
    fn many_association_fans_in_without_duplicates() {
        let schema = parent_schema();
        let rows = vec![
            joined_row(1, "first", Some((10, 1))),
            joined_row(1, "first", Some((11, 1))),
            joined_row(2, "second", Some((12, 2))),
        ];

        let resolved =
            resolve(&rows, &schema, &preloads(&schema, &["children"]), &TypeRegistry::builtin())
                .unwrap();

        assert_eq!(resolved.len(), 2);
        let children = resolved[0].relation("children").unwrap().as_many().unwrap();
        let ids: Vec<_> = children.iter().map(|c| c.get("id").unwrap().clone()).collect();
        assert_eq!(ids, vec![json!(10), json!(11)]);
        assert_eq!(
            resolved[1].relation("children").unwrap().as_many().unwrap().len(),
            1
        );
    }

    #[test]
    fn one_association_with_no_match_yields_none() {
        let schema = parent_schema();
        let rows = vec![joined_row(1, "alone", None)];

        let resolved =
            resolve(&rows, &schema, &preloads(&schema, &["firstChild"]), &TypeRegistry::builtin())
                .unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(
            resolved[0].relation("firstChild"),
            Some(&Related::One(None))
        );
    }

    #[test]
    fn one_association_takes_the_first_match() {
        let schema = parent_schema();
        let rows = vec![
            joined_row(1, "first", Some((10, 1))),
            joined_row(1, "first", Some((11, 1))),
        ];

        let resolved =
            resolve(&rows, &schema, &preloads(&schema, &["firstChild"]), &TypeRegistry::builtin())
                .unwrap();

        let first = resolved[0].relation("firstChild").unwrap().as_one().unwrap();
        assert_eq!(first.get("id"), Some(&json!(10)));
    }

    #[test]
    fn first_seen_row_wins_on_duplicate_keys() {
        let schema = parent_schema();
        let rows = vec![
            joined_row(1, "original", Some((10, 1))),
            joined_row(1, "mutated", Some((11, 1))),
        ];

        let resolved =
            resolve(&rows, &schema, &preloads(&schema, &["children"]), &TypeRegistry::builtin())
                .unwrap();

        assert_eq!(resolved[0].get("name"), Some(&json!("original")));
    }

    #[test]
    fn output_preserves_first_appearance_order() {
        let schema = parent_schema();
        let rows = vec![
            joined_row(3, "c", None),
            joined_row(1, "a", None),
            joined_row(3, "c", None),
            joined_row(2, "b", None),
        ];

        let resolved = resolve(&rows, &schema, &[], &TypeRegistry::builtin()).unwrap();
        let ids: Vec<_> = resolved.iter().map(|e| e.get("id").unwrap().clone()).collect();
        assert_eq!(ids, vec![json!(3), json!(1), json!(2)]);
    }

    #[test]
    fn mixed_key_representations_still_match() {
        // driver returns parent id as a string, child foreign key as a number
        let schema = parent_schema();
        let mut row = joined_row(0, "first", Some((10, 1)));
        row.insert("parents__id".to_string(), json!("1"));

        let resolved =
            resolve(&[row], &schema, &preloads(&schema, &["children"]), &TypeRegistry::builtin())
                .unwrap();

        assert_eq!(
            resolved[0].relation("children").unwrap().as_many().unwrap().len(),
            1
        );
    }

    #[test]
    fn resolution_without_primary_field_fails_loudly() {
        let schema = Schema::create(
            SchemaSpec::new("notes").field(FieldSpec::new("text", "string")),
        )
        .unwrap();

        assert!(matches!(
            resolve(&[], &schema, &[], &TypeRegistry::builtin()),
            Err(MapperError::MissingPrimaryKey(_))
        ));
    }
}
