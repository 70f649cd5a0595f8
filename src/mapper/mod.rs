//! Entity mapper
//!
//! The engine binding one entity kind's schema to a query delegate. A
//! mapper is an immutable value: every builder-style call returns a new
//! mapper sharing the same schema and type registry with changed query
//! state or preload list, so holding "the same" mapper across tasks never
//! shares accidental query state.

pub mod crud;
pub mod hydration;
pub mod preload;
pub mod resolution;

pub use preload::{Preload, PreloadSpec};

use crate::error::{MapperError, MapperResult};
use crate::query::{Filter, FilterOp, JoinClause, Projection, QueryDelegate, QueryOutcome};
use crate::schema::Schema;
use crate::types::TypeRegistry;
use crate::value::Entity;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Mapper for one entity kind over one query delegate.
pub struct Mapper {
    schema: Arc<Schema>,
    types: Arc<TypeRegistry>,
    delegate: Box<dyn QueryDelegate>,
    preloads: Vec<Preload>,
}

impl Clone for Mapper {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            types: self.types.clone(),
            delegate: self.delegate.boxed_clone(),
            preloads: self.preloads.clone(),
        }
    }
}

impl Mapper {
    pub fn create(
        schema: Arc<Schema>,
        types: Arc<TypeRegistry>,
        delegate: Box<dyn QueryDelegate>,
    ) -> Self {
        Self {
            schema,
            types,
            delegate,
            preloads: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub(crate) fn delegate(&self) -> &dyn QueryDelegate {
        self.delegate.as_ref()
    }

    fn with_delegate(&self, delegate: Box<dyn QueryDelegate>) -> Self {
        Self {
            schema: self.schema.clone(),
            types: self.types.clone(),
            delegate,
            preloads: self.preloads.clone(),
        }
    }

    fn with_preloads(&self, preloads: Vec<Preload>) -> Self {
        Self {
            schema: self.schema.clone(),
            types: self.types.clone(),
            delegate: self.delegate.boxed_clone(),
            preloads,
        }
    }

    /// Mapper with one more WHERE condition on the underlying query.
    pub fn filter(&self, column: &str, op: FilterOp, value: Value) -> Self {
        self.with_delegate(self.delegate.filter(Filter::new(column, op, value)))
    }

    /// Shorthand for an equality filter.
    pub fn filter_eq(&self, column: &str, value: Value) -> Self {
        self.filter(column, FilterOp::Eq, value)
    }

    /// Mapper with one more LEFT JOIN on the underlying query.
    pub fn join(&self, join: JoinClause) -> Self {
        self.with_delegate(self.delegate.join(join))
    }

    /// Mapper with the given associations marked for eager resolution.
    /// Accepts one name, a list of names, or name-to-alias pairs;
    /// repeated calls accumulate. Fails with `AssociationNotFound` for a
    /// name the schema does not declare.
    pub fn preload(&self, spec: impl Into<PreloadSpec>) -> MapperResult<Self> {
        let mut preloads = self.preloads.clone();
        for (name, alias) in spec.into().entries() {
            preloads.push(Preload::create(&self.schema, &name, alias)?);
        }
        Ok(self.with_preloads(preloads))
    }

    /// Every matching entity. With pending preloads this executes a
    /// single rewritten join query and resolves associations from its
    /// rowset; without, each row hydrates independently.
    pub async fn get(&self) -> MapperResult<Vec<Entity>> {
        if self.preloads.is_empty() {
            match self.delegate.fetch().await? {
                QueryOutcome::RowSet(rows) => rows
                    .iter()
                    .map(|row| hydration::hydrate(&self.schema, &self.types, row))
                    .collect(),
                QueryOutcome::SingleRow(Some(row)) => {
                    Ok(vec![hydration::hydrate(&self.schema, &self.types, &row)?])
                }
                QueryOutcome::SingleRow(None) => Ok(Vec::new()),
                QueryOutcome::Scalar(value) => Err(MapperError::Query(format!(
                    "expected rows, delegate returned scalar {}",
                    value
                ))),
            }
        } else {
            self.fetch_preloaded().await
        }
    }

    /// The first matching entity, or none.
    pub async fn first(&self) -> MapperResult<Option<Entity>> {
        if self.preloads.is_empty() {
            match self.delegate.fetch_one().await? {
                QueryOutcome::SingleRow(Some(row)) => {
                    Ok(Some(hydration::hydrate(&self.schema, &self.types, &row)?))
                }
                QueryOutcome::SingleRow(None) => Ok(None),
                QueryOutcome::RowSet(rows) => rows
                    .first()
                    .map(|row| hydration::hydrate(&self.schema, &self.types, row))
                    .transpose(),
                QueryOutcome::Scalar(value) => Err(MapperError::Query(format!(
                    "expected a row, delegate returned scalar {}",
                    value
                ))),
            }
        } else {
            // association resolution needs the whole rowset
            Ok(self.fetch_preloaded().await?.into_iter().next())
        }
    }

    /// Matching row count, before any join fan-out from preloads.
    pub async fn count(&self) -> MapperResult<i64> {
        match self.delegate.count().await? {
            QueryOutcome::Scalar(Value::Number(n)) => Ok(n.as_i64().unwrap_or_default()),
            other => Err(MapperError::Query(format!(
                "expected a scalar count, delegate returned {:?}",
                other
            ))),
        }
    }

    /// Rewrite the select list to the full aliased projection of the base
    /// schema and every preload target, join each target under a distinct
    /// alias, execute once, and resolve the rowset.
    async fn fetch_preloaded(&self) -> MapperResult<Vec<Entity>> {
        let mut columns = self.schema.aliased_columns(None);
        let mut delegate = self.delegate.boxed_clone();

        // two preloads of the same target table must not share a join
        // alias; the second one gets a numbered variant
        let mut used = HashSet::from([self.schema.table().to_string()]);
        let mut preloads = Vec::with_capacity(self.preloads.len());
        for preload in &self.preloads {
            let association = preload.association();
            let target = association.target_schema()?;
            let alias = unique_alias(&mut used, preload.effective_alias(&target));
            columns.extend(target.aliased_columns(Some(&alias)));

            delegate = delegate.join(
                JoinClause::new(
                    target.table(),
                    association.local_key(),
                    association.foreign_key(),
                )
                .aliased(alias.clone()),
            );
            preloads.push(preload.with_table_alias(alias));
        }

        let delegate = delegate.select(Projection::columns(columns));
        match delegate.fetch().await? {
            QueryOutcome::RowSet(rows) => {
                resolution::resolve(&rows, &self.schema, &preloads, &self.types)
            }
            other => Err(MapperError::Query(format!(
                "expected rows for preload resolution, delegate returned {:?}",
                other
            ))),
        }
    }
}

/// Claim the candidate alias, or the first numbered variant not yet in
/// use, and record it as taken.
fn unique_alias(used: &mut HashSet<String>, candidate: String) -> String {
    if used.insert(candidate.clone()) {
        return candidate;
    }
    let mut n = 2;
    loop {
        let numbered = format!("{}_{}", candidate, n);
        if used.insert(numbered.clone()) {
            return numbered;
        }
        n += 1;
    }
}
