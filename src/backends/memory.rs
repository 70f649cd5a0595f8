//! Embedded in-memory engine
//!
//! Tables are plain row vectors behind one lock. The delegate implements
//! the full contract the mapper needs: LEFT JOIN fan-out, qualified
//! filters, and the `table.column AS table__column` projection
//! convention. Transactions snapshot the whole store at begin and restore
//! it on rollback.

use crate::backends::{Engine, Session};
use crate::error::{MapperError, MapperResult};
use crate::query::{Filter, FilterOp, JoinClause, Projection, QueryDelegate, QueryOutcome};
use crate::value::{values_equal, Row};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

#[derive(Default)]
struct Store {
    tables: HashMap<String, Vec<Row>>,
    snapshot: Option<HashMap<String, Vec<Row>>>,
}

/// An embedded engine holding its tables in process memory.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    store: Arc<RwLock<Store>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw rows of one table, cloned. Test support.
    pub fn table(&self, name: &str) -> Vec<Row> {
        self.store
            .read()
            .expect("store lock poisoned")
            .tables
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    fn delegate(&self, table: &str) -> Box<dyn QueryDelegate> {
        Box::new(MemoryDelegate {
            store: self.store.clone(),
            table: table.to_string(),
            filters: Vec::new(),
            joins: Vec::new(),
            projection: Projection::default(),
        })
    }

    async fn session(&self) -> MapperResult<Box<dyn Session>> {
        Ok(Box::new(MemorySession {
            store: self.store.clone(),
        }))
    }
}

/// The whole store is one connection, so a session shares the engine's
/// tables and serializes transaction state through the snapshot slot.
struct MemorySession {
    store: Arc<RwLock<Store>>,
}

#[async_trait]
impl Session for MemorySession {
    fn delegate(&self, table: &str) -> Box<dyn QueryDelegate> {
        Box::new(MemoryDelegate {
            store: self.store.clone(),
            table: table.to_string(),
            filters: Vec::new(),
            joins: Vec::new(),
            projection: Projection::default(),
        })
    }

    async fn begin(&self) -> MapperResult<()> {
        let mut store = self.store.write().expect("store lock poisoned");
        if store.snapshot.is_some() {
            return Err(MapperError::Transaction(
                "transaction already in progress".to_string(),
            ));
        }
        debug!("begin transaction (memory engine)");
        store.snapshot = Some(store.tables.clone());
        Ok(())
    }

    async fn commit(&self) -> MapperResult<()> {
        let mut store = self.store.write().expect("store lock poisoned");
        store
            .snapshot
            .take()
            .ok_or_else(|| MapperError::Transaction("no transaction in progress".to_string()))?;
        debug!("commit transaction (memory engine)");
        Ok(())
    }

    async fn rollback(&self) -> MapperResult<()> {
        let mut store = self.store.write().expect("store lock poisoned");
        let snapshot = store
            .snapshot
            .take()
            .ok_or_else(|| MapperError::Transaction("no transaction in progress".to_string()))?;
        debug!("rollback transaction (memory engine)");
        store.tables = snapshot;
        Ok(())
    }
}

/// Immutable query state over the shared store.
#[derive(Clone)]
struct MemoryDelegate {
    store: Arc<RwLock<Store>>,
    table: String,
    filters: Vec<Filter>,
    joins: Vec<JoinClause>,
    projection: Projection,
}

impl MemoryDelegate {
    /// Materialize the filtered, joined result as wide rows keyed by
    /// `table.column`.
    fn wide_rows(&self) -> Vec<Row> {
        let store = self.store.read().expect("store lock poisoned");

        let mut wide: Vec<Row> = store
            .tables
            .get(&self.table)
            .map(|rows| rows.iter().map(|row| qualify(&self.table, row)).collect())
            .unwrap_or_default();

        for join in &self.joins {
            let alias = join.effective_alias();
            let joined_rows = store.tables.get(&join.table).cloned().unwrap_or_default();
            let local = format!("{}.{}", self.table, join.local_column);

            let mut fanned_out = Vec::new();
            for row in wide {
                let local_value = row.get(&local).cloned().unwrap_or(Value::Null);
                let matches: Vec<&Row> = joined_rows
                    .iter()
                    .filter(|candidate| {
                        candidate
                            .get(&join.foreign_column)
                            .map(|v| values_equal(v, &local_value))
                            .unwrap_or(false)
                    })
                    .collect();

                if matches.is_empty() {
                    // LEFT JOIN: keep the row, joined columns stay absent
                    fanned_out.push(row);
                } else {
                    for matched in matches {
                        let mut combined = row.clone();
                        combined.extend(qualify(alias, matched));
                        fanned_out.push(combined);
                    }
                }
            }
            wide = fanned_out;
        }

        wide.retain(|row| self.filters.iter().all(|f| self.filter_matches(row, f)));
        wide
    }

    fn filter_matches(&self, row: &Row, filter: &Filter) -> bool {
        let key = if filter.column.contains('.') {
            filter.column.clone()
        } else {
            format!("{}.{}", self.table, filter.column)
        };
        let actual = row.get(&key).cloned().unwrap_or(Value::Null);

        match filter.op {
            FilterOp::Eq => {
                if filter.value.is_null() {
                    actual.is_null()
                } else {
                    values_equal(&actual, &filter.value)
                }
            }
            FilterOp::Ne => !values_equal(&actual, &filter.value) && !actual.is_null(),
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
                compare(&actual, &filter.value)
                    .map(|ordering| match filter.op {
                        FilterOp::Gt => ordering.is_gt(),
                        FilterOp::Gte => ordering.is_ge(),
                        FilterOp::Lt => ordering.is_lt(),
                        FilterOp::Lte => ordering.is_le(),
                        _ => unreachable!(),
                    })
                    .unwrap_or(false)
            }
            FilterOp::Like => match (&actual, &filter.value) {
                (Value::String(text), Value::String(pattern)) => like_matches(text, pattern),
                _ => false,
            },
            FilterOp::IsNull => actual.is_null(),
            FilterOp::IsNotNull => !actual.is_null(),
        }
    }

    fn project(&self, wide: Vec<Row>) -> Vec<Row> {
        if self.projection.is_empty() {
            let prefix = format!("{}.", self.table);
            return wide
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .filter_map(|(key, value)| {
                            key.strip_prefix(&prefix).map(|col| (col.to_string(), value))
                        })
                        .collect()
                })
                .collect();
        }

        wide.into_iter()
            .map(|row| {
                let mut projected = Row::new();
                for entry in &self.projection.columns {
                    let (source, output) = match entry.split_once(" AS ") {
                        Some((source, output)) => (source.trim(), output.trim()),
                        None => (entry.trim(), entry.trim()),
                    };
                    let key = if source.contains('.') {
                        source.to_string()
                    } else {
                        format!("{}.{}", self.table, source)
                    };
                    if let Some(value) = row.get(&key) {
                        projected.insert(output.to_string(), value.clone());
                    }
                }
                projected
            })
            .collect()
    }
}

fn qualify(alias: &str, row: &Row) -> Row {
    row.iter()
        .map(|(column, value)| (format!("{}.{}", alias, column), value.clone()))
        .collect()
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// SQL LIKE with `%` wildcards only, case sensitive.
fn like_matches(text: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    let anchored_start = !pattern.starts_with('%');
    let anchored_end = !pattern.ends_with('%');

    let mut position = 0;
    for (index, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match text[position..].find(part) {
            Some(found) => {
                if index == 0 && anchored_start && found != 0 {
                    return false;
                }
                position += found + part.len();
            }
            None => return false,
        }
    }
    if anchored_end {
        if let Some(last) = parts.last().filter(|p| !p.is_empty()) {
            return text.ends_with(last) && position >= text.len();
        }
    }
    true
}

#[async_trait]
impl QueryDelegate for MemoryDelegate {
    fn filter(&self, filter: Filter) -> Box<dyn QueryDelegate> {
        let mut next = self.clone();
        next.filters.push(filter);
        Box::new(next)
    }

    fn join(&self, join: JoinClause) -> Box<dyn QueryDelegate> {
        let mut next = self.clone();
        next.joins.push(join);
        Box::new(next)
    }

    fn select(&self, projection: Projection) -> Box<dyn QueryDelegate> {
        let mut next = self.clone();
        next.projection = projection;
        Box::new(next)
    }

    async fn fetch(&self) -> MapperResult<QueryOutcome> {
        let rows = self.project(self.wide_rows());
        debug!(table = %self.table, rows = rows.len(), "memory select");
        Ok(QueryOutcome::RowSet(rows))
    }

    async fn fetch_one(&self) -> MapperResult<QueryOutcome> {
        let mut rows = self.project(self.wide_rows());
        let first = if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        };
        Ok(QueryOutcome::SingleRow(first))
    }

    async fn count(&self) -> MapperResult<QueryOutcome> {
        let count = self.wide_rows().len();
        Ok(QueryOutcome::Scalar(Value::Number((count as i64).into())))
    }

    async fn insert(&self, row: Row) -> MapperResult<()> {
        let mut store = self.store.write().expect("store lock poisoned");
        debug!(table = %self.table, "memory insert");
        store.tables.entry(self.table.clone()).or_default().push(row);
        Ok(())
    }

    async fn update(&self, column: &str, key: &Value, changes: Row) -> MapperResult<u64> {
        let mut store = self.store.write().expect("store lock poisoned");
        let rows = store.tables.entry(self.table.clone()).or_default();
        let mut affected = 0;
        for row in rows.iter_mut() {
            let matched = row.get(column).map(|v| values_equal(v, key)).unwrap_or(false);
            if matched {
                row.extend(changes.clone());
                affected += 1;
            }
        }
        debug!(table = %self.table, affected, "memory update");
        Ok(affected)
    }

    async fn delete(&self, column: &str, key: &Value) -> MapperResult<u64> {
        let mut store = self.store.write().expect("store lock poisoned");
        let rows = store.tables.entry(self.table.clone()).or_default();
        let before = rows.len();
        rows.retain(|row| {
            !row.get(column).map(|v| values_equal(v, key)).unwrap_or(false)
        });
        let affected = (before - rows.len()) as u64;
        debug!(table = %self.table, affected, "memory delete");
        Ok(affected)
    }

    fn boxed_clone(&self) -> Box<dyn QueryDelegate> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    async fn seeded_engine() -> MemoryEngine {
        let engine = MemoryEngine::new();
        let parents = engine.delegate("parents");
        parents
            .insert(row(&[("id", json!(1)), ("name", json!("first"))]))
            .await
            .unwrap();
        parents
            .insert(row(&[("id", json!(2)), ("name", json!("second"))]))
            .await
            .unwrap();

        let children = engine.delegate("children");
        children
            .insert(row(&[("id", json!(10)), ("parent_id", json!(1))]))
            .await
            .unwrap();
        children
            .insert(row(&[("id", json!(11)), ("parent_id", json!(1))]))
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn filter_and_fetch_one() {
        let engine = seeded_engine().await;
        let delegate = engine
            .delegate("parents")
            .filter(Filter::eq("id", json!(2)));

        match delegate.fetch_one().await.unwrap() {
            QueryOutcome::SingleRow(Some(found)) => assert_eq!(found["name"], json!("second")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn left_join_fans_out_and_keeps_unmatched_rows() {
        let engine = seeded_engine().await;
        let delegate = engine
            .delegate("parents")
            .join(JoinClause::new("children", "id", "parent_id"))
            .select(Projection::columns(vec![
                "parents.id AS parents__id".to_string(),
                "children.id AS children__id".to_string(),
            ]));

        let rows = match delegate.fetch().await.unwrap() {
            QueryOutcome::RowSet(rows) => rows,
            other => panic!("unexpected outcome: {:?}", other),
        };

        // parent 1 duplicated per child, parent 2 kept with absent child columns
        assert_eq!(rows.len(), 3);
        let unmatched: Vec<_> = rows.iter().filter(|r| !r.contains_key("children__id")).collect();
        assert_eq!(unmatched.len(), 1);
        assert_eq!(unmatched[0]["parents__id"], json!(2));
    }

    #[tokio::test]
    async fn update_and_delete_by_predicate() {
        let engine = seeded_engine().await;
        let delegate = engine.delegate("parents");

        let affected = delegate
            .update("id", &json!(1), row(&[("name", json!("renamed"))]))
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(engine.table("parents")[0]["name"], json!("renamed"));

        let affected = delegate.delete("id", &json!(2)).await.unwrap();
        assert_eq!(affected, 1);
        assert_eq!(engine.table("parents").len(), 1);
    }

    #[tokio::test]
    async fn snapshot_rollback_restores_tables() {
        let engine = seeded_engine().await;
        let session = engine.session().await.unwrap();

        session.begin().await.unwrap();
        session
            .delegate("parents")
            .insert(row(&[("id", json!(3))]))
            .await
            .unwrap();
        assert_eq!(engine.table("parents").len(), 3);

        session.rollback().await.unwrap();
        assert_eq!(engine.table("parents").len(), 2);
    }

    #[test]
    fn like_wildcards() {
        assert!(like_matches("hello world", "hello%"));
        assert!(like_matches("hello world", "%world"));
        assert!(like_matches("hello world", "%lo wo%"));
        assert!(!like_matches("hello world", "world%"));
    }
}
