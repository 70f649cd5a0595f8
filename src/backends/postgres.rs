//! PostgreSQL engine glue
//!
//! Thin sqlx-backed implementation of the delegate contract. Non-session
//! delegates execute on the shared pool; a session pins one pooled
//! connection and drives BEGIN/COMMIT/ROLLBACK on it directly. SQL
//! assembly is kept in plain functions with no executor attached.

use crate::backends::{Engine, Session};
use crate::error::{MapperError, MapperResult};
use crate::query::{Filter, FilterOp, JoinClause, Projection, QueryDelegate, QueryOutcome};
use crate::value::Row;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::pool::PoolConnection;
use sqlx::{Column, Pool, Postgres, Row as SqlxRow};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A connected PostgreSQL engine over a sqlx pool.
#[derive(Clone)]
pub struct PostgresEngine {
    pool: Pool<Postgres>,
}

impl PostgresEngine {
    /// Connect a pool to the given database URL.
    pub async fn connect(url: &str, max_connections: u32) -> MapperResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl Engine for PostgresEngine {
    fn delegate(&self, table: &str) -> Box<dyn QueryDelegate> {
        Box::new(PostgresDelegate {
            executor: PgExecutor::Pool(self.pool.clone()),
            table: table.to_string(),
            filters: Vec::new(),
            joins: Vec::new(),
            projection: Projection::default(),
        })
    }

    async fn session(&self) -> MapperResult<Box<dyn Session>> {
        let connection = self.pool.acquire().await?;
        Ok(Box::new(PostgresSession {
            connection: Arc::new(Mutex::new(Some(connection))),
            active: Arc::new(AtomicBool::new(false)),
        }))
    }
}

/// One pinned connection with transaction control. The slot holds `None`
/// once the connection has been withdrawn, after which every operation on
/// the session's delegates fails with a `Transaction` error.
struct PostgresSession {
    connection: Arc<Mutex<Option<PoolConnection<Postgres>>>>,
    active: Arc<AtomicBool>,
}

impl PostgresSession {
    async fn execute_raw(&self, sql: &str) -> MapperResult<()> {
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or_else(session_closed)?;
        sqlx::query(sql).execute(&mut **connection).await?;
        Ok(())
    }
}

fn session_closed() -> MapperError {
    MapperError::Transaction("session connection is closed".to_string())
}

#[async_trait]
impl Session for PostgresSession {
    fn delegate(&self, table: &str) -> Box<dyn QueryDelegate> {
        Box::new(PostgresDelegate {
            executor: PgExecutor::Session(self.connection.clone()),
            table: table.to_string(),
            filters: Vec::new(),
            joins: Vec::new(),
            projection: Projection::default(),
        })
    }

    async fn begin(&self) -> MapperResult<()> {
        debug!("begin transaction");
        self.execute_raw("BEGIN").await?;
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> MapperResult<()> {
        debug!("commit transaction");
        self.execute_raw("COMMIT").await?;
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> MapperResult<()> {
        debug!("rollback transaction");
        self.execute_raw("ROLLBACK").await?;
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        // The connection must not reach the pool mid-transaction, or
        // unrelated queries would run inside the abandoned transaction.
        // Detaching closes it instead; the server rolls back on disconnect.
        warn!("session dropped with an open transaction; closing its connection");
        if let Ok(mut guard) = self.connection.try_lock() {
            if let Some(connection) = guard.take() {
                drop(connection.detach());
            }
        }
    }
}

#[derive(Clone)]
enum PgExecutor {
    Pool(Pool<Postgres>),
    Session(Arc<Mutex<Option<PoolConnection<Postgres>>>>),
}

#[derive(Clone)]
struct PostgresDelegate {
    executor: PgExecutor,
    table: String,
    filters: Vec<Filter>,
    joins: Vec<JoinClause>,
    projection: Projection,
}

fn select_sql(
    table: &str,
    joins: &[JoinClause],
    projection: &Projection,
    filters: &[Filter],
) -> (String, Vec<Value>) {
    let select_list = if projection.is_empty() {
        format!("{}.*", table)
    } else {
        projection.columns.join(", ")
    };

    let mut sql = format!("SELECT {} FROM {}", select_list, table);
    for join in joins {
        sql.push_str(&format!(
            " LEFT JOIN {} AS {} ON {}.{} = {}.{}",
            join.table,
            join.effective_alias(),
            table,
            join.local_column,
            join.effective_alias(),
            join.foreign_column
        ));
    }

    let (where_clause, binds) = where_sql(table, filters);
    sql.push_str(&where_clause);
    (sql, binds)
}

fn where_sql(table: &str, filters: &[Filter]) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();

    for filter in filters {
        let column = if filter.column.contains('.') {
            filter.column.clone()
        } else {
            format!("{}.{}", table, filter.column)
        };
        match filter.op {
            FilterOp::IsNull => clauses.push(format!("{} IS NULL", column)),
            FilterOp::IsNotNull => clauses.push(format!("{} IS NOT NULL", column)),
            FilterOp::Eq if filter.value.is_null() => {
                clauses.push(format!("{} IS NULL", column))
            }
            FilterOp::Ne if filter.value.is_null() => {
                clauses.push(format!("{} IS NOT NULL", column))
            }
            op => {
                binds.push(filter.value.clone());
                clauses.push(format!("{} {} ${}", column, op, binds.len()));
            }
        }
    }

    if clauses.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), binds)
    }
}

/// INSERT with columns in sorted order; null values are inlined as
/// literal NULL so no bind needs a concrete type.
fn insert_sql(table: &str, row: &Row) -> (String, Vec<Value>) {
    let mut columns: Vec<&String> = row.keys().collect();
    columns.sort_unstable();

    let mut placeholders = Vec::new();
    let mut binds = Vec::new();
    for column in &columns {
        let value = &row[*column];
        if value.is_null() {
            placeholders.push("NULL".to_string());
        } else {
            binds.push(value.clone());
            placeholders.push(format!("${}", binds.len()));
        }
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        placeholders.join(", ")
    );
    (sql, binds)
}

/// UPDATE by key predicate; the key is always the last bind. The caller
/// must not pass an empty change set.
fn update_sql(table: &str, column: &str, key: &Value, changes: &Row) -> (String, Vec<Value>) {
    let mut names: Vec<&String> = changes.keys().collect();
    names.sort_unstable();

    let mut assignments = Vec::new();
    let mut binds = Vec::new();
    for name in &names {
        let value = &changes[*name];
        if value.is_null() {
            assignments.push(format!("{} = NULL", name));
        } else {
            binds.push(value.clone());
            assignments.push(format!("{} = ${}", name, binds.len()));
        }
    }

    binds.push(key.clone());
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ${}",
        table,
        assignments.join(", "),
        column,
        binds.len()
    );
    (sql, binds)
}

impl PostgresDelegate {
    fn select_sql(&self) -> (String, Vec<Value>) {
        select_sql(&self.table, &self.joins, &self.projection, &self.filters)
    }

    async fn run_fetch_all(&self, sql: &str, binds: &[Value]) -> MapperResult<Vec<PgRow>> {
        debug!(table = %self.table, sql, "executing select");
        match &self.executor {
            PgExecutor::Pool(pool) => Ok(bind_all(sqlx::query(sql), binds).fetch_all(pool).await?),
            PgExecutor::Session(connection) => {
                let mut guard = connection.lock().await;
                let connection = guard.as_mut().ok_or_else(session_closed)?;
                Ok(bind_all(sqlx::query(sql), binds)
                    .fetch_all(&mut **connection)
                    .await?)
            }
        }
    }

    async fn run_execute(&self, sql: &str, binds: &[Value]) -> MapperResult<u64> {
        debug!(table = %self.table, sql, "executing statement");
        let result = match &self.executor {
            PgExecutor::Pool(pool) => bind_all(sqlx::query(sql), binds).execute(pool).await?,
            PgExecutor::Session(connection) => {
                let mut guard = connection.lock().await;
                let connection = guard.as_mut().ok_or_else(session_closed)?;
                bind_all(sqlx::query(sql), binds)
                    .execute(&mut **connection)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

fn bind_all<'q>(mut query: PgQuery<'q>, binds: &[Value]) -> PgQuery<'q> {
    for value in binds {
        query = bind_value(query, value);
    }
    query
}

fn bind_value<'q>(query: PgQuery<'q>, value: &Value) -> PgQuery<'q> {
    match value {
        Value::String(s) => query.bind(s.clone()),
        Value::Number(n) if n.is_i64() => query.bind(n.as_i64().unwrap_or_default()),
        Value::Number(n) => query.bind(n.as_f64().unwrap_or_default()),
        Value::Bool(b) => query.bind(*b),
        Value::Null => query.bind(Option::<String>::None),
        other => query.bind(other.to_string()),
    }
}

/// Convert a driver row into the flat key-value shape, probing column
/// types the way the query layer reads raw rows elsewhere.
fn pg_row_to_row(row: &PgRow) -> Row {
    let mut flat = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        flat.insert(column.name().to_string(), pg_column_to_value(row, index));
    }
    flat
}

fn pg_column_to_value(row: &PgRow, index: usize) -> Value {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map(|v| Value::Number(v.into())).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<i32>, _>(index) {
        return value
            .map(|v| Value::Number(i64::from(v).into()))
            .unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<i16>, _>(index) {
        return value
            .map(|v| Value::Number(i64::from(v).into()))
            .unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
        return value.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<uuid::Uuid>, _>(index) {
        return value
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return value
            .map(|v| Value::String(v.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
        return value
            .map(|v| Value::String(v.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<Value>, _>(index) {
        return value.unwrap_or(Value::Null);
    }
    Value::Null
}

#[async_trait]
impl QueryDelegate for PostgresDelegate {
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
        let (sql, binds) = self.select_sql();
        let rows = self.run_fetch_all(&sql, &binds).await?;
        Ok(QueryOutcome::RowSet(rows.iter().map(pg_row_to_row).collect()))
    }

    async fn fetch_one(&self) -> MapperResult<QueryOutcome> {
        let (mut sql, binds) = self.select_sql();
        sql.push_str(" LIMIT 1");
        let rows = self.run_fetch_all(&sql, &binds).await?;
        Ok(QueryOutcome::SingleRow(rows.first().map(pg_row_to_row)))
    }

    async fn count(&self) -> MapperResult<QueryOutcome> {
        let (where_clause, binds) = where_sql(&self.table, &self.filters);
        let sql = format!("SELECT COUNT(*) FROM {}{}", self.table, where_clause);
        let rows = self.run_fetch_all(&sql, &binds).await?;
        let count: i64 = rows
            .first()
            .ok_or_else(|| MapperError::Query("COUNT returned no row".to_string()))?
            .try_get(0)?;
        Ok(QueryOutcome::Scalar(Value::Number(count.into())))
    }

    async fn insert(&self, row: Row) -> MapperResult<()> {
        let (sql, binds) = insert_sql(&self.table, &row);
        self.run_execute(&sql, &binds).await?;
        Ok(())
    }

    async fn update(&self, column: &str, key: &Value, changes: Row) -> MapperResult<u64> {
        let (sql, binds) = update_sql(&self.table, column, key, &changes);
        self.run_execute(&sql, &binds).await
    }

    async fn delete(&self, column: &str, key: &Value) -> MapperResult<u64> {
        let sql = format!("DELETE FROM {} WHERE {} = $1", self.table, column);
        self.run_execute(&sql, &[key.clone()]).await
    }

    fn boxed_clone(&self) -> Box<dyn QueryDelegate> {
        Box::new(self.clone())
    }
}
