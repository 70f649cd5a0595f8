//! Query delegate contract
//!
//! The mapper core never speaks SQL; it drives an engine through this
//! closed contract. Builder operations return a further delegate value,
//! terminal operations return a tagged [`QueryOutcome`], and the mapper
//! dispatches on that closed set of cases rather than on runtime type
//! inspection.

use crate::error::MapperResult;
use crate::value::Row;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Comparison operators the core needs from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    IsNull,
    IsNotNull,
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOp::Eq => write!(f, "="),
            FilterOp::Ne => write!(f, "!="),
            FilterOp::Gt => write!(f, ">"),
            FilterOp::Gte => write!(f, ">="),
            FilterOp::Lt => write!(f, "<"),
            FilterOp::Lte => write!(f, "<="),
            FilterOp::Like => write!(f, "LIKE"),
            FilterOp::IsNull => write!(f, "IS NULL"),
            FilterOp::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// One WHERE condition. The column may be plain (resolved against the
/// base table) or qualified as `table.column`.
#[derive(Debug, Clone)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq,
            value,
        }
    }

    pub fn new(column: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }
}

/// One LEFT JOIN: `LEFT JOIN <table> AS <alias> ON
/// <base>.<local_column> = <alias>.<foreign_column>`.
#[derive(Debug, Clone)]
pub struct JoinClause {
    pub table: String,
    pub alias: Option<String>,
    pub local_column: String,
    pub foreign_column: String,
}

impl JoinClause {
    pub fn new(
        table: impl Into<String>,
        local_column: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            alias: None,
            local_column: local_column.into(),
            foreign_column: foreign_column.into(),
        }
    }

    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The name the joined table's columns are visible under.
    pub fn effective_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

/// Select list. Entries are either plain column names or aliased
/// projections of the form `table.column AS table__column`. Empty means
/// the base table's own columns.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    pub columns: Vec<String>,
}

impl Projection {
    pub fn columns(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Tagged result of a terminal delegate operation.
pub enum QueryOutcome {
    /// Every row the query matched
    RowSet(Vec<Row>),
    /// At most one row
    SingleRow(Option<Row>),
    /// A single computed value, e.g. a count
    Scalar(Value),
}

impl fmt::Debug for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOutcome::RowSet(rows) => write!(f, "RowSet({} rows)", rows.len()),
            QueryOutcome::SingleRow(row) => write!(f, "SingleRow(present: {})", row.is_some()),
            QueryOutcome::Scalar(value) => f.debug_tuple("Scalar").field(value).finish(),
        }
    }
}

/// The engine-side contract the mapper core drives.
///
/// Builder operations are pure with respect to the receiver: each returns
/// a fresh delegate carrying the extended query state, leaving the
/// original untouched, so mapper values can share delegates freely.
#[async_trait]
pub trait QueryDelegate: Send + Sync {
    /// Delegate with one more WHERE condition.
    fn filter(&self, filter: Filter) -> Box<dyn QueryDelegate>;

    /// Delegate with one more LEFT JOIN.
    fn join(&self, join: JoinClause) -> Box<dyn QueryDelegate>;

    /// Delegate with the select list replaced.
    fn select(&self, projection: Projection) -> Box<dyn QueryDelegate>;

    /// Execute and return every matching row.
    async fn fetch(&self) -> MapperResult<QueryOutcome>;

    /// Execute and return at most one row.
    async fn fetch_one(&self) -> MapperResult<QueryOutcome>;

    /// Execute and return the matching row count as a scalar.
    async fn count(&self) -> MapperResult<QueryOutcome>;

    /// Insert one record into the delegate's table.
    async fn insert(&self, row: Row) -> MapperResult<()>;

    /// Update rows where `column = key`; returns the affected count.
    async fn update(&self, column: &str, key: &Value, changes: Row) -> MapperResult<u64>;

    /// Delete rows where `column = key`; returns the affected count.
    async fn delete(&self, column: &str, key: &Value) -> MapperResult<u64>;

    fn boxed_clone(&self) -> Box<dyn QueryDelegate>;
}

impl Clone for Box<dyn QueryDelegate> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}
