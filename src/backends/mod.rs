//! Query engine backends
//!
//! An engine hands out query delegates bound to one table, each fetch
//! using its own connection, plus exclusive sessions for transactional
//! work. The postgres backend is the production glue; the memory backend
//! is an embedded engine implementing the same contract, used heavily by
//! this crate's own tests.

pub mod memory;
pub mod postgres;

pub use memory::MemoryEngine;
pub use postgres::PostgresEngine;

use crate::error::MapperResult;
use crate::query::QueryDelegate;
use async_trait::async_trait;

/// A connected query engine.
#[async_trait]
pub trait Engine: Send + Sync {
    /// A fresh delegate for one table. Delegates from the same engine may
    /// run concurrently; each terminal operation uses its own connection.
    fn delegate(&self, table: &str) -> Box<dyn QueryDelegate>;

    /// An exclusive session for transactional work.
    async fn session(&self) -> MapperResult<Box<dyn Session>>;
}

/// One exclusive connection with transaction control.
///
/// A session must be driven by a single logical task; concurrent use is
/// not synchronized.
#[async_trait]
pub trait Session: Send + Sync {
    /// A delegate bound to this session's connection.
    fn delegate(&self, table: &str) -> Box<dyn QueryDelegate>;

    async fn begin(&self) -> MapperResult<()>;

    async fn commit(&self) -> MapperResult<()>;

    async fn rollback(&self) -> MapperResult<()>;
}
