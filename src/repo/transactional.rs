//! Transactional repositories
//!
//! Like a repo, but every mapper shares one exclusive connection so the
//! whole unit of work can commit or roll back together. Begin, commit
//! and rollback delegate straight to the session; nothing here is
//! synchronized, so a transactional repo belongs to exactly one logical
//! task at a time.

use crate::backends::Session;
use crate::error::MapperResult;
use crate::mapper::Mapper;
use crate::schema::{Schema, SchemaSpec};
use crate::types::TypeRegistry;
use std::sync::Arc;

pub struct TransactionalRepo {
    session: Box<dyn Session>,
    types: Arc<TypeRegistry>,
}

impl TransactionalRepo {
    pub(crate) fn new(session: Box<dyn Session>, types: Arc<TypeRegistry>) -> Self {
        Self { session, types }
    }

    /// Validate a schema spec and build a mapper bound to this session's
    /// connection.
    pub fn mapper(&self, spec: SchemaSpec) -> MapperResult<Mapper> {
        Ok(self.mapper_for(Schema::create(spec)?))
    }

    /// Mapper for an already validated schema, bound to this session.
    pub fn mapper_for(&self, schema: Schema) -> Mapper {
        let delegate = self.session.delegate(schema.table());
        Mapper::create(Arc::new(schema), self.types.clone(), delegate)
    }

    pub async fn begin(&self) -> MapperResult<()> {
        self.session.begin().await
    }

    pub async fn commit(&self) -> MapperResult<()> {
        self.session.commit().await
    }

    pub async fn rollback(&self) -> MapperResult<()> {
        self.session.rollback().await
    }
}
