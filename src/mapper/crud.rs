//! Insert, update, delete
//!
//! Record-level mutations through the schema. Update and delete re-check
//! existence with a fresh fetch before mutating and run as separate round
//! trips with no atomic check-and-set; concurrent writers can race. Use a
//! transactional repo when that matters.

use crate::error::{MapperError, MapperResult};
use crate::mapper::{hydration, Mapper};
use crate::value::{Entity, Row};
use serde_json::Value;

impl Mapper {
    /// Insert the entity and return a fresh entity hydrated from the
    /// record actually sent.
    ///
    /// Per field: a value the entity carries is dumped as supplied, even
    /// when null, zero, or empty; only a field the entity does not carry
    /// at all falls back to the declared default (generators invoked per
    /// insert). Values generated by the storage engine itself are not
    /// reflected in the returned entity.
    pub async fn insert(&self, entity: &Entity) -> MapperResult<Entity> {
        let mut record = Row::new();
        for field in self.schema().fields() {
            let value = match entity.get(field.field_name()) {
                Some(value) => value.clone(),
                None => field.default().resolve().unwrap_or(Value::Null),
            };
            let dumped = self.types().dump(field.type_name(), value)?;
            record.insert(field.column_name().to_string(), dumped);
        }

        self.delegate().insert(record.clone()).await?;
        hydration::hydrate(self.schema(), self.types(), &record)
    }

    /// Update the entity's row by primary key and return the rehydrated
    /// authoritative row.
    ///
    /// Fails with `MissingPrimaryKey` when the schema declares no primary
    /// field, and with `NotFound` when no row matches the mapper's
    /// current filters plus the primary key.
    pub async fn update(&self, entity: &Entity) -> MapperResult<Entity> {
        let (column, key) = self.primary_key_of(entity)?;
        self.require_existing(&column, &key).await?;

        let mut changes = Row::new();
        for field in self.schema().fields() {
            if field.is_primary() {
                continue;
            }
            if let Some(value) = entity.get(field.field_name()) {
                let dumped = self.types().dump(field.type_name(), value.clone())?;
                changes.insert(field.column_name().to_string(), dumped);
            }
        }

        // an entity carrying only its primary key has nothing to write
        if !changes.is_empty() {
            self.delegate().update(&column, &key, changes).await?;
        }

        self.filter_eq(&column, key)
            .first()
            .await?
            .ok_or_else(|| MapperError::NotFound(self.schema().table().to_string()))
    }

    /// Delete the entity's row by primary key and return the entity
    /// unchanged. Fails with `NotFound` when the row is already gone.
    pub async fn delete(&self, entity: &Entity) -> MapperResult<Entity> {
        let (column, key) = self.primary_key_of(entity)?;
        self.require_existing(&column, &key).await?;

        self.delegate().delete(&column, &key).await?;
        Ok(entity.clone())
    }

    /// The primary column name and the entity's dumped key value.
    fn primary_key_of(&self, entity: &Entity) -> MapperResult<(String, Value)> {
        let primary = self.schema().primary_field_required()?;
        let value = entity
            .get(primary.field_name())
            .filter(|value| !value.is_null())
            .cloned()
            .ok_or_else(|| MapperError::NotFound(self.schema().table().to_string()))?;
        let dumped = self.types().dump(primary.type_name(), value)?;
        Ok((primary.column_name().to_string(), dumped))
    }

    async fn require_existing(&self, column: &str, key: &Value) -> MapperResult<()> {
        self.filter_eq(column, key.clone())
            .first()
            .await?
            .map(|_| ())
            .ok_or_else(|| MapperError::NotFound(self.schema().table().to_string()))
    }
}
