//! Dynamic row and entity values
//!
//! Rows are the flat key-value records the query delegate returns; entities
//! are schema-shaped field maps plus the relations the resolver attaches.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::HashMap;

/// One flat key-value row from the query engine.
pub type Row = HashMap<String, Value>;

/// A resolved relation attached to an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// Cardinality one: at most a single related entity
    One(Option<Box<Entity>>),
    /// Cardinality many: zero or more related entities
    Many(Vec<Entity>),
}

impl Related {
    /// The single related entity, if this is a populated `One`.
    pub fn as_one(&self) -> Option<&Entity> {
        match self {
            Related::One(entity) => entity.as_deref(),
            Related::Many(_) => None,
        }
    }

    /// The related entity list, if this is a `Many`.
    pub fn as_many(&self) -> Option<&[Entity]> {
        match self {
            Related::Many(entities) => Some(entities),
            Related::One(_) => None,
        }
    }
}

/// A hydrated domain entity.
///
/// Field values are domain values produced by the type registry. A field
/// that was never assigned is *absent*, which is distinct from a field
/// holding an explicit null; insert-time default substitution keys off
/// absence only.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entity {
    values: HashMap<String, Value>,
    relations: HashMap<String, Related>,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an entity from a plain field map.
    pub fn from_values(values: HashMap<String, Value>) -> Self {
        Self {
            values,
            relations: HashMap::new(),
        }
    }

    /// Field value by field name, if assigned.
    pub fn get(&self, field_name: &str) -> Option<&Value> {
        self.values.get(field_name)
    }

    /// Whether the field was assigned at all (an explicit null counts).
    pub fn contains(&self, field_name: &str) -> bool {
        self.values.contains_key(field_name)
    }

    pub fn set(&mut self, field_name: impl Into<String>, value: Value) {
        self.values.insert(field_name.into(), value);
    }

    /// Chainable form of [`set`](Self::set), for building fixtures.
    pub fn with(mut self, field_name: impl Into<String>, value: Value) -> Self {
        self.set(field_name, value);
        self
    }

    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    /// Resolved relation by association name.
    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> &HashMap<String, Related> {
        &self.relations
    }

    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) {
        self.relations.insert(name.into(), related);
    }

    /// Copy of this entity with the given field values merged over its own.
    pub fn merged(&self, data: &HashMap<String, Value>) -> Self {
        let mut merged = self.clone();
        for (key, value) in data {
            merged.values.insert(key.clone(), value.clone());
        }
        merged
    }
}

/// Loose value equality for key matching: numbers compare numerically
/// across integer/float representations, everything else compares
/// strictly. Null never equals anything, including Null.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (a, b) => a == b,
    }
}

/// Canonical grouping key for a value, usable as a hash-map key.
pub fn value_key(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            // normalize 1 and 1.0 to the same key
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// Relations serialize inline under their association names, after the
// fields, so logged entities read like the joined shape they came from.
impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + self.relations.len()))?;
        for (key, value) in &self.values {
            map.serialize_entry(key, value)?;
        }
        for (name, related) in &self.relations {
            match related {
                Related::One(Some(entity)) => map.serialize_entry(name, entity)?,
                Related::One(None) => map.serialize_entry(name, &Value::Null)?,
                Related::Many(entities) => map.serialize_entry(name, entities)?,
            }
        }
        map.end()
    }
}
