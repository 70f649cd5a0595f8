//! Field descriptors
//!
//! One field maps an entity-side property to a storage column and names
//! the type handler that coerces values between the two.

use convert_case::{Case, Casing};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Insert-time default for a field.
///
/// Substituted only when the inserted entity carries *no* value for the
/// field; a present null, zero, or empty string is kept as supplied.
#[derive(Clone)]
pub enum FieldDefault {
    None,
    Literal(Value),
    /// Zero-argument generator, invoked lazily per insert.
    Generator(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl FieldDefault {
    /// The default value for one insert, invoking a generator if present.
    pub fn resolve(&self) -> Option<Value> {
        match self {
            FieldDefault::None => None,
            FieldDefault::Literal(value) => Some(value.clone()),
            FieldDefault::Generator(generate) => Some(generate()),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::None => write!(f, "None"),
            FieldDefault::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            FieldDefault::Generator(_) => write!(f, "Generator(..)"),
        }
    }
}

/// Declarative spec for one field, as written by the caller.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub field_name: String,
    pub type_name: String,
    pub column_name: Option<String>,
    pub primary: bool,
    pub default: FieldDefault,
}

impl FieldSpec {
    pub fn new(field_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            type_name: type_name.into(),
            column_name: None,
            primary: false,
            default: FieldDefault::None,
        }
    }

    /// Explicit storage column name, overriding the snake-cased default.
    pub fn column(mut self, column_name: impl Into<String>) -> Self {
        self.column_name = Some(column_name.into());
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = FieldDefault::Literal(value);
        self
    }

    pub fn default_fn(mut self, generate: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = FieldDefault::Generator(Arc::new(generate));
        self
    }
}

/// One column's mapping descriptor.
#[derive(Debug, Clone)]
pub struct Field {
    field_name: String,
    column_name: String,
    type_name: String,
    primary: bool,
    default: FieldDefault,
}

impl Field {
    /// Build a field from its spec, deriving the column name from the
    /// snake-cased field name when not explicit.
    pub fn create(spec: FieldSpec) -> Self {
        let column_name = spec
            .column_name
            .unwrap_or_else(|| spec.field_name.to_case(Case::Snake));
        Self {
            field_name: spec.field_name,
            column_name,
            type_name: spec.type_name,
            primary: spec.primary,
            default: spec.default,
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn default(&self) -> &FieldDefault {
        &self.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn column_name_defaults_to_snake_case() {
        let field = Field::create(FieldSpec::new("parentId", "uuid"));
        assert_eq!(field.column_name(), "parent_id");
        assert_eq!(field.field_name(), "parentId");
    }

    #[test]
    fn explicit_column_name_wins() {
        let field = Field::create(FieldSpec::new("createdAt", "date").column("created_on"));
        assert_eq!(field.column_name(), "created_on");
    }

    #[test]
    fn generator_default_is_invoked_lazily() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let field = Field::create(FieldSpec::new("id", "integer").default_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            json!(7)
        }));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(field.default().resolve(), Some(json!(7)));
        assert_eq!(field.default().resolve(), Some(json!(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
