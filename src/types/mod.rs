//! Type coercion layer
//!
//! A type handler is a named, stateless pair of pure functions converting
//! between storage values and domain values. Handlers live in an immutable
//! registry built once per repository by merging the built-ins with
//! caller-supplied overrides; the registry is dependency-injected into
//! every mapper rather than held in process-wide state.

pub mod builtin;

use crate::error::{MapperError, MapperResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub use builtin::{BooleanType, DateType, FloatType, IntegerType, JsonType, StringType, UuidType};

/// A storage-to-domain value coercion pair.
///
/// Both directions must be pure and total for well-formed input; a handler
/// signals malformed input with [`MapperError::Coercion`]. Null passes
/// through both directions untouched (a nullable column stays nullable).
pub trait TypeHandler: Send + Sync {
    /// Coerce a raw storage value into its domain form.
    fn load(&self, raw: Value) -> MapperResult<Value>;

    /// Coerce a domain value into its storage form.
    fn dump(&self, value: Value) -> MapperResult<Value>;
}

/// Immutable name-to-handler map.
#[derive(Clone)]
pub struct TypeRegistry {
    handlers: HashMap<String, Arc<dyn TypeHandler>>,
}

impl TypeRegistry {
    /// Registry holding only the built-in handlers:
    /// `string`, `integer`, `float`, `boolean`, `date`, `json`, `uuid`.
    pub fn builtin() -> Self {
        let mut handlers: HashMap<String, Arc<dyn TypeHandler>> = HashMap::new();
        handlers.insert("string".to_string(), Arc::new(StringType));
        handlers.insert("integer".to_string(), Arc::new(IntegerType));
        handlers.insert("float".to_string(), Arc::new(FloatType));
        handlers.insert("boolean".to_string(), Arc::new(BooleanType));
        handlers.insert("date".to_string(), Arc::new(DateType));
        handlers.insert("json".to_string(), Arc::new(JsonType));
        handlers.insert("uuid".to_string(), Arc::new(UuidType));
        Self { handlers }
    }

    /// Built-ins merged with caller-supplied handlers. A caller entry under
    /// a built-in name replaces the built-in.
    pub fn with_overrides(overrides: HashMap<String, Arc<dyn TypeHandler>>) -> Self {
        let mut registry = Self::builtin();
        for (name, handler) in overrides {
            registry.handlers.insert(name, handler);
        }
        registry
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.handlers.contains_key(type_name)
    }

    /// Handler for a type name, failing with `UnknownType` when absent.
    pub fn handler(&self, type_name: &str) -> MapperResult<&Arc<dyn TypeHandler>> {
        self.handlers
            .get(type_name)
            .ok_or_else(|| MapperError::UnknownType(type_name.to_string()))
    }

    /// Coerce a raw storage value through the named handler.
    pub fn load(&self, type_name: &str, raw: Value) -> MapperResult<Value> {
        self.handler(type_name)?.load(raw)
    }

    /// Coerce a domain value through the named handler.
    pub fn dump(&self, type_name: &str, value: Value) -> MapperResult<Value> {
        self.handler(type_name)?.dump(value)
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct UppercaseType;

    impl TypeHandler for UppercaseType {
        fn load(&self, raw: Value) -> MapperResult<Value> {
            match raw {
                Value::String(s) => Ok(Value::String(s.to_uppercase())),
                other => Ok(other),
            }
        }

        fn dump(&self, value: Value) -> MapperResult<Value> {
            match value {
                Value::String(s) => Ok(Value::String(s.to_lowercase())),
                other => Ok(other),
            }
        }
    }

    #[test]
    fn builtin_registry_has_all_builtin_names() {
        let registry = TypeRegistry::builtin();
        for name in ["string", "integer", "float", "boolean", "date", "json", "uuid"] {
            assert!(registry.contains(name), "missing builtin '{}'", name);
        }
    }

    #[test]
    fn unknown_type_fails_loudly() {
        let registry = TypeRegistry::builtin();
        assert!(matches!(
            registry.load("money", json!(1)),
            Err(MapperError::UnknownType(name)) if name == "money"
        ));
    }

    #[test]
    fn overrides_extend_and_replace_builtins() {
        let mut overrides: HashMap<String, Arc<dyn TypeHandler>> = HashMap::new();
        overrides.insert("shout".to_string(), Arc::new(UppercaseType));
        overrides.insert("string".to_string(), Arc::new(UppercaseType));
        let registry = TypeRegistry::with_overrides(overrides);

        assert_eq!(registry.load("shout", json!("meow")).unwrap(), json!("MEOW"));
        assert_eq!(registry.load("string", json!("meow")).unwrap(), json!("MEOW"));
        // untouched builtins survive the merge
        assert_eq!(registry.load("integer", json!("7")).unwrap(), json!(7));
    }
}
