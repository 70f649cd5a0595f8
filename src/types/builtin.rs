//! Built-in type handlers
//!
//! Scalar handlers are involutive in practice: `dump(load(x)) == x` for
//! values already in domain form. `date` and `json` round-trip the other
//! way, `load(dump(x)) == x`, since their storage form is text.

use crate::error::{MapperError, MapperResult};
use crate::types::TypeHandler;
use chrono::NaiveDateTime;
use serde_json::{Number, Value};
use uuid::Uuid;

/// Storage format for `date` values.
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn coercion_error(type_name: &str, value: &Value) -> MapperError {
    MapperError::Coercion(format!("cannot coerce {} to {}", value, type_name))
}

/// Pass-through text. Non-string scalars are stringified.
pub struct StringType;

impl TypeHandler for StringType {
    fn load(&self, raw: Value) -> MapperResult<Value> {
        match raw {
            Value::Null | Value::String(_) => Ok(raw),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(coercion_error("string", &other)),
        }
    }

    fn dump(&self, value: Value) -> MapperResult<Value> {
        self.load(value)
    }
}

pub struct IntegerType;

impl TypeHandler for IntegerType {
    fn load(&self, raw: Value) -> MapperResult<Value> {
        match raw {
            Value::Null => Ok(Value::Null),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Number(i.into()))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Number((f as i64).into()))
                } else {
                    Err(coercion_error("integer", &Value::Number(n)))
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| Value::Number(i.into()))
                .map_err(|_| coercion_error("integer", &Value::String(s))),
            Value::Bool(b) => Ok(Value::Number(i64::from(b).into())),
            other => Err(coercion_error("integer", &other)),
        }
    }

    fn dump(&self, value: Value) -> MapperResult<Value> {
        self.load(value)
    }
}

pub struct FloatType;

impl TypeHandler for FloatType {
    fn load(&self, raw: Value) -> MapperResult<Value> {
        match raw {
            Value::Null => Ok(Value::Null),
            Value::Number(n) => {
                let f = n.as_f64().ok_or_else(|| coercion_error("float", &Value::Number(n.clone())))?;
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| coercion_error("float", &Value::Number(n)))
            }
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| coercion_error("float", &Value::String(s))),
            other => Err(coercion_error("float", &other)),
        }
    }

    fn dump(&self, value: Value) -> MapperResult<Value> {
        self.load(value)
    }
}

pub struct BooleanType;

impl TypeHandler for BooleanType {
    fn load(&self, raw: Value) -> MapperResult<Value> {
        match raw {
            Value::Null => Ok(Value::Null),
            Value::Bool(_) => Ok(raw),
            Value::Number(n) => Ok(Value::Bool(n.as_f64().map(|f| f != 0.0).unwrap_or(false))),
            Value::String(s) => match s.trim() {
                "true" | "t" | "1" => Ok(Value::Bool(true)),
                "false" | "f" | "0" => Ok(Value::Bool(false)),
                _ => Err(coercion_error("boolean", &Value::String(s))),
            },
            other => Err(coercion_error("boolean", &other)),
        }
    }

    fn dump(&self, value: Value) -> MapperResult<Value> {
        self.load(value)
    }
}

/// Timestamps stored as `YYYY-MM-DD HH:MM:SS` text; RFC 3339 input is
/// accepted on load and normalized to the storage format.
pub struct DateType;

impl DateType {
    fn parse(text: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(text, DATE_FORMAT)
            .ok()
            .or_else(|| {
                chrono::DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|dt| dt.naive_utc())
            })
            .or_else(|| {
                // date-only input gets a midnight time component
                chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    }
}

impl TypeHandler for DateType {
    fn load(&self, raw: Value) -> MapperResult<Value> {
        match raw {
            Value::Null => Ok(Value::Null),
            Value::String(s) => Self::parse(&s)
                .map(|dt| Value::String(dt.format(DATE_FORMAT).to_string()))
                .ok_or_else(|| coercion_error("date", &Value::String(s))),
            other => Err(coercion_error("date", &other)),
        }
    }

    fn dump(&self, value: Value) -> MapperResult<Value> {
        self.load(value)
    }
}

/// Structured values stored as JSON text.
pub struct JsonType;

impl TypeHandler for JsonType {
    fn load(&self, raw: Value) -> MapperResult<Value> {
        match raw {
            Value::Null => Ok(Value::Null),
            Value::String(s) => serde_json::from_str(&s).map_err(MapperError::from),
            // already structured, e.g. a native jsonb column
            other => Ok(other),
        }
    }

    fn dump(&self, value: Value) -> MapperResult<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            other => Ok(Value::String(serde_json::to_string(&other)?)),
        }
    }
}

/// Canonical lowercase-hyphenated UUID text.
pub struct UuidType;

impl TypeHandler for UuidType {
    fn load(&self, raw: Value) -> MapperResult<Value> {
        match raw {
            Value::Null => Ok(Value::Null),
            Value::String(s) => Uuid::parse_str(s.trim())
                .map(|u| Value::String(u.to_string()))
                .map_err(|_| coercion_error("uuid", &Value::String(s))),
            other => Err(coercion_error("uuid", &other)),
        }
    }

    fn dump(&self, value: Value) -> MapperResult<Value> {
        self.load(value)
    }
}
