//! Runtime values for the Excellent expression language.
//!
//! `Value` is a tagged union with a uniform conversion surface. Conversions
//! are total: anything that can fail hands back `Value::Error`, which
//! propagates through operators and function calls rather than aborting
//! evaluation. All numeric values use `rust_decimal::Decimal` -- never `f64`.

mod datetime;
mod json;

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::envs::Environment;

pub use datetime::XDateTime;
pub use json::{json_to_value, parse_json, to_json_text};

// ──────────────────────────────────────────────
// Values
// ──────────────────────────────────────────────

/// A value in the Excellent type system.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(Decimal),
    Boolean(bool),
    DateTime(XDateTime),
    Array(Vec<Value>),
    Object(ObjectValue),
    /// An expression-level error. Renders as empty text in templates but is
    /// observable to `is_error` and `default`.
    Error(String),
    Nil,
}

/// An object value: named children plus an optional default the object
/// reduces to when used where a primitive is needed (e.g. `@contact` in a
/// template reduces to the contact's name).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectValue {
    entries: BTreeMap<String, Value>,
    default: Option<Box<Value>>,
}

impl ObjectValue {
    pub fn new(entries: BTreeMap<String, Value>) -> Self {
        ObjectValue { entries, default: None }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(Box::new(default));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .get(key)
            .or_else(|| self.entries.get(&key.to_lowercase()))
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

/// Builds an object value from (key, value) pairs.
pub fn object(pairs: Vec<(&str, Value)>) -> Value {
    let entries = pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    Value::Object(ObjectValue::new(entries))
}

impl Value {
    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }

    pub fn number(d: impl Into<Decimal>) -> Value {
        Value::Number(d.into())
    }

    pub fn error(msg: impl Into<String>) -> Value {
        Value::Error(msg.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Returns a human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::DateTime(_) => "datetime",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Error(_) => "error",
            Value::Nil => "nil",
        }
    }

    /// Reduces this value to the thing it stands for in primitive position:
    /// objects collapse to their default, everything else is itself.
    pub fn reduce(&self) -> &Value {
        match self {
            Value::Object(obj) => match obj.default_value() {
                Some(d) => d.reduce(),
                None => self,
            },
            other => other,
        }
    }

    /// Whether this value counts as empty for the purposes of `default`.
    pub fn is_empty(&self) -> bool {
        match self.reduce() {
            Value::Text(s) => s.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(obj) => obj.is_empty(),
            Value::Nil => true,
            _ => false,
        }
    }

    /// The number of characters, items or entries in this value, if it has one.
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::Text(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            Value::Object(obj) => Some(obj.len()),
            _ => None,
        }
    }

    /// Indexes into an array value. Negative indices count from the end.
    pub fn index(&self, idx: i64) -> Value {
        match self {
            Value::Error(_) => self.clone(),
            Value::Array(items) => {
                let offset = if idx < 0 { idx + items.len() as i64 } else { idx };
                if offset >= 0 && (offset as usize) < items.len() {
                    items[offset as usize].clone()
                } else {
                    Value::error(format!("index {} out of range for {} items", idx, items.len()))
                }
            }
            other => Value::error(format!("{} is not indexable", other.type_name())),
        }
    }

    /// Resolves a named child of this value. Only objects have children;
    /// anything else is an error.
    pub fn resolve(&self, key: &str) -> Value {
        match self {
            Value::Error(_) => self.clone(),
            Value::Object(obj) => match obj.get(key) {
                Some(child) => child.clone(),
                None => Value::error(format!("unable to resolve '{}'", key)),
            },
            other => Value::error(format!(
                "unable to resolve '{}' on {}",
                key,
                other.type_name()
            )),
        }
    }
}

// ──────────────────────────────────────────────
// Conversions
// ──────────────────────────────────────────────

/// Converts a value to text. Errors pass through unchanged.
pub fn to_text(env: &Environment, value: &Value) -> Result<String, Value> {
    match value.reduce() {
        Value::Text(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.normalize().to_string()),
        Value::Boolean(b) => Ok(b.to_string()),
        Value::DateTime(d) => Ok(d.to_text()),
        Value::Array(items) => {
            let mut texts = Vec::with_capacity(items.len());
            for item in items {
                texts.push(serde_json::Value::String(to_text(env, item)?));
            }
            Ok(serde_json::Value::Array(texts).to_string())
        }
        Value::Object(obj) => {
            let mut map = serde_json::Map::new();
            for (k, v) in obj.entries() {
                map.insert(k.clone(), serde_json::Value::String(to_text(env, v)?));
            }
            Ok(serde_json::Value::Object(map).to_string())
        }
        Value::Error(_) => Err(value.reduce().clone()),
        Value::Nil => Ok(String::new()),
    }
}

/// Converts a value to a boolean. Text is truthy unless empty or "false".
pub fn to_boolean(_env: &Environment, value: &Value) -> Result<bool, Value> {
    match value.reduce() {
        Value::Text(s) => Ok(!s.is_empty() && s.to_lowercase() != "false"),
        Value::Number(n) => Ok(!n.is_zero()),
        Value::Boolean(b) => Ok(*b),
        Value::DateTime(_) => Ok(true),
        Value::Array(items) => Ok(!items.is_empty()),
        Value::Object(obj) => Ok(!obj.is_empty()),
        Value::Error(_) => Err(value.reduce().clone()),
        Value::Nil => Ok(false),
    }
}

/// Converts a value to a number.
pub fn to_number(_env: &Environment, value: &Value) -> Result<Decimal, Value> {
    match value.reduce() {
        Value::Number(n) => Ok(*n),
        Value::Text(s) => s
            .trim()
            .parse::<Decimal>()
            .map_err(|_| Value::error(format!("unable to convert \"{}\" to a number", s))),
        Value::Boolean(_) | Value::DateTime(_) | Value::Array(_) | Value::Object(_) | Value::Nil => {
            Err(Value::error(format!(
                "unable to convert {} to a number",
                value.type_name()
            )))
        }
        Value::Error(_) => Err(value.reduce().clone()),
    }
}

/// Converts a value to a datetime, parsing text per the environment formats.
pub fn to_datetime(env: &Environment, value: &Value) -> Result<XDateTime, Value> {
    match value.reduce() {
        Value::DateTime(d) => Ok(*d),
        Value::Text(s) => crate::dates::datetime_from_text(env, s)
            .ok_or_else(|| Value::error(format!("unable to convert \"{}\" to a datetime", s))),
        Value::Error(_) => Err(value.reduce().clone()),
        other => Err(Value::error(format!(
            "unable to convert {} to a datetime",
            other.type_name()
        ))),
    }
}

/// Converts a value to an integer, truncating any fractional part.
pub fn to_integer(env: &Environment, value: &Value) -> Result<i64, Value> {
    use rust_decimal::prelude::ToPrimitive;

    let num = to_number(env, value)?;
    num.trunc()
        .to_i64()
        .ok_or_else(|| Value::error(format!("number {} is out of integer range", num)))
}

// ──────────────────────────────────────────────
// Equality and ordering
// ──────────────────────────────────────────────

/// Tests two values for equality: like primitives compare natively, anything
/// else falls back to text-form comparison.
pub fn equals(env: &Environment, a: &Value, b: &Value) -> Result<bool, Value> {
    let (ra, rb) = (a.reduce(), b.reduce());
    match (ra, rb) {
        (Value::Error(_), _) => Err(ra.clone()),
        (_, Value::Error(_)) => Err(rb.clone()),
        (Value::Number(x), Value::Number(y)) => Ok(x == y),
        (Value::Boolean(x), Value::Boolean(y)) => Ok(x == y),
        (Value::DateTime(x), Value::DateTime(y)) => Ok(x.instant() == y.instant()),
        _ => Ok(to_text(env, ra)? == to_text(env, rb)?),
    }
}

/// Orders two values. Only numbers and datetimes have an ordering; anything
/// else is an error (use `text_compare` for lexical comparison).
pub fn compare(env: &Environment, a: &Value, b: &Value) -> Result<std::cmp::Ordering, Value> {
    let (ra, rb) = (a.reduce(), b.reduce());
    if let Value::Error(_) = ra {
        return Err(ra.clone());
    }
    if let Value::Error(_) = rb {
        return Err(rb.clone());
    }
    if let (Value::DateTime(x), Value::DateTime(y)) = (ra, rb) {
        return Ok(x.instant().cmp(&y.instant()));
    }
    let x = to_number(env, ra)?;
    let y = to_number(env, rb)?;
    Ok(x.cmp(&y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn env() -> Environment {
        Environment::default()
    }

    #[test]
    fn number_text_form_strips_trailing_zeros() {
        let v = Value::Number(Decimal::from_str("123.45000").unwrap());
        assert_eq!(to_text(&env(), &v).unwrap(), "123.45");
    }

    #[test]
    fn text_to_boolean() {
        assert!(to_boolean(&env(), &Value::text("yes")).unwrap());
        assert!(!to_boolean(&env(), &Value::text("")).unwrap());
        assert!(!to_boolean(&env(), &Value::text("FALSE")).unwrap());
    }

    #[test]
    fn object_reduces_to_default() {
        let contact = Value::Object(
            ObjectValue::new(
                [("name".to_string(), Value::text("Ryan Lewis"))].into_iter().collect(),
            )
            .with_default(Value::text("Ryan Lewis")),
        );
        assert_eq!(to_text(&env(), &contact).unwrap(), "Ryan Lewis");
    }

    #[test]
    fn array_index_negative_counts_from_end() {
        let arr = Value::Array(vec![Value::text("a"), Value::text("b"), Value::text("c")]);
        assert_eq!(arr.index(-1), Value::text("c"));
        assert_eq!(arr.index(0), Value::text("a"));
        assert!(arr.index(5).is_error());
    }

    #[test]
    fn errors_propagate_through_conversions() {
        let err = Value::error("boom");
        assert!(to_text(&env(), &err).is_err());
        assert!(to_number(&env(), &err).is_err());
        assert_eq!(to_text(&env(), &err).unwrap_err(), err);
    }

    #[test]
    fn equality_is_typed_then_textual() {
        let e = env();
        assert!(equals(&e, &Value::number(Decimal::from(3)), &Value::text("3")).unwrap());
        assert!(!equals(&e, &Value::text("a"), &Value::text("b")).unwrap());
        assert!(equals(&e, &Value::Boolean(true), &Value::Boolean(true)).unwrap());
    }

    #[test]
    fn ordering_rejects_plain_text() {
        assert!(compare(&env(), &Value::text("foo"), &Value::text("bar")).is_err());
        assert_eq!(
            compare(&env(), &Value::text("5"), &Value::text("3")).unwrap(),
            std::cmp::Ordering::Greater
        );
    }
}
