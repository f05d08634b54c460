//! JSON bridge: parsing JSON into values and rendering values as JSON text.

use std::str::FromStr;

use rust_decimal::Decimal;

use super::{ObjectValue, Value};

/// Converts parsed JSON into a value tree. Objects carry no default.
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => match Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
        {
            Ok(d) => Value::Number(d),
            Err(_) => Value::error(format!("number {} is out of range", n)),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(items) => {
            Value::Array(items.iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(map) => {
            let entries = map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect();
            Value::Object(ObjectValue::new(entries))
        }
    }
}

/// Parses text as JSON, returning an error value if it isn't valid JSON.
pub fn parse_json(text: &str) -> Value {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(json) => json_to_value(&json),
        Err(_) => Value::error(format!("unable to parse \"{}\" as JSON", text)),
    }
}

/// Renders a value as JSON text. Numbers are emitted as bare decimal
/// literals so no precision is lost to a float round-trip. Errors have no
/// JSON form.
pub fn to_json_text(value: &Value) -> Result<String, Value> {
    match value {
        Value::Text(s) => Ok(serde_json::Value::String(s.clone()).to_string()),
        Value::Number(n) => Ok(n.normalize().to_string()),
        Value::Boolean(b) => Ok(b.to_string()),
        Value::DateTime(d) => Ok(serde_json::Value::String(d.to_text()).to_string()),
        Value::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(to_json_text(item)?);
            }
            Ok(format!("[{}]", parts.join(",")))
        }
        Value::Object(obj) => {
            let mut parts = Vec::with_capacity(obj.len());
            for (k, v) in obj.entries() {
                parts.push(format!(
                    "{}:{}",
                    serde_json::Value::String(k.clone()),
                    to_json_text(v)?
                ));
            }
            Ok(format!("{{{}}}", parts.join(",")))
        }
        Value::Error(_) => Err(value.clone()),
        Value::Nil => Ok("null".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalars() {
        assert_eq!(parse_json("\"string\""), Value::text("string"));
        assert_eq!(to_json_text(&Value::text("string")).unwrap(), "\"string\"");
        assert_eq!(to_json_text(&parse_json("10")).unwrap(), "10");
        assert_eq!(to_json_text(&parse_json("123.45")).unwrap(), "123.45");
    }

    #[test]
    fn arrays_and_objects_nest() {
        let v = parse_json(r#"{"a": [1, 2], "b": null}"#);
        assert_eq!(v.resolve("a").index(1), Value::number(Decimal::from(2)));
        assert!(v.resolve("b").is_nil());
        assert_eq!(to_json_text(&v).unwrap(), r#"{"a":[1,2],"b":null}"#);
    }

    #[test]
    fn invalid_json_is_an_error_value() {
        assert!(parse_json("invalid json").is_error());
    }
}
