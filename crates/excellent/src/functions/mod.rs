//! The Excellent function registry.
//!
//! Functions are looked up case-insensitively. Each function is registered
//! through a lightweight adapter that checks arity and coerces arguments to
//! the declared shape -- the dispatcher is data, not a type hierarchy.
//! Conversion failures short-circuit to the offending error value.

mod builtins;

pub use builtins::tokenize;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use rust_decimal::Decimal;

use crate::envs::Environment;
use crate::types::{self, Value, XDateTime};

pub type XFunction = Arc<dyn Fn(&Environment, &[Value]) -> Value + Send + Sync>;

static REGISTRY: Lazy<RwLock<HashMap<String, XFunction>>> = Lazy::new(|| {
    let mut map = HashMap::new();
    builtins::register_all(&mut map);
    RwLock::new(map)
});

/// Registers a function under the given (lowercased) name. Used by the flow
/// runtime to add its router test functions to the shared registry.
pub fn register(name: &str, function: XFunction) {
    REGISTRY
        .write()
        .expect("function registry poisoned")
        .insert(name.to_lowercase(), function);
}

/// Calls a registered function by name. Unknown names are error values.
pub fn call(env: &Environment, name: &str, args: &[Value]) -> Value {
    let function = REGISTRY
        .read()
        .expect("function registry poisoned")
        .get(&name.to_lowercase())
        .cloned();
    match function {
        Some(f) => f(env, args),
        None => Value::error(format!("no function with name '{}'", name)),
    }
}

// ──────────────────────────────────────────────
// Arity and coercion adapters
// ──────────────────────────────────────────────

macro_rules! try_value {
    ($result:expr) => {
        match $result {
            Ok(v) => v,
            Err(e) => return e,
        }
    };
}
pub(crate) use try_value;

fn check_count(name: &'static str, args: &[Value], min: usize, max: Option<usize>) -> Option<Value> {
    if args.len() < min || max.is_some_and(|m| args.len() > m) {
        let expected = match (min, max) {
            (min, Some(max)) if min == max => format!("exactly {}", min),
            (min, Some(max)) => format!("{} to {}", min, max),
            (min, None) => format!("at least {}", min),
        };
        return Some(Value::error(format!(
            "{} takes {} arguments, got {}",
            name,
            expected,
            args.len()
        )));
    }
    None
}

pub fn arg_count(
    name: &'static str,
    min: usize,
    max: Option<usize>,
    f: fn(&Environment, &[Value]) -> Value,
) -> XFunction {
    Arc::new(move |env, args| {
        if let Some(err) = check_count(name, args, min, max) {
            return err;
        }
        f(env, args)
    })
}

pub fn no_args(name: &'static str, f: fn(&Environment) -> Value) -> XFunction {
    Arc::new(move |env, args| {
        if let Some(err) = check_count(name, args, 0, Some(0)) {
            return err;
        }
        f(env)
    })
}

pub fn one_arg(name: &'static str, f: fn(&Environment, &Value) -> Value) -> XFunction {
    Arc::new(move |env, args| {
        if let Some(err) = check_count(name, args, 1, Some(1)) {
            return err;
        }
        f(env, &args[0])
    })
}

pub fn two_args(name: &'static str, f: fn(&Environment, &Value, &Value) -> Value) -> XFunction {
    Arc::new(move |env, args| {
        if let Some(err) = check_count(name, args, 2, Some(2)) {
            return err;
        }
        f(env, &args[0], &args[1])
    })
}

pub fn three_args(
    name: &'static str,
    f: fn(&Environment, &Value, &Value, &Value) -> Value,
) -> XFunction {
    Arc::new(move |env, args| {
        if let Some(err) = check_count(name, args, 3, Some(3)) {
            return err;
        }
        f(env, &args[0], &args[1], &args[2])
    })
}

pub fn one_text(name: &'static str, f: fn(&Environment, &str) -> Value) -> XFunction {
    Arc::new(move |env, args| {
        if let Some(err) = check_count(name, args, 1, Some(1)) {
            return err;
        }
        let text = try_value!(types::to_text(env, &args[0]));
        f(env, &text)
    })
}

pub fn two_texts(name: &'static str, f: fn(&Environment, &str, &str) -> Value) -> XFunction {
    Arc::new(move |env, args| {
        if let Some(err) = check_count(name, args, 2, Some(2)) {
            return err;
        }
        let a = try_value!(types::to_text(env, &args[0]));
        let b = try_value!(types::to_text(env, &args[1]));
        f(env, &a, &b)
    })
}

pub fn three_texts(
    name: &'static str,
    f: fn(&Environment, &str, &str, &str) -> Value,
) -> XFunction {
    Arc::new(move |env, args| {
        if let Some(err) = check_count(name, args, 3, Some(3)) {
            return err;
        }
        let a = try_value!(types::to_text(env, &args[0]));
        let b = try_value!(types::to_text(env, &args[1]));
        let c = try_value!(types::to_text(env, &args[2]));
        f(env, &a, &b, &c)
    })
}

pub fn one_number(name: &'static str, f: fn(&Environment, Decimal) -> Value) -> XFunction {
    Arc::new(move |env, args| {
        if let Some(err) = check_count(name, args, 1, Some(1)) {
            return err;
        }
        let num = try_value!(types::to_number(env, &args[0]));
        f(env, num)
    })
}

pub fn two_numbers(
    name: &'static str,
    f: fn(&Environment, Decimal, Decimal) -> Value,
) -> XFunction {
    Arc::new(move |env, args| {
        if let Some(err) = check_count(name, args, 2, Some(2)) {
            return err;
        }
        let a = try_value!(types::to_number(env, &args[0]));
        let b = try_value!(types::to_number(env, &args[1]));
        f(env, a, b)
    })
}

pub fn one_datetime(name: &'static str, f: fn(&Environment, XDateTime) -> Value) -> XFunction {
    Arc::new(move |env, args| {
        if let Some(err) = check_count(name, args, 1, Some(1)) {
            return err;
        }
        let date = try_value!(types::to_datetime(env, &args[0]));
        f(env, date)
    })
}

pub fn text_and_integer(name: &'static str, f: fn(&Environment, &str, i64) -> Value) -> XFunction {
    Arc::new(move |env, args| {
        if let Some(err) = check_count(name, args, 2, Some(2)) {
            return err;
        }
        let text = try_value!(types::to_text(env, &args[0]));
        let count = try_value!(types::to_integer(env, &args[1]));
        f(env, &text, count)
    })
}

pub fn one_number_and_optional_integer(
    name: &'static str,
    f: fn(&Environment, Decimal, i64) -> Value,
    default: i64,
) -> XFunction {
    Arc::new(move |env, args| {
        if let Some(err) = check_count(name, args, 1, Some(2)) {
            return err;
        }
        let num = try_value!(types::to_number(env, &args[0]));
        let extra = if args.len() > 1 {
            try_value!(types::to_integer(env, &args[1]))
        } else {
            default
        };
        f(env, num, extra)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let env = Environment::default();
        assert_eq!(call(&env, "UPPER", &[Value::text("asdf")]), Value::text("ASDF"));
        assert_eq!(call(&env, "upper", &[Value::text("asdf")]), Value::text("ASDF"));
    }

    #[test]
    fn unknown_function_is_an_error() {
        let env = Environment::default();
        assert!(call(&env, "bogus", &[]).is_error());
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let env = Environment::default();
        assert!(call(&env, "upper", &[]).is_error());
        assert!(call(&env, "upper", &[Value::text("a"), Value::text("b")]).is_error());
    }

    #[test]
    fn conversion_failures_short_circuit_with_original_message() {
        let env = Environment::default();
        let err = Value::error("boom");
        assert_eq!(call(&env, "upper", &[err.clone()]), err);
        assert_eq!(call(&env, "abs", &[err.clone()]), err);
        assert_eq!(call(&env, "mod", &[Value::number(Decimal::from(5)), err.clone()]), err);
    }
}
