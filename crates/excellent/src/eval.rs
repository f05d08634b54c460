//! Evaluation of parsed expressions against a context value tree.

use rust_decimal::Decimal;

use crate::envs::Environment;
use crate::functions;
use crate::parser::{parse, BinOp, Expr};
use crate::types::{self, Value};

/// Parses and evaluates an expression. Never fails: parse and evaluation
/// problems come back as error values.
pub fn evaluate_expression(env: &Environment, context: &Value, src: &str) -> Value {
    match parse(src) {
        Ok(expr) => evaluate(env, context, &expr),
        Err(msg) => Value::error(msg),
    }
}

/// Evaluates an AST node. Errors in any sub-expression propagate upward.
pub fn evaluate(env: &Environment, context: &Value, expr: &Expr) -> Value {
    match expr {
        Expr::TextLit(s) => Value::Text(s.clone()),
        Expr::NumberLit(n) => match n.parse::<Decimal>() {
            Ok(d) => Value::Number(d),
            Err(_) => Value::error(format!("invalid number literal \"{}\"", n)),
        },
        Expr::BoolLit(b) => Value::Boolean(*b),

        Expr::Ref(name) => context.resolve(name),

        Expr::Member(base, name) => {
            let base = evaluate(env, context, base);
            resolve_segment(&base, name)
        }

        Expr::Index(base, idx) => {
            let base = evaluate(env, context, base);
            let idx = evaluate(env, context, idx);
            match idx.reduce() {
                Value::Error(_) => idx.reduce().clone(),
                Value::Number(_) => match types::to_integer(env, &idx) {
                    Ok(i) => base.index(i),
                    Err(e) => e,
                },
                Value::Text(key) => resolve_segment(&base, key),
                other => Value::error(format!("cannot index with {}", other.type_name())),
            }
        }

        Expr::Call(name, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate(env, context, arg));
            }
            functions::call(env, name, &values)
        }

        Expr::Neg(inner) => {
            let v = evaluate(env, context, inner);
            match types::to_number(env, &v) {
                Ok(n) => Value::Number(-n),
                Err(e) => e,
            }
        }

        Expr::Binary(op, left, right) => {
            let l = evaluate(env, context, left);
            let r = evaluate(env, context, right);
            binary(env, *op, &l, &r)
        }
    }
}

/// Resolves one path segment: numeric segments index arrays, anything else
/// is a named child lookup.
fn resolve_segment(base: &Value, segment: &str) -> Value {
    if let Ok(idx) = segment.parse::<i64>() {
        if matches!(base.reduce(), Value::Array(_)) {
            return base.reduce().index(idx);
        }
    }
    base.resolve(segment)
}

fn binary(env: &Environment, op: BinOp, left: &Value, right: &Value) -> Value {
    match op {
        BinOp::Concat => {
            let l = match types::to_text(env, left) {
                Ok(s) => s,
                Err(e) => return e,
            };
            let r = match types::to_text(env, right) {
                Ok(s) => s,
                Err(e) => return e,
            };
            Value::Text(l + &r)
        }

        BinOp::Eq | BinOp::Neq => match types::equals(env, left, right) {
            Ok(eq) => Value::Boolean(if op == BinOp::Eq { eq } else { !eq }),
            Err(e) => e,
        },

        BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte => {
            match types::compare(env, left, right) {
                Ok(ord) => Value::Boolean(match op {
                    BinOp::Lt => ord == std::cmp::Ordering::Less,
                    BinOp::Lte => ord != std::cmp::Ordering::Greater,
                    BinOp::Gt => ord == std::cmp::Ordering::Greater,
                    _ => ord != std::cmp::Ordering::Less,
                }),
                Err(e) => e,
            }
        }

        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Pow => {
            let l = match types::to_number(env, left) {
                Ok(n) => n,
                Err(e) => return e,
            };
            let r = match types::to_number(env, right) {
                Ok(n) => n,
                Err(e) => return e,
            };
            arithmetic(op, l, r)
        }
    }
}

fn arithmetic(op: BinOp, l: Decimal, r: Decimal) -> Value {
    let result = match op {
        BinOp::Add => l.checked_add(r),
        BinOp::Sub => l.checked_sub(r),
        BinOp::Mul => l.checked_mul(r),
        BinOp::Div => {
            if r.is_zero() {
                return Value::error("division by zero");
            }
            l.checked_div(r)
        }
        BinOp::Pow => return power(l, r),
        _ => unreachable!(),
    };
    match result {
        Some(n) => Value::Number(n),
        None => Value::error(format!("{} {} {} overflows", l, op.as_str(), r)),
    }
}

/// Decimal exponentiation. Exponents must be integers; negative exponents
/// invert the result.
fn power(base: Decimal, exp: Decimal) -> Value {
    if !exp.fract().is_zero() {
        return Value::error(format!("{} is not an integer exponent", exp));
    }
    use rust_decimal::prelude::ToPrimitive;
    let n = match exp.trunc().to_i64() {
        Some(n) => n,
        None => return Value::error(format!("exponent {} out of range", exp)),
    };
    let mut acc = Decimal::ONE;
    for _ in 0..n.unsigned_abs() {
        acc = match acc.checked_mul(base) {
            Some(v) => v,
            None => return Value::error(format!("{} ^ {} overflows", base, exp)),
        };
    }
    if n < 0 {
        if acc.is_zero() {
            return Value::error("division by zero");
        }
        acc = Decimal::ONE / acc;
    }
    Value::Number(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::object;
    use std::str::FromStr;

    fn env() -> Environment {
        Environment::default()
    }

    fn ctx() -> Value {
        object(vec![
            (
                "contact",
                object(vec![
                    ("name", Value::text("Ryan Lewis")),
                    (
                        "urns",
                        Value::Array(vec![Value::text("tel:+12065551212"), Value::text("mailto:foo@bar.com")]),
                    ),
                ]),
            ),
            ("count", Value::number(Decimal::from(3))),
        ])
    }

    fn eval_str(src: &str) -> Value {
        evaluate_expression(&env(), &ctx(), src)
    }

    #[test]
    fn arithmetic_uses_decimals() {
        assert_eq!(eval_str("1 + 2 * 3"), Value::number(Decimal::from(7)));
        assert_eq!(eval_str("10 / 4"), Value::Number(Decimal::from_str("2.5").unwrap()));
        assert_eq!(eval_str("2 ^ 10"), Value::number(Decimal::from(1024)));
        assert_eq!(eval_str("-2 ^ 2"), Value::number(Decimal::from(4)));
        assert!(eval_str("1 / 0").is_error());
        assert!(eval_str("2 ^ 0.5").is_error());
    }

    #[test]
    fn concatenation_and_comparison() {
        assert_eq!(eval_str(r#""a" & "b" & count"#), Value::text("ab3"));
        assert_eq!(eval_str("3 = count"), Value::Boolean(true));
        assert_eq!(eval_str("count > 2"), Value::Boolean(true));
        assert!(eval_str(r#""foo" > "bar""#).is_error());
    }

    #[test]
    fn path_resolution() {
        assert_eq!(eval_str("contact.name"), Value::text("Ryan Lewis"));
        assert_eq!(eval_str("contact.urns.0"), Value::text("tel:+12065551212"));
        assert_eq!(eval_str("contact.urns[-1]"), Value::text("mailto:foo@bar.com"));
        assert!(eval_str("contact.missing").is_error());
        assert!(eval_str("nothing.at.all").is_error());
    }

    #[test]
    fn errors_propagate_through_operators() {
        let v = eval_str("contact.missing + 1");
        assert!(v.is_error());
        // the original message is preserved
        assert_eq!(v, Value::error("unable to resolve 'missing'"));
    }
}
