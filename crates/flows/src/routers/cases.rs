//! Router test functions, registered into the shared function registry.
//!
//! Every test reduces to an object whose default is the match flag, with
//! the matched fragment under `match` -- so a test result is truthy exactly
//! when it matched, and routers can still read what matched.

use std::sync::Once;

use rust_decimal::Decimal;

use brook_excellent::envs::Environment;
use brook_excellent::functions::{self, arg_count, one_arg, two_args, XFunction};
use brook_excellent::types::{self, ObjectValue, Value};

static REGISTER: Once = Once::new();

/// Registers all router tests. Idempotent; called at engine entry.
pub fn register_all() {
    REGISTER.call_once(|| {
        let entries: Vec<(&str, XFunction)> = vec![
            ("is_error", one_arg("is_error", is_error)),
            ("has_text", one_arg("has_text", has_text)),
            ("has_any_word", two_args("has_any_word", has_any_word)),
            ("has_all_words", two_args("has_all_words", has_all_words)),
            ("has_phrase", two_args("has_phrase", has_phrase)),
            ("has_number", one_arg("has_number", has_number)),
            ("has_number_between", arg_count("has_number_between", 3, Some(3), has_number_between)),
            ("has_group", two_args("has_group", has_group)),
        ];
        for (name, function) in entries {
            functions::register(name, function);
        }
    });
}

/// Builds a test result: truthy when matched, with the matched fragment.
fn test_result(matched: bool, match_value: Value) -> Value {
    let entries = [
        ("matched".to_string(), Value::Boolean(matched)),
        ("match".to_string(), match_value),
    ]
    .into_iter()
    .collect();
    Value::Object(ObjectValue::new(entries).with_default(Value::Boolean(matched)))
}

fn no_match() -> Value {
    test_result(false, Value::Nil)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

/// Matches when the value is an error, e.g. an unresolvable reference.
fn is_error(_env: &Environment, value: &Value) -> Value {
    if value.is_error() {
        test_result(true, value.clone())
    } else {
        no_match()
    }
}

fn has_text(env: &Environment, value: &Value) -> Value {
    let text = match types::to_text(env, value) {
        Ok(t) => t,
        Err(_) => return no_match(),
    };
    if text.trim().is_empty() {
        no_match()
    } else {
        test_result(true, Value::Text(text))
    }
}

/// Matches when the text shares any word with the arguments.
fn has_any_word(env: &Environment, value: &Value, words: &Value) -> Value {
    let (text, words) = match text_args(env, value, words) {
        Some(pair) => pair,
        None => return no_match(),
    };
    let haystack = functions::tokenize(&text.to_lowercase());
    let matches: Vec<String> = functions::tokenize(&words.to_lowercase())
        .into_iter()
        .filter(|w| haystack.contains(w))
        .collect();
    if matches.is_empty() {
        no_match()
    } else {
        test_result(true, Value::Text(matches.join(" ")))
    }
}

/// Matches when the text contains every one of the argument words.
fn has_all_words(env: &Environment, value: &Value, words: &Value) -> Value {
    let (text, words) = match text_args(env, value, words) {
        Some(pair) => pair,
        None => return no_match(),
    };
    let haystack = functions::tokenize(&text.to_lowercase());
    let needles = functions::tokenize(&words.to_lowercase());
    if needles.is_empty() || !needles.iter().all(|w| haystack.contains(w)) {
        no_match()
    } else {
        test_result(true, Value::Text(needles.join(" ")))
    }
}

/// Matches when the argument words appear in order as a phrase.
fn has_phrase(env: &Environment, value: &Value, phrase: &Value) -> Value {
    let (text, phrase) = match text_args(env, value, phrase) {
        Some(pair) => pair,
        None => return no_match(),
    };
    let haystack = functions::tokenize(&text.to_lowercase());
    let needle = functions::tokenize(&phrase.to_lowercase());
    if needle.is_empty() {
        return test_result(true, Value::text(""));
    }
    let found = haystack
        .windows(needle.len())
        .any(|window| window == needle.as_slice());
    if found {
        test_result(true, Value::Text(needle.join(" ")))
    } else {
        no_match()
    }
}

/// Matches when the text contains a parseable number.
fn has_number(env: &Environment, value: &Value) -> Value {
    let text = match types::to_text(env, value) {
        Ok(t) => t,
        Err(_) => return no_match(),
    };
    match first_number(&text) {
        Some(num) => test_result(true, Value::Number(num)),
        None => no_match(),
    }
}

/// Matches when the text contains a number within the inclusive range.
fn has_number_between(env: &Environment, args: &[Value]) -> Value {
    let text = match types::to_text(env, &args[0]) {
        Ok(t) => t,
        Err(_) => return no_match(),
    };
    let min = match types::to_number(env, &args[1]) {
        Ok(n) => n,
        Err(e) => return e,
    };
    let max = match types::to_number(env, &args[2]) {
        Ok(n) => n,
        Err(e) => return e,
    };
    match first_number(&text) {
        Some(num) if num >= min && num <= max => test_result(true, Value::Number(num)),
        _ => no_match(),
    }
}

/// Matches when the contact value belongs to the group with the given uuid.
fn has_group(env: &Environment, contact: &Value, group_uuid: &Value) -> Value {
    let wanted = match types::to_text(env, group_uuid) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let groups = contact.resolve("groups");
    if let Value::Array(items) = groups.reduce() {
        for group in items {
            let uuid = group.resolve("uuid");
            if matches!(types::to_text(env, &uuid), Ok(u) if u == wanted) {
                return test_result(true, group.clone());
            }
        }
    }
    no_match()
}

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn text_args(env: &Environment, a: &Value, b: &Value) -> Option<(String, String)> {
    let a = types::to_text(env, a).ok()?;
    let b = types::to_text(env, b).ok()?;
    Some((a, b))
}

fn first_number(text: &str) -> Option<Decimal> {
    text.split_whitespace()
        .find_map(|token| token.trim_matches(|c: char| !c.is_ascii_digit() && c != '.' && c != '-')
            .parse::<Decimal>()
            .ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::default()
    }

    fn call(name: &str, args: &[Value]) -> Value {
        register_all();
        functions::call(&env(), name, args)
    }

    fn matched(result: &Value) -> bool {
        types::to_boolean(&env(), result).unwrap()
    }

    #[test]
    fn word_tests() {
        let r = call("has_any_word", &[Value::text("The Quick Brown"), Value::text("quick fox")]);
        assert!(matched(&r));
        assert_eq!(r.resolve("match"), Value::text("quick"));

        let r = call("has_any_word", &[Value::text("nope"), Value::text("quick fox")]);
        assert!(!matched(&r));

        let r = call("has_all_words", &[Value::text("the quick brown fox"), Value::text("quick fox")]);
        assert!(matched(&r));

        let r = call("has_phrase", &[Value::text("the quick brown fox"), Value::text("brown fox")]);
        assert!(matched(&r));
        let r = call("has_phrase", &[Value::text("the quick brown fox"), Value::text("fox brown")]);
        assert!(!matched(&r));
    }

    #[test]
    fn number_tests() {
        let r = call("has_number", &[Value::text("I am 25 years old")]);
        assert!(matched(&r));
        assert_eq!(r.resolve("match"), Value::Number(Decimal::from(25)));

        let r = call("has_number_between", &[
            Value::text("rate it 7 please"),
            Value::text("1"),
            Value::text("10"),
        ]);
        assert!(matched(&r));

        let r = call("has_number_between", &[
            Value::text("rate it 12 please"),
            Value::text("1"),
            Value::text("10"),
        ]);
        assert!(!matched(&r));
    }

    #[test]
    fn error_and_text_tests() {
        assert!(matched(&call("is_error", &[Value::error("boom")])));
        assert!(!matched(&call("is_error", &[Value::text("fine")])));
        assert!(matched(&call("has_text", &[Value::text(" ok ")])));
        assert!(!matched(&call("has_text", &[Value::text("  ")])));
        // an error operand doesn't match rather than erroring the router
        assert!(!matched(&call("has_text", &[Value::error("boom")])));
    }

    #[test]
    fn group_test_reads_the_contact_tree() {
        use brook_excellent::types::object;
        let contact = object(vec![(
            "groups",
            Value::Array(vec![object(vec![
                ("uuid", Value::text("b7cf0d83-f1c9-411c-96fd-c511a4cfa86d")),
                ("name", Value::text("Testers")),
            ])]),
        )]);
        let r = call("has_group", &[
            contact.clone(),
            Value::text("b7cf0d83-f1c9-411c-96fd-c511a4cfa86d"),
        ]);
        assert!(matched(&r));
        let r = call("has_group", &[contact, Value::text("11111111-1111-4111-8111-111111111111")]);
        assert!(!matched(&r));
    }
}
