//! The built-in function catalog.

use std::collections::HashMap;

use chrono::{Datelike, Duration};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::{
    arg_count, no_args, one_arg, one_datetime, one_number, one_number_and_optional_integer,
    one_text, text_and_integer, three_args, three_texts, try_value, two_args, two_numbers,
    two_texts, XFunction,
};
use crate::envs::Environment;
use crate::random;
use crate::types::{self, Value, XDateTime};
use crate::dates;
use crate::urns;

pub(super) fn register_all(map: &mut HashMap<String, XFunction>) {
    let entries: Vec<(&str, XFunction)> = vec![
        // type conversion
        ("text", one_arg("text", text)),
        ("boolean", one_arg("boolean", boolean)),
        ("number", one_arg("number", number)),
        ("datetime", one_text("datetime", datetime)),
        ("array", arg_count("array", 0, None, array)),
        // text
        ("char", one_number("char", char_)),
        ("code", one_text("code", code)),
        ("split", two_texts("split", split)),
        ("join", two_args("join", join)),
        ("title", one_text("title", title)),
        ("word", text_and_integer("word", word)),
        ("remove_first_word", one_text("remove_first_word", remove_first_word)),
        ("word_count", one_text("word_count", word_count)),
        ("word_slice", arg_count("word_slice", 2, Some(3), word_slice)),
        ("field", arg_count("field", 3, Some(3), field)),
        ("clean", one_text("clean", clean)),
        ("left", text_and_integer("left", left)),
        ("lower", one_text("lower", lower)),
        ("right", text_and_integer("right", right)),
        ("text_compare", two_texts("text_compare", text_compare)),
        ("repeat", text_and_integer("repeat", repeat)),
        ("replace", three_texts("replace", replace)),
        ("upper", one_text("upper", upper)),
        ("percent", one_number("percent", percent)),
        ("url_encode", one_text("url_encode", url_encode)),
        // boolean
        ("and", arg_count("and", 1, None, and)),
        ("or", arg_count("or", 1, None, or)),
        ("if", three_args("if", if_)),
        // number
        ("abs", one_number("abs", abs)),
        ("round", one_number_and_optional_integer("round", round, 0)),
        ("round_up", one_number_and_optional_integer("round_up", round_up, 0)),
        ("round_down", one_number_and_optional_integer("round_down", round_down, 0)),
        ("max", arg_count("max", 1, None, max)),
        ("min", arg_count("min", 1, None, min)),
        ("mean", arg_count("mean", 1, None, mean)),
        ("mod", two_numbers("mod", mod_)),
        ("rand", no_args("rand", rand_)),
        ("rand_between", two_numbers("rand_between", rand_between)),
        // datetime
        ("parse_datetime", arg_count("parse_datetime", 2, Some(3), parse_datetime)),
        ("datetime_from_parts", arg_count("datetime_from_parts", 3, Some(3), datetime_from_parts)),
        ("datetime_diff", arg_count("datetime_diff", 3, Some(3), datetime_diff)),
        ("datetime_add", arg_count("datetime_add", 3, Some(3), datetime_add)),
        ("weekday", one_datetime("weekday", weekday)),
        ("tz", one_datetime("tz", tz)),
        ("tz_offset", one_datetime("tz_offset", tz_offset)),
        ("today", no_args("today", today)),
        ("now", no_args("now", now)),
        ("from_epoch", one_number("from_epoch", from_epoch)),
        ("to_epoch", one_datetime("to_epoch", to_epoch)),
        // json
        ("json", one_arg("json", json)),
        ("parse_json", one_text("parse_json", parse_json)),
        // formatting
        ("format_datetime", arg_count("format_datetime", 1, Some(3), format_datetime)),
        ("format_location", one_text("format_location", format_location)),
        ("format_number", arg_count("format_number", 1, Some(3), format_number)),
        ("format_urn", arg_count("format_urn", 1, Some(1), format_urn)),
        // utility
        ("length", one_arg("length", length)),
        ("default", two_args("default", default_)),
        ("legacy_add", two_args("legacy_add", legacy_add)),
        ("read_chars", one_text("read_chars", read_chars)),
    ];
    for (name, function) in entries {
        map.insert(name.to_string(), function);
    }
}

// ──────────────────────────────────────────────
// Shared helpers
// ──────────────────────────────────────────────

/// Splits text into words: runs of letters, digits, underscores and
/// apostrophes, with every other non-whitespace symbol (e.g. an emoji)
/// counting as a word of its own.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_alphanumeric() || c == '_' || c == '\'' {
            current.push(c);
        } else {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            if !c.is_whitespace() && !c.is_ascii_punctuation() && !unicode_punct(c) {
                words.push(c.to_string());
            }
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn unicode_punct(c: char) -> bool {
    // the common non-ASCII punctuation that should separate words rather
    // than become one
    matches!(c, '…' | '—' | '–' | '«' | '»' | '¡' | '¿' | '。' | '、' | '！' | '？')
}

fn dec_pow10(exp: i64) -> Decimal {
    if exp >= 0 {
        let mut acc = Decimal::ONE;
        for _ in 0..exp {
            acc *= Decimal::TEN;
        }
        acc
    } else {
        Decimal::new(1, (-exp) as u32)
    }
}

/// Rounds half away from zero at `places`, which may be negative to round
/// into the integer part.
fn round_at(num: Decimal, places: i64) -> Decimal {
    if places >= 0 {
        num.round_dp_with_strategy(places as u32, RoundingStrategy::MidpointAwayFromZero)
    } else {
        let factor = dec_pow10(-places);
        (num / factor).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * factor
    }
}

// ──────────────────────────────────────────────
// Type conversion
// ──────────────────────────────────────────────

fn text(env: &Environment, value: &Value) -> Value {
    Value::Text(try_value!(types::to_text(env, value)))
}

fn boolean(env: &Environment, value: &Value) -> Value {
    Value::Boolean(try_value!(types::to_boolean(env, value)))
}

fn number(env: &Environment, value: &Value) -> Value {
    Value::Number(try_value!(types::to_number(env, value)))
}

fn datetime(env: &Environment, text: &str) -> Value {
    match dates::datetime_from_text(env, text) {
        Some(d) => Value::DateTime(d),
        None => Value::error(format!("unable to convert \"{}\" to a datetime", text)),
    }
}

fn array(_env: &Environment, args: &[Value]) -> Value {
    for arg in args {
        if arg.is_error() {
            return arg.clone();
        }
    }
    Value::Array(args.to_vec())
}

// ──────────────────────────────────────────────
// Boolean
// ──────────────────────────────────────────────

fn and(env: &Environment, args: &[Value]) -> Value {
    for arg in args {
        if !try_value!(types::to_boolean(env, arg)) {
            return Value::Boolean(false);
        }
    }
    Value::Boolean(true)
}

fn or(env: &Environment, args: &[Value]) -> Value {
    for arg in args {
        if try_value!(types::to_boolean(env, arg)) {
            return Value::Boolean(true);
        }
    }
    Value::Boolean(false)
}

/// `if(test, true_value, false_value)` — an error test is returned unchanged.
fn if_(env: &Environment, test: &Value, yes: &Value, no: &Value) -> Value {
    if try_value!(types::to_boolean(env, test)) {
        yes.clone()
    } else {
        no.clone()
    }
}

// ──────────────────────────────────────────────
// Text
// ──────────────────────────────────────────────

fn char_(env: &Environment, num: Decimal) -> Value {
    let code = try_value!(types::to_integer(env, &Value::Number(num)));
    match u32::try_from(code).ok().and_then(char::from_u32) {
        Some(c) => Value::Text(c.to_string()),
        None => Value::error(format!("{} is not a valid character code", code)),
    }
}

fn code(_env: &Environment, text: &str) -> Value {
    match text.chars().next() {
        Some(c) => Value::Number(Decimal::from(c as u32)),
        None => Value::error("requires a string of at least one character"),
    }
}

/// Splits on the delimiter, dropping empty segments.
fn split(_env: &Environment, text: &str, sep: &str) -> Value {
    let parts = if sep.is_empty() {
        text.chars().map(|c| Value::Text(c.to_string())).collect()
    } else {
        text.split(sep)
            .filter(|p| !p.is_empty())
            .map(Value::text)
            .collect()
    };
    Value::Array(parts)
}

fn join(env: &Environment, array: &Value, sep: &Value) -> Value {
    let items = match array.reduce() {
        Value::Array(items) => items,
        _ => return Value::error("requires an indexable as its first argument"),
    };
    let sep = try_value!(types::to_text(env, sep));
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(&sep);
        }
        out.push_str(&try_value!(types::to_text(env, item)));
    }
    Value::Text(out)
}

/// Titlecases each word.
fn title(_env: &Environment, text: &str) -> Value {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !c.is_alphanumeric();
    }
    Value::Text(out)
}

fn word(_env: &Environment, text: &str, index: i64) -> Value {
    let words = tokenize(text);
    let offset = if index < 0 { index + words.len() as i64 } else { index };
    if offset >= 0 && (offset as usize) < words.len() {
        Value::text(words[offset as usize].clone())
    } else {
        Value::error(format!(
            "index {} is out of range for the number of words {}",
            index,
            words.len()
        ))
    }
}

fn remove_first_word(_env: &Environment, text: &str) -> Value {
    let words = tokenize(text);
    if words.len() > 1 {
        Value::Text(words[1..].join(" "))
    } else {
        Value::text("")
    }
}

fn word_count(_env: &Environment, text: &str) -> Value {
    Value::Number(Decimal::from(tokenize(text).len()))
}

/// Joins the words spanning `start` up to but not including `end`; a
/// negative or absent end means everything after the start.
fn word_slice(env: &Environment, args: &[Value]) -> Value {
    let text = try_value!(types::to_text(env, &args[0]));
    let start = try_value!(types::to_integer(env, &args[1]));
    if start < 0 {
        return Value::error("must start with a positive index");
    }
    let end = if args.len() == 3 {
        try_value!(types::to_integer(env, &args[2]))
    } else {
        -1
    };
    if end > 0 && end <= start {
        return Value::error("must have a end which is greater than the start");
    }

    let words = tokenize(&text);
    let start = start as usize;
    if start >= words.len() {
        return Value::text("");
    }
    let end = if end > 0 { (end as usize).min(words.len()) } else { words.len() };
    Value::Text(words[start..end].join(" "))
}

fn field(env: &Environment, args: &[Value]) -> Value {
    let source = try_value!(types::to_text(env, &args[0]));
    let index = try_value!(types::to_integer(env, &args[1]));
    if index < 0 {
        return Value::error("cannot use a negative index to field");
    }
    let sep = try_value!(types::to_text(env, &args[2]));

    // a space delimiter means any run of whitespace
    let fields: Vec<&str> = if sep == " " {
        source.split(' ').filter(|f| !f.is_empty()).collect()
    } else {
        source.split(sep.as_str()).collect()
    };
    match fields.get(index as usize) {
        Some(f) => Value::Text(f.trim().to_string()),
        None => Value::text(""),
    }
}

static NON_PRINTABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{Cc}\p{C}]").expect("valid class"));

fn clean(_env: &Environment, text: &str) -> Value {
    Value::Text(NON_PRINTABLE.replace_all(text, "").into_owned())
}

fn left(_env: &Environment, text: &str, count: i64) -> Value {
    if count < 0 {
        return Value::error("can't take a negative count");
    }
    Value::Text(text.chars().take(count as usize).collect())
}

fn right(_env: &Environment, text: &str, count: i64) -> Value {
    if count < 0 {
        return Value::error("can't take a negative count");
    }
    let total = text.chars().count();
    Value::Text(text.chars().skip(total.saturating_sub(count as usize)).collect())
}

fn lower(_env: &Environment, text: &str) -> Value {
    Value::Text(text.to_lowercase())
}

fn upper(_env: &Environment, text: &str) -> Value {
    Value::Text(text.to_uppercase())
}

fn text_compare(_env: &Environment, a: &str, b: &str) -> Value {
    Value::Number(Decimal::from(match a.cmp(b) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }))
}

fn repeat(_env: &Environment, text: &str, count: i64) -> Value {
    if count < 0 {
        return Value::error(format!("must be called with a positive integer, got {}", count));
    }
    Value::Text(text.repeat(count as usize))
}

fn replace(_env: &Environment, text: &str, needle: &str, replacement: &str) -> Value {
    Value::Text(text.replace(needle, replacement))
}

fn percent(_env: &Environment, num: Decimal) -> Value {
    let pct = round_at(num * Decimal::from(100), 0);
    Value::Text(format!("{}%", pct.normalize()))
}

/// Percent-encodes for use as a URL query parameter: spaces become `+`,
/// everything outside the unreserved set becomes `%XX`.
fn url_encode(_env: &Environment, text: &str) -> Value {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    Value::Text(out)
}

// ──────────────────────────────────────────────
// Numbers
// ──────────────────────────────────────────────

fn abs(_env: &Environment, num: Decimal) -> Value {
    Value::Number(num.abs())
}

fn round(_env: &Environment, num: Decimal, places: i64) -> Value {
    Value::Number(round_at(num, places))
}

fn round_up(_env: &Environment, num: Decimal, places: i64) -> Value {
    if round_at(num, places) == num {
        return Value::Number(num);
    }
    let half = Decimal::from(5) * dec_pow10(-places - 1);
    Value::Number(round_at(num + half, places))
}

fn round_down(_env: &Environment, num: Decimal, places: i64) -> Value {
    if round_at(num, places) == num {
        return Value::Number(num);
    }
    let half = Decimal::from(5) * dec_pow10(-places - 1);
    Value::Number(round_at(num - half, places))
}

fn max(env: &Environment, args: &[Value]) -> Value {
    let mut best = try_value!(types::to_number(env, &args[0]));
    for arg in &args[1..] {
        let val = try_value!(types::to_number(env, arg));
        if val > best {
            best = val;
        }
    }
    Value::Number(best)
}

fn min(env: &Environment, args: &[Value]) -> Value {
    let mut best = try_value!(types::to_number(env, &args[0]));
    for arg in &args[1..] {
        let val = try_value!(types::to_number(env, arg));
        if val < best {
            best = val;
        }
    }
    Value::Number(best)
}

fn mean(env: &Environment, args: &[Value]) -> Value {
    let mut sum = Decimal::ZERO;
    for arg in args {
        sum += try_value!(types::to_number(env, arg));
    }
    Value::Number(sum / Decimal::from(args.len()))
}

fn mod_(_env: &Environment, a: Decimal, b: Decimal) -> Value {
    match a.checked_rem(b) {
        Some(r) => Value::Number(r),
        None => Value::error("division by zero"),
    }
}

fn rand_(_env: &Environment) -> Value {
    Value::Number(random::random_decimal())
}

/// A uniform random integer on the inclusive [min, max] range.
fn rand_between(_env: &Environment, min: Decimal, max: Decimal) -> Value {
    let span = (max - min) + Decimal::ONE;
    let val = (random::random_decimal() * span + min).floor();
    Value::Number(val)
}

// ──────────────────────────────────────────────
// Date and time
// ──────────────────────────────────────────────

fn parse_datetime(env: &Environment, args: &[Value]) -> Value {
    let text = try_value!(types::to_text(env, &args[0]));
    let format = try_value!(types::to_text(env, &args[1]));
    let tz = if args.len() == 3 {
        let name = try_value!(types::to_text(env, &args[2]));
        match name.parse::<chrono_tz::Tz>() {
            Ok(tz) => tz,
            Err(_) => return Value::error(format!("unknown timezone '{}'", name)),
        }
    } else {
        env.timezone
    };
    match dates::parse_with_format(&text, &format, tz) {
        Ok(d) => Value::DateTime(d),
        Err(msg) => Value::error(msg),
    }
}

/// Month must be 1-12; the day deliberately overflows forward, so
/// (2017, 2, 31) normalizes to March 3rd.
fn datetime_from_parts(env: &Environment, args: &[Value]) -> Value {
    let year = try_value!(types::to_integer(env, &args[0]));
    let month = try_value!(types::to_integer(env, &args[1]));
    if !(1..=12).contains(&month) {
        return Value::error("invalid value for month, must be 1-12");
    }
    let day = try_value!(types::to_integer(env, &args[2]));
    match dates::date_from_parts(env, year, month, day) {
        Some(d) => Value::DateTime(d),
        None => Value::error(format!("invalid date {}-{}-{}", year, month, day)),
    }
}

/// Seconds, minutes and hours truncate the signed instant difference;
/// days and weeks count civil calendar days; months and years are calendar
/// component differences.
fn datetime_diff(env: &Environment, args: &[Value]) -> Value {
    let date1 = try_value!(types::to_datetime(env, &args[0]));
    let date2 = try_value!(types::to_datetime(env, &args[1]));
    let unit = try_value!(types::to_text(env, &args[2]));

    let duration = date1.instant().signed_duration_since(date2.instant());
    let n = match unit.as_str() {
        "s" => duration.num_seconds(),
        "m" => duration.num_minutes(),
        "h" => duration.num_hours(),
        "D" => dates::days_between(&date1, &date2),
        "W" => dates::days_between(&date1, &date2) / 7,
        "M" => dates::months_between(&date1, &date2),
        "Y" => (date1.instant().year() - date2.instant().year()) as i64,
        other => {
            return Value::error(format!(
                "unknown unit: {}, must be one of s, m, h, D, W, M, Y",
                other
            ))
        }
    };
    Value::Number(Decimal::from(n))
}

fn datetime_add(env: &Environment, args: &[Value]) -> Value {
    let date = try_value!(types::to_datetime(env, &args[0]));
    let offset = try_value!(types::to_integer(env, &args[1]));
    let unit = try_value!(types::to_text(env, &args[2]));

    let added = match unit.as_str() {
        "s" => shift(&date, Duration::seconds(offset)),
        "m" => shift(&date, Duration::minutes(offset)),
        "h" => shift(&date, Duration::hours(offset)),
        "D" => dates::add_date(&date, 0, 0, offset),
        "W" => dates::add_date(&date, 0, 0, offset * 7),
        "M" => dates::add_date(&date, 0, offset, 0),
        "Y" => dates::add_date(&date, offset, 0, 0),
        other => {
            return Value::error(format!(
                "unknown unit: {}, must be one of s, m, h, D, W, M, Y",
                other
            ))
        }
    };
    match added {
        Some(d) => Value::DateTime(d),
        None => Value::error("datetime out of range"),
    }
}

fn shift(date: &XDateTime, duration: Duration) -> Option<XDateTime> {
    let instant = date.instant().checked_add_signed(duration)?;
    Some(match date.zone() {
        Some(tz) => XDateTime::in_zone(instant.with_timezone(&chrono::Utc), tz),
        None => XDateTime::new(instant),
    })
}

/// The day of the week, 0 for Sunday through 6 for Saturday.
fn weekday(_env: &Environment, date: XDateTime) -> Value {
    Value::Number(Decimal::from(date.instant().weekday().num_days_from_sunday()))
}

fn tz(_env: &Environment, date: XDateTime) -> Value {
    Value::Text(date.zone_name())
}

fn tz_offset(_env: &Environment, date: XDateTime) -> Value {
    Value::Text(date.instant().format("%z").to_string())
}

fn today(env: &Environment) -> Value {
    Value::DateTime(dates::today(env))
}

fn now(env: &Environment) -> Value {
    Value::DateTime(env.now())
}

fn from_epoch(env: &Environment, num: Decimal) -> Value {
    let nanos = try_value!(types::to_integer(env, &Value::Number(num)));
    let instant = chrono::DateTime::from_timestamp_nanos(nanos);
    Value::DateTime(XDateTime::in_zone(instant, env.timezone))
}

fn to_epoch(_env: &Environment, date: XDateTime) -> Value {
    match date.instant().timestamp_nanos_opt() {
        Some(nanos) => Value::Number(Decimal::from(nanos)),
        None => Value::error("datetime out of epoch range"),
    }
}

// ──────────────────────────────────────────────
// JSON
// ──────────────────────────────────────────────

fn json(_env: &Environment, value: &Value) -> Value {
    match types::to_json_text(value) {
        Ok(text) => Value::Text(text),
        Err(e) => e,
    }
}

fn parse_json(_env: &Environment, text: &str) -> Value {
    types::parse_json(text)
}

// ──────────────────────────────────────────────
// Formatting
// ──────────────────────────────────────────────

fn format_datetime(env: &Environment, args: &[Value]) -> Value {
    let mut date = try_value!(types::to_datetime(env, &args[0]));
    let format = if args.len() >= 2 {
        try_value!(types::to_text(env, &args[1]))
    } else {
        dates::default_format(env)
    };
    if args.len() == 3 {
        let name = try_value!(types::to_text(env, &args[2]));
        match name.parse::<chrono_tz::Tz>() {
            Ok(tz) => date = date.with_zone(tz),
            Err(_) => return Value::error(format!("unknown timezone '{}'", name)),
        }
    }
    match dates::format_with_format(&date, &format) {
        Ok(text) => Value::Text(text),
        Err(msg) => Value::error(msg),
    }
}

fn format_location(_env: &Environment, path: &str) -> Value {
    let last = path.split('>').next_back().unwrap_or("");
    Value::Text(last.trim().to_string())
}

fn format_number(env: &Environment, args: &[Value]) -> Value {
    let num = try_value!(types::to_number(env, &args[0]));
    let places = if args.len() > 1 {
        let p = try_value!(types::to_integer(env, &args[1]));
        if !(0..=9).contains(&p) {
            return Value::error(format!("must take 0-9 number of places, got {}", p));
        }
        p
    } else {
        2
    };
    let commas = if args.len() > 2 {
        try_value!(types::to_boolean(env, &args[2]))
    } else {
        true
    };

    let rounded = round_at(num, places);
    let raw = rounded.abs().to_string();
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i.to_string(), f.to_string()),
        None => (raw, String::new()),
    };

    let mut int_out = String::new();
    if commas {
        let digits: Vec<char> = int_part.chars().collect();
        for (i, c) in digits.iter().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                int_out.push(',');
            }
            int_out.push(*c);
        }
    } else {
        int_out = int_part;
    }

    let mut out = String::new();
    if rounded.is_sign_negative() && !rounded.is_zero() {
        out.push('-');
    }
    out.push_str(&int_out);
    if places > 0 {
        let mut frac = frac_part;
        frac.truncate(places as usize);
        while frac.len() < places as usize {
            frac.push('0');
        }
        out.push('.');
        out.push_str(&frac);
    }
    Value::Text(out)
}

/// Formats a URN as human friendly text. Accepts an indexable (the first
/// item is used) or a scalar.
fn format_urn(env: &Environment, args: &[Value]) -> Value {
    let urn_arg = match args[0].reduce() {
        Value::Array(items) => match items.first() {
            Some(first) => first.clone(),
            None => return Value::text(""),
        },
        other => other.clone(),
    };
    let urn_text = try_value!(types::to_text(env, &urn_arg));
    match urns::parse(&urn_text) {
        Ok(urn) => Value::Text(urn.format()),
        Err(err) => Value::error(format!("{} is not a valid URN: {}", urn_text, err)),
    }
}

// ──────────────────────────────────────────────
// Utility
// ──────────────────────────────────────────────

fn length(_env: &Environment, value: &Value) -> Value {
    match value.reduce() {
        Value::Error(_) => value.reduce().clone(),
        other => match other.length() {
            Some(len) => Value::Number(Decimal::from(len)),
            None => Value::error("value doesn't have length"),
        },
    }
}

/// Returns `test` unless it is empty or an error, in which case `fallback`.
fn default_(_env: &Environment, test: &Value, fallback: &Value) -> Value {
    if test.is_error() || test.is_empty() {
        fallback.clone()
    } else {
        test.clone()
    }
}

/// The legacy `+` operator: a datetime on either side turns the other into
/// a day count (bounded to 32 bits); otherwise plain decimal addition.
fn legacy_add(env: &Environment, arg1: &Value, arg2: &Value) -> Value {
    let date1 = types::to_datetime(env, arg1);
    let date2 = types::to_datetime(env, arg2);
    let num1 = types::to_number(env, arg1);
    let num2 = types::to_number(env, arg2);

    if date1.is_ok() && date2.is_ok() {
        return Value::error("cannot operate on two dates");
    }

    if let (Ok(date), Ok(num)) = (&date1, &num2) {
        return add_days_bounded(date, *num);
    }
    if let (Ok(date), Ok(num)) = (&date2, &num1) {
        return add_days_bounded(date, *num);
    }

    let a = try_value!(num1);
    let b = try_value!(num2);
    Value::Number(a + b)
}

fn add_days_bounded(date: &XDateTime, num: Decimal) -> Value {
    let days = match num.trunc().to_i64() {
        Some(d) if (i32::MIN as i64..=i32::MAX as i64).contains(&d) => d,
        _ => return Value::error("cannot operate on integers greater than 32 bit"),
    };
    match dates::add_date(date, 0, 0, days) {
        Some(d) => Value::DateTime(d),
        None => Value::error("datetime out of range"),
    }
}

/// Splits text into spoken groups for voice channels: threes when the
/// length divides by 3, fours when by 4, otherwise one at a time.
fn read_chars(_env: &Environment, text: &str) -> Value {
    let trimmed = text.trim_start_matches('+');
    let chars: Vec<char> = trimmed.chars().collect();

    let group = if !chars.is_empty() && chars.len() % 3 == 0 {
        3
    } else if !chars.is_empty() && chars.len() % 4 == 0 {
        4
    } else {
        1
    };

    let groups: Vec<String> = chars
        .chunks(group)
        .map(|chunk| chunk.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" "))
        .collect();
    Value::Text(groups.join(" , "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::DateFormat;
    use std::str::FromStr;

    fn env() -> Environment {
        Environment::default()
    }

    fn call(name: &str, args: &[Value]) -> Value {
        super::super::call(&env(), name, args)
    }

    fn text_of(v: Value) -> String {
        types::to_text(&env(), &v).unwrap()
    }

    fn num(s: &str) -> Value {
        Value::Number(Decimal::from_str(s).unwrap())
    }

    // ── text ──────────────────────────────────

    #[test]
    fn word_functions_tokenize_like_the_tokenizer() {
        assert_eq!(call("word", &[Value::text("bee.cat,dog"), num("1")]), Value::text("cat"));
        assert_eq!(call("word", &[Value::text("bee.cat,dog"), num("-1")]), Value::text("dog"));
        assert_eq!(call("word_count", &[Value::text("😀😃😄😁")]), num("4"));
        assert_eq!(call("word_count", &[Value::text("")]), num("0"));
        assert_eq!(
            call("word_slice", &[Value::text("bee cat dog"), num("1"), num("-1")]),
            Value::text("cat dog")
        );
        assert_eq!(
            call("word_slice", &[Value::text("bee cat dog"), num("0"), num("2")]),
            Value::text("bee cat")
        );
        assert_eq!(
            call("remove_first_word", &[Value::text("foo bar")]),
            Value::text("bar")
        );
    }

    #[test]
    fn left_right_respect_characters_not_bytes() {
        assert_eq!(call("left", &[Value::text("😀😃😄😁"), num("2")]), Value::text("😀😃"));
        assert_eq!(call("right", &[Value::text("😀😃😄😁"), num("2")]), Value::text("😄😁"));
        assert!(call("left", &[Value::text("hello"), num("-1")]).is_error());
    }

    #[test]
    fn field_collapses_whitespace_for_space_delimiter() {
        assert_eq!(
            call("field", &[Value::text("a,b,c"), num("1"), Value::text(",")]),
            Value::text("b")
        );
        assert_eq!(
            call("field", &[Value::text("a   b c"), num("1"), Value::text(" ")]),
            Value::text("b")
        );
        assert_eq!(
            call("field", &[Value::text("a,,b,c"), num("1"), Value::text(",")]),
            Value::text("")
        );
    }

    #[test]
    fn misc_text_functions() {
        assert_eq!(call("title", &[Value::text("ryan lewis")]), Value::text("Ryan Lewis"));
        assert_eq!(call("clean", &[Value::text("😃 Hello \nwo\tr\rld")]), Value::text("😃 Hello world"));
        assert_eq!(call("code", &[Value::text("😀")]), num("128512"));
        assert_eq!(call("char", &[num("33")]), Value::text("!"));
        assert_eq!(call("url_encode", &[Value::text("two words")]), Value::text("two+words"));
        assert_eq!(call("percent", &[num("0.54234")]), Value::text("54%"));
        assert_eq!(call("repeat", &[Value::text("*"), num("8")]), Value::text("********"));
        assert_eq!(
            call("split", &[Value::text("a.b.c."), Value::text(".")]),
            Value::Array(vec![Value::text("a"), Value::text("b"), Value::text("c")])
        );
        assert_eq!(
            call("join", &[
                Value::Array(vec![Value::text("a"), Value::text("b"), Value::text("c")]),
                Value::text("|")
            ]),
            Value::text("a|b|c")
        );
    }

    // ── numbers ───────────────────────────────

    #[test]
    fn rounding_half_away_from_zero() {
        assert_eq!(call("round", &[num("12.141"), num("2")]), num("12.14"));
        assert_eq!(call("round", &[num("12.146"), num("2")]), num("12.15"));
        assert_eq!(call("round", &[num("12.6")]), num("13"));
        assert_eq!(call("round", &[num("12.146"), num("-1")]), num("10"));
        assert_eq!(call("round_up", &[num("12.141"), num("2")]), num("12.15"));
        assert_eq!(call("round_up", &[num("12")]), num("12"));
        assert_eq!(call("round_down", &[num("12.6")]), num("12"));
        assert_eq!(call("round_down", &[num("12.146"), num("2")]), num("12.14"));
    }

    #[test]
    fn aggregates() {
        assert_eq!(call("max", &[num("1"), num("-1"), num("10")]), num("10"));
        assert_eq!(call("min", &[num("2"), num("2"), num("-10")]), num("-10"));
        assert_eq!(call("mean", &[num("1"), num("2"), num("6")]), num("3"));
        assert_eq!(call("mod", &[num("5"), num("2")]), num("1"));
        assert!(call("max", &[num("1"), Value::text("foo")]).is_error());
    }

    #[test]
    fn random_functions_are_seedable() {
        let _guard = crate::random::seeded_scope(42);
        let a = call("rand", &[]);
        let b = call("rand_between", &[num("1"), num("10")]);
        if let Value::Number(n) = a {
            assert!(n >= Decimal::ZERO && n < Decimal::ONE);
        } else {
            panic!("rand() did not return a number");
        }
        if let Value::Number(n) = b {
            assert!(n >= Decimal::from(1) && n <= Decimal::from(10));
            assert!(n.fract().is_zero());
        } else {
            panic!("rand_between() did not return a number");
        }
    }

    // ── datetimes ─────────────────────────────

    fn ny_env() -> Environment {
        Environment::default().with_timezone(chrono_tz::America::New_York)
    }

    #[test]
    fn datetime_parts_and_overflow() {
        let e = ny_env();
        let d = super::super::call(&e, "datetime_from_parts", &[num("2017"), num("1"), num("15")]);
        assert_eq!(text_of(d), "2017-01-15T00:00:00.000000-05:00");

        let d = super::super::call(&e, "datetime_from_parts", &[num("2017"), num("2"), num("31")]);
        assert_eq!(text_of(d), "2017-03-03T00:00:00.000000-05:00");

        assert!(super::super::call(&e, "datetime_from_parts", &[num("2017"), num("13"), num("15")])
            .is_error());
    }

    #[test]
    fn datetime_diff_units() {
        let args = |a: &str, b: &str, unit: &str| {
            vec![Value::text(a), Value::text(b), Value::text(unit)]
        };
        assert_eq!(call("datetime_diff", &args("2017-01-17", "2017-01-15", "D")), num("2"));
        assert_eq!(call("datetime_diff", &args("2017-01-17", "2015-12-17", "Y")), num("2"));
        assert_eq!(
            call("datetime_diff", &args("2017-01-17 10:50", "2017-01-17 12:30", "h")),
            num("-1")
        );
        assert_eq!(call("datetime_diff", &args("2017-01-28", "2017-01-15", "W")), num("1"));
        assert!(call("datetime_diff", &args("2017-01-17", "2017-01-15", "x")).is_error());
    }

    #[test]
    fn datetime_add_days_in_environment_zone() {
        let e = ny_env();
        let d = super::super::call(
            &e,
            "datetime_add",
            &[Value::text("2017-01-15"), num("5"), Value::text("D")],
        );
        assert_eq!(text_of(d), "2017-01-20T00:00:00.000000-05:00");

        let d = super::super::call(
            &e,
            "datetime_add",
            &[Value::text("2017-01-15 10:45"), num("30"), Value::text("m")],
        );
        assert_eq!(text_of(d), "2017-01-15T11:15:00.000000-05:00");
    }

    #[test]
    fn epoch_conversions_are_nanoseconds() {
        let e = ny_env();
        let d = super::super::call(&e, "from_epoch", &[num("1497286619000000000")]);
        assert_eq!(text_of(d), "2017-06-12T12:56:59.000000-04:00");
        let n = super::super::call(&e, "to_epoch", &[Value::text("2017-06-12T15:56:59.000000Z")]);
        assert_eq!(n, num("1497283019000000000"));
    }

    #[test]
    fn weekday_and_zone_reporting() {
        assert_eq!(call("weekday", &[Value::text("2017-01-15")]), num("0"));
        assert_eq!(call("tz", &[Value::text("2017-01-15T02:15:18.123456Z")]), Value::text("UTC"));
        assert_eq!(
            call("tz_offset", &[Value::text("2017-01-15T02:15:18.123456Z")]),
            Value::text("+0000")
        );
    }

    // ── formatting ────────────────────────────

    #[test]
    fn format_number_places_and_commas() {
        assert_eq!(call("format_number", &[num("31337")]), Value::text("31,337.00"));
        assert_eq!(
            call("format_number", &[num("31337"), num("0"), Value::Boolean(false)]),
            Value::text("31337")
        );
        assert_eq!(
            call("format_number", &[num("1234567.891"), num("2")]),
            Value::text("1,234,567.89")
        );
        assert!(call("format_number", &[num("1"), num("10")]).is_error());
    }

    #[test]
    fn format_datetime_defaults_to_environment() {
        let e = Environment::default()
            .with_timezone(chrono_tz::America::Guayaquil)
            .with_date_format(DateFormat::YearMonthDay);
        let d = super::super::call(
            &e,
            "format_datetime",
            &[Value::text("1979-07-18T15:00:00.000000Z")],
        );
        assert_eq!(d, Value::text("1979-07-18 10:00"));

        let d = super::super::call(
            &e,
            "format_datetime",
            &[Value::text("1979-07-18T15:00:00.000000Z"), Value::text("M")],
        );
        assert_eq!(d, Value::text("7"));
    }

    #[test]
    fn format_location_takes_last_segment() {
        assert_eq!(call("format_location", &[Value::text("Rwanda")]), Value::text("Rwanda"));
        assert_eq!(
            call("format_location", &[Value::text("Rwanda > Kigali")]),
            Value::text("Kigali")
        );
    }

    #[test]
    fn format_urn_accepts_scalar_or_indexable() {
        assert_eq!(
            call("format_urn", &[Value::text("twitter:134252511151#billy_bob")]),
            Value::text("billy_bob")
        );
        let list = Value::Array(vec![Value::text("mailto:foo@bar.com")]);
        assert_eq!(call("format_urn", &[list]), Value::text("foo@bar.com"));
        assert!(call("format_urn", &[Value::text("NOT URN")]).is_error());
        assert_eq!(call("format_urn", &[Value::Array(vec![])]), Value::text(""));
    }

    // ── utility ───────────────────────────────

    #[test]
    fn length_counts_chars_items_and_entries() {
        assert_eq!(call("length", &[Value::text("😀😃😄😁")]), num("4"));
        assert_eq!(call("length", &[Value::Array(vec![])]), num("0"));
        assert!(call("length", &[num("1234")]).is_error());
    }

    #[test]
    fn default_replaces_empty_and_errors() {
        assert_eq!(
            call("default", &[Value::error("nope"), Value::text("fallback")]),
            Value::text("fallback")
        );
        assert_eq!(
            call("default", &[Value::text(""), Value::text("value")]),
            Value::text("value")
        );
        assert_eq!(
            call("default", &[Value::text("10"), Value::text("20")]),
            Value::text("10")
        );
        assert_eq!(
            call("default", &[Value::Array(vec![]), Value::text("value")]),
            Value::text("value")
        );
    }

    #[test]
    fn legacy_add_dispatches_on_dates() {
        let e = ny_env();
        let d = super::super::call(
            &e,
            "legacy_add",
            &[Value::text("2017-01-15"), num("2")],
        );
        assert_eq!(text_of(d), "2017-01-17T00:00:00.000000-05:00");
        assert_eq!(call("legacy_add", &[num("2"), num("3")]), num("5"));
        assert!(call(
            "legacy_add",
            &[Value::text("2017-01-15"), Value::text("2017-01-16")]
        )
        .is_error());
        assert!(call("legacy_add", &[Value::text("2017-01-15"), num("99999999999")]).is_error());
    }

    #[test]
    fn read_chars_groups_by_three_then_four() {
        assert_eq!(call("read_chars", &[Value::text("1234")]), Value::text("1 2 3 4"));
        assert_eq!(call("read_chars", &[Value::text("abc")]), Value::text("a b c"));
        assert_eq!(call("read_chars", &[Value::text("abcdef")]), Value::text("a b c , d e f"));
        assert_eq!(call("read_chars", &[Value::text("+253")]), Value::text("2 5 3"));
    }
}
