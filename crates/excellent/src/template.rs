//! Template scanning and evaluation.
//!
//! A template is a sequence of literal runs and expressions. An expression
//! begins with `@`: the bare form `@contact.name` is greedy over word
//! characters and dots, the parenthesized form `@(expr)` supports the whole
//! grammar. `@@` emits a literal `@`.

use crate::envs::Environment;
use crate::eval::evaluate_expression;
use crate::types::{self, Value};

/// One piece of a scanned template.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    /// A bare `@path` reference; the text excludes the sigil.
    Reference(String),
    /// A parenthesized `@(expr)`; the text excludes the sigil and parens.
    Expression(String),
}

/// Scans a template into literal runs and expressions.
pub fn scan(template: &str) -> Vec<Segment> {
    let chars: Vec<char> = template.chars().collect();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut pos = 0usize;

    while pos < chars.len() {
        if chars[pos] != '@' {
            literal.push(chars[pos]);
            pos += 1;
            continue;
        }

        // @@ is an escaped sigil
        if pos + 1 < chars.len() && chars[pos + 1] == '@' {
            literal.push('@');
            pos += 2;
            continue;
        }

        // @( ... ) with balanced, quote-aware parens
        if pos + 1 < chars.len() && chars[pos + 1] == '(' {
            if let Some((body, consumed)) = scan_parenthesized(&chars[pos + 1..]) {
                flush(&mut segments, &mut literal);
                segments.push(Segment::Expression(body));
                pos += 1 + consumed;
                continue;
            }
            // unbalanced — treat the sigil as literal text
            literal.push('@');
            pos += 1;
            continue;
        }

        // bare @path: word characters and dots, trailing dots excluded
        let start = pos + 1;
        let mut end = start;
        while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_' || chars[end] == '.') {
            end += 1;
        }
        let mut path_end = end;
        while path_end > start && chars[path_end - 1] == '.' {
            path_end -= 1;
        }
        if path_end == start {
            literal.push('@');
            pos += 1;
            continue;
        }
        flush(&mut segments, &mut literal);
        segments.push(Segment::Reference(chars[start..path_end].iter().collect()));
        pos = path_end;
    }

    flush(&mut segments, &mut literal);
    segments
}

fn flush(segments: &mut Vec<Segment>, literal: &mut String) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

/// Scans `( ... )` starting at an opening paren, honoring nesting and text
/// literals. Returns the body and the number of chars consumed including
/// both parens.
fn scan_parenthesized(chars: &[char]) -> Option<(String, usize)> {
    let mut depth = 0usize;
    let mut in_text = false;
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '"' => in_text = !in_text,
            '(' if !in_text => depth += 1,
            ')' if !in_text => {
                depth -= 1;
                if depth == 0 {
                    return Some((chars[1..i].iter().collect(), i + 1));
                }
            }
            _ => {}
        }
    }
    None
}

/// Evaluates a template against a context, concatenating literal runs with
/// the text reductions of expression results. Error values reduce to empty
/// text; the output is always a complete string.
pub fn evaluate_template(env: &Environment, context: &Value, template: &str) -> String {
    let mut out = String::new();
    for segment in scan(template) {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Reference(path) | Segment::Expression(path) => {
                let value = evaluate_expression(env, context, &path);
                if let Ok(text) = types::to_text(env, &value) {
                    out.push_str(&text);
                }
            }
        }
    }
    out
}

/// Evaluates a template expected to be a single expression, returning the
/// raw value rather than text. Used for router operands.
pub fn evaluate_template_value(env: &Environment, context: &Value, template: &str) -> Value {
    let segments = scan(template);
    match segments.as_slice() {
        [Segment::Reference(path)] | [Segment::Expression(path)] => {
            evaluate_expression(env, context, path)
        }
        _ => Value::Text(evaluate_template(env, context, template)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::object;
    use rust_decimal::Decimal;

    fn ctx() -> Value {
        object(vec![(
            "contact",
            object(vec![("name", Value::text("Ryan Lewis"))]),
        )])
    }

    #[test]
    fn scans_literals_references_and_expressions() {
        let segments = scan("Hi @contact.name, you have @(1 + 2) points. a@@b.com");
        assert_eq!(
            segments,
            vec![
                Segment::Literal("Hi ".to_string()),
                Segment::Reference("contact.name".to_string()),
                Segment::Literal(", you have ".to_string()),
                Segment::Expression("1 + 2".to_string()),
                Segment::Literal(" points. a@b.com".to_string()),
            ]
        );
    }

    #[test]
    fn bare_references_stop_at_non_word_chars() {
        assert_eq!(
            scan("@contact.name."),
            vec![
                Segment::Reference("contact.name".to_string()),
                Segment::Literal(".".to_string()),
            ]
        );
        assert_eq!(scan("email me @ home"), vec![Segment::Literal("email me @ home".to_string())]);
    }

    #[test]
    fn parens_respect_nesting_and_quotes() {
        assert_eq!(
            scan(r#"@(title("a)b"))"#),
            vec![Segment::Expression(r#"title("a)b")"#.to_string())]
        );
        // unbalanced parens fall back to literal text
        assert_eq!(
            scan("@(1 + 2"),
            vec![Segment::Literal("@(1 + 2".to_string())]
        );
    }

    #[test]
    fn evaluation_concatenates_and_drops_errors() {
        let env = Environment::default();
        let out = evaluate_template(&env, &ctx(), "Hi @contact.name, @contact.missing you");
        assert_eq!(out, "Hi Ryan Lewis,  you");
    }

    #[test]
    fn single_expression_templates_keep_their_value() {
        let env = Environment::default();
        let v = evaluate_template_value(&env, &ctx(), "@(1 + 2)");
        assert_eq!(v, Value::number(Decimal::from(3)));
        let v = evaluate_template_value(&env, &ctx(), "x@(1 + 2)");
        assert_eq!(v, Value::text("x3"));
    }
}
