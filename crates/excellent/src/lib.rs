//! Excellent — the expression language embedded in flow templates.
//!
//! Templates mix literal text with expressions behind an `@` sigil. The
//! evaluator resolves references against a context value tree, calls
//! registered functions, and reduces every failure to an error *value*
//! rather than aborting: template evaluation always produces a string.

pub mod dates;
pub mod envs;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod migration;
pub mod parser;
pub mod random;
pub mod template;
pub mod types;
pub mod urns;

pub use envs::{DateFormat, Environment, RedactionPolicy, TimeFormat};
pub use eval::{evaluate, evaluate_expression};
pub use template::{evaluate_template, evaluate_template_value};
pub use types::{ObjectValue, Value, XDateTime};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::object;

    // end to end checks that mirror how the flow runtime drives templates

    #[test]
    fn template_evaluation_end_to_end() {
        let env = Environment::default();
        let ctx = object(vec![(
            "contact",
            object(vec![("name", Value::text("Bob"))]),
        )]);

        assert_eq!(evaluate_template(&env, &ctx, r#"@(length("😀😃😄😁"))"#), "4");
        assert_eq!(
            evaluate_template(&env, &ctx, r#"@(word_slice("bee cat dog", 1, -1))"#),
            "cat dog"
        );
        assert_eq!(evaluate_template(&env, &ctx, "@(format_number(31337))"), "31,337.00");
        assert_eq!(
            evaluate_template(&env, &ctx, "@(format_number(31337, 0, false))"),
            "31337"
        );
        assert_eq!(
            evaluate_template(&env, &ctx, r#"@(datetime_diff("2017-01-17", "2015-12-17", "Y"))"#),
            "2"
        );
    }

    #[test]
    fn datetime_add_renders_in_environment_zone() {
        let env = Environment::default().with_timezone(chrono_tz::America::New_York);
        let ctx = object(vec![]);
        assert_eq!(
            evaluate_template(&env, &ctx, r#"@(datetime_add("2017-01-15", 5, "D"))"#),
            "2017-01-20T00:00:00.000000-05:00"
        );
    }

    #[test]
    fn templates_never_fail() {
        let env = Environment::default();
        let ctx = object(vec![]);
        for template in [
            "@(1 / 0)",
            "@nothing.here",
            "@(bogus_fn(1))",
            "@(",
            "@(unterminated",
            "@((()))",
            "@",
            "plain text",
        ] {
            // output is always a valid string, errors collapse to empty
            let _ = evaluate_template(&env, &ctx, template);
        }
        assert_eq!(evaluate_template(&env, &ctx, "@(1 / 0)"), "");
        assert_eq!(evaluate_template(&env, &ctx, "x@nothing.here!"), "x!");
    }
}
