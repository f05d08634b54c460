//! Migration of legacy templates into the current expression syntax.
//!
//! The rewrite is rule driven: identifier paths resolve through a tree of
//! variable mappers, yielding replacement expression text rather than a
//! value. Top-level identifiers are a closed set; anything else stays as
//! literal text.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::parser::{parse, BinOp, Expr};
use crate::template::{scan, Segment};
use crate::urns::VALID_SCHEMES;

/// The allowed top-level identifiers in legacy expressions: `@contact.bar`
/// is migratable but `@foo.bar` isn't.
pub const CONTEXT_TOP_LEVELS: &[&str] =
    &["channel", "child", "contact", "date", "extra", "flow", "parent", "step"];

/// How `@extra.*` references migrate, configured per flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraAs {
    WebhookJson,
    TriggerParams,
    Function,
}

// ──────────────────────────────────────────────
// Variable mappers
// ──────────────────────────────────────────────

/// A fixed sub-key maps to a path suffix, a nested mapper, or the
/// flow-configured extra mapper.
#[derive(Debug, Clone)]
enum BaseVar {
    Suffix(&'static str),
    Mapper(VarMapper),
    Extra(ExtraAs),
}

#[derive(Debug, Clone, Default)]
struct VarMapper {
    /// keys replaced completely with the given expression text; the
    /// `__default__` entry renders the mapper itself
    substitutions: HashMap<&'static str, String>,
    /// base for fixed sub-keys, e.g. "contact"
    base: String,
    /// recognized fixed sub-keys, e.g. "name" or "uuid"
    base_vars: HashMap<&'static str, BaseVar>,
    /// nesting for arbitrary sub-keys, e.g. contact fields or run results
    arbitrary_nesting: String,
    /// suffixes reused for each arbitrary child
    arbitrary_vars: HashMap<&'static str, &'static str>,
}

/// The result of resolving one path segment.
#[derive(Debug, Clone)]
enum Mapped {
    Path(String),
    Mapper(VarMapper),
    Extra(ExtraMapper),
}

impl VarMapper {
    /// Returns a copy of this mapper with a prefix applied to the base.
    fn rebase(&self, prefix: &str) -> VarMapper {
        let mut rebased = self.clone();
        if !prefix.is_empty() {
            rebased.base = if self.base.is_empty() {
                prefix.to_string()
            } else {
                format!("{}.{}", prefix, self.base)
            };
        }
        rebased
    }

    fn resolve(&self, key: &str) -> Mapped {
        let key = key.to_lowercase();

        // a complete substitution?
        if let Some(substitute) = self.substitutions.get(key.as_str()) {
            return Mapped::Path(substitute.clone());
        }

        let mut new_path = Vec::new();
        if !self.base.is_empty() {
            new_path.push(self.base.clone());
        }

        // a fixed base item?
        if let Some(value) = self.base_vars.get(key.as_str()) {
            return match value {
                BaseVar::Mapper(mapper) => Mapped::Mapper(mapper.rebase(&new_path.join("."))),
                BaseVar::Extra(mode) => {
                    Mapped::Extra(ExtraMapper { path: String::new(), extra_as: *mode })
                }
                BaseVar::Suffix(suffix) => {
                    new_path.push(suffix.to_string());
                    Mapped::Path(new_path.join("."))
                }
            };
        }

        // then it must be an arbitrary item
        if !self.arbitrary_nesting.is_empty() {
            new_path.push(self.arbitrary_nesting.clone());
        }
        new_path.push(key);

        if !self.arbitrary_vars.is_empty() {
            let base_vars = self
                .arbitrary_vars
                .iter()
                .map(|(k, v)| (*k, BaseVar::Suffix(*v)))
                .collect();
            return Mapped::Mapper(VarMapper {
                base: new_path.join("."),
                base_vars,
                ..VarMapper::default()
            });
        }

        Mapped::Path(new_path.join("."))
    }

    fn render(&self) -> String {
        match self.substitutions.get("__default__") {
            Some(sub) => sub.clone(),
            None => self.base.clone(),
        }
    }
}

/// `@extra` maps differently depending on the containing flow, and tracks
/// the dotted path below it.
#[derive(Debug, Clone)]
struct ExtraMapper {
    path: String,
    extra_as: ExtraAs,
}

impl ExtraMapper {
    fn resolve(&self, key: &str) -> Mapped {
        // the special legacy `@extra.flow` reroutes to parent results
        if self.path.is_empty() && key == "flow" {
            return Mapped::Mapper(VarMapper {
                base: "parent.results".to_string(),
                arbitrary_vars: results_vars(),
                ..VarMapper::default()
            });
        }

        let path = if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        };
        Mapped::Extra(ExtraMapper { path, extra_as: self.extra_as })
    }

    fn render(&self) -> String {
        match self.extra_as {
            ExtraAs::WebhookJson => format!("run.webhook.json.{}", self.path),
            ExtraAs::TriggerParams => format!("trigger.params.{}", self.path),
            ExtraAs::Function => format!(
                "if(is_error(run.webhook.json.{p}), trigger.params.{p}, run.webhook.json.{p})",
                p = self.path
            ),
        }
    }
}

impl Mapped {
    fn resolve(&self, key: &str) -> Mapped {
        match self {
            Mapped::Mapper(m) => m.resolve(key),
            Mapped::Extra(e) => e.resolve(key),
            Mapped::Path(p) => Mapped::Path(format!("{}.{}", p, key)),
        }
    }

    fn render(&self) -> String {
        match self {
            Mapped::Path(p) => p.clone(),
            Mapped::Mapper(m) => m.render(),
            Mapped::Extra(e) => e.render(),
        }
    }
}

// ──────────────────────────────────────────────
// The migration tree
// ──────────────────────────────────────────────

fn results_vars() -> HashMap<&'static str, &'static str> {
    [("category", "category_localized"), ("text", "input"), ("time", "created_on")]
        .into_iter()
        .collect()
}

static CONTACT_MAPPER: Lazy<VarMapper> = Lazy::new(|| {
    let mut base_vars: HashMap<&'static str, BaseVar> = [
        ("uuid", BaseVar::Suffix("uuid")),
        ("id", BaseVar::Suffix("id")),
        ("name", BaseVar::Suffix("name")),
        ("first_name", BaseVar::Suffix("first_name")),
        ("language", BaseVar::Suffix("language")),
        ("tel_e164", BaseVar::Suffix("urns.tel.0.path")),
    ]
    .into_iter()
    .collect();

    // URN schemes expand to scheme-specific sub-mappers
    for scheme in VALID_SCHEMES {
        base_vars.insert(
            *scheme,
            BaseVar::Mapper(VarMapper {
                substitutions: [
                    ("__default__", format!("format_urn(contact.urns.{})", scheme)),
                    ("display", format!("format_urn(contact.urns.{})", scheme)),
                    ("scheme", format!("contact.urns.{}.0.scheme", scheme)),
                    ("path", format!("contact.urns.{}.0.path", scheme)),
                    ("urn", format!("contact.urns.{}.0", scheme)),
                ]
                .into_iter()
                .collect(),
                base: format!("urns.{}", scheme),
                ..VarMapper::default()
            }),
        );
    }

    VarMapper {
        base: "contact".to_string(),
        base_vars,
        substitutions: [("groups", "join(contact.groups, \",\")".to_string())]
            .into_iter()
            .collect(),
        arbitrary_nesting: "fields".to_string(),
        ..VarMapper::default()
    }
});

/// Assembles the top-level mapper for one migration pass.
fn top_mapper(extra_as: ExtraAs) -> VarMapper {
    let contact = CONTACT_MAPPER.clone();
    let base_vars: HashMap<&'static str, BaseVar> = [
        ("extra", BaseVar::Extra(extra_as)),
        ("contact", BaseVar::Mapper(contact.clone())),
        (
            "flow",
            BaseVar::Mapper(VarMapper {
                base_vars: [("contact", BaseVar::Mapper(contact.clone()))].into_iter().collect(),
                arbitrary_nesting: "run.results".to_string(),
                arbitrary_vars: results_vars(),
                ..VarMapper::default()
            }),
        ),
        (
            "parent",
            BaseVar::Mapper(VarMapper {
                base: "parent".to_string(),
                base_vars: [("contact", BaseVar::Mapper(contact.clone()))].into_iter().collect(),
                arbitrary_nesting: "results".to_string(),
                arbitrary_vars: [("category", "category_localized")].into_iter().collect(),
                ..VarMapper::default()
            }),
        ),
        (
            "child",
            BaseVar::Mapper(VarMapper {
                base: "child".to_string(),
                base_vars: [("contact", BaseVar::Mapper(contact.clone()))].into_iter().collect(),
                arbitrary_nesting: "results".to_string(),
                arbitrary_vars: [("category", "category_localized")].into_iter().collect(),
                ..VarMapper::default()
            }),
        ),
        (
            "step",
            BaseVar::Mapper(VarMapper {
                substitutions: [
                    ("__default__", "run.input".to_string()),
                    ("value", "run.input".to_string()),
                    ("text", "run.input.text".to_string()),
                    ("attachments", "run.input.attachments".to_string()),
                    ("time", "run.input.created_on".to_string()),
                ]
                .into_iter()
                .collect(),
                base_vars: [("contact", BaseVar::Mapper(contact))].into_iter().collect(),
                ..VarMapper::default()
            }),
        ),
        (
            "channel",
            BaseVar::Mapper(VarMapper {
                substitutions: [
                    ("__default__", "contact.channel.address".to_string()),
                    ("name", "contact.channel.name".to_string()),
                    ("tel", "contact.channel.address".to_string()),
                    ("tel_e164", "contact.channel.address".to_string()),
                ]
                .into_iter()
                .collect(),
                ..VarMapper::default()
            }),
        ),
        (
            "date",
            BaseVar::Mapper(VarMapper {
                substitutions: [
                    ("__default__", "now()".to_string()),
                    ("now", "now()".to_string()),
                    ("today", "today()".to_string()),
                    ("tomorrow", "datetime_add(today(), 1, \"D\")".to_string()),
                    ("yesterday", "datetime_add(today(), -1, \"D\")".to_string()),
                ]
                .into_iter()
                .collect(),
                ..VarMapper::default()
            }),
        ),
    ]
    .into_iter()
    .collect();

    VarMapper { base_vars, ..VarMapper::default() }
}

// ──────────────────────────────────────────────
// Template rewriting
// ──────────────────────────────────────────────

/// Rewrites a legacy template into current syntax. Unknown top-level
/// identifiers and unparseable expressions are left untouched.
pub fn migrate_template(template: &str, extra_as: ExtraAs) -> String {
    let top = top_mapper(extra_as);
    let mut out = String::new();

    for segment in scan(template) {
        match segment {
            Segment::Literal(text) => out.push_str(&text.replace('@', "@@")),
            Segment::Reference(path) => {
                let segments: Vec<&str> = path.split('.').collect();
                if !CONTEXT_TOP_LEVELS.contains(&segments[0].to_lowercase().as_str()) {
                    out.push('@');
                    out.push_str(&path);
                    continue;
                }
                let rendered = resolve_path(&top, &segments);
                out.push_str(&emit(&rendered));
            }
            Segment::Expression(src) => match parse(&src) {
                Ok(expr) => {
                    out.push_str("@(");
                    out.push_str(&rewrite_expr(&expr, &top, 0));
                    out.push(')');
                }
                Err(_) => {
                    out.push_str("@(");
                    out.push_str(&src);
                    out.push(')');
                }
            },
        }
    }
    out
}

fn resolve_path(top: &VarMapper, segments: &[&str]) -> String {
    let mut current = top.resolve(segments[0]);
    for segment in &segments[1..] {
        current = current.resolve(segment);
    }
    current.render()
}

/// A rendered replacement that is a plain dotted path can use the bare
/// `@path` form; anything else needs `@( ... )`.
fn emit(rendered: &str) -> String {
    let is_path = !rendered.is_empty()
        && rendered
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.');
    if is_path {
        format!("@{}", rendered)
    } else {
        format!("@({})", rendered)
    }
}

// ──────────────────────────────────────────────
// Expression rewriting
// ──────────────────────────────────────────────

fn precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte => 1,
        BinOp::Add | BinOp::Sub | BinOp::Concat => 2,
        BinOp::Mul | BinOp::Div => 3,
        BinOp::Pow => 4,
    }
}

/// Prints an expression back to source, rewriting reference chains whose
/// first segment is a legacy top-level through the mapper tree.
fn rewrite_expr(expr: &Expr, top: &VarMapper, parent_prec: u8) -> String {
    match expr {
        Expr::TextLit(s) => format!("\"{}\"", s.replace('"', "\"\"")),
        Expr::NumberLit(n) => n.clone(),
        Expr::BoolLit(b) => b.to_string(),
        Expr::Ref(_) | Expr::Member(_, _) => match path_segments(expr) {
            Some(segments)
                if CONTEXT_TOP_LEVELS.contains(&segments[0].to_lowercase().as_str()) =>
            {
                resolve_path(top, &segments.iter().map(String::as_str).collect::<Vec<_>>())
            }
            Some(segments) => segments.join("."),
            None => print_fallback(expr, top),
        },
        Expr::Index(base, idx) => format!(
            "{}[{}]",
            rewrite_expr(base, top, u8::MAX),
            rewrite_expr(idx, top, 0)
        ),
        Expr::Call(name, args) => {
            let args: Vec<String> = args.iter().map(|a| rewrite_expr(a, top, 0)).collect();
            format!("{}({})", name, args.join(", "))
        }
        Expr::Neg(inner) => format!("-{}", rewrite_expr(inner, top, u8::MAX)),
        Expr::Binary(op, left, right) => {
            let prec = precedence(*op);
            let text = format!(
                "{} {} {}",
                rewrite_expr(left, top, prec),
                op.as_str(),
                rewrite_expr(right, top, prec + 1)
            );
            if prec < parent_prec {
                format!("({})", text)
            } else {
                text
            }
        }
    }
}

fn print_fallback(expr: &Expr, top: &VarMapper) -> String {
    match expr {
        Expr::Member(base, name) => {
            format!("{}.{}", rewrite_expr(base, top, u8::MAX), name)
        }
        Expr::Ref(name) => name.clone(),
        _ => rewrite_expr(expr, top, 0),
    }
}

/// Extracts the dotted segments of a pure reference chain, if this is one.
fn path_segments(expr: &Expr) -> Option<Vec<String>> {
    match expr {
        Expr::Ref(name) => Some(vec![name.clone()]),
        Expr::Member(base, name) => {
            let mut segments = path_segments(base)?;
            segments.push(name.clone());
            Some(segments)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrates_contact_and_extra_references() {
        assert_eq!(
            migrate_template(
                "Hello @contact.first_name, your @extra.coupon is ready",
                ExtraAs::TriggerParams
            ),
            "Hello @contact.first_name, your @trigger.params.coupon is ready"
        );
        assert_eq!(
            migrate_template("token is @extra.token", ExtraAs::WebhookJson),
            "token is @run.webhook.json.token"
        );
        assert_eq!(
            migrate_template("@extra.id", ExtraAs::Function),
            "@(if(is_error(run.webhook.json.id), trigger.params.id, run.webhook.json.id))"
        );
    }

    #[test]
    fn migrates_fixed_and_arbitrary_sub_keys() {
        assert_eq!(
            migrate_template("@contact.tel_e164", ExtraAs::TriggerParams),
            "@contact.urns.tel.0.path"
        );
        assert_eq!(
            migrate_template("@contact.groups", ExtraAs::TriggerParams),
            "@(join(contact.groups, \",\"))"
        );
        assert_eq!(
            migrate_template("@contact.favorite_color", ExtraAs::TriggerParams),
            "@contact.fields.favorite_color"
        );
        assert_eq!(
            migrate_template("@flow.response_1.category", ExtraAs::TriggerParams),
            "@run.results.response_1.category_localized"
        );
        assert_eq!(
            migrate_template("@parent.rating", ExtraAs::TriggerParams),
            "@parent.results.rating"
        );
        assert_eq!(migrate_template("@step.value", ExtraAs::TriggerParams), "@run.input");
        assert_eq!(
            migrate_template("@step.contact.name", ExtraAs::TriggerParams),
            "@contact.name"
        );
        assert_eq!(
            migrate_template("@channel", ExtraAs::TriggerParams),
            "@contact.channel.address"
        );
        assert_eq!(migrate_template("@date.now", ExtraAs::TriggerParams), "@(now())");
        assert_eq!(
            migrate_template("@date.tomorrow", ExtraAs::TriggerParams),
            "@(datetime_add(today(), 1, \"D\"))"
        );
    }

    #[test]
    fn urn_scheme_sub_mappers() {
        assert_eq!(
            migrate_template("@contact.tel", ExtraAs::TriggerParams),
            "@(format_urn(contact.urns.tel))"
        );
        assert_eq!(
            migrate_template("@contact.mailto.path", ExtraAs::TriggerParams),
            "@contact.urns.mailto.0.path"
        );
    }

    #[test]
    fn extra_flow_reroutes_to_parent_results() {
        assert_eq!(
            migrate_template("@extra.flow.age", ExtraAs::TriggerParams),
            "@parent.results.age"
        );
        assert_eq!(
            migrate_template("@extra.flow.age.category", ExtraAs::TriggerParams),
            "@parent.results.age.category_localized"
        );
    }

    #[test]
    fn unknown_top_levels_stay_literal() {
        assert_eq!(
            migrate_template("ping @foo.bar and a@@b.com", ExtraAs::TriggerParams),
            "ping @foo.bar and a@@b.com"
        );
    }

    #[test]
    fn rewrites_parenthesized_expressions() {
        assert_eq!(
            migrate_template(
                "@(contact.first_name & \" \" & date.now)",
                ExtraAs::TriggerParams
            ),
            "@(contact.first_name & \" \" & now())"
        );
        assert_eq!(
            migrate_template("@(UPPER(flow.color))", ExtraAs::TriggerParams),
            "@(UPPER(run.results.color))"
        );
    }
}
