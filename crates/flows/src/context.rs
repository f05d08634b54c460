//! Assembly of the expression context tree for one evaluation.
//!
//! The root is an object with the keys expressions can reach: contact,
//! run, parent, child, trigger, input, flow, step, urns, results. Every
//! node is a plain value; resolution is a pure function of (value, key).

use rust_decimal::Decimal;

use brook_excellent::types::{json_to_value, parse_json, ObjectValue, Value};
use brook_excellent::{Environment, RedactionPolicy, XDateTime};

use crate::contacts::Contact;
use crate::references::{ChannelReference, FlowReference};
use crate::runs::{Input, Run, RunResult, WebhookResult};
use crate::session::Session;
use crate::triggers::Trigger;

const REDACTION_MASK: &str = "********";

fn text_or_nil(value: Option<&str>) -> Value {
    match value {
        Some(s) => Value::text(s),
        None => Value::Nil,
    }
}

fn datetime(env: &Environment, instant: chrono::DateTime<chrono::Utc>) -> Value {
    Value::DateTime(XDateTime::in_zone(instant, env.timezone))
}

fn object_with_default(pairs: Vec<(&str, Value)>, default: Value) -> Value {
    let entries = pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    Value::Object(ObjectValue::new(entries).with_default(default))
}

fn object(pairs: Vec<(&str, Value)>) -> Value {
    let entries = pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    Value::Object(ObjectValue::new(entries))
}

// ──────────────────────────────────────────────
// Pieces
// ──────────────────────────────────────────────

fn channel_value(channel: &ChannelReference) -> Value {
    object_with_default(
        vec![
            ("uuid", Value::text(channel.uuid.to_string())),
            ("name", Value::text(channel.name.clone())),
            ("address", Value::text(channel.name.clone())),
        ],
        Value::text(channel.name.clone()),
    )
}

fn urn_value(env: &Environment, scheme: &str, path: &str, display: Option<&str>) -> Value {
    let redacted = env.redaction_policy == RedactionPolicy::Urns;
    let shown_path = if redacted { REDACTION_MASK } else { path };
    let full = if redacted {
        format!("{}:{}", scheme, REDACTION_MASK)
    } else {
        match display {
            Some(d) => format!("{}:{}#{}", scheme, path, d),
            None => format!("{}:{}", scheme, path),
        }
    };
    object_with_default(
        vec![
            ("scheme", Value::text(scheme)),
            ("path", Value::text(shown_path)),
            ("display", text_or_nil(display)),
            ("urn", Value::text(full.clone())),
        ],
        Value::text(full),
    )
}

/// URNs resolve by scheme (`urns.tel`) and by index (`urns.0`); bare
/// `urns` reduces to the full list.
fn urns_value(env: &Environment, contact: &Contact) -> Value {
    let all: Vec<Value> = contact
        .urns
        .iter()
        .map(|u| urn_value(env, &u.scheme, &u.path, u.display.as_deref()))
        .collect();

    let mut pairs: Vec<(String, Value)> = Vec::new();
    for (i, value) in all.iter().enumerate() {
        pairs.push((i.to_string(), value.clone()));
    }
    for scheme in contact.urns.iter().map(|u| u.scheme.clone()).collect::<std::collections::BTreeSet<_>>() {
        let of_scheme: Vec<Value> = contact
            .urns
            .iter()
            .filter(|u| u.scheme == scheme)
            .map(|u| urn_value(env, &u.scheme, &u.path, u.display.as_deref()))
            .collect();
        pairs.push((scheme, Value::Array(of_scheme)));
    }

    let entries = pairs.into_iter().collect();
    Value::Object(ObjectValue::new(entries).with_default(Value::Array(all)))
}

pub fn contact_value(env: &Environment, contact: &Contact) -> Value {
    let groups: Vec<Value> = contact
        .groups
        .iter()
        .map(|g| {
            object_with_default(
                vec![
                    ("uuid", Value::text(g.uuid.to_string())),
                    ("name", Value::text(g.name.clone())),
                ],
                Value::text(g.name.clone()),
            )
        })
        .collect();

    let fields = object(
        contact
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), Value::text(v.text.clone())))
            .collect(),
    );

    object_with_default(
        vec![
            ("uuid", Value::text(contact.uuid.to_string())),
            ("name", Value::text(contact.name.clone())),
            ("first_name", Value::text(contact.first_name())),
            ("language", text_or_nil(contact.language.as_deref())),
            ("timezone", text_or_nil(contact.timezone.as_deref())),
            (
                "created_on",
                match contact.created_on {
                    Some(on) => datetime(env, on),
                    None => Value::Nil,
                },
            ),
            ("urns", urns_value(env, contact)),
            ("groups", Value::Array(groups)),
            ("fields", fields),
            (
                "channel",
                match &contact.channel {
                    Some(channel) => channel_value(channel),
                    None => Value::Nil,
                },
            ),
        ],
        Value::text(contact.name.clone()),
    )
}

fn input_value(env: &Environment, input: &Input) -> Value {
    object_with_default(
        vec![
            ("uuid", Value::text(input.uuid.to_string())),
            ("type", Value::text(input.input_type.clone())),
            ("created_on", datetime(env, input.created_on)),
            ("text", Value::text(input.text.clone())),
            (
                "attachments",
                Value::Array(input.attachments.iter().map(|a| Value::text(a.clone())).collect()),
            ),
            ("urn", text_or_nil(input.urn.as_deref())),
            (
                "channel",
                match &input.channel {
                    Some(channel) => channel_value(channel),
                    None => Value::Nil,
                },
            ),
        ],
        Value::text(input.text.clone()),
    )
}

fn result_value(env: &Environment, result: &RunResult) -> Value {
    object_with_default(
        vec![
            ("name", Value::text(result.name.clone())),
            ("value", Value::text(result.value.clone())),
            ("category", Value::text(result.category.clone())),
            (
                "category_localized",
                Value::text(
                    result
                        .category_localized
                        .clone()
                        .unwrap_or_else(|| result.category.clone()),
                ),
            ),
            ("node_uuid", Value::text(result.node_uuid.to_string())),
            ("created_on", datetime(env, result.created_on)),
            ("input", text_or_nil(result.input.as_deref())),
        ],
        Value::text(result.value.clone()),
    )
}

fn results_value(env: &Environment, run: &Run) -> Value {
    object(
        run.results
            .iter()
            .map(|(slug, result)| (slug.as_str(), result_value(env, result)))
            .collect(),
    )
}

fn flow_ref_value(flow: &FlowReference) -> Value {
    object_with_default(
        vec![
            ("uuid", Value::text(flow.uuid.to_string())),
            ("name", Value::text(flow.name.clone())),
        ],
        Value::text(flow.name.clone()),
    )
}

fn webhook_value(webhook: &WebhookResult) -> Value {
    object_with_default(
        vec![
            ("url", Value::text(webhook.url.clone())),
            ("status", Value::text(webhook.status.clone())),
            ("status_code", Value::Number(Decimal::from(webhook.status_code))),
            ("body", Value::text(webhook.body.clone())),
            ("json", parse_json(&webhook.body)),
        ],
        Value::text(webhook.body.clone()),
    )
}

fn run_value(env: &Environment, run: &Run, depth: usize) -> Value {
    let mut pairs = vec![
        ("uuid", Value::text(run.uuid.to_string())),
        ("flow", flow_ref_value(&run.flow)),
        ("contact", contact_value(env, &run.contact)),
        ("results", results_value(env, run)),
        ("created_on", datetime(env, run.created_on)),
        (
            "exited_on",
            match run.exited_on {
                Some(on) => datetime(env, on),
                None => Value::Nil,
            },
        ),
        ("status", Value::text(status_text(run.status))),
    ];
    if depth > 0 {
        pairs.push((
            "input",
            match &run.input {
                Some(input) => input_value(env, input),
                None => Value::Nil,
            },
        ));
        pairs.push((
            "webhook",
            match &run.webhook {
                Some(webhook) => webhook_value(webhook),
                None => Value::Nil,
            },
        ));
    }
    object_with_default(pairs, Value::text(run.uuid.to_string()))
}

fn status_text(status: crate::runs::RunStatus) -> String {
    match serde_json::to_value(status) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

fn trigger_value(trigger: &Trigger) -> Value {
    object(vec![
        ("type", Value::text(trigger.type_name())),
        ("params", json_to_value(trigger.params())),
        ("flow", flow_ref_value(trigger.flow())),
    ])
}

// ──────────────────────────────────────────────
// The root
// ──────────────────────────────────────────────

/// Builds the evaluation root for the given run within its session.
pub fn build(env: &Environment, session: &Session, run: &Run) -> Value {
    let mut pairs: Vec<(&str, Value)> = Vec::new();

    pairs.push(("contact", contact_value(env, &run.contact)));
    pairs.push(("run", run_value(env, run, 1)));
    pairs.push(("trigger", trigger_value(session.trigger())));
    pairs.push((
        "input",
        match &run.input {
            Some(input) => input_value(env, input),
            None => Value::Nil,
        },
    ));
    pairs.push(("flow", flow_ref_value(&run.flow)));
    pairs.push((
        "step",
        match run.current_step() {
            Some(step) => object(vec![
                ("uuid", Value::text(step.uuid.to_string())),
                ("node_uuid", Value::text(step.node_uuid.to_string())),
                ("arrived_on", datetime(env, step.arrived_on)),
            ]),
            None => Value::Nil,
        },
    ));
    pairs.push(("urns", urns_value(env, &run.contact)));
    pairs.push(("results", results_value(env, run)));

    pairs.push((
        "parent",
        match run.parent_uuid.and_then(|uuid| session.get_run(uuid)) {
            Some(parent) => run_value(env, parent, 0),
            None => Value::Nil,
        },
    ));
    pairs.push((
        "child",
        match session.child_of(run.uuid) {
            Some(child) => run_value(env, child, 0),
            None => Value::Nil,
        },
    ));

    object(pairs)
}
