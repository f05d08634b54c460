//! Actions: declarative operations that execute by producing events.
//!
//! An action never mutates run or contact state directly -- it evaluates
//! its templated fields, validates its asset references, and returns the
//! events describing what should happen. State changes are a fold of those
//! events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use brook_excellent::{evaluate_template, Environment, Value};

use crate::assets::SessionAssets;
use crate::contacts::{Contact, ContactUrn};
use crate::definition::Flow;
use crate::engine::EngineConfig;
use crate::events::{EventKind, MsgOut};
use crate::references::{
    ChannelReference, ContactReference, FieldReference, FlowReference, GroupReference,
    LabelReference,
};
use crate::runs::Run;
use crate::utils;
use crate::webhook;

/// Everything an action may consult while executing. Mutation is not on
/// offer: actions speak only through the returned events.
pub struct ActionContext<'a> {
    pub env: &'a Environment,
    pub assets: &'a SessionAssets,
    pub config: &'a EngineConfig,
    pub flow: &'a Flow,
    pub contact: Option<&'a Contact>,
    pub run: &'a Run,
    /// The assembled expression context for this step.
    pub context: &'a Value,
}

impl<'a> ActionContext<'a> {
    fn template(&self, template: &str) -> String {
        evaluate_template(self.env, self.context, template)
    }

    fn localized(&self, entity: Uuid, field: &str, base: &'a str) -> &'a str {
        let languages = self
            .env
            .language_order(self.contact.and_then(|c| c.language.as_deref()));
        self.flow.localize_text(&languages, entity, field, base)
    }

    fn contact_or_fatal(&self, events: &mut Vec<EventKind>) -> Option<&'a Contact> {
        if self.contact.is_none() {
            events.push(EventKind::FatalError {
                text: "can't execute action in session without a contact".to_string(),
            });
        }
        self.contact
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    SendMsg {
        uuid: Uuid,
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        quick_replies: Vec<String>,
    },
    SendBroadcast {
        uuid: Uuid,
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        urns: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        contacts: Vec<ContactReference>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        groups: Vec<GroupReference>,
    },
    SendEmail {
        uuid: Uuid,
        addresses: Vec<String>,
        subject: String,
        body: String,
    },
    AddInputLabels {
        uuid: Uuid,
        labels: Vec<LabelReference>,
    },
    AddContactGroups {
        uuid: Uuid,
        groups: Vec<GroupReference>,
    },
    RemoveContactGroups {
        uuid: Uuid,
        groups: Vec<GroupReference>,
    },
    AddContactUrn {
        uuid: Uuid,
        scheme: String,
        path: String,
    },
    SetContactField {
        uuid: Uuid,
        field: FieldReference,
        value: String,
    },
    SetContactName {
        uuid: Uuid,
        name: String,
    },
    SetContactLanguage {
        uuid: Uuid,
        language: String,
    },
    SetContactChannel {
        uuid: Uuid,
        channel: ChannelReference,
    },
    SetRunResult {
        uuid: Uuid,
        name: String,
        value: String,
        #[serde(default)]
        category: String,
    },
    CallWebhook {
        uuid: Uuid,
        method: String,
        url: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        headers: Vec<(String, String)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
    StartFlow {
        uuid: Uuid,
        flow: FlowReference,
    },
    StartSession {
        uuid: Uuid,
        flow: FlowReference,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        contacts: Vec<ContactReference>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        groups: Vec<GroupReference>,
    },
}

impl Action {
    pub fn uuid(&self) -> Uuid {
        match self {
            Action::SendMsg { uuid, .. }
            | Action::SendBroadcast { uuid, .. }
            | Action::SendEmail { uuid, .. }
            | Action::AddInputLabels { uuid, .. }
            | Action::AddContactGroups { uuid, .. }
            | Action::RemoveContactGroups { uuid, .. }
            | Action::AddContactUrn { uuid, .. }
            | Action::SetContactField { uuid, .. }
            | Action::SetContactName { uuid, .. }
            | Action::SetContactLanguage { uuid, .. }
            | Action::SetContactChannel { uuid, .. }
            | Action::SetRunResult { uuid, .. }
            | Action::CallWebhook { uuid, .. }
            | Action::StartFlow { uuid, .. }
            | Action::StartSession { uuid, .. } => *uuid,
        }
    }

    /// Executes this action, returning the events it produces. Recoverable
    /// problems come back as error events; a fatal error event halts the
    /// session when applied.
    pub fn execute(&self, ctx: &ActionContext) -> Vec<EventKind> {
        let mut events = Vec::new();
        match self {
            Action::SendMsg { uuid, text, attachments, quick_replies } => {
                let localized = ctx.localized(*uuid, "text", text);
                let evaluated = ctx.template(localized);
                let (urn, channel) = match ctx.contact {
                    Some(contact) => (
                        contact.urns.first().map(|u| u.to_urn_string()),
                        contact.channel.clone(),
                    ),
                    None => (None, None),
                };
                events.push(EventKind::MsgCreated {
                    msg: MsgOut {
                        uuid: utils::new_uuid(),
                        urn,
                        channel,
                        text: evaluated,
                        attachments: attachments.iter().map(|a| ctx.template(a)).collect(),
                        quick_replies: quick_replies.clone(),
                    },
                });
            }

            Action::SendBroadcast { uuid, text, urns, contacts, groups } => {
                let localized = ctx.localized(*uuid, "text", text);
                events.push(EventKind::BroadcastCreated {
                    text: ctx.template(localized),
                    urns: urns.iter().map(|u| ctx.template(u)).collect(),
                    contacts: contacts.clone(),
                    groups: groups.clone(),
                });
            }

            Action::SendEmail { uuid: _, addresses, subject, body } => {
                events.push(EventKind::EmailCreated {
                    addresses: addresses.iter().map(|a| ctx.template(a)).collect(),
                    subject: ctx.template(subject),
                    body: ctx.template(body),
                });
            }

            Action::AddInputLabels { uuid: _, labels } => {
                let input = match ctx.run.input.as_ref() {
                    Some(input) => input,
                    None => {
                        events.push(EventKind::Error {
                            text: "can't add labels to a run with no input".to_string(),
                        });
                        return events;
                    }
                };
                let valid = validate_labels(ctx, labels, &mut events);
                if !valid.is_empty() {
                    events.push(EventKind::InputLabelsAdded {
                        input_uuid: input.uuid,
                        labels: valid,
                    });
                }
            }

            Action::AddContactGroups { uuid: _, groups } => {
                if ctx.contact_or_fatal(&mut events).is_none() {
                    return events;
                }
                let valid = validate_groups(ctx, groups, &mut events);
                if !valid.is_empty() {
                    events.push(EventKind::ContactGroupsAdded { groups: valid });
                }
            }

            Action::RemoveContactGroups { uuid: _, groups } => {
                if ctx.contact_or_fatal(&mut events).is_none() {
                    return events;
                }
                let valid = validate_groups(ctx, groups, &mut events);
                if !valid.is_empty() {
                    events.push(EventKind::ContactGroupsRemoved { groups: valid });
                }
            }

            Action::AddContactUrn { uuid: _, scheme, path } => {
                if ctx.contact_or_fatal(&mut events).is_none() {
                    return events;
                }
                let path = ctx.template(path);
                match ContactUrn::parse(&format!("{}:{}", scheme, path)) {
                    Ok(urn) => events.push(EventKind::ContactUrnAdded {
                        urn: urn.to_urn_string(),
                    }),
                    Err(err) => events.push(EventKind::Error {
                        text: format!("invalid URN '{}:{}': {}", scheme, path, err),
                    }),
                }
            }

            Action::SetContactField { uuid: _, field, value } => {
                if ctx.contact_or_fatal(&mut events).is_none() {
                    return events;
                }
                match ctx.assets.get_field(&field.key) {
                    Ok(_) => events.push(EventKind::ContactFieldChanged {
                        field: field.clone(),
                        value: ctx.template(value),
                    }),
                    Err(err) => events.push(EventKind::Error { text: err.to_string() }),
                }
            }

            Action::SetContactName { uuid: _, name } => {
                if ctx.contact_or_fatal(&mut events).is_none() {
                    return events;
                }
                events.push(EventKind::ContactNameChanged { name: ctx.template(name) });
            }

            Action::SetContactLanguage { uuid: _, language } => {
                if ctx.contact_or_fatal(&mut events).is_none() {
                    return events;
                }
                events.push(EventKind::ContactLanguageChanged {
                    language: ctx.template(language),
                });
            }

            Action::SetContactChannel { uuid: _, channel } => {
                if ctx.contact_or_fatal(&mut events).is_none() {
                    return events;
                }
                match ctx.assets.get_channel(channel.uuid) {
                    Ok(_) => events.push(EventKind::ContactChannelChanged {
                        channel: channel.clone(),
                    }),
                    Err(err) => events.push(EventKind::Error { text: err.to_string() }),
                }
            }

            Action::SetRunResult { uuid: _, name, value, category } => {
                events.push(EventKind::RunResultChanged {
                    name: name.clone(),
                    value: ctx.template(value),
                    category: category.clone(),
                    category_localized: None,
                    node_uuid: current_node_uuid(ctx),
                    input: None,
                });
            }

            Action::CallWebhook { uuid: _, method, url, headers, body } => {
                let url = ctx.template(url);
                if ctx.config.disable_webhooks {
                    events.push(EventKind::WebhookCalled {
                        url,
                        status: "disabled".to_string(),
                        status_code: 0,
                        request: String::new(),
                        response: String::new(),
                    });
                    return events;
                }
                let headers: Vec<(String, String)> = headers
                    .iter()
                    .map(|(name, value)| (name.clone(), ctx.template(value)))
                    .collect();
                let body = body.as_ref().map(|b| ctx.template(b));
                let outcome = webhook::call(ctx.config, method, &url, &headers, body.as_deref());
                events.push(EventKind::WebhookCalled {
                    url: outcome.url,
                    status: outcome.status.as_str().to_string(),
                    status_code: outcome.status_code,
                    request: outcome.request,
                    response: outcome.response,
                });
            }

            Action::StartFlow { uuid: _, flow } => {
                // the child flow is an identity reference: without it the
                // session cannot continue correctly
                match ctx.assets.get_flow(flow.uuid) {
                    Ok(_) => events.push(EventKind::FlowTriggered {
                        flow: flow.clone(),
                        parent_run_uuid: ctx.run.uuid,
                    }),
                    Err(err) => events.push(EventKind::FatalError { text: err.to_string() }),
                }
            }

            Action::StartSession { uuid: _, flow, contacts, groups } => {
                match ctx.assets.get_flow(flow.uuid) {
                    Ok(_) => events.push(EventKind::SessionTriggered {
                        flow: flow.clone(),
                        contacts: contacts.clone(),
                        groups: groups.clone(),
                        run: None,
                    }),
                    Err(err) => events.push(EventKind::FatalError { text: err.to_string() }),
                }
            }
        }
        events
    }
}

fn current_node_uuid(ctx: &ActionContext) -> Uuid {
    ctx.run.current_step().map(|s| s.node_uuid).unwrap_or_else(Uuid::nil)
}

/// Filters group references to those that resolve, emitting an error event
/// for each that doesn't.
fn validate_groups(
    ctx: &ActionContext,
    groups: &[GroupReference],
    events: &mut Vec<EventKind>,
) -> Vec<GroupReference> {
    let mut valid = Vec::with_capacity(groups.len());
    for group in groups {
        match ctx.assets.get_group(group.uuid) {
            Ok(_) => valid.push(group.clone()),
            Err(err) => events.push(EventKind::Error { text: err.to_string() }),
        }
    }
    valid
}

fn validate_labels(
    ctx: &ActionContext,
    labels: &[LabelReference],
    events: &mut Vec<EventKind>,
) -> Vec<LabelReference> {
    let mut valid = Vec::with_capacity(labels.len());
    for label in labels {
        match ctx.assets.get_label(label.uuid) {
            Ok(_) => valid.push(label.clone()),
            Err(err) => events.push(EventKind::Error { text: err.to_string() }),
        }
    }
    valid
}
