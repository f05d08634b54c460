//! Events: the sole unit of state mutation and the protocol between the
//! engine and its caller.
//!
//! Every event is timestamped and carries a monotonically increasing index
//! within its session. Events classified as caller events may arrive as
//! resume input; engine events only ever flow outward. State is a fold of
//! the event log -- application lives with the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::references::{
    ChannelReference, ContactReference, FieldReference, FlowReference, GroupReference,
    LabelReference,
};

/// An outgoing message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgOut {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelReference>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<String>,
}

/// An event with its session envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonically increasing within the session.
    #[serde(default)]
    pub index: u64,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_uuid: Option<Uuid>,
    #[serde(flatten)]
    kind: EventKind,
}

impl Event {
    /// A new unindexed event stamped with the current time. The session
    /// assigns the index and step when the event is appended to its log.
    pub fn new(kind: EventKind) -> Event {
        Event::at(kind, Utc::now())
    }

    pub fn at(kind: EventKind, created_on: DateTime<Utc>) -> Event {
        Event { index: 0, created_on, step_uuid: None, kind }
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ── caller events ─────────────────────────
    MsgReceived {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        urn: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<ChannelReference>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<String>,
    },
    WaitTimedOut {},
    RunExpired {
        run_uuid: Uuid,
    },

    // ── engine events ─────────────────────────
    MsgCreated {
        msg: MsgOut,
    },
    BroadcastCreated {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        urns: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        contacts: Vec<ContactReference>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        groups: Vec<GroupReference>,
    },
    EmailCreated {
        addresses: Vec<String>,
        subject: String,
        body: String,
    },
    MsgWait {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_on: Option<DateTime<Utc>>,
    },
    NothingWait {},
    ContactNameChanged {
        name: String,
    },
    ContactLanguageChanged {
        language: String,
    },
    ContactChannelChanged {
        channel: ChannelReference,
    },
    ContactUrnAdded {
        urn: String,
    },
    ContactFieldChanged {
        field: FieldReference,
        value: String,
    },
    ContactGroupsAdded {
        groups: Vec<GroupReference>,
    },
    ContactGroupsRemoved {
        groups: Vec<GroupReference>,
    },
    InputLabelsAdded {
        input_uuid: Uuid,
        labels: Vec<LabelReference>,
    },
    RunResultChanged {
        name: String,
        value: String,
        category: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category_localized: Option<String>,
        node_uuid: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<String>,
    },
    WebhookCalled {
        url: String,
        status: String,
        status_code: u16,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        request: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        response: String,
    },
    FlowTriggered {
        flow: FlowReference,
        parent_run_uuid: Uuid,
    },
    SessionTriggered {
        flow: FlowReference,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        contacts: Vec<ContactReference>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        groups: Vec<GroupReference>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run: Option<serde_json::Value>,
    },
    Error {
        text: String,
    },
    FatalError {
        text: String,
    },
}

impl EventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::MsgReceived { .. } => "msg_received",
            EventKind::WaitTimedOut {} => "wait_timed_out",
            EventKind::RunExpired { .. } => "run_expired",
            EventKind::MsgCreated { .. } => "msg_created",
            EventKind::BroadcastCreated { .. } => "broadcast_created",
            EventKind::EmailCreated { .. } => "email_created",
            EventKind::MsgWait { .. } => "msg_wait",
            EventKind::NothingWait {} => "nothing_wait",
            EventKind::ContactNameChanged { .. } => "contact_name_changed",
            EventKind::ContactLanguageChanged { .. } => "contact_language_changed",
            EventKind::ContactChannelChanged { .. } => "contact_channel_changed",
            EventKind::ContactUrnAdded { .. } => "contact_urn_added",
            EventKind::ContactFieldChanged { .. } => "contact_field_changed",
            EventKind::ContactGroupsAdded { .. } => "contact_groups_added",
            EventKind::ContactGroupsRemoved { .. } => "contact_groups_removed",
            EventKind::InputLabelsAdded { .. } => "input_labels_added",
            EventKind::RunResultChanged { .. } => "run_result_changed",
            EventKind::WebhookCalled { .. } => "webhook_called",
            EventKind::FlowTriggered { .. } => "flow_triggered",
            EventKind::SessionTriggered { .. } => "session_triggered",
            EventKind::Error { .. } => "error",
            EventKind::FatalError { .. } => "fatal_error",
        }
    }

    /// Whether this event may be handed to a resume by the caller.
    pub fn is_caller_event(&self) -> bool {
        matches!(
            self,
            EventKind::MsgReceived { .. }
                | EventKind::WaitTimedOut {}
                | EventKind::RunExpired { .. }
                | EventKind::InputLabelsAdded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tags() {
        let event = Event::new(EventKind::ContactNameChanged { name: "Bob".to_string() });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "contact_name_changed");
        assert_eq!(json["name"], "Bob");
        assert!(json.get("created_on").is_some());

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), event.kind());
    }

    #[test]
    fn caller_events_deserialize_from_wire_shape() {
        let event: Event = serde_json::from_str(
            r#"{"type": "msg_received", "created_on": "2006-01-02T15:04:05Z", "text": "ok"}"#,
        )
        .unwrap();
        assert!(event.kind().is_caller_event());
        assert_eq!(event.type_name(), "msg_received");
    }
}
