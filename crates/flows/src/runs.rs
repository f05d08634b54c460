//! Runs and steps: one run per flow invocation, one step per node visit.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contacts::Contact;
use crate::references::{ChannelReference, FlowReference};
use crate::utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Active,
    Waiting,
    Completed,
    Interrupted,
    Expired,
    Errored,
}

/// The record of visiting one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub uuid: Uuid,
    pub node_uuid: Uuid,
    pub arrived_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_uuid: Option<Uuid>,
    /// Indices of the events produced at this step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<u64>,
}

/// A saved flow result, keyed in the run by its slug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_localized: Option<String>,
    pub node_uuid: Uuid,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

/// The last message received by a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub uuid: Uuid,
    #[serde(rename = "type")]
    pub input_type: String,
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelReference>,
}

/// The captured state of a webhook call, exposed to expressions as
/// `run.webhook`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookResult {
    pub url: String,
    pub status: String,
    pub status_code: u16,
    #[serde(default)]
    pub body: String,
}

/// One invocation of one flow on behalf of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub uuid: Uuid,
    pub flow: FlowReference,
    pub contact: Contact,
    #[serde(default)]
    pub path: Vec<Step>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<String, RunResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Input>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookResult>,
    pub status: RunStatus,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exited_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uuid: Option<Uuid>,
}

impl Run {
    pub fn new(
        flow: FlowReference,
        contact: Contact,
        parent_uuid: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Run {
        Run {
            uuid: utils::new_uuid(),
            flow,
            contact,
            path: Vec::new(),
            results: BTreeMap::new(),
            input: None,
            webhook: None,
            status: RunStatus::Active,
            created_on: now,
            exited_on: None,
            parent_uuid,
        }
    }

    /// The step currently being executed, i.e. the last one on the path.
    pub fn current_step(&self) -> Option<&Step> {
        self.path.last()
    }

    pub fn current_step_mut(&mut self) -> Option<&mut Step> {
        self.path.last_mut()
    }

    /// Saves a result under its slugged name.
    pub fn save_result(&mut self, result: RunResult) {
        self.results.insert(utils::slugify(&result.name), result);
    }

    pub fn exit(&mut self, status: RunStatus, now: DateTime<Utc>) {
        self.status = status;
        self.exited_on = Some(now);
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, RunStatus::Active | RunStatus::Waiting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> Contact {
        serde_json::from_value(serde_json::json!({
            "uuid": "ba96bf7f-bc2a-4873-a7c7-254d1927c4e3",
            "name": "Ryan Lewis"
        }))
        .unwrap()
    }

    #[test]
    fn results_are_keyed_by_slug() {
        let flow = FlowReference {
            uuid: "50c3706e-fedb-42c0-8eab-dda3335714b7".parse().unwrap(),
            name: "Registration".to_string(),
        };
        let mut run = Run::new(flow, contact(), None, Utc::now());
        run.save_result(RunResult {
            name: "Favorite Color".to_string(),
            value: "red".to_string(),
            category: "Red".to_string(),
            category_localized: None,
            node_uuid: "72a1f5df-49f9-45df-94c9-d86f7ea064e5".parse().unwrap(),
            created_on: Utc::now(),
            input: None,
        });
        assert!(run.results.contains_key("favorite_color"));
        assert_eq!(run.results["favorite_color"].value, "red");
    }

    #[test]
    fn run_serialization_round_trips() {
        let flow = FlowReference {
            uuid: "50c3706e-fedb-42c0-8eab-dda3335714b7".parse().unwrap(),
            name: "Registration".to_string(),
        };
        let run = Run::new(flow, contact(), None, Utc::now());
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["status"], "active");
        let back: Run = serde_json::from_value(json).unwrap();
        assert_eq!(back, run);
    }
}
