//! Triggers: what starts a session.

use serde::{Deserialize, Serialize};

use crate::references::FlowReference;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// An explicit start, e.g. a user pressing "start" in a console.
    Manual {
        flow: FlowReference,
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        params: serde_json::Value,
        triggered_on: chrono::DateTime<chrono::Utc>,
    },
    /// A start requested by a `start_session` action in another session.
    FlowAction {
        flow: FlowReference,
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        params: serde_json::Value,
        triggered_on: chrono::DateTime<chrono::Utc>,
    },
}

impl Trigger {
    pub fn type_name(&self) -> &'static str {
        match self {
            Trigger::Manual { .. } => "manual",
            Trigger::FlowAction { .. } => "flow_action",
        }
    }

    pub fn flow(&self) -> &FlowReference {
        match self {
            Trigger::Manual { flow, .. } => flow,
            Trigger::FlowAction { flow, .. } => flow,
        }
    }

    pub fn params(&self) -> &serde_json::Value {
        match self {
            Trigger::Manual { params, .. } => params,
            Trigger::FlowAction { params, .. } => params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triggers_round_trip() {
        let trigger: Trigger = serde_json::from_value(serde_json::json!({
            "type": "manual",
            "flow": {"uuid": "50c3706e-fedb-42c0-8eab-dda3335714b7", "name": "Registration"},
            "params": {"coupon": "BOGO"},
            "triggered_on": "2017-12-31T11:31:15Z"
        }))
        .unwrap();
        assert_eq!(trigger.type_name(), "manual");
        assert_eq!(trigger.params()["coupon"], "BOGO");

        let json = serde_json::to_value(&trigger).unwrap();
        let back: Trigger = serde_json::from_value(json).unwrap();
        assert_eq!(back, trigger);
    }
}
