//! Immutable flow definitions, deserialized from authored flow JSON and
//! validated before entering the asset cache.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actions::Action;
use crate::routers::Router;

/// A flow: an ordered graph of nodes identified by uuid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub language: String,
    /// language → entity uuid → field → translation (string or strings)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub localization: HashMap<String, HashMap<Uuid, HashMap<String, serde_json::Value>>>,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub uuid: Uuid,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router: Option<Router>,
    #[serde(default)]
    pub exits: Vec<Exit>,
}

/// An exit either advances to a destination node or, with no destination,
/// terminates the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exit {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_node_uuid: Option<Uuid>,
}

impl Flow {
    pub fn get_node(&self, uuid: Uuid) -> Option<&Node> {
        self.nodes.iter().find(|n| n.uuid == uuid)
    }

    /// Checks structural integrity: every exit destination names a node in
    /// this flow and every router category binds to an exit on its node.
    pub fn validate(&self) -> Result<(), String> {
        for node in &self.nodes {
            for exit in &node.exits {
                if let Some(dest) = exit.destination_node_uuid {
                    if self.get_node(dest).is_none() {
                        return Err(format!(
                            "exit {} has destination {} which is not a node in the flow",
                            exit.uuid, dest
                        ));
                    }
                }
            }
            if let Some(router) = &node.router {
                router.validate(node)?;
            }
        }
        Ok(())
    }

    /// Looks up a localized string field, trying each language in order
    /// before falling back to the base value.
    pub fn localize_text<'a>(
        &'a self,
        languages: &[&str],
        entity_uuid: Uuid,
        field: &str,
        base: &'a str,
    ) -> &'a str {
        for lang in languages {
            if *lang == self.language {
                return base;
            }
            if let Some(text) = self
                .localization
                .get(*lang)
                .and_then(|entities| entities.get(&entity_uuid))
                .and_then(|fields| fields.get(field))
                .and_then(first_string)
            {
                return text;
            }
        }
        base
    }
}

/// Translations are either a string or an array of strings; either way the
/// first string wins for scalar fields.
fn first_string(value: &serde_json::Value) -> Option<&str> {
    match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Array(items) => items.first().and_then(|v| v.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow_json() -> serde_json::Value {
        serde_json::json!({
            "uuid": "50c3706e-fedb-42c0-8eab-dda3335714b7",
            "name": "Registration",
            "language": "eng",
            "localization": {
                "fra": {
                    "f3368071-5de9-4af1-a2f2-1e45a3826d4c": {"text": ["Bonjour!"]}
                }
            },
            "nodes": [
                {
                    "uuid": "72a1f5df-49f9-45df-94c9-d86f7ea064e5",
                    "actions": [{
                        "type": "send_msg",
                        "uuid": "f3368071-5de9-4af1-a2f2-1e45a3826d4c",
                        "text": "Hello!"
                    }],
                    "exits": [{"uuid": "37d8813f-1402-4ad2-9cc2-e9054a96525b"}]
                }
            ]
        })
    }

    #[test]
    fn deserializes_and_validates() {
        let flow: Flow = serde_json::from_value(flow_json()).unwrap();
        assert!(flow.validate().is_ok());
        assert_eq!(flow.nodes.len(), 1);
        assert_eq!(flow.nodes[0].actions.len(), 1);
    }

    #[test]
    fn rejects_dangling_destinations() {
        let mut json = flow_json();
        json["nodes"][0]["exits"][0]["destination_node_uuid"] =
            serde_json::json!("11111111-1111-4111-8111-111111111111");
        let flow: Flow = serde_json::from_value(json).unwrap();
        assert!(flow.validate().is_err());
    }

    #[test]
    fn localization_prefers_contact_language() {
        let flow: Flow = serde_json::from_value(flow_json()).unwrap();
        let entity: Uuid = "f3368071-5de9-4af1-a2f2-1e45a3826d4c".parse().unwrap();
        assert_eq!(flow.localize_text(&["fra"], entity, "text", "Hello!"), "Bonjour!");
        // the flow's own language short-circuits to the base text
        assert_eq!(flow.localize_text(&["eng", "fra"], entity, "text", "Hello!"), "Hello!");
        assert_eq!(flow.localize_text(&["spa"], entity, "text", "Hello!"), "Hello!");
    }
}
