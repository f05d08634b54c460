//! Contact snapshots: the per-contact state a session carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use brook_excellent::urns;

use crate::references::{ChannelReference, GroupReference};

/// One URN a contact can be reached at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUrn {
    pub scheme: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl ContactUrn {
    pub fn parse(input: &str) -> Result<ContactUrn, String> {
        let urn = urns::parse(input)?;
        Ok(ContactUrn {
            scheme: urn.scheme().to_string(),
            path: urn.path().to_string(),
            display: urn.display().map(|d| d.to_string()),
        })
    }

    pub fn to_urn_string(&self) -> String {
        match &self.display {
            Some(d) => format!("{}:{}#{}", self.scheme, self.path, d),
            None => format!("{}:{}", self.scheme, self.path),
        }
    }
}

/// A contact field value. Values are stored as text and interpreted by the
/// field's value type when built into the evaluation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub text: String,
}

/// The contact snapshot owned by a session. Mutated only by applying
/// contact events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub uuid: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub urns: Vec<ContactUrn>,
    #[serde(default)]
    pub groups: Vec<GroupReference>,
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub fields: std::collections::BTreeMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelReference>,
}

impl Contact {
    /// The first word of the contact's name.
    pub fn first_name(&self) -> String {
        self.name.split_whitespace().next().unwrap_or("").to_string()
    }

    pub fn has_urn(&self, scheme: &str, path: &str) -> bool {
        self.urns.iter().any(|u| u.scheme == scheme && u.path == path)
    }

    pub fn in_group(&self, uuid: Uuid) -> bool {
        self.groups.iter().any(|g| g.uuid == uuid)
    }

    pub fn add_group(&mut self, group: GroupReference) {
        if !self.in_group(group.uuid) {
            self.groups.push(group);
        }
    }

    pub fn remove_group(&mut self, uuid: Uuid) {
        self.groups.retain(|g| g.uuid != uuid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> Contact {
        serde_json::from_value(serde_json::json!({
            "uuid": "ba96bf7f-bc2a-4873-a7c7-254d1927c4e3",
            "name": "Ryan Lewis",
            "language": "eng",
            "urns": [
                {"scheme": "tel", "path": "+12065551212"},
                {"scheme": "mailto", "path": "foo@bar.com"}
            ],
            "groups": [{"uuid": "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d", "name": "Testers"}]
        }))
        .unwrap()
    }

    #[test]
    fn round_trips_through_json() {
        let c = contact();
        assert_eq!(c.first_name(), "Ryan");
        assert!(c.has_urn("tel", "+12065551212"));

        let json = serde_json::to_value(&c).unwrap();
        let back: Contact = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn group_membership_is_idempotent() {
        let mut c = contact();
        let group = GroupReference {
            uuid: "b7cf0d83-f1c9-411c-96fd-c511a4cfa86d".parse().unwrap(),
            name: "Testers".to_string(),
        };
        c.add_group(group.clone());
        assert_eq!(c.groups.len(), 1);
        c.remove_group(group.uuid);
        assert!(c.groups.is_empty());
    }

    #[test]
    fn urns_parse_through_the_grammar() {
        let urn = ContactUrn::parse("twitter:134252511151#billy_bob").unwrap();
        assert_eq!(urn.scheme, "twitter");
        assert_eq!(urn.display.as_deref(), Some("billy_bob"));
        assert!(ContactUrn::parse("bogus:12345").is_err());
    }
}
