//! Waits: how a session pauses and what lets it resume.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{Event, EventKind};

/// A wait attached to the innermost active run and the session. The engine
/// never sleeps: `timeout_on` is informational to the caller, which
/// schedules the follow-up resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Wait {
    /// Waits for a message from the contact.
    Msg {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_on: Option<DateTime<Utc>>,
    },
    /// Hands control back to the caller without waiting for anything.
    Nothing,
}

impl Wait {
    /// Stamps the timeout deadline at wait start.
    pub fn begin(&mut self, now: DateTime<Utc>) {
        if let Wait::Msg { timeout: Some(seconds), timeout_on } = self {
            *timeout_on = Some(now + Duration::seconds(*seconds as i64));
        }
    }

    /// The event announcing this wait to the caller.
    pub fn event(&self) -> EventKind {
        match self {
            Wait::Msg { timeout, timeout_on } => EventKind::MsgWait {
                timeout: *timeout,
                timeout_on: *timeout_on,
            },
            Wait::Nothing => EventKind::NothingWait {},
        }
    }

    /// Whether the caller events satisfy this wait.
    pub fn can_resume(&self, caller_events: &[Event]) -> bool {
        match self {
            Wait::Msg { .. } => caller_events.iter().any(|e| {
                matches!(e.kind(), EventKind::MsgReceived { .. } | EventKind::WaitTimedOut {})
            }),
            Wait::Nothing => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;

    #[test]
    fn msg_wait_stamps_timeout_on() {
        let mut wait = Wait::Msg { timeout: Some(300), timeout_on: None };
        let now = Utc::now();
        wait.begin(now);
        match wait {
            Wait::Msg { timeout_on: Some(on), .. } => {
                assert_eq!(on, now + Duration::seconds(300))
            }
            other => panic!("unexpected wait: {:?}", other),
        }
    }

    #[test]
    fn msg_wait_resumes_on_msg_or_timeout() {
        let wait = Wait::Msg { timeout: None, timeout_on: None };
        let msg = Event::new(EventKind::MsgReceived {
            text: "hi".to_string(),
            urn: None,
            channel: None,
            attachments: Vec::new(),
        });
        let timed_out = Event::new(EventKind::WaitTimedOut {});
        let unrelated = Event::new(EventKind::NothingWait {});

        assert!(wait.can_resume(&[msg]));
        assert!(wait.can_resume(&[timed_out]));
        assert!(!wait.can_resume(&[unrelated]));
        assert!(!wait.can_resume(&[]));
    }

    #[test]
    fn nothing_wait_always_resumes() {
        assert!(Wait::Nothing.can_resume(&[]));
    }
}
