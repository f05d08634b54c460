//! The evaluation environment: formats, timezone, languages and redaction.

use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::types::XDateTime;

/// Recognized date layouts, named by component order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateFormat {
    #[serde(rename = "DD-MM-YYYY")]
    DayMonthYear,
    #[serde(rename = "MM-DD-YYYY")]
    MonthDayYear,
    #[serde(rename = "YYYY-MM-DD")]
    YearMonthDay,
}

impl DateFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateFormat::DayMonthYear => "DD-MM-YYYY",
            DateFormat::MonthDayYear => "MM-DD-YYYY",
            DateFormat::YearMonthDay => "YYYY-MM-DD",
        }
    }
}

/// Recognized time layouts. `tt` is the 24 hour clock, `hh` the 12 hour one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFormat {
    #[serde(rename = "tt:mm")]
    HourMin,
    #[serde(rename = "tt:mm:ss")]
    HourMinSec,
    #[serde(rename = "hh:mm aa")]
    HourMin12,
    #[serde(rename = "hh:mm:ss aa")]
    HourMinSec12,
}

impl TimeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFormat::HourMin => "tt:mm",
            TimeFormat::HourMinSec => "tt:mm:ss",
            TimeFormat::HourMin12 => "hh:mm aa",
            TimeFormat::HourMinSec12 => "hh:mm:ss aa",
        }
    }
}

/// What to hide when values are rendered for an untrusted audience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionPolicy {
    None,
    Urns,
}

/// The environment a session evaluates in: date and time layout, timezone,
/// language preferences and the redaction policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub date_format: DateFormat,
    pub time_format: TimeFormat,
    pub timezone: Tz,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_languages: Vec<String>,
    #[serde(default = "default_redaction")]
    pub redaction_policy: RedactionPolicy,
    #[serde(skip)]
    now_override: Option<DateTime<Utc>>,
}

fn default_redaction() -> RedactionPolicy {
    RedactionPolicy::None
}

impl Default for Environment {
    fn default() -> Self {
        Environment {
            date_format: DateFormat::YearMonthDay,
            time_format: TimeFormat::HourMin,
            timezone: chrono_tz::UTC,
            default_language: None,
            allowed_languages: Vec::new(),
            redaction_policy: RedactionPolicy::None,
            now_override: None,
        }
    }
}

impl Environment {
    /// The current moment in the environment's timezone.
    pub fn now(&self) -> XDateTime {
        let instant = self.now_override.unwrap_or_else(Utc::now);
        XDateTime::in_zone(instant, self.timezone)
    }

    /// Pins `now()` for deterministic evaluation, e.g. in tests.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now_override = Some(now);
        self
    }

    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.timezone = tz;
        self
    }

    pub fn with_date_format(mut self, fmt: DateFormat) -> Self {
        self.date_format = fmt;
        self
    }

    /// The fixed offset of the environment timezone at the given instant.
    pub fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset {
        self.timezone
            .offset_from_utc_datetime(&instant.naive_utc())
            .fix()
    }

    /// The localization lookup order: contact language first, then the
    /// environment default, restricted to allowed languages when set.
    pub fn language_order<'a>(&'a self, contact_language: Option<&'a str>) -> Vec<&'a str> {
        let mut order = Vec::new();
        for lang in contact_language.into_iter().chain(self.default_language.as_deref()) {
            let allowed =
                self.allowed_languages.is_empty() || self.allowed_languages.iter().any(|l| l == lang);
            if allowed && !order.contains(&lang) {
                order.push(lang);
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_round_trips_through_json() {
        let json = r#"{
            "date_format": "DD-MM-YYYY",
            "time_format": "tt:mm",
            "timezone": "America/Guayaquil",
            "default_language": "eng",
            "allowed_languages": ["eng", "fra"],
            "redaction_policy": "none"
        }"#;
        let env: Environment = serde_json::from_str(json).unwrap();
        assert_eq!(env.date_format, DateFormat::DayMonthYear);
        assert_eq!(env.timezone, chrono_tz::America::Guayaquil);

        let out = serde_json::to_value(&env).unwrap();
        assert_eq!(out["timezone"], "America/Guayaquil");
        assert_eq!(out["date_format"], "DD-MM-YYYY");
    }

    #[test]
    fn language_order_prefers_contact_then_default() {
        let env = Environment {
            default_language: Some("eng".to_string()),
            allowed_languages: vec!["eng".to_string(), "fra".to_string()],
            ..Environment::default()
        };
        assert_eq!(env.language_order(Some("fra")), vec!["fra", "eng"]);
        assert_eq!(env.language_order(Some("spa")), vec!["eng"]);
        assert_eq!(env.language_order(None), vec!["eng"]);
    }
}
