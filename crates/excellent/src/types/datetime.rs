//! Datetime values: an instant plus an optional named IANA zone.

use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, Utc};
use chrono_tz::Tz;

/// A datetime value. The instant is authoritative; the zone name is carried
/// so `tz()` can report "America/Guayaquil" rather than a bare offset when
/// the source supplied one.
#[derive(Debug, Clone, Copy)]
pub struct XDateTime {
    instant: DateTime<FixedOffset>,
    zone: Option<Tz>,
}

impl XDateTime {
    pub fn new(instant: DateTime<FixedOffset>) -> Self {
        XDateTime { instant, zone: None }
    }

    pub fn in_zone(instant: DateTime<Utc>, zone: Tz) -> Self {
        let local = instant.with_timezone(&zone);
        XDateTime {
            instant: local.with_timezone(&local.offset().fix()),
            zone: Some(zone),
        }
    }

    /// Re-interprets this datetime in another named zone, keeping the instant.
    pub fn with_zone(&self, zone: Tz) -> Self {
        XDateTime::in_zone(self.instant.with_timezone(&Utc), zone)
    }

    pub fn instant(&self) -> DateTime<FixedOffset> {
        self.instant
    }

    pub fn zone(&self) -> Option<Tz> {
        self.zone
    }

    /// The zone name: the IANA name when known, "UTC" for a bare zero
    /// offset, otherwise the `±HH:MM` offset string.
    pub fn zone_name(&self) -> String {
        match self.zone {
            Some(tz) => tz.name().to_string(),
            None if self.instant.offset().local_minus_utc() == 0 => "UTC".to_string(),
            None => self.instant.format("%:z").to_string(),
        }
    }

    /// The canonical text form: RFC 3339 with microseconds, `Z` for UTC.
    pub fn to_text(&self) -> String {
        self.instant.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl PartialEq for XDateTime {
    fn eq(&self, other: &Self) -> bool {
        self.instant == other.instant
    }
}

impl From<DateTime<FixedOffset>> for XDateTime {
    fn from(instant: DateTime<FixedOffset>) -> Self {
        XDateTime::new(instant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn utc_text_form_uses_z() {
        let d = XDateTime::in_zone(
            Utc.with_ymd_and_hms(2017, 6, 12, 16, 56, 59).unwrap(),
            chrono_tz::UTC,
        );
        assert_eq!(d.to_text(), "2017-06-12T16:56:59.000000Z");
        assert_eq!(d.zone_name(), "UTC");
    }

    #[test]
    fn named_zone_text_form_carries_offset() {
        let d = XDateTime::in_zone(
            Utc.with_ymd_and_hms(2017, 1, 20, 5, 0, 0).unwrap(),
            chrono_tz::America::New_York,
        );
        assert_eq!(d.to_text(), "2017-01-20T00:00:00.000000-05:00");
        assert_eq!(d.zone_name(), "America/New_York");
    }

    #[test]
    fn equality_compares_instants() {
        let utc = XDateTime::in_zone(
            Utc.with_ymd_and_hms(2017, 1, 20, 5, 0, 0).unwrap(),
            chrono_tz::UTC,
        );
        let ny = utc.with_zone(chrono_tz::America::New_York);
        assert_eq!(utc, ny);
    }
}
