//! The date format mini-language and environment-driven date parsing.
//!
//! Format placeholders are a single fixed table shared by parsing and
//! formatting: `YY YYYY M MM D DD h hh tt m mm s ss fff ffffff fffffffff
//! aa AA Z ZZZ`. The separators space, `:`, `,`, `T`, `-` and `_` pass
//! through; any other character is an error.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::envs::{DateFormat, Environment};
use crate::types::XDateTime;

// ──────────────────────────────────────────────
// Format translation
// ──────────────────────────────────────────────

/// Translates a mini-language format into a chrono strftime string.
/// The same output is used for parsing and formatting.
pub fn to_chrono_format(fmt: &str) -> Result<String, String> {
    let chars: Vec<char> = fmt.chars().collect();
    let mut out = String::new();
    let mut pos = 0usize;

    while pos < chars.len() {
        let c = chars[pos];
        let run = chars[pos..].iter().take_while(|&&r| r == c).count();

        let (mapped, used) = match c {
            'Y' if run >= 4 => ("%Y", 4),
            'Y' if run >= 2 => ("%y", 2),
            'M' if run >= 2 => ("%m", 2),
            'M' => ("%-m", 1),
            'D' if run >= 2 => ("%d", 2),
            'D' => ("%-d", 1),
            'h' if run >= 2 => ("%I", 2),
            'h' => ("%-I", 1),
            't' if run >= 2 => ("%H", 2),
            'm' if run >= 2 => ("%M", 2),
            'm' => ("%-M", 1),
            's' if run >= 2 => ("%S", 2),
            's' => ("%-S", 1),
            'f' if run >= 9 => ("%9f", 9),
            'f' if run >= 6 => ("%6f", 6),
            'f' if run >= 3 => ("%3f", 3),
            'a' if run >= 2 => ("%P", 2),
            'A' if run >= 2 => ("%p", 2),
            'Z' if run >= 3 => ("%:z", 3),
            'Z' => ("%:z", 1),
            ' ' => (" ", 1),
            ':' => (":", 1),
            ',' => (",", 1),
            'T' => ("T", 1),
            '-' => ("-", 1),
            '_' => ("_", 1),
            other => return Err(format!("unknown format char '{}'", other)),
        };
        out.push_str(mapped);
        pos += used;
    }
    Ok(out)
}

/// Parses text with a mini-language format, interpreting zone-less input in
/// `tz` and converting offset-carrying input into `tz`.
pub fn parse_with_format(text: &str, fmt: &str, tz: Tz) -> Result<XDateTime, String> {
    let chrono_fmt = to_chrono_format(fmt)?;
    let has_offset = chrono_fmt.contains("%:z");

    // chrono's %:z doesn't accept a literal Z for UTC
    let text = if has_offset && text.trim_end().ends_with('Z') {
        let trimmed = text.trim_end();
        format!("{}+00:00", &trimmed[..trimmed.len() - 1])
    } else {
        text.to_string()
    };

    if has_offset {
        let parsed = DateTime::<FixedOffset>::parse_from_str(&text, &chrono_fmt)
            .map_err(|e| format!("unable to parse \"{}\": {}", text, e))?;
        return Ok(XDateTime::in_zone(parsed.with_timezone(&Utc), tz));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(&text, &chrono_fmt) {
        return localize(naive, tz);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&text, &chrono_fmt) {
        return localize(date.and_hms_opt(0, 0, 0).unwrap(), tz);
    }
    Err(format!("unable to parse \"{}\" as \"{}\"", text, fmt))
}

/// Formats a datetime with a mini-language format, in its own zone.
pub fn format_with_format(dt: &XDateTime, fmt: &str) -> Result<String, String> {
    let chrono_fmt = to_chrono_format(fmt)?;
    let mut out = dt.instant().format(&chrono_fmt).to_string();
    // the bare Z placeholder renders UTC as a literal Z
    if fmt.contains('Z') && !fmt.contains("ZZZ") && dt.instant().offset().local_minus_utc() == 0 {
        out = out.replace("+00:00", "Z");
    }
    Ok(out)
}

fn localize(naive: NaiveDateTime, tz: Tz) -> Result<XDateTime, String> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| XDateTime::in_zone(local.with_timezone(&Utc), tz))
        .ok_or_else(|| format!("time {} does not exist in {}", naive, tz.name()))
}

// ──────────────────────────────────────────────
// Natural parsing
// ──────────────────────────────────────────────

static DATE_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)^\s*
          (\d{1,4})[-./\ ](\d{1,4})[-./\ ](\d{1,4})
          (?:[T\ ]\s*
             (\d{1,2}):(\d{2})
             (?::(\d{2})(?:\.(\d{1,9}))?)?
             \s*(?i:([ap]m))?
             \s*(Z|[+-]\d{2}:?\d{2})?
          )?\s*$",
    )
    .expect("valid datetime regex")
});

/// Parses free-form date text the way the environment orders components.
/// Accepts RFC 3339 directly; otherwise the three date numbers are assigned
/// per the environment's date format (a four digit number always wins the
/// year slot).
pub fn datetime_from_text(env: &Environment, text: &str) -> Option<XDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text.trim()) {
        return Some(XDateTime::new(parsed));
    }

    let caps = DATE_TIME_RE.captures(text)?;
    let nums: Vec<i64> = (1..=3).map(|i| caps[i].parse().ok()).collect::<Option<_>>()?;
    let four_digit = |i: usize| caps[i].len() == 4;

    let (year, month, day) = if four_digit(1) {
        (nums[0], nums[1], nums[2])
    } else if four_digit(3) || env.date_format != DateFormat::YearMonthDay {
        match env.date_format {
            DateFormat::MonthDayYear => (nums[2], nums[0], nums[1]),
            _ => (nums[2], nums[1], nums[0]),
        }
    } else {
        (nums[0], nums[1], nums[2])
    };
    let year = if year < 100 { year + 2000 } else { year };

    let mut hour: u32 = caps.get(4).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
    let min: u32 = caps.get(5).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
    let sec: u32 = caps.get(6).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
    let nanos: u32 = caps
        .get(7)
        .map(|m| {
            let digits = m.as_str();
            digits.parse::<u32>().unwrap_or(0) * 10u32.pow(9 - digits.len() as u32)
        })
        .unwrap_or(0);

    if let Some(ampm) = caps.get(8) {
        let pm = ampm.as_str().eq_ignore_ascii_case("pm");
        if pm && hour < 12 {
            hour += 12;
        } else if !pm && hour == 12 {
            hour = 0;
        }
    }

    let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?;
    let time = NaiveTime::from_hms_nano_opt(hour, min, sec, nanos)?;
    let naive = NaiveDateTime::new(date, time);

    if let Some(offset) = caps.get(9) {
        let offset = offset.as_str();
        let fixed = if offset == "Z" {
            FixedOffset::east_opt(0).unwrap()
        } else {
            let cleaned = offset.replace(':', "");
            let sign = if cleaned.starts_with('-') { -1 } else { 1 };
            let hours: i32 = cleaned[1..3].parse().ok()?;
            let mins: i32 = cleaned[3..5].parse().ok()?;
            FixedOffset::east_opt(sign * (hours * 3600 + mins * 60))?
        };
        return fixed.from_local_datetime(&naive).single().map(XDateTime::new);
    }

    localize(naive, env.timezone).ok()
}

// ──────────────────────────────────────────────
// Calendar arithmetic
// ──────────────────────────────────────────────

/// Builds a date from parts, letting the day overflow normalize forward
/// (Feb 31 becomes Mar 3). Month must already be validated to 1-12.
pub fn date_from_parts(env: &Environment, year: i64, month: i64, day: i64) -> Option<XDateTime> {
    build_normalized(year, month, day, NaiveTime::from_hms_opt(0, 0, 0).unwrap(), env.timezone)
}

/// Adds years, months and days with day-overflow normalization, preserving
/// the time of day and zone.
pub fn add_date(dt: &XDateTime, years: i64, months: i64, days: i64) -> Option<XDateTime> {
    let local = dt.instant();
    let (y, m, d) = (local.year() as i64 + years, local.month() as i64 + months, local.day() as i64 + days);
    let time = local.time();
    match dt.zone() {
        Some(tz) => build_normalized(y, m, d, time, tz),
        None => {
            let naive = normalized_naive(y, m, d)?.and_time(time);
            let offset = *local.offset();
            offset.from_local_datetime(&naive).single().map(XDateTime::new)
        }
    }
}

fn normalized_naive(year: i64, month: i64, day: i64) -> Option<NaiveDate> {
    // normalize month into 1-12 first, then let the day roll the result
    let total = year * 12 + (month - 1);
    let (y, m0) = (total.div_euclid(12), total.rem_euclid(12));
    let first = NaiveDate::from_ymd_opt(y as i32, (m0 + 1) as u32, 1)?;
    first.checked_add_signed(Duration::days(day - 1))
}

fn build_normalized(year: i64, month: i64, day: i64, time: NaiveTime, tz: Tz) -> Option<XDateTime> {
    let naive = normalized_naive(year, month, day)?.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| XDateTime::in_zone(local.with_timezone(&Utc), tz))
}

/// Civil days between two datetimes: the difference of their calendar
/// dates, independent of time of day.
pub fn days_between(a: &XDateTime, b: &XDateTime) -> i64 {
    (a.instant().date_naive() - b.instant().date_naive()).num_days()
}

/// Calendar months between two datetimes.
pub fn months_between(a: &XDateTime, b: &XDateTime) -> i64 {
    let (da, db) = (a.instant(), b.instant());
    (da.year() as i64 * 12 + da.month() as i64) - (db.year() as i64 * 12 + db.month() as i64)
}

/// The default display format for the environment: date format plus time format.
pub fn default_format(env: &Environment) -> String {
    format!("{} {}", env.date_format.as_str(), env.time_format.as_str())
}

/// Midnight today in the environment timezone.
pub fn today(env: &Environment) -> XDateTime {
    let now = env.now();
    let local = now.instant();
    build_normalized(
        local.year() as i64,
        local.month() as i64,
        local.day() as i64,
        NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
        env.timezone,
    )
    .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn guayaquil() -> Environment {
        Environment::default()
            .with_timezone(chrono_tz::America::Guayaquil)
            .with_date_format(DateFormat::DayMonthYear)
    }

    #[test]
    fn translates_placeholders() {
        assert_eq!(to_chrono_format("YYYY-MM-DD").unwrap(), "%Y-%m-%d");
        assert_eq!(to_chrono_format("YYYY M DD tt:mm").unwrap(), "%Y %-m %d %H:%M");
        assert_eq!(to_chrono_format("hh:mm:ss aa Z").unwrap(), "%I:%M:%S %P %:z");
        assert!(to_chrono_format("YYYY*MM").is_err());
    }

    #[test]
    fn parse_and_format_round_trip() {
        let tz = chrono_tz::America::Guayaquil;
        let parsed = parse_with_format("2010 5 10 12:50", "YYYY M DD tt:mm", tz).unwrap();
        assert_eq!(
            format_with_format(&parsed, "YYYY M DD tt:mm").unwrap(),
            "2010 5 10 12:50"
        );
        assert_eq!(parsed.to_text(), "2010-05-10T12:50:00.000000-05:00");
    }

    #[test]
    fn formats_utc_offset_as_z() {
        let d = XDateTime::in_zone(
            Utc.with_ymd_and_hms(1979, 7, 18, 15, 0, 0).unwrap(),
            chrono_tz::UTC,
        );
        assert_eq!(
            format_with_format(&d, "YYYY-MM-DDTtt:mm:ssZ").unwrap(),
            "1979-07-18T15:00:00Z"
        );
    }

    #[test]
    fn natural_parse_follows_environment_order() {
        let env = guayaquil();
        let d = datetime_from_text(&env, "18-07-1979").unwrap();
        assert_eq!(d.to_text(), "1979-07-18T00:00:00.000000-05:00");

        let d = datetime_from_text(&env, "2010 05 10").unwrap();
        assert_eq!(d.to_text(), "2010-05-10T00:00:00.000000-05:00");

        let d = datetime_from_text(&env, "1979-07-18T10:30:45.123456Z").unwrap();
        assert_eq!(d.to_text(), "1979-07-18T10:30:45.123456Z");

        assert!(datetime_from_text(&env, "NOT DATE").is_none());
    }

    #[test]
    fn day_overflow_normalizes_forward() {
        let env = Environment::default().with_timezone(chrono_tz::America::Guayaquil);
        let d = date_from_parts(&env, 2017, 2, 31).unwrap();
        assert_eq!(d.to_text(), "2017-03-03T00:00:00.000000-05:00");
    }

    #[test]
    fn add_date_normalizes_like_from_parts() {
        let env = Environment::default().with_timezone(chrono_tz::America::New_York);
        let base = datetime_from_text(&env, "2017-01-15").unwrap();
        let plus = add_date(&base, 0, 0, 5).unwrap();
        assert_eq!(plus.to_text(), "2017-01-20T00:00:00.000000-05:00");

        let jan31 = datetime_from_text(&env, "2017-01-31").unwrap();
        let feb = add_date(&jan31, 0, 1, 0).unwrap();
        assert_eq!(feb.to_text(), "2017-03-03T00:00:00.000000-05:00");
    }

    #[test]
    fn civil_day_and_month_counting() {
        let env = guayaquil();
        let a = datetime_from_text(&env, "2017-01-17 23:50").unwrap();
        let b = datetime_from_text(&env, "2017-01-15 01:00").unwrap();
        assert_eq!(days_between(&a, &b), 2);
        assert_eq!(months_between(&a, &b), 0);

        let c = datetime_from_text(&env, "2015-12-17").unwrap();
        assert_eq!(months_between(&a, &c), 13);
    }
}
