//! URN parsing, validation and formatting.
//!
//! The grammar is `scheme:path[#display]` over a closed scheme set. Paths
//! are scheme-checked: phone numbers must be digits with an optional
//! leading `+`, emails must contain an `@`.

use once_cell::sync::Lazy;
use regex::Regex;

/// The recognized URN schemes.
pub const VALID_SCHEMES: &[&str] = &[
    "ext", "facebook", "fcm", "line", "mailto", "tel", "telegram", "twitter", "viber", "whatsapp",
];

pub fn is_valid_scheme(scheme: &str) -> bool {
    VALID_SCHEMES.contains(&scheme)
}

static TEL_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?\d{3,15}$").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Urn {
    scheme: String,
    path: String,
    display: Option<String>,
}

impl Urn {
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn display(&self) -> Option<&str> {
        self.display.as_deref()
    }

    /// The canonical `scheme:path[#display]` string.
    pub fn to_urn_string(&self) -> String {
        match &self.display {
            Some(d) => format!("{}:{}#{}", self.scheme, self.path, d),
            None => format!("{}:{}", self.scheme, self.path),
        }
    }

    /// A human friendly rendering: the display when present, phone digits
    /// grouped in threes for tel URNs, the bare path otherwise.
    pub fn format(&self) -> String {
        if let Some(display) = &self.display {
            return display.clone();
        }
        if self.scheme == "tel" {
            return group_digits(self.path.trim_start_matches('+'));
        }
        self.path.clone()
    }
}

/// Parses and validates a URN string.
pub fn parse(input: &str) -> Result<Urn, String> {
    let (scheme, rest) = input
        .split_once(':')
        .ok_or_else(|| "missing scheme".to_string())?;
    if !is_valid_scheme(scheme) {
        return Err(format!("unknown scheme '{}'", scheme));
    }

    let (path, display) = match rest.split_once('#') {
        Some((p, d)) => (p, Some(d.to_string())),
        None => (rest, None),
    };
    if path.is_empty() {
        return Err("empty path".to_string());
    }

    match scheme {
        "tel" if !TEL_PATH.is_match(path) => {
            return Err(format!("invalid phone number '{}'", path))
        }
        "mailto" if !path.contains('@') => {
            return Err(format!("invalid email address '{}'", path))
        }
        _ => {}
    }

    Ok(Urn {
        scheme: scheme.to_string(),
        path: path.to_string(),
        display,
    })
}

fn group_digits(digits: &str) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut groups: Vec<String> = Vec::new();
    let mut end = chars.len();
    while end > 0 {
        let start = end.saturating_sub(3);
        groups.push(chars[start..end].iter().collect());
        end = start;
    }
    groups.reverse();
    groups.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_path_display() {
        let urn = parse("twitter:134252511151#billy_bob").unwrap();
        assert_eq!(urn.scheme(), "twitter");
        assert_eq!(urn.path(), "134252511151");
        assert_eq!(urn.display(), Some("billy_bob"));
        assert_eq!(urn.format(), "billy_bob");
        assert_eq!(urn.to_urn_string(), "twitter:134252511151#billy_bob");
    }

    #[test]
    fn rejects_malformed_urns() {
        assert!(parse("NOT URN").is_err());
        assert!(parse("bogus:12345").is_err());
        assert!(parse("tel:").is_err());
        assert!(parse("tel:abcdef").is_err());
        assert!(parse("mailto:no-at-sign").is_err());
    }

    #[test]
    fn tel_formatting_groups_digits() {
        let urn = parse("tel:+250781234567").unwrap();
        assert_eq!(urn.format(), "250 781 234 567");
        let urn = parse("mailto:foo@bar.com").unwrap();
        assert_eq!(urn.format(), "foo@bar.com");
    }
}
