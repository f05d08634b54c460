//! Synchronous webhook calls made from inside the node sweep.

use std::time::Duration;

use crate::engine::EngineConfig;

/// Request headers whose values never appear in emitted events.
const REDACTED_HEADERS: &[&str] = &["authorization", "proxy-authorization"];

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookStatus {
    Success,
    ResponseError,
    ConnectionError,
    SubscriberGone,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookStatus::Success => "success",
            WebhookStatus::ResponseError => "response_error",
            WebhookStatus::ConnectionError => "connection_error",
            WebhookStatus::SubscriberGone => "subscriber_gone",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    pub url: String,
    pub status: WebhookStatus,
    pub status_code: u16,
    /// The request line and headers as sent, secrets redacted.
    pub request: String,
    /// The response body, capped at the configured size.
    pub response: String,
}

/// Performs the call. Transport failures classify as connection errors
/// rather than propagating; the sweep always continues.
pub fn call(
    config: &EngineConfig,
    method: &str,
    url: &str,
    headers: &[(String, String)],
    body: Option<&str>,
) -> WebhookOutcome {
    let request_trace = trace_request(method, url, headers, body);
    tracing::debug!(method, url, "calling webhook");

    let client = match reqwest::blocking::Client::builder().timeout(CALL_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => return connection_error(url, request_trace, e.to_string()),
    };
    let method = match method.to_uppercase().parse::<reqwest::Method>() {
        Ok(m) => m,
        Err(_) => return connection_error(url, request_trace, format!("invalid method '{}'", method)),
    };

    let mut request = client.request(method, url);
    for (name, value) in headers {
        request = request.header(name, value);
    }
    if let Some(body) = body {
        request = request.body(body.to_string());
    }

    let response = match request.send() {
        Ok(r) => r,
        Err(e) => return connection_error(url, request_trace, e.to_string()),
    };

    let status_code = response.status().as_u16();
    let status = match status_code {
        410 => WebhookStatus::SubscriberGone,
        200..=299 => WebhookStatus::Success,
        _ => WebhookStatus::ResponseError,
    };
    let body = response.text().unwrap_or_default();

    WebhookOutcome {
        url: url.to_string(),
        status,
        status_code,
        request: request_trace,
        response: truncate_body(&body, config.max_webhook_response_bytes),
    }
}

fn connection_error(url: &str, request: String, message: String) -> WebhookOutcome {
    WebhookOutcome {
        url: url.to_string(),
        status: WebhookStatus::ConnectionError,
        status_code: 0,
        request,
        response: message,
    }
}

fn trace_request(method: &str, url: &str, headers: &[(String, String)], body: Option<&str>) -> String {
    let mut trace = format!("{} {}", method.to_uppercase(), url);
    for (name, value) in headers {
        let shown = if REDACTED_HEADERS.contains(&name.to_lowercase().as_str()) {
            "****************"
        } else {
            value.as_str()
        };
        trace.push_str(&format!("\n{}: {}", name, shown));
    }
    if let Some(body) = body {
        trace.push_str("\n\n");
        trace.push_str(body);
    }
    trace
}

/// Caps the body at `max_bytes`, rolling back to the last complete UTF-8
/// code point so the result is always a valid string.
fn truncate_body(body: &str, max_bytes: usize) -> String {
    if body.len() <= max_bytes {
        return body.to_string();
    }
    let mut cut = max_bytes;
    while cut > 0 && !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &body[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_preserves_code_points() {
        // each emoji is four bytes; a cut mid-sequence rolls back
        let body = "😀😃😄";
        assert_eq!(truncate_body(body, 6), "😀...");
        assert_eq!(truncate_body(body, 8), "😀😃...");
        assert_eq!(truncate_body(body, 12), "😀😃😄");
    }

    #[test]
    fn request_traces_redact_auth_headers() {
        let trace = trace_request(
            "post",
            "http://example.com/hook",
            &[
                ("Authorization".to_string(), "Token sesame".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            Some("{}"),
        );
        assert!(trace.starts_with("POST http://example.com/hook"));
        assert!(!trace.contains("sesame"));
        assert!(trace.contains("Authorization: ****************"));
        assert!(trace.contains("Content-Type: application/json"));
        assert!(trace.ends_with("\n\n{}"));
    }

    #[test]
    fn statuses_classify_by_code() {
        assert_eq!(WebhookStatus::Success.as_str(), "success");
        assert_eq!(WebhookStatus::SubscriberGone.as_str(), "subscriber_gone");
    }
}
