//! Extraction of `<Code>` and `<Message>` from S3 XML error bodies.

use regex::Regex;
use std::sync::LazyLock;

static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Code>([^<]+)</Code>").expect("valid regex"));
static MESSAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Message>([^<]+)</Message>").expect("valid regex"));
// "403 Forbidden", "400 Bad Request" as rendered by the HTTP client
static STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([1-5][0-9]{2}) [A-Z][A-Za-z]").expect("valid regex"));

fn capture(re: &Regex, body: &str) -> Option<String> {
    re.captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Returns `(code, message)` when both are present in `body`.
pub fn parse_s3_error(body: &str) -> Option<(String, String)> {
    Some((capture(&CODE_RE, body)?, capture(&MESSAGE_RE, body)?))
}

/// First HTTP status line embedded in an error rendering.
pub fn parse_status(text: &str) -> Option<u16> {
    STATUS_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Human message for a failed storage write.
pub fn describe_failure(status: u16, parsed: Option<&(String, String)>) -> String {
    match parsed {
        Some((code, message)) => {
            format!("S3 upload failed. Status: {status} ({code} - {message})")
        }
        None => format!("S3 upload failed. Status: {status}"),
    }
}
