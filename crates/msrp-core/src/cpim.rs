//! Message/CPIM envelopes (RFC 3862)
//!
//! A CPIM message is a block of message headers, an empty line, the MIME
//! headers of the wrapped content, another empty line and the content:
//!
//! ```text
//! From: <sip:alice@example.com>
//! To: <sip:bob@example.com>
//! DateTime: 2024-05-01T10:00:00Z
//!
//! Content-Type: text/plain
//!
//! hello
//! ```

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{MsrpError, MsrpResult};

pub const CPIM_CONTENT_TYPE: &str = "message/cpim";

/// Content type assumed when the wrapped part carries none
const DEFAULT_WRAPPED_TYPE: &str = "text/plain";

/// An outgoing envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpimMessage {
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
    pub content_type: String,
    pub body: String,
}

impl CpimMessage {
    pub fn new(
        body: impl Into<String>,
        content_type: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            timestamp,
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

fn angle(uri: &str) -> String {
    if uri.starts_with('<') {
        uri.to_string()
    } else {
        format!("<{}>", uri)
    }
}

impl fmt::Display for CpimMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "From: {}\r\n", angle(&self.from))?;
        write!(f, "To: {}\r\n", angle(&self.to))?;
        write!(
            f,
            "DateTime: {}\r\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
        write!(f, "\r\nContent-Type: {}\r\n\r\n{}", self.content_type, self.body)
    }
}

/// An envelope received from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCpim {
    /// Message headers followed by the MIME headers of the content, in order
    pub headers: Vec<(String, String)>,
    pub content_type: String,
    pub content: String,
}

impl ParsedCpim {
    /// First header called `name`, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.header("DateTime")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Split `text` at the first empty line; both `\r\n` and `\n` line ends are accepted
fn split_block(text: &str) -> Option<(&str, &str)> {
    let crlf = text.find("\r\n\r\n").map(|i| (i, 4));
    let lf = text.find("\n\n").map(|i| (i, 2));
    let (at, len) = match (crlf, lf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((&text[..at], &text[at + len..]))
}

fn parse_headers(block: &str, headers: &mut Vec<(String, String)>) -> MsrpResult<()> {
    for line in block.lines().map(|l| l.trim_end_matches('\r')) {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| MsrpError::envelope(format!("malformed header line '{}'", line)))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok(())
}

/// Parse a received `message/cpim` body
pub fn parse(data: &[u8]) -> MsrpResult<ParsedCpim> {
    let text = std::str::from_utf8(data).map_err(|_| MsrpError::envelope("body is not UTF-8"))?;

    let (message_headers, rest) =
        split_block(text).ok_or_else(|| MsrpError::envelope("missing message header block"))?;
    let (mime_headers, content) =
        split_block(rest).ok_or_else(|| MsrpError::envelope("missing content header block"))?;

    let mut headers = Vec::new();
    parse_headers(message_headers, &mut headers)?;
    let mime_start = headers.len();
    parse_headers(mime_headers, &mut headers)?;

    let content_type = headers[mime_start..]
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("Content-Type"))
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| DEFAULT_WRAPPED_TYPE.to_string());

    Ok(ParsedCpim {
        headers,
        content_type,
        content: content.to_string(),
    })
}
