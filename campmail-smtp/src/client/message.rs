use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Raw bytes per RFC 2047 encoded word, keeping each word under 76 characters.
const ENCODED_WORD_BYTES: usize = 45;

/// A single HTML message to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    /// Plain-text rendition. Kept for callers and logs, never transmitted.
    #[serde(default)]
    pub text: String,
    pub html: String,
}

impl EmailMessage {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        text: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            text: text.into(),
            html: html.into(),
        }
    }

    /// Renders the DATA payload: headers, a blank line, the dot-stuffed HTML
    /// body and the terminating `.` line without its final CRLF.
    #[must_use]
    pub fn render<Tz>(&self, from: &str, date: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let headers = [
            ("From", header_value(from)),
            ("To", header_value(&self.to)),
            ("Subject", encode_subject(&header_value(&self.subject))),
            ("Content-Type", "text/html; charset=UTF-8".to_string()),
            ("MIME-Version", "1.0".to_string()),
            ("Date", date.to_rfc2822()),
        ];

        let mut payload = String::with_capacity(self.html.len() + 256);
        for (name, value) in headers {
            payload.push_str(name);
            payload.push_str(": ");
            payload.push_str(&value);
            payload.push_str("\r\n");
        }
        payload.push_str("\r\n");
        payload.push_str(&stuff_body(&self.html));
        payload.push_str("\r\n.");
        payload
    }
}

/// Header values must stay on one line.
fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

fn encode_subject(subject: &str) -> String {
    if subject.is_ascii() {
        return subject.to_string();
    }

    let mut words = Vec::new();
    let mut start = 0;
    let mut end = 0;
    for (index, c) in subject.char_indices() {
        let next = index + c.len_utf8();
        if next - start > ENCODED_WORD_BYTES {
            words.push(&subject[start..end]);
            start = end;
        }
        end = next;
    }
    words.push(&subject[start..end]);

    words
        .into_iter()
        .map(|word| format!("=?UTF-8?B?{}?=", STANDARD.encode(word)))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

/// Normalises line endings to CRLF and doubles a leading `.` on every line.
fn stuff_body(body: &str) -> String {
    let normalised = body.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = normalised.strip_suffix('\n').unwrap_or(&normalised);

    trimmed
        .split('\n')
        .map(|line| {
            if line.starts_with('.') {
                format!(".{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\r\n")
}
