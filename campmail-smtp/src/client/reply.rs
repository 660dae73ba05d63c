//! SMTP reply parsing.
//!
//! A reply is one or more lines sharing a three digit code. Every line but the
//! last has a `-` after the code, the last has a space or nothing
//! (RFC 5321 section 4.2). A final line without a code is kept as raw text so
//! the conversation can decide whether the code mattered.

use std::fmt;

use super::error::{ClientError, Result};

/// One line of a possibly multi-line reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    /// `None` when the line does not start with three digits.
    pub code: Option<u16>,
    /// `false` when the server marked the line with a `-` continuation.
    pub is_last: bool,
    pub text: String,
}

impl ReplyLine {
    /// Parses a single line with its line terminator already removed.
    ///
    /// A line without a leading three digit code is a final line whose text
    /// is the whole line.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let code = line
            .get(..3)
            .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u16>().ok());

        let Some(code) = code else {
            return Self {
                code: None,
                is_last: true,
                text: line.to_string(),
            };
        };

        let rest = &line[3..];
        let (is_last, text) = match rest.strip_prefix('-') {
            Some(text) => (false, text),
            None => (true, rest.strip_prefix(' ').unwrap_or(rest)),
        };

        Self {
            code: Some(code),
            is_last,
            text: text.to_string(),
        }
    }
}

/// A complete server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: Option<u16>,
    pub lines: Vec<String>,
}

impl Reply {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self {
            code: Some(code),
            lines,
        }
    }

    /// A reply whose line carried no code.
    #[must_use]
    pub fn uncoded(text: impl Into<String>) -> Self {
        Self {
            code: None,
            lines: vec![text.into()],
        }
    }

    /// The text of every line, joined with newlines.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Equivalent to checking that the raw reply starts with `code`.
    #[must_use]
    pub const fn has_code(&self, code: u16) -> bool {
        matches!(self.code, Some(actual) if actual == code)
    }

    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        matches!(self.code, Some(500..=599))
    }

    /// Parses the first complete reply in `buffer`.
    ///
    /// Returns the reply and the number of bytes it occupied, or `None` when
    /// the final line has not arrived yet. Blank lines are skipped. Bytes that
    /// are not UTF-8 are replaced rather than rejected, some servers greet in
    /// Latin-1.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Parse`] when the lines of a multi-line reply
    /// disagree on the code.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(offset) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + offset];
            consumed += offset + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let line = ReplyLine::parse(&String::from_utf8_lossy(raw));
            if !lines.is_empty() && line.code != code {
                return Err(ClientError::Parse(format!(
                    "reply code changed from {} to {} within one reply",
                    describe(code),
                    describe(line.code)
                )));
            }

            code = line.code;
            lines.push(line.text);
            if line.is_last {
                return Ok(Some((Self { code, lines }, consumed)));
            }
        }

        Ok(None)
    }
}

fn describe(code: Option<u16>) -> String {
    code.map_or_else(|| "none".to_string(), |code| code.to_string())
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.lines.join(" ");
        match self.code {
            Some(code) if text.is_empty() => write!(f, "{code}"),
            Some(code) => write!(f, "{code} {text}"),
            None => f.write_str(&text),
        }
    }
}
