use std::fmt;

/// A line (or, for [`Command::Message`], a block) the client writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ehlo(String),
    StartTls,
    AuthLogin,
    /// A base64 encoded username or password sent in answer to a `334` prompt.
    Credential(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// The rendered message, already dot-stuffed and ending in the `.` line.
    Message(String),
    Quit,
}

impl Command {
    /// The name used when logging this command and in timeout errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ehlo(_) => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::AuthLogin => "AUTH LOGIN",
            Self::Credential(_) => "AUTH credential",
            Self::MailFrom(_) => "MAIL FROM",
            Self::RcptTo(_) => "RCPT TO",
            Self::Data => "DATA",
            Self::Message(_) => "message data",
            Self::Quit => "QUIT",
        }
    }

    /// Text that is safe to write to logs.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Credential(_) => "<credential redacted>".to_string(),
            Self::Message(body) => format!("<message, {} bytes>", body.len()),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ehlo(domain) => write!(f, "EHLO {domain}"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::AuthLogin => f.write_str("AUTH LOGIN"),
            Self::Credential(encoded) => f.write_str(encoded),
            Self::MailFrom(from) => write!(f, "MAIL FROM:<{from}>"),
            Self::RcptTo(to) => write!(f, "RCPT TO:<{to}>"),
            Self::Data => f.write_str("DATA"),
            Self::Message(body) => f.write_str(body),
            Self::Quit => f.write_str("QUIT"),
        }
    }
}
