//! Error types for the SMTP client.

use std::{io, time::Duration};

use thiserror::Error;

use super::{fsm::State, reply::Reply};

/// Everything that can end a delivery attempt early.
///
/// The rejection variants carry the server's reply so that callers can tell a
/// permanent refusal from a transient one.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Failed to parse SMTP reply: {0}")]
    Parse(String),

    #[error("Invalid greeting: {0}")]
    InvalidGreeting(Reply),

    #[error("AUTH LOGIN failed: {0}")]
    AuthLoginRejected(Reply),

    #[error("Username rejected: {0}")]
    UsernameRejected(Reply),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(Reply),

    #[error("Sender rejected: {0}")]
    SenderRejected(Reply),

    #[error("Recipient rejected: {0}")]
    RecipientRejected(Reply),

    #[error("DATA command failed: {0}")]
    DataRejected(Reply),

    #[error("Message delivery failed: {0}")]
    MessageRejected(Reply),

    /// The conversation received an event its current state cannot handle.
    #[error("Unexpected {event} in state {state:?}")]
    OutOfSequence { state: State, event: &'static str },
}

impl ClientError {
    /// The server reply that caused the failure, if the server refused a step.
    #[must_use]
    pub const fn reply(&self) -> Option<&Reply> {
        match self {
            Self::InvalidGreeting(reply)
            | Self::AuthLoginRejected(reply)
            | Self::UsernameRejected(reply)
            | Self::AuthenticationFailed(reply)
            | Self::SenderRejected(reply)
            | Self::RecipientRejected(reply)
            | Self::DataRejected(reply)
            | Self::MessageRejected(reply) => Some(reply),
            _ => None,
        }
    }

    /// Returns `true` if the server answered but refused the conversation.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        self.reply().is_some()
    }

    /// Returns `true` if retrying later cannot help, i.e. the server refused
    /// with a 5xx code.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        match self.reply() {
            Some(reply) => reply.is_permanent_error(),
            None => false,
        }
    }
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(code: u16, text: &str) -> Reply {
        Reply::new(code, vec![text.to_string()])
    }

    #[test]
    fn test_rejection_messages_carry_reply() {
        let error = ClientError::RecipientRejected(reply(550, "No such user"));
        assert_eq!(error.to_string(), "Recipient rejected: 550 No such user");

        let error = ClientError::AuthenticationFailed(reply(535, "5.7.8 Bad credentials"));
        assert_eq!(
            error.to_string(),
            "Authentication failed: 535 5.7.8 Bad credentials"
        );
    }

    #[test]
    fn test_classification() {
        let permanent = ClientError::MessageRejected(reply(554, "Spam"));
        assert!(permanent.is_rejection());
        assert!(permanent.is_permanent());

        let transient = ClientError::RecipientRejected(reply(451, "Try later"));
        assert!(transient.is_rejection());
        assert!(!transient.is_permanent());

        assert!(!ClientError::ConnectionClosed.is_rejection());
        assert!(ClientError::ConnectionClosed.reply().is_none());
    }

    #[test]
    fn test_timeout_message() {
        let error = ClientError::Timeout {
            operation: "RCPT TO",
            after: Duration::from_secs(30),
        };
        assert_eq!(error.to_string(), "RCPT TO timed out after 30s");
    }
}
