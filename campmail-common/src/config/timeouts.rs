//! Timeout configuration for outbound SMTP conversations.
//!
//! Every socket read, the TCP connect and the TLS handshake are guarded by
//! one of these deadlines. When one expires the delivery fails and the
//! connection is still closed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Accessors returning [`Duration`]s for the configured deadlines.
pub trait TimeoutConfig {
    /// Deadline for establishing the TCP connection.
    fn connect_timeout(&self) -> Duration;

    /// Deadline for the reply to an ordinary command (and the greeting).
    fn command_timeout(&self) -> Duration;

    /// Deadline for the TLS handshake after `STARTTLS` was accepted.
    fn starttls_timeout(&self) -> Duration;

    /// Deadline for the final reply after the message body.
    fn data_timeout(&self) -> Duration;

    /// Deadline for the reply to `QUIT`; expiry never fails a delivery.
    fn quit_timeout(&self) -> Duration;
}

/// Client-side SMTP timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTimeouts {
    /// Default: 30 seconds
    #[serde(default = "defaults::connect_secs")]
    pub connect_secs: u64,

    /// Greeting, EHLO, AUTH, MAIL FROM, RCPT TO and DATA replies.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::command_secs")]
    pub command_secs: u64,

    /// Default: 30 seconds
    #[serde(default = "defaults::starttls_secs")]
    pub starttls_secs: u64,

    /// Longer than the others, servers may scan the message before replying.
    ///
    /// Default: 120 seconds
    #[serde(default = "defaults::data_secs")]
    pub data_secs: u64,

    /// Default: 10 seconds
    #[serde(default = "defaults::quit_secs")]
    pub quit_secs: u64,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: defaults::connect_secs(),
            command_secs: defaults::command_secs(),
            starttls_secs: defaults::starttls_secs(),
            data_secs: defaults::data_secs(),
            quit_secs: defaults::quit_secs(),
        }
    }
}

impl ClientTimeouts {
    /// Uses the same deadline for every operation.
    #[must_use]
    pub const fn uniform(secs: u64) -> Self {
        Self {
            connect_secs: secs,
            command_secs: secs,
            starttls_secs: secs,
            data_secs: secs,
            quit_secs: secs,
        }
    }
}

impl TimeoutConfig for ClientTimeouts {
    fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    fn starttls_timeout(&self) -> Duration {
        Duration::from_secs(self.starttls_secs)
    }

    fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    fn quit_timeout(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }
}

mod defaults {
    pub const fn connect_secs() -> u64 {
        30
    }
    pub const fn command_secs() -> u64 {
        30
    }
    pub const fn starttls_secs() -> u64 {
        30
    }
    pub const fn data_secs() -> u64 {
        120
    }
    pub const fn quit_secs() -> u64 {
        10
    }
}
