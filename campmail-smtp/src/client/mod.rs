//! Asynchronous SMTP submission client.
//!
//! One call to [`SmtpClient::deliver`] opens a connection, greets the server,
//! upgrades to TLS with `STARTTLS` on the submission port, authenticates with
//! `AUTH LOGIN`, submits one HTML message and says `QUIT`. The connection is
//! closed on every exit path.
//!
//! ```no_run
//! use campmail_smtp::client::{EmailMessage, SmtpClient, SmtpSettings};
//!
//! # async fn example() {
//! let settings = SmtpSettings::new("smtp.example.com", 587, "user", "secret", "camp@example.com");
//! let message = EmailMessage::new(
//!     "parent@example.com",
//!     "Registration open",
//!     "Registration is open.",
//!     "<p>Registration is open.</p>",
//! );
//!
//! let result = SmtpClient::new().deliver(&settings, &message).await;
//! if !result.success {
//!     eprintln!("{}", result.error.unwrap_or_default());
//! }
//! # }
//! ```
//!
//! The conversation itself lives in [`fsm`] and performs no I/O; the client
//! only moves bytes between it and a [`connection::Connection`].

pub mod command;
pub mod connection;
mod error;
pub mod fsm;
mod message;
pub mod reply;
mod result;
mod settings;
mod smtp_client;
pub mod tls;

pub use error::{ClientError, Result};
pub use message::EmailMessage;
pub use reply::Reply;
pub use result::DeliveryResult;
pub use settings::SmtpSettings;
pub use smtp_client::SmtpClient;
pub use tls::{RustlsUpgrade, TlsUpgrade};
