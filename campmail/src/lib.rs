pub mod config;
pub mod mailer;

pub use campmail_smtp::{DeliveryResult, EmailMessage};
pub use config::Config;
pub use mailer::Mailer;
