pub mod client;

pub use client::{ClientError, DeliveryResult, EmailMessage, SmtpClient, SmtpSettings};
