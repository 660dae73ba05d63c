//! Configuration types shared by the SMTP client and its callers.
//!
//! - [`timeouts`]: per-operation deadlines for a delivery attempt
//! - [`policy`]: how strictly intermediate server replies are checked

pub mod policy;
pub mod timeouts;

pub use policy::ReplyPolicy;
pub use timeouts::{ClientTimeouts, TimeoutConfig};
