//! Mailer configuration, read from a RON file.
//!
//! ```ron
//! (
//!     smtp: Some((
//!         host: "smtp.example.com",
//!         port: 587,
//!         username: "camp",
//!         password: "secret",
//!         from_address: "camp@example.com",
//!     )),
//!     timeouts: (data_secs: 300),
//!     reply_policy: strict,
//! )
//! ```
//!
//! Leaving out `smtp` (or leaving its credentials empty) selects the mock
//! mailer, which logs messages instead of sending them.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use campmail_common::{
    config::{ClientTimeouts, ReplyPolicy},
    error::ConfigError,
};
use campmail_smtp::{SmtpClient, SmtpSettings};
use serde::Deserialize;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "CAMPMAIL_CONFIG";

/// Searched in order when [`CONFIG_ENV`] is unset.
pub const DEFAULT_PATHS: [&str; 2] = [
    "./campmail.config.ron",
    "/etc/campmail/campmail.config.ron",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub smtp: Option<SmtpSettings>,
    #[serde(default)]
    pub timeouts: ClientTimeouts,
    #[serde(default)]
    pub reply_policy: ReplyPolicy,
    /// Name announced in `EHLO`, defaulting to the server's host.
    #[serde(default)]
    pub helo_name: Option<String>,
    /// Deliveries in flight at once when sending a batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

const fn default_concurrency() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            smtp: None,
            timeouts: ClientTimeouts::default(),
            reply_policy: ReplyPolicy::default(),
            helo_name: None,
            concurrency: default_concurrency(),
        }
    }
}

impl Config {
    /// Finds and loads the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if no file is found, or it cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = locate(std::env::var_os(CONFIG_ENV), &DEFAULT_PATHS)?;
        Self::from_path(&path)
    }

    /// Loads the configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = ron::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "concurrency",
                reason: "must be at least 1".to_string(),
            });
        }

        if let Some(smtp) = &self.smtp
            && smtp.is_complete()
            && smtp.from_address.is_empty()
        {
            return Err(ConfigError::Invalid {
                field: "smtp.from_address",
                reason: "required when SMTP credentials are set".to_string(),
            });
        }

        Ok(self)
    }

    /// A client using this configuration's timeouts and reply policy.
    #[must_use]
    pub fn client(&self) -> SmtpClient {
        let client = SmtpClient::new()
            .with_timeouts(self.timeouts)
            .with_reply_policy(self.reply_policy);

        match &self.helo_name {
            Some(name) => client.with_helo_name(name.clone()),
            None => client,
        }
    }
}

/// Resolves the configuration path: the override if given, else the first of
/// `defaults` that exists.
///
/// # Errors
///
/// Returns [`ConfigError::MissingOverride`] if the override names a missing
/// file, and [`ConfigError::NotFound`] if no default exists.
pub fn locate(override_path: Option<OsString>, defaults: &[&str]) -> Result<PathBuf, ConfigError> {
    if let Some(path) = override_path.map(PathBuf::from) {
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::MissingOverride {
            variable: CONFIG_ENV,
            path,
        });
    }

    let tried: Vec<PathBuf> = defaults.iter().map(PathBuf::from).collect();
    match tried.iter().position(|path| path.exists()) {
        Some(index) => Ok(tried[index].clone()),
        None => Err(ConfigError::NotFound { tried }),
    }
}
