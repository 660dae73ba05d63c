//! Errors raised while loading configuration.

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration file exists at any of the searched locations.
    #[error("No configuration file found. Tried:\n{}", format_paths(.tried))]
    NotFound { tried: Vec<PathBuf> },

    /// The file named by the environment does not exist.
    #[error("{variable} points to non-existent file: {}", .path.display())]
    MissingOverride {
        variable: &'static str,
        path: PathBuf,
    },

    #[error("Failed to read config from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration in {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    /// A value parsed but is unusable.
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_lists_every_path() {
        let error = ConfigError::NotFound {
            tried: vec![PathBuf::from("./a.ron"), PathBuf::from("/etc/b.ron")],
        };
        let message = error.to_string();
        assert!(message.contains("  - ./a.ron"));
        assert!(message.contains("  - /etc/b.ron"));
    }
}
