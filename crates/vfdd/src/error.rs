//! Error types for the VF daemon.
//!
//! Every error a requester can see carries a short machine-readable status
//! (see [`VfdError::status`]) alongside the human-readable message produced by
//! `Display`.

use std::io;
use thiserror::Error;
use vfd_nic::NicError;
use vfd_types::ParseError;

/// Result type alias for daemon operations.
pub type VfdResult<T> = Result<T, VfdError>;

/// Errors that can occur in the VF daemon.
#[derive(Debug, Error)]
pub enum VfdError {
    /// A request was rejected before any state was changed.
    #[error("{reason}")]
    Validation {
        /// Why the request was rejected.
        reason: String,
    },

    /// A delete or show named something that is not configured.
    #[error("{what} not found")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// A NIC control call failed.
    #[error("hardware call failed: {0}")]
    Hardware(#[from] NicError),

    /// The daemon cannot start.
    #[error("initialisation failed: {reason}")]
    FatalInit {
        /// Why start-up cannot continue.
        reason: String,
    },

    /// A configuration file is unreadable or inconsistent.
    #[error("bad configuration in {path}: {message}")]
    Config {
        /// The file (or section) at fault.
        path: String,
        /// Error message.
        message: String,
    },

    /// I/O failure on a file or pipe.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed JSON in a request or VF config.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed TOML in the parameter file.
    #[error("malformed TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl VfdError {
    /// Creates a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a fatal initialisation error.
    pub fn fatal_init(reason: impl Into<String>) -> Self {
        Self::FatalInit {
            reason: reason.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Machine-readable status reported to requesters.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "invalid",
            Self::NotFound { .. } => "not_found",
            Self::Hardware(_) => "hardware",
            Self::FatalInit { .. } => "fatal",
            Self::Config { .. } => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "malformed",
            Self::Toml(_) => "malformed",
        }
    }

    /// Returns true if the error was caused by the requester's input.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::NotFound { .. } | Self::Json(_)
        )
    }
}

impl From<ParseError> for VfdError {
    fn from(err: ParseError) -> Self {
        Self::validation(err.to_string())
    }
}
