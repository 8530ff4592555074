//! Error types surfaced by the hunter and its collaborators.
//!
//! [`ApiError`] is what the public lifecycle calls return to a caller that
//! made a mistake (starting twice, naming a group that does not exist).
//! [`BackendError`] and [`TemplateError`] describe failures of the OS
//! collaborators and of template loading; the interpreter never lets them
//! escape a run, it logs them instead.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    GroupNotFound,
    AlreadyRunning,
    InvalidInput,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::GroupNotFound => write!(f, "GROUP_NOT_FOUND"),
            ErrorCode::AlreadyRunning => write!(f, "ALREADY_RUNNING"),
            ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// An error with a code, a message and a hint on how to recover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub suggestion: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (hint: {})", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn group_not_found(name: &str) -> Self {
        Self {
            code: ErrorCode::GroupNotFound,
            message: format!("Group '{}' not found", name),
            suggestion: Some("Run 'molehunt validate' to list the groups in the project".into()),
        }
    }

    pub fn no_groups() -> Self {
        Self {
            code: ErrorCode::GroupNotFound,
            message: "The project defines no groups".to_string(),
            suggestion: Some("Add at least one group with steps to the project file".into()),
        }
    }

    /// A run is already active on this hunter.
    pub fn already_running(group: &str) -> Self {
        Self {
            code: ErrorCode::AlreadyRunning,
            message: format!("A hunt is already running (group '{}')", group),
            suggestion: Some("Stop the current hunt before starting another one".into()),
        }
    }

    /// The root group has nothing a round could execute.
    pub fn empty_group(name: &str) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: format!("Group '{}' has no enabled steps", name),
            suggestion: Some("Add or enable a step in the group, or start from another group".into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InternalError,
            message: message.into(),
            suggestion: Some("This is an internal error. Please report it if it persists.".into()),
        }
    }
}

/// Failure of a screen capture or input collaborator.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("screen capture failed: {0}")]
    Capture(String),
    #[error("input simulation failed: {0}")]
    Input(String),
    #[error("unknown key combo '{0}'")]
    UnknownKey(String),
}

/// Failure to turn a template path into something matchable.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("cannot read template '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode template '{path}': {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("template '{path}' is empty")]
    Empty { path: String },
    #[error("template '{path}' ({tw}x{th}) is larger than the screen ({sw}x{sh})")]
    TooLarge {
        path: String,
        tw: u32,
        th: u32,
        sw: u32,
        sh: u32,
    },
}
