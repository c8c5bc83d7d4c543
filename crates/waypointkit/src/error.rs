//! Error types for Waypoint reconciliation.
//!
//! Errors are categorized so callers can tell apart what is retried locally,
//! what counts as a confirmed absence, and what needs a human to follow up.
//! Every entity-scoped error names the resource kind, its name or ID, and the
//! step or field that failed.

use crate::backend::{BackendError, ErrorClass};
use crate::drift::Drift;
use crate::reconciler::LifecycleState;
use crate::types::ResourceKind;
use std::fmt;
use thiserror::Error;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The remote entity does not exist (expected on read and destroy)
    NotFound,
    /// A dependency could not be resolved
    Reference,
    /// The desired spec was rejected as malformed or conflicting
    Validation,
    /// The remote API denied the operation
    Permission,
    /// Timeouts, rate limiting and other indeterminate transport failures
    Transient,
    /// The project's location could not be resolved
    Lookup,
    /// A create or delete was accepted but never observed
    NotConfirmed,
    /// The caller cancelled the operation
    Cancelled,
    /// Observed state diverges from the desired spec
    Drift,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Resource not found",
            Self::Reference => "Unresolved dependency",
            Self::Validation => "Invalid configuration",
            Self::Permission => "Permission denied",
            Self::Transient => "Temporary API failure",
            Self::Lookup => "Project lookup failed",
            Self::NotConfirmed => "Change not confirmed",
            Self::Cancelled => "Cancelled",
            Self::Drift => "Drift detected",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "The resource was removed outside of this tool; apply again to recreate it",
            Self::Reference => "Make sure the referenced template and actions exist and were applied first",
            Self::Validation => "Fix the reported field in your configuration",
            Self::Permission => "Check that your token has access to the organization and project",
            Self::Transient => "Check your connection and try again",
            Self::Lookup => "Verify the project ID and that it belongs to your organization",
            Self::NotConfirmed => "The API accepted the change but has not caught up yet; check again later",
            Self::Cancelled => "Run the command again to resume",
            Self::Drift => "Run apply with --correct-drift to overwrite remote changes",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// The remote operation an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Get,
    Create,
    Update,
    Delete,
}

impl Step {
    /// Lowercase verb used in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Get => "get",
            Step::Create => "create",
            Step::Update => "update",
            Step::Delete => "delete",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while reconciling Waypoint resources.
#[derive(Debug, Error)]
pub enum Error {
    /// The remote entity does not exist
    #[error("{kind} {id} not found")]
    NotFound {
        /// Kind of the missing entity
        kind: ResourceKind,
        /// ID (or name, for creates) of the missing entity
        id: String,
    },

    /// A dependency of `dependent` could not be resolved
    #[error("{dependent}: {kind} {id:?} cannot be resolved: {reason}")]
    Reference {
        /// The resource that needed the dependency, e.g. `application "app1"`
        dependent: String,
        /// Kind of the unresolved dependency
        kind: ResourceKind,
        /// Identifier of the unresolved dependency
        id: String,
        /// Why it could not be resolved
        reason: String,
    },

    /// The desired spec is invalid, locally or according to the remote API
    #[error("{kind} {name:?}: invalid {field}: {message}")]
    Validation {
        kind: ResourceKind,
        name: String,
        field: String,
        message: String,
    },

    /// The remote API denied the operation
    #[error("{kind} {name:?}: permission denied during {step}: {message}")]
    Permission {
        kind: ResourceKind,
        name: String,
        step: Step,
        message: String,
    },

    /// Timeout, rate limit or other transport failure
    #[error("{kind} {name:?}: temporary failure during {step}: {message}")]
    Transient {
        kind: ResourceKind,
        name: String,
        step: Step,
        message: String,
    },

    /// Any other remote failure
    #[error("{kind} {name:?}: {step} failed{}: {message}", http_status(.status))]
    Remote {
        kind: ResourceKind,
        name: String,
        step: Step,
        status: Option<u16>,
        message: String,
    },

    /// The organization of a project could not be determined
    #[error("cannot resolve location of project {project_id}: {reason}")]
    Lookup { project_id: String, reason: String },

    /// A location with an empty organization or project
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    /// The lifecycle state machine was asked for an illegal transition
    #[error("{kind} {name:?}: invalid transition from {from} to {to}")]
    InvalidTransition {
        kind: ResourceKind,
        name: String,
        from: LifecycleState,
        to: LifecycleState,
    },

    /// Delete was accepted but the entity was still visible when patience ran out
    #[error("{kind} {id}: delete accepted but still present after {attempts} checks")]
    DestroyNotConfirmed {
        kind: ResourceKind,
        id: String,
        attempts: u32,
    },

    /// Create returned an entity that never became readable
    #[error("{kind} {id}: created but not visible after {attempts} checks")]
    CreateNotConfirmed {
        kind: ResourceKind,
        id: String,
        attempts: u32,
    },

    /// The caller's cancel token fired
    #[error("{kind} {name:?}: cancelled during {step}")]
    Cancelled {
        kind: ResourceKind,
        name: String,
        step: Step,
    },

    /// Observed state diverges from the desired spec
    #[error("{0}")]
    Drift(Box<Drift>),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

fn http_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Reference { .. } => ErrorCategory::Reference,
            Error::Validation { .. } | Error::InvalidLocation(_) | Error::InvalidTransition { .. } => {
                ErrorCategory::Validation
            }
            Error::Permission { .. } => ErrorCategory::Permission,
            Error::Transient { .. } => ErrorCategory::Transient,
            Error::Lookup { .. } => ErrorCategory::Lookup,
            Error::DestroyNotConfirmed { .. } | Error::CreateNotConfirmed { .. } => {
                ErrorCategory::NotConfirmed
            }
            Error::Cancelled { .. } => ErrorCategory::Cancelled,
            Error::Drift(_) => ErrorCategory::Drift,
            Error::Remote { .. } | Error::Json(_) | Error::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this error means the entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Create a validation error for a field of a resource.
    pub fn validation(
        kind: ResourceKind,
        name: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Validation {
            kind,
            name: name.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an error from a backend failure.
    ///
    /// The backend's classification decides the category; `name` is the
    /// entity's name for creates and its ID otherwise.
    pub fn from_backend(kind: ResourceKind, name: &str, step: Step, err: BackendError) -> Self {
        let name = name.to_string();
        match err.class() {
            ErrorClass::NotFound => Error::NotFound { kind, id: name },
            ErrorClass::Invalid => Error::Validation {
                kind,
                name,
                field: format!("request ({step})"),
                message: err.message,
            },
            ErrorClass::Denied => Error::Permission {
                kind,
                name,
                step,
                message: err.message,
            },
            ErrorClass::Transient => Error::Transient {
                kind,
                name,
                step,
                message: err.message,
            },
            ErrorClass::Other => Error::Remote {
                kind,
                name,
                step,
                status: err.status,
                message: err.message,
            },
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(!ErrorCategory::Validation.is_retryable());
        assert!(!ErrorCategory::NotConfirmed.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
    }

    #[test]
    fn test_from_backend_classification() {
        let err = Error::from_backend(
            ResourceKind::Application,
            "app1",
            Step::Create,
            BackendError::new(Some(400), "bad variable"),
        );
        assert_eq!(err.category(), ErrorCategory::Validation);

        let err = Error::from_backend(
            ResourceKind::Template,
            "tpl-1",
            Step::Get,
            BackendError::new(Some(404), "missing"),
        );
        assert!(err.is_not_found());

        let err = Error::from_backend(
            ResourceKind::Project,
            "prj-1",
            Step::Get,
            BackendError::transport("connection reset"),
        );
        assert!(err.is_retryable());

        let err = Error::from_backend(
            ResourceKind::Action,
            "act-1",
            Step::Delete,
            BackendError::new(Some(403), "nope"),
        );
        assert_eq!(err.category(), ErrorCategory::Permission);
    }

    #[test]
    fn test_messages_name_kind_and_step() {
        let err = Error::Transient {
            kind: ResourceKind::Template,
            name: "starter".to_string(),
            step: Step::Create,
            message: "timed out".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "template \"starter\": temporary failure during create: timed out"
        );

        let err = Error::Remote {
            kind: ResourceKind::Project,
            name: "prj-1".to_string(),
            step: Step::Update,
            status: Some(418),
            message: "teapot".to_string(),
        };
        assert_eq!(err.to_string(), "project \"prj-1\": update failed (HTTP 418): teapot");
    }
}
