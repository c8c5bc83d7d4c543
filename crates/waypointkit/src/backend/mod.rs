//! Backend abstraction for the Waypoint API.
//!
//! The [`Backend`] trait is the raw transport: one method per entity kind
//! and verb, no retries and no interpretation beyond an HTTP-like status.
//! [`Client`](crate::client::Client) layers retry and error mapping on top.
//!
//! Two implementations ship with the crate:
//! - [`http::HttpBackend`] talks to the real API over HTTPS
//! - [`memory::MemoryBackend`] simulates an eventually-consistent API in
//!   memory, for tests and dry runs

pub mod http;
pub mod memory;

use crate::types::{
    ActionSpec, ActionState, ApplicationSpec, ApplicationState, Location, ProjectSpec,
    ProjectState, TemplateSpec, TemplateState,
};
use thiserror::Error;

/// A failed backend call.
///
/// `status` is the HTTP status code, or `None` when no response arrived.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub status: Option<u16>,
    pub message: String,
}

/// Coarse classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Invalid,
    Denied,
    Transient,
    Other,
}

impl BackendError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// A failure before any response was received.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Some(404), message)
    }

    pub fn class(&self) -> ErrorClass {
        match self.status {
            Some(404) => ErrorClass::NotFound,
            Some(400 | 409 | 412 | 422) => ErrorClass::Invalid,
            Some(401 | 403) => ErrorClass::Denied,
            None | Some(408 | 425 | 429 | 500..=599) => ErrorClass::Transient,
            Some(_) => ErrorClass::Other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}

/// Result of a raw backend call.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Backend trait for Waypoint API operations.
///
/// Projects are addressed by ID and created under an organization; every
/// other kind is addressed by ID within a [`Location`]. Implementations
/// must be safe to share across the executor's worker threads.
pub trait Backend: Send + Sync {
    /// Fetch a project by ID.
    fn get_project(&self, project_id: &str) -> BackendResult<ProjectState>;

    /// Create a project in an organization.
    fn create_project(&self, organization_id: &str, spec: &ProjectSpec) -> BackendResult<ProjectState>;

    /// Update a project's name and description.
    fn update_project(&self, project_id: &str, spec: &ProjectSpec) -> BackendResult<ProjectState>;

    /// Delete a project.
    fn delete_project(&self, project_id: &str) -> BackendResult<()>;

    fn get_template(&self, location: &Location, id: &str) -> BackendResult<TemplateState>;
    fn create_template(&self, location: &Location, spec: &TemplateSpec) -> BackendResult<TemplateState>;
    fn update_template(&self, location: &Location, id: &str, spec: &TemplateSpec) -> BackendResult<TemplateState>;
    fn delete_template(&self, location: &Location, id: &str) -> BackendResult<()>;

    fn get_action(&self, location: &Location, id: &str) -> BackendResult<ActionState>;
    fn create_action(&self, location: &Location, spec: &ActionSpec) -> BackendResult<ActionState>;
    fn update_action(&self, location: &Location, id: &str, spec: &ActionSpec) -> BackendResult<ActionState>;
    fn delete_action(&self, location: &Location, id: &str) -> BackendResult<()>;

    fn get_application(&self, location: &Location, id: &str) -> BackendResult<ApplicationState>;
    fn create_application(&self, location: &Location, spec: &ApplicationSpec) -> BackendResult<ApplicationState>;
    fn update_application(
        &self,
        location: &Location,
        id: &str,
        spec: &ApplicationSpec,
    ) -> BackendResult<ApplicationState>;
    fn delete_application(&self, location: &Location, id: &str) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(BackendError::not_found("x").class(), ErrorClass::NotFound);
        assert_eq!(BackendError::new(Some(409), "x").class(), ErrorClass::Invalid);
        assert_eq!(BackendError::new(Some(401), "x").class(), ErrorClass::Denied);
        assert_eq!(BackendError::new(Some(429), "x").class(), ErrorClass::Transient);
        assert_eq!(BackendError::new(Some(503), "x").class(), ErrorClass::Transient);
        assert_eq!(BackendError::transport("reset").class(), ErrorClass::Transient);
        assert_eq!(BackendError::new(Some(418), "x").class(), ErrorClass::Other);
    }
}
