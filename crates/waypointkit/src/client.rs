//! Typed client for remote entities.
//!
//! Wraps a [`Backend`] with transient-only retries, cancellation and domain
//! error mapping. Every call is a single logical request: nothing is cached,
//! and a missing entity is reported as [`Error::NotFound`].

use crate::backend::{Backend, BackendResult};
use crate::cancel::CancelToken;
use crate::error::{Error, Result, Step};
use crate::retry::{CallSite, NoCallback, RetryCallback, RetryConfig, with_retry};
use crate::types::{
    ActionSpec, ActionState, ApplicationSpec, ApplicationState, Location, ProjectSpec,
    ProjectState, ResourceKind, TemplateSpec, TemplateState,
};
use std::sync::Arc;

/// Client for Project, Template, Action and Application entities.
#[derive(Clone)]
pub struct Client {
    backend: Arc<dyn Backend>,
    retry: RetryConfig,
    cancel: CancelToken,
    callback: Arc<dyn RetryCallback>,
}

impl Client {
    /// Create a client with the default retry policy.
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self::with_backend(Arc::new(backend))
    }

    /// Create a client over a shared backend.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            retry: RetryConfig::default(),
            cancel: CancelToken::new(),
            callback: Arc::new(NoCallback),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_callback(mut self, callback: Arc<dyn RetryCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// A copy of this client that never retries.
    ///
    /// Used by existence probes, where a failed call must surface as
    /// indeterminate instead of being retried into a false answer.
    #[must_use]
    pub fn single_shot(&self) -> Self {
        self.clone().with_retry(RetryConfig::no_retry())
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    fn call<T>(
        &self,
        kind: ResourceKind,
        name: &str,
        step: Step,
        op: impl Fn(&dyn Backend) -> BackendResult<T>,
    ) -> Result<T> {
        let site = CallSite::new(kind, name, step);
        log::debug!("{step} {kind} {name:?}");
        with_retry(&self.retry, &self.cancel, self.callback.as_ref(), site, || {
            op(self.backend.as_ref()).map_err(|e| Error::from_backend(kind, name, step, e))
        })
    }

    // Projects

    pub fn get_project(&self, project_id: &str) -> Result<ProjectState> {
        self.call(ResourceKind::Project, project_id, Step::Get, |b| b.get_project(project_id))
    }

    pub fn create_project(&self, organization_id: &str, spec: &ProjectSpec) -> Result<ProjectState> {
        self.call(ResourceKind::Project, &spec.name, Step::Create, |b| {
            b.create_project(organization_id, spec)
        })
    }

    pub fn update_project(&self, project_id: &str, spec: &ProjectSpec) -> Result<ProjectState> {
        self.call(ResourceKind::Project, project_id, Step::Update, |b| {
            b.update_project(project_id, spec)
        })
    }

    pub fn delete_project(&self, project_id: &str) -> Result<()> {
        self.call(ResourceKind::Project, project_id, Step::Delete, |b| {
            b.delete_project(project_id)
        })
    }

    // Templates

    pub fn get_template(&self, location: &Location, id: &str) -> Result<TemplateState> {
        self.call(ResourceKind::Template, id, Step::Get, |b| b.get_template(location, id))
    }

    pub fn create_template(&self, location: &Location, spec: &TemplateSpec) -> Result<TemplateState> {
        self.call(ResourceKind::Template, &spec.name, Step::Create, |b| {
            b.create_template(location, spec)
        })
    }

    pub fn update_template(&self, location: &Location, id: &str, spec: &TemplateSpec) -> Result<TemplateState> {
        self.call(ResourceKind::Template, id, Step::Update, |b| {
            b.update_template(location, id, spec)
        })
    }

    pub fn delete_template(&self, location: &Location, id: &str) -> Result<()> {
        self.call(ResourceKind::Template, id, Step::Delete, |b| b.delete_template(location, id))
    }

    // Actions

    pub fn get_action(&self, location: &Location, id: &str) -> Result<ActionState> {
        self.call(ResourceKind::Action, id, Step::Get, |b| b.get_action(location, id))
    }

    pub fn create_action(&self, location: &Location, spec: &ActionSpec) -> Result<ActionState> {
        self.call(ResourceKind::Action, &spec.name, Step::Create, |b| {
            b.create_action(location, spec)
        })
    }

    pub fn update_action(&self, location: &Location, id: &str, spec: &ActionSpec) -> Result<ActionState> {
        self.call(ResourceKind::Action, id, Step::Update, |b| {
            b.update_action(location, id, spec)
        })
    }

    pub fn delete_action(&self, location: &Location, id: &str) -> Result<()> {
        self.call(ResourceKind::Action, id, Step::Delete, |b| b.delete_action(location, id))
    }

    // Applications

    pub fn get_application(&self, location: &Location, id: &str) -> Result<ApplicationState> {
        self.call(ResourceKind::Application, id, Step::Get, |b| {
            b.get_application(location, id)
        })
    }

    pub fn create_application(&self, location: &Location, spec: &ApplicationSpec) -> Result<ApplicationState> {
        self.call(ResourceKind::Application, &spec.name, Step::Create, |b| {
            b.create_application(location, spec)
        })
    }

    pub fn update_application(
        &self,
        location: &Location,
        id: &str,
        spec: &ApplicationSpec,
    ) -> Result<ApplicationState> {
        self.call(ResourceKind::Application, id, Step::Update, |b| {
            b.update_application(location, id, spec)
        })
    }

    pub fn delete_application(&self, location: &Location, id: &str) -> Result<()> {
        self.call(ResourceKind::Application, id, Step::Delete, |b| {
            b.delete_application(location, id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::backend::memory::MemoryBackend;
    use crate::error::ErrorCategory;
    use std::time::Duration;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(1),
        }
    }

    fn setup() -> (Arc<MemoryBackend>, Client, Location) {
        let backend = Arc::new(MemoryBackend::new());
        let project = backend.seed_project("org-1", "demo");
        let location = Location::new("org-1", project.id).unwrap();
        let client = Client::with_backend(backend.clone()).with_retry(fast_retry());
        (backend, client, location)
    }

    #[test]
    fn test_missing_entity_is_not_found() {
        let (_, client, location) = setup();
        let err = client.get_template(&location, "tpl-9").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert_eq!(err.to_string(), "template tpl-9 not found");
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let (backend, client, location) = setup();
        backend.fail_next(ResourceKind::Template, Step::Create, BackendError::new(Some(503), "busy"));
        backend.fail_next(ResourceKind::Template, Step::Create, BackendError::transport("reset"));

        let state = client
            .create_template(&location, &TemplateSpec::new("starter"))
            .unwrap();
        assert_eq!(state.name, "starter");
        assert_eq!(backend.count(ResourceKind::Template, Step::Create), 3);
    }

    #[test]
    fn test_validation_errors_are_not_retried() {
        let (backend, client, location) = setup();
        backend.fail_next(ResourceKind::Action, Step::Create, BackendError::new(Some(400), "bad url"));

        let err = client
            .create_action(&location, &ActionSpec::custom_get("ping", "nope"))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(backend.count(ResourceKind::Action, Step::Create), 1);
    }

    #[test]
    fn test_single_shot_does_not_retry() {
        let (backend, client, location) = setup();
        backend.fail_next(ResourceKind::Template, Step::Get, BackendError::new(Some(503), "busy"));

        let err = client.single_shot().get_template(&location, "tpl-9").unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(backend.count(ResourceKind::Template, Step::Get), 1);
    }

    #[test]
    fn test_cancelled_client_makes_no_calls() {
        let (backend, client, _) = setup();
        client.cancel_token().cancel();

        let err = client.get_project("prj-0001").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Cancelled);
        assert_eq!(backend.count(ResourceKind::Project, Step::Get), 0);
    }
}
