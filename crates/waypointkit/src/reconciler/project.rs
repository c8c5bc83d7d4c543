//! Projects: created under an organization, addressed by ID alone.

use super::{Entity, Lifecycle};
use crate::client::Client;
use crate::drift::{Drift, DriftCheck};
use crate::error::Result;
use crate::types::{Location, ProjectSpec, ProjectState, ResourceIdentity, ResourceKind};

/// Project entity.
pub struct Project;

/// Reconciler for projects. The parent scope is the organization ID.
pub type ProjectReconciler<'a> = Lifecycle<'a, Project>;

impl Entity for Project {
    const KIND: ResourceKind = ResourceKind::Project;
    type Spec = ProjectSpec;
    type State = ProjectState;
    type Parent = str;

    fn name(spec: &ProjectSpec) -> &str {
        &spec.name
    }

    fn id(state: &ProjectState) -> &str {
        &state.id
    }

    fn location(organization_id: &str, id: &str) -> Result<Location> {
        Location::new(organization_id, id)
    }

    fn parent_of(identity: &ResourceIdentity) -> &str {
        identity.location.organization_id()
    }

    fn get(client: &Client, _organization_id: &str, id: &str) -> Result<ProjectState> {
        client.get_project(id)
    }

    fn create(client: &Client, organization_id: &str, spec: &ProjectSpec) -> Result<ProjectState> {
        client.create_project(organization_id, spec)
    }

    fn update(client: &Client, _organization_id: &str, id: &str, spec: &ProjectSpec) -> Result<ProjectState> {
        client.update_project(id, spec)
    }

    fn delete(client: &Client, _organization_id: &str, id: &str) -> Result<()> {
        client.delete_project(id)
    }

    fn drift(spec: &ProjectSpec, state: &ProjectState) -> Option<Drift> {
        DriftCheck::new(Self::KIND, &spec.name)
            .field("name", &spec.name, &state.name)
            .field("description", &spec.description, &state.description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::reconciler::tests::fast_options;
    use crate::reconciler::{Observation, Outcome};
    use std::sync::Arc;

    #[test]
    fn test_project_lifecycle() {
        let backend = Arc::new(MemoryBackend::new().with_organization("org-1"));
        let client = Client::with_backend(backend.clone());
        let reconciler = ProjectReconciler::new(&client).with_options(fast_options());
        let spec = ProjectSpec::new("demo").with_description("managed");

        let created = reconciler.reconcile("org-1", &spec, None).unwrap();
        assert_eq!(created.outcome, Outcome::Created);
        assert_eq!(created.identity.location.organization_id(), "org-1");
        assert_eq!(created.identity.location.project_id(), created.state.id);

        let again = reconciler
            .reconcile("org-1", &spec, Some(&created.identity))
            .unwrap();
        assert_eq!(again.outcome, Outcome::Unchanged);

        reconciler.destroy(&created.identity).unwrap();
        assert!(reconciler.read(&created.identity).unwrap().is_absent());
    }

    #[test]
    fn test_unknown_organization_is_permission_error() {
        let client = Client::new(MemoryBackend::new());
        let err = ProjectReconciler::new(&client)
            .reconcile("org-x", &ProjectSpec::new("demo"), None)
            .unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Permission);
    }

    #[test]
    fn test_description_drift_is_corrected() {
        let backend = Arc::new(MemoryBackend::new());
        let seeded = backend.seed_project("org-1", "demo");
        let identity = ResourceIdentity::new(
            ResourceKind::Project,
            &seeded.id,
            Location::new("org-1", &seeded.id).unwrap(),
        );
        let client = Client::with_backend(backend);
        let spec = ProjectSpec::new("demo").with_description("managed");

        let err = ProjectReconciler::new(&client)
            .reconcile("org-1", &spec, Some(&identity))
            .unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Drift);

        let mut options = fast_options();
        options.correct_drift = true;
        let fixed = ProjectReconciler::new(&client)
            .with_options(options)
            .reconcile("org-1", &spec, Some(&identity))
            .unwrap();
        assert_eq!(fixed.outcome, Outcome::Updated);
        assert_eq!(fixed.state.description, "managed");
        assert!(matches!(
            ProjectReconciler::new(&client).read(&identity).unwrap(),
            Observation::Present(p) if p.description == "managed"
        ));
    }
}
