//! Actions: HTTP requests an application can trigger.

use super::{Entity, Lifecycle};
use crate::client::Client;
use crate::drift::{Drift, DriftCheck};
use crate::error::{Error, Result};
use crate::types::{ActionRequest, ActionSpec, ActionState, Location, ResourceIdentity, ResourceKind};

/// Action entity.
pub struct Action;

pub type ActionReconciler<'a> = Lifecycle<'a, Action>;

impl Entity for Action {
    const KIND: ResourceKind = ResourceKind::Action;
    type Spec = ActionSpec;
    type State = ActionState;
    type Parent = Location;

    fn name(spec: &ActionSpec) -> &str {
        &spec.name
    }

    fn id(state: &ActionState) -> &str {
        &state.id
    }

    fn location(parent: &Location, _id: &str) -> Result<Location> {
        Ok(parent.clone())
    }

    fn parent_of(identity: &ResourceIdentity) -> &Location {
        &identity.location
    }

    fn validate(spec: &ActionSpec) -> Result<()> {
        if spec.name.trim().is_empty() {
            return Err(Error::validation(Self::KIND, "", "name", "name is required"));
        }
        let ActionRequest::Custom { method, url, .. } = &spec.request;
        if method.trim().is_empty() {
            return Err(Error::validation(Self::KIND, &spec.name, "request.custom.method", "method is required"));
        }
        if url.trim().is_empty() {
            return Err(Error::validation(Self::KIND, &spec.name, "request.custom.url", "url is required"));
        }
        Ok(())
    }

    fn get(client: &Client, location: &Location, id: &str) -> Result<ActionState> {
        client.get_action(location, id)
    }

    fn create(client: &Client, location: &Location, spec: &ActionSpec) -> Result<ActionState> {
        client.create_action(location, spec)
    }

    fn update(client: &Client, location: &Location, id: &str, spec: &ActionSpec) -> Result<ActionState> {
        client.update_action(location, id, spec)
    }

    fn delete(client: &Client, location: &Location, id: &str) -> Result<()> {
        client.delete_action(location, id)
    }

    fn drift(spec: &ActionSpec, state: &ActionState) -> Option<Drift> {
        DriftCheck::new(Self::KIND, &spec.name)
            .field("name", &spec.name, &state.name)
            .field("description", &spec.description, &state.description)
            .field("request", &spec.request, &state.request)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCategory, Step};
    use crate::reconciler::tests::{fast_options, setup};
    use crate::reconciler::{Observation, Outcome};

    #[test]
    fn test_reconcile_then_read_has_no_drift() {
        let (_, client, location) = setup();
        let reconciler = ActionReconciler::new(&client).with_options(fast_options());
        let spec = ActionSpec::custom_get("ping", "https://example.com/ping");

        let created = reconciler.reconcile(&location, &spec, None).unwrap();
        assert_eq!(created.outcome, Outcome::Created);
        let Observation::Present(state) = reconciler.read(&created.identity).unwrap() else {
            panic!("action should be present");
        };
        assert!(Action::drift(&spec, &state).is_none());
    }

    #[test]
    fn test_missing_url_is_rejected_locally() {
        let (backend, client, location) = setup();
        let err = ActionReconciler::new(&client)
            .reconcile(&location, &ActionSpec::custom_get("ping", ""), None)
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(backend.count(ResourceKind::Action, Step::Create), 0);
    }

    #[test]
    fn test_lingering_destroy() {
        let (backend, client, location) = setup();
        let reconciler = ActionReconciler::new(&client).with_options(fast_options());
        let created = reconciler
            .reconcile(&location, &ActionSpec::custom_get("ping", "https://example.com"), None)
            .unwrap();

        backend.linger_after_delete(3);
        let destroyed = reconciler.destroy(&created.identity).unwrap();
        assert_eq!(destroyed.checks, 4);
        assert!(!destroyed.already_absent);
    }

    #[test]
    fn test_lingering_past_patience() {
        let (backend, client, location) = setup();
        let reconciler = ActionReconciler::new(&client).with_options(fast_options());
        let created = reconciler
            .reconcile(&location, &ActionSpec::custom_get("ping", "https://example.com"), None)
            .unwrap();

        backend.linger_after_delete(50);
        let err = reconciler.destroy(&created.identity).unwrap_err();
        assert!(matches!(err, crate::error::Error::DestroyNotConfirmed { .. }));
        assert!(!err.is_retryable());
    }
}
