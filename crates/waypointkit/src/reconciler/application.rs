//! Applications: instances of a template, wired to actions.

use super::{Entity, Lifecycle};
use crate::client::Client;
use crate::drift::{Drift, DriftCheck};
use crate::error::Result;
use crate::linker::Linker;
use crate::types::{ApplicationSpec, ApplicationState, Location, ResourceIdentity, ResourceKind};

/// Application entity.
pub struct Application;

/// Reconciler for applications. Dependencies are linked before every write.
pub type ApplicationReconciler<'a> = Lifecycle<'a, Application>;

impl Entity for Application {
    const KIND: ResourceKind = ResourceKind::Application;
    type Spec = ApplicationSpec;
    type State = ApplicationState;
    type Parent = Location;

    fn name(spec: &ApplicationSpec) -> &str {
        &spec.name
    }

    fn id(state: &ApplicationState) -> &str {
        &state.id
    }

    fn location(parent: &Location, _id: &str) -> Result<Location> {
        Ok(parent.clone())
    }

    fn parent_of(identity: &ResourceIdentity) -> &Location {
        &identity.location
    }

    fn prepare(client: &Client, location: &Location, spec: &ApplicationSpec) -> Result<()> {
        Linker::new(client).check(location, spec)
    }

    fn get(client: &Client, location: &Location, id: &str) -> Result<ApplicationState> {
        client.get_application(location, id)
    }

    fn create(client: &Client, location: &Location, spec: &ApplicationSpec) -> Result<ApplicationState> {
        client.create_application(location, spec)
    }

    fn update(client: &Client, location: &Location, id: &str, spec: &ApplicationSpec) -> Result<ApplicationState> {
        client.update_application(location, id, spec)
    }

    fn delete(client: &Client, location: &Location, id: &str) -> Result<()> {
        client.delete_application(location, id)
    }

    fn drift(spec: &ApplicationSpec, state: &ApplicationState) -> Option<Drift> {
        let mut check = DriftCheck::new(Self::KIND, &spec.name)
            .field("name", &spec.name, &state.name)
            .field("template_id", &spec.template_id, &state.template_id);
        if spec.readme_markdown.is_some() {
            check = check.field("readme_markdown", &spec.readme_markdown, &state.readme_markdown);
        }
        check
            .set("actions", &spec.actions, &state.action_ids)
            .variables(
                "application_input_variables",
                &spec.application_input_variables,
                &state.application_input_variables,
            )
            .finish()
    }
}
