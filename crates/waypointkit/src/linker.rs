//! Dependency linking for applications.
//!
//! An application references a template and a set of actions by ID. Before
//! anything is written, the linker checks that each reference resolves in
//! the application's location and that the inputs fit the template.

use crate::client::Client;
use crate::error::{Error, Result};
use crate::types::{ActionState, ApplicationSpec, Location, ResourceKind, TemplateState};
use crate::variables::{ResolvedInputs, resolve_inputs};

/// An application spec with every reference resolved.
#[derive(Debug, Clone)]
pub struct LinkedApplication {
    pub template: TemplateState,
    /// In action ID order
    pub actions: Vec<ActionState>,
    pub inputs: ResolvedInputs,
}

/// Resolves an application's template and actions.
pub struct Linker<'a> {
    client: &'a Client,
}

impl<'a> Linker<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Resolve the template first, then the actions, then check the inputs.
    pub fn link(&self, location: &Location, spec: &ApplicationSpec) -> Result<LinkedApplication> {
        let dependent = format!("application {:?}", spec.name);
        let unresolved = |kind: ResourceKind, id: &str, reason: &str| Error::Reference {
            dependent: dependent.clone(),
            kind,
            id: id.to_string(),
            reason: reason.to_string(),
        };

        if spec.template_id.trim().is_empty() {
            return Err(unresolved(ResourceKind::Template, "", "no template ID given"));
        }

        let template = self
            .client
            .get_template(location, &spec.template_id)
            .map_err(|e| {
                if e.is_not_found() {
                    unresolved(ResourceKind::Template, &spec.template_id, "not found in project")
                } else {
                    e
                }
            })?;

        let mut actions = Vec::with_capacity(spec.actions.len());
        for action_id in &spec.actions {
            if action_id.trim().is_empty() {
                return Err(unresolved(ResourceKind::Action, action_id, "empty action ID"));
            }
            let action = self.client.get_action(location, action_id).map_err(|e| {
                if e.is_not_found() {
                    unresolved(ResourceKind::Action, action_id, "not found in project")
                } else {
                    e
                }
            })?;
            actions.push(action);
        }

        let inputs = resolve_inputs(&template.variable_options, &spec.application_input_variables, &spec.name)?;
        log::debug!(
            "linked application {:?} to template {} and {} action(s)",
            spec.name,
            template.id,
            actions.len()
        );

        Ok(LinkedApplication {
            template,
            actions,
            inputs,
        })
    }

    /// Check that `spec` links, keeping only what the service will inject.
    pub fn check(&self, location: &Location, spec: &ApplicationSpec) -> Result<()> {
        let linked = self.link(location, spec)?;
        let injected: Vec<&str> = linked.inputs.template.iter().map(|v| v.name.as_str()).collect();
        log::debug!("application {:?} will receive template inputs {injected:?}", spec.name);
        Ok(())
    }
}
