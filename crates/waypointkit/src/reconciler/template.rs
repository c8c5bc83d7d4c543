//! Templates: blueprints applications are created from.

use super::{Entity, Lifecycle};
use crate::client::Client;
use crate::drift::{Drift, DriftCheck};
use crate::error::{Error, Result};
use crate::types::{Location, ResourceIdentity, ResourceKind, TemplateSpec, TemplateState};
use crate::variables::VariableOption;
use std::collections::HashSet;

/// Template entity.
pub struct Template;

pub type TemplateReconciler<'a> = Lifecycle<'a, Template>;

fn sorted_options(options: &[VariableOption]) -> Vec<VariableOption> {
    let mut options = options.to_vec();
    options.sort_by(|a, b| a.name.cmp(&b.name));
    options
}

impl Entity for Template {
    const KIND: ResourceKind = ResourceKind::Template;
    type Spec = TemplateSpec;
    type State = TemplateState;
    type Parent = Location;

    fn name(spec: &TemplateSpec) -> &str {
        &spec.name
    }

    fn id(state: &TemplateState) -> &str {
        &state.id
    }

    fn location(parent: &Location, _id: &str) -> Result<Location> {
        Ok(parent.clone())
    }

    fn parent_of(identity: &ResourceIdentity) -> &Location {
        &identity.location
    }

    fn validate(spec: &TemplateSpec) -> Result<()> {
        if spec.name.trim().is_empty() {
            return Err(Error::validation(Self::KIND, "", "name", "name is required"));
        }
        let mut seen = HashSet::new();
        for option in &spec.variable_options {
            if !seen.insert(option.name.as_str()) {
                return Err(Error::validation(
                    Self::KIND,
                    &spec.name,
                    format!("variable_options.{}", option.name),
                    "option is declared more than once",
                ));
            }
            if !option.user_editable && option.options.len() > 1 {
                return Err(Error::validation(
                    Self::KIND,
                    &spec.name,
                    format!("variable_options.{}", option.name),
                    "a fixed option takes exactly one value",
                ));
            }
        }
        Ok(())
    }

    fn get(client: &Client, location: &Location, id: &str) -> Result<TemplateState> {
        client.get_template(location, id)
    }

    fn create(client: &Client, location: &Location, spec: &TemplateSpec) -> Result<TemplateState> {
        client.create_template(location, spec)
    }

    fn update(client: &Client, location: &Location, id: &str, spec: &TemplateSpec) -> Result<TemplateState> {
        client.update_template(location, id, spec)
    }

    fn delete(client: &Client, location: &Location, id: &str) -> Result<()> {
        client.delete_template(location, id)
    }

    fn drift(spec: &TemplateSpec, state: &TemplateState) -> Option<Drift> {
        DriftCheck::new(Self::KIND, &spec.name)
            .field("name", &spec.name, &state.name)
            .field("summary", &spec.summary, &state.summary)
            .field("description", &spec.description, &state.description)
            .field(
                "readme_markdown_template",
                &spec.readme_markdown_template,
                &state.readme_markdown_template,
            )
            .set("labels", &spec.labels, &state.labels)
            .field(
                "terraform_no_code_module_source",
                &spec.terraform_no_code_module_source,
                &state.terraform_no_code_module_source,
            )
            .field(
                "terraform_no_code_module_id",
                &spec.terraform_no_code_module_id,
                &state.terraform_no_code_module_id,
            )
            .field("terraform_project_id", &spec.terraform_project_id, &state.terraform_project_id)
            .field(
                "terraform_cloud_workspace",
                &spec.terraform_cloud_workspace,
                &state.terraform_cloud_workspace,
            )
            .field(
                "terraform_execution_mode",
                &spec.terraform_execution_mode,
                &state.terraform_execution_mode,
            )
            .field(
                "variable_options",
                &sorted_options(&spec.variable_options),
                &sorted_options(&state.variable_options),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::error::{ErrorCategory, Step};
    use crate::reconciler::tests::{Recorder, fast_options, setup};
    use crate::reconciler::{LifecycleState, Observation, Outcome};
    use crate::variables::VariableType;

    fn starter() -> TemplateSpec {
        TemplateSpec {
            summary: "A starter template".to_string(),
            labels: vec!["one".to_string(), "two".to_string()],
            terraform_no_code_module_source: "private/org/module/provider".to_string(),
            ..TemplateSpec::new("starter")
        }
        .with_variable_option(VariableOption::new("faction", VariableType::String))
    }

    #[test]
    fn test_reconcile_then_read_has_no_drift() {
        let (_, client, location) = setup();
        let reconciler = TemplateReconciler::new(&client).with_options(fast_options());

        let created = reconciler.reconcile(&location, &starter(), None).unwrap();
        let Observation::Present(state) = reconciler.read(&created.identity).unwrap() else {
            panic!("template should be present");
        };
        assert!(Template::drift(&starter(), &state).is_none());
    }

    #[test]
    fn test_label_order_is_not_drift() {
        let (backend, client, location) = setup();
        let reconciler = TemplateReconciler::new(&client).with_options(fast_options());
        let created = reconciler.reconcile(&location, &starter(), None).unwrap();

        backend.edit_template(&created.identity.id, |t| t.labels.reverse());
        let again = reconciler
            .reconcile(&location, &starter(), Some(&created.identity))
            .unwrap();
        assert_eq!(again.outcome, Outcome::Unchanged);

        backend.edit_template(&created.identity.id, |t| t.summary = "edited".to_string());
        let err = reconciler
            .reconcile(&location, &starter(), Some(&created.identity))
            .unwrap_err();
        let drift = match err {
            Error::Drift(drift) => drift,
            other => panic!("expected drift, got {other}"),
        };
        assert_eq!(drift.field, "summary");
    }

    #[test]
    fn test_validation_rejection_on_create() {
        let (backend, client, location) = setup();
        backend.fail_next(
            ResourceKind::Template,
            Step::Create,
            BackendError::new(Some(400), "invalid no-code module"),
        );
        let recorder = Recorder::default();
        let reconciler = TemplateReconciler::new(&client)
            .with_options(fast_options())
            .with_progress(&recorder);

        let err = reconciler.reconcile(&location, &starter(), None).unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(backend.count(ResourceKind::Template, Step::Create), 1);
        assert_eq!(
            recorder.states(),
            vec![LifecycleState::Creating, LifecycleState::Failed]
        );
    }

    #[test]
    fn test_local_validation_makes_no_calls() {
        let (backend, client, location) = setup();
        let spec = starter().with_variable_option(VariableOption::new("faction", VariableType::Bool));

        let err = TemplateReconciler::new(&client)
            .reconcile(&location, &spec, None)
            .unwrap_err();
        assert!(err.to_string().contains("variable_options.faction"));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_vanished_template_is_recreated() {
        let (backend, client, location) = setup();
        let reconciler = TemplateReconciler::new(&client).with_options(fast_options());
        let created = reconciler.reconcile(&location, &starter(), None).unwrap();

        backend.remove(ResourceKind::Template, &created.identity.id);
        let again = reconciler
            .reconcile(&location, &starter(), Some(&created.identity))
            .unwrap();
        assert_eq!(again.outcome, Outcome::Recreated);
        assert_ne!(again.identity.id, created.identity.id);
    }

    #[test]
    fn test_create_lag_is_absorbed() {
        let (backend, client, location) = setup();
        backend.hide_after_create(2);

        let created = TemplateReconciler::new(&client)
            .with_options(fast_options())
            .reconcile(&location, &starter(), None)
            .unwrap();
        assert_eq!(created.outcome, Outcome::Created);
        assert_eq!(backend.count(ResourceKind::Template, Step::Get), 3);
    }

    #[test]
    fn test_create_never_visible() {
        let (backend, client, location) = setup();
        backend.hide_after_create(100);

        let err = TemplateReconciler::new(&client)
            .with_options(fast_options())
            .reconcile(&location, &starter(), None)
            .unwrap_err();
        assert!(matches!(err, Error::CreateNotConfirmed { attempts: 4, .. }));
    }

    #[test]
    fn test_destroy_twice() {
        let (_, client, location) = setup();
        let reconciler = TemplateReconciler::new(&client).with_options(fast_options());
        let created = reconciler.reconcile(&location, &starter(), None).unwrap();

        let first = reconciler.destroy(&created.identity).unwrap();
        assert!(!first.already_absent);
        assert!(reconciler.read(&created.identity).unwrap().is_absent());

        let second = reconciler.destroy(&created.identity).unwrap();
        assert!(second.already_absent);
    }
}
