//! Core types for Waypoint resource reconciliation.

use crate::error::{Error, Result};
use crate::variables::{InputVariable, VariableOption};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Kind of remote entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Project,
    Application,
    Action,
    Template,
}

impl ResourceKind {
    /// Name used in messages and state keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Project => "project",
            ResourceKind::Application => "application",
            ResourceKind::Action => "action",
            ResourceKind::Template => "template",
        }
    }

    /// Parse a kind from its name.
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "project" => Some(ResourceKind::Project),
            "application" => Some(ResourceKind::Application),
            "action" => Some(ResourceKind::Action),
            "template" => Some(ResourceKind::Template),
            _ => None,
        }
    }

    /// Destroy order: dependents before the things they reference.
    pub fn destroy_rank(&self) -> u8 {
        match self {
            ResourceKind::Application => 0,
            ResourceKind::Template => 1,
            ResourceKind::Action => 2,
            ResourceKind::Project => 3,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scoping context attached to every remote call.
///
/// Both fields are non-empty; there is no ambient default location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    organization_id: String,
    project_id: String,
}

impl Location {
    /// Create a location, rejecting empty IDs.
    pub fn new(organization_id: impl Into<String>, project_id: impl Into<String>) -> Result<Self> {
        let organization_id = organization_id.into();
        let project_id = project_id.into();
        if organization_id.trim().is_empty() {
            return Err(Error::InvalidLocation(format!(
                "organization ID is empty for project {project_id:?}"
            )));
        }
        if project_id.trim().is_empty() {
            return Err(Error::InvalidLocation(format!(
                "project ID is empty in organization {organization_id:?}"
            )));
        }
        Ok(Self {
            organization_id,
            project_id,
        })
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organization_id, self.project_id)
    }
}

/// Address of one remote entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub kind: ResourceKind,
    pub id: String,
    pub location: Location,
}

impl ResourceIdentity {
    pub fn new(kind: ResourceKind, id: impl Into<String>, location: Location) -> Self {
        Self {
            kind,
            id: id.into(),
            location,
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.id, self.location)
    }
}

// =============================================================================
// Projects
// =============================================================================

/// Desired state of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ProjectSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Observed state of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Organization that owns the project
    pub parent_organization_id: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Terraform Cloud workspace settings for applications created from a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerraformCloudWorkspace {
    pub name: String,
    pub terraform_project_id: String,
}

/// Desired state of a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub readme_markdown_template: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub terraform_no_code_module_source: String,
    #[serde(default)]
    pub terraform_no_code_module_id: String,
    #[serde(default)]
    pub terraform_project_id: String,
    #[serde(default)]
    pub terraform_cloud_workspace: Option<TerraformCloudWorkspace>,
    #[serde(default)]
    pub terraform_execution_mode: Option<String>,
    #[serde(default)]
    pub variable_options: Vec<VariableOption>,
}

impl TemplateSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_variable_option(mut self, option: VariableOption) -> Self {
        self.variable_options.push(option);
        self
    }
}

/// Observed state of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateState {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub readme_markdown_template: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub terraform_no_code_module_source: String,
    #[serde(default)]
    pub terraform_no_code_module_id: String,
    #[serde(default)]
    pub terraform_project_id: String,
    #[serde(default)]
    pub terraform_cloud_workspace: Option<TerraformCloudWorkspace>,
    #[serde(default)]
    pub terraform_execution_mode: Option<String>,
    #[serde(default)]
    pub variable_options: Vec<VariableOption>,
}

impl TemplateState {
    /// Build the state the API reports for a freshly written spec.
    pub fn from_spec(id: impl Into<String>, spec: &TemplateSpec) -> Self {
        Self {
            id: id.into(),
            name: spec.name.clone(),
            summary: spec.summary.clone(),
            description: spec.description.clone(),
            readme_markdown_template: spec.readme_markdown_template.clone(),
            labels: spec.labels.clone(),
            terraform_no_code_module_source: spec.terraform_no_code_module_source.clone(),
            terraform_no_code_module_id: spec.terraform_no_code_module_id.clone(),
            terraform_project_id: spec.terraform_project_id.clone(),
            terraform_cloud_workspace: spec.terraform_cloud_workspace.clone(),
            terraform_execution_mode: spec.terraform_execution_mode.clone(),
            variable_options: spec.variable_options.clone(),
        }
    }
}

// =============================================================================
// Actions
// =============================================================================

/// How an action calls out when it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionRequest {
    /// Arbitrary HTTP request
    Custom {
        method: String,
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default)]
        body: Option<String>,
    },
}

/// Desired state of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub request: ActionRequest,
}

impl ActionSpec {
    /// A custom GET request action.
    pub fn custom_get(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            request: ActionRequest::Custom {
                method: "GET".to_string(),
                url: url.into(),
                headers: BTreeMap::new(),
                body: None,
            },
        }
    }
}

/// Observed state of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionState {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub request: ActionRequest,
}

// =============================================================================
// Applications
// =============================================================================

/// Desired state of an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSpec {
    pub name: String,
    /// ID of the template the application is created from
    pub template_id: String,
    #[serde(default)]
    pub readme_markdown: Option<String>,
    /// IDs of the actions assigned to the application
    #[serde(default)]
    pub actions: BTreeSet<String>,
    #[serde(default)]
    pub application_input_variables: Vec<InputVariable>,
}

impl ApplicationSpec {
    pub fn new(name: impl Into<String>, template_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_id: template_id.into(),
            ..Default::default()
        }
    }

    pub fn with_action(mut self, action_id: impl Into<String>) -> Self {
        self.actions.insert(action_id.into());
        self
    }

    pub fn with_input(mut self, variable: InputVariable) -> Self {
        self.application_input_variables.push(variable);
        self
    }
}

/// Observed state of an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationState {
    pub id: String,
    pub name: String,
    pub template_id: String,
    #[serde(default)]
    pub template_name: String,
    #[serde(default)]
    pub readme_markdown: Option<String>,
    #[serde(default)]
    pub action_ids: BTreeSet<String>,
    /// Variables set by the application
    #[serde(default)]
    pub application_input_variables: Vec<InputVariable>,
    /// Variables fixed by the template or injected by the service
    #[serde(default)]
    pub template_input_variables: Vec<InputVariable>,
}
