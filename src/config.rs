//! Desired state and settings, loaded from `wpsync.toml`.
//!
//! ```toml
//! organization_id = "org-1"
//!
//! [[projects]]
//! name = "vault-111"
//!
//! [[projects.templates]]
//! name = "starter"
//!
//! [[projects.applications]]
//! name = "app1"
//! template = "starter"
//! ```

use crate::state::SyncState;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use waypointkit::{
    ActionSpec, ApplicationDraft, InputVariable, Orphan, Patience, Plan, Planned, ProjectPlan, ProjectSpec,
    ProjectTarget, Reference, ResourceKind, RetryConfig, TemplateSpec, resource_key,
};

// ============================================================================
// Config Structures
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WpsyncConfig {
    /// Organization new projects are created in
    #[serde(default)]
    pub organization_id: Option<String>,

    /// API base URL; defaults to the public HCP endpoint
    #[serde(default)]
    pub api_base: Option<String>,

    /// Bearer token; `HCP_API_TOKEN` takes precedence
    #[serde(default)]
    pub token: Option<String>,

    /// Projects reconciled in parallel
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Overwrite remote changes instead of reporting drift
    #[serde(default)]
    pub correct_drift: bool,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub patience: Patience,

    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

/// A project: managed when `name` is set, external when `id` is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Overrides the top-level organization
    #[serde(default)]
    pub organization_id: Option<String>,

    #[serde(default)]
    pub actions: Vec<ActionSpec>,

    #[serde(default)]
    pub templates: Vec<TemplateSpec>,

    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub name: String,

    /// Name of a template in the same project
    #[serde(default)]
    pub template: Option<String>,

    /// Remote template ID, for templates managed elsewhere
    #[serde(default)]
    pub template_id: Option<String>,

    #[serde(default)]
    pub readme_markdown: Option<String>,

    /// Names of actions in the same project
    #[serde(default)]
    pub actions: Vec<String>,

    /// Remote action IDs
    #[serde(default)]
    pub action_ids: Vec<String>,

    #[serde(default)]
    pub application_input_variables: Vec<InputVariable>,
}

// ============================================================================
// Loading
// ============================================================================

impl WpsyncConfig {
    /// Load and validate a config file. `.json` files are parsed as JSON,
    /// everything else as TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;

        let config: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))?
        } else {
            toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))?
        };

        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        log::debug!("Loaded {} project(s) from {}", config.projects.len(), path.display());
        Ok(config)
    }

    /// Reject configs that cannot produce a plan.
    pub fn validate(&self) -> Result<()> {
        let mut project_keys = HashSet::new();
        for project in &self.projects {
            let key = project.key()?;
            if !project_keys.insert(key) {
                bail!("project {key:?} is declared twice");
            }
            if project.name.is_some() && project.organization_id(self).is_none() {
                bail!("project {key:?} needs an organization_id");
            }
            project.validate(key)?;
        }
        Ok(())
    }

    /// Turn desired state plus recorded identities into a plan. Recorded
    /// entities no longer declared become orphans.
    pub fn to_plan(&self, state: &SyncState) -> Result<Plan> {
        let mut declared = HashSet::new();
        let mut projects = Vec::with_capacity(self.projects.len());

        for project in &self.projects {
            let plan = project.to_plan(self, state)?;
            declared.insert(resource_key(&plan.key, ResourceKind::Project, &plan.key));
            declared.extend(plan.actions.iter().map(|p| p.key.clone()));
            declared.extend(plan.templates.iter().map(|p| p.key.clone()));
            declared.extend(plan.applications.iter().map(|p| p.key.clone()));
            projects.push(plan);
        }

        let orphans = state
            .resources
            .iter()
            .filter(|(key, _)| !declared.contains(*key))
            .map(|(key, record)| Orphan {
                key: key.clone(),
                identity: record.identity.clone(),
            })
            .collect();

        Ok(Plan { projects, orphans })
    }
}

impl ProjectConfig {
    /// Name for managed projects, ID for external ones.
    pub fn key(&self) -> Result<&str> {
        match (&self.name, &self.id) {
            (Some(name), None) if !name.trim().is_empty() => Ok(name),
            (None, Some(id)) if !id.trim().is_empty() => Ok(id),
            (Some(_), Some(_)) => bail!("a project sets both name and id"),
            _ => bail!("a project needs a name or an id"),
        }
    }

    fn organization_id<'a>(&'a self, config: &'a WpsyncConfig) -> Option<&'a str> {
        self.organization_id
            .as_deref()
            .or(config.organization_id.as_deref())
            .filter(|o| !o.trim().is_empty())
    }

    fn validate(&self, key: &str) -> Result<()> {
        let actions = unique_names(key, ResourceKind::Action, self.actions.iter().map(|a| a.name.as_str()))?;
        let templates = unique_names(
            key,
            ResourceKind::Template,
            self.templates.iter().map(|t| t.name.as_str()),
        )?;
        unique_names(
            key,
            ResourceKind::Application,
            self.applications.iter().map(|a| a.name.as_str()),
        )?;

        for app in &self.applications {
            match (&app.template, &app.template_id) {
                (Some(name), None) if !templates.contains(name.as_str()) => {
                    bail!("application {:?} in {key} references unknown template {name:?}", app.name)
                }
                (Some(_), None) | (None, Some(_)) => {}
                (Some(_), Some(_)) => bail!("application {:?} in {key} sets both template and template_id", app.name),
                (None, None) => bail!("application {:?} in {key} needs a template or template_id", app.name),
            }
            if let Some(missing) = app.actions.iter().find(|a| !actions.contains(a.as_str())) {
                bail!("application {:?} in {key} references unknown action {missing:?}", app.name);
            }
        }
        Ok(())
    }

    fn to_plan(&self, config: &WpsyncConfig, state: &SyncState) -> Result<ProjectPlan> {
        let key = self.key()?;
        let planned = |kind: ResourceKind, name: &str| {
            let resource = resource_key(key, kind, name);
            let prior = state.identity(&resource).cloned();
            (resource, prior)
        };

        let target = match &self.name {
            Some(name) => {
                let (_, prior) = planned(ResourceKind::Project, key);
                ProjectTarget::Managed {
                    organization_id: self
                        .organization_id(config)
                        .with_context(|| format!("project {key:?} needs an organization_id"))?
                        .to_string(),
                    spec: ProjectSpec::new(name).with_description(&self.description),
                    prior,
                }
            }
            None => ProjectTarget::Existing {
                project_id: key.to_string(),
                organization_id: self.organization_id.clone(),
            },
        };

        let actions = self
            .actions
            .iter()
            .map(|spec| {
                let (resource, prior) = planned(ResourceKind::Action, &spec.name);
                Planned::new(resource, spec.clone(), prior)
            })
            .collect();

        let templates = self
            .templates
            .iter()
            .map(|spec| {
                let (resource, prior) = planned(ResourceKind::Template, &spec.name);
                Planned::new(resource, spec.clone(), prior)
            })
            .collect();

        let applications = self
            .applications
            .iter()
            .map(|app| {
                let (resource, prior) = planned(ResourceKind::Application, &app.name);
                Planned::new(resource, app.to_draft(), prior)
            })
            .collect();

        Ok(ProjectPlan {
            key: key.to_string(),
            target,
            actions,
            templates,
            applications,
        })
    }
}

impl ApplicationConfig {
    fn to_draft(&self) -> ApplicationDraft {
        let template = self
            .template
            .clone()
            .map(Reference::Local)
            .or_else(|| self.template_id.clone().map(Reference::Id));
        let actions = self
            .actions
            .iter()
            .cloned()
            .map(Reference::Local)
            .chain(self.action_ids.iter().cloned().map(Reference::Id))
            .collect();

        ApplicationDraft {
            name: self.name.clone(),
            template,
            readme_markdown: self.readme_markdown.clone(),
            actions,
            application_input_variables: self.application_input_variables.clone(),
        }
    }
}

fn unique_names<'a>(
    project: &str,
    kind: ResourceKind,
    names: impl Iterator<Item = &'a str>,
) -> Result<HashSet<&'a str>> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            bail!("a {kind} in {project} has no name");
        }
        if !seen.insert(name) {
            bail!("{kind} {name:?} is declared twice in {project}");
        }
    }
    Ok(seen)
}

// ============================================================================
// Tests
// ============================================================================
