//! Execution engine: applies a plan across projects in parallel.
//!
//! Projects are independent and run on a rayon pool. Inside a project the
//! order is fixed: the project itself, then actions, then templates, then
//! applications, so every reference is written before its dependents.
//! Destroy runs the same order backwards.

use crate::client::Client;
use crate::context::{ProgressCallback, ReconcileOptions};
use crate::drift::Drift;
use crate::error::{Error, ErrorCategory, Result};
use crate::location::LocationResolver;
use crate::reconciler::{Action, Application, Entity, Lifecycle, Observation, Outcome, Project, Template};
use crate::types::{ActionSpec, ApplicationSpec, Location, ProjectSpec, ResourceIdentity, ResourceKind, TemplateSpec};
use crate::variables::InputVariable;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Key under which a resource is tracked: `<project>/<kind>/<name>`.
pub fn resource_key(project: &str, kind: ResourceKind, name: &str) -> String {
    format!("{project}/{kind}/{name}")
}

/// The project a group of resources lives in.
#[derive(Debug, Clone)]
pub enum ProjectTarget {
    /// A project managed elsewhere, referenced by ID
    Existing {
        project_id: String,
        organization_id: Option<String>,
    },
    /// A project this plan creates and owns
    Managed {
        organization_id: String,
        spec: ProjectSpec,
        prior: Option<ResourceIdentity>,
    },
}

/// A desired resource plus what was recorded for it last time.
#[derive(Debug, Clone)]
pub struct Planned<S> {
    pub key: String,
    pub spec: S,
    pub prior: Option<ResourceIdentity>,
}

impl<S> Planned<S> {
    pub fn new(key: impl Into<String>, spec: S, prior: Option<ResourceIdentity>) -> Self {
        Self {
            key: key.into(),
            spec,
            prior,
        }
    }
}

/// A reference to a template or action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Remote ID
    Id(String),
    /// Name of a resource in the same project plan
    Local(String),
}

/// An application whose references are resolved during the pass.
#[derive(Debug, Clone, Default)]
pub struct ApplicationDraft {
    pub name: String,
    pub template: Option<Reference>,
    pub readme_markdown: Option<String>,
    pub actions: Vec<Reference>,
    pub application_input_variables: Vec<InputVariable>,
}

/// Everything to reconcile within one project.
#[derive(Debug, Clone)]
pub struct ProjectPlan {
    /// Project name or ID, used as the prefix of resource keys
    pub key: String,
    pub target: ProjectTarget,
    pub actions: Vec<Planned<ActionSpec>>,
    pub templates: Vec<Planned<TemplateSpec>>,
    pub applications: Vec<Planned<ApplicationDraft>>,
}

/// A recorded resource no longer in the desired state.
#[derive(Debug, Clone)]
pub struct Orphan {
    pub key: String,
    pub identity: ResourceIdentity,
}

/// A full pass.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub projects: Vec<ProjectPlan>,
    /// Destroyed after the projects are reconciled
    pub orphans: Vec<Orphan>,
}

/// What a dry run would do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Create,
    /// The recorded entity is gone and would be created again
    Recreate,
    Update(Box<Drift>),
    Destroy,
    None,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Create => f.write_str("create"),
            Change::Recreate => f.write_str("recreate"),
            Change::Update(drift) => write!(f, "update ({} differs)", drift.field),
            Change::Destroy => f.write_str("destroy"),
            Change::None => f.write_str("no change"),
        }
    }
}

/// Result of handling one resource.
#[derive(Debug, Clone)]
pub enum ApplyResult {
    Reconciled {
        identity: ResourceIdentity,
        outcome: Outcome,
    },
    /// Dry run
    Planned { change: Change },
    Destroyed {
        identity: ResourceIdentity,
        already_absent: bool,
    },
    Failed {
        category: ErrorCategory,
        error: String,
        /// Set when the entity exists remotely despite the failure
        identity: Option<ResourceIdentity>,
    },
}

impl ApplyResult {
    fn failed(err: &Error, identity: Option<ResourceIdentity>) -> Self {
        ApplyResult::Failed {
            category: err.category(),
            error: err.to_string(),
            identity,
        }
    }

    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        match self {
            Self::Reconciled { outcome, .. } => outcome.is_change(),
            Self::Destroyed { already_absent, .. } => !already_absent,
            Self::Planned { change } => *change != Change::None,
            Self::Failed { .. } => false,
        }
    }

    /// Identity to record for this resource, if any.
    pub fn identity(&self) -> Option<&ResourceIdentity> {
        match self {
            Self::Reconciled { identity, .. } => Some(identity),
            Self::Failed { identity, .. } => identity.as_ref(),
            _ => None,
        }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub destroyed: usize,
    pub planned: usize,
    pub failed: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.destroyed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged + self.destroyed + self.planned + self.failed
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.destroyed += other.destroyed;
        self.planned += other.planned;
        self.failed += other.failed;
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::Reconciled { outcome, .. } => match outcome {
                Outcome::Created | Outcome::Recreated => self.created += 1,
                Outcome::Updated => self.updated += 1,
                Outcome::Unchanged => self.unchanged += 1,
            },
            ApplyResult::Planned { change: Change::None } => self.unchanged += 1,
            ApplyResult::Planned { .. } => self.planned += 1,
            ApplyResult::Destroyed { .. } => self.destroyed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
        }
    }
}

/// One resource's result.
#[derive(Debug, Clone)]
pub struct ResourceReport {
    pub key: String,
    pub kind: ResourceKind,
    pub result: ApplyResult,
}

/// Results of a pass, in plan order.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub resources: Vec<ResourceReport>,
    pub summary: ExecuteSummary,
}

impl PassReport {
    fn extend(&mut self, reports: Vec<ResourceReport>) {
        for report in reports {
            self.summary.add_result(&report.result);
            self.resources.push(report);
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResourceReport> {
        self.resources.iter().filter(|r| !r.result.is_success())
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Projects reconciled in parallel
    pub jobs: usize,
    /// Read and diff only
    pub dry_run: bool,
    pub reconcile: ReconcileOptions,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            dry_run: false,
            reconcile: ReconcileOptions::default(),
        }
    }
}

/// Local name to remote ID; `None` if the resource did not apply.
type Resolved = HashMap<String, Option<String>>;

struct Pass<'a> {
    client: &'a Client,
    resolver: LocationResolver<'a>,
    opts: &'a ExecuteOptions,
    progress: &'a dyn ProgressCallback,
}

impl<'a> Pass<'a> {
    fn lifecycle<E: Entity>(&self) -> Lifecycle<'_, E> {
        Lifecycle::new(self.client)
            .with_options(self.opts.reconcile.clone())
            .with_progress(self.progress)
    }

    fn report(&self, key: &str, kind: ResourceKind, result: ApplyResult) -> ResourceReport {
        self.progress.on_resource_complete(key, &result);
        ResourceReport {
            key: key.to_string(),
            kind,
            result,
        }
    }

    /// Children of a project that did not apply fail with a reference
    /// error. A dry run of a project that does not exist yet plans to create
    /// all of them.
    fn fail_children(&self, project: &ProjectPlan, out: &mut Vec<ResourceReport>) {
        let planned_project = self.opts.dry_run
            && matches!(
                out.last(),
                Some(ResourceReport {
                    result: ApplyResult::Planned { .. },
                    ..
                })
            );
        let unavailable = |kind: ResourceKind, name: &str, prior: Option<&ResourceIdentity>| {
            if planned_project {
                return ApplyResult::Planned { change: Change::Create };
            }
            let err = Error::Reference {
                dependent: format!("{kind} {name:?}"),
                kind: ResourceKind::Project,
                id: project.key.clone(),
                reason: "project did not apply".to_string(),
            };
            ApplyResult::failed(&err, prior.cloned())
        };
        for a in &project.actions {
            let result = unavailable(ResourceKind::Action, &a.spec.name, a.prior.as_ref());
            out.push(self.report(&a.key, ResourceKind::Action, result));
        }
        for t in &project.templates {
            let result = unavailable(ResourceKind::Template, &t.spec.name, t.prior.as_ref());
            out.push(self.report(&t.key, ResourceKind::Template, result));
        }
        for a in &project.applications {
            let result = unavailable(ResourceKind::Application, &a.spec.name, a.prior.as_ref());
            out.push(self.report(&a.key, ResourceKind::Application, result));
        }
    }

    /// Reconcile one entity, or preview it on a dry run.
    fn reconcile<E: Entity>(
        &self,
        key: &str,
        parent: &E::Parent,
        spec: &E::Spec,
        prior: Option<&ResourceIdentity>,
    ) -> ResourceReport {
        self.progress.on_resource_start(key);
        let result = if self.opts.dry_run {
            self.preview::<E>(spec, prior)
        } else {
            match self.lifecycle::<E>().reconcile(parent, spec, prior) {
                Ok(done) => ApplyResult::Reconciled {
                    identity: done.identity,
                    outcome: done.outcome,
                },
                Err(e) => {
                    let identity = match &e {
                        Error::CreateNotConfirmed { id, .. } => E::location(parent, id)
                            .ok()
                            .map(|location| ResourceIdentity::new(E::KIND, id.clone(), location)),
                        _ => None,
                    };
                    ApplyResult::failed(&e, identity)
                }
            }
        };
        self.report(key, E::KIND, result)
    }

    fn preview<E: Entity>(&self, spec: &E::Spec, prior: Option<&ResourceIdentity>) -> ApplyResult {
        if let Err(e) = E::validate(spec) {
            return ApplyResult::failed(&e, None);
        }
        let Some(prior) = prior else {
            return ApplyResult::Planned { change: Change::Create };
        };
        let change = match self.lifecycle::<E>().read(prior) {
            Ok(Observation::Present(state)) => match E::drift(spec, &state) {
                Some(drift) => Change::Update(Box::new(drift)),
                None => Change::None,
            },
            Ok(Observation::Absent) => Change::Recreate,
            Err(e) => return ApplyResult::failed(&e, Some(prior.clone())),
        };
        ApplyResult::Planned { change }
    }

    /// Record the remote ID a local name resolves to for later references.
    fn remember(resolved: &mut Resolved, name: &str, report: &ResourceReport, prior: Option<&ResourceIdentity>) {
        let id = match &report.result {
            ApplyResult::Reconciled { identity, .. } => Some(identity.id.clone()),
            ApplyResult::Planned { change } if *change != Change::Recreate => prior.map(|p| p.id.clone()),
            _ => None,
        };
        resolved.insert(name.to_string(), id);
    }

    fn locate(&self, project: &ProjectPlan, out: &mut Vec<ResourceReport>) -> Option<Location> {
        let key = resource_key(&project.key, ResourceKind::Project, &project.key);
        match &project.target {
            ProjectTarget::Existing {
                project_id,
                organization_id,
            } => match self.resolver.resolve_with(project_id, organization_id.as_deref()) {
                Ok(location) => Some(location),
                Err(e) => {
                    out.push(self.report(&key, ResourceKind::Project, ApplyResult::failed(&e, None)));
                    None
                }
            },
            ProjectTarget::Managed {
                organization_id,
                spec,
                prior,
            } => {
                let report = self.reconcile::<Project>(&key, organization_id.as_str(), spec, prior.as_ref());
                let location = match &report.result {
                    ApplyResult::Reconciled { identity, .. } => Some(identity.location.clone()),
                    ApplyResult::Planned { change } if *change != Change::Recreate => {
                        prior.as_ref().map(|p| p.location.clone())
                    }
                    _ => None,
                };
                out.push(report);
                if let Some(location) = &location {
                    self.resolver.remember(location);
                }
                location
            }
        }
    }

    fn apply_project(&self, project: &ProjectPlan) -> Vec<ResourceReport> {
        let mut out = Vec::new();
        let Some(location) = self.locate(project, &mut out) else {
            self.fail_children(project, &mut out);
            return out;
        };

        let mut actions = Resolved::new();
        for planned in &project.actions {
            let report = self.reconcile::<Action>(&planned.key, &location, &planned.spec, planned.prior.as_ref());
            Self::remember(&mut actions, &planned.spec.name, &report, planned.prior.as_ref());
            out.push(report);
        }

        let mut templates = Resolved::new();
        for planned in &project.templates {
            let report = self.reconcile::<Template>(&planned.key, &location, &planned.spec, planned.prior.as_ref());
            Self::remember(&mut templates, &planned.spec.name, &report, planned.prior.as_ref());
            out.push(report);
        }

        for planned in &project.applications {
            let report = match resolve_draft(&planned.spec, &templates, &actions) {
                Ok(spec) => self.reconcile::<Application>(&planned.key, &location, &spec, planned.prior.as_ref()),
                Err(e) if self.opts.dry_run && planned.prior.is_none() => {
                    log::debug!("{}: {e}", planned.key);
                    self.report(
                        &planned.key,
                        ResourceKind::Application,
                        ApplyResult::Planned { change: Change::Create },
                    )
                }
                Err(e) => self.report(
                    &planned.key,
                    ResourceKind::Application,
                    ApplyResult::failed(&e, planned.prior.clone()),
                ),
            };
            out.push(report);
        }

        out
    }

    fn destroy(&self, key: &str, identity: &ResourceIdentity) -> ResourceReport {
        self.progress.on_resource_start(key);
        let result = if self.opts.dry_run {
            ApplyResult::Planned { change: Change::Destroy }
        } else {
            let destroyed = match identity.kind {
                ResourceKind::Project => self.lifecycle::<Project>().destroy(identity),
                ResourceKind::Template => self.lifecycle::<Template>().destroy(identity),
                ResourceKind::Action => self.lifecycle::<Action>().destroy(identity),
                ResourceKind::Application => self.lifecycle::<Application>().destroy(identity),
            };
            match destroyed {
                Ok(d) => ApplyResult::Destroyed {
                    identity: d.identity,
                    already_absent: d.already_absent,
                },
                Err(e) => ApplyResult::failed(&e, Some(identity.clone())),
            }
        };
        self.report(key, identity.kind, result)
    }

    fn destroy_project(&self, project: &ProjectPlan) -> Vec<ResourceReport> {
        let mut out = Vec::new();
        for planned in &project.applications {
            if let Some(identity) = &planned.prior {
                out.push(self.destroy(&planned.key, identity));
            }
        }
        for planned in &project.templates {
            if let Some(identity) = &planned.prior {
                out.push(self.destroy(&planned.key, identity));
            }
        }
        for planned in &project.actions {
            if let Some(identity) = &planned.prior {
                out.push(self.destroy(&planned.key, identity));
            }
        }
        if let ProjectTarget::Managed {
            prior: Some(identity), ..
        } = &project.target
        {
            let key = resource_key(&project.key, ResourceKind::Project, &project.key);
            out.push(self.destroy(&key, identity));
        }
        out
    }

    fn destroy_orphans(&self, orphans: &[Orphan]) -> Vec<ResourceReport> {
        let mut orphans: Vec<&Orphan> = orphans.iter().collect();
        orphans.sort_by_key(|o| o.identity.kind.destroy_rank());
        orphans.iter().map(|o| self.destroy(&o.key, &o.identity)).collect()
    }
}

/// Turn local references into remote IDs. A reference to a local resource
/// that failed or is not defined is a [`Error::Reference`].
fn resolve_draft(draft: &ApplicationDraft, templates: &Resolved, actions: &Resolved) -> Result<ApplicationSpec> {
    let lookup = |kind: ResourceKind, table: &Resolved, reference: &Reference| match reference {
        Reference::Id(id) => Ok(id.clone()),
        Reference::Local(name) => {
            let unresolved = |reason: &str| Error::Reference {
                dependent: format!("{} {:?}", ResourceKind::Application, draft.name),
                kind,
                id: name.clone(),
                reason: reason.to_string(),
            };
            match table.get(name) {
                Some(Some(id)) => Ok(id.clone()),
                Some(None) => Err(unresolved("it did not apply")),
                None => Err(unresolved("it is not defined in this project")),
            }
        }
    };

    let template_id = match &draft.template {
        Some(reference) => lookup(ResourceKind::Template, templates, reference)?,
        None => String::new(),
    };
    let actions = draft
        .actions
        .iter()
        .map(|r| lookup(ResourceKind::Action, actions, r))
        .collect::<Result<BTreeSet<_>>>()?;

    Ok(ApplicationSpec {
        name: draft.name.clone(),
        template_id,
        readme_markdown: draft.readme_markdown.clone(),
        actions,
        application_input_variables: draft.application_input_variables.clone(),
    })
}

fn run_parallel<F>(plan: &Plan, opts: &ExecuteOptions, per_project: F) -> Result<Vec<Vec<ResourceReport>>>
where
    F: Fn(&ProjectPlan) -> Vec<ResourceReport> + Sync,
{
    if opts.jobs <= 1 || plan.projects.len() <= 1 {
        return Ok(plan.projects.iter().map(per_project).collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs)
        .build()
        .map_err(|e| Error::Other(format!("failed to create thread pool: {e}")))?;

    Ok(pool.install(|| plan.projects.par_iter().map(&per_project).collect()))
}

/// Reconcile every project in the plan, then destroy orphans.
pub fn apply_plan(
    client: &Client,
    plan: &Plan,
    opts: &ExecuteOptions,
    progress: &dyn ProgressCallback,
) -> Result<PassReport> {
    let pass = Pass {
        client,
        resolver: LocationResolver::new(client),
        opts,
        progress,
    };

    let mut report = PassReport::default();
    for reports in run_parallel(plan, opts, |p| pass.apply_project(p))? {
        report.extend(reports);
    }
    report.extend(pass.destroy_orphans(&plan.orphans));

    log::info!(
        "apply finished: {} change(s), {} failure(s)",
        report.summary.total_changes(),
        report.summary.failed
    );
    Ok(report)
}

/// Destroy every recorded resource in the plan, dependents first.
pub fn destroy_plan(
    client: &Client,
    plan: &Plan,
    opts: &ExecuteOptions,
    progress: &dyn ProgressCallback,
) -> Result<PassReport> {
    let pass = Pass {
        client,
        resolver: LocationResolver::new(client),
        opts,
        progress,
    };

    let mut report = PassReport::default();
    report.extend(pass.destroy_orphans(&plan.orphans));
    for reports in run_parallel(plan, opts, |p| pass.destroy_project(p))? {
        report.extend(reports);
    }

    log::info!(
        "destroy finished: {} removed, {} failure(s)",
        report.summary.destroyed,
        report.summary.failed
    );
    Ok(report)
}
