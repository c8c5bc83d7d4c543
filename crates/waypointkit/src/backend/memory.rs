//! In-memory simulation of the Waypoint API.
//!
//! Behaves like the real service closely enough to exercise reconciliation
//! end to end: IDs are assigned on create, names are unique per project,
//! applications are validated against their template, and reads can lag
//! behind writes. Faults can be injected per kind and verb.

use crate::backend::{Backend, BackendError, BackendResult};
use crate::cancel::CancelToken;
use crate::error::Step;
use crate::types::{
    ActionSpec, ActionState, ApplicationSpec, ApplicationState, Location, ProjectSpec,
    ProjectState, ResourceKind, TemplateSpec, TemplateState,
};
use crate::variables::resolve_inputs;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub kind: ResourceKind,
    pub step: Step,
    /// Entity ID, or its name for creates
    pub target: String,
}

/// An in-process stand-in for the remote API.
///
/// ```
/// use waypointkit::backend::memory::MemoryBackend;
/// use waypointkit::backend::Backend;
///
/// let backend = MemoryBackend::new().with_organization("org-1");
/// let project = backend.seed_project("org-1", "demo");
/// assert_eq!(backend.get_project(&project.id).unwrap().name, "demo");
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    world: Mutex<World>,
}

#[derive(Debug, Default)]
struct World {
    next_id: u32,
    organizations: BTreeSet<String>,
    projects: BTreeMap<String, Record<ProjectState>>,
    templates: BTreeMap<String, Record<TemplateState>>,
    actions: BTreeMap<String, Record<ActionState>>,
    applications: BTreeMap<String, Record<ApplicationState>>,
    faults: VecDeque<(ResourceKind, Step, BackendError)>,
    cancels: Vec<(ResourceKind, Step, CancelToken)>,
    linger_after_delete: u32,
    hide_after_create: u32,
    calls: Vec<Call>,
}

#[derive(Debug)]
struct Record<S> {
    /// Scope of the entity; `None` for projects
    location: Option<Location>,
    state: S,
    deleted: bool,
    /// Reads that still see the entity after delete
    linger: u32,
    /// Reads that miss the entity after create
    hidden: u32,
}

impl<S: Clone> Record<S> {
    fn new(location: Option<Location>, state: S, hidden: u32) -> Self {
        Self {
            location,
            state,
            deleted: false,
            linger: 0,
            hidden,
        }
    }

    /// What a read sees right now; consumes one tick of lag.
    fn observe(&mut self) -> Option<S> {
        if self.deleted {
            if self.linger == 0 {
                return None;
            }
            self.linger -= 1;
            return Some(self.state.clone());
        }
        if self.hidden > 0 {
            self.hidden -= 1;
            return None;
        }
        Some(self.state.clone())
    }

    fn live_in(&self, location: &Location) -> bool {
        !self.deleted && self.location.as_ref() == Some(location)
    }
}

trait Named {
    fn name(&self) -> &str;
}

impl Named for ProjectState {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for TemplateState {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for ActionState {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for ApplicationState {
    fn name(&self) -> &str {
        &self.name
    }
}

fn not_found(kind: ResourceKind, id: &str) -> BackendError {
    BackendError::not_found(format!("{kind} {id} not found"))
}

fn invalid(message: impl Into<String>) -> BackendError {
    BackendError::new(Some(400), message)
}

fn conflict(kind: ResourceKind, name: &str) -> BackendError {
    BackendError::new(Some(409), format!("a {kind} named {name:?} already exists"))
}

fn get_in<S: Clone>(
    table: &mut BTreeMap<String, Record<S>>,
    kind: ResourceKind,
    location: &Location,
    id: &str,
) -> BackendResult<S> {
    table
        .get_mut(id)
        .filter(|r| r.location.as_ref() == Some(location))
        .and_then(Record::observe)
        .ok_or_else(|| not_found(kind, id))
}

fn delete_in<S>(
    table: &mut BTreeMap<String, Record<S>>,
    kind: ResourceKind,
    location: Option<&Location>,
    id: &str,
    linger: u32,
) -> BackendResult<()> {
    let record = table
        .get_mut(id)
        .filter(|r| !r.deleted && r.location.as_ref() == location)
        .ok_or_else(|| not_found(kind, id))?;
    record.deleted = true;
    record.linger = linger;
    Ok(())
}

fn ensure_unique<S: Named + Clone>(
    table: &BTreeMap<String, Record<S>>,
    kind: ResourceKind,
    location: &Location,
    name: &str,
    except: Option<&str>,
) -> BackendResult<()> {
    let taken = table
        .iter()
        .any(|(id, r)| Some(id.as_str()) != except && r.live_in(location) && r.state.name() == name);
    if taken {
        return Err(conflict(kind, name));
    }
    Ok(())
}

fn live_mut<'t, S: Clone>(
    table: &'t mut BTreeMap<String, Record<S>>,
    kind: ResourceKind,
    location: &Location,
    id: &str,
) -> BackendResult<&'t mut Record<S>> {
    table
        .get_mut(id)
        .filter(|r| r.live_in(location))
        .ok_or_else(|| not_found(kind, id))
}

impl World {
    /// Log the call and fire the first matching injected fault.
    fn begin(&mut self, kind: ResourceKind, step: Step, target: &str) -> BackendResult<()> {
        self.calls.push(Call {
            kind,
            step,
            target: target.to_string(),
        });
        if let Some(pos) = self.cancels.iter().position(|(k, s, _)| *k == kind && *s == step) {
            let (_, _, token) = self.cancels.remove(pos);
            token.cancel();
        }
        if let Some(pos) = self
            .faults
            .iter()
            .position(|(k, s, _)| *k == kind && *s == step)
            && let Some((_, _, err)) = self.faults.remove(pos)
        {
            log::debug!("injected fault for {kind} {step}: {err}");
            return Err(err);
        }
        Ok(())
    }

    fn next_id(&mut self, kind: ResourceKind) -> String {
        self.next_id += 1;
        let prefix = match kind {
            ResourceKind::Project => "prj",
            ResourceKind::Template => "tpl",
            ResourceKind::Action => "act",
            ResourceKind::Application => "app",
        };
        format!("{prefix}-{:04}", self.next_id)
    }

    /// The project must exist, be live, and belong to the location's organization.
    fn ensure_project(&self, location: &Location) -> BackendResult<()> {
        match self.projects.get(location.project_id()) {
            Some(r) if !r.deleted && r.state.parent_organization_id == location.organization_id() => Ok(()),
            _ => Err(not_found(ResourceKind::Project, location.project_id())),
        }
    }

    fn build_application(
        &self,
        location: &Location,
        id: String,
        spec: &ApplicationSpec,
    ) -> BackendResult<ApplicationState> {
        let template = self
            .templates
            .get(&spec.template_id)
            .filter(|r| r.live_in(location))
            .map(|r| &r.state)
            .ok_or_else(|| invalid(format!("template {:?} does not exist", spec.template_id)))?;

        for action_id in &spec.actions {
            if !self.actions.get(action_id).is_some_and(|r| r.live_in(location)) {
                return Err(invalid(format!("action {action_id:?} does not exist")));
            }
        }

        let resolved = resolve_inputs(&template.variable_options, &spec.application_input_variables, &spec.name)
            .map_err(|e| invalid(e.to_string()))?;

        Ok(ApplicationState {
            id,
            name: spec.name.clone(),
            template_id: template.id.clone(),
            template_name: template.name.clone(),
            readme_markdown: spec.readme_markdown.clone(),
            action_ids: spec.actions.clone(),
            application_input_variables: resolved.application,
            template_input_variables: resolved.template,
        })
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an organization projects can be created in.
    #[must_use]
    pub fn with_organization(self, organization_id: impl Into<String>) -> Self {
        self.lock().organizations.insert(organization_id.into());
        self
    }

    /// Create a project directly, bypassing the call log and faults.
    pub fn seed_project(&self, organization_id: &str, name: &str) -> ProjectState {
        let mut world = self.lock();
        world.organizations.insert(organization_id.to_string());
        let id = world.next_id(ResourceKind::Project);
        let state = ProjectState {
            id: id.clone(),
            name: name.to_string(),
            description: String::new(),
            parent_organization_id: organization_id.to_string(),
        };
        world.projects.insert(id, Record::new(None, state.clone(), 0));
        state
    }

    /// Fail the next `step` call on `kind` with `err`.
    pub fn fail_next(&self, kind: ResourceKind, step: Step, err: BackendError) {
        self.lock().faults.push_back((kind, step, err));
    }

    /// Cancel `token` while serving the next `step` call on `kind`. The
    /// call itself still completes.
    pub fn cancel_during_next(&self, kind: ResourceKind, step: Step, token: CancelToken) {
        self.lock().cancels.push((kind, step, token));
    }

    /// Keep deleted entities visible to the next `reads` gets.
    pub fn linger_after_delete(&self, reads: u32) {
        self.lock().linger_after_delete = reads;
    }

    /// Hide created entities from the next `reads` gets.
    pub fn hide_after_create(&self, reads: u32) {
        self.lock().hide_after_create = reads;
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of `step` calls made on `kind`.
    pub fn count(&self, kind: ResourceKind, step: Step) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.kind == kind && c.step == step)
            .count()
    }

    /// Change a template behind the reconciler's back.
    pub fn edit_template(&self, id: &str, edit: impl FnOnce(&mut TemplateState)) {
        if let Some(record) = self.lock().templates.get_mut(id) {
            edit(&mut record.state);
        }
    }

    /// Change an application behind the reconciler's back.
    pub fn edit_application(&self, id: &str, edit: impl FnOnce(&mut ApplicationState)) {
        if let Some(record) = self.lock().applications.get_mut(id) {
            edit(&mut record.state);
        }
    }

    /// Remove an entity immediately, as if deleted by someone else.
    pub fn remove(&self, kind: ResourceKind, id: &str) {
        let mut world = self.lock();
        match kind {
            ResourceKind::Project => world.projects.remove(id).map(|_| ()),
            ResourceKind::Template => world.templates.remove(id).map(|_| ()),
            ResourceKind::Action => world.actions.remove(id).map(|_| ()),
            ResourceKind::Application => world.applications.remove(id).map(|_| ()),
        };
    }
}

impl Backend for MemoryBackend {
    fn get_project(&self, project_id: &str) -> BackendResult<ProjectState> {
        let mut world = self.lock();
        world.begin(ResourceKind::Project, Step::Get, project_id)?;
        world
            .projects
            .get_mut(project_id)
            .and_then(Record::observe)
            .ok_or_else(|| not_found(ResourceKind::Project, project_id))
    }

    fn create_project(&self, organization_id: &str, spec: &ProjectSpec) -> BackendResult<ProjectState> {
        let mut world = self.lock();
        world.begin(ResourceKind::Project, Step::Create, &spec.name)?;
        if !world.organizations.contains(organization_id) {
            return Err(BackendError::new(
                Some(403),
                format!("no access to organization {organization_id}"),
            ));
        }
        let duplicate = world
            .projects
            .values()
            .any(|r| !r.deleted && r.state.parent_organization_id == organization_id && r.state.name == spec.name);
        if duplicate {
            return Err(conflict(ResourceKind::Project, &spec.name));
        }
        let id = world.next_id(ResourceKind::Project);
        let state = ProjectState {
            id: id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            parent_organization_id: organization_id.to_string(),
        };
        let hidden = world.hide_after_create;
        world.projects.insert(id, Record::new(None, state.clone(), hidden));
        Ok(state)
    }

    fn update_project(&self, project_id: &str, spec: &ProjectSpec) -> BackendResult<ProjectState> {
        let mut world = self.lock();
        world.begin(ResourceKind::Project, Step::Update, project_id)?;
        let record = world
            .projects
            .get_mut(project_id)
            .filter(|r| !r.deleted)
            .ok_or_else(|| not_found(ResourceKind::Project, project_id))?;
        record.state.name = spec.name.clone();
        record.state.description = spec.description.clone();
        Ok(record.state.clone())
    }

    fn delete_project(&self, project_id: &str) -> BackendResult<()> {
        let mut world = self.lock();
        world.begin(ResourceKind::Project, Step::Delete, project_id)?;
        let linger = world.linger_after_delete;
        delete_in(&mut world.projects, ResourceKind::Project, None, project_id, linger)
    }

    fn get_template(&self, location: &Location, id: &str) -> BackendResult<TemplateState> {
        let mut world = self.lock();
        world.begin(ResourceKind::Template, Step::Get, id)?;
        get_in(&mut world.templates, ResourceKind::Template, location, id)
    }

    fn create_template(&self, location: &Location, spec: &TemplateSpec) -> BackendResult<TemplateState> {
        let mut world = self.lock();
        world.begin(ResourceKind::Template, Step::Create, &spec.name)?;
        world.ensure_project(location)?;
        if spec.name.trim().is_empty() {
            return Err(invalid("template name is required"));
        }
        ensure_unique(&world.templates, ResourceKind::Template, location, &spec.name, None)?;
        let id = world.next_id(ResourceKind::Template);
        let state = TemplateState::from_spec(id.clone(), spec);
        let hidden = world.hide_after_create;
        world
            .templates
            .insert(id, Record::new(Some(location.clone()), state.clone(), hidden));
        Ok(state)
    }

    fn update_template(&self, location: &Location, id: &str, spec: &TemplateSpec) -> BackendResult<TemplateState> {
        let mut world = self.lock();
        world.begin(ResourceKind::Template, Step::Update, id)?;
        ensure_unique(&world.templates, ResourceKind::Template, location, &spec.name, Some(id))?;
        let record = live_mut(&mut world.templates, ResourceKind::Template, location, id)?;
        record.state = TemplateState::from_spec(id, spec);
        Ok(record.state.clone())
    }

    fn delete_template(&self, location: &Location, id: &str) -> BackendResult<()> {
        let mut world = self.lock();
        world.begin(ResourceKind::Template, Step::Delete, id)?;
        let in_use = world
            .applications
            .values()
            .any(|r| r.live_in(location) && r.state.template_id == id);
        if in_use {
            return Err(BackendError::new(
                Some(409),
                format!("template {id} is still used by an application"),
            ));
        }
        let linger = world.linger_after_delete;
        delete_in(&mut world.templates, ResourceKind::Template, Some(location), id, linger)
    }

    fn get_action(&self, location: &Location, id: &str) -> BackendResult<ActionState> {
        let mut world = self.lock();
        world.begin(ResourceKind::Action, Step::Get, id)?;
        get_in(&mut world.actions, ResourceKind::Action, location, id)
    }

    fn create_action(&self, location: &Location, spec: &ActionSpec) -> BackendResult<ActionState> {
        let mut world = self.lock();
        world.begin(ResourceKind::Action, Step::Create, &spec.name)?;
        world.ensure_project(location)?;
        ensure_unique(&world.actions, ResourceKind::Action, location, &spec.name, None)?;
        let id = world.next_id(ResourceKind::Action);
        let state = ActionState {
            id: id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            request: spec.request.clone(),
        };
        let hidden = world.hide_after_create;
        world
            .actions
            .insert(id, Record::new(Some(location.clone()), state.clone(), hidden));
        Ok(state)
    }

    fn update_action(&self, location: &Location, id: &str, spec: &ActionSpec) -> BackendResult<ActionState> {
        let mut world = self.lock();
        world.begin(ResourceKind::Action, Step::Update, id)?;
        ensure_unique(&world.actions, ResourceKind::Action, location, &spec.name, Some(id))?;
        let record = live_mut(&mut world.actions, ResourceKind::Action, location, id)?;
        record.state.name = spec.name.clone();
        record.state.description = spec.description.clone();
        record.state.request = spec.request.clone();
        Ok(record.state.clone())
    }

    fn delete_action(&self, location: &Location, id: &str) -> BackendResult<()> {
        let mut world = self.lock();
        world.begin(ResourceKind::Action, Step::Delete, id)?;
        let linger = world.linger_after_delete;
        delete_in(&mut world.actions, ResourceKind::Action, Some(location), id, linger)
    }

    fn get_application(&self, location: &Location, id: &str) -> BackendResult<ApplicationState> {
        let mut world = self.lock();
        world.begin(ResourceKind::Application, Step::Get, id)?;
        get_in(&mut world.applications, ResourceKind::Application, location, id)
    }

    fn create_application(&self, location: &Location, spec: &ApplicationSpec) -> BackendResult<ApplicationState> {
        let mut world = self.lock();
        world.begin(ResourceKind::Application, Step::Create, &spec.name)?;
        world.ensure_project(location)?;
        ensure_unique(&world.applications, ResourceKind::Application, location, &spec.name, None)?;
        let id = world.next_id(ResourceKind::Application);
        let state = world.build_application(location, id.clone(), spec)?;
        let hidden = world.hide_after_create;
        world
            .applications
            .insert(id, Record::new(Some(location.clone()), state.clone(), hidden));
        Ok(state)
    }

    fn update_application(
        &self,
        location: &Location,
        id: &str,
        spec: &ApplicationSpec,
    ) -> BackendResult<ApplicationState> {
        let mut world = self.lock();
        world.begin(ResourceKind::Application, Step::Update, id)?;
        ensure_unique(&world.applications, ResourceKind::Application, location, &spec.name, Some(id))?;
        live_mut(&mut world.applications, ResourceKind::Application, location, id)?;
        let state = world.build_application(location, id.to_string(), spec)?;
        let record = live_mut(&mut world.applications, ResourceKind::Application, location, id)?;
        record.state = state.clone();
        Ok(state)
    }

    fn delete_application(&self, location: &Location, id: &str) -> BackendResult<()> {
        let mut world = self.lock();
        world.begin(ResourceKind::Application, Step::Delete, id)?;
        let linger = world.linger_after_delete;
        delete_in(&mut world.applications, ResourceKind::Application, Some(location), id, linger)
    }
}
