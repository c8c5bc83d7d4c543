//! Lifecycle reconciliation for remote entities.
//!
//! Every kind moves through the same state machine:
//!
//! ```text
//! Absent -> Creating -> Present -> Deleting -> Destroyed
//!              |                      |
//!              +------> Failed <------+
//! ```
//!
//! [`Lifecycle`] drives one entity through it. The kind-specific parts
//! (which client calls to make, what counts as drift, local validation)
//! live behind the [`Entity`] trait, implemented once per kind.

mod action;
mod application;
mod project;
mod template;

pub use action::{Action, ActionReconciler};
pub use application::{Application, ApplicationReconciler};
pub use project::{Project, ProjectReconciler};
pub use template::{Template, TemplateReconciler};

use crate::client::Client;
use crate::context::{NoProgress, ProgressCallback, ReconcileOptions};
use crate::drift::Drift;
use crate::error::{Error, Result};
use crate::types::{Location, ResourceIdentity, ResourceKind};
use crate::verify::Verifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Lifecycle states of a managed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Absent,
    Creating,
    Present,
    Deleting,
    Destroyed,
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Absent => "absent",
            LifecycleState::Creating => "creating",
            LifecycleState::Present => "present",
            LifecycleState::Deleting => "deleting",
            LifecycleState::Destroyed => "destroyed",
            LifecycleState::Failed => "failed",
        }
    }

    /// Whether the machine may move from `self` to `to`.
    pub fn can_transition(self, to: LifecycleState) -> bool {
        use LifecycleState::{Absent, Creating, Deleting, Destroyed, Failed, Present};
        matches!(
            (self, to),
            (Absent, Creating) | (Creating, Present) | (Present, Deleting) | (Deleting, Destroyed)
        ) || (to == Failed && !matches!(self, Failed | Destroyed))
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enforces legal transitions for one entity and reports each of them.
pub struct Machine<'p> {
    kind: ResourceKind,
    name: String,
    state: LifecycleState,
    progress: &'p dyn ProgressCallback,
}

impl<'p> Machine<'p> {
    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        state: LifecycleState,
        progress: &'p dyn ProgressCallback,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            state,
            progress,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Move to `to`, rejecting illegal transitions.
    pub fn advance(&mut self, to: LifecycleState) -> Result<()> {
        let from = self.state;
        if !from.can_transition(to) {
            return Err(Error::InvalidTransition {
                kind: self.kind,
                name: self.name.clone(),
                from,
                to,
            });
        }
        log::debug!("{} {:?}: {from} -> {to}", self.kind, self.name);
        self.progress.on_transition(self.kind, &self.name, from, to);
        self.state = to;
        Ok(())
    }

    /// Record an unrecoverable error.
    pub fn fail(&mut self) {
        if self.state.can_transition(LifecycleState::Failed) {
            let from = self.state;
            self.progress
                .on_transition(self.kind, &self.name, from, LifecycleState::Failed);
            self.state = LifecycleState::Failed;
        }
    }
}

/// Kind-specific behaviour plugged into [`Lifecycle`].
pub trait Entity: 'static {
    const KIND: ResourceKind;

    /// Desired state
    type Spec: fmt::Debug + Sync;
    /// Observed state
    type State: fmt::Debug + Clone + Send;
    /// Scope the entity is created in: an organization ID for projects, a
    /// [`Location`] for everything else
    type Parent: ?Sized + Sync;

    /// Name of the entity a spec describes.
    fn name(spec: &Self::Spec) -> &str;

    /// Remote ID of an observed entity.
    fn id(state: &Self::State) -> &str;

    /// Location of the entity with remote ID `id` created under `parent`.
    fn location(parent: &Self::Parent, id: &str) -> Result<Location>;

    /// Scope to address a recorded entity in.
    fn parent_of(identity: &ResourceIdentity) -> &Self::Parent;

    /// Local checks run before any remote call.
    fn validate(spec: &Self::Spec) -> Result<()> {
        if Self::name(spec).trim().is_empty() {
            return Err(Error::validation(Self::KIND, "", "name", "name is required"));
        }
        Ok(())
    }

    /// Resolve dependencies before writing; runs ahead of create and update.
    fn prepare(_client: &Client, _parent: &Self::Parent, _spec: &Self::Spec) -> Result<()> {
        Ok(())
    }

    fn get(client: &Client, parent: &Self::Parent, id: &str) -> Result<Self::State>;
    fn create(client: &Client, parent: &Self::Parent, spec: &Self::Spec) -> Result<Self::State>;
    fn update(client: &Client, parent: &Self::Parent, id: &str, spec: &Self::Spec) -> Result<Self::State>;
    fn delete(client: &Client, parent: &Self::Parent, id: &str) -> Result<()>;

    /// First caller-settable field where `state` differs from `spec`.
    fn drift(spec: &Self::Spec, state: &Self::State) -> Option<Drift>;
}

/// How a reconcile ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// No prior record; the entity was created
    Created,
    /// The recorded entity had vanished and was created again
    Recreated,
    /// Drift was corrected in place
    Updated,
    /// Already matches the spec
    Unchanged,
}

impl Outcome {
    pub fn is_change(&self) -> bool {
        !matches!(self, Outcome::Unchanged)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Created => "created",
            Outcome::Recreated => "recreated",
            Outcome::Updated => "updated",
            Outcome::Unchanged => "unchanged",
        })
    }
}

/// A successfully reconciled entity.
#[derive(Debug, Clone)]
pub struct Reconciled<S> {
    pub identity: ResourceIdentity,
    pub state: S,
    pub outcome: Outcome,
}

/// What a read found.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<S> {
    Present(S),
    Absent,
}

impl<S> Observation<S> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Observation::Absent)
    }
}

/// A completed destroy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destroyed {
    pub identity: ResourceIdentity,
    /// Delete answered NotFound: someone got there first
    pub already_absent: bool,
    /// Probes needed to confirm absence
    pub checks: u32,
}

/// Drives entities of kind `E` through their lifecycle.
pub struct Lifecycle<'a, E: Entity> {
    client: &'a Client,
    options: ReconcileOptions,
    progress: &'a dyn ProgressCallback,
    entity: PhantomData<fn() -> E>,
}

impl<'a, E: Entity> Lifecycle<'a, E> {
    pub fn new(client: &'a Client) -> Self {
        Self {
            client,
            options: ReconcileOptions::default(),
            progress: &NoProgress,
            entity: PhantomData,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: &'a dyn ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    fn check_kind(&self, identity: &ResourceIdentity, name: &str) -> Result<()> {
        if identity.kind != E::KIND {
            return Err(Error::validation(
                E::KIND,
                name,
                "identity",
                format!("recorded identity {identity} is not a {}", E::KIND),
            ));
        }
        Ok(())
    }

    /// Bring the remote entity in line with `spec`.
    ///
    /// With a `prior` identity the recorded entity is probed first; without
    /// one, or if it has vanished, a new entity is created.
    pub fn reconcile(
        &self,
        parent: &E::Parent,
        spec: &E::Spec,
        prior: Option<&ResourceIdentity>,
    ) -> Result<Reconciled<E::State>> {
        let name = E::name(spec);
        E::validate(spec)?;

        let Some(prior) = prior else {
            return self.create(parent, spec, Outcome::Created);
        };

        self.check_kind(prior, name)?;
        match self.read(prior)? {
            Observation::Present(state) => self.converge(parent, spec, prior, state),
            Observation::Absent => {
                log::warn!("{} {name:?} ({}) is gone remotely; creating it again", E::KIND, prior.id);
                self.create(parent, spec, Outcome::Recreated)
            }
        }
    }

    fn converge(
        &self,
        parent: &E::Parent,
        spec: &E::Spec,
        prior: &ResourceIdentity,
        state: E::State,
    ) -> Result<Reconciled<E::State>> {
        let Some(drift) = E::drift(spec, &state) else {
            log::debug!("{} {:?} is up to date", E::KIND, E::name(spec));
            return Ok(Reconciled {
                identity: prior.clone(),
                state,
                outcome: Outcome::Unchanged,
            });
        };

        if !self.options.correct_drift {
            log::warn!("{drift}");
            return Err(Error::Drift(Box::new(drift)));
        }

        log::info!("correcting {drift}");
        E::prepare(self.client, parent, spec)?;
        let state = E::update(self.client, parent, &prior.id, spec)?;
        Ok(Reconciled {
            identity: prior.clone(),
            state,
            outcome: Outcome::Updated,
        })
    }

    fn create(&self, parent: &E::Parent, spec: &E::Spec, outcome: Outcome) -> Result<Reconciled<E::State>> {
        let name = E::name(spec);
        E::prepare(self.client, parent, spec)?;

        let mut machine = Machine::new(E::KIND, name, LifecycleState::Absent, self.progress);
        machine.advance(LifecycleState::Creating)?;

        let state = match E::create(self.client, parent, spec) {
            Ok(state) => state,
            Err(e) => {
                machine.fail();
                return Err(e);
            }
        };

        let identity = ResourceIdentity::new(E::KIND, E::id(&state), E::location(parent, E::id(&state))?);
        log::info!("created {} {name:?} as {}", E::KIND, identity.id);

        if self.options.confirm_create
            && let Err(e) = Verifier::<E>::new(self.client).wait_for_presence(&identity, &self.options.patience)
        {
            machine.fail();
            return Err(e);
        }

        machine.advance(LifecycleState::Present)?;
        Ok(Reconciled {
            identity,
            state,
            outcome,
        })
    }

    /// Observe a recorded entity. A missing entity is not an error.
    pub fn read(&self, identity: &ResourceIdentity) -> Result<Observation<E::State>> {
        self.check_kind(identity, &identity.id)?;
        match E::get(self.client, E::parent_of(identity), &identity.id) {
            Ok(state) => Ok(Observation::Present(state)),
            Err(e) if e.is_not_found() => Ok(Observation::Absent),
            Err(e) => Err(e),
        }
    }

    /// Delete a recorded entity and wait until the API stops reporting it.
    pub fn destroy(&self, identity: &ResourceIdentity) -> Result<Destroyed> {
        self.check_kind(identity, &identity.id)?;
        let mut machine = Machine::new(E::KIND, identity.id.clone(), LifecycleState::Present, self.progress);
        machine.advance(LifecycleState::Deleting)?;

        match E::delete(self.client, E::parent_of(identity), &identity.id) {
            Ok(()) => log::info!("deleted {identity}"),
            Err(e) if e.is_not_found() => {
                log::debug!("{identity} was already gone");
                machine.advance(LifecycleState::Destroyed)?;
                return Ok(Destroyed {
                    identity: identity.clone(),
                    already_absent: true,
                    checks: 0,
                });
            }
            Err(e) => {
                machine.fail();
                return Err(e);
            }
        }

        match Verifier::<E>::new(self.client).wait_for_absence(identity, &self.options.patience) {
            Ok(checks) => {
                machine.advance(LifecycleState::Destroyed)?;
                Ok(Destroyed {
                    identity: identity.clone(),
                    already_absent: false,
                    checks,
                })
            }
            Err(e) => {
                machine.fail();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::retry::{Patience, RetryConfig};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Progress callback that records every transition.
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub transitions: Mutex<Vec<(String, LifecycleState, LifecycleState)>>,
    }

    impl ProgressCallback for Recorder {
        fn on_transition(&self, _kind: ResourceKind, name: &str, from: LifecycleState, to: LifecycleState) {
            self.transitions
                .lock()
                .unwrap()
                .push((name.to_string(), from, to));
        }
    }

    impl Recorder {
        pub fn states(&self) -> Vec<LifecycleState> {
            self.transitions.lock().unwrap().iter().map(|t| t.2).collect()
        }
    }

    pub(crate) fn fast_options() -> ReconcileOptions {
        ReconcileOptions {
            patience: Patience::new(4, Duration::from_millis(1)),
            ..Default::default()
        }
    }

    pub(crate) fn setup() -> (Arc<MemoryBackend>, Client, Location) {
        let backend = Arc::new(MemoryBackend::new());
        let project = backend.seed_project("org-1", "demo");
        let location = Location::new("org-1", project.id).unwrap();
        let client = Client::with_backend(backend.clone()).with_retry(RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(1),
        });
        (backend, client, location)
    }

    #[test]
    fn test_legal_transitions() {
        use LifecycleState::*;
        assert!(Absent.can_transition(Creating));
        assert!(Creating.can_transition(Present));
        assert!(Present.can_transition(Deleting));
        assert!(Deleting.can_transition(Destroyed));
        assert!(Creating.can_transition(Failed));
        assert!(Deleting.can_transition(Failed));

        assert!(!Absent.can_transition(Present));
        assert!(!Destroyed.can_transition(Creating));
        assert!(!Present.can_transition(Destroyed));
        assert!(!Destroyed.can_transition(Failed));
    }

    #[test]
    fn test_machine_rejects_illegal_transition() {
        let recorder = Recorder::default();
        let mut machine = Machine::new(ResourceKind::Template, "starter", LifecycleState::Absent, &recorder);

        let err = machine.advance(LifecycleState::Deleting).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(machine.state(), LifecycleState::Absent);

        machine.advance(LifecycleState::Creating).unwrap();
        machine.fail();
        machine.fail();
        assert_eq!(recorder.states(), vec![LifecycleState::Creating, LifecycleState::Failed]);
    }

    #[test]
    fn test_wrong_identity_kind_is_rejected() {
        let (_, client, location) = setup();
        let identity = ResourceIdentity::new(ResourceKind::Action, "act-1", location);
        let err = TemplateReconciler::new(&client).read(&identity).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Validation);
    }
}
