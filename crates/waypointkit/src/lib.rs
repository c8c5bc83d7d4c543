//! # Waypointkit
//!
//! Reconciles HCP Waypoint projects, templates, actions and applications
//! against an eventually-consistent remote API.
//!
//! ## Core Concepts
//!
//! - **Client**: Typed access to the remote API with retry and cancellation
//! - **Location**: The organization and project an entity lives in
//! - **Lifecycle**: Drives one entity through create, drift check and destroy
//! - **Verifier**: Confirms that a create or delete became visible
//! - **Linker**: Checks an application's template and action references
//! - **Executor**: Applies a plan across projects in parallel
//!
//! ## Example
//!
//! ```ignore
//! use waypointkit::{Client, HttpBackend, TemplateReconciler, TemplateSpec, Location};
//!
//! let client = Client::new(HttpBackend::new().with_token(token));
//! let location = Location::new("org-1", "prj-1")?;
//!
//! let done = TemplateReconciler::new(&client).reconcile(&location, &TemplateSpec::new("starter"), None)?;
//! println!("{} {}", done.identity, done.outcome);
//! ```
//!
//! ## Provider Traits
//!
//! - [`Backend`]: The remote API; [`HttpBackend`] for real use,
//!   [`MemoryBackend`] for tests
//! - [`ProgressCallback`]: Receives lifecycle transitions
//! - [`RetryCallback`]: Observes retries of transient failures

pub mod backend;
pub mod cancel;
pub mod client;
pub mod context;
pub mod drift;
pub mod error;
pub mod executor;
pub mod linker;
pub mod location;
pub mod reconciler;
pub mod retry;
pub mod types;
pub mod variables;
pub mod verify;

// Re-export main types at crate root
pub use backend::http::HttpBackend;
pub use backend::memory::MemoryBackend;
pub use backend::{Backend, BackendError};
pub use cancel::CancelToken;
pub use client::Client;
pub use context::{NoProgress, ProgressCallback, ReconcileOptions};
pub use drift::Drift;
pub use error::{Error, ErrorCategory, Result, Step};
pub use executor::{
    ApplicationDraft, ApplyResult, Change, ExecuteOptions, ExecuteSummary, Orphan, PassReport, Plan,
    Planned, ProjectPlan, ProjectTarget, Reference, ResourceReport, apply_plan, destroy_plan, resource_key,
};
pub use linker::{LinkedApplication, Linker};
pub use location::LocationResolver;
pub use reconciler::{
    ActionReconciler, ApplicationReconciler, Destroyed, Lifecycle, LifecycleState, Outcome,
    ProjectReconciler, Reconciled, TemplateReconciler,
};
pub use retry::{NoCallback, Patience, RetryCallback, RetryConfig};
pub use types::{
    ActionRequest, ActionSpec, ActionState, ApplicationSpec, ApplicationState, Location, ProjectSpec,
    ProjectState, ResourceIdentity, ResourceKind, TemplateSpec, TemplateState, TerraformCloudWorkspace,
};
pub use variables::{InputVariable, VariableOption, VariableType, VariableValue};
pub use verify::{Existence, Verifier};
