//! Reconciliation options and progress reporting.

use crate::executor::ApplyResult;
use crate::reconciler::LifecycleState;
use crate::retry::Patience;
use crate::types::ResourceKind;

/// Progress callback for reconciliation.
///
/// Implement this trait to receive progress updates. Callbacks may fire
/// from several worker threads at once.
pub trait ProgressCallback: Send + Sync {
    /// Called on every lifecycle state transition.
    fn on_transition(&self, kind: ResourceKind, name: &str, from: LifecycleState, to: LifecycleState);

    /// Called when the executor starts on a resource.
    fn on_resource_start(&self, _key: &str) {}

    /// Called when the executor is done with a resource.
    fn on_resource_complete(&self, _key: &str, _result: &ApplyResult) {}
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_transition(&self, _kind: ResourceKind, _name: &str, _from: LifecycleState, _to: LifecycleState) {}
}

/// Knobs for a single reconcile or destroy.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOptions {
    /// Overwrite remote changes instead of reporting drift
    pub correct_drift: bool,
    /// Poll until a created entity is readable
    pub confirm_create: bool,
    /// Polling schedule for create and destroy confirmation
    pub patience: Patience,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            correct_drift: false,
            confirm_create: true,
            patience: Patience::default(),
        }
    }
}
