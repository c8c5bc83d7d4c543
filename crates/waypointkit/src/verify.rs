//! Existence checks against an eventually-consistent API.
//!
//! A single probe answers with a tri-state [`Existence`]: only a NotFound
//! response counts as absence, every other failure is indeterminate. The
//! wait loops poll under a [`Patience`] schedule and stop early when the
//! client's cancel token fires.

use crate::client::Client;
use crate::error::{Error, Result, Step};
use crate::reconciler::Entity;
use crate::retry::Patience;
use crate::types::ResourceIdentity;
use std::marker::PhantomData;

/// Outcome of one existence probe.
#[derive(Debug)]
pub enum Existence<S> {
    Present(S),
    Absent,
    /// The probe failed for a reason other than NotFound
    Indeterminate(Error),
}

impl<S> Existence<S> {
    pub fn is_present(&self) -> bool {
        matches!(self, Existence::Present(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Existence::Absent)
    }
}

/// Probes entities of kind `E`.
pub struct Verifier<E: Entity> {
    client: Client,
    entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Verifier<E> {
    /// Probes go through a non-retrying copy of `client`.
    pub fn new(client: &Client) -> Self {
        Self {
            client: client.single_shot(),
            entity: PhantomData,
        }
    }

    fn probe(&self, identity: &ResourceIdentity) -> Existence<E::State> {
        match E::get(&self.client, E::parent_of(identity), &identity.id) {
            Ok(state) => Existence::Present(state),
            Err(e) if e.is_not_found() => Existence::Absent,
            Err(e) => Existence::Indeterminate(e),
        }
    }

    /// Single probe, expecting the entity to exist.
    pub fn confirm_present(&self, identity: &ResourceIdentity) -> Existence<E::State> {
        self.probe(identity)
    }

    /// Single probe, expecting the entity to be gone.
    pub fn confirm_absent(&self, identity: &ResourceIdentity) -> Existence<E::State> {
        self.probe(identity)
    }

    fn cancelled(identity: &ResourceIdentity, step: Step) -> Error {
        Error::Cancelled {
            kind: identity.kind,
            name: identity.id.clone(),
            step,
        }
    }

    /// Poll until the entity is absent. Returns the number of probes made.
    pub fn wait_for_absence(&self, identity: &ResourceIdentity, patience: &Patience) -> Result<u32> {
        let cancel = self.client.cancel_token();
        let max_attempts = patience.max_attempts.max(1);

        for attempt in 0..max_attempts {
            if cancel.is_cancelled() {
                return Err(Self::cancelled(identity, Step::Delete));
            }
            match self.probe(identity) {
                Existence::Absent => {
                    log::debug!("{identity} confirmed absent after {} checks", attempt + 1);
                    return Ok(attempt + 1);
                }
                Existence::Present(_) => {
                    log::debug!("{identity} still visible ({}/{max_attempts})", attempt + 1);
                }
                Existence::Indeterminate(e) => {
                    log::warn!("{identity} existence unknown ({}/{max_attempts}): {e}", attempt + 1);
                }
            }
            if attempt + 1 < max_attempts && !cancel.sleep(patience.delay_for_attempt(attempt)) {
                return Err(Self::cancelled(identity, Step::Delete));
            }
        }

        if cancel.is_cancelled() {
            return Err(Self::cancelled(identity, Step::Delete));
        }
        log::warn!("{identity} still present after {max_attempts} checks");
        Err(Error::DestroyNotConfirmed {
            kind: identity.kind,
            id: identity.id.clone(),
            attempts: max_attempts,
        })
    }

    /// Poll until the entity is readable and return what was read.
    pub fn wait_for_presence(&self, identity: &ResourceIdentity, patience: &Patience) -> Result<E::State> {
        let cancel = self.client.cancel_token();
        let max_attempts = patience.max_attempts.max(1);

        for attempt in 0..max_attempts {
            if cancel.is_cancelled() {
                return Err(Self::cancelled(identity, Step::Create));
            }
            match self.probe(identity) {
                Existence::Present(state) => return Ok(state),
                Existence::Absent => {
                    log::debug!("{identity} not visible yet ({}/{max_attempts})", attempt + 1);
                }
                Existence::Indeterminate(e) => {
                    log::warn!("{identity} existence unknown ({}/{max_attempts}): {e}", attempt + 1);
                }
            }
            if attempt + 1 < max_attempts && !cancel.sleep(patience.delay_for_attempt(attempt)) {
                return Err(Self::cancelled(identity, Step::Create));
            }
        }

        if cancel.is_cancelled() {
            return Err(Self::cancelled(identity, Step::Create));
        }
        log::warn!("{identity} not visible after {max_attempts} checks");
        Err(Error::CreateNotConfirmed {
            kind: identity.kind,
            id: identity.id.clone(),
            attempts: max_attempts,
        })
    }
}
