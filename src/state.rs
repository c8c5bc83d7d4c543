//! Recorded identities of the entities wpsync manages.
//!
//! The state file maps `<project>/<kind>/<name>` keys to the remote identity
//! created for them, so the next pass can find them again.

use crate::paths;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use waypointkit::{ApplyResult, PassReport, ResourceIdentity};

// ============================================================================
// State Structures
// ============================================================================

/// Main state structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SyncState {
    /// Recorded entities by resource key
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,

    /// Last time the state was updated
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// One recorded entity
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub identity: ResourceIdentity,

    /// When the identity was last confirmed
    pub recorded_at: DateTime<Utc>,
}

// ============================================================================
// SyncState Implementation
// ============================================================================

impl SyncState {
    /// Load state from the state dir, or return default if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::state_file()?)
    }

    /// Load state from `path`, or return default if the file doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded {} record(s) from {}", state.resources.len(), path.display());
        Ok(state)
    }

    /// Save state to the state dir
    pub fn save(&mut self) -> Result<()> {
        self.save_to(&paths::state_file()?)
    }

    /// Save state to `path`, stamping `last_updated`
    pub fn save_to(&mut self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        self.last_updated = Some(Utc::now());
        let content = serde_json::to_string_pretty(self).context("Failed to serialize state to JSON")?;

        fs::write(path, &content).with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Recorded identity for a key
    pub fn identity(&self, key: &str) -> Option<&ResourceIdentity> {
        self.resources.get(key).map(|r| &r.identity)
    }

    pub fn record(&mut self, key: &str, identity: ResourceIdentity) {
        self.resources.insert(
            key.to_string(),
            ResourceRecord {
                identity,
                recorded_at: Utc::now(),
            },
        );
    }

    pub fn forget(&mut self, key: &str) {
        self.resources.remove(key);
    }

    /// Fold a pass report into the state.
    ///
    /// Reconciled entities are recorded, destroyed ones removed. A failure
    /// keeps the old record unless the entity was created anyway.
    pub fn absorb(&mut self, report: &PassReport) {
        for resource in &report.resources {
            match &resource.result {
                ApplyResult::Reconciled { identity, .. } => self.record(&resource.key, identity.clone()),
                ApplyResult::Failed {
                    identity: Some(identity),
                    ..
                } => self.record(&resource.key, identity.clone()),
                ApplyResult::Destroyed { .. } => self.forget(&resource.key),
                ApplyResult::Planned { .. } | ApplyResult::Failed { .. } => {}
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
