//! Resolution of a project ID to the full `(organization, project)` scope.

use crate::client::Client;
use crate::error::{Error, Result};
use crate::types::Location;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Resolves project IDs to [`Location`]s, memoizing per pass.
///
/// Shared across the executor's worker threads; the memo is the only
/// mutable state and lives behind a read-write lock.
pub struct LocationResolver<'a> {
    client: &'a Client,
    memo: RwLock<HashMap<String, String>>,
}

impl<'a> LocationResolver<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self {
            client,
            memo: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a project's location, asking the API for its organization.
    pub fn resolve(&self, project_id: &str) -> Result<Location> {
        self.resolve_with(project_id, None)
    }

    /// Resolve a project's location, trusting `organization_id` when given.
    pub fn resolve_with(&self, project_id: &str, organization_id: Option<&str>) -> Result<Location> {
        let lookup = |reason: String| Error::Lookup {
            project_id: project_id.to_string(),
            reason,
        };

        if project_id.trim().is_empty() {
            return Err(lookup("project ID is empty".to_string()));
        }

        if let Some(org) = organization_id.filter(|o| !o.trim().is_empty()) {
            return Location::new(org, project_id).map_err(|e| lookup(e.to_string()));
        }

        let cached = self
            .memo
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project_id)
            .cloned();
        if let Some(org) = cached {
            log::debug!("location of project {project_id} is cached");
            return Location::new(org, project_id).map_err(|e| lookup(e.to_string()));
        }

        let project = self.client.get_project(project_id).map_err(|e| {
            if e.is_not_found() {
                lookup("project does not exist".to_string())
            } else {
                lookup(e.to_string())
            }
        })?;

        let location =
            Location::new(&project.parent_organization_id, project_id).map_err(|e| lookup(e.to_string()))?;
        self.remember(&location);
        Ok(location)
    }

    /// Record a known location, e.g. right after creating its project.
    pub fn remember(&self, location: &Location) {
        self.memo
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location.project_id().to_string(), location.organization_id().to_string());
    }

    pub fn forget(&self, project_id: &str) {
        self.memo
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(project_id);
    }

    pub fn clear(&self) {
        self.memo.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::backend::memory::MemoryBackend;
    use crate::error::{ErrorCategory, Step};
    use crate::retry::RetryConfig;
    use crate::types::ResourceKind;
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryBackend>, Client, String) {
        let backend = Arc::new(MemoryBackend::new());
        let project = backend.seed_project("org-1", "demo");
        let client = Client::with_backend(backend.clone()).with_retry(RetryConfig::no_retry());
        (backend, client, project.id)
    }

    #[test]
    fn test_resolve_is_memoized() {
        let (backend, client, project_id) = setup();
        let resolver = LocationResolver::new(&client);

        let first = resolver.resolve(&project_id).unwrap();
        let second = resolver.resolve(&project_id).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.organization_id(), "org-1");
        assert_eq!(backend.count(ResourceKind::Project, Step::Get), 1);
    }

    #[test]
    fn test_hint_skips_lookup() {
        let (backend, client, _) = setup();
        let resolver = LocationResolver::new(&client);

        let location = resolver.resolve_with("prj-anything", Some("org-2")).unwrap();
        assert_eq!(location.organization_id(), "org-2");
        assert_eq!(backend.count(ResourceKind::Project, Step::Get), 0);
    }

    #[test]
    fn test_missing_project_is_lookup_error() {
        let (_, client, _) = setup();
        let resolver = LocationResolver::new(&client);

        let err = resolver.resolve("prj-9999").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Lookup);
        assert!(err.to_string().contains("prj-9999"));
    }

    #[test]
    fn test_transport_failure_is_lookup_error() {
        let (backend, client, project_id) = setup();
        backend.fail_next(ResourceKind::Project, Step::Get, BackendError::transport("reset"));
        let resolver = LocationResolver::new(&client);

        let err = resolver.resolve(&project_id).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Lookup);

        // Failures are not memoized.
        assert!(resolver.resolve(&project_id).is_ok());
    }

    #[test]
    fn test_forget_drops_memo() {
        let (backend, client, project_id) = setup();
        let resolver = LocationResolver::new(&client);

        resolver.resolve(&project_id).unwrap();
        resolver.forget(&project_id);
        resolver.resolve(&project_id).unwrap();
        resolver.clear();
        resolver.resolve(&project_id).unwrap();

        assert_eq!(backend.count(ResourceKind::Project, Step::Get), 3);
    }
}
