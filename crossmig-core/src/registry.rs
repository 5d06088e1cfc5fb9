//! Thread-safe migration registry using DashMap.
//!
//! Tracks at most one migration attempt per container identity. Terminal
//! results stay tracked for status queries and are replaced when a new
//! attempt for the same container begins. The registry does not serialize
//! concurrent `migrate_container` calls for the same identity; that contract
//! belongs to the caller.

use dashmap::DashMap;

use crate::error::{MigrateError, ValidationError};
use crate::state::MigrationResult;
use crate::types::ContainerId;

/// Entry in the migration registry.
#[derive(Debug)]
struct TrackedMigration {
    result: MigrationResult,
    /// Cooperative cancellation flag, checked between pipeline stages.
    cancel_requested: bool,
}

/// Registry of migration attempts keyed by container identity.
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    migrations: DashMap<ContainerId, TrackedMigration>,
}

impl MigrationRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            migrations: DashMap::new(),
        }
    }

    /// Begin tracking a new attempt for a container.
    ///
    /// Refused while a non-terminal attempt for the same identity is
    /// tracked; a terminal record is replaced.
    pub fn begin(&self, id: &ContainerId) -> Result<(), MigrateError> {
        if let Some(entry) = self.migrations.get(id) {
            if !entry.result.status.is_terminal() {
                return Err(ValidationError::MigrationInProgress(id.clone()).into());
            }
        }

        self.migrations.insert(
            id.clone(),
            TrackedMigration {
                result: MigrationResult::new(id.clone()),
                cancel_requested: false,
            },
        );
        Ok(())
    }

    /// Publish the current result snapshot for its container.
    pub fn update(&self, result: &MigrationResult) {
        if let Some(mut entry) = self.migrations.get_mut(&result.container_id) {
            entry.result = result.clone();
        }
    }

    /// Get the tracked result for a container.
    pub fn get(&self, id: &ContainerId) -> Option<MigrationResult> {
        self.migrations.get(id).map(|entry| entry.result.clone())
    }

    /// All tracked attempts that have not reached a terminal state.
    pub fn active(&self) -> Vec<MigrationResult> {
        self.migrations
            .iter()
            .filter(|entry| !entry.result.status.is_terminal())
            .map(|entry| entry.result.clone())
            .collect()
    }

    /// Request cooperative cancellation of an in-flight attempt.
    /// Returns false when nothing cancellable is tracked.
    pub fn request_cancel(&self, id: &ContainerId) -> bool {
        match self.migrations.get_mut(id) {
            Some(mut entry) if !entry.result.status.is_terminal() => {
                entry.cancel_requested = true;
                tracing::info!(container_id = %id, "Migration cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// True when cancellation has been requested for a container.
    pub fn cancel_requested(&self, id: &ContainerId) -> bool {
        self.migrations
            .get(id)
            .map(|entry| entry.cancel_requested)
            .unwrap_or(false)
    }

    /// Get the number of tracked migrations.
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MigrationStatus;

    fn id(name: &str) -> ContainerId {
        ContainerId::new(name).unwrap()
    }

    #[test]
    fn test_begin_and_get() {
        let registry = MigrationRegistry::new();
        registry.begin(&id("web1")).unwrap();

        let result = registry.get(&id("web1")).unwrap();
        assert_eq!(result.status, MigrationStatus::Pending);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_begin_refused_while_in_flight() {
        let registry = MigrationRegistry::new();
        registry.begin(&id("web1")).unwrap();

        let err = registry.begin(&id("web1")).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::Validation(ValidationError::MigrationInProgress(_))
        ));
    }

    #[test]
    fn test_terminal_record_is_replaced() {
        let registry = MigrationRegistry::new();
        registry.begin(&id("web1")).unwrap();

        let mut result = registry.get(&id("web1")).unwrap();
        result.transition_to(MigrationStatus::InProgress).unwrap();
        result.transition_to(MigrationStatus::Failed).unwrap();
        registry.update(&result);

        registry.begin(&id("web1")).unwrap();
        let fresh = registry.get(&id("web1")).unwrap();
        assert_eq!(fresh.status, MigrationStatus::Pending);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_active_excludes_terminal() {
        let registry = MigrationRegistry::new();
        registry.begin(&id("web1")).unwrap();
        registry.begin(&id("web2")).unwrap();

        let mut done = registry.get(&id("web2")).unwrap();
        done.transition_to(MigrationStatus::InProgress).unwrap();
        done.transition_to(MigrationStatus::Failed).unwrap();
        registry.update(&done);

        let active = registry.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].container_id, id("web1"));

        // Terminal result remains queryable
        assert!(registry.get(&id("web2")).is_some());
    }

    #[test]
    fn test_cancel_flow() {
        let registry = MigrationRegistry::new();
        assert!(!registry.request_cancel(&id("ghost")));

        registry.begin(&id("web1")).unwrap();
        assert!(!registry.cancel_requested(&id("web1")));
        assert!(registry.request_cancel(&id("web1")));
        assert!(registry.cancel_requested(&id("web1")));
    }

    #[test]
    fn test_cancel_refused_for_terminal() {
        let registry = MigrationRegistry::new();
        registry.begin(&id("web1")).unwrap();

        let mut result = registry.get(&id("web1")).unwrap();
        result.transition_to(MigrationStatus::InProgress).unwrap();
        result.transition_to(MigrationStatus::Failed).unwrap();
        registry.update(&result);

        assert!(!registry.request_cancel(&id("web1")));
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MigrationRegistry::new());

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let reg = Arc::clone(&registry);
                thread::spawn(move || {
                    reg.begin(&id(&format!("container-{}", i))).unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 10);
    }
}
