//! Registry of live recovery controllers
//!
//! Boundaries are named by path (`"app/settings/form"`); the parent of a
//! boundary is the path with its last segment removed. Once
//! [`RecoveryRegistry::teardown_all`] has run the registry is closed and
//! hands out only torn-down controllers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use errguard_core::domain::BoundaryId;

use crate::controller::{RecoveryController, RecoveryEvent, RecoveryState};
use crate::isolation::IsolationStore;
use crate::policy::RecoveryPolicy;

/// Owns one [`RecoveryController`] per live boundary
pub struct RecoveryRegistry {
    controllers: DashMap<BoundaryId, Arc<RecoveryController>>,
    policy: RecoveryPolicy,
    isolation: Option<IsolationStore>,
    events: Option<mpsc::UnboundedSender<RecoveryEvent>>,
    closed: AtomicBool,
}

impl RecoveryRegistry {
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self {
            controllers: DashMap::new(),
            policy,
            isolation: None,
            events: None,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_isolation(mut self, isolation: IsolationStore) -> Self {
        self.isolation = Some(isolation);
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<RecoveryEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    /// Returns the controller for `boundary`, creating it on first use
    ///
    /// After [`teardown_all`](Self::teardown_all) the returned controller is
    /// already torn down and is not registered.
    pub fn get_or_create(&self, boundary: &BoundaryId) -> Arc<RecoveryController> {
        if self.is_closed() {
            return self.detached(boundary);
        }
        let controller = self
            .controllers
            .entry(boundary.clone())
            .or_insert_with(|| {
                tracing::debug!(boundary = %boundary, "Creating recovery controller");
                self.new_controller(boundary)
            })
            .clone();
        // teardown_all may have drained this shard before the insert landed
        if self.is_closed() {
            self.remove(boundary);
        }
        controller
    }

    pub fn get(&self, boundary: &BoundaryId) -> Option<Arc<RecoveryController>> {
        self.controllers.get(boundary).map(|entry| entry.value().clone())
    }

    /// Tears down and forgets the controller of an unmounted boundary
    pub fn remove(&self, boundary: &BoundaryId) -> bool {
        match self.controllers.remove(boundary) {
            Some((_, controller)) => {
                controller.teardown();
                true
            }
            None => false,
        }
    }

    /// Tears down every controller and closes the registry
    pub fn teardown_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.controllers.retain(|_, controller| {
            controller.teardown();
            false
        });
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The nearest ancestor that should receive a fault caught by
    /// `boundary`, or `None` when the boundary is isolated or a root
    pub fn propagation_target(&self, boundary: &BoundaryId) -> Option<BoundaryId> {
        if let Some(controller) = self.get(boundary) {
            if controller.state().is_isolated {
                return None;
            }
        }
        let (parent, _) = boundary.as_str().rsplit_once('/')?;
        BoundaryId::new(parent).ok()
    }

    /// Snapshots of every live controller, sorted by boundary
    pub fn states(&self) -> Vec<RecoveryState> {
        let mut states: Vec<_> = self
            .controllers
            .iter()
            .map(|entry| entry.value().state())
            .collect();
        states.sort_by(|a, b| a.boundary.cmp(&b.boundary));
        states
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    fn new_controller(&self, boundary: &BoundaryId) -> Arc<RecoveryController> {
        RecoveryController::new(
            boundary.clone(),
            self.policy.clone(),
            self.isolation.clone(),
            self.events.clone(),
        )
    }

    fn detached(&self, boundary: &BoundaryId) -> Arc<RecoveryController> {
        let controller = self.new_controller(boundary);
        controller.teardown();
        controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecoveryError;
    use errguard_core::domain::{classify, FaultEvent};
    use errguard_core::ports::MemoryStateStore;

    fn id(name: &str) -> BoundaryId {
        BoundaryId::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_controller() {
        let registry = RecoveryRegistry::new(RecoveryPolicy::default());
        let a = registry.get_or_create(&id("app/form"));
        let b = registry.get_or_create(&id("app/form"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_tears_down() {
        let registry = RecoveryRegistry::new(RecoveryPolicy::default());
        let controller = registry.get_or_create(&id("app/form"));
        assert!(registry.remove(&id("app/form")));
        assert!(controller.is_torn_down());
        assert!(!registry.remove(&id("app/form")));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_propagation_stops_at_isolated_boundary() {
        let store = Arc::new(MemoryStateStore::new());
        let registry = RecoveryRegistry::new(RecoveryPolicy::default())
            .with_isolation(IsolationStore::new(store));
        let form = id("app/settings/form");

        assert_eq!(registry.propagation_target(&form), Some(id("app/settings")));
        assert_eq!(registry.propagation_target(&id("app")), None);

        let controller = registry.get_or_create(&form);
        let fault = FaultEvent::new("undefined is not a function");
        controller
            .on_fault(&fault, classify(fault.message(), None))
            .unwrap();
        controller.isolate().await.unwrap();
        assert_eq!(registry.propagation_target(&form), None);
    }

    #[tokio::test]
    async fn test_states_sorted() {
        let registry = RecoveryRegistry::new(RecoveryPolicy::default());
        registry.get_or_create(&id("b"));
        registry.get_or_create(&id("a"));
        let names: Vec<_> = registry
            .states()
            .into_iter()
            .map(|s| s.boundary.to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_closed_registry_arms_no_timers() {
        let registry = RecoveryRegistry::new(RecoveryPolicy::default());
        let before = registry.get_or_create(&id("app"));
        registry.teardown_all();
        assert!(registry.is_closed());
        assert!(registry.is_empty());
        assert!(before.is_torn_down());

        let after = registry.get_or_create(&id("app/feed"));
        assert!(after.is_torn_down());
        assert!(registry.is_empty());

        let fault = FaultEvent::new("Failed to fetch");
        let result = after.on_fault(&fault, classify(fault.message(), None));
        assert!(matches!(result, Err(RecoveryError::TornDown)));
    }
}
