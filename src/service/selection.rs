//! Selection State
//!
//! Tracks the project and requirement the user currently has open. Each slot
//! holds the resolved record and a live subscription that keeps it fresh.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{DataError, OperationError, Result};
use crate::models::{from_document, Project, Record, Requirement};
use crate::service::facade::DataService;
use crate::service::subscription::{Subscription, SubscriptionConfig, SubscriptionData};

#[derive(Debug)]
struct Current<T> {
    id: Option<String>,
    record: Option<T>,
}

impl<T> Default for Current<T> {
    fn default() -> Self {
        Self {
            id: None,
            record: None,
        }
    }
}

// == Slot ==
/// One selectable record. At most one subscription is open per slot.
#[derive(Debug)]
struct Slot<T> {
    current: Arc<RwLock<Current<T>>>,
    subscription: Mutex<Option<Subscription>>,
    /// Bumped on every selection change; late results of older selections are dropped.
    generation: Arc<AtomicU64>,
    operation: &'static str,
}

impl<T: Record> Slot<T> {
    fn new(operation: &'static str) -> Self {
        Self {
            current: Arc::new(RwLock::new(Current::default())),
            subscription: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
            operation,
        }
    }

    fn id(&self) -> Option<String> {
        self.current.read().id.clone()
    }

    fn record(&self) -> Option<T> {
        self.current.read().record.clone()
    }

    fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.subscription.lock().take();
        *self.current.write() = Current::default();
    }

    async fn select(&self, service: &DataService, id: Option<&str>) -> Result<Option<T>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        // Previous feed goes away before anything else happens
        self.subscription.lock().take();

        let Some(id) = id else {
            *self.current.write() = Current::default();
            debug!("{}: selection cleared", self.operation);
            return Ok(None);
        };

        let (record, subscription) = match self.resolve(service, id, generation).await {
            Ok(resolved) => resolved,
            Err(err) => {
                // A slot never keeps a selection whose feed is gone
                if self.generation.load(Ordering::SeqCst) == generation {
                    *self.current.write() = Current::default();
                }
                return Err(err);
            }
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("{}: {} superseded before it resolved", self.operation, id);
            return Ok(Some(record));
        }
        *self.current.write() = Current {
            id: Some(id.to_string()),
            record: Some(record.clone()),
        };
        *self.subscription.lock() = Some(subscription);
        debug!("{}: selected {}", self.operation, id);
        Ok(Some(record))
    }

    /// Reads the record and opens the feed that keeps it fresh.
    async fn resolve(
        &self,
        service: &DataService,
        id: &str,
        generation: u64,
    ) -> Result<(T, Subscription)> {
        let document = match service.get(T::COLLECTION, id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                return Err(service.record_failure(
                    self.operation,
                    OperationError::not_found(self.operation, T::COLLECTION, id).into(),
                ))
            }
            Err(err) => return Err(service.record_failure(self.operation, rename(err, self.operation))),
        };
        let record: T = from_document(document).map_err(|e| {
            service.record_failure(
                self.operation,
                OperationError::invalid(self.operation, e.to_string()).into(),
            )
        })?;

        let current = Arc::clone(&self.current);
        let generations = Arc::clone(&self.generation);
        let config = SubscriptionConfig::document(T::COLLECTION, id, move |data| {
            if generations.load(Ordering::SeqCst) != generation {
                return;
            }
            if let SubscriptionData::Document(document) = data {
                let fresh = document.and_then(|doc| from_document::<T>(doc).ok());
                current.write().record = fresh;
            }
        });
        let subscription = service
            .subscribe(config)
            .await
            .map_err(|err| service.record_failure(self.operation, rename(err, self.operation)))?;
        Ok((record, subscription))
    }
}

/// Reports a failure under the selection operation's own name.
fn rename(err: DataError, operation: &str) -> DataError {
    match err {
        DataError::Operation(inner) => DataError::Operation(OperationError {
            operation: operation.to_string(),
            ..inner
        }),
        other => other,
    }
}

// == Selection State ==
pub struct SelectionState {
    service: Arc<DataService>,
    project: Slot<Project>,
    requirement: Slot<Requirement>,
}

impl SelectionState {
    pub fn new(service: Arc<DataService>) -> Self {
        Self {
            service,
            project: Slot::new("setCurrentProject"),
            requirement: Slot::new("setCurrentRequirement"),
        }
    }

    /// Selects a project (or clears the selection with `None`).
    pub async fn set_current_project(&self, id: Option<&str>) -> Result<Option<Project>> {
        self.project.select(&self.service, id).await
    }

    /// Selects a requirement (or clears the selection with `None`).
    pub async fn set_current_requirement(&self, id: Option<&str>) -> Result<Option<Requirement>> {
        self.requirement.select(&self.service, id).await
    }

    pub fn current_project(&self) -> Option<Project> {
        self.project.record()
    }

    pub fn current_project_id(&self) -> Option<String> {
        self.project.id()
    }

    pub fn current_requirement(&self) -> Option<Requirement> {
        self.requirement.record()
    }

    pub fn current_requirement_id(&self) -> Option<String> {
        self.requirement.id()
    }

    /// Drops both selections and their subscriptions.
    pub fn clear(&self) {
        self.project.reset();
        self.requirement.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::error::FailureKind;
    use crate::models::{Collection, Document, Fields};
    use crate::remote::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn setup() -> (Arc<MemoryStore>, SelectionState) {
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(DataService::new(store.clone(), CacheConfig::default()));
        service.init();
        (store, SelectionState::new(service))
    }

    fn project(id: &str, title: &str) -> Document {
        let mut fields = Fields::new();
        fields.insert("title".to_string(), json!(title));
        Document::new(id, "seed", fields)
    }

    #[tokio::test]
    async fn test_select_and_clear_project() {
        let (store, selection) = setup();
        store.seed(Collection::Projects, [project("p1", "Braking")]);

        let selected = tokio_test::assert_ok!(selection.set_current_project(Some("p1")).await).unwrap();
        assert_eq!(selected.title, "Braking");
        assert_eq!(selection.current_project_id().as_deref(), Some("p1"));
        assert_eq!(selection.current_project().unwrap().meta.id, "p1");

        selection.set_current_project(None).await.unwrap();
        assert!(selection.current_project().is_none());
        assert!(selection.current_project_id().is_none());
    }

    #[tokio::test]
    async fn test_selection_follows_remote_changes() {
        let (store, selection) = setup();
        store.seed(Collection::Projects, [project("p1", "Braking")]);
        selection.set_current_project(Some("p1")).await.unwrap();

        store.seed(Collection::Projects, [project("p1", "Steering")]);

        let mut title = String::new();
        for _ in 0..50 {
            title = selection.current_project().map(|p| p.title).unwrap_or_default();
            if title == "Steering" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(title, "Steering");
    }

    #[tokio::test]
    async fn test_switching_closes_previous_feed() {
        let (store, selection) = setup();
        store.seed(Collection::Projects, [project("p1", "A"), project("p2", "B")]);

        selection.set_current_project(Some("p1")).await.unwrap();
        selection.set_current_project(Some("p2")).await.unwrap();

        // Only the p2 feed may still update the slot
        store.seed(Collection::Projects, [project("p1", "A2")]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(selection.current_project().unwrap().title, "B");
    }

    #[tokio::test]
    async fn test_failed_switch_clears_slot() {
        let (store, selection) = setup();
        store.seed(Collection::Projects, [project("p1", "Braking")]);
        selection.set_current_project(Some("p1")).await.unwrap();
        assert_eq!(store.live_feeds(), 1);

        selection.set_current_project(Some("ghost")).await.unwrap_err();
        assert!(selection.current_project_id().is_none());
        assert!(selection.current_project().is_none());

        store.seed(Collection::Projects, [project("p1", "Steering")]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(selection.current_project().is_none());
        assert_eq!(store.live_feeds(), 0);
    }

    #[tokio::test]
    async fn test_missing_requirement_is_recorded() {
        let (_store, selection) = setup();
        let err = selection
            .set_current_requirement(Some("ghost"))
            .await
            .unwrap_err();

        match err {
            DataError::Operation(op) => {
                assert_eq!(op.operation, "setCurrentRequirement");
                assert_eq!(op.kind, FailureKind::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            selection.service.last_error().unwrap().operation,
            "setCurrentRequirement"
        );
    }

    #[tokio::test]
    async fn test_remote_failure_uses_selection_name() {
        let (store, selection) = setup();
        store.set_unavailable(true);

        selection.set_current_project(Some("p1")).await.unwrap_err();
        assert_eq!(
            selection.service.last_error().unwrap().operation,
            "setCurrentProject"
        );
    }

    #[tokio::test]
    async fn test_clear_resets_both_slots() {
        let (store, selection) = setup();
        store.seed(Collection::Projects, [project("p1", "A")]);
        let mut fields = Fields::new();
        fields.insert("title".to_string(), json!("R"));
        store.seed(Collection::Requirements, [Document::new("r1", "seed", fields)]);

        selection.set_current_project(Some("p1")).await.unwrap();
        selection.set_current_requirement(Some("r1")).await.unwrap();
        selection.clear();

        assert!(selection.current_project().is_none());
        assert!(selection.current_requirement_id().is_none());
    }
}
