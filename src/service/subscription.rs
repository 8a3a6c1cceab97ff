//! Live subscriptions
//!
//! A subscription forwards a remote change feed into the cache and then into
//! the caller's callbacks, one event at a time, in the order the store emits them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::OperationError;
use crate::models::{Collection, Document, Filter};

/// Data delivered to `on_change`.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionData {
    /// The watched document, `None` once it has been deleted
    Document(Option<Document>),
    /// The current result set of a watched query
    Documents(Vec<Document>),
}

pub type ChangeCallback = Arc<dyn Fn(SubscriptionData) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(OperationError) + Send + Sync>;

// == Subscription Config ==
/// What to watch and whom to tell.
#[derive(Clone)]
pub struct SubscriptionConfig {
    pub collection: Collection,
    pub document_id: Option<String>,
    pub filters: Vec<Filter>,
    pub(crate) on_change: ChangeCallback,
    pub(crate) on_error: Option<ErrorCallback>,
}

impl SubscriptionConfig {
    /// Watches a single document.
    pub fn document<F>(collection: Collection, id: impl Into<String>, on_change: F) -> Self
    where
        F: Fn(SubscriptionData) + Send + Sync + 'static,
    {
        Self {
            collection,
            document_id: Some(id.into()),
            filters: Vec::new(),
            on_change: Arc::new(on_change),
            on_error: None,
        }
    }

    /// Watches every document of `collection` matching `filters`.
    pub fn query<F>(collection: Collection, filters: Vec<Filter>, on_change: F) -> Self
    where
        F: Fn(SubscriptionData) + Send + Sync + 'static,
    {
        Self {
            collection,
            document_id: None,
            filters,
            on_change: Arc::new(on_change),
            on_error: None,
        }
    }

    /// Routes feed errors to `on_error`. Errors never end the subscription.
    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(OperationError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    pub(crate) fn label(&self) -> String {
        format!(
            "{}:{}",
            self.collection,
            self.document_id.as_deref().unwrap_or("query")
        )
    }
}

impl fmt::Debug for SubscriptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionConfig")
            .field("collection", &self.collection)
            .field("document_id", &self.document_id)
            .field("filters", &self.filters)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

// == Subscription Handle ==
#[derive(Debug)]
pub(crate) struct SubscriptionInner {
    label: String,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionInner {
    pub(crate) fn new(label: String) -> Arc<Self> {
        Arc::new(Self {
            label,
            closed: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    pub(crate) fn attach(&self, task: JoinHandle<()>) {
        if self.is_closed() {
            task.abort();
        } else {
            *self.task.lock() = Some(task);
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        debug!("Subscription {} closed", self.label);
    }
}

/// Handle to a live feed.
///
/// `unsubscribe` stops further callbacks and may be called any number of
/// times. Dropping the handle unsubscribes as well.
#[derive(Debug)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    pub(crate) fn new(inner: Arc<SubscriptionInner>) -> Self {
        Self { inner }
    }

    pub fn unsubscribe(&self) {
        self.inner.close();
    }

    pub fn is_active(&self) -> bool {
        !self.inner.is_closed()
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// Reports a feed error to the caller, if they asked for errors.
pub(crate) fn deliver_error(label: &str, on_error: &Option<ErrorCallback>, err: OperationError) {
    warn!("Subscription {} error: {}", label, err.message);
    if let Some(callback) = on_error {
        callback(err);
    }
}
