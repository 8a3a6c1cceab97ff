//! Data-Access Façade
//!
//! `DataService` is the single entry point for document operations. It wraps a
//! remote `DocumentStore` and consults the TTL cache around every call so
//! callers never reason about cache state.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Number, Value};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::cache::{CacheConfig, CacheKey, CacheStats, TtlCache};
use crate::error::{DataError, OperationError, Result, ValidationError};
use crate::models::{
    from_document, is_reserved, record_fields, BatchOperation, Collection, Document, FieldOp,
    FieldOperation, Fields, Filter, Page, Pagination, Patch, Query, Record, Update,
};
use crate::remote::{ChangeEvent, DocumentStore, RemoteError, WatchTarget, Write};
use crate::service::subscription::{
    deliver_error, Subscription, SubscriptionConfig, SubscriptionData, SubscriptionInner,
};
use crate::service::validation::ValidationSchema;

/// Creator/updater stamped when no user is signed in.
pub const ANONYMOUS_USER: &str = "anonymous";

// == Cached Value ==
/// What the façade keeps in the cache: single documents and query pages.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Document(Document),
    Page(Page),
}

impl CachedValue {
    pub fn is_page(&self) -> bool {
        matches!(self, CachedValue::Page(_))
    }
}

#[derive(Debug, Default)]
struct ServiceState {
    initialized: bool,
    user_id: Option<String>,
    last_error: Option<OperationError>,
}

// == Data Service ==
pub struct DataService {
    store: Arc<dyn DocumentStore>,
    cache: Arc<Mutex<TtlCache<CachedValue>>>,
    state: RwLock<ServiceState>,
    schemas: RwLock<HashMap<Collection, ValidationSchema>>,
    subscriptions: Mutex<Vec<Weak<SubscriptionInner>>>,
}

impl DataService {
    // == Lifecycle ==
    /// Creates an uninitialized service. Call `init()` before use.
    pub fn new(store: Arc<dyn DocumentStore>, config: CacheConfig) -> Self {
        Self {
            store,
            cache: Arc::new(Mutex::new(TtlCache::new(config))),
            state: RwLock::new(ServiceState::default()),
            schemas: RwLock::new(HashMap::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn init(&self) {
        let config = *self.cache.lock().config();
        self.state.write().initialized = true;
        info!(
            "Data service initialized: ttl={}ms, max_entries={}, priority={}",
            config.ttl_ms, config.max_entries, config.priority
        );
    }

    /// Tears down every live subscription and empties the cache.
    pub fn dispose(&self) {
        let subscriptions: Vec<_> = self.subscriptions.lock().drain(..).collect();
        let mut closed = 0;
        for inner in subscriptions.iter().filter_map(Weak::upgrade) {
            inner.close();
            closed += 1;
        }
        self.cache.lock().clear();
        self.state.write().initialized = false;
        info!("Data service disposed ({} subscriptions closed)", closed);
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// Sets the uid stamped as creator/updater of subsequent writes.
    pub fn set_user(&self, user_id: Option<String>) {
        self.state.write().user_id = user_id;
    }

    pub fn user_id(&self) -> String {
        self.state
            .read()
            .user_id
            .clone()
            .unwrap_or_else(|| ANONYMOUS_USER.to_string())
    }

    // == Error State ==
    /// Latest recorded failure, kept until dismissed.
    pub fn last_error(&self) -> Option<OperationError> {
        self.state.read().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.state.write().last_error = None;
    }

    /// Records `err` for display and hands it back.
    pub fn record_failure(&self, operation: &str, err: DataError) -> DataError {
        if let Some(record) = err.to_operation_error(operation) {
            error!("Data operation failed: {}: {}", operation, record.message);
            self.state.write().last_error = Some(record);
        }
        err
    }

    // == Validation ==
    pub fn set_validation_schema(&self, collection: Collection, schema: ValidationSchema) {
        self.schemas.write().insert(collection, schema);
    }

    // == Cache Pass-Throughs ==
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    pub fn cache_config(&self) -> CacheConfig {
        *self.cache.lock().config()
    }

    /// Drops one cached document, or everything cached for `collection`.
    pub fn invalidate(&self, collection: Collection, id: Option<&str>) -> usize {
        let key = id.map(|id| CacheKey::document(collection, id));
        self.cache.lock().invalidate(collection, key.as_ref())
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Cache-only lookup; never touches the store.
    pub fn cached_document(&self, collection: Collection, id: &str) -> Option<Document> {
        match self.cache.lock().get(&CacheKey::document(collection, id)) {
            Some(CachedValue::Document(doc)) => Some(doc),
            _ => None,
        }
    }

    // == Create ==
    /// Persists a new document with a generated id and returns it.
    pub async fn create(&self, collection: Collection, fields: Fields) -> Result<Document> {
        self.ensure_ready()?;
        if fields.is_empty() {
            return Err(self.record_failure(
                "create",
                OperationError::invalid("create", "Cannot create an empty document")
                    .with_details(json!({ "collection": collection }))
                    .into(),
            ));
        }
        self.check_writable("create", fields.keys())?;
        self.validate("create", collection, &fields, false)?;

        let document = Document::new(Uuid::new_v4().to_string(), self.user_id(), fields);
        self.store
            .put(collection, document.clone())
            .await
            .map_err(|e| self.remote_failure("create", e, json!({ "collection": collection })))?;

        self.cache_document(collection, &document);
        debug!("Created {}/{}", collection, document.id);
        Ok(document)
    }

    /// Creates a typed record; stamped metadata on the input is ignored.
    pub async fn create_record<T: Record>(&self, record: &T) -> Result<T> {
        let fields = record_fields(record).map_err(|e| {
            self.record_failure("create", OperationError::invalid("create", e.to_string()).into())
        })?;
        let document = self.create(T::COLLECTION, fields).await?;
        self.to_record("create", document)
    }

    // == Get ==
    /// Cache first, then the store. `None` when the document does not exist.
    pub async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
        self.ensure_ready()?;
        if let Some(document) = self.cached_document(collection, id) {
            return Ok(Some(document));
        }

        let fetched = self.store.fetch(collection, id).await.map_err(|e| {
            self.remote_failure("get", e, json!({ "collection": collection, "id": id }))
        })?;

        if let Some(document) = &fetched {
            self.cache
                .lock()
                .set(CacheKey::document(collection, id), CachedValue::Document(document.clone()));
        }
        Ok(fetched)
    }

    pub async fn get_record<T: Record>(&self, id: &str) -> Result<Option<T>> {
        match self.get(T::COLLECTION, id).await? {
            Some(document) => self.to_record("get", document).map(Some),
            None => Ok(None),
        }
    }

    // == Query ==
    /// Runs an AND-combined filter list, optionally ordered and paginated.
    ///
    /// Results are cached under the serialized filters and pagination.
    pub async fn query(
        &self,
        collection: Collection,
        filters: Vec<Filter>,
        pagination: Option<Pagination>,
    ) -> Result<Page> {
        self.ensure_ready()?;
        let query = Query { filters, pagination };
        let key = CacheKey::query(collection, &query);

        let cached = self.cache.lock().get(&key);
        if let Some(CachedValue::Page(page)) = cached {
            return Ok(page);
        }

        let items = self.store.run_query(collection, &query).await.map_err(|e| {
            self.remote_failure("query", e, json!({ "collection": collection, "query": query }))
        })?;

        let page = Page::from_items(items, query.limit());
        self.cache.lock().set(key, CachedValue::Page(page.clone()));
        Ok(page)
    }

    /// Queries and caches every returned document individually.
    ///
    /// Returns the number of documents cached.
    pub async fn prefetch(&self, collection: Collection, filters: Vec<Filter>) -> Result<usize> {
        let page = self.query(collection, filters, None).await?;
        let mut cache = self.cache.lock();
        for document in &page.items {
            cache.set(
                CacheKey::document(collection, &document.id),
                CachedValue::Document(document.clone()),
            );
        }
        Ok(page.items.len())
    }

    // == Update ==
    /// Applies a merge or an ordered list of field operations and returns the
    /// refreshed document.
    pub async fn update(&self, collection: Collection, id: &str, update: Update) -> Result<Document> {
        self.ensure_ready()?;
        if update.is_empty() {
            return Err(self.record_failure(
                "update",
                OperationError::invalid("update", "Update contains no changes").into(),
            ));
        }

        let operations = update.into_operations();
        for operation in &operations {
            operation.validate().map_err(|msg| {
                self.record_failure("update", OperationError::invalid("update", msg).into())
            })?;
        }
        self.validate("update", collection, &assigned_fields(&operations), true)?;

        let key = CacheKey::document(collection, id);
        self.cache.lock().invalidate(collection, Some(&key));

        let patch = Patch::new(operations, self.user_id());
        let details = json!({ "collection": collection, "id": id });
        self.store
            .apply_patch(collection, id, &patch)
            .await
            .map_err(|e| self.remote_failure("update", e, details.clone()))?;

        let refreshed = self
            .store
            .fetch(collection, id)
            .await
            .map_err(|e| self.remote_failure("update", e, details.clone()))?
            .ok_or_else(|| {
                self.record_failure(
                    "update",
                    OperationError::not_found("update", collection, id).into(),
                )
            })?;

        self.cache_document(collection, &refreshed);
        debug!("Updated {}/{}", collection, id);
        Ok(refreshed)
    }

    /// Applies a single atomic field operation.
    pub async fn atomic_update(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        op: FieldOp,
        value: Value,
    ) -> Result<Document> {
        let operation = FieldOperation {
            field: field.to_string(),
            op,
            value,
        };
        self.update(collection, id, Update::Operations(vec![operation]))
            .await
    }

    pub async fn increment_field(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        by: impl Into<Number>,
    ) -> Result<Document> {
        self.atomic_update(collection, id, field, FieldOp::Increment, Value::Number(by.into()))
            .await
    }

    pub async fn append_to_array(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        elements: Value,
    ) -> Result<Document> {
        self.atomic_update(collection, id, field, FieldOp::Append, elements)
            .await
    }

    pub async fn remove_from_array(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        elements: Value,
    ) -> Result<Document> {
        self.atomic_update(collection, id, field, FieldOp::Remove, elements)
            .await
    }

    // == Remove ==
    /// Deletes a document. Deleting a missing document succeeds.
    pub async fn remove(&self, collection: Collection, id: &str) -> Result<()> {
        self.ensure_ready()?;
        self.store.delete(collection, id).await.map_err(|e| {
            self.remote_failure("delete", e, json!({ "collection": collection, "id": id }))
        })?;
        self.forget(collection, id);
        debug!("Deleted {}/{}", collection, id);
        Ok(())
    }

    // == Batch ==
    /// Commits a mixed create/update/delete list atomically.
    ///
    /// Returns the number of operations applied.
    pub async fn execute_batch(&self, operations: Vec<BatchOperation>) -> Result<usize> {
        self.ensure_ready()?;
        let user = self.user_id();
        let mut writes = Vec::with_capacity(operations.len());

        for operation in operations {
            let write = match operation {
                BatchOperation::Create { collection, id, data } => {
                    self.check_writable("batch", data.keys())?;
                    self.validate("batch", collection, &data, false)?;
                    let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
                    Write::Put {
                        collection,
                        document: Document::new(id, user.clone(), data),
                    }
                }
                BatchOperation::Update { collection, id, data } => {
                    let ops = data.into_operations();
                    for op in &ops {
                        op.validate().map_err(|msg| {
                            self.record_failure("batch", OperationError::invalid("batch", msg).into())
                        })?;
                    }
                    self.validate("batch", collection, &assigned_fields(&ops), true)?;
                    Write::Patch {
                        collection,
                        id,
                        patch: Patch::new(ops, user.clone()),
                    }
                }
                BatchOperation::Delete { collection, id } => Write::Delete { collection, id },
            };
            writes.push(write);
        }

        if writes.is_empty() {
            return Ok(0);
        }

        let touched: Vec<(Collection, String)> = writes
            .iter()
            .map(|w| (w.collection(), w.document_id().to_string()))
            .collect();
        let count = writes.len();

        self.store
            .commit(writes)
            .await
            .map_err(|e| self.remote_failure("batch", e, json!({ "operations": count })))?;

        for (collection, id) in &touched {
            self.forget(*collection, id);
        }
        debug!("Committed batch of {} operations", count);
        Ok(count)
    }

    // == Subscribe ==
    /// Opens a live feed. Each event updates the cache before `on_change` runs.
    pub async fn subscribe(&self, config: SubscriptionConfig) -> Result<Subscription> {
        self.ensure_ready()?;
        let collection = config.collection;
        let (target, key) = match &config.document_id {
            Some(id) => (
                WatchTarget::Document(id.clone()),
                CacheKey::document(collection, id),
            ),
            None => (
                WatchTarget::Query(config.filters.clone()),
                CacheKey::query(collection, &Query::new(config.filters.clone())),
            ),
        };

        let mut feed = self.store.watch(collection, target).await.map_err(|e| {
            self.remote_failure(
                "subscribe",
                e,
                json!({ "collection": collection, "document": config.document_id }),
            )
        })?;

        let label = config.label();
        let inner = SubscriptionInner::new(label.clone());
        let task_inner = Arc::clone(&inner);
        let cache = Arc::clone(&self.cache);
        let SubscriptionConfig {
            on_change, on_error, ..
        } = config;

        let task = tokio::spawn(async move {
            while let Some(event) = feed.recv().await {
                if task_inner.is_closed() {
                    break;
                }
                match event {
                    Ok(ChangeEvent::Document(document)) => {
                        {
                            let mut cache = cache.lock();
                            match &document {
                                Some(doc) => cache.set(key.clone(), CachedValue::Document(doc.clone())),
                                None => {
                                    cache.invalidate(collection, Some(&key));
                                }
                            }
                        }
                        on_change(SubscriptionData::Document(document));
                    }
                    Ok(ChangeEvent::Query(items)) => {
                        cache
                            .lock()
                            .set(key.clone(), CachedValue::Page(Page::from_items(items.clone(), None)));
                        on_change(SubscriptionData::Documents(items));
                    }
                    Err(err) => deliver_error(
                        &label,
                        &on_error,
                        OperationError::from_remote("subscribe", &err),
                    ),
                }
            }
            debug!("Feed for {} ended", label);
        });
        inner.attach(task);

        let mut registry = self.subscriptions.lock();
        registry.retain(|weak| weak.strong_count() > 0);
        registry.push(Arc::downgrade(&inner));

        Ok(Subscription::new(inner))
    }

    // == Helpers ==
    fn ensure_ready(&self) -> Result<()> {
        if self.state.read().initialized {
            Ok(())
        } else {
            Err(DataError::NotInitialized)
        }
    }

    fn remote_failure(&self, operation: &str, err: RemoteError, details: Value) -> DataError {
        self.record_failure(
            operation,
            OperationError::from_remote(operation, &err)
                .with_details(details)
                .into(),
        )
    }

    fn check_writable<'a>(
        &self,
        operation: &str,
        mut fields: impl Iterator<Item = &'a String>,
    ) -> Result<()> {
        match fields.find(|field| is_reserved(field)) {
            Some(field) => Err(self.record_failure(
                operation,
                OperationError::invalid(
                    operation,
                    format!("Field '{}' is managed by the data layer", field),
                )
                .into(),
            )),
            None => Ok(()),
        }
    }

    fn validate(&self, operation: &str, collection: Collection, fields: &Fields, partial: bool) -> Result<()> {
        let messages = match self.schemas.read().get(&collection) {
            Some(schema) if partial => schema.check_present(fields),
            Some(schema) => schema.check(fields),
            None => return Ok(()),
        };
        if messages.is_empty() {
            return Ok(());
        }
        Err(self.record_failure(
            operation,
            ValidationError { collection, messages }.into(),
        ))
    }

    fn to_record<T: Record>(&self, operation: &str, document: Document) -> Result<T> {
        let id = document.id.clone();
        from_document(document).map_err(|e| {
            self.record_failure(
                operation,
                OperationError::invalid(
                    operation,
                    format!("{}/{} is not a valid record: {}", T::COLLECTION, id, e),
                )
                .into(),
            )
        })
    }

    /// Caches a written document and drops the collection's cached query pages.
    fn cache_document(&self, collection: Collection, document: &Document) {
        let mut cache = self.cache.lock();
        cache.set(
            CacheKey::document(collection, &document.id),
            CachedValue::Document(document.clone()),
        );
        cache.invalidate_if(collection, CachedValue::is_page);
    }

    /// Drops a document and the collection's cached query pages.
    fn forget(&self, collection: Collection, id: &str) {
        let mut cache = self.cache.lock();
        cache.invalidate(collection, Some(&CacheKey::document(collection, id)));
        cache.invalidate_if(collection, CachedValue::is_page);
    }
}

/// Fields an operation list overwrites outright, for schema checks.
fn assigned_fields(operations: &[FieldOperation]) -> Fields {
    operations
        .iter()
        .filter(|op| op.op == FieldOp::Set)
        .map(|op| (op.field.clone(), op.value.clone()))
        .collect()
}
