//! Remote Document Store
//!
//! Capability interface of the hosted document database, and an in-memory
//! implementation with the same semantics.

mod filter;
mod memory;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{Collection, Document, Filter, Patch, Query};

pub use filter::{compare_values, matches_all, run_query};
pub use memory::{CallCounts, MemoryStore};

// == Remote Error ==
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// Update of a document that does not exist
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: Collection, id: String },

    /// The store refused to apply the write
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Transport or availability failure
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

// == Writes ==
/// One write of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create or overwrite
    Put { collection: Collection, document: Document },
    /// Apply operations to an existing document
    Patch { collection: Collection, id: String, patch: Patch },
    /// Delete if present
    Delete { collection: Collection, id: String },
}

impl Write {
    pub fn collection(&self) -> Collection {
        match self {
            Write::Put { collection, .. }
            | Write::Patch { collection, .. }
            | Write::Delete { collection, .. } => *collection,
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            Write::Put { document, .. } => &document.id,
            Write::Patch { id, .. } | Write::Delete { id, .. } => id,
        }
    }
}

// == Change Feeds ==
#[derive(Debug, Clone, PartialEq)]
pub enum WatchTarget {
    Document(String),
    Query(Vec<Filter>),
}

/// A snapshot pushed by a live feed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// Current state of a watched document, `None` once deleted
    Document(Option<Document>),
    /// Current result set of a watched query
    Query(Vec<Document>),
}

/// Receiving end of a live feed. Dropping it ends the feed.
pub type ChangeFeed = mpsc::UnboundedReceiver<Result<ChangeEvent>>;

// == Document Store Trait ==
/// Operations the hosted document database offers.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Creates or overwrites a document.
    async fn put(&self, collection: Collection, document: Document) -> Result<()>;

    /// Reads a document; `None` when it does not exist.
    async fn fetch(&self, collection: Collection, id: &str) -> Result<Option<Document>>;

    /// Runs a filtered, optionally ordered and paginated query.
    async fn run_query(&self, collection: Collection, query: &Query) -> Result<Vec<Document>>;

    /// Applies a patch; fails with `NotFound` if the document is missing.
    async fn apply_patch(&self, collection: Collection, id: &str, patch: &Patch) -> Result<()>;

    /// Deletes a document. Deleting a missing document succeeds.
    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;

    /// Applies every write or none of them.
    async fn commit(&self, writes: Vec<Write>) -> Result<()>;

    /// Opens a live feed. The current snapshot is delivered first.
    async fn watch(&self, collection: Collection, target: WatchTarget) -> Result<ChangeFeed>;
}
