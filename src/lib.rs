//! reqstore - cached data layer for a requirements-engineering dashboard
//!
//! A bounded TTL cache in front of a remote document store, a data-access
//! façade with live subscriptions, the current project/requirement selection,
//! and a client for the AI analysis pipeline, served over a small HTTP API.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod remote;
pub mod service;

pub use api::{create_router, AppState};
pub use cache::{CacheConfig, CachePriority, TtlCache};
pub use config::Config;
pub use error::{DataError, OperationError, Result};
pub use remote::{DocumentStore, MemoryStore};
pub use service::{DataService, SelectionState};
