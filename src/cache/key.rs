//! Cache Key Module

use std::fmt;

use crate::models::{Collection, Query};

// == Cache Key ==
/// Opaque cache key.
///
/// Point lookups use `collection:id`, list lookups use `collection:?<serialized query>`.
/// The collection is carried alongside the text so collection-wide invalidation
/// never has to parse the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    collection: Collection,
    raw: String,
}

impl CacheKey {
    /// Key for a single document.
    pub fn document(collection: Collection, id: &str) -> Self {
        Self {
            collection,
            raw: format!("{}:{}", collection, id),
        }
    }

    /// Key for a query result, derived from its serialized filters and pagination.
    pub fn query(collection: Collection, query: &Query) -> Self {
        let serialized =
            serde_json::to_string(query).unwrap_or_else(|_| format!("{:?}", query));
        Self {
            collection,
            raw: format!("{}:?{}", collection, serialized),
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
