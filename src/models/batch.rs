//! Batch Operations
//!
//! Mixed create/update/delete lists committed atomically.

use serde::{Deserialize, Serialize};

use super::document::{Collection, Fields};
use super::update::Update;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BatchOperation {
    Create {
        collection: Collection,
        /// Generated when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        data: Fields,
    },
    Update {
        collection: Collection,
        id: String,
        data: Update,
    },
    Delete {
        collection: Collection,
        id: String,
    },
}

impl BatchOperation {
    pub fn collection(&self) -> Collection {
        match self {
            BatchOperation::Create { collection, .. }
            | BatchOperation::Update { collection, .. }
            | BatchOperation::Delete { collection, .. } => *collection,
        }
    }
}
