//! Request DTOs for the HTTP API
//!
//! Defines the structure of incoming HTTP request bodies. Document bodies
//! (`POST /documents/:collection`, `PATCH /documents/:collection/:id`) are plain
//! field maps and `Update` values and need no wrapper.

use serde::Deserialize;

use super::batch::BatchOperation;
use super::query::{Filter, Pagination};
use crate::pipeline::AnalysisRequest;

/// Largest batch the remote store accepts in one commit.
pub const MAX_BATCH_OPERATIONS: usize = 500;

/// Request body for `POST /query/:collection`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    /// AND-combined filters
    pub filters: Vec<Filter>,
    /// Optional ordering, limit and cursor
    pub pagination: Option<Pagination>,
}

/// Request body for `POST /batch`
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub operations: Vec<BatchOperation>,
}

impl BatchRequest {
    /// Returns an error message if the batch cannot be committed as one unit.
    pub fn validate(&self) -> Option<String> {
        if self.operations.len() > MAX_BATCH_OPERATIONS {
            return Some(format!(
                "Batch exceeds maximum of {} operations",
                MAX_BATCH_OPERATIONS
            ));
        }
        None
    }
}

/// Request body for `PUT /selection/project` and `PUT /selection/requirement`
///
/// A missing or null `id` clears the selection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SelectRequest {
    pub id: Option<String>,
}

/// Request body for `POST /analysis`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisStartRequest {
    pub requirement: String,
    pub regulation_files: Vec<String>,
    pub system_name: Option<String>,
    pub objective: Option<String>,
    /// Requirement document that receives the result as an assistant message
    pub requirement_id: Option<String>,
}

impl AnalysisStartRequest {
    pub fn validate(&self) -> Option<String> {
        if self.requirement.trim().is_empty() {
            return Some("Requirement text cannot be empty".to_string());
        }
        None
    }

    pub fn to_analysis_request(&self) -> AnalysisRequest {
        AnalysisRequest {
            requirement: self.requirement.clone(),
            regulation_files: self.regulation_files.clone(),
            system_name: self.system_name.clone(),
            objective: self.objective.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Collection;

    #[test]
    fn test_query_request_defaults() {
        let req: QueryRequest = serde_json::from_str("{}").unwrap();
        assert!(req.filters.is_empty());
        assert!(req.pagination.is_none());
    }

    #[test]
    fn test_query_request_with_filters() {
        let json = r#"{
            "filters": [{"field": "status", "operator": "==", "value": "todo"}],
            "pagination": {"limit": 10}
        }"#;
        let req: QueryRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.filters.len(), 1);
        assert_eq!(req.pagination.unwrap().limit, 10);
    }

    #[test]
    fn test_batch_request_limit() {
        let op = BatchOperation::Delete {
            collection: Collection::Comments,
            id: "c1".to_string(),
        };
        let small = BatchRequest {
            operations: vec![op.clone()],
        };
        assert!(small.validate().is_none());

        let large = BatchRequest {
            operations: vec![op; MAX_BATCH_OPERATIONS + 1],
        };
        assert!(large.validate().is_some());
    }

    #[test]
    fn test_select_request_null_clears() {
        let req: SelectRequest = serde_json::from_str(r#"{"id": null}"#).unwrap();
        assert!(req.id.is_none());
        let req: SelectRequest = serde_json::from_str(r#"{"id": "p1"}"#).unwrap();
        assert_eq!(req.id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_analysis_request_validation() {
        let req: AnalysisStartRequest = serde_json::from_str(
            r#"{"requirement": "  ", "systemName": "Pump", "requirementId": "r1"}"#,
        )
        .unwrap();
        assert!(req.validate().is_some());
        assert_eq!(req.requirement_id.as_deref(), Some("r1"));
        assert_eq!(req.to_analysis_request().system_name.as_deref(), Some("Pump"));
    }
}
