//! Response DTOs for the HTTP API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use super::document::Collection;
use super::records::{Project, Requirement};
use crate::cache::{CacheConfig, CacheStats};
use crate::error::OperationError;
use crate::pipeline::{AnalysisState, AnalyzedRequirement};

/// Response body for `DELETE /documents/:collection/:id`
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub collection: Collection,
    pub id: String,
}

impl DeleteResponse {
    pub fn new(collection: Collection, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            message: format!("Document '{}/{}' deleted successfully", collection, id),
            collection,
            id,
        }
    }
}

/// Response body for `POST /batch`
#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    /// Number of operations committed
    pub applied: usize,
}

/// Response body for `GET /cache/stats`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    pub config: CacheConfig,
}

impl CacheStatsResponse {
    pub fn new(stats: CacheStats, config: CacheConfig) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            stats,
            config,
        }
    }
}

/// Response body for `DELETE /cache` and `DELETE /cache/:collection`
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// `None` when the whole cache was cleared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<Collection>,
    pub removed: usize,
}

/// Response body for the selection endpoints
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResponse {
    pub project_id: Option<String>,
    pub project: Option<Project>,
    pub requirement_id: Option<String>,
    pub requirement: Option<Requirement>,
}

/// Response body for `POST /analysis`
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisStartedResponse {
    pub id: String,
    #[serde(flatten)]
    pub state: AnalysisState,
}

/// Response body for `GET /analysis/:id` and `DELETE /analysis/:id`
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisStatusResponse {
    pub id: String,
    #[serde(flatten)]
    pub state: AnalysisState,
    /// Rewritten requirements once the run is done
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<AnalyzedRequirement>,
}

/// Response body for `GET /errors/last`
#[derive(Debug, Clone, Serialize)]
pub struct LastErrorResponse {
    pub error: Option<OperationError>,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Whether the data service is accepting requests
    pub initialized: bool,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn new(initialized: bool) -> Self {
        Self {
            status: if initialized { "healthy" } else { "starting" }.to_string(),
            initialized,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
