//! API Handlers
//!
//! HTTP request handlers for the data-service, selection and analysis endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use parking_lot::RwLock;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{DataError, Result};
use crate::models::{
    AnalysisStartRequest, AnalysisStartedResponse, AnalysisStatusResponse, BatchRequest,
    BatchResponse, CacheStatsResponse, Collection, DeleteResponse, Document, Fields,
    HealthResponse, InvalidateResponse, LastErrorResponse, OutputMessage, OutputRole, Page,
    QueryRequest, SelectRequest, SelectionResponse, Update,
};
use crate::pipeline::{
    extract_analysis, AnalysisState, AnalysisTask, HttpPipelineClient, PipelineApi, PollPolicy,
};
use crate::remote::MemoryStore;
use crate::service::{DataService, SelectionState};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DataService>,
    pub selection: Arc<SelectionState>,
    pub pipeline: Arc<dyn PipelineApi>,
    pub poll_policy: PollPolicy,
    /// Analyses started in this session, by id
    pub analyses: Arc<RwLock<HashMap<String, Arc<AnalysisTask>>>>,
}

impl AppState {
    /// Wraps an already initialized data service.
    pub fn new(service: Arc<DataService>, pipeline: Arc<dyn PipelineApi>, poll_policy: PollPolicy) -> Self {
        Self {
            selection: Arc::new(SelectionState::new(Arc::clone(&service))),
            service,
            pipeline,
            poll_policy,
            analyses: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates the state from configuration, backed by the in-memory store.
    pub fn from_config(config: &Config) -> Self {
        let service = Arc::new(DataService::new(
            Arc::new(MemoryStore::new()),
            config.cache_config(),
        ));
        service.init();
        service.set_user(Some(config.session_user.clone()));

        let pipeline = Arc::new(HttpPipelineClient::new(config.pipeline_settings()));
        Self::new(service, pipeline, config.poll_policy())
    }

    /// Cancels running analyses and tears the data service down.
    pub fn shutdown(&self) {
        for task in self.analyses.write().drain().map(|(_, task)| task) {
            task.cancel();
        }
        self.selection.clear();
        self.service.dispose();
    }

    fn selection_snapshot(&self) -> SelectionResponse {
        SelectionResponse {
            project_id: self.selection.current_project_id(),
            project: self.selection.current_project(),
            requirement_id: self.selection.current_requirement_id(),
            requirement: self.selection.current_requirement(),
        }
    }
}

fn parse_collection(name: &str) -> Result<Collection> {
    name.parse().map_err(DataError::InvalidRequest)
}

// == Health ==
/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::new(state.service.is_initialized()))
}

// == Documents ==
/// Handler for POST /documents/:collection
pub async fn create_document_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(fields): Json<Fields>,
) -> Result<(StatusCode, Json<Document>)> {
    let collection = parse_collection(&collection)?;
    let document = state.service.create(collection, fields).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// Handler for GET /documents/:collection/:id
pub async fn get_document_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Document>> {
    let collection = parse_collection(&collection)?;
    match state.service.get(collection, &id).await? {
        Some(document) => Ok(Json(document)),
        None => Err(DataError::NotFound(format!("{}/{}", collection, id))),
    }
}

/// Handler for PATCH /documents/:collection/:id
///
/// Accepts either a field map (merge) or a list of field operations.
pub async fn update_document_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Json(update): Json<Update>,
) -> Result<Json<Document>> {
    let collection = parse_collection(&collection)?;
    let document = state.service.update(collection, &id, update).await?;
    Ok(Json(document))
}

/// Handler for DELETE /documents/:collection/:id
pub async fn delete_document_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>> {
    let collection = parse_collection(&collection)?;
    state.service.remove(collection, &id).await?;
    Ok(Json(DeleteResponse::new(collection, id)))
}

/// Handler for POST /query/:collection
pub async fn query_documents_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<Page>> {
    let collection = parse_collection(&collection)?;
    let page = state
        .service
        .query(collection, req.filters, req.pagination)
        .await?;
    Ok(Json(page))
}

/// Handler for POST /batch
pub async fn batch_handler(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(DataError::InvalidRequest(error_msg));
    }
    let applied = state.service.execute_batch(req.operations).await?;
    Ok(Json(BatchResponse { applied }))
}

// == Cache ==
/// Handler for GET /cache/stats
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    Json(CacheStatsResponse::new(
        state.service.cache_stats(),
        state.service.cache_config(),
    ))
}

/// Handler for DELETE /cache
pub async fn clear_cache_handler(State(state): State<AppState>) -> Json<InvalidateResponse> {
    let removed = state.service.cache_stats().total_entries;
    state.service.clear_cache();
    Json(InvalidateResponse {
        collection: None,
        removed,
    })
}

/// Handler for DELETE /cache/:collection
pub async fn invalidate_collection_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    let collection = parse_collection(&collection)?;
    let removed = state.service.invalidate(collection, None);
    Ok(Json(InvalidateResponse {
        collection: Some(collection),
        removed,
    }))
}

// == Selection ==
/// Handler for PUT /selection/project
pub async fn select_project_handler(
    State(state): State<AppState>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<SelectionResponse>> {
    state.selection.set_current_project(req.id.as_deref()).await?;
    Ok(Json(state.selection_snapshot()))
}

/// Handler for PUT /selection/requirement
pub async fn select_requirement_handler(
    State(state): State<AppState>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<SelectionResponse>> {
    state
        .selection
        .set_current_requirement(req.id.as_deref())
        .await?;
    Ok(Json(state.selection_snapshot()))
}

/// Handler for GET /selection
pub async fn selection_handler(State(state): State<AppState>) -> Json<SelectionResponse> {
    Json(state.selection_snapshot())
}

// == Analysis ==
/// Handler for POST /analysis
///
/// Starts a pipeline run in the background. When `requirementId` is given, the
/// final output is appended to that requirement's conversation.
pub async fn start_analysis_handler(
    State(state): State<AppState>,
    Json(req): Json<AnalysisStartRequest>,
) -> Result<(StatusCode, Json<AnalysisStartedResponse>)> {
    if let Some(error_msg) = req.validate() {
        return Err(DataError::InvalidRequest(error_msg));
    }

    let id = Uuid::new_v4().to_string();
    let task = Arc::new(AnalysisTask::spawn(
        Arc::clone(&state.pipeline),
        &req.to_analysis_request(),
        state.poll_policy,
    ));
    state.analyses.write().insert(id.clone(), Arc::clone(&task));
    info!("Analysis {} started", id);

    if let Some(requirement_id) = req.requirement_id {
        let service = Arc::clone(&state.service);
        let mut updates = task.subscribe();
        tokio::spawn(async move {
            loop {
                let current = updates.borrow_and_update().clone();
                if current.is_terminal() {
                    if let AnalysisState::Done { output, .. } = current {
                        record_output(&service, &requirement_id, output).await;
                    }
                    break;
                }
                if updates.changed().await.is_err() {
                    break;
                }
            }
        });
    }

    let current = task.state();
    Ok((
        StatusCode::ACCEPTED,
        Json(AnalysisStartedResponse { id, state: current }),
    ))
}

async fn record_output(service: &DataService, requirement_id: &str, output: String) {
    let message = OutputMessage {
        role: OutputRole::Assistant,
        content: output,
    };
    let result = service
        .append_to_array(
            Collection::Requirements,
            requirement_id,
            "output",
            json!([message]),
        )
        .await;
    if let Err(e) = result {
        warn!("Could not store analysis output on {}: {}", requirement_id, e);
    }
}

fn analysis_status(id: String, state: AnalysisState) -> AnalysisStatusResponse {
    let requirements = match &state {
        AnalysisState::Done { output, .. } => extract_analysis(output),
        _ => Vec::new(),
    };
    AnalysisStatusResponse {
        id,
        state,
        requirements,
    }
}

fn find_analysis(state: &AppState, id: &str) -> Result<Arc<AnalysisTask>> {
    state
        .analyses
        .read()
        .get(id)
        .cloned()
        .ok_or_else(|| DataError::NotFound(format!("analysis {}", id)))
}

/// Handler for GET /analysis/:id
pub async fn analysis_status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisStatusResponse>> {
    let task = find_analysis(&state, &id)?;
    let current = task.state();
    retire_if_finished(&state, &id, &current);
    Ok(Json(analysis_status(id, current)))
}

/// Handler for DELETE /analysis/:id
pub async fn cancel_analysis_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisStatusResponse>> {
    let task = find_analysis(&state, &id)?;
    task.cancel();
    let final_state = task.wait().await;
    retire_if_finished(&state, &id, &final_state);
    Ok(Json(analysis_status(id, final_state)))
}

/// Forgets a run once its terminal state has been handed out.
fn retire_if_finished(state: &AppState, id: &str, current: &AnalysisState) {
    if current.is_terminal() && state.analyses.write().remove(id).is_some() {
        info!("Analysis {} retired", id);
    }
}

// == Errors ==
/// Handler for GET /errors/last
pub async fn last_error_handler(State(state): State<AppState>) -> Json<LastErrorResponse> {
    Json(LastErrorResponse {
        error: state.service.last_error(),
    })
}

/// Handler for DELETE /errors/last
pub async fn clear_error_handler(State(state): State<AppState>) -> StatusCode {
    state.service.clear_error();
    StatusCode::NO_CONTENT
}
