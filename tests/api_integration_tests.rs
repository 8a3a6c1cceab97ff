//! Integration Tests for API Endpoints
//!
//! Tests the full request/response cycle through the guarded router.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use reqstore::{
    api::create_router,
    cache::CacheConfig,
    pipeline::{PipelineApi, PipelineInput, PipelineRun, PollPolicy, RunHandle, RunState},
    AppState, DataService, MemoryStore,
};
use serde_json::{json, Value};
use tower::ServiceExt;

// == Helper Functions ==

const USER_COOKIES: &str = "auth-token=test-token; user-role=engineer";
const ADMIN_COOKIES: &str = "auth-token=test-token; user-role=admin";

/// Pipeline that finishes every run on the first status check.
struct InstantPipeline;

#[async_trait]
impl PipelineApi for InstantPipeline {
    async fn start_pipeline(
        &self,
        _inputs: Vec<PipelineInput>,
    ) -> reqstore::pipeline::Result<RunHandle> {
        Ok(RunHandle {
            run_id: "run-42".to_string(),
        })
    }

    async fn get_pipeline_run(&self, run_id: &str) -> reqstore::pipeline::Result<PipelineRun> {
        Ok(serde_json::from_value(json!({
            "run_id": run_id,
            "state": "DONE",
            "outputs": { "output": "```json\n[{\"Requirement ID\": \"REQ-1\", \"Final Requirement\": \"The pump shall stop.\"}]\n```" }
        }))
        .unwrap_or(PipelineRun {
            run_id: run_id.to_string(),
            state: RunState::Failed,
            outputs: None,
        }))
    }
}

fn create_test_state() -> AppState {
    let service = Arc::new(DataService::new(
        Arc::new(MemoryStore::new()),
        CacheConfig::default(),
    ));
    service.init();
    service.set_user(Some("tester".to_string()));

    let policy = PollPolicy {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(2),
        max_attempts: 5,
        max_duration: Duration::from_secs(5),
    };
    AppState::new(service, Arc::new(InstantPipeline), policy)
}

fn create_test_app() -> Router {
    create_router(create_test_state())
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, USER_COOKIES);
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

// == Health ==

#[tokio::test]
async fn test_health_is_public() {
    let app = create_test_app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["initialized"], true);
}

// == Route Guard ==

#[tokio::test]
async fn test_missing_token_redirects_to_login() {
    let app = create_test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/documents/projects/p1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert_eq!(location, "/login?redirect=%2Fdocuments%2Fprojects%2Fp1");
}

#[tokio::test]
async fn test_cache_admin_requires_admin_role() {
    let app = create_test_app();

    let response = app
        .clone()
        .oneshot(request("GET", "/cache/stats", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/dashboard");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/cache/stats")
                .header(header::COOKIE, ADMIN_COOKIES)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["config"]["max_entries"], 100);
}

// == Documents ==

#[tokio::test]
async fn test_document_lifecycle() {
    let app = create_test_app();

    let (status, created) = send(
        &app,
        request(
            "POST",
            "/documents/requirements",
            Some(json!({ "title": "Brakes", "count": 5 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["createdBy"], "tester");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, updated) = send(
        &app,
        request(
            "PATCH",
            &format!("/documents/requirements/{id}"),
            Some(json!([{ "field": "count", "operation": "increment", "value": 1 }])),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["count"], 6);

    let (status, fetched) = send(
        &app,
        request("GET", &format!("/documents/requirements/{id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["count"], 6);

    let (status, deleted) = send(
        &app,
        request("DELETE", &format!("/documents/requirements/{id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(deleted["message"].as_str().unwrap().contains(&id));

    let (status, _) = send(
        &app,
        request("GET", &format!("/documents/requirements/{id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_collection_rejected() {
    let app = create_test_app();
    let (status, json) = send(&app, request("POST", "/documents/widgets", Some(json!({ "a": 1 })))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("widgets"));
}

#[tokio::test]
async fn test_empty_create_records_last_error() {
    let app = create_test_app();
    let (status, json) = send(&app, request("POST", "/documents/projects", Some(json!({})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["operation"], "create");

    let (_, last) = send(&app, request("GET", "/errors/last", None)).await;
    assert_eq!(last["error"]["operation"], "create");

    let (status, _) = send(&app, request("DELETE", "/errors/last", None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, last) = send(&app, request("GET", "/errors/last", None)).await;
    assert!(last["error"].is_null());
}

#[tokio::test]
async fn test_update_missing_document_is_404() {
    let app = create_test_app();
    let (status, json) = send(
        &app,
        request("PATCH", "/documents/projects/ghost", Some(json!({ "title": "x" }))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["operation"], "update");
}

#[tokio::test]
async fn test_query_with_pagination() {
    let app = create_test_app();
    for n in 1..=3 {
        send(
            &app,
            request("POST", "/documents/comments", Some(json!({ "n": n, "kind": "note" }))),
        )
        .await;
    }

    let (status, page) = send(
        &app,
        request(
            "POST",
            "/query/comments",
            Some(json!({
                "filters": [{ "field": "kind", "operator": "==", "value": "note" }],
                "pagination": { "limit": 2, "orderBy": { "field": "n", "direction": "desc" } }
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert_eq!(page["items"][0]["n"], 3);
    assert_eq!(page["hasMore"], true);
}

// == Batch ==

#[tokio::test]
async fn test_document_named_query_is_addressable() {
    let app = create_test_app();
    send(
        &app,
        request(
            "POST",
            "/batch",
            Some(json!({ "operations": [
                { "type": "create", "collection": "projects", "id": "query", "data": { "title": "Q" } }
            ]})),
        ),
    )
    .await;

    let (status, json) = send(&app, request("GET", "/documents/projects/query", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "Q");

    let (status, _) = send(&app, request("DELETE", "/documents/projects/query", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_batch_endpoint() {
    let app = create_test_app();
    let (status, json) = send(
        &app,
        request(
            "POST",
            "/batch",
            Some(json!({ "operations": [
                { "type": "create", "collection": "projects", "id": "p1", "data": { "title": "One" } },
                { "type": "create", "collection": "projects", "id": "p2", "data": { "title": "Two" } },
                { "type": "delete", "collection": "projects", "id": "p1" }
            ]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["applied"], 3);

    let (status, _) = send(&app, request("GET", "/documents/projects/p1", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, request("GET", "/documents/projects/p2", None)).await;
    assert_eq!(status, StatusCode::OK);
}

// == Selection ==

#[tokio::test]
async fn test_selection_endpoints() {
    let app = create_test_app();
    send(
        &app,
        request(
            "POST",
            "/batch",
            Some(json!({ "operations": [
                { "type": "create", "collection": "projects", "id": "p1", "data": { "title": "Pump" } }
            ]})),
        ),
    )
    .await;

    let (status, json) = send(
        &app,
        request("PUT", "/selection/project", Some(json!({ "id": "p1" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["projectId"], "p1");
    assert_eq!(json["project"]["title"], "Pump");

    let (status, json) = send(
        &app,
        request("PUT", "/selection/requirement", Some(json!({ "id": "missing" }))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["operation"], "setCurrentRequirement");

    let (_, json) = send(&app, request("PUT", "/selection/project", Some(json!({ "id": null })))).await;
    assert!(json["projectId"].is_null());
}

// == Analysis ==

#[tokio::test]
async fn test_analysis_runs_and_updates_requirement() {
    let state = create_test_state();
    let app = create_router(state.clone());

    let (_, created) = send(
        &app,
        request("POST", "/documents/requirements", Some(json!({ "title": "Pump stop" }))),
    )
    .await;
    let requirement_id = created["id"].as_str().unwrap().to_string();

    let (status, started) = send(
        &app,
        request(
            "POST",
            "/analysis",
            Some(json!({ "requirement": "pump should stop", "requirementId": requirement_id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let analysis_id = started["id"].as_str().unwrap().to_string();

    let mut status_json = Value::Null;
    for _ in 0..100 {
        let (_, json) = send(&app, request("GET", &format!("/analysis/{analysis_id}"), None)).await;
        if json["state"] == "done" {
            status_json = json;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status_json["runId"], "run-42");
    assert_eq!(status_json["requirements"][0]["Requirement ID"], "REQ-1");

    // A finished run is handed out once, then forgotten
    let (status, _) = send(&app, request("GET", &format!("/analysis/{analysis_id}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(state.analyses.read().is_empty());

    let mut stored = Value::Null;
    for _ in 0..100 {
        let (_, json) = send(
            &app,
            request("GET", &format!("/documents/requirements/{requirement_id}"), None),
        )
        .await;
        if json["output"].as_array().map_or(false, |o| !o.is_empty()) {
            stored = json;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(stored["output"][0]["role"], "assistant");

    state.shutdown();
    assert!(!state.service.is_initialized());
}

#[tokio::test]
async fn test_analysis_validation_and_unknown_id() {
    let app = create_test_app();
    let (status, _) = send(&app, request("POST", "/analysis", Some(json!({ "requirement": "" })))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, request("GET", "/analysis/nope", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
