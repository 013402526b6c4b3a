//! API Routes
//!
//! JSON endpoints for entity CRUD, join queries, reports, and monitoring.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::Metrics;
use crate::config::OpenismsConfig;
use crate::error::{Error, Result};
use crate::reports;
use crate::store::Store;
use crate::types::{
    AssetInput, AssetPatch, ContainerInput, ContainerPatch, EntityKind, LinkRow, ProcessInput,
    ProcessPatch, ThreatInput, ThreatPatch,
};

/// Shared API state
pub struct ApiState {
    pub config: Arc<OpenismsConfig>,
    pub store: Arc<RwLock<Store>>,
    pub metrics: Arc<Metrics>,
}

/// Run the HTTP API server
pub async fn run_api_server(
    config: Arc<OpenismsConfig>,
    store: Arc<RwLock<Store>>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let state = Arc::new(ApiState {
        config: config.clone(),
        store,
        metrics,
    });

    let app = Router::new()
        // Health & Status
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        // Bulk document read
        .route("/api/data", get(get_data))
        // Join queries
        .route("/api/entities", get(get_entities))
        .route("/api/related", get(get_related))
        .route("/api/threats/:id", get(get_threat))
        // CRUD
        .route("/api/processes", post(create_process))
        .route(
            "/api/processes/:id",
            patch(update_process).delete(delete_entity),
        )
        .route("/api/assets", post(create_asset))
        .route("/api/assets/:id", patch(update_asset).delete(delete_entity))
        .route("/api/threats", post(create_threat))
        .route(
            "/api/threats/:id",
            patch(update_threat).delete(delete_entity),
        )
        .route("/api/containers", post(create_container))
        .route("/api/containers/:id", patch(update_container))
        // Link management
        .route("/api/controls/link", post(link_control))
        .route("/api/links", post(create_link))
        .route("/api/unlink", delete(unlink).post(unlink))
        // Reports
        .route("/api/reports/threats", get(report_threats))
        .route("/api/reports/controls", get(report_controls))
        .route("/api/reports/containers", get(report_containers))
        .route("/api/reports/deliverables", get(report_deliverables))
        // Metrics
        .route("/metrics", get(get_metrics_prometheus))
        .route("/metrics/json", get(get_metrics_json))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.api_port));
    info!("HTTP API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// HTTP status for a domain error
fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::EntityNotFound(_) => StatusCode::NOT_FOUND,
        Error::MalformedLinkRow(_)
        | Error::DuplicateLink
        | Error::UnknownCategory(_)
        | Error::ScoreOutOfRange { .. }
        | Error::InvalidEntityId(_)
        | Error::CascadeUnsupported(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Io(_) | Error::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Serialize a domain result into a JSON response
fn reply<T: serde::Serialize>(metrics: &Metrics, result: Result<T>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => {
            let status = status_for(&err);
            if status.is_client_error() {
                metrics.inc_rejected();
            }
            (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
        }
    }
}

// =============================================================================
// HEALTH & STATUS
// =============================================================================

/// GET /health - Simple health check
async fn health_check() -> impl IntoResponse {
    "OK"
}

/// GET /status - Detailed status
async fn get_status(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.metrics.inc_requests();
    let store = state.store.read().await;

    let status = serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.metrics.uptime_secs(),
        "store": store.stats(),
        "risk_score_divisor": state.config.risk_score_divisor,
    });

    Json(status)
}

/// GET /api/data - The entire backing document
async fn get_data(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.metrics.inc_requests();
    let store = state.store.read().await;
    Json(store.document().clone())
}

// =============================================================================
// JOIN QUERIES
// =============================================================================

#[derive(Debug, Deserialize)]
struct IdsQuery {
    /// Comma-separated id list; kind is resolved from the id prefixes
    ids: String,
}

/// GET /api/entities?ids=a,b,c - Fetch entities by id set
async fn get_entities(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<IdsQuery>,
) -> Response {
    state.metrics.inc_requests();
    let ids: HashSet<String> = query
        .ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let store = state.store.read().await;
    reply(&state.metrics, store.fetch_entities(&ids))
}

#[derive(Debug, Deserialize)]
struct RelatedQuery {
    /// Comma-separated source ids, all of one kind
    from_ids: String,
    /// Target kind to collect
    to: EntityKind,
}

/// GET /api/related?from_ids=..&to=asset - Association walk
async fn get_related(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<RelatedQuery>,
) -> Response {
    state.metrics.inc_requests();
    let from_ids: HashSet<String> = query
        .from_ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let from_kind = match from_ids.iter().next() {
        Some(id) => EntityKind::of(id),
        None => return Json(Vec::<String>::new()).into_response(),
    };

    let store = state.store.read().await;
    let related = store.related_ids(from_kind, &from_ids, query.to);
    Json(related).into_response()
}

/// GET /api/threats/:id - Threat with containers, controls, and owning asset
async fn get_threat(State(state): State<Arc<ApiState>>, Path(id): Path<String>) -> Response {
    state.metrics.inc_requests();
    let store = state.store.read().await;
    reply(&state.metrics, store.enrich_threat(&id))
}

// =============================================================================
// CRUD
// =============================================================================

/// POST /api/processes
async fn create_process(
    State(state): State<Arc<ApiState>>,
    Json(input): Json<ProcessInput>,
) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_mutations();
    let mut store = state.store.write().await;
    reply(&state.metrics, store.add_process(input))
}

#[derive(Debug, Deserialize)]
struct AssetCreate {
    process_id: String,
    #[serde(flatten)]
    asset: AssetInput,
}

/// POST /api/assets - New asset linked to its process
async fn create_asset(
    State(state): State<Arc<ApiState>>,
    Json(input): Json<AssetCreate>,
) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_mutations();
    let mut store = state.store.write().await;
    reply(&state.metrics, store.add_asset(&input.process_id, input.asset))
}

#[derive(Debug, Deserialize)]
struct ThreatCreate {
    asset_id: String,
    #[serde(flatten)]
    threat: ThreatInput,
}

/// POST /api/threats - New threat linked to its asset
async fn create_threat(
    State(state): State<Arc<ApiState>>,
    Json(input): Json<ThreatCreate>,
) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_mutations();
    let mut store = state.store.write().await;
    reply(&state.metrics, store.add_threat(&input.asset_id, input.threat))
}

#[derive(Debug, Deserialize)]
struct ContainerCreate {
    #[serde(default)]
    threat_id: Option<String>,
    #[serde(flatten)]
    container: ContainerInput,
}

/// POST /api/containers - New container, optionally linked to a threat
async fn create_container(
    State(state): State<Arc<ApiState>>,
    Json(input): Json<ContainerCreate>,
) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_mutations();
    let mut store = state.store.write().await;
    reply(
        &state.metrics,
        store.add_container(input.threat_id.as_deref(), input.container),
    )
}

/// PATCH /api/processes/:id
async fn update_process(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(patch): Json<ProcessPatch>,
) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_mutations();
    let mut store = state.store.write().await;
    reply(&state.metrics, store.update_process(&id, patch))
}

/// PATCH /api/assets/:id
async fn update_asset(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(patch): Json<AssetPatch>,
) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_mutations();
    let mut store = state.store.write().await;
    reply(&state.metrics, store.update_asset(&id, patch))
}

/// PATCH /api/threats/:id
async fn update_threat(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(patch): Json<ThreatPatch>,
) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_mutations();
    let mut store = state.store.write().await;
    reply(&state.metrics, store.update_threat(&id, patch))
}

/// PATCH /api/containers/:id
async fn update_container(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(patch): Json<ContainerPatch>,
) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_mutations();
    let mut store = state.store.write().await;
    reply(&state.metrics, store.update_container(&id, patch))
}

/// DELETE /api/{processes,assets,threats}/:id - Cascade delete
async fn delete_entity(State(state): State<Arc<ApiState>>, Path(id): Path<String>) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_mutations();
    let mut store = state.store.write().await;
    let result = store.delete_cascade(&id);
    if result.is_ok() {
        state.metrics.inc_cascade_deletes();
    }
    reply(
        &state.metrics,
        result.map(|removed| serde_json::json!({ "removed": removed })),
    )
}

// =============================================================================
// LINK MANAGEMENT
// =============================================================================

#[derive(Debug, Deserialize)]
struct ControlLinkRequest {
    container_id: String,
    control_id: String,
}

/// POST /api/controls/link - Attach a library control to a container
async fn link_control(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<ControlLinkRequest>,
) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_mutations();
    let mut store = state.store.write().await;
    reply(
        &state.metrics,
        store
            .link_control(&req.container_id, &req.control_id)
            .map(|()| serde_json::json!({ "linked": true })),
    )
}

/// POST /api/links - Insert an arbitrary link row
async fn create_link(State(state): State<Arc<ApiState>>, Json(row): Json<LinkRow>) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_mutations();
    let mut store = state.store.write().await;
    reply(
        &state.metrics,
        store.insert_link(row).map(|()| serde_json::json!({ "linked": true })),
    )
}

#[derive(Debug, Deserialize)]
struct UnlinkRequest {
    a: String,
    b: String,
}

/// POST|DELETE /api/unlink - Remove exactly the rows containing both ids
async fn unlink(State(state): State<Arc<ApiState>>, Json(req): Json<UnlinkRequest>) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_mutations();
    let mut store = state.store.write().await;
    reply(
        &state.metrics,
        store
            .unlink(&req.a, &req.b)
            .map(|removed| serde_json::json!({ "removed_rows": removed })),
    )
}

// =============================================================================
// REPORTS
// =============================================================================

/// GET /api/reports/threats - Threat assessment list
async fn report_threats(State(state): State<Arc<ApiState>>) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_reports_served();
    let store = state.store.read().await;
    Json(reports::threat_report(
        store.document(),
        store.risk_score_divisor(),
    ))
    .into_response()
}

/// GET /api/reports/controls - SOA/controls report
async fn report_controls(State(state): State<Arc<ApiState>>) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_reports_served();
    let store = state.store.read().await;
    Json(reports::control_report(
        store.document(),
        store.control_library(),
    ))
    .into_response()
}

/// GET /api/reports/containers - Container report
async fn report_containers(State(state): State<Arc<ApiState>>) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_reports_served();
    let store = state.store.read().await;
    Json(reports::container_report(
        store.document(),
        store.control_library(),
    ))
    .into_response()
}

/// GET /api/reports/deliverables - Deliverables tracking report
async fn report_deliverables(State(state): State<Arc<ApiState>>) -> Response {
    state.metrics.inc_requests();
    state.metrics.inc_reports_served();
    let store = state.store.read().await;
    Json(reports::deliverable_report(
        store.deliverables(),
        store.control_library(),
    ))
    .into_response()
}

// =============================================================================
// METRICS
// =============================================================================

/// GET /metrics - Prometheus format metrics
async fn get_metrics_prometheus(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.metrics.inc_requests();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.to_prometheus(),
    )
}

/// GET /metrics/json - JSON format metrics
async fn get_metrics_json(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.metrics.inc_requests();
    Json(state.metrics.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_for(&Error::EntityNotFound("threat000001".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&Error::MalformedLinkRow(0)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&Error::DuplicateLink),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&Error::ScoreOutOfRange {
                category: "safety".into(),
                max: 3
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_metrics_endpoints_count_requests() {
        let dir = tempfile::tempdir().unwrap();
        let config = OpenismsConfig::default().with_data_dir(dir.path());
        std::fs::write(&config.control_library_file, r#"{"control_library": []}"#).unwrap();
        let store = Store::open(&config).unwrap();

        let state = Arc::new(ApiState {
            config: Arc::new(config),
            store: Arc::new(RwLock::new(store)),
            metrics: Arc::new(Metrics::new()),
        });

        let _ = get_metrics_prometheus(State(state.clone())).await;
        let _ = get_metrics_json(State(state.clone())).await;

        assert_eq!(
            state
                .metrics
                .requests
                .load(std::sync::atomic::Ordering::Relaxed),
            2
        );
    }

    #[test]
    fn test_rejected_counter_on_client_error() {
        let metrics = Metrics::new();
        let _ = reply::<()>(&metrics, Err(Error::EntityNotFound("asset000001".into())));
        let _ = reply::<()>(&metrics, Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"))));

        assert_eq!(
            metrics
                .rejected_requests
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }
}
