/**
 * API REST NETSECTOR - Serveur HTTP du kernel
 *
 * RÔLE :
 * Expose le dernier statut publié, la configuration (secteurs, équipements,
 * dépendances), les overrides de simulation et l'historique des dégradations.
 *
 * FONCTIONNEMENT :
 * - Les lectures de statut ne déclenchent jamais de recalcul (cache)
 * - Les écritures de configuration sont prises en compte au tick suivant
 * - POST /status/refresh demande un tick immédiat au poller (202)
 * - Erreurs : {"error": "..."} avec 404 / 400 / 500
 *
 * SÉCURITÉ :
 * - Header x-api-key exigé sur toutes les routes sauf /health si une clé est configurée
 * - Sans clé configurée, l'API est ouverte (avertissement au démarrage)
 */

use crate::engine::StatusEngine;
use crate::models::{DependencyEdge, Device, HistoryEntry, Sector, StatusRecord, StatusSnapshot};
use crate::poller::PollerHandle;
use crate::store::StoreError;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<StatusEngine>,
    pub poller: PollerHandle,
    pub api_key: Option<Arc<str>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
    #[error("missing or invalid x-api-key")]
    Unauthorized,
    #[error("status poller is not running")]
    PollerDown,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownSector(_) | StoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StoreError::Invalid(_) => ApiError::BadRequest(err.to_string()),
            StoreError::Unavailable(_) | StoreError::Serialization(_) | StoreError::Io(_) => {
                error!(error = %err, "store failure");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::PollerDown => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, ApiError> {
    // health toujours accessible
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }
    let Some(expected) = app.api_key.as_deref() else {
        return Ok(next.run(req).await);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !ok {
        warn!(path = %req.uri().path(), "rejected request without valid api key");
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(get_status))
        .route("/status/refresh", post(refresh_status))
        .route("/status/{id}", get(get_sector_status))
        .route("/sectors", get(list_sectors).put(replace_sectors))
        .route("/sectors/{id}", get(get_sector).put(upsert_sector).delete(remove_sector))
        .route("/sectors/{id}/devices", get(list_devices).post(add_device))
        .route("/sectors/{id}/devices/{device_id}", delete(remove_device))
        .route("/edges", get(list_edges).put(replace_edges).post(add_edge))
        .route("/edges/{from}/{to}", delete(remove_edge))
        .route("/overrides", get(list_overrides).post(set_override).delete(clear_overrides))
        .route("/overrides/{id}/toggle", post(toggle_override))
        .route("/history", get(get_history).delete(clear_history))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

// GET /status (dernier jeu publié)
async fn get_status(State(app): State<AppState>) -> Json<StatusSnapshot> {
    Json(app.engine.current_status().as_ref().clone())
}

// GET /status/{id}
async fn get_sector_status(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<StatusRecord>> {
    let snapshot = app.engine.current_status();
    snapshot
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no status for sector {id}")))
}

// POST /status/refresh
async fn refresh_status(State(app): State<AppState>) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    app.poller.refresh_now().map_err(|_| ApiError::PollerDown)?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "status": "refresh queued" }))))
}

/// Corps d'un secteur ; l'id du chemin l'emporte sur celui du corps
#[derive(Debug, Deserialize)]
struct SectorBody {
    name: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    equipment: Option<String>,
}

async fn list_sectors(State(app): State<AppState>) -> ApiResult<Json<Vec<Sector>>> {
    Ok(Json(app.engine.topology().list_sectors()?))
}

async fn replace_sectors(State(app): State<AppState>, Json(sectors): Json<Vec<Sector>>) -> ApiResult<Json<Vec<Sector>>> {
    Ok(Json(app.engine.topology().replace_sectors(sectors)?))
}

async fn get_sector(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Sector>> {
    Ok(Json(app.engine.topology().get_sector(&id)?))
}

async fn upsert_sector(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SectorBody>,
) -> ApiResult<Json<Sector>> {
    let sector = Sector {
        id,
        name: body.name,
        address: body.address,
        equipment: body.equipment,
    };
    Ok(Json(app.engine.topology().upsert_sector(sector)?))
}

async fn remove_sector(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    app.engine.topology().remove_sector(&id)?;
    // un override sur un secteur disparu n'a plus de sens
    app.engine.overrides().set_override(&id, false);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct DeviceBody {
    #[serde(default)]
    id: String,
    name: String,
    address: String,
}

async fn list_devices(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Vec<Device>>> {
    let topology = app.engine.topology();
    topology.get_sector(&id)?;
    Ok(Json(topology.list_devices(Some(&id))?))
}

async fn add_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DeviceBody>,
) -> ApiResult<(StatusCode, Json<Device>)> {
    let device = Device {
        id: body.id,
        sector_id: id,
        name: body.name,
        address: body.address,
    };
    let saved = app.engine.topology().add_device(device)?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn remove_device(
    State(app): State<AppState>,
    Path((id, device_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    app.engine.topology().remove_device(&id, &device_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_edges(State(app): State<AppState>) -> ApiResult<Json<Vec<DependencyEdge>>> {
    Ok(Json(app.engine.topology().list_edges()?))
}

async fn replace_edges(
    State(app): State<AppState>,
    Json(edges): Json<Vec<DependencyEdge>>,
) -> ApiResult<Json<Vec<DependencyEdge>>> {
    Ok(Json(app.engine.topology().replace_edges(edges)?))
}

async fn add_edge(
    State(app): State<AppState>,
    Json(edge): Json<DependencyEdge>,
) -> ApiResult<(StatusCode, Json<DependencyEdge>)> {
    let saved = app.engine.topology().add_edge(edge)?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn remove_edge(
    State(app): State<AppState>,
    Path((from, to)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    app.engine.topology().remove_edge(&from, &to)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
struct OverrideBody {
    sector_id: String,
    active: bool,
}

#[derive(Debug, Serialize)]
struct OverrideView {
    sector_id: String,
    active: bool,
    changed: bool,
}

async fn list_overrides(State(app): State<AppState>) -> Json<Vec<String>> {
    Json(app.engine.overrides().get_overrides().into_iter().collect())
}

async fn set_override(State(app): State<AppState>, Json(body): Json<OverrideBody>) -> ApiResult<Json<OverrideView>> {
    // lever un override orphelin reste permis
    if body.active {
        app.engine.topology().get_sector(&body.sector_id)?;
    }
    let changed = app.engine.overrides().set_override(&body.sector_id, body.active);
    Ok(Json(OverrideView {
        sector_id: body.sector_id,
        active: body.active,
        changed,
    }))
}

async fn toggle_override(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<OverrideView>> {
    let overrides = app.engine.overrides();
    if !overrides.is_active(&id) {
        app.engine.topology().get_sector(&id)?;
    }
    let active = overrides.toggle_override(&id);
    Ok(Json(OverrideView {
        sector_id: id,
        active,
        changed: true,
    }))
}

async fn clear_overrides(State(app): State<AppState>) -> StatusCode {
    app.engine.overrides().clear_all();
    StatusCode::NO_CONTENT
}

// GET /history (plus récent en premier)
async fn get_history(State(app): State<AppState>) -> Json<Vec<HistoryEntry>> {
    Json(app.engine.history_entries())
}

async fn clear_history(State(app): State<AppState>) -> StatusCode {
    app.engine.clear_history().await;
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryLog;
    use crate::overrides::OverrideStore;
    use crate::poller::PollCommand;
    use crate::probe::{ProbeResult, Prober};
    use crate::state::new_state;
    use crate::store::MemoryStore;
    use crate::topology::TopologyStore;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    struct AlwaysUp;

    #[async_trait]
    impl Prober for AlwaysUp {
        async fn probe(&self, _address: &str, _timeout: Duration) -> ProbeResult {
            ProbeResult::online(Some(1.0))
        }
    }

    fn setup(api_key: Option<&str>) -> (AppState, mpsc::Receiver<PollCommand>) {
        let engine = StatusEngine::new(
            TopologyStore::new(Arc::new(MemoryStore::new())),
            OverrideStore::new(),
            Arc::new(AlwaysUp),
            new_state(HistoryLog::default()),
            Duration::from_secs(1),
        );
        let (poller, commands) = PollerHandle::channel();
        let state = AppState {
            engine: Arc::new(engine),
            poller,
            api_key: api_key.map(Arc::from),
        };
        (state, commands)
    }

    fn request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &AppState, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = build_router(app.clone()).oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn health_stays_open_when_a_key_is_set() {
        let (app, _rx) = setup(Some("secret"));
        let response = build_router(app).oneshot(request("GET", "/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn only_the_exact_health_path_skips_the_key() {
        let (app, _rx) = setup(Some("secret"));
        for path in ["/healthz", "/health/sectors", "/healthcheck"] {
            let (status, _) = send(&app, request("GET", path, None)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{path}");
        }
    }

    #[tokio::test]
    async fn api_key_is_enforced_when_configured() {
        let (app, _rx) = setup(Some("secret"));
        let (status, body) = send(&app, request("GET", "/status", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let req = Request::builder()
            .uri("/status")
            .header("x-api-key", "secret")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tick"], 0);
    }

    #[tokio::test]
    async fn sector_crud_and_error_mapping() {
        let (app, _rx) = setup(None);
        let (status, body) = send(
            &app,
            request("PUT", "/sectors/CPD", Some(serde_json::json!({ "id": "IGNORED", "name": "CPD", "address": "192.168.36.53" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "CPD");

        let (status, body) = send(&app, request("GET", "/sectors", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(1));

        let (status, body) = send(&app, request("GET", "/sectors/NOPE", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("NOPE"));

        let (status, _) = send(
            &app,
            request("POST", "/sectors/NOPE/devices", Some(serde_json::json!({ "name": "Camera", "address": "10.0.0.9" }))),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, device) = send(
            &app,
            request("POST", "/sectors/CPD/devices", Some(serde_json::json!({ "name": "Camera", "address": "10.0.0.9" }))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let device_id = device["id"].as_str().unwrap().to_string();

        let uri = format!("/sectors/CPD/devices/{device_id}");
        let (status, _) = send(&app, request("DELETE", &uri, None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, request("DELETE", &uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn self_dependency_is_a_bad_request() {
        let (app, _rx) = setup(None);
        send(&app, request("PUT", "/sectors/OLD", Some(serde_json::json!({ "name": "OLD" })))).await;
        let (status, _) = send(
            &app,
            request("POST", "/edges", Some(serde_json::json!({ "from": "OLD", "to": "OLD" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn override_shows_up_in_status_and_history() {
        let (app, _rx) = setup(None);
        send(&app, request("PUT", "/sectors/COI", Some(serde_json::json!({ "name": "COI", "address": "192.168.36.15" })))).await;

        let (status, body) = send(
            &app,
            request("POST", "/overrides", Some(serde_json::json!({ "sector_id": "COI", "active": true }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["changed"], true);

        app.engine.tick().await;

        let (_, record) = send(&app, request("GET", "/status/COI", None)).await;
        assert_eq!(record["severity"], "CRITICAL");
        assert_eq!(record["reason"], "Simulated");

        let (_, history) = send(&app, request("GET", "/history", None)).await;
        assert_eq!(history.as_array().map(Vec::len), Some(1));

        let (status, _) = send(&app, request("DELETE", "/history", None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, history) = send(&app, request("GET", "/history", None)).await;
        assert_eq!(history.as_array().map(Vec::len), Some(0));

        let (_, toggled) = send(&app, request("POST", "/overrides/COI/toggle", None)).await;
        assert_eq!(toggled["active"], false);
    }

    #[tokio::test]
    async fn refresh_is_accepted_and_queued() {
        let (app, mut rx) = setup(None);
        let (status, _) = send(&app, request("POST", "/status/refresh", None)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(rx.try_recv().ok(), Some(PollCommand::RefreshNow));

        drop(rx);
        let (status, _) = send(&app, request("POST", "/status/refresh", None)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
