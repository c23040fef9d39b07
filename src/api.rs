use crate::access_log::{AccessLog, Action, LogEntry, MAX_PAGE_SIZE};
use crate::config::Config;
use crate::db::Db;
use crate::error::Error;
use crate::flow::{BatchFace, BatchOutcome, EnrollOutcome, Recognizer};
use crate::matcher::MatchResult;
use crate::store::{FaceExport, FaceRecord, FaceStore, FaceSummary};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub const API_KEY_HEADER: &str = "x-api-key";

pub struct AppState {
    pub cfg: Config,
    pub store: FaceStore,
    pub audit: AccessLog,
    pub recognizer: Recognizer,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(cfg: Config, db: Arc<Db>) -> Self {
        let store = FaceStore::new(db.clone());
        let audit = AccessLog::new(db);
        let recognizer = Recognizer::new(store.clone(), audit.clone());
        Self {
            cfg,
            store,
            audit,
            recognizer,
        }
    }
}

/// Uniform error envelope: `{error, message}` with the mapped status.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Store(_) | Error::LogWrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn build_router(state: SharedState) -> Router {
    // Method fallbacks keep 405s in the same envelope as every other error;
    // the auth layer sits over the route fallback too, so unknown paths do
    // not reveal the route surface without the shared secret.
    Router::new()
        .route(
            "/api/faces",
            get(list_faces)
                .post(enroll_face)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/faces/search",
            post(search_face).fallback(method_not_allowed),
        )
        .route(
            "/api/faces/recognize",
            post(recognize_face).fallback(method_not_allowed),
        )
        .route(
            "/api/faces/batch",
            post(batch_enroll).fallback(method_not_allowed),
        )
        .route(
            "/api/faces/export",
            get(export_faces).fallback(method_not_allowed),
        )
        .route(
            "/api/faces/clear",
            delete(clear_faces).fallback(method_not_allowed),
        )
        .route("/api/stats", get(stats).fallback(method_not_allowed))
        .route("/api/logs", get(list_logs).fallback(method_not_allowed))
        .route("/api/led", post(set_led).fallback(method_not_allowed))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn require_api_key(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    match provided {
        Some(key) if key == state.cfg.api_key => next.run(req).await,
        _ => Error::Auth("missing or invalid api key".into()).into_response(),
    }
}

async fn not_found() -> Error {
    Error::NotFound("no such route".into())
}

async fn method_not_allowed() -> Response {
    let body = ErrorBody {
        error: "method_not_allowed",
        message: "method not allowed for this route".to_string(),
    };
    (StatusCode::METHOD_NOT_ALLOWED, Json(body)).into_response()
}

/// Fold extractor rejections (malformed JSON, bad query types) into the
/// validation arm of the envelope instead of axum's plain-text defaults.
fn require_json<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Error> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(Error::Validation(rejection.body_text())),
    }
}

#[derive(Serialize)]
struct FacesResponse {
    faces: Vec<FaceRecord>,
    count: usize,
}

async fn list_faces(State(state): State<SharedState>) -> Result<Json<FacesResponse>, Error> {
    let faces = state.store.list_all()?;
    let count = faces.len();
    Ok(Json(FacesResponse { faces, count }))
}

#[derive(Deserialize)]
struct EnrollRequest {
    name: String,
    vector: Vec<f32>,
}

#[derive(Serialize)]
struct EnrollResponse {
    success: bool,
    #[serde(flatten)]
    outcome: EnrollOutcome,
}

async fn enroll_face(
    State(state): State<SharedState>,
    payload: Result<Json<EnrollRequest>, JsonRejection>,
) -> Result<Json<EnrollResponse>, Error> {
    let req = require_json(payload)?;
    let outcome = state.recognizer.enroll(&req.name, &req.vector)?;
    Ok(Json(EnrollResponse {
        success: true,
        outcome,
    }))
}

#[derive(Deserialize)]
struct SearchRequest {
    vector: Vec<f32>,
    threshold: Option<f32>,
}

async fn search_face(
    State(state): State<SharedState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<MatchResult>, Error> {
    let req = require_json(payload)?;
    let threshold = req.threshold.unwrap_or(state.cfg.threshold);
    let result = state.recognizer.search(&req.vector, threshold)?;
    Ok(Json(result))
}

async fn recognize_face(
    State(state): State<SharedState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<MatchResult>, Error> {
    let req = require_json(payload)?;
    let threshold = req.threshold.unwrap_or(state.cfg.threshold);
    let result = state.recognizer.recognize(&req.vector, threshold)?;
    if result.matched {
        info!(
            "recognized {} (confidence {:.3})",
            result.name, result.confidence
        );
    }
    Ok(Json(result))
}

#[derive(Deserialize)]
struct BatchRequest {
    faces: Vec<BatchFace>,
}

async fn batch_enroll(
    State(state): State<SharedState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchOutcome>, Error> {
    let req = require_json(payload)?;
    Ok(Json(state.recognizer.batch_enroll(&req.faces)?))
}

async fn export_faces(State(state): State<SharedState>) -> Result<Json<FaceExport>, Error> {
    Ok(Json(state.store.export_all()?))
}

#[derive(Serialize)]
struct ClearResponse {
    success: bool,
    faces_deleted: u64,
    logs_deleted: u64,
}

async fn clear_faces(State(state): State<SharedState>) -> Result<Json<ClearResponse>, Error> {
    let (faces_deleted, logs_deleted) = state.recognizer.clear_all()?;
    Ok(Json(ClearResponse {
        success: true,
        faces_deleted,
        logs_deleted,
    }))
}

#[derive(Serialize)]
struct StatsResponse {
    faces: u64,
    logs: u64,
    recent_logs: Vec<LogEntry>,
    recent_faces: Vec<FaceSummary>,
}

async fn stats(State(state): State<SharedState>) -> Result<Json<StatsResponse>, Error> {
    Ok(Json(StatsResponse {
        faces: state.store.count()?,
        logs: state.audit.count()?,
        recent_logs: state.audit.recent(10)?,
        recent_faces: state.store.recent(5)?,
    }))
}

#[derive(Deserialize)]
struct LogsQuery {
    limit: Option<u32>,
    offset: Option<u32>,
    action: Option<String>,
}

#[derive(Serialize)]
struct LogsResponse {
    logs: Vec<LogEntry>,
    total: u64,
    limit: u32,
    offset: u32,
    has_more: bool,
    /// Tags currently present in the log, for the filter menu.
    actions: Vec<Action>,
}

async fn list_logs(
    State(state): State<SharedState>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<Json<LogsResponse>, Error> {
    let Query(query) = query.map_err(|rejection| Error::Validation(rejection.body_text()))?;
    let action = match &query.action {
        Some(raw) => Some(
            Action::parse(raw)
                .ok_or_else(|| Error::Validation(format!("unknown action filter {raw:?}")))?,
        ),
        None => None,
    };
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);

    let page = state.audit.list(action, limit, offset)?;
    Ok(Json(LogsResponse {
        logs: page.entries,
        total: page.total,
        limit,
        offset,
        has_more: page.has_more,
        actions: state.audit.distinct_actions()?,
    }))
}

#[derive(Deserialize)]
struct LedRequest {
    state: String,
}

#[derive(Serialize)]
struct LedResponse {
    success: bool,
    state: String,
}

/// Mock actuation endpoint. The only side effect is the logged intent.
async fn set_led(
    payload: Result<Json<LedRequest>, JsonRejection>,
) -> Result<Json<LedResponse>, Error> {
    let req = require_json(payload)?;
    match req.state.as_str() {
        "on" | "off" => {
            info!("led intent: {}", req.state);
            Ok(Json(LedResponse {
                success: true,
                state: req.state,
            }))
        }
        other => Err(Error::Validation(format!(
            "state must be \"on\" or \"off\", got {other:?}"
        ))),
    }
}
