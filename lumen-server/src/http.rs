//! HTTP API: room status, occupancy updates, AI workers, CCTV and webcam streams

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, WEBCAM_ROOM};
use crate::stream::{live_frames, mjpeg_response, single_frame};
use axum::{
    extract::{Path, State},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use lumen_core::{CctvCredentials, Room, RoomSource};
use lumen_eye::{OccupancyTransition, StartOutcome, TransitionCallback, WorkerSpec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub const SERVICE_NAME: &str = "Energy Management Backend Running";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub message: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct RoomStatus {
    pub id: String,
    pub occupied: bool,
    pub light: bool,
    pub ac: bool,
    pub rtsp_url: String,
    pub is_running: bool,
}

#[derive(Debug, Serialize)]
pub struct RoomsResponse {
    pub rooms: Vec<RoomStatus>,
}

#[derive(Debug, Deserialize)]
pub struct OccupancyUpdate {
    pub room_id: String,
    pub occupied: bool,
}

#[derive(Debug, Serialize)]
pub struct OccupancyUpdated {
    pub status: String,
    pub room_id: String,
    pub occupied: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: String,
}

impl StatusMessage {
    fn new(status: impl Into<String>) -> Json<Self> {
        Json(Self { status: status.into() })
    }
}

#[derive(Debug, Deserialize)]
pub struct CctvConnectRequest {
    pub room_id: String,
    pub cctv_ip: String,
    pub cctv_username: String,
    pub cctv_password: String,
    #[serde(default = "default_channel")]
    pub cctv_channel: String,
}

fn default_channel() -> String {
    "0".to_string()
}

impl CctvConnectRequest {
    fn credentials(&self) -> CctvCredentials {
        CctvCredentials {
            ip: self.cctv_ip.clone(),
            username: self.cctv_username.clone(),
            password: self.cctv_password.clone(),
            channel: self.cctv_channel.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CctvConnected {
    pub status: String,
    pub room_id: String,
    pub rtsp_url: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CctvDisconnectRequest {
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CctvDisconnected {
    pub status: String,
    pub room_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CctvStatus {
    pub room_id: String,
    pub connected: bool,
    pub person_count: usize,
    pub occupied: bool,
    pub light: bool,
    pub ac: bool,
}

#[derive(Debug, Serialize)]
pub struct WebcamStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupied: Option<bool>,
}

/// Create the HTTP router with all API routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/api/rooms", get(rooms_handler))
        .route("/api/occupancy", post(occupancy_handler))
        .route("/api/ai/:room_id/start", post(start_ai_handler))
        .route("/api/ai/:room_id/stop", post(stop_ai_handler))
        .route("/api/cctv/connect", post(cctv_connect_handler))
        .route("/api/cctv/disconnect", post(cctv_disconnect_handler))
        .route("/api/cctv/status/:room_id", get(cctv_status_handler))
        .route("/api/stream/:room_id", get(room_stream_handler))
        .route("/api/webcam/test/start", post(webcam_start_handler))
        .route("/api/webcam/test/stop", post(webcam_stop_handler))
        .route("/api/webcam/test/status", get(webcam_status_handler))
        .route("/api/webcam/stream", get(webcam_stream_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        message: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn rooms_handler(State(state): State<AppState>) -> Json<RoomsResponse> {
    let rooms = state
        .rooms
        .snapshot()
        .into_iter()
        .map(|room| RoomStatus {
            is_running: state.orchestrator.is_running(&room.id),
            rtsp_url: room.source.stream_url().unwrap_or_default().to_string(),
            id: room.id,
            occupied: room.occupied,
            light: room.devices.light,
            ac: room.devices.ac,
        })
        .collect();
    Json(RoomsResponse { rooms })
}

async fn occupancy_handler(
    State(state): State<AppState>,
    Json(update): Json<OccupancyUpdate>,
) -> ApiResult<Json<OccupancyUpdated>> {
    let room = state.rooms.update_occupancy(&update.room_id, update.occupied)?;
    Ok(Json(OccupancyUpdated {
        status: "updated".to_string(),
        room_id: room.id,
        occupied: room.occupied,
    }))
}

async fn start_ai_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<StatusMessage>> {
    let room = state.rooms.get(&room_id)?;
    let orchestrator = state.orchestrator.clone();
    let outcome = tokio::task::spawn_blocking(move || orchestrator.start(&room)).await??;
    if outcome == StartOutcome::AlreadyRunning {
        info!(room_id = %room_id, "AI worker already running");
    }
    Ok(StatusMessage::new(format!("AI started for {}", room_id)))
}

async fn stop_ai_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<StatusMessage>> {
    state.rooms.get(&room_id)?;
    let orchestrator = state.orchestrator.clone();
    let id = room_id.clone();
    tokio::task::spawn_blocking(move || orchestrator.stop(&id)).await?;
    Ok(StatusMessage::new(format!("AI stopped for {}", room_id)))
}

async fn cctv_connect_handler(
    State(state): State<AppState>,
    Json(request): Json<CctvConnectRequest>,
) -> ApiResult<Json<CctvConnected>> {
    let rtsp_url = request.credentials().rtsp_url();
    let source = RoomSource::NetworkStream {
        url: rtsp_url.clone(),
    };
    let room = state.rooms.set_source(&request.room_id, source.clone())?;

    let rooms = state.rooms.clone();
    let callback: TransitionCallback = Arc::new(move |transition: &OccupancyTransition| {
        if let Err(e) = rooms.update_occupancy(&transition.room_id, transition.occupied) {
            warn!(room_id = %transition.room_id, "Dropping occupancy update: {}", e);
        }
    });
    let spec = WorkerSpec::new(room.id.clone(), source)
        .with_devices(room.devices)
        .with_callback(callback);

    let registry = state.registry.clone();
    tokio::task::spawn_blocking(move || registry.create_or_replace(spec)).await??;
    info!(room_id = %room.id, source = %room.source, "CCTV connected");

    Ok(Json(CctvConnected {
        status: "connected".to_string(),
        message: format!("Connected to {} camera", room.id),
        room_id: room.id,
        rtsp_url,
    }))
}

async fn cctv_disconnect_handler(
    State(state): State<AppState>,
    Json(request): Json<CctvDisconnectRequest>,
) -> ApiResult<Json<CctvDisconnected>> {
    let room_id = match request.room_id {
        Some(id) if state.rooms.contains(&id) => id,
        _ => return Err(ApiError::NotFound("Room not found".to_string())),
    };

    let registry = state.registry.clone();
    let id = room_id.clone();
    tokio::task::spawn_blocking(move || registry.remove_and_stop(&id)).await?;

    state.rooms.set_source(&room_id, RoomSource::None)?;
    state.rooms.update_occupancy(&room_id, false)?;
    info!(room_id = %room_id, "CCTV disconnected");

    Ok(Json(CctvDisconnected {
        status: "disconnected".to_string(),
        message: format!("Disconnected from {}", room_id),
        room_id,
    }))
}

async fn cctv_status_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<CctvStatus>> {
    let room = state.rooms.get(&room_id)?;
    let status = match state.registry.get(&room_id) {
        Some(worker) => CctvStatus {
            connected: worker.is_running(),
            person_count: worker.person_count(),
            ..cctv_status(room)
        },
        None => CctvStatus {
            occupied: false,
            ..cctv_status(room)
        },
    };
    Ok(Json(status))
}

fn cctv_status(room: Room) -> CctvStatus {
    CctvStatus {
        room_id: room.id,
        connected: false,
        person_count: 0,
        occupied: room.occupied,
        light: room.devices.light,
        ac: room.devices.ac,
    }
}

async fn room_stream_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> ApiResult<Response> {
    state.rooms.get(&room_id)?;
    let worker = state
        .registry
        .get(&room_id)
        .ok_or_else(|| ApiError::ServiceUnavailable("CCTV not connected".to_string()))?;
    Ok(mjpeg_response(live_frames(worker)))
}

async fn webcam_start_handler(State(state): State<AppState>) -> ApiResult<Json<StatusMessage>> {
    let room = state.rooms.ensure_room(WEBCAM_ROOM);

    let rooms = state.rooms.clone();
    let callback: TransitionCallback = Arc::new(move |transition: &OccupancyTransition| {
        if let Err(e) = rooms.apply_transition(&transition.room_id, transition.occupied, transition.devices) {
            warn!(room_id = %transition.room_id, "Dropping occupancy update: {}", e);
        }
    });
    let spec = WorkerSpec::new(room.id, RoomSource::LocalCamera { index: 0 })
        .with_devices(room.devices)
        .with_callback(callback);

    let registry = state.registry.clone();
    tokio::task::spawn_blocking(move || registry.create_or_replace(spec)).await??;
    info!("Webcam test started");
    Ok(StatusMessage::new("Webcam test started"))
}

async fn webcam_stop_handler(State(state): State<AppState>) -> ApiResult<Json<StatusMessage>> {
    let registry = state.registry.clone();
    tokio::task::spawn_blocking(move || registry.remove_and_stop(WEBCAM_ROOM)).await?;
    Ok(StatusMessage::new("Webcam test stopped"))
}

async fn webcam_status_handler(State(state): State<AppState>) -> Json<WebcamStatus> {
    match state.registry.get(WEBCAM_ROOM).filter(|worker| worker.is_running()) {
        Some(worker) => {
            let person_count = worker.person_count();
            Json(WebcamStatus {
                status: "running".to_string(),
                person_count: Some(person_count),
                occupied: Some(person_count > 0),
            })
        }
        None => Json(WebcamStatus {
            status: "stopped".to_string(),
            person_count: None,
            occupied: None,
        }),
    }
}

async fn webcam_stream_handler(State(state): State<AppState>) -> Response {
    match state.registry.get(WEBCAM_ROOM) {
        Some(worker) => mjpeg_response(live_frames(worker)),
        None => mjpeg_response(single_frame(state.placeholder.clone())),
    }
}
