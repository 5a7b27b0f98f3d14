//! Device control API: enrollment, tunnel config, heartbeat/metrics,
//! NAT probing, and session lifecycle as seen by the device agent itself.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::AppError;
use crate::identity;
use crate::nat::StunProbeReport;
use crate::presence::HeartbeatMetrics;
use crate::store::models::ConnectionType;
use crate::topology::TunnelConfig;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub pre_shared_key: String,
    pub public_key: String,
    pub platform: String,
    pub device_name: String,
    pub virtual_network_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub device_id: Uuid,
    pub virtual_ip: std::net::IpAddr,
    pub virtual_network_id: Uuid,
    pub created_at: DateTime<Utc>,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    let rate_key = format!("register:{}", req.pre_shared_key);
    let limit = state.settings.server.register_rate_limit_per_minute;
    let allowed = state.cache.allow(&rate_key, limit, std::time::Duration::from_secs(60)).await?;
    if !allowed {
        return Err(AppError::RateLimited { retry_after_secs: 60 });
    }

    let result = identity::register(
        &state.store,
        &state.ip_pool,
        &req.pre_shared_key,
        &req.public_key,
        &req.platform,
        &req.device_name,
        req.virtual_network_id,
    )
    .await?;

    Ok(Json(RegisterResponse {
        device_id: result.device_id,
        virtual_ip: result.virtual_ip,
        virtual_network_id: req.virtual_network_id,
        created_at: result.created_at,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ConfigQuery {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

fn default_listen_port() -> u16 {
    51820
}

async fn get_config(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    Query(query): Query<ConfigQuery>,
) -> Result<Json<TunnelConfig>, AppError> {
    let config = state.topology.full_config(device_id, query.listen_port).await?;
    Ok(Json(config))
}

async fn metrics(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    Json(metrics): Json<HeartbeatMetrics>,
) -> Result<(), AppError> {
    state.presence.heartbeat(device_id, metrics).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct NatProbeRequest {
    pub nat_type: crate::store::models::NatType,
    pub public_endpoint: String,
}

async fn nat_probe(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    Json(req): Json<NatProbeRequest>,
) -> Result<Json<crate::nat::NatProbeResult>, AppError> {
    let report = StunProbeReport { nat_type: req.nat_type, public_endpoint: req.public_endpoint };
    let result = state.nat.probe(device_id, report).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct SessionStartRequest {
    pub peer_device_id: Uuid,
    pub connection_type: ConnectionType,
}

#[derive(Debug, Serialize)]
pub struct SessionStartResponse {
    pub session_id: Uuid,
}

async fn session_start(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    Json(req): Json<SessionStartRequest>,
) -> Result<Json<SessionStartResponse>, AppError> {
    let session_id = state.presence.session_start(device_id, req.peer_device_id, req.connection_type).await?;
    Ok(Json(SessionStartResponse { session_id }))
}

#[derive(Debug, Deserialize)]
pub struct SessionUpdateRequest {
    pub bytes_sent: i64,
    pub bytes_received: i64,
    pub latency_ms: Option<f64>,
}

async fn session_update(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SessionUpdateRequest>,
) -> Result<(), AppError> {
    state.presence.session_update(session_id, req.bytes_sent, req.bytes_received, req.latency_ms).await?;
    Ok(())
}

async fn session_end(State(state): State<AppState>, Path(session_id): Path<Uuid>) -> Result<(), AppError> {
    state.presence.session_end(session_id).await?;
    Ok(())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/device/register", post(register))
        .route("/api/v1/device/:id/config", get(get_config))
        .route("/api/v1/device/:id/metrics", post(metrics))
        .route("/api/v1/device/:id/nat/probe", post(nat_probe))
        .route("/api/v1/device/:id/sessions", post(session_start))
        .route("/api/v1/sessions/:id/update", post(session_update))
        .route("/api/v1/sessions/:id/end", post(session_end))
}
