//! Admin API: device/alert/audit management and dashboard stats, gated
//! behind `AdminAuth` on every route.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::security::AdminAuth;
use crate::app_state::AppState;
use crate::error::AppError;
use crate::nat::matrix::TraversalMethod;
use crate::store::devices::{DistributionRow, TrendPoint};
use crate::store::models::{Alert, AlertStatus, AuditLogEntry, Device};
use crate::topology::PeerView;

#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    #[serde(default = "default_trend_days")]
    pub days: i32,
}

fn default_trend_days() -> i32 {
    14
}

async fn list_devices(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(network_id): Path<Uuid>,
) -> Result<Json<Vec<Device>>, AppError> {
    let devices = state.store.list_devices(network_id).await?;
    Ok(Json(devices))
}

async fn get_device(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
) -> Result<Json<Device>, AppError> {
    let device = state.store.get_device(device_id).await?.ok_or(AppError::DeviceNotFound)?;
    Ok(Json(device))
}

async fn delete_device(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
) -> Result<(), AppError> {
    let device = state.store.get_device(device_id).await?.ok_or(AppError::DeviceNotFound)?;
    state.store.revoke_device(device_id).await?;
    state.ip_pool.release(device.virtual_network_id, device.virtual_ip.ip()).await;
    state.topology.invalidate_for_device_change(device.virtual_network_id, &device).await;
    state
        .store
        .append_audit_log(
            device.virtual_network_id,
            "admin",
            "device.revoke",
            "device",
            &device.id.to_string(),
            serde_json::Value::Null,
        )
        .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ListAlertsQuery {
    pub status: Option<AlertStatus>,
}

async fn list_alerts(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<ListAlertsQuery>,
) -> Result<Json<Vec<Alert>>, AppError> {
    let alerts = state.store.list_alerts(org_id, query.status).await?;
    Ok(Json(alerts))
}

async fn get_alert(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> Result<Json<Alert>, AppError> {
    let alert = state.store.get_alert(alert_id).await?.ok_or(AppError::AlertNotFound)?;
    Ok(Json(alert))
}

async fn acknowledge_alert(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> Result<Json<Alert>, AppError> {
    let alert = state.alerts.acknowledge(alert_id).await?;
    Ok(Json(alert))
}

async fn resolve_alert(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> Result<Json<Alert>, AppError> {
    let alert = state.alerts.resolve(alert_id).await?;
    Ok(Json(alert))
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    #[serde(default = "default_audit_limit")]
    pub limit: i64,
}

fn default_audit_limit() -> i64 {
    100
}

async fn list_audit_logs(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    let logs = state.store.list_audit_logs(org_id, query.limit).await?;
    Ok(Json(logs))
}

async fn topology_devices(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(network_id): Path<Uuid>,
) -> Result<Json<Vec<Device>>, AppError> {
    let devices = state.store.list_online_devices(network_id).await?;
    Ok(Json(devices))
}

async fn topology_peers(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
) -> Result<Json<Vec<PeerView>>, AppError> {
    let peers = state.topology.peers(device_id).await?;
    Ok(Json(peers))
}

#[derive(Debug, Serialize)]
pub struct CoordinatePairResponse {
    pub method: TraversalMethod,
    pub endpoint_a: Option<String>,
    pub endpoint_b: Option<String>,
    pub turn_allocation: Option<crate::nat::turn::TurnAllocation>,
}

async fn coordinate_pair(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path((device_a, device_b)): Path<(Uuid, Uuid)>,
) -> Result<Json<CoordinatePairResponse>, AppError> {
    let result = state.nat.coordinate(device_a, device_b).await?;
    Ok(Json(CoordinatePairResponse {
        method: result.method,
        endpoint_a: result.endpoint_a,
        endpoint_b: result.endpoint_b,
        turn_allocation: result.turn_allocation,
    }))
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_devices: usize,
    pub online_devices: usize,
    pub active_alerts: usize,
    pub connected_clients: usize,
}

async fn dashboard_stats(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(network_id): Path<Uuid>,
) -> Result<Json<DashboardStats>, AppError> {
    let devices = state.store.list_devices(network_id).await?;
    let online = devices.iter().filter(|d| d.online).count();
    let network = state.store.get_virtual_network(network_id).await?.ok_or(AppError::VirtualNetworkNotFound)?;
    let alerts = state.store.list_alerts(network.org_id, Some(AlertStatus::Active)).await?;
    Ok(Json(DashboardStats {
        total_devices: devices.len(),
        online_devices: online,
        active_alerts: alerts.len(),
        connected_clients: state.bus.client_count(),
    }))
}

async fn device_trend_stats(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(network_id): Path<Uuid>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Vec<TrendPoint>>, AppError> {
    let trend = state.store.device_trend(network_id, query.days).await?;
    Ok(Json(trend))
}

async fn traffic_stats(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(network_id): Path<Uuid>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Vec<TrendPoint>>, AppError> {
    let trend = state.store.traffic_trend(network_id, query.days).await?;
    Ok(Json(trend))
}

async fn distribution_stats(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(network_id): Path<Uuid>,
) -> Result<Json<Vec<DistributionRow>>, AppError> {
    let distribution = state.store.platform_distribution(network_id).await?;
    Ok(Json(distribution))
}

async fn alert_trend_stats(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Vec<TrendPoint>>, AppError> {
    let trend = state.store.alert_trend(org_id, query.days).await?;
    Ok(Json(trend))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/admin/networks/:network_id/devices", get(list_devices))
        .route("/api/v1/admin/devices/:id", get(get_device).delete(delete_device))
        .route("/api/v1/admin/orgs/:org_id/alerts", get(list_alerts))
        .route("/api/v1/admin/alerts/:id", get(get_alert))
        .route("/api/v1/admin/alerts/:id/acknowledge", post(acknowledge_alert))
        .route("/api/v1/admin/alerts/:id/resolve", post(resolve_alert))
        .route("/api/v1/admin/orgs/:org_id/audit-logs", get(list_audit_logs))
        .route("/api/v1/admin/networks/:network_id/topology/devices", get(topology_devices))
        .route("/api/v1/admin/devices/:id/topology/peers", get(topology_peers))
        .route("/api/v1/admin/devices/:a/:b/coordinate", get(coordinate_pair))
        .route("/api/v1/admin/networks/:network_id/stats/dashboard", get(dashboard_stats))
        .route("/api/v1/admin/networks/:network_id/stats/device-trend", get(device_trend_stats))
        .route("/api/v1/admin/networks/:network_id/stats/traffic", get(traffic_stats))
        .route("/api/v1/admin/networks/:network_id/stats/distribution", get(distribution_stats))
        .route("/api/v1/admin/orgs/:org_id/stats/alert-trend", get(alert_trend_stats))
}
