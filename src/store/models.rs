//! Relational entity types.

use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub slug: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct VirtualNetwork {
    pub id: Uuid,
    pub org_id: Uuid,
    pub cidr: IpNetwork,
    pub gateway_ip: Option<IpNetwork>,
    pub dns_servers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NatType {
    None,
    FullCone,
    RestrictedCone,
    PortRestrictedCone,
    Symmetric,
    Unknown,
}

impl Default for NatType {
    fn default() -> Self {
        NatType::Unknown
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub virtual_network_id: Uuid,
    pub name: String,
    pub platform: String,
    pub public_key: String,
    pub virtual_ip: IpNetwork,
    pub public_endpoint: Option<String>,
    pub nat_type: NatType,
    pub online: bool,
    pub last_seen_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PskStatus {
    Active,
    Revoked,
    Expired,
    Exhausted,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PreSharedKey {
    pub id: Uuid,
    pub org_id: Uuid,
    pub key_hash: Vec<u8>,
    pub salt: Vec<u8>,
    pub max_uses: i32,
    pub used_count: i32,
    pub expires_at: DateTime<Utc>,
    pub status: PskStatus,
}

impl PreSharedKey {
    /// Valid only while active, unexpired, and under its use cap:
    /// `status=active ∧ expires_at > now ∧ used_count < max_uses`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.status == PskStatus::Active && self.expires_at > now && self.used_count < self.max_uses
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    P2pDirect,
    TurnRelay,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub device_a_id: Uuid,
    pub device_b_id: Uuid,
    pub connection_type: ConnectionType,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub bytes_sent: i64,
    pub bytes_received: i64,
    pub avg_latency_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn priority(self) -> u8 {
        match self {
            Severity::Critical => 1,
            Severity::High => 2,
            Severity::Medium => 3,
            Severity::Low => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub org_id: Uuid,
    pub device_id: Option<Uuid>,
    pub severity: Severity,
    #[sqlx(rename = "alert_type")]
    pub r#type: String,
    pub title: String,
    pub message: String,
    pub status: AlertStatus,
    pub metadata: serde_json::Value,
    pub occurrence_count: i32,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_notified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub org_id: Uuid,
    pub actor: String,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
