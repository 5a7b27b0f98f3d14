//! Device enrollment & identity.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::ip_pool::IpPoolManager;
use crate::store::devices::NewDevice;
use crate::store::models::Device;
use crate::store::Store;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum EnrollError {
    #[error("invalid pre-shared key")]
    InvalidPsk,
    #[error("pre-shared key is expired or exhausted")]
    PskExhaustedOrExpired,
    #[error("public key already enrolled")]
    DuplicatePublicKey,
    #[error("virtual network not found")]
    VirtualNetworkNotFound,
    #[error("ip pool exhausted")]
    IpPoolExhausted,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

pub struct EnrollmentResult {
    pub device_id: Uuid,
    pub virtual_ip: std::net::IpAddr,
    pub created_at: chrono::DateTime<Utc>,
}

/// Hash a freshly presented PSK secret against `salt`.
///
/// Every PSK row carries its own random `salt`, so compromising one
/// PSK's hash does not help forge another's.
pub fn hash_psk(secret: &str, salt: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(salt).expect("HMAC accepts any key length");
    mac.update(secret.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Presented PSKs are formatted `<psk-id>.<secret>` so the row can be
/// looked up directly instead of scanning every active PSK's salt.
fn parse_presented_psk(presented: &str) -> Option<(Uuid, &str)> {
    let (id, secret) = presented.split_once('.')?;
    let id = Uuid::parse_str(id).ok()?;
    Some((id, secret))
}

/// `register(pre_shared_key, public_key, platform, device_name, virtual_network_id)`
/// enrolls a new device against a presented PSK.
pub async fn register(
    store: &Store,
    ip_pool: &IpPoolManager,
    presented_psk: &str,
    public_key: &str,
    platform: &str,
    device_name: &str,
    virtual_network_id: Uuid,
) -> Result<EnrollmentResult, EnrollError> {
    let (psk_id, secret) = parse_presented_psk(presented_psk).ok_or(EnrollError::InvalidPsk)?;

    let psk = store
        .get_psk(psk_id)
        .await?
        .ok_or(EnrollError::InvalidPsk)?;

    let now = Utc::now();
    if !psk.is_valid(now) {
        return Err(EnrollError::PskExhaustedOrExpired);
    }

    let expected_hash = hash_psk(secret, &psk.salt);
    if !constant_time_eq(&expected_hash, &psk.key_hash) {
        return Err(EnrollError::InvalidPsk);
    }

    if store.find_device_by_public_key(public_key).await?.is_some() {
        return Err(EnrollError::DuplicatePublicKey);
    }

    let network = store
        .get_virtual_network(virtual_network_id)
        .await?
        .ok_or(EnrollError::VirtualNetworkNotFound)?;

    // The in-memory pool can race with another instance; on a
    // UNIQUE-constraint conflict the address really is taken (just not by
    // us), so we leave it marked allocated and retry with the next one
    // instead of releasing it back to the free set.
    const MAX_ATTEMPTS: u32 = 8;
    let mut device = None;
    for _ in 0..MAX_ATTEMPTS {
        let virtual_ip = ip_pool
            .allocate(store, network.id, network.cidr)
            .await
            .map_err(|_| EnrollError::IpPoolExhausted)?;

        match store
            .insert_device(NewDevice {
                virtual_network_id: network.id,
                name: device_name,
                platform,
                public_key,
                virtual_ip: ipnetwork::IpNetwork::from(virtual_ip),
            })
            .await
        {
            Ok(d) => {
                device = Some(d);
                break;
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::warn!(ip = %virtual_ip, "ip allocation raced with another instance, retrying");
                continue;
            }
            Err(e) => {
                ip_pool.release(network.id, virtual_ip).await;
                return Err(EnrollError::Store(e));
            }
        }
    }
    let device = device.ok_or(EnrollError::IpPoolExhausted)?;

    // Best-effort: a failed increment is logged, not rolled back.
    if let Err(e) = store.increment_psk_usage(psk.id).await {
        tracing::warn!(error = %e, psk_id = %psk.id, "failed to record psk usage");
    }

    Ok(EnrollmentResult {
        device_id: device.id,
        virtual_ip: device.virtual_ip.ip(),
        created_at: now,
    })
}

pub fn device_summary(device: &Device) -> (Uuid, std::net::IpAddr) {
    (device.id, device.virtual_ip.ip())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e.as_database_error(), Some(db) if db.code().as_deref() == Some("23505"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_psk_is_deterministic_for_the_same_secret_and_salt() {
        let a = hash_psk("super-secret", b"salt-a");
        let b = hash_psk("super-secret", b"salt-a");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_psk_differs_when_secret_or_salt_changes() {
        let base = hash_psk("super-secret", b"salt-a");
        assert_ne!(base, hash_psk("different-secret", b"salt-a"));
        assert_ne!(base, hash_psk("super-secret", b"salt-b"));
    }

    #[test]
    fn constant_time_eq_matches_equal_slices() {
        assert!(constant_time_eq(b"abc123", b"abc123"));
    }

    #[test]
    fn constant_time_eq_rejects_mismatched_slices() {
        assert!(!constant_time_eq(b"abc123", b"abc124"));
        assert!(!constant_time_eq(b"abc123", b"abc12"));
    }

    #[test]
    fn parse_presented_psk_splits_id_and_secret() {
        let id = Uuid::new_v4();
        let presented = format!("{id}.the-secret-part");
        let (parsed_id, secret) = parse_presented_psk(&presented).expect("should parse");
        assert_eq!(parsed_id, id);
        assert_eq!(secret, "the-secret-part");
    }

    #[test]
    fn parse_presented_psk_allows_dots_in_the_secret() {
        let id = Uuid::new_v4();
        let presented = format!("{id}.part.one.part.two");
        let (parsed_id, secret) = parse_presented_psk(&presented).expect("should parse");
        assert_eq!(parsed_id, id);
        assert_eq!(secret, "part.one.part.two");
    }

    #[test]
    fn parse_presented_psk_rejects_malformed_input() {
        assert!(parse_presented_psk("not-a-uuid.secret").is_none());
        assert!(parse_presented_psk("no-separator-at-all").is_none());
    }
}
