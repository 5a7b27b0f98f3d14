//! Machine-coded error taxonomy shared across the control plane.
//!
//! Every layer returns its own `thiserror` enum; handlers at the API
//! boundary (see `api::mod`) map those down to `AppError`, which is the
//! only error type that knows how to render an HTTP response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::alerts::AlertError;
use crate::identity::EnrollError;
use crate::ip_pool::IpPoolError;
use crate::nat::NatError;
use crate::presence::PresenceError;
use crate::topology::TopologyError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid pre-shared key")]
    InvalidPsk,
    #[error("pre-shared key is expired or exhausted")]
    PskExhaustedOrExpired,
    #[error("public key already enrolled")]
    DuplicatePublicKey,
    #[error("virtual network not found")]
    VirtualNetworkNotFound,
    #[error("device not found")]
    DeviceNotFound,
    #[error("alert not found")]
    AlertNotFound,
    #[error("ip pool exhausted")]
    IpPoolExhausted,
    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<EnrollError> for AppError {
    fn from(e: EnrollError) -> Self {
        match e {
            EnrollError::InvalidPsk => AppError::InvalidPsk,
            EnrollError::PskExhaustedOrExpired => AppError::PskExhaustedOrExpired,
            EnrollError::DuplicatePublicKey => AppError::DuplicatePublicKey,
            EnrollError::VirtualNetworkNotFound => AppError::VirtualNetworkNotFound,
            EnrollError::IpPoolExhausted => AppError::IpPoolExhausted,
            EnrollError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<IpPoolError> for AppError {
    fn from(e: IpPoolError) -> Self {
        match e {
            IpPoolError::PoolExhausted => AppError::IpPoolExhausted,
            IpPoolError::InvalidCidr(msg) => AppError::BadRequest(msg),
            IpPoolError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<TopologyError> for AppError {
    fn from(e: TopologyError) -> Self {
        match e {
            TopologyError::DeviceNotFound => AppError::DeviceNotFound,
            TopologyError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<PresenceError> for AppError {
    fn from(e: PresenceError) -> Self {
        match e {
            PresenceError::DeviceNotFound => AppError::DeviceNotFound,
            PresenceError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<NatError> for AppError {
    fn from(e: NatError) -> Self {
        match e {
            NatError::DeviceNotFound => AppError::DeviceNotFound,
            NatError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<AlertError> for AppError {
    fn from(e: AlertError) -> Self {
        match e {
            AlertError::NotFound => AppError::AlertNotFound,
            AlertError::Store(e) => AppError::Store(e),
            AlertError::Cache(e) => AppError::Internal(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error_code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl AppError {
    fn code_and_status(&self) -> (&'static str, StatusCode) {
        match self {
            AppError::InvalidPsk => ("invalid_psk", StatusCode::UNAUTHORIZED),
            AppError::PskExhaustedOrExpired => {
                ("psk_exhausted_or_expired", StatusCode::UNAUTHORIZED)
            }
            AppError::DuplicatePublicKey => ("duplicate_public_key", StatusCode::CONFLICT),
            AppError::VirtualNetworkNotFound => {
                ("virtual_network_not_found", StatusCode::NOT_FOUND)
            }
            AppError::DeviceNotFound => ("device_not_found", StatusCode::NOT_FOUND),
            AppError::AlertNotFound => ("alert_not_found", StatusCode::NOT_FOUND),
            AppError::IpPoolExhausted => ("ip_pool_exhausted", StatusCode::UNPROCESSABLE_ENTITY),
            AppError::RateLimited { .. } => ("rate_limited", StatusCode::TOO_MANY_REQUESTS),
            AppError::BadRequest(_) => ("bad_request", StatusCode::UNPROCESSABLE_ENTITY),
            AppError::Unauthorized => ("unauthorized", StatusCode::UNAUTHORIZED),
            AppError::Store(_) | AppError::Cache(_) | AppError::Internal(_) => {
                ("internal_error", StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, AppError::Store(_) | AppError::Cache(_) | AppError::Internal(_)) {
            tracing::error!(error = %self, "request failed");
        }
        let (code, status) = self.code_and_status();
        let retry_after = match &self {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        let body = ErrorBody {
            error_code: code,
            message: self.to_string(),
            retry_after,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.expect("collect body").to_bytes();
        serde_json::from_slice(&bytes).expect("error body is valid json")
    }

    #[test]
    fn rate_limited_maps_to_429_with_retry_after() {
        let (code, status) = AppError::RateLimited { retry_after_secs: 60 }.code_and_status();
        assert_eq!(code, "rate_limited");
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn store_and_cache_and_internal_all_collapse_to_internal_error() {
        let store = AppError::Store(sqlx::Error::RowNotFound);
        assert_eq!(store.code_and_status().0, "internal_error");
        assert_eq!(store.code_and_status().1, StatusCode::INTERNAL_SERVER_ERROR);

        let internal = AppError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(internal.code_and_status(), ("internal_error", StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn device_not_found_maps_to_404() {
        assert_eq!(AppError::DeviceNotFound.code_and_status(), ("device_not_found", StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn rate_limited_response_body_carries_retry_after() {
        let response = (AppError::RateLimited { retry_after_secs: 42 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(response).await;
        assert_eq!(json["error_code"], "rate_limited");
        assert_eq!(json["retry_after"], 42);
    }

    #[tokio::test]
    async fn non_rate_limited_response_omits_retry_after() {
        let response = AppError::InvalidPsk.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error_code"], "invalid_psk");
        assert!(json.get("retry_after").is_none());
    }
}
