//! Admin API authentication.
//!
//! A static bearer-token check lives behind a trait so a real
//! implementation (per-org tokens, OIDC, ...) can replace it without
//! touching the routes that depend on it.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use std::sync::Arc;
use async_trait::async_trait;

use crate::app_state::AppState;

pub trait AdminAuthenticator: Send + Sync {
    fn authenticate(&self, bearer_token: Option<&str>) -> bool;
}

/// Single shared-secret implementation, read from `MESHCTL_ADMIN_TOKEN`.
/// An empty or unset token rejects every request rather than disabling
/// auth, since that's the only way the admin surface is ever reachable.
pub struct StaticTokenAuthenticator {
    expected: Option<String>,
}

impl StaticTokenAuthenticator {
    pub fn from_env() -> Self {
        let expected = std::env::var("MESHCTL_ADMIN_TOKEN").ok().filter(|t| !t.is_empty());
        if expected.is_none() {
            tracing::warn!("MESHCTL_ADMIN_TOKEN not configured, admin API is unreachable");
        }
        Self { expected }
    }
}

impl AdminAuthenticator for StaticTokenAuthenticator {
    fn authenticate(&self, bearer_token: Option<&str>) -> bool {
        match (&self.expected, bearer_token) {
            (Some(expected), Some(given)) => subtle::ConstantTimeEq::ct_eq(expected.as_bytes(), given.as_bytes()).into(),
            _ => false,
        }
    }
}

/// Extractor that rejects the request before the handler body runs if the
/// `Authorization: Bearer <token>` header doesn't satisfy the configured
/// `AdminAuthenticator`.
pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if state.admin_auth.authenticate(token) {
            Ok(AdminAuth)
        } else {
            Err((StatusCode::UNAUTHORIZED, "invalid or missing admin token"))
        }
    }
}

pub type SharedAuthenticator = Arc<dyn AdminAuthenticator>;
