//! HTTP mapping contract for `AppError`: status codes and the
//! `{error_code, message, retry_after}` JSON body shape.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use meshctl::error::AppError;
use serde_json::Value;

async fn json_body(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("collect body").to_bytes();
    (status, serde_json::from_slice(&bytes).expect("body is valid json"))
}

#[tokio::test]
async fn duplicate_public_key_is_a_409_conflict() {
    let (status, body) = json_body(AppError::DuplicatePublicKey.into_response()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "duplicate_public_key");
}

#[tokio::test]
async fn ip_pool_exhausted_is_a_422() {
    let (status, body) = json_body(AppError::IpPoolExhausted.into_response()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_code"], "ip_pool_exhausted");
}

#[tokio::test]
async fn bad_request_carries_its_message_through() {
    let (status, body) = json_body(AppError::BadRequest("cidr must be a /24 or smaller".to_string()).into_response()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_code"], "bad_request");
    assert!(body["message"].as_str().unwrap().contains("cidr"));
}

#[tokio::test]
async fn unauthorized_is_a_401() {
    let (status, body) = json_body(AppError::Unauthorized.into_response()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "unauthorized");
}

#[tokio::test]
async fn rate_limited_is_a_429_and_carries_retry_after() {
    let (status, body) = json_body(AppError::RateLimited { retry_after_secs: 15 }.into_response()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error_code"], "rate_limited");
    assert_eq!(body["retry_after"], 15);
}

#[tokio::test]
async fn alert_not_found_is_a_404() {
    let (status, body) = json_body(AppError::AlertNotFound.into_response()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "alert_not_found");
}
