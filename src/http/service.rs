//! HTTP handlers for the rate limit service.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::rejection::apply_quota_headers;
use crate::ratelimit::PolicySet;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The named limiters of this process
    pub policies: PolicySet,
}

impl AppState {
    /// Create handler state over `policies`.
    pub fn new(policies: PolicySet) -> Self {
        Self { policies }
    }
}

/// Errors returned by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request was malformed
    #[error("{0}")]
    InvalidArgument(String),

    /// No policy is registered under the requested name
    #[error("unknown policy: {0}")]
    UnknownPolicy(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownPolicy(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// One entry of the policy listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySummary {
    /// Name the policy is registered under
    pub name: String,
    /// Length of the window in milliseconds
    pub window_ms: u64,
    /// Number of requests admitted per window
    pub max_requests: u32,
}

/// Body of an explicit quota check.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// Name of the policy to charge
    pub policy: String,
    /// Client identifier to charge
    pub identifier: String,
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "sketchguard" }))
}

/// `GET /v1/policies`
pub async fn list_policies(State(state): State<AppState>) -> Json<serde_json::Value> {
    let policies: Vec<PolicySummary> = state
        .policies
        .policies()
        .map(|(name, policy)| PolicySummary {
            name: name.to_string(),
            window_ms: policy.window_ms,
            max_requests: policy.max_requests,
        })
        .collect();
    Json(json!({ "policies": policies }))
}

/// `POST /v1/check`
///
/// Charges one request against `identifier` under `policy` and reports the
/// decision. Over-quota decisions are still a 200; the caller reads
/// `allowed` from the body.
#[instrument(skip_all, fields(policy = %request.policy))]
pub async fn check(
    State(state): State<AppState>,
    Json(request): Json<CheckRequest>,
) -> Result<Response, ApiError> {
    if request.policy.is_empty() {
        warn!("Received check with empty policy");
        return Err(ApiError::InvalidArgument("policy is required".to_string()));
    }
    if request.identifier.is_empty() {
        warn!("Received check with empty identifier");
        return Err(ApiError::InvalidArgument(
            "identifier is required".to_string(),
        ));
    }

    let limiter = state
        .policies
        .get(&request.policy)
        .ok_or_else(|| ApiError::UnknownPolicy(request.policy.clone()))?;

    let decision = limiter.check(&request.identifier);
    debug!(
        identifier = %request.identifier,
        allowed = decision.allowed,
        remaining = decision.remaining,
        "Rate limit decision made"
    );

    let mut response = Json(decision).into_response();
    apply_quota_headers(&decision, response.headers_mut());
    Ok(response)
}
