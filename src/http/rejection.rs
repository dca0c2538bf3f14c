//! Quota headers and the 429 rejection response.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::ratelimit::Decision;

/// Header carrying the policy quota.
pub static LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Header carrying the quota left in the current window.
pub static REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Header carrying the RFC 3339 time at which the window resets.
pub static RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Attach the quota metadata of `decision` to a response's headers.
pub fn apply_quota_headers(decision: &Decision, headers: &mut HeaderMap) {
    headers.insert(LIMIT_HEADER.clone(), HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER.clone(), HeaderValue::from(decision.remaining));
    if let Ok(reset) = HeaderValue::from_str(&format_reset(decision.reset_time)) {
        headers.insert(RESET_HEADER.clone(), reset);
    }
}

fn format_reset(reset_time: DateTime<Utc>) -> String {
    reset_time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A request turned away because its identifier is over quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRejection {
    /// The decision that rejected the request
    pub decision: Decision,
    /// Whole seconds the client should wait before retrying
    pub retry_after: u64,
}

impl RateLimitRejection {
    /// Build a rejection for `decision`, computing the retry delay from `now`.
    pub fn new(decision: Decision, now: DateTime<Utc>) -> Self {
        Self {
            decision,
            retry_after: decision.retry_after_secs(now),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectionBody {
    error: &'static str,
    message: String,
    retry_after: u64,
    limit: u32,
    remaining: u32,
    reset_time: DateTime<Utc>,
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        let body = RejectionBody {
            error: "Too many requests",
            message: format!(
                "Rate limit exceeded. Please try again in {} seconds.",
                self.retry_after
            ),
            retry_after: self.retry_after,
            limit: self.decision.limit,
            remaining: self.decision.remaining,
            reset_time: self.decision.reset_time,
        };

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        apply_quota_headers(&self.decision, headers);
        headers.insert(header::RETRY_AFTER, HeaderValue::from(self.retry_after));
        response
    }
}
