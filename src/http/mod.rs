//! HTTP integration: rate limit middleware, rejection responses and the
//! service endpoints.

mod middleware;
mod rejection;
mod server;
mod service;

pub use middleware::{RateLimitLayer, RateLimitService};
pub use rejection::{
    apply_quota_headers, RateLimitRejection, LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER,
};
pub use server::HttpServer;
pub use service::{ApiError, AppState, CheckRequest, PolicySummary};
