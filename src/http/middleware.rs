//! Tower middleware applying a rate limit policy to wrapped handlers.

use axum::http::Request;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::debug;

use super::rejection::{apply_quota_headers, RateLimitRejection};
use crate::ratelimit::{derive_identifier, RateLimiter};

/// Layer that wraps services with [`RateLimitService`].
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    /// Create a layer enforcing `limiter`'s policy.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Middleware that checks the caller's quota before invoking `inner`.
///
/// Rejected requests get a 429 without reaching `inner`. Admitted requests
/// are forwarded untouched, and the quota headers are added to whatever
/// response `inner` returns. Errors from `inner` pass through as-is.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S, B> Service<Request<B>> for RateLimitService<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let identifier = derive_identifier(request.headers());
        let decision = self.limiter.check(&identifier);

        if !decision.allowed {
            let rejection = RateLimitRejection::new(decision, self.limiter.now());
            debug!(
                identifier = %identifier,
                path = %request.uri().path(),
                limit = decision.limit,
                retry_after = rejection.retry_after,
                "Rejecting request over rate limit"
            );
            return Box::pin(async move { Ok(rejection.into_response()) });
        }

        // Use the instance that was polled ready and leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let mut response = inner.call(request).await?;
            apply_quota_headers(&decision, response.headers_mut());
            Ok(response)
        })
    }
}
