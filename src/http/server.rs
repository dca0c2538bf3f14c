//! HTTP server implementation.

use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::service::{check, health, list_policies, AppState};
use crate::error::{Result, SketchguardError};
use crate::ratelimit::policy::GENERAL;
use crate::ratelimit::PolicySet;

/// HTTP server for the rate limit service.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The named limiters
    policies: PolicySet,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, policies: PolicySet) -> Self {
        Self { addr, policies }
    }

    /// Build the router.
    ///
    /// `/health` is never limited. The policy listing is guarded by the
    /// `general` policy when one is registered. `/v1/check` charges only the
    /// policy named in its body.
    pub fn router(&self) -> Router {
        let mut list = get(list_policies);
        if let Some(layer) = self.policies.layer(GENERAL) {
            list = list.route_layer(layer);
        }

        Router::new()
            .route("/health", get(health))
            .route("/v1/policies", list)
            .route("/v1/check", post(check))
            .layer(TraceLayer::new_for_http())
            .with_state(AppState::new(self.policies.clone()))
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server");

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                SketchguardError::Server(e.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitingConfig;
    use crate::http::rejection::{LIMIT_HEADER, REMAINING_HEADER};
    use crate::ratelimit::Policy;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn server(general_max: u32) -> HttpServer {
        let mut config = RateLimitingConfig::default();
        config.policies.insert(
            GENERAL.to_string(),
            Policy {
                window_ms: 60_000,
                max_requests: general_max,
            },
        );
        let policies = PolicySet::from_config(&config).unwrap();
        HttpServer::new("127.0.0.1:0".parse().unwrap(), policies)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn check_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/check")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_is_not_limited() {
        let app = server(1).router();

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(Request::get("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(!response.headers().contains_key(&LIMIT_HEADER));
        }
    }

    #[tokio::test]
    async fn test_list_policies() {
        let app = server(10).router();

        let response = app
            .oneshot(Request::get("/v1/policies").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[&LIMIT_HEADER], "10");

        let body = json_body(response).await;
        let policies = body["policies"].as_array().unwrap();
        assert_eq!(policies.len(), 4);
        assert_eq!(policies[0]["name"], "auth");
        assert_eq!(policies[0]["windowMs"], 900_000);
        assert_eq!(policies[0]["maxRequests"], 5);
    }

    #[tokio::test]
    async fn test_check_endpoint_reports_decision() {
        let app = server(100).router();

        let mut last = serde_json::Value::Null;
        for _ in 0..6 {
            let response = app
                .clone()
                .oneshot(check_request(
                    r#"{"policy":"auth","identifier":"10.0.0.9:123"}"#,
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            last = json_body(response).await;
        }

        assert_eq!(last["allowed"], false);
        assert_eq!(last["limit"], 5);
        assert_eq!(last["remaining"], 0);
        assert!(last["resetTime"].is_string());
    }

    #[tokio::test]
    async fn test_check_endpoint_headers_follow_checked_policy() {
        let app = server(100).router();

        let response = app
            .oneshot(check_request(
                r#"{"policy":"like","identifier":"10.0.0.9:123"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.headers()[&LIMIT_HEADER], "30");
        assert_eq!(response.headers()[&REMAINING_HEADER], "29");
    }

    #[tokio::test]
    async fn test_check_endpoint_unknown_policy() {
        let app = server(100).router();

        let response = app
            .oneshot(check_request(r#"{"policy":"nope","identifier":"x"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_guarded_by_general_policy() {
        let app = server(2).router();

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(Request::get("/v1/policies").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(Request::get("/v1/policies").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_server_binds_and_shuts_down() {
        let server = server(10);
        server.serve_with_shutdown(async {}).await.unwrap();
    }
}
