use crate::middleware::{api_key_middleware, AuthConfig, API_KEY_HEADER};
use crate::routes;
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_mw,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use taskmesh_orchestrator::Runtime;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// HTTP surface settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Allowed CORS origin, `*` for any.
    pub cors_origin: String,
    /// API key check for `/api` routes.
    pub auth: AuthConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cors_origin: "*".to_string(),
            auth: AuthConfig::default(),
        }
    }
}

/// The HTTP gateway.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the router over a running runtime.
    ///
    /// `/health` is always open; `/api` routes go through the API key check
    /// when keys are configured.
    pub fn build(runtime: Arc<Runtime>, config: GatewayConfig) -> Router {
        let auth = Arc::new(config.auth);
        if auth.is_enabled() {
            info!(keys = auth.api_keys.len(), "API key authentication enabled");
        }

        let api = Router::new()
            .route("/api/agents", get(routes::list_agents))
            .route("/api/agents/register", post(routes::register_agent))
            .route(
                "/api/agents/{id}",
                get(routes::get_agent).delete(routes::unregister_agent),
            )
            .route("/api/agents/{id}/status", get(routes::agent_status))
            .route("/api/tasks", post(routes::create_task).get(routes::list_tasks))
            .route("/api/tasks/metrics", get(routes::task_metrics))
            .route("/api/tasks/{id}", get(routes::get_task))
            .route("/api/tasks/{id}/status", patch(routes::update_task_status))
            .route("/api/system/status", get(routes::system_status))
            .route_layer(axum_mw::from_fn_with_state(auth, api_key_middleware));

        Router::new()
            .route("/health", get(routes::health))
            .merge(api)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(build_cors_layer(&config.cors_origin)),
            )
            .with_state(runtime)
    }
}

/// Build the CORS layer for the configured origin.
///
/// `*` allows every origin. An origin that is not a valid header value
/// disables cross-origin access.
pub fn build_cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(API_KEY_HEADER),
        ]);

    if origin == "*" {
        return cors.allow_origin(Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => {
            info!(origin = %origin, "CORS restricted to configured origin");
            cors.allow_origin(value)
        }
        Err(e) => {
            warn!(origin = %origin, error = %e, "Invalid CORS origin, cross-origin requests disabled");
            cors
        }
    }
}
