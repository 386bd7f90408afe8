//! HTTP API gateway for Taskmate.
//!
//! Exposes a health check and the v1 chat and task API. Every `/v1` request must
//! carry `Authorization: Bearer <token>`; the token is resolved to the
//! user the conversation and the tasks belong to.
//!
//! Built on Axum.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::{
    Router,
    extract::State,
    middleware::{self, Next},
    response::Json,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use taskmate_agent::ChatService;
use taskmate_config::{AppConfig, GatewayConfig};
use taskmate_core::event::EventBus;
use taskmate_core::identity::{IdentityResolver, StaticTokenResolver, UserIdentity};
use taskmate_core::task::TaskRepository;

/// Request bodies above this size are rejected.
const BODY_LIMIT_BYTES: usize = 64 * 1024;

/// Who the caller is, as seen by the auth middleware.
#[derive(Clone)]
pub struct AuthState {
    pub resolver: Arc<dyn IdentityResolver>,
    /// Identity used when no tokens are configured at all.
    pub local_user: Option<UserIdentity>,
}

impl AuthState {
    /// Tokens from `[gateway.tokens]`. With none configured every request
    /// runs as a single local user, which is only sensible on loopback.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let resolver = StaticTokenResolver::new(
            config
                .tokens
                .iter()
                .map(|(token, user)| (token.clone(), user.clone())),
        );
        let local_user = resolver.is_empty().then(|| UserIdentity::from("local"));
        Self {
            resolver: Arc::new(resolver),
            local_user,
        }
    }
}

/// Build the full router: `/health` plus the authenticated `/v1` API.
///
/// Layers applied:
/// - Bearer token authentication on all /v1 routes
/// - CORS restricted to the configured origins
/// - Request body size limit
/// - HTTP trace logging
pub fn build_router(
    chat: Arc<ChatService>,
    tasks: Arc<dyn TaskRepository>,
    auth: AuthState,
    config: &GatewayConfig,
) -> Router {
    let v1 = api_v1::v1_router(Arc::new(api_v1::ApiV1State { chat, tasks }))
        .layer(middleware::from_fn_with_state(auth, auth_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors_layer(&config.allowed_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let event_bus = Arc::new(EventBus::default());
    let services = taskmate_agent::build_services(&config, event_bus).await?;
    let auth = AuthState::from_config(&config.gateway);
    if auth.local_user.is_some() {
        warn!("No gateway tokens configured, all requests run as the 'local' user");
    }

    let app = build_router(Arc::new(services.chat), services.tasks, auth, &config.gateway);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Authentication middleware for the /v1 API.
///
/// Resolves `Authorization: Bearer <token>` to a [`UserIdentity`] and puts
/// it in the request extensions for the handlers.
async fn auth_middleware(
    State(auth): State<AuthState>,
    mut req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    let identity = match &auth.local_user {
        Some(local) => Some(local.clone()),
        None => {
            let token = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "));
            match token {
                Some(token) => auth.resolver.resolve(token.trim()).await,
                None => None,
            }
        }
    };

    match identity {
        Some(identity) => {
            req.extensions_mut().insert(identity);
            Ok(next.run(req).await)
        }
        None => {
            warn!("Unauthorized request to /v1 API: missing or invalid bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
