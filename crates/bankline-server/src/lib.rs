//! Bankline Web Server
//!
//! Axum-based REST API exposing bank linking, sync and disconnect for the
//! budgeting front end.
//!
//! Security features:
//! - API key authentication (secure by default, use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Sanitized error responses (provider details only for upstream failures)

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use bankline_core::{BankSync, Database};

mod handlers;

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Reachable without credentials: liveness probe and the provider's browser redirect
const PUBLIC_PATHS: &[&str] = &["/api/health", "/api/bank/callback"];

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// API keys accepted as "Bearer <key>" in the Authorization header
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    /// `None` when provider credentials are missing; bank routes answer 503
    pub sync: Option<BankSync>,
    /// Why `sync` is unavailable
    pub sync_unavailable: Option<String>,
}

impl AppState {
    /// The sync service, or a 503 explaining why it is not configured
    pub fn sync(&self) -> Result<&BankSync, AppError> {
        self.sync.as_ref().ok_or_else(|| {
            AppError::service_unavailable(
                "Bank provider not configured",
                self.sync_unavailable.clone(),
            )
        })
    }
}

/// Authentication middleware - validates API keys
///
/// **API keys**: Compared using constant-time comparison to prevent timing attacks.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth || PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid API key");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured keys in constant time
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();
    valid_keys.iter().any(|key| {
        let key_bytes = key.as_bytes();
        provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes))
    })
}

/// Parse a comma-separated list of API keys (as found in `BANKLINE_API_KEYS`)
pub fn parse_api_keys(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Create the application router, wiring the provider from the environment
pub fn create_router(db: Database, config: ServerConfig) -> Router {
    let (sync, sync_unavailable) = match BankSync::from_env(Arc::new(db.clone())) {
        Ok(sync) => {
            info!("Bank provider configured: {}", sync.config().base_url);
            (Some(sync), None)
        }
        Err(e) => {
            warn!("⚠️  Bank provider not configured: {}", e);
            (None, Some(e.to_string()))
        }
    };
    create_router_with_sync(db, sync, sync_unavailable, config)
}

/// Create the application router around an explicit sync service (for testing)
pub fn create_router_with_sync(
    db: Database,
    sync: Option<BankSync>,
    sync_unavailable: Option<String>,
    config: ServerConfig,
) -> Router {
    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        sync,
        sync_unavailable,
    });

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        // Bank linking and sync
        .route("/bank/connect", post(handlers::connect_bank))
        .route("/bank/items", post(handlers::list_bank_items))
        .route("/bank/sync", post(handlers::sync_bank))
        .route("/bank/disconnect", post(handlers::disconnect_bank))
        .route("/bank/callback", get(handlers::bank_callback))
        // Stored state
        .route(
            "/users/:user_id/connections",
            get(handlers::list_connections),
        )
        .route(
            "/users/:user_id/transactions",
            get(handlers::list_transactions).post(handlers::add_transaction),
        );

    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server
pub async fn serve(db: Database, host: &str, port: u16) -> anyhow::Result<()> {
    serve_with_config(db, host, port, ServerConfig::default()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    } else if config.api_keys.is_empty() {
        warn!("⚠️  No API keys configured - every authenticated route will answer 401");
    }

    let app = create_router(db, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    details: Option<serde_json::Value>,
    internal: Option<anyhow::Error>,
}

impl AppError {
    fn new(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            message: msg.to_string(),
            details: None,
            internal: None,
        }
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn conflict(msg: &str) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }

    pub fn service_unavailable(msg: &str, details: Option<String>) -> Self {
        Self {
            details: details.map(serde_json::Value::String),
            ..Self::new(StatusCode::SERVICE_UNAVAILABLE, msg)
        }
    }

    /// Map a core error onto a response, keeping provider details for upstream failures
    pub fn from_core(err: bankline_core::Error) -> Self {
        use bankline_core::Error;

        match err {
            Error::Configuration(msg) => {
                Self::service_unavailable("Bank provider not configured", Some(msg))
            }
            Error::Upstream { status, body }
            | Error::NotFound { status, body }
            | Error::Conflict { status, body } => {
                // Provider bodies are JSON; fall back to the raw text
                let body = serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));
                Self {
                    details: Some(serde_json::json!({ "status": status, "body": body })),
                    ..Self::new(StatusCode::BAD_GATEWAY, "Bank provider request failed")
                }
            }
            Error::Http(e) => Self {
                internal: Some(e.into()),
                ..Self::new(StatusCode::BAD_GATEWAY, "Bank provider unreachable")
            },
            Error::SyncInProgress(_) => Self::conflict("A sync is already running for this user"),
            Error::InvalidData(msg) => Self::bad_request(&msg),
            other => other.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let mut body = serde_json::json!({
            "error": self.message
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }

        (self.status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            details: None,
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
