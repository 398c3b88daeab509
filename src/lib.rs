pub mod clients;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod services;
pub mod sessions;

use axum::{routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::StorefrontConfig;
use crate::errors::ApiError;
use crate::events::EventSender;
use crate::sessions::{CheckoutSessions, Session};

/// Shared application state for handlers.
pub struct AppState {
    pub config: Arc<StorefrontConfig>,
    pub event_sender: Arc<EventSender>,
    pub sessions: Arc<CheckoutSessions>,
}

impl AppState {
    /// Looks up a checkout session or maps the miss to a 404.
    pub fn session(&self, id: Uuid) -> Result<Arc<Session>, ApiError> {
        self.sessions
            .get(id)
            .ok_or_else(|| ApiError::NotFound(format!("Checkout session {} not found", id)))
    }
}

// Common response wrappers
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Builds the `/api/v1` route tree.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    let sessions = handlers::checkout::checkout_routes()
        .nest("/:id/cart", handlers::cart::cart_routes());

    Router::new()
        .nest("/checkout/sessions", sessions)
        .route("/status", get(api_status))
        .route("/health", get(health_check))
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "service": "storefront-checkout",
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    Ok(Json(ApiResponse::success(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))))
}

pub async fn request_logging_middleware(
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    tracing::info!(method = %method, uri = %uri, "Incoming request");

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = status.as_u16(),
        elapsed_ms = duration.as_millis() as u64,
        "Request completed"
    );

    response
}
