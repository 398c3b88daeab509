use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
};
use crate::{
    errors::ApiError,
    models::{BillingInfo, GiftCard},
    services::checkout::CheckoutPhase,
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for session, gift card and settlement endpoints.
pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_session))
        .route("/:id", get(get_session))
        .route("/:id", delete(end_session))
        .route("/:id/gift-card", post(apply_gift_card))
        .route("/:id/gift-card", delete(remove_gift_card))
        .route("/:id/quote", get(get_quote))
        .route("/:id/free-order", post(free_order))
        .route("/:id/provider/orders", post(create_provider_order))
        .route(
            "/:id/provider/orders/:provider_order_id/capture",
            post(capture_provider_order),
        )
        .route("/:id/provider/cancel", post(provider_cancel))
        .route("/:id/provider/error", post(provider_error))
}

#[derive(Debug, Serialize)]
struct SessionCreated {
    session_id: Uuid,
}

#[derive(Debug, Serialize)]
struct SessionView {
    session_id: Uuid,
    phase: CheckoutPhase,
    gift_card: Option<GiftCard>,
}

#[derive(Debug, Deserialize, Validate)]
struct ApplyGiftCardRequest {
    #[validate(length(min = 1, message = "Gift card code must not be empty"))]
    code: String,
}

#[derive(Debug, Deserialize, Validate)]
struct FreeOrderRequest {
    #[validate]
    billing: BillingInfo,
}

#[derive(Debug, Serialize)]
struct ProviderOrderCreated {
    provider_order_id: String,
}

#[derive(Debug, Deserialize, Validate)]
struct CaptureRequest {
    #[validate]
    billing: BillingInfo,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorRequest {
    message: String,
}

/// Open a new checkout session
async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let session = state.sessions.create().await;
    Ok(created_response(SessionCreated {
        session_id: session.id,
    }))
}

/// Get the session's phase and gift card slot
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let session = state.session(id)?;
    Ok(success_response(SessionView {
        session_id: session.id,
        phase: session.checkout.phase(),
        gift_card: session.gift_cards.applied(),
    }))
}

/// Discard a session and its local state
async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .sessions
        .remove(id)
        .ok_or_else(|| ApiError::NotFound(format!("Checkout session {} not found", id)))?;
    Ok(no_content_response())
}

/// Validate a gift card and fill the slot with its live balance
async fn apply_gift_card(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApplyGiftCardRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let session = state.session(id)?;

    let card = session
        .gift_cards
        .apply(&payload.code)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(card))
}

/// Clear the gift card slot
async fn remove_gift_card(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let session = state.session(id)?;
    session.gift_cards.clear().await;
    Ok(no_content_response())
}

/// Derive the current quote from store state
async fn get_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let session = state.session(id)?;
    Ok(success_response(session.checkout.quote()))
}

/// Settle a zero-total checkout through the free-order boundary
async fn free_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FreeOrderRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let session = state.session(id)?;

    let confirmation = session
        .checkout
        .handle_free_order(payload.billing)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(confirmation))
}

/// Provider create hook: register an order for the current total
async fn create_provider_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let session = state.session(id)?;

    let provider_order_id = session
        .checkout
        .create_provider_order()
        .await
        .map_err(map_service_error)?;

    Ok(created_response(ProviderOrderCreated { provider_order_id }))
}

/// Provider approve hook: capture the authorized payment
async fn capture_provider_order(
    State(state): State<Arc<AppState>>,
    Path((id, provider_order_id)): Path<(Uuid, String)>,
    Json(payload): Json<CaptureRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let session = state.session(id)?;

    let confirmation = session
        .checkout
        .capture_provider_order(&provider_order_id, payload.billing)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(confirmation))
}

/// Provider cancel hook
async fn provider_cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let session = state.session(id)?;
    session.checkout.provider_cancelled();
    Ok(no_content_response())
}

/// Provider error hook
async fn provider_error(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProviderErrorRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let session = state.session(id)?;
    session.checkout.provider_errored(&payload.message);
    Ok(no_content_response())
}
