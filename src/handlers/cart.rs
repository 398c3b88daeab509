use crate::handlers::common::{map_service_error, no_content_response, success_response, validate_input};
use crate::{
    errors::ApiError,
    models::{CartLineItem, Coupon, LicenseTier, LineItemKey},
    services::cart::{AddItemInput, CouponOutcome},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    routing::{delete, get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for cart endpoints, nested under a session id.
pub fn cart_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/:product_ref/:license_tier", put(update_item))
        .route("/items/:product_ref/:license_tier", delete(remove_item))
        .route("/clear", post(clear_cart))
        .route("/coupon", post(apply_coupon))
        .route("/coupon", delete(remove_coupon))
        .route("/auto-coupon", post(check_auto_coupon))
}

#[derive(Debug, Serialize)]
struct CartView {
    items: Vec<CartLineItem>,
    subtotal: Decimal,
    coupon: Option<Coupon>,
    coupon_validating: bool,
}

#[derive(Debug, Deserialize, Validate)]
struct AddItemRequest {
    product_ref: Uuid,
    #[validate(length(min = 1, message = "Item name must not be empty"))]
    name: String,
    unit_price: Decimal,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    quantity: i32,
    license_tier: LicenseTier,
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateQuantityRequest {
    quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
struct ApplyCouponRequest {
    #[validate(length(min = 1, message = "Coupon code must not be empty"))]
    code: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
struct AutoCouponRequest {
    #[validate(email(message = "A valid email is required"))]
    email: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ApplyCouponResponse {
    Applied { coupon: Coupon },
    Rejected { reason: String },
    Superseded,
}

fn cart_view(session: &crate::sessions::Session) -> CartView {
    CartView {
        items: session.cart.items(),
        subtotal: session.cart.subtotal(),
        coupon: session.cart.coupon(),
        coupon_validating: session.cart.is_validating_coupon(),
    }
}

/// Get cart contents with the coupon slot state
async fn get_cart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let session = state.session(id)?;
    Ok(success_response(cart_view(&session)))
}

/// Add an item, merging with an existing line on the same key
async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let session = state.session(id)?;

    session
        .cart
        .add_item(AddItemInput {
            product_ref: payload.product_ref,
            name: payload.name,
            unit_price: payload.unit_price,
            quantity: payload.quantity,
            license_tier: payload.license_tier,
        })
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart_view(&session)))
}

/// Set the quantity of one line item
async fn update_item(
    State(state): State<Arc<AppState>>,
    Path((id, product_ref, license_tier)): Path<(Uuid, Uuid, LicenseTier)>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let session = state.session(id)?;

    session
        .cart
        .update_quantity(
            LineItemKey {
                product_ref,
                license_tier,
            },
            payload.quantity,
        )
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart_view(&session)))
}

/// Remove one line item
async fn remove_item(
    State(state): State<Arc<AppState>>,
    Path((id, product_ref, license_tier)): Path<(Uuid, Uuid, LicenseTier)>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let session = state.session(id)?;

    session
        .cart
        .remove_item(LineItemKey {
            product_ref,
            license_tier,
        })
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart_view(&session)))
}

/// Clear all items; the coupon and gift card slots are untouched
async fn clear_cart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let session = state.session(id)?;
    session.cart.clear().await;
    Ok(no_content_response())
}

/// Apply a coupon code, replacing any held coupon on success
async fn apply_coupon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApplyCouponRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let session = state.session(id)?;

    let outcome = session
        .cart
        .apply_coupon(&payload.code, payload.email.as_deref())
        .await
        .map_err(map_service_error)?;

    let response = match outcome {
        CouponOutcome::Applied(coupon) => ApplyCouponResponse::Applied { coupon },
        CouponOutcome::Rejected(rejection) => ApplyCouponResponse::Rejected {
            reason: rejection.message().to_string(),
        },
        CouponOutcome::Superseded => ApplyCouponResponse::Superseded,
    };

    Ok(success_response(response))
}

/// Remove the held coupon unconditionally
async fn remove_coupon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let session = state.session(id)?;
    session.cart.remove_coupon().await;
    Ok(no_content_response())
}

/// Evaluate first-time-buyer eligibility for an email and attach the
/// welcome coupon when the slot is empty
async fn check_auto_coupon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AutoCouponRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    let session = state.session(id)?;

    session
        .cart
        .check_first_time_buyer(&payload.email)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart_view(&session)))
}
