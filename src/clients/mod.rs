//! Boundary clients for the remote authorities the checkout core
//! depends on: coupon validation, the gift card ledger, the order
//! gateway, and the payment provider. Each is a trait so the services
//! stay testable in isolation; the `Http*` implementations speak JSON
//! over reqwest.

pub mod coupons;
pub mod gift_cards;
pub mod orders;
pub mod provider;

pub use coupons::{CouponRejection, CouponResolver, CouponValidation, HttpCouponResolver};
pub use gift_cards::{
    GiftCardLedger, GiftCardRejection, GiftCardValidation, HttpGiftCardLedger,
};
pub use orders::{HttpOrderGateway, OrderGateway};
pub use provider::{HttpPaymentProvider, PaymentProvider};

use std::time::Duration;

pub(crate) const API_KEY_HEADER: &str = "X-Api-Key";

/// Shared reqwest client for all boundary calls. The transport timeout
/// is the only timeout policy; callers treat "no response" like an
/// explicit failure.
pub fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

/// Decodes a JSON body, folding malformed payloads into the boundary
/// error taxonomy.
pub(crate) async fn json_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, crate::errors::ServiceError> {
    response.json::<T>().await.map_err(|e| {
        crate::errors::ServiceError::ExternalServiceError(format!(
            "malformed boundary response: {}",
            e
        ))
    })
}
