use crate::{
    clients::json_body,
    errors::ServiceError,
    models::{Coupon, DiscountKind},
};
use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Why the remote authority refused a coupon code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    Unknown,
    Expired,
    NotEligible,
    RateLimited,
}

impl CouponRejection {
    /// Buyer-facing message for the rejection.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Unknown => "This coupon code is not recognized",
            Self::Expired => "This coupon code has expired",
            Self::NotEligible => "This coupon is not available for your account",
            Self::RateLimited => "Too many attempts, please try again shortly",
        }
    }
}

/// Outcome of a coupon validation call.
#[derive(Debug, Clone)]
pub enum CouponValidation {
    Valid(Coupon),
    Rejected(CouponRejection),
}

/// Validates promotional codes against the remote coupon authority.
/// Called at most once per explicit apply action, never per keystroke.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CouponResolver: Send + Sync {
    async fn validate<'a>(
        &self,
        code: &str,
        buyer_email: Option<&'a str>,
    ) -> Result<CouponValidation, ServiceError>;
}

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    buyer_email: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    code: String,
    discount_value: Decimal,
    discount_kind: DiscountKind,
}

#[derive(Debug, Deserialize)]
struct RejectionResponse {
    reason: CouponRejection,
}

#[derive(Clone)]
pub struct HttpCouponResolver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCouponResolver {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CouponResolver for HttpCouponResolver {
    #[instrument(skip(self))]
    async fn validate<'a>(
        &self,
        code: &str,
        buyer_email: Option<&'a str>,
    ) -> Result<CouponValidation, ServiceError> {
        let response = self
            .client
            .post(format!("{}/coupons/validate", self.base_url))
            .json(&ValidateRequest { code, buyer_email })
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let body: ValidateResponse = json_body(response).await?;
                // The authority's value is untrusted; a negative value
                // or a percentage above 100 would push the discounted
                // amount outside [0, subtotal].
                let discount_value = match body.discount_kind {
                    DiscountKind::Percentage => body
                        .discount_value
                        .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED),
                    DiscountKind::FixedAmount => body.discount_value.max(Decimal::ZERO),
                };
                Ok(CouponValidation::Valid(Coupon {
                    code: body.code,
                    discount_value,
                    kind: body.discount_kind,
                    auto_applied: false,
                }))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                Ok(CouponValidation::Rejected(CouponRejection::RateLimited))
            }
            StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
                let body: RejectionResponse = json_body(response).await?;
                Ok(CouponValidation::Rejected(body.reason))
            }
            status => Err(ServiceError::ExternalServiceError(format!(
                "coupon authority returned {}",
                status
            ))),
        }
    }
}
