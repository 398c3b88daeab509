use crate::{clients::json_body, errors::ServiceError};
use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Why the ledger authority refused a gift card code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GiftCardRejection {
    Unknown,
    ZeroBalance,
}

impl GiftCardRejection {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Unknown => "This gift card code is not recognized",
            Self::ZeroBalance => "This gift card has no remaining balance",
        }
    }
}

/// Outcome of a gift card validation call.
#[derive(Debug, Clone)]
pub enum GiftCardValidation {
    Valid { balance: Decimal },
    Rejected(GiftCardRejection),
}

/// Remote balance authority for store-credit instruments.
///
/// `redeem` is a debit request. By the time it is issued the settlement
/// has already been decided, so callers treat its failure as
/// log-and-continue, never as a reason to block the order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GiftCardLedger: Send + Sync {
    async fn validate(&self, code: &str) -> Result<GiftCardValidation, ServiceError>;

    async fn redeem(&self, code: &str, amount: Decimal) -> Result<(), ServiceError>;
}

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    balance: Decimal,
}

#[derive(Debug, Serialize)]
struct RedeemRequest<'a> {
    code: &'a str,
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct RejectionResponse {
    reason: GiftCardRejection,
}

#[derive(Debug, Deserialize)]
struct RedeemFailure {
    reason: String,
}

#[derive(Clone)]
pub struct HttpGiftCardLedger {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpGiftCardLedger {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }

    fn request(&self, url: String) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(url);
        if let Some(ref key) = self.api_key {
            builder = builder.header(super::API_KEY_HEADER, key);
        }
        builder
    }
}

#[async_trait]
impl GiftCardLedger for HttpGiftCardLedger {
    #[instrument(skip(self))]
    async fn validate(&self, code: &str) -> Result<GiftCardValidation, ServiceError> {
        let response = self
            .request(format!("{}/gift-cards/validate", self.base_url))
            .json(&ValidateRequest { code })
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let body: ValidateResponse = json_body(response).await?;
                if body.balance <= Decimal::ZERO {
                    // The authority should reject these itself; treat a
                    // zero-balance success as invalid for application.
                    return Ok(GiftCardValidation::Rejected(GiftCardRejection::ZeroBalance));
                }
                Ok(GiftCardValidation::Valid {
                    balance: body.balance,
                })
            }
            StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
                let body: RejectionResponse = json_body(response).await?;
                Ok(GiftCardValidation::Rejected(body.reason))
            }
            status => Err(ServiceError::ExternalServiceError(format!(
                "gift card ledger returned {}",
                status
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn redeem(&self, code: &str, amount: Decimal) -> Result<(), ServiceError> {
        let response = self
            .request(format!("{}/gift-cards/redeem", self.base_url))
            .json(&RedeemRequest { code, amount })
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        let reason = match json_body::<RedeemFailure>(response).await {
            Ok(body) => body.reason,
            Err(_) => "ledger refused the redemption".to_string(),
        };
        Err(ServiceError::ExternalServiceError(reason))
    }
}
