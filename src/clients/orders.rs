use crate::{
    clients::json_body,
    errors::ServiceError,
    models::{OrderConfirmation, OrderIntent},
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

/// Order-creation boundary. Orders are persisted remotely; this crate
/// only issues requests and interprets the response.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Creates an order whose payable total is zero (fully discounted).
    async fn create_free_order(
        &self,
        intent: &OrderIntent,
    ) -> Result<OrderConfirmation, ServiceError>;

    /// Whether this identity has completed a purchase before. Feeds the
    /// first-time-buyer auto-coupon policy.
    async fn has_prior_purchase(&self, email: &str) -> Result<bool, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct PurchaseHistoryResponse {
    has_purchased: bool,
}

#[derive(Debug, Deserialize)]
struct FailureResponse {
    message: String,
}

#[derive(Clone)]
pub struct HttpOrderGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpOrderGateway {
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

    fn with_key(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => builder.header(super::API_KEY_HEADER, key),
            None => builder,
        }
    }
}

#[async_trait]
impl OrderGateway for HttpOrderGateway {
    #[instrument(skip(self, intent))]
    async fn create_free_order(
        &self,
        intent: &OrderIntent,
    ) -> Result<OrderConfirmation, ServiceError> {
        let response = self
            .with_key(self.client.post(format!("{}/orders/free", self.base_url)))
            .json(intent)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: CreateOrderResponse = json_body(response).await?;
            return Ok(OrderConfirmation {
                order_id: body.order_id,
            });
        }

        if status.is_client_error() {
            let message = match json_body::<FailureResponse>(response).await {
                Ok(body) => body.message,
                Err(_) => format!("order boundary rejected the request ({})", status),
            };
            return Err(ServiceError::InvalidOperation(message));
        }

        Err(ServiceError::ExternalServiceError(format!(
            "order boundary returned {}",
            status
        )))
    }

    #[instrument(skip(self))]
    async fn has_prior_purchase(&self, email: &str) -> Result<bool, ServiceError> {
        let response = self
            .with_key(
                self.client
                    .get(format!("{}/customers/purchase-history", self.base_url))
                    .query(&[("email", email)]),
            )
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "purchase history lookup returned {}",
                response.status()
            )));
        }

        let body: PurchaseHistoryResponse = json_body(response).await?;
        Ok(body.has_purchased)
    }
}
