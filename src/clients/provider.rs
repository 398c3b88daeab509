use crate::{
    clients::json_body,
    errors::ServiceError,
    models::{OrderConfirmation, OrderIntent},
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

/// Payment-provider order lifecycle: create an order for the payable
/// amount, then capture it once the buyer has authorized payment
/// out-of-band. Errors and cancellations in between are surfaced
/// through the orchestrator's cancel/error hooks, not this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Returns the provider's order identifier.
    async fn create_order(&self, intent: &OrderIntent) -> Result<String, ServiceError>;

    /// Captures a previously authorized provider order.
    async fn capture_order(
        &self,
        provider_order_id: &str,
        intent: &OrderIntent,
    ) -> Result<OrderConfirmation, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    provider_order_id: String,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct FailureResponse {
    message: String,
}

#[derive(Clone)]
pub struct HttpPaymentProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPaymentProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn failure_message(response: reqwest::Response) -> String {
        let status = response.status();
        match json_body::<FailureResponse>(response).await {
            Ok(body) => body.message,
            Err(_) => format!("payment provider returned {}", status),
        }
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    #[instrument(skip(self, intent))]
    async fn create_order(&self, intent: &OrderIntent) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(format!("{}/checkout/orders", self.base_url))
            .json(intent)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: CreateOrderResponse = json_body(response).await?;
            return Ok(body.provider_order_id);
        }

        if status.is_client_error() {
            return Err(ServiceError::PaymentFailed(
                Self::failure_message(response).await,
            ));
        }
        Err(ServiceError::ExternalServiceError(format!(
            "payment provider returned {}",
            status
        )))
    }

    #[instrument(skip(self, intent))]
    async fn capture_order(
        &self,
        provider_order_id: &str,
        intent: &OrderIntent,
    ) -> Result<OrderConfirmation, ServiceError> {
        let response = self
            .client
            .post(format!(
                "{}/checkout/orders/{}/capture",
                self.base_url, provider_order_id
            ))
            .json(intent)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: CaptureResponse = json_body(response).await?;
            return Ok(OrderConfirmation {
                order_id: body.order_id,
            });
        }

        if status.is_client_error() {
            return Err(ServiceError::PaymentFailed(
                Self::failure_message(response).await,
            ));
        }
        Err(ServiceError::ExternalServiceError(format!(
            "payment provider returned {}",
            status
        )))
    }
}
