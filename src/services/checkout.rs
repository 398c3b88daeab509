use crate::{
    clients::{GiftCardLedger, OrderGateway, PaymentProvider},
    config::StorefrontConfig,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{BillingInfo, CheckoutQuote, OrderConfirmation, OrderIntent},
    services::{cart::CartService, gift_card::GiftCardService, pricing},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Where the checkout session currently stands. Informational only;
/// settlement exclusion is enforced by the guard, not by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutPhase {
    Building,
    Settling,
    Completed,
}

/// Exclusive settlement token. Acquired with a synchronous
/// compare-exchange before any boundary call begins and released on
/// drop, so every exit path (early return, `?`, panic unwind)
/// releases it. A losing caller gets `SettlementInProgress` without
/// issuing a second OrderIntent.
struct SettlementGuard {
    flag: Arc<AtomicBool>,
}

impl SettlementGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, ServiceError> {
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Ok(Self { flag: flag.clone() })
        } else {
            Err(ServiceError::SettlementInProgress)
        }
    }
}

impl Drop for SettlementGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Checkout Orchestrator: composes the Cart Aggregate and Gift Card
/// Slot into one payable amount, selects the settlement path, and
/// drives the order boundaries.
///
/// The payable amount is recomputed from store state at every decision
/// point, in particular at the moment the provider `create` hook fires
/// rather than at session creation, so coupon and gift card changes
/// between quote and click cannot produce a stale total.
pub struct CheckoutService {
    session_id: Uuid,
    cart: Arc<CartService>,
    gift_cards: Arc<GiftCardService>,
    ledger: Arc<dyn GiftCardLedger>,
    orders: Arc<dyn OrderGateway>,
    provider: Arc<dyn PaymentProvider>,
    event_sender: Arc<EventSender>,
    config: Arc<StorefrontConfig>,
    settling: Arc<AtomicBool>,
    phase: Mutex<CheckoutPhase>,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: Uuid,
        cart: Arc<CartService>,
        gift_cards: Arc<GiftCardService>,
        ledger: Arc<dyn GiftCardLedger>,
        orders: Arc<dyn OrderGateway>,
        provider: Arc<dyn PaymentProvider>,
        event_sender: Arc<EventSender>,
        config: Arc<StorefrontConfig>,
    ) -> Self {
        Self {
            session_id,
            cart,
            gift_cards,
            ledger,
            orders,
            provider,
            event_sender,
            config,
            settling: Arc::new(AtomicBool::new(false)),
            phase: Mutex::new(CheckoutPhase::Building),
        }
    }

    pub fn phase(&self) -> CheckoutPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: CheckoutPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    /// Derives the payable amount from current store state. Never
    /// cached; called fresh on every render and every settlement hook.
    pub fn quote(&self) -> CheckoutQuote {
        pricing::compute_quote(
            &self.cart.items(),
            self.cart.coupon().as_ref(),
            self.gift_cards.applied().as_ref(),
        )
    }

    fn build_intent(&self, quote: &CheckoutQuote, billing: Option<BillingInfo>) -> OrderIntent {
        let gift_card = self.gift_cards.applied();
        let gift_card_amount =
            (quote.gift_card_discount > Decimal::ZERO).then_some(quote.gift_card_discount);

        OrderIntent {
            items: self.cart.items(),
            billing,
            total_amount: quote.total,
            currency: self.config.currency.clone(),
            coupon_code: self.cart.coupon().map(|c| c.code),
            gift_card_code: gift_card.filter(|_| gift_card_amount.is_some()).map(|c| c.code),
            gift_card_amount,
        }
    }

    /// Best-effort ledger debit, awaited only so the outcome can be
    /// logged. By the time this runs the settlement has already been
    /// decided, so a failure must not strand the order; it is recorded
    /// for reconciliation instead.
    async fn redeem_gift_card(&self, quote: &CheckoutQuote) {
        if quote.gift_card_discount <= Decimal::ZERO {
            return;
        }
        let Some(card) = self.gift_cards.applied() else {
            return;
        };

        match self
            .ledger
            .redeem(&card.code, quote.gift_card_discount)
            .await
        {
            Ok(()) => info!(amount = %quote.gift_card_discount, "Gift card redeemed"),
            Err(e) => {
                warn!(amount = %quote.gift_card_discount, error = %e, "Gift card redemption failed");
                self.event_sender
                    .send_or_log(Event::GiftCardRedemptionFailed {
                        session_id: self.session_id,
                        amount: quote.gift_card_discount,
                        reason: e.to_string(),
                    })
                    .await;
            }
        }
    }

    async fn finalize(&self, confirmation: &OrderConfirmation, total: Decimal) {
        self.cart.clear().await;
        self.cart.remove_coupon().await;
        self.gift_cards.clear().await;
        self.set_phase(CheckoutPhase::Completed);

        self.event_sender
            .send_or_log(Event::OrderCompleted {
                session_id: self.session_id,
                order_id: confirmation.order_id.clone(),
                total,
            })
            .await;

        info!(order_id = %confirmation.order_id, "Order completed");
    }

    /// Settles a fully discounted checkout through the free-order
    /// boundary. On failure the local stores are deliberately left
    /// intact so the buyer can retry without re-entering anything.
    #[instrument(skip(self, billing), fields(session_id = %self.session_id))]
    pub async fn handle_free_order(
        &self,
        billing: BillingInfo,
    ) -> Result<OrderConfirmation, ServiceError> {
        billing.validate()?;

        let _guard = SettlementGuard::acquire(&self.settling)?;
        self.set_phase(CheckoutPhase::Settling);

        let result = self.free_order_inner(billing).await;
        if result.is_err() {
            self.set_phase(CheckoutPhase::Building);
        }
        result
    }

    async fn free_order_inner(
        &self,
        billing: BillingInfo,
    ) -> Result<OrderConfirmation, ServiceError> {
        let quote = self.quote();
        let items = self.cart.items();
        if items.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }
        if quote.total != Decimal::ZERO {
            return Err(ServiceError::InvalidOperation(
                "Order total is not zero; settle through the payment provider".to_string(),
            ));
        }

        // Initiated before the finalizing boundary call; its outcome
        // never gates the order.
        self.redeem_gift_card(&quote).await;

        let intent = self.build_intent(&quote, Some(billing));
        let confirmation = self.orders.create_free_order(&intent).await?;

        self.finalize(&confirmation, quote.total).await;
        Ok(confirmation)
    }

    /// Provider `create` hook: builds an OrderIntent with the total as
    /// it stands right now and registers it with the payment provider.
    /// Returns the provider's order identifier for the approval leg.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn create_provider_order(&self) -> Result<String, ServiceError> {
        let _guard = SettlementGuard::acquire(&self.settling)?;

        let quote = self.quote();
        if self.cart.items().is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }
        if quote.total == Decimal::ZERO {
            return Err(ServiceError::InvalidOperation(
                "Order total is zero; settle through the free-order path".to_string(),
            ));
        }

        let intent = self.build_intent(&quote, None);
        self.provider.create_order(&intent).await
    }

    /// Provider `approve` hook, fired after the buyer authorizes
    /// payment out-of-band. Redemption runs first and is non-fatal:
    /// the payment is already authorized, so a ledger hiccup must not
    /// strand it. The capture boundary then finalizes the order.
    ///
    /// A capture failure leaves the stores intact and the provider-side
    /// authorization standing; that authorization may need manual
    /// reconciliation since this client does not void it.
    #[instrument(skip(self, billing), fields(session_id = %self.session_id))]
    pub async fn capture_provider_order(
        &self,
        provider_order_id: &str,
        billing: BillingInfo,
    ) -> Result<OrderConfirmation, ServiceError> {
        billing.validate()?;

        let _guard = SettlementGuard::acquire(&self.settling)?;
        self.set_phase(CheckoutPhase::Settling);

        let result = self.capture_inner(provider_order_id, billing).await;
        if result.is_err() {
            self.set_phase(CheckoutPhase::Building);
        }
        result
    }

    async fn capture_inner(
        &self,
        provider_order_id: &str,
        billing: BillingInfo,
    ) -> Result<OrderConfirmation, ServiceError> {
        let quote = self.quote();

        self.redeem_gift_card(&quote).await;

        let intent = self.build_intent(&quote, Some(billing));
        let confirmation = self
            .provider
            .capture_order(provider_order_id, &intent)
            .await?;

        self.finalize(&confirmation, quote.total).await;
        Ok(confirmation)
    }

    /// Provider cancel hook: the buyer backed out. No store mutation.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub fn provider_cancelled(&self) {
        info!("Provider checkout cancelled by buyer");
        self.set_phase(CheckoutPhase::Building);
    }

    /// Provider error hook: surfaced to the buyer upstream. No store
    /// mutation.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub fn provider_errored(&self, message: &str) {
        warn!(message = %message, "Provider checkout error");
        self.set_phase(CheckoutPhase::Building);
    }
}
