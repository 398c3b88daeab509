#![allow(dead_code)]

//! Scripted boundary fakes and a session harness for integration tests.
//! Each fake pops its next scripted outcome per call, optionally after a
//! delay, and records what it was asked so tests can assert on the exact
//! boundary traffic.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_checkout::clients::{
    CouponResolver, CouponValidation, GiftCardLedger, GiftCardValidation, OrderGateway,
    PaymentProvider,
};
use storefront_checkout::config::StorefrontConfig;
use storefront_checkout::errors::ServiceError;
use storefront_checkout::events::{Event, EventSender};
use storefront_checkout::models::{
    BillingInfo, CartLineItem, LicenseTier, OrderConfirmation, OrderIntent,
};
use storefront_checkout::services::cart::{AddItemInput, CartService};
use storefront_checkout::services::checkout::CheckoutService;
use storefront_checkout::services::gift_card::GiftCardService;

type Script<T> = Mutex<VecDeque<(Duration, Result<T, ServiceError>)>>;

fn pop<T>(script: &Script<T>, what: &str) -> (Duration, Result<T, ServiceError>) {
    script
        .lock()
        .expect("script lock")
        .pop_front()
        .unwrap_or_else(|| panic!("no scripted outcome left for {}", what))
}

#[derive(Default)]
pub struct ScriptedCouponResolver {
    script: Script<CouponValidation>,
    pub calls: AtomicUsize,
}

impl ScriptedCouponResolver {
    pub fn push(&self, outcome: Result<CouponValidation, ServiceError>) {
        self.push_delayed(Duration::ZERO, outcome);
    }

    pub fn push_delayed(&self, delay: Duration, outcome: Result<CouponValidation, ServiceError>) {
        self.script
            .lock()
            .expect("script lock")
            .push_back((delay, outcome));
    }
}

#[async_trait]
impl CouponResolver for ScriptedCouponResolver {
    async fn validate<'a>(
        &self,
        _code: &str,
        _buyer_email: Option<&'a str>,
    ) -> Result<CouponValidation, ServiceError> {
        let (delay, outcome) = pop(&self.script, "coupon validate");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

#[derive(Default)]
pub struct ScriptedGiftCardLedger {
    validate_script: Script<GiftCardValidation>,
    redeem_script: Script<()>,
    pub redemptions: Mutex<Vec<(String, Decimal)>>,
}

impl ScriptedGiftCardLedger {
    pub fn push_validate(&self, outcome: Result<GiftCardValidation, ServiceError>) {
        self.validate_script
            .lock()
            .expect("script lock")
            .push_back((Duration::ZERO, outcome));
    }

    pub fn push_redeem(&self, outcome: Result<(), ServiceError>) {
        self.redeem_script
            .lock()
            .expect("script lock")
            .push_back((Duration::ZERO, outcome));
    }

    pub fn recorded_redemptions(&self) -> Vec<(String, Decimal)> {
        self.redemptions.lock().expect("redemptions lock").clone()
    }
}

#[async_trait]
impl GiftCardLedger for ScriptedGiftCardLedger {
    async fn validate(&self, _code: &str) -> Result<GiftCardValidation, ServiceError> {
        let (_, outcome) = pop(&self.validate_script, "gift card validate");
        outcome
    }

    async fn redeem(&self, code: &str, amount: Decimal) -> Result<(), ServiceError> {
        self.redemptions
            .lock()
            .expect("redemptions lock")
            .push((code.to_string(), amount));
        let (_, outcome) = pop(&self.redeem_script, "gift card redeem");
        outcome
    }
}

#[derive(Default)]
pub struct ScriptedOrderGateway {
    free_order_script: Script<OrderConfirmation>,
    history_script: Script<bool>,
    pub free_order_intents: Mutex<Vec<OrderIntent>>,
    pub history_calls: AtomicUsize,
}

impl ScriptedOrderGateway {
    pub fn push_free_order(&self, outcome: Result<OrderConfirmation, ServiceError>) {
        self.free_order_script
            .lock()
            .expect("script lock")
            .push_back((Duration::ZERO, outcome));
    }

    pub fn push_history(&self, outcome: Result<bool, ServiceError>) {
        self.history_script
            .lock()
            .expect("script lock")
            .push_back((Duration::ZERO, outcome));
    }

    pub fn recorded_intents(&self) -> Vec<OrderIntent> {
        self.free_order_intents
            .lock()
            .expect("intents lock")
            .clone()
    }
}

#[async_trait]
impl OrderGateway for ScriptedOrderGateway {
    async fn create_free_order(
        &self,
        intent: &OrderIntent,
    ) -> Result<OrderConfirmation, ServiceError> {
        self.free_order_intents
            .lock()
            .expect("intents lock")
            .push(intent.clone());
        let (_, outcome) = pop(&self.free_order_script, "free order create");
        outcome
    }

    async fn has_prior_purchase(&self, _email: &str) -> Result<bool, ServiceError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let (_, outcome) = pop(&self.history_script, "purchase history");
        outcome
    }
}

#[derive(Default)]
pub struct ScriptedPaymentProvider {
    create_script: Script<String>,
    capture_script: Script<OrderConfirmation>,
    pub create_intents: Mutex<Vec<OrderIntent>>,
    pub capture_intents: Mutex<Vec<(String, OrderIntent)>>,
}

impl ScriptedPaymentProvider {
    pub fn push_create(&self, outcome: Result<String, ServiceError>) {
        self.push_create_delayed(Duration::ZERO, outcome);
    }

    pub fn push_create_delayed(&self, delay: Duration, outcome: Result<String, ServiceError>) {
        self.create_script
            .lock()
            .expect("script lock")
            .push_back((delay, outcome));
    }

    pub fn push_capture(&self, outcome: Result<OrderConfirmation, ServiceError>) {
        self.capture_script
            .lock()
            .expect("script lock")
            .push_back((Duration::ZERO, outcome));
    }

    pub fn recorded_creates(&self) -> Vec<OrderIntent> {
        self.create_intents.lock().expect("intents lock").clone()
    }

    pub fn recorded_captures(&self) -> Vec<(String, OrderIntent)> {
        self.capture_intents.lock().expect("intents lock").clone()
    }
}

#[async_trait]
impl PaymentProvider for ScriptedPaymentProvider {
    async fn create_order(&self, intent: &OrderIntent) -> Result<String, ServiceError> {
        self.create_intents
            .lock()
            .expect("intents lock")
            .push(intent.clone());
        let (delay, outcome) = pop(&self.create_script, "provider create");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome
    }

    async fn capture_order(
        &self,
        provider_order_id: &str,
        intent: &OrderIntent,
    ) -> Result<OrderConfirmation, ServiceError> {
        self.capture_intents
            .lock()
            .expect("intents lock")
            .push((provider_order_id.to_string(), intent.clone()));
        let (_, outcome) = pop(&self.capture_script, "provider capture");
        outcome
    }
}

/// One checkout session wired to scripted boundaries.
pub struct TestHarness {
    pub cart: Arc<CartService>,
    pub gift_cards: Arc<GiftCardService>,
    pub checkout: Arc<CheckoutService>,
    pub resolver: Arc<ScriptedCouponResolver>,
    pub ledger: Arc<ScriptedGiftCardLedger>,
    pub orders: Arc<ScriptedOrderGateway>,
    pub provider: Arc<ScriptedPaymentProvider>,
    pub events: mpsc::Receiver<Event>,
}

impl TestHarness {
    pub fn new() -> Self {
        let session_id = Uuid::new_v4();
        let config = Arc::new(StorefrontConfig::default());
        let (tx, rx) = mpsc::channel(64);
        let event_sender = Arc::new(EventSender::new(tx));

        let resolver = Arc::new(ScriptedCouponResolver::default());
        let ledger = Arc::new(ScriptedGiftCardLedger::default());
        let orders = Arc::new(ScriptedOrderGateway::default());
        let provider = Arc::new(ScriptedPaymentProvider::default());

        let cart = Arc::new(CartService::new(
            session_id,
            resolver.clone(),
            orders.clone(),
            event_sender.clone(),
            config.clone(),
        ));
        let gift_cards = Arc::new(GiftCardService::new(
            session_id,
            ledger.clone(),
            event_sender.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            session_id,
            cart.clone(),
            gift_cards.clone(),
            ledger.clone(),
            orders.clone(),
            provider.clone(),
            event_sender,
            config,
        ));

        Self {
            cart,
            gift_cards,
            checkout,
            resolver,
            ledger,
            orders,
            provider,
            events: rx,
        }
    }

    /// Drains every event delivered so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn item(name: &str, unit_price: Decimal, quantity: i32) -> AddItemInput {
    AddItemInput {
        product_ref: Uuid::new_v4(),
        name: name.to_string(),
        unit_price,
        quantity,
        license_tier: LicenseTier::Personal,
    }
}

pub fn billing() -> BillingInfo {
    BillingInfo {
        email: "buyer@example.com".to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
    }
}

pub fn only_item(items: &[CartLineItem]) -> &CartLineItem {
    assert_eq!(items.len(), 1, "expected exactly one cart line");
    &items[0]
}
