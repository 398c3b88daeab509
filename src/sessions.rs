//! Checkout session registry.
//!
//! Each session bundles a Cart Aggregate, a Gift Card Slot, and a
//! Checkout Orchestrator wired to the shared boundary clients, keyed
//! by a server-issued UUID.

use crate::{
    clients::{CouponResolver, GiftCardLedger, OrderGateway, PaymentProvider},
    config::StorefrontConfig,
    events::{Event, EventSender},
    services::{cart::CartService, checkout::CheckoutService, gift_card::GiftCardService},
};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// One buyer's checkout state.
pub struct Session {
    pub id: Uuid,
    pub cart: Arc<CartService>,
    pub gift_cards: Arc<GiftCardService>,
    pub checkout: Arc<CheckoutService>,
}

/// Shared boundary clients injected into every session.
#[derive(Clone)]
pub struct Boundaries {
    pub coupons: Arc<dyn CouponResolver>,
    pub gift_cards: Arc<dyn GiftCardLedger>,
    pub orders: Arc<dyn OrderGateway>,
    pub provider: Arc<dyn PaymentProvider>,
}

pub struct CheckoutSessions {
    sessions: DashMap<Uuid, Arc<Session>>,
    boundaries: Boundaries,
    event_sender: Arc<EventSender>,
    config: Arc<StorefrontConfig>,
}

impl CheckoutSessions {
    pub fn new(
        boundaries: Boundaries,
        event_sender: Arc<EventSender>,
        config: Arc<StorefrontConfig>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            boundaries,
            event_sender,
            config,
        }
    }

    pub async fn create(&self) -> Arc<Session> {
        let id = Uuid::new_v4();

        let cart = Arc::new(CartService::new(
            id,
            self.boundaries.coupons.clone(),
            self.boundaries.orders.clone(),
            self.event_sender.clone(),
            self.config.clone(),
        ));
        let gift_cards = Arc::new(GiftCardService::new(
            id,
            self.boundaries.gift_cards.clone(),
            self.event_sender.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            id,
            cart.clone(),
            gift_cards.clone(),
            self.boundaries.gift_cards.clone(),
            self.boundaries.orders.clone(),
            self.boundaries.provider.clone(),
            self.event_sender.clone(),
            self.config.clone(),
        ));

        let session = Arc::new(Session {
            id,
            cart,
            gift_cards,
            checkout,
        });
        self.sessions.insert(id, session.clone());

        info!(session_id = %id, "Checkout session created");
        self.event_sender
            .send_or_log(Event::CheckoutSessionCreated(id))
            .await;

        session
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.remove(&id).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
