use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the cart, gift card, and checkout services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartItemAdded {
        session_id: Uuid,
        product_ref: Uuid,
    },
    CartItemRemoved {
        session_id: Uuid,
        product_ref: Uuid,
    },
    CartCleared(Uuid),

    // Coupon events
    CouponApplied {
        session_id: Uuid,
        code: String,
        auto_applied: bool,
    },
    CouponRemoved {
        session_id: Uuid,
    },

    // Gift card events
    GiftCardApplied {
        session_id: Uuid,
        balance: Decimal,
    },
    GiftCardRemoved {
        session_id: Uuid,
    },
    /// The ledger debit failed after settlement was already decided.
    /// Logged for reconciliation; never blocks the order.
    GiftCardRedemptionFailed {
        session_id: Uuid,
        amount: Decimal,
        reason: String,
    },

    // Checkout events
    CheckoutSessionCreated(Uuid),
    OrderCompleted {
        session_id: Uuid,
        order_id: String,
        total: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

/// Drains the event channel, logging each event. Spawned once in main.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::GiftCardRedemptionFailed {
                session_id,
                amount,
                reason,
            } => {
                // Reconciliation signal: the order went through but the debit did not.
                warn!(
                    session_id = %session_id,
                    amount = %amount,
                    reason = %reason,
                    "Gift card redemption failed after settlement"
                );
            }
            other => info!(event = ?other, "Event processed"),
        }
    }
    info!("Event channel closed; processor exiting");
}
