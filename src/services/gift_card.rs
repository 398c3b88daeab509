use crate::{
    clients::{GiftCardLedger, GiftCardValidation},
    errors::ServiceError,
    events::{Event, EventSender},
    models::GiftCard,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, instrument};
use uuid::Uuid;

/// Gift Card Slot: holds at most one applied store-credit instrument,
/// independent of the cart's coupon. The balance kept here is a
/// snapshot taken at validation time; the ledger authority remains
/// ground truth for the actual debit at redemption.
pub struct GiftCardService {
    session_id: Uuid,
    applied: Mutex<Option<GiftCard>>,
    ledger: Arc<dyn GiftCardLedger>,
    event_sender: Arc<EventSender>,
}

impl GiftCardService {
    pub fn new(
        session_id: Uuid,
        ledger: Arc<dyn GiftCardLedger>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            session_id,
            applied: Mutex::new(None),
            ledger,
            event_sender,
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<GiftCard>> {
        self.applied.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validates a code against the ledger and, on success, occupies
    /// the slot, overwriting any previously applied card. Rejections
    /// (unknown code, zero balance) leave the slot untouched.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn apply(&self, code: &str) -> Result<GiftCard, ServiceError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "Gift card code must not be empty".to_string(),
            ));
        }

        match self.ledger.validate(code).await? {
            GiftCardValidation::Valid { balance } => {
                let card = GiftCard {
                    code: code.to_string(),
                    balance,
                };
                *self.lock_slot() = Some(card.clone());

                self.event_sender
                    .send_or_log(Event::GiftCardApplied {
                        session_id: self.session_id,
                        balance,
                    })
                    .await;

                info!(balance = %balance, "Gift card applied");
                Ok(card)
            }
            GiftCardValidation::Rejected(rejection) => Err(ServiceError::GiftCardRejected(
                rejection.message().to_string(),
            )),
        }
    }

    /// Empties the slot.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn clear(&self) {
        let had_card = self.lock_slot().take().is_some();

        if had_card {
            self.event_sender
                .send_or_log(Event::GiftCardRemoved {
                    session_id: self.session_id,
                })
                .await;
        }
    }

    /// The currently applied card, if any.
    pub fn applied(&self) -> Option<GiftCard> {
        self.lock_slot().clone()
    }
}
