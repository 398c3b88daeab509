use crate::{
    clients::{CouponRejection, CouponResolver, CouponValidation, OrderGateway},
    config::StorefrontConfig,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{CartLineItem, Coupon, DiscountKind, LicenseTier, LineItemKey},
    services::pricing,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Cart Aggregate: line items plus the single coupon slot, owned by one
/// checkout session.
///
/// The aggregate is an injectable state container with a narrow
/// mutation API; derived values (subtotal, discount) are recomputed on
/// every read rather than cached. Locks are never held across an
/// `.await`, so interleaved coupon validations cannot corrupt state:
/// each apply takes a monotonically increasing attempt token before the
/// resolver call and only the latest-initiated attempt's resolution may
/// mutate the slot.
pub struct CartService {
    session_id: Uuid,
    state: Mutex<CartState>,
    coupon_attempt: AtomicU64,
    validating: AtomicBool,
    /// identity -> first-purchase eligibility, evaluated at most once
    /// per identity per session
    evaluated_identities: Mutex<HashMap<String, bool>>,
    resolver: Arc<dyn CouponResolver>,
    orders: Arc<dyn OrderGateway>,
    event_sender: Arc<EventSender>,
    config: Arc<StorefrontConfig>,
}

#[derive(Debug, Default)]
struct CartState {
    items: Vec<CartLineItem>,
    coupon: Option<Coupon>,
}

/// Input for adding an item to the cart
#[derive(Debug, Clone, Deserialize)]
pub struct AddItemInput {
    pub product_ref: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub license_tier: LicenseTier,
}

/// Resolution of one coupon apply attempt.
#[derive(Debug, Clone)]
pub enum CouponOutcome {
    Applied(Coupon),
    Rejected(CouponRejection),
    /// A newer apply was initiated while this one was in flight; its
    /// resolution was discarded without touching the slot.
    Superseded,
}

impl CartService {
    pub fn new(
        session_id: Uuid,
        resolver: Arc<dyn CouponResolver>,
        orders: Arc<dyn OrderGateway>,
        event_sender: Arc<EventSender>,
        config: Arc<StorefrontConfig>,
    ) -> Self {
        Self {
            session_id,
            state: Mutex::new(CartState::default()),
            coupon_attempt: AtomicU64::new(0),
            validating: AtomicBool::new(false),
            evaluated_identities: Mutex::new(HashMap::new()),
            resolver,
            orders,
            event_sender,
            config,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an item, merging by `(product_ref, license_tier)` key:
    /// re-adding an existing key increments its quantity.
    #[instrument(skip(self, input), fields(session_id = %self.session_id))]
    pub async fn add_item(&self, input: AddItemInput) -> Result<Vec<CartLineItem>, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }
        if input.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Unit price must not be negative".to_string(),
            ));
        }

        let product_ref = input.product_ref;
        let items = {
            let mut state = self.lock_state();
            let key = LineItemKey {
                product_ref: input.product_ref,
                license_tier: input.license_tier,
            };
            match state.items.iter_mut().find(|item| item.key() == key) {
                Some(existing) => {
                    existing.quantity = existing
                        .quantity
                        .checked_add(input.quantity)
                        .ok_or_else(|| {
                            ServiceError::ValidationError(
                                "Quantity exceeds the supported maximum".to_string(),
                            )
                        })?;
                }
                None => state.items.push(CartLineItem {
                    product_ref: input.product_ref,
                    name: input.name,
                    unit_price: input.unit_price,
                    quantity: input.quantity,
                    license_tier: input.license_tier,
                }),
            }
            state.items.clone()
        };

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                session_id: self.session_id,
                product_ref,
            })
            .await;

        Ok(items)
    }

    /// Sets a line's quantity; zero or below removes the line entirely.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn update_quantity(
        &self,
        key: LineItemKey,
        quantity: i32,
    ) -> Result<Vec<CartLineItem>, ServiceError> {
        if quantity <= 0 {
            return self.remove_item(key).await;
        }

        let items = {
            let mut state = self.lock_state();
            let item = state
                .items
                .iter_mut()
                .find(|item| item.key() == key)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Cart item {} not found", key.product_ref))
                })?;
            item.quantity = quantity;
            state.items.clone()
        };

        Ok(items)
    }

    /// Removes a line regardless of quantity.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn remove_item(&self, key: LineItemKey) -> Result<Vec<CartLineItem>, ServiceError> {
        let items = {
            let mut state = self.lock_state();
            let before = state.items.len();
            state.items.retain(|item| item.key() != key);
            if state.items.len() == before {
                return Err(ServiceError::NotFound(format!(
                    "Cart item {} not found",
                    key.product_ref
                )));
            }
            state.items.clone()
        };

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                session_id: self.session_id,
                product_ref: key.product_ref,
            })
            .await;

        Ok(items)
    }

    /// Snapshot of current line items.
    pub fn items(&self) -> Vec<CartLineItem> {
        self.lock_state().items.clone()
    }

    pub fn subtotal(&self) -> Decimal {
        pricing::subtotal(&self.lock_state().items)
    }

    pub fn coupon(&self) -> Option<Coupon> {
        self.lock_state().coupon.clone()
    }

    /// Coupon discount against the current subtotal.
    pub fn discount(&self) -> Decimal {
        let state = self.lock_state();
        pricing::coupon_discount(pricing::subtotal(&state.items), state.coupon.as_ref())
    }

    /// True while the most recently initiated apply is unresolved.
    /// Callers disable the apply trigger on this.
    pub fn is_validating_coupon(&self) -> bool {
        self.validating.load(Ordering::SeqCst)
    }

    /// Validates a code against the coupon authority and, on success,
    /// stores it, replacing whatever occupied the slot, auto-applied
    /// or not. Rejections leave the slot untouched.
    ///
    /// Safe to call while a previous apply is in flight: only the most
    /// recently initiated attempt may mutate the slot, so a stale
    /// resolution (success or failure) is discarded as `Superseded`.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn apply_coupon(
        &self,
        code: &str,
        identity_hint: Option<&str>,
    ) -> Result<CouponOutcome, ServiceError> {
        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "Coupon code must not be empty".to_string(),
            ));
        }

        // Token taken before the call; no await sits between this and
        // the validating flag.
        let token = self.coupon_attempt.fetch_add(1, Ordering::SeqCst) + 1;
        self.validating.store(true, Ordering::SeqCst);

        let result = self.resolver.validate(&code, identity_hint).await;

        // The resolution is applied inside this block so the state lock
        // is released before the event send below.
        let outcome = {
            let mut state = self.lock_state();
            if self.coupon_attempt.load(Ordering::SeqCst) != token {
                // A newer apply superseded this one while it was in
                // flight.
                return Ok(CouponOutcome::Superseded);
            }
            self.validating.store(false, Ordering::SeqCst);

            match result? {
                CouponValidation::Valid(mut coupon) => {
                    coupon.auto_applied = false;
                    state.coupon = Some(coupon.clone());
                    CouponOutcome::Applied(coupon)
                }
                CouponValidation::Rejected(rejection) => CouponOutcome::Rejected(rejection),
            }
        };

        match &outcome {
            CouponOutcome::Applied(coupon) => {
                self.event_sender
                    .send_or_log(Event::CouponApplied {
                        session_id: self.session_id,
                        code: coupon.code.clone(),
                        auto_applied: false,
                    })
                    .await;
                info!(code = %coupon.code, "Coupon applied");
            }
            CouponOutcome::Rejected(rejection) => {
                info!(code = %code, reason = ?rejection, "Coupon rejected");
            }
            CouponOutcome::Superseded => {}
        }

        Ok(outcome)
    }

    /// Clears the coupon slot unconditionally, auto-applied included.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn remove_coupon(&self) {
        let had_coupon = {
            let mut state = self.lock_state();
            state.coupon.take().is_some()
        };

        if had_coupon {
            self.event_sender
                .send_or_log(Event::CouponRemoved {
                    session_id: self.session_id,
                })
                .await;
        }
    }

    /// First-time-buyer auto-coupon policy. Idempotent and cheap on
    /// repeat calls: eligibility is evaluated against the order history
    /// at most once per identity per session, then cached. If eligible
    /// and the slot holds no manual coupon, the configured auto coupon
    /// is attached silently. A manual coupon is never overridden.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn check_first_time_buyer(&self, email: &str) -> Result<(), ServiceError> {
        let identity = email.trim().to_lowercase();
        if identity.is_empty() {
            return Ok(());
        }

        let cached = {
            let evaluated = self
                .evaluated_identities
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            evaluated.get(&identity).copied()
        };

        let eligible = match cached {
            Some(eligible) => eligible,
            None => match self.orders.has_prior_purchase(&identity).await {
                Ok(has_purchased) => {
                    let eligible = !has_purchased;
                    self.evaluated_identities
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(identity.clone(), eligible);
                    eligible
                }
                Err(e) => {
                    // Leave the identity un-marked so a later checkout
                    // mount can retry the lookup.
                    warn!(error = %e, "First-purchase lookup failed");
                    return Ok(());
                }
            },
        };

        if !eligible {
            return Ok(());
        }

        let attached = {
            let mut state = self.lock_state();
            match state.coupon {
                // Manual always wins; an existing auto coupon makes
                // re-attachment a no-op.
                Some(_) => false,
                None => {
                    state.coupon = Some(Coupon {
                        code: self.config.auto_coupon_code.to_uppercase(),
                        discount_value: self.config.auto_coupon_percent,
                        kind: DiscountKind::Percentage,
                        auto_applied: true,
                    });
                    true
                }
            }
        };

        if attached {
            self.event_sender
                .send_or_log(Event::CouponApplied {
                    session_id: self.session_id,
                    code: self.config.auto_coupon_code.to_uppercase(),
                    auto_applied: true,
                })
                .await;
            info!("First-purchase coupon attached");
        }

        Ok(())
    }

    /// Empties line items. The coupon slot is left to the orchestrator,
    /// which clears it alongside the gift card on settlement success.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn clear(&self) {
        {
            let mut state = self.lock_state();
            state.items.clear();
        }

        self.event_sender
            .send_or_log(Event::CartCleared(self.session_id))
            .await;
    }
}
