//! Pure total-derivation functions. Nothing here is cached: every
//! decision point recomputes from current store state, which keeps the
//! coupon and gift card races harmless.
//!
//! The precedence is fixed: coupon first, gift card second, each
//! clamped so the running total never goes negative. Reversing the
//! order would change the effective discount whenever the gift card
//! balance is smaller than the coupon-adjusted subtotal.

use crate::models::{
    CartLineItem, CheckoutQuote, Coupon, DiscountKind, GiftCard, SettlementPath,
};
use rust_decimal::Decimal;

/// Sum of line totals over current items.
pub fn subtotal(items: &[CartLineItem]) -> Decimal {
    items.iter().map(CartLineItem::line_total).sum()
}

/// Discount contributed by the coupon, clamped to the subtotal.
///
/// Percentage coupons take `subtotal * pct / 100`; fixed-amount coupons
/// take `min(amount, subtotal)` so a $30 coupon on a $5 cart discounts
/// exactly $5.
pub fn coupon_discount(subtotal: Decimal, coupon: Option<&Coupon>) -> Decimal {
    let Some(coupon) = coupon else {
        return Decimal::ZERO;
    };
    match coupon.kind {
        DiscountKind::Percentage => subtotal * coupon.discount_value / Decimal::from(100),
        DiscountKind::FixedAmount => coupon.discount_value.min(subtotal),
    }
}

/// Discount contributed by the gift card, capped at both the snapshot
/// balance and the coupon-adjusted remainder.
pub fn gift_card_discount(after_coupon: Decimal, gift_card: Option<&GiftCard>) -> Decimal {
    match gift_card {
        Some(card) => card.balance.min(after_coupon),
        None => Decimal::ZERO,
    }
}

/// Derives the full payable amount from current store state.
pub fn compute_quote(
    items: &[CartLineItem],
    coupon: Option<&Coupon>,
    gift_card: Option<&GiftCard>,
) -> CheckoutQuote {
    let subtotal = subtotal(items);
    let coupon_discount = coupon_discount(subtotal, coupon);
    let after_coupon = (subtotal - coupon_discount).max(Decimal::ZERO);
    let gift_card_discount = gift_card_discount(after_coupon, gift_card);
    let total = (after_coupon - gift_card_discount).max(Decimal::ZERO);

    let path = if total == Decimal::ZERO {
        SettlementPath::Free
    } else {
        SettlementPath::Provider
    };

    CheckoutQuote {
        subtotal,
        coupon_discount,
        after_coupon,
        gift_card_discount,
        total,
        path,
    }
}
