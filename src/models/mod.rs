use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// License tiers a digital product can be purchased under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseTier {
    Personal,
    Commercial,
    Extended,
}

/// Identity of a cart line: the same product under a different license
/// tier is a distinct line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineItemKey {
    pub product_ref: Uuid,
    pub license_tier: LicenseTier,
}

/// A single cart line. Re-adding the same `(product_ref, license_tier)`
/// key increments `quantity` rather than duplicating the line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLineItem {
    pub product_ref: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub license_tier: LicenseTier,
}

impl CartLineItem {
    pub fn key(&self) -> LineItemKey {
        LineItemKey {
            product_ref: self.product_ref,
            license_tier: self.license_tier,
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percentage,
    FixedAmount,
}

/// A promotional discount instrument. At most one occupies the cart's
/// coupon slot; a manual coupon always replaces an auto-applied one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub discount_value: Decimal,
    pub kind: DiscountKind,
    pub auto_applied: bool,
}

/// A store-credit instrument. The balance is a client-side snapshot;
/// the ledger authority owns the actual debit at redemption time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftCard {
    pub code: String,
    pub balance: Decimal,
}

/// Billing identity required before any settlement attempt.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BillingInfo {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
}

/// Ephemeral snapshot built fresh for one settlement attempt; never
/// persisted beyond it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub items: Vec<CartLineItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing: Option<BillingInfo>,
    pub total_amount: Decimal,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gift_card_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gift_card_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: String,
}

/// Which settlement boundary finalizes the current checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPath {
    Free,
    Provider,
}

/// Derived payable amount, recomputed from store state on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutQuote {
    pub subtotal: Decimal,
    pub coupon_discount: Decimal,
    pub after_coupon: Decimal,
    pub gift_card_discount: Decimal,
    pub total: Decimal,
    pub path: SettlementPath,
}
