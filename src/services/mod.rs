pub mod cart;
pub mod checkout;
pub mod gift_card;
pub mod pricing;

pub use cart::{AddItemInput, CartService, CouponOutcome};
pub use checkout::{CheckoutPhase, CheckoutService};
pub use gift_card::GiftCardService;
