mod common;

use assert_matches::assert_matches;
use common::{item, only_item, TestHarness};
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use std::time::Duration;
use uuid::Uuid;

use storefront_checkout::clients::{CouponRejection, CouponValidation};
use storefront_checkout::errors::ServiceError;
use storefront_checkout::models::{Coupon, DiscountKind, LicenseTier, LineItemKey};
use storefront_checkout::services::cart::{AddItemInput, CouponOutcome};

fn valid_coupon(code: &str, percent: u32) -> CouponValidation {
    CouponValidation::Valid(Coupon {
        code: code.to_string(),
        discount_value: percent.into(),
        kind: DiscountKind::Percentage,
        auto_applied: false,
    })
}

#[tokio::test]
async fn adding_same_product_and_tier_merges_quantities() {
    let harness = TestHarness::new();
    let product_ref = Uuid::new_v4();

    let input = AddItemInput {
        product_ref,
        name: "Icon pack".to_string(),
        unit_price: dec!(12),
        quantity: 1,
        license_tier: LicenseTier::Commercial,
    };
    harness.cart.add_item(input.clone()).await.expect("add");
    let items = harness
        .cart
        .add_item(AddItemInput {
            quantity: 2,
            ..input
        })
        .await
        .expect("re-add");

    assert_eq!(only_item(&items).quantity, 3);
    assert_eq!(harness.cart.subtotal(), dec!(36));
}

#[tokio::test]
async fn merging_quantities_rejects_overflow_instead_of_wrapping() {
    let harness = TestHarness::new();
    let product_ref = Uuid::new_v4();

    let input = AddItemInput {
        product_ref,
        name: "Icon pack".to_string(),
        unit_price: dec!(12),
        quantity: 2_000_000_000,
        license_tier: LicenseTier::Personal,
    };
    harness.cart.add_item(input.clone()).await.expect("add");
    let result = harness.cart.add_item(input).await;

    assert_matches!(result, Err(ServiceError::ValidationError(_)));
    // The line keeps its pre-overflow quantity.
    assert_eq!(only_item(&harness.cart.items()).quantity, 2_000_000_000);
}

#[tokio::test]
async fn same_product_under_another_tier_is_a_separate_line() {
    let harness = TestHarness::new();
    let product_ref = Uuid::new_v4();

    let personal = AddItemInput {
        product_ref,
        name: "Font".to_string(),
        unit_price: dec!(10),
        quantity: 1,
        license_tier: LicenseTier::Personal,
    };
    harness.cart.add_item(personal.clone()).await.expect("add");
    let items = harness
        .cart
        .add_item(AddItemInput {
            license_tier: LicenseTier::Extended,
            ..personal
        })
        .await
        .expect("add other tier");

    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn quantity_update_to_zero_removes_the_line() {
    let harness = TestHarness::new();
    let product_ref = Uuid::new_v4();

    harness
        .cart
        .add_item(AddItemInput {
            product_ref,
            name: "Template".to_string(),
            unit_price: dec!(8),
            quantity: 2,
            license_tier: LicenseTier::Personal,
        })
        .await
        .expect("add");

    let key = LineItemKey {
        product_ref,
        license_tier: LicenseTier::Personal,
    };
    let items = harness
        .cart
        .update_quantity(key, 0)
        .await
        .expect("update to zero");

    assert!(items.is_empty());
}

#[tokio::test]
async fn removing_an_absent_line_is_not_found() {
    let harness = TestHarness::new();

    let result = harness
        .cart
        .remove_item(LineItemKey {
            product_ref: Uuid::new_v4(),
            license_tier: LicenseTier::Personal,
        })
        .await;

    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn applied_coupon_fills_the_slot_and_discounts_the_subtotal() {
    let harness = TestHarness::new();
    harness.cart.add_item(item("Ebook", dec!(20), 1)).await.expect("add");
    harness.resolver.push(Ok(valid_coupon("SAVE50", 50)));

    let outcome = harness
        .cart
        .apply_coupon("save50", None)
        .await
        .expect("apply");

    assert_matches!(outcome, CouponOutcome::Applied(_));
    assert_eq!(harness.cart.coupon().map(|c| c.code), Some("SAVE50".to_string()));
    assert_eq!(harness.cart.discount(), dec!(10));
    assert!(!harness.cart.is_validating_coupon());
}

#[tokio::test]
async fn rejected_coupon_leaves_the_slot_untouched() {
    let harness = TestHarness::new();
    harness.resolver.push(Ok(valid_coupon("SAVE10", 10)));
    harness
        .cart
        .apply_coupon("SAVE10", None)
        .await
        .expect("first apply");

    harness
        .resolver
        .push(Ok(CouponValidation::Rejected(CouponRejection::Expired)));
    let outcome = harness
        .cart
        .apply_coupon("OLDCODE", None)
        .await
        .expect("second apply");

    assert_matches!(outcome, CouponOutcome::Rejected(CouponRejection::Expired));
    assert_eq!(harness.cart.coupon().map(|c| c.code), Some("SAVE10".to_string()));
}

#[tokio::test]
async fn slow_earlier_apply_is_superseded_by_a_later_one() {
    let harness = TestHarness::new();
    harness
        .resolver
        .push_delayed(Duration::from_millis(100), Ok(valid_coupon("FIRST", 10)));
    harness.resolver.push(Ok(valid_coupon("SECOND", 20)));

    let cart = harness.cart.clone();
    let slow = tokio::spawn(async move { cart.apply_coupon("FIRST", None).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let fast = harness
        .cart
        .apply_coupon("SECOND", None)
        .await
        .expect("fast apply");
    assert_matches!(fast, CouponOutcome::Applied(_));

    let slow = slow.await.expect("join").expect("slow apply");
    assert_matches!(slow, CouponOutcome::Superseded);
    assert_eq!(
        harness.cart.coupon().map(|c| c.code),
        Some("SECOND".to_string())
    );
}

#[tokio::test]
async fn stale_failure_does_not_clear_a_since_applied_coupon() {
    let harness = TestHarness::new();
    harness.resolver.push_delayed(
        Duration::from_millis(100),
        Err(ServiceError::ExternalServiceError("timed out".to_string())),
    );
    harness.resolver.push(Ok(valid_coupon("KEEP", 15)));

    let cart = harness.cart.clone();
    let slow = tokio::spawn(async move { cart.apply_coupon("DOOMED", None).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    harness
        .cart
        .apply_coupon("KEEP", None)
        .await
        .expect("fast apply");

    // The stale error is swallowed as superseded rather than surfaced.
    let slow = slow.await.expect("join").expect("slow apply");
    assert_matches!(slow, CouponOutcome::Superseded);
    assert_eq!(harness.cart.coupon().map(|c| c.code), Some("KEEP".to_string()));
}

#[tokio::test]
async fn validating_flag_is_set_while_an_apply_is_in_flight() {
    let harness = TestHarness::new();
    harness
        .resolver
        .push_delayed(Duration::from_millis(100), Ok(valid_coupon("SLOW", 10)));

    let cart = harness.cart.clone();
    let pending = tokio::spawn(async move { cart.apply_coupon("SLOW", None).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(harness.cart.is_validating_coupon());
    pending.await.expect("join").expect("apply");
    assert!(!harness.cart.is_validating_coupon());
}

#[tokio::test]
async fn first_time_buyer_gets_the_welcome_coupon() {
    let harness = TestHarness::new();
    harness.orders.push_history(Ok(false));

    harness
        .cart
        .check_first_time_buyer("new@example.com")
        .await
        .expect("check");

    let coupon = harness.cart.coupon().expect("auto coupon");
    assert_eq!(coupon.code, "WELCOME30");
    assert!(coupon.auto_applied);
    assert_eq!(coupon.discount_value, dec!(30));
}

#[tokio::test]
async fn eligibility_is_looked_up_once_per_identity() {
    let harness = TestHarness::new();
    harness.orders.push_history(Ok(false));

    harness
        .cart
        .check_first_time_buyer("new@example.com")
        .await
        .expect("first check");
    harness
        .cart
        .check_first_time_buyer("New@Example.com ")
        .await
        .expect("repeat check");

    assert_eq!(harness.orders.history_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn returning_buyer_gets_no_auto_coupon() {
    let harness = TestHarness::new();
    harness.orders.push_history(Ok(true));

    harness
        .cart
        .check_first_time_buyer("repeat@example.com")
        .await
        .expect("check");

    assert!(harness.cart.coupon().is_none());
}

#[tokio::test]
async fn auto_coupon_never_overrides_a_manual_one() {
    let harness = TestHarness::new();
    harness.resolver.push(Ok(valid_coupon("MANUAL", 10)));
    harness
        .cart
        .apply_coupon("MANUAL", None)
        .await
        .expect("manual apply");

    harness.orders.push_history(Ok(false));
    harness
        .cart
        .check_first_time_buyer("new@example.com")
        .await
        .expect("check");

    assert_eq!(
        harness.cart.coupon().map(|c| c.code),
        Some("MANUAL".to_string())
    );
}

#[tokio::test]
async fn manual_apply_replaces_the_auto_coupon() {
    let harness = TestHarness::new();
    harness.orders.push_history(Ok(false));
    harness
        .cart
        .check_first_time_buyer("new@example.com")
        .await
        .expect("check");

    harness.resolver.push(Ok(valid_coupon("BETTER", 40)));
    harness
        .cart
        .apply_coupon("BETTER", None)
        .await
        .expect("manual apply");

    let coupon = harness.cart.coupon().expect("coupon");
    assert_eq!(coupon.code, "BETTER");
    assert!(!coupon.auto_applied);
}

#[tokio::test]
async fn removed_auto_coupon_reattaches_on_the_next_check() {
    let harness = TestHarness::new();
    harness.orders.push_history(Ok(false));
    harness
        .cart
        .check_first_time_buyer("new@example.com")
        .await
        .expect("check");

    harness.cart.remove_coupon().await;
    assert!(harness.cart.coupon().is_none());

    // Eligibility is cached, so the re-check hits no boundary.
    harness
        .cart
        .check_first_time_buyer("new@example.com")
        .await
        .expect("re-check");

    assert_eq!(
        harness.cart.coupon().map(|c| c.code),
        Some("WELCOME30".to_string())
    );
    assert_eq!(harness.orders.history_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_eligibility_lookup_is_retried_next_time() {
    let harness = TestHarness::new();
    harness
        .orders
        .push_history(Err(ServiceError::ExternalServiceError(
            "history service down".to_string(),
        )));

    harness
        .cart
        .check_first_time_buyer("new@example.com")
        .await
        .expect("check survives the failure");
    assert!(harness.cart.coupon().is_none());

    harness.orders.push_history(Ok(false));
    harness
        .cart
        .check_first_time_buyer("new@example.com")
        .await
        .expect("retry");

    assert_eq!(harness.orders.history_calls.load(Ordering::SeqCst), 2);
    assert!(harness.cart.coupon().is_some());
}

#[tokio::test]
async fn clearing_the_cart_keeps_the_coupon_slot() {
    let harness = TestHarness::new();
    harness.cart.add_item(item("Ebook", dec!(20), 1)).await.expect("add");
    harness.resolver.push(Ok(valid_coupon("SAVE10", 10)));
    harness
        .cart
        .apply_coupon("SAVE10", None)
        .await
        .expect("apply");

    harness.cart.clear().await;

    assert!(harness.cart.items().is_empty());
    assert!(harness.cart.coupon().is_some());
}
