use dispatch_common::Kobo;
use dispatch_engine::{
    db_types::{FulfillmentStatus, NewOrder, NewOrderItem, PaymentStatus},
    test_utils::seed::{fetch_product, CUSTOMER},
    CheckoutError,
    OrderManagement,
};

mod support;

use support::Harness;

fn cart(merchant_id: i64, items: &[(i64, i64)], reserve_stock: bool) -> NewOrder {
    NewOrder {
        customer_id: CUSTOMER.to_string(),
        merchant_id,
        delivery_address: "14 Admiralty Way, Lekki Phase 1".into(),
        delivery_lat: 6.4474,
        delivery_lng: 3.4723,
        delivery_fee: Kobo::from_naira(1_500),
        items: items.iter().map(|&(product_id, quantity)| NewOrderItem { product_id, quantity }).collect(),
        reserve_stock,
    }
}

#[tokio::test]
async fn placing_an_order_starts_the_charge() {
    let h = Harness::new().await;
    let product = h.product(10).await;
    let checkout = h.checkout.place_order(cart(h.merchant.id, &[(product.id, 2)], false)).await.unwrap();

    let order = &checkout.order;
    assert!(order.order_number.starts_with("ORD-"));
    assert!(order.order_number.ends_with("-0001"));
    assert!(order.payment_reference.starts_with("DSP-"));
    assert_eq!(order.subtotal, Kobo::from_naira(6_000));
    assert_eq!(order.total_amount, Kobo::from_naira(7_500));
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(checkout.items[0].unit_price, Kobo::from_naira(3_000));
    assert_eq!(checkout.items[0].wholesale_price, Kobo::from_naira(2_500));
    assert_eq!(checkout.authorization.reference, order.payment_reference);

    let charges = h.gateway.charges();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].amount, order.total_amount);
    // Stock is only taken when the order is paid for
    assert_eq!(fetch_product(&h.db, product.id).await.stock, 10);

    let next = h.checkout.place_order(cart(h.merchant.id, &[(product.id, 1)], false)).await.unwrap();
    assert!(next.order.order_number.ends_with("-0002"));
    h.tear_down().await;
}

#[tokio::test]
async fn reserved_checkout_holds_stock() {
    let h = Harness::new().await;
    let product = h.product(3).await;
    let checkout = h.checkout.place_order(cart(h.merchant.id, &[(product.id, 3)], true)).await.unwrap();
    assert!(checkout.order.stock_reserved);
    assert_eq!(fetch_product(&h.db, product.id).await.stock, 0);

    let err = h.checkout.place_order(cart(h.merchant.id, &[(product.id, 1)], true)).await.unwrap_err();
    assert!(matches!(err, CheckoutError::InsufficientStock { required: 1, available: 0, .. }));
    h.tear_down().await;
}

#[tokio::test]
async fn gateway_failure_cancels_the_order() {
    let h = Harness::new().await;
    h.gateway.fail_charges(true);
    let product = h.product(10).await;
    let err = h.checkout.place_order(cart(h.merchant.id, &[(product.id, 1)], false)).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Gateway(_)));

    // The order was written before the charge was attempted
    let order = h.db.fetch_order(1).await.unwrap().expect("the order should exist");
    assert_eq!(order.customer_id, CUSTOMER);
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(order.status, FulfillmentStatus::Cancelled);
    h.tear_down().await;
}

#[tokio::test]
async fn bad_carts_are_refused() {
    let h = Harness::new().await;
    let product = h.product(10).await;
    let err = h.checkout.place_order(cart(h.merchant.id, &[], false)).await.unwrap_err();
    assert!(matches!(err, CheckoutError::EmptyOrder));
    let err = h.checkout.place_order(cart(h.merchant.id, &[(product.id, 0)], false)).await.unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidQuantity(_)));
    let err = h.checkout.place_order(cart(9_999, &[(product.id, 1)], false)).await.unwrap_err();
    assert!(matches!(err, CheckoutError::MerchantNotFound(9_999)));
    let err = h.checkout.place_order(cart(h.merchant.id, &[(product.id, 11)], false)).await.unwrap_err();
    assert!(matches!(err, CheckoutError::InsufficientStock { required: 11, available: 10, .. }));
    assert!(h.gateway.charges().is_empty());
    h.tear_down().await;
}
