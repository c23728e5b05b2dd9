use std::{collections::HashMap, fmt::Debug};

use chrono::Utc;
use dispatch_common::Kobo;
use log::*;
use serde::Serialize;

use crate::{
    api::{engine_config::EngineConfig, errors::CheckoutError},
    db_types::{NewOrder, Order, OrderDraft, OrderItem, PricedLine, Product},
    helpers::new_payment_reference,
    traits::{ChargeAuthorization, ChargeRequest, LedgerStore, PaymentGateway},
};

#[derive(Debug, Clone, Serialize)]
pub struct Checkout {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub authorization: ChargeAuthorization,
}

/// Turns a confirmed cart into an order awaiting payment.
#[derive(Clone)]
pub struct CheckoutApi<B, G> {
    db: B,
    gateway: G,
    config: EngineConfig,
}

impl<B, G> Debug for CheckoutApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B, G> CheckoutApi<B, G> {
    pub fn new(db: B, gateway: G, config: EngineConfig) -> Self {
        Self { db, gateway, config }
    }
}

impl<B, G> CheckoutApi<B, G>
where
    B: LedgerStore,
    G: PaymentGateway,
{
    /// Places the order and starts the charge.
    ///
    /// Retail and wholesale prices are captured on the order lines here, and the total is fixed: nothing later
    /// recomputes it from the catalogue.
    pub async fn place_order(&self, order: NewOrder) -> Result<Checkout, CheckoutError> {
        if order.items.is_empty() {
            return Err(CheckoutError::EmptyOrder);
        }
        if order.delivery_fee < Kobo::default() {
            return Err(CheckoutError::InvalidDeliveryFee);
        }
        if let Some(item) = order.items.iter().find(|i| i.quantity <= 0) {
            return Err(CheckoutError::InvalidQuantity(item.product_id));
        }
        self.db.fetch_merchant(order.merchant_id).await?.ok_or(CheckoutError::MerchantNotFound(order.merchant_id))?;
        let ids = order.items.iter().map(|i| i.product_id).collect::<Vec<_>>();
        let products =
            self.db.fetch_products(&ids).await?.into_iter().map(|p| (p.id, p)).collect::<HashMap<i64, Product>>();
        let lines = price_lines(&order, &products)?;

        let now = Utc::now();
        let draft = OrderDraft {
            customer_id: order.customer_id,
            merchant_id: order.merchant_id,
            delivery_address: order.delivery_address,
            delivery_lat: order.delivery_lat,
            delivery_lng: order.delivery_lng,
            delivery_fee: order.delivery_fee,
            payment_reference: new_payment_reference(now),
            payment_expires_at: now + self.config.payment_window,
            reserve_stock: order.reserve_stock,
            lines,
        };
        let (order, items) = self.db.insert_order(draft, &self.config.order_prefix).await?;
        info!("🛒️ Order {} placed for {}. Total {}", order.order_number, order.customer_id, order.total_amount);

        let request = ChargeRequest {
            customer: order.customer_id.clone(),
            amount: order.total_amount,
            reference: order.payment_reference.clone(),
        };
        match self.gateway.initialize_charge(&request).await {
            Ok(authorization) => Ok(Checkout { order, items, authorization }),
            Err(e) => {
                warn!("🛒️ Could not start the charge for order {}. Cancelling it. {e}", order.order_number);
                // Any reserved stock is returned by the cleanup sweep
                self.db.fail_payment(order.id, true).await?;
                Err(CheckoutError::Gateway(e))
            },
        }
    }
}

/// Prices each line from the catalogue and checks that the merchant has enough of everything.
fn price_lines(order: &NewOrder, products: &HashMap<i64, Product>) -> Result<Vec<PricedLine>, CheckoutError> {
    let mut wanted = HashMap::<i64, i64>::new();
    let mut lines = Vec::with_capacity(order.items.len());
    for item in &order.items {
        let product = products
            .get(&item.product_id)
            .filter(|p| p.active)
            .ok_or(CheckoutError::ProductUnavailable(item.product_id))?;
        if product.merchant_id != order.merchant_id {
            return Err(CheckoutError::WrongMerchant { product_id: product.id, merchant_id: order.merchant_id });
        }
        let required = wanted.entry(product.id).or_default();
        *required += item.quantity;
        if *required > product.stock {
            return Err(CheckoutError::InsufficientStock {
                product_id: product.id,
                required: *required,
                available: product.stock,
            });
        }
        lines.push(PricedLine {
            product_id: product.id,
            product_name: product.name.clone(),
            quantity: item.quantity,
            unit_price: product.retail_price,
            wholesale_price: product.wholesale_price,
        });
    }
    Ok(lines)
}
