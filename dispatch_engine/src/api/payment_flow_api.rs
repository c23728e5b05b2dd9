//! The payment confirmation pipeline.
//!
//! A payment gateway webhook goes through these steps, in order:
//! 1. The HMAC signature over the raw body is checked. A bad signature is rejected before anything else happens.
//! 2. The event claims an idempotency key derived from its type and reference. A retry of an event we have already
//!    seen stops here.
//! 3. The order is looked up by payment reference. Unknown references are ignored (they are usually test charges).
//! 4. The amount paid must match the order total exactly.
//! 5. Stock is checked again. If anything ran out since checkout, the charge is refunded and the order cancelled.
//! 6. The order is marked paid and the escrow created, in one store transaction.
//! 7. The invoice, confirmation message and delivery follow. These are best-effort: a failure is logged to the
//!    activity feed but never undoes step 6.
//!
//! If the store fails in steps 3 to 6, the idempotency key is released and an error returned, so that the gateway's
//! retry gets another chance.
use std::fmt::Debug;

use chrono::Utc;
use dispatch_common::Secret;
use log::*;

use crate::{
    api::{
        activity_api::ActivityApi,
        delivery_api::DeliveryApi,
        engine_config::EngineConfig,
        errors::PaymentFlowError,
        messenger::Messenger,
        stock_api::{StockIssue, StockValidator},
        webhook_objects::{ChargeEventKind, ConfirmedOrder, PaystackEvent, PaystackEventData, WebhookOutcome},
    },
    db_types::{FulfillmentStatus, NewActivity, Order, PaymentStatus, Severity},
    events::{EventProducers, OrderAnnulledEvent, OrderPaidEvent},
    helpers::{retry_with_linear_backoff, verify_webhook_signature},
    traits::{
        IdempotencyCache,
        InvoiceDocument,
        InvoiceLine,
        InvoiceRequest,
        InvoiceService,
        LedgerError,
        LedgerStore,
        Notifier,
        PaymentGateway,
    },
};

#[derive(Clone)]
pub struct PaymentFlowApi<B, C, G, N, I> {
    db: B,
    cache: C,
    gateway: G,
    messenger: Messenger<N>,
    invoices: I,
    stock: StockValidator<B>,
    deliveries: DeliveryApi<B, G, N>,
    activity: ActivityApi<B>,
    producers: EventProducers,
    config: EngineConfig,
    webhook_secret: Secret<String>,
}

impl<B, C, G, N, I> Debug for PaymentFlowApi<B, C, G, N, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B, C, G, N, I> PaymentFlowApi<B, C, G, N, I>
where
    B: Clone,
    G: Clone,
    N: Clone,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: B,
        cache: C,
        gateway: G,
        notifier: N,
        invoices: I,
        producers: EventProducers,
        config: EngineConfig,
        webhook_secret: Secret<String>,
    ) -> Self {
        let messenger = Messenger::new(notifier.clone(), config.broadcast_delay);
        let stock = StockValidator::new(db.clone());
        let deliveries = DeliveryApi::new(db.clone(), gateway.clone(), notifier, producers.clone(), config.clone());
        let activity = ActivityApi::new(db.clone(), producers.clone());
        Self { db, cache, gateway, messenger, invoices, stock, deliveries, activity, producers, config, webhook_secret }
    }
}

impl<B, C, G, N, I> PaymentFlowApi<B, C, G, N, I>
where
    B: LedgerStore,
    C: IdempotencyCache,
    G: PaymentGateway,
    N: Notifier,
    I: InvoiceService,
{
    /// Entry point for the payment gateway webhook. `body` must be the raw request body, exactly as received.
    pub async fn handle_webhook(&self, body: &[u8], signature: Option<&str>) -> Result<WebhookOutcome, PaymentFlowError> {
        let Some(signature) = signature else {
            warn!("🔐️ Webhook call without a signature. Rejecting it.");
            return Err(PaymentFlowError::InvalidSignature);
        };
        if !verify_webhook_signature(self.webhook_secret.reveal(), body, signature) {
            warn!("🔐️ Webhook signature does not match. Rejecting it.");
            return Err(PaymentFlowError::InvalidSignature);
        }
        let event = serde_json::from_slice::<PaystackEvent>(body)
            .map_err(|e| PaymentFlowError::MalformedPayload(e.to_string()))?;
        self.process_event(event).await
    }

    /// Processes an already-authenticated event.
    pub async fn process_event(&self, event: PaystackEvent) -> Result<WebhookOutcome, PaymentFlowError> {
        let kind = event.kind();
        if kind == ChargeEventKind::Other {
            debug!("💳️ Ignoring {} event for {}", event.event, event.data.reference);
            return Ok(WebhookOutcome::Ignored);
        }
        let key = event.idempotency_key();
        let claimed = self
            .cache
            .set_if_absent(&key, self.config.idempotency_ttl)
            .await
            .map_err(|e| PaymentFlowError::IdempotencyError(e.to_string()))?;
        if !claimed {
            info!("💳️ {key} has already been processed. Skipping it.");
            return Ok(WebhookOutcome::Duplicate);
        }
        let result = match kind {
            ChargeEventKind::Success => self.confirm_charge(&event.data).await,
            _ => self.fail_charge(&event.data).await,
        };
        match result {
            Ok(outcome) => {
                debug!("💳️ {key}: {outcome}");
                Ok(outcome)
            },
            Err(e) => {
                warn!("💳️ {key} could not be processed. {e}. Releasing the key so that a retry can succeed.");
                if let Err(release) = self.cache.release(&key).await {
                    error!("💳️ Could not release idempotency key {key}. {release}");
                }
                Err(e)
            },
        }
    }

    async fn confirm_charge(&self, data: &PaystackEventData) -> Result<WebhookOutcome, PaymentFlowError> {
        let Some(order) = self.db.fetch_order_by_reference(&data.reference).await? else {
            info!("💳️ No order has payment reference {}. Ignoring the charge.", data.reference);
            return Ok(WebhookOutcome::UnknownReference);
        };
        match order.payment_status {
            PaymentStatus::Pending => {},
            PaymentStatus::Paid => return Ok(WebhookOutcome::AlreadyProcessed),
            PaymentStatus::Failed
                if order.status == FulfillmentStatus::Cancelled || order.payment_expires_at < Utc::now() =>
            {
                return Ok(self.refund_late_payment(&order, data).await);
            },
            // An earlier attempt was declined, but the payment window is still open
            PaymentStatus::Failed => debug!("💳️ Order {} is being paid after a failed charge", order.order_number),
        }
        if data.amount != order.total_amount {
            let msg = format!(
                "Payment for order {} does not match. Expected {}, but {} was paid (reference {}).",
                order.order_number, order.total_amount, data.amount, data.reference
            );
            self.activity.log(NewActivity::new("payment", Severity::High, msg).for_order(order.id)).await;
            return Ok(WebhookOutcome::AmountMismatch { expected: order.total_amount, paid: data.amount });
        }
        let check = self.stock.check_availability(order.id).await?;
        if !check.available {
            return self.reject_for_stock(&order, data, check.issues).await;
        }
        let confirmed = match self.db.confirm_payment(order.id).await {
            Ok(confirmed) => confirmed,
            Err(LedgerError::InsufficientStock { product_id, required, available }) => {
                let name = self
                    .db
                    .fetch_order_items(order.id)
                    .await?
                    .into_iter()
                    .find(|i| i.product_id == product_id)
                    .map(|i| i.product_name)
                    .unwrap_or_default();
                let issue = StockIssue { product_id, product_name: name, required, available };
                return self.reject_for_stock(&order, data, vec![issue]).await;
            },
            Err(LedgerError::OrderNotPending(_)) => return Ok(WebhookOutcome::AlreadyProcessed),
            Err(e) => return Err(e.into()),
        };
        let order = confirmed.order;
        info!("💳️ Order {} is paid. {} is held in escrow.", order.order_number, confirmed.escrow.amount);
        self.producers.publish_order_paid(OrderPaidEvent::new(order.clone())).await;

        let invoice = self.deliver_invoice(&order).await;
        let body = format!(
            "Thank you! We received your payment of {} for order {}. We're arranging delivery now.",
            order.total_amount, order.order_number
        );
        self.notify(&order, &body).await;
        let delivery = match self.deliveries.create_delivery(order.id).await {
            Ok(created) => Some(created.delivery),
            Err(e) => {
                let msg = format!("Could not create a delivery for paid order {}. {e}", order.order_number);
                self.activity.log(NewActivity::new("delivery", Severity::High, msg).for_order(order.id)).await;
                None
            },
        };
        let confirmed = ConfirmedOrder { order, escrow: confirmed.escrow, delivery, invoice };
        Ok(WebhookOutcome::Confirmed(Box::new(confirmed)))
    }

    async fn fail_charge(&self, data: &PaystackEventData) -> Result<WebhookOutcome, PaymentFlowError> {
        let Some(order) = self.db.fetch_order_by_reference(&data.reference).await? else {
            info!("💳️ No order has payment reference {}. Ignoring the failed charge.", data.reference);
            return Ok(WebhookOutcome::UnknownReference);
        };
        let Some(order) = self.db.fail_payment(order.id, false).await? else {
            debug!("💳️ Order {} is no longer awaiting payment. Ignoring the failed charge.", order.order_number);
            return Ok(WebhookOutcome::AlreadyProcessed);
        };
        info!("💳️ Payment for order {} failed", order.order_number);
        self.producers.publish_order_annulled(OrderAnnulledEvent::new(order.clone(), "payment failed")).await;
        let reason = data.gateway_response.as_deref().unwrap_or("The charge was declined");
        let body = format!(
            "Your payment for order {} did not go through ({reason}). No money has been taken. Please try again or \
             use a different card.",
            order.order_number
        );
        self.notify(&order, &body).await;
        Ok(WebhookOutcome::Failed)
    }

    async fn reject_for_stock(
        &self,
        order: &Order,
        data: &PaystackEventData,
        issues: Vec<StockIssue>,
    ) -> Result<WebhookOutcome, PaymentFlowError> {
        let names = issues.iter().map(|i| i.product_name.as_str()).collect::<Vec<_>>().join(", ");
        warn!("💳️ Order {} was paid, but these items are out of stock: {names}", order.order_number);
        // Cancel first, so that a retry after a store failure cannot ask for a second refund
        let Some(cancelled) = self.db.fail_payment(order.id, true).await? else {
            // Paid or closed by someone else in the meantime
            return match self.db.fetch_order(order.id).await? {
                Some(current) if current.payment_status != PaymentStatus::Paid => {
                    Ok(self.refund_late_payment(&current, data).await)
                },
                _ => Ok(WebhookOutcome::AlreadyProcessed),
            };
        };
        self.producers.publish_order_annulled(OrderAnnulledEvent::new(cancelled, "out of stock")).await;
        match self.gateway.refund(&order.payment_reference, None).await {
            Ok(ack) => info!("💳️ Refund for order {} requested ({})", order.order_number, ack.status),
            Err(e) => {
                let msg = format!(
                    "Refund of {} for out-of-stock order {} failed and must be issued manually. {e}",
                    order.total_amount, order.order_number
                );
                self.activity.log(NewActivity::new("refund", Severity::Critical, msg).for_order(order.id)).await;
            },
        }
        let msg = format!("Order {} cancelled at payment: out of stock ({names})", order.order_number);
        self.activity.log(NewActivity::new("stock", Severity::Medium, msg).for_order(order.id)).await;
        let body = format!(
            "Sorry! {names} sold out before your payment came through, so we've cancelled order {}. Your payment of {} \
             is being refunded.",
            order.order_number, order.total_amount
        );
        self.notify(order, &body).await;
        Ok(WebhookOutcome::OutOfStock(issues))
    }

    /// The customer paid after the order was cancelled or its payment window closed. There is nothing to fulfil, so the
    /// money goes back.
    async fn refund_late_payment(&self, order: &Order, data: &PaystackEventData) -> WebhookOutcome {
        let severity = match self.gateway.refund(&data.reference, Some(data.amount)).await {
            Ok(_) => Severity::High,
            Err(e) => {
                error!("💳️ Refund for late payment on order {} failed. {e}", order.order_number);
                Severity::Critical
            },
        };
        let msg = format!(
            "Payment of {} arrived for order {} after it was closed ({}/{}). Refund {}.",
            data.amount,
            order.order_number,
            order.payment_status,
            order.status,
            if severity == Severity::High { "requested" } else { "FAILED and must be issued manually" }
        );
        self.activity.log(NewActivity::new("payment", severity, msg).for_order(order.id)).await;
        let body = format!(
            "We received your payment for order {}, but the order had already expired. Your money is being refunded.",
            order.order_number
        );
        self.notify(order, &body).await;
        WebhookOutcome::LatePayment
    }

    /// Renders the invoice (with retries) and sends it to the customer. Returns the invoice if it was rendered.
    async fn deliver_invoice(&self, order: &Order) -> Option<InvoiceDocument> {
        let items = match self.db.fetch_order_items(order.id).await {
            Ok(items) => items,
            Err(e) => {
                warn!("💳️ Could not fetch the lines of order {} for its invoice. {e}", order.order_number);
                return None;
            },
        };
        let request = InvoiceRequest {
            order_number: order.order_number.clone(),
            customer_id: order.customer_id.clone(),
            lines: items
                .iter()
                .map(|i| InvoiceLine {
                    description: i.product_name.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                    line_total: i.line_total(),
                })
                .collect(),
            delivery_fee: order.delivery_fee,
            total: order.total_amount,
            payment_reference: order.payment_reference.clone(),
        };
        let invoices = &self.invoices;
        let req = &request;
        let label = format!("💳️ Invoice for order {}", order.order_number);
        let rendered = retry_with_linear_backoff(&label, self.config.invoice_attempts, self.config.invoice_backoff, move |_| {
            invoices.render_invoice(req)
        })
        .await;
        let document = match rendered {
            Ok(document) => document,
            Err(e) => {
                let msg = format!(
                    "The invoice for order {} could not be generated after {} attempts. {e}",
                    order.order_number, self.config.invoice_attempts
                );
                self.activity.log(NewActivity::new("invoice", Severity::High, msg).for_order(order.id)).await;
                return None;
            },
        };
        let caption = format!("Invoice for order {}", order.order_number);
        if let Err(e) = self.messenger.document(&order.customer_id, &document.url, &caption, &document.filename).await {
            let msg = format!("The invoice for order {} could not be sent. {e}", order.order_number);
            self.activity.log(NewActivity::new("notification", Severity::Medium, msg).for_order(order.id)).await;
        }
        Some(document)
    }

    async fn notify(&self, order: &Order, body: &str) {
        if let Err(e) = self.messenger.text(&order.customer_id, body).await {
            let msg = format!("Could not message the customer about order {}. {e}", order.order_number);
            self.activity.log(NewActivity::new("notification", Severity::Medium, msg).for_order(order.id)).await;
        }
    }

    pub fn deliveries(&self) -> &DeliveryApi<B, G, N> {
        &self.deliveries
    }
}
