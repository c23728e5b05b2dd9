//! `SqliteDatabase` is the concrete ledger store.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module. Every multi-row change happens inside a single transaction, and each transaction starts with a write so
//! that SQLite hands out the write lock before anything is read.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use dispatch_common::Kobo;
use log::*;
use sqlx::SqlitePool;

use super::db::{
    activity,
    db_url,
    deliveries,
    escrows,
    leases,
    merchants,
    new_pool,
    orders,
    payouts,
    products,
    riders,
    sequences,
    wallets,
};
use crate::{
    db_types::{
        ActivityEntry,
        ApprovalStatus,
        Delivery,
        DeliveryEvent,
        DeliveryFeeTransaction,
        DeliveryStatus,
        Escrow,
        Merchant,
        NewActivity,
        NewDelivery,
        Order,
        OrderDraft,
        OrderItem,
        Payout,
        PayoutStatus,
        Product,
        Rider,
        RiderStatus,
        StockLine,
        TransactionType,
        Wallet,
        WalletOwner,
        WalletTransaction,
        Withdrawal,
        WithdrawalStatus,
    },
    traits::{
        ActivityManagement,
        ConfirmedPayment,
        DeliveryCreated,
        DeliveryManagement,
        DeliveryTransition,
        LeaseManagement,
        LedgerError,
        LedgerStore,
        OrderManagement,
        Reassignment,
        SettlementBreakdown,
        SettlementManagement,
        SettlementRecord,
        StockRelease,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the `DSP_DATABASE_URL` environment variable (or the default).
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    /// Applies any outstanding schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&mut self) -> Result<(), sqlx::Error> {
        self.pool.close().await;
        Ok(())
    }

    pub async fn fetch_riders_by_status(&self, status: RiderStatus) -> Result<Vec<Rider>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let riders = riders::fetch_riders_by_status(status, &mut conn).await?;
        Ok(riders)
    }
}

impl LedgerStore for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, draft: OrderDraft, prefix: &str) -> Result<(Order, Vec<OrderItem>), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let number = sequences::next_number(prefix, now, &mut tx).await?;
        if draft.reserve_stock {
            for line in &draft.lines {
                if !products::take_stock(line.product_id, line.quantity, now, &mut tx).await? {
                    let available =
                        products::fetch_product(line.product_id, &mut tx).await?.map(|p| p.stock).unwrap_or_default();
                    debug!("🗃️ Cannot reserve {} x product #{} for a new order", line.quantity, line.product_id);
                    return Err(LedgerError::InsufficientStock {
                        product_id: line.product_id,
                        required: line.quantity,
                        available,
                    });
                }
            }
        }
        let order = orders::insert_order(&draft, &number, now, &mut tx).await?;
        let mut items = Vec::with_capacity(draft.lines.len());
        for line in &draft.lines {
            items.push(orders::insert_item(order.id, line, &mut tx).await?);
        }
        tx.commit().await?;
        Ok((order, items))
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_reference(&self, reference: &str) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_reference(reference, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let items = orders::fetch_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn fetch_stock_lines(&self, order_id: i64) -> Result<Vec<StockLine>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let lines = products::fetch_stock_lines(order_id, &mut conn).await?;
        Ok(lines)
    }

    async fn fetch_products(&self, ids: &[i64]) -> Result<Vec<Product>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let products = products::fetch_products(ids, &mut conn).await?;
        Ok(products)
    }

    async fn fetch_merchant(&self, id: i64) -> Result<Option<Merchant>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let merchant = merchants::fetch_merchant(id, &mut conn).await?;
        Ok(merchant)
    }

    async fn confirm_payment(&self, order_id: i64) -> Result<ConfirmedPayment, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let mut order = match orders::mark_paid(order_id, now, &mut tx).await? {
            Some(order) => order,
            None => {
                return match orders::fetch_order(order_id, &mut tx).await? {
                    Some(_) => Err(LedgerError::OrderNotPending(order_id)),
                    None => Err(LedgerError::OrderNotFound(order_id)),
                };
            },
        };
        if order.stock_reserved {
            // The units were taken at checkout. They now belong to the paid order.
            order = orders::consume_reservation(order_id, now, &mut tx).await?.unwrap_or(order);
        } else {
            for line in products::fetch_stock_lines(order_id, &mut tx).await? {
                if !products::take_stock(line.product_id, line.required, now, &mut tx).await? {
                    debug!("🗃️ Order #{order_id}: product #{} ran out of stock during confirmation", line.product_id);
                    tx.rollback().await?;
                    return Err(LedgerError::InsufficientStock {
                        product_id: line.product_id,
                        required: line.required,
                        available: line.available,
                    });
                }
            }
        }
        let escrow = escrows::insert_escrow(&order, now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} is paid. Escrow #{} holds {}", order.order_number, escrow.id, escrow.amount);
        Ok(ConfirmedPayment { order, escrow })
    }

    async fn fail_payment(&self, order_id: i64, cancel: bool) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::mark_failed(order_id, cancel, Utc::now(), &mut conn).await?;
        Ok(order)
    }

    async fn fetch_expired_unpaid_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_expired_unpaid(now, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_orders_holding_stock(&self, now: DateTime<Utc>) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_holding_stock(now, &mut conn).await?;
        Ok(orders)
    }

    async fn release_reserved_stock(
        &self,
        order_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<StockRelease>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let expired = orders::expire_if_unpaid(order_id, now, &mut tx).await?;
        let cleared = orders::clear_reservation(order_id, now, &mut tx).await?;
        let release = match (expired, cleared) {
            (None, None) => None,
            (expired, Some(order)) => {
                let items = orders::fetch_items(order_id, &mut tx).await?;
                for item in &items {
                    products::restore_stock(item.product_id, item.quantity, now, &mut tx).await?;
                }
                trace!("🗃️ Restored stock for {} lines of order {}", items.len(), order.order_number);
                Some(StockRelease { order, expired: expired.is_some(), restored: items })
            },
            (Some(order), None) => Some(StockRelease { order, expired: true, restored: Vec::new() }),
        };
        tx.commit().await?;
        Ok(release)
    }
}

impl SettlementManagement for SqliteDatabase {
    async fn fetch_escrow_for_order(&self, order_id: i64) -> Result<Option<Escrow>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let escrow = escrows::fetch_escrow_for_order(order_id, &mut conn).await?;
        Ok(escrow)
    }

    async fn release_escrow(
        &self,
        order_id: i64,
        breakdown: &SettlementBreakdown,
    ) -> Result<SettlementRecord, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let escrow = match escrows::release(order_id, now, &mut tx).await? {
            Some(escrow) => escrow,
            None => {
                return match escrows::fetch_escrow_for_order(order_id, &mut tx).await? {
                    Some(_) => Err(LedgerError::AlreadyReleased(order_id)),
                    None => Err(LedgerError::EscrowNotFound(order_id)),
                };
            },
        };
        let payout = payouts::insert_payout(escrow.merchant_id, order_id, breakdown.merchant_amount, now, &mut tx).await?;
        let zero = Kobo::default();

        let assignment = deliveries::fetch_delivery_for_order(order_id, &mut tx)
            .await?
            .and_then(|d| d.rider_id.map(|rider_id| (d.id, rider_id)));
        let (fee_transaction, platform_delivery_fee) = match assignment {
            Some((delivery_id, rider_id)) if breakdown.delivery_fee.is_positive() => {
                let rider_amount = breakdown.rider_amount;
                if rider_amount.is_positive() {
                    let wallet = wallets::fetch_or_create_wallet(WalletOwner::Rider(rider_id), now, &mut tx).await?;
                    let reference = format!("ESC-{order_id}-RIDER");
                    let description = format!("Delivery fee for order #{order_id}");
                    wallets::post_entry(wallet.id, TransactionType::Credit, rider_amount, &reference, &description, now, &mut tx)
                        .await?;
                    wallets::add_to_counters(wallet.id, rider_amount, zero, rider_amount, zero, &mut tx).await?;
                    riders::add_earnings(rider_id, rider_amount, now, &mut tx).await?;
                }
                let fee = payouts::insert_fee_transaction(
                    delivery_id,
                    rider_id,
                    breakdown.delivery_fee,
                    rider_amount,
                    breakdown.platform_delivery_fee,
                    now,
                    &mut tx,
                )
                .await?;
                (Some(fee), breakdown.platform_delivery_fee)
            },
            Some(_) => (None, zero),
            None => {
                warn!("🗃️ Order #{order_id} never had a rider. The platform keeps the full delivery fee.");
                (None, breakdown.delivery_fee)
            },
        };

        let platform = wallets::fetch_or_create_wallet(WalletOwner::Platform, now, &mut tx).await?;
        let commission = if breakdown.commission.is_positive() {
            let reference = format!("ESC-{order_id}-COMMISSION");
            let description = format!("Commission on order #{order_id}");
            wallets::post_entry(platform.id, TransactionType::Credit, breakdown.commission, &reference, &description, now, &mut tx)
                .await?;
            breakdown.commission
        } else {
            if breakdown.commission != zero {
                warn!("🗃️ Order #{order_id} has a negative markup of {}. No commission recorded.", breakdown.commission);
            }
            zero
        };
        if platform_delivery_fee.is_positive() {
            let reference = format!("ESC-{order_id}-DELIVERY");
            let description = format!("Platform share of delivery fee for order #{order_id}");
            wallets::post_entry(platform.id, TransactionType::Credit, platform_delivery_fee, &reference, &description, now, &mut tx)
                .await?;
        }
        wallets::add_to_counters(
            platform.id,
            commission + platform_delivery_fee,
            commission,
            platform_delivery_fee,
            zero,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        debug!("🗃️ Escrow for order #{order_id} released. Payout #{} of {} created", payout.id, payout.amount);
        Ok(SettlementRecord { escrow, payout, breakdown: *breakdown, fee_transaction })
    }

    async fn fetch_wallet(&self, owner: WalletOwner) -> Result<Option<Wallet>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let wallet = wallets::fetch_wallet(owner, &mut conn).await?;
        Ok(wallet)
    }

    async fn fetch_wallet_transactions(&self, wallet_id: i64) -> Result<Vec<WalletTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let entries = wallets::fetch_transactions(wallet_id, &mut conn).await?;
        Ok(entries)
    }

    async fn fetch_fee_transaction(&self, delivery_id: i64) -> Result<Option<DeliveryFeeTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let fee = payouts::fetch_fee_transaction(delivery_id, &mut conn).await?;
        Ok(fee)
    }

    async fn fetch_payout(&self, id: i64) -> Result<Option<Payout>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payout = payouts::fetch_payout(id, &mut conn).await?;
        Ok(payout)
    }

    async fn fetch_payout_for_order(&self, order_id: i64) -> Result<Option<Payout>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payout = payouts::fetch_payout_for_order(order_id, &mut conn).await?;
        Ok(payout)
    }

    async fn update_payout_status(
        &self,
        id: i64,
        from: PayoutStatus,
        to: PayoutStatus,
        transfer_reference: Option<&str>,
    ) -> Result<Payout, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        match payouts::update_payout_status(id, from, to, transfer_reference, Utc::now(), &mut conn).await? {
            Some(payout) => Ok(payout),
            None => match payouts::fetch_payout(id, &mut conn).await? {
                Some(p) => Err(LedgerError::IllegalPayoutTransition { id, from: p.status, to }),
                None => Err(LedgerError::PayoutNotFound(id)),
            },
        }
    }

    async fn begin_withdrawal(
        &self,
        owner: WalletOwner,
        amount: Kobo,
        reference: &str,
        recipient_code: &str,
    ) -> Result<Withdrawal, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let withdrawal = {
            let wallet = wallets::fetch_wallet(owner, &mut tx)
                .await?
                .ok_or_else(|| LedgerError::WalletNotFound(owner.to_string()))?;
            let withdrawal = payouts::insert_withdrawal(wallet.id, amount, reference, recipient_code, now, &mut tx).await?;
            let description = format!("Withdrawal to {recipient_code}");
            wallets::post_entry(wallet.id, TransactionType::Withdrawal, amount, reference, &description, now, &mut tx)
                .await?;
            let zero = Kobo::default();
            wallets::add_to_counters(wallet.id, zero, zero, zero, amount, &mut tx).await?;
            withdrawal
        };
        tx.commit().await?;
        Ok(withdrawal)
    }

    async fn complete_withdrawal(&self, reference: &str) -> Result<Withdrawal, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payouts::settle_withdrawal(reference, WithdrawalStatus::Completed, Utc::now(), &mut conn)
            .await?
            .ok_or_else(|| LedgerError::WithdrawalNotFound(reference.to_string()))
    }

    async fn fail_withdrawal(&self, reference: &str) -> Result<Withdrawal, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let withdrawal = payouts::settle_withdrawal(reference, WithdrawalStatus::Failed, now, &mut tx)
            .await?
            .ok_or_else(|| LedgerError::WithdrawalNotFound(reference.to_string()))?;
        let reversal = format!("{reference}-REVERSAL");
        let description = format!("Reversal of failed withdrawal {reference}");
        wallets::post_entry(withdrawal.wallet_id, TransactionType::Credit, withdrawal.amount, &reversal, &description, now, &mut tx)
            .await?;
        let zero = Kobo::default();
        wallets::add_to_counters(withdrawal.wallet_id, zero, zero, zero, -withdrawal.amount, &mut tx).await?;
        tx.commit().await?;
        Ok(withdrawal)
    }
}

impl DeliveryManagement for SqliteDatabase {
    async fn create_delivery(&self, delivery: NewDelivery, prefix: &str) -> Result<DeliveryCreated, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let number = sequences::next_number(prefix, now, &mut tx).await?;
        if deliveries::fetch_delivery_for_order(delivery.order_id, &mut tx).await?.is_some() {
            return Err(LedgerError::DeliveryExists(delivery.order_id));
        }
        let rider = riders::claim_available_rider(None, now, &mut tx).await?;
        let record = deliveries::insert_delivery(&delivery, &number, rider.as_ref().map(|r| r.id), now, &mut tx).await?;
        let note = match &rider {
            Some(r) => format!("Assigned to {} (rider #{})", r.name, r.id),
            None => "Waiting for an available rider".to_string(),
        };
        deliveries::insert_event(record.id, record.status, Some(&note), now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Delivery {} created for order #{} in {}", record.delivery_number, record.order_id, record.status);
        Ok(DeliveryCreated { delivery: record, rider })
    }

    async fn fetch_delivery(&self, id: i64) -> Result<Option<Delivery>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let delivery = deliveries::fetch_delivery(id, &mut conn).await?;
        Ok(delivery)
    }

    async fn fetch_delivery_for_order(&self, order_id: i64) -> Result<Option<Delivery>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let delivery = deliveries::fetch_delivery_for_order(order_id, &mut conn).await?;
        Ok(delivery)
    }

    async fn fetch_delivery_events(&self, delivery_id: i64) -> Result<Vec<DeliveryEvent>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let events = deliveries::fetch_events(delivery_id, &mut conn).await?;
        Ok(events)
    }

    async fn assign_pending_delivery(&self, delivery_id: i64) -> Result<Option<DeliveryCreated>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let current =
            deliveries::touch(delivery_id, now, &mut tx).await?.ok_or(LedgerError::DeliveryNotFound(delivery_id))?;
        if current.status != DeliveryStatus::Pending || current.rider_id.is_some() {
            return Ok(None);
        }
        let Some(rider) = riders::claim_available_rider(None, now, &mut tx).await? else {
            return Ok(None);
        };
        let Some(delivery) = deliveries::assign(delivery_id, rider.id, DeliveryStatus::Pending, now, &mut tx).await?
        else {
            return Ok(None);
        };
        let note = format!("Assigned to {} (rider #{})", rider.name, rider.id);
        deliveries::insert_event(delivery_id, DeliveryStatus::Assigned, Some(&note), now, &mut tx).await?;
        tx.commit().await?;
        Ok(Some(DeliveryCreated { delivery, rider: Some(rider) }))
    }

    async fn reassign_delivery(&self, delivery_id: i64, reason: &str) -> Result<Option<Reassignment>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let current =
            deliveries::touch(delivery_id, now, &mut tx).await?.ok_or(LedgerError::DeliveryNotFound(delivery_id))?;
        if !current.status.can_transition_to(DeliveryStatus::Assigned) {
            return Err(LedgerError::IllegalTransition { from: current.status, to: DeliveryStatus::Assigned });
        }
        let Some(new_rider) = riders::claim_available_rider(current.rider_id, now, &mut tx).await? else {
            trace!("🗃️ No other rider is available for delivery #{delivery_id}");
            return Ok(None);
        };
        let previous_rider = match current.rider_id {
            Some(id) => riders::free_rider(id, 0, now, &mut tx).await?,
            None => None,
        };
        let delivery = deliveries::assign(delivery_id, new_rider.id, current.status, now, &mut tx)
            .await?
            .ok_or(LedgerError::DeliveryNotFound(delivery_id))?;
        let note = format!("Reassigned to {} (rider #{}): {reason}", new_rider.name, new_rider.id);
        deliveries::insert_event(delivery_id, DeliveryStatus::Assigned, Some(&note), now, &mut tx).await?;
        tx.commit().await?;
        Ok(Some(Reassignment { delivery, previous_rider, new_rider }))
    }

    async fn transition_delivery(
        &self,
        delivery_id: i64,
        to: DeliveryStatus,
        rider_id: Option<i64>,
        note: Option<&str>,
        auto_release_at: Option<DateTime<Utc>>,
    ) -> Result<DeliveryTransition, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let current =
            deliveries::touch(delivery_id, now, &mut tx).await?.ok_or(LedgerError::DeliveryNotFound(delivery_id))?;
        if let Some(rider_id) = rider_id {
            if current.rider_id != Some(rider_id) {
                return Err(LedgerError::NotAssignedRider { delivery_id, rider_id });
            }
        }
        // Assignment goes through assign_pending_delivery / reassign_delivery, which pick the rider.
        if to == DeliveryStatus::Assigned || !current.status.can_transition_to(to) {
            return Err(LedgerError::IllegalTransition { from: current.status, to });
        }
        let release_at = if to == DeliveryStatus::Delivered { auto_release_at } else { None };
        let delivery = deliveries::update_status(delivery_id, current.status, to, release_at, now, &mut tx)
            .await?
            .ok_or(LedgerError::IllegalTransition { from: current.status, to })?;
        deliveries::insert_event(delivery_id, to, note, now, &mut tx).await?;
        let freed_rider = match (to, current.rider_id) {
            (DeliveryStatus::Delivered, Some(id)) => riders::free_rider(id, 1, now, &mut tx).await?,
            (DeliveryStatus::Cancelled, Some(id)) => riders::free_rider(id, 0, now, &mut tx).await?,
            _ => None,
        };
        let order = match to.fulfillment_status() {
            Some(status) => orders::update_fulfillment_status(delivery.order_id, status, now, &mut tx).await?,
            None => orders::fetch_order(delivery.order_id, &mut tx).await?,
        }
        .ok_or(LedgerError::OrderNotFound(delivery.order_id))?;
        tx.commit().await?;
        debug!("🗃️ Delivery {} moved from {} to {to}", delivery.delivery_number, current.status);
        Ok(DeliveryTransition { from: current.status, delivery, order, freed_rider })
    }

    async fn confirm_delivery(&self, delivery_id: i64) -> Result<Option<Delivery>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let delivery = deliveries::confirm(delivery_id, Utc::now(), &mut conn).await?;
        Ok(delivery)
    }

    async fn fetch_stuck_assignments(&self, assigned_before: DateTime<Utc>) -> Result<Vec<Delivery>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let deliveries = deliveries::fetch_stuck(assigned_before, &mut conn).await?;
        Ok(deliveries)
    }

    async fn fetch_unassigned_deliveries(&self) -> Result<Vec<Delivery>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let deliveries = deliveries::fetch_unassigned(&mut conn).await?;
        Ok(deliveries)
    }

    async fn fetch_deliveries_due_for_release(&self, now: DateTime<Utc>) -> Result<Vec<Delivery>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let deliveries = deliveries::fetch_due_for_release(now, &mut conn).await?;
        Ok(deliveries)
    }

    async fn fetch_rider(&self, id: i64) -> Result<Option<Rider>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let rider = riders::fetch_rider(id, &mut conn).await?;
        Ok(rider)
    }

    async fn set_rider_online(&self, rider_id: i64, online: bool) -> Result<Rider, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(rider) = riders::set_online(rider_id, online, Utc::now(), &mut conn).await? {
            return Ok(rider);
        }
        match riders::fetch_rider(rider_id, &mut conn).await? {
            None => Err(LedgerError::RiderNotFound(rider_id)),
            Some(r) if r.approval_status != ApprovalStatus::Approved => Err(LedgerError::RiderNotApproved(rider_id)),
            Some(_) => Err(LedgerError::RiderBusy(rider_id)),
        }
    }

    async fn update_rider_location(&self, rider_id: i64, lat: f64, lng: f64) -> Result<Rider, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        riders::update_location(rider_id, lat, lng, Utc::now(), &mut conn)
            .await?
            .ok_or(LedgerError::RiderNotFound(rider_id))
    }
}

impl ActivityManagement for SqliteDatabase {
    async fn record_activity(&self, activity: NewActivity) -> Result<ActivityEntry, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let entry = activity::insert_activity(activity, &mut conn).await?;
        Ok(entry)
    }

    async fn fetch_recent_activity(&self, limit: i64) -> Result<Vec<ActivityEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let entries = activity::fetch_recent(limit, &mut conn).await?;
        Ok(entries)
    }

    async fn fetch_activity_for_order(&self, order_id: i64) -> Result<Vec<ActivityEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let entries = activity::fetch_for_order(order_id, &mut conn).await?;
        Ok(entries)
    }
}

impl LeaseManagement for SqliteDatabase {
    async fn try_acquire_lease(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let acquired = leases::try_acquire(name, holder, ttl, Utc::now(), &mut conn).await?;
        Ok(acquired)
    }

    async fn release_lease(&self, name: &str, holder: &str) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        leases::release(name, holder, &mut conn).await?;
        Ok(())
    }
}
