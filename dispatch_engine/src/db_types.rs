//! Data types that are persisted in (and loaded from) the ledger store.
//!
//! Every status column is a closed enum. They are stored as `SCREAMING_SNAKE_CASE` text so that the database remains
//! readable for operators, and converted back into enums on load, so there are no stringly-typed comparisons in the
//! engine.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use dispatch_common::Kobo;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid {kind} value: {value}")]
pub struct ConversionError {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a status enum along with its database representation, `Display` and `FromStr` impls.
macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
        #[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ConversionError { kind: stringify!($name), value: s.to_string() }),
                }
            }
        }
    };
}

//--------------------------------------   Status enums     ----------------------------------------------------------
status_enum!(
    /// Where the customer's money is, from the payment gateway's point of view.
    PaymentStatus {
        Pending => "PENDING",
        Paid => "PAID",
        Failed => "FAILED",
    }
);

status_enum!(
    /// Fulfilment status of an order. Orders are never deleted, only moved to `Cancelled`.
    FulfillmentStatus {
        Pending => "PENDING",
        Processing => "PROCESSING",
        Shipped => "SHIPPED",
        Delivered => "DELIVERED",
        Cancelled => "CANCELLED",
    }
);

status_enum!(
    EscrowStatus {
        Held => "HELD",
        Released => "RELEASED",
    }
);

status_enum!(
    /// The delivery state machine. See [`DeliveryStatus::can_transition_to`] for the legal moves.
    DeliveryStatus {
        Pending => "PENDING",
        Assigned => "ASSIGNED",
        PickedUp => "PICKED_UP",
        InTransit => "IN_TRANSIT",
        Delivered => "DELIVERED",
        Cancelled => "CANCELLED",
    }
);

status_enum!(
    RiderStatus {
        Offline => "OFFLINE",
        Available => "AVAILABLE",
        Busy => "BUSY",
    }
);

status_enum!(
    ApprovalStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
    }
);

status_enum!(
    /// Ledger entry types. Credits add to the balance; debits and withdrawals subtract from it.
    TransactionType {
        Credit => "CREDIT",
        Debit => "DEBIT",
        Withdrawal => "WITHDRAWAL",
    }
);

status_enum!(
    PayoutStatus {
        Pending => "PENDING",
        Processing => "PROCESSING",
        Paid => "PAID",
        Failed => "FAILED",
    }
);

status_enum!(
    FeeTransactionStatus {
        Pending => "PENDING",
        Completed => "COMPLETED",
    }
);

status_enum!(
    WithdrawalStatus {
        Pending => "PENDING",
        Completed => "COMPLETED",
        Failed => "FAILED",
    }
);

status_enum!(
    /// Severity of an operational activity-log entry. `High` and `Critical` raise live alerts.
    Severity {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
        Critical => "CRITICAL",
    }
);

status_enum!(
    OwnerType {
        Merchant => "MERCHANT",
        Rider => "RIDER",
        Platform => "PLATFORM",
    }
);

impl DeliveryStatus {
    /// The exhaustive transition table for deliveries.
    ///
    /// | From \ To  | Assigned | PickedUp | InTransit | Delivered | Cancelled |
    /// |------------|----------|----------|-----------|-----------|-----------|
    /// | Pending    | yes      |          |           |           | yes       |
    /// | Assigned   | yes (1)  | yes      |           |           | yes       |
    /// | PickedUp   |          |          | yes       |           | yes       |
    /// | InTransit  |          |          |           | yes       | yes       |
    /// | Delivered  |          |          |           |           |           |
    /// | Cancelled  |          |          |           |           |           |
    ///
    /// (1) Reassignment to a different rider.
    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        match (self, next) {
            (Pending, Assigned | Cancelled) => true,
            (Assigned, Assigned | PickedUp | Cancelled) => true,
            (PickedUp, InTransit | Cancelled) => true,
            (InTransit, Delivered | Cancelled) => true,
            (Pending | Assigned | PickedUp | InTransit | Delivered | Cancelled, _) => false,
        }
    }

    /// A rider is busy exactly while their delivery is in one of these states.
    pub fn is_active(&self) -> bool {
        matches!(self, DeliveryStatus::Assigned | DeliveryStatus::PickedUp | DeliveryStatus::InTransit)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }

    /// The order fulfilment status implied by reaching this delivery status, if any.
    pub fn fulfillment_status(&self) -> Option<FulfillmentStatus> {
        match self {
            DeliveryStatus::PickedUp | DeliveryStatus::InTransit => Some(FulfillmentStatus::Shipped),
            DeliveryStatus::Delivered => Some(FulfillmentStatus::Delivered),
            DeliveryStatus::Cancelled => Some(FulfillmentStatus::Cancelled),
            DeliveryStatus::Pending | DeliveryStatus::Assigned => None,
        }
    }
}

impl TransactionType {
    /// Applies the sign implied by the entry type to an (unsigned) amount.
    pub fn signed(&self, amount: Kobo) -> Kobo {
        match self {
            TransactionType::Credit => amount,
            TransactionType::Debit | TransactionType::Withdrawal => -amount,
        }
    }
}

impl Severity {
    pub fn raises_alert(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

//--------------------------------------      Merchant      ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Merchant {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub pickup_address: Option<String>,
    pub pickup_lat: Option<f64>,
    pub pickup_lng: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Merchant {
    pub fn pickup_location(&self) -> Option<Location> {
        match (&self.pickup_address, self.pickup_lat, self.pickup_lng) {
            (Some(address), Some(lat), Some(lng)) => Some(Location { address: address.clone(), lat, lng }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub lat: f64,
    pub lng: f64,
}

//--------------------------------------      Product       ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub merchant_id: i64,
    pub name: String,
    /// The customer-facing price, including the platform markup
    pub retail_price: Kobo,
    /// The merchant's listed price
    pub wholesale_price: Kobo,
    pub stock: i64,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        Order       ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    /// Human-readable number, `ORD-YYYYMMDD-NNNN`
    pub order_number: String,
    /// The customer's messaging handle (phone number)
    pub customer_id: String,
    pub merchant_id: i64,
    pub delivery_address: String,
    pub delivery_lat: f64,
    pub delivery_lng: f64,
    pub subtotal: Kobo,
    pub delivery_fee: Kobo,
    /// `subtotal + delivery_fee`, fixed at creation and never recomputed
    pub total_amount: Kobo,
    /// Unique, immutable reference used to correlate payment gateway events with this order
    pub payment_reference: String,
    pub payment_status: PaymentStatus,
    pub status: FulfillmentStatus,
    /// True while product stock is held on behalf of this order
    pub stock_reserved: bool,
    pub payment_expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    /// Retail unit price captured when the order was placed
    pub unit_price: Kobo,
    /// Wholesale unit price captured when the order was placed
    pub wholesale_price: Kobo,
}

impl OrderItem {
    pub fn line_total(&self) -> Kobo {
        self.unit_price * self.quantity
    }

    pub fn wholesale_total(&self) -> Kobo {
        self.wholesale_price * self.quantity
    }

    pub fn markup_total(&self) -> Kobo {
        (self.unit_price - self.wholesale_price) * self.quantity
    }
}

/// A request to place an order. Prices are not supplied by the caller; they are captured from the catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: String,
    pub merchant_id: i64,
    pub delivery_address: String,
    pub delivery_lat: f64,
    pub delivery_lng: f64,
    pub delivery_fee: Kobo,
    pub items: Vec<NewOrderItem>,
    /// If true, stock is decremented when the order is placed rather than when it is paid for.
    #[serde(default)]
    pub reserve_stock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub quantity: i64,
}

/// A fully priced order, ready to be written to the store.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub customer_id: String,
    pub merchant_id: i64,
    pub delivery_address: String,
    pub delivery_lat: f64,
    pub delivery_lng: f64,
    pub delivery_fee: Kobo,
    pub payment_reference: String,
    pub payment_expires_at: DateTime<Utc>,
    pub reserve_stock: bool,
    pub lines: Vec<PricedLine>,
}

impl OrderDraft {
    pub fn subtotal(&self) -> Kobo {
        self.lines.iter().map(|l| l.unit_price * l.quantity).sum()
    }

    pub fn total_amount(&self) -> Kobo {
        self.subtotal() + self.delivery_fee
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Kobo,
    pub wholesale_price: Kobo,
}

/// Current stock position for one line of an order.
#[derive(Debug, Clone, FromRow)]
pub struct StockLine {
    pub product_id: i64,
    pub product_name: String,
    pub required: i64,
    pub available: i64,
    pub active: bool,
}

//--------------------------------------       Escrow       ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Escrow {
    pub id: i64,
    pub order_id: i64,
    pub merchant_id: i64,
    pub amount: Kobo,
    pub delivery_fee_amount: Kobo,
    pub status: EscrowStatus,
    pub held_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

//--------------------------------------       Wallets      ----------------------------------------------------------
/// Identifies the owner of a wallet. There is exactly one platform wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletOwner {
    Merchant(i64),
    Rider(i64),
    Platform,
}

impl WalletOwner {
    pub fn owner_type(&self) -> OwnerType {
        match self {
            WalletOwner::Merchant(_) => OwnerType::Merchant,
            WalletOwner::Rider(_) => OwnerType::Rider,
            WalletOwner::Platform => OwnerType::Platform,
        }
    }

    pub fn owner_id(&self) -> i64 {
        match self {
            WalletOwner::Merchant(id) | WalletOwner::Rider(id) => *id,
            WalletOwner::Platform => 0,
        }
    }
}

impl Display for WalletOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletOwner::Merchant(id) => write!(f, "merchant #{id}"),
            WalletOwner::Rider(id) => write!(f, "rider #{id}"),
            WalletOwner::Platform => write!(f, "platform"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub owner_type: OwnerType,
    pub owner_id: i64,
    pub balance: Kobo,
    pub total_earned: Kobo,
    pub total_withdrawn: Kobo,
    /// Platform markup captured from settled orders (platform wallet only)
    pub commission_earned: Kobo,
    /// Delivery fee revenue (rider share for rider wallets, platform share for the platform wallet)
    pub delivery_fees_earned: Kobo,
    pub updated_at: DateTime<Utc>,
}

/// An append-only ledger entry. `amount` is always positive; its sign is implied by `tx_type`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: i64,
    pub wallet_id: i64,
    pub tx_type: TransactionType,
    pub amount: Kobo,
    pub balance_after: Kobo,
    pub reference: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn signed_amount(&self) -> Kobo {
        self.tx_type.signed(self.amount)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Payout {
    pub id: i64,
    pub merchant_id: i64,
    pub order_id: i64,
    pub amount: Kobo,
    pub status: PayoutStatus,
    pub transfer_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct DeliveryFeeTransaction {
    pub id: i64,
    pub delivery_id: i64,
    pub rider_id: i64,
    pub total_fee: Kobo,
    pub rider_amount: Kobo,
    pub platform_amount: Kobo,
    pub status: FeeTransactionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: i64,
    pub wallet_id: i64,
    pub amount: Kobo,
    pub reference: String,
    pub recipient_code: String,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       Riders       ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Rider {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub approval_status: ApprovalStatus,
    pub status: RiderStatus,
    pub total_earnings: Kobo,
    pub total_deliveries: i64,
    pub current_lat: Option<f64>,
    pub current_lng: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     Deliveries     ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Delivery {
    pub id: i64,
    /// Human-readable number, `DEL-YYYYMMDD-NNNN`
    pub delivery_number: String,
    pub order_id: i64,
    pub rider_id: Option<i64>,
    pub status: DeliveryStatus,
    pub pickup_address: String,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub dropoff_address: String,
    pub dropoff_lat: f64,
    pub dropoff_lng: f64,
    pub delivery_fee: Kobo,
    pub assigned_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub in_transit_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub customer_confirmed: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub auto_release_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub order_id: i64,
    pub pickup: Location,
    pub dropoff: Location,
    pub delivery_fee: Kobo,
}

/// Immutable audit trail entry, written on every delivery transition.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub id: i64,
    pub delivery_id: i64,
    pub status: DeliveryStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------    Activity log    ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub category: String,
    pub severity: Severity,
    pub message: String,
    pub order_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub category: String,
    pub severity: Severity,
    pub message: String,
    pub order_id: Option<i64>,
}

impl NewActivity {
    pub fn new<C: Into<String>, M: Into<String>>(category: C, severity: Severity, message: M) -> Self {
        Self { category: category.into(), severity, message: message.into(), order_id: None }
    }

    pub fn for_order(mut self, order_id: i64) -> Self {
        self.order_id = Some(order_id);
        self
    }
}
