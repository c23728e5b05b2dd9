use chrono::Duration;

/// Timings and policy knobs for the engine APIs. The defaults match production; tests shrink them.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a customer has to pay for an order after checkout
    pub payment_window: Duration,
    /// How long after `DELIVERED` the escrow is released without customer confirmation
    pub auto_release_after: Duration,
    /// A delivery that has sat in `ASSIGNED` for longer than this is reassigned
    pub stuck_assignment_after: Duration,
    pub idempotency_ttl: Duration,
    /// How long a sweep lease is held before another instance may take it over
    pub lease_ttl: Duration,
    /// The rider's share of the delivery fee, in percent. The platform keeps the rest.
    pub rider_fee_percent: u8,
    pub invoice_attempts: u32,
    pub invoice_backoff: std::time::Duration,
    /// Pause between consecutive messages in a batched send
    pub broadcast_delay: std::time::Duration,
    pub order_prefix: String,
    pub delivery_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            payment_window: Duration::minutes(30),
            auto_release_after: Duration::hours(48),
            stuck_assignment_after: Duration::minutes(30),
            idempotency_ttl: Duration::hours(24),
            lease_ttl: Duration::minutes(5),
            rider_fee_percent: 80,
            invoice_attempts: 3,
            invoice_backoff: std::time::Duration::from_secs(2),
            broadcast_delay: std::time::Duration::from_millis(250),
            order_prefix: "ORD".to_string(),
            delivery_prefix: "DEL".to_string(),
        }
    }
}

impl EngineConfig {
    /// A configuration with near-zero delays, for tests.
    pub fn for_tests() -> Self {
        Self {
            invoice_backoff: std::time::Duration::from_millis(1),
            broadcast_delay: std::time::Duration::from_millis(1),
            ..Self::default()
        }
    }
}
