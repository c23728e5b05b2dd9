use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};

/// Formats a human-readable, date-sequenced identifier, e.g. `ORD-20241001-0042`.
pub fn format_sequence_number(prefix: &str, day: &str, value: i64) -> String {
    format!("{prefix}-{day}-{value:04}")
}

fn random_suffix(len: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect::<String>().to_ascii_uppercase()
}

/// A payment reference handed to the payment gateway at checkout. Unique with overwhelming probability; the
/// database's unique index catches the rest.
pub fn new_payment_reference(now: DateTime<Utc>) -> String {
    format!("DSP-{}-{}", now.format("%Y%m%d%H%M%S"), random_suffix(10))
}

pub fn new_withdrawal_reference(now: DateTime<Utc>) -> String {
    format!("WDR-{}-{}", now.format("%Y%m%d%H%M%S"), random_suffix(10))
}
