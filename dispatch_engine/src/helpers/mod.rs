mod references;
mod retry;
mod webhook_signature;

pub use references::{format_sequence_number, new_payment_reference, new_withdrawal_reference};
pub use retry::retry_with_linear_backoff;
pub use webhook_signature::{calculate_webhook_signature, verify_webhook_signature};
