//! Contracts for the external collaborators: the payment gateway, the messaging channel and the invoice renderer.
//!
//! All of these are slow, independently failing network services. The engine treats every call to a [`Notifier`] or
//! [`InvoiceService`] as best-effort, and only the payment gateway's results ever influence the ledger.
use dispatch_common::Kobo;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("{0} is not configured")]
    NotConfigured(String),
    #[error("Could not send the request. {0}")]
    RequestFailed(String),
    #[error("The remote service returned status {status}. {message}")]
    Rejected { status: u16, message: String },
    #[error("Could not interpret the response. {0}")]
    InvalidResponse(String),
    #[error("The request was refused. {0}")]
    Refused(String),
}

//--------------------------------------   Payment gateway  ----------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Email or phone handle the gateway uses to identify the customer
    pub customer: String,
    pub amount: Kobo,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeAuthorization {
    pub authorization_url: String,
    pub access_code: Option<String>,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundAck {
    pub reference: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccount {
    pub account_number: String,
    pub account_name: String,
    pub bank_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub recipient_code: String,
    pub amount: Kobo,
    pub reference: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferAck {
    pub transfer_code: String,
    pub status: String,
}

#[allow(async_fn_in_trait)]
pub trait PaymentGateway: Clone {
    async fn initialize_charge(&self, request: &ChargeRequest) -> Result<ChargeAuthorization, GatewayError>;

    /// Refunds a charge. If `amount` is `None` the whole charge is refunded.
    async fn refund(&self, reference: &str, amount: Option<Kobo>) -> Result<RefundAck, GatewayError>;

    async fn resolve_bank_code(&self, bank_name: &str) -> Result<String, GatewayError>;

    async fn verify_account_number(&self, account_number: &str, bank_code: &str) -> Result<BankAccount, GatewayError>;

    /// Registers a bank account as a transfer recipient, returning the recipient code.
    async fn create_transfer_recipient(&self, account: &BankAccount) -> Result<String, GatewayError>;

    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<TransferAck, GatewayError>;
}

//--------------------------------------      Messaging     ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptButton {
    pub id: String,
    pub title: String,
}

impl PromptButton {
    pub fn new<I: Into<String>, T: Into<String>>(id: I, title: T) -> Self {
        Self { id: id.into(), title: title.into() }
    }
}

#[allow(async_fn_in_trait)]
pub trait Notifier: Clone {
    async fn send_text(&self, recipient: &str, body: &str) -> Result<(), GatewayError>;

    async fn send_document(&self, recipient: &str, url: &str, caption: &str, filename: &str)
        -> Result<(), GatewayError>;

    async fn send_interactive_prompt(
        &self,
        recipient: &str,
        body: &str,
        buttons: &[PromptButton],
    ) -> Result<(), GatewayError>;
}

//--------------------------------------      Invoices      ----------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: i64,
    pub unit_price: Kobo,
    pub line_total: Kobo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub order_number: String,
    pub customer_id: String,
    pub lines: Vec<InvoiceLine>,
    pub delivery_fee: Kobo,
    pub total: Kobo,
    pub payment_reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDocument {
    pub url: String,
    pub filename: String,
}

#[allow(async_fn_in_trait)]
pub trait InvoiceService: Clone {
    async fn render_invoice(&self, invoice: &InvoiceRequest) -> Result<InvoiceDocument, GatewayError>;
}
