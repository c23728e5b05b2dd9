//! Recording fakes of the payment gateway, messaging channel and invoice renderer.
//!
//! Each fake is cheap to clone and every clone shares the same record, so a test can hand one copy to the engine and
//! inspect another. Failures are switched on per operation.
use std::sync::{Arc, Mutex, MutexGuard};

use dispatch_common::Kobo;

use crate::traits::{
    BankAccount,
    ChargeAuthorization,
    ChargeRequest,
    GatewayError,
    InvoiceDocument,
    InvoiceRequest,
    InvoiceService,
    Notifier,
    PaymentGateway,
    PromptButton,
    RefundAck,
    TransferAck,
    TransferRequest,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().expect("fake state lock poisoned")
}

fn refused(what: &str) -> GatewayError {
    GatewayError::Rejected { status: 503, message: format!("{what} switched off in test") }
}

//--------------------------------------   Payment gateway  ----------------------------------------------------------
#[derive(Debug, Default)]
struct GatewayState {
    charges: Vec<ChargeRequest>,
    refunds: Vec<(String, Option<Kobo>)>,
    recipients: Vec<BankAccount>,
    transfers: Vec<TransferRequest>,
    fail_charges: bool,
    fail_refunds: bool,
    fail_account_lookup: bool,
    fail_transfers: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_charges(&self, fail: bool) {
        lock(&self.state).fail_charges = fail;
    }

    pub fn fail_refunds(&self, fail: bool) {
        lock(&self.state).fail_refunds = fail;
    }

    pub fn fail_account_lookup(&self, fail: bool) {
        lock(&self.state).fail_account_lookup = fail;
    }

    pub fn fail_transfers(&self, fail: bool) {
        lock(&self.state).fail_transfers = fail;
    }

    pub fn charges(&self) -> Vec<ChargeRequest> {
        lock(&self.state).charges.clone()
    }

    pub fn refunds(&self) -> Vec<(String, Option<Kobo>)> {
        lock(&self.state).refunds.clone()
    }

    pub fn transfers(&self) -> Vec<TransferRequest> {
        lock(&self.state).transfers.clone()
    }
}

impl PaymentGateway for FakeGateway {
    async fn initialize_charge(&self, request: &ChargeRequest) -> Result<ChargeAuthorization, GatewayError> {
        let mut state = lock(&self.state);
        if state.fail_charges {
            return Err(refused("charges"));
        }
        state.charges.push(request.clone());
        Ok(ChargeAuthorization {
            authorization_url: format!("https://checkout.example.test/{}", request.reference),
            access_code: Some(format!("ac_{}", state.charges.len())),
            reference: request.reference.clone(),
        })
    }

    async fn refund(&self, reference: &str, amount: Option<Kobo>) -> Result<RefundAck, GatewayError> {
        let mut state = lock(&self.state);
        if state.fail_refunds {
            return Err(refused("refunds"));
        }
        state.refunds.push((reference.to_string(), amount));
        Ok(RefundAck { reference: reference.to_string(), status: "pending".into() })
    }

    async fn resolve_bank_code(&self, bank_name: &str) -> Result<String, GatewayError> {
        match bank_name.to_lowercase().as_str() {
            "access bank" => Ok("044".into()),
            "gtbank" | "guaranty trust bank" => Ok("058".into()),
            "opay" => Ok("999992".into()),
            _ => Err(GatewayError::Refused(format!("Unknown bank: {bank_name}"))),
        }
    }

    async fn verify_account_number(&self, account_number: &str, bank_code: &str) -> Result<BankAccount, GatewayError> {
        if lock(&self.state).fail_account_lookup || account_number.len() != 10 {
            return Err(GatewayError::Refused(format!("Could not resolve account {account_number}")));
        }
        Ok(BankAccount {
            account_number: account_number.to_string(),
            account_name: "ADA OKAFOR".into(),
            bank_code: bank_code.to_string(),
        })
    }

    async fn create_transfer_recipient(&self, account: &BankAccount) -> Result<String, GatewayError> {
        let mut state = lock(&self.state);
        state.recipients.push(account.clone());
        Ok(format!("RCP_{}", account.account_number))
    }

    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<TransferAck, GatewayError> {
        let mut state = lock(&self.state);
        if state.fail_transfers {
            return Err(refused("transfers"));
        }
        state.transfers.push(request.clone());
        Ok(TransferAck { transfer_code: format!("TRF_{}", state.transfers.len()), status: "success".into() })
    }
}

//--------------------------------------      Messaging     ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub enum SentMessage {
    Text { to: String, body: String },
    Document { to: String, url: String, caption: String, filename: String },
    Prompt { to: String, body: String, buttons: Vec<PromptButton> },
}

impl SentMessage {
    pub fn recipient(&self) -> &str {
        match self {
            SentMessage::Text { to, .. } | SentMessage::Document { to, .. } | SentMessage::Prompt { to, .. } => to,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            SentMessage::Text { body, .. } | SentMessage::Prompt { body, .. } => body,
            SentMessage::Document { caption, .. } => caption,
        }
    }
}

#[derive(Debug, Default)]
struct NotifierState {
    sent: Vec<SentMessage>,
    fail: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FakeNotifier {
    state: Arc<Mutex<NotifierState>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_all(&self, fail: bool) {
        lock(&self.state).fail = fail;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.state).sent.clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<SentMessage> {
        lock(&self.state).sent.iter().filter(|m| m.recipient() == recipient).cloned().collect()
    }

    /// True if any message to `recipient` contains `fragment`
    pub fn received(&self, recipient: &str, fragment: &str) -> bool {
        self.sent_to(recipient).iter().any(|m| m.body().contains(fragment))
    }

    fn record(&self, message: SentMessage) -> Result<(), GatewayError> {
        let mut state = lock(&self.state);
        if state.fail {
            return Err(refused("messaging"));
        }
        state.sent.push(message);
        Ok(())
    }
}

impl Notifier for FakeNotifier {
    async fn send_text(&self, recipient: &str, body: &str) -> Result<(), GatewayError> {
        self.record(SentMessage::Text { to: recipient.to_string(), body: body.to_string() })
    }

    async fn send_document(
        &self,
        recipient: &str,
        url: &str,
        caption: &str,
        filename: &str,
    ) -> Result<(), GatewayError> {
        self.record(SentMessage::Document {
            to: recipient.to_string(),
            url: url.to_string(),
            caption: caption.to_string(),
            filename: filename.to_string(),
        })
    }

    async fn send_interactive_prompt(
        &self,
        recipient: &str,
        body: &str,
        buttons: &[PromptButton],
    ) -> Result<(), GatewayError> {
        self.record(SentMessage::Prompt { to: recipient.to_string(), body: body.to_string(), buttons: buttons.to_vec() })
    }
}

//--------------------------------------      Invoices      ----------------------------------------------------------
#[derive(Debug, Default)]
struct InvoiceState {
    attempts: u32,
    rendered: Vec<InvoiceRequest>,
    failures_remaining: u32,
}

#[derive(Debug, Clone, Default)]
pub struct FakeInvoices {
    state: Arc<Mutex<InvoiceState>>,
}

impl FakeInvoices {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` render calls fail.
    pub fn fail_next(&self, n: u32) {
        lock(&self.state).failures_remaining = n;
    }

    pub fn attempts(&self) -> u32 {
        lock(&self.state).attempts
    }

    pub fn rendered(&self) -> Vec<InvoiceRequest> {
        lock(&self.state).rendered.clone()
    }
}

impl InvoiceService for FakeInvoices {
    async fn render_invoice(&self, invoice: &InvoiceRequest) -> Result<InvoiceDocument, GatewayError> {
        let mut state = lock(&self.state);
        state.attempts += 1;
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(GatewayError::RequestFailed("renderer timed out".into()));
        }
        state.rendered.push(invoice.clone());
        Ok(InvoiceDocument {
            url: format!("https://invoices.example.test/{}.pdf", invoice.order_number),
            filename: format!("{}.pdf", invoice.order_number),
        })
    }
}
