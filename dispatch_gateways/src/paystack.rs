use std::fmt::Debug;

use dispatch_common::{Kobo, NAIRA_CURRENCY_CODE};
use dispatch_engine::traits::{
    BankAccount,
    ChargeAuthorization,
    ChargeRequest,
    GatewayError,
    PaymentGateway,
    RefundAck,
    TransferAck,
    TransferRequest,
};
use log::*;
use reqwest::Method;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use crate::{config::PaystackConfig, http::JsonClient};

/// Every Paystack response is wrapped in `{ status, message, data }`.
#[derive(Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, GatewayError> {
        if !self.status {
            return Err(GatewayError::Refused(self.message));
        }
        self.data.ok_or_else(|| GatewayError::InvalidResponse(format!("No data in the response. {}", self.message)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Bank {
    pub name: String,
    pub code: String,
}

// Names customers actually type, mapped to the names on Paystack's bank list
const BANK_ALIASES: [(&str, &str); 6] = [
    ("gtb", "guaranty trust bank"),
    ("gtbank", "guaranty trust bank"),
    ("gtco", "guaranty trust bank"),
    ("uba", "united bank for africa"),
    ("firstbank", "first bank of nigeria"),
    ("fcmb", "first city monument bank"),
];

fn normalise(name: &str) -> String {
    name.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect()
}

/// Finds the bank code for a bank name: exact match first, then known aliases, then a unique partial match.
pub(crate) fn find_bank_code(banks: &[Bank], bank_name: &str) -> Option<String> {
    let wanted = normalise(bank_name);
    if wanted.is_empty() {
        return None;
    }
    let wanted = match BANK_ALIASES.iter().find(|(alias, _)| *alias == wanted) {
        Some((_, name)) => normalise(name),
        None => wanted,
    };
    if let Some(bank) = banks.iter().find(|b| normalise(&b.name) == wanted) {
        return Some(bank.code.clone());
    }
    let mut partial = banks.iter().filter(|b| normalise(&b.name).contains(&wanted));
    match (partial.next(), partial.next()) {
        (Some(bank), None) => Some(bank.code.clone()),
        _ => None,
    }
}

#[derive(Clone)]
pub struct PaystackClient {
    config: PaystackConfig,
    http: JsonClient,
}

impl Debug for PaystackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaystackClient({})", self.config.base_url)
    }
}

impl PaystackClient {
    pub fn new(config: PaystackConfig) -> Result<Self, GatewayError> {
        let http = JsonClient::new(&config.base_url, Some(&config.secret_key))?;
        Ok(Self { config, http })
    }

    async fn call<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T, GatewayError> {
        if self.config.secret_key.is_empty() {
            return Err(GatewayError::NotConfigured("Paystack (DSP_PAYSTACK_SECRET_KEY)".to_string()));
        }
        let envelope = self.http.rest_query::<Envelope<T>, B>(method, path, params, body).await?;
        envelope.into_data()
    }

    /// Paystack wants an email address for every charge. Customers who only gave us a phone number get a stable
    /// synthetic address.
    fn customer_email(&self, customer: &str) -> String {
        if customer.contains('@') {
            customer.to_string()
        } else {
            let digits = customer.chars().filter(char::is_ascii_digit).collect::<String>();
            format!("{digits}@{}", self.config.customer_email_domain)
        }
    }
}

impl PaymentGateway for PaystackClient {
    async fn initialize_charge(&self, request: &ChargeRequest) -> Result<ChargeAuthorization, GatewayError> {
        let body = json!({
            "email": self.customer_email(&request.customer),
            "amount": request.amount,
            "currency": NAIRA_CURRENCY_CODE,
            "reference": request.reference,
            "metadata": { "customer": request.customer },
        });
        let auth = self.call::<ChargeAuthorization, _>(Method::POST, "/transaction/initialize", &[], Some(body)).await?;
        debug!("💳️ Charge {} initialised for {}", auth.reference, request.amount);
        Ok(auth)
    }

    async fn refund(&self, reference: &str, amount: Option<Kobo>) -> Result<RefundAck, GatewayError> {
        #[derive(Deserialize)]
        struct RefundData {
            status: String,
        }
        let mut body = json!({ "transaction": reference });
        if let Some(amount) = amount {
            body["amount"] = json!(amount);
        }
        let data = self.call::<RefundData, _>(Method::POST, "/refund", &[], Some(body)).await?;
        info!("💳️ Refund for {reference} accepted by Paystack. Status: {}", data.status);
        Ok(RefundAck { reference: reference.to_string(), status: data.status })
    }

    async fn resolve_bank_code(&self, bank_name: &str) -> Result<String, GatewayError> {
        let params = [("country", "nigeria"), ("perPage", "100")];
        let banks = self.call::<Vec<Bank>, ()>(Method::GET, "/bank", &params, None).await?;
        find_bank_code(&banks, bank_name).ok_or_else(|| GatewayError::Refused(format!("Unknown bank: {bank_name}")))
    }

    async fn verify_account_number(&self, account_number: &str, bank_code: &str) -> Result<BankAccount, GatewayError> {
        #[derive(Deserialize)]
        struct ResolvedAccount {
            account_number: String,
            account_name: String,
        }
        let params = [("account_number", account_number), ("bank_code", bank_code)];
        let account = self.call::<ResolvedAccount, ()>(Method::GET, "/bank/resolve", &params, None).await?;
        Ok(BankAccount {
            account_number: account.account_number,
            account_name: account.account_name,
            bank_code: bank_code.to_string(),
        })
    }

    async fn create_transfer_recipient(&self, account: &BankAccount) -> Result<String, GatewayError> {
        #[derive(Deserialize)]
        struct Recipient {
            recipient_code: String,
        }
        let body = json!({
            "type": "nuban",
            "name": account.account_name,
            "account_number": account.account_number,
            "bank_code": account.bank_code,
            "currency": NAIRA_CURRENCY_CODE,
        });
        let recipient = self.call::<Recipient, _>(Method::POST, "/transferrecipient", &[], Some(body)).await?;
        Ok(recipient.recipient_code)
    }

    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<TransferAck, GatewayError> {
        let body = json!({
            "source": "balance",
            "amount": request.amount,
            "recipient": request.recipient_code,
            "reference": request.reference,
            "reason": request.reason,
        });
        let ack = self.call::<TransferAck, _>(Method::POST, "/transfer", &[], Some(body)).await?;
        info!("💸️ Transfer {} of {} queued. Status: {}", request.reference, request.amount, ack.status);
        Ok(ack)
    }
}
