use dispatch_common::Secret;
use log::*;

pub const DEFAULT_PAYSTACK_URL: &str = "https://api.paystack.co";
pub const DEFAULT_WHATSAPP_URL: &str = "https://graph.facebook.com/v19.0";

#[derive(Debug, Clone, Default)]
pub struct PaystackConfig {
    pub base_url: String,
    /// The API key. Paystack also signs webhooks with it.
    pub secret_key: Secret<String>,
    /// Used to build an email handle for customers that only have a phone number, since Paystack requires one.
    pub customer_email_domain: String,
}

impl PaystackConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("DSP_PAYSTACK_BASE_URL").unwrap_or_else(|_| {
            debug!("🪛️ DSP_PAYSTACK_BASE_URL not set, using {DEFAULT_PAYSTACK_URL}");
            DEFAULT_PAYSTACK_URL.to_string()
        });
        let secret_key = Secret::new(std::env::var("DSP_PAYSTACK_SECRET_KEY").unwrap_or_else(|_| {
            error!(
                "🪛️ DSP_PAYSTACK_SECRET_KEY is not set. Webhooks cannot be verified and every call to Paystack will \
                 fail."
            );
            String::default()
        }));
        let customer_email_domain =
            std::env::var("DSP_PAYSTACK_EMAIL_DOMAIN").unwrap_or_else(|_| "customers.dispatch.ng".to_string());
        Self { base_url, secret_key, customer_email_domain }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WhatsAppConfig {
    pub base_url: String,
    pub access_token: Secret<String>,
    pub phone_number_id: String,
}

impl WhatsAppConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("DSP_WHATSAPP_API_URL").unwrap_or_else(|_| {
            debug!("🪛️ DSP_WHATSAPP_API_URL not set, using {DEFAULT_WHATSAPP_URL}");
            DEFAULT_WHATSAPP_URL.to_string()
        });
        let access_token = Secret::new(std::env::var("DSP_WHATSAPP_ACCESS_TOKEN").unwrap_or_else(|_| {
            warn!("🪛️ DSP_WHATSAPP_ACCESS_TOKEN not set. No messages will be sent.");
            String::default()
        }));
        let phone_number_id = std::env::var("DSP_WHATSAPP_PHONE_NUMBER_ID").unwrap_or_else(|_| {
            warn!("🪛️ DSP_WHATSAPP_PHONE_NUMBER_ID not set. No messages will be sent.");
            String::default()
        });
        Self { base_url, access_token, phone_number_id }
    }

    pub fn is_configured(&self) -> bool {
        !self.access_token.is_empty() && !self.phone_number_id.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceRendererConfig {
    /// Base URL of the rendering service. Empty if invoices are disabled.
    pub url: String,
}

impl InvoiceRendererConfig {
    pub fn new_from_env_or_default() -> Self {
        let url = std::env::var("DSP_INVOICE_RENDERER_URL").unwrap_or_else(|_| {
            warn!("🪛️ DSP_INVOICE_RENDERER_URL not set. Customers will not receive invoices.");
            String::default()
        });
        Self { url }
    }
}
