use std::fmt::Debug;

use dispatch_engine::traits::{GatewayError, InvoiceDocument, InvoiceRequest, InvoiceService};
use log::*;
use reqwest::Method;

use crate::{config::InvoiceRendererConfig, http::JsonClient};

/// Client for the invoice rendering service. It accepts the invoice as JSON and answers with the URL of the
/// rendered PDF.
#[derive(Clone)]
pub struct InvoiceRendererClient {
    config: InvoiceRendererConfig,
    http: JsonClient,
}

impl Debug for InvoiceRendererClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InvoiceRendererClient({})", self.config.url)
    }
}

impl InvoiceRendererClient {
    pub fn new(config: InvoiceRendererConfig) -> Result<Self, GatewayError> {
        let http = JsonClient::new(&config.url, None)?;
        Ok(Self { config, http })
    }
}

impl InvoiceService for InvoiceRendererClient {
    async fn render_invoice(&self, invoice: &InvoiceRequest) -> Result<InvoiceDocument, GatewayError> {
        if self.config.url.is_empty() {
            return Err(GatewayError::NotConfigured("Invoice renderer (DSP_INVOICE_RENDERER_URL)".to_string()));
        }
        let doc = self.http.rest_query::<InvoiceDocument, _>(Method::POST, "/invoices", &[], Some(invoice)).await?;
        if doc.url.is_empty() {
            return Err(GatewayError::InvalidResponse(format!("No document URL for invoice {}", invoice.order_number)));
        }
        debug!("💳️ Invoice for {} rendered at {}", invoice.order_number, doc.url);
        Ok(doc)
    }
}
