use std::fmt::Debug;

use dispatch_engine::traits::{GatewayError, Notifier, PromptButton};
use log::*;
use reqwest::Method;
use serde_json::{json, Value};

use crate::{config::WhatsAppConfig, http::JsonClient};

/// WhatsApp allows at most three reply buttons per message
pub const MAX_BUTTONS: usize = 3;
/// and at most 20 characters per button title.
pub const MAX_BUTTON_TITLE: usize = 20;

/// The Cloud API wants bare international numbers: no `+`, spaces or dashes.
fn wa_number(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

fn text_payload(to: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": wa_number(to),
        "type": "text",
        "text": { "preview_url": false, "body": body },
    })
}

fn document_payload(to: &str, url: &str, caption: &str, filename: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": wa_number(to),
        "type": "document",
        "document": { "link": url, "caption": caption, "filename": filename },
    })
}

fn prompt_payload(to: &str, body: &str, buttons: &[PromptButton]) -> Value {
    if buttons.len() > MAX_BUTTONS {
        warn!("💬️ Only the first {MAX_BUTTONS} of {} buttons can be sent", buttons.len());
    }
    let buttons = buttons
        .iter()
        .take(MAX_BUTTONS)
        .map(|b| {
            let title = b.title.chars().take(MAX_BUTTON_TITLE).collect::<String>();
            json!({ "type": "reply", "reply": { "id": b.id, "title": title } })
        })
        .collect::<Vec<_>>();
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": wa_number(to),
        "type": "interactive",
        "interactive": {
            "type": "button",
            "body": { "text": body },
            "action": { "buttons": buttons },
        },
    })
}

#[derive(Clone)]
pub struct WhatsAppClient {
    config: WhatsAppConfig,
    http: JsonClient,
}

impl Debug for WhatsAppClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WhatsAppClient({})", self.config.phone_number_id)
    }
}

impl WhatsAppClient {
    pub fn new(config: WhatsAppConfig) -> Result<Self, GatewayError> {
        let http = JsonClient::new(&config.base_url, Some(&config.access_token))?;
        Ok(Self { config, http })
    }

    async fn send(&self, payload: Value) -> Result<(), GatewayError> {
        if !self.config.is_configured() {
            return Err(GatewayError::NotConfigured(
                "WhatsApp (DSP_WHATSAPP_ACCESS_TOKEN, DSP_WHATSAPP_PHONE_NUMBER_ID)".to_string(),
            ));
        }
        let path = format!("/{}/messages", self.config.phone_number_id);
        let response = self.http.rest_query::<Value, Value>(Method::POST, &path, &[], Some(payload)).await?;
        trace!("💬️ Message accepted: {}", response["messages"][0]["id"]);
        Ok(())
    }
}

impl Notifier for WhatsAppClient {
    async fn send_text(&self, recipient: &str, body: &str) -> Result<(), GatewayError> {
        debug!("💬️ Sending text to {recipient}");
        self.send(text_payload(recipient, body)).await
    }

    async fn send_document(
        &self,
        recipient: &str,
        url: &str,
        caption: &str,
        filename: &str,
    ) -> Result<(), GatewayError> {
        debug!("💬️ Sending {filename} to {recipient}");
        self.send(document_payload(recipient, url, caption, filename)).await
    }

    async fn send_interactive_prompt(
        &self,
        recipient: &str,
        body: &str,
        buttons: &[PromptButton],
    ) -> Result<(), GatewayError> {
        debug!("💬️ Sending a prompt with {} buttons to {recipient}", buttons.len());
        self.send(prompt_payload(recipient, body, buttons)).await
    }
}
