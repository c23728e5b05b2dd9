use std::{sync::Arc, time::Duration};

use dispatch_common::Secret;
use dispatch_engine::traits::GatewayError;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A JSON-over-HTTPS client bound to one base URL, optionally with a bearer token.
#[derive(Clone)]
pub(crate) struct JsonClient {
    base_url: String,
    client: Arc<Client>,
}

impl JsonClient {
    pub fn new(base_url: &str, bearer: Option<&Secret<String>>) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::with_capacity(2);
        if let Some(token) = bearer {
            let mut val = HeaderValue::from_str(&format!("Bearer {}", token.reveal()))
                .map_err(|e| GatewayError::NotConfigured(format!("Invalid API token. {e}")))?;
            val.set_sensitive(true);
            headers.insert(AUTHORIZATION, val);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::NotConfigured(format!("Could not build the HTTP client. {e}")))?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T, GatewayError> {
        let url = self.url(path);
        trace!("Sending {method} {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| GatewayError::RequestFailed(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            trace!("Request successful. {status}");
            response.json::<T>().await.map_err(|e| GatewayError::InvalidResponse(e.to_string()))
        } else {
            let text = response.text().await.map_err(|e| GatewayError::RequestFailed(e.to_string()))?;
            Err(GatewayError::Rejected { status: status.as_u16(), message: error_message(&text) })
        }
    }
}

/// Pulls a readable message out of an error body. Most APIs send JSON with a `message` or `error.message` field;
/// anything else is returned as is.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(v) => v["message"]
            .as_str()
            .or_else(|| v["error"]["message"].as_str())
            .or_else(|| v["error"].as_str())
            .map(String::from)
            .unwrap_or_else(|| body.to_string()),
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_messages() {
        assert_eq!(error_message(r#"{"status":false,"message":"Invalid key"}"#), "Invalid key");
        assert_eq!(
            error_message(r#"{"error":{"message":"(#131030) Recipient phone number not in allowed list","code":131030}}"#),
            "(#131030) Recipient phone number not in allowed list"
        );
        assert_eq!(error_message(r#"{"error":"not found"}"#), "not found");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(error_message(r#"{"detail":"?"}"#), r#"{"detail":"?"}"#);
    }

    #[test]
    fn base_url_is_normalised() {
        let client = JsonClient::new("https://api.paystack.co/", None).unwrap();
        assert_eq!(client.url("/refund"), "https://api.paystack.co/refund");
    }
}
