use std::time::Duration;

use log::*;

use crate::traits::{GatewayError, Notifier, PromptButton};

/// Wraps a [`Notifier`] with logging and rate-limited batch sends. Callers decide what to do with a failure; the
/// messenger only reports it.
#[derive(Clone)]
pub struct Messenger<N> {
    notifier: N,
    broadcast_delay: Duration,
}

impl<N> Messenger<N> {
    pub fn new(notifier: N, broadcast_delay: Duration) -> Self {
        Self { notifier, broadcast_delay }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }
}

impl<N> Messenger<N>
where N: Notifier
{
    pub async fn text(&self, recipient: &str, body: &str) -> Result<(), GatewayError> {
        trace!("💬️ Sending text to {recipient}");
        self.notifier.send_text(recipient, body).await.map_err(|e| {
            warn!("💬️ Could not send a message to {recipient}. {e}");
            e
        })
    }

    pub async fn document(&self, recipient: &str, url: &str, caption: &str, filename: &str) -> Result<(), GatewayError> {
        trace!("💬️ Sending {filename} to {recipient}");
        self.notifier.send_document(recipient, url, caption, filename).await.map_err(|e| {
            warn!("💬️ Could not send {filename} to {recipient}. {e}");
            e
        })
    }

    pub async fn prompt(&self, recipient: &str, body: &str, buttons: &[PromptButton]) -> Result<(), GatewayError> {
        trace!("💬️ Sending a {}-button prompt to {recipient}", buttons.len());
        self.notifier.send_interactive_prompt(recipient, body, buttons).await.map_err(|e| {
            warn!("💬️ Could not send a prompt to {recipient}. {e}");
            e
        })
    }

    /// Sends `body` to every recipient in turn, pausing between sends to stay inside the channel's throughput
    /// limits. Returns the recipients that could not be reached.
    pub async fn broadcast(&self, recipients: &[String], body: &str) -> Vec<(String, GatewayError)> {
        let mut failed = Vec::new();
        for (i, recipient) in recipients.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.broadcast_delay).await;
            }
            if let Err(e) = self.text(recipient, body).await {
                failed.push((recipient.clone(), e));
            }
        }
        debug!("💬️ Broadcast to {} recipients complete. {} failed.", recipients.len(), failed.len());
        failed
    }
}
