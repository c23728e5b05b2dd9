//! Live connections for server-sent event feeds.
//!
//! The registry owns one channel per open connection. Connections subscribe to a topic (e.g. `alerts`) under a
//! recipient id, and the rest of the server pushes payloads to a whole topic with [`ConnectionRegistry::broadcast`]
//! or to one recipient with [`ConnectionRegistry::send_to`]. Closed connections are pruned whenever a send finds them.
use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use futures::{stream, Stream};
use log::*;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    RwLock,
};

pub const ALERTS_TOPIC: &str = "alerts";
pub const DELIVERIES_TOPIC: &str = "deliveries";

/// Messages queued for a slow connection beyond this are dropped for that connection.
const CONNECTION_BUFFER: usize = 64;

struct Connection {
    recipient: String,
    sender: mpsc::Sender<String>,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    topics: Arc<RwLock<HashMap<String, Vec<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a connection for `recipient` on `topic`. The connection lives until the receiver is dropped.
    pub async fn subscribe(&self, topic: &str, recipient: &str) -> mpsc::Receiver<String> {
        let (sender, receiver) = mpsc::channel(CONNECTION_BUFFER);
        let mut topics = self.topics.write().await;
        topics.entry(topic.to_string()).or_default().push(Connection { recipient: recipient.to_string(), sender });
        debug!("📬️ {recipient} subscribed to {topic}");
        receiver
    }

    /// Sends `payload` to every connection on `topic`. Returns the number of connections that received it.
    pub async fn broadcast(&self, topic: &str, payload: &str) -> usize {
        let mut topics = self.topics.write().await;
        let Some(connections) = topics.get_mut(topic) else {
            return 0;
        };
        let mut delivered = 0;
        connections.retain(|c| match c.sender.try_send(payload.to_string()) {
            Ok(()) => {
                delivered += 1;
                true
            },
            Err(TrySendError::Full(_)) => {
                warn!("📬️ The {topic} feed for {} is backed up. Dropping a message.", c.recipient);
                true
            },
            Err(TrySendError::Closed(_)) => false,
        });
        trace!("📬️ Broadcast on {topic} reached {delivered} connections");
        delivered
    }

    /// Sends `payload` to every open connection of `recipient`, on any topic. Returns `false` if the recipient has
    /// no open connection.
    pub async fn send_to(&self, recipient: &str, payload: &str) -> bool {
        let mut topics = self.topics.write().await;
        let mut delivered = false;
        for connections in topics.values_mut() {
            connections.retain(|c| {
                if c.recipient != recipient {
                    return !c.sender.is_closed();
                }
                match c.sender.try_send(payload.to_string()) {
                    Ok(()) => {
                        delivered = true;
                        true
                    },
                    Err(TrySendError::Full(_)) => true,
                    Err(TrySendError::Closed(_)) => false,
                }
            });
        }
        delivered
    }

    pub async fn connection_count(&self, topic: &str) -> usize {
        let topics = self.topics.read().await;
        topics.get(topic).map(|c| c.iter().filter(|c| !c.sender.is_closed()).count()).unwrap_or_default()
    }
}

/// Turns a subscription into a `text/event-stream` body. Each payload becomes one `data:` event.
pub fn sse_stream(receiver: mpsc::Receiver<String>) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    let hello = stream::once(async { Ok::<_, actix_web::Error>(Bytes::from_static(b": connected\n\n")) });
    let events = stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|payload| (Ok::<_, actix_web::Error>(sse_event(&payload)), receiver))
    });
    futures::StreamExt::chain(hello, events)
}

fn sse_event(payload: &str) -> Bytes {
    let mut event = String::with_capacity(payload.len() + 8);
    for line in payload.lines() {
        event.push_str("data: ");
        event.push_str(line);
        event.push('\n');
    }
    event.push('\n');
    Bytes::from(event)
}

#[cfg(test)]
mod test {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber_on_the_topic() {
        let registry = ConnectionRegistry::new();
        let mut a = registry.subscribe(ALERTS_TOPIC, "admin-a").await;
        let mut b = registry.subscribe(ALERTS_TOPIC, "admin-b").await;
        let mut c = registry.subscribe(DELIVERIES_TOPIC, "admin-a").await;
        assert_eq!(registry.broadcast(ALERTS_TOPIC, "payout failed").await, 2);
        assert_eq!(a.recv().await.as_deref(), Some("payout failed"));
        assert_eq!(b.recv().await.as_deref(), Some("payout failed"));
        assert!(c.try_recv().is_err());
        assert_eq!(registry.broadcast("nobody", "hello").await, 0);
    }

    #[tokio::test]
    async fn closed_connections_are_pruned() {
        let registry = ConnectionRegistry::new();
        let a = registry.subscribe(ALERTS_TOPIC, "admin-a").await;
        let _b = registry.subscribe(ALERTS_TOPIC, "admin-b").await;
        drop(a);
        assert_eq!(registry.connection_count(ALERTS_TOPIC).await, 1);
        assert_eq!(registry.broadcast(ALERTS_TOPIC, "x").await, 1);
    }

    #[tokio::test]
    async fn send_to_targets_one_recipient() {
        let registry = ConnectionRegistry::new();
        let mut a = registry.subscribe(ALERTS_TOPIC, "admin-a").await;
        let mut b = registry.subscribe(ALERTS_TOPIC, "admin-b").await;
        assert!(registry.send_to("admin-b", "just for you").await);
        assert_eq!(b.recv().await.as_deref(), Some("just for you"));
        assert!(a.try_recv().is_err());
        assert!(!registry.send_to("admin-c", "anyone?").await);
    }

    #[tokio::test]
    async fn payloads_become_sse_events() {
        let registry = ConnectionRegistry::new();
        let receiver = registry.subscribe(ALERTS_TOPIC, "admin").await;
        registry.broadcast(ALERTS_TOPIC, "line one\nline two").await;
        let mut stream = Box::pin(sse_stream(receiver));
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b": connected\n\n"));
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"data: line one\ndata: line two\n\n"));
    }
}
