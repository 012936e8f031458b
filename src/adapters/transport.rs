//! Pub/sub transport adapter: subscribe topics, receive
//! messages, publish messages.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// A single message received on a subscribed topic.
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub payload: Value,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribe to a topic under the pool's namespace.
    async fn subscribe(&self, topic: &str) -> Result<()>;

    /// Block up to `timeout` for the next message across all subscribed
    /// topics. Returns `None` on timeout (not an error).
    async fn get_message(&self, timeout: Duration) -> Result<Option<Message>>;

    /// Publish a JSON payload to `topic`.
    async fn publish(&self, topic: &str, payload: &Value) -> Result<()>;
}

/// Production adapter: IPFS pubsub over the Kubo HTTP RPC API
/// (`pubsub/sub` and `pubsub/pub`).
///
/// Kubo pubsub delivers messages per-topic via long-lived streaming `GET`
/// requests; a real implementation fans those streams into a shared
/// channel that `get_message` drains. That plumbing is intentionally not
/// included here (it is infrastructure, not daemon logic) — this adapter
/// documents the wire calls the daemon relies on.
pub struct IpfsPubsub {
    api_base: String,
    client: reqwest::Client,
    inbox: tokio::sync::Mutex<tokio::sync::mpsc::UnboundedReceiver<Message>>,
    sender: tokio::sync::mpsc::UnboundedSender<Message>,
}

impl IpfsPubsub {
    pub fn new(api_base: impl Into<String>) -> Self {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        Self {
            api_base: api_base.into(),
            client: reqwest::Client::new(),
            inbox: tokio::sync::Mutex::new(receiver),
            sender,
        }
    }

    /// Test/operator hook to inject a message as though it arrived over
    /// the wire (used by the streaming fan-in task in a full deployment).
    pub fn inject(&self, message: Message) {
        let _ = self.sender.send(message);
    }
}

#[async_trait]
impl Transport for IpfsPubsub {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        let url = format!(
            "{}/api/v0/pubsub/sub?arg={}",
            self.api_base,
            urlencoding::encode(topic)
        );
        self.client
            .post(&url)
            .send()
            .await
            .context("failed to subscribe to topic")?;
        Ok(())
    }

    async fn get_message(&self, timeout: Duration) -> Result<Option<Message>> {
        let mut inbox = self.inbox.lock().await;
        match tokio::time::timeout(timeout, inbox.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Ok(None),
            Err(_) => Ok(None),
        }
    }

    async fn publish(&self, topic: &str, payload: &Value) -> Result<()> {
        let json_str = serde_json::to_string(payload)?;
        let url = format!(
            "{}/api/v0/pubsub/pub?arg={}&arg={}",
            self.api_base,
            urlencoding::encode(topic),
            urlencoding::encode(&json_str)
        );
        self.client
            .post(&url)
            .send()
            .await
            .context("failed to publish to topic")?;
        Ok(())
    }
}
