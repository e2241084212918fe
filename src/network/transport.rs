//! Message transport
//!
//! Delivery is best-effort, unordered, fire-and-forget: a failed send is
//! logged and dropped, never retried or surfaced. A broadcast is N
//! independent sends (self included) and is not atomic; partial delivery
//! is normal, not an error.

use crate::consensus::ConsensusMessage;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one message to the node at `target`. No acknowledgment, no
    /// retry, no ordering guarantee relative to other sends.
    async fn send(&self, target: usize, message: &ConsensusMessage);

    /// Send to every node index 0..N, including the sender itself.
    async fn broadcast(&self, message: &ConsensusMessage);
}

/// HTTP transport posting JSON to `http://127.0.0.1:{base_port + target}/message`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_port: u16,
    total_nodes: usize,
}

impl HttpTransport {
    pub fn new(base_port: u16, total_nodes: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        HttpTransport {
            client,
            base_port,
            total_nodes,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, target: usize, message: &ConsensusMessage) {
        let url = format!(
            "http://127.0.0.1:{}/message",
            self.base_port + target as u16
        );
        let client = self.client.clone();
        let body = message.clone();
        // Spawned so the caller never waits on a slow or dead peer.
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&body).send().await {
                debug!(url = %url, error = %e, "send failed, message dropped");
            }
        });
    }

    async fn broadcast(&self, message: &ConsensusMessage) {
        for target in 0..self.total_nodes {
            self.send(target, message).await;
        }
    }
}
