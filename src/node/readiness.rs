//! Readiness coordination
//!
//! A node must not broadcast its first proposal until every peer is
//! listening, or the opening proposals are lost and round 1 stalls. Each
//! node registers itself once its server is up; `start` awaits the gate
//! through a watch channel rather than spin-polling.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

struct GateInner {
    total_nodes: usize,
    registered: Mutex<HashSet<usize>>,
    tx: watch::Sender<usize>,
    rx: watch::Receiver<usize>,
}

#[derive(Clone)]
pub struct ReadinessGate {
    inner: Arc<GateInner>,
}

impl ReadinessGate {
    pub fn new(total_nodes: usize) -> Self {
        let (tx, rx) = watch::channel(0);
        ReadinessGate {
            inner: Arc::new(GateInner {
                total_nodes,
                registered: Mutex::new(HashSet::new()),
                tx,
                rx,
            }),
        }
    }

    /// Registration callback, invoked once a node's listener is bound.
    /// Re-registering the same index is harmless.
    pub fn mark_ready(&self, index: usize) {
        let count = {
            let mut registered = self.inner.registered.lock();
            registered.insert(index);
            registered.len()
        };
        debug!(index, count, total = self.inner.total_nodes, "node ready");
        let _ = self.inner.tx.send(count);
    }

    pub fn all_ready(&self) -> bool {
        self.inner.registered.lock().len() >= self.inner.total_nodes
    }

    /// Resolves once all N nodes have registered.
    pub async fn wait_all_ready(&self) {
        let total = self.inner.total_nodes;
        let mut rx = self.inner.rx.clone();
        let _ = rx.wait_for(|count| *count >= total).await;
    }
}
