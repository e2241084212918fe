//! Node process wrapper
//!
//! `NodeProcess` owns one consensus engine and wires it to the transport
//! and the readiness gate. The engine sits behind a mutex so message
//! handling is serialized per node; outbound broadcasts are dispatched only
//! after the lock is released, so a handler always runs to completion over
//! a consistent ballot.

pub mod readiness;

pub use readiness::ReadinessGate;

use crate::consensus::{
    ConsensusEngine, ConsensusError, ConsensusMessage, NodeState, SeededCoin, Value,
};
use crate::network::Transport;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Per-node run configuration. Safety of the protocol assumes
/// `total_nodes >= 3 * faulty_bound + 1`; that is a deployment
/// precondition, not validated here.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: usize,
    pub total_nodes: usize,
    pub faulty_bound: usize,
    pub initial_value: Value,
    pub faulty: bool,
    pub base_port: u16,
    /// Optional round ceiling; `None` lets rounds run unbounded.
    pub max_round: Option<u64>,
    /// Seed for the tie-break coin; `None` uses thread-local randomness.
    pub coin_seed: Option<u64>,
}

impl NodeConfig {
    /// Deterministic addressing: node i listens on base_port + i.
    pub fn port(&self) -> u16 {
        self.base_port + self.node_id as u16
    }
}

pub struct NodeProcess {
    config: NodeConfig,
    engine: Mutex<ConsensusEngine>,
    transport: Arc<dyn Transport>,
    gate: ReadinessGate,
}

impl NodeProcess {
    pub fn new(config: NodeConfig, transport: Arc<dyn Transport>, gate: ReadinessGate) -> Self {
        let mut engine = ConsensusEngine::new(
            config.node_id,
            config.total_nodes,
            config.faulty_bound,
            config.faulty,
        )
        .with_max_round(config.max_round);
        if let Some(seed) = config.coin_seed {
            // Offset by node id so seeded peers do not flip in lockstep.
            engine = engine.with_coin(Box::new(SeededCoin::new(seed + config.node_id as u64)));
        }
        NodeProcess {
            engine: Mutex::new(engine),
            config,
            transport,
            gate,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Faulty nodes always report unhealthy, regardless of killed or
    /// round progress.
    pub fn is_healthy(&self) -> bool {
        self.engine.lock().is_healthy()
    }

    pub fn state(&self) -> NodeState {
        self.engine.lock().snapshot()
    }

    /// Begin consensus. Blocks (cooperatively) until every peer has
    /// registered with the readiness gate, then broadcasts round 1.
    pub async fn start(&self) {
        self.gate.wait_all_ready().await;
        let outbound = self.engine.lock().start(self.config.initial_value);
        self.dispatch(outbound).await;
    }

    /// Handle one protocol message. Always succeeds for well-formed input,
    /// even when the node is faulty or killed and discards it internally.
    pub async fn handle_message(&self, msg: &ConsensusMessage) -> Result<(), ConsensusError> {
        msg.validate()?;
        let outbound = self.engine.lock().on_message(msg);
        self.dispatch(outbound).await;
        Ok(())
    }

    /// Idempotent kill switch.
    pub fn stop(&self) {
        self.engine.lock().stop();
        info!(node = self.config.node_id, "node stopped");
    }

    async fn dispatch(&self, outbound: Vec<ConsensusMessage>) {
        for msg in outbound {
            self.transport.broadcast(&msg).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::MessageType;
    use async_trait::async_trait;

    /// Captures broadcasts instead of sending them anywhere.
    struct RecordingTransport {
        sent: Mutex<Vec<ConsensusMessage>>,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            Arc::new(RecordingTransport {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn broadcasts(&self) -> Vec<ConsensusMessage> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, _target: usize, message: &ConsensusMessage) {
            self.sent.lock().push(message.clone());
        }

        async fn broadcast(&self, message: &ConsensusMessage) {
            self.sent.lock().push(message.clone());
        }
    }

    fn config(node_id: usize, faulty: bool) -> NodeConfig {
        NodeConfig {
            node_id,
            total_nodes: 4,
            faulty_bound: 1,
            initial_value: Value::One,
            faulty,
            base_port: 9000,
            max_round: None,
            coin_seed: Some(7),
        }
    }

    #[tokio::test]
    async fn start_waits_for_gate_then_broadcasts_round_one() {
        let gate = ReadinessGate::new(4);
        let transport = RecordingTransport::new();
        let node = Arc::new(NodeProcess::new(config(0, false), transport.clone(), gate.clone()));

        let started = {
            let node = node.clone();
            tokio::spawn(async move { node.start().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!started.is_finished());
        assert!(transport.broadcasts().is_empty());

        for i in 0..4 {
            gate.mark_ready(i);
        }
        tokio::time::timeout(std::time::Duration::from_secs(1), started)
            .await
            .expect("start never returned")
            .unwrap();

        let sent = transport.broadcasts();
        assert_eq!(sent, vec![ConsensusMessage::propose(1, Value::One)]);
        let state = node.state();
        assert_eq!(state.k, Some(1));
        assert_eq!(state.decided, Some(false));
    }

    #[tokio::test]
    async fn faulty_node_start_resets_state_and_stays_silent() {
        let gate = ReadinessGate::new(1);
        gate.mark_ready(0);
        let transport = RecordingTransport::new();
        let mut cfg = config(0, true);
        cfg.total_nodes = 1;
        let node = NodeProcess::new(cfg, transport.clone(), gate);

        node.start().await;

        assert!(!node.is_healthy());
        assert!(transport.broadcasts().is_empty());
        let state = node.state();
        assert_eq!(state.x, None);
        assert_eq!(state.decided, None);
        assert_eq!(state.k, None);
    }

    #[tokio::test]
    async fn killed_node_acknowledges_but_discards_messages() {
        let gate = ReadinessGate::new(4);
        let transport = RecordingTransport::new();
        let node = NodeProcess::new(config(1, false), transport.clone(), gate);

        node.stop();
        node.stop(); // idempotent

        for _ in 0..4 {
            node.handle_message(&ConsensusMessage::propose(1, Value::Zero))
                .await
                .unwrap();
        }
        assert!(transport.broadcasts().is_empty());
        assert!(node.state().killed);
    }

    #[tokio::test]
    async fn malformed_round_is_rejected() {
        let gate = ReadinessGate::new(4);
        let node = NodeProcess::new(config(2, false), RecordingTransport::new(), gate);

        let bad = ConsensusMessage {
            k: 0,
            x: Value::One,
            message_type: MessageType::Vote,
        };
        assert!(matches!(
            node.handle_message(&bad).await,
            Err(ConsensusError::InvalidRound(0))
        ));
    }
}
