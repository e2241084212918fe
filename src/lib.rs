//! Ben-Or binary consensus simulator
//!
//! Simulates randomized binary Byzantine agreement across N independently
//! addressable nodes, up to F of which are faulty. Each node runs its own
//! consensus engine behind a small HTTP API; the launcher binary spins up
//! all N in one process.

pub mod consensus;
pub mod logger;
pub mod network;
pub mod node;

pub use consensus::{
    CoinFlip, ConsensusEngine, ConsensusError, ConsensusMessage, MessageType, NodeState,
    SeededCoin, ThreadRngCoin, Value,
};
pub use network::{HttpTransport, Transport};
pub use node::{NodeConfig, NodeProcess, ReadinessGate};
