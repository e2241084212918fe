//! Ben-Or binary consensus
//!
//! Per-node state machine for randomized binary Byzantine agreement:
//! round-based propose/vote exchange, N−F quorum detection, the F+1
//! decision rule, and a coin-flip fallback when a round splits.
//!
//! ## Structure
//! - `types.rs` - Wire message, value domain, state snapshot, errors
//! - `engine.rs` - The consensus state machine itself
//! - `coin.rs` - Pluggable tie-break randomness
//! - `tests.rs` - Unit tests and multi-node simulations

// Re-export public API
pub use coin::{CoinFlip, SeededCoin, ThreadRngCoin};
pub use engine::ConsensusEngine;
pub use types::{ConsensusError, ConsensusMessage, MessageType, NodeState, Value};


// Internal modules
mod coin;
mod engine;
mod types;
