//! Tie-break randomness
//!
//! When a vote round ends with an exact split, Ben-Or falls back to a coin
//! flip. The source of that flip sits behind a trait so tests can inject a
//! seeded generator and replay the same run.

use crate::consensus::types::Value;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait CoinFlip: Send {
    /// Uniformly random Zero or One.
    fn flip(&mut self) -> Value;
}

/// Production default: the thread-local OS-seeded generator.
pub struct ThreadRngCoin;

impl CoinFlip for ThreadRngCoin {
    fn flip(&mut self) -> Value {
        if rand::thread_rng().gen_bool(0.5) {
            Value::One
        } else {
            Value::Zero
        }
    }
}

/// Deterministic coin for reproducible simulations.
pub struct SeededCoin {
    rng: StdRng,
}

impl SeededCoin {
    pub fn new(seed: u64) -> Self {
        SeededCoin {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl CoinFlip for SeededCoin {
    fn flip(&mut self) -> Value {
        if self.rng.gen_bool(0.5) {
            Value::One
        } else {
            Value::Zero
        }
    }
}
