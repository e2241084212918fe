//! Ben-Or binary consensus state machine
//!
//! One engine per node. The engine is purely in-memory and performs no I/O:
//! every operation returns the messages the node must broadcast, and the
//! caller (the node process) hands them to the transport. This keeps the
//! quorum logic synchronous and testable without a network.
//!
//! Callers must serialize access: a ballot append followed by its threshold
//! check is not atomic, so no two handlers may interleave over the same
//! engine. The node process enforces this with a mutex.

use crate::consensus::coin::{CoinFlip, ThreadRngCoin};
use crate::consensus::types::{ConsensusMessage, MessageType, NodeState, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Ballots more than this many rounds behind the highest round observed are
/// dropped; nothing in the protocol reads that far back, and the per-round
/// maps would otherwise grow without bound in a long run.
const HISTORY_WINDOW: u64 = 8;

pub struct ConsensusEngine {
    node_id: usize,
    total_nodes: usize,
    faulty_bound: usize,
    faulty: bool,
    max_round: Option<u64>,
    killed: bool,
    x: Option<Value>,
    decided: Option<bool>,
    k: Option<u64>,
    /// Round -> received propose values, in arrival order.
    proposals: BTreeMap<u64, Vec<Value>>,
    /// Round -> received vote values, in arrival order.
    votes: BTreeMap<u64, Vec<Value>>,
    /// Rounds whose propose quorum already produced a vote broadcast.
    voted_rounds: BTreeSet<u64>,
    /// Rounds whose vote quorum already ran the decision rule.
    settled_rounds: BTreeSet<u64>,
    /// Highest round seen in any message. Pruning tracks this, not just the
    /// node's own round, so sub-quorum ballots for rounds the node never
    /// settles cannot pile up.
    horizon: u64,
    coin: Box<dyn CoinFlip>,
}

impl ConsensusEngine {
    /// `total_nodes` is N, `faulty_bound` is F. Safety needs N >= 3F+1;
    /// that is a deployment precondition, not checked here.
    pub fn new(node_id: usize, total_nodes: usize, faulty_bound: usize, faulty: bool) -> Self {
        ConsensusEngine {
            node_id,
            total_nodes,
            faulty_bound,
            faulty,
            max_round: None,
            killed: false,
            x: None,
            decided: None,
            k: None,
            proposals: BTreeMap::new(),
            votes: BTreeMap::new(),
            voted_rounds: BTreeSet::new(),
            settled_rounds: BTreeSet::new(),
            horizon: 0,
            coin: Box::new(ThreadRngCoin),
        }
    }

    /// Replace the tie-break coin (seeded in tests).
    pub fn with_coin(mut self, coin: Box<dyn CoinFlip>) -> Self {
        self.coin = coin;
        self
    }

    /// Cap round advancement; past the cap the node stalls undecided
    /// instead of re-proposing forever under message loss.
    pub fn with_max_round(mut self, max_round: Option<u64>) -> Self {
        self.max_round = max_round;
        self
    }

    /// Minimum same-round messages before a phase transition: N - F.
    pub fn quorum_size(&self) -> usize {
        self.total_nodes - self.faulty_bound
    }

    pub fn is_healthy(&self) -> bool {
        !self.faulty
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }

    pub fn snapshot(&self) -> NodeState {
        NodeState {
            killed: self.killed,
            x: self.x,
            decided: self.decided,
            k: self.k,
        }
    }

    /// Begin round 1 with the node's initial value. A faulty node instead
    /// resets its state to unset and emits nothing; that reset is gated on
    /// the fault flag alone, independent of `killed`.
    pub fn start(&mut self, initial: Value) -> Vec<ConsensusMessage> {
        if self.faulty {
            self.x = None;
            self.decided = None;
            self.k = None;
            debug!(node = self.node_id, "faulty node start: state reset");
            return Vec::new();
        }
        if self.killed {
            return Vec::new();
        }
        self.k = Some(1);
        self.x = Some(initial);
        self.decided = Some(false);
        info!(node = self.node_id, value = %initial, "starting consensus, round 1");
        vec![ConsensusMessage::propose(1, initial)]
    }

    /// Handle one incoming message. Faulty and killed nodes accept and
    /// discard silently; the caller still acknowledges receipt.
    pub fn on_message(&mut self, msg: &ConsensusMessage) -> Vec<ConsensusMessage> {
        if self.faulty || self.killed {
            return Vec::new();
        }
        self.horizon = self.horizon.max(msg.k);
        let outbound = match msg.message_type {
            MessageType::Propose => self.on_propose(msg.k, msg.x),
            MessageType::Vote => self.on_vote(msg.k, msg.x),
        };
        self.prune_history();
        outbound
    }

    /// Kill switch: future messages and starts become no-ops. Idempotent.
    pub fn stop(&mut self) {
        self.killed = true;
    }

    fn on_propose(&mut self, k: u64, x: Value) -> Vec<ConsensusMessage> {
        let quorum = self.quorum_size();
        let ballot = self.proposals.entry(k).or_default();
        ballot.push(x);
        let collected = ballot.len();
        if collected < quorum || self.voted_rounds.contains(&k) {
            return Vec::new();
        }
        // Quorum of proposals for this round: vote once, latched so later
        // proposals for the same round cannot re-fire the broadcast.
        self.voted_rounds.insert(k);
        let (count0, count1) = tally(&self.proposals[&k]);
        let agreed = if 2 * count0 > self.total_nodes {
            Value::Zero
        } else if 2 * count1 > self.total_nodes {
            Value::One
        } else {
            Value::Unknown
        };
        debug!(
            node = self.node_id,
            round = k,
            count0,
            count1,
            agreed = %agreed,
            "propose quorum reached, broadcasting vote"
        );
        vec![ConsensusMessage::vote(k, agreed)]
    }

    fn on_vote(&mut self, k: u64, x: Value) -> Vec<ConsensusMessage> {
        let quorum = self.quorum_size();
        let ballot = self.votes.entry(k).or_default();
        ballot.push(x);
        let collected = ballot.len();
        if collected < quorum || self.settled_rounds.contains(&k) {
            return Vec::new();
        }
        self.settled_rounds.insert(k);
        if self.decided == Some(true) {
            // Decision is terminal: ballots still grow but no transition runs.
            return Vec::new();
        }
        // "?" votes count toward the quorum but toward neither tally.
        let (count0, count1) = tally(&self.votes[&k]);
        let safe_majority = self.faulty_bound + 1;
        if count0 >= safe_majority {
            self.decide(Value::Zero, k);
            return Vec::new();
        }
        if count1 >= safe_majority {
            self.decide(Value::One, k);
            return Vec::new();
        }
        // No Byzantine-safe majority: fall back to the leaning value, or a
        // coin flip on an exact (or empty) split, and retry next round.
        let chosen = if count0 > count1 {
            Value::Zero
        } else if count1 > count0 {
            Value::One
        } else {
            self.coin.flip()
        };
        let next = k + 1;
        if next <= self.k.unwrap_or(0) {
            // Stale round settling late must not move k backwards.
            return Vec::new();
        }
        if let Some(cap) = self.max_round {
            if next > cap {
                warn!(
                    node = self.node_id,
                    round = k,
                    cap,
                    "round ceiling reached, stalling undecided"
                );
                self.x = Some(chosen);
                return Vec::new();
            }
        }
        self.k = Some(next);
        self.x = Some(chosen);
        debug!(
            node = self.node_id,
            round = next,
            value = %chosen,
            "no decision, re-proposing"
        );
        vec![ConsensusMessage::propose(next, chosen)]
    }

    fn decide(&mut self, value: Value, round: u64) {
        self.x = Some(value);
        self.decided = Some(true);
        info!(node = self.node_id, round, value = %value, "decided");
    }

    /// Drop ballots behind the trailing window. The node's current round is
    /// always retained: a peer spamming far-future rounds must not evict
    /// the ballot this node is still collecting.
    fn prune_history(&mut self) {
        let basis = self.horizon.max(self.k.unwrap_or(0));
        let cutoff = basis.saturating_sub(HISTORY_WINDOW);
        let current = self.k;
        self.proposals.retain(|&k, _| k >= cutoff || Some(k) == current);
        self.votes.retain(|&k, _| k >= cutoff || Some(k) == current);
        self.voted_rounds.retain(|&k| k >= cutoff || Some(k) == current);
        self.settled_rounds.retain(|&k| k >= cutoff || Some(k) == current);
    }

    #[cfg(test)]
    pub(crate) fn proposal_ballot(&self, k: u64) -> Option<&Vec<Value>> {
        self.proposals.get(&k)
    }

    #[cfg(test)]
    pub(crate) fn vote_ballot(&self, k: u64) -> Option<&Vec<Value>> {
        self.votes.get(&k)
    }

    #[cfg(test)]
    pub(crate) fn tracked_rounds(&self) -> usize {
        self.proposals.len() + self.votes.len()
    }
}

fn tally(ballot: &[Value]) -> (usize, usize) {
    let count0 = ballot.iter().filter(|v| **v == Value::Zero).count();
    let count1 = ballot.iter().filter(|v| **v == Value::One).count();
    (count0, count1)
}
