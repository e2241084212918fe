//! Consensus types and data structures

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// A protocol value: one of the two decision bits, or "?" when a round's
/// proposals produced no majority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Zero,
    One,
    Unknown,
}

impl Value {
    /// The bit this value carries, if it carries one.
    pub fn as_bit(self) -> Option<u8> {
        match self {
            Value::Zero => Some(0),
            Value::One => Some(1),
            Value::Unknown => None,
        }
    }

    pub fn from_bit(bit: u8) -> Result<Self, ConsensusError> {
        match bit {
            0 => Ok(Value::Zero),
            1 => Ok(Value::One),
            other => Err(ConsensusError::InvalidValue(other.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Zero => write!(f, "0"),
            Value::One => write!(f, "1"),
            Value::Unknown => write!(f, "?"),
        }
    }
}

// The wire format mixes integers and a string in one field: 0, 1, or "?".
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Zero => serializer.serialize_u64(0),
            Value::One => serializer.serialize_u64(1),
            Value::Unknown => serializer.serialize_str("?"),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0, 1, or \"?\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        match v {
            0 => Ok(Value::Zero),
            1 => Ok(Value::One),
            other => Err(E::custom(format!("value out of domain: {}", other))),
        }
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        match v {
            0 => Ok(Value::Zero),
            1 => Ok(Value::One),
            other => Err(E::custom(format!("value out of domain: {}", other))),
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        match v {
            "?" => Ok(Value::Unknown),
            "0" => Ok(Value::Zero),
            "1" => Ok(Value::One),
            other => Err(E::custom(format!("value out of domain: {:?}", other))),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Message phase within a round.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Propose,
    Vote,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Propose => write!(f, "propose"),
            MessageType::Vote => write!(f, "vote"),
        }
    }
}

/// One protocol message. No sender identity is carried or verified.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConsensusMessage {
    pub k: u64,
    pub x: Value,
    #[serde(rename = "messageType")]
    pub message_type: MessageType,
}

impl ConsensusMessage {
    pub fn propose(k: u64, x: Value) -> Self {
        ConsensusMessage {
            k,
            x,
            message_type: MessageType::Propose,
        }
    }

    pub fn vote(k: u64, x: Value) -> Self {
        ConsensusMessage {
            k,
            x,
            message_type: MessageType::Vote,
        }
    }

    /// Domain check beyond what deserialization already enforces.
    /// Rounds are 1-based on the wire.
    pub fn validate(&self) -> Result<(), ConsensusError> {
        if self.k == 0 {
            return Err(ConsensusError::InvalidRound(self.k));
        }
        Ok(())
    }
}

/// Immutable snapshot of a node's consensus state. Fields are `None` until
/// the node starts (and stay `None` forever on a faulty node), which
/// serializes as JSON `null`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeState {
    pub killed: bool,
    pub x: Option<Value>,
    pub decided: Option<bool>,
    pub k: Option<u64>,
}

impl NodeState {
    pub fn unset() -> Self {
        NodeState {
            killed: false,
            x: None,
            decided: None,
            k: None,
        }
    }
}

/// Errors surfaced at the message API boundary. Faulty or killed nodes never
/// error; a malformed message does, instead of silently propagating.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("invalid round number: {0} (rounds are 1-based)")]
    InvalidRound(u64),
    #[error("invalid value: {0} (expected 0, 1, or \"?\")")]
    InvalidValue(String),
    #[error("invalid message type: {0} (expected \"propose\" or \"vote\")")]
    InvalidMessageType(String),
}
