//! Record identifiers and the Snowflake-style generator that produces them.
//!
//! Bits 22-62: milliseconds since [`EPOCH_MILLIS`] (41 bits)
//! Bits 12-21: node id (10 bits)
//! Bits 0-11:  per-millisecond sequence (12 bits)

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CairnError, Result};

pub const EPOCH_MILLIS: u64 = 1_288_834_974_657;
pub const NODE_ID_BITS: u32 = 10;
pub const SEQUENCE_BITS: u32 = 12;
pub const MAX_NODE_ID: u64 = (1 << NODE_ID_BITS) - 1;
pub const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

const NODE_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = NODE_ID_BITS + SEQUENCE_BITS;

/// Create a 64-bit id from its timestamp, node and sequence parts.
pub fn compose_id(timestamp: u64, node_id: u64, sequence: u64) -> u64 {
    (timestamp << TIMESTAMP_SHIFT) | ((node_id & MAX_NODE_ID) << NODE_SHIFT) | (sequence & SEQUENCE_MASK)
}

/// Extract the timestamp (relative to [`EPOCH_MILLIS`]).
pub fn get_timestamp(id: u64) -> u64 {
    id >> TIMESTAMP_SHIFT
}

pub fn get_node_id(id: u64) -> u64 {
    (id >> NODE_SHIFT) & MAX_NODE_ID
}

pub fn get_sequence(id: u64) -> u64 {
    id & SEQUENCE_MASK
}

/// Unique, totally ordered identifier of a record within a collection.
///
/// Ordering is numeric; the textual form is the decimal representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(u64);

impl RecordId {
    pub fn new(value: u64) -> Self {
        RecordId(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Parse the decimal textual form.
    pub fn parse(text: &str) -> Result<Self> {
        text.parse()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = CairnError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u64>()
            .map(RecordId)
            .map_err(|_| CairnError::invalid_id(format!("'{s}' is not a valid record id")))
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        RecordId(value)
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug)]
struct GeneratorState {
    last_timestamp: u64,
    sequence: u64,
}

/// Snowflake id generator.
///
/// Ids are strictly increasing for one generator. When the wall clock moves
/// backwards the generator waits until it has caught up again.
#[derive(Debug)]
pub struct IdGenerator {
    node_id: u64,
    state: Mutex<GeneratorState>,
}

impl IdGenerator {
    pub fn new(node_id: u16) -> Result<Self> {
        let node_id = node_id as u64;
        if node_id > MAX_NODE_ID {
            return Err(CairnError::invalid_id(format!(
                "node id {node_id} exceeds the maximum of {MAX_NODE_ID}"
            )));
        }
        Ok(Self {
            node_id,
            state: Mutex::new(GeneratorState {
                last_timestamp: 0,
                sequence: 0,
            }),
        })
    }

    /// Create a generator with a randomly chosen node id.
    pub fn with_random_node() -> Self {
        let node_id = rand::random::<u16>() as u64 & MAX_NODE_ID;
        Self {
            node_id,
            state: Mutex::new(GeneratorState {
                last_timestamp: 0,
                sequence: 0,
            }),
        }
    }

    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    pub fn next_id(&self) -> RecordId {
        let mut state = self.state.lock();
        let mut now = current_timestamp();

        if now < state.last_timestamp {
            warn!(
                "clock moved backwards by {} ms, waiting before issuing ids",
                state.last_timestamp - now
            );
            now = wait_until(state.last_timestamp);
        }

        if now == state.last_timestamp {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                now = wait_until(state.last_timestamp + 1);
            }
        } else {
            state.sequence = 0;
        }

        state.last_timestamp = now;
        RecordId(compose_id(now, self.node_id, state.sequence))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::with_random_node()
    }
}

fn current_timestamp() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(EPOCH_MILLIS);
    millis.saturating_sub(EPOCH_MILLIS)
}

fn wait_until(target: u64) -> u64 {
    let mut now = current_timestamp();
    while now < target {
        std::thread::yield_now();
        now = current_timestamp();
    }
    now
}
