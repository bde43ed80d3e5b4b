//! Message definitions
//!
//! Client messages, control messages, and the decoded `Message` variant.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::ring::{KeyRange, RingNode};

use super::{ControlKind, StatusType, MAX_FIELD_SIZE};

/// Room in a migration payload reserved for the range, flags and map length
const CHUNK_OVERHEAD: usize = 1024;

/// Encoded size of one pair beyond its key and value bytes
const PAIR_OVERHEAD: usize = 16;

/// Pair bytes allowed in one migration chunk
const CHUNK_BUDGET: usize = MAX_FIELD_SIZE as usize - CHUNK_OVERHEAD;

/// Largest key plus value a node stores; any stored pair fits one chunk
pub const MAX_PAIR_SIZE: usize = CHUNK_BUDGET - PAIR_OVERHEAD;

/// Key-value pairs moved during migration (ordered for stable encoding)
pub type KvPairs = BTreeMap<String, String>;

/// Which framing a message arrived in (responses reuse it)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Marker-prefixed, length-delimited
    Internal,
    /// Whitespace-delimited text
    External,
}

/// A client request or response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessage {
    pub status: StatusType,
    pub key: Option<String>,
    pub value: Option<String>,
}

impl ClientMessage {
    pub fn new(status: StatusType, key: Option<String>, value: Option<String>) -> Self {
        Self { status, key, value }
    }

    pub fn get(key: impl Into<String>) -> Self {
        Self::new(StatusType::Get, Some(key.into()), None)
    }

    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(StatusType::Put, Some(key.into()), Some(value.into()))
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::new(StatusType::Delete, Some(key.into()), None)
    }

    pub fn keyrange() -> Self {
        Self::new(StatusType::Keyrange, None, None)
    }

    /// Response with a status and optional key/value
    pub fn reply(status: StatusType, key: Option<&str>, value: Option<&str>) -> Self {
        Self::new(status, key.map(str::to_string), value.map(str::to_string))
    }

    /// `FAILED` carrying a reason
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::new(StatusType::Failed, None, Some(reason.into()))
    }
}

/// Cluster control messages exchanged between nodes and the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Node → orchestrator: announce `host:port` identity
    Init { node: String },

    /// Orchestrator → node: current ring, plus cache config on admission
    Metadata {
        ring: Vec<RingNode>,
        cache: Option<CacheConfig>,
    },

    /// Orchestrator → source: send `range` to `target`.
    /// Source → orchestrator: the same, with the collected pairs, one chunk
    /// per message; `last` marks the final chunk.
    TransferTo {
        target: String,
        range: KeyRange,
        pairs: KvPairs,
        last: bool,
    },

    /// Orchestrator → target: a chunk of pairs relayed from `from`
    Receive {
        from: String,
        pairs: KvPairs,
        last: bool,
    },

    /// Target → orchestrator → `ping`: `from` applied the hand-off
    TransferComplete { ping: String, from: String },

    /// Node → orchestrator: departing, with a chunk of buffered pairs.
    /// Orchestrator → node: you have been removed.
    Shutdown { pairs: KvPairs, last: bool },
}

impl ControlMessage {
    /// `Receive` messages carrying `pairs` in frame-sized chunks
    pub fn receive_chunks(from: &str, pairs: KvPairs) -> Vec<ControlMessage> {
        with_last(chunk_pairs(pairs), |pairs, last| ControlMessage::Receive {
            from: from.to_string(),
            pairs,
            last,
        })
    }

    /// `Shutdown` messages carrying `pairs` in frame-sized chunks
    pub fn shutdown_chunks(pairs: KvPairs) -> Vec<ControlMessage> {
        with_last(chunk_pairs(pairs), |pairs, last| ControlMessage::Shutdown { pairs, last })
    }

    /// Source reply to `TransferTo`, in frame-sized chunks
    pub fn transfer_chunks(target: &str, range: KeyRange, pairs: KvPairs) -> Vec<ControlMessage> {
        with_last(chunk_pairs(pairs), |pairs, last| ControlMessage::TransferTo {
            target: target.to_string(),
            range,
            pairs,
            last,
        })
    }

    pub fn kind(&self) -> ControlKind {
        match self {
            ControlMessage::Init { .. } => ControlKind::Init,
            ControlMessage::Metadata { .. } => ControlKind::Metadata,
            ControlMessage::TransferTo { .. } => ControlKind::TransferTo,
            ControlMessage::Receive { .. } => ControlKind::Receive,
            ControlMessage::TransferComplete { .. } => ControlKind::TransferComplete,
            ControlMessage::Shutdown { .. } => ControlKind::Shutdown,
        }
    }
}

fn with_last(
    chunks: Vec<KvPairs>,
    build: impl Fn(KvPairs, bool) -> ControlMessage,
) -> Vec<ControlMessage> {
    let count = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, pairs)| build(pairs, i + 1 == count))
        .collect()
}

/// Split `pairs` so each chunk encodes within one frame field
///
/// Always yields at least one (possibly empty) chunk. A pair no larger than
/// `MAX_PAIR_SIZE` always fits a chunk of its own.
pub fn chunk_pairs(pairs: KvPairs) -> Vec<KvPairs> {
    let mut chunks = Vec::new();
    let mut current = KvPairs::new();
    let mut used = 0;

    for (key, value) in pairs {
        let cost = key.len() + value.len() + PAIR_OVERHEAD;
        if !current.is_empty() && used + cost > CHUNK_BUDGET {
            chunks.push(std::mem::take(&mut current));
            used = 0;
        }
        used += cost;
        current.insert(key, value);
    }
    chunks.push(current);
    chunks
}

/// Payload of `METADATA`
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct MetadataPayload {
    pub ring: Vec<RingNode>,
    pub cache: Option<CacheConfig>,
}

/// Payload of `TRANSFER_TO`
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TransferPayload {
    pub range: KeyRange,
    pub pairs: KvPairs,
    pub last: bool,
}

/// Payload of `RECEIVE` and `SHUTDOWN`
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ChunkPayload {
    pub pairs: KvPairs,
    pub last: bool,
}

/// Result of decoding one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Internal-framed control message
    Control(ControlMessage),

    /// Client message in either framing
    Client {
        message: ClientMessage,
        framing: Framing,
    },

    /// Rejected frame; answer with `FAILED` in the same framing
    Malformed { framing: Framing, reason: String },
}
