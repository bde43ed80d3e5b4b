//! Hash ring
//!
//! Ordered map from ring position to node. Mutated only by the orchestrator;
//! nodes hold rebuilt copies from `Metadata` snapshots.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RingKvError};

use super::{ring_hash, KeyRange, RingPosition};

/// Ring member identity as seen by every process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingNode {
    /// `host:port`, unique
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl RingNode {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Self {
            name: format!("{}:{}", host, port),
            host,
            port,
        }
    }

    /// Parse a `host:port` identity
    pub fn parse(name: &str) -> Result<Self> {
        let (host, port) = name
            .rsplit_once(':')
            .ok_or_else(|| RingKvError::Config(format!("Invalid node identity: {}", name)))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| RingKvError::Config(format!("Invalid port in identity: {}", name)))?;
        Ok(Self::new(host, port))
    }

    pub fn position(&self) -> RingPosition {
        ring_hash(&self.name)
    }
}

/// Consistent-hash ring
#[derive(Debug, Clone, Default)]
pub struct HashRing {
    nodes: BTreeMap<RingPosition, RingNode>,
}

impl HashRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ring from a membership list
    pub fn from_nodes(nodes: impl IntoIterator<Item = RingNode>) -> Result<Self> {
        let mut ring = Self::new();
        for node in nodes {
            ring.place(node)?;
        }
        Ok(ring)
    }

    /// Insert a node at `hash(name)`
    ///
    /// Fails with `RingCollision` if the position is already occupied.
    pub fn place(&mut self, node: RingNode) -> Result<RingPosition> {
        let position = node.position();
        if let Some(existing) = self.nodes.get(&position) {
            return Err(RingKvError::RingCollision {
                node: existing.name.clone(),
                position: position.to_string(),
            });
        }
        self.nodes.insert(position, node);
        Ok(position)
    }

    /// Remove a node by identity
    pub fn remove(&mut self, name: &str) -> Result<RingNode> {
        let position = self.position_of(name)?;
        self.nodes
            .remove(&position)
            .ok_or_else(|| RingKvError::NodeNotFound(name.to_string()))
    }

    /// Owner of a key: smallest position ≥ hash(key), wrapping to the minimum
    pub fn owner_of(&self, key: &str) -> Result<&RingNode> {
        self.owner_of_position(ring_hash(key))
    }

    pub fn owner_of_position(&self, position: RingPosition) -> Result<&RingNode> {
        self.nodes
            .range(position..)
            .next()
            .or_else(|| self.nodes.iter().next())
            .map(|(_, node)| node)
            .ok_or(RingKvError::EmptyRing)
    }

    /// Range owned by a node: (previous position, own position]
    pub fn range_of(&self, name: &str) -> Result<KeyRange> {
        let position = self.position_of(name)?;
        let previous = self
            .nodes
            .range(..position)
            .next_back()
            .or_else(|| self.nodes.iter().next_back())
            .map(|(p, _)| *p)
            .unwrap_or(position);
        Ok(KeyRange::new(previous, position))
    }

    /// Next node clockwise, or `None` when the node is alone on the ring
    pub fn successor_of(&self, name: &str) -> Result<Option<&RingNode>> {
        let position = self.position_of(name)?;
        let next = self
            .nodes
            .range((Excluded(position), Unbounded))
            .next()
            .or_else(|| self.nodes.iter().next());

        Ok(match next {
            Some((p, node)) if *p != position => Some(node),
            _ => None,
        })
    }

    /// Is `name` on the ring?
    pub fn contains(&self, name: &str) -> bool {
        self.position_of(name).is_ok()
    }

    /// Every member with its owned range, in ring order
    pub fn key_ranges(&self) -> Vec<(KeyRange, RingNode)> {
        self.nodes
            .values()
            .filter_map(|node| {
                self.range_of(&node.name)
                    .ok()
                    .map(|range| (range, node.clone()))
            })
            .collect()
    }

    /// Members in ring order
    pub fn nodes(&self) -> impl Iterator<Item = &RingNode> {
        self.nodes.values()
    }

    /// Clone of the membership, used for `Metadata` snapshots
    pub fn snapshot(&self) -> Vec<RingNode> {
        self.nodes.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn position_of(&self, name: &str) -> Result<RingPosition> {
        let position = ring_hash(name);
        match self.nodes.get(&position) {
            Some(node) if node.name == name => Ok(position),
            _ => Err(RingKvError::NodeNotFound(name.to_string())),
        }
    }
}
