//! Node registry
//!
//! Every node the orchestrator knows about, its lifecycle state, and the
//! outbound link used to reach it.

use std::collections::BTreeMap;
use std::io::BufWriter;
use std::net::{Shutdown, TcpStream};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};

use crate::cache::CacheConfig;
use crate::error::{Result, RingKvError};
use crate::protocol::{write_control, ControlMessage};
use crate::ring::{RingNode, RingPosition};

/// A node as the orchestrator sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    /// `host:port`, unique
    pub name: String,
    pub host: String,
    pub port: u16,
    pub cache: Option<CacheConfig>,
    pub position: RingPosition,
}

impl NodeDescriptor {
    /// Describe a node from its `host:port` identity
    pub fn parse(name: &str) -> Result<Self> {
        let node = RingNode::parse(name)?;
        Ok(Self {
            position: node.position(),
            name: node.name,
            host: node.host,
            port: node.port,
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn ring_node(&self) -> RingNode {
        RingNode::new(self.host.clone(), self.port)
    }
}

/// Lifecycle of a registered node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Connected, not in the ring
    Pooled,
    /// In the ring, no migration targeting it
    Admitted { position: RingPosition },
    /// In the ring, waiting for at least one inbound migration
    Rebalancing { position: RingPosition },
    /// Taken out of the ring; kept until its connection closes
    Removed,
}

impl NodeState {
    pub fn in_ring(&self) -> bool {
        matches!(self, NodeState::Admitted { .. } | NodeState::Rebalancing { .. })
    }
}

/// Outbound control channel to one node
///
/// Sends are queued on a channel and written by a dedicated thread, so
/// callers never block on socket I/O while holding membership state.
pub struct NodeLink {
    name: String,
    outbound: Sender<ControlMessage>,
    stream: Option<TcpStream>,
}

impl NodeLink {
    /// Link over an accepted control connection
    pub fn spawn(name: &str, stream: &TcpStream) -> Result<Self> {
        let write_stream = stream.try_clone()?;
        let (outbound, inbound) = channel::unbounded();
        let peer = name.to_string();

        thread::Builder::new()
            .name(format!("link-{}", name))
            .spawn(move || run_writer(peer, write_stream, inbound))?;

        Ok(Self {
            name: name.to_string(),
            outbound,
            stream: Some(stream.try_clone()?),
        })
    }

    /// Link backed only by a channel; the receiver sees every message sent
    pub fn channel(name: &str) -> (Self, Receiver<ControlMessage>) {
        let (outbound, inbound) = channel::unbounded();
        let link = Self {
            name: name.to_string(),
            outbound,
            stream: None,
        };
        (link, inbound)
    }

    /// Queue a message for the node
    pub fn send(&self, message: ControlMessage) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| RingKvError::ConnectionLost(self.name.clone()))
    }

    /// Close the underlying connection, if any
    pub fn close(&self) {
        if let Some(stream) = &self.stream {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

fn run_writer(name: String, stream: TcpStream, inbound: Receiver<ControlMessage>) {
    let mut writer = BufWriter::new(stream);

    for message in inbound.iter() {
        let last = matches!(message, ControlMessage::Shutdown { last: true, .. });
        if let Err(e) = write_control(&mut writer, &message) {
            tracing::warn!("Failed to send {} to {}: {}", message.kind(), name, e);
            return;
        }
        tracing::trace!("Sent {} to {}", message.kind(), name);
        if last {
            let _ = writer.get_ref().shutdown(Shutdown::Write);
            return;
        }
    }
}

/// One registry entry
pub struct NodeRecord {
    pub descriptor: NodeDescriptor,
    pub state: NodeState,
    pub link: NodeLink,
    /// Registration order, used to pick pool nodes deterministically
    pub seq: u64,
}

/// All known nodes, keyed by name
#[derive(Default)]
pub struct Registry {
    records: BTreeMap<String, NodeRecord>,
    next_seq: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pooled node
    ///
    /// A node that was removed but whose old connection is still open may
    /// re-register; anything else already known is a duplicate. Returns the
    /// registration's sequence number.
    pub fn register(&mut self, descriptor: NodeDescriptor, link: NodeLink) -> Result<u64> {
        if let Some(existing) = self.records.get(&descriptor.name) {
            if existing.state != NodeState::Removed {
                return Err(RingKvError::DuplicateNode(descriptor.name));
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.records.insert(
            descriptor.name.clone(),
            NodeRecord {
                descriptor,
                state: NodeState::Pooled,
                link,
                seq,
            },
        );
        Ok(seq)
    }

    pub fn get(&self, name: &str) -> Option<&NodeRecord> {
        self.records.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut NodeRecord> {
        self.records.get_mut(name)
    }

    /// Sequence number of the current registration under `name`
    pub fn seq_of(&self, name: &str) -> Option<u64> {
        self.records.get(name).map(|r| r.seq)
    }

    pub fn state_of(&self, name: &str) -> Option<NodeState> {
        self.records.get(name).map(|r| r.state)
    }

    pub fn set_state(&mut self, name: &str, state: NodeState) {
        if let Some(record) = self.records.get_mut(name) {
            record.state = state;
        }
    }

    /// Send to a node that has not been removed
    pub fn send_to(&self, name: &str, message: ControlMessage) -> Result<()> {
        match self.records.get(name) {
            Some(record) if record.state != NodeState::Removed => record.link.send(message),
            _ => Err(RingKvError::NodeNotFound(name.to_string())),
        }
    }

    /// Pooled node names in registration order
    pub fn pooled(&self) -> Vec<String> {
        let mut pooled: Vec<&NodeRecord> = self
            .records
            .values()
            .filter(|r| r.state == NodeState::Pooled)
            .collect();
        pooled.sort_by_key(|r| r.seq);
        pooled.into_iter().map(|r| r.descriptor.name.clone()).collect()
    }

    /// Records currently in the ring
    pub fn ring_members(&self) -> impl Iterator<Item = &NodeRecord> {
        self.records.values().filter(|r| r.state.in_ring())
    }

    /// Records not yet removed
    pub fn live(&self) -> impl Iterator<Item = &NodeRecord> {
        self.records
            .values()
            .filter(|r| r.state != NodeState::Removed)
    }

    /// Drop a record, closing its link
    pub fn forget(&mut self, name: &str) -> Option<NodeRecord> {
        let record = self.records.remove(name)?;
        record.link.close();
        Some(record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
