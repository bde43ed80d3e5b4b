//! Orchestrator-side migration
//!
//! Pending-migration bookkeeping and the per-connection coordinator that
//! feeds one node's control messages into the orchestrator.

use std::io::BufReader;
use std::net::TcpStream;
use std::sync::Arc;

use crate::error::{Result, RingKvError};
use crate::protocol::{read_message, ControlMessage, Message};
use crate::ring::KeyRange;

use super::{ClusterOrchestrator, NodeDescriptor, NodeLink};

/// A range hand-off the orchestrator is waiting on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMigration {
    pub source: String,
    pub target: String,
    pub range: KeyRange,
}

impl PendingMigration {
    pub fn new(source: &str, target: &str, range: KeyRange) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            range,
        }
    }

    pub fn involves(&self, name: &str) -> bool {
        self.source == name || self.target == name
    }
}

/// Serves one node's control connection
///
/// The first message must be `INIT`; after that every message is routed
/// through the orchestrator. Losing the connection counts as a departure.
pub struct MigrationCoordinator {
    orchestrator: Arc<ClusterOrchestrator>,
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    peer_addr: String,
    /// Registered identity and registration sequence
    node: Option<(String, u64)>,
}

impl MigrationCoordinator {
    pub fn new(stream: TcpStream, orchestrator: Arc<ClusterOrchestrator>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);

        Ok(Self {
            orchestrator,
            stream,
            reader,
            peer_addr,
            node: None,
        })
    }

    /// Process control messages until the node hangs up
    pub fn run(&mut self) {
        tracing::debug!("Control connection from {}", self.peer_addr);

        loop {
            match read_message(&mut self.reader) {
                Ok(Message::Control(message)) => {
                    let kind = message.kind();
                    if let Err(e) = self.process(message) {
                        tracing::warn!("{} from {} failed: {}", kind, self.describe(), e);
                        if self.node.is_none() {
                            break;
                        }
                    }
                }
                Ok(other) => {
                    tracing::warn!("Ignoring non-control frame from {}: {:?}", self.describe(), other);
                }
                Err(e) if e.is_disconnect() => break,
                Err(e) => {
                    tracing::warn!("Control connection {} failed: {}", self.describe(), e);
                    break;
                }
            }
        }

        if let Some((node, seq)) = self.node.take() {
            self.orchestrator.handle_disconnect(&node, seq);
        }
        tracing::debug!("Control connection from {} closed", self.peer_addr);
    }

    fn process(&mut self, message: ControlMessage) -> Result<()> {
        if let Some((node, _)) = &self.node {
            return self.orchestrator.handle_control(node, message);
        }

        match message {
            ControlMessage::Init { node } => {
                let descriptor = NodeDescriptor::parse(&node)?;
                let link = NodeLink::spawn(&node, &self.stream)?;
                let seq = self.orchestrator.register_node(descriptor, link)?;
                self.node = Some((node, seq));
                Ok(())
            }
            other => Err(RingKvError::MalformedMessage(format!(
                "{} before INIT",
                other.kind()
            ))),
        }
    }

    fn describe(&self) -> &str {
        self.node
            .as_ref()
            .map(|(node, _)| node.as_str())
            .unwrap_or(&self.peer_addr)
    }
}
