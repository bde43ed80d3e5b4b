//! Node-side migration
//!
//! Applies control messages from the orchestrator to the local service and
//! produces the replies to send back. No I/O happens here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::protocol::ControlMessage;
use crate::ring::HashRing;

use super::KvService;

/// Per-node control message handler
///
/// Remembers which keys were handed to which target so they can be dropped
/// once that target confirms with `TransferComplete`.
pub struct NodeMigrator {
    service: Arc<KvService>,
    handed_off: HashMap<String, Vec<String>>,
}

impl NodeMigrator {
    pub fn new(service: Arc<KvService>) -> Self {
        Self {
            service,
            handed_off: HashMap::new(),
        }
    }

    /// Apply one control message; returns the replies for the orchestrator
    pub fn handle(&mut self, message: ControlMessage) -> Result<Vec<ControlMessage>> {
        match message {
            ControlMessage::Metadata { ring, cache } => {
                if let Some(cache) = cache {
                    self.service.reconfigure_cache(cache);
                }
                self.service.install_ring(HashRing::from_nodes(ring)?);
                Ok(Vec::new())
            }

            ControlMessage::TransferTo { target, range, .. } => {
                let pairs = self.service.collect_range(&range)?;
                tracing::info!(
                    "{} handing {} pairs in ({}) to {}",
                    self.service.name(),
                    pairs.len(),
                    range,
                    target
                );
                self.handed_off
                    .entry(target.clone())
                    .or_default()
                    .extend(pairs.keys().cloned());
                Ok(ControlMessage::transfer_chunks(&target, range, pairs))
            }

            ControlMessage::Receive { from, pairs, last } => {
                let applied = self.service.apply_pairs(&pairs)?;
                tracing::info!(
                    "{} received {} pairs from {}",
                    self.service.name(),
                    applied,
                    from
                );
                if !last {
                    return Ok(Vec::new());
                }
                Ok(vec![ControlMessage::TransferComplete {
                    ping: from,
                    from: self.service.name().to_string(),
                }])
            }

            ControlMessage::TransferComplete { from, .. } => {
                if let Some(keys) = self.handed_off.remove(&from) {
                    let dropped = self.service.drop_unowned(&keys)?;
                    tracing::info!(
                        "{} dropped {} keys now held by {}",
                        self.service.name(),
                        dropped,
                        from
                    );
                }
                Ok(Vec::new())
            }

            ControlMessage::Shutdown { .. } => {
                tracing::info!("{} removed from the cluster", self.service.name());
                self.service.mark_stopped();
                Ok(Vec::new())
            }

            ControlMessage::Init { node } => {
                tracing::warn!("Ignoring INIT for {} sent to a storage node", node);
                Ok(Vec::new())
            }
        }
    }

    /// Keys awaiting confirmation, per target
    pub fn pending_handoffs(&self) -> &HashMap<String, Vec<String>> {
        &self.handed_off
    }

    pub fn service(&self) -> &Arc<KvService> {
        &self.service
    }
}
