//! Cluster orchestrator
//!
//! Owns the authoritative ring and node registry. Every membership change
//! and every migration step runs under one lock; lookups read a published
//! ring snapshot instead.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};

use crate::cache::{CacheConfig, CacheStrategy};
use crate::config::OrchestratorConfig;
use crate::error::{Result, RingKvError};
use crate::protocol::{ControlMessage, KvPairs};
use crate::ring::{HashRing, KeyRange, RingNode, RingPosition};

use super::{NodeDescriptor, NodeLink, NodeState, PendingMigration, Registry};

/// Ring, registry and in-flight migrations, guarded together
struct Membership {
    ring: HashRing,
    registry: Registry,
    migrations: Vec<PendingMigration>,
    /// Chunks of departing nodes' pairs, until their final `SHUTDOWN`
    departing: HashMap<String, KvPairs>,
}

/// Cluster membership manager
///
/// ## Concurrency
/// - `membership`: single lock serializing admission, removal, departure
///   and every migration step
/// - `rebalanced`: signalled whenever a migration finishes or is abandoned;
///   add/remove wait on it before editing the ring
/// - `ring_view`: snapshot republished after each change, for lock-free-ish
///   `owner_of` lookups
pub struct ClusterOrchestrator {
    config: OrchestratorConfig,
    membership: Mutex<Membership>,
    rebalanced: Condvar,
    ring_view: RwLock<Arc<HashRing>>,
    shut_down: AtomicBool,
}

impl ClusterOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            membership: Mutex::new(Membership {
                ring: HashRing::new(),
                registry: Registry::new(),
                migrations: Vec::new(),
                departing: HashMap::new(),
            }),
            rebalanced: Condvar::new(),
            ring_view: RwLock::new(Arc::new(HashRing::new())),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Add a connected node to the pool; it receives no ring yet
    ///
    /// Returns the registration sequence number, used to tell a stale
    /// connection of a re-registered node from the current one.
    pub fn register_node(&self, descriptor: NodeDescriptor, link: NodeLink) -> Result<u64> {
        let mut descriptor = descriptor;
        if descriptor.cache.is_none() {
            descriptor.cache = self.config.pool.cache_defaults(&descriptor.name);
        }

        let name = descriptor.name.clone();
        let mut m = self.membership.lock();
        let seq = m.registry.register(descriptor, link)?;
        tracing::info!(
            "Node {} registered, {} pooled",
            name,
            m.registry.pooled().len()
        );
        Ok(seq)
    }

    /// Admit `count` pooled nodes with the given cache configuration
    ///
    /// Returns the nodes actually admitted; a node whose placement or
    /// migration start fails is returned to the pool.
    pub fn add_nodes(
        &self,
        count: usize,
        strategy: CacheStrategy,
        cache_size: usize,
    ) -> Result<Vec<NodeDescriptor>> {
        let mut m = self.membership.lock();
        self.await_rebalance(&mut m);

        let pooled = m.registry.pooled();
        if count > pooled.len() {
            return Err(RingKvError::InsufficientCapacity {
                requested: count,
                available: pooled.len(),
            });
        }
        let cache = CacheConfig::new(strategy, cache_size);

        // Every newcomer takes its position before any range is computed
        let mut placed = Vec::new();
        for name in pooled.into_iter().take(count) {
            let node = match m.registry.get(&name) {
                Some(record) => record.descriptor.ring_node(),
                None => continue,
            };
            match m.ring.place(node) {
                Ok(position) => placed.push((name, position)),
                Err(e) => tracing::warn!("Admission of {} rolled back: {}", name, e),
            }
        }

        let newcomers: HashSet<String> = placed.iter().map(|(name, _)| name.clone()).collect();
        let mut admitted = Vec::new();
        for (name, position) in placed {
            match m.begin_admission(&name, position, cache, &newcomers) {
                Ok(descriptor) => admitted.push(descriptor),
                Err(e) => {
                    tracing::warn!("Admission of {} rolled back: {}", name, e);
                    m.rollback_admission(&name, &newcomers);
                }
            }
        }

        let names: Vec<String> = admitted.iter().map(|d| d.name.clone()).collect();
        self.publish(&m, &names);
        tracing::info!("Admitted {} of {} requested nodes", admitted.len(), count);
        Ok(admitted)
    }

    /// Admit a single pooled node
    pub fn add_node(
        &self,
        strategy: CacheStrategy,
        cache_size: usize,
    ) -> Result<Option<NodeDescriptor>> {
        Ok(self.add_nodes(1, strategy, cache_size)?.pop())
    }

    /// Remove nodes by name, handing each one's range to its successor
    ///
    /// Returns false if any name was unknown; the rest are still removed.
    pub fn remove_nodes<I, S>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut m = self.membership.lock();
        self.await_rebalance(&mut m);

        let mut all_found = true;
        for name in names {
            let name = name.as_ref();
            if let Err(e) = m.evict(name) {
                tracing::warn!("Removal of {} failed: {}", name, e);
                if matches!(e, RingKvError::NodeNotFound(_)) {
                    all_found = false;
                }
            }
        }

        self.publish(&m, &[]);
        all_found
    }

    /// A node left: voluntarily (`SHUTDOWN` with its pairs) or by losing its
    /// connection
    ///
    /// The successor is computed before the node leaves the ring; buffered
    /// pairs are forwarded to it.
    pub fn handle_departure(&self, name: &str, pairs: KvPairs) {
        let m = self.membership.lock();
        self.depart(m, name, pairs);
    }

    /// A control connection closed; ignored when `name` has since
    /// re-registered over a newer connection
    pub fn handle_disconnect(&self, name: &str, seq: u64) {
        let m = self.membership.lock();
        if m.registry.seq_of(name) != Some(seq) {
            tracing::debug!("Stale connection of {} closed", name);
            return;
        }
        self.depart(m, name, KvPairs::new());
    }

    fn depart(&self, mut m: MutexGuard<'_, Membership>, name: &str, mut pairs: KvPairs) {
        if let Some(buffered) = m.departing.remove(name) {
            pairs.extend(buffered);
        }
        let state = match m.registry.state_of(name) {
            Some(state) => state,
            None => return,
        };

        if !state.in_ring() {
            if !pairs.is_empty() {
                tracing::warn!(
                    "Node {} left outside the ring; ignoring {} pairs",
                    name,
                    pairs.len()
                );
            }
            m.abandon(|mig| mig.involves(name));
            m.registry.forget(name);
            tracing::info!("Node {} disconnected", name);
            self.rebalanced.notify_all();
            return;
        }

        let successor = m.ring.successor_of(name).ok().flatten().map(|n| n.name.clone());
        let range = m.ring.range_of(name).ok();
        let _ = m.ring.remove(name);
        m.abandon(|mig| mig.involves(name));
        m.registry.forget(name);
        tracing::warn!("Node {} left the ring", name);

        if !pairs.is_empty() {
            match (successor, range) {
                (Some(successor), Some(range)) => {
                    let count = pairs.len();
                    let sent = ControlMessage::receive_chunks(name, pairs)
                        .into_iter()
                        .try_for_each(|chunk| m.registry.send_to(&successor, chunk));
                    match sent {
                        Ok(()) => {
                            tracing::info!(
                                "Forwarded {} pairs from {} to {}",
                                count,
                                name,
                                successor
                            );
                            m.migrations
                                .push(PendingMigration::new(name, &successor, range));
                            m.mark_rebalancing(&successor);
                        }
                        Err(e) => tracing::warn!(
                            "Migration {} -> {} abandoned: {}",
                            name,
                            successor,
                            e
                        ),
                    }
                }
                _ => tracing::warn!(
                    "Node {} was the last ring member; {} pairs have no new owner",
                    name,
                    pairs.len()
                ),
            }
        }

        self.publish(&m, &[]);
        self.rebalanced.notify_all();
    }

    // =========================================================================
    // Migration Relay
    // =========================================================================

    /// Route a control message received from `from`
    pub fn handle_control(&self, from: &str, message: ControlMessage) -> Result<()> {
        match message {
            ControlMessage::TransferTo {
                target,
                range,
                pairs,
                last,
            } => self.relay_transfer(from, &target, range, pairs, last),
            ControlMessage::TransferComplete { ping, .. } => {
                self.complete_transfer(from, &ping);
                Ok(())
            }
            ControlMessage::Shutdown { pairs, last: true } => {
                self.handle_departure(from, pairs);
                Ok(())
            }
            ControlMessage::Shutdown { pairs, last: false } => {
                let mut m = self.membership.lock();
                tracing::debug!("Buffering {} departing pairs from {}", pairs.len(), from);
                m.departing.entry(from.to_string()).or_default().extend(pairs);
                Ok(())
            }
            other => Err(RingKvError::MalformedMessage(format!(
                "{} from {} is not accepted by the orchestrator",
                other.kind(),
                from
            ))),
        }
    }

    /// Source `from` sent a chunk of its range; pass it on as `RECEIVE`
    fn relay_transfer(
        &self,
        from: &str,
        target: &str,
        range: KeyRange,
        pairs: KvPairs,
        last: bool,
    ) -> Result<()> {
        let mut m = self.membership.lock();
        let count = pairs.len();
        let receive = ControlMessage::Receive {
            from: from.to_string(),
            pairs,
            last,
        };

        match m.registry.send_to(target, receive) {
            Ok(()) => {
                tracing::info!(
                    "Relayed {} pairs in ({}) from {} to {}",
                    count,
                    range,
                    from,
                    target
                );
                Ok(())
            }
            Err(e) => {
                m.abandon(|mig| mig.source == from && mig.target == target);
                self.rebalanced.notify_all();
                Err(RingKvError::MigrationAbandoned(format!(
                    "{} -> {}: {}",
                    from, target, e
                )))
            }
        }
    }

    /// Target `from` applied the pairs sent by `ping`
    fn complete_transfer(&self, from: &str, ping: &str) {
        let mut m = self.membership.lock();
        // One confirmation per hand-off, oldest first
        let matched = m
            .migrations
            .iter()
            .position(|mig| mig.source == ping && mig.target == from);

        if let Some(index) = matched {
            m.migrations.remove(index);
            tracing::info!("Migration {} -> {} complete", ping, from);
        } else {
            tracing::debug!("Completion {} -> {} matched no pending migration", ping, from);
        }
        m.settle(from);
        self.rebalanced.notify_all();

        let ack = ControlMessage::TransferComplete {
            ping: ping.to_string(),
            from: from.to_string(),
        };
        if let Err(e) = m.registry.send_to(ping, ack) {
            tracing::debug!("Completion not forwarded to {}: {}", ping, e);
        }
    }

    /// Wait for in-flight migrations, abandoning them at the deadline
    fn await_rebalance(&self, m: &mut MutexGuard<'_, Membership>) {
        if m.migrations.is_empty() {
            return;
        }
        tracing::info!("Waiting for {} in-flight migrations", m.migrations.len());

        let deadline = Instant::now() + Duration::from_millis(self.config.rebalance_timeout_ms);
        while !m.migrations.is_empty() {
            if self.rebalanced.wait_until(m, deadline).timed_out() {
                let abandoned = m.abandon(|_| true);
                if abandoned > 0 {
                    tracing::warn!("Rebalance timed out; abandoned {} migrations", abandoned);
                }
                break;
            }
        }
    }

    /// Publish the ring snapshot and broadcast it to every member
    fn publish(&self, m: &Membership, admitted: &[String]) {
        *self.ring_view.write() = Arc::new(m.ring.clone());

        let snapshot = m.ring.snapshot();
        for record in m.registry.ring_members() {
            let cache = if admitted.contains(&record.descriptor.name) {
                record.descriptor.cache
            } else {
                None
            };
            let metadata = ControlMessage::Metadata {
                ring: snapshot.clone(),
                cache,
            };
            if let Err(e) = record.link.send(metadata) {
                tracing::warn!("Ring update to {} failed: {}", record.descriptor.name, e);
            }
        }
        tracing::debug!("Published ring of {} nodes", snapshot.len());
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Ring owner of `key` in the last published ring
    pub fn owner_of(&self, key: &str) -> Result<RingNode> {
        self.ring_view.read().owner_of(key).cloned()
    }

    pub fn ring_snapshot(&self) -> Arc<HashRing> {
        self.ring_view.read().clone()
    }

    /// Every pooled and ring node
    pub fn get_nodes(&self) -> Vec<NodeDescriptor> {
        self.membership
            .lock()
            .registry
            .live()
            .map(|r| r.descriptor.clone())
            .collect()
    }

    pub fn get_node_by_name(&self, name: &str) -> Option<NodeDescriptor> {
        self.membership
            .lock()
            .registry
            .get(name)
            .filter(|r| r.state != NodeState::Removed)
            .map(|r| r.descriptor.clone())
    }

    pub fn node_state(&self, name: &str) -> Option<NodeState> {
        self.membership.lock().registry.state_of(name)
    }

    pub fn pool_size(&self) -> usize {
        self.membership.lock().registry.pooled().len()
    }

    pub fn pending_migrations(&self) -> Vec<PendingMigration> {
        self.membership.lock().migrations.clone()
    }

    /// Stop accepting node connections; registered nodes stay connected
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            tracing::info!("Orchestrator shutting down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Membership {
    /// Point the previous owner of `name`'s range at it, or admit directly
    fn begin_admission(
        &mut self,
        name: &str,
        position: RingPosition,
        cache: CacheConfig,
        newcomers: &HashSet<String>,
    ) -> Result<NodeDescriptor> {
        let range = self.ring.range_of(name)?;
        let state = if self.start_pull(name, range, newcomers)? {
            NodeState::Rebalancing { position }
        } else {
            NodeState::Admitted { position }
        };

        let record = self
            .registry
            .get_mut(name)
            .ok_or_else(|| RingKvError::NodeNotFound(name.to_string()))?;
        record.state = state;
        record.descriptor.cache = Some(cache);
        Ok(record.descriptor.clone())
    }

    /// Ask the previous owner of `range` to send it to newcomer `name`
    ///
    /// Returns false when no node outside the batch held the range.
    fn start_pull(
        &mut self,
        name: &str,
        range: KeyRange,
        newcomers: &HashSet<String>,
    ) -> Result<bool> {
        let source = match self.previous_owner(name, newcomers)? {
            Some(source) => source,
            None => return Ok(false),
        };
        let transfer = ControlMessage::TransferTo {
            target: name.to_string(),
            range,
            pairs: KvPairs::new(),
            last: true,
        };
        self.registry.send_to(&source, transfer).map_err(|e| {
            RingKvError::MigrationAbandoned(format!("{} -> {}: {}", source, name, e))
        })?;
        tracing::info!("Migration {} -> {} started for ({})", source, name, range);
        self.migrations
            .push(PendingMigration::new(&source, name, range));
        Ok(true)
    }

    /// Return `name` to the pool
    ///
    /// If the next node clockwise is a newcomer already admitted in this
    /// batch, it inherits `name`'s range and pulls that part too.
    fn rollback_admission(&mut self, name: &str, newcomers: &HashSet<String>) {
        let heir = self
            .ring
            .successor_of(name)
            .ok()
            .flatten()
            .map(|n| n.name.clone());
        let range = self.ring.range_of(name).ok();

        let _ = self.ring.remove(name);
        self.migrations.retain(|mig| mig.target != name);
        self.registry.set_state(name, NodeState::Pooled);

        let (heir, range) = match (heir, range) {
            (Some(heir), Some(range)) => (heir, range),
            _ => return,
        };
        let admitted = newcomers.contains(&heir)
            && self
                .registry
                .state_of(&heir)
                .is_some_and(|state| state.in_ring());
        if !admitted {
            return;
        }
        match self.start_pull(&heir, range, newcomers) {
            Ok(true) => self.mark_rebalancing(&heir),
            Ok(false) => {}
            Err(e) => tracing::warn!("{} keeps a partial range: {}", heir, e),
        }
    }

    /// Nearest node clockwise of `name` that is not part of this batch
    fn previous_owner(&self, name: &str, newcomers: &HashSet<String>) -> Result<Option<String>> {
        let mut current = name.to_string();
        loop {
            let next = match self.ring.successor_of(&current)? {
                Some(node) => node.name.clone(),
                None => return Ok(None),
            };
            if next == name {
                return Ok(None);
            }
            if !newcomers.contains(&next) {
                return Ok(Some(next));
            }
            current = next;
        }
    }

    /// Take `name` out of the ring (or pool) and start its hand-off
    fn evict(&mut self, name: &str) -> Result<()> {
        let state = self
            .registry
            .state_of(name)
            .filter(|state| *state != NodeState::Removed)
            .ok_or_else(|| RingKvError::NodeNotFound(name.to_string()))?;

        if state.in_ring() {
            let successor = self.ring.successor_of(name)?.map(|n| n.name.clone());
            let range = self.ring.range_of(name)?;
            self.ring.remove(name)?;
            self.abandon(|mig| mig.involves(name));

            match successor {
                Some(successor) => {
                    let transfer = ControlMessage::TransferTo {
                        target: successor.clone(),
                        range,
                        pairs: KvPairs::new(),
                        last: true,
                    };
                    match self.registry.send_to(name, transfer) {
                        Ok(()) => {
                            tracing::info!(
                                "Migration {} -> {} started for ({})",
                                name,
                                successor,
                                range
                            );
                            self.migrations
                                .push(PendingMigration::new(name, &successor, range));
                            self.mark_rebalancing(&successor);
                        }
                        Err(e) => tracing::warn!(
                            "Migration {} -> {} abandoned: {}",
                            name,
                            successor,
                            e
                        ),
                    }
                }
                None => tracing::warn!("Node {} was the last ring member", name),
            }
        }

        let shutdown = ControlMessage::Shutdown {
            pairs: KvPairs::new(),
            last: true,
        };
        if let Err(e) = self.registry.send_to(name, shutdown) {
            tracing::debug!("Shutdown to {} not delivered: {}", name, e);
        }
        self.registry.set_state(name, NodeState::Removed);
        tracing::info!("Node {} removed", name);
        Ok(())
    }

    /// Drop matching migrations; their targets go back to `Admitted` once
    /// nothing else is inbound
    fn abandon(&mut self, predicate: impl Fn(&PendingMigration) -> bool) -> usize {
        let (abandoned, kept): (Vec<_>, Vec<_>) =
            self.migrations.drain(..).partition(|mig| predicate(mig));
        self.migrations = kept;

        for mig in &abandoned {
            tracing::warn!(
                "Migration {} -> {} abandoned for ({})",
                mig.source,
                mig.target,
                mig.range
            );
            self.settle(&mig.target);
        }
        abandoned.len()
    }

    fn settle(&mut self, name: &str) {
        if self.migrations.iter().any(|mig| mig.target == name) {
            return;
        }
        if let Some(NodeState::Rebalancing { position }) = self.registry.state_of(name) {
            self.registry
                .set_state(name, NodeState::Admitted { position });
        }
    }

    fn mark_rebalancing(&mut self, name: &str) {
        if let Some(NodeState::Admitted { position }) = self.registry.state_of(name) {
            self.registry
                .set_state(name, NodeState::Rebalancing { position });
        }
    }
}
