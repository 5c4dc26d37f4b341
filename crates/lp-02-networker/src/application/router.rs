//! # Network Router
//!
//! Binds each request to a connection pool and forwards the request's
//! network commands to it.
//!
//! ## Pool Selection
//!
//! A new request reuses the first pool that is still active, under its
//! request limit and built over the router's current node set. Otherwise a
//! fresh pool is opened with the next id from the injected generator.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use shared_types::{Clock, ConnectionId, NetworkCommand, RemoteNode, RequestId, SequenceGenerator};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{shuffle_nodes, ConnectionPool, ConnectionSettings, NodeMessage, TimeoutKey};
use crate::ports::{InboundFrame, NodeConnector};

/// Routes request commands to connection pools.
pub struct NetworkRouter {
    pools: BTreeMap<ConnectionId, ConnectionPool>,
    request_to_pool: HashMap<RequestId, ConnectionId>,
    nodes: Vec<RemoteNode>,
    settings: ConnectionSettings,
    connector: Arc<dyn NodeConnector>,
    inbound: mpsc::Sender<InboundFrame>,
    ids: Arc<SequenceGenerator>,
    clock: Arc<dyn Clock>,
    rng: StdRng,
}

impl NetworkRouter {
    /// Router with no nodes yet; see [`update_nodes`](Self::update_nodes).
    pub fn new(
        settings: ConnectionSettings,
        connector: Arc<dyn NodeConnector>,
        inbound: mpsc::Sender<InboundFrame>,
        ids: Arc<SequenceGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pools: BTreeMap::new(),
            request_to_pool: HashMap::new(),
            nodes: Vec::new(),
            settings,
            connector,
            inbound,
            ids,
            clock,
            rng: StdRng::from_entropy(),
        }
    }

    /// Fix the node shuffling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Node set for pools opened from now on. Blacklisted nodes are left out.
    pub fn update_nodes(&mut self, nodes: Vec<RemoteNode>) {
        self.nodes = nodes.into_iter().filter(|n| !n.blacklisted).collect();
        info!(nodes = self.nodes.len(), "Router node set updated");
    }

    /// Current node set.
    pub fn nodes(&self) -> &[RemoteNode] {
        &self.nodes
    }

    /// Number of live pools.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Pool a request is bound to.
    pub fn bound_pool(&self, req_id: &str) -> Option<ConnectionId> {
        self.request_to_pool.get(req_id).copied()
    }

    /// Forward a command to the request's pool, binding new requests first.
    pub fn route(&mut self, command: NetworkCommand) {
        let now = self.clock.now();
        let req_id = command.req_id().clone();

        if let Some(id) = self.request_to_pool.get(&req_id).copied() {
            if let Some(pool) = self.pools.get_mut(&id) {
                let finished = matches!(command, NetworkCommand::CleanTimeout { alias: None, .. });
                pool.apply(command, now);
                if finished {
                    self.request_to_pool.remove(&req_id);
                }
                return;
            }
            self.request_to_pool.remove(&req_id);
        }

        if !command.opens_request() {
            debug!(req_id = %req_id, "No pool bound to request, command dropped");
            return;
        }
        if self.nodes.is_empty() {
            warn!(req_id = %req_id, "No nodes to route request to");
            return;
        }

        let id = self.select_pool(now);
        if let Some(pool) = self.pools.get_mut(&id) {
            pool.apply(command, now);
            self.request_to_pool.insert(req_id, id);
        }
    }

    fn select_pool(&mut self, now: Instant) -> ConnectionId {
        let current: BTreeSet<&str> = self.nodes.iter().map(|n| n.name.as_str()).collect();
        let reusable = self.pools.values().find(|pool| {
            pool.is_active(now)
                && pool.request_count() < self.settings.max_requests
                && pool.node_names() == current
        });
        if let Some(pool) = reusable {
            debug!(pool = pool.id(), "Reusing connection pool");
            return pool.id();
        }

        let id = self.ids.next_id();
        let nodes = shuffle_nodes(self.nodes.clone(), &self.settings.preordered_nodes, &mut self.rng);
        let pool = ConnectionPool::new(
            id,
            nodes,
            self.settings.active_timeout,
            Arc::clone(&self.connector),
            self.inbound.clone(),
            now,
        );
        self.pools.insert(id, pool);
        id
    }

    /// Earliest deadline over every pool.
    pub fn global_next_deadline(&self) -> Option<Instant> {
        let now = self.clock.now();
        self.pools.values().filter_map(|p| p.next_deadline(now)).min()
    }

    /// Remove and return every expired `(req_id, alias)` across pools.
    pub fn drain_expired(&mut self) -> Vec<TimeoutKey> {
        let now = self.clock.now();
        self.pools
            .values_mut()
            .flat_map(|pool| pool.drain_expired(now))
            .collect()
    }

    /// Drop orphaned pools and the request bindings pointing at them.
    pub fn reap_orphans(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.pools.len();
        self.pools.retain(|id, pool| {
            let orphaned = pool.is_orphaned(now);
            if orphaned {
                debug!(pool = *id, "Dropping orphaned connection pool");
            }
            !orphaned
        });
        let pools = &self.pools;
        self.request_to_pool.retain(|_, id| pools.contains_key(id));
        before - self.pools.len()
    }

    /// Resolve received frames to node messages. Frames of dropped pools are
    /// discarded.
    pub fn fetch_ready_replies(&self, frames: impl IntoIterator<Item = InboundFrame>) -> Vec<NodeMessage> {
        frames
            .into_iter()
            .filter_map(|frame| {
                let pool = self.pools.get(&frame.pool_id);
                if pool.is_none() {
                    debug!(pool = frame.pool_id, "Frame from dropped pool");
                }
                pool?.resolve(frame)
            })
            .collect()
    }
}
