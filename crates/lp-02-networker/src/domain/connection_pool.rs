//! # Connection Pool
//!
//! One shuffled view of the validator set with lazily opened channels,
//! shared by the requests routed to it.
//!
//! ## Lifecycle
//!
//! ```text
//! created ──(activity window)──→ inactive ──(no pending timeouts)──→ orphaned
//!    │                               │
//!    └── accepts new requests        └── only finishes the ones it has
//! ```
//!
//! Every send records a deadline per `(req_id, alias)`. Deadlines that pass
//! are drained by the pool loop and become `Timeout` events.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;
use shared_types::{ConnectionId, NetworkCommand, NodeAlias, RemoteNode, RequestId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::session::ClientSecret;
use crate::ports::{InboundFrame, NodeChannel, NodeConnector, NodeLink};

/// How pools are shaped and when they stop taking new requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// How long a pool accepts new requests after creation.
    pub active_timeout: Duration,
    /// Requests a pool takes before a new one is opened.
    pub max_requests: usize,
    /// Nodes moved to the front of every pool, in this order.
    pub preordered_nodes: Vec<NodeAlias>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            active_timeout: Duration::from_secs(5),
            max_requests: 5,
            preordered_nodes: Vec::new(),
        }
    }
}

/// A pending deadline's key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeoutKey {
    /// Request
    pub req_id: RequestId,
    /// Node the request waits on
    pub alias: NodeAlias,
}

/// A node message resolved to the node's alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMessage {
    /// Sender
    pub alias: NodeAlias,
    /// Raw message text
    pub payload: String,
}

#[derive(Debug, Clone)]
struct ResendState {
    index: usize,
    message: String,
}

/// Shuffle `nodes`, then move the `preordered` ones to the front in the
/// given order. The others keep their shuffled order.
pub fn shuffle_nodes<R: Rng + ?Sized>(
    mut nodes: Vec<RemoteNode>,
    preordered: &[NodeAlias],
    rng: &mut R,
) -> Vec<RemoteNode> {
    nodes.shuffle(rng);
    if preordered.is_empty() {
        return nodes;
    }

    let mut front = Vec::with_capacity(nodes.len());
    for name in preordered {
        if let Some(pos) = nodes.iter().position(|n| &n.name == name) {
            front.push(nodes.remove(pos));
        }
    }
    front.extend(nodes);
    front
}

/// Sockets and deadlines for the requests sharing one node ordering.
pub struct ConnectionPool {
    id: ConnectionId,
    nodes: Vec<RemoteNode>,
    sockets: Vec<Option<Box<dyn NodeChannel>>>,
    client_secret: ClientSecret,
    connector: Arc<dyn NodeConnector>,
    inbound: mpsc::Sender<InboundFrame>,
    created_at: Instant,
    active_timeout: Duration,
    request_count: usize,
    pending_timeouts: HashMap<TimeoutKey, Instant>,
    resend_state: HashMap<RequestId, ResendState>,
}

impl ConnectionPool {
    /// Pool over `nodes`, already in their final order.
    pub fn new(
        id: ConnectionId,
        nodes: Vec<RemoteNode>,
        active_timeout: Duration,
        connector: Arc<dyn NodeConnector>,
        inbound: mpsc::Sender<InboundFrame>,
        now: Instant,
    ) -> Self {
        let sockets = nodes.iter().map(|_| None).collect();
        debug!(pool = id, nodes = nodes.len(), "Created connection pool");
        Self {
            id,
            nodes,
            sockets,
            client_secret: ClientSecret::generate(),
            connector,
            inbound,
            created_at: now,
            active_timeout,
            request_count: 0,
            pending_timeouts: HashMap::new(),
            resend_state: HashMap::new(),
        }
    }

    /// Pool id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Nodes in this pool's order.
    pub fn nodes(&self) -> &[RemoteNode] {
        &self.nodes
    }

    /// Names of the pool's nodes.
    pub fn node_names(&self) -> BTreeSet<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// Requests started on this pool.
    pub fn request_count(&self) -> usize {
        self.request_count
    }

    /// Number of channels opened so far.
    pub fn open_sockets(&self) -> usize {
        self.sockets.iter().filter(|s| s.is_some()).count()
    }

    /// Alias of the node at `index`.
    pub fn alias_of(&self, index: usize) -> Option<&NodeAlias> {
        self.nodes.get(index).map(|n| &n.name)
    }

    /// Carry out a network command for one of this pool's requests.
    pub fn apply(&mut self, command: NetworkCommand, now: Instant) {
        match command {
            NetworkCommand::SendOne { req_id, message, timeout } => {
                self.request_count += 1;
                if self.nodes.is_empty() {
                    warn!(pool = self.id, req_id = %req_id, "No nodes to send to");
                    return;
                }
                self.send_to(0, &req_id, &message, timeout, now);
                self.resend_state.insert(req_id, ResendState { index: 0, message });
            }

            NetworkCommand::SendAll { req_id, message, timeout, nodes } => {
                self.request_count += 1;
                let targets: Vec<usize> = match &nodes {
                    None => (0..self.nodes.len()).collect(),
                    Some(names) => self
                        .nodes
                        .iter()
                        .enumerate()
                        .filter(|(_, n)| names.contains(&n.name))
                        .map(|(i, _)| i)
                        .collect(),
                };
                if targets.is_empty() {
                    warn!(pool = self.id, req_id = %req_id, "No node matches the request targets");
                }
                for index in targets {
                    self.send_to(index, &req_id, &message, timeout, now);
                }
            }

            NetworkCommand::Resend { req_id, timeout } => {
                let len = self.nodes.len();
                let Some(state) = self.resend_state.get_mut(&req_id).filter(|_| len > 0) else {
                    debug!(pool = self.id, req_id = %req_id, "Nothing to resend");
                    return;
                };
                state.index = (state.index + 1) % len;
                let (index, message) = (state.index, state.message.clone());
                self.send_to(index, &req_id, &message, timeout, now);
            }

            NetworkCommand::ExtendTimeout { req_id, alias, timeout } => {
                self.extend_timeout(&req_id, &alias, timeout, now);
            }

            NetworkCommand::CleanTimeout { req_id, alias } => {
                self.clear_timeout(&req_id, alias.as_deref());
                if alias.is_none() {
                    self.resend_state.remove(&req_id);
                }
            }
        }
    }

    fn send_to(&mut self, index: usize, req_id: &RequestId, message: &str, timeout: Duration, now: Instant) {
        if self.sockets[index].is_none() {
            let link = NodeLink {
                pool_id: self.id,
                node_index: index,
                node: &self.nodes[index],
                client_secret: &self.client_secret,
                inbound: self.inbound.clone(),
            };
            match self.connector.connect(link) {
                Ok(channel) => self.sockets[index] = Some(channel),
                Err(e) => warn!(pool = self.id, alias = %self.nodes[index].name, error = %e, "Connect failed"),
            }
        }

        if let Some(channel) = self.sockets[index].as_mut() {
            if let Err(e) = channel.send(message) {
                warn!(pool = self.id, alias = %self.nodes[index].name, error = %e, "Send failed");
            }
        }

        let key = TimeoutKey {
            req_id: req_id.clone(),
            alias: self.nodes[index].name.clone(),
        };
        self.pending_timeouts.insert(key, now + timeout);
    }

    /// Move an existing deadline to `now + extension`. Unknown keys are
    /// left alone.
    pub fn extend_timeout(&mut self, req_id: &str, alias: &str, extension: Duration, now: Instant) {
        let key = TimeoutKey {
            req_id: req_id.to_string(),
            alias: alias.to_string(),
        };
        if let Some(deadline) = self.pending_timeouts.get_mut(&key) {
            *deadline = now + extension;
        }
    }

    /// Drop the deadline of one node, or of every node when `alias` is `None`.
    pub fn clear_timeout(&mut self, req_id: &str, alias: Option<&str>) {
        match alias {
            Some(alias) => {
                self.pending_timeouts.remove(&TimeoutKey {
                    req_id: req_id.to_string(),
                    alias: alias.to_string(),
                });
            }
            None => self.pending_timeouts.retain(|key, _| key.req_id != req_id),
        }
    }

    /// Remove and return every deadline that has passed.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<TimeoutKey> {
        let mut expired: Vec<TimeoutKey> = self
            .pending_timeouts
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.pending_timeouts.remove(key);
        }
        expired.sort();
        expired
    }

    /// Earliest pending deadline, or the end of the activity window while
    /// that is still ahead.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        let expiry = self.created_at + self.active_timeout;
        let activity = (expiry > now).then_some(expiry);
        self.pending_timeouts.values().copied().chain(activity).min()
    }

    /// Still inside the activity window.
    pub fn is_active(&self, now: Instant) -> bool {
        now < self.created_at + self.active_timeout
    }

    /// Some request still waits on a node.
    pub fn has_pending(&self) -> bool {
        !self.pending_timeouts.is_empty()
    }

    /// Neither active nor waiting; safe to drop.
    pub fn is_orphaned(&self, now: Instant) -> bool {
        !self.is_active(now) && !self.has_pending()
    }

    /// Resolve a frame received on one of this pool's channels.
    pub fn resolve(&self, frame: InboundFrame) -> Option<NodeMessage> {
        let alias = self.alias_of(frame.node_index)?.clone();
        Some(NodeMessage {
            alias,
            payload: frame.payload,
        })
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("id", &self.id)
            .field("nodes", &self.nodes)
            .field("request_count", &self.request_count)
            .field("pending", &self.pending_timeouts.len())
            .finish()
    }
}
