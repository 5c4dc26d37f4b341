//! # Mock Connector
//!
//! Records what the pools send and lets a test answer as any node.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::{ConnectionId, NodeAlias};
use tokio::sync::mpsc;

use crate::domain::NetworkerError;
use crate::ports::{InboundFrame, NodeChannel, NodeConnector, NodeLink};

/// One message a pool handed to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Pool that sent it
    pub pool_id: ConnectionId,
    /// Target node
    pub alias: NodeAlias,
    /// Message text
    pub message: String,
}

struct Route {
    pool_id: ConnectionId,
    node_index: usize,
    inbound: mpsc::Sender<InboundFrame>,
}

#[derive(Default)]
struct MockState {
    sent: Vec<SentMessage>,
    connects: usize,
    unreachable: HashSet<NodeAlias>,
    routes: HashMap<NodeAlias, Route>,
}

/// In-memory connector. Clones share state.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// Empty connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every message sent to `alias`.
    pub fn set_unreachable(&self, alias: &str) {
        self.state.lock().unreachable.insert(alias.to_string());
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }

    /// Messages sent to one node.
    pub fn sent_to(&self, alias: &str) -> Vec<String> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|m| m.alias == alias)
            .map(|m| m.message.clone())
            .collect()
    }

    /// Take and clear the sent log.
    pub fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Channels opened so far.
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    /// Deliver `payload` as if `alias` sent it on its most recent channel.
    /// Returns `false` when no channel to `alias` was ever opened.
    pub fn deliver(&self, alias: &str, payload: &str) -> bool {
        let state = self.state.lock();
        let Some(route) = state.routes.get(alias) else {
            return false;
        };
        route
            .inbound
            .try_send(InboundFrame {
                pool_id: route.pool_id,
                node_index: route.node_index,
                payload: payload.to_string(),
            })
            .is_ok()
    }
}

impl NodeConnector for MockConnector {
    fn connect(&self, link: NodeLink<'_>) -> Result<Box<dyn NodeChannel>, NetworkerError> {
        let mut state = self.state.lock();
        state.connects += 1;
        state.routes.insert(
            link.node.name.clone(),
            Route {
                pool_id: link.pool_id,
                node_index: link.node_index,
                inbound: link.inbound,
            },
        );
        Ok(Box::new(MockChannel {
            pool_id: link.pool_id,
            alias: link.node.name.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockChannel {
    pool_id: ConnectionId,
    alias: NodeAlias,
    state: Arc<Mutex<MockState>>,
}

impl NodeChannel for MockChannel {
    fn send(&mut self, message: &str) -> Result<(), NetworkerError> {
        let mut state = self.state.lock();
        if state.unreachable.contains(&self.alias) {
            return Err(NetworkerError::ChannelClosed(self.alias.clone()));
        }
        state.sent.push(SentMessage {
            pool_id: self.pool_id,
            alias: self.alias.clone(),
            message: message.to_string(),
        });
        Ok(())
    }
}
