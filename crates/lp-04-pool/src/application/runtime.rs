//! # Pool Runtime
//!
//! The task that owns one pool. Every mutation of the pool machine and its
//! router happens inside [`PoolRuntime::run`].
//!
//! ```text
//! commands ──┐
//!            ├──→ select! ──→ PoolStateMachine ──effects──→ NetworkRouter
//! frames ────┤                     ↑                              │
//!            │                     └── Timeout ── drain_expired ──┘
//! sleep ─────┤   (min of next deadline and poll interval)
//! tick ──────┘   housekeeping every poll interval: reap_orphans
//! ```

use std::sync::Arc;
use std::time::Duration;

use lp_01_state_proof::BlsGenerator;
use lp_02_networker::{ConnectionSettings, InboundFrame, NetworkRouter, NodeConnector, TimeoutKey};
use shared_types::{Clock, SequenceGenerator};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::state_machine::{PoolEffect, PoolEvent, PoolStateMachine};
use crate::domain::{CommandEnvelope, PoolConfig, PoolResponse};

/// Frames buffered between socket readers and the pool loop.
pub const INBOUND_CAPACITY: usize = 1024;

/// Commands buffered ahead of the pool loop.
pub const COMMAND_CAPACITY: usize = 64;

/// Caller side of a pool's command channel.
#[derive(Debug)]
pub struct PoolChannels {
    /// Commands into the pool
    pub commands: mpsc::Sender<CommandEnvelope>,
    /// Responses, in the order the pool produced them
    pub responses: mpsc::UnboundedReceiver<PoolResponse>,
}

/// One pool's event loop.
pub struct PoolRuntime {
    machine: PoolStateMachine,
    router: NetworkRouter,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    commands: mpsc::Receiver<CommandEnvelope>,
    inbound: mpsc::Receiver<InboundFrame>,
    responses: mpsc::UnboundedSender<PoolResponse>,
}

impl PoolRuntime {
    /// Wire a pool over `genesis` text.
    pub fn new(
        genesis: impl Into<String>,
        config: PoolConfig,
        connector: Arc<dyn NodeConnector>,
        clock: Arc<dyn Clock>,
    ) -> (Self, PoolChannels) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

        let ids = Arc::new(SequenceGenerator::new());
        let settings = ConnectionSettings {
            active_timeout: config.connection_active_timeout,
            max_requests: config.max_requests_per_connection,
            preordered_nodes: config.preordered_nodes.clone(),
        };
        let router = NetworkRouter::new(
            settings,
            connector,
            inbound_tx,
            Arc::clone(&ids),
            Arc::clone(&clock),
        );
        let poll_interval = config.poll_interval;
        let machine = PoolStateMachine::new(genesis, config, ids, Arc::clone(&clock));

        let runtime = Self {
            machine,
            router,
            clock,
            poll_interval,
            commands: command_rx,
            inbound: inbound_rx,
            responses: response_tx,
        };
        let channels = PoolChannels {
            commands: command_tx,
            responses: response_rx,
        };
        (runtime, channels)
    }

    /// Fix the node shuffling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.router = self.router.with_seed(seed);
        self
    }

    /// Check state proof signatures against `generator`.
    pub fn with_generator(mut self, generator: BlsGenerator) -> Self {
        self.machine = self.machine.with_generator(generator);
        self
    }

    /// Run until `Close` is handled or every command sender is gone.
    pub async fn run(mut self) {
        info!(poll_interval = ?self.poll_interval, "Pool task started");
        let mut housekeeping = tokio::time::interval(self.poll_interval);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while !self.machine.is_closed() {
            let wait = self.next_wake();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(envelope) => self.dispatch(PoolEvent::Command(envelope)),
                    None => {
                        info!("All command senders dropped");
                        break;
                    }
                },
                Some(frame) = self.inbound.recv() => {
                    let mut frames = vec![frame];
                    while let Ok(frame) = self.inbound.try_recv() {
                        frames.push(frame);
                    }
                    for message in self.router.fetch_ready_replies(frames) {
                        self.dispatch(PoolEvent::NodeReply {
                            alias: message.alias,
                            payload: message.payload,
                        });
                    }
                }
                _ = tokio::time::sleep(wait) => {}
                _ = housekeeping.tick() => {
                    self.reap();
                }
            }
            self.expire();
        }
        info!(pools = self.router.pool_count(), "Pool task stopped");
    }

    fn next_wake(&self) -> Duration {
        let now = self.clock.now();
        self.router
            .global_next_deadline()
            .map_or(self.poll_interval, |deadline| {
                deadline.saturating_duration_since(now).min(self.poll_interval)
            })
    }

    fn expire(&mut self) {
        for TimeoutKey { req_id, alias } in self.router.drain_expired() {
            debug!(req_id = %req_id, alias = %alias, "Node deadline expired");
            self.dispatch(PoolEvent::Timeout { req_id, alias });
        }
    }

    fn reap(&mut self) -> usize {
        let reaped = self.router.reap_orphans();
        if reaped > 0 {
            debug!(reaped, "Orphaned connection pools dropped");
        }
        reaped
    }

    fn dispatch(&mut self, event: PoolEvent) {
        for effect in self.machine.handle(event) {
            match effect {
                PoolEffect::UpdateNodes(nodes) => self.router.update_nodes(nodes),
                PoolEffect::Network(command) => self.router.route(command),
                PoolEffect::Respond(response) => {
                    if self.responses.send(response).is_err() {
                        debug!("Response receiver dropped");
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for PoolRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRuntime")
            .field("machine", &self.machine)
            .field("pools", &self.router.pool_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PoolCommand;
    use crate::testing::{genesis_text, ledger, ledger_status, reply, validator_txns};
    use lp_01_state_proof::testing::test_validators;
    use lp_02_networker::MockConnector;
    use serde_json::json;
    use shared_types::{ManualClock, SystemClock};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    async fn wait_for_sent(connector: &MockConnector, alias: &str, needle: &str) -> String {
        timeout(WAIT, async {
            loop {
                if let Some(message) = connector.sent_to(alias).into_iter().find(|m| m.contains(needle)) {
                    return message;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("message sent in time")
    }

    fn start() -> (MockConnector, PoolChannels, String, tokio::task::JoinHandle<()>) {
        let (_, verkeys) = test_validators(4, &BlsGenerator::default());
        let txns = validator_txns(&verkeys);
        let connector = MockConnector::new();
        let (runtime, channels) = PoolRuntime::new(
            genesis_text(&txns),
            PoolConfig::for_testing(),
            Arc::new(connector.clone()),
            Arc::new(SystemClock),
        );
        let task = tokio::spawn(runtime.with_seed(7).with_generator(BlsGenerator::default()).run());
        (connector, channels, ledger_status(&ledger(&txns)), task)
    }

    async fn command(channels: &mut PoolChannels, correlation_id: u64, command: PoolCommand) -> PoolResponse {
        channels
            .commands
            .send(CommandEnvelope { correlation_id, command })
            .await
            .unwrap();
        timeout(WAIT, channels.responses.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_open_request_close() {
        let (connector, mut channels, status, task) = start();
        channels
            .commands
            .send(CommandEnvelope { correlation_id: 1, command: PoolCommand::CheckCache })
            .await
            .unwrap();
        for alias in ["Node1", "Node2", "Node3"] {
            wait_for_sent(&connector, alias, "LEDGER_STATUS").await;
            assert!(connector.deliver(alias, &status));
        }
        let synced = timeout(WAIT, channels.responses.recv()).await.unwrap().unwrap();
        assert_eq!(synced.correlation_id, 1);
        assert!(synced.result.unwrap().contains("\"txnCount\":4"));

        let request = json!({"reqId": 11, "operation": {"type": "1"}}).to_string();
        channels
            .commands
            .send(CommandEnvelope {
                correlation_id: 2,
                command: PoolCommand::SendRequest { request, timeout: None, nodes: None },
            })
            .await
            .unwrap();
        let result = json!({"reqId": 11, "seqNo": 3});
        for alias in ["Node2", "Node3"] {
            wait_for_sent(&connector, alias, "\"reqId\":11").await;
            connector.deliver(alias, &reply(result.clone()));
        }
        let answered = timeout(WAIT, channels.responses.recv()).await.unwrap().unwrap();
        assert_eq!(answered.correlation_id, 2);
        assert!(answered.result.unwrap().contains("\"seqNo\":3"));

        let closed = command(&mut channels, 3, PoolCommand::Close).await;
        assert_eq!(closed.result, Ok(String::new()));
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_orphans_reaped_by_housekeeping() {
        let (_, verkeys) = test_validators(4, &BlsGenerator::default());
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let (mut runtime, _channels) = PoolRuntime::new(
            genesis_text(&validator_txns(&verkeys)),
            PoolConfig::for_testing(),
            Arc::new(MockConnector::new()),
            clock.clone(),
        );

        runtime.dispatch(PoolEvent::Command(CommandEnvelope { correlation_id: 1, command: PoolCommand::CheckCache }));
        assert_eq!(runtime.router.pool_count(), 1);
        runtime.dispatch(PoolEvent::Command(CommandEnvelope { correlation_id: 2, command: PoolCommand::Close }));

        // idle and past its active window, but only the tick drops it
        clock.advance(Duration::from_secs(2));
        runtime.expire();
        assert_eq!(runtime.router.pool_count(), 1);
        assert_eq!(runtime.reap(), 1);
        assert_eq!(runtime.router.pool_count(), 0);
    }

    #[tokio::test]
    async fn test_silent_pool_times_out() {
        let (connector, mut channels, _, task) = start();
        let response = command(&mut channels, 1, PoolCommand::CheckCache).await;
        // nobody acknowledges, every node deadline expires
        assert!(matches!(response.result, Err(shared_types::PoolError::QuorumUnreachable(_))));
        assert_eq!(connector.sent().iter().filter(|m| m.message.contains("LEDGER_STATUS")).count(), 4);

        drop(channels);
        timeout(WAIT, task).await.unwrap().unwrap();
    }
}
