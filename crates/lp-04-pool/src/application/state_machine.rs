//! # Pool State Machine
//!
//! Lifecycle of one pool: load genesis, agree on the pool ledger with the
//! validators, catch up when behind, then serve requests.
//!
//! ```text
//! [Initialization] ──CheckCache──→ [GettingCatchupTarget] ──target found──→ [SyncCatchup]
//!                                      │        ↑    │                           │
//!                                      │        └────┼──── restart ──────────────┤
//!                                      │ synced      │ not found / budget        │ synced
//!                                      ↓             ↓                           ↓
//!                                  [Active] ──outdated──→ [Terminated] ←── blacklisted
//!                                      │                      │
//!                                      └──── Refresh ─────────┴──→ [GettingCatchupTarget]
//!
//!  any state ──Close──→ [Closed]
//! ```
//!
//! The machine performs no I/O. Each event yields [`PoolEffect`]s that the
//! pool loop applies in order: node set updates, network commands for the
//! router and responses for callers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use lp_01_state_proof::{derive_proof_key, txn_types, BlsGenerator, StateProofVerifier};
use lp_03_request::domain::stringify_req_id;
use lp_03_request::{
    max_failed_nodes, LedgerView, RequestContext, RequestEvent, RequestOutcome, RequestStateMachine,
    RequestTransition,
};
use serde_json::{json, Value};
use shared_types::{Clock, NetworkCommand, NodeAlias, PoolError, RemoteNode, RequestId, SequenceGenerator};
use tracing::{debug, info, warn};

use crate::domain::{
    build_node_state, ledger_from_genesis, CommandEnvelope, CorrelationId, PoolCommand, PoolConfig,
    PoolNodes, PoolResponse,
};

/// Input of the pool machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// A caller's command.
    Command(CommandEnvelope),
    /// A message received from a node.
    NodeReply {
        /// Sender
        alias: NodeAlias,
        /// Raw JSON
        payload: String,
    },
    /// A node missed its deadline for a request.
    Timeout {
        /// Request id
        req_id: RequestId,
        /// Silent node
        alias: NodeAlias,
    },
}

/// Output of the pool machine, applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEffect {
    /// Contactable nodes for connection pools opened from now on.
    UpdateNodes(Vec<RemoteNode>),
    /// Command for the network router.
    Network(NetworkCommand),
    /// Answer to a caller.
    Respond(PoolResponse),
}

/// A catch-up round in progress.
#[derive(Debug)]
pub struct CatchupState {
    base: LedgerView,
    nodes: PoolNodes,
    ctx: RequestContext,
    machine: RequestStateMachine,
    restarts: u32,
    waiters: Vec<CorrelationId>,
}

#[derive(Debug)]
struct LiveRequest {
    correlation_id: CorrelationId,
    machine: RequestStateMachine,
    ctx: RequestContext,
}

/// A synced pool serving requests.
#[derive(Debug)]
pub struct ActiveState {
    view: LedgerView,
    nodes: PoolNodes,
    ctx: RequestContext,
    requests: BTreeMap<RequestId, LiveRequest>,
    /// Nodes that announced a larger pool ledger.
    outdated_votes: BTreeSet<NodeAlias>,
}

impl ActiveState {
    /// Synced pool ledger.
    pub fn view(&self) -> &LedgerView {
        &self.view
    }

    /// Nodes of the synced ledger.
    pub fn nodes(&self) -> &PoolNodes {
        &self.nodes
    }
}

/// State of a pool.
#[derive(Debug)]
pub enum PoolState {
    /// Genesis not loaded yet.
    Initialization,
    /// Asking the validators for their pool ledger.
    GettingCatchupTarget(CatchupState),
    /// Fetching missing pool ledger transactions.
    SyncCatchup(CatchupState),
    /// Serving requests.
    Active(ActiveState),
    /// Stopped serving; `Refresh` starts over.
    Terminated {
        /// Last ledger known to be valid
        last_view: Option<LedgerView>,
    },
    /// Absorbing.
    Closed,
}

impl PoolState {
    /// Short name for logs and `InvalidState` errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialization => "Initialization",
            Self::GettingCatchupTarget(_) => "GettingCatchupTarget",
            Self::SyncCatchup(_) => "SyncCatchup",
            Self::Active(_) => "Active",
            Self::Terminated { .. } => "Terminated",
            Self::Closed => "Closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Target,
    Sync,
}

impl Phase {
    fn wrap(self, st: CatchupState) -> PoolState {
        match self {
            Self::Target => PoolState::GettingCatchupTarget(st),
            Self::Sync => PoolState::SyncCatchup(st),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Target => "GettingCatchupTarget",
            Self::Sync => "SyncCatchup",
        }
    }
}

/// Effects accumulated while handling one event.
#[derive(Default)]
struct Effects(Vec<PoolEffect>);

impl Effects {
    fn network(&mut self, commands: Vec<NetworkCommand>) {
        self.0.extend(commands.into_iter().map(PoolEffect::Network));
    }

    fn respond(&mut self, response: PoolResponse) {
        self.0.push(PoolEffect::Respond(response));
    }

    fn update_nodes(&mut self, nodes: &PoolNodes) {
        self.0.push(PoolEffect::UpdateNodes(nodes.active_nodes().cloned().collect()));
    }

    fn invalid(&mut self, envelope: CommandEnvelope, state: &'static str) {
        let command = envelope.command.name();
        warn!(command, state, "Command not applicable");
        self.respond(PoolResponse::err(
            envelope.correlation_id,
            PoolError::InvalidState {
                command: command.to_string(),
                state,
            },
        ));
    }
}

/// The pool machine.
pub struct PoolStateMachine {
    state: PoolState,
    genesis: String,
    config: PoolConfig,
    ids: Arc<SequenceGenerator>,
    clock: Arc<dyn Clock>,
    generator: BlsGenerator,
}

impl PoolStateMachine {
    /// Machine in `Initialization` over `genesis` text.
    pub fn new(
        genesis: impl Into<String>,
        config: PoolConfig,
        ids: Arc<SequenceGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: PoolState::Initialization,
            genesis: genesis.into(),
            config,
            ids,
            clock,
            generator: BlsGenerator::default(),
        }
    }

    /// Use a non-standard BLS generator.
    pub fn with_generator(mut self, generator: BlsGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Current state.
    pub fn state(&self) -> &PoolState {
        &self.state
    }

    /// Whether `Close` was handled.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, PoolState::Closed)
    }

    /// Requests in flight.
    pub fn live_requests(&self) -> usize {
        match &self.state {
            PoolState::Active(st) => st.requests.len(),
            _ => 0,
        }
    }

    /// Feed one event.
    pub fn handle(&mut self, event: PoolEvent) -> Vec<PoolEffect> {
        let state = std::mem::replace(&mut self.state, PoolState::Closed);
        let mut fx = Effects::default();
        self.state = self.transition(state, event, &mut fx);
        fx.0
    }

    fn transition(&self, state: PoolState, event: PoolEvent, fx: &mut Effects) -> PoolState {
        match (state, event) {
            (PoolState::Closed, PoolEvent::Command(envelope)) => {
                fx.invalid(envelope, "Closed");
                PoolState::Closed
            }
            (PoolState::Closed, _) => PoolState::Closed,
            (
                state,
                PoolEvent::Command(CommandEnvelope {
                    correlation_id,
                    command: PoolCommand::Close,
                }),
            ) => self.close(state, correlation_id, fx),

            (
                PoolState::Initialization,
                PoolEvent::Command(CommandEnvelope {
                    correlation_id,
                    command: PoolCommand::CheckCache,
                }),
            ) => match ledger_from_genesis(&self.genesis) {
                Ok(view) => self.start_catchup(view, 0, vec![correlation_id], fx),
                Err(e) => self.terminate(None, vec![correlation_id], e.into(), fx),
            },
            (PoolState::Initialization, PoolEvent::Command(envelope)) => {
                fx.invalid(envelope, "Initialization");
                PoolState::Initialization
            }
            (PoolState::Initialization, _) => PoolState::Initialization,

            (PoolState::GettingCatchupTarget(st), event) => self.on_catchup_event(st, Phase::Target, event, fx),
            (PoolState::SyncCatchup(st), event) => self.on_catchup_event(st, Phase::Sync, event, fx),

            (
                PoolState::Active(st),
                PoolEvent::Command(CommandEnvelope {
                    correlation_id,
                    command: PoolCommand::SendRequest { request, timeout, nodes },
                }),
            ) => self.send_request(st, correlation_id, request, timeout, nodes, fx),
            (
                PoolState::Active(st),
                PoolEvent::Command(CommandEnvelope {
                    correlation_id,
                    command: PoolCommand::Refresh,
                }),
            ) => {
                info!("Refreshing pool ledger");
                let view = self.terminate_requests(st, fx);
                self.start_catchup(view, 0, vec![correlation_id], fx)
            }
            (PoolState::Active(st), PoolEvent::Command(envelope)) => {
                fx.invalid(envelope, "Active");
                PoolState::Active(st)
            }
            (PoolState::Active(st), PoolEvent::NodeReply { alias, payload }) => {
                self.on_active_reply(st, &alias, &payload, fx)
            }
            (PoolState::Active(st), PoolEvent::Timeout { req_id, alias }) => {
                self.route_to_request(st, &req_id, RequestEvent::Timeout { alias }, fx)
            }

            (
                PoolState::Terminated { last_view },
                PoolEvent::Command(CommandEnvelope {
                    correlation_id,
                    command: PoolCommand::Refresh,
                }),
            ) => {
                let view = match last_view {
                    Some(view) => view,
                    None => match ledger_from_genesis(&self.genesis) {
                        Ok(view) => view,
                        Err(e) => return self.terminate(None, vec![correlation_id], e.into(), fx),
                    },
                };
                self.start_catchup(view, 0, vec![correlation_id], fx)
            }
            (PoolState::Terminated { last_view }, PoolEvent::Command(envelope)) => {
                fx.invalid(envelope, "Terminated");
                PoolState::Terminated { last_view }
            }
            (state @ PoolState::Terminated { .. }, _) => state,
        }
    }

    fn next_req_id(&self) -> RequestId {
        format!("pool-ledger-{}", self.ids.next_id())
    }

    fn request_context(&self, nodes: &PoolNodes) -> RequestContext {
        let verkeys = Arc::new(nodes.verkeys.clone());
        let verifier = StateProofVerifier::new(
            Arc::clone(&verkeys),
            max_failed_nodes(verkeys.len()),
            self.generator.clone(),
            self.config.freshness_threshold,
        );
        RequestContext::new(verkeys, Arc::new(verifier), Arc::clone(&self.clock))
            .with_timeouts(self.config.ack_timeout, self.config.reply_timeout)
            .with_protocol_version(self.config.protocol_version)
    }

    fn terminate(
        &self,
        last_view: Option<LedgerView>,
        waiters: Vec<CorrelationId>,
        error: PoolError,
        fx: &mut Effects,
    ) -> PoolState {
        warn!(error = %error, "Pool terminated");
        for correlation_id in waiters {
            fx.respond(PoolResponse::err(correlation_id, error.clone()));
        }
        PoolState::Terminated { last_view }
    }

    fn close(&self, state: PoolState, correlation_id: CorrelationId, fx: &mut Effects) -> PoolState {
        match state {
            PoolState::GettingCatchupTarget(st) | PoolState::SyncCatchup(st) => {
                stop_machine(st.machine, &st.ctx, fx);
                for waiter in st.waiters {
                    fx.respond(PoolResponse::err(waiter, PoolError::Terminated("pool closed".into())));
                }
            }
            PoolState::Active(st) => {
                self.terminate_requests(st, fx);
            }
            PoolState::Initialization | PoolState::Terminated { .. } | PoolState::Closed => {}
        }
        info!("Pool closed");
        fx.respond(PoolResponse::ok(correlation_id, ""));
        PoolState::Closed
    }

    // Catch-up

    fn start_catchup(
        &self,
        view: LedgerView,
        restarts: u32,
        waiters: Vec<CorrelationId>,
        fx: &mut Effects,
    ) -> PoolState {
        let nodes = match build_node_state(&view) {
            Ok(nodes) => nodes,
            Err(e) => return self.terminate(Some(view), waiters, e.into(), fx),
        };
        fx.update_nodes(&nodes);
        let ctx = self.request_context(&nodes);

        let machine = RequestStateMachine::new(self.next_req_id());
        info!(
            req_id = machine.req_id(),
            txns = view.count(),
            validators = ctx.node_count(),
            restarts,
            "Starting pool ledger catch-up"
        );
        let RequestTransition { machine, commands, outcome } =
            machine.handle(RequestEvent::LedgerStatus { view: view.clone() }, &ctx);
        let st = CatchupState {
            base: view,
            nodes,
            ctx,
            machine,
            restarts,
            waiters,
        };
        self.after_catchup_step(st, Phase::Target, commands, outcome, fx)
    }

    fn on_catchup_event(&self, mut st: CatchupState, phase: Phase, event: PoolEvent, fx: &mut Effects) -> PoolState {
        let event = match event {
            PoolEvent::Command(envelope) => {
                fx.invalid(envelope, phase.name());
                return phase.wrap(st);
            }
            PoolEvent::Timeout { req_id, alias } => {
                if req_id != st.machine.req_id() {
                    debug!(req_id = %req_id, "Timeout of finished request dropped");
                    return phase.wrap(st);
                }
                RequestEvent::Timeout { alias }
            }
            PoolEvent::NodeReply { alias, payload } => {
                let Some(event) = decode_node_message(&alias, &payload) else {
                    return phase.wrap(st);
                };
                if event.req_id().is_some() {
                    debug!(alias = %alias, event = event.name(), "Request traffic during catch-up dropped");
                    return phase.wrap(st);
                }
                if phase == Phase::Sync
                    && matches!(event, RequestEvent::CatchupReply { .. })
                    && st.nodes.is_blacklisted(&alias)
                {
                    stop_machine(st.machine, &st.ctx, fx);
                    return self.terminate(
                        Some(st.base),
                        st.waiters,
                        PoolError::Protocol(format!("catch-up reply from blacklisted node {alias}")),
                        fx,
                    );
                }
                event
            }
        };

        let RequestTransition { machine, commands, outcome } = st.machine.handle(event, &st.ctx);
        st.machine = machine;
        self.after_catchup_step(st, phase, commands, outcome, fx)
    }

    fn after_catchup_step(
        &self,
        mut st: CatchupState,
        phase: Phase,
        commands: Vec<NetworkCommand>,
        outcome: Option<RequestOutcome>,
        fx: &mut Effects,
    ) -> PoolState {
        fx.network(commands);
        let Some(outcome) = outcome else {
            return phase.wrap(st);
        };

        match outcome {
            RequestOutcome::Synced(view) => self.activate(view, st.waiters, fx),
            RequestOutcome::CatchupTargetFound { root, size, view } => {
                info!(from = view.count(), to = size, "Pool ledger behind, fetching transactions");
                let machine = RequestStateMachine::new(self.next_req_id());
                let RequestTransition { machine, commands, outcome } = machine.handle(
                    RequestEvent::CatchupRequired {
                        view,
                        target_root: root,
                        target_size: size,
                    },
                    &st.ctx,
                );
                st.machine = machine;
                self.after_catchup_step(st, Phase::Sync, commands, outcome, fx)
            }
            RequestOutcome::CatchupRestart => {
                let restarts = st.restarts + 1;
                if restarts > self.config.max_catchup_restarts {
                    return self.terminate(
                        Some(st.base),
                        st.waiters,
                        PoolError::QuorumUnreachable(format!("pool ledger catch-up failed after {restarts} rounds")),
                        fx,
                    );
                }
                warn!(restarts, "No node served the pool ledger, restarting catch-up");
                self.start_catchup(st.base, restarts, st.waiters, fx)
            }
            RequestOutcome::CatchupTargetNotFound(reason) => {
                self.terminate(Some(st.base), st.waiters, PoolError::QuorumUnreachable(reason), fx)
            }
            other => {
                let error = match other.into_response() {
                    Err(e) => e,
                    Ok(_) => PoolError::Protocol("catch-up ended with a request answer".into()),
                };
                self.terminate(Some(st.base), st.waiters, error, fx)
            }
        }
    }

    fn activate(&self, view: LedgerView, waiters: Vec<CorrelationId>, fx: &mut Effects) -> PoolState {
        let nodes = match build_node_state(&view) {
            Ok(nodes) => nodes,
            Err(e) => return self.terminate(Some(view), waiters, e.into(), fx),
        };
        fx.update_nodes(&nodes);
        let ctx = self.request_context(&nodes);

        info!(txns = view.count(), validators = ctx.node_count(), f = ctx.f, "Pool active");
        let body = json!({"txnCount": view.count(), "merkleRoot": view.root_hash_b58()}).to_string();
        for correlation_id in waiters {
            fx.respond(PoolResponse::ok(correlation_id, body.clone()));
        }
        PoolState::Active(ActiveState {
            view,
            nodes,
            ctx,
            requests: BTreeMap::new(),
            outdated_votes: BTreeSet::new(),
        })
    }

    // Active

    fn send_request(
        &self,
        mut st: ActiveState,
        correlation_id: CorrelationId,
        request: String,
        timeout: Option<Duration>,
        nodes: Option<Vec<NodeAlias>>,
        fx: &mut Effects,
    ) -> PoolState {
        let parsed: Value = match serde_json::from_str(&request) {
            Ok(parsed) => parsed,
            Err(e) => {
                fx.respond(PoolResponse::err(
                    correlation_id,
                    PoolError::Protocol(format!("request is not JSON: {e}")),
                ));
                return PoolState::Active(st);
            }
        };
        let Some(req_id) = parsed.get("reqId").and_then(stringify_req_id) else {
            fx.respond(PoolResponse::err(correlation_id, PoolError::Protocol("request has no reqId".into())));
            return PoolState::Active(st);
        };
        if st.requests.contains_key(&req_id) {
            fx.respond(PoolResponse::err(
                correlation_id,
                PoolError::Protocol(format!("request {req_id} is already in flight")),
            ));
            return PoolState::Active(st);
        }

        let ctx = match timeout {
            Some(reply) => st.ctx.clone().with_timeouts(st.ctx.ack_timeout.min(reply), reply),
            None => st.ctx.clone(),
        };
        let event = classify_request(&parsed, request, nodes);
        debug!(req_id = %req_id, kind = event.name(), "Request submitted");

        let RequestTransition { machine, commands, outcome } =
            RequestStateMachine::new(req_id.clone()).handle(event, &ctx);
        fx.network(commands);
        match outcome {
            Some(outcome) => fx.respond(PoolResponse {
                correlation_id,
                result: outcome.into_response(),
            }),
            None => {
                st.requests.insert(
                    req_id,
                    LiveRequest {
                        correlation_id,
                        machine,
                        ctx,
                    },
                );
            }
        }
        PoolState::Active(st)
    }

    fn on_active_reply(&self, mut st: ActiveState, alias: &str, payload: &str, fx: &mut Effects) -> PoolState {
        let Some(event) = decode_node_message(alias, payload) else {
            return PoolState::Active(st);
        };

        if let Some(size) = announced_size(&event) {
            if size > st.view.count() as u64 {
                st.outdated_votes.insert(alias.to_string());
                let votes = st.outdated_votes.len();
                if votes <= st.ctx.f {
                    debug!(alias = %alias, announced = size, votes, f = st.ctx.f, "Larger pool ledger announced");
                    return PoolState::Active(st);
                }
                warn!(alias = %alias, announced = size, local = st.view.count(), votes, "Pool ledger outdated");
                let view = self.terminate_requests(st, fx);
                return PoolState::Terminated { last_view: Some(view) };
            }
        }

        match event.req_id().map(str::to_string) {
            Some(req_id) => self.route_to_request(st, &req_id, event, fx),
            None => {
                debug!(alias = %alias, event = event.name(), "Ledger traffic while active dropped");
                PoolState::Active(st)
            }
        }
    }

    fn route_to_request(&self, mut st: ActiveState, req_id: &str, event: RequestEvent, fx: &mut Effects) -> PoolState {
        let Some(live) = st.requests.remove(req_id) else {
            debug!(req_id = %req_id, event = event.name(), "No live request, event dropped");
            return PoolState::Active(st);
        };

        let RequestTransition { machine, commands, outcome } = live.machine.handle(event, &live.ctx);
        fx.network(commands);
        match outcome {
            Some(outcome) => fx.respond(PoolResponse {
                correlation_id: live.correlation_id,
                result: outcome.into_response(),
            }),
            None => {
                st.requests.insert(
                    req_id.to_string(),
                    LiveRequest {
                        correlation_id: live.correlation_id,
                        machine,
                        ctx: live.ctx,
                    },
                );
            }
        }
        PoolState::Active(st)
    }

    /// Finish every live request with `Terminated`; returns the ledger view.
    fn terminate_requests(&self, st: ActiveState, fx: &mut Effects) -> LedgerView {
        for (req_id, live) in st.requests {
            debug!(req_id = %req_id, "Terminating live request");
            let transition = live.machine.handle(RequestEvent::Terminate, &live.ctx);
            fx.network(transition.commands);
            if let Some(outcome) = transition.outcome {
                fx.respond(PoolResponse {
                    correlation_id: live.correlation_id,
                    result: outcome.into_response(),
                });
            }
        }
        st.view
    }
}

impl std::fmt::Debug for PoolStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolStateMachine")
            .field("state", &self.state.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn stop_machine(machine: RequestStateMachine, ctx: &RequestContext, fx: &mut Effects) {
    let transition = machine.handle(RequestEvent::Terminate, ctx);
    fx.network(transition.commands);
}

fn decode_node_message(alias: &str, payload: &str) -> Option<RequestEvent> {
    match RequestEvent::from_node_message(alias, payload) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(alias = %alias, error = %e, "Undecodable node message dropped");
            None
        }
    }
}

/// Pool ledger size a node announces, for ledger traffic.
fn announced_size(event: &RequestEvent) -> Option<u64> {
    match event {
        RequestEvent::NodeLedgerStatus { status, .. } => Some(status.txn_seq_no),
        RequestEvent::ConsistencyProof { proof, .. } => Some(proof.seq_no_end),
        _ => None,
    }
}

/// Start event for a submitted request.
///
/// Explicit targets mean a full request; reads carrying a state proof are
/// single requests; everything else needs a quorum.
fn classify_request(parsed: &Value, message: String, nodes: Option<Vec<NodeAlias>>) -> RequestEvent {
    if nodes.is_some() {
        return RequestEvent::CustomFull { message, nodes };
    }
    match parsed.pointer("/operation/type").and_then(Value::as_str) {
        Some(txn_type) if txn_types::is_read_request(txn_type) => RequestEvent::CustomSingle {
            message,
            txn_type: txn_type.to_string(),
            sp_key: derive_proof_key(parsed),
        },
        _ => RequestEvent::CustomConsensus { message },
    }
}
