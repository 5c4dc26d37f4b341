//! # Request State Machine
//!
//! Drives one request from its start event to an outcome.
//!
//! ```text
//!            ┌─ LedgerStatus ──────→ CatchupConsensus ─┐
//!            ├─ CatchupRequired ───→ CatchupSingle ────┤
//! [Start] ───┼─ CustomSingle ──────→ Single ───────────┼──→ [Finish]
//!            ├─ CustomConsensus ───→ Consensus ────────┤
//!            └─ CustomFull ────────→ Full ─────────────┘
//! ```
//!
//! A transition consumes the machine and returns the next one together with
//! the network commands to route and, on reaching `Finish`, the outcome.
//! Every path into `Finish` ends with `CleanTimeout { alias: None }`, which
//! also unbinds the request from its connection pool.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use lp_01_state_proof::ReplyVerifier;
use serde_json::Value;
use shared_types::{Clock, NetworkCommand, NodeAlias, PoolError, RequestId, VerificationKey};
use tracing::{debug, info, warn};

use crate::algorithms::{
    apply_catchup_reply, canonical_reply, catchup_request_message, evaluate_target,
    ledger_status_message, max_failed_nodes, CatchupProgress, CatchupTarget, ReplyTally,
    TargetVerdict,
};
use crate::domain::{Hash, LedgerView, RequestError, RequestEvent, RequestOutcome};

/// Deadline for a node to acknowledge a request.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(20);

/// Deadline for a node to answer an acknowledged request.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(60);

/// Node protocol version announced in `LEDGER_STATUS`.
pub const DEFAULT_PROTOCOL_VERSION: u64 = 2;

/// Pool-wide inputs shared by every request machine.
#[derive(Clone)]
pub struct RequestContext {
    /// Validators by alias
    pub verkeys: Arc<BTreeMap<NodeAlias, VerificationKey>>,
    /// Tolerated faulty nodes
    pub f: usize,
    /// Single-reply trust check
    pub verifier: Arc<dyn ReplyVerifier>,
    /// Acknowledgement deadline
    pub ack_timeout: Duration,
    /// Reply deadline
    pub reply_timeout: Duration,
    /// Wall clock for proof freshness
    pub clock: Arc<dyn Clock>,
    /// Announced protocol version
    pub protocol_version: u64,
}

impl RequestContext {
    /// Context with default timeouts; `f` follows from the validator count.
    pub fn new(
        verkeys: Arc<BTreeMap<NodeAlias, VerificationKey>>,
        verifier: Arc<dyn ReplyVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            f: max_failed_nodes(verkeys.len()),
            verkeys,
            verifier,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            clock,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
        }
    }

    /// Override both deadlines.
    pub fn with_timeouts(mut self, ack_timeout: Duration, reply_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self.reply_timeout = reply_timeout;
        self
    }

    /// Override the announced protocol version.
    pub fn with_protocol_version(mut self, protocol_version: u64) -> Self {
        self.protocol_version = protocol_version;
        self
    }

    /// Number of validators.
    pub fn node_count(&self) -> usize {
        self.verkeys.len()
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("nodes", &self.verkeys.len())
            .field("f", &self.f)
            .field("ack_timeout", &self.ack_timeout)
            .field("reply_timeout", &self.reply_timeout)
            .finish_non_exhaustive()
    }
}

/// Read request answered by one verified reply or a quorum.
#[derive(Debug, Clone)]
pub struct SingleState {
    txn_type: String,
    sp_key: Option<Vec<u8>>,
    tally: ReplyTally<String>,
}

/// Request answered by a quorum of matching replies.
#[derive(Debug, Clone)]
pub struct ConsensusState {
    tally: ReplyTally<String>,
}

/// Request collecting every target's raw answer.
#[derive(Debug, Clone)]
pub struct FullState {
    targets: BTreeSet<NodeAlias>,
    replies: BTreeMap<NodeAlias, String>,
}

/// Agreement on the pool ledger's size and root.
#[derive(Debug, Clone)]
pub struct CatchupConsensusState {
    view: LedgerView,
    tally: ReplyTally<CatchupTarget>,
}

/// Fetching missing ledger transactions.
#[derive(Debug, Clone)]
pub struct CatchupSingleState {
    view: LedgerView,
    target_root: Hash,
    target_size: usize,
    refused: BTreeSet<NodeAlias>,
}

/// State of a request machine.
#[derive(Debug, Clone)]
pub enum RequestState {
    /// Waiting for the start event.
    Start,
    /// See [`SingleState`].
    Single(SingleState),
    /// See [`ConsensusState`].
    Consensus(ConsensusState),
    /// See [`CatchupSingleState`].
    CatchupSingle(CatchupSingleState),
    /// See [`CatchupConsensusState`].
    CatchupConsensus(CatchupConsensusState),
    /// See [`FullState`].
    Full(FullState),
    /// Absorbing.
    Finish,
}

impl RequestState {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Single(_) => "Single",
            Self::Consensus(_) => "Consensus",
            Self::CatchupSingle(_) => "CatchupSingle",
            Self::CatchupConsensus(_) => "CatchupConsensus",
            Self::Full(_) => "Full",
            Self::Finish => "Finish",
        }
    }
}

/// Result of feeding one event.
#[derive(Debug)]
pub struct RequestTransition {
    /// The machine after the event
    pub machine: RequestStateMachine,
    /// Commands for the network router, in order
    pub commands: Vec<NetworkCommand>,
    /// Set exactly when the machine reached `Finish` on this event
    pub outcome: Option<RequestOutcome>,
}

/// One request's state machine.
#[derive(Debug, Clone)]
pub struct RequestStateMachine {
    req_id: RequestId,
    state: RequestState,
}

impl RequestStateMachine {
    /// Machine in `Start`.
    pub fn new(req_id: impl Into<RequestId>) -> Self {
        Self {
            req_id: req_id.into(),
            state: RequestState::Start,
        }
    }

    /// Request id.
    pub fn req_id(&self) -> &str {
        &self.req_id
    }

    /// Current state.
    pub fn state(&self) -> &RequestState {
        &self.state
    }

    /// Whether the machine reached `Finish`.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, RequestState::Finish)
    }

    /// Feed one event.
    pub fn handle(self, event: RequestEvent, ctx: &RequestContext) -> RequestTransition {
        let Self { req_id, state } = self;
        let step = Step::new(req_id);

        match (state, event) {
            (RequestState::Finish, event) => {
                debug!(req_id = %step.req_id, event = event.name(), "Event after finish ignored");
                step.stay(RequestState::Finish)
            }
            (_, RequestEvent::Terminate) => step.finish(RequestOutcome::Terminated),

            (RequestState::Start, RequestEvent::LedgerStatus { view }) => start_catchup_consensus(view, ctx, step),
            (RequestState::Start, RequestEvent::CatchupRequired { view, target_root, target_size }) => {
                start_catchup_single(view, target_root, target_size, ctx, step)
            }
            (RequestState::Start, RequestEvent::CustomSingle { message, txn_type, sp_key }) => {
                start_single(message, txn_type, sp_key, ctx, step)
            }
            (RequestState::Start, RequestEvent::CustomConsensus { message }) => start_consensus(message, ctx, step),
            (RequestState::Start, RequestEvent::CustomFull { message, nodes }) => start_full(message, nodes, ctx, step),

            (RequestState::Single(st), event) => on_single(st, event, ctx, step),
            (RequestState::Consensus(st), event) => on_consensus(st, event, ctx, step),
            (RequestState::Full(st), event) => on_full(st, event, step),
            (RequestState::CatchupConsensus(st), event) => on_catchup_consensus(st, event, ctx, step),
            (RequestState::CatchupSingle(st), event) => on_catchup_single(st, event, ctx, step),

            (state @ RequestState::Start, event) => step.ignore(state, &event),
        }
    }
}

/// Commands accumulated while handling one event.
struct Step {
    req_id: RequestId,
    commands: Vec<NetworkCommand>,
}

impl Step {
    fn new(req_id: RequestId) -> Self {
        Self {
            req_id,
            commands: Vec::new(),
        }
    }

    fn send_one(&mut self, message: String, timeout: Duration) {
        self.commands.push(NetworkCommand::SendOne {
            req_id: self.req_id.clone(),
            message,
            timeout,
        });
    }

    fn send_all(&mut self, message: String, timeout: Duration, nodes: Option<Vec<NodeAlias>>) {
        self.commands.push(NetworkCommand::SendAll {
            req_id: self.req_id.clone(),
            message,
            timeout,
            nodes,
        });
    }

    fn resend(&mut self, timeout: Duration) {
        self.commands.push(NetworkCommand::Resend {
            req_id: self.req_id.clone(),
            timeout,
        });
    }

    fn extend(&mut self, alias: NodeAlias, timeout: Duration) {
        self.commands.push(NetworkCommand::ExtendTimeout {
            req_id: self.req_id.clone(),
            alias,
            timeout,
        });
    }

    fn clean(&mut self, alias: &str) {
        self.commands.push(NetworkCommand::CleanTimeout {
            req_id: self.req_id.clone(),
            alias: Some(alias.to_string()),
        });
    }

    fn stay(self, state: RequestState) -> RequestTransition {
        RequestTransition {
            machine: RequestStateMachine {
                req_id: self.req_id,
                state,
            },
            commands: self.commands,
            outcome: None,
        }
    }

    fn ignore(self, state: RequestState, event: &RequestEvent) -> RequestTransition {
        debug!(
            req_id = %self.req_id,
            state = state.name(),
            event = event.name(),
            "Event not applicable, ignored"
        );
        self.stay(state)
    }

    fn finish(mut self, outcome: RequestOutcome) -> RequestTransition {
        info!(req_id = %self.req_id, outcome = outcome.name(), "Request finished");
        self.commands.push(NetworkCommand::CleanTimeout {
            req_id: self.req_id.clone(),
            alias: None,
        });
        RequestTransition {
            machine: RequestStateMachine {
                req_id: self.req_id,
                state: RequestState::Finish,
            },
            commands: self.commands,
            outcome: Some(outcome),
        }
    }
}

/// `result` of a `REPLY`, or why the reply counts as a denial.
fn reply_result(raw: &str) -> Result<Value, String> {
    let mut reply: Value = serde_json::from_str(raw).map_err(|e| format!("malformed reply: {e}"))?;
    match reply.get_mut("result").map(Value::take) {
        Some(result) if !result.is_null() => Ok(result),
        _ => Err("reply carries no result".to_string()),
    }
}

fn unresolved<K: Ord + Clone>(tally: &ReplyTally<K>) -> RequestOutcome {
    if !tally.heard_from_anyone() {
        return RequestOutcome::Timeout;
    }
    match tally.last_denial() {
        Some(reason) => RequestOutcome::QuorumUnreachable(format!(
            "no quorum of matching replies, last refusal: {reason}"
        )),
        None => RequestOutcome::QuorumUnreachable("no quorum of matching replies".into()),
    }
}

// Single

fn start_single(
    message: String,
    txn_type: String,
    sp_key: Option<Vec<u8>>,
    ctx: &RequestContext,
    mut step: Step,
) -> RequestTransition {
    step.send_one(message, ctx.ack_timeout);
    if ctx.node_count() > 1 {
        step.resend(ctx.ack_timeout);
    }
    step.stay(RequestState::Single(SingleState {
        txn_type,
        sp_key,
        tally: ReplyTally::new(),
    }))
}

fn on_single(mut st: SingleState, event: RequestEvent, ctx: &RequestContext, mut step: Step) -> RequestTransition {
    let alias = match event {
        RequestEvent::Reply { alias, raw, .. } => {
            if st.tally.has_answered(&alias) {
                debug!(req_id = %step.req_id, alias = %alias, "Duplicate reply ignored");
                return step.stay(RequestState::Single(st));
            }
            match reply_result(&raw) {
                Err(reason) => {
                    st.tally.deny(&alias, reason);
                }
                Ok(result) => {
                    let trusted = st.sp_key.as_deref().is_some_and(|sp_key| {
                        ctx.verifier
                            .verify_reply(&st.txn_type, sp_key, &result, ctx.clock.unix_now())
                    });
                    if trusted {
                        debug!(req_id = %step.req_id, alias = %alias, "State proof verified");
                        return step.finish(RequestOutcome::Reply(raw));
                    }
                    let key = canonical_reply(&result);
                    st.tally.record(&alias, key.clone());
                    if st.tally.is_decided(&key, ctx.f) {
                        return step.finish(RequestOutcome::Reply(raw));
                    }
                }
            }
            alias
        }
        RequestEvent::Reqack { alias, .. } => {
            step.extend(alias, ctx.reply_timeout);
            return step.stay(RequestState::Single(st));
        }
        RequestEvent::Reqnack { alias, reason, .. } | RequestEvent::Reject { alias, reason, .. } => {
            if !st.tally.deny(&alias, reason) {
                return step.stay(RequestState::Single(st));
            }
            alias
        }
        RequestEvent::Timeout { alias } => {
            if !st.tally.time_out(&alias) {
                return step.stay(RequestState::Single(st));
            }
            alias
        }
        other => return step.ignore(RequestState::Single(st), &other),
    };

    if st.tally.is_reachable(ctx.node_count(), ctx.f) {
        step.clean(&alias);
        step.resend(ctx.ack_timeout);
        step.stay(RequestState::Single(st))
    } else {
        step.finish(unresolved(&st.tally))
    }
}

// Consensus

fn start_consensus(message: String, ctx: &RequestContext, mut step: Step) -> RequestTransition {
    step.send_all(message, ctx.ack_timeout, None);
    step.stay(RequestState::Consensus(ConsensusState {
        tally: ReplyTally::new(),
    }))
}

fn on_consensus(
    mut st: ConsensusState,
    event: RequestEvent,
    ctx: &RequestContext,
    mut step: Step,
) -> RequestTransition {
    let alias = match event {
        RequestEvent::Reply { alias, raw, .. } => {
            if st.tally.has_answered(&alias) {
                debug!(req_id = %step.req_id, alias = %alias, "Duplicate reply ignored");
                return step.stay(RequestState::Consensus(st));
            }
            match reply_result(&raw) {
                Err(reason) => {
                    st.tally.deny(&alias, reason);
                }
                Ok(result) => {
                    let key = canonical_reply(&result);
                    st.tally.record(&alias, key.clone());
                    if st.tally.is_decided(&key, ctx.f) {
                        return step.finish(RequestOutcome::Reply(raw));
                    }
                }
            }
            alias
        }
        RequestEvent::Reqack { alias, .. } => {
            step.extend(alias, ctx.reply_timeout);
            return step.stay(RequestState::Consensus(st));
        }
        RequestEvent::Reqnack { alias, reason, .. } | RequestEvent::Reject { alias, reason, .. } => {
            if !st.tally.deny(&alias, reason) {
                return step.stay(RequestState::Consensus(st));
            }
            alias
        }
        RequestEvent::Timeout { alias } => {
            if !st.tally.time_out(&alias) {
                return step.stay(RequestState::Consensus(st));
            }
            alias
        }
        other => return step.ignore(RequestState::Consensus(st), &other),
    };

    if st.tally.is_reachable(ctx.node_count(), ctx.f) {
        step.clean(&alias);
        step.stay(RequestState::Consensus(st))
    } else {
        step.finish(unresolved(&st.tally))
    }
}

// Full

fn start_full(
    message: String,
    nodes: Option<Vec<NodeAlias>>,
    ctx: &RequestContext,
    mut step: Step,
) -> RequestTransition {
    let targets: BTreeSet<NodeAlias> = match &nodes {
        None => ctx.verkeys.keys().cloned().collect(),
        Some(names) => names
            .iter()
            .filter(|name| ctx.verkeys.contains_key(*name))
            .cloned()
            .collect(),
    };
    if targets.is_empty() {
        warn!(req_id = %step.req_id, requested = ?nodes, "No requested node is known to the pool");
        return step.finish(RequestOutcome::Failed(PoolError::Protocol(
            "none of the requested nodes is known to the pool".into(),
        )));
    }

    let addressed = nodes.map(|_| targets.iter().cloned().collect());
    step.send_all(message, ctx.reply_timeout, addressed);
    step.stay(RequestState::Full(FullState {
        targets,
        replies: BTreeMap::new(),
    }))
}

fn on_full(mut st: FullState, event: RequestEvent, mut step: Step) -> RequestTransition {
    let (alias, answer) = match event {
        RequestEvent::Reply { alias, raw, .. }
        | RequestEvent::Reqnack { alias, raw, .. }
        | RequestEvent::Reject { alias, raw, .. } => (alias, raw),
        RequestEvent::Timeout { alias } => (alias, "timeout".to_string()),
        other => return step.ignore(RequestState::Full(st), &other),
    };

    if !st.targets.contains(&alias) || st.replies.contains_key(&alias) {
        debug!(req_id = %step.req_id, alias = %alias, "Answer from non-target or repeated node ignored");
        return step.stay(RequestState::Full(st));
    }
    step.clean(&alias);
    st.replies.insert(alias, answer);

    if st.replies.len() < st.targets.len() {
        return step.stay(RequestState::Full(st));
    }
    let replies = st
        .replies
        .into_iter()
        .map(|(alias, raw)| (alias, Value::String(raw)))
        .collect();
    step.finish(RequestOutcome::Full(Value::Object(replies)))
}

// Catch-up target agreement

fn start_catchup_consensus(view: LedgerView, ctx: &RequestContext, mut step: Step) -> RequestTransition {
    match ledger_status_message(&view, ctx.protocol_version) {
        Ok(message) => {
            debug!(req_id = %step.req_id, count = view.count(), "Asking pool for its ledger status");
            step.send_all(message, ctx.reply_timeout, None);
            step.stay(RequestState::CatchupConsensus(CatchupConsensusState {
                view,
                tally: ReplyTally::new(),
            }))
        }
        Err(e) => step.finish(RequestOutcome::Failed(e.into())),
    }
}

fn on_catchup_consensus(
    mut st: CatchupConsensusState,
    event: RequestEvent,
    ctx: &RequestContext,
    mut step: Step,
) -> RequestTransition {
    match event {
        RequestEvent::NodeLedgerStatus { alias, status } => {
            let target = CatchupTarget::from_status(&status);
            if !tally_target(&mut st.tally, &alias, target) {
                return step.stay(RequestState::CatchupConsensus(st));
            }
            step.clean(&alias);
        }
        RequestEvent::ConsistencyProof { alias, proof } => {
            let target = CatchupTarget::from_proof(&proof);
            if !tally_target(&mut st.tally, &alias, target) {
                return step.stay(RequestState::CatchupConsensus(st));
            }
            step.clean(&alias);
        }
        RequestEvent::Timeout { alias } => {
            if !st.tally.time_out(&alias) {
                return step.stay(RequestState::CatchupConsensus(st));
            }
        }
        other => return step.ignore(RequestState::CatchupConsensus(st), &other),
    }

    let n = ctx.node_count();
    let quorum = n.saturating_sub(ctx.f);
    if let Some(target) = st.tally.leader(quorum).cloned() {
        let outcome = match evaluate_target(&st.view, &target) {
            TargetVerdict::Synced => RequestOutcome::Synced(st.view),
            TargetVerdict::Behind => RequestOutcome::CatchupTargetFound {
                root: target.root,
                size: target.size,
                view: st.view,
            },
            TargetVerdict::Unusable(reason) => RequestOutcome::CatchupTargetNotFound(reason),
        };
        return step.finish(outcome);
    }
    if st.tally.max_count() + st.tally.unanswered(n) < quorum {
        return step.finish(RequestOutcome::CatchupTargetNotFound(format!(
            "no {quorum} nodes agree on the pool ledger"
        )));
    }
    step.stay(RequestState::CatchupConsensus(st))
}

fn tally_target(
    tally: &mut ReplyTally<CatchupTarget>,
    alias: &str,
    target: Result<CatchupTarget, RequestError>,
) -> bool {
    match target {
        Ok(target) => tally.record(alias, target),
        Err(e) => {
            warn!(alias = %alias, error = %e, "Unusable ledger status");
            tally.deny(alias, e.to_string())
        }
    }
}

// Catch-up transaction fetch

fn start_catchup_single(
    view: LedgerView,
    target_root: Hash,
    target_size: usize,
    ctx: &RequestContext,
    mut step: Step,
) -> RequestTransition {
    if view.count() >= target_size {
        return step.finish(RequestOutcome::Synced(view));
    }
    match catchup_request_message(&view, target_size) {
        Ok(message) => {
            debug!(req_id = %step.req_id, from = view.count() + 1, to = target_size, "Requesting ledger transactions");
            step.send_one(message, ctx.reply_timeout);
            step.stay(RequestState::CatchupSingle(CatchupSingleState {
                view,
                target_root,
                target_size,
                refused: BTreeSet::new(),
            }))
        }
        Err(e) => step.finish(RequestOutcome::Failed(e.into())),
    }
}

fn on_catchup_single(
    mut st: CatchupSingleState,
    event: RequestEvent,
    ctx: &RequestContext,
    mut step: Step,
) -> RequestTransition {
    let alias = match event {
        RequestEvent::CatchupReply { alias, reply } => {
            if st.refused.contains(&alias) {
                debug!(req_id = %step.req_id, alias = %alias, "Catch-up reply from refused node ignored");
                return step.stay(RequestState::CatchupSingle(st));
            }
            match apply_catchup_reply(&st.view, &reply, &st.target_root, st.target_size) {
                Ok(CatchupProgress::Complete(view)) => return step.finish(RequestOutcome::Synced(view)),
                Ok(CatchupProgress::Partial(view)) => {
                    st.view = view;
                    step.clean(&alias);
                    return match catchup_request_message(&st.view, st.target_size) {
                        Ok(message) => {
                            step.send_one(message, ctx.reply_timeout);
                            step.stay(RequestState::CatchupSingle(st))
                        }
                        Err(e) => step.finish(RequestOutcome::Failed(e.into())),
                    };
                }
                Err(e) => {
                    warn!(req_id = %step.req_id, alias = %alias, error = %e, "Catch-up reply rejected");
                    alias
                }
            }
        }
        RequestEvent::Timeout { alias } => alias,
        other => return step.ignore(RequestState::CatchupSingle(st), &other),
    };

    let fresh = st.refused.insert(alias.clone());
    if fresh {
        step.clean(&alias);
    }
    if st.refused.len() >= ctx.node_count() {
        return step.finish(RequestOutcome::CatchupRestart);
    }
    step.resend(ctx.reply_timeout);
    step.stay(RequestState::CatchupSingle(st))
}
