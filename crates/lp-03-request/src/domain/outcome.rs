//! # Request Outcomes

use serde_json::Value;
use shared_types::PoolError;

use super::ledger_view::LedgerView;
use super::Hash;

/// How a request machine finished.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// A trusted or quorum-backed reply, as received.
    Reply(String),
    /// Every target's raw reply (or `"timeout"`), keyed by alias.
    Full(Value),
    /// Finished without a decided answer.
    QuorumUnreachable(String),
    /// No node answered at all.
    Timeout,
    /// The local ledger matches the pool's.
    Synced(LedgerView),
    /// A quorum agreed on a larger ledger extending the local one.
    CatchupTargetFound {
        /// Target root
        root: Hash,
        /// Target size
        size: usize,
        /// Local ledger the target extends
        view: LedgerView,
    },
    /// No usable catch-up target.
    CatchupTargetNotFound(String),
    /// Every node failed to serve catch-up data.
    CatchupRestart,
    /// Cut short by refresh or close.
    Terminated,
    /// The request could not be started.
    Failed(PoolError),
}

impl RequestOutcome {
    /// Answer for the caller of a custom request.
    pub fn into_response(self) -> Result<String, PoolError> {
        match self {
            Self::Reply(raw) => Ok(raw),
            Self::Full(replies) => Ok(replies.to_string()),
            Self::QuorumUnreachable(reason) => Err(PoolError::QuorumUnreachable(reason)),
            Self::Timeout => Err(PoolError::Timeout),
            Self::Terminated => Err(PoolError::Terminated("request terminated".into())),
            Self::Failed(err) => Err(err),
            Self::CatchupTargetNotFound(reason) => Err(PoolError::QuorumUnreachable(reason)),
            other => Err(PoolError::Protocol(format!(
                "catch-up outcome {} is not a request answer",
                other.name()
            ))),
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reply(_) => "Reply",
            Self::Full(_) => "Full",
            Self::QuorumUnreachable(_) => "QuorumUnreachable",
            Self::Timeout => "Timeout",
            Self::Synced(_) => "Synced",
            Self::CatchupTargetFound { .. } => "CatchupTargetFound",
            Self::CatchupTargetNotFound(_) => "CatchupTargetNotFound",
            Self::CatchupRestart => "CatchupRestart",
            Self::Terminated => "Terminated",
            Self::Failed(_) => "Failed",
        }
    }
}
