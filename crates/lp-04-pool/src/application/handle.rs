//! # Pool Handle
//!
//! Async front door to a pool task. Each call gets a fresh correlation id
//! and waits on a oneshot that a dispatcher task completes when the pool
//! answers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lp_02_networker::NodeConnector;
use parking_lot::Mutex;
use shared_types::{NodeAlias, PoolError, SequenceGenerator, SystemClock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::runtime::{PoolChannels, PoolRuntime};
use crate::domain::{
    CommandEnvelope, CommandFrame, CorrelationId, OpenError, PoolCommand, PoolConfig, PoolResponse,
};

type Waiter = oneshot::Sender<Result<String, PoolError>>;

/// Cloneable handle to a running pool.
#[derive(Debug, Clone)]
pub struct PoolHandle {
    commands: mpsc::Sender<CommandEnvelope>,
    pending: Arc<Mutex<HashMap<CorrelationId, Waiter>>>,
    ids: Arc<SequenceGenerator>,
}

impl PoolHandle {
    /// Spawn `runtime` and its response dispatcher on the current tokio runtime.
    ///
    /// The returned join handle completes when the pool task stops.
    pub fn spawn(runtime: PoolRuntime, channels: PoolChannels) -> (Self, JoinHandle<()>) {
        let PoolChannels { commands, mut responses } = channels;
        let pending: Arc<Mutex<HashMap<CorrelationId, Waiter>>> = Arc::default();

        let task = tokio::spawn(runtime.run());
        let waiters = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(PoolResponse { correlation_id, result }) = responses.recv().await {
                match waiters.lock().remove(&correlation_id) {
                    Some(waiter) => {
                        let _ = waiter.send(result);
                    }
                    None => debug!(correlation_id, "Response without a waiter"),
                }
            }
            // Dropping the senders wakes every caller with a stopped-pool error.
            waiters.lock().clear();
        });

        let handle = Self {
            commands,
            pending,
            ids: Arc::new(SequenceGenerator::new()),
        };
        (handle, task)
    }

    /// Open a pool over `genesis` text with the system clock.
    pub fn open(
        genesis: impl Into<String>,
        config: PoolConfig,
        connector: Arc<dyn NodeConnector>,
    ) -> Result<(Self, JoinHandle<()>), OpenError> {
        config.validate()?;
        let (runtime, channels) = PoolRuntime::new(genesis, config, connector, Arc::new(SystemClock));
        Ok(Self::spawn(runtime, channels))
    }

    /// Open a pool over the genesis file at `path`.
    pub fn open_genesis_file(
        path: impl AsRef<Path>,
        config: PoolConfig,
        connector: Arc<dyn NodeConnector>,
    ) -> Result<(Self, JoinHandle<()>), OpenError> {
        let path = path.as_ref();
        let genesis = std::fs::read_to_string(path).map_err(|source| OpenError::GenesisFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::open(genesis, config, connector)
    }

    /// Sync the pool ledger; answers `{"txnCount","merkleRoot"}`.
    pub async fn check_cache(&self) -> Result<String, PoolError> {
        self.submit(PoolCommand::CheckCache).await
    }

    /// Cut live requests and sync again.
    pub async fn refresh(&self) -> Result<String, PoolError> {
        self.submit(PoolCommand::Refresh).await
    }

    /// Stop the pool. Requests still waiting fail with `Terminated`.
    pub async fn close(&self) -> Result<String, PoolError> {
        self.submit(PoolCommand::Close).await
    }

    /// Submit a ledger request with the pool's default routing and timeouts.
    pub async fn send_request(&self, request: impl Into<String>) -> Result<String, PoolError> {
        self.send_request_with(request, None, None).await
    }

    /// Submit a ledger request with a reply deadline and/or explicit targets.
    pub async fn send_request_with(
        &self,
        request: impl Into<String>,
        timeout: Option<Duration>,
        nodes: Option<Vec<NodeAlias>>,
    ) -> Result<String, PoolError> {
        self.submit(PoolCommand::SendRequest {
            request: request.into(),
            timeout,
            nodes,
        })
        .await
    }

    /// Run a flat command frame; the response echoes the frame's
    /// `correlation_id`.
    pub async fn submit_frame(&self, frame: CommandFrame) -> PoolResponse {
        let CommandEnvelope { correlation_id, command } = frame.into_envelope();
        PoolResponse {
            correlation_id,
            result: self.submit(command).await,
        }
    }

    /// Send `command` and wait for its answer.
    pub async fn submit(&self, command: PoolCommand) -> Result<String, PoolError> {
        let correlation_id = self.ids.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(correlation_id, tx);

        let name = command.name();
        if self
            .commands
            .send(CommandEnvelope { correlation_id, command })
            .await
            .is_err()
        {
            self.pending.lock().remove(&correlation_id);
            warn!(command = name, "Pool task is gone");
            return Err(stopped());
        }
        rx.await.unwrap_or_else(|_| Err(stopped()))
    }
}

fn stopped() -> PoolError {
    PoolError::Terminated("pool task stopped".into())
}
