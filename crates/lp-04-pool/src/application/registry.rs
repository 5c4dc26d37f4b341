//! # Pool Registry
//!
//! Several pools opened by name from a [`PoolStore`]. A name is held from
//! the moment `open` starts until `close`, so a pool can be open only once.
//!
//! ```text
//! create(name, genesis) ──→ store
//! open(name) ──→ spawn pool ──CHECK_CACHE──→ synced? ──yes──→ [open]
//!                                                └────no────→ closed, name released
//! close(name) ──CLOSE──→ task joined, name released
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use lp_02_networker::NodeConnector;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::handle::PoolHandle;
use crate::adapters::PoolStore;
use crate::domain::{PoolConfig, RegistryError};

enum Slot {
    Opening,
    Open { handle: PoolHandle, task: JoinHandle<()> },
}

/// Named pools: stored configurations plus the pools currently open.
pub struct PoolRegistry {
    store: PoolStore,
    connector: Arc<dyn NodeConnector>,
    pools: Mutex<HashMap<String, Slot>>,
}

impl PoolRegistry {
    /// Registry over `store`; opened pools reach nodes through `connector`.
    pub fn new(store: PoolStore, connector: Arc<dyn NodeConnector>) -> Self {
        Self {
            store,
            connector,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Underlying store.
    pub fn store(&self) -> &PoolStore {
        &self.store
    }

    /// Store a configuration named `name`; `None` keeps the default timeouts.
    pub fn create(&self, name: &str, genesis_txn: &Path, config: Option<PoolConfig>) -> Result<(), RegistryError> {
        self.store.create(name, genesis_txn, config.unwrap_or_default())
    }

    /// Names of the stored configurations.
    pub fn list(&self) -> Result<Vec<String>, RegistryError> {
        self.store.list()
    }

    /// Remove a stored configuration that is not open.
    pub fn delete(&self, name: &str) -> Result<(), RegistryError> {
        if self.pools.lock().contains_key(name) {
            return Err(RegistryError::AlreadyOpen(name.to_string()));
        }
        self.store.delete(name)
    }

    /// Open the pool stored as `name` and sync its ledger.
    ///
    /// `config` replaces the stored configuration for this session. A pool
    /// that fails to sync is closed again and the error returned.
    pub async fn open(&self, name: &str, config: Option<PoolConfig>) -> Result<PoolHandle, RegistryError> {
        {
            let mut pools = self.pools.lock();
            if pools.contains_key(name) {
                warn!(pool = %name, "Pool with the same name is already open");
                return Err(RegistryError::AlreadyOpen(name.to_string()));
            }
            pools.insert(name.to_string(), Slot::Opening);
        }

        let started = self.start(name, config).await;
        let mut pools = self.pools.lock();
        match started {
            Ok((handle, task)) => {
                pools.insert(name.to_string(), Slot::Open { handle: handle.clone(), task });
                info!(pool = %name, open = pools.len(), "Pool opened");
                Ok(handle)
            }
            Err(e) => {
                pools.remove(name);
                Err(e)
            }
        }
    }

    async fn start(
        &self,
        name: &str,
        config: Option<PoolConfig>,
    ) -> Result<(PoolHandle, JoinHandle<()>), RegistryError> {
        let stored = self.store.load(name)?;
        let config = config.unwrap_or(stored.record.config);
        let (handle, task) = PoolHandle::open(stored.genesis, config, Arc::clone(&self.connector))?;

        if let Err(e) = handle.check_cache().await {
            warn!(pool = %name, error = %e, "Pool failed to sync");
            let _ = handle.close().await;
            if let Err(join) = task.await {
                warn!(pool = %name, error = %join, "Pool task failed");
            }
            return Err(e.into());
        }
        Ok((handle, task))
    }

    /// Handle of the open pool `name`.
    pub fn handle(&self, name: &str) -> Option<PoolHandle> {
        match self.pools.lock().get(name) {
            Some(Slot::Open { handle, .. }) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Names of the open pools, sorted.
    pub fn open_pools(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .pools
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Open { .. }))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Close the open pool `name` and wait for its task.
    pub async fn close(&self, name: &str) -> Result<(), RegistryError> {
        let (handle, task) = {
            let mut pools = self.pools.lock();
            match pools.remove(name) {
                Some(Slot::Open { handle, task }) => (handle, task),
                Some(Slot::Opening) => {
                    pools.insert(name.to_string(), Slot::Opening);
                    return Err(RegistryError::NotOpen(name.to_string()));
                }
                None => return Err(RegistryError::NotOpen(name.to_string())),
            }
        };

        let closed = handle.close().await;
        if let Err(join) = task.await {
            warn!(pool = %name, error = %join, "Pool task failed");
        }
        info!(pool = %name, "Pool closed");
        closed.map(|_| ()).map_err(Into::into)
    }

    /// Close every open pool.
    pub async fn close_all(&self) {
        for name in self.open_pools() {
            if let Err(e) = self.close(&name).await {
                warn!(pool = %name, error = %e, "Close failed");
            }
        }
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("root", &self.store.root())
            .field("open", &self.open_pools())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{genesis_text, ledger, ledger_status, validator_txns};
    use lp_01_state_proof::testing::test_validators;
    use lp_01_state_proof::BlsGenerator;
    use lp_02_networker::MockConnector;
    use shared_types::PoolError;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    struct Fixture {
        dir: TempDir,
        connector: MockConnector,
        registry: PoolRegistry,
        genesis: PathBuf,
        status: String,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let (_, verkeys) = test_validators(4, &BlsGenerator::default());
        let txns = validator_txns(&verkeys);
        let genesis = dir.path().join("pool_transactions_genesis");
        std::fs::write(&genesis, genesis_text(&txns)).unwrap();

        let connector = MockConnector::new();
        let registry = PoolRegistry::new(PoolStore::new(dir.path().join("pools")), Arc::new(connector.clone()));
        Fixture {
            dir,
            connector,
            registry,
            genesis,
            status: ledger_status(&ledger(&txns)),
        }
    }

    /// Answer the next `LEDGER_STATUS` of three nodes.
    fn answer_sync(connector: &MockConnector, status: &str) -> JoinHandle<()> {
        let connector = connector.clone();
        let status = status.to_string();
        tokio::spawn(async move {
            for alias in ["Node1", "Node2", "Node3"] {
                timeout(WAIT, async {
                    while !connector.sent_to(alias).iter().any(|m| m.contains("LEDGER_STATUS")) {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                })
                .await
                .expect("status sent in time");
                connector.deliver(alias, &status);
            }
            connector.take_sent();
        })
    }

    #[tokio::test]
    async fn test_open_by_name_once() {
        let fx = fixture();
        fx.registry.create("sandbox", &fx.genesis, Some(PoolConfig::for_testing())).unwrap();
        assert_eq!(fx.registry.list().unwrap(), vec!["sandbox"]);

        let answering = answer_sync(&fx.connector, &fx.status);
        let handle = fx.registry.open("sandbox", None).await.unwrap();
        answering.await.unwrap();
        assert_eq!(fx.registry.open_pools(), vec!["sandbox"]);
        assert!(fx.registry.handle("sandbox").is_some());

        let err = fx.registry.open("sandbox", None).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyOpen(_)));
        assert!(matches!(fx.registry.delete("sandbox"), Err(RegistryError::AlreadyOpen(_))));

        fx.registry.close("sandbox").await.unwrap();
        assert!(fx.registry.open_pools().is_empty());
        assert!(matches!(handle.refresh().await, Err(PoolError::Terminated(_))));
        assert!(matches!(fx.registry.close("sandbox").await, Err(RegistryError::NotOpen(_))));
        fx.registry.delete("sandbox").unwrap();
        assert!(fx.dir.path().join("pools").exists());
    }

    #[tokio::test]
    async fn test_failed_sync_releases_name() {
        let fx = fixture();
        fx.registry.create("silent", &fx.genesis, Some(PoolConfig::for_testing())).unwrap();

        let err = fx.registry.open("silent", None).await.unwrap_err();
        assert!(matches!(err, RegistryError::Pool(PoolError::QuorumUnreachable(_))));
        assert!(fx.registry.open_pools().is_empty());

        fx.connector.take_sent();
        let answering = answer_sync(&fx.connector, &fx.status);
        fx.registry.open("silent", None).await.unwrap();
        answering.await.unwrap();
        fx.registry.close_all().await;
        assert!(fx.registry.open_pools().is_empty());
    }

    #[tokio::test]
    async fn test_open_unknown_pool() {
        let fx = fixture();
        let err = fx.registry.open("missing", None).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
        assert!(fx.registry.open_pools().is_empty());
    }
}
