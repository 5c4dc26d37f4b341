//! # Pool Store
//!
//! Named pool configurations on disk, one directory per pool:
//!
//! ```text
//! <root>/<name>/<name>.txn     copy of the genesis transactions
//! <root>/<name>/config.json    {"genesis_txn": <source path>, "config": {...}}
//! ```
//!
//! Files are written to a `.tmp` sibling and renamed into place.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{parse_genesis, PoolConfig, RegistryError};

const RECORD_FILE: &str = "config.json";
const GENESIS_EXTENSION: &str = "txn";

/// What `config.json` holds for one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRecord {
    /// Genesis file the pool was created from
    pub genesis_txn: PathBuf,
    /// Pool timeouts and limits
    #[serde(default)]
    pub config: PoolConfig,
}

/// A stored pool ready to be opened.
#[derive(Debug, Clone)]
pub struct StoredPool {
    /// Contents of the genesis copy
    pub genesis: String,
    /// Stored record
    pub record: PoolRecord,
}

/// Directory of named pool configurations.
#[derive(Debug, Clone)]
pub struct PoolStore {
    root: PathBuf,
}

impl PoolStore {
    /// Store rooted at `root`; the directory is created on first `create`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the genesis copy of `name`.
    pub fn genesis_path(&self, name: &str) -> PathBuf {
        self.root.join(name).join(format!("{name}.{GENESIS_EXTENSION}"))
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.root.join(name).join(RECORD_FILE)
    }

    /// Whether a configuration named `name` is stored.
    pub fn exists(&self, name: &str) -> bool {
        self.genesis_path(name).is_file()
    }

    /// Store a pool configuration named `name` built from the genesis file
    /// at `genesis_txn`.
    pub fn create(&self, name: &str, genesis_txn: &Path, config: PoolConfig) -> Result<(), RegistryError> {
        validate_name(name)?;
        let dir = self.root.join(name);
        if dir.exists() {
            return Err(RegistryError::AlreadyExists(name.to_string()));
        }
        config.validate()?;

        let genesis = fs::read_to_string(genesis_txn).map_err(RegistryError::io(genesis_txn))?;
        if parse_genesis(&genesis)?.is_empty() {
            return Err(RegistryError::EmptyGenesis(genesis_txn.to_path_buf()));
        }

        let record = PoolRecord {
            genesis_txn: genesis_txn.to_path_buf(),
            config,
        };
        let encoded = serde_json::to_vec_pretty(&record).map_err(|e| RegistryError::Record {
            path: self.record_path(name),
            reason: e.to_string(),
        })?;

        fs::create_dir_all(&dir).map_err(RegistryError::io(&dir))?;
        let written = write_atomic(&self.genesis_path(name), genesis.as_bytes())
            .and_then(|()| write_atomic(&self.record_path(name), &encoded));
        if let Err(e) = written {
            let _ = fs::remove_dir_all(&dir);
            return Err(e);
        }
        info!(pool = %name, genesis = %genesis_txn.display(), "Pool configuration created");
        Ok(())
    }

    /// Names of the stored configurations, sorted.
    pub fn list(&self) -> Result<Vec<String>, RegistryError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RegistryError::Io { path: self.root.clone(), source: e }),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(RegistryError::io(&self.root))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if self.exists(&name) {
                names.push(name);
            } else {
                debug!(entry = %name, "Skipping entry without genesis copy");
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read the genesis copy and record of `name`.
    pub fn load(&self, name: &str) -> Result<StoredPool, RegistryError> {
        validate_name(name)?;
        if !self.exists(name) {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        let genesis_path = self.genesis_path(name);
        let genesis = fs::read_to_string(&genesis_path).map_err(RegistryError::io(&genesis_path))?;

        let record_path = self.record_path(name);
        let raw = fs::read_to_string(&record_path).map_err(RegistryError::io(&record_path))?;
        let record: PoolRecord = serde_json::from_str(&raw).map_err(|e| RegistryError::Record {
            path: record_path.clone(),
            reason: e.to_string(),
        })?;
        record.config.validate()?;
        Ok(StoredPool { genesis, record })
    }

    /// Remove the configuration of `name`.
    pub fn delete(&self, name: &str) -> Result<(), RegistryError> {
        validate_name(name)?;
        if !self.exists(name) {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        let dir = self.root.join(name);
        fs::remove_dir_all(&dir).map_err(RegistryError::io(&dir))?;
        info!(pool = %name, "Pool configuration deleted");
        Ok(())
    }
}

/// A name must be a single, ordinary path component.
fn validate_name(name: &str) -> Result<(), RegistryError> {
    let ordinary = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control);
    if ordinary {
        Ok(())
    } else {
        Err(RegistryError::InvalidName(name.to_string()))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RegistryError> {
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).map_err(RegistryError::io(&temp_path))?;
    file.write_all(bytes).map_err(RegistryError::io(&temp_path))?;
    file.sync_all().map_err(RegistryError::io(&temp_path))?;
    fs::rename(&temp_path, path).map_err(RegistryError::io(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{genesis_text, validator_txns};
    use lp_01_state_proof::testing::test_validators;
    use lp_01_state_proof::BlsGenerator;
    use std::time::Duration;
    use tempfile::TempDir;

    fn genesis_file(dir: &TempDir) -> PathBuf {
        let (_, verkeys) = test_validators(4, &BlsGenerator::default());
        let path = dir.path().join("pool_transactions_genesis");
        fs::write(&path, genesis_text(&validator_txns(&verkeys))).unwrap();
        path
    }

    #[test]
    fn test_create_persists_record_and_genesis_copy() {
        let dir = TempDir::new().unwrap();
        let source = genesis_file(&dir);
        let store = PoolStore::new(dir.path().join("pools"));
        let config = PoolConfig {
            reply_timeout: Duration::from_secs(9),
            ..PoolConfig::default()
        };

        store.create("sandbox", &source, config.clone()).unwrap();

        assert_eq!(
            fs::read_to_string(store.genesis_path("sandbox")).unwrap(),
            fs::read_to_string(&source).unwrap()
        );
        let stored = store.load("sandbox").unwrap();
        assert_eq!(stored.record.genesis_txn, source);
        assert_eq!(stored.record.config, config);
        assert!(!dir.path().join("pools/sandbox/config.tmp").exists());
    }

    #[test]
    fn test_create_rejects_duplicates_and_empty_genesis() {
        let dir = TempDir::new().unwrap();
        let source = genesis_file(&dir);
        let store = PoolStore::new(dir.path().join("pools"));
        store.create("sandbox", &source, PoolConfig::default()).unwrap();

        let err = store.create("sandbox", &source, PoolConfig::default()).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(name) if name == "sandbox"));

        let empty = dir.path().join("empty_genesis");
        fs::write(&empty, "\n\n").unwrap();
        let err = store.create("other", &empty, PoolConfig::default()).unwrap_err();
        assert!(matches!(err, RegistryError::EmptyGenesis(_)));
        assert!(!store.root().join("other").exists());

        let err = store.create("other", &dir.path().join("missing"), PoolConfig::default()).unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
    }

    #[test]
    fn test_invalid_names() {
        let dir = TempDir::new().unwrap();
        let source = genesis_file(&dir);
        let store = PoolStore::new(dir.path());
        for name in ["", ".", "..", "a/b", "a\\b"] {
            let err = store.create(name, &source, PoolConfig::default()).unwrap_err();
            assert!(matches!(err, RegistryError::InvalidName(_)), "{name:?}");
        }
    }

    #[test]
    fn test_list_and_delete() {
        let dir = TempDir::new().unwrap();
        let source = genesis_file(&dir);
        let store = PoolStore::new(dir.path().join("pools"));
        assert!(store.list().unwrap().is_empty());

        store.create("b-pool", &source, PoolConfig::default()).unwrap();
        store.create("a-pool", &source, PoolConfig::default()).unwrap();
        fs::create_dir_all(store.root().join("stray")).unwrap();
        assert_eq!(store.list().unwrap(), vec!["a-pool", "b-pool"]);

        store.delete("a-pool").unwrap();
        assert_eq!(store.list().unwrap(), vec!["b-pool"]);
        assert!(matches!(store.delete("a-pool"), Err(RegistryError::NotFound(_))));
        assert!(matches!(store.load("a-pool"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_corrupt_record() {
        let dir = TempDir::new().unwrap();
        let source = genesis_file(&dir);
        let store = PoolStore::new(dir.path());
        store.create("sandbox", &source, PoolConfig::default()).unwrap();
        fs::write(dir.path().join("sandbox/config.json"), "{not json").unwrap();
        assert!(matches!(store.load("sandbox"), Err(RegistryError::Record { .. })));
    }
}
