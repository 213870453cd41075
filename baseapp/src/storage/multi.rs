use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};

use sha2::{Digest, Sha256};

use crate::codec;
use crate::error::{CResult, Error};
use crate::storage::cache::CacheStore;
use crate::storage::engine::CommitEngine;
use crate::storage::memory::MemDb;
use crate::storage::{CommitId, Pruning, SharedStore, Store, StoreIter, StoreKey};

/// Metadata key the latest multi-store commit record is persisted under.
const LATEST_COMMIT_KEY: &[u8] = b"s/latest";

type SharedEngine = Arc<Mutex<dyn CommitEngine>>;

/// Store view over a mounted engine at its current working version.
///
/// Engine failures below this adapter are fatal: a backing store that cannot
/// read or write leaves the state machine unrecoverable.
pub struct EngineStore {
    engine: SharedEngine,
}

impl EngineStore {
    fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }

    /// Wraps a concrete engine in a shared handle.
    pub fn over(engine: impl CommitEngine + 'static) -> Self {
        Self::new(Arc::new(Mutex::new(engine)))
    }

    fn lock(&self) -> MutexGuard<'_, dyn CommitEngine + 'static> {
        self.engine.lock().expect("backing engine mutex poisoned")
    }
}

impl Store for EngineStore {
    fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.lock().get(key).expect("backing engine read failed")
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.lock().set(key, value).expect("backing engine write failed")
    }

    fn delete(&mut self, key: &[u8]) {
        self.lock().delete(key).expect("backing engine delete failed")
    }

    fn iterator(&mut self, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> StoreIter {
        StoreIter::new(self.lock().iterate(start, end).expect("backing engine scan failed"))
    }
}

/// Owns the mounted stores and coordinates versioned commits across them.
///
/// Stores are mounted before the first load; afterwards the set is fixed.
/// Every commit advances all children to the same version and combines
/// their hashes, in mounted-key-sorted order, into the multi-store commit
/// id, which is persisted under a dedicated metadata key.
pub struct CommitMultiStore {
    db: MemDb,
    pruning: Pruning,
    engines: BTreeMap<StoreKey, SharedEngine>,
    last_commit: CommitId,
    loaded: bool,
}

impl CommitMultiStore {
    pub fn new(db: MemDb) -> Self {
        Self {
            db,
            pruning: Pruning::Nothing,
            engines: BTreeMap::new(),
            last_commit: CommitId::zero(),
            loaded: false,
        }
    }

    pub fn set_pruning(&mut self, pruning: Pruning) {
        self.pruning = pruning;
    }

    /// Registers a backing engine under `key`. Mounting twice under one key,
    /// reusing a mounted name, or mounting after a load is a fatal
    /// misconfiguration.
    pub fn mount(&mut self, key: &StoreKey, engine: impl CommitEngine + 'static) {
        if self.loaded {
            panic!("cannot mount store {} after loading", key);
        }
        if self.engines.keys().any(|k| k == key || k.name() == key.name()) {
            panic!("store {} already mounted", key);
        }
        self.engines.insert(key.clone(), Arc::new(Mutex::new(engine)));
    }

    pub fn last_commit_id(&self) -> CommitId {
        self.last_commit.clone()
    }

    pub fn latest_version(&self) -> i64 {
        self.last_commit.version
    }

    /// Loads every mounted engine at its highest commit. The engines must
    /// agree on that version; a torn store set is unrecoverable.
    pub fn load_latest_version(&mut self) -> CResult<()> {
        let latest = self
            .engines
            .values()
            .map(|e| self.lock_engine(e).last_commit_id().version)
            .max()
            .unwrap_or(0);

        for (key, engine) in &self.engines {
            let version = self.lock_engine(engine).last_commit_id().version;
            if version != latest {
                return Err(Error::internal(format!(
                    "store {} is at version {}, expected {}",
                    key, version, latest
                )));
            }
        }

        self.load_at(latest)?;

        // Cross-check the persisted commit record when there is one.
        if let Some(bytes) = self.db.get_meta(LATEST_COMMIT_KEY) {
            let recorded: CommitId = codec::decode(&bytes)?;
            if recorded != self.last_commit {
                return Err(Error::internal(format!(
                    "commit record {:?} does not match stores at {:?}",
                    recorded, self.last_commit
                )));
            }
        }

        log::info!("loaded multi-store at version {}", self.last_commit.version);
        Ok(())
    }

    /// Loads every mounted engine at `version`.
    pub fn load_version(&mut self, version: i64) -> CResult<()> {
        self.load_at(version)?;
        log::info!("loaded multi-store at version {}", version);
        Ok(())
    }

    fn load_at(&mut self, version: i64) -> CResult<()> {
        for engine in self.engines.values() {
            self.lock_engine(engine).load_version(version)?;
        }
        self.last_commit = self.derive_commit_id(version);
        self.loaded = true;
        Ok(())
    }

    /// Commits every mounted engine at the next version and records the
    /// combined id. A child commit failure aborts the process: a partial
    /// commit cannot be rolled back.
    pub fn commit(&mut self) -> CommitId {
        let version = self.last_commit.version + 1;
        let mut pairs = Vec::with_capacity(self.engines.len());

        for (key, engine) in &self.engines {
            let mut guard = self.lock_engine(engine);
            match guard.commit(version) {
                Ok(hash) => pairs.push((key.name().to_string(), hash)),
                Err(err) => {
                    log::error!("commit of store {} at version {} failed: {}", key, version, err);
                    panic!("commit of store {} at version {} failed: {}", key, version, err);
                }
            }
            if let Err(err) = guard.prune(self.pruning) {
                log::warn!("pruning store {} failed: {}", key, err);
            }
        }

        self.last_commit = CommitId { version, hash: combine_hashes(version, &pairs) };

        let record =
            codec::encode(&self.last_commit).expect("commit record encoding cannot fail");
        self.db.set_meta(LATEST_COMMIT_KEY, record);

        log::debug!("committed multi-store version {}", version);
        self.last_commit.clone()
    }

    /// Current-version view of one mounted store.
    pub fn store(&self, key: &StoreKey) -> SharedStore {
        let engine = self.engines.get(key).unwrap_or_else(|| {
            panic!("store {} is not mounted", key);
        });
        Arc::new(Mutex::new(EngineStore::new(engine.clone())))
    }

    /// A fresh cache multi-store layered over the committed view.
    pub fn cache_multi_store(&self) -> CacheMultiStore {
        let stores = self
            .engines
            .keys()
            .map(|key| {
                (key.clone(), Arc::new(Mutex::new(CacheStore::new(self.store(key)))))
            })
            .collect();
        CacheMultiStore { stores }
    }

    /// Committed-only read used by query dispatch. `height` zero means the
    /// latest committed version.
    pub fn query_store(&self, name: &str, key: &[u8], height: i64) -> CResult<Option<Vec<u8>>> {
        let engine = self
            .engines
            .iter()
            .find(|(k, _)| k.name() == name)
            .map(|(_, e)| e)
            .ok_or_else(|| Error::unknown_request(format!("no store named {}", name)))?;

        let mut guard = self.lock_engine(engine);
        if height == 0 || height == self.last_commit.version {
            guard.get(key)
        } else {
            guard.get_at_version(key, height)
        }
    }

    fn derive_commit_id(&self, version: i64) -> CommitId {
        if version == 0 {
            return CommitId::zero();
        }
        let pairs: Vec<(String, Vec<u8>)> = self
            .engines
            .iter()
            .map(|(key, engine)| {
                (key.name().to_string(), self.lock_engine(engine).last_commit_id().hash)
            })
            .collect();
        CommitId { version, hash: combine_hashes(version, &pairs) }
    }

    fn lock_engine<'a>(&self, engine: &'a SharedEngine) -> MutexGuard<'a, dyn CommitEngine + 'static> {
        engine.lock().expect("backing engine mutex poisoned")
    }
}

/// Combined multi-store hash: per-store hashes folded in mounted-key-sorted
/// order, which `pairs` already follows.
fn combine_hashes(version: i64, pairs: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(version.to_be_bytes());
    for (name, hash) in pairs {
        hasher.update((name.len() as u64).to_be_bytes());
        hasher.update(name.as_bytes());
        hasher.update(hash);
    }
    hasher.finalize().to_vec()
}

/// One cache store per mounted key, each layered over the corresponding
/// parent. Clones share the children, so an execution state and the
/// contexts derived from it observe the same buffered writes.
#[derive(Clone)]
pub struct CacheMultiStore {
    stores: BTreeMap<StoreKey, Arc<Mutex<CacheStore>>>,
}

impl CacheMultiStore {
    pub fn store(&self, key: &StoreKey) -> SharedStore {
        let store = self.stores.get(key).unwrap_or_else(|| {
            panic!("store {} is not mounted", key);
        });
        let shared: SharedStore = store.clone();
        shared
    }

    /// Flushes every child into its parent.
    pub fn write(&self) {
        for store in self.stores.values() {
            store.lock().expect("cache store mutex poisoned").write();
        }
    }

    /// Derives the next cache layer, one child per key over this one.
    pub fn cache_wrap(&self) -> CacheMultiStore {
        let stores = self
            .stores
            .iter()
            .map(|(key, _)| {
                (key.clone(), Arc::new(Mutex::new(CacheStore::new(self.store(key)))))
            })
            .collect();
        CacheMultiStore { stores }
    }
}
