use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};

use crate::error::{CResult, Error};
use crate::storage::engine::CommitEngine;
use crate::storage::object::ObjectCache;
use crate::storage::{CommitId, KVPair, Pruning};

/// Backing state of one in-memory engine: the working contents plus a
/// snapshot and hash per committed version.
#[derive(Default)]
pub(crate) struct MemoryState {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    versions: BTreeMap<i64, BTreeMap<Vec<u8>, Vec<u8>>>,
    hashes: BTreeMap<i64, Vec<u8>>,
    last: CommitId,
}

/// A versioned in-memory storage engine.
///
/// The working contents live in a BTreeMap; each commit snapshots them under
/// the committed version together with a content hash. Nothing is persisted
/// to disk, but states opened through a [`MemDb`] are shared by name, so a
/// dropped application can be re-instantiated over the same data.
pub struct Memory {
    name: String,
    state: Arc<Mutex<MemoryState>>,
}

impl Memory {
    /// Creates a standalone engine not attached to any database.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), state: Arc::new(Mutex::new(MemoryState::default())) }
    }

    /// Opens the named engine inside `db`, creating it on first open.
    pub fn open(db: &MemDb, name: impl Into<String>) -> Self {
        let name = name.into();
        Self { state: db.state(&name), name }
    }

    fn hash_contents(name: &str, version: i64, data: &BTreeMap<Vec<u8>, Vec<u8>>) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update(version.to_be_bytes());
        for (key, value) in data {
            hasher.update((key.len() as u64).to_be_bytes());
            hasher.update(key);
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value);
        }
        hasher.finalize().to_vec()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory engine mutex poisoned")
    }
}

impl std::fmt::Display for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "memory:{}", self.name)
    }
}

impl CommitEngine for Memory {
    fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        Ok(self.lock().data.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()> {
        self.lock().data.insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> CResult<()> {
        self.lock().data.remove(key);
        Ok(())
    }

    fn iterate(&mut self, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> CResult<Vec<KVPair>> {
        let state = self.lock();
        Ok(state.data.range((start, end)).map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn get_at_version(&mut self, key: &[u8], version: i64) -> CResult<Option<Vec<u8>>> {
        let state = self.lock();
        match state.versions.get(&version) {
            Some(snapshot) => Ok(snapshot.get(key).cloned()),
            None => Err(Error::InvalidVersion(format!(
                "store {} has no version {}",
                self.name, version
            ))),
        }
    }

    fn commit(&mut self, version: i64) -> CResult<Vec<u8>> {
        let mut state = self.lock();
        if version != state.last.version + 1 {
            return Err(Error::internal(format!(
                "store {}: commit version {} does not follow {}",
                self.name, version, state.last.version
            )));
        }

        let hash = Self::hash_contents(&self.name, version, &state.data);
        let snapshot = state.data.clone();
        state.versions.insert(version, snapshot);
        state.hashes.insert(version, hash.clone());
        state.last = CommitId { version, hash: hash.clone() };
        Ok(hash)
    }

    fn load_version(&mut self, version: i64) -> CResult<()> {
        let mut state = self.lock();
        if version < 0 {
            return Err(Error::InvalidVersion(format!(
                "store {}: negative version {}",
                self.name, version
            )));
        }
        if version == 0 {
            if !state.versions.is_empty() {
                return Err(Error::InvalidVersion(format!(
                    "store {}: version 0 on a non-empty store",
                    self.name
                )));
            }
            state.data.clear();
            state.last = CommitId::zero();
            return Ok(());
        }

        let snapshot = state
            .versions
            .get(&version)
            .cloned()
            .ok_or_else(|| {
                Error::InvalidVersion(format!("store {} has no version {}", self.name, version))
            })?;
        let hash = state.hashes.get(&version).cloned().unwrap_or_default();
        state.data = snapshot;
        state.last = CommitId { version, hash };
        Ok(())
    }

    fn last_commit_id(&self) -> CommitId {
        self.lock().last.clone()
    }

    fn prune(&mut self, policy: Pruning) -> CResult<()> {
        let mut state = self.lock();
        let keep_from = match policy {
            Pruning::Nothing => return Ok(()),
            Pruning::Everything => state.last.version,
            // A window of recent versions, enough for a syncing peer.
            Pruning::Syncable => state.last.version - 100,
        };
        state.versions.retain(|v, _| *v >= keep_from);
        state.hashes.retain(|v, _| *v >= keep_from);
        Ok(())
    }
}

/// Engine handle published in a [`MemDb`]. Identity equality: the database
/// must hand out the same backing state for a name, forever.
#[derive(Clone)]
struct EngineSlot(Arc<Mutex<MemoryState>>);

impl PartialEq for EngineSlot {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A process-wide database of named in-memory engine states.
///
/// Cloning a `MemDb` clones the handle, not the data: every engine opened
/// under the same name on any clone observes the same state. Names are
/// resolved through an [`ObjectCache`] whose parent constructs a fresh state
/// on first lookup; the memoization guarantees the handle is stable.
#[derive(Clone)]
pub struct MemDb {
    engines: Arc<Mutex<ObjectCache<EngineSlot>>>,
    meta: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemDb {
    pub fn new() -> Self {
        let cache = ObjectCache::new(Box::new(|_name| {
            Some(EngineSlot(Arc::new(Mutex::new(MemoryState::default()))))
        }));
        Self { engines: Arc::new(Mutex::new(cache)), meta: Arc::new(Mutex::new(BTreeMap::new())) }
    }

    fn state(&self, name: &str) -> Arc<Mutex<MemoryState>> {
        let slot = self
            .engines
            .lock()
            .expect("engine cache mutex poisoned")
            .get(name)
            .expect("engine cache parent always constructs");
        slot.0
    }

    /// Unversioned metadata slots, e.g. the multi-store commit record.
    pub fn get_meta(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.meta.lock().expect("meta mutex poisoned").get(key).cloned()
    }

    pub fn set_meta(&self, key: &[u8], value: Vec<u8>) {
        self.meta.lock().expect("meta mutex poisoned").insert(key.to_vec(), value);
    }
}

impl Default for MemDb {
    fn default() -> Self {
        Self::new()
    }
}
