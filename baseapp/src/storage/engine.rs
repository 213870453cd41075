use std::ops::Bound;

use crate::error::CResult;
use crate::storage::{CommitId, KVPair, Pruning};

/// The contract required of a backing engine mounted into the commit
/// multi-store: a key/value store with versioned snapshots and atomic
/// per-version commits. Keys and values are arbitrary byte strings stored in
/// lexicographical key order.
///
/// Only supports single-threaded use since all methods (including reads)
/// take a mutable reference -- the multi-store serializes access anyway,
/// since consensus drives the state machine one lifecycle call at a time.
pub trait CommitEngine: std::fmt::Display + Send {
    /// Gets a value for a key at the current working version, if it exists.
    fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>>;

    /// Sets a value for a key, replacing the existing value if any.
    fn set(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()>;

    /// Deletes a key, or does nothing if it does not exist.
    fn delete(&mut self, key: &[u8]) -> CResult<()>;

    fn has(&mut self, key: &[u8]) -> CResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Iterates over an ordered range of key/value pairs at the current
    /// working version. Materialized for object safety; committed state is
    /// immutable so the snapshot stays coherent.
    fn iterate(&mut self, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> CResult<Vec<KVPair>>;

    /// Gets a value for a key as of an already-committed version.
    fn get_at_version(&mut self, key: &[u8], version: i64) -> CResult<Option<Vec<u8>>>;

    /// Commits the working contents as `version`, returning the store hash.
    /// `version` must be exactly one past the last committed version.
    fn commit(&mut self, version: i64) -> CResult<Vec<u8>>;

    /// Resets the working contents to an already-committed version. Version
    /// zero is only valid on an empty store and denotes the empty state.
    fn load_version(&mut self, version: i64) -> CResult<()>;

    /// The `(version, hash)` of the highest commit, or the zero id.
    fn last_commit_id(&self) -> CommitId;

    /// Applies a retention policy to committed versions.
    fn prune(&mut self, policy: Pruning) -> CResult<()>;
}
