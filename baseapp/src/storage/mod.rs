pub mod cache;
pub mod engine;
pub mod memory;
pub mod multi;
pub mod object;

use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_derive::{Deserialize, Serialize};

/// A key/value pair yielded by iteration.
pub type KVPair = (Vec<u8>, Vec<u8>);

static NEXT_STORE_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// An opaque, process-unique handle identifying a logical sub-store.
///
/// Equality is identity: two keys created with the same name are distinct,
/// and only a clone of the original handle can address its store. Ordering
/// is by name so multi-store iteration and commit order are deterministic.
#[derive(Clone, Debug)]
pub struct StoreKey {
    id: u64,
    name: String,
}

impl StoreKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self { id: NEXT_STORE_KEY_ID.fetch_add(1, Ordering::Relaxed), name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for StoreKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StoreKey {}

impl std::hash::Hash for StoreKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for StoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StoreKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name).then(self.id.cmp(&other.id))
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The outcome of committing every mounted store at a given height.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitId {
    pub version: i64,

    #[serde(with = "serde_bytes")]
    pub hash: Vec<u8>,
}

impl CommitId {
    pub fn zero() -> Self {
        Self { version: 0, hash: Vec::new() }
    }

    pub fn is_zero(&self) -> bool {
        self.version == 0 && self.hash.is_empty()
    }
}

impl Default for CommitId {
    fn default() -> Self {
        Self::zero()
    }
}

/// Version retention policy applied by engines after each commit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Pruning {
    /// Keep a recent window of versions, enough for state sync.
    Syncable,

    /// Keep only the latest committed version.
    Everything,

    /// Keep every version.
    Nothing,
}

/// A read/write key-value view.
///
/// All methods take a mutable reference: reads memoize through cache layers,
/// and serialized access can't be avoided anyway since consensus drives the
/// state machine one call at a time.
pub trait Store: Send {
    /// Gets a value for a key, if it exists.
    fn get(&mut self, key: &[u8]) -> Option<Vec<u8>>;

    /// Sets a value for a key, replacing the existing value if any.
    fn set(&mut self, key: &[u8], value: Vec<u8>);

    /// Deletes a key, or does nothing if it does not exist.
    fn delete(&mut self, key: &[u8]);

    fn has(&mut self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Iterates over an ordered range of key/value pairs.
    ///
    /// The iterator owns a snapshot of the merged range taken at creation
    /// time; later writes through the store are not reflected in it.
    fn iterator(&mut self, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> StoreIter;

    fn reverse_iterator(&mut self, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> StoreIter {
        self.iterator(start, end).reversed()
    }
}

/// Shared store handle. Cache layers hold their parent through one of these;
/// parents outlive children by construction.
pub type SharedStore = Arc<Mutex<dyn Store>>;

/// An owning iterator over a materialized range snapshot.
pub struct StoreIter {
    inner: std::vec::IntoIter<KVPair>,
}

impl StoreIter {
    pub fn new(items: Vec<KVPair>) -> Self {
        Self { inner: items.into_iter() }
    }

    pub fn reversed(self) -> Self {
        let mut items: Vec<KVPair> = self.inner.collect();
        items.reverse();
        Self::new(items)
    }
}

impl Iterator for StoreIter {
    type Item = KVPair;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl DoubleEndedIterator for StoreIter {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

/// True when `key` falls inside the half-open bound pair.
pub(crate) fn in_range(key: &[u8], start: &Bound<Vec<u8>>, end: &Bound<Vec<u8>>) -> bool {
    let after_start = match start {
        Bound::Included(s) => key >= s.as_slice(),
        Bound::Excluded(s) => key > s.as_slice(),
        Bound::Unbounded => true,
    };
    let before_end = match end {
        Bound::Included(e) => key <= e.as_slice(),
        Bound::Excluded(e) => key < e.as_slice(),
        Bound::Unbounded => true,
    };
    after_start && before_end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_keys_with_equal_names_are_distinct() {
        let a = StoreKey::new("main");
        let b = StoreKey::new("main");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn store_keys_order_by_name() {
        let b = StoreKey::new("bbb");
        let a = StoreKey::new("aaa");
        assert!(a < b);
    }

    #[test]
    fn zero_commit_id() {
        let id = CommitId::zero();
        assert!(id.is_zero());
        assert_eq!(id, CommitId::default());
        assert!(!CommitId { version: 1, hash: vec![0xab] }.is_zero());
    }

    /// Generates common tests for any Store implementation.
    macro_rules! test_store {
        ($setup:expr) => {
            use std::ops::Bound;

            #[track_caller]
            fn assert_range(
                iter: crate::storage::StoreIter,
                expect: Vec<(&[u8], Vec<u8>)>,
            ) {
                ::std::assert_eq!(
                    iter.collect::<Vec<_>>(),
                    expect.into_iter().map(|(k, v)| (k.to_vec(), v)).collect::<Vec<_>>()
                );
            }

            /// Tests Store point operations, i.e. set, get, and delete.
            #[test]
            fn point_ops() {
                let mut s = $setup;

                ::std::assert_eq!(s.get(b"a"), None);
                assert!(!s.has(b"a"));

                s.set(b"a", vec![1]);
                ::std::assert_eq!(s.get(b"a"), Some(vec![1]));
                assert!(s.has(b"a"));

                s.set(b"b", vec![2]);
                ::std::assert_eq!(s.get(b"b"), Some(vec![2]));
                ::std::assert_eq!(s.get(b"a"), Some(vec![1]));

                s.set(b"a", vec![0]);
                ::std::assert_eq!(s.get(b"a"), Some(vec![0]));

                s.delete(b"a");
                ::std::assert_eq!(s.get(b"a"), None);
                ::std::assert_eq!(s.get(b"b"), Some(vec![2]));

                // Deletes are idempotent.
                s.delete(b"a");
                ::std::assert_eq!(s.get(b"a"), None);
            }

            /// Tests Store point operations on empty keys and values. These
            /// are as valid as any other key/value.
            #[test]
            fn point_ops_empty() {
                let mut s = $setup;
                ::std::assert_eq!(s.get(b""), None);
                s.set(b"", vec![]);
                ::std::assert_eq!(s.get(b""), Some(vec![]));
                s.delete(b"");
                ::std::assert_eq!(s.get(b""), None);
            }

            /// Tests various Store range scans.
            #[test]
            fn range_scans() {
                let mut s = $setup;
                s.set(b"a", vec![1]);
                s.set(b"b", vec![2]);
                s.set(b"ba", vec![2, 1]);
                s.set(b"bb", vec![2, 2]);
                s.set(b"c", vec![3]);

                assert_range(
                    s.iterator(Bound::Included(b"b".to_vec()), Bound::Excluded(b"bz".to_vec())),
                    vec![(b"b", vec![2]), (b"ba", vec![2, 1]), (b"bb", vec![2, 2])],
                );
                assert_range(
                    s.reverse_iterator(
                        Bound::Included(b"b".to_vec()),
                        Bound::Excluded(b"bz".to_vec()),
                    ),
                    vec![(b"bb", vec![2, 2]), (b"ba", vec![2, 1]), (b"b", vec![2])],
                );
                assert_range(
                    s.iterator(Bound::Included(b"b".to_vec()), Bound::Included(b"bb".to_vec())),
                    vec![(b"b", vec![2]), (b"ba", vec![2, 1]), (b"bb", vec![2, 2])],
                );
                assert_range(
                    s.iterator(Bound::Included(b"bb".to_vec()), Bound::Unbounded),
                    vec![(b"bb", vec![2, 2]), (b"c", vec![3])],
                );
                assert_range(
                    s.iterator(Bound::Unbounded, Bound::Unbounded),
                    vec![
                        (b"a", vec![1]),
                        (b"b", vec![2]),
                        (b"ba", vec![2, 1]),
                        (b"bb", vec![2, 2]),
                        (b"c", vec![3]),
                    ],
                );
            }
        };
    }

    pub(crate) use test_store; // export for use in submodules
}
