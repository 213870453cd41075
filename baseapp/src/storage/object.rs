use std::collections::HashMap;

/// A write-through memoizing map from symbolic identifiers to immutable
/// domain values.
///
/// Lookups fall through to the parent on a miss and cache the result; puts
/// overwrite unconditionally. Values are expected to be immutable once
/// published under an identifier: in debug builds a put that would replace a
/// distinct pre-existing value trips an assertion, catching aliasing bugs
/// where two call sites disagree about what an identifier names.
pub struct ObjectCache<V: Clone + PartialEq> {
    parent: Box<dyn Fn(&str) -> Option<V> + Send>,
    cache: HashMap<String, V>,
}

impl<V: Clone + PartialEq> ObjectCache<V> {
    pub fn new(parent: Box<dyn Fn(&str) -> Option<V> + Send>) -> Self {
        Self { parent, cache: HashMap::new() }
    }

    /// A cache with no parent; lookups only see prior puts.
    pub fn detached() -> Self {
        Self::new(Box::new(|_| None))
    }

    pub fn get(&mut self, id: &str) -> Option<V> {
        if let Some(hit) = self.cache.get(id) {
            return Some(hit.clone());
        }
        let value = (self.parent)(id)?;
        self.cache.insert(id.to_string(), value.clone());
        Some(value)
    }

    pub fn put(&mut self, id: impl Into<String>, value: V) {
        let id = id.into();
        debug_assert!(
            self.cache.get(&id).map_or(true, |old| *old == value),
            "object cache aliasing: distinct value replaced under id {:?}",
            id
        );
        self.cache.insert(id, value);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
