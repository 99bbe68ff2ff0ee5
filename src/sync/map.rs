use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::ops::AddAssign;

/// A hash map guarded by a single lock.
///
/// Used for the source-path reference count (`add`, `erase_if`, `has`) and for
/// one-shot id reservations (`insert_if_absent`).
#[derive(Debug)]
pub struct MutexMap<K, V> {
    map: Mutex<HashMap<K, V>>,
}

impl<K, V> Default for MutexMap<K, V> {
    fn default() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, V> MutexMap<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `delta` for a new key or accumulate it into the existing value.
    /// Returns the value after the update.
    pub fn add(&self, key: K, delta: V) -> V
    where
        V: AddAssign + Copy,
    {
        let mut map = self.map.lock();
        match map.get_mut(&key) {
            Some(slot) => {
                *slot += delta;
                *slot
            }
            None => {
                map.insert(key, delta);
                delta
            }
        }
    }

    /// Insert `value` only when `key` is absent. Returns `true` if inserted.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let mut map = self.map.lock();
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, value);
        true
    }

    pub fn has(&self, key: &K) -> bool {
        self.map.lock().contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.map.lock().get(key).cloned()
    }

    /// Remove every entry matching `pred`. Returns the number of removed entries.
    pub fn erase_if<F>(&self, pred: F) -> usize
    where
        F: Fn(&K, &V) -> bool,
    {
        let mut map = self.map.lock();
        let before = map.len();
        map.retain(|k, v| !pred(k, v));
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}
