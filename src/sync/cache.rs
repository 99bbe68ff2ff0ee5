use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Per-key construction slot. Empty until the first successful construction.
type Slot<V> = Arc<Mutex<Option<Arc<V>>>>;

/// A memoizing cache that constructs at most one shared value per key.
///
/// The map lock only guards slot bookkeeping: a caller inserts (or finds) the
/// key's slot, releases the map lock, then constructs under the slot's own lock.
/// Slow construction of key A therefore never stalls callers asking for key B,
/// while concurrent callers asking for A wait for the single construction.
///
/// A failed construction leaves the slot empty; the next caller retries.
pub struct KeyedCache<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> Default for KeyedCache<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> fmt::Debug for KeyedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedCache")
            .field("keys", &self.slots.lock().len())
            .finish()
    }
}

impl<K: Eq + Hash + Clone, V> KeyedCache<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shared value for `key`, constructing it with `create` on first use.
    ///
    /// With `using_cache == false` the cache is bypassed and every call returns a
    /// fresh, unshared value.
    ///
    /// # Errors
    /// Propagates the error returned by `create`.
    pub fn get_or_try_create<F>(&self, key: &K, using_cache: bool, create: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        if !using_cache {
            return Ok(Arc::new(create()?));
        }

        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let mut value = slot.lock();
        if let Some(existing) = value.as_ref() {
            return Ok(Arc::clone(existing));
        }
        let created = Arc::new(create()?);
        *value = Some(Arc::clone(&created));
        Ok(created)
    }

    /// The value for `key` if it has already been constructed.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let slot = self.slots.lock().get(key).cloned()?;
        let value = slot.lock();
        (*value).clone()
    }

    /// Number of keys holding a constructed value.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot<V>> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
