use parking_lot::Mutex;
use std::collections::VecDeque;

/// A work list guarded by a single lock.
///
/// Every operation holds the lock for its whole duration. Pops on an empty list
/// return `None` immediately; callers decide whether to retry or move on.
#[derive(Debug)]
pub struct MutexList<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> Default for MutexList<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> MutexList<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&self, item: T) {
        self.items.lock().push_back(item);
    }

    /// Push `item` unless an element matching `exists` is already present.
    ///
    /// The check and the push happen under the same lock. Returns `true` if the
    /// item was pushed.
    pub fn push_unless<F>(&self, exists: F, item: T) -> bool
    where
        F: Fn(&T) -> bool,
    {
        let mut items = self.items.lock();
        if items.iter().any(exists) {
            return false;
        }
        items.push_back(item);
        true
    }

    /// Take the oldest element (FIFO consumption).
    pub fn pop_front(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Take the newest element (LIFO consumption).
    pub fn pop_back(&self) -> Option<T> {
        self.items.lock().pop_back()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn any<F>(&self, pred: F) -> bool
    where
        F: Fn(&T) -> bool,
    {
        self.items.lock().iter().any(pred)
    }

    /// Drain every element in FIFO order.
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }
}

impl<T> FromIterator<T> for MutexList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: Mutex::new(iter.into_iter().collect()),
        }
    }
}
