//! Bounded per-file result cache keyed by normalized path and stamp.
//!
//! A hit requires the stored stamp to match the file's current one, so an
//! edited file is re-parsed even without an explicit invalidation. When full,
//! the oldest insertion is evicted.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::index::FileStamp;

pub struct StampedCache<V> {
    capacity: usize,
    inner: Mutex<Inner<V>>,
}

struct Inner<V> {
    entries: HashMap<String, (FileStamp, Arc<V>)>,
    order: VecDeque<String>,
}

impl<V> StampedCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str, stamp: FileStamp) -> Option<Arc<V>> {
        let inner = self.lock();
        match inner.entries.get(key) {
            Some((stored, value)) if *stored == stamp => Some(Arc::clone(value)),
            _ => None,
        }
    }

    pub fn insert(&self, key: String, stamp: FileStamp, value: Arc<V>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.lock();
        if inner.entries.insert(key.clone(), (stamp, value)).is_none() {
            inner.order.push_back(key);
        }
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.lock();
        let removed = inner.entries.remove(key).is_some();
        if removed {
            inner.order.retain(|k| k != key);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}
