//! Weak-keyed tables backing WeakMap and WeakSet
//!
//! Entries hold a `Weak` handle to the key, never a strong one. A key that
//! has been dropped is never reported as present, even before the sweep
//! that physically removes its entry.

use std::cell::RefCell;
use std::rc::Rc;

use crate::interpreter::cycles::{Trace, Tracer};
use crate::prelude::{FxHashMap, FxHashSet};
use crate::value::JsValue;

use super::{JsObjectRef, WeakObjectRef};

/// Ids of dropped objects that were used as weak keys, waiting for the
/// next checkpoint
#[derive(Clone, Default)]
pub struct FinalizationQueue(Rc<RefCell<Vec<u64>>>);

impl FinalizationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, id: u64) {
        // The queue may be mid-drain when a drop cascades from a sweep.
        if let Ok(mut ids) = self.0.try_borrow_mut() {
            ids.push(id);
        }
    }

    pub fn drain(&self) -> FxHashSet<u64> {
        match self.0.try_borrow_mut() {
            Ok(mut ids) => ids.drain(..).collect(),
            Err(_) => FxHashSet::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct WeakEntry {
    key: WeakObjectRef,
    value: JsValue,
}

/// Identity-keyed table with weak keys
#[derive(Default)]
pub struct WeakTable {
    entries: FxHashMap<u64, WeakEntry>,
}

impl WeakTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_entry(&self, key: &JsObjectRef) -> Option<&WeakEntry> {
        self.entries.get(&key.id()).filter(|e| e.key.is_alive())
    }

    pub fn get(&self, key: &JsObjectRef) -> Option<&JsValue> {
        self.live_entry(key).map(|e| &e.value)
    }

    pub fn has(&self, key: &JsObjectRef) -> bool {
        self.live_entry(key).is_some()
    }

    pub fn insert(&mut self, key: &JsObjectRef, value: JsValue) {
        self.entries.insert(
            key.id(),
            WeakEntry {
                key: key.downgrade(),
                value,
            },
        );
    }

    pub fn remove(&mut self, key: &JsObjectRef) -> bool {
        self.entries.remove(&key.id()).is_some()
    }

    /// Physical entry count, including entries whose key died since the
    /// last sweep
    pub fn raw_len(&self) -> usize {
        self.entries.len()
    }

    /// Drop entries for the given finalized ids and for any key that is no
    /// longer alive. Returns the number of removed entries.
    pub fn sweep(&mut self, finalized: &FxHashSet<u64>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|id, entry| !finalized.contains(id) && entry.key.is_alive());
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Trace for WeakTable {
    fn trace(&self, tracer: &mut Tracer) {
        for entry in self.entries.values() {
            if entry.key.is_alive() {
                tracer.ephemeron(&entry.key, &entry.value);
            } else {
                tracer.value(&entry.value);
            }
        }
    }
}
