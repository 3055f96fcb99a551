//! Ordered own-property storage
//!
//! String and index keys share one insertion-ordered table. Enumeration
//! order puts index keys first in ascending numeric order; rather than
//! keeping the table sorted on every insert, `fix_order` moves index keys
//! that arrived since the last enumeration into place. Everything below
//! `sorted_len` is already ordered and the first `index_count` entries are
//! exactly the sorted index keys.

use crate::prelude::{IndexMap, index_map_new};
use crate::value::{JsSymbol, PropertyKey};

use super::Property;

#[derive(Default)]
pub struct PropertyMap {
    named: IndexMap<PropertyKey, Property>,
    symbols: IndexMap<JsSymbol, Property>,
    sorted_len: usize,
    index_count: usize,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self {
            named: index_map_new(),
            symbols: index_map_new(),
            sorted_len: 0,
            index_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.named.len() + self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, key: &PropertyKey) -> Option<&Property> {
        match key {
            PropertyKey::Symbol(sym) => self.symbols.get(sym),
            _ => self.named.get(key),
        }
    }

    #[inline]
    pub fn get_mut(&mut self, key: &PropertyKey) -> Option<&mut Property> {
        match key {
            PropertyKey::Symbol(sym) => self.symbols.get_mut(sym),
            _ => self.named.get_mut(key),
        }
    }

    pub fn contains_key(&self, key: &PropertyKey) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace. A replaced key keeps its position.
    pub fn insert(&mut self, key: PropertyKey, property: Property) {
        match key {
            PropertyKey::Symbol(sym) => {
                self.symbols.insert(sym, property);
            }
            key => {
                self.named.insert(key, property);
            }
        }
    }

    pub fn remove(&mut self, key: &PropertyKey) -> Option<Property> {
        match key {
            PropertyKey::Symbol(sym) => self.symbols.shift_remove(sym),
            _ => {
                let (position, _, property) = self.named.shift_remove_full(key)?;
                if position < self.sorted_len {
                    self.sorted_len -= 1;
                    if position < self.index_count {
                        self.index_count -= 1;
                    }
                }
                Some(property)
            }
        }
    }

    fn sorted_index_at(&self, position: usize) -> u32 {
        self.named
            .get_index(position)
            .and_then(|(k, _)| k.as_index())
            .unwrap_or(u32::MAX)
    }

    /// Move index keys inserted since the last call into ascending order
    /// ahead of the string keys
    pub fn fix_order(&mut self) {
        let len = self.named.len();
        for i in self.sorted_len..len {
            let Some(idx) = self.named.get_index(i).and_then(|(k, _)| k.as_index()) else {
                continue;
            };
            // first position in the sorted index prefix holding a key >= idx
            let (mut lo, mut hi) = (0, self.index_count);
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                if self.sorted_index_at(mid) < idx {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            if lo < i {
                self.named.move_index(i, lo);
            }
            self.index_count += 1;
        }
        self.sorted_len = len;
    }

    /// String and index keys in enumeration order, then symbols
    pub fn keys(&mut self) -> Vec<PropertyKey> {
        self.fix_order();
        let mut keys: Vec<PropertyKey> = Vec::with_capacity(self.len());
        keys.extend(self.named.keys().cloned());
        keys.extend(self.symbols.keys().cloned().map(PropertyKey::Symbol));
        keys
    }

    /// Sorted index keys, leaving the table ordered
    pub fn index_keys(&mut self) -> Vec<u32> {
        self.fix_order();
        self.named
            .keys()
            .take(self.index_count)
            .filter_map(PropertyKey::as_index)
            .collect()
    }

    /// Entries in enumeration order
    pub fn entries(&mut self) -> impl Iterator<Item = (&PropertyKey, &Property)> {
        self.fix_order();
        self.named.iter()
    }

    pub fn symbol_entries(&self) -> impl Iterator<Item = (&JsSymbol, &Property)> {
        self.symbols.iter()
    }

    /// Every property, in no particular order
    pub fn values(&self) -> impl Iterator<Item = &Property> {
        self.named.values().chain(self.symbols.values())
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Property> {
        self.named.values_mut().chain(self.symbols.values_mut())
    }

    pub fn clear(&mut self) {
        self.named.clear();
        self.symbols.clear();
        self.sorted_len = 0;
        self.index_count = 0;
    }
}
