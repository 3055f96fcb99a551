//! Shared collection aliases.
//!
//! Every insertion-ordered table in the engine (property storage, symbol
//! properties, Map/Set entries) is an `IndexMap` keyed with `FxHasher`;
//! unordered lookups use the `rustc-hash` maps directly.

pub use rustc_hash::{FxHashMap, FxHashSet};

pub type IndexMap<K, V> =
    indexmap::IndexMap<K, V, core::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

/// Create an empty IndexMap
#[inline]
pub fn index_map_new<K, V>() -> IndexMap<K, V>
where
    K: core::hash::Hash + Eq,
{
    indexmap::IndexMap::with_hasher(Default::default())
}
