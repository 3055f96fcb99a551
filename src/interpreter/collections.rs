//! Map, Set, WeakMap and WeakSet
//!
//! Map and Set store `MapKey`s in an `IndexMap`, so iteration follows
//! insertion order and lookups use SameValueZero. The weak variants key by
//! object identity through a `WeakTable` and never keep the key alive.

use crate::error::JsError;
use crate::object::{ExoticObject, JsObject, JsObjectRef, WeakTable};
use crate::prelude::index_map_new;
use crate::value::{CheapClone, JsValue, MapKey};

use super::Interpreter;

/// `-0` is stored as `+0`
fn normalize_key(value: &JsValue) -> JsValue {
    match value {
        JsValue::Float(f) if *f == 0.0 => JsValue::Int(0),
        other => other.clone(),
    }
}

fn not_a(kind: &str, method: &str) -> JsError {
    JsError::type_error(format!(
        "Method {}.prototype.{} called on incompatible receiver",
        kind, method
    ))
}

fn weak_key<'a>(key: &'a JsValue, kind: &str) -> Result<&'a JsObjectRef, JsError> {
    key.as_object()
        .ok_or_else(|| JsError::type_error(format!("Invalid value used as {} key", kind)))
}

impl Interpreter {
    pub fn create_map(&mut self) -> JsObjectRef {
        let proto = self.map_prototype.cheap_clone();
        self.alloc(JsObject::new("Map", Some(proto), ExoticObject::Map(index_map_new())))
    }

    pub fn create_set(&mut self) -> JsObjectRef {
        let proto = self.set_prototype.cheap_clone();
        self.alloc(JsObject::new("Set", Some(proto), ExoticObject::Set(index_map_new())))
    }

    pub fn create_weak_map(&mut self) -> JsObjectRef {
        let proto = self.weakmap_prototype.cheap_clone();
        let obj = self.alloc(JsObject::new(
            "WeakMap",
            Some(proto),
            ExoticObject::WeakMap(WeakTable::new()),
        ));
        self.register_weak_collection(&obj);
        obj
    }

    pub fn create_weak_set(&mut self) -> JsObjectRef {
        let proto = self.weakset_prototype.cheap_clone();
        let obj = self.alloc(JsObject::new(
            "WeakSet",
            Some(proto),
            ExoticObject::WeakSet(WeakTable::new()),
        ));
        self.register_weak_collection(&obj);
        obj
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Map
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn map_get(&mut self, map: &JsObjectRef, key: &JsValue) -> Result<JsValue, JsError> {
        match &map.borrow().exotic {
            ExoticObject::Map(entries) => Ok(entries
                .get(&MapKey(key.clone()))
                .cloned()
                .unwrap_or_default()),
            _ => Err(not_a("Map", "get")),
        }
    }

    pub fn map_set(&mut self, map: &JsObjectRef, key: &JsValue, value: JsValue) -> Result<(), JsError> {
        self.check_realm(key)?;
        self.check_realm(&value)?;
        match &mut map.borrow_mut().exotic {
            ExoticObject::Map(entries) => {
                entries.insert(MapKey(normalize_key(key)), value);
                Ok(())
            }
            _ => Err(not_a("Map", "set")),
        }
    }

    pub fn map_has(&mut self, map: &JsObjectRef, key: &JsValue) -> Result<bool, JsError> {
        match &map.borrow().exotic {
            ExoticObject::Map(entries) => Ok(entries.contains_key(&MapKey(key.clone()))),
            ExoticObject::Set(entries) => Ok(entries.contains_key(&MapKey(key.clone()))),
            _ => Err(not_a("Map", "has")),
        }
    }

    /// Removes the entry and keeps the order of the rest
    pub fn map_delete(&mut self, map: &JsObjectRef, key: &JsValue) -> Result<bool, JsError> {
        match &mut map.borrow_mut().exotic {
            ExoticObject::Map(entries) => Ok(entries.shift_remove(&MapKey(key.clone())).is_some()),
            ExoticObject::Set(entries) => Ok(entries.shift_remove(&MapKey(key.clone())).is_some()),
            _ => Err(not_a("Map", "delete")),
        }
    }

    pub fn collection_clear(&mut self, collection: &JsObjectRef) -> Result<(), JsError> {
        match &mut collection.borrow_mut().exotic {
            ExoticObject::Map(entries) => entries.clear(),
            ExoticObject::Set(entries) => entries.clear(),
            _ => return Err(not_a("Map", "clear")),
        }
        Ok(())
    }

    pub fn collection_size(&self, collection: &JsObjectRef) -> Result<usize, JsError> {
        match &collection.borrow().exotic {
            ExoticObject::Map(entries) => Ok(entries.len()),
            ExoticObject::Set(entries) => Ok(entries.len()),
            _ => Err(not_a("Map", "size")),
        }
    }

    /// Snapshot of the entries in insertion order
    pub fn map_entries(&self, map: &JsObjectRef) -> Result<Vec<(JsValue, JsValue)>, JsError> {
        match &map.borrow().exotic {
            ExoticObject::Map(entries) => Ok(entries
                .iter()
                .map(|(k, v)| (k.0.clone(), v.clone()))
                .collect()),
            _ => Err(not_a("Map", "entries")),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Set
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn set_add(&mut self, set: &JsObjectRef, value: &JsValue) -> Result<(), JsError> {
        self.check_realm(value)?;
        match &mut set.borrow_mut().exotic {
            ExoticObject::Set(entries) => {
                entries.insert(MapKey(normalize_key(value)), ());
                Ok(())
            }
            _ => Err(not_a("Set", "add")),
        }
    }

    pub fn set_values(&self, set: &JsObjectRef) -> Result<Vec<JsValue>, JsError> {
        match &set.borrow().exotic {
            ExoticObject::Set(entries) => Ok(entries.keys().map(|k| k.0.clone()).collect()),
            _ => Err(not_a("Set", "values")),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // WeakMap / WeakSet
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn weak_map_get(&mut self, map: &JsObjectRef, key: &JsValue) -> Result<JsValue, JsError> {
        let Some(key) = key.as_object() else {
            return Ok(JsValue::Undefined);
        };
        match &map.borrow().exotic {
            ExoticObject::WeakMap(table) => Ok(table.get(key).cloned().unwrap_or_default()),
            _ => Err(not_a("WeakMap", "get")),
        }
    }

    pub fn weak_map_set(&mut self, map: &JsObjectRef, key: &JsValue, value: JsValue) -> Result<(), JsError> {
        let key = weak_key(key, "weak map")?;
        self.check_object_realm(key)?;
        self.check_realm(&value)?;
        key.watch_finalization(self.finalization_queue());
        match &mut map.borrow_mut().exotic {
            ExoticObject::WeakMap(table) => {
                table.insert(key, value);
                Ok(())
            }
            _ => Err(not_a("WeakMap", "set")),
        }
    }

    pub fn weak_set_add(&mut self, set: &JsObjectRef, value: &JsValue) -> Result<(), JsError> {
        let key = weak_key(value, "weak set")?;
        self.check_object_realm(key)?;
        key.watch_finalization(self.finalization_queue());
        match &mut set.borrow_mut().exotic {
            ExoticObject::WeakSet(table) => {
                table.insert(key, JsValue::Undefined);
                Ok(())
            }
            _ => Err(not_a("WeakSet", "add")),
        }
    }

    /// `has` for both weak kinds; non-object keys are never present
    pub fn weak_has(&mut self, collection: &JsObjectRef, key: &JsValue) -> Result<bool, JsError> {
        let Some(key) = key.as_object() else {
            return Ok(false);
        };
        match &collection.borrow().exotic {
            ExoticObject::WeakMap(table) | ExoticObject::WeakSet(table) => Ok(table.has(key)),
            _ => Err(not_a("WeakMap", "has")),
        }
    }

    pub fn weak_delete(&mut self, collection: &JsObjectRef, key: &JsValue) -> Result<bool, JsError> {
        let Some(key) = key.as_object() else {
            return Ok(false);
        };
        match &mut collection.borrow_mut().exotic {
            ExoticObject::WeakMap(table) | ExoticObject::WeakSet(table) => Ok(table.remove(key)),
            _ => Err(not_a("WeakMap", "delete")),
        }
    }

    /// Physical entry count of a weak collection, counting entries whose key
    /// died since the last sweep
    pub fn weak_raw_len(&self, collection: &JsObjectRef) -> Option<usize> {
        match &collection.borrow().exotic {
            ExoticObject::WeakMap(table) | ExoticObject::WeakSet(table) => Some(table.raw_len()),
            _ => None,
        }
    }

    /// Methods on the four collection prototypes
    pub(crate) fn init_collection_prototypes(&mut self) {
        let map_proto = self.map_prototype.cheap_clone();
        self.register_method(&map_proto, "get", 1, |interp, this, args| {
            let map = receiver(this, "Map", "get")?;
            interp.map_get(&map, &arg(args, 0))
        });
        self.register_method(&map_proto, "set", 2, |interp, this, args| {
            let map = receiver(this, "Map", "set")?;
            interp.map_set(&map, &arg(args, 0), arg(args, 1))?;
            Ok(this.clone())
        });
        self.register_method(&map_proto, "has", 1, |interp, this, args| {
            let map = receiver(this, "Map", "has")?;
            interp.map_has(&map, &arg(args, 0)).map(JsValue::Boolean)
        });
        self.register_method(&map_proto, "delete", 1, |interp, this, args| {
            let map = receiver(this, "Map", "delete")?;
            interp.map_delete(&map, &arg(args, 0)).map(JsValue::Boolean)
        });
        self.register_method(&map_proto, "clear", 0, |interp, this, _| {
            let map = receiver(this, "Map", "clear")?;
            interp.collection_clear(&map).map(|_| JsValue::Undefined)
        });
        let set_proto = self.set_prototype.cheap_clone();
        self.register_method(&set_proto, "add", 1, |interp, this, args| {
            let set = receiver(this, "Set", "add")?;
            interp.set_add(&set, &arg(args, 0))?;
            Ok(this.clone())
        });
        self.register_method(&set_proto, "has", 1, |interp, this, args| {
            let set = receiver(this, "Set", "has")?;
            interp.map_has(&set, &arg(args, 0)).map(JsValue::Boolean)
        });
        self.register_method(&set_proto, "delete", 1, |interp, this, args| {
            let set = receiver(this, "Set", "delete")?;
            interp.map_delete(&set, &arg(args, 0)).map(JsValue::Boolean)
        });
        self.register_method(&set_proto, "clear", 0, |interp, this, _| {
            let set = receiver(this, "Set", "clear")?;
            interp.collection_clear(&set).map(|_| JsValue::Undefined)
        });
        for proto in [map_proto, set_proto] {
            self.define_native_accessor(
                &proto,
                "size",
                Some(std::rc::Rc::new(|interp: &mut Interpreter, this: &JsValue, _: &[JsValue]| {
                    let collection = receiver(this, "Map", "size")?;
                    let size = interp.collection_size(&collection)?;
                    Ok(JsValue::from(u32::try_from(size).unwrap_or(u32::MAX)))
                })),
                None,
            );
        }

        let weakmap_proto = self.weakmap_prototype.cheap_clone();
        self.register_method(&weakmap_proto, "get", 1, |interp, this, args| {
            let map = receiver(this, "WeakMap", "get")?;
            interp.weak_map_get(&map, &arg(args, 0))
        });
        self.register_method(&weakmap_proto, "set", 2, |interp, this, args| {
            let map = receiver(this, "WeakMap", "set")?;
            interp.weak_map_set(&map, &arg(args, 0), arg(args, 1))?;
            Ok(this.clone())
        });
        let weakset_proto = self.weakset_prototype.cheap_clone();
        self.register_method(&weakset_proto, "add", 1, |interp, this, args| {
            let set = receiver(this, "WeakSet", "add")?;
            interp.weak_set_add(&set, &arg(args, 0))?;
            Ok(this.clone())
        });
        for proto in [weakmap_proto, weakset_proto] {
            self.register_method(&proto, "has", 1, |interp, this, args| {
                let collection = receiver(this, "WeakMap", "has")?;
                interp.weak_has(&collection, &arg(args, 0)).map(JsValue::Boolean)
            });
            self.register_method(&proto, "delete", 1, |interp, this, args| {
                let collection = receiver(this, "WeakMap", "delete")?;
                interp.weak_delete(&collection, &arg(args, 0)).map(JsValue::Boolean)
            });
        }
    }
}

fn receiver(this: &JsValue, kind: &str, method: &str) -> Result<JsObjectRef, JsError> {
    this.as_object().cloned().ok_or_else(|| not_a(kind, method))
}

fn arg(args: &[JsValue], index: usize) -> JsValue {
    args.get(index).cloned().unwrap_or_default()
}
