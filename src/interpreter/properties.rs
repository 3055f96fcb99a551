//! Object model operations
//!
//! The algorithms that walk prototype chains, run accessors and consult
//! proxy traps. Ordinary objects share one implementation; arrays, string
//! wrappers and proxies override only the hooks that differ.

use std::collections::VecDeque;

use crate::error::JsError;
use crate::number::to_uint32;
use crate::object::{
    ExoticObject, JsFunction, JsObject, JsObjectRef, Property, PropertyDescriptor, validate_and_apply,
};
use crate::prelude::FxHashSet;
use crate::string::JsString;
use crate::value::{CheapClone, JsValue, PropertyKey, WellKnownSymbol};

use super::Interpreter;

/// Target of `set_integrity_level` / `test_integrity_level`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityLevel {
    Sealed,
    Frozen,
}

/// Own property as stored, with the virtual properties of arrays and
/// string wrappers filled in. Never called on proxies.
fn own_property_of(obj: &JsObject, key: &PropertyKey) -> Option<Property> {
    match &obj.exotic {
        ExoticObject::Array {
            length,
            length_writable,
        } if key.eq_str("length") => {
            return Some(Property::with_attributes(
                JsValue::from(*length),
                *length_writable,
                false,
                false,
            ));
        }
        ExoticObject::Primitive(JsValue::String(s)) => {
            if let Some(prop) = string_wrapper_property(s, key) {
                return Some(prop);
            }
        }
        _ => {}
    }
    obj.properties.get(key).cloned()
}

fn string_wrapper_property(s: &JsString, key: &PropertyKey) -> Option<Property> {
    if key.eq_str("length") {
        let len = u32::try_from(s.len()).unwrap_or(u32::MAX);
        return Some(Property::with_attributes(JsValue::from(len), false, false, false));
    }
    let unit = s.char_code_at(key.as_index()? as usize)?;
    Some(Property::with_attributes(
        JsValue::String(JsString::from_utf16(vec![unit])),
        false,
        true,
        false,
    ))
}

fn key_description(key: &PropertyKey) -> String {
    key.to_string()
}

/// How an object answers the object-model hooks
enum Shape {
    Ordinary,
    Array { length: u32, length_writable: bool },
    StringWrapper(JsString),
    Proxy,
}

fn shape_of(obj: &JsObjectRef) -> Shape {
    match &obj.borrow().exotic {
        ExoticObject::Array {
            length,
            length_writable,
        } => Shape::Array {
            length: *length,
            length_writable: *length_writable,
        },
        ExoticObject::Primitive(JsValue::String(s)) => Shape::StringWrapper(s.cheap_clone()),
        ExoticObject::Proxy(_) => Shape::Proxy,
        _ => Shape::Ordinary,
    }
}

/// Lazy `for-in` style key enumeration over an object and its prototypes.
///
/// Yields each enumerable string key once, skipping keys shadowed by an
/// object closer to the start of the chain and keys deleted before they
/// are reached. Not restartable: once exhausted it stays exhausted.
pub struct PropertyEnumerator {
    current: Option<JsObjectRef>,
    pending: VecDeque<PropertyKey>,
    next_object: Option<JsObjectRef>,
    visited: FxHashSet<PropertyKey>,
}

impl PropertyEnumerator {
    pub fn next_key(&mut self, interp: &mut Interpreter) -> Result<Option<PropertyKey>, JsError> {
        loop {
            if let Some(key) = self.pending.pop_front() {
                let Some(obj) = self.current.as_ref() else {
                    continue;
                };
                if !self.visited.insert(key.clone()) {
                    continue;
                }
                match interp.get_own_property(obj, &key)? {
                    Some(prop) if prop.enumerable() => return Ok(Some(key)),
                    _ => continue,
                }
            }

            let Some(obj) = self.next_object.take() else {
                self.current = None;
                return Ok(None);
            };
            self.pending = interp
                .own_keys(&obj, true)?
                .into_iter()
                .filter(|k| !k.is_symbol())
                .collect();
            self.next_object = interp.get_prototype_of(&obj)?;
            self.current = Some(obj);
        }
    }
}

impl Interpreter {
    // ═══════════════════════════════════════════════════════════════════════════
    // Lookup
    // ═══════════════════════════════════════════════════════════════════════════

    /// [[GetOwnProperty]]
    pub fn get_own_property(&mut self, obj: &JsObjectRef, key: &PropertyKey) -> Result<Option<Property>, JsError> {
        if obj.borrow().is_proxy() {
            return self.proxy_get_own_property(obj, key);
        }
        Ok(own_property_of(&obj.borrow(), key))
    }

    pub fn has_own_property(&mut self, obj: &JsObjectRef, key: &PropertyKey) -> Result<bool, JsError> {
        Ok(self.get_own_property(obj, key)?.is_some())
    }

    /// [[Get]]: accessors found anywhere on the chain run with `receiver`
    /// as `this`
    pub fn get(&mut self, obj: &JsObjectRef, key: &PropertyKey, receiver: &JsValue) -> Result<JsValue, JsError> {
        let mut current = obj.cheap_clone();
        loop {
            let step = {
                let o = current.borrow();
                if o.is_proxy() {
                    None
                } else {
                    Some((own_property_of(&o, key), o.prototype.clone()))
                }
            };
            let Some((own, proto)) = step else {
                return self.proxy_get(&current, key, receiver);
            };
            match own {
                Some(Property::Accessor { getter, .. }) => {
                    return match getter {
                        Some(getter) => self.call(&JsValue::Object(getter), receiver, &[]),
                        None => Ok(JsValue::Undefined),
                    };
                }
                Some(prop) => return Ok(prop.value().cloned().unwrap_or_default()),
                None => match proto {
                    Some(proto) => current = proto,
                    None => return Ok(JsValue::Undefined),
                },
            }
        }
    }

    /// [[Get]] with the object itself as receiver
    pub fn get_property(&mut self, obj: &JsObjectRef, key: &PropertyKey) -> Result<JsValue, JsError> {
        self.get(obj, key, &JsValue::Object(obj.cheap_clone()))
    }

    /// Property read on any value; primitives read through their prototype
    /// with the primitive itself as receiver
    pub fn get_value_property(&mut self, target: &JsValue, key: &PropertyKey) -> Result<JsValue, JsError> {
        match target {
            JsValue::Object(obj) => self.get_property(obj, key),
            JsValue::Undefined | JsValue::Null => Err(JsError::type_error(format!(
                "Cannot read properties of {:?} (reading '{}')",
                target,
                key_description(key)
            ))),
            JsValue::String(s) => {
                if let Some(prop) = string_wrapper_property(s, key) {
                    return Ok(prop.value().cloned().unwrap_or_default());
                }
                let proto = self.string_prototype.cheap_clone();
                self.get(&proto, key, target)
            }
            _ => match self.prototype_for_primitive(target) {
                Some(proto) => self.get(&proto, key, target),
                None => Ok(JsValue::Undefined),
            },
        }
    }

    pub(crate) fn prototype_for_primitive(&self, value: &JsValue) -> Option<JsObjectRef> {
        let proto = match value {
            JsValue::Boolean(_) => &self.boolean_prototype,
            JsValue::Int(_) | JsValue::Float(_) => &self.number_prototype,
            JsValue::String(_) => &self.string_prototype,
            JsValue::Symbol(_) => &self.symbol_prototype,
            _ => return None,
        };
        Some(proto.cheap_clone())
    }

    /// [[HasProperty]]
    pub fn has_property(&mut self, obj: &JsObjectRef, key: &PropertyKey) -> Result<bool, JsError> {
        let mut current = obj.cheap_clone();
        loop {
            let step = {
                let o = current.borrow();
                if o.is_proxy() {
                    None
                } else {
                    Some((own_property_of(&o, key).is_some(), o.prototype.clone()))
                }
            };
            let Some((found, proto)) = step else {
                return self.proxy_has(&current, key);
            };
            if found {
                return Ok(true);
            }
            match proto {
                Some(proto) => current = proto,
                None => return Ok(false),
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Assignment
    // ═══════════════════════════════════════════════════════════════════════════

    /// [[Set]]. A key missing locally is resolved against the prototype
    /// chain first: an inherited setter runs, an inherited read-only data
    /// property rejects, and only otherwise is an own property created on
    /// `receiver`.
    pub fn set(
        &mut self,
        obj: &JsObjectRef,
        key: &PropertyKey,
        value: JsValue,
        receiver: &JsValue,
    ) -> Result<bool, JsError> {
        self.check_realm(&value)?;

        if let JsValue::Object(r) = receiver
            && r.ptr_eq(obj)
        {
            let mut o = obj.borrow_mut();
            if !o.is_proxy()
                && let Some(Property::Plain(slot)) = o.properties.get_mut(key)
            {
                *slot = value;
                return Ok(true);
            }
        }

        let mut current = obj.cheap_clone();
        let own_desc = loop {
            let step = {
                let o = current.borrow();
                if o.is_proxy() {
                    None
                } else {
                    Some((own_property_of(&o, key), o.prototype.clone()))
                }
            };
            let Some((own, proto)) = step else {
                return self.proxy_set(&current, key, value, receiver);
            };
            match (own, proto) {
                (Some(prop), _) => break prop,
                (None, Some(proto)) => current = proto,
                (None, None) => break Property::Plain(JsValue::Undefined),
            }
        };

        match own_desc {
            Property::Accessor { setter, .. } => match setter {
                Some(setter) => {
                    self.call(&JsValue::Object(setter), receiver, &[value])?;
                    Ok(true)
                }
                None => Ok(false),
            },
            data => {
                if !data.writable() {
                    return Ok(false);
                }
                let JsValue::Object(receiver_obj) = receiver else {
                    return Ok(false);
                };
                match self.get_own_property(receiver_obj, key)? {
                    Some(existing) => {
                        if existing.is_accessor() || !existing.writable() {
                            return Ok(false);
                        }
                        self.define_own_property(receiver_obj, key.clone(), &PropertyDescriptor::value(value), false)
                    }
                    None => self.create_data_property(receiver_obj, key.clone(), value),
                }
            }
        }
    }

    /// [[Set]] on the object itself; `throw` turns a rejection into a
    /// TypeError
    pub fn put(&mut self, obj: &JsObjectRef, key: PropertyKey, value: JsValue, throw: bool) -> Result<bool, JsError> {
        let ok = self.set(obj, &key, value, &JsValue::Object(obj.cheap_clone()))?;
        if !ok && throw {
            return Err(JsError::type_error(format!(
                "Cannot assign to read only property '{}' of object",
                key_description(&key)
            )));
        }
        Ok(ok)
    }

    /// Property write on any value
    pub fn set_value_property(
        &mut self,
        target: &JsValue,
        key: PropertyKey,
        value: JsValue,
        strict: bool,
    ) -> Result<(), JsError> {
        match target {
            JsValue::Object(obj) => {
                self.put(obj, key, value, strict)?;
                Ok(())
            }
            JsValue::Undefined | JsValue::Null => Err(JsError::type_error(format!(
                "Cannot set properties of {:?} (setting '{}')",
                target,
                key_description(&key)
            ))),
            _ => {
                let ok = match self.prototype_for_primitive(target) {
                    Some(proto) => self.set(&proto, &key, value, target)?,
                    None => false,
                };
                if !ok && strict {
                    return Err(JsError::type_error(format!(
                        "Cannot create property '{}' on {}",
                        key_description(&key),
                        target.type_of()
                    )));
                }
                Ok(())
            }
        }
    }

    /// CreateDataProperty: define an enumerable, writable, configurable
    /// own data property
    pub fn create_data_property(&mut self, obj: &JsObjectRef, key: PropertyKey, value: JsValue) -> Result<bool, JsError> {
        self.define_own_property(obj, key, &PropertyDescriptor::data(value, true, true, true), false)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Definition and deletion
    // ═══════════════════════════════════════════════════════════════════════════

    /// [[DefineOwnProperty]]
    pub fn define_own_property(
        &mut self,
        obj: &JsObjectRef,
        key: PropertyKey,
        desc: &PropertyDescriptor,
        throw: bool,
    ) -> Result<bool, JsError> {
        if let Some(value) = &desc.value {
            self.check_realm(value)?;
        }
        let ok = match shape_of(obj) {
            Shape::Proxy => return self.proxy_define_own_property(obj, key, desc, throw),
            Shape::Array {
                length,
                length_writable,
            } => self.array_define_own(obj, key.clone(), desc, length, length_writable)?,
            Shape::StringWrapper(s) => match string_wrapper_property(&s, &key) {
                Some(current) => validate_and_apply(Some(&current), false, desc).is_ok(),
                None => ordinary_define_own(obj, key.clone(), desc),
            },
            Shape::Ordinary => ordinary_define_own(obj, key.clone(), desc),
        };
        if !ok && throw {
            let exists = self.get_own_property(obj, &key)?.is_some();
            return Err(if exists {
                JsError::type_error(format!("Cannot redefine property: {}", key_description(&key)))
            } else {
                JsError::type_error(format!(
                    "Cannot define property {}, object is not extensible",
                    key_description(&key)
                ))
            });
        }
        Ok(ok)
    }

    fn array_define_own(
        &mut self,
        obj: &JsObjectRef,
        key: PropertyKey,
        desc: &PropertyDescriptor,
        length: u32,
        length_writable: bool,
    ) -> Result<bool, JsError> {
        if key.eq_str("length") {
            return self.array_set_length(obj, desc, length, length_writable);
        }
        if let Some(index) = key.as_index() {
            if index >= length && !length_writable {
                return Ok(false);
            }
            if !ordinary_define_own(obj, key, desc) {
                return Ok(false);
            }
            if index >= length
                && let ExoticObject::Array { length, .. } = &mut obj.borrow_mut().exotic
            {
                *length = index + 1;
            }
            return Ok(true);
        }
        Ok(ordinary_define_own(obj, key, desc))
    }

    /// ArraySetLength: shrinking deletes elements from the end and stops at
    /// the first one that cannot be deleted
    fn array_set_length(
        &mut self,
        obj: &JsObjectRef,
        desc: &PropertyDescriptor,
        old_length: u32,
        writable: bool,
    ) -> Result<bool, JsError> {
        let current = Property::with_attributes(JsValue::from(old_length), writable, false, false);

        let Some(value) = &desc.value else {
            return Ok(match validate_and_apply(Some(&current), true, desc) {
                Ok(updated) => {
                    if let ExoticObject::Array { length_writable, .. } = &mut obj.borrow_mut().exotic {
                        *length_writable = updated.writable();
                    }
                    true
                }
                Err(_) => false,
            });
        };

        let number = self.to_number(value)?;
        let new_length = to_uint32(number);
        if f64::from(new_length) != number {
            return Err(JsError::range_error("Invalid array length"));
        }
        let mut length_desc = desc.clone();
        length_desc.value = Some(JsValue::from(new_length));
        if validate_and_apply(Some(&current), true, &length_desc).is_err() {
            return Ok(false);
        }
        let new_writable = length_desc.writable.unwrap_or(writable);

        let mut o = obj.borrow_mut();
        let mut final_length = new_length;
        let mut ok = true;
        if new_length < old_length {
            let doomed: Vec<u32> = o
                .properties
                .index_keys()
                .into_iter()
                .rev()
                .filter(|&i| i >= new_length)
                .collect();
            for index in doomed {
                let key = PropertyKey::Index(index);
                let configurable = o.properties.get(&key).is_none_or(Property::configurable);
                if !configurable {
                    final_length = index + 1;
                    ok = false;
                    break;
                }
                o.properties.remove(&key);
            }
        }
        if let ExoticObject::Array {
            length,
            length_writable,
        } = &mut o.exotic
        {
            *length = final_length;
            *length_writable = new_writable;
        }
        Ok(ok)
    }

    /// [[Delete]]
    pub fn delete_property(&mut self, obj: &JsObjectRef, key: &PropertyKey, throw: bool) -> Result<bool, JsError> {
        let ok = match shape_of(obj) {
            Shape::Proxy => return self.proxy_delete(obj, key, throw),
            Shape::Array { .. } if key.eq_str("length") => false,
            Shape::StringWrapper(s) if string_wrapper_property(&s, key).is_some() => false,
            _ => {
                let removed = {
                    let mut o = obj.borrow_mut();
                    match o.properties.get(key) {
                        None => Some(None),
                        Some(prop) if prop.configurable() => Some(o.properties.remove(key)),
                        Some(_) => None,
                    }
                };
                removed.is_some()
            }
        };
        if !ok && throw {
            return Err(JsError::type_error(format!(
                "Cannot delete property '{}' of object",
                key_description(key)
            )));
        }
        Ok(ok)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Keys
    // ═══════════════════════════════════════════════════════════════════════════

    /// [[OwnPropertyKeys]]: index keys ascending, then string keys in
    /// insertion order, then symbols in insertion order
    pub fn own_keys(&mut self, obj: &JsObjectRef, include_non_enumerable: bool) -> Result<Vec<PropertyKey>, JsError> {
        let shape = shape_of(obj);
        if let Shape::Proxy = shape {
            let keys = self.proxy_own_keys(obj)?;
            if include_non_enumerable {
                return Ok(keys);
            }
            let mut enumerable = Vec::with_capacity(keys.len());
            for key in keys {
                if self.get_own_property(obj, &key)?.is_some_and(|p| p.enumerable()) {
                    enumerable.push(key);
                }
            }
            return Ok(enumerable);
        }

        let mut o = obj.borrow_mut();
        let stored = o.properties.keys();
        let mut keys = Vec::with_capacity(stored.len() + 1);
        let mut virtual_length = false;
        match &shape {
            Shape::StringWrapper(s) => {
                keys.extend((0..s.len()).filter_map(|i| u32::try_from(i).ok()).map(PropertyKey::Index));
                virtual_length = true;
            }
            Shape::Array { .. } => virtual_length = true,
            _ => {}
        }
        keys.extend(stored.into_iter().filter(|k| {
            include_non_enumerable || o.properties.get(k).is_some_and(Property::enumerable)
        }));
        if virtual_length && include_non_enumerable {
            let position = keys.iter().take_while(|k| k.as_index().is_some()).count();
            keys.insert(position, PropertyKey::from("length"));
        }
        Ok(keys)
    }

    /// Lazy enumeration of `obj` and its prototype chain
    pub fn enumerate(&mut self, obj: &JsObjectRef) -> PropertyEnumerator {
        PropertyEnumerator {
            current: None,
            pending: VecDeque::new(),
            next_object: Some(obj.cheap_clone()),
            visited: FxHashSet::default(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Prototypes and extensibility
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn get_prototype_of(&mut self, obj: &JsObjectRef) -> Result<Option<JsObjectRef>, JsError> {
        if obj.borrow().is_proxy() {
            return self.proxy_get_prototype_of(obj);
        }
        Ok(obj.borrow().prototype.clone())
    }

    /// [[SetPrototypeOf]]. Rejects cycles and changes on non-extensible
    /// objects with a TypeError.
    pub fn set_prototype_of(&mut self, obj: &JsObjectRef, proto: Option<JsObjectRef>) -> Result<(), JsError> {
        if let Some(p) = &proto {
            self.check_object_realm(p)?;
        }
        if obj.borrow().is_proxy() {
            if !self.proxy_set_prototype_of(obj, proto)? {
                return Err(JsError::type_error("'setPrototypeOf' on proxy: trap returned falsish"));
            }
            return Ok(());
        }

        let (same, extensible) = {
            let o = obj.borrow();
            let same = match (&o.prototype, &proto) {
                (Some(a), Some(b)) => a.ptr_eq(b),
                (None, None) => true,
                _ => false,
            };
            (same, o.extensible)
        };
        if same {
            return Ok(());
        }
        if !extensible {
            return Err(JsError::type_error(format!(
                "#<{}> is not extensible",
                obj.borrow().class
            )));
        }

        let mut candidate = proto.clone();
        while let Some(p) = candidate {
            if p.ptr_eq(obj) {
                return Err(JsError::type_error("Cyclic __proto__ value"));
            }
            let o = p.borrow();
            if o.is_proxy() {
                break;
            }
            candidate = o.prototype.clone();
        }

        obj.borrow_mut().prototype = proto;
        Ok(())
    }

    pub fn is_extensible(&mut self, obj: &JsObjectRef) -> Result<bool, JsError> {
        if obj.borrow().is_proxy() {
            return self.proxy_is_extensible(obj);
        }
        Ok(obj.borrow().extensible)
    }

    pub fn prevent_extensions(&mut self, obj: &JsObjectRef) -> Result<bool, JsError> {
        if obj.borrow().is_proxy() {
            return self.proxy_prevent_extensions(obj);
        }
        obj.borrow_mut().extensible = false;
        Ok(true)
    }

    /// SetIntegrityLevel (`Object.seal` / `Object.freeze`)
    pub fn set_integrity_level(&mut self, obj: &JsObjectRef, level: IntegrityLevel) -> Result<bool, JsError> {
        if !self.prevent_extensions(obj)? {
            return Ok(false);
        }
        for key in self.own_keys(obj, true)? {
            let desc = match level {
                IntegrityLevel::Sealed => PropertyDescriptor::default().configurable(false),
                IntegrityLevel::Frozen => match self.get_own_property(obj, &key)? {
                    Some(prop) if prop.is_accessor() => PropertyDescriptor::default().configurable(false),
                    Some(_) => PropertyDescriptor::default().configurable(false).writable(false),
                    None => continue,
                },
            };
            self.define_own_property(obj, key, &desc, true)?;
        }
        Ok(true)
    }

    /// TestIntegrityLevel (`Object.isSealed` / `Object.isFrozen`)
    pub fn test_integrity_level(&mut self, obj: &JsObjectRef, level: IntegrityLevel) -> Result<bool, JsError> {
        if self.is_extensible(obj)? {
            return Ok(false);
        }
        for key in self.own_keys(obj, true)? {
            if let Some(prop) = self.get_own_property(obj, &key)? {
                if prop.configurable() {
                    return Ok(false);
                }
                if level == IntegrityLevel::Frozen && !prop.is_accessor() && prop.writable() {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Descriptor objects
    // ═══════════════════════════════════════════════════════════════════════════

    /// FromPropertyDescriptor: a completed descriptor object, or undefined
    pub fn from_property_descriptor(&mut self, desc: Option<&PropertyDescriptor>) -> JsValue {
        let Some(desc) = desc else {
            return JsValue::Undefined;
        };
        let desc = desc.completed();
        let obj = self.create_object();
        {
            let mut o = obj.borrow_mut();
            if let Some(get) = &desc.get {
                o.set_property("get", get.clone().map(JsValue::Object).unwrap_or_default());
            }
            if let Some(set) = &desc.set {
                o.set_property("set", set.clone().map(JsValue::Object).unwrap_or_default());
            }
            if let Some(value) = &desc.value {
                o.set_property("value", value.clone());
            }
            if let Some(writable) = desc.writable {
                o.set_property("writable", JsValue::Boolean(writable));
            }
            if let Some(enumerable) = desc.enumerable {
                o.set_property("enumerable", JsValue::Boolean(enumerable));
            }
            if let Some(configurable) = desc.configurable {
                o.set_property("configurable", JsValue::Boolean(configurable));
            }
        }
        JsValue::Object(obj)
    }

    /// ToPropertyDescriptor: read a descriptor object
    pub fn to_property_descriptor(&mut self, value: &JsValue) -> Result<PropertyDescriptor, JsError> {
        let JsValue::Object(obj) = value else {
            return Err(JsError::type_error(format!(
                "Property description must be an object: {:?}",
                value
            )));
        };
        let mut desc = PropertyDescriptor::default();

        if let Some(v) = self.descriptor_field(obj, "enumerable")? {
            desc.enumerable = Some(v.to_boolean());
        }
        if let Some(v) = self.descriptor_field(obj, "configurable")? {
            desc.configurable = Some(v.to_boolean());
        }
        if let Some(v) = self.descriptor_field(obj, "value")? {
            desc.value = Some(v);
        }
        if let Some(v) = self.descriptor_field(obj, "writable")? {
            desc.writable = Some(v.to_boolean());
        }
        if let Some(v) = self.descriptor_field(obj, "get")? {
            desc.get = Some(accessor_function(v, "Getter")?);
        }
        if let Some(v) = self.descriptor_field(obj, "set")? {
            desc.set = Some(accessor_function(v, "Setter")?);
        }

        if desc.is_accessor_descriptor() && desc.is_data_descriptor() {
            return Err(JsError::type_error(
                "Invalid property descriptor. Cannot both specify accessors and a value or writable attribute",
            ));
        }
        Ok(desc)
    }

    fn descriptor_field(&mut self, obj: &JsObjectRef, name: &str) -> Result<Option<JsValue>, JsError> {
        let key = PropertyKey::from(name);
        if !self.has_property(obj, &key)? {
            return Ok(None);
        }
        self.get_property(obj, &key).map(Some)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // instanceof
    // ═══════════════════════════════════════════════════════════════════════════

    /// `value instanceof target`
    pub fn instance_of(&mut self, value: &JsValue, target: &JsValue) -> Result<bool, JsError> {
        let JsValue::Object(target_obj) = target else {
            return Err(JsError::type_error("Right-hand side of 'instanceof' is not an object"));
        };
        let has_instance = self.well_known_symbol(WellKnownSymbol::HasInstance);
        let handler = self.get_property(target_obj, &PropertyKey::Symbol(has_instance))?;
        if !handler.is_null_or_undefined() {
            let result = self.call(&handler, target, std::slice::from_ref(value))?;
            return Ok(result.to_boolean());
        }
        if !target_obj.is_callable() {
            return Err(JsError::type_error("Right-hand side of 'instanceof' is not callable"));
        }
        self.ordinary_has_instance(target_obj, value)
    }

    /// OrdinaryHasInstance
    pub fn ordinary_has_instance(&mut self, ctor: &JsObjectRef, value: &JsValue) -> Result<bool, JsError> {
        let bound_target = match &ctor.borrow().exotic {
            ExoticObject::Function(JsFunction::Bound(bound)) => Some(bound.target.cheap_clone()),
            _ => None,
        };
        if let Some(target) = bound_target {
            return self.instance_of(value, &JsValue::Object(target));
        }

        let JsValue::Object(obj) = value else {
            return Ok(false);
        };
        let JsValue::Object(proto) = self.get_property(ctor, &PropertyKey::from("prototype"))? else {
            return Err(JsError::type_error(
                "Function has non-object prototype in instanceof check",
            ));
        };
        let mut candidate = self.get_prototype_of(obj)?;
        while let Some(p) = candidate {
            if p.ptr_eq(&proto) {
                return Ok(true);
            }
            candidate = self.get_prototype_of(&p)?;
        }
        Ok(false)
    }
}

fn ordinary_define_own(obj: &JsObjectRef, key: PropertyKey, desc: &PropertyDescriptor) -> bool {
    let mut o = obj.borrow_mut();
    let applied = validate_and_apply(o.properties.get(&key), o.extensible, desc);
    match applied {
        Ok(prop) => {
            o.properties.insert(key, prop);
            true
        }
        Err(_) => false,
    }
}

fn accessor_function(value: JsValue, what: &str) -> Result<Option<JsObjectRef>, JsError> {
    match value {
        JsValue::Undefined => Ok(None),
        JsValue::Object(obj) if obj.is_callable() => Ok(Some(obj)),
        other => Err(JsError::type_error(format!(
            "{} must be a function: {:?}",
            what, other
        ))),
    }
}
