//! Host interop
//!
//! `HostValue` is the shape engine values take outside the engine: plain
//! scalars plus shared list and map containers. Export and import both keep
//! a visited map keyed by identity, so an object reachable twice becomes one
//! shared container and a cycle becomes a cyclic container graph.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::object::{ExoticObject, JsObjectRef};
use crate::prelude::{FxHashMap, FxHashSet, IndexMap, index_map_new};
use crate::value::{CheapClone, JsValue, PropertyKey};

pub type HostList = Rc<RefCell<Vec<HostValue>>>;
pub type HostMap = Rc<RefCell<IndexMap<String, HostValue>>>;

/// A host-side value
#[derive(Clone)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(HostList),
    Map(HostMap),
}

impl std::fmt::Debug for HostValue {
    // Containers print their address only; they may be cyclic
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostValue::Undefined => write!(f, "Undefined"),
            HostValue::Null => write!(f, "Null"),
            HostValue::Bool(b) => write!(f, "Bool({})", b),
            HostValue::Int(n) => write!(f, "Int({})", n),
            HostValue::Float(n) => write!(f, "Float({})", n),
            HostValue::String(s) => write!(f, "String({:?})", s),
            HostValue::List(list) => write!(f, "List({:p})", Rc::as_ptr(list)),
            HostValue::Map(map) => write!(f, "Map({:p})", Rc::as_ptr(map)),
        }
    }
}

impl HostValue {
    pub fn list(items: Vec<HostValue>) -> Self {
        HostValue::List(Rc::new(RefCell::new(items)))
    }

    pub fn map<I: IntoIterator<Item = (String, HostValue)>>(entries: I) -> Self {
        let mut map = index_map_new();
        map.extend(entries);
        HostValue::Map(Rc::new(RefCell::new(map)))
    }

    /// Same scalar, or the same container
    pub fn ptr_eq(&self, other: &HostValue) -> bool {
        match (self, other) {
            (HostValue::List(a), HostValue::List(b)) => Rc::ptr_eq(a, b),
            (HostValue::Map(a), HostValue::Map(b)) => Rc::ptr_eq(a, b),
            (HostValue::Undefined, HostValue::Undefined) | (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Float(a), HostValue::Float(b)) => a.to_bits() == b.to_bits(),
            (HostValue::String(a), HostValue::String(b)) => a == b,
            _ => false,
        }
    }

    /// Serialize an acyclic value. `Undefined` map entries are skipped and
    /// become `null` inside lists, non-finite floats become `null`.
    pub fn to_json(&self) -> Result<serde_json::Value, JsError> {
        let mut in_progress = FxHashSet::default();
        self.to_json_inner(&mut in_progress)
    }

    fn to_json_inner(&self, in_progress: &mut FxHashSet<usize>) -> Result<serde_json::Value, JsError> {
        use serde_json::Value;
        Ok(match self {
            HostValue::Undefined | HostValue::Null => Value::Null,
            HostValue::Bool(b) => Value::Bool(*b),
            HostValue::Int(n) => Value::from(*n),
            HostValue::Float(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
            HostValue::String(s) => Value::String(s.clone()),
            HostValue::List(list) => {
                let id = Rc::as_ptr(list) as usize;
                if !in_progress.insert(id) {
                    return Err(JsError::type_error("Converting circular structure to JSON"));
                }
                let items = list
                    .borrow()
                    .iter()
                    .map(|item| item.to_json_inner(in_progress))
                    .collect::<Result<Vec<_>, _>>()?;
                in_progress.remove(&id);
                Value::Array(items)
            }
            HostValue::Map(map) => {
                let id = Rc::as_ptr(map) as usize;
                if !in_progress.insert(id) {
                    return Err(JsError::type_error("Converting circular structure to JSON"));
                }
                let mut out = serde_json::Map::new();
                for (key, value) in map.borrow().iter() {
                    if matches!(value, HostValue::Undefined) {
                        continue;
                    }
                    out.insert(key.clone(), value.to_json_inner(in_progress)?);
                }
                in_progress.remove(&id);
                Value::Object(out)
            }
        })
    }

    pub fn from_json(json: &serde_json::Value) -> HostValue {
        use serde_json::Value;
        match json {
            Value::Null => HostValue::Null,
            Value::Bool(b) => HostValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => HostValue::Int(i),
                None => HostValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => HostValue::String(s.clone()),
            Value::Array(items) => HostValue::list(items.iter().map(HostValue::from_json).collect()),
            Value::Object(map) => {
                HostValue::map(map.iter().map(|(k, v)| (k.clone(), HostValue::from_json(v))))
            }
        }
    }
}

impl Interpreter {
    /// Convert an engine value into a host value. Arrays become lists and
    /// other objects become maps of their own enumerable string-keyed
    /// properties, read through `get` so accessors and proxies run.
    pub fn export_value(&mut self, value: &JsValue) -> Result<HostValue, JsError> {
        self.check_realm(value)?;
        let mut visited = FxHashMap::default();
        self.export_inner(value, &mut visited)
    }

    fn export_inner(&mut self, value: &JsValue, visited: &mut FxHashMap<u64, HostValue>) -> Result<HostValue, JsError> {
        let obj = match value {
            JsValue::Undefined => return Ok(HostValue::Undefined),
            JsValue::Null => return Ok(HostValue::Null),
            JsValue::Boolean(b) => return Ok(HostValue::Bool(*b)),
            JsValue::Int(n) => return Ok(HostValue::Int(*n)),
            JsValue::Float(n) => return Ok(HostValue::Float(*n)),
            JsValue::String(s) => return Ok(HostValue::String(s.to_rust_string_lossy())),
            JsValue::Symbol(_) => return Err(JsError::type_error("Cannot export a Symbol value")),
            JsValue::Object(obj) => obj,
        };
        if let Some(existing) = visited.get(&obj.id()) {
            return Ok(existing.clone());
        }
        if obj.is_callable() {
            return Err(JsError::type_error("Cannot export a function value"));
        }
        if let ExoticObject::Primitive(inner) = &obj.borrow().exotic {
            let inner = inner.clone();
            return self.export_inner(&inner, visited);
        }

        if obj.borrow().is_array() {
            let list: HostList = Rc::new(RefCell::new(Vec::new()));
            visited.insert(obj.id(), HostValue::List(list.cheap_clone()));
            let length = self.get_property(obj, &PropertyKey::from("length"))?;
            let length = crate::number::to_length(self.to_number(&length)?);
            for i in 0..length {
                let index = u32::try_from(i).map_err(|_| JsError::range_error("Invalid array length"))?;
                let element = self.get_property(obj, &PropertyKey::from(index))?;
                let item = self.export_inner(&element, visited)?;
                list.borrow_mut().push(item);
            }
            return Ok(HostValue::List(list));
        }

        let map: HostMap = Rc::new(RefCell::new(index_map_new()));
        visited.insert(obj.id(), HostValue::Map(map.cheap_clone()));
        for key in self.own_keys(obj, false)? {
            if key.is_symbol() {
                continue;
            }
            let element = self.get_property(obj, &key)?;
            let item = self.export_inner(&element, visited)?;
            map.borrow_mut().insert(key.to_string(), item);
        }
        Ok(HostValue::Map(map))
    }

    /// Convert a host value into engine values owned by this instance
    pub fn import_value(&mut self, value: &HostValue) -> Result<JsValue, JsError> {
        let mut visited = FxHashMap::default();
        self.import_inner(value, &mut visited)
    }

    fn import_inner(
        &mut self,
        value: &HostValue,
        visited: &mut FxHashMap<usize, JsObjectRef>,
    ) -> Result<JsValue, JsError> {
        Ok(match value {
            HostValue::Undefined => JsValue::Undefined,
            HostValue::Null => JsValue::Null,
            HostValue::Bool(b) => JsValue::Boolean(*b),
            HostValue::Int(n) => JsValue::from(*n),
            HostValue::Float(n) => JsValue::number(*n),
            HostValue::String(s) => JsValue::from(s.as_str()),
            HostValue::List(list) => {
                let id = Rc::as_ptr(list) as usize;
                if let Some(existing) = visited.get(&id) {
                    return Ok(JsValue::Object(existing.cheap_clone()));
                }
                let array = self.create_array(Vec::new());
                visited.insert(id, array.cheap_clone());
                let items = list.borrow().clone();
                for (index, item) in (0u32..).zip(items.iter()) {
                    let element = self.import_inner(item, visited)?;
                    self.create_data_property(&array, PropertyKey::Index(index), element)?;
                }
                JsValue::Object(array)
            }
            HostValue::Map(map) => {
                let id = Rc::as_ptr(map) as usize;
                if let Some(existing) = visited.get(&id) {
                    return Ok(JsValue::Object(existing.cheap_clone()));
                }
                let obj = self.create_object();
                visited.insert(id, obj.cheap_clone());
                let entries: Vec<(String, HostValue)> =
                    map.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                for (key, item) in entries {
                    let element = self.import_inner(&item, visited)?;
                    self.create_data_property(&obj, PropertyKey::from(key.as_str()), element)?;
                }
                JsValue::Object(obj)
            }
        })
    }
}
