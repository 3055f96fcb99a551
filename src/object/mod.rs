//! Object records and handles
//!
//! Objects are shared through `JsObjectRef`, a reference-counted handle to
//! a `RefCell<JsObject>`. Each object carries a process-unique id (used for
//! identity hashing and weak tables) and the id of the engine instance that
//! allocated it.
//!
//! The algorithms that walk prototype chains, call accessors or consult
//! proxy traps need the interpreter and live in
//! `interpreter::properties`; this module only knows storage.

mod function;
mod property;
mod table;
mod weak;

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::interpreter::coroutine::Coroutine;
use crate::interpreter::promise::PromiseState;
use crate::prelude::IndexMap;
use crate::value::{CheapClone, JsValue, MapKey, PropertyKey};

pub use function::{BoundFunctionData, BytecodeFunction, JsFunction, NativeFn, NativeFunction};
pub use property::{DefineError, Property, PropertyDescriptor, validate_and_apply};
pub use table::PropertyMap;
pub use weak::{FinalizationQueue, WeakTable};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

struct ObjectCell {
    id: u64,
    realm: u32,
    /// Set once the object is used as a weak key
    finalization: RefCell<Option<FinalizationQueue>>,
    data: RefCell<JsObject>,
}

impl Drop for ObjectCell {
    fn drop(&mut self) {
        if let Some(queue) = self.finalization.get_mut().take() {
            queue.push(self.id);
        }
    }
}

/// Shared handle to an object
pub struct JsObjectRef(Rc<ObjectCell>);

impl JsObjectRef {
    pub(crate) fn new(realm: u32, object: JsObject) -> Self {
        JsObjectRef(Rc::new(ObjectCell {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            realm,
            finalization: RefCell::new(None),
            data: RefCell::new(object),
        }))
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Id of the engine instance that allocated this object
    #[inline]
    pub fn realm(&self) -> u32 {
        self.0.realm
    }

    #[inline]
    pub fn borrow(&self) -> Ref<'_, JsObject> {
        self.0.data.borrow()
    }

    /// Shared access unless the object is mutably borrowed
    pub fn try_borrow(&self) -> Option<Ref<'_, JsObject>> {
        self.0.data.try_borrow().ok()
    }

    #[inline]
    pub fn borrow_mut(&self) -> RefMut<'_, JsObject> {
        self.0.data.borrow_mut()
    }

    /// Mutable access unless the object is already borrowed
    pub fn try_borrow_mut(&self) -> Option<RefMut<'_, JsObject>> {
        self.0.data.try_borrow_mut().ok()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &JsObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef {
            id: self.0.id,
            cell: Rc::downgrade(&self.0),
        }
    }

    /// Report this object's id to `queue` when it is dropped
    pub(crate) fn watch_finalization(&self, queue: &FinalizationQueue) {
        let mut slot = self.0.finalization.borrow_mut();
        if slot.is_none() {
            *slot = Some(queue.clone());
        }
    }

    pub fn is_callable(&self) -> bool {
        self.borrow().is_callable()
    }

    pub fn is_constructor(&self) -> bool {
        match &self.borrow().exotic {
            ExoticObject::Function(func) => func.is_constructor(),
            ExoticObject::Proxy(proxy) => proxy.constructor,
            _ => false,
        }
    }

    /// Number of strong handles, for diagnostics and tests
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl Clone for JsObjectRef {
    fn clone(&self) -> Self {
        JsObjectRef(Rc::clone(&self.0))
    }
}

impl CheapClone for JsObjectRef {}

impl PartialEq for JsObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for JsObjectRef {}

impl Hash for JsObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for JsObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.data.try_borrow() {
            Ok(obj) => write!(f, "[object {} #{}]", obj.class, self.0.id),
            Err(_) => write!(f, "[object #{}]", self.0.id),
        }
    }
}

/// Non-owning handle used by weak tables and the teardown registry
#[derive(Clone)]
pub struct WeakObjectRef {
    id: u64,
    cell: Weak<ObjectCell>,
}

impl WeakObjectRef {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn upgrade(&self) -> Option<JsObjectRef> {
        self.cell.upgrade().map(JsObjectRef)
    }

    pub fn is_alive(&self) -> bool {
        self.cell.strong_count() > 0
    }
}

/// Proxy target and handler; both are cleared on revocation
pub struct ProxyData {
    pub target: Option<JsObjectRef>,
    pub handler: Option<JsObjectRef>,
    pub callable: bool,
    pub constructor: bool,
}

/// Per-kind payload. Kinds override only the object-model hooks that differ
/// from ordinary objects.
pub enum ExoticObject {
    Ordinary,
    /// Elements live in the property map under `Index` keys
    Array {
        length: u32,
        length_writable: bool,
    },
    Function(JsFunction),
    Error,
    /// Boolean, Number, String and Symbol wrapper objects
    Primitive(JsValue),
    Map(IndexMap<MapKey, JsValue>),
    Set(IndexMap<MapKey, ()>),
    WeakMap(WeakTable),
    WeakSet(WeakTable),
    Generator(Rc<RefCell<Coroutine>>),
    Promise(Rc<RefCell<PromiseState>>),
    Proxy(ProxyData),
}

/// An object record
pub struct JsObject {
    /// Class tag used by `Object.prototype.toString` and debugging
    pub class: &'static str,
    pub prototype: Option<JsObjectRef>,
    pub extensible: bool,
    pub properties: PropertyMap,
    pub exotic: ExoticObject,
}

impl JsObject {
    pub fn new(class: &'static str, prototype: Option<JsObjectRef>, exotic: ExoticObject) -> Self {
        Self {
            class,
            prototype,
            extensible: true,
            properties: PropertyMap::new(),
            exotic,
        }
    }

    pub fn ordinary(prototype: Option<JsObjectRef>) -> Self {
        Self::new("Object", prototype, ExoticObject::Ordinary)
    }

    pub fn is_callable(&self) -> bool {
        match &self.exotic {
            ExoticObject::Function(_) => true,
            ExoticObject::Proxy(proxy) => proxy.callable,
            _ => false,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self.exotic, ExoticObject::Array { .. })
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self.exotic, ExoticObject::Proxy(_))
    }

    /// Own property straight from storage, without exotic hooks
    #[inline]
    pub fn get_own_property(&self, key: &PropertyKey) -> Option<&Property> {
        self.properties.get(key)
    }

    /// Store a plain data property, replacing any existing entry
    pub fn set_property(&mut self, key: impl Into<PropertyKey>, value: JsValue) {
        self.properties.insert(key.into(), Property::Plain(value));
    }

    /// Store a property exactly as given
    pub fn define_property(&mut self, key: impl Into<PropertyKey>, property: Property) {
        self.properties.insert(key.into(), property);
    }

    /// Drop every outgoing reference. Used on engine teardown to break
    /// reference cycles.
    pub(crate) fn clear_references(&mut self) -> ExoticObject {
        self.prototype = None;
        self.properties.clear();
        std::mem::replace(&mut self.exotic, ExoticObject::Ordinary)
    }
}
