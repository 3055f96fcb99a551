//! Property entries and descriptor reconciliation

use crate::object::JsObjectRef;
use crate::value::JsValue;

/// A stored property
#[derive(Debug, Clone)]
pub enum Property {
    /// Writable, enumerable, configurable data: the common case
    Plain(JsValue),
    Data {
        value: JsValue,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    },
    Accessor {
        getter: Option<JsObjectRef>,
        setter: Option<JsObjectRef>,
        enumerable: bool,
        configurable: bool,
    },
}

impl Property {
    pub fn data(value: JsValue) -> Self {
        Property::Plain(value)
    }

    /// Create a data property with custom attributes
    pub fn with_attributes(value: JsValue, writable: bool, enumerable: bool, configurable: bool) -> Self {
        if writable && enumerable && configurable {
            Property::Plain(value)
        } else {
            Property::Data {
                value,
                writable,
                enumerable,
                configurable,
            }
        }
    }

    /// Writable and configurable but not enumerable, as used for methods
    pub fn hidden(value: JsValue) -> Self {
        Property::with_attributes(value, true, false, true)
    }

    pub fn accessor(
        getter: Option<JsObjectRef>,
        setter: Option<JsObjectRef>,
        enumerable: bool,
        configurable: bool,
    ) -> Self {
        Property::Accessor {
            getter,
            setter,
            enumerable,
            configurable,
        }
    }

    pub fn is_accessor(&self) -> bool {
        matches!(self, Property::Accessor { .. })
    }

    pub fn enumerable(&self) -> bool {
        match self {
            Property::Plain(_) => true,
            Property::Data { enumerable, .. } | Property::Accessor { enumerable, .. } => *enumerable,
        }
    }

    pub fn configurable(&self) -> bool {
        match self {
            Property::Plain(_) => true,
            Property::Data { configurable, .. } | Property::Accessor { configurable, .. } => *configurable,
        }
    }

    /// False for accessors
    pub fn writable(&self) -> bool {
        match self {
            Property::Plain(_) => true,
            Property::Data { writable, .. } => *writable,
            Property::Accessor { .. } => false,
        }
    }

    pub fn value(&self) -> Option<&JsValue> {
        match self {
            Property::Plain(value) | Property::Data { value, .. } => Some(value),
            Property::Accessor { .. } => None,
        }
    }

    /// Fully populated descriptor for this property
    pub fn to_descriptor(&self) -> PropertyDescriptor {
        match self {
            Property::Plain(_) | Property::Data { .. } => PropertyDescriptor {
                value: self.value().cloned(),
                writable: Some(self.writable()),
                get: None,
                set: None,
                enumerable: Some(self.enumerable()),
                configurable: Some(self.configurable()),
            },
            Property::Accessor {
                getter,
                setter,
                enumerable,
                configurable,
            } => PropertyDescriptor {
                value: None,
                writable: None,
                get: Some(getter.clone()),
                set: Some(setter.clone()),
                enumerable: Some(*enumerable),
                configurable: Some(*configurable),
            },
        }
    }
}

/// A partial property descriptor. `None` means "not supplied"; for the
/// accessor halves `Some(None)` is an explicit `undefined`.
#[derive(Debug, Clone, Default)]
pub struct PropertyDescriptor {
    pub value: Option<JsValue>,
    pub writable: Option<bool>,
    pub get: Option<Option<JsObjectRef>>,
    pub set: Option<Option<JsObjectRef>>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    /// `{ value }` alone
    pub fn value(value: JsValue) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }

    /// `{ value, writable, enumerable, configurable }`
    pub fn data(value: JsValue, writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: Some(value),
            writable: Some(writable),
            enumerable: Some(enumerable),
            configurable: Some(configurable),
            ..Default::default()
        }
    }

    /// `{ get, set, enumerable, configurable }`
    pub fn accessor(
        get: Option<JsObjectRef>,
        set: Option<JsObjectRef>,
        enumerable: bool,
        configurable: bool,
    ) -> Self {
        Self {
            get: Some(get),
            set: Some(set),
            enumerable: Some(enumerable),
            configurable: Some(configurable),
            ..Default::default()
        }
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = Some(writable);
        self
    }

    pub fn enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = Some(enumerable);
        self
    }

    pub fn configurable(mut self, configurable: bool) -> Self {
        self.configurable = Some(configurable);
        self
    }

    pub fn is_accessor_descriptor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    pub fn is_data_descriptor(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    pub fn is_generic_descriptor(&self) -> bool {
        !self.is_accessor_descriptor() && !self.is_data_descriptor()
    }

    /// Descriptor completion: fill every absent field with its default
    pub fn completed(&self) -> PropertyDescriptor {
        let mut out = self.clone();
        if self.is_accessor_descriptor() {
            out.get.get_or_insert(None);
            out.set.get_or_insert(None);
        } else {
            out.value.get_or_insert(JsValue::Undefined);
            out.writable.get_or_insert(false);
        }
        out.enumerable.get_or_insert(false);
        out.configurable.get_or_insert(false);
        out
    }
}

/// Why a `defineOwn` was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineError {
    NotExtensible,
    NotConfigurable,
}

fn same_function(a: &Option<JsObjectRef>, b: &Option<JsObjectRef>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.ptr_eq(b),
        _ => false,
    }
}

/// Reconcile `desc` against the current property (if any) and produce the
/// property to store.
pub fn validate_and_apply(
    current: Option<&Property>,
    extensible: bool,
    desc: &PropertyDescriptor,
) -> Result<Property, DefineError> {
    let Some(current) = current else {
        if !extensible {
            return Err(DefineError::NotExtensible);
        }
        let enumerable = desc.enumerable.unwrap_or(false);
        let configurable = desc.configurable.unwrap_or(false);
        if desc.is_accessor_descriptor() {
            return Ok(Property::accessor(
                desc.get.clone().flatten(),
                desc.set.clone().flatten(),
                enumerable,
                configurable,
            ));
        }
        return Ok(Property::with_attributes(
            desc.value.clone().unwrap_or_default(),
            desc.writable.unwrap_or(false),
            enumerable,
            configurable,
        ));
    };

    if !current.configurable() {
        if desc.configurable == Some(true) {
            return Err(DefineError::NotConfigurable);
        }
        if desc.enumerable.is_some_and(|e| e != current.enumerable()) {
            return Err(DefineError::NotConfigurable);
        }
    }

    let enumerable = desc.enumerable.unwrap_or(current.enumerable());
    let configurable = desc.configurable.unwrap_or(current.configurable());

    if desc.is_generic_descriptor() {
        return Ok(match current {
            Property::Plain(value) | Property::Data { value, .. } => {
                Property::with_attributes(value.clone(), current.writable(), enumerable, configurable)
            }
            Property::Accessor { getter, setter, .. } => {
                Property::accessor(getter.clone(), setter.clone(), enumerable, configurable)
            }
        });
    }

    match current {
        Property::Plain(value) | Property::Data { value, .. } => {
            if desc.is_accessor_descriptor() {
                if !current.configurable() {
                    return Err(DefineError::NotConfigurable);
                }
                return Ok(Property::accessor(
                    desc.get.clone().flatten(),
                    desc.set.clone().flatten(),
                    enumerable,
                    configurable,
                ));
            }
            if !current.configurable() && !current.writable() {
                if desc.writable == Some(true) {
                    return Err(DefineError::NotConfigurable);
                }
                if let Some(new_value) = &desc.value
                    && !new_value.same_value(value)
                {
                    return Err(DefineError::NotConfigurable);
                }
            }
            Ok(Property::with_attributes(
                desc.value.clone().unwrap_or_else(|| value.clone()),
                desc.writable.unwrap_or(current.writable()),
                enumerable,
                configurable,
            ))
        }
        Property::Accessor { getter, setter, .. } => {
            if desc.is_data_descriptor() {
                if !current.configurable() {
                    return Err(DefineError::NotConfigurable);
                }
                return Ok(Property::with_attributes(
                    desc.value.clone().unwrap_or_default(),
                    desc.writable.unwrap_or(false),
                    enumerable,
                    configurable,
                ));
            }
            if !current.configurable() {
                if let Some(get) = &desc.get
                    && !same_function(get, getter)
                {
                    return Err(DefineError::NotConfigurable);
                }
                if let Some(set) = &desc.set
                    && !same_function(set, setter)
                {
                    return Err(DefineError::NotConfigurable);
                }
            }
            Ok(Property::accessor(
                desc.get.clone().unwrap_or_else(|| getter.clone()),
                desc.set.clone().unwrap_or_else(|| setter.clone()),
                enumerable,
                configurable,
            ))
        }
    }
}
