//! Proxy objects
//!
//! Every object-model hook of a proxy looks up the matching trap on its
//! handler. A missing trap forwards the operation to the target. Trap
//! results are checked against the target's non-configurable properties
//! so a handler cannot misreport them.

use crate::error::JsError;
use crate::object::{ExoticObject, JsObject, JsObjectRef, Property, PropertyDescriptor, ProxyData};
use crate::prelude::FxHashSet;
use crate::value::{CheapClone, JsValue, PropertyKey};

use super::Interpreter;

/// Target and handler of a live proxy, or a TypeError naming the trap when
/// the proxy was revoked
fn proxy_parts(obj: &JsObjectRef, trap: &str) -> Result<(JsObjectRef, JsObjectRef), JsError> {
    match &obj.borrow().exotic {
        ExoticObject::Proxy(ProxyData {
            target: Some(target),
            handler: Some(handler),
            ..
        }) => Ok((target.cheap_clone(), handler.cheap_clone())),
        ExoticObject::Proxy(_) => Err(JsError::type_error(format!(
            "Cannot perform '{}' on a proxy that has been revoked",
            trap
        ))),
        _ => Err(JsError::defect("proxy hook invoked on a non-proxy object")),
    }
}

fn key_value(key: &PropertyKey) -> JsValue {
    key.to_value()
}

impl Interpreter {
    /// `new Proxy(target, handler)`
    pub fn create_proxy(&mut self, target: &JsValue, handler: &JsValue) -> Result<JsObjectRef, JsError> {
        let (JsValue::Object(target), JsValue::Object(handler)) = (target, handler) else {
            return Err(JsError::type_error(
                "Cannot create proxy with a non-object as target or handler",
            ));
        };
        self.check_object_realm(target)?;
        self.check_object_realm(handler)?;
        let callable = target.is_callable();
        let constructor = target.is_constructor();
        let class = if callable { "Function" } else { "Object" };
        Ok(self.alloc(JsObject::new(
            class,
            None,
            ExoticObject::Proxy(ProxyData {
                target: Some(target.cheap_clone()),
                handler: Some(handler.cheap_clone()),
                callable,
                constructor,
            }),
        )))
    }

    /// Revoke a proxy; every later operation on it is a TypeError
    pub fn revoke_proxy(&mut self, proxy: &JsObjectRef) {
        if let ExoticObject::Proxy(data) = &mut proxy.borrow_mut().exotic {
            data.target = None;
            data.handler = None;
        }
    }

    /// `Proxy.revocable`: the proxy and a native function revoking it
    pub fn create_revocable_proxy(
        &mut self,
        target: &JsValue,
        handler: &JsValue,
    ) -> Result<(JsObjectRef, JsObjectRef), JsError> {
        let proxy = self.create_proxy(target, handler)?;
        let weak = proxy.downgrade();
        let revoke = self.create_native_function("", 0, move |interp, _this, _args| {
            if let Some(proxy) = weak.upgrade() {
                interp.revoke_proxy(&proxy);
            }
            Ok(JsValue::Undefined)
        });
        Ok((proxy, revoke))
    }

    fn trap(&mut self, handler: &JsObjectRef, name: &str) -> Result<Option<JsValue>, JsError> {
        let trap = self.get_property(handler, &PropertyKey::from(name))?;
        if trap.is_null_or_undefined() {
            return Ok(None);
        }
        if !trap.is_callable() {
            return Err(JsError::type_error(format!("proxy trap '{}' is not a function", name)));
        }
        Ok(Some(trap))
    }

    pub(crate) fn proxy_get_own_property(
        &mut self,
        obj: &JsObjectRef,
        key: &PropertyKey,
    ) -> Result<Option<Property>, JsError> {
        let (target, handler) = proxy_parts(obj, "getOwnPropertyDescriptor")?;
        let Some(trap) = self.trap(&handler, "getOwnPropertyDescriptor")? else {
            return self.get_own_property(&target, key);
        };
        let result = self.call(
            &trap,
            &JsValue::Object(handler),
            &[JsValue::Object(target.cheap_clone()), key_value(key)],
        )?;
        let target_prop = self.get_own_property(&target, key)?;
        match result {
            JsValue::Undefined => {
                if target_prop.as_ref().is_some_and(|p| !p.configurable()) {
                    return Err(JsError::type_error(format!(
                        "'getOwnPropertyDescriptor' on proxy: trap returned undefined for property '{}' which is non-configurable in the proxy target",
                        key
                    )));
                }
                Ok(None)
            }
            JsValue::Object(_) => {
                let desc = self.to_property_descriptor(&result)?.completed();
                if desc.configurable == Some(false) && target_prop.as_ref().is_none_or(Property::configurable) {
                    return Err(JsError::type_error(format!(
                        "'getOwnPropertyDescriptor' on proxy: trap reported non-configurability for property '{}' which is either non-existent or configurable in the proxy target",
                        key
                    )));
                }
                Ok(Some(match desc.get.clone().or(desc.set.clone()) {
                    Some(_) => Property::accessor(
                        desc.get.flatten(),
                        desc.set.flatten(),
                        desc.enumerable.unwrap_or(false),
                        desc.configurable.unwrap_or(false),
                    ),
                    None => Property::with_attributes(
                        desc.value.unwrap_or_default(),
                        desc.writable.unwrap_or(false),
                        desc.enumerable.unwrap_or(false),
                        desc.configurable.unwrap_or(false),
                    ),
                }))
            }
            _ => Err(JsError::type_error(
                "'getOwnPropertyDescriptor' on proxy: trap returned neither object nor undefined",
            )),
        }
    }

    pub(crate) fn proxy_get(&mut self, obj: &JsObjectRef, key: &PropertyKey, receiver: &JsValue) -> Result<JsValue, JsError> {
        let (target, handler) = proxy_parts(obj, "get")?;
        let Some(trap) = self.trap(&handler, "get")? else {
            return self.get(&target, key, receiver);
        };
        let value = self.call(
            &trap,
            &JsValue::Object(handler),
            &[JsValue::Object(target.cheap_clone()), key_value(key), receiver.clone()],
        )?;
        if let Some(prop) = self.get_own_property(&target, key)?
            && !prop.configurable()
        {
            let mismatch = match &prop {
                Property::Accessor { getter: None, .. } => !value.is_undefined(),
                Property::Accessor { .. } => false,
                data => !data.writable() && !data.value().is_some_and(|v| v.same_value(&value)),
            };
            if mismatch {
                return Err(JsError::type_error(format!(
                    "'get' on proxy: property '{}' is a read-only and non-configurable data property on the proxy target but the proxy did not return its actual value",
                    key
                )));
            }
        }
        Ok(value)
    }

    pub(crate) fn proxy_set(
        &mut self,
        obj: &JsObjectRef,
        key: &PropertyKey,
        value: JsValue,
        receiver: &JsValue,
    ) -> Result<bool, JsError> {
        let (target, handler) = proxy_parts(obj, "set")?;
        let Some(trap) = self.trap(&handler, "set")? else {
            return self.set(&target, key, value, receiver);
        };
        let ok = self
            .call(
                &trap,
                &JsValue::Object(handler),
                &[
                    JsValue::Object(target.cheap_clone()),
                    key_value(key),
                    value.clone(),
                    receiver.clone(),
                ],
            )?
            .to_boolean();
        if !ok {
            return Ok(false);
        }
        if let Some(prop) = self.get_own_property(&target, key)?
            && !prop.configurable()
        {
            let rejected = match &prop {
                Property::Accessor { setter: None, .. } => true,
                Property::Accessor { .. } => false,
                data => !data.writable() && !data.value().is_some_and(|v| v.same_value(&value)),
            };
            if rejected {
                return Err(JsError::type_error(format!(
                    "'set' on proxy: trap returned truish for property '{}' which exists in the proxy target as a non-configurable and non-writable data property with a different value",
                    key
                )));
            }
        }
        Ok(true)
    }

    pub(crate) fn proxy_has(&mut self, obj: &JsObjectRef, key: &PropertyKey) -> Result<bool, JsError> {
        let (target, handler) = proxy_parts(obj, "has")?;
        let Some(trap) = self.trap(&handler, "has")? else {
            return self.has_property(&target, key);
        };
        let found = self
            .call(
                &trap,
                &JsValue::Object(handler),
                &[JsValue::Object(target.cheap_clone()), key_value(key)],
            )?
            .to_boolean();
        if !found {
            if let Some(prop) = self.get_own_property(&target, key)? {
                if !prop.configurable() {
                    return Err(JsError::type_error(format!(
                        "'has' on proxy: trap returned falsish for property '{}' which exists in the proxy target as non-configurable",
                        key
                    )));
                }
                if !self.is_extensible(&target)? {
                    return Err(JsError::type_error(format!(
                        "'has' on proxy: trap returned falsish for property '{}' but the proxy target is not extensible",
                        key
                    )));
                }
            }
        }
        Ok(found)
    }

    pub(crate) fn proxy_delete(&mut self, obj: &JsObjectRef, key: &PropertyKey, throw: bool) -> Result<bool, JsError> {
        let (target, handler) = proxy_parts(obj, "deleteProperty")?;
        let Some(trap) = self.trap(&handler, "deleteProperty")? else {
            return self.delete_property(&target, key, throw);
        };
        let deleted = self
            .call(
                &trap,
                &JsValue::Object(handler),
                &[JsValue::Object(target.cheap_clone()), key_value(key)],
            )?
            .to_boolean();
        if !deleted {
            if throw {
                return Err(JsError::type_error(format!(
                    "'deleteProperty' on proxy: trap returned falsish for property '{}'",
                    key
                )));
            }
            return Ok(false);
        }
        if self.get_own_property(&target, key)?.is_some_and(|p| !p.configurable()) {
            return Err(JsError::type_error(format!(
                "'deleteProperty' on proxy: trap returned truish for property '{}' which is non-configurable in the proxy target",
                key
            )));
        }
        Ok(true)
    }

    pub(crate) fn proxy_define_own_property(
        &mut self,
        obj: &JsObjectRef,
        key: PropertyKey,
        desc: &PropertyDescriptor,
        throw: bool,
    ) -> Result<bool, JsError> {
        let (target, handler) = proxy_parts(obj, "defineProperty")?;
        let Some(trap) = self.trap(&handler, "defineProperty")? else {
            return self.define_own_property(&target, key, desc, throw);
        };
        let desc_obj = self.from_property_descriptor(Some(desc));
        let ok = self
            .call(
                &trap,
                &JsValue::Object(handler),
                &[JsValue::Object(target.cheap_clone()), key_value(&key), desc_obj],
            )?
            .to_boolean();
        if !ok {
            if throw {
                return Err(JsError::type_error(format!(
                    "'defineProperty' on proxy: trap returned falsish for property '{}'",
                    key
                )));
            }
            return Ok(false);
        }
        if desc.configurable == Some(false)
            && self.get_own_property(&target, &key)?.is_none_or(|p| p.configurable())
        {
            return Err(JsError::type_error(format!(
                "'defineProperty' on proxy: trap returned truish for defining non-configurable property '{}' which is either non-existent or configurable in the proxy target",
                key
            )));
        }
        Ok(true)
    }

    pub(crate) fn proxy_own_keys(&mut self, obj: &JsObjectRef) -> Result<Vec<PropertyKey>, JsError> {
        let (target, handler) = proxy_parts(obj, "ownKeys")?;
        let Some(trap) = self.trap(&handler, "ownKeys")? else {
            return self.own_keys(&target, true);
        };
        let result = self.call(&trap, &JsValue::Object(handler), &[JsValue::Object(target.cheap_clone())])?;
        let JsValue::Object(list) = result else {
            return Err(JsError::type_error("CreateListFromArrayLike called on non-object"));
        };
        let length = self.get_property(&list, &PropertyKey::from("length"))?;
        let length = crate::number::to_length(self.to_number(&length)?);

        let mut keys = Vec::new();
        let mut seen = FxHashSet::default();
        for i in 0..length {
            let index = u32::try_from(i).map_err(|_| JsError::range_error("Invalid array length"))?;
            let element = self.get_property(&list, &PropertyKey::from(index))?;
            let key = match &element {
                JsValue::String(_) | JsValue::Symbol(_) => self.to_property_key(&element)?,
                _ => {
                    return Err(JsError::type_error(format!(
                        "{:?} is not a valid property name",
                        element
                    )));
                }
            };
            if !seen.insert(key.clone()) {
                return Err(JsError::type_error(format!(
                    "'ownKeys' on proxy: trap returned duplicate entries ('{}')",
                    key
                )));
            }
            keys.push(key);
        }

        for key in self.own_keys(&target, true)? {
            if !seen.contains(&key)
                && self.get_own_property(&target, &key)?.is_some_and(|p| !p.configurable())
            {
                return Err(JsError::type_error(format!(
                    "'ownKeys' on proxy: trap result did not include '{}'",
                    key
                )));
            }
        }
        Ok(keys)
    }

    pub(crate) fn proxy_get_prototype_of(&mut self, obj: &JsObjectRef) -> Result<Option<JsObjectRef>, JsError> {
        let (target, handler) = proxy_parts(obj, "getPrototypeOf")?;
        let Some(trap) = self.trap(&handler, "getPrototypeOf")? else {
            return self.get_prototype_of(&target);
        };
        match self.call(&trap, &JsValue::Object(handler), &[JsValue::Object(target.cheap_clone())])? {
            JsValue::Object(proto) => Ok(Some(proto)),
            JsValue::Null => Ok(None),
            _ => Err(JsError::type_error(
                "'getPrototypeOf' on proxy: trap returned neither object nor null",
            )),
        }
    }

    pub(crate) fn proxy_set_prototype_of(&mut self, obj: &JsObjectRef, proto: Option<JsObjectRef>) -> Result<bool, JsError> {
        let (target, handler) = proxy_parts(obj, "setPrototypeOf")?;
        let Some(trap) = self.trap(&handler, "setPrototypeOf")? else {
            return match self.set_prototype_of(&target, proto) {
                Ok(()) => Ok(true),
                Err(JsError::TypeError { .. }) => Ok(false),
                Err(e) => Err(e),
            };
        };
        let proto_value = proto.map(JsValue::Object).unwrap_or(JsValue::Null);
        Ok(self
            .call(&trap, &JsValue::Object(handler), &[JsValue::Object(target), proto_value])?
            .to_boolean())
    }

    pub(crate) fn proxy_is_extensible(&mut self, obj: &JsObjectRef) -> Result<bool, JsError> {
        let (target, handler) = proxy_parts(obj, "isExtensible")?;
        let Some(trap) = self.trap(&handler, "isExtensible")? else {
            return self.is_extensible(&target);
        };
        let result = self
            .call(&trap, &JsValue::Object(handler), &[JsValue::Object(target.cheap_clone())])?
            .to_boolean();
        if result != self.is_extensible(&target)? {
            return Err(JsError::type_error(format!(
                "'isExtensible' on proxy: trap result does not reflect extensibility of proxy target (which is '{}')",
                !result
            )));
        }
        Ok(result)
    }

    pub(crate) fn proxy_prevent_extensions(&mut self, obj: &JsObjectRef) -> Result<bool, JsError> {
        let (target, handler) = proxy_parts(obj, "preventExtensions")?;
        let Some(trap) = self.trap(&handler, "preventExtensions")? else {
            return self.prevent_extensions(&target);
        };
        let result = self
            .call(&trap, &JsValue::Object(handler), &[JsValue::Object(target.cheap_clone())])?
            .to_boolean();
        if result && self.is_extensible(&target)? {
            return Err(JsError::type_error(
                "'preventExtensions' on proxy: trap returned truish but the proxy target is extensible",
            ));
        }
        Ok(result)
    }

    pub(crate) fn proxy_call(&mut self, obj: &JsObjectRef, this_value: &JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
        let (target, handler) = proxy_parts(obj, "apply")?;
        let Some(trap) = self.trap(&handler, "apply")? else {
            return self.call(&JsValue::Object(target), this_value, args);
        };
        let args_array = self.create_array(args.to_vec());
        self.call(
            &trap,
            &JsValue::Object(handler),
            &[JsValue::Object(target), this_value.clone(), JsValue::Object(args_array)],
        )
    }

    pub(crate) fn proxy_construct(&mut self, obj: &JsObjectRef, args: &[JsValue]) -> Result<JsValue, JsError> {
        let (target, handler) = proxy_parts(obj, "construct")?;
        let Some(trap) = self.trap(&handler, "construct")? else {
            return self.construct_value(&JsValue::Object(target), args);
        };
        let args_array = self.create_array(args.to_vec());
        let result = self.call(
            &trap,
            &JsValue::Object(handler),
            &[
                JsValue::Object(target),
                JsValue::Object(args_array),
                JsValue::Object(obj.cheap_clone()),
            ],
        )?;
        if !result.is_object() {
            return Err(JsError::type_error("proxy [[Construct]] must return an object"));
        }
        Ok(result)
    }
}
