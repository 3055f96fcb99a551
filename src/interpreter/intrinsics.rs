//! The intrinsic methods the core itself relies on
//!
//! Only what the object model and the execution engine need: the library
//! surface (Math, JSON, Date, ...) is registered by embedders through the
//! same `register_method` primitive.

use crate::error::JsError;
use crate::object::{ExoticObject, JsObjectRef, Property};
use crate::string::JsString;
use crate::value::{CheapClone, JsValue, PropertyKey, WellKnownSymbol};

use super::Interpreter;
use super::coroutine::ResumeAction;

pub(crate) fn init(interp: &mut Interpreter) {
    init_object_prototype(interp);
    init_function_prototype(interp);
    init_errors(interp);
    init_wrappers(interp);
    init_generator_prototype(interp);
    init_promise_prototype(interp);
    interp.init_collection_prototypes();
    init_globals(interp);
}

fn arg(args: &[JsValue], index: usize) -> JsValue {
    args.get(index).cloned().unwrap_or_default()
}

fn class_tag(value: &JsValue) -> &'static str {
    match value {
        JsValue::Undefined => "Undefined",
        JsValue::Null => "Null",
        JsValue::Boolean(_) => "Boolean",
        JsValue::Int(_) | JsValue::Float(_) => "Number",
        JsValue::String(_) => "String",
        JsValue::Symbol(_) => "Symbol",
        JsValue::Object(obj) => {
            let o = obj.borrow();
            match &o.exotic {
                ExoticObject::Array { .. } => "Array",
                ExoticObject::Function(_) => "Function",
                ExoticObject::Error => "Error",
                ExoticObject::Primitive(inner) => class_tag(inner),
                ExoticObject::Proxy(p) if p.callable => "Function",
                ExoticObject::Proxy(_) | ExoticObject::Ordinary => "Object",
                _ => o.class,
            }
        }
    }
}

fn init_object_prototype(interp: &mut Interpreter) {
    let proto = interp.object_prototype.cheap_clone();

    interp.register_method(&proto, "toString", 0, |interp, this, _| {
        let mut tag = class_tag(this).to_string();
        if let JsValue::Object(obj) = this {
            let sym = interp.well_known_symbol(WellKnownSymbol::ToStringTag);
            if let JsValue::String(custom) = interp.get_property(obj, &PropertyKey::from(sym))? {
                tag = custom.to_rust_string_lossy();
            }
        }
        Ok(JsValue::from(format!("[object {}]", tag)))
    });

    interp.register_method(&proto, "valueOf", 0, |interp, this, _| {
        Ok(JsValue::Object(interp.to_object(this)?))
    });

    interp.register_method(&proto, "hasOwnProperty", 1, |interp, this, args| {
        let key = interp.to_property_key(&arg(args, 0))?;
        let obj = interp.to_object(this)?;
        interp.has_own_property(&obj, &key).map(JsValue::Boolean)
    });
}

fn init_function_prototype(interp: &mut Interpreter) {
    let proto = interp.function_prototype.cheap_clone();
    interp.register_method(&proto, "call", 1, |interp, this, args| {
        let this_arg = arg(args, 0);
        interp.call(this, &this_arg, args.get(1..).unwrap_or_default())
    });
}

fn init_errors(interp: &mut Interpreter) {
    let prototypes = [
        ("Error", interp.error_prototype.cheap_clone()),
        ("TypeError", interp.type_error_prototype.cheap_clone()),
        ("RangeError", interp.range_error_prototype.cheap_clone()),
        ("ReferenceError", interp.reference_error_prototype.cheap_clone()),
        ("SyntaxError", interp.syntax_error_prototype.cheap_clone()),
        ("URIError", interp.uri_error_prototype.cheap_clone()),
    ];
    for (name, proto) in &prototypes {
        let mut p = proto.borrow_mut();
        p.define_property("name", Property::hidden(JsValue::from(*name)));
        p.define_property("message", Property::hidden(JsValue::from("")));
    }

    let error_proto = interp.error_prototype.cheap_clone();
    interp.register_method(&error_proto, "toString", 0, |interp, this, _| {
        let Some(obj) = this.as_object() else {
            return Err(JsError::type_error("Error.prototype.toString called on non-object"));
        };
        let name = match interp.get_property(obj, &PropertyKey::from("name"))? {
            JsValue::Undefined => JsString::from("Error"),
            other => interp.to_js_string(&other)?,
        };
        let message = match interp.get_property(obj, &PropertyKey::from("message"))? {
            JsValue::Undefined => JsString::empty(),
            other => interp.to_js_string(&other)?,
        };
        let text = match (name.is_empty(), message.is_empty()) {
            (_, true) => name.to_rust_string_lossy(),
            (true, false) => message.to_rust_string_lossy(),
            (false, false) => format!(
                "{}: {}",
                name.to_rust_string_lossy(),
                message.to_rust_string_lossy()
            ),
        };
        Ok(JsValue::from(text))
    });
}

/// The primitive behind `this`, for the wrapper prototypes' methods
fn this_primitive(this: &JsValue, type_name: &str) -> Result<JsValue, JsError> {
    let inner = match this {
        JsValue::Object(obj) => match &obj.borrow().exotic {
            ExoticObject::Primitive(inner) => inner.clone(),
            _ => JsValue::Undefined,
        },
        other => other.clone(),
    };
    if inner.type_of() != type_name {
        return Err(JsError::type_error(format!(
            "{}.prototype.valueOf requires that 'this' be a {}",
            type_name, type_name
        )));
    }
    Ok(inner)
}

fn init_wrappers(interp: &mut Interpreter) {
    let wrappers: [(&'static str, JsObjectRef); 4] = [
        ("boolean", interp.boolean_prototype.cheap_clone()),
        ("number", interp.number_prototype.cheap_clone()),
        ("string", interp.string_prototype.cheap_clone()),
        ("symbol", interp.symbol_prototype.cheap_clone()),
    ];
    for (type_name, proto) in wrappers {
        interp.register_method(&proto, "valueOf", 0, move |_, this, _| {
            this_primitive(this, type_name)
        });
        interp.register_method(&proto, "toString", 0, move |interp, this, _| {
            match this_primitive(this, type_name)? {
                JsValue::Symbol(sym) => Ok(JsValue::String(sym.descriptive_string())),
                inner => Ok(JsValue::String(interp.to_js_string(&inner)?)),
            }
        });
    }
}

fn init_generator_prototype(interp: &mut Interpreter) {
    let proto = interp.generator_prototype.cheap_clone();
    interp.register_method(&proto, "next", 1, |interp, this, args| {
        interp.generator_method(this, ResumeAction::Next, args)
    });
    interp.register_method(&proto, "return", 1, |interp, this, args| {
        interp.generator_method(this, ResumeAction::Return, args)
    });
    interp.register_method(&proto, "throw", 1, |interp, this, args| {
        interp.generator_method(this, ResumeAction::Throw, args)
    });

    let iterator = interp.well_known_symbol(WellKnownSymbol::Iterator);
    let identity = interp.create_native_function("[Symbol.iterator]", 0, |_, this, _| Ok(this.clone()));
    proto
        .borrow_mut()
        .define_property(iterator, Property::hidden(JsValue::Object(identity)));
    let tag = interp.well_known_symbol(WellKnownSymbol::ToStringTag);
    proto.borrow_mut().define_property(
        tag,
        Property::with_attributes(JsValue::from("Generator"), false, false, true),
    );
}

fn this_promise(this: &JsValue, method: &str) -> Result<JsObjectRef, JsError> {
    match this {
        JsValue::Object(obj) if matches!(obj.borrow().exotic, ExoticObject::Promise(_)) => {
            Ok(obj.cheap_clone())
        }
        _ => Err(JsError::type_error(format!(
            "Method Promise.prototype.{} called on incompatible receiver",
            method
        ))),
    }
}

fn init_promise_prototype(interp: &mut Interpreter) {
    let proto = interp.promise_prototype.cheap_clone();
    interp.register_method(&proto, "then", 2, |interp, this, args| {
        let promise = this_promise(this, "then")?;
        let derived = interp.promise_then(&promise, args.first().cloned(), args.get(1).cloned())?;
        Ok(JsValue::Object(derived))
    });
    interp.register_method(&proto, "catch", 1, |interp, this, args| {
        let promise = this_promise(this, "catch")?;
        let derived = interp.promise_then(&promise, None, args.first().cloned())?;
        Ok(JsValue::Object(derived))
    });
}

fn init_globals(interp: &mut Interpreter) {
    let global = interp.global.cheap_clone();
    global
        .borrow_mut()
        .define_property("globalThis", Property::hidden(JsValue::Object(global.cheap_clone())));

    let proxy_ctor = interp.create_native_constructor("Proxy", 2, |interp, _this, args| {
        let proxy = interp.create_proxy(&arg(args, 0), &arg(args, 1))?;
        Ok(JsValue::Object(proxy))
    });
    interp.register_method(&proxy_ctor, "revocable", 2, |interp, _this, args| {
        let (proxy, revoke) = interp.create_revocable_proxy(&arg(args, 0), &arg(args, 1))?;
        let result = interp.create_object();
        {
            let mut r = result.borrow_mut();
            r.set_property("proxy", JsValue::Object(proxy));
            r.set_property("revoke", JsValue::Object(revoke));
        }
        Ok(JsValue::Object(result))
    });
    global
        .borrow_mut()
        .define_property("Proxy", Property::hidden(JsValue::Object(proxy_ctor)));
}
