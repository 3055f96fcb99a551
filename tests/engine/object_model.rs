//! Property resolution, definition and the prototype graph

use ecmarun::interpreter::properties::IntegrityLevel;
use ecmarun::{CheapClone, Interpreter, JsError, JsObjectRef, JsSymbol, JsValue, PropertyDescriptor, PropertyKey};

fn key(s: &str) -> PropertyKey {
    PropertyKey::from(s)
}

fn child_of(interp: &mut Interpreter, proto: &JsObjectRef) -> JsObjectRef {
    interp.create_object_with_proto(Some(proto.cheap_clone()))
}

#[test]
fn test_inherited_read_only_property_rejects_assignment() {
    let mut interp = Interpreter::new();
    let proto = interp.create_object();
    interp
        .define_own_property(
            &proto,
            key("x"),
            &PropertyDescriptor::data(JsValue::Int(1), false, true, true),
            true,
        )
        .unwrap();
    let child = child_of(&mut interp, &proto);

    assert!(!interp.put(&child, key("x"), JsValue::Int(2), false).unwrap());
    let err = interp.put(&child, key("x"), JsValue::Int(2), true).unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
    assert!(!interp.has_own_property(&child, &key("x")).unwrap());
    assert_eq!(interp.get_property(&child, &key("x")).unwrap(), JsValue::Int(1));
}

#[test]
fn test_inherited_setter_runs_with_receiver() {
    let mut interp = Interpreter::new();
    let proto = interp.create_object();
    let setter = interp.create_native_function("set x", 1, |interp, this, args| {
        let target = this.as_object().cloned().ok_or_else(|| JsError::type_error("no receiver"))?;
        let value = args.first().cloned().unwrap_or_default();
        interp.put(&target, PropertyKey::from("seen"), value, true)?;
        Ok(JsValue::Undefined)
    });
    interp
        .define_own_property(
            &proto,
            key("x"),
            &PropertyDescriptor::accessor(None, Some(setter), true, true),
            true,
        )
        .unwrap();
    let child = child_of(&mut interp, &proto);

    assert!(interp.put(&child, key("x"), JsValue::Int(9), true).unwrap());
    assert!(!interp.has_own_property(&child, &key("x")).unwrap());
    assert_eq!(interp.get_property(&child, &key("seen")).unwrap(), JsValue::Int(9));
    assert!(!interp.has_own_property(&proto, &key("seen")).unwrap());
}

#[test]
fn test_getter_receives_original_receiver() {
    let mut interp = Interpreter::new();
    let proto = interp.create_object();
    let getter = interp.create_native_function("get who", 0, |interp, this, _| {
        let target = this.as_object().cloned().ok_or_else(|| JsError::type_error("no receiver"))?;
        interp.get_property(&target, &PropertyKey::from("name"))
    });
    interp
        .define_own_property(
            &proto,
            key("who"),
            &PropertyDescriptor::accessor(Some(getter), None, false, true),
            true,
        )
        .unwrap();
    let child = child_of(&mut interp, &proto);
    child.borrow_mut().set_property("name", JsValue::from("child"));
    assert_eq!(interp.get_property(&child, &key("who")).unwrap(), JsValue::from("child"));
}

#[test]
fn test_non_extensible_object_rejects_new_properties() {
    let mut interp = Interpreter::new();
    let obj = interp.create_object();
    obj.borrow_mut().set_property("a", JsValue::Int(1));
    assert!(interp.prevent_extensions(&obj).unwrap());

    assert!(!interp.put(&obj, key("b"), JsValue::Int(2), false).unwrap());
    assert!(interp.put(&obj, key("a"), JsValue::Int(3), false).unwrap());
    assert_eq!(interp.get_property(&obj, &key("a")).unwrap(), JsValue::Int(3));
    let err = interp
        .define_own_property(&obj, key("c"), &PropertyDescriptor::value(JsValue::Int(1)), true)
        .unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
}

#[test]
fn test_non_configurable_property_reconciliation() {
    let mut interp = Interpreter::new();
    let obj = interp.create_object();
    interp
        .define_own_property(
            &obj,
            key("k"),
            &PropertyDescriptor::data(JsValue::Int(1), true, false, false),
            true,
        )
        .unwrap();

    let reconfigure = PropertyDescriptor::default().configurable(true);
    assert!(!interp.define_own_property(&obj, key("k"), &reconfigure, false).unwrap());
    let enumerate = PropertyDescriptor::default().enumerable(true);
    assert!(!interp.define_own_property(&obj, key("k"), &enumerate, false).unwrap());

    // writable -> non-writable is allowed, and afterwards the value is fixed
    let lock = PropertyDescriptor::default().writable(false);
    assert!(interp.define_own_property(&obj, key("k"), &lock, false).unwrap());
    let change = PropertyDescriptor::value(JsValue::Int(2));
    assert!(!interp.define_own_property(&obj, key("k"), &change, false).unwrap());
    let same = PropertyDescriptor::value(JsValue::Int(1));
    assert!(interp.define_own_property(&obj, key("k"), &same, false).unwrap());

    let getter = interp.create_native_function("get", 0, |_, _, _| Ok(JsValue::Undefined));
    let to_accessor = PropertyDescriptor::accessor(Some(getter), None, false, false);
    let err = interp
        .define_own_property(&obj, key("k"), &to_accessor, true)
        .unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
}

#[test]
fn test_fully_permissive_descriptor_collapses_to_plain_value() {
    let mut interp = Interpreter::new();
    let obj = interp.create_object();
    interp
        .define_own_property(
            &obj,
            key("p"),
            &PropertyDescriptor::data(JsValue::Int(1), true, true, true),
            true,
        )
        .unwrap();
    let stored = obj.borrow().get_own_property(&key("p")).cloned();
    assert!(matches!(stored, Some(ecmarun::Property::Plain(_))));
}

#[test]
fn test_own_keys_order() {
    let mut interp = Interpreter::new();
    let obj = interp.create_object();
    let sym = JsSymbol::new(None);
    for name in ["b", "2", "a", "1"] {
        interp.put(&obj, key(name), JsValue::Int(0), true).unwrap();
    }
    interp
        .put(&obj, PropertyKey::from(sym.cheap_clone()), JsValue::Int(0), true)
        .unwrap();

    let keys = interp.own_keys(&obj, true).unwrap();
    let names: Vec<String> = keys.iter().take(4).map(|k| k.to_string()).collect();
    assert_eq!(names, vec!["1", "2", "b", "a"]);
    assert!(matches!(keys.get(4), Some(PropertyKey::Symbol(s)) if *s == sym));
}

#[test]
fn test_enumerate_skips_shadowed_and_hidden_keys() {
    let mut interp = Interpreter::new();
    let proto = interp.create_object();
    proto.borrow_mut().set_property("a", JsValue::Int(1));
    proto.borrow_mut().set_property("b", JsValue::Int(2));
    interp
        .define_own_property(
            &proto,
            key("c"),
            &PropertyDescriptor::data(JsValue::Int(3), true, false, true),
            true,
        )
        .unwrap();
    let child = child_of(&mut interp, &proto);
    child.borrow_mut().set_property("a", JsValue::Int(10));

    let mut keys = Vec::new();
    let mut it = interp.enumerate(&child);
    while let Some(k) = it.next_key(&mut interp).unwrap() {
        keys.push(k.to_string());
    }
    assert_eq!(keys, vec!["a", "b"]);
    assert!(it.next_key(&mut interp).unwrap().is_none());
}

#[test]
fn test_prototype_cycle_is_rejected() {
    let mut interp = Interpreter::new();
    let a = interp.create_object();
    let b = child_of(&mut interp, &a);
    let c = child_of(&mut interp, &b);
    let err = interp.set_prototype_of(&a, Some(c.cheap_clone())).unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
    let err = interp.set_prototype_of(&a, Some(a.cheap_clone())).unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
    assert!(interp.set_prototype_of(&c, None).is_ok());
}

#[test]
fn test_freeze_and_seal() {
    let mut interp = Interpreter::new();
    let obj = interp.create_object();
    obj.borrow_mut().set_property("v", JsValue::Int(1));

    assert!(interp.set_integrity_level(&obj, IntegrityLevel::Sealed).unwrap());
    assert!(interp.test_integrity_level(&obj, IntegrityLevel::Sealed).unwrap());
    assert!(!interp.test_integrity_level(&obj, IntegrityLevel::Frozen).unwrap());
    assert!(interp.put(&obj, key("v"), JsValue::Int(2), false).unwrap());
    assert!(!interp.delete_property(&obj, &key("v"), false).unwrap());

    assert!(interp.set_integrity_level(&obj, IntegrityLevel::Frozen).unwrap());
    assert!(interp.test_integrity_level(&obj, IntegrityLevel::Frozen).unwrap());
    assert!(!interp.put(&obj, key("v"), JsValue::Int(3), false).unwrap());
    assert_eq!(interp.get_property(&obj, &key("v")).unwrap(), JsValue::Int(2));
}

#[test]
fn test_descriptor_objects() {
    let mut interp = Interpreter::new();
    let desc = PropertyDescriptor::value(JsValue::Int(5));
    let obj = interp.from_property_descriptor(Some(&desc));
    let obj_ref = obj.as_object().unwrap().cheap_clone();
    assert_eq!(
        interp.get_property(&obj_ref, &key("writable")).unwrap(),
        JsValue::Boolean(false)
    );
    let back = interp.to_property_descriptor(&obj).unwrap();
    assert_eq!(back.value, Some(JsValue::Int(5)));
    assert_eq!(back.configurable, Some(false));

    let mixed = interp.create_object();
    mixed.borrow_mut().set_property("value", JsValue::Int(1));
    mixed.borrow_mut().set_property("get", JsValue::Undefined);
    let err = interp.to_property_descriptor(&JsValue::Object(mixed)).unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));

    let bad_getter = interp.create_object();
    bad_getter.borrow_mut().set_property("get", JsValue::Int(1));
    let err = interp.to_property_descriptor(&JsValue::Object(bad_getter)).unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
}

#[test]
fn test_instanceof_walks_prototype_chain() {
    let mut interp = Interpreter::new();
    let ctor = interp.create_native_constructor("Point", 0, |_, _, _| Ok(JsValue::Undefined));
    let ctor = JsValue::Object(ctor);
    let instance = interp.construct(&ctor, &[]).unwrap();
    assert!(interp.instance_of(&instance, &ctor).unwrap());

    let plain = JsValue::Object(interp.create_object());
    assert!(!interp.instance_of(&plain, &ctor).unwrap());
    assert!(!interp.instance_of(&JsValue::Int(1), &ctor).unwrap());
    let err = interp.instance_of(&plain, &JsValue::Int(1)).unwrap_err();
    assert!(matches!(err, JsError::TypeError { .. }));
}

#[test]
fn test_string_wrapper_indices_are_read_only() {
    let mut interp = Interpreter::new();
    let wrapper = interp.to_object(&JsValue::from("hi")).unwrap();
    assert_eq!(interp.get_property(&wrapper, &key("1")).unwrap(), JsValue::from("i"));
    assert_eq!(interp.get_property(&wrapper, &key("length")).unwrap(), JsValue::Int(2));
    assert!(!interp.put(&wrapper, key("0"), JsValue::from("x"), false).unwrap());
    assert_eq!(interp.get_property(&wrapper, &key("0")).unwrap(), JsValue::from("h"));
}

#[test]
fn test_array_length_truncates() {
    let mut interp = Interpreter::new();
    let arr = interp.create_array(vec![JsValue::Int(1), JsValue::Int(2), JsValue::Int(3)]);
    interp.put(&arr, key("length"), JsValue::Int(1), true).unwrap();
    assert!(!interp.has_own_property(&arr, &key("1")).unwrap());
    interp.put(&arr, key("5"), JsValue::Int(6), true).unwrap();
    assert_eq!(interp.get_property(&arr, &key("length")).unwrap(), JsValue::Int(6));
    let err = interp.put(&arr, key("length"), JsValue::Float(1.5), true).unwrap_err();
    assert!(matches!(err, JsError::RangeError { .. }));
}
