//! The three equality tiers over every pair of representative primitives

use ecmarun::{Interpreter, JsSymbol, JsValue};

fn primitives() -> Vec<(&'static str, JsValue)> {
    let sym = JsSymbol::new(None);
    vec![
        ("undefined", JsValue::Undefined),
        ("null", JsValue::Null),
        ("true", JsValue::Boolean(true)),
        ("false", JsValue::Boolean(false)),
        ("0", JsValue::Int(0)),
        ("-0", JsValue::Float(-0.0)),
        ("1", JsValue::Int(1)),
        ("1.0", JsValue::Float(1.0)),
        ("1.5", JsValue::Float(1.5)),
        ("NaN", JsValue::Float(f64::NAN)),
        ("''", JsValue::from("")),
        ("'0'", JsValue::from("0")),
        ("'1'", JsValue::from("1")),
        ("'abc'", JsValue::from("abc")),
        ("sym", JsValue::Symbol(sym)),
    ]
}

fn is_nan(v: &JsValue) -> bool {
    matches!(v, JsValue::Float(f) if f.is_nan())
}

fn is_zero(v: &JsValue) -> bool {
    v.as_number() == Some(0.0)
}

#[test]
fn test_tiers_agree_across_cross_product() {
    let mut interp = Interpreter::new();
    let values = primitives();
    for (a_name, a) in &values {
        for (b_name, b) in &values {
            let strict = a.strict_equals(b);
            let same = a.same_value(b);
            let same_zero = a.same_value_zero(b);
            let loose = interp.loose_equals(a, b).unwrap();

            assert_eq!(strict, b.strict_equals(a), "strict symmetry {} {}", a_name, b_name);
            assert_eq!(loose, interp.loose_equals(b, a).unwrap(), "loose symmetry {} {}", a_name, b_name);
            if strict {
                assert!(loose, "strict implies loose: {} {}", a_name, b_name);
            }

            let both_nan = is_nan(a) && is_nan(b);
            let both_zero = is_zero(a) && is_zero(b);
            if both_nan {
                assert!(!strict && same && same_zero, "NaN tiers: {} {}", a_name, b_name);
            } else if both_zero {
                assert!(strict && same_zero, "zero tiers: {} {}", a_name, b_name);
                assert_eq!(same, a_name == b_name, "signed zero: {} {}", a_name, b_name);
            } else {
                assert_eq!(strict, same, "strict vs same-value: {} {}", a_name, b_name);
                assert_eq!(same, same_zero, "same-value vs zero: {} {}", a_name, b_name);
            }
        }
    }
}

#[test]
fn test_reflexivity() {
    for (name, v) in primitives() {
        assert!(v.same_value(&v), "{}", name);
        assert_eq!(v.strict_equals(&v), !is_nan(&v), "{}", name);
    }
}

#[test]
fn test_loose_equality_table() {
    let mut interp = Interpreter::new();
    let cases: [(JsValue, JsValue, bool); 12] = [
        (JsValue::Null, JsValue::Undefined, true),
        (JsValue::Null, JsValue::Int(0), false),
        (JsValue::Undefined, JsValue::Boolean(false), false),
        (JsValue::from(""), JsValue::Int(0), true),
        (JsValue::from("0"), JsValue::Boolean(false), true),
        (JsValue::from("1"), JsValue::Boolean(true), true),
        (JsValue::from("abc"), JsValue::Float(f64::NAN), false),
        (JsValue::Float(1.0), JsValue::Int(1), true),
        (JsValue::from("1.5"), JsValue::Float(1.5), true),
        (JsValue::from(""), JsValue::Boolean(false), true),
        (JsValue::from("abc"), JsValue::Boolean(true), false),
        (JsValue::Float(-0.0), JsValue::from("0"), true),
    ];
    for (a, b, expected) in cases {
        assert_eq!(interp.loose_equals(&a, &b).unwrap(), expected, "{:?} == {:?}", a, b);
    }
}

#[test]
fn test_int_and_float_encodings_are_one_number() {
    assert!(JsValue::Int(1).strict_equals(&JsValue::Float(1.0)));
    assert!(JsValue::Int(1).same_value(&JsValue::Float(1.0)));
    assert!(JsValue::number(3.0).strict_equals(&JsValue::Int(3)));
    assert!(!JsValue::number(-0.0).same_value(&JsValue::Int(0)));
}

#[test]
fn test_object_loose_equality_uses_to_primitive() {
    let mut interp = Interpreter::new();
    let obj = interp.create_object();
    interp.register_method(&obj, "valueOf", 0, |_, _, _| Ok(JsValue::Int(7)));
    let obj = JsValue::Object(obj);
    assert!(interp.loose_equals(&obj, &JsValue::from("7")).unwrap());
    assert!(!obj.strict_equals(&JsValue::Int(7)));
    assert!(obj.strict_equals(&obj.clone()));
}
