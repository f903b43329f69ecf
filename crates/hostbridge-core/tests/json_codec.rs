//! Parser, writer, and type-directed codec coverage.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use hostbridge_core::json::{
    parse, write, FromJson, JsonError, ObjectReader, ObjectWriter, ToJson, Value,
};
use hostbridge_core::json_enum;

#[test]
fn scalars_parse() {
    assert_eq!(parse("null").unwrap(), Value::Null);
    assert_eq!(parse("true").unwrap(), Value::Bool(true));
    assert_eq!(parse("false").unwrap(), Value::Bool(false));
    assert_eq!(parse("42").unwrap(), Value::Number(42.0));
    assert_eq!(parse("-3.25e2").unwrap(), Value::Number(-325.0));
    assert_eq!(parse("\"hi\"").unwrap(), Value::String("hi".into()));
}

#[test]
fn nested_structures_parse() {
    let v = parse(r#"{"a": [1, {"b": null}, "c"], "d": {"e": true}}"#).unwrap();
    assert_eq!(v.kind(), "object");
    let a = v.get("a").unwrap();
    match a {
        Value::Array(items) => {
            assert_eq!(items.len(), 3);
            assert!(items[1].get("b").unwrap().is_null());
        }
        other => panic!("expected array, got {}", other.kind()),
    }
    assert_eq!(v.get("d").unwrap().get("e"), Some(&Value::Bool(true)));
}

#[test]
fn string_escapes_parse() {
    let v = parse(r#""a\"b\\c\/d\b\f\n\r\t""#).unwrap();
    assert_eq!(v.as_str(), Some("a\"b\\c/d\u{8}\u{c}\n\r\t"));

    // BMP escape and an astral surrogate pair.
    let snowman_and_smiley = "\"\\u2603 \\ud83d\\ude00\"";
    let v = parse(snowman_and_smiley).unwrap();
    assert_eq!(v.as_str(), Some("\u{2603} \u{1F600}"));
}

#[test]
fn multibyte_utf8_passes_through() {
    let v = parse("\"caf\u{e9} \u{1F680}\"").unwrap();
    assert_eq!(v.as_str(), Some("caf\u{e9} \u{1F680}"));
}

#[test]
fn malformed_input_reports_offset() {
    for text in ["", "{", "[1,", "{\"a\" 1}", "tru", "\"unterminated", "01x"] {
        match parse(text) {
            Err(JsonError::Syntax { .. }) => {}
            other => panic!("{text:?} should be a syntax error, got {other:?}"),
        }
    }
}

#[test]
fn trailing_characters_are_rejected() {
    assert!(matches!(parse("42 garbage"), Err(JsonError::Syntax { .. })));
    assert!(matches!(parse("{} {}"), Err(JsonError::Syntax { .. })));
}

#[test]
fn writer_emits_compact_json() {
    let v = parse(r#"{ "a" : [ 1 , 2 ] , "b" : "x" }"#).unwrap();
    assert_eq!(write(&v), r#"{"a":[1,2],"b":"x"}"#);
}

#[test]
fn writer_escapes_control_characters() {
    let v = Value::String("a\"b\\c\n\r\t\u{8}\u{c}\u{1}".into());
    assert_eq!(write(&v), r#""a\"b\\c\n\r\t\b\f\u0001""#);
    // Everything the writer emits must parse back to the same token.
    assert_eq!(parse(&write(&v)).unwrap(), v);
}

#[test]
fn writer_output_agrees_with_serde_json() {
    let text = r#"{"id":"x","n":[1,2.5,-3],"flags":{"on":true,"off":false},"note":null}"#;
    let ours = write(&parse(text).unwrap());
    let theirs: serde_json::Value = serde_json::from_str(&ours).unwrap();
    let reference: serde_json::Value = serde_json::from_str(text).unwrap();
    assert_eq!(theirs, reference);
}

#[test]
fn non_finite_numbers_write_as_null() {
    assert_eq!(write(&Value::Number(f64::NAN)), "null");
    assert_eq!(write(&Value::Number(f64::INFINITY)), "null");
}

#[test]
fn integer_narrowing_truncates_and_range_checks() {
    assert_eq!(u8::from_json(&Value::Number(200.9)).unwrap(), 200);
    assert_eq!(i32::from_json(&Value::Number(-7.5)).unwrap(), -7);

    let err = u8::from_json(&Value::Number(300.0)).unwrap_err();
    assert!(matches!(err, JsonError::TypeMismatch { .. }));
    let err = i16::from_json(&Value::Number(f64::NAN)).unwrap_err();
    assert!(matches!(err, JsonError::TypeMismatch { .. }));
    let err = u32::from_json(&Value::String("9".into())).unwrap_err();
    assert!(matches!(err, JsonError::TypeMismatch { .. }));
}

#[test]
fn narrowing_is_exact_at_the_64_bit_boundary() {
    // u64::MAX as f64 rounds up to 2^64; 2^64 itself must still fail
    // instead of saturating to MAX.
    let two_pow_64 = 18446744073709551616.0_f64;
    let err = u64::from_json(&Value::Number(two_pow_64)).unwrap_err();
    assert!(matches!(err, JsonError::TypeMismatch { .. }));

    let two_pow_63 = 9223372036854775808.0_f64;
    let err = i64::from_json(&Value::Number(two_pow_63)).unwrap_err();
    assert!(matches!(err, JsonError::TypeMismatch { .. }));

    // The largest f64 below 2^64 and the exact lower bounds stay accepted.
    let below = two_pow_64 - 2048.0;
    assert_eq!(u64::from_json(&Value::Number(below)).unwrap(), below as u64);
    assert_eq!(
        i64::from_json(&Value::Number(-two_pow_63)).unwrap(),
        i64::MIN
    );
    assert_eq!(u8::from_json(&Value::Number(255.0)).unwrap(), u8::MAX);
    assert_eq!(i8::from_json(&Value::Number(-128.0)).unwrap(), i8::MIN);
}

#[derive(Debug, PartialEq)]
enum Mode {
    Idle,
    Running,
    Stopped,
}

json_enum!(Mode { Idle, Running, Stopped });

#[test]
fn enum_members_decode_case_insensitively() {
    assert_eq!(Mode::from_json(&Value::String("Running".into())).unwrap(), Mode::Running);
    assert_eq!(Mode::from_json(&Value::String("running".into())).unwrap(), Mode::Running);
    assert_eq!(Mode::from_json(&Value::String("STOPPED".into())).unwrap(), Mode::Stopped);
    assert_eq!(Mode::Idle.to_json(), Value::String("Idle".into()));

    let err = Mode::from_json(&Value::String("Paused".into())).unwrap_err();
    assert!(matches!(err, JsonError::TypeMismatch { .. }));
}

#[derive(Debug, PartialEq)]
struct Probe {
    name: String,
    retries: u32,
    label: Option<String>,
    mode: Mode,
}

impl ToJson for Probe {
    fn to_json(&self) -> Value {
        let mut w = ObjectWriter::new();
        w.field("name", &self.name);
        w.field("retries", &self.retries);
        w.optional("label", &self.label);
        w.field("mode", &self.mode);
        w.finish()
    }
}

impl FromJson for Probe {
    fn from_json(value: &Value) -> Result<Self, JsonError> {
        let r = ObjectReader::new(value)?;
        Ok(Probe {
            name: r.field("name")?,
            retries: r.field("retries")?,
            label: r.optional("label")?,
            mode: r
                .optional("mode")?
                .unwrap_or(Mode::Idle),
        })
    }
}

#[test]
fn struct_round_trip() {
    let probe = Probe {
        name: "alpha".into(),
        retries: 3,
        label: Some("first".into()),
        mode: Mode::Running,
    };
    let text = write(&probe.to_json());
    let back = Probe::from_json(&parse(&text).unwrap()).unwrap();
    assert_eq!(back, probe);
}

#[test]
fn absent_optional_fields_are_omitted_on_write() {
    let probe = Probe {
        name: "beta".into(),
        retries: 0,
        label: None,
        mode: Mode::Idle,
    };
    let text = write(&probe.to_json());
    assert!(!text.contains("label"));
}

#[test]
fn reads_tolerate_missing_and_unknown_fields() {
    let v = parse(r#"{"name":"gamma","unknown":123}"#).unwrap();
    let probe = Probe::from_json(&v).unwrap();
    assert_eq!(probe.name, "gamma");
    assert_eq!(probe.retries, 0);
    assert_eq!(probe.label, None);
    assert_eq!(probe.mode, Mode::Idle);
}

#[test]
fn explicit_null_reads_as_none() {
    let v = parse(r#"{"name":"delta","label":null}"#).unwrap();
    let probe = Probe::from_json(&v).unwrap();
    assert_eq!(probe.label, None);
}

#[test]
fn wrong_field_type_fails_instead_of_coercing() {
    let v = parse(r#"{"name":7}"#).unwrap();
    assert!(matches!(
        Probe::from_json(&v),
        Err(JsonError::TypeMismatch { .. })
    ));
}

#[test]
fn object_reader_requires_an_object() {
    let err = ObjectReader::new(&Value::Array(vec![])).unwrap_err();
    assert!(matches!(err, JsonError::TypeMismatch { expected: "object", .. }));
}

#[test]
fn vec_and_option_codecs() {
    let v = parse("[1,2,3]").unwrap();
    assert_eq!(Vec::<u8>::from_json(&v).unwrap(), vec![1, 2, 3]);
    assert_eq!(Option::<u8>::from_json(&Value::Null).unwrap(), None);
    assert_eq!(Option::<u8>::from_json(&Value::Number(5.0)).unwrap(), Some(5));
    assert_eq!(
        write(&vec!["a".to_string(), "b".to_string()].to_json()),
        r#"["a","b"]"#
    );
}
