//! Values crossing the boundary.
//!
//! Tests cover:
//! - UTF-8 strings round-tripping through a native buffer unchanged
//! - byte (not character) lengths
//! - library-allocated strings freed by the library
//! - scalar boundaries through native pointers and through callbacks
//! - failures carrying a typed kind and the library's detail message
//! - caller-built string collections
//! - enumerations checked against their declared discriminants
//! - interface methods left to their defaults

use std::time::Duration;

use interop_runtime::Error;
use interop_testlib::{
    echo_disjoint, echo_one_to_six, get_duration_value, get_u32_value, next_one_to_six, special_number,
    string_length, version, CallbackSource, DefaultedInterface, EnumDisjoint, EnumOneToSix, PasswordError,
    PrimitivePointers, StringCollection, StringEcho,
};

const MIXED: &str = "Voil\u{e0}, \u{e7}a marche \u{e0} pr\u{e9}sent \u{65e5}\u{672c}";

#[test]
fn non_ascii_text_round_trips() {
    let echo = StringEcho::new().unwrap();
    assert_eq!(echo.echo(MIXED).unwrap(), MIXED);
    // the native buffer is reused between calls
    assert_eq!(echo.echo("short").unwrap(), "short");
    assert_eq!(echo.echo(MIXED).unwrap(), MIXED);
}

#[test]
fn length_is_measured_in_bytes() {
    assert_eq!(string_length(MIXED).unwrap() as usize, MIXED.len());
    assert_ne!(MIXED.len(), MIXED.chars().count());
    assert_eq!(string_length("\u{1f980}").unwrap(), 4);
}

#[test]
fn version_comes_from_the_library() {
    assert_eq!(version().unwrap(), env!("CARGO_PKG_VERSION"));
}

#[test]
fn scalars_keep_their_bits() {
    let p = PrimitivePointers::new().unwrap();
    assert_eq!(p.get_u8(u8::MAX).unwrap(), u8::MAX);
    assert_eq!(p.get_i16(i16::MIN).unwrap(), i16::MIN);
    assert_eq!(p.get_f32(-0.0).unwrap().to_bits(), (-0.0f32).to_bits());
    assert_eq!(p.get_f64(f64::MAX).unwrap(), f64::MAX);
    assert!(p.get_bool(true).unwrap());
}

#[test]
fn callback_echo_boundaries() {
    let source = CallbackSource::new().unwrap();
    source.set_interface(|v| v).unwrap();
    for v in [0, 1, u32::MAX / 2, u32::MAX] {
        assert_eq!(source.set_value(v).unwrap(), v);
    }
}

#[test]
fn special_number_success_and_failure() {
    assert_eq!(special_number("solarwinds123").unwrap(), 42);

    let err = special_number("letmein").unwrap_err();
    assert_eq!(err.native_kind::<PasswordError>(), Some(PasswordError::BadPassword));
    assert_eq!(err.native_detail(), Some("password rejected"));
    let Error::Native(native) = &err else {
        panic!("expected a native failure, got {err:?}");
    };
    assert_eq!(native.domain, "PasswordError");
}

#[test]
fn collection_carries_mixed_text() {
    let items = [MIXED, "", "plain"];
    let collection = StringCollection::new(items).unwrap();
    assert_eq!(collection.to_vec().unwrap(), items);
}

#[test]
fn enumerations_echo_and_reject_unknown_values() {
    assert_eq!(echo_disjoint(EnumDisjoint::Twenty).unwrap(), EnumDisjoint::Twenty);
    assert_eq!(echo_one_to_six(EnumOneToSix::One).unwrap(), EnumOneToSix::One);
    let err = next_one_to_six(EnumOneToSix::Six).unwrap_err();
    assert!(matches!(err, Error::ProtocolViolation(detail) if detail.contains("EnumOneToSix")));
}

struct Slow;

impl DefaultedInterface for Slow {
    fn get_duration(&mut self) -> Duration {
        Duration::from_millis(1_500)
    }
}

#[test]
fn defaulted_interface_mixes_defaults_and_overrides() {
    assert_eq!(get_u32_value(Slow).unwrap(), 42);
    assert_eq!(get_duration_value(Slow).unwrap(), Duration::from_millis(1_500));
}
