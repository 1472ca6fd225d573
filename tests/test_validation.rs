use propulse::core::bounds::PhysicalBounds;
use propulse::core::domain::RawParameters;
use propulse::core::error::ValidationError;
use propulse::core::validation::{raw_from_json, Validator};
use serde_json::json;

use crate::common::scenario_params;

mod common;

#[test]
fn test_accepts_reference_submission() {
    let p = Validator::default().validate(&scenario_params()).expect("valid");
    assert_eq!(p.o_f_ratio(), 3.5);
    assert_eq!(p.pressure(), 5.0);
    assert_eq!(p.temp(), 3000.0);
    assert_eq!(p.isp(), 300.0);
    assert_eq!(p.alpha(), 0.5);
    assert_eq!(p.max_temp(), 4000.0);
    assert_eq!(p.to_raw(), scenario_params());
}

#[test]
fn test_negative_pressure_names_the_field() {
    let raw = RawParameters {
        pressure: Some(-1.0),
        ..scenario_params()
    };
    match Validator::default().validate(&raw) {
        Err(ValidationError::OutOfRange { field, value, bound }) => {
            assert_eq!(field, "pressure");
            assert_eq!(value, -1.0);
            assert_eq!(bound, "(0, 50]");
        }
        other => panic!("expected OutOfRange, got {:?}", other),
    }
}

#[test]
fn test_every_missing_field_is_reported() {
    let v = Validator::default();
    let cases: [(&'static str, fn(&mut RawParameters)); 6] = [
        ("O_F_ratio", |r| r.o_f_ratio = None),
        ("pressure", |r| r.pressure = None),
        ("temp", |r| r.temp = None),
        ("isp", |r| r.isp = None),
        ("alpha", |r| r.alpha = None),
        ("max_temp", |r| r.max_temp = None),
    ];
    for (name, strip) in cases {
        let mut raw = scenario_params();
        strip(&mut raw);
        let err = v.validate(&raw).unwrap_err();
        assert_eq!(err, ValidationError::Missing { field: name });
        assert_eq!(err.field(), name);
    }
}

#[test]
fn test_non_finite_values_rejected() {
    let v = Validator::default();
    for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let raw = RawParameters {
            isp: Some(bad),
            ..scenario_params()
        };
        assert!(matches!(
            v.validate(&raw),
            Err(ValidationError::NotFinite { field: "isp", .. })
        ));
    }
}

#[test]
fn test_alpha_outside_unit_interval() {
    let v = Validator::default();
    for alpha in [-0.01, 1.01] {
        let raw = RawParameters {
            alpha: Some(alpha),
            ..scenario_params()
        };
        assert!(matches!(
            v.validate(&raw),
            Err(ValidationError::OutOfRange { field: "alpha", .. })
        ));
    }
    for alpha in [0.0, 1.0] {
        let raw = RawParameters {
            alpha: Some(alpha),
            ..scenario_params()
        };
        assert!(v.validate(&raw).is_ok(), "alpha {} is a closed endpoint", alpha);
    }
}

#[test]
fn test_zero_is_outside_open_lower_bounds() {
    let v = Validator::default();
    let raw = RawParameters {
        o_f_ratio: Some(0.0),
        ..scenario_params()
    };
    assert!(matches!(
        v.validate(&raw),
        Err(ValidationError::OutOfRange { field: "O_F_ratio", .. })
    ));
}

#[test]
fn test_ceiling_must_exceed_reference_temperature() {
    let v = Validator::default();
    for max_temp in [3000.0, 2500.0] {
        let raw = RawParameters {
            max_temp: Some(max_temp),
            ..scenario_params()
        };
        assert_eq!(
            v.validate(&raw),
            Err(ValidationError::CeilingBelowReference { temp: 3000.0, max_temp })
        );
    }
}

#[test]
fn test_custom_bounds_are_honoured() {
    let mut bounds = PhysicalBounds::default();
    bounds.pressure.max = 4.0;
    let v = Validator::new(bounds);
    assert!(matches!(
        v.validate(&scenario_params()),
        Err(ValidationError::OutOfRange { field: "pressure", .. })
    ));
}

#[test]
fn test_json_distinguishes_missing_from_non_numeric() {
    let missing = json!({"O_F_ratio": 3.5, "pressure": 5.0, "temp": 3000.0, "isp": 300.0, "alpha": 0.5});
    assert_eq!(
        raw_from_json(&missing),
        Err(ValidationError::Missing { field: "max_temp" })
    );

    let null = json!({"O_F_ratio": null, "pressure": 5.0, "temp": 3000.0, "isp": 300.0, "alpha": 0.5, "max_temp": 4000.0});
    assert_eq!(raw_from_json(&null), Err(ValidationError::Missing { field: "O_F_ratio" }));

    let text = json!({"O_F_ratio": 3.5, "pressure": "high", "temp": 3000.0, "isp": 300.0, "alpha": 0.5, "max_temp": 4000.0});
    assert_eq!(raw_from_json(&text), Err(ValidationError::NotNumeric { field: "pressure" }));
}

#[test]
fn test_json_submission_validates() {
    let body = json!({"O_F_ratio": 3.5, "pressure": 5, "temp": 3000, "isp": 300, "alpha": 0.5, "max_temp": 4000});
    let p = Validator::default().validate_json(&body).expect("valid");
    assert_eq!(p.pressure(), 5.0);
    assert_eq!(p.max_temp(), 4000.0);
}

#[test]
fn test_raw_parameters_deserialize_from_request_names() {
    let raw: RawParameters = serde_json::from_str(
        r#"{"O_F_ratio": 3.5, "pressure": 5.0, "temp": 3000.0, "isp": 300.0, "alpha": 0.5}"#,
    )
    .unwrap();
    assert_eq!(raw.o_f_ratio, Some(3.5));
    assert_eq!(raw.max_temp, None);
    assert_eq!(
        Validator::default().validate(&raw),
        Err(ValidationError::Missing { field: "max_temp" })
    );
}
