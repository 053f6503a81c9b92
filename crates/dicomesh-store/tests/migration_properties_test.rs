//! Property tests for record migration

use dicomesh_core::models::AnnotationKind;
use dicomesh_store::migrate::{infer_kind, upgrade_annotation, DIRECTION_EPSILON};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn legacy_record() -> impl Strategy<Value = Map<String, Value>> {
    (
        proptest::option::of((-100.0f64..100.0, -100.0f64..100.0, -100.0f64..100.0)),
        proptest::option::of((-2.0f64..2.0, -2.0f64..2.0, -2.0f64..2.0)),
        proptest::option::of("[a-zA-Z ]{0,12}"),
        proptest::option::of(prop_oneof![
            Just("marker"),
            Just("Arrow"),
            Just("LABEL"),
            Just("sticky")
        ]),
        proptest::option::of(0.0f64..2_000_000_000.0),
    )
        .prop_map(|(point, direction, text, kind, timestamp)| {
            let mut record = Map::new();
            if let Some((x, y, z)) = point {
                record.insert("point".into(), json!({"x": x, "y": y, "z": z}));
            }
            if let Some((u, v, w)) = direction {
                record.insert("direction".into(), json!({"u": u, "v": v, "w": w}));
            }
            if let Some(text) = text {
                record.insert("text".into(), Value::String(text));
            }
            if let Some(kind) = kind {
                record.insert("kind".into(), Value::from(kind));
            }
            if let Some(ts) = timestamp {
                record.insert("timestamp".into(), Value::from(ts));
            }
            record
        })
}

proptest! {
    #[test]
    fn prop_upgrade_then_normalize_is_idempotent(record in legacy_record()) {
        let first = upgrade_annotation(Value::Object(record), "job-p", 0)
            .unwrap()
            .normalized("job-p");
        let reread = upgrade_annotation(serde_json::to_value(&first).unwrap(), "job-p", 0)
            .unwrap()
            .normalized("job-p");

        prop_assert_eq!(first.clone().normalized("job-p"), first.clone());
        prop_assert_eq!(reread, first);
    }

    #[test]
    fn prop_inference_is_deterministic(record in legacy_record()) {
        prop_assert_eq!(infer_kind(&record), infer_kind(&record.clone()));
    }

    #[test]
    fn prop_untagged_direction_means_arrow(
        (u, v, w) in (-2.0f64..2.0, -2.0f64..2.0, -2.0f64..2.0)
    ) {
        let record = json!({"direction": {"u": u, "v": v, "w": w}, "text": "t"});
        let Value::Object(record) = record else { unreachable!() };
        let expected = if u * u + v * v + w * w > DIRECTION_EPSILON {
            AnnotationKind::Arrow
        } else {
            AnnotationKind::Label
        };
        prop_assert_eq!(infer_kind(&record), expected);
    }
}
