//! Schema migration for annotation and snapshot records
//!
//! Records are read as loose JSON objects, classified by the layout they were
//! written in and brought forward to the current layout before typed
//! deserialization. Steady-state normalization ([`Annotation::normalized`])
//! runs afterwards and never has to know about older layouts.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use dicomesh_core::models::{timestamp_from_epoch, Annotation, AnnotationKind, Snapshot};

/// Direction magnitudes (squared) at or below this carry no direction
pub const DIRECTION_EPSILON: f64 = 1e-6;

type Record = Map<String, Value>;

/// Generations of the on-disk annotation layout, oldest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnnotationSchema {
    /// Written before the `kind` tag existed, or with a tag we do not know
    Untagged,
    /// Carries a recognized `kind` tag
    Tagged,
}

impl AnnotationSchema {
    pub const CURRENT: AnnotationSchema = AnnotationSchema::Tagged;

    pub fn detect(record: &Record) -> Self {
        if explicit_kind(record).is_some() {
            AnnotationSchema::Tagged
        } else {
            AnnotationSchema::Untagged
        }
    }
}

fn explicit_kind(record: &Record) -> Option<AnnotationKind> {
    record
        .get("kind")
        .and_then(Value::as_str)
        .and_then(|kind| kind.parse().ok())
}

/// Kind of a raw record.
///
/// A recognized explicit tag wins. Otherwise a non-zero direction means an
/// arrow, text without a point means a label, and anything else is a marker.
/// The result depends only on the record's content.
pub fn infer_kind(record: &Record) -> AnnotationKind {
    if let Some(kind) = explicit_kind(record) {
        return kind;
    }

    let magnitude: f64 = record
        .get("direction")
        .and_then(Value::as_object)
        .map(|direction| {
            ["u", "v", "w"]
                .iter()
                .map(|axis| lenient_f64(direction.get(*axis)).unwrap_or(0.0).powi(2))
                .sum()
        })
        .unwrap_or(0.0);
    if magnitude > DIRECTION_EPSILON {
        return AnnotationKind::Arrow;
    }

    let has_text = record.get("text").is_some_and(Value::is_string);
    if has_text && !has_point(record) {
        return AnnotationKind::Label;
    }

    AnnotationKind::Marker
}

fn has_point(record: &Record) -> bool {
    record
        .get("point")
        .and_then(Value::as_object)
        .is_some_and(|point| !point.is_empty())
}

/// Numbers, and strings holding numbers, as `f64`
fn lenient_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Rebuild a coordinate object with numeric fields, or `None` when unusable
fn coerce_triple(value: Option<&Value>, axes: [&str; 3]) -> Option<Value> {
    let object = value?.as_object()?;
    if object.is_empty() {
        return None;
    }

    let mut out = Record::new();
    for axis in axes {
        let component = match object.get(axis) {
            None => 0.0,
            present => lenient_f64(present)?,
        };
        out.insert(axis.to_string(), Value::from(component));
    }
    Some(Value::Object(out))
}

/// Epoch seconds or RFC 3339 text as an RFC 3339 value
fn coerce_timestamp(value: Option<&Value>) -> Option<Value> {
    let parsed: DateTime<Utc> = match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc),
        other => {
            let secs = lenient_f64(Some(other))?;
            timestamp_from_epoch(secs)?
        }
    };
    Some(Value::String(parsed.to_rfc3339()))
}

fn string_or_default(record: &mut Record, key: &str) {
    match record.get(key) {
        Some(Value::String(_)) => {}
        Some(Value::Number(n)) => {
            let text = n.to_string();
            record.insert(key.to_string(), Value::String(text));
        }
        _ => {
            record.remove(key);
        }
    }
}

/// Untagged → Tagged: stamp the inferred kind
fn tag_untagged(record: &mut Record) {
    let kind = infer_kind(record);
    record.insert("kind".to_string(), Value::from(kind.as_str()));
}

/// Field-shape repairs shared by every layout
fn coerce_annotation_fields(record: &mut Record, kind: AnnotationKind, job_id: &str, index: usize) {
    record.insert("kind".to_string(), Value::from(kind.as_str()));

    if !record.get("job_id").is_some_and(Value::is_string) {
        record.insert("job_id".to_string(), Value::from(job_id));
    }

    let has_id = record
        .get("annotation_id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.trim().is_empty());
    if !has_id {
        record.insert(
            "annotation_id".to_string(),
            Value::String(format!("{}-{:04}", job_id, index)),
        );
    }

    match coerce_triple(record.get("point"), ["x", "y", "z"]) {
        Some(point) => record.insert("point".to_string(), point),
        None => record.remove("point"),
    };

    let created = record
        .get("created_at")
        .or_else(|| record.get("timestamp"))
        .and_then(|value| coerce_timestamp(Some(value)));
    record.remove("timestamp");
    match created {
        Some(ts) => record.insert("created_at".to_string(), ts),
        None => record.remove("created_at"),
    };

    string_or_default(record, "color");

    match kind {
        AnnotationKind::Marker | AnnotationKind::Arrow => {
            string_or_default(record, "label");
            string_or_default(record, "notes");

            let direction = coerce_triple(record.get("direction"), ["u", "v", "w"])
                .unwrap_or_else(|| serde_json::json!({"u": 0.0, "v": 0.0, "w": 0.0}));
            record.insert("direction".to_string(), direction);

            match coerce_triple(record.get("tip_point"), ["x", "y", "z"]) {
                Some(tip) if kind == AnnotationKind::Arrow => {
                    record.insert("tip_point".to_string(), tip)
                }
                _ => record.remove("tip_point"),
            };
        }
        AnnotationKind::Label => {
            string_or_default(record, "text");
            string_or_default(record, "label");
            let text = record
                .get("text")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .or_else(|| record.get("label").and_then(Value::as_str))
                .unwrap_or_default()
                .to_string();
            record.insert("text".to_string(), Value::String(text));

            match lenient_f64(record.get("size")) {
                Some(size) if size.is_finite() => {
                    record.insert("size".to_string(), Value::from(size))
                }
                _ => record.remove("size"),
            };
        }
    }
}

/// Bring one raw annotation record up to the current layout.
///
/// `index` is the record's position in its file; it seeds a stable id for
/// records that never had one. Returns the reason when the record cannot be
/// used at all.
pub fn upgrade_annotation(raw: Value, job_id: &str, index: usize) -> Result<Annotation, String> {
    let Value::Object(mut record) = raw else {
        return Err(format!("record {} is not an object", index));
    };

    if AnnotationSchema::detect(&record) < AnnotationSchema::CURRENT {
        tag_untagged(&mut record);
    }

    let kind = infer_kind(&record);
    coerce_annotation_fields(&mut record, kind, job_id, index);

    serde_json::from_value(Value::Object(record)).map_err(|e| format!("record {}: {}", index, e))
}

/// Bring one raw snapshot record up to the current layout, filling in the
/// owning job when the record does not name one.
pub fn upgrade_snapshot(raw: Value, job_id: &str, index: usize) -> Result<Snapshot, String> {
    let Value::Object(mut record) = raw else {
        return Err(format!("record {} is not an object", index));
    };

    let names_job = record
        .get("job_id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty());
    if !names_job {
        record.insert("job_id".to_string(), Value::from(job_id));
    }

    let has_id = record
        .get("snapshot_id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.trim().is_empty());
    if !has_id {
        record.insert(
            "snapshot_id".to_string(),
            Value::String(format!("{}-snapshot-{:04}", job_id, index)),
        );
    }

    serde_json::from_value(Value::Object(record)).map_err(|e| format!("record {}: {}", index, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicomesh_core::models::annotation::{
        DEFAULT_LABEL_COLOR, DEFAULT_LABEL_SIZE, DEFAULT_MARKER_COLOR,
    };
    use dicomesh_core::models::{AnnotationBody, Point3, Vector3};
    use serde_json::json;

    fn object(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_coerce_negative_fractional_epoch() {
        let Some(Value::String(text)) = coerce_timestamp(Some(&json!(-1.5))) else {
            panic!("expected a timestamp string");
        };
        let parsed = DateTime::parse_from_rfc3339(&text).unwrap();
        assert_eq!(parsed.timestamp_millis(), -1500);
    }

    #[test]
    fn test_explicit_kind_is_case_insensitive() {
        let record = object(json!({"kind": "ARROW", "direction": {"u": 0, "v": 0, "w": 0}}));
        assert_eq!(infer_kind(&record), AnnotationKind::Arrow);
        assert_eq!(AnnotationSchema::detect(&record), AnnotationSchema::Tagged);
    }

    #[test]
    fn test_unknown_kind_falls_back_to_inference() {
        let record = object(json!({"kind": "polygon", "text": "T"}));
        assert_eq!(AnnotationSchema::detect(&record), AnnotationSchema::Untagged);
        assert_eq!(infer_kind(&record), AnnotationKind::Label);
    }

    #[test]
    fn test_inference_rules() {
        let arrow = object(json!({
            "point": {"x": 1},
            "direction": {"u": 0.0, "v": 0.002, "w": 0.0}
        }));
        assert_eq!(infer_kind(&arrow), AnnotationKind::Arrow);

        let tiny = object(json!({"direction": {"u": 0.0001, "v": 0.0, "w": 0.0}, "text": "t"}));
        assert_eq!(infer_kind(&tiny), AnnotationKind::Label);

        let label = object(json!({"text": "Note", "point": {}}));
        assert_eq!(infer_kind(&label), AnnotationKind::Label);

        let marker_with_text = object(json!({"text": "Note", "point": {"x": 1, "y": 2, "z": 3}}));
        assert_eq!(infer_kind(&marker_with_text), AnnotationKind::Marker);

        assert_eq!(infer_kind(&Record::new()), AnnotationKind::Marker);
    }

    #[test]
    fn test_upgrade_legacy_arrow() {
        let raw = json!({
            "annotation_id": "a1",
            "point": {"x": "1.5", "y": 2, "z": 3},
            "direction": {"u": 0, "v": 0, "w": 4},
            "label": "Fracture",
            "timestamp": 1_700_000_000.0
        });

        let ann = upgrade_annotation(raw, "job-1", 0).unwrap();

        assert_eq!(ann.kind(), AnnotationKind::Arrow);
        assert_eq!(ann.point, Some(Point3::new(1.5, 2.0, 3.0)));
        assert_eq!(ann.created_at.map(|t| t.timestamp()), Some(1_700_000_000));
        match ann.body {
            AnnotationBody::Arrow { direction, color, .. } => {
                assert_eq!(direction, Vector3::new(0.0, 0.0, 4.0));
                assert_eq!(color, DEFAULT_MARKER_COLOR);
            }
            other => panic!("expected arrow, got {other:?}"),
        }
    }

    #[test]
    fn test_upgrade_legacy_label_uses_label_text() {
        let raw = json!({
            "kind": "Label",
            "label": "Left lobe",
            "size": "22",
            "point": {"x": 0, "y": 0, "z": 1}
        });

        let ann = upgrade_annotation(raw, "job-1", 3).unwrap();

        assert_eq!(ann.annotation_id, "job-1-0003");
        assert_eq!(ann.title(), "Left lobe");
        match ann.body {
            AnnotationBody::Label { size, color, .. } => {
                assert_eq!(size, 22.0);
                assert_eq!(color, DEFAULT_LABEL_COLOR);
            }
            other => panic!("expected label, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_size_defaults() {
        let raw = json!({"kind": "label", "text": "x", "size": "huge"});
        match upgrade_annotation(raw, "job-1", 0).unwrap().body {
            AnnotationBody::Label { size, .. } => assert_eq!(size, DEFAULT_LABEL_SIZE),
            other => panic!("expected label, got {other:?}"),
        }
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(upgrade_annotation(json!("marker"), "job-1", 0).is_err());
        assert!(upgrade_snapshot(json!(42), "job-1", 0).is_err());
    }

    #[test]
    fn test_upgrade_snapshot_injects_job() {
        let raw = json!({
            "snapshot_id": "s1",
            "source_stl": "/conv/job-1/artifacts/mesh.stl",
            "filename": "view.png",
            "timestamp": 1_700_000_000.5,
            "data_base64": "AAEC"
        });

        let snap = upgrade_snapshot(raw, "job-1", 0).unwrap();

        assert_eq!(snap.job_id, "job-1");
        assert_eq!(snap.mime_type, "image/png");
        assert_eq!(snap.source_mesh.to_str(), Some("/conv/job-1/artifacts/mesh.stl"));
    }

    #[test]
    fn test_upgrade_snapshot_keeps_foreign_job() {
        let raw = json!({
            "snapshot_id": "s1",
            "job_id": "job-0",
            "source_mesh": "m.stl",
            "filename": "v.png",
            "captured_at": "2025-01-02T03:04:05Z",
            "data_base64": ""
        });

        assert_eq!(upgrade_snapshot(raw, "job-1", 0).unwrap().job_id, "job-0");
    }
}
