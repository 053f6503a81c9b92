use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

use crate::error::{DicomeshError, Result};

/// An image captured against a job's mesh, optionally with a 2-D overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: String,

    pub job_id: String,

    #[serde(alias = "source_stl")]
    pub source_mesh: PathBuf,

    pub filename: String,

    #[serde(default = "default_mime_type")]
    pub mime_type: String,

    #[serde(default)]
    pub notes: String,

    #[serde(alias = "timestamp", deserialize_with = "deserialize_timestamp")]
    pub captured_at: DateTime<Utc>,

    /// Raw image, base64 encoded
    pub data_base64: String,

    /// Image with the user's drawing composited on top
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_base64: Option<String>,

    /// Shape objects drawn on the 2-D canvas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations2d: Option<serde_json::Value>,
}

fn default_mime_type() -> String {
    "image/png".to_string()
}

impl Snapshot {
    pub fn from_image(
        job_id: impl Into<String>,
        source_mesh: PathBuf,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        notes: impl Into<String>,
        image: &[u8],
    ) -> Self {
        Self {
            snapshot_id: uuid::Uuid::new_v4().simple().to_string(),
            job_id: job_id.into(),
            source_mesh,
            filename: filename.into(),
            mime_type: mime_type.into(),
            notes: notes.into(),
            captured_at: Utc::now(),
            data_base64: STANDARD.encode(image),
            annotated_base64: None,
            annotations2d: None,
        }
    }

    pub fn image_bytes(&self) -> Result<Vec<u8>> {
        decode(&self.data_base64)
    }

    /// The annotated overlay when present, otherwise the raw image
    pub fn display_bytes(&self) -> Result<Vec<u8>> {
        match &self.annotated_base64 {
            Some(annotated) => decode(annotated),
            None => self.image_bytes(),
        }
    }

    pub fn with_overlay(mut self, overlay: &[u8], shapes: Option<serde_json::Value>) -> Self {
        self.annotated_base64 = Some(STANDARD.encode(overlay));
        self.annotations2d = shapes;
        self
    }
}

fn decode(payload: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(payload)
        .map_err(|e| DicomeshError::Serialization(format!("invalid base64 image: {}", e)))
}

/// UTC instant for fractional epoch seconds; `None` when not representable.
///
/// The fraction is taken above the floor, so `-1.5` is half a second before `-1`.
pub fn timestamp_from_epoch(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let floor = secs.floor();
    let nanos = ((secs - floor) * 1e9).round();
    let (whole, nanos) = if nanos >= 1e9 {
        (floor + 1.0, 0)
    } else {
        (floor, nanos as u32)
    };
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return None;
    }
    Utc.timestamp_opt(whole as i64, nanos).single()
}

/// Accept RFC 3339 strings as well as the epoch seconds older records carry
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(DateTime<Utc>),
        Epoch(f64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(ts) => Ok(ts),
        Raw::Epoch(secs) => timestamp_from_epoch(secs)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", secs))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_from_negative_fraction() {
        let ts = timestamp_from_epoch(-1.5).unwrap();
        assert_eq!(ts.timestamp(), -2);
        assert_eq!(ts.timestamp_subsec_nanos(), 500_000_000);
        assert_eq!(ts.timestamp_millis(), -1500);

        let ts = timestamp_from_epoch(1_700_000_000.25).unwrap();
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_250);
        assert_eq!(timestamp_from_epoch(-2.0).unwrap().timestamp(), -2);
        assert!(timestamp_from_epoch(f64::NAN).is_none());
    }

    #[test]
    fn test_image_round_trip() {
        let snap = Snapshot::from_image(
            "job-1",
            PathBuf::from("/tmp/mesh.stl"),
            "render.png",
            "image/png",
            "left femur",
            &[0x89, b'P', b'N', b'G'],
        );
        assert_eq!(snap.image_bytes().unwrap(), vec![0x89, b'P', b'N', b'G']);
        assert_eq!(snap.display_bytes().unwrap(), snap.image_bytes().unwrap());

        let overlaid = snap.with_overlay(b"overlay", None);
        assert_eq!(overlaid.display_bytes().unwrap(), b"overlay".to_vec());
    }

    #[test]
    fn test_legacy_field_names() {
        let snap: Snapshot = serde_json::from_str(
            r#"{
                "snapshot_id": "abc",
                "job_id": "job-1",
                "source_stl": "/tmp/mesh.stl",
                "filename": "photo.jpg",
                "mime_type": "image/jpeg",
                "notes": "",
                "timestamp": 1700000000.5,
                "data_base64": "aGVsbG8="
            }"#,
        )
        .unwrap();

        assert_eq!(snap.source_mesh, PathBuf::from("/tmp/mesh.stl"));
        assert_eq!(snap.captured_at.timestamp(), 1_700_000_000);
        assert_eq!(snap.captured_at.timestamp_subsec_millis(), 500);
        assert_eq!(snap.image_bytes().unwrap(), b"hello".to_vec());
    }

    #[test]
    fn test_rfc3339_round_trip() {
        let snap = Snapshot::from_image(
            "job-1",
            PathBuf::from("m.stl"),
            "a.png",
            "image/png",
            "",
            b"x",
        );
        let json = serde_json::to_string(&snap).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
