use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

pub const DEFAULT_MARKER_COLOR: &str = "#FF4136";
pub const DEFAULT_LABEL_COLOR: &str = "#ffffff";
pub const DEFAULT_LABEL_SIZE: f64 = 18.0;

/// A point in mesh coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A displacement in mesh coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub u: f64,
    pub v: f64,
    pub w: f64,
}

impl Vector3 {
    pub fn new(u: f64, v: f64, w: f64) -> Self {
        Self { u, v, w }
    }

    pub fn magnitude_squared(&self) -> f64 {
        self.u * self.u + self.v * self.v + self.w * self.w
    }
}

impl Sub for Point3 {
    type Output = Vector3;

    fn sub(self, rhs: Point3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Add<Vector3> for Point3 {
    type Output = Point3;

    fn add(self, rhs: Vector3) -> Point3 {
        Point3::new(self.x + rhs.u, self.y + rhs.v, self.z + rhs.w)
    }
}

/// Variant tag written to disk as `kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationKind {
    Marker,
    Arrow,
    Label,
}

impl AnnotationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationKind::Marker => "marker",
            AnnotationKind::Arrow => "arrow",
            AnnotationKind::Label => "label",
        }
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnnotationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "marker" => Ok(AnnotationKind::Marker),
            "arrow" => Ok(AnnotationKind::Arrow),
            "label" => Ok(AnnotationKind::Label),
            other => Err(format!("unknown annotation kind: {}", other)),
        }
    }
}

fn default_marker_color() -> String {
    DEFAULT_MARKER_COLOR.to_string()
}

fn default_label_color() -> String {
    DEFAULT_LABEL_COLOR.to_string()
}

fn default_label_size() -> f64 {
    DEFAULT_LABEL_SIZE
}

/// Kind-specific annotation payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AnnotationBody {
    Marker {
        #[serde(default)]
        label: String,
        #[serde(default = "default_marker_color")]
        color: String,
        #[serde(default)]
        notes: String,
    },
    Arrow {
        #[serde(default)]
        label: String,
        #[serde(default = "default_marker_color")]
        color: String,
        #[serde(default)]
        notes: String,
        #[serde(default)]
        direction: Vector3,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tip_point: Option<Point3>,
    },
    Label {
        #[serde(default)]
        text: String,
        #[serde(default = "default_label_color")]
        color: String,
        #[serde(default = "default_label_size")]
        size: f64,
    },
}

/// A 3-D annotation attached to a job's mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub annotation_id: String,

    pub job_id: String,

    /// Anchor point; records written before points were mandatory may lack one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<Point3>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub body: AnnotationBody,
}

impl Annotation {
    fn with_body(job_id: impl Into<String>, point: Option<Point3>, body: AnnotationBody) -> Self {
        Self {
            annotation_id: uuid::Uuid::new_v4().simple().to_string(),
            job_id: job_id.into(),
            point,
            created_at: Some(Utc::now()),
            body,
        }
    }

    pub fn marker(
        job_id: impl Into<String>,
        point: Point3,
        label: impl Into<String>,
        color: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        Self::with_body(
            job_id,
            Some(point),
            AnnotationBody::Marker {
                label: label.into(),
                color: color.into(),
                notes: notes.into(),
            },
        )
    }

    pub fn arrow(
        job_id: impl Into<String>,
        point: Point3,
        direction: Vector3,
        label: impl Into<String>,
        color: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        Self::with_body(
            job_id,
            Some(point),
            AnnotationBody::Arrow {
                label: label.into(),
                color: color.into(),
                notes: notes.into(),
                direction,
                tip_point: None,
            },
        )
    }

    pub fn label(
        job_id: impl Into<String>,
        point: Point3,
        text: impl Into<String>,
        color: impl Into<String>,
        size: f64,
    ) -> Self {
        Self::with_body(
            job_id,
            Some(point),
            AnnotationBody::Label {
                text: text.into(),
                color: color.into(),
                size,
            },
        )
    }

    pub fn kind(&self) -> AnnotationKind {
        match self.body {
            AnnotationBody::Marker { .. } => AnnotationKind::Marker,
            AnnotationBody::Arrow { .. } => AnnotationKind::Arrow,
            AnnotationBody::Label { .. } => AnnotationKind::Label,
        }
    }

    /// Display text: the label for markers and arrows, the text for labels
    pub fn title(&self) -> &str {
        match &self.body {
            AnnotationBody::Marker { label, .. } | AnnotationBody::Arrow { label, .. } => label,
            AnnotationBody::Label { text, .. } => text,
        }
    }

    /// Steady-state normalization: bind to `job_id` and keep an arrow's
    /// direction equal to `tip_point - point` whenever both are known.
    ///
    /// Applying it twice yields the same record.
    pub fn normalized(mut self, job_id: &str) -> Self {
        self.job_id = job_id.to_string();

        if let AnnotationBody::Arrow {
            direction,
            tip_point: Some(tip),
            ..
        } = &mut self.body
        {
            if let Some(anchor) = self.point {
                *direction = *tip - anchor;
            }
        }

        self
    }

    /// End point of an arrow, from the explicit tip or anchor plus direction
    pub fn arrow_tip(&self) -> Option<Point3> {
        match &self.body {
            AnnotationBody::Arrow {
                tip_point: Some(tip),
                ..
            } => Some(*tip),
            AnnotationBody::Arrow { direction, .. } => self.point.map(|p| p + *direction),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape_is_flat() {
        let ann = Annotation::marker("job-1", Point3::new(1.0, 2.0, 3.0), "Femur", "#00ff00", "");
        let json = serde_json::to_value(&ann).unwrap();

        assert_eq!(json["kind"], "marker");
        assert_eq!(json["label"], "Femur");
        assert_eq!(json["point"]["y"], 2.0);
        assert_eq!(json["job_id"], "job-1");
    }

    #[test]
    fn test_arrow_direction_follows_tip() {
        let mut ann = Annotation::arrow(
            "job-1",
            Point3::new(1.0, 1.0, 1.0),
            Vector3::new(0.0, 0.0, 1.0),
            "Fracture",
            DEFAULT_MARKER_COLOR,
            "",
        );
        if let AnnotationBody::Arrow { tip_point, .. } = &mut ann.body {
            *tip_point = Some(Point3::new(4.0, 5.0, 1.0));
        }

        let normalized = ann.normalized("job-1");
        match &normalized.body {
            AnnotationBody::Arrow { direction, .. } => {
                assert_eq!(*direction, Vector3::new(3.0, 4.0, 0.0));
            }
            other => panic!("expected arrow, got {:?}", other),
        }
        assert_eq!(normalized.clone().normalized("job-1"), normalized);
    }

    #[test]
    fn test_arrow_tip_from_direction() {
        let ann = Annotation::arrow(
            "job-1",
            Point3::new(1.0, 2.0, 3.0),
            Vector3::new(0.0, 0.0, 10.0),
            "",
            DEFAULT_MARKER_COLOR,
            "",
        );
        assert_eq!(ann.arrow_tip(), Some(Point3::new(1.0, 2.0, 13.0)));
    }

    #[test]
    fn test_label_defaults() {
        let ann: Annotation = serde_json::from_str(
            r#"{"annotation_id": "a", "job_id": "j", "kind": "label", "text": "Left"}"#,
        )
        .unwrap();

        assert_eq!(ann.kind(), AnnotationKind::Label);
        assert_eq!(ann.title(), "Left");
        assert!(ann.point.is_none());
        match ann.body {
            AnnotationBody::Label { color, size, .. } => {
                assert_eq!(color, DEFAULT_LABEL_COLOR);
                assert_eq!(size, DEFAULT_LABEL_SIZE);
            }
            other => panic!("expected label, got {:?}", other),
        }
    }
}
