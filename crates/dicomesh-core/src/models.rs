pub mod annotation;
pub mod job;
pub mod options;
pub mod result;
pub mod snapshot;

pub use annotation::{Annotation, AnnotationBody, AnnotationKind, Point3, Vector3};
pub use job::{ConversionJob, SourceDetails, SourceKind};
pub use options::{ConversionOptions, TissueType};
pub use result::ConversionResult;
pub use snapshot::{timestamp_from_epoch, Snapshot};
