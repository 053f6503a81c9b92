use serde_json::Value;

use dicomesh_core::models::Annotation;

use crate::migrate;
use crate::records::{FsRecordStore, RecordSchema};

pub const ANNOTATIONS_FILE: &str = "annotations.json";

/// Layout of `annotations.json`
#[derive(Debug, Clone, Copy)]
pub struct AnnotationFile;

impl RecordSchema for AnnotationFile {
    type Record = Annotation;

    const FILE_NAME: &'static str = ANNOTATIONS_FILE;

    fn upgrade(raw: Value, job_id: &str, index: usize) -> Result<Annotation, String> {
        migrate::upgrade_annotation(raw, job_id, index).map(|ann| ann.normalized(job_id))
    }

    fn normalize(record: Annotation, job_id: &str) -> Annotation {
        record.normalized(job_id)
    }

    fn record_id(record: &Annotation) -> &str {
        &record.annotation_id
    }
}

/// Per-job 3-D annotations on disk
pub type FsAnnotationStore = FsRecordStore<AnnotationFile>;
