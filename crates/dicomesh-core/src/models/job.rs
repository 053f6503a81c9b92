use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the staging sub-directory holding copied slices
pub const INPUT_DIR: &str = "dicom";

/// Name of the sub-directory holding tool output and persisted records
pub const ARTIFACTS_DIR: &str = "artifacts";

pub const MESH_FILE: &str = "mesh.stl";
pub const RESULT_FILE: &str = "metadata.json";
pub const TOOL_METADATA_FILE: &str = "dicom2stl_meta.txt";
pub const JOB_FILE: &str = "job.json";

/// Where the staged data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Upload,
    Sample,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Upload => f.write_str("upload"),
            SourceKind::Sample => f.write_str("sample"),
        }
    }
}

/// Bookkeeping captured while staging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum SourceDetails {
    Upload {
        uploaded_files: Vec<String>,
        staged_files: usize,
        dicom_count: usize,
    },
    Sample {
        sample_path: PathBuf,
        copied_files: usize,
        dicom_count: usize,
    },
}

impl SourceDetails {
    pub fn dicom_count(&self) -> usize {
        match self {
            SourceDetails::Upload { dicom_count, .. }
            | SourceDetails::Sample { dicom_count, .. } => *dicom_count,
        }
    }
}

/// On-disk staging metadata for one conversion attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionJob {
    pub job_id: String,

    /// Human readable label, e.g. "Upload · chest +3"
    pub label: String,

    pub job_dir: PathBuf,

    /// Staged input slices
    pub input_dir: PathBuf,

    /// Tool output and persisted records
    pub output_dir: PathBuf,

    pub output_mesh: PathBuf,

    /// Serialized `ConversionResult`
    pub output_meta: PathBuf,

    /// Raw `KEY value` metadata written by the tool
    pub tool_metadata_txt: PathBuf,

    pub created_at: DateTime<Utc>,

    pub source_kind: SourceKind,

    #[serde(default)]
    pub source_details: Option<SourceDetails>,
}

impl ConversionJob {
    /// Lay out the canonical paths for a job rooted at `job_dir`
    pub fn new(
        job_id: impl Into<String>,
        label: impl Into<String>,
        job_dir: PathBuf,
        source_kind: SourceKind,
    ) -> Self {
        let input_dir = job_dir.join(INPUT_DIR);
        let output_dir = job_dir.join(ARTIFACTS_DIR);

        Self {
            job_id: job_id.into(),
            label: label.into(),
            output_mesh: output_dir.join(MESH_FILE),
            output_meta: output_dir.join(RESULT_FILE),
            tool_metadata_txt: output_dir.join(TOOL_METADATA_FILE),
            job_dir,
            input_dir,
            output_dir,
            created_at: Utc::now(),
            source_kind,
            source_details: None,
        }
    }

    /// Path of the staging record written next to the job directories
    pub fn record_path(&self) -> PathBuf {
        self.job_dir.join(JOB_FILE)
    }

    pub fn has_mesh(&self) -> bool {
        self.output_mesh.is_file()
    }
}

/// Path of a per-job artifact file, e.g. `annotations.json`
pub fn artifact_path(job_dir: &Path, file_name: &str) -> PathBuf {
    job_dir.join(ARTIFACTS_DIR).join(file_name)
}
