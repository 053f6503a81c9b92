use dicomesh_core::config::ConfigSource;
use dicomesh_core::models::{Annotation, AnnotationBody, ConversionJob, ConversionResult, Snapshot};
use dicomesh_core::SampleSeries;
use serde::Serialize;
use tabled::Tabled;

/// Row of `samples`
#[derive(Debug, Serialize, Tabled)]
pub struct SampleRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Slices")]
    pub file_count: usize,
    #[tabled(rename = "Path")]
    pub path: String,
}

impl From<SampleSeries> for SampleRow {
    fn from(sample: SampleSeries) -> Self {
        Self {
            name: sample.name,
            file_count: sample.file_count,
            path: sample.path.display().to_string(),
        }
    }
}

/// Output for `ingest` and `stage-sample`
#[derive(Debug, Serialize)]
pub struct StagedOutput {
    pub job_id: String,
    pub label: String,
    pub source_kind: String,
    pub dicom_count: usize,
    pub input_dir: String,
}

impl From<&ConversionJob> for StagedOutput {
    fn from(job: &ConversionJob) -> Self {
        Self {
            job_id: job.job_id.clone(),
            label: job.label.clone(),
            source_kind: job.source_kind.to_string(),
            dicom_count: job.source_details.as_ref().map(|d| d.dicom_count()).unwrap_or(0),
            input_dir: job.input_dir.display().to_string(),
        }
    }
}

/// Output for `run`, `convert` and `show`
#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub job_id: String,
    pub label: String,
    pub success: bool,
    pub cancelled: bool,
    pub exit_code: i32,
    pub elapsed_seconds: f64,
    pub mesh: Option<String>,
    pub command: Vec<String>,
    pub tool_metadata: std::collections::BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl RunOutput {
    pub fn new(result: &ConversionResult, with_logs: bool) -> Self {
        Self {
            job_id: result.job.job_id.clone(),
            label: result.job.label.clone(),
            success: result.success,
            cancelled: result.cancelled,
            exit_code: result.exit_code,
            elapsed_seconds: result.elapsed_seconds,
            mesh: result
                .success
                .then(|| result.job.output_mesh.display().to_string()),
            command: result.command.clone(),
            tool_metadata: result.tool_metadata.clone(),
            stdout: with_logs.then(|| result.stdout.clone()),
            stderr: with_logs.then(|| result.stderr.clone()),
        }
    }
}

/// Row of `history`
#[derive(Debug, Serialize, Tabled)]
pub struct HistoryRow {
    #[tabled(rename = "Job")]
    pub job_id: String,
    #[tabled(rename = "Label")]
    pub label: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Tissue")]
    pub tissue_type: String,
    #[tabled(rename = "Seconds")]
    pub elapsed_seconds: String,
    #[tabled(rename = "Completed")]
    pub completed_at: String,
}

impl From<&ConversionResult> for HistoryRow {
    fn from(result: &ConversionResult) -> Self {
        Self {
            job_id: result.job.job_id.clone(),
            label: result.job.label.clone(),
            status: run_status(result).to_string(),
            tissue_type: result.options.tissue_type.to_string(),
            elapsed_seconds: format!("{:.1}", result.elapsed_seconds),
            completed_at: result.completed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }
}

pub fn run_status(result: &ConversionResult) -> &'static str {
    if result.success {
        "success"
    } else if result.cancelled {
        "cancelled"
    } else {
        "failed"
    }
}

/// Row of `annotate list`
#[derive(Debug, Serialize, Tabled)]
pub struct AnnotationRow {
    #[tabled(rename = "ID")]
    pub annotation_id: String,
    #[tabled(rename = "Job")]
    pub job_id: String,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Text")]
    pub title: String,
    #[tabled(rename = "Point")]
    pub point: String,
    #[tabled(rename = "Detail")]
    pub detail: String,
}

impl From<&Annotation> for AnnotationRow {
    fn from(annotation: &Annotation) -> Self {
        let detail = match &annotation.body {
            AnnotationBody::Arrow { .. } => annotation
                .arrow_tip()
                .map(|t| format!("tip {:.2}, {:.2}, {:.2}", t.x, t.y, t.z))
                .unwrap_or_default(),
            AnnotationBody::Label { size, .. } => format!("size {}", size),
            AnnotationBody::Marker { notes, .. } => notes.clone(),
        };

        Self {
            annotation_id: annotation.annotation_id.clone(),
            job_id: annotation.job_id.clone(),
            kind: annotation.kind().to_string(),
            title: annotation.title().to_string(),
            point: annotation
                .point
                .map(|p| format!("{:.2}, {:.2}, {:.2}", p.x, p.y, p.z))
                .unwrap_or_else(|| "-".to_string()),
            detail,
        }
    }
}

/// Row of `snapshot list`
#[derive(Debug, Serialize, Tabled)]
pub struct SnapshotRow {
    #[tabled(rename = "ID")]
    pub snapshot_id: String,
    #[tabled(rename = "Job")]
    pub job_id: String,
    #[tabled(rename = "File")]
    pub filename: String,
    #[tabled(rename = "Overlay")]
    pub has_overlay: bool,
    #[tabled(rename = "Captured")]
    pub captured_at: String,
    #[tabled(rename = "Notes")]
    pub notes: String,
}

impl From<&Snapshot> for SnapshotRow {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            snapshot_id: snapshot.snapshot_id.clone(),
            job_id: snapshot.job_id.clone(),
            filename: snapshot.filename.clone(),
            has_overlay: snapshot.annotated_base64.is_some(),
            captured_at: snapshot.captured_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            notes: snapshot.notes.clone(),
        }
    }
}

/// Row of `config`
#[derive(Debug, Serialize, Tabled)]
pub struct ConfigRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Source")]
    pub source: String,
}

impl ConfigRow {
    pub fn new(key: String, value: String, source: ConfigSource) -> Self {
        let source = match source {
            ConfigSource::Default => "default",
            ConfigSource::File => "file",
            ConfigSource::Environment => "environment",
            ConfigSource::Cli => "cli",
        };
        Self {
            key,
            value,
            source: source.to_string(),
        }
    }
}

/// Output for `doctor`
#[derive(Debug, Serialize)]
pub struct DoctorOutput {
    pub checks: Vec<DoctorCheck>,
    pub passed: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub ok: bool,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}
