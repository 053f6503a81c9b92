//! Job directory allocation, sample discovery and tool lookup

use chrono::Utc;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::LayeredConfig;
use crate::error::{DicomeshError, Result};
use crate::models::job::{JOB_FILE, RESULT_FILE};
use crate::models::{ConversionJob, ConversionResult, SourceKind};
use crate::paths;
use crate::persist::write_json_atomic;

/// File extensions counted as DICOM slices (compared case-insensitively)
pub const SLICE_EXTENSIONS: &[&str] = &["dcm", "dicom"];

const MAX_ID_ATTEMPTS: usize = 8;

/// A bundled sample dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleSeries {
    pub name: String,
    pub path: PathBuf,
    /// Recursive count of recognized slices; zero for empty samples
    pub file_count: usize,
}

/// Finds the external conversion executable
#[derive(Debug, Clone)]
pub struct ToolLocator {
    name: String,
    fallback: PathBuf,
    search_path: Option<OsString>,
}

impl ToolLocator {
    /// Look up `name` on the process `PATH`, then try `fallback`
    pub fn new(name: impl Into<String>, fallback: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            fallback: fallback.into(),
            search_path: None,
        }
    }

    pub fn from_config(config: &LayeredConfig) -> Self {
        Self::new(
            config.tool_name.value.clone(),
            config.tool_fallback.value.clone(),
        )
    }

    /// Search this list instead of the process `PATH`
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the tool, or `None` when it is not installed
    pub fn resolve(&self) -> Option<PathBuf> {
        let search_path = self
            .search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"))
            .unwrap_or_default();

        let on_path = std::env::split_paths(&search_path)
            .map(|dir| dir.join(&self.name))
            .find(|candidate| is_executable(candidate));

        if let Some(found) = on_path {
            let found = paths::absolutize(found);
            tracing::debug!("Found {} on PATH at {}", self.name, found.display());
            return Some(found);
        }

        if is_executable(&self.fallback) {
            let fallback = paths::absolutize(self.fallback.clone());
            tracing::debug!("Using fallback {} at {}", self.name, fallback.display());
            return Some(fallback);
        }

        None
    }

    /// Guidance shown when [`resolve`](Self::resolve) finds nothing
    pub fn remediation(&self) -> String {
        format!(
            "install it with `pip install {}` or place the executable at {}",
            self.name,
            self.fallback.display()
        )
    }

    pub fn not_found_error(&self) -> DicomeshError {
        DicomeshError::ToolNotFound {
            tool: self.name.clone(),
            remediation: self.remediation(),
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Creates and locates job directories under the conversions root.
///
/// Both roots are made absolute when the store is built, so relative
/// settings are read against the working directory at that moment.
#[derive(Debug, Clone)]
pub struct JobStore {
    conversions_root: PathBuf,
    samples_root: PathBuf,
    locator: ToolLocator,
}

impl JobStore {
    pub fn new(
        conversions_root: impl Into<PathBuf>,
        samples_root: impl Into<PathBuf>,
        locator: ToolLocator,
    ) -> Self {
        Self {
            conversions_root: paths::absolutize(conversions_root.into()),
            samples_root: paths::absolutize(samples_root.into()),
            locator,
        }
    }

    pub fn from_config(config: &LayeredConfig) -> Self {
        Self::new(
            config.conversions_root.value.clone(),
            config.samples_root.value.clone(),
            ToolLocator::from_config(config),
        )
    }

    pub fn conversions_root(&self) -> &Path {
        &self.conversions_root
    }

    pub fn samples_root(&self) -> &Path {
        &self.samples_root
    }

    pub fn locator(&self) -> &ToolLocator {
        &self.locator
    }

    /// Allocate a fresh job with its input and output directories
    pub fn create_job(&self, label: &str, source_kind: SourceKind) -> Result<ConversionJob> {
        fs::create_dir_all(&self.conversions_root)?;

        for _ in 0..MAX_ID_ATTEMPTS {
            let job_id = generate_job_id();
            let job_dir = self.conversions_root.join(&job_id);

            match fs::create_dir(&job_dir) {
                Ok(()) => {
                    let job = ConversionJob::new(job_id, label, job_dir, source_kind);
                    fs::create_dir_all(&job.input_dir)?;
                    fs::create_dir_all(&job.output_dir)?;
                    tracing::info!("Created job {} ({})", job.job_id, job.label);
                    return Ok(job);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!("Job id {} already taken, retrying", job_id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DicomeshError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "could not allocate a unique job directory",
        )))
    }

    /// Persist the staging record so later invocations can reopen the job
    pub fn record_job(&self, job: &ConversionJob) -> Result<()> {
        write_json_atomic(&job.record_path(), job)
    }

    /// Directory of an existing or future job, validated against traversal
    pub fn job_dir(&self, job_id: &str) -> Result<PathBuf> {
        paths::job_dir(&self.conversions_root, job_id)
    }

    /// Reload a staged job from its staging record, or from a finished run
    pub fn open_job(&self, job_id: &str) -> Result<ConversionJob> {
        let job_dir = self.job_dir(job_id)?;
        let not_found = || DicomeshError::JobNotFound {
            job_id: job_id.to_string(),
        };

        if !job_dir.is_dir() {
            return Err(not_found());
        }

        let record = job_dir.join(JOB_FILE);
        if record.is_file() {
            let content = fs::read_to_string(&record)?;
            return Ok(serde_json::from_str(&content)?);
        }

        let result_file = crate::models::job::artifact_path(&job_dir, RESULT_FILE);
        if result_file.is_file() {
            return Ok(ConversionResult::read(&result_file)?.job);
        }

        Err(not_found())
    }

    /// Identifiers of every job directory currently on disk
    pub fn list_job_ids(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.conversions_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// List the bundled sample series, including empty ones
    pub fn discover_samples(&self) -> Result<Vec<SampleSeries>> {
        let entries = match fs::read_dir(&self.samples_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut samples: Vec<SampleSeries> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .map(|path| SampleSeries {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                file_count: count_recognized_slices(&path),
                path,
            })
            .collect();

        samples.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(samples)
    }

    pub fn find_sample(&self, name: &str) -> Result<Option<SampleSeries>> {
        Ok(self
            .discover_samples()?
            .into_iter()
            .find(|sample| sample.name == name))
    }

    /// Absolute path of the conversion tool; absence is a normal outcome
    pub fn resolve_external_tool(&self) -> Option<PathBuf> {
        self.locator.resolve()
    }
}

/// `job-YYYYMMDD-HHMMSS-xxxxxx`: sortable by creation time, random suffix
pub fn generate_job_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("job-{}-{}", Utc::now().format("%Y%m%d-%H%M%S"), &suffix[..6])
}

pub fn is_recognized_slice(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SLICE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Recursively count recognized slice files; missing directories count zero
pub fn count_recognized_slices(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_recognized_slice(entry.path()))
        .count()
}
