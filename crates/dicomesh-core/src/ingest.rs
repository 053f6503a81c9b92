//! Staging of uploads and sample series into job input directories

use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::{DicomeshError, Result};
use crate::jobs::{count_recognized_slices, JobStore};
use crate::models::{ConversionJob, SourceDetails, SourceKind};
use crate::paths;

/// Optional progress sink, called with `(processed, total)` after each input
pub type ProgressFn<'a> = &'a mut dyn FnMut(usize, usize);

/// Directory prefix of macOS resource forks inside zip archives
const RESOURCE_FORK_DIR: &str = "__macosx";

/// A file handed over by the caller, already read into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Read a local file, keeping only its file name
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { name, data })
    }

    pub fn is_zip(&self) -> bool {
        self.name.to_lowercase().ends_with(".zip")
    }
}

/// Copies inputs into freshly allocated jobs
#[derive(Debug, Clone)]
pub struct IngestEngine {
    jobs: JobStore,
}

impl IngestEngine {
    pub fn new(jobs: JobStore) -> Self {
        Self { jobs }
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Stage uploaded files (plain slices or zip archives) into a new job
    pub fn ingest_uploads(
        &self,
        files: &[UploadedFile],
        progress: Option<ProgressFn<'_>>,
    ) -> Result<ConversionJob> {
        if files.is_empty() {
            return Err(DicomeshError::EmptyInput);
        }

        let mut job = self.jobs.create_job(&upload_label(files), SourceKind::Upload)?;
        self.stage_uploads(&mut job, files, progress)?;
        self.jobs.record_job(&job)?;

        tracing::info!(
            "Staged {} upload(s) into {} ({} slices)",
            files.len(),
            job.job_id,
            job.source_details.as_ref().map(|d| d.dicom_count()).unwrap_or(0)
        );
        Ok(job)
    }

    /// Stage uploads into an existing job.
    ///
    /// Inputs are processed in order; a rejected archive entry aborts the
    /// call but leaves everything staged before it in place.
    pub fn stage_uploads(
        &self,
        job: &mut ConversionJob,
        files: &[UploadedFile],
        mut progress: Option<ProgressFn<'_>>,
    ) -> Result<()> {
        if files.is_empty() {
            return Err(DicomeshError::EmptyInput);
        }

        let total = files.len();
        let mut staged_files = 0;

        for (index, file) in files.iter().enumerate() {
            staged_files += if file.is_zip() {
                extract_zip(&file.name, &file.data, &job.input_dir)?
            } else {
                write_single(file, index + 1, &job.input_dir)?
            };

            if let Some(report) = progress.as_deref_mut() {
                report(index + 1, total);
            }
        }

        let dicom_count = count_recognized_slices(&job.input_dir);
        if dicom_count == 0 {
            return Err(DicomeshError::NoRecognizedSlices {
                dir: job.input_dir.clone(),
            });
        }

        job.source_details = Some(SourceDetails::Upload {
            uploaded_files: files.iter().map(|f| f.name.clone()).collect(),
            staged_files,
            dicom_count,
        });
        Ok(())
    }

    /// Copy a sample series, preserving its relative layout, into a new job
    pub fn stage_sample(&self, sample_path: &Path) -> Result<ConversionJob> {
        if !sample_path.exists() {
            return Err(DicomeshError::SampleNotFound {
                path: sample_path.to_path_buf(),
            });
        }

        let name = sample_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| sample_path.display().to_string());

        let mut job = self
            .jobs
            .create_job(&format!("Sample · {}", name), SourceKind::Sample)?;

        let copied_files = copy_tree(sample_path, &job.input_dir)?;
        let dicom_count = count_recognized_slices(&job.input_dir);
        if copied_files == 0 || dicom_count == 0 {
            return Err(DicomeshError::SampleEmpty { name });
        }

        job.source_details = Some(SourceDetails::Sample {
            sample_path: sample_path.to_path_buf(),
            copied_files,
            dicom_count,
        });
        self.jobs.record_job(&job)?;

        tracing::info!(
            "Staged sample {} into {} ({} files, {} slices)",
            name,
            job.job_id,
            copied_files,
            dicom_count
        );
        Ok(job)
    }
}

fn upload_label(files: &[UploadedFile]) -> String {
    let stems: Vec<String> = files
        .iter()
        .filter(|f| !f.name.is_empty())
        .filter_map(|f| Path::new(&f.name).file_stem())
        .map(|stem| stem.to_string_lossy().into_owned())
        .collect();

    match stems.as_slice() {
        [] => "Upload · Untitled".to_string(),
        [only] => format!("Upload · {}", only),
        [first, rest @ ..] => format!("Upload · {} +{}", first, rest.len()),
    }
}

fn is_resource_fork(entry_name: &str) -> bool {
    entry_name
        .split(['/', '\\'])
        .any(|segment| segment.to_lowercase().starts_with(RESOURCE_FORK_DIR))
}

fn extract_zip(archive_name: &str, data: &[u8], target_dir: &Path) -> Result<usize> {
    let corrupt = |reason: String| DicomeshError::ArchiveCorrupt {
        name: archive_name.to_string(),
        reason,
    };

    let mut archive = ZipArchive::new(Cursor::new(data)).map_err(|e| corrupt(e.to_string()))?;
    let mut extracted = 0;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| corrupt(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }

        let entry_name = entry.name().to_string();
        if is_resource_fork(&entry_name) {
            tracing::debug!("Skipping resource fork entry {}", entry_name);
            continue;
        }

        let destination = paths::confine(target_dir, &entry_name)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut output = File::create(&destination)?;
        io::copy(&mut entry, &mut output)
            .map_err(|e| corrupt(format!("failed to extract {}: {}", entry_name, e)))?;

        tracing::debug!("Extracted {} -> {}", entry_name, destination.display());
        extracted += 1;
    }

    Ok(extracted)
}

fn write_single(file: &UploadedFile, index: usize, target_dir: &Path) -> Result<usize> {
    let safe_name = paths::sanitize_filename(&file.name, index);
    let destination = paths::confine(target_dir, &safe_name)?;
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&destination, &file.data)?;
    Ok(1)
}

/// Copy every regular file under `source` into `target`, returning the count
fn copy_tree(source: &Path, target: &Path) -> Result<usize> {
    let mut copied = 0;

    for entry in WalkDir::new(source).min_depth(1).into_iter() {
        let entry = entry.map_err(|e| {
            DicomeshError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| io::Error::other("filesystem loop while copying sample")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative: PathBuf = entry
            .path()
            .strip_prefix(source)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(entry.file_name()));
        let destination = paths::confine(target, &relative.to_string_lossy())?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(entry.path(), &destination)?;
        copied += 1;
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_label() {
        assert_eq!(upload_label(&[UploadedFile::new("chest.zip", vec![])]), "Upload · chest");
        assert_eq!(
            upload_label(&[
                UploadedFile::new("a.dcm", vec![]),
                UploadedFile::new("b.dcm", vec![]),
                UploadedFile::new("c.dcm", vec![]),
            ]),
            "Upload · a +2"
        );
        assert_eq!(upload_label(&[UploadedFile::new("", vec![])]), "Upload · Untitled");
    }

    #[test]
    fn test_resource_fork_detection() {
        assert!(is_resource_fork("__MACOSX/scan/._slice001.dcm"));
        assert!(is_resource_fork("scan/__macosx/x.dcm"));
        assert!(!is_resource_fork("scan/slice001.dcm"));
    }

    #[test]
    fn test_zip_detection_is_case_insensitive() {
        assert!(UploadedFile::new("Study.ZIP", vec![]).is_zip());
        assert!(!UploadedFile::new("slice.dcm", vec![]).is_zip());
    }
}
