//! Filesystem-backed conversion results

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use dicomesh_core::error::{DicomeshError, Result};
use dicomesh_core::models::job::{artifact_path, RESULT_FILE};
use dicomesh_core::models::ConversionResult;
use dicomesh_core::paths;

use crate::ports::ResultRepository;

/// Reads and writes `<root>/<job_id>/artifacts/metadata.json`
#[derive(Debug, Clone)]
pub struct FsResultStore {
    conversions_root: PathBuf,
}

impl FsResultStore {
    pub fn new(conversions_root: impl Into<PathBuf>) -> Self {
        Self {
            conversions_root: conversions_root.into(),
        }
    }

    pub fn conversions_root(&self) -> &Path {
        &self.conversions_root
    }

    /// Every result file on disk with its modification time, newest first
    fn result_files_by_mtime(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        let entries = match fs::read_dir(&self.conversions_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files: Vec<(PathBuf, SystemTime)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| artifact_path(&entry.path(), RESULT_FILE))
            .filter_map(|path| {
                let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
                Some((path, modified))
            })
            .collect();

        files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        Ok(files)
    }
}

impl ResultRepository for FsResultStore {
    fn save(&self, result: &ConversionResult) -> Result<()> {
        let job_dir = paths::job_dir(&self.conversions_root, &result.job.job_id)?;
        if !job_dir.is_dir() {
            return Err(DicomeshError::JobNotFound {
                job_id: result.job.job_id.clone(),
            });
        }

        result.write()
    }

    fn get(&self, job_id: &str) -> Result<Option<ConversionResult>> {
        let job_dir = paths::job_dir(&self.conversions_root, job_id)?;
        let path = artifact_path(&job_dir, RESULT_FILE);
        if !path.is_file() {
            return Ok(None);
        }

        ConversionResult::read(&path).map(Some)
    }

    fn load_recent(&self, limit: usize) -> Result<Vec<ConversionResult>> {
        let mut results = Vec::new();
        if limit == 0 {
            return Ok(results);
        }

        for (path, _) in self.result_files_by_mtime()? {
            match ConversionResult::read(&path) {
                Ok(result) => results.push(result),
                Err(DicomeshError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!("Result {} vanished during scan", path.display());
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable result {}: {}", path.display(), e);
                    continue;
                }
            }

            if results.len() >= limit {
                break;
            }
        }

        results.reverse();
        Ok(results)
    }
}
