//! Per-job JSON record files shared by annotations and snapshots
//!
//! Each job keeps one JSON array per record type under its artifacts
//! directory. Reads go through the migration step, writes through the
//! record type's normalization and an atomic replace.

use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use dicomesh_core::error::{DicomeshError, Result};
use dicomesh_core::models::job::artifact_path;
use dicomesh_core::paths;
use dicomesh_core::persist::write_json_atomic;

use crate::ports::{JobRecordRepository, LoadOutcome};

/// How one record type is stored
pub trait RecordSchema: Send + Sync + 'static {
    type Record: Serialize + Clone + Send + Sync;

    /// File name inside the job's artifacts directory
    const FILE_NAME: &'static str;

    /// Upgrade a raw record read from `job_id`'s file
    fn upgrade(raw: Value, job_id: &str, index: usize) -> std::result::Result<Self::Record, String>;

    /// Steady-state normalization applied before every write
    fn normalize(record: Self::Record, job_id: &str) -> Self::Record;

    fn record_id(record: &Self::Record) -> &str;
}

/// Filesystem store for one record type
#[derive(Debug)]
pub struct FsRecordStore<S> {
    conversions_root: PathBuf,
    schema: PhantomData<fn() -> S>,
}

impl<S> Clone for FsRecordStore<S> {
    fn clone(&self) -> Self {
        Self {
            conversions_root: self.conversions_root.clone(),
            schema: PhantomData,
        }
    }
}

impl<S: RecordSchema> FsRecordStore<S> {
    pub fn new(conversions_root: impl Into<PathBuf>) -> Self {
        Self {
            conversions_root: conversions_root.into(),
            schema: PhantomData,
        }
    }

    pub fn conversions_root(&self) -> &Path {
        &self.conversions_root
    }

    /// Path of a job's record file; the job id is validated
    pub fn record_file(&self, job_id: &str) -> Result<PathBuf> {
        let job_dir = paths::job_dir(&self.conversions_root, job_id)?;
        Ok(artifact_path(&job_dir, S::FILE_NAME))
    }

    fn read_file(path: &Path, job_id: &str) -> LoadOutcome<S::Record> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return LoadOutcome::Missing,
            Err(e) => {
                return LoadOutcome::Unreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        };

        let payload: Vec<Value> = match serde_json::from_str(&content) {
            Ok(payload) => payload,
            Err(e) => {
                return LoadOutcome::Unreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        };

        let records = payload
            .into_iter()
            .enumerate()
            .filter_map(|(index, raw)| match S::upgrade(raw, job_id, index) {
                Ok(record) => Some(record),
                Err(reason) => {
                    tracing::warn!("Dropping record in {}: {}", path.display(), reason);
                    None
                }
            })
            .collect();

        LoadOutcome::Loaded(records)
    }

    /// Every record file on disk with its owning job, newest first
    fn files_by_mtime(&self) -> Result<Vec<(String, PathBuf)>> {
        let entries = match fs::read_dir(&self.conversions_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files: Vec<(String, PathBuf, SystemTime)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let job_id = entry.file_name().into_string().ok()?;
                let path = artifact_path(&entry.path(), S::FILE_NAME);
                let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
                Some((job_id, path, modified))
            })
            .collect();

        files.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| b.0.cmp(&a.0)));
        Ok(files.into_iter().map(|(job_id, path, _)| (job_id, path)).collect())
    }
}

impl<S: RecordSchema> JobRecordRepository for FsRecordStore<S> {
    type Record = S::Record;

    fn load_checked(&self, job_id: &str) -> Result<LoadOutcome<S::Record>> {
        let path = self.record_file(job_id)?;
        Ok(Self::read_file(&path, job_id.trim()))
    }

    fn save(&self, job_id: &str, records: Vec<S::Record>) -> Result<Vec<S::Record>> {
        let job_dir = paths::job_dir(&self.conversions_root, job_id)?;
        if !job_dir.is_dir() {
            return Err(DicomeshError::JobNotFound {
                job_id: job_id.to_string(),
            });
        }

        let job_id = job_id.trim();
        let normalized: Vec<S::Record> = records
            .into_iter()
            .map(|record| S::normalize(record, job_id))
            .collect();

        write_json_atomic(&artifact_path(&job_dir, S::FILE_NAME), &normalized)?;
        tracing::debug!("Saved {} record(s) to {} for {}", normalized.len(), S::FILE_NAME, job_id);
        Ok(normalized)
    }

    fn list_all(&self, job_ids: Option<&[String]>) -> Result<Vec<S::Record>> {
        let files = match job_ids {
            Some(ids) => ids
                .iter()
                .map(|id| Ok((id.trim().to_string(), self.record_file(id)?)))
                .collect::<Result<Vec<_>>>()?,
            None => self.files_by_mtime()?,
        };

        let mut records = Vec::new();
        for (job_id, path) in files {
            match Self::read_file(&path, &job_id) {
                LoadOutcome::Missing => {}
                LoadOutcome::Loaded(loaded) => records.extend(loaded),
                LoadOutcome::Unreadable { path, reason } => {
                    tracing::warn!("Skipping unreadable {}: {}", path.display(), reason);
                }
            }
        }

        Ok(records)
    }

    fn find(&self, record_id: &str) -> Result<Option<S::Record>> {
        Ok(self
            .list_all(None)?
            .into_iter()
            .find(|record| S::record_id(record) == record_id))
    }

    fn remove(&self, job_id: &str, record_id: &str) -> Result<bool> {
        let mut records = self.load_checked(job_id)?.into_records();
        let before = records.len();
        records.retain(|record| S::record_id(record) != record_id);

        if records.len() == before {
            return Ok(false);
        }

        self.save(job_id, records)?;
        tracing::info!("Removed {} from {}", record_id, job_id);
        Ok(true)
    }
}
