use dicomesh_core::error::Result;
use dicomesh_core::models::ConversionResult;
use std::path::PathBuf;

/// Outcome of reading a job's record file
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome<T> {
    /// The job has no record file yet
    Missing,
    /// Records that survived migration; individually broken ones are dropped
    Loaded(Vec<T>),
    /// The file exists but is not a JSON array we can read
    Unreadable { path: PathBuf, reason: String },
}

impl<T> LoadOutcome<T> {
    /// Collapse to a plain list, treating unreadable files as empty
    pub fn into_records(self) -> Vec<T> {
        match self {
            LoadOutcome::Missing => Vec::new(),
            LoadOutcome::Loaded(records) => records,
            LoadOutcome::Unreadable { path, reason } => {
                tracing::warn!("Ignoring unreadable {}: {}", path.display(), reason);
                Vec::new()
            }
        }
    }

    pub fn is_unreadable(&self) -> bool {
        matches!(self, LoadOutcome::Unreadable { .. })
    }
}

/// Port for persisted conversion results
pub trait ResultRepository: Send + Sync {
    /// Persist a finished run into its job's artifacts directory
    fn save(&self, result: &ConversionResult) -> Result<()>;

    /// Result of one job, `None` when the job has not been run
    fn get(&self, job_id: &str) -> Result<Option<ConversionResult>>;

    /// Up to `limit` most recent runs, oldest first.
    /// Corrupt or vanished result files are skipped.
    fn load_recent(&self, limit: usize) -> Result<Vec<ConversionResult>>;
}

/// Port for per-job record lists (annotations, snapshots)
pub trait JobRecordRepository: Send + Sync {
    type Record;

    /// Read a job's records, reporting missing and unreadable files distinctly
    fn load_checked(&self, job_id: &str) -> Result<LoadOutcome<Self::Record>>;

    /// Read a job's records; missing or unreadable files give an empty list
    fn load(&self, job_id: &str) -> Result<Vec<Self::Record>> {
        Ok(self.load_checked(job_id)?.into_records())
    }

    /// Normalize and atomically replace a job's records, returning what was written
    fn save(&self, job_id: &str, records: Vec<Self::Record>) -> Result<Vec<Self::Record>>;

    /// Records of the given jobs in order, or of every job newest file first
    fn list_all(&self, job_ids: Option<&[String]>) -> Result<Vec<Self::Record>>;

    /// Look a record up by id across all jobs
    fn find(&self, record_id: &str) -> Result<Option<Self::Record>>;

    /// Delete one record from a job; `false` when no record had that id
    fn remove(&self, job_id: &str, record_id: &str) -> Result<bool>;
}
