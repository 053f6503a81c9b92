use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::{ConversionJob, ConversionOptions};
use crate::error::Result;
use crate::persist::write_json_atomic;

/// Exit code recorded when the tool was killed by a signal or cancelled
pub const TERMINATED_EXIT_CODE: i32 = -1;

/// Outcome of one conversion tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub job: ConversionJob,

    pub options: ConversionOptions,

    /// Exit code zero and the mesh file exists
    pub success: bool,

    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    /// Monotonic duration of the child process
    pub elapsed_seconds: f64,

    pub completed_at: DateTime<Utc>,

    /// Exact argument vector executed, program first
    pub command: Vec<String>,

    /// Parsed `KEY value` pairs from the tool's metadata file
    #[serde(default)]
    pub tool_metadata: BTreeMap<String, String>,

    #[serde(default)]
    pub cancelled: bool,
}

impl ConversionResult {
    /// Success requires both a zero exit code and the expected mesh on disk
    pub fn is_success(exit_code: i32, job: &ConversionJob) -> bool {
        exit_code == 0 && job.has_mesh()
    }

    /// Persist to the job's result file
    pub fn write(&self) -> Result<()> {
        write_json_atomic(&self.job.output_meta, self)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
