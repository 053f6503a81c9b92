//! Error types for dicomesh

use std::path::PathBuf;
use thiserror::Error;

/// Coarse grouping of errors, used by front ends to decide how to present them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// User-correctable input problems, shown verbatim
    Input,
    /// The external conversion tool is not installed
    ToolUnavailable,
    /// The OS refused to start the conversion tool
    Launch,
    /// Corrupt archive or an archive entry escaping the staging directory
    Archive,
    /// Invalid or missing configuration
    Config,
    /// Filesystem and serialization failures
    System,
}

#[derive(Debug, Error)]
pub enum DicomeshError {
    // Input errors
    #[error("No files were provided for upload")]
    EmptyInput,

    #[error("No DICOM slices were detected in {}", dir.display())]
    NoRecognizedSlices { dir: PathBuf },

    #[error("Sample dataset not found: {}", path.display())]
    SampleNotFound { path: PathBuf },

    #[error("Sample dataset {name} does not contain DICOM files")]
    SampleEmpty { name: String },

    #[error("No DICOM slices found in staging directory {}", dir.display())]
    NoInputStaged { dir: PathBuf },

    #[error("Invalid conversion option {key}: {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("Invalid job identifier '{job_id}'")]
    InvalidJobId { job_id: String },

    // Tool errors
    #[error("{tool} executable not found. Try: {remediation}")]
    ToolNotFound { tool: String, remediation: String },

    #[error("Failed to execute {}: {source}", program.display())]
    LaunchFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Archive errors
    #[error("Archive {name} is corrupt: {reason}")]
    ArchiveCorrupt { name: String, reason: String },

    #[error("Archive entry escapes staging directory: {entry}")]
    PathEscape { entry: String },

    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DicomeshError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DicomeshError::EmptyInput
            | DicomeshError::NoRecognizedSlices { .. }
            | DicomeshError::SampleNotFound { .. }
            | DicomeshError::SampleEmpty { .. }
            | DicomeshError::NoInputStaged { .. }
            | DicomeshError::InvalidOption { .. }
            | DicomeshError::JobNotFound { .. }
            | DicomeshError::InvalidJobId { .. } => ErrorCategory::Input,
            DicomeshError::ToolNotFound { .. } => ErrorCategory::ToolUnavailable,
            DicomeshError::LaunchFailed { .. } => ErrorCategory::Launch,
            DicomeshError::ArchiveCorrupt { .. } | DicomeshError::PathEscape { .. } => {
                ErrorCategory::Archive
            }
            DicomeshError::ConfigMissing { .. } | DicomeshError::ConfigInvalid { .. } => {
                ErrorCategory::Config
            }
            DicomeshError::Io(_) | DicomeshError::Serialization(_) => ErrorCategory::System,
        }
    }
}

impl From<serde_json::Error> for DicomeshError {
    fn from(err: serde_json::Error) -> Self {
        DicomeshError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DicomeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_follow_taxonomy() {
        assert_eq!(DicomeshError::EmptyInput.category(), ErrorCategory::Input);
        assert_eq!(
            DicomeshError::PathEscape { entry: "../x".into() }.category(),
            ErrorCategory::Archive
        );
        assert_eq!(
            DicomeshError::ToolNotFound {
                tool: "dicom2stl".into(),
                remediation: "pip install dicom2stl".into()
            }
            .category(),
            ErrorCategory::ToolUnavailable
        );
    }

    #[test]
    fn test_path_escape_message_names_entry() {
        let err = DicomeshError::PathEscape { entry: "../../evil.txt".into() };
        assert!(err.to_string().contains("../../evil.txt"));
    }
}
