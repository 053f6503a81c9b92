use console::style;
use dicomesh_core::error::{DicomeshError, ErrorCategory};
use std::fmt;

/// Enhanced error type with suggestions
pub struct CliError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
    pub help_command: Option<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
            help_command: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, command: impl Into<String>) -> Self {
        self.help_command = Some(command.into());
        self
    }

    pub fn display(&self) {
        eprintln!("{} {}\n", style("✗").red().bold(), style(&self.message).red().bold());

        if let Some(ref context) = self.context {
            eprintln!("{}", context);
            eprintln!();
        }

        if !self.suggestions.is_empty() {
            eprintln!("{}", style("To fix this:").yellow().bold());
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, suggestion);
            }
            eprintln!();
        }

        if let Some(ref help_cmd) = self.help_command {
            eprintln!("{} {}", style("Need help?").cyan(), style(help_cmd).cyan().bold());
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": "error",
            "message": self.message,
            "context": self.context,
            "suggestions": self.suggestions,
        })
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Debug for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Create error for a missing conversion tool
pub fn tool_not_found(tool: &str, remediation: &str) -> CliError {
    CliError::new(format!("{} is not installed", tool))
        .with_context(format!(
            "The conversion tool could not be found on PATH or at the configured fallback.\n\n\
             Tool: {}",
            tool
        ))
        .with_suggestion(format!("Install it: {}", remediation))
        .with_suggestion("Or point dicomesh at another executable: --tool <name> or DICOMESH_TOOL")
        .with_help("Run: dicomesh doctor")
}

/// Create error for an unknown job
pub fn job_not_found(job_id: &str) -> CliError {
    CliError::new("Job not found")
        .with_context(format!("No staged job with this identifier exists.\n\nJob: {}", job_id))
        .with_suggestion("List recent jobs: dicomesh history")
        .with_suggestion("Check --conversions-root if jobs live elsewhere")
        .with_help("Run: dicomesh show --help")
}

/// Create error for a missing sample series
pub fn sample_not_found(name: &str, available: &[String]) -> CliError {
    let listing = if available.is_empty() {
        "No samples are installed.".to_string()
    } else {
        format!("Available samples: {}", available.join(", "))
    };

    CliError::new(format!("Sample '{}' not found", name))
        .with_context(listing)
        .with_suggestion("List samples: dicomesh samples")
        .with_suggestion("Or set samples_root in dicomesh.toml")
        .with_help("Run: dicomesh stage-sample --help")
}

/// Create error for inputs without DICOM slices
pub fn no_slices(detail: &str) -> CliError {
    CliError::new("No DICOM slices found")
        .with_context(format!("Only files ending in .dcm or .dicom are recognized.\n\n{}", detail))
        .with_suggestion("Check that the archive or folder really contains a DICOM series")
        .with_suggestion("Rename slices without an extension to *.dcm")
        .with_help("Run: dicomesh ingest --help")
}

/// Create error for a rejected archive
pub fn archive_rejected(detail: &str) -> CliError {
    CliError::new("Archive rejected")
        .with_context(format!("The archive could not be staged safely.\n\nError: {}", detail))
        .with_suggestion("Re-create the archive from the series folder")
        .with_suggestion("Entries must use relative paths without '..'")
}

/// Create error for invalid configuration
pub fn invalid_config(detail: &str) -> CliError {
    CliError::new("Invalid configuration")
        .with_context(format!("Configuration value is invalid.\n\nReason: {}", detail))
        .with_suggestion("Check dicomesh.toml for syntax errors")
        .with_suggestion("Check DICOMESH_* environment variables")
        .with_help("Run: dicomesh config")
}

/// Convert anyhow::Error to CliError with context
pub fn from_anyhow(error: anyhow::Error) -> CliError {
    if let Some(cli_error) = error.downcast_ref::<CliError>() {
        return CliError {
            message: cli_error.message.clone(),
            context: cli_error.context.clone(),
            suggestions: cli_error.suggestions.clone(),
            help_command: cli_error.help_command.clone(),
        };
    }

    let Some(domain) = error.chain().find_map(|e| e.downcast_ref::<DicomeshError>()) else {
        return CliError::new(format!("{:#}", error));
    };

    match domain {
        DicomeshError::ToolNotFound { tool, remediation } => tool_not_found(tool, remediation),
        DicomeshError::JobNotFound { job_id } => job_not_found(job_id),
        DicomeshError::NoRecognizedSlices { .. }
        | DicomeshError::NoInputStaged { .. }
        | DicomeshError::SampleEmpty { .. } => no_slices(&domain.to_string()),
        _ => match domain.category() {
            ErrorCategory::Archive => archive_rejected(&domain.to_string()),
            ErrorCategory::Config => invalid_config(&domain.to_string()),
            ErrorCategory::Launch => CliError::new("Could not start the conversion tool")
                .with_context(format!("Error: {}", domain))
                .with_suggestion(
                    "Check that the executable is not corrupt and its interpreter exists",
                )
                .with_help("Run: dicomesh doctor --verbose"),
            ErrorCategory::System => CliError::new(format!("{:#}", error))
                .with_suggestion("Check file permissions and free disk space"),
            ErrorCategory::Input | ErrorCategory::ToolUnavailable => {
                CliError::new(domain.to_string())
            }
        },
    }
}
