//! Invocation of the external mesh extraction tool
//!
//! The tool is an opaque executable. It receives, in this order:
//!
//! ```text
//! <tool> --output <mesh.stl> --meta <meta.txt> --clean
//!        --type <t> --smooth <n> --reduce <f> --clean-small <f>
//!        [--enable largest] [--anisotropic]
//!        <input_dir>
//! ```
//!
//! A non-zero exit code is recorded in the result, not raised as an error.

use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use crate::config::LayeredConfig;
use crate::error::{DicomeshError, Result};
use crate::jobs::{count_recognized_slices, ToolLocator};
use crate::models::result::TERMINATED_EXIT_CODE;
use crate::models::{ConversionJob, ConversionOptions, ConversionResult};

#[derive(Debug, Clone)]
pub struct ConversionRunner {
    locator: ToolLocator,
}

impl ConversionRunner {
    pub fn new(locator: ToolLocator) -> Self {
        Self { locator }
    }

    pub fn from_config(config: &LayeredConfig) -> Self {
        Self::new(ToolLocator::from_config(config))
    }

    /// Full argument vector, program first
    pub fn build_command(
        job: &ConversionJob,
        options: &ConversionOptions,
        program: &Path,
    ) -> Vec<String> {
        let mut command = vec![
            program.display().to_string(),
            "--output".to_string(),
            job.output_mesh.display().to_string(),
            "--meta".to_string(),
            job.tool_metadata_txt.display().to_string(),
            "--clean".to_string(),
        ];
        command.extend(options.to_args());
        command.push(job.input_dir.display().to_string());
        command
    }

    /// Check preconditions and clear outputs left by an earlier attempt
    fn prepare(
        &self,
        job: &ConversionJob,
        options: &ConversionOptions,
    ) -> Result<(PathBuf, Vec<String>)> {
        options.validate()?;

        if count_recognized_slices(&job.input_dir) == 0 {
            return Err(DicomeshError::NoInputStaged {
                dir: job.input_dir.clone(),
            });
        }

        let program = self
            .locator
            .resolve()
            .ok_or_else(|| self.locator.not_found_error())?;

        fs::create_dir_all(&job.output_dir)?;
        for stale in [&job.output_mesh, &job.tool_metadata_txt] {
            match fs::remove_file(stale) {
                Ok(()) => tracing::debug!("Removed stale output {}", stale.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let command = Self::build_command(job, options, &program);
        Ok((program, command))
    }

    /// Run the tool to completion, blocking the calling thread
    pub fn run(
        &self,
        job: &ConversionJob,
        options: &ConversionOptions,
    ) -> Result<ConversionResult> {
        let (program, command) = self.prepare(job, options)?;
        tracing::info!("Running {} for job {}", program.display(), job.job_id);

        let start = Instant::now();
        let output = Command::new(&program)
            .args(&command[1..])
            .current_dir(&job.job_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| DicomeshError::LaunchFailed {
                program: program.clone(),
                source,
            })?;
        let elapsed = start.elapsed().as_secs_f64();

        self.finish(
            job,
            options,
            command,
            ProcessOutcome {
                exit_code: output.status.code().unwrap_or(TERMINATED_EXIT_CODE),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                elapsed_seconds: elapsed,
                cancelled: false,
            },
        )
    }

    /// Run the tool until it exits or `cancel` resolves, whichever is first.
    ///
    /// Cancelling kills the child process. The result is still persisted,
    /// flagged as cancelled and unsuccessful; partial output is left in place.
    pub async fn run_cancellable<F>(
        &self,
        job: &ConversionJob,
        options: &ConversionOptions,
        cancel: F,
    ) -> Result<ConversionResult>
    where
        F: Future<Output = ()>,
    {
        let (program, command) = self.prepare(job, options)?;
        tracing::info!("Running {} for job {}", program.display(), job.job_id);

        let start = Instant::now();
        let child = tokio::process::Command::new(&program)
            .args(&command[1..])
            .current_dir(&job.job_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DicomeshError::LaunchFailed {
                program: program.clone(),
                source,
            })?;

        let outcome = tokio::select! {
            output = child.wait_with_output() => {
                let output = output?;
                ProcessOutcome {
                    exit_code: output.status.code().unwrap_or(TERMINATED_EXIT_CODE),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    elapsed_seconds: start.elapsed().as_secs_f64(),
                    cancelled: false,
                }
            }
            _ = cancel => {
                tracing::warn!("Conversion for job {} cancelled; child killed", job.job_id);
                ProcessOutcome {
                    exit_code: TERMINATED_EXIT_CODE,
                    stdout: String::new(),
                    stderr: String::new(),
                    elapsed_seconds: start.elapsed().as_secs_f64(),
                    cancelled: true,
                }
            }
        };

        self.finish(job, options, command, outcome)
    }

    /// Run on tokio's blocking pool so async callers stay responsive
    pub fn spawn_run(
        &self,
        job: ConversionJob,
        options: ConversionOptions,
    ) -> tokio::task::JoinHandle<Result<ConversionResult>> {
        let runner = self.clone();
        tokio::task::spawn_blocking(move || runner.run(&job, &options))
    }

    fn finish(
        &self,
        job: &ConversionJob,
        options: &ConversionOptions,
        command: Vec<String>,
        outcome: ProcessOutcome,
    ) -> Result<ConversionResult> {
        let success = !outcome.cancelled && ConversionResult::is_success(outcome.exit_code, job);

        let result = ConversionResult {
            job: job.clone(),
            options: options.clone(),
            success,
            exit_code: outcome.exit_code,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            elapsed_seconds: outcome.elapsed_seconds,
            completed_at: Utc::now(),
            command,
            tool_metadata: parse_tool_metadata(&job.tool_metadata_txt),
            cancelled: outcome.cancelled,
        };
        result.write()?;

        if result.success {
            tracing::info!(
                "Job {} converted in {:.1}s -> {}",
                job.job_id,
                result.elapsed_seconds,
                job.output_mesh.display()
            );
        } else {
            tracing::warn!(
                "Job {} failed (exit code {}, mesh present: {})",
                job.job_id,
                result.exit_code,
                job.has_mesh()
            );
        }

        Ok(result)
    }
}

struct ProcessOutcome {
    exit_code: i32,
    stdout: String,
    stderr: String,
    elapsed_seconds: f64,
    cancelled: bool,
}

/// Parse the tool's `KEY value` metadata file.
///
/// The first whitespace-delimited token is the key and the trimmed remainder
/// the value; blank and single-token lines are skipped. A missing file gives
/// an empty map.
pub fn parse_tool_metadata(path: &Path) -> BTreeMap<String, String> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            tracing::warn!("Could not read tool metadata {}: {}", path.display(), e);
            return BTreeMap::new();
        }
    };

    parse_metadata_text(&String::from_utf8_lossy(&bytes))
}

pub fn parse_metadata_text(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.split_once(char::is_whitespace))
        .map(|(key, value)| (key.to_string(), value.trim().to_string()))
        .collect()
}
