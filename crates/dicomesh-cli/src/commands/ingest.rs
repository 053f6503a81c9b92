//! `ingest` and `stage-sample`

use super::Context;
use crate::cli::{IngestArgs, StageSampleArgs};
use crate::dry_run::{display_planned_actions, ActionType, PlannedAction};
use crate::errors;
use crate::output_types::StagedOutput;
use crate::progress::{create_progress_bar, finish_error, finish_success};
use anyhow::{Context as _, Result};
use dicomesh_core::ingest::ProgressFn;
use dicomesh_core::models::job::INPUT_DIR;
use dicomesh_core::models::ConversionJob;
use dicomesh_core::{SampleSeries, UploadedFile};
use std::fs;
use std::path::{Path, PathBuf};

pub fn execute(args: IngestArgs, ctx: &Context) -> Result<()> {
    let paths = expand_inputs(&args.files)?;

    if ctx.dry_run {
        return display_planned_actions(&ctx.output, &plan_uploads(ctx, &paths));
    }

    let job = stage_files(ctx, &paths)?;
    report_staged(ctx, &job)
}

pub fn execute_sample(args: StageSampleArgs, ctx: &Context) -> Result<()> {
    let sample = lookup_sample(ctx, &args.name)?;

    if ctx.dry_run {
        return display_planned_actions(&ctx.output, &plan_sample(ctx, &sample));
    }

    let job = stage_sample(ctx, &sample)?;
    report_staged(ctx, &job)
}

/// Directories stand for the files directly inside them, in name order
pub(super) fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(input)
                .with_context(|| format!("Failed to read directory {}", input.display()))?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.is_file())
                .collect();
            entries.sort();
            paths.extend(entries);
        } else if input.is_file() {
            paths.push(input.clone());
        } else {
            anyhow::bail!("Input not found: {}", input.display());
        }
    }

    Ok(paths)
}

pub(super) fn lookup_sample(ctx: &Context, name: &str) -> Result<SampleSeries> {
    let jobs = ctx.storage.jobs();
    match jobs.find_sample(name)? {
        Some(sample) => Ok(sample),
        None => {
            let available: Vec<String> = jobs
                .discover_samples()?
                .into_iter()
                .map(|sample| sample.name)
                .collect();
            Err(errors::sample_not_found(name, &available).into())
        }
    }
}

pub(super) fn stage_files(ctx: &Context, paths: &[PathBuf]) -> Result<ConversionJob> {
    let files = paths
        .iter()
        .map(|path| {
            UploadedFile::from_path(path)
                .with_context(|| format!("Failed to read {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let pb = create_progress_bar(files.len() as u64, "Staging uploads", ctx.output.is_json());
    let mut report = |done: usize, total: usize| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    };
    let progress: ProgressFn<'_> = &mut report;

    match ctx.storage.ingest.ingest_uploads(&files, Some(progress)) {
        Ok(job) => {
            finish_success(&pb, &format!("Staged {} file(s)", files.len()));
            Ok(job)
        }
        Err(e) => {
            finish_error(&pb, "Staging failed");
            Err(e).context("Failed to stage uploads")
        }
    }
}

pub(super) fn stage_sample(ctx: &Context, sample: &SampleSeries) -> Result<ConversionJob> {
    ctx.storage
        .ingest
        .stage_sample(&sample.path)
        .with_context(|| format!("Failed to stage sample {}", sample.name))
}

pub(super) fn plan_uploads(ctx: &Context, paths: &[PathBuf]) -> Vec<PlannedAction> {
    let mut actions = vec![new_job_action(ctx)];

    for path in paths {
        let is_zip = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);
        let action = if is_zip {
            PlannedAction::new(ActionType::ExtractArchive, format!("Extract {}", path.display()))
                .with_detail("Entries escaping the staging directory are rejected")
        } else {
            PlannedAction::new(ActionType::CopyFile, format!("Copy {}", path.display()))
        };
        actions.push(action);
    }

    actions.push(job_record_action());
    actions
}

pub(super) fn plan_sample(ctx: &Context, sample: &SampleSeries) -> Vec<PlannedAction> {
    vec![
        new_job_action(ctx),
        PlannedAction::new(ActionType::CopyFile, format!("Copy sample {}", sample.name))
            .with_detail(format!("From: {}", sample.path.display()))
            .with_detail(format!("Slices: {}", sample.file_count)),
        job_record_action(),
    ]
}

fn new_job_action(ctx: &Context) -> PlannedAction {
    let root: &Path = ctx.storage.jobs().conversions_root();
    PlannedAction::new(ActionType::CreateDirectory, "Create a new job directory")
        .with_detail(format!("Under: {}", root.display()))
        .with_detail(format!("Inputs go to <job>/{}", INPUT_DIR))
}

fn job_record_action() -> PlannedAction {
    PlannedAction::new(ActionType::WriteFile, "Write the staging record job.json")
}

fn report_staged(ctx: &Context, job: &ConversionJob) -> Result<()> {
    let staged = StagedOutput::from(job);

    if ctx.output.is_json() {
        return ctx.output.result(staged);
    }

    ctx.output.success(format!("Staged {} as {}", staged.label, staged.job_id));
    ctx.output.kv("DICOM slices", staged.dicom_count);
    ctx.output.kv("Input directory", &staged.input_dir);
    ctx.output.info(format!("Next: dicomesh run {}", staged.job_id));
    Ok(())
}
