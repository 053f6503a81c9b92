//! `run` and `convert`

use super::ingest::{
    expand_inputs, lookup_sample, plan_sample, plan_uploads, stage_files, stage_sample,
};
use super::Context;
use crate::cli::{ConvertArgs, RunArgs};
use crate::dry_run::{display_planned_actions, ActionType, PlannedAction};
use crate::errors::CliError;
use crate::output_types::RunOutput;
use crate::progress::{create_spinner, finish_error, finish_success};
use anyhow::Result;
use dicomesh_core::models::{ConversionJob, ConversionOptions, ConversionResult};
use dicomesh_core::ConversionRunner;
use std::path::PathBuf;

/// Lines of tool stderr shown when a run fails
const STDERR_TAIL_LINES: usize = 15;

pub async fn execute(args: RunArgs, ctx: &mut Context) -> Result<()> {
    let options = ConversionOptions::from(args.options);
    options.validate()?;
    let job = ctx.storage.jobs().open_job(&args.job_id)?;

    if ctx.dry_run {
        return display_planned_actions(&ctx.output, &[plan_run(ctx, Some(&job), &options)]);
    }

    run_job(ctx, job, options).await
}

pub async fn execute_convert(args: ConvertArgs, ctx: &mut Context) -> Result<()> {
    let options = ConversionOptions::from(args.options);
    options.validate()?;

    let job = match args.sample {
        Some(name) => {
            let sample = lookup_sample(ctx, &name)?;
            if ctx.dry_run {
                let mut actions = plan_sample(ctx, &sample);
                actions.push(plan_run(ctx, None, &options));
                return display_planned_actions(&ctx.output, &actions);
            }
            stage_sample(ctx, &sample)?
        }
        None => {
            let paths = expand_inputs(&args.files)?;
            if ctx.dry_run {
                let mut actions = plan_uploads(ctx, &paths);
                actions.push(plan_run(ctx, None, &options));
                return display_planned_actions(&ctx.output, &actions);
            }
            stage_files(ctx, &paths)?
        }
    };

    ctx.output.info(format!("Staged {} as {}", job.label, job.job_id));
    run_job(ctx, job, options).await
}

async fn run_job(ctx: &mut Context, job: ConversionJob, options: ConversionOptions) -> Result<()> {
    let pb = create_spinner(&format!("Converting {}", job.label), ctx.output.is_json());

    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let result = match ctx.storage.runner.run_cancellable(&job, &options, cancel).await {
        Ok(result) => result,
        Err(e) => {
            finish_error(&pb, "Conversion did not start");
            return Err(e.into());
        }
    };

    if result.success {
        finish_success(&pb, &format!("Mesh ready in {:.1}s", result.elapsed_seconds));
    } else if result.cancelled {
        finish_error(&pb, "Conversion cancelled");
    } else {
        finish_error(&pb, &format!("Conversion failed (exit code {})", result.exit_code));
    }

    ctx.storage.results.record(result.clone());
    report_result(ctx, &result)
}

fn report_result(ctx: &Context, result: &ConversionResult) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.result(RunOutput::new(result, !result.success))?;
    } else {
        ctx.output.kv("Job", &result.job.job_id);
        ctx.output.kv("Exit code", result.exit_code);
        ctx.output.kv("Elapsed", format!("{:.1}s", result.elapsed_seconds));
        if result.success {
            ctx.output.kv("Mesh", result.job.output_mesh.display());
            for (key, value) in &result.tool_metadata {
                ctx.output.kv(key, value);
            }
        }
    }

    if result.success {
        return Ok(());
    }

    if result.cancelled {
        return Err(CliError::new("Conversion cancelled")
            .with_context(format!(
                "Job {} was stopped before the tool finished.",
                result.job.job_id
            ))
            .with_suggestion(format!("Re-run it: dicomesh run {}", result.job.job_id))
            .into());
    }

    let mut error = CliError::new("Conversion failed").with_context(failure_context(result));
    if result.exit_code == 0 {
        error =
            error.with_suggestion("The tool exited cleanly but wrote no mesh; try another --type");
    }
    Err(error
        .with_suggestion(format!("See the full log: dicomesh show {} --logs", result.job.job_id))
        .into())
}

fn failure_context(result: &ConversionResult) -> String {
    let lines: Vec<&str> = result.stderr.lines().collect();
    let tail = &lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..];

    if tail.is_empty() {
        format!("Exit code {} with no output on stderr.", result.exit_code)
    } else {
        format!("Exit code {}. Last lines of stderr:\n\n{}", result.exit_code, tail.join("\n"))
    }
}

fn plan_run(
    ctx: &Context,
    job: Option<&ConversionJob>,
    options: &ConversionOptions,
) -> PlannedAction {
    let jobs = ctx.storage.jobs();
    let program = jobs
        .resolve_external_tool()
        .unwrap_or_else(|| PathBuf::from(jobs.locator().name()));

    let mut action = PlannedAction::new(ActionType::RunTool, format!("Run {}", program.display()));
    match job {
        Some(job) => {
            let command = ConversionRunner::build_command(job, options, &program);
            action = action
                .with_detail(format!("Job: {}", job.job_id))
                .with_detail(format!("Command: {}", command.join(" ")));
        }
        None => {
            action = action.with_detail(format!("Options: {}", options.to_args().join(" ")));
        }
    }

    if jobs.resolve_external_tool().is_none() {
        action = action.with_detail(format!(
            "Warning: {} is not installed; {}",
            jobs.locator().name(),
            jobs.locator().remediation()
        ));
    }
    action
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dicomesh_core::models::SourceKind;
    use std::collections::BTreeMap;

    fn failed_result(stderr: &str) -> ConversionResult {
        let job = ConversionJob::new(
            "job-1",
            "Upload · a",
            PathBuf::from("/tmp/job-1"),
            SourceKind::Upload,
        );
        ConversionResult {
            job,
            options: ConversionOptions::default(),
            success: false,
            exit_code: 2,
            stdout: String::new(),
            stderr: stderr.to_string(),
            elapsed_seconds: 1.0,
            completed_at: Utc::now(),
            command: vec![],
            tool_metadata: BTreeMap::new(),
            cancelled: false,
        }
    }

    #[test]
    fn test_failure_context_keeps_the_tail() {
        let stderr: String = (0..40).map(|i| format!("line {}\n", i)).collect();
        let context = failure_context(&failed_result(&stderr));

        assert!(context.contains("line 39"));
        assert!(context.contains("line 25"));
        assert!(!context.contains("line 24"));
    }

    #[test]
    fn test_failure_context_without_stderr() {
        let context = failure_context(&failed_result(""));
        assert_eq!(context, "Exit code 2 with no output on stderr.");
    }
}
