//! `history` and `show`

use super::Context;
use crate::cli::{HistoryArgs, ShowArgs};
use crate::output_types::{run_status, HistoryRow, RunOutput, StagedOutput};
use anyhow::Result;
use dicomesh_store::{JobRecordRepository, LoadOutcome};

pub fn execute(args: HistoryArgs, ctx: &Context) -> Result<()> {
    let limit = args.limit.unwrap_or(ctx.config.recent_limit.value);
    let results = ctx.storage.results.recent(limit)?;

    if results.is_empty() {
        ctx.output.info("No conversions yet. Try: dicomesh convert --sample <name>");
    }

    let rows: Vec<HistoryRow> = results.iter().rev().map(HistoryRow::from).collect();
    ctx.output.table(rows)
}

pub fn execute_show(args: ShowArgs, ctx: &Context) -> Result<()> {
    let Some(result) = ctx.storage.results.get(&args.job_id)? else {
        // Staged but never run
        let job = ctx.storage.jobs().open_job(&args.job_id)?;
        let staged = StagedOutput::from(&job);
        if ctx.output.is_json() {
            return ctx.output.result(serde_json::json!({
                "status": "staged",
                "job": staged,
            }));
        }
        ctx.output.section(format!("Job {}", staged.job_id));
        ctx.output.kv("Label", &staged.label);
        ctx.output.kv("Status", "staged, not converted");
        ctx.output.kv("DICOM slices", staged.dicom_count);
        ctx.output.info(format!("Run it: dicomesh run {}", staged.job_id));
        return Ok(());
    };

    let annotations = count_records(ctx, &ctx.storage.annotations, &args.job_id)?;
    let snapshots = count_records(ctx, &ctx.storage.snapshots, &args.job_id)?;

    if ctx.output.is_json() {
        return ctx.output.result(serde_json::json!({
            "status": run_status(&result),
            "run": RunOutput::new(&result, args.logs),
            "options": result.options,
            "annotations": annotations,
            "snapshots": snapshots,
        }));
    }

    ctx.output.section(format!("Job {}", result.job.job_id));
    ctx.output.kv("Label", &result.job.label);
    ctx.output.kv("Status", run_status(&result));
    ctx.output.kv("Exit code", result.exit_code);
    ctx.output.kv("Elapsed", format!("{:.1}s", result.elapsed_seconds));
    ctx.output.kv("Completed", result.completed_at.format("%Y-%m-%d %H:%M:%S UTC"));
    ctx.output.kv("Command", result.command.join(" "));
    if result.success {
        ctx.output.kv("Mesh", result.job.output_mesh.display());
    }
    ctx.output.kv("Annotations", annotations);
    ctx.output.kv("Snapshots", snapshots);

    if !result.tool_metadata.is_empty() {
        ctx.output.section("Tool metadata");
        for (key, value) in &result.tool_metadata {
            ctx.output.kv(key, value);
        }
    }

    if args.logs {
        ctx.output.section("stdout");
        println!("{}", result.stdout);
        ctx.output.section("stderr");
        println!("{}", result.stderr);
    }

    Ok(())
}

fn count_records<R: JobRecordRepository>(ctx: &Context, store: &R, job_id: &str) -> Result<usize> {
    Ok(match store.load_checked(job_id)? {
        LoadOutcome::Unreadable { path, reason } => {
            ctx.output.warning(format!("Ignoring unreadable {}: {}", path.display(), reason));
            0
        }
        outcome => outcome.into_records().len(),
    })
}
