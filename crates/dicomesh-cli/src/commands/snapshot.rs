use super::{load_for_update, Context};
use crate::cli::{ListArgs, SnapshotAddArgs, SnapshotArgs, SnapshotCommand, SnapshotShowArgs};
use crate::dry_run::{display_planned_actions, ActionType, PlannedAction};
use crate::output_types::SnapshotRow;
use anyhow::{bail, Context as _, Result};
use dicomesh_core::models::job::{artifact_path, MESH_FILE};
use dicomesh_core::models::Snapshot;
use dicomesh_store::JobRecordRepository;
use std::fs;
use std::path::Path;

pub fn execute(args: SnapshotArgs, ctx: &Context) -> Result<()> {
    match args.command {
        SnapshotCommand::Add(args) => add(args, ctx),
        SnapshotCommand::List(args) => list(args, ctx),
        SnapshotCommand::Show(args) => show(args, ctx),
    }
}

fn add(args: SnapshotAddArgs, ctx: &Context) -> Result<()> {
    let job_id = args.job_id.trim().to_string();
    let store = &ctx.storage.snapshots;

    if ctx.dry_run {
        let mut action = PlannedAction::new(ActionType::ModifyFile, "Append a snapshot")
            .with_detail(format!("File: {}", store.record_file(&job_id)?.display()))
            .with_detail(format!("Image: {}", args.image.display()));
        if let Some(overlay) = &args.overlay {
            action = action.with_detail(format!("Overlay: {}", overlay.display()));
        }
        return display_planned_actions(&ctx.output, &[action]);
    }

    let image = fs::read(&args.image)
        .with_context(|| format!("Failed to read {}", args.image.display()))?;
    let filename = args
        .image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot.png".to_string());

    let job_dir = ctx.storage.jobs().job_dir(&job_id)?;
    let mut snapshot = Snapshot::from_image(
        job_id.as_str(),
        artifact_path(&job_dir, MESH_FILE),
        filename,
        mime_type(&args.image),
        args.notes,
        &image,
    );

    if let Some(overlay_path) = &args.overlay {
        let overlay = fs::read(overlay_path)
            .with_context(|| format!("Failed to read {}", overlay_path.display()))?;
        let shapes = match &args.shapes {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let value: serde_json::Value = serde_json::from_str(&text)
                    .with_context(|| format!("{} is not valid JSON", path.display()))?;
                Some(value)
            }
            None => None,
        };
        snapshot = snapshot.with_overlay(&overlay, shapes);
    }

    let snapshot_id = snapshot.snapshot_id.clone();
    let mut records = load_for_update(store, &job_id)?;
    records.push(snapshot);
    let saved = store.save(&job_id, records)?;

    if ctx.output.is_json() {
        let row = saved
            .iter()
            .find(|s| s.snapshot_id == snapshot_id)
            .map(SnapshotRow::from);
        return ctx.output.result(row);
    }
    ctx.output.success(format!(
        "Stored snapshot {} for {} ({} total)",
        snapshot_id,
        job_id,
        saved.len()
    ));
    Ok(())
}

fn list(args: ListArgs, ctx: &Context) -> Result<()> {
    let ids = (!args.job_ids.is_empty()).then_some(args.job_ids.as_slice());
    let snapshots = ctx.storage.snapshots.list_all(ids)?;
    ctx.output.table(snapshots.iter().map(SnapshotRow::from).collect())
}

fn show(args: SnapshotShowArgs, ctx: &Context) -> Result<()> {
    let Some(snapshot) = ctx.storage.snapshots.find(&args.snapshot_id)? else {
        bail!("Snapshot {} not found", args.snapshot_id);
    };
    let bytes = snapshot.display_bytes()?;

    if let Some(output_path) = &args.output {
        if ctx.dry_run {
            let title = format!("Write {}", output_path.display());
            let action = PlannedAction::new(ActionType::WriteFile, title)
                .with_detail(format!("{} bytes", bytes.len()));
            return display_planned_actions(&ctx.output, &[action]);
        }
        fs::write(output_path, &bytes)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
    }

    if ctx.output.is_json() {
        return ctx.output.result(serde_json::json!({
            "snapshot": SnapshotRow::from(&snapshot),
            "source_mesh": snapshot.source_mesh,
            "mime_type": snapshot.mime_type,
            "bytes": bytes.len(),
            "annotations2d": snapshot.annotations2d,
            "written_to": args.output,
        }));
    }

    ctx.output.section(format!("Snapshot {}", snapshot.snapshot_id));
    ctx.output.kv("Job", &snapshot.job_id);
    ctx.output.kv("File", &snapshot.filename);
    ctx.output.kv("Type", &snapshot.mime_type);
    ctx.output.kv("Mesh", snapshot.source_mesh.display());
    ctx.output.kv("Captured", snapshot.captured_at.format("%Y-%m-%d %H:%M:%S UTC"));
    ctx.output.kv("Overlay", snapshot.annotated_base64.is_some());
    ctx.output.kv("Size", format!("{} bytes", bytes.len()));
    if !snapshot.notes.is_empty() {
        ctx.output.kv("Notes", &snapshot.notes);
    }
    if let Some(path) = &args.output {
        ctx.output.success(format!("Wrote image to {}", path.display()));
    }
    Ok(())
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_from_extension() {
        assert_eq!(mime_type(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_type(Path::new("shot.jpeg")), "image/jpeg");
        assert_eq!(mime_type(Path::new("raw")), "application/octet-stream");
    }
}
