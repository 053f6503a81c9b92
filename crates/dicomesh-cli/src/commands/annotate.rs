use super::{load_for_update, Context};
use crate::cli::{AnnotateAddArgs, AnnotateArgs, AnnotateCommand, ListArgs, RemoveArgs};
use crate::dry_run::{display_planned_actions, ActionType, PlannedAction};
use crate::output_types::AnnotationRow;
use anyhow::{bail, Result};
use dicomesh_core::models::annotation::{
    DEFAULT_LABEL_COLOR, DEFAULT_LABEL_SIZE, DEFAULT_MARKER_COLOR,
};
use dicomesh_core::models::{Annotation, AnnotationBody, AnnotationKind};
use dicomesh_store::JobRecordRepository;

pub fn execute(args: AnnotateArgs, ctx: &Context) -> Result<()> {
    match args.command {
        AnnotateCommand::Add(args) => add(args, ctx),
        AnnotateCommand::List(args) => list(args, ctx),
        AnnotateCommand::Remove(args) => remove(args, ctx),
    }
}

fn add(args: AnnotateAddArgs, ctx: &Context) -> Result<()> {
    let job_id = args.job_id.trim().to_string();
    let annotation = build_annotation(&job_id, args)?;
    let store = &ctx.storage.annotations;

    if ctx.dry_run {
        let action = PlannedAction::new(ActionType::ModifyFile, "Append an annotation")
            .with_detail(format!("File: {}", store.record_file(&job_id)?.display()))
            .with_detail(format!("Kind: {}", annotation.kind()));
        return display_planned_actions(&ctx.output, &[action]);
    }

    let mut records = load_for_update(store, &job_id)?;
    let annotation_id = annotation.annotation_id.clone();
    records.push(annotation);

    let saved = store.save(&job_id, records)?;
    let Some(stored) = saved.iter().find(|a| a.annotation_id == annotation_id) else {
        bail!("Annotation {} was not persisted", annotation_id);
    };

    if ctx.output.is_json() {
        return ctx.output.result(stored);
    }
    ctx.output.success(format!(
        "Added {} {} to {} ({} total)",
        stored.kind(),
        stored.annotation_id,
        job_id,
        saved.len()
    ));
    Ok(())
}

/// Arrows take their direction from `--tip` when given, else `--direction`
fn build_annotation(job_id: &str, args: AnnotateAddArgs) -> Result<Annotation> {
    let annotation = match args.kind {
        AnnotationKind::Marker => Annotation::marker(
            job_id,
            args.at,
            args.text,
            args.color.unwrap_or_else(|| DEFAULT_MARKER_COLOR.to_string()),
            args.notes,
        ),
        AnnotationKind::Arrow => {
            let direction = match (args.tip, args.direction) {
                (Some(tip), _) => tip - args.at,
                (None, Some(direction)) => direction,
                (None, None) => bail!("An arrow needs --direction or --tip"),
            };
            if direction.magnitude_squared() == 0.0 {
                bail!("An arrow needs a non-zero direction");
            }

            let mut arrow = Annotation::arrow(
                job_id,
                args.at,
                direction,
                args.text,
                args.color.unwrap_or_else(|| DEFAULT_MARKER_COLOR.to_string()),
                args.notes,
            );
            if let AnnotationBody::Arrow { tip_point, .. } = &mut arrow.body {
                *tip_point = args.tip;
            }
            arrow
        }
        AnnotationKind::Label => {
            if args.text.trim().is_empty() {
                bail!("A label needs --text");
            }
            let size = args.size.unwrap_or(DEFAULT_LABEL_SIZE);
            if !(size.is_finite() && size > 0.0) {
                bail!("Label size must be a positive number, got {}", size);
            }
            Annotation::label(
                job_id,
                args.at,
                args.text,
                args.color.unwrap_or_else(|| DEFAULT_LABEL_COLOR.to_string()),
                size,
            )
        }
    };
    Ok(annotation)
}

fn list(args: ListArgs, ctx: &Context) -> Result<()> {
    let ids = (!args.job_ids.is_empty()).then_some(args.job_ids.as_slice());
    let annotations = ctx.storage.annotations.list_all(ids)?;

    if ctx.output.is_json() {
        return ctx.output.result(annotations);
    }
    ctx.output.table(annotations.iter().map(AnnotationRow::from).collect())
}

fn remove(args: RemoveArgs, ctx: &Context) -> Result<()> {
    let store = &ctx.storage.annotations;

    if ctx.dry_run {
        let file = store.record_file(&args.job_id)?;
        let action =
            PlannedAction::new(ActionType::ModifyFile, format!("Remove annotation {}", args.id))
                .with_detail(format!("File: {}", file.display()));
        return display_planned_actions(&ctx.output, &[action]);
    }

    if !store.remove(&args.job_id, &args.id)? {
        bail!("Annotation {} not found in job {}", args.id, args.job_id);
    }
    ctx.output.success(format!("Removed annotation {}", args.id));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicomesh_core::models::{Point3, Vector3};

    fn args(kind: AnnotationKind) -> AnnotateAddArgs {
        AnnotateAddArgs {
            job_id: "job-1".to_string(),
            kind,
            at: Point3::new(1.0, 1.0, 1.0),
            direction: None,
            tip: None,
            text: "Apex".to_string(),
            color: None,
            notes: String::new(),
            size: None,
        }
    }

    #[test]
    fn test_arrow_tip_wins_over_direction() {
        let mut arrow = args(AnnotationKind::Arrow);
        arrow.direction = Some(Vector3::new(9.0, 9.0, 9.0));
        arrow.tip = Some(Point3::new(2.0, 3.0, 4.0));

        let annotation = build_annotation("job-1", arrow).unwrap();
        match annotation.body {
            AnnotationBody::Arrow { direction, tip_point, .. } => {
                assert_eq!(direction, Vector3::new(1.0, 2.0, 3.0));
                assert_eq!(tip_point, Some(Point3::new(2.0, 3.0, 4.0)));
            }
            other => panic!("expected arrow, got {other:?}"),
        }
    }

    #[test]
    fn test_arrow_requires_direction() {
        assert!(build_annotation("job-1", args(AnnotationKind::Arrow)).is_err());
    }

    #[test]
    fn test_defaults_per_kind() {
        let marker = build_annotation("job-1", args(AnnotationKind::Marker)).unwrap();
        assert!(matches!(
            &marker.body,
            AnnotationBody::Marker { color, .. } if color == DEFAULT_MARKER_COLOR
        ));

        let label = build_annotation("job-1", args(AnnotationKind::Label)).unwrap();
        assert!(matches!(
            label.body,
            AnnotationBody::Label { size, .. } if size == DEFAULT_LABEL_SIZE
        ));
    }
}
