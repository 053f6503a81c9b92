use super::Context;
use crate::output_types::SampleRow;
use anyhow::Result;

pub fn execute(ctx: &Context) -> Result<()> {
    let jobs = ctx.storage.jobs();
    let samples = jobs.discover_samples()?;

    if samples.is_empty() {
        ctx.output.info(format!("No sample series under {}", jobs.samples_root().display()));
    }

    ctx.output.table(samples.into_iter().map(SampleRow::from).collect())
}
