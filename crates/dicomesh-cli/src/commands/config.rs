use super::Context;
use crate::output_types::ConfigRow;
use anyhow::Result;

pub fn execute(ctx: &Context) -> Result<()> {
    let mut rows: Vec<ConfigRow> = ctx
        .config
        .to_inspection_map()
        .into_iter()
        .map(|(key, (value, source))| ConfigRow::new(key, value, source))
        .collect();
    rows.sort_by(|a, b| a.key.cmp(&b.key));

    ctx.output.table(rows)
}
