//! Command implementations

mod annotate;
mod config;
mod doctor;
mod history;
mod ingest;
mod run;
mod samples;
mod snapshot;

use crate::cli::{Cli, Commands};
use crate::config_loader::load_config;
use crate::output::OutputWriter;
use crate::storage::Storage;
use anyhow::{bail, Result};
use dicomesh_core::config::{CliConfigOverrides, LayeredConfig};
use dicomesh_store::{JobRecordRepository, LoadOutcome};

/// Everything a command runs against
pub struct Context {
    pub output: OutputWriter,
    pub dry_run: bool,
    pub config: LayeredConfig,
    pub storage: Storage,
}

/// Execute a CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let overrides = CliConfigOverrides {
        conversions_root: cli.conversions_root,
        samples_root: cli.samples_root,
        tool_name: cli.tool,
    };
    let config = load_config(cli.config.as_deref(), overrides)?;
    tracing::debug!(
        "Using conversions root {} and samples root {}",
        config.conversions_root.value.display(),
        config.samples_root.value.display()
    );

    let mut ctx = Context {
        output: OutputWriter::new(cli.json),
        dry_run: cli.dry_run,
        storage: Storage::from_config(&config),
        config,
    };

    match cli.command {
        Commands::Samples => samples::execute(&ctx),
        Commands::Ingest(args) => ingest::execute(args, &ctx),
        Commands::StageSample(args) => ingest::execute_sample(args, &ctx),
        Commands::Run(args) => run::execute(args, &mut ctx).await,
        Commands::Convert(args) => run::execute_convert(args, &mut ctx).await,
        Commands::History(args) => history::execute(args, &ctx),
        Commands::Show(args) => history::execute_show(args, &ctx),
        Commands::Annotate(args) => annotate::execute(args, &ctx),
        Commands::Snapshot(args) => snapshot::execute(args, &ctx),
        Commands::Config => config::execute(&ctx),
        Commands::Doctor(args) => doctor::execute(args, &ctx),
    }
}

/// Current records of a job before appending; an unreadable file is an error
fn load_for_update<R: JobRecordRepository>(store: &R, job_id: &str) -> Result<Vec<R::Record>> {
    match store.load_checked(job_id)? {
        LoadOutcome::Missing => Ok(Vec::new()),
        LoadOutcome::Loaded(records) => Ok(records),
        LoadOutcome::Unreadable { path, reason } => {
            bail!("Refusing to overwrite unreadable {}: {}", path.display(), reason)
        }
    }
}
