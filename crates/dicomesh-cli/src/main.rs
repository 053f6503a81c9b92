//! dicomesh CLI - command-line front end for staging and converting DICOM series

mod cli;
mod commands;
mod config_loader;
mod dry_run;
mod errors;
mod output;
mod output_types;
mod progress;
mod storage;

use clap::Parser;
use cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    let outcome = tokio::runtime::Runtime::new()
        .map_err(anyhow::Error::from)
        .and_then(|runtime| runtime.block_on(commands::execute(cli)));

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error = errors::from_anyhow(e);
            if json {
                match serde_json::to_string_pretty(&error.to_json()) {
                    Ok(text) => eprintln!("{}", text),
                    Err(_) => eprintln!("{}", error),
                }
            } else {
                error.display();
            }
            ExitCode::FAILURE
        }
    }
}
