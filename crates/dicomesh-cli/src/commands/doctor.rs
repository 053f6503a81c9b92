use super::Context;
use crate::cli::DoctorArgs;
use crate::output_types::{DoctorCheck, DoctorOutput};
use anyhow::Result;
use console::style;
use dicomesh_core::config::CONFIG_FILE;
use dicomesh_store::ResultRepository;
use std::path::Path;

pub fn execute(args: DoctorArgs, ctx: &Context) -> Result<()> {
    let checks = run_checks(ctx, args.verbose);
    let passed = checks.iter().filter(|c| c.ok).count();
    let total = checks.len();

    if ctx.output.is_json() {
        return ctx.output.result(DoctorOutput { checks, passed, total });
    }

    println!("\n{}", style("dicomesh Health Check").bold().underlined());
    println!("{}", style("═".repeat(60)).dim());
    println!();

    for check in &checks {
        let icon = if check.ok { style("✓").green() } else { style("✗").red() };
        println!("{} {}: {}", icon, check.name, check.detail);
        if let Some(hint) = &check.hint {
            println!("  → {}", hint);
        }
    }

    println!();
    println!("{}", style("═".repeat(60)).dim());

    let percentage = (passed as f64 / total as f64 * 100.0) as usize;
    let status_icon = if passed == total {
        style("✓").green()
    } else if percentage >= 50 {
        style("⚠").yellow()
    } else {
        style("✗").red()
    };
    println!(
        "{} Health: {}/{} checks passed ({}%)",
        status_icon,
        passed,
        total,
        percentage
    );
    println!();

    Ok(())
}

fn run_checks(ctx: &Context, verbose: bool) -> Vec<DoctorCheck> {
    let jobs = ctx.storage.jobs();
    let mut checks = Vec::new();

    checks.push(DoctorCheck {
        name: "Config".to_string(),
        ok: true,
        detail: if Path::new(CONFIG_FILE).is_file() {
            format!("Loaded {}", CONFIG_FILE)
        } else {
            "Using defaults and environment".to_string()
        },
        hint: None,
    });

    let tool = jobs.locator();
    checks.push(match jobs.resolve_external_tool() {
        Some(path) => DoctorCheck {
            name: "Conversion tool".to_string(),
            ok: true,
            detail: if verbose {
                format!("{} at {}", tool.name(), path.display())
            } else {
                format!("{} found", tool.name())
            },
            hint: None,
        },
        None => DoctorCheck {
            name: "Conversion tool".to_string(),
            ok: false,
            detail: format!("{} not found", tool.name()),
            hint: Some(tool.remediation()),
        },
    });

    let root = jobs.conversions_root();
    checks.push(if root.is_dir() {
        let count = jobs.list_job_ids().map(|ids| ids.len()).unwrap_or(0);
        DoctorCheck {
            name: "Conversions root".to_string(),
            ok: true,
            detail: format!("{} ({} job(s))", root.display(), count),
            hint: None,
        }
    } else {
        DoctorCheck {
            name: "Conversions root".to_string(),
            ok: true,
            detail: format!("{} does not exist yet", root.display()),
            hint: Some("It is created by the first ingest".to_string()),
        }
    });

    checks.push(match jobs.discover_samples() {
        Ok(samples) if samples.iter().any(|s| s.file_count > 0) => DoctorCheck {
            name: "Samples".to_string(),
            ok: true,
            detail: if verbose {
                samples
                    .iter()
                    .map(|s| format!("{} ({})", s.name, s.file_count))
                    .collect::<Vec<_>>()
                    .join(", ")
            } else {
                format!("{} series under {}", samples.len(), jobs.samples_root().display())
            },
            hint: None,
        },
        Ok(_) => DoctorCheck {
            name: "Samples".to_string(),
            ok: false,
            detail: format!("No usable series under {}", jobs.samples_root().display()),
            hint: Some("Set samples_root in dicomesh.toml or DICOMESH_SAMPLES_ROOT".to_string()),
        },
        Err(e) => DoctorCheck {
            name: "Samples".to_string(),
            ok: false,
            detail: e.to_string(),
            hint: None,
        },
    });

    checks.push(match ctx.storage.results.repository().load_recent(1) {
        Ok(recent) => DoctorCheck {
            name: "History".to_string(),
            ok: true,
            detail: match recent.last() {
                Some(last) => format!(
                    "Last run {} ({})",
                    last.job.job_id,
                    crate::output_types::run_status(last)
                ),
                None => "No runs recorded".to_string(),
            },
            hint: None,
        },
        Err(e) => DoctorCheck {
            name: "History".to_string(),
            ok: false,
            detail: e.to_string(),
            hint: Some("Check permissions on the conversions root".to_string()),
        },
    });

    checks
}
