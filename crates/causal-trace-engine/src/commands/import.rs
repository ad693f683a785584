//! Import command implementation.
//!
//! The import command:
//! 1. Loads import options (file, then CLI overrides)
//! 2. Runs the import pipeline
//! 3. Writes the JSON summary
//! 4. Optionally prints a text summary

use crate::commands::models::ImportArgs;
use crate::importer::{import_trace, load_options, ImportOptions};
use crate::output::{render_text_summary, to_summary, write_summary};
use anyhow::{Context, Result};
use log::{info, warn};
use std::time::Instant;

/// Execute the import command
///
/// **Public** - main entry point called from main.rs
///
/// # Arguments
/// * `args` - Import command arguments
///
/// # Returns
/// Ok if the import succeeds, Err with context if any step fails.
/// Per-process log failures are reported, not returned.
pub fn execute_import(args: ImportArgs) -> Result<()> {
    let start_time = Instant::now();

    info!("Starting import of: {}", args.sts.display());

    let options = resolve_options(&args)?;
    let imported = import_trace(&args.sts, &options)
        .with_context(|| format!("Failed to import trace {}", args.sts.display()))?;

    for failure in &imported.report.failures {
        warn!(
            "Process {} was not imported: {}",
            failure.process, failure.error
        );
    }

    let summary = to_summary(&imported, &args.sts.display().to_string());

    if let Some(output) = &args.output {
        write_summary(&summary, output).context("Failed to write summary JSON")?;
        info!("✓ Summary written to: {}", output.display());
    }

    if args.print_summary {
        println!("{}", render_text_summary(&summary));
    }

    info!(
        "Import completed in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Merge the options file with CLI overrides
///
/// **Private** - internal helper for execute_import
fn resolve_options(args: &ImportArgs) -> Result<ImportOptions> {
    let mut options = match &args.options_file {
        Some(path) => load_options(path)
            .with_context(|| format!("Failed to load options from {}", path.display()))?,
        None => ImportOptions::default(),
    };

    if args.consider_collectives {
        options.consider_collectives = true;
    }
    if let Some(metric) = &args.metric {
        options.cluster_metric = Some(metric.clone());
    }
    if args.sequential {
        options.parallel = false;
    }

    Ok(options)
}

/// Validate import arguments
///
/// **Public** - can be called before execute_import for early validation
pub fn validate_args(args: &ImportArgs) -> Result<()> {
    if args.sts.as_os_str().is_empty() {
        anyhow::bail!("Metadata path cannot be empty");
    }

    if args.sts.extension().and_then(|e| e.to_str()) != Some("sts") {
        anyhow::bail!("Metadata file must have the .sts extension");
    }

    if !args.sts.exists() {
        anyhow::bail!("Metadata file not found: {}", args.sts.display());
    }

    if let Some(metric) = &args.metric {
        if metric.trim().is_empty() {
            anyhow::bail!("Metric name cannot be empty");
        }
    }

    if args.output.is_none() && !args.print_summary {
        anyhow::bail!("Nothing to do: give --output or --summary");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_cli_overrides_options() {
        let args = ImportArgs {
            consider_collectives: true,
            metric: Some("lateness".to_string()),
            sequential: true,
            ..Default::default()
        };

        let options = resolve_options(&args).unwrap();
        assert!(options.consider_collectives);
        assert_eq!(options.cluster_metric.as_deref(), Some("lateness"));
        assert!(!options.parallel);
    }

    #[test]
    fn test_validate_rejects_wrong_extension() {
        let args = ImportArgs {
            sts: PathBuf::from("trace.log"),
            ..Default::default()
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_path() {
        assert!(validate_args(&ImportArgs::default()).is_err());
    }
}
