use crate::output::read_summary;
use crate::utils::config::SUMMARY_VERSION;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Validate a summary JSON file
pub fn validate_summary_file(file_path: PathBuf) -> Result<()> {
    println!("Validating summary: {}", file_path.display());

    let summary = read_summary(&file_path)
        .with_context(|| format!("Invalid summary file {}", file_path.display()))?;

    if summary.version != SUMMARY_VERSION {
        println!(
            "! Schema version {} differs from current {}",
            summary.version, SUMMARY_VERSION
        );
    }

    println!("✓ Valid summary JSON");
    println!("  Version: {}", summary.version);
    println!("  Source: {}", summary.source);
    println!("  Tasks: {}", summary.tasks);
    println!("  Events: {}", summary.events);
    println!(
        "  Messages: {} ({} unmatched)",
        summary.messages, summary.unmatched_messages
    );
    println!("  Partitions: {}", summary.partitions.len());

    Ok(())
}

/// Display version information
pub fn display_version() {
    println!("Causal Trace v{}", env!("CARGO_PKG_VERSION"));
    println!("Summary Schema: v{}", SUMMARY_VERSION);
    println!();
    println!("Reconstructs causally stepped partitions from parallel trace logs.");
}
