//! Trace import pipeline.
//!
//! Stages, in order:
//! - read and ingest every process log (parallel, per-process failures kept)
//! - resolve array actors into tasks (after all processes are done)
//! - build call trees, messages and the comm chain
//! - link partitions, step them, then compute dag leaps and mergable sets

pub mod builder;
pub mod ingest;
pub mod tasks;

// Re-export main types
pub use builder::{link_comm_chain, EventGraphBuilder};
pub use ingest::{ingest_records, ParseState};
pub use tasks::{TaskEvents, TaskResolver};

use crate::matching::MessageMatcher;
use crate::metrics::{build_cluster_vectors, calculate_dag_leaps, set_all_mergables};
use crate::model::{RawEvent, Trace};
use crate::parser::{log_path, read_log, read_sts, Record, TraceMetadata};
use crate::stepping::{SteppingEngine, SteppingReport};
use crate::utils::error::{ImportError, ParseError};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for an import, loadable from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Exclude neighbours separated by a collective from the mergable sets
    pub consider_collectives: bool,

    /// Event metric to build cluster vectors for after stepping
    pub cluster_metric: Option<String>,

    /// Ingest processes and build task trees on the rayon pool
    pub parallel: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            consider_collectives: false,
            cluster_metric: None,
            parallel: true,
        }
    }
}

/// Load import options from a TOML file
///
/// **Public** - missing keys take their defaults
///
/// # Errors
/// * `ImportError::InvalidPath` - File does not exist
/// * `ImportError::OptionsParseFailed` - Not valid options TOML
pub fn load_options(path: impl AsRef<Path>) -> Result<ImportOptions, ImportError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ImportError::InvalidPath(format!(
            "Options file not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let options = toml::from_str(&content)?;
    Ok(options)
}

/// A process whose log could not be ingested
#[derive(Debug)]
pub struct ProcessFailure {
    pub process: u32,
    pub error: ParseError,
}

/// Counts and data-state anomalies gathered during an import
#[derive(Debug, Default)]
pub struct ImportReport {
    pub processes: u32,
    pub raw_events: usize,

    /// Raw events of actors that are not tasks
    pub dropped_events: usize,

    /// Leave records with no open enter
    pub unbalanced: usize,

    /// Messages missing a sender or receiver event
    pub unmatched_messages: usize,

    pub failures: Vec<ProcessFailure>,
    pub stepping: SteppingReport,
    pub max_dag_leap: i64,
}

/// Result of a successful import
#[derive(Debug)]
pub struct ImportedTrace {
    pub metadata: TraceMetadata,
    pub trace: Trace,
    pub report: ImportReport,
}

/// Import a trace from its `.sts` metadata and the logs beside it
///
/// **Public** - main entry point for the import command
///
/// # Arguments
/// * `sts_path` - Path to `<base>.sts`; process `i` is read from `<base>.i.log`
/// * `options` - Import options
///
/// # Returns
/// The stepped trace plus a report. Processes whose log is missing or
/// malformed are listed in `report.failures`, the rest are still imported.
///
/// # Errors
/// * `ImportError::InvalidPath` - Metadata file does not exist
/// * `ImportError::Metadata` - Metadata could not be parsed
/// * `ImportError::NoProcesses` - Metadata declares zero processes
pub fn import_trace(
    sts_path: impl AsRef<Path>,
    options: &ImportOptions,
) -> Result<ImportedTrace, ImportError> {
    let sts_path = sts_path.as_ref();
    if !sts_path.exists() {
        return Err(ImportError::InvalidPath(format!(
            "Metadata file not found: {}",
            sts_path.display()
        )));
    }

    info!("Reading trace metadata from: {}", sts_path.display());
    let metadata = read_sts(sts_path)?;
    if metadata.processes == 0 {
        return Err(ImportError::NoProcesses);
    }

    let version = metadata.version;
    Ok(run_pipeline(metadata, options, |process| {
        read_log(log_path(sts_path, process), version)
    }))
}

/// Import already parsed records
///
/// **Public** - `logs[i]` holds the records of process `i`
pub fn import_records(
    metadata: TraceMetadata,
    logs: &[Vec<Record>],
    options: &ImportOptions,
) -> ImportedTrace {
    run_pipeline(metadata, options, |process| {
        Ok(logs.get(process as usize).cloned().unwrap_or_default())
    })
}

/// Run every stage after metadata is known
///
/// **Private** - shared by file and in-memory imports
fn run_pipeline<F>(metadata: TraceMetadata, options: &ImportOptions, load: F) -> ImportedTrace
where
    F: Fn(u32) -> Result<Vec<Record>, ParseError> + Sync,
{
    let matcher = MessageMatcher::new(metadata.processes);
    let ingest = |process: u32| -> Result<Vec<RawEvent>, ParseError> {
        let records = load(process)?;
        ingest_records(process, &records, &metadata, &matcher)
    };

    info!("Ingesting {} processes", metadata.processes);
    let results: Vec<Result<Vec<RawEvent>, ParseError>> = if options.parallel {
        (0..metadata.processes).into_par_iter().map(ingest).collect()
    } else {
        (0..metadata.processes).map(ingest).collect()
    };

    let mut report = ImportReport {
        processes: metadata.processes,
        ..Default::default()
    };
    let mut processes = Vec::with_capacity(results.len());
    for (process, result) in (0u32..).zip(results) {
        match result {
            Ok(events) => processes.push(events),
            Err(error) => {
                warn!("Process {} failed: {}", process, error);
                report.failures.push(ProcessFailure { process, error });
                processes.push(Vec::new());
            }
        }
    }
    report.raw_events = processes.iter().map(Vec::len).sum();

    let resolver = TaskResolver::resolve(&processes, &metadata);
    let assigned = resolver.assign(processes);
    report.dropped_events = assigned.dropped;

    let (tasks, groups) = resolver.into_parts();
    let mut trace = Trace::new(metadata.function_table(), tasks, groups);

    info!("Building event graph for {} tasks", trace.num_tasks());
    let functions = trace.functions.clone();
    let builder = EventGraphBuilder::new(&functions);
    let builder = if options.parallel {
        builder
    } else {
        builder.sequential()
    };
    report.unbalanced = builder.build(&mut trace, &assigned.events, matcher.into_messages());

    report.unmatched_messages = trace.unmatched_messages().len();
    if report.unmatched_messages > 0 {
        warn!(
            "{} messages are missing a send or receive",
            report.unmatched_messages
        );
    }

    info!("Stepping {} partitions", trace.partitions.current_ids().len());
    trace.link_partitions();
    report.stepping = SteppingEngine::new().step_trace(&mut trace);
    report.max_dag_leap = calculate_dag_leaps(&mut trace);
    set_all_mergables(&mut trace, options.consider_collectives);

    if let Some(metric) = &options.cluster_metric {
        let built: usize = trace
            .partitions
            .current_ids()
            .into_iter()
            .map(|pid| build_cluster_vectors(&mut trace, pid, metric))
            .sum();
        debug!("Built {} cluster vectors for metric {}", built, metric);
    }

    ImportedTrace {
        metadata,
        trace,
        report,
    }
}
