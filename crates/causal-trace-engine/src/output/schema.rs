//! JSON schema of the import summary.
//!
//! The summary is a human-oriented digest of an imported trace, not a full
//! export of the event graph. Schema is versioned to allow future evolution.

use crate::importer::ImportedTrace;
use crate::utils::config::SUMMARY_VERSION;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level summary written to JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Schema version for compatibility checking
    pub version: String,

    /// Metadata file the trace was imported from
    pub source: String,

    /// Timestamp when the summary was generated
    pub generated_at: String,

    pub processes: u32,
    pub tasks: usize,
    pub events: usize,

    /// Event counts keyed by function group name
    #[serde(default)]
    pub events_by_group: BTreeMap<String, usize>,

    pub messages: usize,
    pub unmatched_messages: usize,

    /// Processes whose logs could not be ingested
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureSummary>,

    /// Causality violations left after stepping
    #[serde(default)]
    pub violations: usize,

    pub partitions: Vec<PartitionSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub process: u32,
    pub reason: String,
}

/// One current partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub id: usize,

    /// Comma separated task ids
    pub tasks: String,

    pub events: usize,
    pub max_step: i64,
    pub dag_leap: i64,
}

/// Build the summary of an imported trace
///
/// **Public** - main conversion used by the import command
///
/// # Arguments
/// * `imported` - Result of the import pipeline
/// * `source` - Displayable origin of the trace, usually the `.sts` path
pub fn to_summary(imported: &ImportedTrace, source: &str) -> TraceSummary {
    let trace = &imported.trace;
    let report = &imported.report;

    let partitions = trace
        .partitions
        .iter_current()
        .map(|p| PartitionSummary {
            id: p.id.0,
            tasks: p.task_string(),
            events: p.num_events(),
            max_step: p.max_step,
            dag_leap: p.dag_leap,
        })
        .collect();

    let mut events_by_group = BTreeMap::new();
    for event in &trace.events {
        let group = trace
            .functions
            .get(event.function)
            .and_then(|f| trace.functions.group_name(f.group))
            .unwrap_or("Unknown");
        *events_by_group.entry(group.to_string()).or_insert(0) += 1;
    }

    TraceSummary {
        version: SUMMARY_VERSION.to_string(),
        source: source.to_string(),
        generated_at: Utc::now().to_rfc3339(),
        processes: report.processes,
        tasks: trace.num_tasks(),
        events: trace.events.len(),
        events_by_group,
        messages: trace.messages.len(),
        unmatched_messages: report.unmatched_messages,
        failures: report
            .failures
            .iter()
            .map(|f| FailureSummary {
                process: f.process,
                reason: f.error.to_string(),
            })
            .collect(),
        violations: report.stepping.violations.len(),
        partitions,
    }
}

impl TraceSummary {
    /// Largest partition max step
    pub fn max_step(&self) -> i64 {
        self.partitions
            .iter()
            .map(|p| p.max_step)
            .max()
            .unwrap_or(0)
    }
}
