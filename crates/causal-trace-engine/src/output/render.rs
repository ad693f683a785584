//! Terminal rendering of an import summary.

use super::schema::TraceSummary;
use colored::*;

/// Number of partitions listed in the terminal summary
const SHOWN_PARTITIONS: usize = 10;

/// Render a human-readable summary for the terminal
pub fn render_text_summary(summary: &TraceSummary) -> String {
    let mut out = String::new();

    out.push_str(&render_header(summary));
    out.push_str(&render_counts(summary));
    out.push_str(&render_partitions(summary));
    out.push_str(&render_status(summary));

    out
}

fn render_header(summary: &TraceSummary) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&"Causal Trace Summary".bold().to_string());
    out.push_str("\n---------------------------------------------------\n");
    out.push_str(&format!("Source: {}\n", summary.source));
    out.push_str("---------------------------------------------------\n");
    out
}

fn render_counts(summary: &TraceSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("Processes:  {}\n", summary.processes));
    out.push_str(&format!("Tasks:      {}\n", summary.tasks));
    out.push_str(&format!("Events:     {}\n", summary.events));
    for (group, count) in &summary.events_by_group {
        out.push_str(&format!("  {:<8} {}\n", group, count));
    }
    out.push_str(&format!(
        "Messages:   {} ({} unmatched)\n",
        summary.messages, summary.unmatched_messages
    ));
    out.push_str(&format!(
        "Partitions: {} (max step {})\n",
        summary.partitions.len(),
        summary.max_step()
    ));
    out
}

fn render_partitions(summary: &TraceSummary) -> String {
    let mut out = String::new();
    if summary.partitions.is_empty() {
        return out;
    }

    let mut largest: Vec<_> = summary.partitions.iter().collect();
    largest.sort_by(|a, b| b.events.cmp(&a.events).then(a.id.cmp(&b.id)));

    out.push_str("\nLargest partitions:\n");
    for p in largest.iter().take(SHOWN_PARTITIONS) {
        out.push_str(&format!(
            "  #{:<6} {:>6} events  steps 0..{:<5} leap {:<4} tasks {}\n",
            p.id, p.events, p.max_step, p.dag_leap, p.tasks
        ));
    }
    out
}

fn render_status(summary: &TraceSummary) -> String {
    let mut out = String::new();
    out.push_str("\n---------------------------------------------------\n");

    for failure in &summary.failures {
        out.push_str(&format!(
            "{}\n",
            format!("Process {} skipped: {}", failure.process, failure.reason).yellow()
        ));
    }

    let status = if summary.violations > 0 {
        format!(
            "STATUS: {} causality violations left after stepping",
            summary.violations
        )
        .red()
        .bold()
    } else if !summary.failures.is_empty() || summary.unmatched_messages > 0 {
        "STATUS: IMPORTED WITH WARNINGS".yellow().bold()
    } else {
        "STATUS: OK".green().bold()
    };
    out.push_str(&status.to_string());
    out.push('\n');
    out
}
