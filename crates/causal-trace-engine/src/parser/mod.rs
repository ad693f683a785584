//! Trace log parsing.
//!
//! This module handles:
//! - Reading the `.sts` metadata (entries, actor kinds, version, process count)
//! - Tokenizing per-process log lines into typed records
//! - Version-gated optional fields

pub mod records;
pub mod sts;

// Re-export main types
pub use records::{parse_line, parse_log, read_log, Record, RecordHeader};
pub use sts::{log_path, parse_sts, read_sts, ChareKind, EntryDef, TraceMetadata};
