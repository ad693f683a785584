//! Trace metadata (`.sts`) reader.
//!
//! Only the lines the importer needs are interpreted:
//! `VERSION`, `PROCESSORS`, `CHARE id name` and
//! `ENTRY CHARE id name... chare_id msg_id`. Everything else is skipped.

use crate::model::FunctionTable;
use crate::utils::config::LOG_SUFFIX;
use crate::utils::error::MetadataError;
use log::debug;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// An actor kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChareKind {
    pub name: String,
}

/// An entry method and the actor kind it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDef {
    pub name: String,
    pub chare: i32,
    pub msg: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceMetadata {
    pub version: f32,
    pub processes: u32,
    pub chares: BTreeMap<i32, ChareKind>,
    pub entries: BTreeMap<i32, EntryDef>,
}

impl TraceMetadata {
    /// Actor kind owning an entry
    pub fn entry_kind(&self, entry: i32) -> Option<i32> {
        self.entries.get(&entry).map(|e| e.chare)
    }

    pub fn chare_name(&self, kind: i32) -> &str {
        self.chares
            .get(&kind)
            .map(|c| c.name.as_str())
            .unwrap_or("unknown")
    }

    /// Function table with the synthetic send/receive functions plus one
    /// function per entry
    pub fn function_table(&self) -> FunctionTable {
        FunctionTable::from_entries(
            self.entries
                .iter()
                .map(|(id, entry)| (*id, entry.name.as_str())),
        )
    }
}

/// Parse metadata from any reader
///
/// # Errors
/// * `MetadataError::MalformedLine` - a recognised line has the wrong shape
/// * `MetadataError::MissingField` - no VERSION or PROCESSORS line
pub fn parse_sts(reader: impl BufRead) -> Result<TraceMetadata, MetadataError> {
    let mut version = None;
    let mut processes = None;
    let mut chares = BTreeMap::new();
    let mut entries = BTreeMap::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let malformed = |reason: &str| MetadataError::MalformedLine {
            line: line_no,
            reason: reason.to_string(),
        };

        match tokens.as_slice() {
            ["ENTRY", "CHARE", rest @ ..] => {
                if rest.len() < 4 {
                    return Err(malformed("ENTRY CHARE needs id, name, chare and message"));
                }
                let id = rest[0].parse::<i32>().map_err(|_| malformed("invalid entry id"))?;
                let name = rest[1..rest.len() - 2].join(" ");
                let chare = rest[rest.len() - 2]
                    .parse::<i32>()
                    .map_err(|_| malformed("invalid chare id"))?;
                let msg = rest[rest.len() - 1]
                    .parse::<i32>()
                    .map_err(|_| malformed("invalid message id"))?;
                entries.insert(id, EntryDef { name, chare, msg });
            }
            ["CHARE", id, name, ..] => {
                let id = id.parse::<i32>().map_err(|_| malformed("invalid chare id"))?;
                chares.insert(
                    id,
                    ChareKind {
                        name: name.to_string(),
                    },
                );
            }
            ["VERSION", value, ..] => {
                version = Some(value.parse::<f32>().map_err(|_| malformed("invalid version"))?);
            }
            ["PROCESSORS", value, ..] => {
                processes = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| malformed("invalid processor count"))?,
                );
            }
            _ => {}
        }
    }

    let metadata = TraceMetadata {
        version: version.ok_or(MetadataError::MissingField("VERSION"))?,
        processes: processes.ok_or(MetadataError::MissingField("PROCESSORS"))?,
        chares,
        entries,
    };

    debug!(
        "Metadata: version {}, {} processes, {} chares, {} entries",
        metadata.version,
        metadata.processes,
        metadata.chares.len(),
        metadata.entries.len()
    );

    Ok(metadata)
}

/// Read metadata from disk
pub fn read_sts(path: impl AsRef<Path>) -> Result<TraceMetadata, MetadataError> {
    let file = File::open(path.as_ref())?;
    parse_sts(BufReader::new(file))
}

/// Path of the log for `process`, next to the metadata file:
/// `dir/app.sts` → `dir/app.<process>.log`
pub fn log_path(sts_path: &Path, process: u32) -> PathBuf {
    let stem = sts_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    sts_path.with_file_name(format!("{}.{}.{}", stem, process, LOG_SUFFIX))
}
