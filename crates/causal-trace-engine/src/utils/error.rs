//! Error types for the entire library.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in the binary and commands.

use thiserror::Error;

/// Errors that can occur while tokenizing a process log
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Record references unknown entry {0}")]
    UnknownEntry(i32),

    #[error("Failed to read log: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while reading trace metadata (`.sts`)
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Missing {0} line in metadata")]
    MissingField(&'static str),

    #[error("Malformed metadata line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },

    #[error("Failed to read metadata: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a whole import
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Trace declares no processes")]
    NoProcesses,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Import options parse error: {0}")]
    OptionsParseFailed(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}
