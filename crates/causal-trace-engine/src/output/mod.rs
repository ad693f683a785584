//! Output of import results.
//!
//! - JSON summaries (write and read back for validation)
//! - Text summaries for the terminal

pub mod json;
pub mod render;
pub mod schema;

// Re-export main functions
pub use json::{read_summary, write_summary};
pub use render::render_text_summary;
pub use schema::{to_summary, FailureSummary, PartitionSummary, TraceSummary};

use crate::utils::error::OutputError;
use std::path::Path;

/// Common path validation for output files
pub fn validate_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    if path.exists() && path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}
