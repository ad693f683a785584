//! Causal trace engine library
//!
//! Reconstructs a causally stepped event graph from per-process trace logs.
//! Modules are exposed for the binary and for testing.

pub mod commands;
pub mod importer;
pub mod matching;
pub mod metrics;
pub mod model;
pub mod output;
pub mod parser;
pub mod stepping;
pub mod utils;
