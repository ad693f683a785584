//! Configuration and constants for trace import and stepping.

/// Current summary schema version
pub const SUMMARY_VERSION: &str = "1.0.0";

// Synthetic functions standing in for the two halves of a message.
// Entry ids in the logs are never negative, so these cannot collide.
pub const SEND_FUNCTION: i32 = -1;
pub const RECV_FUNCTION: i32 = -2;

// Function groups. Group 0 marks message primitives.
pub const COMM_GROUP: u32 = 0;
pub const ENTRY_GROUP: u32 = 1;
pub const COMM_GROUP_NAME: &str = "MPI";
pub const ENTRY_GROUP_NAME: &str = "Entry";

// Projections record type codes
pub const CREATION: i32 = 1;
pub const BEGIN_PROCESSING: i32 = 2;
pub const END_PROCESSING: i32 = 3;
pub const MESSAGE_RECV: i32 = 10;
pub const CREATION_BCAST: i32 = 20;

/// Number of full constraint repair passes over the sorted message list.
///
/// A single pass leaves some receives behind their sends on some inputs.
pub const REPAIR_PASSES: usize = 2;

/// Step spacing of resampled cluster vectors
pub const CLUSTER_STRIDE: i64 = 2;

/// Actor index components carried by a begin-processing record
pub const INDEX_COMPONENTS: usize = 4;

/// Suffix of per-process log files next to the `.sts` metadata
pub const LOG_SUFFIX: &str = "log";
