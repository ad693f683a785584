//! In-memory trace model.
//!
//! Every cross reference (caller/callee, comm-chain neighbours, message
//! endpoints, owning partition) is an index into one of the arenas owned by
//! [`Trace`], so the graph has no ownership cycles.

pub mod event;
pub mod partition;
pub mod task;
pub mod trace;

pub use event::{ActorIndex, ActorRef, Event, EventId, Message, MessageId, RawEvent};
pub use partition::{ClusterProcess, Partition, PartitionId, PartitionTable};
pub use task::{Function, FunctionTable, Task, TaskGroup, TaskId};
pub use trace::Trace;
