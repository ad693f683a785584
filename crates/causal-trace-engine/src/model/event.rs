//! Raw records, reconstructed events and messages.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::partition::PartitionId;
use super::task::TaskId;
use crate::utils::config::INDEX_COMPONENTS;

/// Index of an [`Event`] in the trace arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub usize);

/// Index of a [`Message`] in the trace arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub usize);

/// Array index components identifying one actor instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ActorIndex(pub [i32; INDEX_COMPONENTS]);

impl fmt::Display for ActorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "[{},{},{},{}]", a, b, c, d)
    }
}

/// The actor a raw event executed on: its kind plus instance index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorRef {
    pub kind: i32,
    pub index: ActorIndex,
}

/// One enter or leave record on a process, before task resolution.
///
/// Immutable once produced by ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Process whose log produced the record
    pub process: u32,

    /// Physical timestamp
    pub time: u64,

    /// Entry id, or one of the synthetic send/receive functions
    pub function: i32,

    /// `true` for enter, `false` for leave
    pub enter: bool,

    /// Actor instance, if one could be attributed
    pub actor: Option<ActorRef>,

    /// Message carried by synthetic send/receive records
    pub message: Option<MessageId>,
}

impl RawEvent {
    pub fn new(process: u32, time: u64, function: i32, enter: bool) -> Self {
        Self {
            process,
            time,
            function,
            enter,
            actor: None,
            message: None,
        }
    }

    pub fn with_actor(mut self, actor: Option<ActorRef>) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_message(mut self, message: MessageId) -> Self {
        self.message = Some(message);
        self
    }
}

/// A point-to-point message between two communication events.
///
/// Either side may be missing when the log never showed the counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Option<EventId>,
    pub receiver: Option<EventId>,

    /// Message kind as logged by the sender
    pub tag: i32,

    /// Payload length, `-1` when the log format does not record it
    pub size: i64,

    /// Target entry method
    pub entry: i32,

    /// Event id local to the sending process
    pub event: i64,

    pub send_process: u32,
    pub recv_process: Option<u32>,
    pub send_time: Option<u64>,
    pub recv_time: Option<u64>,
}

impl Message {
    pub fn new(send_process: u32, entry: i32, event: i64) -> Self {
        Self {
            sender: None,
            receiver: None,
            tag: 0,
            size: -1,
            entry,
            event,
            send_process,
            recv_process: None,
            send_time: None,
            recv_time: None,
        }
    }

    /// Both halves were seen during ingestion
    pub fn is_matched(&self) -> bool {
        self.send_time.is_some() && self.recv_time.is_some()
    }

    /// Sender or receiver event is missing from the built graph
    pub fn is_one_sided(&self) -> bool {
        self.sender.is_none() || self.receiver.is_none()
    }
}

/// A reconstructed call on one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub task: TaskId,
    pub enter: u64,
    pub exit: u64,
    pub depth: usize,
    pub function: i32,

    /// Logical step, `-1` until stepped
    pub step: i64,
    pub is_recv: bool,

    pub callees: Vec<EventId>,
    pub caller: Option<EventId>,

    /// Non-empty exactly for communication events
    pub messages: Vec<MessageId>,

    pub comm_prev: Option<EventId>,
    pub comm_next: Option<EventId>,

    /// Comm-chain neighbours not separated by a collective operation.
    /// Equal to `comm_prev`/`comm_next` unless a later phase splits them.
    pub cc_prev: Option<EventId>,
    pub cc_next: Option<EventId>,

    pub partition: Option<PartitionId>,

    #[serde(default)]
    pub metrics: HashMap<String, i64>,
}

impl Event {
    pub fn new(task: TaskId, enter: u64, exit: u64, function: i32) -> Self {
        Self {
            task,
            enter,
            exit,
            depth: 0,
            function,
            step: -1,
            is_recv: false,
            callees: Vec::new(),
            caller: None,
            messages: Vec::new(),
            comm_prev: None,
            comm_next: None,
            cc_prev: None,
            cc_next: None,
            partition: None,
            metrics: HashMap::new(),
        }
    }

    pub fn is_comm(&self) -> bool {
        !self.messages.is_empty()
    }

    /// Metric value, 0 when never recorded
    pub fn metric(&self, name: &str) -> i64 {
        self.metrics.get(name).copied().unwrap_or(0)
    }

    pub fn set_metric(&mut self, name: impl Into<String>, value: i64) {
        self.metrics.insert(name.into(), value);
    }
}
