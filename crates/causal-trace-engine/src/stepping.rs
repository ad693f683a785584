//! Logical step assignment for causal partitions.
//!
//! Stepping a partition runs four phases:
//! - Stride assignment: a per-task counter that advances after every send
//! - Constraint repair: pushes receives past their senders along the comm chain
//! - Expansion: gives sends sharing a stride a common final step and spreads
//!   the receives before each send over distinct steps
//! - Finalize: records the partition's max step
//!
//! Partitions are stepped independently. Steps of events in other
//! partitions are only ever read.

use crate::model::{Event, EventId, MessageId, PartitionId, PartitionTable, TaskId, Trace};
use crate::utils::config::REPAIR_PASSES;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Send/receive structure of one partition after stride assignment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrideLayout {
    /// Messages sent from inside the partition, in repair order
    pub messages: Vec<MessageId>,

    /// Receive → the send before it on its task
    pub last_send: HashMap<EventId, EventId>,

    /// Receive → the send after it on its task
    pub next_send: HashMap<EventId, EventId>,

    /// Send → receives between it and the previous send on its task
    pub last_recvs: HashMap<EventId, Vec<EventId>>,

    /// First receive after the final send of each task
    pub free_recvs: Vec<EventId>,
}

/// Outcome of stepping a whole trace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SteppingReport {
    pub partitions: usize,
    pub max_step: i64,

    /// Messages inside one partition whose receive is not after its send
    pub violations: Vec<MessageId>,
}

/// Assigns logical steps partition by partition
#[derive(Debug, Clone)]
pub struct SteppingEngine {
    repair_passes: usize,
}

impl Default for SteppingEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn in_partition(
    partitions: &PartitionTable,
    events: &[Event],
    id: EventId,
    pid: PartitionId,
) -> bool {
    events[id.0]
        .partition
        .map(|p| partitions.resolve(p) == pid)
        .unwrap_or(false)
}

impl SteppingEngine {
    pub fn new() -> Self {
        Self {
            repair_passes: REPAIR_PASSES,
        }
    }

    /// Step every current partition in causal order
    ///
    /// **Public** - main entry point after partitions are linked
    ///
    /// # Arguments
    /// * `trace` - Trace whose partition parent/child sets are up to date
    ///
    /// # Returns
    /// Report with the number of partitions stepped, the largest max step and
    /// any residual causality violations. Violations are logged, not rejected.
    pub fn step_trace(&self, trace: &mut Trace) -> SteppingReport {
        let order = trace.causal_order();
        let mut max_step = 0;

        for pid in &order {
            max_step = max_step.max(self.step_partition(trace, *pid));
        }

        let violations = causality_violations(trace);
        for id in &violations {
            let msg = trace.message(*id);
            warn!(
                "Message {} (entry {}, event {}) is not stepped after its send",
                id.0, msg.entry, msg.event
            );
        }

        debug!(
            "Stepped {} partitions, max step {}",
            order.len(),
            max_step
        );

        SteppingReport {
            partitions: order.len(),
            max_step,
            violations,
        }
    }

    /// Run all phases on one partition
    ///
    /// **Public** - partitions whose parents are already stepped
    ///
    /// # Returns
    /// The partition's max step
    pub fn step_partition(&self, trace: &mut Trace, pid: PartitionId) -> i64 {
        let pid = trace.partitions.find(pid);
        trace.partitions.get_mut(pid).sort_events(&trace.events);

        let layout = self.assign_strides(trace, pid);

        for _ in 0..self.repair_passes {
            for m in &layout.messages {
                self.step_receive(trace, *m);
            }
        }

        self.restep(trace, pid, &layout);
        trace.partitions.get_mut(pid).free_recvs = layout.free_recvs;

        self.finalize(trace, pid)
    }

    /// Phase 1: seed steps from per-task strides
    ///
    /// **Public** - exposed for inspection of the send/receive grouping
    ///
    /// Also rewrites each event's receive flag: an event is a receive unless
    /// it is the sender of one of its messages.
    pub fn assign_strides(&self, trace: &mut Trace, pid: PartitionId) -> StrideLayout {
        let mut layout = StrideLayout::default();
        let partition = trace.partitions.get(pid);

        for list in partition.events.values() {
            let mut stride = 0i64;
            let mut last_send: Option<EventId> = None;
            let mut pending: Vec<EventId> = Vec::new();

            for id in list {
                let sent: Vec<MessageId> = trace.events[id.0]
                    .messages
                    .iter()
                    .copied()
                    .filter(|m| trace.messages[m.0].sender == Some(*id))
                    .collect();

                let event = &mut trace.events[id.0];
                event.step = stride;
                event.is_recv = sent.is_empty();

                if event.is_recv {
                    if let Some(send) = last_send {
                        layout.last_send.insert(*id, send);
                    }
                    pending.push(*id);
                } else {
                    stride += 1;
                    last_send = Some(*id);
                    for recv in &pending {
                        layout.next_send.insert(*recv, *id);
                    }
                    layout.last_recvs.insert(*id, std::mem::take(&mut pending));
                    layout.messages.extend(sent);
                }
            }

            if let Some(first) = pending.first() {
                layout.free_recvs.push(*first);
            }
        }

        layout.messages.sort_by_key(|m| {
            let sender = trace.messages[m.0].sender.map(|s| trace.events[s.0].enter);
            (sender, *m)
        });
        layout.messages.dedup();

        layout
    }

    /// Phase 2: move one message's receive after its send
    ///
    /// **Public** - one repair step, applied per message in repair order
    ///
    /// When the receive is moved, the events after it on the comm chain are
    /// re-stepped until the chain leaves its partition. Messages whose sides
    /// sit in different partitions, or lack a side, are left alone.
    pub fn step_receive(&self, trace: &mut Trace, message: MessageId) {
        let msg = &trace.messages[message.0];
        let (Some(sender), Some(receiver)) = (msg.sender, msg.receiver) else {
            return;
        };
        let Some(pid) = trace.partition_of(receiver) else {
            return;
        };
        if trace.partition_of(sender) != Some(pid) {
            return;
        }

        let send_step = trace.events[sender.0].step;
        if trace.events[receiver.0].step > send_step {
            return;
        }

        trace.events[receiver.0].step = send_step + 1;

        let mut previous = receiver;
        let mut next = trace.events[receiver.0].comm_next;
        while let Some(id) = next {
            if !in_partition(&trace.partitions, &trace.events, id, pid) {
                break;
            }
            let prev = &trace.events[previous.0];
            let step = if prev.is_recv { prev.step } else { prev.step + 1 };
            trace.events[id.0].step = step;

            previous = id;
            next = trace.events[id.0].comm_next;
        }
    }

    /// Phase 3: expand strides into distinct logical steps
    ///
    /// **Public** - requires the layout produced for the same partition
    pub fn restep(&self, trace: &mut Trace, pid: PartitionId, layout: &StrideLayout) {
        let partition = trace.partitions.get(pid);
        let tasks: Vec<TaskId> = partition.events.keys().copied().collect();

        let mut steps: BTreeSet<i64> = BTreeSet::new();
        let mut working: HashMap<TaskId, BTreeMap<i64, EventId>> = HashMap::new();
        for (task, list) in &partition.events {
            let sends = working.entry(*task).or_default();
            for id in list {
                let event = &trace.events[id.0];
                steps.insert(event.step);
                if !event.is_recv {
                    sends.insert(event.step, *id);
                }
            }
        }

        // Stride step of the previous send on the same task
        let mut last_step: HashMap<EventId, i64> = HashMap::new();
        for sends in working.values() {
            let mut previous = -1;
            for (step, id) in sends {
                last_step.insert(*id, previous);
                previous = *step;
            }
        }

        let mut send_step: HashMap<i64, i64> = HashMap::from([(-1, -1)]);
        for step in steps {
            let mut sends = Vec::new();
            let mut submax = 0;

            for task in &tasks {
                let Some(send) = working.get(task).and_then(|s| s.get(&step)).copied() else {
                    continue;
                };
                sends.push(send);

                let previous = last_step.get(&send).copied().unwrap_or(-1);
                let mut current = send_step.get(&previous).copied().unwrap_or(-1) + 1;

                for recv in layout.last_recvs.get(&send).into_iter().flatten() {
                    trace.events[recv.0].step = current;

                    for m in &trace.events[recv.0].messages {
                        let Some(sender) = trace.messages[m.0].sender else {
                            continue;
                        };
                        if sender == *recv {
                            continue;
                        }
                        let sender_step = trace.events[sender.0].step;
                        if sender_step >= current {
                            current = sender_step + 1;
                        }
                    }
                    trace.events[recv.0].step = current;
                    current += 1;
                }
                submax = submax.max(current);
            }

            if sends.is_empty() {
                continue;
            }
            for send in sends {
                trace.events[send.0].step = submax;
            }
            send_step.insert(step, submax);
        }

        for free in &layout.free_recvs {
            self.step_free_receive(trace, pid, *free);
        }
    }

    /// Step a receive with no later send on its task, then the chain after it
    ///
    /// **Private** - internal helper for restep
    fn step_free_receive(&self, trace: &mut Trace, pid: PartitionId, free: EventId) {
        let mut step = 0;
        if let Some(prev) = trace.events[free.0].comm_prev {
            if in_partition(&trace.partitions, &trace.events, prev, pid) {
                step = trace.events[prev.0].step + 1;
            }
        }
        if let Some(sender_step) = latest_sender_step(trace, free) {
            step = step.max(sender_step + 1);
        }
        trace.events[free.0].step = step;

        let mut previous_step = step;
        let mut next = trace.events[free.0].comm_next;
        while let Some(id) = next {
            if !in_partition(&trace.partitions, &trace.events, id, pid) {
                break;
            }
            let mut step = previous_step;
            if let Some(sender_step) = latest_sender_step(trace, id) {
                step = step.max(sender_step);
            }
            trace.events[id.0].step = step + 1;

            previous_step = step + 1;
            next = trace.events[id.0].comm_next;
        }
    }

    /// Phase 4: record the partition's max step
    ///
    /// **Public** - the maximum over tasks of the last event's step
    pub fn finalize(&self, trace: &mut Trace, pid: PartitionId) -> i64 {
        let partition = trace.partitions.get(pid);
        let max_step = partition
            .events
            .values()
            .filter_map(|list| list.last())
            .map(|id| trace.events[id.0].step)
            .max()
            .unwrap_or(0)
            .max(0);

        trace.partitions.get_mut(pid).max_step = max_step;
        max_step
    }
}

/// Largest step among senders of messages the event did not send itself
fn latest_sender_step(trace: &Trace, event: EventId) -> Option<i64> {
    trace.events[event.0]
        .messages
        .iter()
        .filter_map(|m| trace.messages[m.0].sender)
        .filter(|sender| *sender != event)
        .map(|sender| trace.events[sender.0].step)
        .max()
}

/// Matched messages inside one partition with `sender.step >= receiver.step`
pub fn causality_violations(trace: &Trace) -> Vec<MessageId> {
    trace
        .messages
        .iter()
        .enumerate()
        .filter_map(|(i, msg)| {
            let (sender, receiver) = (msg.sender?, msg.receiver?);
            let same = trace.partition_of(sender)? == trace.partition_of(receiver)?;
            (same && trace.event(sender).step >= trace.event(receiver).step)
                .then_some(MessageId(i))
        })
        .collect()
}
