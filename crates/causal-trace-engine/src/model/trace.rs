//! The produced graph: events, messages, tasks and partitions.

use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};

use super::event::{Event, EventId, Message, MessageId};
use super::partition::{PartitionId, PartitionTable};
use super::task::{FunctionTable, Task, TaskGroup};

/// Complete reconstructed trace.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    pub functions: FunctionTable,
    pub tasks: Vec<Task>,
    pub task_groups: Vec<TaskGroup>,

    /// Event arena
    pub events: Vec<Event>,

    /// Events of each task in completion order
    pub task_events: Vec<Vec<EventId>>,

    /// Depth-0 events of each task, in time order
    pub roots: Vec<Vec<EventId>>,

    /// Every message seen, matched or not
    pub messages: Vec<Message>,

    pub partitions: PartitionTable,

    /// First communication event of the system-wide comm chain
    pub chain_head: Option<EventId>,

    /// Latest exit time of any event
    pub end_time: u64,
}

impl Trace {
    pub fn new(functions: FunctionTable, tasks: Vec<Task>, task_groups: Vec<TaskGroup>) -> Self {
        let num_tasks = tasks.len();
        Self {
            functions,
            tasks,
            task_groups,
            task_events: vec![Vec::new(); num_tasks],
            roots: vec![Vec::new(); num_tasks],
            ..Default::default()
        }
    }

    pub fn num_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn event(&self, id: EventId) -> &Event {
        &self.events[id.0]
    }

    pub fn message(&self, id: MessageId) -> &Message {
        &self.messages[id.0]
    }

    /// Current partition owning a communication event
    pub fn partition_of(&self, event: EventId) -> Option<PartitionId> {
        self.events[event.0]
            .partition
            .map(|p| self.partitions.resolve(p))
    }

    /// Append an event to the arena
    pub fn push_event(&mut self, event: Event) -> EventId {
        let id = EventId(self.events.len());
        self.end_time = self.end_time.max(event.exit);
        self.events.push(event);
        id
    }

    /// Messages missing a sender or a receiver event
    pub fn unmatched_messages(&self) -> Vec<MessageId> {
        self.messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_one_sided())
            .map(|(i, _)| MessageId(i))
            .collect()
    }

    /// Walk the system-wide comm chain from its head
    pub fn comm_chain(&self) -> Vec<EventId> {
        let mut chain = Vec::new();
        let mut next = self.chain_head;
        while let Some(id) = next {
            chain.push(id);
            next = self.events[id.0].comm_next;
        }
        chain
    }

    /// Merge the partitions owning `a` and `b`, returning the survivor
    pub fn merge_partitions(&mut self, a: PartitionId, b: PartitionId) -> PartitionId {
        self.partitions.merge(a, b, &mut self.events)
    }

    /// Rebuild parent/child sets of current partitions from message edges
    pub fn link_partitions(&mut self) {
        for id in self.partitions.current_ids() {
            let partition = self.partitions.get_mut(id);
            partition.parents.clear();
            partition.children.clear();
        }

        let mut edges = 0usize;
        for msg in &self.messages {
            let (Some(sender), Some(receiver)) = (msg.sender, msg.receiver) else {
                continue;
            };
            let (Some(from), Some(to)) = (self.partition_of(sender), self.partition_of(receiver))
            else {
                continue;
            };
            if from == to {
                continue;
            }

            self.partitions.get_mut(from).children.insert(to);
            self.partitions.get_mut(to).parents.insert(from);
            edges += 1;
        }

        debug!("Linked partitions with {} message edges", edges);
    }

    /// Current partitions ordered so that parents come before children.
    ///
    /// Ties break by lowest id. Partitions caught in a cycle are appended
    /// in id order once no acyclic progress is possible.
    pub fn causal_order(&self) -> Vec<PartitionId> {
        let current = self.partitions.current_ids();
        let mut pending: BTreeMap<PartitionId, usize> = current
            .iter()
            .map(|id| {
                let partition = self.partitions.get(*id);
                let count = partition.parents.iter().filter(|p| *p != id).count();
                (*id, count)
            })
            .collect();

        let mut ready: BTreeSet<PartitionId> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(current.len());
        while let Some(id) = ready.pop_first() {
            pending.remove(&id);
            order.push(id);
            for child in &self.partitions.get(id).children {
                if let Some(count) = pending.get_mut(child) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(*child);
                    }
                }
            }
        }

        if !pending.is_empty() {
            warn!(
                "{} partitions form a causal cycle, ordering them by id",
                pending.len()
            );
            order.extend(pending.keys().copied());
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskId;

    fn three_partition_trace() -> Trace {
        let mut trace = Trace::default();
        for i in 0..3u64 {
            let id = trace.push_event(Event::new(TaskId(i as usize), i * 10, i * 10, -1));
            trace
                .partitions
                .create_singleton(id, &mut trace.events);
        }

        // 2 -> 1 -> 0 via messages
        for (from, to) in [(2usize, 1usize), (1, 0)] {
            let mut msg = Message::new(from as u32, 1, from as i64);
            msg.sender = Some(EventId(from));
            msg.receiver = Some(EventId(to));
            let mid = MessageId(trace.messages.len());
            trace.messages.push(msg);
            trace.events[from].messages.push(mid);
            trace.events[to].messages.push(mid);
        }
        trace
    }

    #[test]
    fn test_link_and_causal_order() {
        let mut trace = three_partition_trace();
        trace.link_partitions();

        assert!(trace.partitions.get(PartitionId(2)).parents.is_empty());
        assert!(trace
            .partitions
            .get(PartitionId(0))
            .parents
            .contains(&PartitionId(1)));

        assert_eq!(
            trace.causal_order(),
            vec![PartitionId(2), PartitionId(1), PartitionId(0)]
        );
    }

    #[test]
    fn test_merge_drops_internal_edge() {
        let mut trace = three_partition_trace();
        let merged = trace.merge_partitions(PartitionId(1), PartitionId(0));
        trace.link_partitions();

        assert_eq!(merged, PartitionId(0));
        assert_eq!(trace.partitions.current_ids().len(), 2);
        assert_eq!(
            trace.partitions.get(merged).parents.iter().copied().collect::<Vec<_>>(),
            vec![PartitionId(2)]
        );
        assert_eq!(trace.causal_order(), vec![PartitionId(2), PartitionId(0)]);
    }

    #[test]
    fn test_unmatched_messages() {
        let mut trace = three_partition_trace();
        trace.messages.push(Message::new(0, 3, 9));
        assert_eq!(trace.unmatched_messages(), vec![MessageId(2)]);
    }
}
