//! Causal partitions and the union-find table that owns them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::event::{Event, EventId};
use super::task::TaskId;

/// Index of a [`Partition`] in its [`PartitionTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionId(pub usize);

/// Resampled metric series for one task of a partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterProcess {
    pub task: TaskId,
    pub start_step: i64,
    pub metric_events: Vec<i64>,
}

impl ClusterProcess {
    pub fn new(task: TaskId, start_step: i64) -> Self {
        Self {
            task,
            start_step,
            metric_events: Vec::new(),
        }
    }
}

/// A causally linked cluster of communication events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    pub id: PartitionId,

    /// Per-task event lists, sorted by enter time after [`Partition::sort_events`]
    pub events: BTreeMap<TaskId, Vec<EventId>>,

    pub max_step: i64,
    pub max_global_step: i64,
    pub dag_leap: i64,

    pub parents: BTreeSet<PartitionId>,
    pub children: BTreeSet<PartitionId>,
    pub mergable_parents: BTreeSet<PartitionId>,
    pub mergable_children: BTreeSet<PartitionId>,

    /// Receives with no later send on their task, one per task
    pub free_recvs: Vec<EventId>,

    pub cluster_processes: Vec<ClusterProcess>,
}

impl Partition {
    pub fn new(id: PartitionId) -> Self {
        Self {
            id,
            events: BTreeMap::new(),
            max_step: -1,
            max_global_step: -1,
            dag_leap: -1,
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            mergable_parents: BTreeSet::new(),
            mergable_children: BTreeSet::new(),
            free_recvs: Vec::new(),
            cluster_processes: Vec::new(),
        }
    }

    /// Append without ordering
    pub fn add_event(&mut self, task: TaskId, event: EventId) {
        self.events.entry(task).or_default().push(event);
    }

    pub fn sort_events(&mut self, events: &[Event]) {
        for list in self.events.values_mut() {
            list.sort_by_key(|id| (events[id.0].enter, events[id.0].exit, *id));
        }
    }

    pub fn first_event(&self, task: TaskId) -> Option<EventId> {
        self.events.get(&task).and_then(|list| list.first().copied())
    }

    pub fn last_event(&self, task: TaskId) -> Option<EventId> {
        self.events.get(&task).and_then(|list| list.last().copied())
    }

    pub fn num_events(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }

    /// Comma separated task ids, e.g. `"0, 3, 4"`
    pub fn task_string(&self) -> String {
        self.events
            .keys()
            .map(|t| t.0.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn cluster_vector(&self, task: TaskId) -> Option<&[i64]> {
        self.cluster_processes
            .iter()
            .find(|cp| cp.task == task)
            .map(|cp| cp.metric_events.as_slice())
    }
}

/// Owns every partition ever created plus the forwarding forest that
/// records which partition each one was merged into.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionTable {
    partitions: Vec<Partition>,
    forward: Vec<usize>,
}

impl PartitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a partition that forwards to itself
    pub fn create(&mut self) -> PartitionId {
        let id = PartitionId(self.partitions.len());
        self.partitions.push(Partition::new(id));
        self.forward.push(id.0);
        id
    }

    /// Allocate a partition holding exactly one event
    pub fn create_singleton(&mut self, event: EventId, events: &mut [Event]) -> PartitionId {
        let id = self.create();
        let task = events[event.0].task;
        self.partitions[id.0].add_event(task, event);
        events[event.0].partition = Some(id);
        id
    }

    pub fn get(&self, id: PartitionId) -> &Partition {
        &self.partitions[id.0]
    }

    pub fn get_mut(&mut self, id: PartitionId) -> &mut Partition {
        &mut self.partitions[id.0]
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Final owner of `id`, compressing the path on the way
    pub fn find(&mut self, id: PartitionId) -> PartitionId {
        let mut root = id.0;
        while self.forward[root] != root {
            root = self.forward[root];
        }

        let mut current = id.0;
        while self.forward[current] != root {
            let next = self.forward[current];
            self.forward[current] = root;
            current = next;
        }

        PartitionId(root)
    }

    /// Final owner of `id` without mutating the forest
    pub fn resolve(&self, id: PartitionId) -> PartitionId {
        let mut root = id.0;
        while self.forward[root] != root {
            root = self.forward[root];
        }
        PartitionId(root)
    }

    /// Partitions that have not been merged away, in id order
    pub fn current_ids(&self) -> Vec<PartitionId> {
        (0..self.partitions.len())
            .filter(|&i| self.forward[i] == i)
            .map(PartitionId)
            .collect()
    }

    pub fn iter_current(&self) -> impl Iterator<Item = &Partition> {
        self.partitions
            .iter()
            .enumerate()
            .filter(|(i, _)| self.forward[*i] == *i)
            .map(|(_, p)| p)
    }

    /// Merge the partitions owning `a` and `b`.
    ///
    /// The lower id survives. Events move into the survivor and are re-sorted,
    /// moved events are re-owned, and every parent/child reference to the
    /// absorbed partition is redirected to the survivor.
    pub fn merge(&mut self, a: PartitionId, b: PartitionId, events: &mut [Event]) -> PartitionId {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return ra;
        }

        let (survivor, absorbed) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.forward[absorbed.0] = survivor.0;

        let moved = std::mem::take(&mut self.partitions[absorbed.0].events);
        let parents = std::mem::take(&mut self.partitions[absorbed.0].parents);
        let children = std::mem::take(&mut self.partitions[absorbed.0].children);

        let target = &mut self.partitions[survivor.0];
        for (task, list) in moved {
            for id in &list {
                events[id.0].partition = Some(survivor);
            }
            target.events.entry(task).or_default().extend(list);
        }
        target.parents.extend(parents);
        target.children.extend(children);
        for gone in [survivor, absorbed] {
            target.parents.remove(&gone);
            target.children.remove(&gone);
        }
        target.sort_events(events);

        for partition in self.partitions.iter_mut() {
            if partition.parents.remove(&absorbed) && partition.id != survivor {
                partition.parents.insert(survivor);
            }
            if partition.children.remove(&absorbed) && partition.id != survivor {
                partition.children.insert(survivor);
            }
        }

        survivor
    }
}
