//! Array actor detection and task assignment.
//!
//! Only actor kinds seen with more than one distinct index become tasks.
//! Events of every other kind are dropped from the logical graph.

use crate::model::{ActorIndex, ActorRef, RawEvent, Task, TaskGroup, TaskId};
use crate::parser::TraceMetadata;
use log::debug;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Maps actor instances to logical tasks
#[derive(Debug, Clone, Default)]
pub struct TaskResolver {
    lookup: HashMap<(i32, ActorIndex), TaskId>,
    tasks: Vec<Task>,
    groups: Vec<TaskGroup>,
}

/// Raw events regrouped per task
#[derive(Debug, Clone, Default)]
pub struct TaskEvents {
    /// Indexed by task id, each list stable-sorted by time
    pub events: Vec<Vec<RawEvent>>,

    /// Raw events whose actor did not resolve to a task
    pub dropped: usize,
}

impl TaskResolver {
    /// Decide which actor kinds are arrays and number their instances
    ///
    /// **Public** - runs once every process has been ingested
    ///
    /// # Arguments
    /// * `processes` - Raw events of every process, in process order
    /// * `metadata` - Supplies actor kind names for the task groups
    ///
    /// # Returns
    /// Resolver with one task per distinct index of every array kind.
    /// Kinds are numbered in ascending kind id, indices in discovery order.
    pub fn resolve(processes: &[Vec<RawEvent>], metadata: &TraceMetadata) -> Self {
        let mut seen: HashSet<(i32, ActorIndex)> = HashSet::new();
        let mut discovered: BTreeMap<i32, Vec<ActorIndex>> = BTreeMap::new();

        for actor in processes.iter().flatten().filter_map(|e| e.actor) {
            if seen.insert((actor.kind, actor.index)) {
                discovered.entry(actor.kind).or_default().push(actor.index);
            }
        }

        let mut resolver = Self::default();
        for (kind, indices) in discovered {
            if indices.len() <= 1 {
                debug!(
                    "Kind {} ({}) has a single instance, not a task",
                    kind,
                    metadata.chare_name(kind)
                );
                continue;
            }

            let mut group = TaskGroup {
                kind,
                name: metadata.chare_name(kind).to_string(),
                tasks: Vec::with_capacity(indices.len()),
            };
            for index in indices {
                let id = TaskId(resolver.tasks.len());
                resolver.tasks.push(Task {
                    id,
                    label: index.to_string(),
                    kind,
                });
                resolver.lookup.insert((kind, index), id);
                group.tasks.push(id);
            }
            resolver.groups.push(group);
        }

        debug!(
            "Resolved {} tasks in {} groups",
            resolver.tasks.len(),
            resolver.groups.len()
        );

        resolver
    }

    /// Task of an actor instance, if its kind is an array
    pub fn task_of(&self, actor: Option<ActorRef>) -> Option<TaskId> {
        let actor = actor?;
        self.lookup.get(&(actor.kind, actor.index)).copied()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn groups(&self) -> &[TaskGroup] {
        &self.groups
    }

    /// Regroup raw events by task
    ///
    /// **Public** - consumes the per-process lists
    ///
    /// # Returns
    /// Per-task lists sorted by time. Equal timestamps keep process then
    /// log order.
    pub fn assign(&self, processes: Vec<Vec<RawEvent>>) -> TaskEvents {
        let mut result = TaskEvents {
            events: vec![Vec::new(); self.tasks.len()],
            dropped: 0,
        };

        for event in processes.into_iter().flatten() {
            match self.task_of(event.actor) {
                Some(task) => result.events[task.0].push(event),
                None => result.dropped += 1,
            }
        }

        for list in &mut result.events {
            list.sort_by_key(|e| e.time);
        }

        if result.dropped > 0 {
            debug!(
                "Dropped {} raw events of non-array actors",
                result.dropped
            );
        }

        result
    }

    pub fn into_parts(self) -> (Vec<Task>, Vec<TaskGroup>) {
        (self.tasks, self.groups)
    }
}
