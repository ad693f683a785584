//! Read-only metrics over stepped partitions.
//!
//! Distances, dag leaps and mergable neighbour sets feed partition merging.
//! Cluster vectors resample an event metric onto a fixed step grid so that
//! tasks of a partition can be compared for clustering.

use crate::model::{ClusterProcess, PartitionId, Trace};
use crate::utils::config::CLUSTER_STRIDE;
use log::debug;
use std::collections::BTreeSet;

/// Smallest time gap between two partitions on any shared task
///
/// **Public** - used to pick merge candidates
///
/// # Arguments
/// * `a`, `b` - Partitions to compare, in either order
///
/// # Returns
/// `None` when the partitions share no task. Otherwise, the minimum over
/// shared tasks of the gap between one partition's last event and the
/// other's first event. Overlapping partitions have distance 0.
pub fn distance(trace: &Trace, a: PartitionId, b: PartitionId) -> Option<u64> {
    let pa = trace.partitions.get(trace.partitions.resolve(a));
    let pb = trace.partitions.get(trace.partitions.resolve(b));

    pa.events
        .keys()
        .filter(|task| pb.events.contains_key(task))
        .filter_map(|task| {
            let a_first = trace.event(pa.first_event(*task)?);
            let a_last = trace.event(pa.last_event(*task)?);
            let b_first = trace.event(pb.first_event(*task)?);
            let b_last = trace.event(pb.last_event(*task)?);

            let forward = b_first.enter.saturating_sub(a_last.exit);
            let backward = a_first.enter.saturating_sub(b_last.exit);
            Some(forward.max(backward))
        })
        .min()
}

/// Dag leap of one partition from its parents' leaps
///
/// Parents must already have their leap computed.
pub fn calculate_dag_leap(trace: &mut Trace, pid: PartitionId) -> i64 {
    let partition = trace.partitions.get(pid);
    let leap = partition
        .parents
        .iter()
        .map(|parent| trace.partitions.get(*parent).dag_leap + 1)
        .max()
        .unwrap_or(0)
        .max(0);

    trace.partitions.get_mut(pid).dag_leap = leap;
    leap
}

/// Dag leap of every current partition, in causal order
pub fn calculate_dag_leaps(trace: &mut Trace) -> i64 {
    let mut deepest = 0;
    for pid in trace.causal_order() {
        deepest = deepest.max(calculate_dag_leap(trace, pid));
    }
    debug!("Longest causal chain: {} partitions", deepest + 1);
    deepest
}

/// Rebuild the mergable parent and child sets of a partition
///
/// **Public** - called after parents and children are linked
///
/// # Arguments
/// * `consider_collectives` - When false, every parent and child is mergable.
///   When true, a parent is mergable only if no collective separates each of
///   its tasks' last event from the next comm event, and a child only if none
///   separates each task's first event from the previous one.
pub fn set_mergables(trace: &mut Trace, pid: PartitionId, consider_collectives: bool) {
    let partition = trace.partitions.get(pid);

    let (parents, children): (BTreeSet<PartitionId>, BTreeSet<PartitionId>) =
        if consider_collectives {
            let parents = partition
                .parents
                .iter()
                .copied()
                .filter(|parent| {
                    let parent = trace.partitions.get(*parent);
                    parent.events.values().filter_map(|list| list.last()).all(|id| {
                        let event = trace.event(*id);
                        event.comm_next == event.cc_next
                    })
                })
                .collect();
            let children = partition
                .children
                .iter()
                .copied()
                .filter(|child| {
                    let child = trace.partitions.get(*child);
                    child.events.values().filter_map(|list| list.first()).all(|id| {
                        let event = trace.event(*id);
                        event.comm_prev == event.cc_prev
                    })
                })
                .collect();
            (parents, children)
        } else {
            (partition.parents.clone(), partition.children.clone())
        };

    let partition = trace.partitions.get_mut(pid);
    partition.mergable_parents = parents;
    partition.mergable_children = children;
}

/// Mergable sets of every current partition
pub fn set_all_mergables(trace: &mut Trace, consider_collectives: bool) {
    for pid in trace.partitions.current_ids() {
        set_mergables(trace, pid, consider_collectives);
    }
}

/// Resample a metric onto the partition's step grid, once per task
///
/// **Public** - regenerates the partition's cluster vectors from scratch
///
/// # Arguments
/// * `metric` - Event metric to sample, missing values read as 0
///
/// # Returns
/// Number of vectors built. Each starts at its task's first step and holds
/// one sample every 2 steps up to the partition's max global step, or its
/// max step when no global step was assigned. Gaps repeat the last value.
pub fn build_cluster_vectors(trace: &mut Trace, pid: PartitionId, metric: &str) -> usize {
    let partition = trace.partitions.get(pid);
    let target = if partition.max_global_step >= 0 {
        partition.max_global_step
    } else {
        partition.max_step
    };

    let mut processes = Vec::with_capacity(partition.events.len());
    for (task, list) in &partition.events {
        let Some(first) = list.first() else {
            continue;
        };

        let mut last_step = trace.event(*first).step;
        let mut last_value = 0;
        let mut cp = ClusterProcess::new(*task, last_step);

        for id in list {
            let event = trace.event(*id);
            while event.step > last_step + CLUSTER_STRIDE {
                cp.metric_events.push(last_value);
                last_step += CLUSTER_STRIDE;
            }
            last_step = event.step;
            last_value = event.metric(metric);
            cp.metric_events.push(last_value);
        }

        while last_step + CLUSTER_STRIDE <= target {
            cp.metric_events.push(last_value);
            last_step += CLUSTER_STRIDE;
        }

        processes.push(cp);
    }

    let built = processes.len();
    trace.partitions.get_mut(pid).cluster_processes = processes;
    built
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::builder::link_comm_chain;
    use crate::model::{Event, EventId, Message, MessageId, TaskId};
    use pretty_assertions::assert_eq;

    /// One event per `(task, enter, exit)`, each in its own partition
    fn singletons(events: &[(usize, u64, u64)]) -> Trace {
        let mut trace = Trace::default();
        for (task, enter, exit) in events {
            let id = trace.push_event(Event::new(TaskId(*task), *enter, *exit, -1));
            trace.partitions.create_singleton(id, &mut trace.events);
        }
        trace
    }

    fn connect(trace: &mut Trace, sender: usize, receiver: usize) {
        let id = MessageId(trace.messages.len());
        let mut msg = Message::new(0, 1, id.0 as i64);
        msg.sender = Some(EventId(sender));
        msg.receiver = Some(EventId(receiver));
        trace.messages.push(msg);
        trace.events[sender].messages.push(id);
        trace.events[receiver].messages.push(id);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let mut trace = singletons(&[(0, 0, 5), (1, 2, 4), (0, 20, 25), (1, 9, 11)]);
        let a = trace.merge_partitions(PartitionId(0), PartitionId(1));
        let b = trace.merge_partitions(PartitionId(2), PartitionId(3));

        // Task 0 gap 15, task 1 gap 5
        assert_eq!(distance(&trace, a, b), Some(5));
        assert_eq!(distance(&trace, b, a), Some(5));
    }

    #[test]
    fn test_distance_overlap_and_disjoint() {
        let trace = singletons(&[(0, 0, 10), (0, 5, 15), (1, 30, 40)]);

        assert_eq!(distance(&trace, PartitionId(0), PartitionId(1)), Some(0));
        assert_eq!(distance(&trace, PartitionId(0), PartitionId(2)), None);
    }

    #[test]
    fn test_dag_leap() {
        // 0 -> 1 -> 2 and 0 -> 2
        let mut trace = singletons(&[(0, 0, 0), (1, 1, 1), (2, 2, 2), (2, 3, 3)]);
        connect(&mut trace, 0, 1);
        connect(&mut trace, 1, 2);
        connect(&mut trace, 0, 3);
        trace.link_partitions();

        let deepest = calculate_dag_leaps(&mut trace);
        let leaps: Vec<_> = trace.partitions.iter_current().map(|p| p.dag_leap).collect();
        assert_eq!(leaps, vec![0, 1, 2, 1]);
        assert_eq!(deepest, 2);
    }

    #[test]
    fn test_dag_leap_single_parent() {
        let mut trace = singletons(&[(0, 0, 0), (1, 1, 1)]);
        connect(&mut trace, 0, 1);
        trace.link_partitions();
        trace.partitions.get_mut(PartitionId(0)).dag_leap = 4;

        assert_eq!(calculate_dag_leap(&mut trace, PartitionId(1)), 5);
    }

    #[test]
    fn test_mergables_follow_collective_links() {
        let mut trace = singletons(&[(0, 0, 0), (1, 5, 5), (0, 10, 10)]);
        connect(&mut trace, 0, 1);
        connect(&mut trace, 1, 2);
        link_comm_chain(&mut trace);
        trace.link_partitions();

        set_all_mergables(&mut trace, true);
        let middle = trace.partitions.get(PartitionId(1));
        assert_eq!(middle.mergable_parents, middle.parents);
        assert_eq!(middle.mergable_children, middle.children);

        // A collective between the first event and the middle one
        trace.events[0].cc_next = None;
        trace.events[1].cc_prev = None;
        set_mergables(&mut trace, PartitionId(1), true);
        let middle = trace.partitions.get(PartitionId(1));
        assert!(middle.mergable_parents.is_empty());
        assert_eq!(middle.mergable_children.len(), 1);

        set_mergables(&mut trace, PartitionId(1), false);
        let middle = trace.partitions.get(PartitionId(1));
        assert_eq!(middle.mergable_parents, middle.parents);
    }

    #[test]
    fn test_cluster_vectors_fill_gaps() {
        let mut trace = singletons(&[(0, 0, 0), (0, 1, 1), (0, 2, 2)]);
        let p = trace.merge_partitions(PartitionId(0), PartitionId(1));
        let p = trace.merge_partitions(p, PartitionId(2));
        for (i, (step, value)) in [(0, 5), (2, 7), (6, 9)].into_iter().enumerate() {
            trace.events[i].step = step;
            trace.events[i].set_metric("lateness", value);
        }
        trace.partitions.get_mut(p).max_global_step = 10;

        assert_eq!(build_cluster_vectors(&mut trace, p, "lateness"), 1);
        assert_eq!(
            trace.partitions.get(p).cluster_vector(TaskId(0)),
            Some(&[5, 7, 7, 9, 9, 9][..])
        );
    }

    #[test]
    fn test_cluster_vector_length_and_idempotence() {
        let mut trace = singletons(&[(0, 0, 0), (1, 1, 1), (0, 2, 2), (1, 3, 3)]);
        let mut p = PartitionId(0);
        for i in 1..4 {
            p = trace.merge_partitions(p, PartitionId(i));
        }
        // Task 0 at steps 0 and 4, task 1 at steps 2 and 6
        for (i, step) in [0, 2, 4, 6].into_iter().enumerate() {
            trace.events[i].step = step;
        }
        trace.partitions.get_mut(p).max_global_step = 12;

        build_cluster_vectors(&mut trace, p, "missing");
        let first = trace.partitions.get(p).cluster_processes.clone();
        build_cluster_vectors(&mut trace, p, "missing");
        assert_eq!(trace.partitions.get(p).cluster_processes, first);

        for cp in &first {
            let expected = 1 + (12 - cp.start_step) / 2;
            assert_eq!(cp.metric_events.len() as i64, expected);
            assert!(cp.metric_events.iter().all(|v| *v == 0));
        }
    }

    #[test]
    fn test_cluster_vectors_default_to_max_step() {
        let mut trace = singletons(&[(0, 0, 0)]);
        trace.events[0].step = 0;
        trace.partitions.get_mut(PartitionId(0)).max_step = 4;

        build_cluster_vectors(&mut trace, PartitionId(0), "x");
        assert_eq!(
            trace.partitions.get(PartitionId(0)).cluster_vector(TaskId(0)),
            Some(&[0, 0, 0][..])
        );
    }
}
