//! Call-tree reconstruction and communication chain linking.
//!
//! Each task's raw events are replayed through an explicit stack to build
//! nested events. Trees are independent per task and may be built in
//! parallel. Communication events then get their messages, singleton
//! partitions and a place in the system-wide comm chain in one serialized
//! pass ordered by (enter time, task, event id).

use crate::model::{Event, EventId, FunctionTable, Message, MessageId, RawEvent, TaskId, Trace};
use crate::utils::config::RECV_FUNCTION;
use log::{debug, warn};
use rayon::prelude::*;

/// An enter record waiting for its leave
#[derive(Debug)]
struct Frame<'a> {
    raw: &'a RawEvent,
    children: Vec<usize>,
}

/// Events of one task with task-local ids
#[derive(Debug, Default)]
struct TaskTree {
    events: Vec<Event>,
    roots: Vec<usize>,
    unbalanced: usize,
}

/// Builds the event graph of a trace from per-task raw events
#[derive(Debug)]
pub struct EventGraphBuilder<'a> {
    functions: &'a FunctionTable,
    parallel: bool,
}

impl<'a> EventGraphBuilder<'a> {
    pub fn new(functions: &'a FunctionTable) -> Self {
        Self {
            functions,
            parallel: true,
        }
    }

    /// Build task trees on the calling thread only
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Build the full graph
    ///
    /// **Public** - main entry point after task resolution
    ///
    /// # Arguments
    /// * `trace` - Trace holding tasks and functions, with no events yet
    /// * `task_events` - Raw events per task, sorted by time
    /// * `messages` - Every message produced by the matcher
    ///
    /// # Returns
    /// Number of leave records that had no open enter
    pub fn build(
        &self,
        trace: &mut Trace,
        task_events: &[Vec<RawEvent>],
        messages: Vec<Message>,
    ) -> usize {
        let trees: Vec<TaskTree> = if self.parallel {
            task_events
                .par_iter()
                .enumerate()
                .map(|(task, raws)| self.replay_task(TaskId(task), raws))
                .collect()
        } else {
            task_events
                .iter()
                .enumerate()
                .map(|(task, raws)| self.replay_task(TaskId(task), raws))
                .collect()
        };

        trace.messages = messages;
        trace.task_events = vec![Vec::new(); trace.num_tasks().max(trees.len())];
        trace.roots = vec![Vec::new(); trace.task_events.len()];

        let mut unbalanced = 0;
        for (task, tree) in trees.into_iter().enumerate() {
            unbalanced += tree.unbalanced;
            self.append_tree(trace, task, tree);
        }

        let linked = link_comm_chain(trace);

        debug!(
            "Built {} events, {} communication events, {} partitions",
            trace.events.len(),
            linked,
            trace.partitions.len()
        );

        unbalanced
    }

    /// Replay one task's records through a call stack
    ///
    /// **Private** - internal helper for build
    ///
    /// A leave closes the nearest open frame of its own function. Send and
    /// receive frames still open above it are closed first, since their
    /// intervals depend on the enter record alone; their own leaves are then
    /// skipped when they arrive.
    fn replay_task(&self, task: TaskId, raws: &[RawEvent]) -> TaskTree {
        let mut tree = TaskTree::default();
        let mut stack: Vec<Frame<'_>> = Vec::new();
        let mut closed_early: Vec<(i32, Option<MessageId>)> = Vec::new();

        for raw in raws {
            if raw.enter {
                stack.push(Frame {
                    raw,
                    children: Vec::new(),
                });
                continue;
            }

            let key = (raw.function, raw.message);
            if let Some(index) = closed_early.iter().position(|k| *k == key) {
                closed_early.swap_remove(index);
                continue;
            }

            let Some(position) = stack
                .iter()
                .rposition(|frame| frame.raw.function == raw.function)
            else {
                warn!(
                    "Task {}: leave of function {} at {} with no open enter",
                    task.0, raw.function, raw.time
                );
                tree.unbalanced += 1;
                continue;
            };

            while stack.len() > position + 1 {
                let Some(inner) = stack.pop() else {
                    break;
                };
                if self.functions.is_comm(inner.raw.function) {
                    closed_early.push((inner.raw.function, inner.raw.message));
                } else {
                    warn!(
                        "Task {}: function {} still open when {} left at {}",
                        task.0, inner.raw.function, raw.function, raw.time
                    );
                    tree.unbalanced += 1;
                }
                self.close_frame(task, &mut tree, &mut stack, inner, raw.time);
            }

            if let Some(frame) = stack.pop() {
                self.close_frame(task, &mut tree, &mut stack, frame, raw.time);
            }
        }

        if !stack.is_empty() {
            debug!("Task {}: {} frames never closed", task.0, stack.len());
        }

        tree
    }

    /// Turn a popped frame into an event under the new top of stack
    ///
    /// **Private** - internal helper for replay_task
    fn close_frame<'r>(
        &self,
        task: TaskId,
        tree: &mut TaskTree,
        stack: &mut [Frame<'r>],
        frame: Frame<'r>,
        exit: u64,
    ) {
        let mut event = self.make_event(task, frame.raw, exit);
        event.depth = stack.len();

        let id = tree.events.len();
        for child in &frame.children {
            tree.events[*child].caller = Some(EventId(id));
        }
        event.callees = frame.children.into_iter().map(EventId).collect();
        tree.events.push(event);

        match stack.last_mut() {
            Some(parent) => parent.children.push(id),
            None => tree.roots.push(id),
        }
    }

    /// Event for one enter record closed at `exit`
    ///
    /// **Private** - a send spans its enter tick and a receive the tick
    /// before its enter, whatever time the frame was closed at
    fn make_event(&self, task: TaskId, enter: &RawEvent, exit: u64) -> Event {
        if !self.functions.is_comm(enter.function) {
            return Event::new(task, enter.time, exit, enter.function);
        }

        let Some(message) = enter.message else {
            warn!(
                "Task {}: communication event at {} carries no message",
                task.0, enter.time
            );
            return Event::new(task, enter.time, exit.max(enter.time), enter.function);
        };

        let mut event = if enter.function == RECV_FUNCTION {
            let start = enter.time.saturating_sub(1);
            let mut recv = Event::new(task, start, start, enter.function);
            recv.is_recv = true;
            recv
        } else {
            Event::new(task, enter.time, enter.time, enter.function)
        };
        event.messages.push(message);
        event
    }

    /// Move a task tree into the trace arena
    ///
    /// **Private** - rebases local ids, attaches messages and seeds partitions
    fn append_tree(&self, trace: &mut Trace, task: usize, tree: TaskTree) {
        let base = trace.events.len();
        let rebase = |id: EventId| EventId(id.0 + base);

        for mut event in tree.events {
            event.caller = event.caller.map(rebase);
            for callee in &mut event.callees {
                *callee = rebase(*callee);
            }

            let is_recv = event.is_recv;
            let messages = event.messages.clone();
            let id = trace.push_event(event);
            trace.task_events[task].push(id);

            if messages.is_empty() {
                continue;
            }
            for m in messages {
                if let Some(msg) = trace.messages.get_mut(m.0) {
                    if is_recv {
                        msg.receiver = Some(id);
                    } else {
                        msg.sender = Some(id);
                    }
                }
            }
            trace.partitions.create_singleton(id, &mut trace.events);
        }

        trace.roots[task].extend(tree.roots.into_iter().map(|r| EventId(r + base)));
    }
}

/// Thread every communication event into the system-wide comm chain
///
/// **Public** - also used to relink after events are edited
///
/// # Returns
/// Number of events in the chain
pub fn link_comm_chain(trace: &mut Trace) -> usize {
    let mut comm: Vec<EventId> = (0..trace.events.len())
        .map(EventId)
        .filter(|id| trace.events[id.0].is_comm())
        .collect();
    comm.sort_by_key(|id| {
        let event = &trace.events[id.0];
        (event.enter, event.task, *id)
    });

    let mut prev: Option<EventId> = None;
    for id in &comm {
        let event = &mut trace.events[id.0];
        event.comm_prev = prev;
        event.cc_prev = prev;
        event.comm_next = None;
        event.cc_next = None;

        if let Some(p) = prev {
            let previous = &mut trace.events[p.0];
            previous.comm_next = Some(*id);
            previous.cc_next = Some(*id);
        }
        prev = Some(*id);
    }

    trace.chain_head = comm.first().copied();
    comm.len()
}
