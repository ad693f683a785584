use causal_trace_engine::importer::{import_records, import_trace, ImportOptions};
use causal_trace_engine::model::{Message, Trace};
use causal_trace_engine::parser::{parse_log, parse_sts};
use causal_trace_engine::stepping::causality_violations;
use causal_trace_engine::utils::error::ParseError;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const STS: &str = "\
VERSION 7.0
PROCESSORS 2
CHARE 3 Worker
ENTRY CHARE 4 start 3 0
ENTRY CHARE 5 recvGhost 3 1
TOTAL_CHARES 1
";

// Worker[0] starts at 2 on process 0 and sends entry 5 / event 1 at 10.
// The message that started it was never logged by process 1.
const SEND_LOG: &str = "\
PROJECTIONS-RECORD 3
2 0 4 2 0 1 16 2 0 0 0 0 2
1 0 5 10 1 0 16 10
3 0 4 20 0 1 16 20
";

// Worker[1] processes entry 5 / event 1 from 12 to 15 on process 1.
const RECV_LOG: &str = "\
PROJECTIONS-RECORD 2
2 0 5 12 1 0 16 12 1 0 0 0 12
3 0 5 15 1 0 16 15
";

fn write_trace(logs: &[&str]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let sts = dir.path().join("jacobi.sts");
    fs::write(&sts, STS).unwrap();
    for (pe, log) in logs.iter().enumerate() {
        fs::write(dir.path().join(format!("jacobi.{}.log", pe)), log).unwrap();
    }
    (dir, sts)
}

fn find_message(trace: &Trace, entry: i32, event: i64) -> &Message {
    trace
        .messages
        .iter()
        .find(|m| m.entry == entry && m.event == event)
        .unwrap()
}

fn sequential() -> ImportOptions {
    ImportOptions {
        parallel: false,
        ..Default::default()
    }
}

fn assert_send_then_receive(sts: &Path, options: &ImportOptions) {
    let imported = import_trace(sts, options).unwrap();
    let trace = &imported.trace;

    assert!(imported.report.failures.is_empty());
    assert_eq!(trace.num_tasks(), 2);
    assert_eq!(trace.tasks[0].label, "[0,0,0,0]");
    assert_eq!(trace.tasks[1].label, "[1,0,0,0]");

    let msg = find_message(trace, 5, 1);
    assert!(msg.is_matched());
    let send = trace.event(msg.sender.unwrap());
    let recv = trace.event(msg.receiver.unwrap());

    assert_eq!((send.enter, send.exit), (10, 10));
    // Receive offsets in the log (begin+1, begin+2) undo to the begin tick, not a widened window
    assert_eq!((recv.enter, recv.exit), (12, 12));
    assert!(recv.is_recv);
    assert_eq!(send.comm_next, msg.receiver);
    assert_eq!(recv.comm_prev, msg.sender);

    // Each communication event seeds its own partition
    let sp = trace.partition_of(msg.sender.unwrap()).unwrap();
    let rp = trace.partition_of(msg.receiver.unwrap()).unwrap();
    assert_ne!(sp, rp);
    assert_eq!(trace.partitions.get(sp).num_events(), 1);
    assert_eq!(trace.partitions.get(rp).num_events(), 1);
    assert!(trace.partitions.get(sp).children.contains(&rp));
    assert_eq!(trace.partitions.get(rp).dag_leap, 1);

    assert_eq!(send.step, 0);
    assert!(recv.step >= 1);

    // The receive that started Worker[0] never found its send
    assert_eq!(imported.report.unmatched_messages, 1);
    assert!(imported.report.stepping.violations.is_empty());
}

#[test]
fn test_two_process_send_and_receive() {
    let (_dir, sts) = write_trace(&[SEND_LOG, RECV_LOG]);
    assert_send_then_receive(&sts, &sequential());
}

#[test]
fn test_parallel_import_matches_sequential() {
    let (_dir, sts) = write_trace(&[SEND_LOG, RECV_LOG]);
    assert_send_then_receive(&sts, &ImportOptions::default());

    let a = import_trace(&sts, &sequential()).unwrap();
    let b = import_trace(&sts, &ImportOptions::default()).unwrap();
    let steps = |t: &Trace| t.events.iter().map(|e| (e.task, e.enter, e.step)).collect::<Vec<_>>();
    assert_eq!(steps(&a.trace), steps(&b.trace));
}

#[test]
fn test_call_tree_roots() {
    let (_dir, sts) = write_trace(&[SEND_LOG, RECV_LOG]);
    let imported = import_trace(&sts, &sequential()).unwrap();
    let trace = &imported.trace;

    // Worker[0]: start [2,20] holding its receive and its send
    assert_eq!(trace.roots[0].len(), 1);
    let root = trace.event(trace.roots[0][0]);
    assert_eq!((root.enter, root.exit, root.depth), (2, 20, 0));
    assert_eq!(trace.functions.name(root.function), "start");
    assert_eq!(root.callees.len(), 2);
    for callee in &root.callees {
        assert_eq!(trace.event(*callee).caller, Some(trace.roots[0][0]));
        assert_eq!(trace.event(*callee).depth, 1);
    }

    assert_eq!(trace.comm_chain().len(), 3);
}

#[test]
fn test_send_at_end_and_one_tick_entry() {
    // Worker[0] sends as its last action; Worker[1] runs for a single tick
    let send_log = "\
PROJECTIONS-RECORD 3
2 0 4 2 0 1 16 2 0 0 0 0 2
1 0 5 20 1 0 16 20
3 0 4 20 0 1 16 20
";
    let recv_log = "\
PROJECTIONS-RECORD 2
2 0 5 30 1 0 16 30 1 0 0 0 30
3 0 5 31 1 0 16 31
";
    let (_dir, sts) = write_trace(&[send_log, recv_log]);

    let imported = import_trace(&sts, &sequential()).unwrap();
    let trace = &imported.trace;
    assert_eq!(imported.report.unbalanced, 0);

    for event in &trace.events {
        assert!(event.enter <= event.exit, "inverted interval: {:?}", event);
    }

    let msg = find_message(trace, 5, 1);
    let send = trace.event(msg.sender.unwrap());
    let recv = trace.event(msg.receiver.unwrap());
    assert_eq!((send.enter, send.exit), (20, 20));
    assert_eq!((recv.enter, recv.exit), (30, 30));

    let roots: Vec<_> = trace
        .roots
        .iter()
        .map(|r| {
            let root = trace.event(r[0]);
            (root.enter, root.exit, root.callees.len())
        })
        .collect();
    assert_eq!(roots, vec![(2, 20, 2), (30, 31, 1)]);
    assert!(send.step < recv.step);
}

#[test]
fn test_receive_logged_before_send() {
    let metadata = parse_sts(STS.as_bytes()).unwrap();

    // Process 0 receives event 7 from process 1 and is read first
    let recv_log = "HEADER\n2 0 5 20 7 1 16 20 0 0 0 0 20\n3 0 5 25 7 1 16 25\n";
    let send_log = "\
HEADER
2 0 4 1 0 0 16 1 1 0 0 0 1
1 0 5 10 7 1 16 10
3 0 4 12 0 0 16 12
";
    let logs = vec![
        parse_log(recv_log.as_bytes(), metadata.version).unwrap(),
        parse_log(send_log.as_bytes(), metadata.version).unwrap(),
    ];

    let imported = import_records(metadata, &logs, &sequential());
    let trace = &imported.trace;

    let msg = find_message(trace, 5, 7);
    assert!(msg.is_matched());
    assert_eq!(msg.send_process, 1);
    assert_eq!(msg.recv_process, Some(0));
    assert_eq!(msg.send_time, Some(10));
    assert_eq!(msg.recv_time, Some(20));

    let send = trace.event(msg.sender.unwrap());
    let recv = trace.event(msg.receiver.unwrap());
    assert!(send.step < recv.step);
    assert!(causality_violations(trace).is_empty());
}

#[test]
fn test_malformed_log_fails_only_its_process() {
    // Begin record cut short before the actor index
    let broken = "PROJECTIONS-RECORD 1\n2 0 5 12 1 0 16 12\n";
    let (_dir, sts) = write_trace(&[SEND_LOG, broken]);

    let imported = import_trace(&sts, &sequential()).unwrap();
    let report = &imported.report;

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].process, 1);
    assert!(matches!(
        report.failures[0].error,
        ParseError::MalformedRecord { line: 2, .. }
    ));

    // Process 0 is still imported but Worker has a single instance left
    assert!(report.raw_events > 0);
    assert_eq!(imported.trace.num_tasks(), 0);
    assert_eq!(report.dropped_events, report.raw_events);
}

#[test]
fn test_missing_log_is_a_process_failure() {
    let (_dir, sts) = write_trace(&[SEND_LOG]);

    let imported = import_trace(&sts, &sequential()).unwrap();
    assert_eq!(imported.report.failures.len(), 1);
    assert!(matches!(
        imported.report.failures[0].error,
        ParseError::Io(_)
    ));
}

#[test]
fn test_cluster_vectors_built_when_requested() {
    let (_dir, sts) = write_trace(&[SEND_LOG, RECV_LOG]);
    let options = ImportOptions {
        cluster_metric: Some("lateness".to_string()),
        ..sequential()
    };

    let imported = import_trace(&sts, &options).unwrap();
    for partition in imported.trace.partitions.iter_current() {
        assert_eq!(partition.cluster_processes.len(), partition.events.len());
    }
}
