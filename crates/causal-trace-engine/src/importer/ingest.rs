//! Conversion of one process's typed records into raw enter/leave events.
//!
//! Every process carries its own [`ParseState`], so processes can be
//! ingested on independent workers. The only shared structure is the
//! [`MessageMatcher`].

use crate::matching::{MessageMatcher, ReceiveHalf, SendHalf};
use crate::model::{ActorRef, RawEvent};
use crate::parser::{Record, TraceMetadata};
use crate::utils::config::{RECV_FUNCTION, SEND_FUNCTION};
use crate::utils::error::ParseError;
use log::{debug, warn};

/// Per-process ingestion state
#[derive(Debug)]
pub struct ParseState {
    process: u32,

    /// Actor of the most recent begin-processing record
    last: Option<ActorRef>,

    events: Vec<RawEvent>,
}

impl ParseState {
    pub fn new(process: u32) -> Self {
        Self {
            process,
            last: None,
            events: Vec::new(),
        }
    }

    /// Apply one record
    ///
    /// **Public** - called for every record of the process, in log order
    ///
    /// # Errors
    /// * `ParseError::UnknownEntry` - a begin-processing record names an entry
    ///   the metadata does not define, so its actor cannot be attributed
    pub fn apply(
        &mut self,
        record: &Record,
        metadata: &TraceMetadata,
        matcher: &MessageMatcher,
    ) -> Result<(), ParseError> {
        match record {
            Record::BeginProcessing {
                header,
                msg_len,
                index,
                ..
            } => {
                let kind = metadata
                    .entry_kind(header.entry)
                    .ok_or(ParseError::UnknownEntry(header.entry))?;
                let actor = Some(ActorRef {
                    kind,
                    index: *index,
                });
                self.last = actor;

                self.push(
                    RawEvent::new(self.process, header.time, header.entry, true).with_actor(actor),
                );

                let message = matcher.record_receive(ReceiveHalf {
                    sender: header.pe,
                    receiver: self.process,
                    entry: header.entry,
                    event: header.event,
                    time: header.time,
                    msg_len: *msg_len,
                });

                // Offset so the receive sorts inside its processing event
                self.push(
                    RawEvent::new(self.process, header.time + 1, RECV_FUNCTION, true)
                        .with_actor(actor)
                        .with_message(message),
                );
                self.push(
                    RawEvent::new(self.process, header.time + 2, RECV_FUNCTION, false)
                        .with_actor(actor)
                        .with_message(message),
                );
            }
            Record::Creation {
                header, msg_len, ..
            } => {
                let message = matcher.record_send(SendHalf {
                    sender: self.process,
                    entry: header.entry,
                    event: header.event,
                    time: header.time,
                    msg_type: header.msg_type,
                    msg_len: *msg_len,
                });

                if self.last.is_none() {
                    debug!(
                        "Send at {} on process {} has no enclosing entry",
                        header.time, self.process
                    );
                }

                let actor = self.last;
                self.push(
                    RawEvent::new(self.process, header.time, SEND_FUNCTION, true)
                        .with_actor(actor)
                        .with_message(message),
                );
                self.push(
                    RawEvent::new(self.process, header.time + 1, SEND_FUNCTION, false)
                        .with_actor(actor)
                        .with_message(message),
                );
            }
            Record::CreationBcast {
                header, num_pes, ..
            } => {
                debug!(
                    "Skipping broadcast of entry {} to {} processes at {}",
                    header.entry, num_pes, header.time
                );
            }
            Record::EndProcessing { header, .. } => {
                if self.last.is_none() {
                    warn!(
                        "End of entry {} at {} on process {} without a begin",
                        header.entry, header.time, self.process
                    );
                }
                let actor = self.last;
                self.push(
                    RawEvent::new(self.process, header.time, header.entry, false).with_actor(actor),
                );
            }
            Record::MessageRecv => {
                debug!("Ignoring message-recv record on process {}", self.process);
            }
        }

        Ok(())
    }

    fn push(&mut self, event: RawEvent) {
        self.events.push(event);
    }

    pub fn into_events(self) -> Vec<RawEvent> {
        self.events
    }
}

/// Turn a whole process log into raw events
///
/// **Public** - one call per process, safe to run concurrently
///
/// # Arguments
/// * `process` - Process the records were read from
/// * `records` - Records in log order
/// * `metadata` - Parsed `.sts` metadata
/// * `matcher` - Matcher shared by every process
///
/// # Errors
/// Stops at the first record that cannot be attributed
pub fn ingest_records(
    process: u32,
    records: &[Record],
    metadata: &TraceMetadata,
    matcher: &MessageMatcher,
) -> Result<Vec<RawEvent>, ParseError> {
    let mut state = ParseState::new(process);
    for record in records {
        state.apply(record, metadata, matcher)?;
    }

    debug!(
        "Process {}: {} records became {} raw events",
        process,
        records.len(),
        state.events.len()
    );

    Ok(state.into_events())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActorIndex;
    use crate::parser::{parse_sts, RecordHeader};
    use pretty_assertions::assert_eq;

    fn metadata() -> TraceMetadata {
        let sts = "VERSION 7.0\nPROCESSORS 2\nCHARE 3 Worker\nENTRY CHARE 5 recvGhost 3 0\n";
        parse_sts(sts.as_bytes()).unwrap()
    }

    fn header(entry: i32, time: u64, event: i64, pe: u32) -> RecordHeader {
        RecordHeader {
            msg_type: 0,
            entry,
            time,
            event,
            pe,
        }
    }

    fn begin(time: u64, event: i64, pe: u32, idx: i32) -> Record {
        Record::BeginProcessing {
            header: header(5, time, event, pe),
            msg_len: 16,
            recv_time: None,
            index: ActorIndex([idx, 0, 0, 0]),
            cpu_start: None,
        }
    }

    #[test]
    fn test_begin_emits_entry_and_receive() {
        let matcher = MessageMatcher::new(2);
        let events = ingest_records(
            1,
            &[
                begin(12, 1, 0, 1),
                Record::EndProcessing {
                    header: header(5, 15, 1, 0),
                    msg_len: 16,
                    cpu_end: None,
                },
            ],
            &metadata(),
            &matcher,
        )
        .unwrap();

        let shape: Vec<_> = events.iter().map(|e| (e.time, e.function, e.enter)).collect();
        assert_eq!(
            shape,
            vec![
                (12, 5, true),
                (13, RECV_FUNCTION, true),
                (14, RECV_FUNCTION, false),
                (15, 5, false)
            ]
        );
        assert!(events.iter().all(|e| e.actor.map(|a| a.kind) == Some(3)));
        assert_eq!(events[1].message, events[2].message);
        assert_eq!(matcher.pending_count(), 1);
    }

    #[test]
    fn test_send_uses_last_actor() {
        let matcher = MessageMatcher::new(2);
        let events = ingest_records(
            0,
            &[
                begin(2, 0, 1, 7),
                Record::Creation {
                    header: header(5, 10, 1, 0),
                    msg_len: 16,
                    send_time: None,
                },
            ],
            &metadata(),
            &matcher,
        )
        .unwrap();

        let send = &events[3];
        assert_eq!(send.function, SEND_FUNCTION);
        assert_eq!(send.time, 10);
        assert_eq!(send.actor.map(|a| a.index), Some(ActorIndex([7, 0, 0, 0])));
        assert_eq!(events[4].time, 11);
    }

    #[test]
    fn test_send_without_begin_has_no_actor() {
        let matcher = MessageMatcher::new(1);
        let events = ingest_records(
            0,
            &[Record::Creation {
                header: header(5, 10, 1, 0),
                msg_len: 16,
                send_time: None,
            }],
            &metadata(),
            &matcher,
        )
        .unwrap();

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.actor.is_none()));
    }

    #[test]
    fn test_broadcast_produces_no_events() {
        let matcher = MessageMatcher::new(1);
        let events = ingest_records(
            0,
            &[Record::CreationBcast {
                header: header(5, 10, 1, 0),
                msg_len: 16,
                send_time: None,
                num_pes: 4,
            }],
            &metadata(),
            &matcher,
        )
        .unwrap();

        assert!(events.is_empty());
        assert_eq!(matcher.message_count(), 0);
    }

    #[test]
    fn test_unknown_entry_fails() {
        let matcher = MessageMatcher::new(1);
        let record = Record::BeginProcessing {
            header: header(42, 1, 0, 0),
            msg_len: 0,
            recv_time: None,
            index: ActorIndex::default(),
            cpu_start: None,
        };

        let result = ingest_records(0, &[record], &metadata(), &matcher);
        assert!(matches!(result, Err(ParseError::UnknownEntry(42))));
    }
}
