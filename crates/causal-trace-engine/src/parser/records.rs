//! Per-process log record tokenizer.
//!
//! A record is one space separated line. The first token is the record type,
//! followed by the common header `msg_type entry time event pe` and a tail
//! whose layout depends on the trace format version. The tail layout of each
//! record type is a table of `(field, minimum version)` rules consumed in
//! order, so a field is present exactly when the trace version reaches its
//! minimum.

use crate::model::ActorIndex;
use crate::utils::config::{
    BEGIN_PROCESSING, CREATION, CREATION_BCAST, END_PROCESSING, INDEX_COMPONENTS, MESSAGE_RECV,
};
use crate::utils::error::ParseError;
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// Fields common to every message-related record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub msg_type: i32,
    pub entry: i32,
    pub time: u64,
    pub event: i64,
    pub pe: u32,
}

/// A typed log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A message was created (sent) on this process
    Creation {
        header: RecordHeader,
        msg_len: i64,
        send_time: Option<u64>,
    },

    /// A broadcast was created on this process
    CreationBcast {
        header: RecordHeader,
        msg_len: i64,
        send_time: Option<u64>,
        num_pes: u32,
    },

    /// An entry method started processing a received message.
    /// `header.pe` is the sending process.
    BeginProcessing {
        header: RecordHeader,
        msg_len: i64,
        recv_time: Option<u64>,
        index: ActorIndex,
        cpu_start: Option<u64>,
    },

    /// The current entry method finished
    EndProcessing {
        header: RecordHeader,
        msg_len: i64,
        cpu_end: Option<u64>,
    },

    MessageRecv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    MsgLen,
    SendTime,
    NumPes,
    RecvTime,
    Index(usize),
    CpuStart,
    CpuEnd,
}

#[derive(Debug, Clone, Copy)]
struct FieldRule {
    field: Field,
    since: f32,
}

const fn rule(field: Field, since: f32) -> FieldRule {
    FieldRule { field, since }
}

const CREATION_FIELDS: &[FieldRule] = &[rule(Field::MsgLen, 2.0), rule(Field::SendTime, 5.0)];

const CREATION_BCAST_FIELDS: &[FieldRule] = &[
    rule(Field::MsgLen, 2.0),
    rule(Field::SendTime, 5.0),
    rule(Field::NumPes, 0.0),
];

// id3 precedes cpu_start on disk even though it arrived in a later version
const BEGIN_PROCESSING_FIELDS: &[FieldRule] = &[
    rule(Field::MsgLen, 2.0),
    rule(Field::RecvTime, 4.0),
    rule(Field::Index(0), 4.0),
    rule(Field::Index(1), 4.0),
    rule(Field::Index(2), 4.0),
    rule(Field::Index(3), 7.0),
    rule(Field::CpuStart, 6.5),
];

const END_PROCESSING_FIELDS: &[FieldRule] =
    &[rule(Field::MsgLen, 2.0), rule(Field::CpuEnd, 6.5)];

/// Values collected from a record tail
#[derive(Debug, Default)]
struct TailValues {
    msg_len: Option<i64>,
    send_time: Option<u64>,
    num_pes: Option<u32>,
    recv_time: Option<u64>,
    index: [i32; INDEX_COMPONENTS],
    cpu_start: Option<u64>,
    cpu_end: Option<u64>,
}

/// Cursor over the tokens of one line
struct Tokens<'a> {
    inner: std::str::SplitWhitespace<'a>,
    line: usize,
}

impl<'a> Tokens<'a> {
    fn next<T: FromStr>(&mut self, what: &str) -> Result<T, ParseError> {
        let token = self.inner.next().ok_or_else(|| ParseError::MalformedRecord {
            line: self.line,
            reason: format!("missing {}", what),
        })?;

        token.parse::<T>().map_err(|_| ParseError::MalformedRecord {
            line: self.line,
            reason: format!("invalid {} '{}'", what, token),
        })
    }
}

/// Parse one log line
///
/// **Public** - main entry point for record tokenizing
///
/// # Returns
/// `Ok(None)` for blank lines and record types the importer does not use
///
/// # Errors
/// * `ParseError::MalformedRecord` - a required or version-gated field is missing or invalid
pub fn parse_line(line: &str, line_no: usize, version: f32) -> Result<Option<Record>, ParseError> {
    let mut tokens = Tokens {
        inner: line.split_whitespace(),
        line: line_no,
    };

    let Some(first) = tokens.inner.next() else {
        return Ok(None);
    };
    let rectype: i32 = first.parse().map_err(|_| ParseError::MalformedRecord {
        line: line_no,
        reason: format!("invalid record type '{}'", first),
    })?;

    let layout = match rectype {
        CREATION => CREATION_FIELDS,
        CREATION_BCAST => CREATION_BCAST_FIELDS,
        BEGIN_PROCESSING => BEGIN_PROCESSING_FIELDS,
        END_PROCESSING => END_PROCESSING_FIELDS,
        MESSAGE_RECV => return Ok(Some(Record::MessageRecv)),
        _ => return Ok(None),
    };

    let header = RecordHeader {
        msg_type: tokens.next("message type")?,
        entry: tokens.next("entry")?,
        time: tokens.next("time")?,
        event: tokens.next("event id")?,
        pe: tokens.next("process")?,
    };

    let tail = parse_tail(&mut tokens, layout, version)?;
    let msg_len = tail.msg_len.unwrap_or(-1);

    let record = match rectype {
        CREATION => Record::Creation {
            header,
            msg_len,
            send_time: tail.send_time,
        },
        CREATION_BCAST => Record::CreationBcast {
            header,
            msg_len,
            send_time: tail.send_time,
            num_pes: tail.num_pes.unwrap_or(0),
        },
        BEGIN_PROCESSING => Record::BeginProcessing {
            header,
            msg_len,
            recv_time: tail.recv_time,
            index: ActorIndex(tail.index),
            cpu_start: tail.cpu_start,
        },
        _ => Record::EndProcessing {
            header,
            msg_len,
            cpu_end: tail.cpu_end,
        },
    };

    Ok(Some(record))
}

/// Consume the version-gated tail of a record
///
/// **Private** - internal helper for parse_line
fn parse_tail(
    tokens: &mut Tokens<'_>,
    layout: &[FieldRule],
    version: f32,
) -> Result<TailValues, ParseError> {
    let mut tail = TailValues::default();

    for rule in layout.iter().filter(|r| version >= r.since) {
        match rule.field {
            Field::MsgLen => tail.msg_len = Some(tokens.next("message length")?),
            Field::SendTime => tail.send_time = Some(tokens.next("send time")?),
            Field::NumPes => tail.num_pes = Some(tokens.next("broadcast process count")?),
            Field::RecvTime => tail.recv_time = Some(tokens.next("receive time")?),
            Field::Index(i) => tail.index[i] = tokens.next("actor index")?,
            Field::CpuStart => tail.cpu_start = Some(tokens.next("cpu start")?),
            Field::CpuEnd => tail.cpu_end = Some(tokens.next("cpu end")?),
        }
    }

    Ok(tail)
}

/// Parse a whole process log. The first line is a header and is skipped.
///
/// Stops at the first malformed record.
pub fn parse_log(reader: impl BufRead, version: f32) -> Result<Vec<Record>, ParseError> {
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        if let Some(record) = parse_line(&line, index + 1, version)? {
            records.push(record);
        }
    }

    Ok(records)
}

/// Read and parse a process log from disk
pub fn read_log(path: impl AsRef<Path>, version: f32) -> Result<Vec<Record>, ParseError> {
    let path = path.as_ref();
    debug!("Reading log: {}", path.display());

    let file = File::open(path)?;
    let records = parse_log(BufReader::new(file), version)?;

    debug!("Parsed {} records from {}", records.len(), path.display());
    Ok(records)
}
