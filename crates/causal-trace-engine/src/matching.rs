//! Send/receive pairing across independently read process logs.
//!
//! Each process log is read on its own, so the receive half of a message can
//! be seen before or after its send half. Halves wait in a pending table
//! keyed by sending process and the event id local to that process; the
//! entry id disambiguates messages that share an event id. The table is
//! sharded by sending process, each shard behind its own lock, so readers of
//! different processes only contend when they touch the same sender.

use crate::model::{Message, MessageId};
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Which side of a message a pending record holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    Send,
    Receive,
}

impl Half {
    fn opposite(self) -> Self {
        match self {
            Half::Send => Half::Receive,
            Half::Receive => Half::Send,
        }
    }
}

/// One side of a message waiting for its counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMessage {
    pub half: Half,
    pub entry: i32,
    pub message: MessageId,
}

/// A creation record seen on the sending process
#[derive(Debug, Clone, Copy)]
pub struct SendHalf {
    pub sender: u32,
    pub entry: i32,
    pub event: i64,
    pub time: u64,
    pub msg_type: i32,
    pub msg_len: i64,
}

/// A begin-processing record seen on the receiving process
#[derive(Debug, Clone, Copy)]
pub struct ReceiveHalf {
    pub sender: u32,
    pub receiver: u32,
    pub entry: i32,
    pub event: i64,
    pub time: u64,
    pub msg_len: i64,
}

type Bucket = HashMap<(u32, i64), Vec<PendingMessage>>;

/// Shared pending-match table plus the message arena it fills
#[derive(Debug)]
pub struct MessageMatcher {
    buckets: Vec<Mutex<Bucket>>,
    messages: Mutex<Vec<Message>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MessageMatcher {
    /// Create a matcher with one shard per process
    pub fn new(processes: u32) -> Self {
        let shards = processes.max(1) as usize;
        Self {
            buckets: (0..shards).map(|_| Mutex::new(HashMap::new())).collect(),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Record the send side of a message
    ///
    /// **Public** - called once per creation record
    ///
    /// # Returns
    /// The message shared with the receive side, whether or not it has been seen yet
    pub fn record_send(&self, send: SendHalf) -> MessageId {
        let (id, mut guard) = self.pair(send.sender, send.event, send.entry, Half::Send);

        let msg = &mut guard[id.0];
        msg.send_time = Some(send.time);
        msg.tag = send.msg_type;
        msg.size = send.msg_len;
        id
    }

    /// Record the receive side of a message
    ///
    /// **Public** - called once per begin-processing record
    pub fn record_receive(&self, recv: ReceiveHalf) -> MessageId {
        let (id, mut guard) = self.pair(recv.sender, recv.event, recv.entry, Half::Receive);

        let msg = &mut guard[id.0];
        msg.recv_time = Some(recv.time);
        msg.recv_process = Some(recv.receiver);
        if msg.size < 0 {
            msg.size = recv.msg_len;
        }
        id
    }

    /// Complete a waiting counterpart or start a new pending half.
    ///
    /// Returns with the message arena locked so the caller can fill its side.
    ///
    /// **Private** - shared by both record paths
    fn pair(
        &self,
        sender: u32,
        event: i64,
        entry: i32,
        half: Half,
    ) -> (MessageId, MutexGuard<'_, Vec<Message>>) {
        let mut bucket = lock(&self.buckets[sender as usize % self.buckets.len()]);
        let key = (sender, event);

        let found = bucket.get_mut(&key).and_then(|candidates| {
            let position = candidates
                .iter()
                .position(|c| c.entry == entry && c.half == half.opposite())?;
            Some(candidates.remove(position))
        });

        if let Some(pending) = found {
            if bucket.get(&key).is_some_and(Vec::is_empty) {
                bucket.remove(&key);
            }
            return (pending.message, lock(&self.messages));
        }

        let mut messages = lock(&self.messages);
        let id = MessageId(messages.len());
        messages.push(Message::new(sender, entry, event));
        bucket.entry(key).or_default().push(PendingMessage {
            half,
            entry,
            message: id,
        });
        (id, messages)
    }

    /// Number of halves still waiting for a counterpart
    pub fn pending_count(&self) -> usize {
        self.buckets
            .iter()
            .map(|b| lock(b).values().map(Vec::len).sum::<usize>())
            .sum()
    }

    /// Number of messages allocated so far
    pub fn message_count(&self) -> usize {
        lock(&self.messages).len()
    }

    /// Consume the matcher, returning every message in allocation order
    pub fn into_messages(self) -> Vec<Message> {
        let pending = self.pending_count();
        let messages = self
            .messages
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        debug!(
            "Matcher finished: {} messages, {} one-sided",
            messages.len(),
            pending
        );
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn send(sender: u32, entry: i32, event: i64, time: u64) -> SendHalf {
        SendHalf {
            sender,
            entry,
            event,
            time,
            msg_type: 0,
            msg_len: 64,
        }
    }

    fn recv(sender: u32, receiver: u32, entry: i32, event: i64, time: u64) -> ReceiveHalf {
        ReceiveHalf {
            sender,
            receiver,
            entry,
            event,
            time,
            msg_len: 64,
        }
    }

    #[test]
    fn test_send_then_receive() {
        let matcher = MessageMatcher::new(2);
        let a = matcher.record_send(send(0, 5, 1, 10));
        assert_eq!(matcher.pending_count(), 1);
        let b = matcher.record_receive(recv(0, 1, 5, 1, 12));

        assert_eq!(a, b);
        assert_eq!(matcher.pending_count(), 0);

        let messages = matcher.into_messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_matched());
        assert_eq!(messages[0].send_time, Some(10));
        assert_eq!(messages[0].recv_time, Some(12));
        assert_eq!(messages[0].recv_process, Some(1));
    }

    #[test]
    fn test_matching_is_order_independent() {
        let forward = MessageMatcher::new(2);
        let f = forward.record_send(send(0, 5, 7, 10));
        assert_eq!(forward.record_receive(recv(0, 1, 5, 7, 12)), f);

        let reverse = MessageMatcher::new(2);
        let r = reverse.record_receive(recv(0, 1, 5, 7, 12));
        assert_eq!(reverse.record_send(send(0, 5, 7, 10)), r);

        assert_eq!(forward.into_messages(), reverse.into_messages());
    }

    #[test]
    fn test_entry_disambiguates_shared_event_id() {
        let matcher = MessageMatcher::new(2);
        let a = matcher.record_send(send(0, 5, 3, 10));
        let b = matcher.record_send(send(0, 6, 3, 11));
        assert_ne!(a, b);

        assert_eq!(matcher.record_receive(recv(0, 1, 6, 3, 20)), b);
        assert_eq!(matcher.record_receive(recv(0, 1, 5, 3, 21)), a);
        assert_eq!(matcher.pending_count(), 0);
    }

    #[test]
    fn test_event_ids_are_local_to_sender() {
        let matcher = MessageMatcher::new(3);
        let from0 = matcher.record_send(send(0, 5, 1, 10));
        let from1 = matcher.record_send(send(1, 5, 1, 10));
        assert_ne!(from0, from1);

        assert_eq!(matcher.record_receive(recv(1, 2, 5, 1, 14)), from1);
        assert_eq!(matcher.pending_count(), 1);
    }

    #[test]
    fn test_same_half_never_pairs() {
        let matcher = MessageMatcher::new(1);
        let a = matcher.record_receive(recv(0, 0, 5, 1, 10));
        let b = matcher.record_receive(recv(0, 0, 5, 1, 11));
        assert_ne!(a, b);
        assert_eq!(matcher.pending_count(), 2);
    }

    #[test]
    fn test_unmatched_half_stays_one_sided() {
        let matcher = MessageMatcher::new(2);
        matcher.record_receive(recv(1, 0, 5, 9, 30));

        let messages = matcher.into_messages();
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].is_matched());
        assert_eq!(messages[0].send_time, None);
    }

    #[test]
    fn test_sender_beyond_declared_processes() {
        let matcher = MessageMatcher::new(2);
        let a = matcher.record_send(send(7, 5, 1, 10));
        let b = matcher.record_send(send(1, 5, 1, 10));
        assert_ne!(a, b);
        assert_eq!(matcher.record_receive(recv(7, 0, 5, 1, 12)), a);
    }

    #[test]
    fn test_concurrent_readers() {
        let matcher = MessageMatcher::new(4);

        std::thread::scope(|scope| {
            for pe in 0..4u32 {
                let matcher = &matcher;
                scope.spawn(move || {
                    for event in 0..100i64 {
                        // Every process sends to its neighbour and receives from the other one
                        matcher.record_send(send(pe, 5, event, event as u64));
                        let from = (pe + 3) % 4;
                        matcher.record_receive(recv(from, pe, 5, event, event as u64 + 1));
                    }
                });
            }
        });

        assert_eq!(matcher.pending_count(), 0);
        let messages = matcher.into_messages();
        assert_eq!(messages.len(), 400);
        assert!(messages.iter().all(Message::is_matched));
    }
}
