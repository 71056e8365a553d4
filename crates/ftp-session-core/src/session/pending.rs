//! Per-session queue of issued-but-unacknowledged commands

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::types::{PendingCommand, INIT_COMMAND};

/// Reply codes the greeting shim is allowed to absorb
const GREETING_CODES: [u16; 3] = [120, 220, 421];

/// Ordered FIFO of commands awaiting their replies.
///
/// Pairing is strictly by issue order, not by reply content; the protocol is
/// assumed to answer in order. The queue carries an explicit capacity so a
/// peer issuing commands without ever reading replies cannot grow it without
/// bound; evictions are counted rather than silent.
#[derive(Debug)]
pub struct PendingCommandQueue {
    entries: VecDeque<PendingCommand>,
    capacity: usize,
    evicted: u64,
}

impl PendingCommandQueue {
    /// Create a queue bounded at `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            evicted: 0,
        }
    }

    /// Append a command, evicting the oldest entry at capacity
    pub fn push(&mut self, command: String, argument: String, now: DateTime<Utc>) {
        if self.entries.len() >= self.capacity {
            if let Some(dropped) = self.entries.pop_front() {
                self.evicted += 1;
                warn!(
                    "pending queue full, evicting {} issued at {}",
                    dropped.command, dropped.issued_at
                );
            }
        }
        self.entries
            .push_back(PendingCommand::new(command, argument, now));
    }

    /// Remove and return the command this reply answers.
    ///
    /// FIFO with one concession: the greeting shim only absorbs
    /// greeting-class codes. A real reply arriving while a real command
    /// waits behind the shim discards the shim, since the greeting window
    /// has passed.
    pub fn take_matching(&mut self, reply_code: u16) -> Option<PendingCommand> {
        if self.entries.len() > 1
            && !GREETING_CODES.contains(&reply_code)
            && self
                .entries
                .front()
                .is_some_and(|c| c.command == INIT_COMMAND)
        {
            debug!("discarding unanswered greeting shim for reply {reply_code}");
            self.entries.pop_front();
        }
        self.entries.pop_front()
    }

    /// Remove and return the head unconditionally (connection teardown)
    pub fn take_next(&mut self) -> Option<PendingCommand> {
        self.entries.pop_front()
    }

    /// Number of commands issued but not yet paired
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is awaiting a reply
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Commands dropped because the queue was at capacity
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(queue: &mut PendingCommandQueue, cmd: &str) {
        queue.push(cmd.to_string(), String::new(), Utc::now());
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = PendingCommandQueue::new(8);
        push(&mut queue, "USER");
        push(&mut queue, "PASS");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.take_matching(331).unwrap().command, "USER");
        assert_eq!(queue.take_matching(230).unwrap().command, "PASS");
        assert!(queue.take_matching(200).is_none());
    }

    #[test]
    fn test_eviction_at_capacity() {
        let mut queue = PendingCommandQueue::new(2);
        push(&mut queue, "A");
        push(&mut queue, "B");
        push(&mut queue, "C");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.evicted(), 1);
        // Oldest went first; the newest commands survive
        assert_eq!(queue.take_next().unwrap().command, "B");
        assert_eq!(queue.take_next().unwrap().command, "C");
    }

    #[test]
    fn test_greeting_shim_absorbs_greeting() {
        let mut queue = PendingCommandQueue::new(8);
        queue.push(INIT_COMMAND.to_string(), String::new(), Utc::now());
        push(&mut queue, "RETR");
        let taken = queue.take_matching(220).unwrap();
        assert_eq!(taken.command, INIT_COMMAND);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_shim_skipped_for_real_reply() {
        let mut queue = PendingCommandQueue::new(8);
        queue.push(INIT_COMMAND.to_string(), String::new(), Utc::now());
        push(&mut queue, "RETR");
        let taken = queue.take_matching(150).unwrap();
        assert_eq!(taken.command, "RETR");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_lone_shim_absorbs_anything() {
        let mut queue = PendingCommandQueue::new(8);
        queue.push(INIT_COMMAND.to_string(), String::new(), Utc::now());
        let taken = queue.take_matching(530).unwrap();
        assert_eq!(taken.command, INIT_COMMAND);
    }
}
