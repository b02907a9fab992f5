//! Priority-Aware Stream Scheduler
//!
//! Deficit-weighted round robin over the schedulable streams of one
//! connection. Each stream carries a byte credit; every accounting round
//! tops credits up in proportion to the stream's effective share from the
//! dependency tree, and the stream with the highest available credit sends
//! next. Ties go to the stream served longest ago, and a stream left
//! unselected past the starvation threshold has its credit raised by one
//! full quantum, so forward progress holds even under degenerate weights.
//!
//! ## Usage
//!
//! The writer drains the connection with the `next_sendable` / `account`
//! pair:
//!
//! ```rust,ignore
//! while let Some((id, quota)) = scheduler.next_sendable(&tree, &streams, max) {
//!     let written = transport.write(id, quota)?;
//!     scheduler.account(&tree, &mut streams, id, written);
//! }
//! ```
//!
//! `next_sendable` never fails; a stream with no credit, no window, or no
//! queued data is simply never returned.

use crate::config::SchedulerConfig;
use crate::priority::{PriorityTree, SHARE_SCALE};
use crate::stream::{Stream, StreamId};
use std::collections::HashMap;

/// Per-stream scheduling state.
#[derive(Debug, Default)]
struct ScheduleEntry {
    /// Deficit credit in bytes. Goes negative when an oversized quantum is
    /// spent and is repaid by the per-round share income.
    credit: i64,
    /// Round counter value when this stream last sent.
    last_served_seq: u64,
    /// Consecutive rounds this stream was schedulable but not selected.
    waiting_rounds: u32,
}

/// Deficit-weighted round-robin scheduler for one connection.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    entries: HashMap<StreamId, ScheduleEntry>,
    global_seq: u64,
}

impl Scheduler {
    /// Create a scheduler with the given tuning.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            global_seq: 0,
        }
    }

    /// Create a scheduler with default tuning.
    pub fn with_defaults() -> Self {
        Self::new(SchedulerConfig::default())
    }

    /// Start tracking a stream. Fresh streams begin with zero credit.
    pub fn register(&mut self, id: StreamId) {
        self.entries.entry(id).or_default();
    }

    /// Stop tracking a stream (after it is pruned from the tree).
    pub fn deregister(&mut self, id: StreamId) {
        self.entries.remove(&id);
    }

    /// Selection-time share bias in bytes: one full quantum scaled by the
    /// stream's effective share.
    #[inline]
    fn quantum(&self, share: u64) -> i64 {
        (self.config.per_stream_cap_bytes as u64 * share / SHARE_SCALE) as i64
    }

    /// Per-turn byte cap: dominant streams may batch more per turn.
    #[inline]
    fn cap(&self, share: u64) -> usize {
        if share > SHARE_SCALE / 2 {
            self.config.big_stream_cap_bytes
        } else {
            self.config.per_stream_cap_bytes
        }
    }

    /// Pick the stream allowed to transmit next and its byte allotment, or
    /// `None` when nothing is schedulable.
    pub fn next_sendable(
        &mut self,
        tree: &PriorityTree,
        streams: &HashMap<StreamId, Stream>,
        max_bytes: usize,
    ) -> Option<(StreamId, usize)> {
        if max_bytes == 0 {
            return None;
        }
        let shares = tree.effective_shares(|id| {
            streams.get(&id).map(Stream::is_schedulable).unwrap_or(false)
        });

        let mut best: Option<(i64, u64, StreamId, u64)> = None;
        for &(id, share) in &shares {
            let quantum = self.quantum(share);
            let entry = self.entries.entry(id).or_default();
            let score = entry.credit + quantum;
            let seq = entry.last_served_seq;
            let better = match best {
                None => true,
                Some((bscore, bseq, bid, _)) => {
                    score > bscore || (score == bscore && (seq < bseq || (seq == bseq && id < bid)))
                }
            };
            if better {
                best = Some((score, seq, id, share));
            }
        }

        let (_, _, id, share) = best?;
        let stream = streams.get(&id)?;
        let allotment = max_bytes
            .min(stream.send_window() as usize)
            .min(stream.queued_bytes())
            .min(self.cap(share));
        Some((id, allotment))
    }

    /// Record that `n` bytes of stream `id` were handed to the transport.
    ///
    /// Debits the stream's credit and windows, advances the round counter,
    /// redistributes the round's `n` bytes as share-proportional credit
    /// income to every schedulable stream, and ages the ones that were
    /// passed over. Tying income to the bytes actually moved keeps sibling
    /// ratios on target even when the per-turn caps differ between
    /// dominant and ordinary streams.
    pub fn account(
        &mut self,
        tree: &PriorityTree,
        streams: &mut HashMap<StreamId, Stream>,
        id: StreamId,
        n: usize,
    ) {
        if let Some(stream) = streams.get_mut(&id) {
            stream.consume(n);
        }

        self.global_seq += 1;
        let seq = self.global_seq;
        {
            let entry = self.entries.entry(id).or_default();
            entry.credit -= n as i64;
            entry.last_served_seq = seq;
            entry.waiting_rounds = 0;
        }

        let shares = tree.effective_shares(|sid| {
            streams.get(&sid).map(Stream::is_schedulable).unwrap_or(false)
        });
        let threshold = self.config.starvation_threshold_rounds;
        let full_quantum = self.config.per_stream_cap_bytes as i64;
        for &(sid, share) in &shares {
            let income = (n as u64 * share / SHARE_SCALE) as i64;
            let entry = self.entries.entry(sid).or_default();
            entry.credit += income;
            if sid != id {
                entry.waiting_rounds += 1;
                if entry.waiting_rounds > threshold {
                    entry.credit += full_quantum;
                    entry.waiting_rounds = 0;
                    tracing::debug!(stream = sid, "starvation credit applied");
                }
            }
        }
    }

    /// Rounds completed so far (monotonic).
    #[inline]
    pub fn rounds(&self) -> u64 {
        self.global_seq
    }
}
