//! HTTP/2 Connection Send Engine
//!
//! Per-connection façade over the core: the stream table, the priority
//! dependency tree, the deficit scheduler, and the async lifecycle manager,
//! driven by parsed frame events and drained by the writer.
//!
//! The frame layer feeds events in (`on_headers`, `on_data`, `on_priority`,
//! `on_rst_stream`, `on_window_update`), the handler side queues response
//! bytes (`enqueue`) and may park a request in async mode, and the writer
//! drains the connection with the `next_sendable` / `account` pair.
//!
//! The hot path is cooperatively single-threaded: frame events, scheduling
//! decisions, and frame-driven lifecycle transitions all run on the
//! connection's I/O thread, so none of the structures here carry locks.
//! The one cross-thread interaction — timeout firing — is confined to the
//! lifecycle manager.

use crate::config::{AsyncConfig, SchedulerConfig};
use crate::error::{Error, Result};
use crate::executor::TimerExecutor;
use crate::lifecycle::{AsyncListener, LifecycleManager, ResponseWriter, Ticket};
use crate::priority::{PrioritySnapshot, PriorityTree, DEFAULT_WEIGHT};
use crate::scheduler::Scheduler;
use crate::stream::{Stream, StreamId, INITIAL_WINDOW_SIZE, MAX_WINDOW_SIZE};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Connection Statistics
// ============================================================================

/// Counters for one connection's streams, scheduling, and async tickets.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Streams created (by HEADERS or first PRIORITY reference)
    streams_created: AtomicU64,
    /// Streams that reached the closed state
    streams_closed: AtomicU64,
    /// Streams currently tracked
    active_streams: AtomicUsize,
    /// RST_STREAM frames received
    resets_received: AtomicU64,
    /// Bytes handed to the transport by the scheduler
    bytes_scheduled: AtomicU64,
    /// Requests that entered async mode
    tickets_begun: AtomicU64,
    /// Tickets completed normally
    tickets_completed: AtomicU64,
    /// Tickets whose deadline fired first
    tickets_timed_out: AtomicU64,
    /// Tickets torn down by stream failure
    tickets_errored: AtomicU64,
    /// Default 500-class responses written for unhandled timeouts
    default_responses: AtomicU64,
}

impl ConnectionStats {
    /// Create a new statistics tracker
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_stream_created(&self) {
        self.streams_created.fetch_add(1, Ordering::Relaxed);
        self.active_streams.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stream_closed(&self) {
        self.streams_closed.fetch_add(1, Ordering::Relaxed);
        self.active_streams.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reset_received(&self) {
        self.resets_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_bytes_scheduled(&self, n: u64) {
        self.bytes_scheduled.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ticket_begun(&self) {
        self.tickets_begun.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ticket_completed(&self) {
        self.tickets_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ticket_timed_out(&self) {
        self.tickets_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ticket_errored(&self) {
        self.tickets_errored.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_default_response(&self) {
        self.default_responses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn streams_created(&self) -> u64 {
        self.streams_created.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn streams_closed(&self) -> u64 {
        self.streams_closed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn resets_received(&self) -> u64 {
        self.resets_received.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn bytes_scheduled(&self) -> u64 {
        self.bytes_scheduled.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn tickets_begun(&self) -> u64 {
        self.tickets_begun.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn tickets_completed(&self) -> u64 {
        self.tickets_completed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn tickets_timed_out(&self) -> u64 {
        self.tickets_timed_out.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn tickets_errored(&self) -> u64 {
        self.tickets_errored.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn default_responses(&self) -> u64 {
        self.default_responses.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Send-side engine for one HTTP/2 connection.
pub struct Connection {
    streams: HashMap<StreamId, Stream>,
    tree: PriorityTree,
    scheduler: Scheduler,
    lifecycle: LifecycleManager,
    /// Connection-level send window (RFC 7540 §6.9.1)
    send_window: i64,
    stats: Arc<ConnectionStats>,
}

impl Connection {
    /// Create a connection engine with explicit tuning and collaborators.
    pub fn new(
        scheduler_config: SchedulerConfig,
        async_config: AsyncConfig,
        executor: Arc<TimerExecutor>,
        writer: Arc<dyn ResponseWriter>,
    ) -> Self {
        let stats = Arc::new(ConnectionStats::new());
        let lifecycle =
            LifecycleManager::new(async_config, executor, writer, Arc::clone(&stats));
        Self {
            streams: HashMap::new(),
            tree: PriorityTree::new(),
            scheduler: Scheduler::new(scheduler_config),
            lifecycle,
            send_window: INITIAL_WINDOW_SIZE,
            stats,
        }
    }

    /// Create a connection engine with default tuning on the process-wide
    /// timer executor.
    pub fn with_defaults(writer: Arc<dyn ResponseWriter>) -> Self {
        Self::new(
            SchedulerConfig::default(),
            AsyncConfig::default(),
            TimerExecutor::shared(),
            writer,
        )
    }

    fn create_stream(&mut self, id: StreamId) -> &mut Stream {
        self.tree
            .add(id, 0, DEFAULT_WEIGHT, false)
            .expect("fresh stream id already in tree");
        self.scheduler.register(id);
        self.stats.record_stream_created();
        self.streams.entry(id).or_insert_with(|| Stream::new(id))
    }

    fn require_stream(&mut self, id: StreamId) -> Result<&mut Stream> {
        self.streams
            .get_mut(&id)
            .ok_or_else(|| Error::Protocol(format!("frame on unknown stream {}", id)))
    }

    // ------------------------------------------------------------------
    // Frame events
    // ------------------------------------------------------------------

    /// Peer HEADERS: opens the stream on first sight.
    pub fn on_headers(&mut self, id: StreamId, end_stream: bool) -> Result<()> {
        if id == 0 {
            return Err(Error::Protocol("HEADERS on stream 0".into()));
        }
        if !self.streams.contains_key(&id) {
            self.create_stream(id);
        }
        self.streams.get_mut(&id).unwrap().recv_headers(end_stream)?;
        self.reap_if_closed(id, "stream closed");
        Ok(())
    }

    /// Peer DATA on an open stream.
    pub fn on_data(&mut self, id: StreamId, end_stream: bool) -> Result<()> {
        self.require_stream(id)?.recv_data(end_stream)?;
        self.reap_if_closed(id, "stream closed");
        Ok(())
    }

    /// PRIORITY frame. References to unseen ids create the stream in the
    /// idle state, as the tree must hold it either way.
    pub fn on_priority(
        &mut self,
        id: StreamId,
        parent: StreamId,
        weight: u16,
        exclusive: bool,
    ) -> Result<()> {
        if self.tree.contains(id) {
            self.tree.reprioritize(id, parent, weight, exclusive)
        } else {
            if id == 0 {
                return Err(Error::Protocol("PRIORITY on stream 0".into()));
            }
            self.tree.add(id, parent, weight, exclusive)?;
            self.scheduler.register(id);
            self.stats.record_stream_created();
            self.streams.insert(id, Stream::new(id));
            Ok(())
        }
    }

    /// RST_STREAM: abrupt close; an attached async ticket goes
    /// error-terminal.
    pub fn on_rst_stream(&mut self, id: StreamId) -> Result<()> {
        let stream = self.require_stream(id)?;
        let already_closed = stream.state().is_closed();
        stream.reset();
        self.stats.record_reset_received();
        if !already_closed {
            self.reap_if_closed(id, "stream reset by peer");
        }
        Ok(())
    }

    /// WINDOW_UPDATE. Stream 0 credits the connection-level window.
    pub fn on_window_update(&mut self, id: StreamId, increment: u32) -> Result<()> {
        if id == 0 {
            if increment == 0 {
                return Err(Error::Protocol(
                    "WINDOW_UPDATE with zero increment on connection".into(),
                ));
            }
            let updated = self.send_window + i64::from(increment);
            if updated > MAX_WINDOW_SIZE {
                return Err(Error::FlowControl(format!(
                    "connection send window overflow: {}",
                    updated
                )));
            }
            self.send_window = updated;
            return Ok(());
        }
        self.require_stream(id)?.recv_window_update(increment)
    }

    /// SETTINGS_INITIAL_WINDOW_SIZE changed: shift every stream window by
    /// the delta. Windows may go negative; such streams simply wait for
    /// more credit.
    pub fn apply_initial_window_delta(&mut self, delta: i64) -> Result<()> {
        for stream in self.streams.values_mut() {
            if !stream.state().is_closed() {
                stream.apply_initial_window_delta(delta)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Local send side
    // ------------------------------------------------------------------

    /// Record locally sent HEADERS for a pushed or server-initiated stream.
    pub fn send_headers(&mut self, id: StreamId, end_stream: bool) -> Result<()> {
        if id == 0 {
            return Err(Error::Protocol("HEADERS on stream 0".into()));
        }
        if !self.streams.contains_key(&id) {
            self.create_stream(id);
        }
        self.streams.get_mut(&id).unwrap().send_headers(end_stream)?;
        self.reap_if_closed(id, "stream closed");
        Ok(())
    }

    /// Queue response bytes for the scheduler to drain.
    pub fn enqueue(&mut self, id: StreamId, len: usize) -> Result<()> {
        let stream = self
            .streams
            .get_mut(&id)
            .ok_or_else(|| Error::IllegalState(format!("enqueue on unknown stream {}", id)))?;
        stream.enqueue(len)
    }

    /// Mark the local end of the stream finished.
    pub fn send_end_stream(&mut self, id: StreamId) -> Result<()> {
        self.require_stream(id)?.send_end_stream()?;
        self.reap_if_closed(id, "stream closed before async completion");
        Ok(())
    }

    /// Abruptly close a stream from this side.
    pub fn close_stream(&mut self, id: StreamId) -> Result<()> {
        let stream = self
            .streams
            .get_mut(&id)
            .ok_or_else(|| Error::IllegalState(format!("close of unknown stream {}", id)))?;
        let already_closed = stream.state().is_closed();
        stream.reset();
        if !already_closed {
            self.reap_if_closed(id, "stream closed locally");
        }
        Ok(())
    }

    /// If the stream has reached the closed state: fail its ticket, ghost
    /// or drop its tree node, and release per-stream scheduler state.
    fn reap_if_closed(&mut self, id: StreamId, cause: &str) {
        let closed = self
            .streams
            .get(&id)
            .map(|s| s.state().is_closed())
            .unwrap_or(false);
        if !closed {
            return;
        }
        if let Some(ticket) = self.streams.get(&id).and_then(Stream::ticket) {
            self.lifecycle.error(ticket, cause).ok();
        }
        self.stats.record_stream_closed();
        self.tree.mark_closed(id);
        for removed in self.tree.sweep_closed(id) {
            self.scheduler.deregister(removed);
            self.streams.remove(&removed);
        }
        debug!(stream = id, "stream closed");
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Pick the next stream allowed to send and its byte allotment,
    /// bounded by the caller's budget and the connection window.
    pub fn next_sendable(&mut self, max_bytes: usize) -> Option<(StreamId, usize)> {
        if self.send_window <= 0 {
            return None;
        }
        let budget = max_bytes.min(self.send_window as usize);
        self.scheduler.next_sendable(&self.tree, &self.streams, budget)
    }

    /// Account for bytes written to the transport.
    pub fn account(&mut self, id: StreamId, n: usize) {
        self.send_window -= n as i64;
        self.stats.record_bytes_scheduled(n as u64);
        self.scheduler.account(&self.tree, &mut self.streams, id, n);
    }

    // ------------------------------------------------------------------
    // Async lifecycle
    // ------------------------------------------------------------------

    /// Put a stream's request into async mode with the default timeout.
    pub fn begin_async(&mut self, id: StreamId) -> Result<Ticket> {
        let stream = self
            .streams
            .get_mut(&id)
            .ok_or_else(|| Error::IllegalState(format!("async on unknown stream {}", id)))?;
        self.lifecycle.begin(stream)
    }

    /// Put a stream's request into async mode with an explicit timeout
    /// (`0` disables).
    pub fn begin_async_with_timeout(&mut self, id: StreamId, timeout_ms: u64) -> Result<Ticket> {
        let stream = self
            .streams
            .get_mut(&id)
            .ok_or_else(|| Error::IllegalState(format!("async on unknown stream {}", id)))?;
        self.lifecycle.begin_with_timeout(stream, timeout_ms)
    }

    /// Register an async listener on a ticket.
    pub fn add_async_listener(
        &self,
        ticket: Ticket,
        listener: Arc<dyn AsyncListener>,
    ) -> Result<()> {
        self.lifecycle.add_listener(ticket, listener)
    }

    /// Complete an async request.
    pub fn complete_async(&self, ticket: Ticket) -> Result<()> {
        self.lifecycle.complete(ticket)
    }

    /// Hand an async request off to a downstream target and complete it.
    pub fn dispatch_async(&self, ticket: Ticket, target: &str) -> Result<()> {
        self.lifecycle.dispatch(ticket, target)
    }

    /// Fail an async request.
    pub fn error_async(&self, ticket: Ticket, cause: impl Into<String>) -> Result<()> {
        self.lifecycle.error(ticket, cause)
    }

    /// Re-arm an async request's timeout.
    pub fn set_async_timeout(&self, ticket: Ticket, timeout_ms: u64) -> Result<()> {
        self.lifecycle.set_timeout(ticket, timeout_ms)
    }

    /// Direct access to the lifecycle manager (for handlers that complete
    /// tickets from other threads or from inside listeners).
    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Stream lookup, if it has not been pruned yet.
    pub fn stream(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    /// Connection-level send window.
    pub fn send_window(&self) -> i64 {
        self.send_window
    }

    /// Structural view of the priority tree.
    pub fn snapshot(&self) -> Vec<PrioritySnapshot> {
        self.tree.snapshot()
    }

    /// Shared counters for this connection.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }
}
