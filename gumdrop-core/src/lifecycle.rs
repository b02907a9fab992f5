//! Async Request Lifecycle Manager
//!
//! Binds a stream to user-level asynchronous work and shepherds it to
//! exactly one terminal event. A request enters async mode with `begin`,
//! which yields an opaque [`Ticket`]; from then on the ticket can gain
//! listeners, have its timeout re-armed, and finish through exactly one of
//! `complete`, `error`, or a timeout firing on the shared executor.
//!
//! ## Ordering contract
//!
//! For every ticket, each listener observes `on_start_async` once, then at
//! most one of `on_timeout`, `on_complete`, or `on_error`. Terminal
//! transitions race through a compare-and-set on the ticket state: the
//! winner dispatches, losers observe the terminal state and return without
//! side effects.
//!
//! ## Threading
//!
//! Frame-driven completions run on the connection's I/O thread; timeouts
//! run on the shared executor's threads. The state word is atomic and the
//! listener list sits behind a per-ticket mutex, so either side sees a
//! consistent view. Listener callbacks must not block; a callback that
//! panics is caught, logged, and skipped — it never suppresses the
//! remaining listeners.
//!
//! ## Unhandled timeouts
//!
//! If no listener takes over during `on_timeout` dispatch (by completing
//! the ticket), the manager emits a default 500-class response through the
//! [`ResponseWriter`] the connection was built with.

use crate::config::AsyncConfig;
use crate::connection::ConnectionStats;
use crate::error::{Error, Result};
use crate::executor::{TimeoutHandle, TimerExecutor};
use crate::stream::{Stream, StreamId};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Status code of the default response for unhandled timeouts.
const TIMEOUT_STATUS: u16 = 500;

/// Opaque handle identifying one async lifecycle record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

impl Ticket {
    /// Raw ticket number, for logging and lookup tables.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ticket#{}", self.0)
    }
}

/// Lifecycle state of a ticket. `Active` is the only non-terminal state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncState {
    Active = 0,
    TimedOut = 1,
    Errored = 2,
    Completed = 3,
}

impl AsyncState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Active,
            1 => Self::TimedOut,
            2 => Self::Errored,
            _ => Self::Completed,
        }
    }

    /// Check if terminal.
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Event payload handed to listeners.
#[derive(Debug, Clone)]
pub struct AsyncEvent {
    pub ticket: Ticket,
    pub stream_id: StreamId,
    /// Time since the request entered async mode.
    pub elapsed: Duration,
    /// Failure description, set for `on_error` only.
    pub cause: Option<String>,
}

/// Observer of one request's async lifecycle.
///
/// All callbacks default to no-ops so implementors override only the
/// events they care about. Callbacks run synchronously on the thread that
/// caused the transition and must not block.
pub trait AsyncListener: Send + Sync {
    /// The request entered async mode.
    fn on_start_async(&self, _event: &AsyncEvent) {}
    /// The request finished normally.
    fn on_complete(&self, _event: &AsyncEvent) {}
    /// The request's deadline passed before completion.
    fn on_timeout(&self, _event: &AsyncEvent) {}
    /// The request failed or its stream was torn down.
    fn on_error(&self, _event: &AsyncEvent) {}
}

/// Downstream response surface the manager writes through.
///
/// The core never encodes frames; the frame layer supplies an
/// implementation that turns these calls into wire bytes.
pub trait ResponseWriter: Send + Sync {
    /// Write a response payload on the given stream.
    fn write(&self, stream_id: StreamId, body: Bytes);
    /// Emit a complete error response with the given status code.
    fn send_error(&self, stream_id: StreamId, status: u16);
}

/// A `ResponseWriter` that discards everything, for setups where the frame
/// layer surfaces failures through another channel.
#[derive(Debug, Default)]
pub struct NullResponseWriter;

impl ResponseWriter for NullResponseWriter {
    fn write(&self, _stream_id: StreamId, _body: Bytes) {}
    fn send_error(&self, _stream_id: StreamId, _status: u16) {}
}

struct RecordInner {
    listeners: Vec<Arc<dyn AsyncListener>>,
    timeout_task: Option<TimeoutHandle>,
    timeout_ms: u64,
}

struct LifecycleRecord {
    ticket: Ticket,
    stream_id: StreamId,
    created_at: Instant,
    state: AtomicU8,
    /// Set when a completion call lands on an already timed-out ticket,
    /// i.e. a listener took responsibility during `on_timeout` dispatch.
    timeout_handled: AtomicBool,
    inner: Mutex<RecordInner>,
}

impl LifecycleRecord {
    fn state(&self) -> AsyncState {
        AsyncState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Attempt the Active -> terminal transition. Exactly one caller wins.
    fn try_terminate(&self, to: AsyncState) -> bool {
        self.state
            .compare_exchange(
                AsyncState::Active as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn event(&self, cause: Option<String>) -> AsyncEvent {
        AsyncEvent {
            ticket: self.ticket,
            stream_id: self.stream_id,
            elapsed: self.created_at.elapsed(),
            cause,
        }
    }
}

struct ManagerShared {
    config: AsyncConfig,
    executor: Arc<TimerExecutor>,
    writer: Arc<dyn ResponseWriter>,
    stats: Arc<ConnectionStats>,
    records: Mutex<HashMap<u64, Arc<LifecycleRecord>>>,
    next_ticket: AtomicU64,
}

impl Drop for ManagerShared {
    fn drop(&mut self) {
        for record in self.records.get_mut().values() {
            if let Some(task) = record.inner.lock().timeout_task.take() {
                task.cancel();
            }
        }
    }
}

/// Per-connection async request manager.
///
/// Owns the connection's lifecycle records and ticket table; shares the
/// process-wide [`TimerExecutor`] with every other connection. Cloning is
/// cheap and yields a handle to the same state, which is how listeners can
/// complete a ticket from inside a callback.
#[derive(Clone)]
pub struct LifecycleManager {
    shared: Arc<ManagerShared>,
}

impl LifecycleManager {
    /// Create a manager using the given executor, response writer, and
    /// stats sink.
    pub fn new(
        config: AsyncConfig,
        executor: Arc<TimerExecutor>,
        writer: Arc<dyn ResponseWriter>,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                config,
                executor,
                writer,
                stats,
                records: Mutex::new(HashMap::new()),
                next_ticket: AtomicU64::new(1),
            }),
        }
    }

    /// Put `stream` into async mode with the configured default timeout.
    pub fn begin(&self, stream: &mut Stream) -> Result<Ticket> {
        let timeout_ms = self.shared.config.default_timeout_ms;
        self.begin_with_timeout(stream, timeout_ms)
    }

    /// Put `stream` into async mode. `timeout_ms == 0` disables the
    /// timeout; any positive value sets a deadline from now.
    pub fn begin_with_timeout(&self, stream: &mut Stream, timeout_ms: u64) -> Result<Ticket> {
        if stream.state().is_closed() {
            return Err(Error::IllegalState(format!(
                "cannot start async on closed stream {}",
                stream.id()
            )));
        }
        if let Some(existing) = stream.ticket() {
            if self.state(existing) == Some(AsyncState::Active) {
                return Err(Error::IllegalState(format!(
                    "stream {} is already in async mode ({})",
                    stream.id(),
                    existing
                )));
            }
        }

        let ticket = Ticket(self.shared.next_ticket.fetch_add(1, Ordering::Relaxed));
        let record = Arc::new(LifecycleRecord {
            ticket,
            stream_id: stream.id(),
            created_at: Instant::now(),
            state: AtomicU8::new(AsyncState::Active as u8),
            timeout_handled: AtomicBool::new(false),
            inner: Mutex::new(RecordInner {
                listeners: Vec::new(),
                timeout_task: None,
                timeout_ms,
            }),
        });
        self.shared
            .records
            .lock()
            .insert(ticket.value(), Arc::clone(&record));

        if timeout_ms > 0 {
            let task = self.schedule_timeout(&record, timeout_ms);
            record.inner.lock().timeout_task = task;
        }

        stream.set_ticket(Some(ticket));
        self.shared.stats.record_ticket_begun();
        debug!(stream = stream.id(), %ticket, timeout_ms, "async mode started");
        Ok(ticket)
    }

    /// Append a listener. Fires `on_start_async` synchronously so every
    /// listener sees the start event before any terminal one. A no-op on
    /// terminal (or released) tickets.
    pub fn add_listener(&self, ticket: Ticket, listener: Arc<dyn AsyncListener>) -> Result<()> {
        let Some(record) = self.lookup(ticket) else {
            return Ok(());
        };
        if record.state().is_terminal() {
            return Ok(());
        }
        record.inner.lock().listeners.push(Arc::clone(&listener));
        let event = record.event(None);
        invoke(&event, || listener.on_start_async(&event), "on_start_async");
        Ok(())
    }

    /// Re-arm the ticket's timeout with a deadline `timeout_ms` from now,
    /// cancelling any pending one. `0` leaves the ticket without a
    /// timeout. Rejected once the ticket is terminal.
    pub fn set_timeout(&self, ticket: Ticket, timeout_ms: u64) -> Result<()> {
        let record = self.lookup(ticket).ok_or_else(|| {
            Error::IllegalState(format!("{} is already terminal or unknown", ticket))
        })?;
        if record.state().is_terminal() {
            return Err(Error::IllegalState(format!("{} is already terminal", ticket)));
        }

        let mut inner = record.inner.lock();
        if let Some(task) = inner.timeout_task.take() {
            task.cancel();
        }
        inner.timeout_ms = timeout_ms;
        if timeout_ms > 0 {
            inner.timeout_task = self.schedule_timeout(&record, timeout_ms);
        }
        Ok(())
    }

    /// Terminal COMPLETED transition. Idempotent: repeated calls, and calls
    /// on tickets that already finished some other way, are no-ops that
    /// return successfully.
    pub fn complete(&self, ticket: Ticket) -> Result<()> {
        self.terminate(ticket, AsyncState::Completed, None)
    }

    /// Hand the request off to a downstream target, then complete it.
    pub fn dispatch(&self, ticket: Ticket, target: &str) -> Result<()> {
        debug!(%ticket, to = target, "async dispatch handoff");
        self.terminate(ticket, AsyncState::Completed, None)
    }

    /// Terminal ERRORED transition with a failure description.
    pub fn error(&self, ticket: Ticket, cause: impl Into<String>) -> Result<()> {
        self.terminate(ticket, AsyncState::Errored, Some(cause.into()))
    }

    /// Executor entry point: fire the ticket's timeout. Loses quietly if a
    /// completion got there first; otherwise dispatches `on_timeout` and,
    /// when no listener handled it, writes the default 500-class response.
    pub fn on_timeout_fire(&self, ticket: Ticket) {
        let Some(record) = self.lookup(ticket) else {
            return;
        };
        if !record.try_terminate(AsyncState::TimedOut) {
            return;
        }
        self.shared.stats.record_ticket_timed_out();

        let event = record.event(None);
        for listener in snapshot_listeners(&record) {
            invoke(&event, || listener.on_timeout(&event), "on_timeout");
        }

        if !record.timeout_handled.load(Ordering::Acquire) {
            warn!(
                stream = record.stream_id,
                %ticket,
                "async timeout unhandled, sending default {} response",
                TIMEOUT_STATUS
            );
            self.shared.writer.send_error(record.stream_id, TIMEOUT_STATUS);
            self.shared.stats.record_default_response();
        }

        self.release(&record);
    }

    /// Current state of an active ticket. Terminal tickets are released
    /// once their event has been dispatched, so this returns `None` for
    /// them.
    pub fn state(&self, ticket: Ticket) -> Option<AsyncState> {
        self.lookup(ticket).map(|r| r.state())
    }

    /// Number of records still held (active tickets plus any currently
    /// mid-dispatch).
    pub fn active_tickets(&self) -> usize {
        self.shared.records.lock().len()
    }

    fn lookup(&self, ticket: Ticket) -> Option<Arc<LifecycleRecord>> {
        self.shared.records.lock().get(&ticket.value()).cloned()
    }

    fn terminate(&self, ticket: Ticket, to: AsyncState, cause: Option<String>) -> Result<()> {
        let Some(record) = self.lookup(ticket) else {
            // record already released: treat as terminal, succeed quietly
            return Ok(());
        };

        if !record.try_terminate(to) {
            if record.state() == AsyncState::TimedOut {
                // a listener (or late caller) is taking over a timed-out
                // ticket; suppress the default response
                record.timeout_handled.store(true, Ordering::Release);
            }
            return Ok(());
        }

        match to {
            AsyncState::Completed => self.shared.stats.record_ticket_completed(),
            AsyncState::Errored => self.shared.stats.record_ticket_errored(),
            _ => {}
        }

        let event = record.event(cause);
        for listener in snapshot_listeners(&record) {
            match to {
                AsyncState::Completed => {
                    invoke(&event, || listener.on_complete(&event), "on_complete")
                }
                AsyncState::Errored => invoke(&event, || listener.on_error(&event), "on_error"),
                _ => {}
            }
        }

        self.release(&record);
        Ok(())
    }

    /// Cancel the pending timeout and drop the record from the table.
    fn release(&self, record: &Arc<LifecycleRecord>) {
        if let Some(task) = record.inner.lock().timeout_task.take() {
            task.cancel();
        }
        self.shared.records.lock().remove(&record.ticket.value());
    }

    fn schedule_timeout(
        &self,
        record: &Arc<LifecycleRecord>,
        timeout_ms: u64,
    ) -> Option<TimeoutHandle> {
        let weak: Weak<ManagerShared> = Arc::downgrade(&self.shared);
        let ticket = record.ticket;
        let result = self.shared.executor.schedule(
            Duration::from_millis(timeout_ms),
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    LifecycleManager { shared }.on_timeout_fire(ticket);
                }
            }),
        );
        match result {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(%ticket, "timeout not scheduled, ticket continues without one: {}", e);
                None
            }
        }
    }
}

fn snapshot_listeners(record: &LifecycleRecord) -> Vec<Arc<dyn AsyncListener>> {
    record.inner.lock().listeners.clone()
}

/// Run one listener callback, containing panics so one bad listener never
/// starves the rest.
fn invoke<F: FnOnce()>(event: &AsyncEvent, f: F, name: &str) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(
            ticket = %event.ticket,
            stream = event.stream_id,
            callback = name,
            "async listener panicked; continuing with remaining listeners"
        );
    }
}
