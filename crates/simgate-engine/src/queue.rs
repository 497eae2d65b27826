//! # simgate-engine::queue
//!
//! The timed event queue: the central synchronization point between the
//! dispatcher thread and the network subscriber threads. The queue keeps a
//! time-ordered list of events, at most one of which is a tentative
//! prediction, and blocks consumers in wall-clock time until the head
//! entry is due.
//!
//! A prediction depends on every event scheduled before it, so any
//! external event with an earlier time invalidates it. Events at the same
//! instant are kept as separate entries; a prediction at the same instant
//! as an external event is always ordered first. The wall-clock anchor
//! (epoch) relates simulation time to the system clock and is chosen
//! exactly once via `init_start_time_now`.

use crate::event::Event;
use crate::sink::EventSink;
use simgate_types::errors::DispatchError;
use simgate_types::time::SimTime;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, trace};

/// Returned by `get` once the queue has been shut down.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("the event queue has been shut down")]
pub struct QueueClosed;

impl From<QueueClosed> for DispatchError {
    fn from(_: QueueClosed) -> Self {
        DispatchError::QueueClosed
    }
}

/// The wall-clock instant corresponding to simulation time `start`.
#[derive(Debug, Clone, Copy)]
struct Epoch {
    wall: Instant,
    start: SimTime,
}

impl Epoch {
    /// How long from `now` until simulation time `t` is due.
    fn delay_until(&self, t: SimTime, now: Instant) -> Duration {
        let delta = t - self.start;
        let target = if delta <= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(delta).unwrap_or(Duration::MAX)
        };
        target.saturating_sub(now.duration_since(self.wall))
    }

    fn simulation_time(&self, now: Instant) -> SimTime {
        self.start + now.duration_since(self.wall).as_secs_f64()
    }
}

struct QueueEntry {
    event: Box<dyn Event>,
    predicted: bool,
}

#[derive(Default)]
struct Inner {
    entries: VecDeque<QueueEntry>,
    epoch: Option<Epoch>,
    closed: bool,
}

/// Event queue implementation issuing predicted events in time.
pub struct TimedEventQueue {
    inner: Mutex<Inner>,
    signal: Condvar,
}

impl Default for TimedEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimedEventQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            signal: Condvar::new(),
        }
    }

    /// Anchors simulation time `start` to the current wall-clock instant.
    ///
    /// Must be called exactly once, before the first `get`. External
    /// events may be registered beforehand; `get` and `timestamp_now`
    /// block until the anchor exists.
    pub fn init_start_time_now(&self, start: SimTime) {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        if inner.epoch.is_some() {
            error!("simulation epoch initialized twice; keeping the first anchor");
            return;
        }
        inner.epoch = Some(Epoch {
            wall: Instant::now(),
            start,
        });
        debug!(start, "simulation epoch anchored to the wall clock");
        self.signal.notify_all();
    }

    /// Registers an event.
    ///
    /// A predicted event is rejected silently when it is already stale,
    /// i.e. when any queued event has a strictly smaller time. An external
    /// event invalidates every prediction with a strictly greater time;
    /// an equal-time prediction stays queued ahead of it.
    pub fn add(&self, ev: Box<dyn Event>, predicted: bool) {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        if inner.closed {
            trace!(%ev, "dropping event registered after shutdown");
            return;
        }
        let time = ev.time();
        if predicted {
            if inner.entries.iter().any(|e| e.event.time() < time) {
                trace!(%ev, "discarding stale prediction");
                return;
            }
            // A newer prediction supersedes any queued one at or after
            // this instant; there is at most one such entry.
            inner.entries.retain(|e| {
                let keep = !(e.predicted && e.event.time() >= time);
                if !keep {
                    trace!(event = %e.event, "de-queued superseded prediction");
                }
                keep
            });
            let pos = insertion_index(&inner.entries, |t| t >= time);
            inner.entries.insert(pos, QueueEntry { event: ev, predicted });
        } else {
            inner.entries.retain(|e| {
                let keep = !(e.predicted && e.event.time() > time);
                if !keep {
                    trace!(event = %e.event, "de-queued invalidated prediction");
                }
                keep
            });
            let pos = insertion_index(&inner.entries, |t| t > time);
            inner.entries.insert(pos, QueueEntry { event: ev, predicted });
        }
        self.signal.notify_one();
    }

    /// Returns the head event once its wall-clock target has arrived.
    ///
    /// Blocks while the queue is empty or the head is still in the future;
    /// a newly registered event re-evaluates the wait. Spurious wake-ups
    /// are handled by re-checking the head on every iteration.
    pub fn get(&self) -> Result<Box<dyn Event>, QueueClosed> {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        loop {
            if inner.closed {
                return Err(QueueClosed);
            }
            let Some(epoch) = inner.epoch else {
                trace!("waiting for the simulation epoch");
                inner = self.signal.wait(inner).expect("queue mutex poisoned");
                continue;
            };
            if inner.entries.is_empty() {
                trace!("waiting for a new event");
                inner = self.signal.wait(inner).expect("queue mutex poisoned");
                continue;
            }
            let head_time = inner.entries[0].event.time();
            let wait = epoch.delay_until(head_time, Instant::now());
            if wait.is_zero() {
                let entry = inner.entries.pop_front().expect("head checked above");
                return Ok(entry.event);
            }
            trace!(event = %inner.entries[0].event, "waiting until the head event is due");
            let (guard, _) = self
                .signal
                .wait_timeout(inner, wait)
                .expect("queue mutex poisoned");
            inner = guard;
        }
    }

    /// Shuts the queue down: pending entries are dropped and every blocked
    /// or future `get` returns `QueueClosed`.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        inner.closed = true;
        inner.entries.clear();
        self.signal.notify_all();
    }
}

impl EventSink for TimedEventQueue {
    fn push_external(&self, ev: Box<dyn Event>) {
        self.add(ev, false);
    }

    fn timestamp_now(&self) -> SimTime {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        loop {
            if let Some(epoch) = inner.epoch {
                return epoch.simulation_time(Instant::now());
            }
            inner = self.signal.wait(inner).expect("queue mutex poisoned");
        }
    }
}

/// The index of the first entry whose time satisfies `beyond`, or the
/// queue length when none does.
fn insertion_index(entries: &VecDeque<QueueEntry>, beyond: impl Fn(SimTime) -> bool) -> usize {
    entries
        .iter()
        .position(|e| beyond(e.event.time()))
        .unwrap_or(entries.len())
}
