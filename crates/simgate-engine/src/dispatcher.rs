//! # simgate-engine::dispatcher
//!
//! The dispatcher implements the main program cycle: predict the next
//! internal event, schedule it against the wall clock, block until the
//! earliest event is due, and distribute it to the registered listeners in
//! order. The predictor is always the first listener so that it commits
//! the model state before publishers and loggers observe the event.

use crate::event::EventListener;
use crate::predictor::EventPredictor;
use crate::queue::TimedEventQueue;
use crate::sink::EventSink;
use simgate_types::config::ConfigTree;
use simgate_types::errors::{ConfigError, DispatchError};
use simgate_types::time::{SimTime, UNBOUNDED_TIME};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, trace};

/// The key of the start time property.
pub const PROP_START_TIME: &str = "app.startTime";
/// The key of the stop time property.
pub const PROP_STOP_TIME: &str = "app.stopTime";

/// A single-shot slot carrying a terminal error from a worker thread to
/// the dispatcher, which polls it on every event delivery.
#[derive(Clone, Default)]
pub struct PendingError {
    slot: Arc<Mutex<Option<DispatchError>>>,
}

impl PendingError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the error. The first stored error wins; later ones are only
    /// logged.
    pub fn raise(&self, err: DispatchError) {
        let mut slot = self.slot.lock().expect("error slot mutex poisoned");
        if let Some(pending) = slot.as_ref() {
            error!(%err, %pending, "dropping error; another one is already pending");
            return;
        }
        *slot = Some(err);
    }

    /// Removes and returns the pending error, if any.
    pub fn take(&self) -> Option<DispatchError> {
        self.slot.lock().expect("error slot mutex poisoned").take()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.len())
            .field("start_time", &self.start_time)
            .field("stop_time", &self.stop_time)
            .finish()
    }
}

/// Event management and distribution.
pub struct EventDispatcher {
    queue: Arc<TimedEventQueue>,
    predictor: Box<dyn EventPredictor>,
    listeners: Vec<Box<dyn EventListener>>,
    pending: PendingError,
    start_time: SimTime,
    stop_time: SimTime,
}

impl EventDispatcher {
    /// Creates a ready-to-run dispatcher.
    ///
    /// Reads `app.startTime` (required) and `app.stopTime` (defaults to
    /// unbounded) from the configuration. The predictor is expected to be
    /// initialized.
    pub fn new(
        config: &ConfigTree,
        predictor: Box<dyn EventPredictor>,
    ) -> Result<Self, ConfigError> {
        let start_time = config.require::<SimTime>(PROP_START_TIME)?;
        // The default stop time never arrives; in that case the program
        // has to be terminated externally.
        let stop_time = config.parse_or::<SimTime>(PROP_STOP_TIME, UNBOUNDED_TIME)?;
        Ok(Self {
            queue: Arc::new(TimedEventQueue::new()),
            predictor,
            listeners: Vec::new(),
            pending: PendingError::new(),
            start_time,
            stop_time,
        })
    }

    /// The sink through which external events are registered. Valid for
    /// the lifetime of the process.
    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.queue) as Arc<dyn EventSink>
    }

    /// The slot used by network workers to surface terminal errors.
    pub fn pending_error(&self) -> PendingError {
        self.pending.clone()
    }

    /// Registers a listener. Listeners are informed about every delivered
    /// event in registration order, after the predictor.
    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Runs the dispatch cycle until the stop time is reached.
    ///
    /// The first event at or after the stop time is still distributed;
    /// afterwards the function returns. Any listener error, solver error,
    /// or pending network error aborts the run.
    pub fn run(&mut self) -> Result<(), DispatchError> {
        self.queue.init_start_time_now(self.start_time);
        loop {
            let prediction = self.predictor.predict_next()?;
            trace!(event = %prediction, "registering prediction");
            self.queue.add(prediction, true);

            let mut event = self.queue.get()?;
            if let Some(err) = self.pending.take() {
                error!(%err, "aborting on a pending network error");
                return Err(err);
            }

            let time = event.time();
            trace!(%event, "begin event distribution");
            self.predictor.event_triggered(event.as_mut())?;
            for listener in &mut self.listeners {
                listener.event_triggered(event.as_mut())?;
            }
            debug!(time, "event distributed");
            drop(event);

            if time >= self.stop_time {
                info!(time, "stop time reached");
                return Ok(());
            }
        }
    }
}
