//! # simgate-engine::predictor
//!
//! The seam to the model side: the dispatcher drives anything that can
//! predict the next internal event. A predictor is also an event listener;
//! its `event_triggered` commits the model state to each delivered event,
//! whether the event originated from the network or from the predictor
//! itself.

use crate::event::{Event, EventListener};
use simgate_types::errors::SolverError;

/// The oracle used to predict future events.
pub trait EventPredictor: EventListener {
    /// Computes the next internal event from the current model state.
    ///
    /// The returned event is tentative: the queue destroys it when an
    /// earlier external event arrives, in which case the dispatcher asks
    /// for a fresh prediction on its next cycle.
    fn predict_next(&mut self) -> Result<Box<dyn Event>, SolverError>;
}

impl std::fmt::Debug for dyn EventPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn EventPredictor")
    }
}
