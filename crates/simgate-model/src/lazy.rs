//! # simgate-model::lazy
//!
//! The event variant produced by the stepwise predictor. The event only
//! carries a time-stamp; its variables are computed on first access by
//! committing the shared predictor state to that instant. Once the model
//! has moved past the event, materialization fails with a solver error.

use crate::stepwise::PredictorCore;
use simgate_engine::event::Event;
use simgate_types::errors::SolverError;
use simgate_types::time::SimTime;
use std::fmt;
use std::sync::{Arc, Mutex};

/// A predicted event resolved against the predictor on demand.
pub struct LazyEvent {
    time: SimTime,
    core: Arc<Mutex<PredictorCore>>,
}

impl LazyEvent {
    pub(crate) fn new(time: SimTime, core: Arc<Mutex<PredictorCore>>) -> Self {
        Self { time, core }
    }
}

impl Event for LazyEvent {
    fn time(&self) -> SimTime {
        self.time
    }

    fn variables(&mut self) -> Result<Vec<simgate_types::variable::Variable>, SolverError> {
        let mut core = self.core.lock().expect("predictor mutex poisoned");
        core.outputs_at(self.time)
    }
}

impl fmt::Display for LazyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LazyEvent: time={}, ", self.time)?;
        match self.core.try_lock() {
            Ok(core) => {
                if core.is_outdated(self.time) {
                    f.write_str("event is outdated")
                } else if core.outputs_populated() {
                    f.write_str("event variables are settled")
                } else {
                    f.write_str("event variables were not queried before")
                }
            }
            Err(_) => f.write_str("predictor is busy"),
        }
    }
}
