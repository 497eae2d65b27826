//! # simgate-engine::event
//!
//! Defines the `Event` capability trait, the listener seam, and the two
//! basic event variants. An event is an immutable time-stamp plus an
//! operation that materializes its variable list; materialization may be
//! expensive (lazy predictor events) or trivial (static events), which is
//! why `variables` takes `&mut self` and may fail with a solver error.
//!
//! Ownership follows the queue: an event is uniquely owned by whoever most
//! recently received it, travels through the queue as a boxed trait
//! object, and is dropped after the dispatcher broadcast.

use simgate_types::errors::{DispatchError, SolverError};
use simgate_types::time::SimTime;
use simgate_types::variable::{fmt_variables, Variable};
use std::fmt;
use tracing::warn;

/// A timed occurrence carrying variable assignments.
pub trait Event: fmt::Display + Send {
    /// The simulation time of the event. Stable over the event's lifetime.
    fn time(&self) -> SimTime;

    /// Materializes the event's variable list.
    ///
    /// Repeated calls return the same assignments. For lazy events the
    /// first call commits the predictor to the event's time.
    fn variables(&mut self) -> Result<Vec<Variable>, SolverError>;
}

/// A consumer of dispatched events.
///
/// Listeners are invoked in registration order and must treat the event as
/// read-only; the mutable reference only exists so that lazy events can
/// materialize on first access.
pub trait EventListener: Send {
    fn event_triggered(&mut self, ev: &mut dyn Event) -> Result<(), DispatchError>;
}

/// An event that owns its variable vector from construction.
#[derive(Debug, Clone)]
pub struct StaticEvent {
    time: SimTime,
    variables: Vec<Variable>,
}

impl StaticEvent {
    pub fn new(time: SimTime, variables: Vec<Variable>) -> Self {
        for var in &variables {
            if !var.is_valid() {
                warn!(%var, "static event carries a type-inconsistent variable");
            }
        }
        Self { time, variables }
    }
}

impl Event for StaticEvent {
    fn time(&self) -> SimTime {
        self.time
    }

    fn variables(&mut self) -> Result<Vec<Variable>, SolverError> {
        Ok(self.variables.clone())
    }
}

impl fmt::Display for StaticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StaticEvent: time={} variables={}",
            self.time,
            fmt_variables(&self.variables)
        )
    }
}

/// Wraps another event and overrides its time-stamp; the variable list is
/// forwarded unchanged.
pub struct DelayedEvent {
    time: SimTime,
    inner: Box<dyn Event>,
}

impl DelayedEvent {
    pub fn new(new_time: SimTime, inner: Box<dyn Event>) -> Self {
        Self {
            time: new_time,
            inner,
        }
    }
}

impl Event for DelayedEvent {
    fn time(&self) -> SimTime {
        self.time
    }

    fn variables(&mut self) -> Result<Vec<Variable>, SolverError> {
        self.inner.variables()
    }
}

impl fmt::Display for DelayedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DelayedEvent: t_new={} of event: {}", self.time, self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simgate_types::port::{PortId, VarType};
    use simgate_types::variable::Value;

    fn real_var(num: u32, value: f64) -> Variable {
        Variable::new(PortId::new(VarType::Real, num), Value::Real(value))
    }

    #[test]
    fn static_event_returns_its_variables() {
        let mut ev = StaticEvent::new(0.25, vec![real_var(0, 1.5)]);
        assert_eq!(ev.time(), 0.25);
        let vars = ev.variables().unwrap();
        assert_eq!(vars, vec![real_var(0, 1.5)]);
        // A second materialization yields the same list.
        assert_eq!(ev.variables().unwrap(), vars);
    }

    #[test]
    fn delayed_event_overrides_time_but_forwards_variables() {
        let inner = StaticEvent::new(0.25, vec![real_var(0, 1.5)]);
        let mut delayed = DelayedEvent::new(0.75, Box::new(inner));
        assert_eq!(delayed.time(), 0.75);
        assert_eq!(delayed.variables().unwrap(), vec![real_var(0, 1.5)]);
        let text = delayed.to_string();
        assert!(text.contains("t_new=0.75"), "unexpected display: {text}");
    }
}
