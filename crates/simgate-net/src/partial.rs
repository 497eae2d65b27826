//! # simgate-net::partial
//!
//! The event assembled by a subscriber while a packet is received. The
//! channel's port template drives slot filling: every decoded value either
//! fills the next slot or skips it. A packet cut short by the timeout is
//! published with whatever slots were filled.

use simgate_engine::event::Event;
use simgate_types::errors::SolverError;
use simgate_types::port::{PortId, VarType};
use simgate_types::time::SimTime;
use simgate_types::variable::{fmt_variables, Value, Variable};
use std::fmt;

/// An incrementally populated event over a fixed port template.
pub struct PartialEvent {
    time: SimTime,
    template: Vec<PortId>,
    variables: Vec<Variable>,
    next_slot: usize,
}

impl PartialEvent {
    /// Creates an empty event; `time` is the sink time-stamp taken at
    /// packet start.
    pub fn new(time: SimTime, template: Vec<PortId>) -> Self {
        let capacity = template.len();
        Self {
            time,
            template,
            variables: Vec::with_capacity(capacity),
            next_slot: 0,
        }
    }

    /// Whether template slots remain to be filled.
    pub fn has_remaining(&self) -> bool {
        self.next_slot < self.template.len()
    }

    /// The port type expected by the next slot. Panics when the template
    /// is exhausted; callers check `has_remaining` first.
    pub fn next_port_type(&self) -> VarType {
        self.template[self.next_slot].ty
    }

    /// Fills the next slot with a decoded value.
    pub fn push_next(&mut self, value: Value) {
        let id = self.template[self.next_slot];
        self.variables.push(Variable::new(id, value));
        self.next_slot += 1;
    }

    /// Skips the next slot, e.g. for an unconvertible value.
    pub fn ignore_next(&mut self) {
        self.next_slot += 1;
    }
}

impl Event for PartialEvent {
    fn time(&self) -> SimTime {
        self.time
    }

    fn variables(&mut self) -> Result<Vec<Variable>, SolverError> {
        Ok(self.variables.clone())
    }
}

impl fmt::Display for PartialEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PartialEvent: time={} variables={} ({} of {} slots filled)",
            self.time,
            fmt_variables(&self.variables),
            self.next_slot,
            self.template.len()
        )
    }
}
