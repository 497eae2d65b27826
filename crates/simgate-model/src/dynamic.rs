//! # simgate-model::dynamic
//!
//! The seam to the numerical integrator. Predictors drive a `DynamicModel`
//! and never assume anything about the integration scheme behind it; the
//! model owns its notion of time and its comparison tolerance.
//!
//! `DemoOscillator` is a closed-form stand-in model so that the binary and
//! the end-to-end tests can run without an external integrator: its
//! outputs follow a sine wave whose amplitude is modulated by the real
//! input variables.

use crate::solver::SolverConfig;
use simgate_types::channel::ChannelMapping;
use simgate_types::config::ConfigTree;
use simgate_types::errors::{ConfigError, SolverError};
use simgate_types::port::{PortId, VarType};
use simgate_types::time::SimTime;
use simgate_types::variable::{Value, Variable};
use std::f64::consts::TAU;
use tracing::trace;

/// The numerical collaborator advanced by the predictors.
///
/// All time arguments are absolute simulation times. Implementations only
/// ever see monotone targets, up to their own `resolution`.
pub trait DynamicModel: Send {
    /// Contributes default properties derived from the model description.
    /// Previously set properties are not overwritten.
    fn configure_defaults(&self, _config: &mut ConfigTree) {}

    /// Prepares the model for the run.
    fn init(&mut self, solver: &SolverConfig) -> Result<(), ConfigError>;

    /// The tolerance used when instants of time are compared.
    fn resolution(&self) -> SimTime;

    /// The time of the next internal model event strictly after `from`,
    /// bounded by the look-ahead horizon.
    fn predict(&mut self, from: SimTime) -> Result<SimTime, SolverError>;

    /// Forwards the model state to `to` and returns the reached time.
    fn advance(&mut self, to: SimTime) -> Result<SimTime, SolverError>;

    /// Sets the inputs at `time` and executes any event handling.
    fn apply_inputs(&mut self, time: SimTime, inputs: &[Variable]) -> Result<(), SolverError>;

    /// Settles the state at `to`, evaluating it from the right-hand side
    /// of the instant. Returns the reached time.
    fn settle(&mut self, to: SimTime) -> Result<SimTime, SolverError>;

    /// Appends the current output variables to `dest`.
    fn outputs(&self, dest: &mut Vec<Variable>);
}

/// The identifier of the built-in demo model.
pub const DEMO_MODEL_ID: &str = "demo";
/// The key of the demo oscillator frequency property.
pub const PROP_FREQUENCY: &str = "model.frequency";

const DEMO_RESOLUTION: SimTime = 1e-6;

/// A closed-form oscillator usable without an external integrator.
pub struct DemoOscillator {
    ports: Vec<PortId>,
    frequency: f64,
    amplitude: f64,
    step: SimTime,
    time: SimTime,
}

impl DemoOscillator {
    /// Builds the model for the given output mapping.
    pub fn from_config(
        config: &ConfigTree,
        out_map: &ChannelMapping,
    ) -> Result<Self, ConfigError> {
        if let Some(name) = out_map.variable_names(VarType::Unknown).first() {
            return Err(ConfigError::Message(format!(
                "an output variable of unknown type was defined: \"{name}\""
            )));
        }
        let frequency = config.parse_or::<f64>(PROP_FREQUENCY, 1.0)?;
        if frequency <= 0.0 || !frequency.is_finite() {
            return Err(ConfigError::entry(
                PROP_FREQUENCY,
                frequency.to_string(),
                "expected a strictly positive frequency",
            ));
        }
        Ok(Self {
            ports: out_map.all_variable_ids(),
            frequency,
            amplitude: 1.0,
            step: 0.0,
            time: 0.0,
        })
    }

    fn check_monotone(&self, to: SimTime) -> Result<(), SolverError> {
        if to < self.time - DEMO_RESOLUTION {
            return Err(SolverError::new(
                self.time,
                format!("cannot move the model state back to {to}"),
            ));
        }
        Ok(())
    }
}

impl DynamicModel for DemoOscillator {
    fn configure_defaults(&self, config: &mut ConfigTree) {
        config.set_default("app.startTime", "0.0");
    }

    fn init(&mut self, solver: &SolverConfig) -> Result<(), ConfigError> {
        self.step = solver.look_ahead_step;
        self.time = solver.start_time;
        Ok(())
    }

    fn resolution(&self) -> SimTime {
        DEMO_RESOLUTION
    }

    fn predict(&mut self, from: SimTime) -> Result<SimTime, SolverError> {
        Ok(from + self.step)
    }

    fn advance(&mut self, to: SimTime) -> Result<SimTime, SolverError> {
        self.check_monotone(to)?;
        self.time = self.time.max(to);
        Ok(to)
    }

    fn apply_inputs(&mut self, time: SimTime, inputs: &[Variable]) -> Result<(), SolverError> {
        for input in inputs {
            if let Value::Real(v) = input.value {
                self.amplitude = 1.0 + v;
                trace!(time, amplitude = self.amplitude, "input modulates the amplitude");
            }
        }
        Ok(())
    }

    fn settle(&mut self, to: SimTime) -> Result<SimTime, SolverError> {
        self.check_monotone(to)?;
        self.time = self.time.max(to);
        Ok(to)
    }

    fn outputs(&self, dest: &mut Vec<Variable>) {
        let phase = TAU * self.frequency * self.time;
        for port in &self.ports {
            let value = match port.ty {
                VarType::Real => Value::Real(self.amplitude * (phase + port.num as f64).sin()),
                VarType::Integer => Value::Integer((self.frequency * self.time).floor() as i32),
                VarType::Boolean => {
                    Value::Boolean((self.frequency * self.time).fract() < 0.5)
                }
                VarType::String => Value::Text(format!("t={:.3}", self.time)),
                VarType::Unknown => Value::Empty,
            };
            dest.push(Variable::new(*port, value));
        }
    }
}
