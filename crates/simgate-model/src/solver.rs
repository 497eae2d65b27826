//! # simgate-model::solver
//!
//! The numeric parameters that shape prediction: the look-ahead horizon,
//! the synchronization step, and the integrator step. Values are read from
//! the `app.*` properties; the finer step sizes default to a tenth of the
//! next coarser one.

use simgate_types::config::ConfigTree;
use simgate_types::errors::ConfigError;
use simgate_types::time::SimTime;

pub const PROP_START_TIME: &str = "app.startTime";
pub const PROP_LOOK_AHEAD_TIME: &str = "app.lookAheadTime";
pub const PROP_LOOK_AHEAD_STEP_SIZE: &str = "app.lookAheadStepSize";
pub const PROP_INTEGRATOR_STEP_SIZE: &str = "app.integratorStepSize";
pub const PROP_VARIABLE_STEP_SIZE: &str = "app.variableStepSize";

/// Validated solver parameters.
#[derive(Debug, Clone, Copy)]
pub struct SolverConfig {
    /// Simulation time at the epoch.
    pub start_time: SimTime,
    /// Maximum prediction horizon per step.
    pub look_ahead_time: SimTime,
    /// Maximum synchronization step.
    pub look_ahead_step: SimTime,
    /// Maximum integrator step.
    pub integrator_step: SimTime,
    /// Whether to stop a step at detected model events.
    pub variable_step: bool,
}

impl SolverConfig {
    /// Reads and validates the solver parameters.
    ///
    /// `app.startTime` and `app.lookAheadTime` are required; defaults for
    /// the start time are contributed by the model beforehand. The step
    /// sizes must not exceed the next coarser quantity.
    pub fn from_config(config: &ConfigTree) -> Result<Self, ConfigError> {
        let start_time = require_at_least(config, PROP_START_TIME, 0.0)?;
        let look_ahead_time = require_positive(config, PROP_LOOK_AHEAD_TIME)?;
        let look_ahead_step =
            positive_or(config, PROP_LOOK_AHEAD_STEP_SIZE, look_ahead_time / 10.0)?;
        let integrator_step =
            positive_or(config, PROP_INTEGRATOR_STEP_SIZE, look_ahead_step / 10.0)?;
        let variable_step = config.bool_or(PROP_VARIABLE_STEP_SIZE, false)?;

        if look_ahead_time < look_ahead_step {
            return Err(ConfigError::entry(
                PROP_LOOK_AHEAD_STEP_SIZE,
                look_ahead_step.to_string(),
                "the look-ahead step size exceeds the look-ahead horizon",
            ));
        }
        if look_ahead_step < integrator_step {
            return Err(ConfigError::entry(
                PROP_INTEGRATOR_STEP_SIZE,
                integrator_step.to_string(),
                "the integrator step size exceeds the look-ahead step size",
            ));
        }

        Ok(Self {
            start_time,
            look_ahead_time,
            look_ahead_step,
            integrator_step,
            variable_step,
        })
    }
}

fn require_at_least(config: &ConfigTree, key: &str, min: f64) -> Result<f64, ConfigError> {
    let value = config.require::<f64>(key)?;
    if value < min || !value.is_finite() {
        return Err(ConfigError::entry(
            key,
            value.to_string(),
            format!("expected a finite value of at least {min}"),
        ));
    }
    Ok(value)
}

fn require_positive(config: &ConfigTree, key: &str) -> Result<f64, ConfigError> {
    let value = config.require::<f64>(key)?;
    check_positive(key, value)?;
    Ok(value)
}

fn positive_or(config: &ConfigTree, key: &str, default: f64) -> Result<f64, ConfigError> {
    let value = config.parse_or::<f64>(key, default)?;
    check_positive(key, value)?;
    Ok(value)
}

fn check_positive(key: &str, value: f64) -> Result<(), ConfigError> {
    if value <= 0.0 || !value.is_finite() {
        return Err(ConfigError::entry(
            key,
            value.to_string(),
            "expected a strictly positive value",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(entries: &[(&str, &str)]) -> ConfigTree {
        let mut tree = ConfigTree::new();
        for (key, value) in entries {
            tree.set(key, *value).unwrap();
        }
        tree
    }

    #[test]
    fn step_sizes_default_to_a_tenth() {
        let config = tree(&[(PROP_START_TIME, "0.0"), (PROP_LOOK_AHEAD_TIME, "1.0")]);
        let solver = SolverConfig::from_config(&config).unwrap();
        assert_eq!(solver.look_ahead_step, 0.1);
        assert!((solver.integrator_step - 0.01).abs() < 1e-12);
        assert!(!solver.variable_step);
    }

    #[test]
    fn explicit_steps_are_validated_against_the_horizon() {
        let config = tree(&[
            (PROP_START_TIME, "0.0"),
            (PROP_LOOK_AHEAD_TIME, "1.0"),
            (PROP_LOOK_AHEAD_STEP_SIZE, "2.0"),
        ]);
        let err = SolverConfig::from_config(&config).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Entry { key, .. } if key == PROP_LOOK_AHEAD_STEP_SIZE
        ));

        let config = tree(&[
            (PROP_START_TIME, "0.0"),
            (PROP_LOOK_AHEAD_TIME, "1.0"),
            (PROP_LOOK_AHEAD_STEP_SIZE, "0.5"),
            (PROP_INTEGRATOR_STEP_SIZE, "0.7"),
        ]);
        let err = SolverConfig::from_config(&config).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Entry { key, .. } if key == PROP_INTEGRATOR_STEP_SIZE
        ));
    }

    #[test]
    fn look_ahead_time_must_be_positive() {
        let config = tree(&[(PROP_START_TIME, "0.0"), (PROP_LOOK_AHEAD_TIME, "0.0")]);
        assert!(SolverConfig::from_config(&config).is_err());
        let config = tree(&[(PROP_START_TIME, "0.0")]);
        assert!(matches!(
            SolverConfig::from_config(&config),
            Err(ConfigError::Missing { key }) if key == PROP_LOOK_AHEAD_TIME
        ));
    }

    #[test]
    fn variable_step_flag_is_read() {
        let config = tree(&[
            (PROP_START_TIME, "0.0"),
            (PROP_LOOK_AHEAD_TIME, "1.0"),
            (PROP_VARIABLE_STEP_SIZE, "true"),
        ]);
        assert!(SolverConfig::from_config(&config).unwrap().variable_step);
    }
}
