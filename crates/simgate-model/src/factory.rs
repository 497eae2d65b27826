//! # simgate-model::factory
//!
//! Builds the configured predictor. The simulation method selects the
//! prediction strategy; the model kind selects the `DynamicModel` driven
//! by it.

use crate::dynamic::{DemoOscillator, DynamicModel, DEMO_MODEL_ID};
use crate::onestep::OneStepPredictor;
use crate::solver::SolverConfig;
use crate::stepwise::StepwisePredictor;
use simgate_engine::predictor::EventPredictor;
use simgate_types::channel::ChannelMapping;
use simgate_types::config::ConfigTree;
use simgate_types::errors::ConfigError;
use tracing::debug;

/// The key of the simulation method property.
pub const PROP_SIMULATION_METHOD: &str = "app.simulationMethod";
/// The key of the model kind property.
pub const PROP_MODEL_KIND: &str = "model.kind";

const METHOD_MULTISTEP: &str = "multistep-prediction";
const METHOD_SINGLESTEP: &str = "singlestep-delayed";

/// Creates the predictor selected by `app.simulationMethod`.
///
/// The model may contribute default properties (such as the start time)
/// before the solver configuration is validated.
pub fn make_predictor(
    config: &mut ConfigTree,
    in_map: &ChannelMapping,
    out_map: &ChannelMapping,
) -> Result<Box<dyn EventPredictor>, ConfigError> {
    let mut model = make_model(config, out_map)?;
    model.configure_defaults(config);
    let solver = SolverConfig::from_config(config)?;
    model.init(&solver)?;

    let method = config
        .get_str(PROP_SIMULATION_METHOD)
        .unwrap_or(METHOD_MULTISTEP);
    debug!(method, "instantiating the event predictor");
    match method {
        METHOD_MULTISTEP => Ok(Box::new(StepwisePredictor::new(model, &solver, in_map))),
        METHOD_SINGLESTEP => Ok(Box::new(OneStepPredictor::new(model, &solver, in_map))),
        other => Err(ConfigError::entry(
            PROP_SIMULATION_METHOD,
            other,
            "invalid simulation method",
        )),
    }
}

fn make_model(
    config: &ConfigTree,
    out_map: &ChannelMapping,
) -> Result<Box<dyn DynamicModel>, ConfigError> {
    match config.get_str(PROP_MODEL_KIND).unwrap_or(DEMO_MODEL_ID) {
        DEMO_MODEL_ID => Ok(Box::new(DemoOscillator::from_config(config, out_map)?)),
        other => Err(ConfigError::entry(
            PROP_MODEL_KIND,
            other,
            "unknown model kind",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ConfigTree {
        let mut tree = ConfigTree::new();
        tree.set("app.lookAheadTime", "1.0").unwrap();
        tree
    }

    #[test]
    fn the_default_method_is_multistep_prediction() {
        let mut config = base_config();
        let maps = ChannelMapping::empty();
        assert!(make_predictor(&mut config, &maps, &maps).is_ok());
        // The demo model contributed the missing start time.
        assert_eq!(config.get_str("app.startTime"), Some("0.0"));
    }

    #[test]
    fn the_single_step_method_is_selectable() {
        let mut config = base_config();
        config
            .set(PROP_SIMULATION_METHOD, "singlestep-delayed")
            .unwrap();
        let maps = ChannelMapping::empty();
        assert!(make_predictor(&mut config, &maps, &maps).is_ok());
    }

    #[test]
    fn unknown_method_or_model_is_rejected() {
        let mut config = base_config();
        config.set(PROP_SIMULATION_METHOD, "clairvoyance").unwrap();
        let maps = ChannelMapping::empty();
        let err = make_predictor(&mut config, &maps, &maps).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Entry { key, .. } if key == PROP_SIMULATION_METHOD
        ));

        let mut config = base_config();
        config.set(PROP_MODEL_KIND, "weather").unwrap();
        let err = make_predictor(&mut config, &maps, &maps).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Entry { key, .. } if key == PROP_MODEL_KIND
        ));
    }
}
