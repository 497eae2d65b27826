//! # simgate-model::onestep
//!
//! The single-step predictor (`singlestep-delayed`). Instead of committing
//! lazily, it advances the model one synchronization step per cycle and
//! publishes the outputs that changed during that step as a static event.
//! Inputs applied between steps keep the pending prediction alive; once
//! the prediction itself is delivered, the next cycle computes a fresh
//! step. Observers therefore see input effects one step delayed.

use crate::dynamic::DynamicModel;
use crate::solver::SolverConfig;
use fxhash::FxHashMap;
use simgate_engine::event::{Event, EventListener, StaticEvent};
use simgate_engine::predictor::EventPredictor;
use simgate_types::channel::ChannelMapping;
use simgate_types::errors::{DispatchError, SolverError};
use simgate_types::port::{PortId, VarType};
use simgate_types::time::SimTime;
use simgate_types::variable::{Value, Variable};
use tracing::{debug, trace};

/// The fixed-step predictor.
pub struct OneStepPredictor {
    model: Box<dyn DynamicModel>,
    input_image: Vec<Variable>,
    input_index: FxHashMap<PortId, usize>,
    output_image: FxHashMap<PortId, Value>,
    step: SimTime,
    variable_step: bool,
    current_time: SimTime,
    pending: Option<(SimTime, Vec<Variable>)>,
}

impl OneStepPredictor {
    pub fn new(
        model: Box<dyn DynamicModel>,
        solver: &SolverConfig,
        input_map: &ChannelMapping,
    ) -> Self {
        let mut input_image = Vec::new();
        let mut input_index = FxHashMap::default();
        for id in input_map.all_variable_ids() {
            if id.ty == VarType::Unknown {
                continue;
            }
            input_index.insert(id, input_image.len());
            input_image.push(Variable::zeroed(id));
        }
        Self {
            model,
            input_image,
            input_index,
            output_image: FxHashMap::default(),
            step: solver.look_ahead_step,
            variable_step: solver.variable_step,
            current_time: solver.start_time,
            pending: None,
        }
    }

    /// Advances the model by one synchronization step, stopping early at a
    /// detected model event when variable steps are enabled.
    fn step_once(&mut self) -> Result<SimTime, SolverError> {
        let mut target = self.current_time + self.step;
        if self.variable_step {
            let event_time = self.model.predict(self.current_time)?;
            if event_time < target {
                trace!(event_time, "stopping the step at a detected model event");
                target = event_time;
            }
        }
        self.model.advance(target)?;
        self.current_time = target;
        Ok(target)
    }

    /// Collects the outputs that differ from the last published image and
    /// refreshes the image.
    fn changed_outputs(&mut self) -> Vec<Variable> {
        let mut outputs = Vec::new();
        self.model.outputs(&mut outputs);
        let mut changed = Vec::new();
        for var in outputs {
            match self.output_image.get(&var.id) {
                Some(previous) if *previous == var.value => {}
                _ => {
                    self.output_image.insert(var.id, var.value.clone());
                    changed.push(var);
                }
            }
        }
        changed
    }
}

impl EventListener for OneStepPredictor {
    fn event_triggered(&mut self, ev: &mut dyn Event) -> Result<(), DispatchError> {
        let vars = ev.variables()?;
        let mut image_updated = false;
        for var in &vars {
            if let Some(&slot) = self.input_index.get(&var.id) {
                self.input_image[slot] = var.clone();
                image_updated = true;
            }
        }
        if image_updated {
            self.model
                .apply_inputs(self.current_time, &self.input_image)?;
            debug!(time = ev.time(), "event applied to the model");
        } else {
            // The pending prediction was delivered; compute a fresh step
            // on the next cycle.
            self.pending = None;
        }
        Ok(())
    }
}

impl EventPredictor for OneStepPredictor {
    fn predict_next(&mut self) -> Result<Box<dyn Event>, SolverError> {
        if self.pending.is_none() {
            let time = self.step_once()?;
            let changed = self.changed_outputs();
            if changed.is_empty() {
                trace!(time, "nothing changed significantly; predicting an empty event");
            }
            self.pending = Some((time, changed));
        }
        let (time, vars) = self
            .pending
            .as_ref()
            .expect("pending prediction populated above");
        Ok(Box::new(StaticEvent::new(*time, vars.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simgate_types::config::ConfigTree;
    use simgate_types::errors::ConfigError;
    use simgate_types::port::PortIdDrawer;

    /// A model whose single output mirrors the last applied input, which
    /// makes the one-step delay observable.
    struct EchoModel {
        time: SimTime,
        last_input: f64,
        event_at: Option<SimTime>,
    }

    impl EchoModel {
        fn boxed() -> Box<Self> {
            Box::new(Self {
                time: 0.0,
                last_input: 0.0,
                event_at: None,
            })
        }
    }

    impl DynamicModel for EchoModel {
        fn init(&mut self, _solver: &SolverConfig) -> Result<(), ConfigError> {
            Ok(())
        }

        fn resolution(&self) -> SimTime {
            1e-6
        }

        fn predict(&mut self, from: SimTime) -> Result<SimTime, SolverError> {
            Ok(self.event_at.filter(|t| *t > from).unwrap_or(f64::MAX))
        }

        fn advance(&mut self, to: SimTime) -> Result<SimTime, SolverError> {
            self.time = to;
            Ok(to)
        }

        fn apply_inputs(&mut self, _time: SimTime, inputs: &[Variable]) -> Result<(), SolverError> {
            if let Some(v) = inputs.iter().find_map(|i| i.value.as_real()) {
                self.last_input = v;
            }
            Ok(())
        }

        fn settle(&mut self, to: SimTime) -> Result<SimTime, SolverError> {
            self.time = to;
            Ok(to)
        }

        fn outputs(&self, dest: &mut Vec<Variable>) {
            dest.push(Variable::new(
                PortId::new(VarType::Real, 5),
                Value::Real(self.last_input),
            ));
        }
    }

    fn input_map() -> ChannelMapping {
        let mut tree = ConfigTree::new();
        tree.set("in.0.0", "u").unwrap();
        tree.set("in.0.0.type", "0").unwrap();
        let mut drawer = PortIdDrawer::new();
        ChannelMapping::from_config(&mut drawer, &tree, "in").unwrap()
    }

    fn solver(variable_step: bool) -> SolverConfig {
        let mut tree = ConfigTree::new();
        tree.set("app.startTime", "0.0").unwrap();
        tree.set("app.lookAheadTime", "1.0").unwrap();
        tree.set("app.lookAheadStepSize", "0.5").unwrap();
        if variable_step {
            tree.set("app.variableStepSize", "true").unwrap();
        }
        SolverConfig::from_config(&tree).unwrap()
    }

    #[test]
    fn first_step_publishes_the_initial_outputs() {
        let mut predictor = OneStepPredictor::new(EchoModel::boxed(), &solver(false), &input_map());
        let mut ev = predictor.predict_next().unwrap();
        assert_eq!(ev.time(), 0.5);
        // The initial zero is a change against the empty image.
        assert_eq!(ev.variables().unwrap()[0].value, Value::Real(0.0));
    }

    #[test]
    fn unchanged_outputs_yield_an_empty_event() {
        let mut predictor = OneStepPredictor::new(EchoModel::boxed(), &solver(false), &input_map());
        let mut first = predictor.predict_next().unwrap();
        predictor.event_triggered(first.as_mut()).unwrap();
        let mut second = predictor.predict_next().unwrap();
        assert_eq!(second.time(), 1.0);
        assert!(second.variables().unwrap().is_empty());
    }

    #[test]
    fn the_prediction_is_reissued_until_delivered() {
        let mut predictor = OneStepPredictor::new(EchoModel::boxed(), &solver(false), &input_map());
        let first = predictor.predict_next().unwrap();
        // An input event arrives before the prediction is delivered.
        let mut input = StaticEvent::new(
            0.2,
            vec![Variable::new(
                PortId::new(VarType::Real, 0),
                Value::Real(3.0),
            )],
        );
        predictor.event_triggered(&mut input).unwrap();
        let again = predictor.predict_next().unwrap();
        assert_eq!(again.time(), first.time());
    }

    #[test]
    fn input_effects_appear_one_step_delayed() {
        let mut predictor = OneStepPredictor::new(EchoModel::boxed(), &solver(false), &input_map());
        let mut first = predictor.predict_next().unwrap();
        predictor.event_triggered(first.as_mut()).unwrap();

        let mut input = StaticEvent::new(
            0.6,
            vec![Variable::new(
                PortId::new(VarType::Real, 0),
                Value::Real(3.0),
            )],
        );
        predictor.event_triggered(&mut input).unwrap();

        // The echoed input only becomes visible with the next step.
        let mut second = predictor.predict_next().unwrap();
        assert_eq!(second.time(), 1.0);
        assert_eq!(second.variables().unwrap()[0].value, Value::Real(3.0));
    }

    #[test]
    fn variable_steps_stop_at_model_events() {
        let mut model = EchoModel::boxed();
        model.event_at = Some(0.3);
        let mut predictor = OneStepPredictor::new(model, &solver(true), &input_map());
        let ev = predictor.predict_next().unwrap();
        assert_eq!(ev.time(), 0.3);
    }
}
