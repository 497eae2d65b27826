//! # simgate-model::stepwise
//!
//! The default predictor (`multistep-prediction`). Every cycle it asks the
//! model for the next internal event and hands out a lazy event; the model
//! state is only committed to that instant when somebody reads the event's
//! variables. External events are folded into an input image and applied
//! to the model at their (clamped) time.

use crate::dynamic::DynamicModel;
use crate::lazy::LazyEvent;
use crate::solver::SolverConfig;
use fxhash::FxHashMap;
use simgate_engine::event::{Event, EventListener};
use simgate_engine::predictor::EventPredictor;
use simgate_types::channel::ChannelMapping;
use simgate_types::errors::{DispatchError, SolverError};
use simgate_types::port::{PortId, VarType};
use simgate_types::time::SimTime;
use simgate_types::variable::Variable;
use std::sync::{Arc, Mutex};
use tracing::{trace, warn};

/// The shared state behind the stepwise predictor and its lazy events.
pub(crate) struct PredictorCore {
    model: Box<dyn DynamicModel>,
    input_image: Vec<Variable>,
    input_index: FxHashMap<PortId, usize>,
    current_time: SimTime,
    last_predicted: SimTime,
    outputs: Option<Vec<Variable>>,
}

impl PredictorCore {
    fn new(model: Box<dyn DynamicModel>, start_time: SimTime, input_map: &ChannelMapping) -> Self {
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
            current_time: start_time,
            last_predicted: start_time,
            outputs: None,
        }
    }

    fn predict(&mut self) -> Result<SimTime, SolverError> {
        let next = self.model.predict(self.current_time)?;
        if !next.is_finite() {
            return Err(SolverError::new(
                self.current_time,
                "the model cannot predict the next event",
            ));
        }
        self.outputs = None;
        self.last_predicted = next;
        Ok(next)
    }

    fn apply_event(&mut self, time: SimTime, vars: &[Variable]) -> Result<(), SolverError> {
        let mut image_updated = false;
        for var in vars {
            if let Some(&slot) = self.input_index.get(&var.id) {
                self.input_image[slot] = var.clone();
                image_updated = true;
            }
        }
        if !image_updated {
            return Ok(());
        }

        let resolution = self.model.resolution();
        let mut event_time = time;
        if self.current_time - resolution > event_time {
            warn!(
                event_time,
                model_time = self.current_time,
                "external event predates the model state; aligning its time"
            );
            event_time = self.current_time;
        } else if (self.current_time - event_time).abs() <= resolution {
            // Timely aligned with the state of the model.
            event_time = self.current_time;
        }

        trace!(event_time, "updating the model state");
        self.model.advance(event_time)?;
        self.model.apply_inputs(event_time, &self.input_image)?;
        self.outputs = None;
        self.current_time = event_time;
        self.last_predicted = event_time;
        Ok(())
    }

    /// Commits the model to `time` and returns the settled outputs.
    /// Reading an event that the model has already moved past fails.
    pub(crate) fn outputs_at(&mut self, time: SimTime) -> Result<Vec<Variable>, SolverError> {
        let resolution = self.model.resolution();
        if self.current_time > time + resolution {
            return Err(SolverError::new(time, "the event is outdated"));
        }
        if let Some(cached) = &self.outputs {
            return Ok(cached.clone());
        }

        // Settle at the predicted instant; `time` equals it up to the
        // model's resolution.
        let target = self.last_predicted;
        trace!(target, "settling the model state by querying event data");
        let settled = self.model.settle(target)?;
        if (settled - target).abs() > 2.0 * resolution {
            return Err(SolverError::new(target, "cannot settle the model state"));
        }
        self.current_time = target;
        let mut outputs = Vec::new();
        self.model.outputs(&mut outputs);
        self.outputs = Some(outputs.clone());
        Ok(outputs)
    }

    pub(crate) fn is_outdated(&self, time: SimTime) -> bool {
        self.current_time > time + self.model.resolution()
    }

    pub(crate) fn outputs_populated(&self) -> bool {
        self.outputs.is_some()
    }
}

/// The multistep predictor handing out lazy events.
pub struct StepwisePredictor {
    core: Arc<Mutex<PredictorCore>>,
}

impl StepwisePredictor {
    pub fn new(
        model: Box<dyn DynamicModel>,
        solver: &SolverConfig,
        input_map: &ChannelMapping,
    ) -> Self {
        Self {
            core: Arc::new(Mutex::new(PredictorCore::new(
                model,
                solver.start_time,
                input_map,
            ))),
        }
    }
}

impl EventListener for StepwisePredictor {
    fn event_triggered(&mut self, ev: &mut dyn Event) -> Result<(), DispatchError> {
        // Materialize first: for the predictor's own lazy event this
        // commits the model, and it must happen outside the core lock.
        let vars = ev.variables()?;
        let mut core = self.core.lock().expect("predictor mutex poisoned");
        core.apply_event(ev.time(), &vars)?;
        Ok(())
    }
}

impl EventPredictor for StepwisePredictor {
    fn predict_next(&mut self) -> Result<Box<dyn Event>, SolverError> {
        let next = {
            let mut core = self.core.lock().expect("predictor mutex poisoned");
            core.predict()?
        };
        Ok(Box::new(LazyEvent::new(next, Arc::clone(&self.core))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simgate_types::config::ConfigTree;
    use simgate_types::errors::ConfigError;
    use simgate_types::port::PortIdDrawer;
    use simgate_types::variable::Value;

    /// A linear model whose output exposes the last settled time.
    struct ProbeModel {
        step: SimTime,
        output_value: f64,
    }

    impl ProbeModel {
        fn boxed(step: SimTime) -> Box<Self> {
            Box::new(Self {
                step,
                output_value: 0.0,
            })
        }
    }

    impl DynamicModel for ProbeModel {
        fn init(&mut self, _solver: &SolverConfig) -> Result<(), ConfigError> {
            Ok(())
        }

        fn resolution(&self) -> SimTime {
            1e-3
        }

        fn predict(&mut self, from: SimTime) -> Result<SimTime, SolverError> {
            Ok(from + self.step)
        }

        fn advance(&mut self, to: SimTime) -> Result<SimTime, SolverError> {
            Ok(to)
        }

        fn apply_inputs(&mut self, _time: SimTime, _inputs: &[Variable]) -> Result<(), SolverError> {
            Ok(())
        }

        fn settle(&mut self, to: SimTime) -> Result<SimTime, SolverError> {
            self.output_value = to * 10.0;
            Ok(to)
        }

        fn outputs(&self, dest: &mut Vec<Variable>) {
            dest.push(Variable::new(
                PortId::new(VarType::Real, 9),
                Value::Real(self.output_value),
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

    fn solver() -> SolverConfig {
        let mut tree = ConfigTree::new();
        tree.set("app.startTime", "0.0").unwrap();
        tree.set("app.lookAheadTime", "1.0").unwrap();
        SolverConfig::from_config(&tree).unwrap()
    }

    #[test]
    fn reading_a_lazy_event_commits_the_model() {
        let mut predictor = StepwisePredictor::new(ProbeModel::boxed(0.5), &solver(), &input_map());
        let mut ev = predictor.predict_next().unwrap();
        assert_eq!(ev.time(), 0.5);

        let vars = ev.variables().unwrap();
        assert_eq!(vars[0].value, Value::Real(5.0));
        // A second read returns the cached outputs.
        assert_eq!(ev.variables().unwrap(), vars);
    }

    #[test]
    fn own_prediction_does_not_touch_the_input_image() {
        let mut predictor = StepwisePredictor::new(ProbeModel::boxed(0.5), &solver(), &input_map());
        let mut ev = predictor.predict_next().unwrap();
        predictor.event_triggered(ev.as_mut()).unwrap();
        // The lazy event carries only output ports, so no inputs were
        // applied to the model.
        let core = predictor.core.lock().unwrap();
        assert!(core.outputs_populated());
        assert!((core.current_time - 0.5).abs() < 1e-12);
    }

    #[test]
    fn external_input_advances_and_feeds_the_model() {
        let mut predictor = StepwisePredictor::new(ProbeModel::boxed(0.5), &solver(), &input_map());
        let input_port = PortId::new(VarType::Real, 0);
        let mut ev = simgate_engine::event::StaticEvent::new(
            0.25,
            vec![Variable::new(input_port, Value::Real(2.0))],
        );
        predictor.event_triggered(&mut ev).unwrap();

        let core = predictor.core.lock().unwrap();
        assert!((core.current_time - 0.25).abs() < 1e-12);
        assert_eq!(
            core.input_image[0],
            Variable::new(input_port, Value::Real(2.0))
        );
    }

    #[test]
    fn past_external_is_aligned_to_the_model_time() {
        let mut predictor = StepwisePredictor::new(ProbeModel::boxed(0.5), &solver(), &input_map());
        let input_port = PortId::new(VarType::Real, 0);
        let mut first = simgate_engine::event::StaticEvent::new(
            0.4,
            vec![Variable::new(input_port, Value::Real(1.0))],
        );
        predictor.event_triggered(&mut first).unwrap();

        let mut stale = simgate_engine::event::StaticEvent::new(
            0.1,
            vec![Variable::new(input_port, Value::Real(3.0))],
        );
        predictor.event_triggered(&mut stale).unwrap();

        let core = predictor.core.lock().unwrap();
        // The event time was clamped forward, never backwards.
        assert!((core.current_time - 0.4).abs() < 1e-12);
    }

    #[test]
    fn outdated_lazy_event_fails_to_materialize() {
        let mut predictor = StepwisePredictor::new(ProbeModel::boxed(0.5), &solver(), &input_map());
        let mut prediction = predictor.predict_next().unwrap();

        // An input event beyond the prediction moves the model forward.
        let input_port = PortId::new(VarType::Real, 0);
        let mut later = simgate_engine::event::StaticEvent::new(
            2.0,
            vec![Variable::new(input_port, Value::Real(1.0))],
        );
        predictor.event_triggered(&mut later).unwrap();

        let err = prediction.variables().unwrap_err();
        assert!(err.message.contains("outdated"), "got: {err}");
    }
}
