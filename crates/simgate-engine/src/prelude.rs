//! # simgate-engine::prelude
//!
//! A convenience module that re-exports the most commonly used types from
//! the engine and its foundation. This simplifies imports for the other
//! crates in the workspace.

pub use crate::{
    csv::CsvDataLogger,
    dispatcher::{EventDispatcher, PendingError},
    event::{DelayedEvent, Event, EventListener, StaticEvent},
    predictor::EventPredictor,
    queue::{QueueClosed, TimedEventQueue},
    sink::EventSink,
};

pub use simgate_types::{
    channel::{ChannelMapping, TransmissionChannel},
    config::{ConfigTree, ScopedTree},
    errors::{CodecError, ConfigError, DispatchError, NetError, SolverError},
    port::{PortId, PortIdDrawer, VarType},
    time::SimTime,
    variable::{Value, Variable},
};
