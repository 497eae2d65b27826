//! # simgate-engine::sink
//!
//! The seam between event producers and the timing core. Network
//! subscribers only ever see an `EventSink`: they register external events
//! and ask for the current simulation time-stamp. Both entry points are
//! safe to call from any thread.

use crate::event::Event;
use simgate_types::time::SimTime;

/// The concurrent entry points of the event queue.
pub trait EventSink: Send + Sync {
    /// Registers an externally triggered event. The sink takes ownership;
    /// the event is destroyed on delivery or when superseded.
    fn push_external(&self, ev: Box<dyn Event>);

    /// The current simulation time derived from the wall clock. Blocks
    /// until the queue's epoch has been initialized.
    fn timestamp_now(&self) -> SimTime;
}
