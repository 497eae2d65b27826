//! # simgate-types::time
//!
//! Defines the representation of time within the simulation. Simulation
//! time is a continuous quantity measured in seconds; the anchor which
//! relates it to the wall clock (the epoch) is owned by the event queue.

/// The fundamental unit of simulation time, in seconds.
///
/// An `f64` carries the full resolution of the model solvers and maps
/// directly onto the configuration surface (`app.startTime` and friends).
pub type SimTime = f64;

/// The stop time used when none is configured. An event with this time is
/// never reached, so the dispatcher runs until terminated externally.
pub const UNBOUNDED_TIME: SimTime = f64::INFINITY;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_time_is_later_than_any_event() {
        assert!(0.0 < UNBOUNDED_TIME);
        assert!(1.0e300 < UNBOUNDED_TIME);
    }
}
