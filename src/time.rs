//! Logical simulation time.
//!
//! `Nanoseconds` is non-negative and monotonically non-decreasing per
//! participant. A simulation step is `(now, duration)` with `duration >= 0`;
//! the *end-time* of the step is `now + duration`.

use std::ops::Add;

use serde::{Deserialize, Serialize};

/// A point in (or span of) logical simulation time, in nanoseconds.
///
/// Always non-negative; the wire representation is an unsigned 64-bit
/// integer, so this wraps a `u64` rather than the signed `i64` used for
/// wall-clock timestamps in [`crate::messages::ParticipantStatus`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Nanoseconds(pub u64);

impl Nanoseconds {
  pub const ZERO: Nanoseconds = Nanoseconds(0);

  pub const fn new(ns: u64) -> Self {
    Nanoseconds(ns)
  }

  pub const fn as_u64(self) -> u64 {
    self.0
  }
}

impl Add for Nanoseconds {
  type Output = Nanoseconds;

  fn add(self, rhs: Nanoseconds) -> Nanoseconds {
    Nanoseconds(self.0 + rhs.0)
  }
}

impl From<u64> for Nanoseconds {
  fn from(ns: u64) -> Self {
    Nanoseconds(ns)
  }
}

/// A bounded interval of logical time `[now, now+duration)` that some
/// participant is requesting, or has been granted, permission to simulate.
///
/// Used both for a `TimeQuantumClient`'s request and for a `Tick` in
/// discrete-time mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimulationStep {
  pub now: Nanoseconds,
  pub duration: Nanoseconds,
}

impl SimulationStep {
  pub const fn new(now: Nanoseconds, duration: Nanoseconds) -> Self {
    SimulationStep { now, duration }
  }

  /// The end-time of this step, i.e. `now + duration`.
  pub fn end_time(&self) -> Nanoseconds {
    self.now + self.duration
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn end_time_is_now_plus_duration() {
    let step = SimulationStep::new(Nanoseconds(10), Nanoseconds(5));
    assert_eq!(step.end_time(), Nanoseconds(15));
  }

  #[test]
  fn ordering_matches_numeric_value() {
    assert!(Nanoseconds(1) < Nanoseconds(2));
  }
}
