//! `ParticipantState`, `SystemState`, and `ParticipantStatus`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// The state ladder a participant traverses during its lifecycle. Numeric
/// codes are part of the wire format.
///
/// Invariant: a participant traverses this ladder monotonically except for
/// the cycle `Running <-> Paused`, the recovery transitions out of
/// `Error`, and the loop `Shutdown -> (next simulation)`. `Error` may be
/// entered from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ParticipantState {
  Invalid = 0,
  ServicesCreated = 10,
  CommunicationInitializing = 20,
  CommunicationInitialized = 30,
  ReadyToRun = 40,
  Running = 50,
  Paused = 60,
  Stopping = 70,
  Stopped = 80,
  Error = 90,
  ShuttingDown = 100,
  Shutdown = 110,
  Reinitializing = 120,
}

impl ParticipantState {
  /// The numeric wire code.
  pub const fn code(self) -> u8 {
    self as u8
  }

  pub const fn is_terminal(self) -> bool {
    matches!(self, ParticipantState::Shutdown)
  }
}

impl std::fmt::Display for ParticipantState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{self:?}")
  }
}

/// The system-wide state, derived by [`crate::system_state::SystemStateTracker`]
/// from the required participants' [`ParticipantState`]s. Shares the same
/// ladder and wire codes as `ParticipantState`.
pub type SystemState = ParticipantState;

/// `{participantName, state, enterReason, enterTime, refreshTime}`. Owned
/// by the participant that emits it; remote copies are kept in the
/// [`crate::system_state::SystemStateTracker`]. Overwritten on every
/// publish; never deleted while the participant is alive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantStatus {
  pub participant_name: String,
  pub state: ParticipantState,
  pub enter_reason: String,
  pub enter_time: DateTime<Utc>,
  pub refresh_time: DateTime<Utc>,
}

impl ParticipantStatus {
  pub fn new(participant_name: impl Into<String>, state: ParticipantState, enter_reason: impl Into<String>) -> Self {
    let now = Utc::now();
    ParticipantStatus {
      participant_name: participant_name.into(),
      state,
      enter_reason: enter_reason.into(),
      enter_time: now,
      refresh_time: now,
    }
  }

  /// A status record where only `refresh_time` advances (the watchdog
  /// cadence refresh), `state`/`enter_reason`/`enter_time` carried over
  /// unchanged.
  pub fn refreshed(&self) -> Self {
    ParticipantStatus {
      refresh_time: Utc::now(),
      ..self.clone()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wire_codes_are_stable() {
    assert_eq!(ParticipantState::Invalid.code(), 0);
    assert_eq!(ParticipantState::ServicesCreated.code(), 10);
    assert_eq!(ParticipantState::CommunicationInitializing.code(), 20);
    assert_eq!(ParticipantState::CommunicationInitialized.code(), 30);
    assert_eq!(ParticipantState::ReadyToRun.code(), 40);
    assert_eq!(ParticipantState::Running.code(), 50);
    assert_eq!(ParticipantState::Paused.code(), 60);
    assert_eq!(ParticipantState::Stopping.code(), 70);
    assert_eq!(ParticipantState::Stopped.code(), 80);
    assert_eq!(ParticipantState::Error.code(), 90);
    assert_eq!(ParticipantState::ShuttingDown.code(), 100);
    assert_eq!(ParticipantState::Shutdown.code(), 110);
    assert_eq!(ParticipantState::Reinitializing.code(), 120);
  }

  #[test]
  fn ordering_follows_the_ladder() {
    assert!(ParticipantState::ServicesCreated < ParticipantState::Running);
    assert!(ParticipantState::Running < ParticipantState::Shutdown);
  }
}
