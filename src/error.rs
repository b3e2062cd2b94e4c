//! Error taxonomy. All non-fatal errors are local: a participant's `Error`
//! does not of itself stop others.

use thiserror::Error;

use crate::messages::ParticipantState;

/// An empty or duplicated required-participants set. Surfaced at workflow
/// construction time; no lifecycle state transition happens because the
/// lifecycle has not started yet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
  #[error("required participant set must not be empty")]
  EmptyRequiredParticipants,

  #[error("required participant name {0:?} appears more than once")]
  DuplicateRequiredParticipant(String),
}

/// An operation was invoked against the state machine's preconditions,
/// e.g. `Run` while already `Running`. Returned to the caller; no internal
/// transition happens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
  #[error("Run is only allowed while SystemState == ReadyToRun, but it is {0:?}")]
  RunNotReady(ParticipantState),

  #[error("Stop is only allowed while SystemState == Running, but it is {0:?}")]
  StopNotRunning(ParticipantState),

  #[error("Shutdown is only allowed from Stopped or Error, but current state is {0:?}")]
  ShutdownFromWrongState(ParticipantState),

  #[error("Restart is only allowed from Stopped or Error, but current state is {0:?}")]
  RestartFromWrongState(ParticipantState),

  #[error("Pause is only allowed while Running, but current state is {0:?}")]
  PauseNotRunning(ParticipantState),

  #[error("Continue is only allowed while Paused, but current state is {0:?}")]
  ContinueNotPaused(ParticipantState),

  #[error("period change rejected: {0}")]
  WrongState(String),
}

/// A bus invariant was violated that the peer must have broken: conflicting
/// `WorkflowConfiguration` senders, or a `QuantumRequest` whose `now` does
/// not match the expected end-time. Logged; the local participant that
/// observes it enters `Error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
  #[error(
    "WorkflowConfiguration was already set by {first_sender:?}; \
     received a conflicting set from {second_sender:?}"
  )]
  ConflictingWorkflowConfiguration {
    first_sender: String,
    second_sender: String,
  },

  #[error("QuantumRequest from participant {participant:?} had now={now:?}, expected {expected:?}")]
  QuantumRequestTimeMismatch {
    participant: String,
    now: crate::time::Nanoseconds,
    expected: crate::time::Nanoseconds,
  },

  #[error("participant {0:?} sent a QuantumRequest while one was already pending")]
  QuantumRequestAlreadyPending(String),

  #[error("QuantumRequest received from unknown TimeQuantum participant {0:?}")]
  UnknownQuantumClient(String),

  #[error("TickDone for tick {finished:?} does not match current tick {current:?}")]
  TickDoneMismatch {
    finished: crate::time::SimulationStep,
    current: crate::time::SimulationStep,
  },
}

/// A user callback (`CommunicationReadyHandler`, `StopHandler`,
/// `ShutdownHandler`, `SimulationStep`) returned an error. The
/// [`crate::lifecycle::LifecycleController`] captures the message into
/// `enterReason` and transitions to `Error`. This is a typed `Result::Err`,
/// not a caught exception.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct UserHandlerFailure(pub String);

impl UserHandlerFailure {
  pub fn new(msg: impl Into<String>) -> Self {
    UserHandlerFailure(msg.into())
  }
}

/// Unified error type for callers that need one `Result` across
/// components.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SynkitError {
  #[error(transparent)]
  Configuration(#[from] ConfigurationError),

  #[error(transparent)]
  State(#[from] StateError),

  #[error(transparent)]
  Protocol(#[from] ProtocolError),

  #[error(transparent)]
  UserHandler(#[from] UserHandlerFailure),
}
