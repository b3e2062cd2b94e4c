//! `LifecycleController`: the per-participant state
//! machine that drives one participant from `ServicesCreated` through
//! `Running` to `Shutdown`, publishing its `ParticipantStatus` to the
//! shared [`SystemStateTracker`] at every transition.

use std::sync::{Arc, Condvar, Mutex};

use crate::{
  error::{StateError, UserHandlerFailure},
  lifecycle::handlers::{CommunicationReadyHandler, ShutdownHandler, StopHandler},
  logging::Logger,
  messages::{ParticipantCommandKind, ParticipantState, ParticipantStatus, SystemCommandKind},
  system_state::SystemStateTracker,
};

#[derive(Default)]
struct Handlers {
  communication_ready: Option<CommunicationReadyHandler>,
  stop: Option<StopHandler>,
  shutdown: Option<ShutdownHandler>,
}

struct Current {
  state: ParticipantState,
  reason: String,
}

/// Drives one participant's [`ParticipantState`] ladder.
/// `Run`/`Stop` are gated on the *global* `SystemState` reported by the
/// shared `SystemStateTracker` this controller publishes into — a
/// `SyncMaster`-coordinated simulation only ever lets one participant's
/// `Run` through when every required participant has reached `ReadyToRun`.
pub struct LifecycleController {
  participant_name: String,
  logger: Logger,
  tracker: Arc<SystemStateTracker>,
  current: Mutex<Current>,
  handlers: Mutex<Handlers>,
  completion_lock: Mutex<Option<ParticipantState>>,
  completion_cv: Condvar,
}

impl LifecycleController {
  /// Construct a controller in `ServicesCreated` and publish that initial
  /// status to `tracker`. `participant_name` must match the name this
  /// participant registered under `WorkflowConfiguration`'s required set.
  pub fn new(participant_name: impl Into<String>, logger: Logger, tracker: Arc<SystemStateTracker>) -> Self {
    let participant_name = participant_name.into();
    let controller = LifecycleController {
      participant_name,
      logger,
      tracker,
      current: Mutex::new(Current {
        state: ParticipantState::ServicesCreated,
        reason: "constructed".to_string(),
      }),
      handlers: Mutex::new(Handlers::default()),
      completion_lock: Mutex::new(None),
      completion_cv: Condvar::new(),
    };
    controller.publish();
    controller
  }

  pub fn set_communication_ready_handler(&self, handler: CommunicationReadyHandler) {
    self.handlers.lock().unwrap().communication_ready = Some(handler);
  }

  pub fn set_stop_handler(&self, handler: StopHandler) {
    self.handlers.lock().unwrap().stop = Some(handler);
  }

  pub fn set_shutdown_handler(&self, handler: ShutdownHandler) {
    self.handlers.lock().unwrap().shutdown = Some(handler);
  }

  pub fn state(&self) -> ParticipantState {
    self.current.lock().unwrap().state
  }

  /// Drive the automatic setup sequence `ServicesCreated -> ... ->
  /// ReadyToRun`, invoking the `CommunicationReadyHandler` (if any) between
  /// `CommunicationInitialized` and `ReadyToRun`. A no-op
  /// if called while not in `ServicesCreated` (e.g. already started, or
  /// already `Error`).
  pub fn start(&self) -> Result<(), UserHandlerFailure> {
    if self.state() != ParticipantState::ServicesCreated {
      return Ok(());
    }
    self.transition(ParticipantState::CommunicationInitializing, "communication stack starting");
    self.transition(ParticipantState::CommunicationInitialized, "communication stack ready");

    if let Some(handler) = self.handlers.lock().unwrap().communication_ready.as_mut() {
      if let Err(failure) = handler() {
        self.enter_error(failure.clone());
        return Err(failure);
      }
    }
    self.transition(ParticipantState::ReadyToRun, "communication ready");
    Ok(())
  }

  /// Local transition, not addressed over the bus: pause a running
  /// participant, recording `reason`.
  pub fn pause(&self, reason: impl Into<String>) -> Result<(), StateError> {
    let current = self.state();
    if current != ParticipantState::Running {
      return Err(StateError::PauseNotRunning(current));
    }
    self.transition(ParticipantState::Paused, reason.into());
    Ok(())
  }

  /// Local transition: resume a paused participant.
  pub fn continue_(&self) -> Result<(), StateError> {
    let current = self.state();
    if current != ParticipantState::Paused {
      return Err(StateError::ContinueNotPaused(current));
    }
    self.transition(ParticipantState::Running, "continued");
    Ok(())
  }

  /// Apply a `SystemCommand` broadcast by the controller. `Run` and `Stop`
  /// are gated on the shared `SystemState`; the coldswap kinds are
  /// accepted and acknowledged but drive no further choreography.
  pub fn handle_system_command(&self, kind: SystemCommandKind) -> Result<(), StateError> {
    match kind {
      SystemCommandKind::Invalid => Ok(()),
      SystemCommandKind::Run => self.run(),
      SystemCommandKind::Stop => self.stop(),
      SystemCommandKind::Shutdown => self.shutdown(),
      SystemCommandKind::AbortSimulation => {
        self.abort();
        Ok(())
      }
      SystemCommandKind::PrepareColdswap | SystemCommandKind::ExecuteColdswap => {
        self.logger.debug(format!("{kind:?} accepted, no choreography implemented"));
        Ok(())
      }
    }
  }

  /// Apply a `ParticipantCommand` addressed to this participant.
  pub fn handle_participant_command(&self, kind: ParticipantCommandKind) -> Result<(), StateError> {
    match kind {
      ParticipantCommandKind::Invalid => Ok(()),
      ParticipantCommandKind::Initialize => {
        let _ = self.start();
        Ok(())
      }
      ParticipantCommandKind::Restart => self.restart(),
      ParticipantCommandKind::Shutdown => self.shutdown(),
    }
  }

  fn run(&self) -> Result<(), StateError> {
    let system_state = self.tracker.system_state();
    if system_state != ParticipantState::ReadyToRun {
      return Err(StateError::RunNotReady(system_state));
    }
    self.transition(ParticipantState::Running, "Run command accepted");
    Ok(())
  }

  fn stop(&self) -> Result<(), StateError> {
    let system_state = self.tracker.system_state();
    if system_state != ParticipantState::Running {
      return Err(StateError::StopNotRunning(system_state));
    }
    self.transition(ParticipantState::Stopping, "Stop command accepted");
    let result = self.handlers.lock().unwrap().stop.as_mut().map(|handler| handler());
    match result {
      Some(Err(failure)) => {
        self.enter_error(failure);
        Ok(())
      }
      _ => {
        self.transition(ParticipantState::Stopped, "stop handler completed");
        Ok(())
      }
    }
  }

  fn shutdown(&self) -> Result<(), StateError> {
    let current = self.state();
    if !matches!(current, ParticipantState::Stopped | ParticipantState::Error) {
      return Err(StateError::ShutdownFromWrongState(current));
    }
    self.run_shutdown_handler("Shutdown command accepted");
    Ok(())
  }

  /// `AbortSimulation` is accepted from any non-`Shutdown` state and always
  /// drives the participant to `Shutdown`, whatever the `ShutdownHandler`
  /// reports.
  fn abort(&self) {
    if self.state() == ParticipantState::Shutdown {
      return;
    }
    self.run_shutdown_handler("AbortSimulation accepted");
  }

  fn run_shutdown_handler(&self, reason: &str) {
    self.transition(ParticipantState::ShuttingDown, reason.to_string());
    if let Some(handler) = self.handlers.lock().unwrap().shutdown.as_mut() {
      if let Err(failure) = handler() {
        self.logger.warn(format!("shutdown handler failed: {failure}; shutting down anyway"));
      }
    }
    self.transition(ParticipantState::Shutdown, "shutdown handler completed");
  }

  fn restart(&self) -> Result<(), StateError> {
    let current = self.state();
    if !matches!(current, ParticipantState::Stopped | ParticipantState::Error) {
      return Err(StateError::RestartFromWrongState(current));
    }
    self.transition(ParticipantState::Reinitializing, "Restart command accepted");
    self.transition(ParticipantState::ServicesCreated, "reinitialized");
    Ok(())
  }

  fn enter_error(&self, failure: UserHandlerFailure) {
    self.logger.error(format!("user handler failed: {failure}"));
    self.transition(ParticipantState::Error, failure.0);
  }

  /// Drive this participant to `Error` from any non-terminal state,
  /// recording `failure` as the reason. Unlike the handlers this
  /// controller invokes itself, a `SimulationStep` failure is reported by
  /// whichever `TimeSyncService` is driving this participant — a separate
  /// component the controller does not call into directly — so it needs
  /// an entry point the embedding application can call from there.
  pub fn report_failure(&self, failure: UserHandlerFailure) {
    if self.state() == ParticipantState::Shutdown {
      return;
    }
    self.enter_error(failure);
  }

  /// Republish the current status with a fresh `refresh_time`, without
  /// changing `state`/`enter_reason`/`enter_time` — the watchdog cadence
  /// refresh. Call on a fixed period from the embedding application; this
  /// crate does not run its own timer thread.
  pub fn refresh_status(&self) {
    self.publish();
  }

  /// Block until this participant reaches `Shutdown` or `Error`, then
  /// return which one.
  pub fn wait_for_lifecycle_to_complete(&self) -> ParticipantState {
    let guard = self.completion_lock.lock().unwrap();
    let mut guard = self
      .completion_cv
      .wait_while(guard, |completed| completed.is_none())
      .unwrap();
    guard.take().unwrap()
  }

  fn transition(&self, new_state: ParticipantState, reason: impl Into<String>) {
    let reason = reason.into();
    {
      let mut current = self.current.lock().unwrap();
      current.state = new_state;
      current.reason = reason;
    }
    self.logger.info(format!("-> {new_state:?}"));
    self.publish();
    if matches!(new_state, ParticipantState::Shutdown | ParticipantState::Error) {
      *self.completion_lock.lock().unwrap() = Some(new_state);
      self.completion_cv.notify_all();
    }
  }

  fn publish(&self) {
    let current = self.current.lock().unwrap();
    let status = ParticipantStatus::new(self.participant_name.clone(), current.state, current.reason.clone());
    drop(current);
    self.tracker.on_participant_status(status);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn controller(name: &str, tracker: &Arc<SystemStateTracker>) -> LifecycleController {
    LifecycleController::new(name, Logger::new("test"), Arc::clone(tracker))
  }

  #[test]
  fn start_reaches_ready_to_run_without_handlers() {
    let tracker = Arc::new(SystemStateTracker::new(Logger::default()));
    let lc = controller("A", &tracker);
    lc.start().unwrap();
    assert_eq!(lc.state(), ParticipantState::ReadyToRun);
  }

  #[test]
  fn communication_ready_handler_failure_enters_error() {
    let tracker = Arc::new(SystemStateTracker::new(Logger::default()));
    let lc = controller("A", &tracker);
    lc.set_communication_ready_handler(Box::new(|| Err(UserHandlerFailure::new("bad config"))));
    let err = lc.start().unwrap_err();
    assert_eq!(err.0, "bad config");
    assert_eq!(lc.state(), ParticipantState::Error);
  }

  #[test]
  fn run_is_rejected_unless_system_state_is_ready_to_run() {
    let tracker = Arc::new(SystemStateTracker::new(Logger::default()));
    tracker.set_required_participants(vec!["A".into()]);
    let lc = controller("A", &tracker);
    lc.start().unwrap();
    // Only one required participant, so SystemState mirrors this
    // participant's own ReadyToRun once published — Run must succeed.
    lc.handle_system_command(SystemCommandKind::Run).unwrap();
    assert_eq!(lc.state(), ParticipantState::Running);
  }

  #[test]
  fn run_is_rejected_while_system_state_lags_behind() {
    let tracker = Arc::new(SystemStateTracker::new(Logger::default()));
    tracker.set_required_participants(vec!["A".into(), "B".into()]);
    let lc = controller("A", &tracker);
    lc.start().unwrap();
    // "B" has not published yet, so the aggregated SystemState is Invalid.
    let err = lc.handle_system_command(SystemCommandKind::Run).unwrap_err();
    assert_eq!(err, StateError::RunNotReady(ParticipantState::Invalid));
    assert_eq!(lc.state(), ParticipantState::ReadyToRun);
  }

  #[test]
  fn pause_and_continue_round_trip() {
    let tracker = Arc::new(SystemStateTracker::new(Logger::default()));
    tracker.set_required_participants(vec!["A".into()]);
    let lc = controller("A", &tracker);
    lc.start().unwrap();
    lc.handle_system_command(SystemCommandKind::Run).unwrap();
    lc.pause("operator request").unwrap();
    assert_eq!(lc.state(), ParticipantState::Paused);
    lc.continue_().unwrap();
    assert_eq!(lc.state(), ParticipantState::Running);
  }

  #[test]
  fn pause_rejected_unless_running() {
    let tracker = Arc::new(SystemStateTracker::new(Logger::default()));
    let lc = controller("A", &tracker);
    let err = lc.pause("too early").unwrap_err();
    assert_eq!(err, StateError::PauseNotRunning(ParticipantState::ServicesCreated));
  }

  #[test]
  fn stop_then_shutdown_reaches_terminal_state() {
    let tracker = Arc::new(SystemStateTracker::new(Logger::default()));
    tracker.set_required_participants(vec!["A".into()]);
    let lc = controller("A", &tracker);
    lc.start().unwrap();
    lc.handle_system_command(SystemCommandKind::Run).unwrap();
    lc.handle_system_command(SystemCommandKind::Stop).unwrap();
    assert_eq!(lc.state(), ParticipantState::Stopped);
    lc.handle_system_command(SystemCommandKind::Shutdown).unwrap();
    assert_eq!(lc.state(), ParticipantState::Shutdown);
  }

  #[test]
  fn stop_handler_failure_enters_error_instead_of_stopped() {
    let tracker = Arc::new(SystemStateTracker::new(Logger::default()));
    tracker.set_required_participants(vec!["A".into()]);
    let lc = controller("A", &tracker);
    lc.set_stop_handler(Box::new(|| Err(UserHandlerFailure::new("cleanup failed"))));
    lc.start().unwrap();
    lc.handle_system_command(SystemCommandKind::Run).unwrap();
    lc.handle_system_command(SystemCommandKind::Stop).unwrap();
    assert_eq!(lc.state(), ParticipantState::Error);
  }

  #[test]
  fn shutdown_rejected_from_running() {
    let tracker = Arc::new(SystemStateTracker::new(Logger::default()));
    tracker.set_required_participants(vec!["A".into()]);
    let lc = controller("A", &tracker);
    lc.start().unwrap();
    lc.handle_system_command(SystemCommandKind::Run).unwrap();
    let err = lc.handle_system_command(SystemCommandKind::Shutdown).unwrap_err();
    assert_eq!(err, StateError::ShutdownFromWrongState(ParticipantState::Running));
  }

  #[test]
  fn abort_forces_shutdown_from_running() {
    let tracker = Arc::new(SystemStateTracker::new(Logger::default()));
    tracker.set_required_participants(vec!["A".into()]);
    let lc = controller("A", &tracker);
    lc.start().unwrap();
    lc.handle_system_command(SystemCommandKind::Run).unwrap();
    lc.handle_system_command(SystemCommandKind::AbortSimulation).unwrap();
    assert_eq!(lc.state(), ParticipantState::Shutdown);
  }

  #[test]
  fn restart_returns_to_services_created() {
    let tracker = Arc::new(SystemStateTracker::new(Logger::default()));
    tracker.set_required_participants(vec!["A".into()]);
    let lc = controller("A", &tracker);
    lc.start().unwrap();
    lc.handle_system_command(SystemCommandKind::Run).unwrap();
    lc.handle_system_command(SystemCommandKind::Stop).unwrap();
    lc.handle_participant_command(ParticipantCommandKind::Restart).unwrap();
    assert_eq!(lc.state(), ParticipantState::ServicesCreated);
    lc.start().unwrap();
    assert_eq!(lc.state(), ParticipantState::ReadyToRun);
  }

  #[test]
  fn restart_rejected_while_running() {
    let tracker = Arc::new(SystemStateTracker::new(Logger::default()));
    tracker.set_required_participants(vec!["A".into()]);
    let lc = controller("A", &tracker);
    lc.start().unwrap();
    lc.handle_system_command(SystemCommandKind::Run).unwrap();
    let err = lc.handle_participant_command(ParticipantCommandKind::Restart).unwrap_err();
    assert_eq!(err, StateError::RestartFromWrongState(ParticipantState::Running));
  }

  #[test]
  fn wait_for_lifecycle_to_complete_unblocks_on_shutdown() {
    let tracker = Arc::new(SystemStateTracker::new(Logger::default()));
    tracker.set_required_participants(vec!["A".into()]);
    let lc = Arc::new(controller("A", &tracker));
    lc.start().unwrap();
    lc.handle_system_command(SystemCommandKind::Run).unwrap();

    let waiter = Arc::clone(&lc);
    let handle = std::thread::spawn(move || waiter.wait_for_lifecycle_to_complete());
    lc.handle_system_command(SystemCommandKind::Stop).unwrap();
    lc.handle_system_command(SystemCommandKind::Shutdown).unwrap();

    assert_eq!(handle.join().unwrap(), ParticipantState::Shutdown);
  }

  #[test]
  fn wait_for_lifecycle_to_complete_unblocks_on_error() {
    let tracker = Arc::new(SystemStateTracker::new(Logger::default()));
    let lc = Arc::new(controller("A", &tracker));
    lc.set_communication_ready_handler(Box::new(|| Err(UserHandlerFailure::new("boom"))));

    let waiter = Arc::clone(&lc);
    let handle = std::thread::spawn(move || waiter.wait_for_lifecycle_to_complete());
    let _ = lc.start();

    assert_eq!(handle.join().unwrap(), ParticipantState::Error);
  }
}
