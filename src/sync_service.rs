//! `TimeSyncService`: drives a participant's `SimulationStep` callback once
//! per granted quantum/tick, in either blocking or asynchronous mode.
//!
//! Grounded on the same `Logger`-collaborator and explicit-`Result`
//! conventions as [`crate::lifecycle::LifecycleController`]; the
//! async-completion handshake is a single-producer/single-consumer
//! `Mutex`+`Condvar` signal, the same primitive
//! [`crate::lifecycle::LifecycleController::wait_for_lifecycle_to_complete`]
//! and [`crate::sync_master::SyncMaster::wait_for_shutdown`] use for their
//! one-shot completion waits.

use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex,
  },
  thread,
  time::Duration,
};

use crate::{
  bus::{BusMessage, Inbox, MessageBus},
  config::SyncType,
  error::UserHandlerFailure,
  logging::Logger,
  messages::{NextSimTask, QuantumGrantStatus, QuantumRequest, TickDone},
  participant_id::EndpointAddress,
  time::{Nanoseconds, SimulationStep},
};

/// How often the worker loop re-checks [`TimeSyncService::is_cancelled`]
/// while waiting for a bus reply.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A `SimulationStep` callback: given the step `(now, duration)` granted to
/// this participant, advance the simulation model by that much logical
/// time.
pub type SimulationStepHandler = Box<dyn FnMut(SimulationStep) -> Result<(), UserHandlerFailure> + Send>;

/// Whether `run_step` waits for the handler to return (`Blocking`, set via
/// `SetSimulationTask`) or returns immediately and waits for an explicit
/// [`TimeSyncService::complete_simulation_task`] call from any thread
/// (`Async`, set via `SetSimulationTaskAsync`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationTaskMode {
  Blocking,
  Async,
}

/// Drives one participant's `SimulationStep` handler. The service owns the
/// worker thread that runs the request/grant/step/next-task cycle end to
/// end: the embedding application only configures a handler and calls
/// [`TimeSyncService::start`] with an [`Inbox`] registered for this
/// participant's own endpoint.
pub struct TimeSyncService {
  logger: Logger,
  bus: Arc<dyn MessageBus>,
  own_endpoint: EndpointAddress,
  master_endpoint: EndpointAddress,
  sync_type: SyncType,
  handler: Mutex<Option<SimulationStepHandler>>,
  mode: Mutex<SimulationTaskMode>,
  period: Mutex<Nanoseconds>,
  pending_period: Mutex<Option<Nanoseconds>>,
  completion_pending: Mutex<bool>,
  completion_cv: Condvar,
  cancelled: AtomicBool,
  worker: Mutex<Option<thread::JoinHandle<Result<(), UserHandlerFailure>>>>,
}

impl TimeSyncService {
  pub fn new(
    logger: Logger,
    bus: Arc<dyn MessageBus>,
    own_endpoint: EndpointAddress,
    master_endpoint: EndpointAddress,
    sync_type: SyncType,
    initial_period: Nanoseconds,
  ) -> Arc<Self> {
    Arc::new(TimeSyncService {
      logger,
      bus,
      own_endpoint,
      master_endpoint,
      sync_type,
      handler: Mutex::new(None),
      mode: Mutex::new(SimulationTaskMode::Blocking),
      period: Mutex::new(initial_period),
      pending_period: Mutex::new(None),
      completion_pending: Mutex::new(false),
      completion_cv: Condvar::new(),
      cancelled: AtomicBool::new(false),
      worker: Mutex::new(None),
    })
  }

  /// `SetSimulationTask`: the handler runs to completion inside the
  /// worker's cycle, which only advances once it has.
  pub fn set_simulation_task(&self, handler: SimulationStepHandler) {
    *self.mode.lock().unwrap() = SimulationTaskMode::Blocking;
    *self.handler.lock().unwrap() = Some(handler);
  }

  /// `SetSimulationTaskAsync`: the worker invokes the handler, then blocks
  /// until [`Self::complete_simulation_task`] is called (from any thread),
  /// or cancellation is requested.
  pub fn set_simulation_task_async(&self, handler: SimulationStepHandler) {
    *self.mode.lock().unwrap() = SimulationTaskMode::Async;
    *self.handler.lock().unwrap() = Some(handler);
  }

  pub fn mode(&self) -> SimulationTaskMode {
    *self.mode.lock().unwrap()
  }

  /// `SetPeriod`: takes effect starting with the *next* request the
  /// service sends, not the one already in flight.
  pub fn set_period(&self, period: Nanoseconds) {
    *self.pending_period.lock().unwrap() = Some(period);
  }

  pub fn period(&self) -> Nanoseconds {
    *self.period.lock().unwrap()
  }

  /// `CompleteSimulationTask`: signal that an asynchronous `SimulationStep`
  /// is done. Safe to call from any thread, including one other than the
  /// worker. A no-op if no step is currently waiting — the signal is
  /// latched, so a call that arrives early is not lost.
  pub fn complete_simulation_task(&self) {
    *self.completion_pending.lock().unwrap() = false;
    self.completion_cv.notify_all();
  }

  /// Cooperative cancellation: no forced thread termination. Called when
  /// `SystemCommand::Stop` or `AbortSimulation` is accepted; an in-flight
  /// wait in the worker returns promptly instead of blocking indefinitely
  /// for a grant, tick, or `CompleteSimulationTask` that will never come.
  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
    self.completion_cv.notify_all();
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }

  /// Apply any `SetPeriod` call made since the previous cycle, and report
  /// the period this step should use.
  fn next_period(&self) -> Nanoseconds {
    if let Some(pending) = self.pending_period.lock().unwrap().take() {
      *self.period.lock().unwrap() = pending;
    }
    *self.period.lock().unwrap()
  }

  /// Invoke the configured handler for `step`, honoring blocking/async mode.
  fn execute(&self, step: SimulationStep) -> Result<(), UserHandlerFailure> {
    let mode = self.mode();
    if mode == SimulationTaskMode::Async {
      *self.completion_pending.lock().unwrap() = true;
    }

    let result = {
      let mut handler = self.handler.lock().unwrap();
      match handler.as_mut() {
        Some(handler) => handler(step),
        None => Ok(()),
      }
    };
    result?;

    if mode == SimulationTaskMode::Async {
      let guard = self.completion_pending.lock().unwrap();
      let _guard = self
        .completion_cv
        .wait_while(guard, |pending| *pending && !self.is_cancelled())
        .unwrap();
    }
    Ok(())
  }

  /// Drive one `SimulationStep` at `now`, at whatever period is currently
  /// in effect (after applying any pending `SetPeriod`). Returns the
  /// duration the step ran at, or the handler's error.
  fn run_step(&self, now: Nanoseconds) -> Result<Nanoseconds, UserHandlerFailure> {
    let duration = self.next_period();
    if self.is_cancelled() {
      return Ok(duration);
    }
    self.execute(SimulationStep::new(now, duration))?;
    self.logger.debug(format!("completed step now={now:?} duration={duration:?}"));
    Ok(duration)
  }

  /// Start the worker thread that owns this service's request/grant/
  /// step/next-task cycle. `inbox` must be the [`Inbox`] registered for
  /// `own_endpoint` on the same bus passed to [`Self::new`].
  pub fn start(self: &Arc<Self>, inbox: Inbox) {
    let service = Arc::clone(self);
    let handle = thread::spawn(move || service.run_cycle(inbox));
    *self.worker.lock().unwrap() = Some(handle);
  }

  /// Block until the worker thread started by [`Self::start`] exits,
  /// returning the error that stopped it, if any.
  pub fn join(&self) -> Result<(), UserHandlerFailure> {
    let handle = self.worker.lock().unwrap().take();
    match handle {
      Some(handle) => handle.join().expect("TimeSyncService worker thread panicked"),
      None => Ok(()),
    }
  }

  fn run_cycle(&self, inbox: Inbox) -> Result<(), UserHandlerFailure> {
    match self.sync_type {
      SyncType::Unsynchronized => {
        self.logger.warn("start() called for an Unsynchronized participant; nothing to do");
        Ok(())
      }
      SyncType::TimeQuantum => self.run_time_quantum_cycle(inbox),
      SyncType::DiscreteTime => self.run_discrete_time_cycle(inbox),
    }
  }

  fn run_time_quantum_cycle(&self, inbox: Inbox) -> Result<(), UserHandlerFailure> {
    let mut now = Nanoseconds::ZERO;
    while !self.is_cancelled() {
      let duration = self.next_period();
      self
        .bus
        .send_to(self.own_endpoint, self.master_endpoint, BusMessage::QuantumRequest(QuantumRequest { now, duration }));

      let Some(grant) = self.wait_for(&inbox, |msg| match msg {
        BusMessage::QuantumGrant(grant) => Some(grant),
        _ => None,
      }) else {
        break;
      };
      if grant.status == QuantumGrantStatus::Rejected {
        self.logger.info("QuantumGrant rejected, stopping");
        break;
      }

      let ran = self.run_step(grant.now)?;
      now = grant.now + ran;
      self
        .bus
        .broadcast(self.own_endpoint, BusMessage::NextSimTask(NextSimTask { time_point: now, duration: self.period() }));
    }
    Ok(())
  }

  fn run_discrete_time_cycle(&self, inbox: Inbox) -> Result<(), UserHandlerFailure> {
    while !self.is_cancelled() {
      let Some(tick) = self.wait_for(&inbox, |msg| match msg {
        BusMessage::Tick(tick) => Some(tick),
        _ => None,
      }) else {
        break;
      };

      self.execute(SimulationStep::new(tick.now, tick.duration))?;
      self
        .bus
        .send_to(self.own_endpoint, self.master_endpoint, BusMessage::TickDone(TickDone { finished_tick: tick }));
      let next_now = tick.end_time();
      self
        .bus
        .broadcast(self.own_endpoint, BusMessage::NextSimTask(NextSimTask { time_point: next_now, duration: tick.duration }));
    }
    Ok(())
  }

  /// Poll `inbox` for the next envelope matching `extract`, giving up
  /// promptly once cancellation is requested.
  fn wait_for<T>(&self, inbox: &Inbox, extract: impl Fn(BusMessage) -> Option<T>) -> Option<T> {
    while !self.is_cancelled() {
      match inbox.recv_timeout(POLL_INTERVAL) {
        Some(envelope) => {
          if let Some(value) = extract(envelope.message) {
            return Some(value);
          }
        }
        None => continue,
      }
    }
    None
  }
}
