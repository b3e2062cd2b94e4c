//! `SyncClient`, `TimeQuantumClient`, `DiscreteTimeClient`.
//!
//! A client's grant action is set *after* construction, captured by a
//! [`std::sync::Weak`] back to the client itself to avoid a reference
//! cycle (the client would otherwise own the closure that owns the
//! client). A client starts with a no-op grant action, and
//! [`SyncMaster`](super::SyncMaster) replaces it with a closure holding
//! that `Weak` once the client is behind its own `Arc`.

use crate::{
  messages::{QuantumGrantStatus, Tick},
  time::Nanoseconds,
};

/// The lifecycle of one pending quantum/tick request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncRequestStatus {
  #[default]
  Idle,
  Pending,
  Granted,
}

/// `{status, now, duration}` — a client's current or most recent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncRequest {
  pub status: SyncRequestStatus,
  pub now: Nanoseconds,
  pub duration: Nanoseconds,
}

impl SyncRequest {
  pub fn pending(now: Nanoseconds, duration: Nanoseconds) -> Self {
    SyncRequest {
      status: SyncRequestStatus::Pending,
      now,
      duration,
    }
  }

  pub fn end_time(&self) -> Nanoseconds {
    self.now + self.duration
  }

  pub fn mark_granted(&mut self) {
    self.status = SyncRequestStatus::Granted;
  }

  pub fn mark_idle(&mut self) {
    self.status = SyncRequestStatus::Idle;
  }
}

/// The part of a `SyncClient` common to both concrete kinds: the current
/// request plus the action to run once a grant is decided.
pub struct SyncClientState {
  request: SyncRequest,
  grant_action: Box<dyn FnMut(QuantumGrantStatus, Nanoseconds, Nanoseconds) + Send>,
}

impl SyncClientState {
  pub fn new() -> Self {
    SyncClientState {
      request: SyncRequest::default(),
      grant_action: Box::new(|_, _, _| {}),
    }
  }
}

impl Default for SyncClientState {
  fn default() -> Self {
    SyncClientState::new()
  }
}

/// Common client behavior: current time/duration/end-time, pending-request
/// bookkeeping, and the grant/reject action.
pub trait SyncClient: Send {
  fn client_state(&self) -> &SyncClientState;
  fn client_state_mut(&mut self) -> &mut SyncClientState;

  fn now(&self) -> Nanoseconds {
    self.client_state().request.now
  }

  fn duration(&self) -> Nanoseconds {
    self.client_state().request.duration
  }

  fn end_time(&self) -> Nanoseconds {
    self.client_state().request.end_time()
  }

  fn is_running(&self) -> bool {
    self.client_state().request.status == SyncRequestStatus::Granted
  }

  fn has_pending_request(&self) -> bool {
    self.client_state().request.status == SyncRequestStatus::Pending
  }

  fn set_pending_request(&mut self, now: Nanoseconds, duration: Nanoseconds) {
    self.client_state_mut().request = SyncRequest::pending(now, duration);
  }

  fn set_grant_action(&mut self, action: impl FnMut(QuantumGrantStatus, Nanoseconds, Nanoseconds) + Send + 'static)
  where
    Self: Sized,
  {
    self.client_state_mut().grant_action = Box::new(action);
  }

  fn give_grant(&mut self) {
    self.client_state_mut().request.mark_granted();
    let now = self.now();
    let duration = self.duration();
    (self.client_state_mut().grant_action)(QuantumGrantStatus::Granted, now, duration);
  }

  fn reject_grant(&mut self) {
    self.client_state_mut().request.mark_idle();
    let now = self.now();
    let duration = self.duration();
    (self.client_state_mut().grant_action)(QuantumGrantStatus::Rejected, now, duration);
  }

  /// Reset to the client's initial request. Every client is reset whenever
  /// the simulation (re)starts.
  fn reset(&mut self) {
    self.client_state_mut().request = SyncRequest::default();
  }
}

/// One `TimeQuantum` participant's synchronization state.
pub struct TimeQuantumClient {
  state: SyncClientState,
}

impl TimeQuantumClient {
  pub fn new() -> Self {
    TimeQuantumClient { state: SyncClientState::new() }
  }
}

impl Default for TimeQuantumClient {
  fn default() -> Self {
    TimeQuantumClient::new()
  }
}

impl SyncClient for TimeQuantumClient {
  fn client_state(&self) -> &SyncClientState {
    &self.state
  }

  fn client_state_mut(&mut self) -> &mut SyncClientState {
    &mut self.state
  }
}

/// The shared synchronization state for every `DiscreteTime` participant.
/// Unlike `TimeQuantumClient`, one `DiscreteTimeClient`
/// serves every DT participant in the simulation: `SendGrants` only grants
/// its pending request once every DT participant has reported `TickDone`
/// for the current tick.
pub struct DiscreteTimeClient {
  state: SyncClientState,
  tick_duration: Nanoseconds,
  num_clients: u32,
  num_tick_done_received: u32,
}

impl DiscreteTimeClient {
  pub fn new(tick_duration: Nanoseconds) -> Self {
    let mut state = SyncClientState::new();
    state.request = SyncRequest::pending(Nanoseconds::ZERO, tick_duration);
    DiscreteTimeClient {
      state,
      tick_duration,
      num_clients: 0,
      num_tick_done_received: 0,
    }
  }

  pub fn set_num_clients(&mut self, num_clients: u32) {
    self.num_clients = num_clients;
  }

  pub fn num_clients(&self) -> u32 {
    self.num_clients
  }

  /// The tick most recently granted (or currently pending, before the
  /// first grant): derived from the request's own `now`/`duration` rather
  /// than tracked separately, since `give_grant` never changes either.
  pub fn current_tick(&self) -> Tick {
    Tick {
      now: self.now(),
      duration: self.duration(),
    }
  }

  /// Record one participant's `TickDone` for the current tick. Once every
  /// registered DT participant has reported in, the pending request
  /// advances to the next tick.
  pub fn tick_done_received(&mut self) {
    self.num_tick_done_received += 1;
    if self.num_clients == self.num_tick_done_received {
      let next_now = self.state.request.now + self.tick_duration;
      self.state.request = SyncRequest::pending(next_now, self.tick_duration);
      self.num_tick_done_received = 0;
    }
  }
}

impl SyncClient for DiscreteTimeClient {
  fn client_state(&self) -> &SyncClientState {
    &self.state
  }

  fn client_state_mut(&mut self) -> &mut SyncClientState {
    &mut self.state
  }

  fn reset(&mut self) {
    self.state.request = SyncRequest::pending(Nanoseconds::ZERO, self.tick_duration);
    self.num_tick_done_received = 0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{Arc, Mutex};

  #[test]
  fn time_quantum_client_starts_idle() {
    let client = TimeQuantumClient::new();
    assert!(!client.has_pending_request());
    assert!(!client.is_running());
  }

  #[test]
  fn giving_a_grant_marks_the_client_running_and_invokes_the_action() {
    let mut client = TimeQuantumClient::new();
    client.set_pending_request(Nanoseconds::ZERO, Nanoseconds::new(10));
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let statuses_clone = Arc::clone(&statuses);
    client.set_grant_action(move |status, _now, _duration| statuses_clone.lock().unwrap().push(status));
    client.give_grant();
    assert!(client.is_running());
    assert_eq!(*statuses.lock().unwrap(), vec![QuantumGrantStatus::Granted]);
  }

  #[test]
  fn discrete_time_client_starts_with_a_pending_request_at_zero() {
    let client = DiscreteTimeClient::new(Nanoseconds::new(100));
    assert!(client.has_pending_request());
    assert_eq!(client.now(), Nanoseconds::ZERO);
    assert_eq!(client.end_time(), Nanoseconds::new(100));
  }

  #[test]
  fn tick_done_only_advances_once_every_client_has_reported() {
    let mut client = DiscreteTimeClient::new(Nanoseconds::new(100));
    client.set_num_clients(2);
    client.give_grant();
    client.tick_done_received();
    assert!(!client.has_pending_request()); // granted, not yet re-pending
    client.tick_done_received();
    assert!(client.has_pending_request());
    assert_eq!(client.now(), Nanoseconds::new(100));
  }

  #[test]
  fn reset_restores_the_initial_pending_request() {
    let mut client = DiscreteTimeClient::new(Nanoseconds::new(100));
    client.set_num_clients(1);
    client.give_grant();
    client.tick_done_received();
    assert_eq!(client.now(), Nanoseconds::new(100));
    client.reset();
    assert_eq!(client.now(), Nanoseconds::ZERO);
    assert!(client.has_pending_request());
  }
}
