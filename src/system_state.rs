//! `SystemStateTracker`: a pure, deterministic aggregation from the
//! required participants' latest [`ParticipantStatus`] to a single
//! [`SystemState`], plus change-coalescing dispatch to registered
//! observers.

use std::{
  collections::HashMap,
  sync::Mutex,
};

use crate::{
  logging::Logger,
  messages::{ParticipantState, ParticipantStatus, SystemState},
  statusevents::{HandlerId, HandlerRegistry},
};

/// Inputs: the required-participant set (installed via
/// [`SystemStateTracker::set_required_participants`], mirroring the
/// accepted `WorkflowConfiguration`) and the latest `ParticipantStatus`
/// for each of them. Output: a single `SystemState` plus a stream of
/// change events.
pub struct SystemStateTracker {
  logger: Logger,
  inner: Mutex<Inner>,
  system_state_handlers: HandlerRegistry<SystemState>,
  participant_status_handlers: HandlerRegistry<ParticipantStatus>,
  connected_handler: Mutex<Option<Box<dyn FnMut(&str) + Send>>>,
  disconnected_handler: Mutex<Option<Box<dyn FnMut(&str) + Send>>>,
}

struct Inner {
  required: Vec<String>,
  statuses: HashMap<String, ParticipantStatus>,
  last_emitted: SystemState,
  connected: std::collections::HashSet<String>,
}

impl SystemStateTracker {
  pub fn new(logger: Logger) -> Self {
    SystemStateTracker {
      logger,
      inner: Mutex::new(Inner {
        required: Vec::new(),
        statuses: HashMap::new(),
        last_emitted: ParticipantState::Invalid,
        connected: std::collections::HashSet::new(),
      }),
      system_state_handlers: HandlerRegistry::new(),
      participant_status_handlers: HandlerRegistry::new(),
      connected_handler: Mutex::new(None),
      disconnected_handler: Mutex::new(None),
    }
  }

  /// Install the required-participant set. Only these participants'
  /// statuses count toward the derived [`SystemState`].
  pub fn set_required_participants(&self, required: Vec<String>) {
    self.inner.lock().unwrap().required = required;
  }

  /// Registers a handler for `SystemState` changes. It is invoked
  /// immediately with the current value if it is not `Invalid`; late
  /// observers do not see historical transitions, only the current value.
  pub fn add_system_state_handler(&self, mut handler: impl FnMut(SystemState) + Send + 'static) -> HandlerId {
    let current = self.inner.lock().unwrap().last_emitted;
    if current != ParticipantState::Invalid {
      handler(current);
    }
    self.system_state_handlers.register(move |state: &SystemState| handler(*state))
  }

  pub fn remove_system_state_handler(&self, id: HandlerId) {
    self.system_state_handlers.remove(id);
  }

  /// Registers a handler for individual `ParticipantStatus` publishes.
  /// Called immediately for every currently known participant whose state
  /// is not `Invalid`, then for every subsequent publish.
  pub fn add_participant_status_handler(&self, mut handler: impl FnMut(&ParticipantStatus) + Send + 'static) -> HandlerId {
    {
      let inner = self.inner.lock().unwrap();
      for status in inner.statuses.values() {
        if status.state != ParticipantState::Invalid {
          handler(status);
        }
      }
    }
    self.participant_status_handlers.register(move |status: &ParticipantStatus| handler(status))
  }

  pub fn remove_participant_status_handler(&self, id: HandlerId) {
    self.participant_status_handlers.remove(id);
  }

  /// A single-slot callback fired the first time a participant's status is
  /// observed, distinct from the multi-subscriber registries above.
  pub fn set_participant_connected_handler(&self, handler: impl FnMut(&str) + Send + 'static) {
    *self.connected_handler.lock().unwrap() = Some(Box::new(handler));
  }

  /// A single-slot callback fired when a previously-connected participant
  /// is marked disconnected.
  pub fn set_participant_disconnected_handler(&self, handler: impl FnMut(&str) + Send + 'static) {
    *self.disconnected_handler.lock().unwrap() = Some(Box::new(handler));
  }

  pub fn is_participant_connected(&self, participant_name: &str) -> bool {
    self.inner.lock().unwrap().connected.contains(participant_name)
  }

  /// Record an incoming `ParticipantStatus` publish. *Any* participant's
  /// status may be recorded here, but only those named in the required set
  /// count toward the derived `SystemState`; everyone else is accepted and
  /// simply ignored by the derivation step below.
  pub fn on_participant_status(&self, status: ParticipantStatus) {
    let mut dispatch_system_state = None;
    {
      let mut inner = self.inner.lock().unwrap();
      let name = status.participant_name.clone();
      let first_sighting = inner.connected.insert(name.clone());
      inner.statuses.insert(name.clone(), status.clone());

      if first_sighting {
        if let Some(handler) = self.connected_handler.lock().unwrap().as_mut() {
          handler(&name);
        }
      }

      let derived = derive_system_state(&inner.required, &inner.statuses);
      if derived != inner.last_emitted {
        inner.last_emitted = derived;
        dispatch_system_state = Some(derived);
      }
    }

    self.participant_status_handlers.dispatch(&status);
    if let Some(derived) = dispatch_system_state {
      self.system_state_handlers.dispatch(&derived);
    }
  }

  /// Mark a participant as no longer present (e.g. the transport observed
  /// a disconnect).
  pub fn on_participant_disconnected(&self, participant_name: &str) {
    let was_connected = {
      let mut inner = self.inner.lock().unwrap();
      inner.connected.remove(participant_name)
    };
    if was_connected {
      self.logger.info(format!("participant {participant_name:?} disconnected"));
      if let Some(handler) = self.disconnected_handler.lock().unwrap().as_mut() {
        handler(participant_name);
      }
    }
  }

  /// The current derived `SystemState`.
  pub fn system_state(&self) -> SystemState {
    self.inner.lock().unwrap().last_emitted
  }

  /// The latest known status of one participant. Returns `None` if no
  /// status has ever been observed for that name.
  pub fn participant_status(&self, participant_name: &str) -> Option<ParticipantStatus> {
    self.inner.lock().unwrap().statuses.get(participant_name).cloned()
  }
}

/// The derivation rule:
///
/// 1. If any required participant is `Error`, the system is `Error`.
/// 2. Otherwise, if all required participants share one state `X`, the
///    system is `X`.
/// 3. Otherwise, the system is the least-advanced required participant's
///    state — except `Paused` dominates `Running`.
///
/// If no required participant has yet published a status, the result is
/// `Invalid` (unknown participants contribute no state at all, so an
/// all-missing required set behaves like "no information yet").
fn derive_system_state(required: &[String], statuses: &HashMap<String, ParticipantStatus>) -> SystemState {
  let states: Vec<ParticipantState> = required
    .iter()
    .filter_map(|name| statuses.get(name).map(|s| s.state))
    .collect();

  if states.len() != required.len() {
    // Not every required participant has published yet.
    return ParticipantState::Invalid;
  }
  if states.is_empty() {
    return ParticipantState::Invalid;
  }

  if states.contains(&ParticipantState::Error) {
    return ParticipantState::Error;
  }

  let first = states[0];
  if states.iter().all(|s| *s == first) {
    return first;
  }

  if states.contains(&ParticipantState::Paused) {
    return ParticipantState::Paused;
  }

  states.into_iter().min().unwrap_or(ParticipantState::Invalid)
}
