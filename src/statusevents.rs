//! A generic handler registry: `{map<HandlerId, Callback>, pending
//! add/remove queue}`. Used by [`crate::system_state::SystemStateTracker`]
//! for both its `SystemState` and `ParticipantStatus` observer lists.
//!
//! During dispatch, registration/removal calls are queued rather than
//! applied immediately, and the queue is drained once dispatch returns —
//! this is what makes it safe for a handler to add or remove handlers
//! (including itself) from inside its own callback.

use std::sync::Mutex;

/// A unique, stable identifier for one registered handler, returned at
/// registration time and accepted by `remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

enum Pending<E> {
  Add(HandlerId, Box<dyn FnMut(&E) + Send>),
  Remove(HandlerId),
}

/// A registry of `FnMut(&E)` callbacks, safe to mutate from inside a
/// dispatch.
pub struct HandlerRegistry<E> {
  next_id: Mutex<u64>,
  state: Mutex<RegistryState<E>>,
}

struct RegistryState<E> {
  handlers: Vec<(HandlerId, Box<dyn FnMut(&E) + Send>)>,
  pending: Vec<Pending<E>>,
  dispatching: bool,
}

impl<E> Default for HandlerRegistry<E> {
  fn default() -> Self {
    HandlerRegistry {
      next_id: Mutex::new(0),
      state: Mutex::new(RegistryState {
        handlers: Vec::new(),
        pending: Vec::new(),
        dispatching: false,
      }),
    }
  }
}

impl<E> HandlerRegistry<E> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a new handler, returning its id. If called while a dispatch
  /// is in progress, the addition is queued and applied once dispatch
  /// finishes.
  pub fn register(&self, handler: impl FnMut(&E) + Send + 'static) -> HandlerId {
    let id = {
      let mut next_id = self.next_id.lock().unwrap();
      let id = HandlerId(*next_id);
      *next_id += 1;
      id
    };
    let mut state = self.state.lock().unwrap();
    if state.dispatching {
      state.pending.push(Pending::Add(id, Box::new(handler)));
    } else {
      state.handlers.push((id, Box::new(handler)));
    }
    id
  }

  /// Remove a previously registered handler. Safe to call from inside a
  /// dispatch; the removal takes effect after the current dispatch
  /// returns.
  pub fn remove(&self, id: HandlerId) {
    let mut state = self.state.lock().unwrap();
    if state.dispatching {
      state.pending.push(Pending::Remove(id));
    } else {
      state.handlers.retain(|(hid, _)| *hid != id);
    }
  }

  /// Invoke every registered handler with `event`, in registration order.
  /// Mutations requested during this call are applied once the loop below
  /// returns.
  pub fn dispatch(&self, event: &E) {
    let mut state = self.state.lock().unwrap();
    state.dispatching = true;
    // We must release the lock while running user callbacks (a handler
    // may itself call register/remove, which needs the lock), so the
    // handler vector is taken out for the duration of the loop.
    let mut handlers = std::mem::take(&mut state.handlers);
    drop(state);

    for (_, handler) in handlers.iter_mut() {
      handler(event);
    }

    let mut state = self.state.lock().unwrap();
    state.handlers = handlers;
    state.dispatching = false;
    for pending in state.pending.drain(..).collect::<Vec<_>>() {
      match pending {
        Pending::Add(id, handler) => state.handlers.push((id, handler)),
        Pending::Remove(id) => state.handlers.retain(|(hid, _)| *hid != id),
      }
    }
  }

  pub fn len(&self) -> usize {
    self.state.lock().unwrap().handlers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
