//! The message bus collaborator: an in-process transport that delivers
//! typed messages reliably between named endpoints. [`MessageBus`] defines
//! that capability as a trait, so components hold a small send/receive
//! value instead of a pointer back into a concrete transport — a component
//! declares which [`BusMessage`] variants it accepts and holds a bus
//! capability.
//!
//! [`LoopbackBus`] is an in-process reference implementation, sufficient to
//! run end-to-end scenarios without a real network transport: a
//! channel-backed mailbox per endpoint, with FIFO delivery per
//! sender-receiver pair.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
  time::Duration,
};

use mio_06::{Events, Poll, PollOpt, Ready, Token};
use mio_extras::channel as mio_channel;

use crate::{
  messages::{
    NextSimTask, ParticipantCommand, ParticipantStatus, QuantumGrant, QuantumRequest, SystemCommand, Tick, TickDone,
    WorkflowConfiguration,
  },
  participant_id::{EndpointAddress, ParticipantId},
};

/// The tagged union of every message type the core exchanges over the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
  ParticipantStatus(ParticipantStatus),
  ParticipantCommand(ParticipantCommand),
  SystemCommand(SystemCommand),
  WorkflowConfiguration(WorkflowConfiguration),
  QuantumRequest(QuantumRequest),
  QuantumGrant(QuantumGrant),
  Tick(Tick),
  TickDone(TickDone),
  NextSimTask(NextSimTask),
}

/// An envelope as delivered to a receiver: who it came from, and the
/// payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
  pub from: EndpointAddress,
  pub message: BusMessage,
}

/// The capability a component needs to talk to the bus: send a message to
/// one endpoint, or broadcast to all participants. Implementations must
/// preserve FIFO order per sender-receiver pair.
pub trait MessageBus: Send + Sync {
  /// Send `message`, attributed to `from`, to the single endpoint `to`.
  fn send_to(&self, from: EndpointAddress, to: EndpointAddress, message: BusMessage);

  /// Send `message`, attributed to `from`, to every registered participant
  /// (used for `SystemCommand` and `WorkflowConfiguration`).
  fn broadcast(&self, from: EndpointAddress, message: BusMessage);
}

/// A per-endpoint inbox: receives everything addressed to it, plus every
/// broadcast.
pub struct Inbox {
  receiver: mio_channel::Receiver<Envelope>,
  poll: Poll,
}

impl Inbox {
  fn new(receiver: mio_channel::Receiver<Envelope>) -> Self {
    let poll = Poll::new().expect("failed to create mio Poll for Inbox");
    poll
      .register(&receiver, Token(0), Ready::readable(), PollOpt::edge())
      .expect("failed to register Inbox receiver with mio Poll");
    Inbox { receiver, poll }
  }

  /// Drain every message currently queued, without blocking.
  pub fn try_iter(&self) -> Vec<Envelope> {
    let mut out = Vec::new();
    while let Ok(envelope) = self.receiver.try_recv() {
      out.push(envelope);
    }
    out
  }

  /// Block until at least one message is available, then return it.
  /// `mio_extras`'s `Receiver` only exposes a non-blocking `try_recv`, so
  /// this parks on the registered `Poll` between attempts instead.
  pub fn recv(&self) -> Option<Envelope> {
    loop {
      if let Ok(envelope) = self.receiver.try_recv() {
        return Some(envelope);
      }
      let mut events = Events::with_capacity(4);
      if self.poll.poll(&mut events, None).is_err() {
        return None;
      }
    }
  }

  /// Like [`Self::recv`], but gives up and returns `None` once `timeout`
  /// has elapsed without a message arriving. Used by callers that need to
  /// re-check a cancellation flag between waits rather than block forever.
  pub fn recv_timeout(&self, timeout: Duration) -> Option<Envelope> {
    if let Ok(envelope) = self.receiver.try_recv() {
      return Some(envelope);
    }
    let mut events = Events::with_capacity(4);
    if self.poll.poll(&mut events, Some(timeout)).is_err() {
      return None;
    }
    self.receiver.try_recv().ok()
  }
}

/// An in-process reference [`MessageBus`]: every registered endpoint gets
/// an `mio_channel` mailbox, broadcasts fan out to all of them.
#[derive(Clone)]
pub struct LoopbackBus {
  inner: Arc<Mutex<LoopbackBusInner>>,
}

struct LoopbackBusInner {
  senders: HashMap<EndpointAddress, mio_channel::Sender<Envelope>>,
  participant_endpoints: HashMap<ParticipantId, Vec<EndpointAddress>>,
}

impl LoopbackBus {
  pub fn new() -> Self {
    LoopbackBus {
      inner: Arc::new(Mutex::new(LoopbackBusInner {
        senders: HashMap::new(),
        participant_endpoints: HashMap::new(),
      })),
    }
  }

  /// Register `endpoint` with the bus and return an [`Inbox`] for it.
  pub fn register(&self, endpoint: EndpointAddress) -> Inbox {
    let (sender, receiver) = mio_channel::channel();
    let mut inner = self.inner.lock().unwrap();
    inner.senders.insert(endpoint, sender);
    inner
      .participant_endpoints
      .entry(endpoint.participant)
      .or_default()
      .push(endpoint);
    Inbox::new(receiver)
  }
}

impl Default for LoopbackBus {
  fn default() -> Self {
    LoopbackBus::new()
  }
}

impl MessageBus for LoopbackBus {
  fn send_to(&self, from: EndpointAddress, to: EndpointAddress, message: BusMessage) {
    let inner = self.inner.lock().unwrap();
    if let Some(sender) = inner.senders.get(&to) {
      let _ = sender.send(Envelope { from, message });
    }
  }

  fn broadcast(&self, from: EndpointAddress, message: BusMessage) {
    let inner = self.inner.lock().unwrap();
    for sender in inner.senders.values() {
      let _ = sender.send(Envelope {
        from,
        message: message.clone(),
      });
    }
  }
}
