//! Time-synchronization wire messages: `QuantumRequest`, `QuantumGrant`,
//! `Tick`, `TickDone`, `NextSimTask`.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{participant_id::EndpointAddress, time::Nanoseconds};

/// `{now, duration}` — participant to master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumRequest {
  pub now: Nanoseconds,
  pub duration: Nanoseconds,
}

/// `status` field of [`QuantumGrant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum QuantumGrantStatus {
  Granted = 0,
  Rejected = 1,
}

/// `{grantee, now, duration, status}` — master to one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumGrant {
  pub grantee: EndpointAddress,
  pub now: Nanoseconds,
  pub duration: Nanoseconds,
  pub status: QuantumGrantStatus,
}

/// `{now, duration}` — master to all discrete-time participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
  pub now: Nanoseconds,
  pub duration: Nanoseconds,
}

impl Tick {
  pub fn end_time(&self) -> Nanoseconds {
    self.now + self.duration
  }
}

/// `{finishedTick: {now, duration}}` — discrete-time participant to
/// master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickDone {
  pub finished_tick: Tick,
}

/// `{timePoint, duration}` — participant to all, and vice versa:
/// announces the next simulation task a participant will request/run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextSimTask {
  pub time_point: Nanoseconds,
  pub duration: Nanoseconds,
}
