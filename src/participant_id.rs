//! Participant identity and bus routing addresses. A `ParticipantId` is a
//! stable numeric identifier assigned by the registry when a participant
//! joins; it forms the low half of an `EndpointAddress = (participantId,
//! endpointId)`.

use serde::{Deserialize, Serialize};

/// Stable numeric identifier for a participant, assigned by the registry
/// when the participant joins the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub i32);

impl ParticipantId {
  pub const fn new(id: i32) -> Self {
    ParticipantId(id)
  }
}

impl From<i32> for ParticipantId {
  fn from(id: i32) -> Self {
    ParticipantId(id)
  }
}

/// A 16-bit endpoint identifier, scoped within a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub u16);

/// The SyncMaster's own well-known endpoint id: every simulation reserves
/// `1024` for it.
pub const SYNC_MASTER_ENDPOINT_ID: EndpointId = EndpointId(1024);

/// The routing tuple `(participantId, endpointId)` used to address
/// messages on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointAddress {
  pub participant: ParticipantId,
  pub endpoint: EndpointId,
}

impl EndpointAddress {
  pub const fn new(participant: ParticipantId, endpoint: EndpointId) -> Self {
    EndpointAddress { participant, endpoint }
  }

  /// The address of the SyncMaster belonging to `participant`'s simulation.
  pub const fn sync_master(participant: ParticipantId) -> Self {
    EndpointAddress::new(participant, SYNC_MASTER_ENDPOINT_ID)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sync_master_uses_reserved_endpoint_id() {
    let addr = EndpointAddress::sync_master(ParticipantId::new(3));
    assert_eq!(addr.endpoint, SYNC_MASTER_ENDPOINT_ID);
    assert_eq!(addr.participant, ParticipantId::new(3));
  }
}
