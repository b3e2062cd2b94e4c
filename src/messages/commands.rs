//! `ParticipantCommand` and `SystemCommand`.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::participant_id::ParticipantId;

/// The kinds of addressed, single-participant commands.
///
/// `Invalid` is the wire default. `Initialize` is an operator override of
/// the automatic `srv_ready` transition, kept alongside `Restart`/
/// `Shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ParticipantCommandKind {
  Invalid = 0,
  Restart = 1,
  Shutdown = 2,
  Initialize = 3,
}

/// `{participantId, kind}` — controller to one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantCommand {
  pub participant: ParticipantId,
  pub kind: ParticipantCommandKind,
}

/// The kinds of broadcast system commands. `PrepareColdswap` and
/// `ExecuteColdswap` are preserved on the wire for protocol compatibility;
/// the core does not implement the coldswap choreography, it only decodes
/// and acknowledges these values without panicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum SystemCommandKind {
  Invalid = 0,
  Run = 1,
  Stop = 2,
  Shutdown = 3,
  AbortSimulation = 4,
  PrepareColdswap = 5,
  ExecuteColdswap = 6,
}

impl SystemCommandKind {
  /// `true` for the two coldswap-related kinds that are accepted on the
  /// wire but drive no choreography.
  pub const fn is_coldswap(self) -> bool {
    matches!(self, SystemCommandKind::PrepareColdswap | SystemCommandKind::ExecuteColdswap)
  }
}

/// `{kind}` — controller to all participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemCommand {
  pub kind: SystemCommandKind,
}

impl SystemCommand {
  pub const fn new(kind: SystemCommandKind) -> Self {
    SystemCommand { kind }
  }
}
