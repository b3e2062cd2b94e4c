//! Wire message types exchanged with the message bus collaborator.
//!
//! Field order is the required serialization order; integer widths are
//! exact. Serialization itself (the CDR-like encoding, or whatever the
//! concrete bus transport uses) is the transport's concern, not this
//! crate's — these are the typed payloads, derived `Serialize`/
//! `Deserialize` so that *some* encoder can turn them into bytes.

mod commands;
mod participant_status;
mod sync;
mod workflow;

pub use commands::{ParticipantCommand, ParticipantCommandKind, SystemCommand, SystemCommandKind};
pub use participant_status::{ParticipantState, ParticipantStatus, SystemState};
pub use sync::{NextSimTask, QuantumGrant, QuantumGrantStatus, QuantumRequest, Tick, TickDone};
pub use workflow::WorkflowConfiguration;
