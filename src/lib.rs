//! `synkit` — the time-synchronization and lifecycle-coordination core of a
//! distributed simulation middleware.
//!
//! Multiple participant processes join a simulation over a message bus.
//! To keep the simulation deterministic, every participant advances in
//! lock-step (or in request/grant steps) and all participants observe a
//! consistent, derived [`SystemState`]. This crate implements:
//!
//! - [`sync_master`]: the global time-orchestration engine ([`SyncMaster`])
//!   that grants each synchronized participant permission to advance.
//! - [`lifecycle`]: the per-participant state machine
//!   ([`LifecycleController`]) that drives a participant from
//!   `ServicesCreated` through `Running` to `Shutdown`.
//! - [`system_state`]: the aggregator ([`SystemStateTracker`]) that derives
//!   a single [`SystemState`] from the required participants' statuses.
//! - [`workflow_config`]: the mechanism that distributes the set of
//!   *required* participants exactly once.
//!
//! The individual virtual bus controllers (CAN/LIN/FlexRay/Ethernet), the
//! wire transport, configuration file parsing, and the C ABI binding layer
//! are out of scope; this crate assumes an in-process [`bus::MessageBus`]
//! collaborator that delivers typed messages reliably between named
//! endpoints.

pub mod bus;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod messages;
pub mod participant_id;
pub mod statusevents;
pub mod sync_master;
pub mod sync_service;
pub mod system_state;
pub mod time;
pub mod workflow_config;

pub use error::{ConfigurationError, ProtocolError, StateError, SynkitError, UserHandlerFailure};
pub use lifecycle::LifecycleController;
pub use messages::{ParticipantState, ParticipantStatus, SystemState};
pub use participant_id::{EndpointAddress, ParticipantId};
pub use sync_master::SyncMaster;
pub use sync_service::TimeSyncService;
pub use system_state::SystemStateTracker;
pub use time::Nanoseconds;
pub use workflow_config::WorkflowConfigurationDistributor;
