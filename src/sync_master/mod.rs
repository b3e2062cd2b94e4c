//! The global time-orchestration engine.

mod client;
mod master;

pub use client::{DiscreteTimeClient, SyncClient, SyncClientState, SyncRequest, SyncRequestStatus, TimeQuantumClient};
pub use master::SyncMaster;
