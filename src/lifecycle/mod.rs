//! The per-participant lifecycle state machine.

mod controller;
mod handlers;

pub use controller::LifecycleController;
pub use handlers::{CommunicationReadyHandler, ShutdownHandler, StopHandler};
