//! User callback types invoked by the [`super::LifecycleController`]:
//! `CommunicationReadyHandler`, `StopHandler`, `ShutdownHandler`. These run
//! on the participant's middleware thread — in this crate that is simply
//! "on the caller's thread, synchronously, from inside the
//! `LifecycleController` method that triggers them"; failures are an
//! explicit [`UserHandlerFailure`] result, not a caught exception.

use crate::error::UserHandlerFailure;

/// Called once, after `CommunicationInitialized` is reached and before the
/// participant advances to `ReadyToRun`.
pub type CommunicationReadyHandler = Box<dyn FnMut() -> Result<(), UserHandlerFailure> + Send>;

/// Called once, after `SystemCommand::Stop` is accepted and before the
/// participant advances from `Stopping` to `Stopped`.
pub type StopHandler = Box<dyn FnMut() -> Result<(), UserHandlerFailure> + Send>;

/// Called once, after `Shutdown`/`AbortSimulation` is accepted and before
/// the participant advances from `ShuttingDown` to `Shutdown`.
pub type ShutdownHandler = Box<dyn FnMut() -> Result<(), UserHandlerFailure> + Send>;
