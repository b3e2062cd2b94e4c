//! Distributing the `WorkflowConfiguration` exactly once: the first sender
//! wins, and the configuration is otherwise immutable; a second sender
//! supplying a different required-participant set is a protocol violation,
//! while a second sender re-sending byte-identical content is accepted
//! idempotently (retries during reconnect must not fault the simulation).

use std::sync::Mutex;

use crate::{
  error::{ConfigurationError, ProtocolError},
  messages::WorkflowConfiguration,
};

struct Accepted {
  sender: String,
  configuration: WorkflowConfiguration,
}

/// Holds the single `WorkflowConfiguration` accepted for a simulation run,
/// enforcing the single-sender idempotency rule above.
#[derive(Default)]
pub struct WorkflowConfigurationDistributor {
  accepted: Mutex<Option<Accepted>>,
}

impl WorkflowConfigurationDistributor {
  pub fn new() -> Self {
    WorkflowConfigurationDistributor { accepted: Mutex::new(None) }
  }

  /// Accept a `WorkflowConfiguration` sent by `sender`. The first call
  /// installs it (after validating the required-participant set is
  /// non-empty and duplicate-free); subsequent calls from the *same*
  /// sender with byte-identical content are accepted as a no-op; any call
  /// with different content, from any sender, is a `ConflictingWorkflowConfiguration`
  /// protocol error.
  pub fn set(&self, sender: impl Into<String>, configuration: WorkflowConfiguration) -> Result<(), ConfigurationOrProtocolError> {
    let sender = sender.into();
    crate::config::validate_required_participants(&configuration.required_participant_names)?;

    let mut accepted = self.accepted.lock().unwrap();
    match accepted.as_ref() {
      None => {
        *accepted = Some(Accepted { sender, configuration });
        Ok(())
      }
      Some(existing) if existing.configuration == configuration && existing.sender == sender => Ok(()),
      Some(existing) => Err(ConfigurationOrProtocolError::Protocol(ProtocolError::ConflictingWorkflowConfiguration {
        first_sender: existing.sender.clone(),
        second_sender: sender,
      })),
    }
  }

  /// The accepted configuration, if any sender has set one yet.
  pub fn get(&self) -> Option<WorkflowConfiguration> {
    self.accepted.lock().unwrap().as_ref().map(|a| a.configuration.clone())
  }

  /// The required-participant names of the accepted configuration, or an
  /// empty slice if none has been accepted yet.
  pub fn required_participant_names(&self) -> Vec<String> {
    self
      .accepted
      .lock()
      .unwrap()
      .as_ref()
      .map(|a| a.configuration.required_participant_names.clone())
      .unwrap_or_default()
  }
}

/// Either kind of error `set` can return: the configuration itself is
/// malformed, or it conflicts with one already accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationOrProtocolError {
  #[error(transparent)]
  Configuration(#[from] ConfigurationError),
  #[error(transparent)]
  Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
  use super::*;

  fn workflow(names: &[&str]) -> WorkflowConfiguration {
    WorkflowConfiguration::new(names.iter().map(|s| s.to_string()).collect())
  }

  #[test]
  fn first_sender_wins() {
    let distributor = WorkflowConfigurationDistributor::new();
    distributor.set("registry", workflow(&["A", "B"])).unwrap();
    assert_eq!(distributor.required_participant_names(), vec!["A".to_string(), "B".to_string()]);
  }

  #[test]
  fn repeated_identical_set_from_same_sender_is_idempotent() {
    let distributor = WorkflowConfigurationDistributor::new();
    distributor.set("registry", workflow(&["A", "B"])).unwrap();
    distributor.set("registry", workflow(&["A", "B"])).unwrap();
  }

  #[test]
  fn conflicting_sender_is_rejected() {
    let distributor = WorkflowConfigurationDistributor::new();
    distributor.set("registry", workflow(&["A", "B"])).unwrap();
    let err = distributor.set("operator", workflow(&["A", "C"])).unwrap_err();
    assert_eq!(
      err,
      ConfigurationOrProtocolError::Protocol(ProtocolError::ConflictingWorkflowConfiguration {
        first_sender: "registry".to_string(),
        second_sender: "operator".to_string(),
      })
    );
  }

  #[test]
  fn empty_required_set_is_rejected() {
    let distributor = WorkflowConfigurationDistributor::new();
    let err = distributor.set("registry", workflow(&[])).unwrap_err();
    assert_eq!(err, ConfigurationOrProtocolError::Configuration(ConfigurationError::EmptyRequiredParticipants));
  }
}
