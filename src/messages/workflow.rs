//! `WorkflowConfiguration`.

use serde::{Deserialize, Serialize};

/// `{requiredParticipantNames: ordered set of string}`. Immutable after
/// first distribution; distributed by exactly one sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfiguration {
  pub required_participant_names: Vec<String>,
}

impl WorkflowConfiguration {
  pub fn new(required_participant_names: Vec<String>) -> Self {
    WorkflowConfiguration {
      required_participant_names,
    }
  }

  pub fn is_required(&self, participant_name: &str) -> bool {
    self.required_participant_names.iter().any(|n| n == participant_name)
  }
}
