//! In-memory configuration surface. Parsing a config file into these types
//! (YAML/JSON) is out of scope — these structs are the boundary the core
//! consumes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{error::ConfigurationError, time::Nanoseconds};

/// How a participant's simulation clock is advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncType {
  /// Not synchronized; this participant is not a `SyncClient`.
  Unsynchronized,
  /// One `TimeQuantumClient` per participant; granularity chosen per
  /// participant.
  TimeQuantum,
  /// Shares the simulation-wide `DiscreteTimeClient` with all other
  /// `DiscreteTime` participants.
  DiscreteTime,
}

/// Per-participant configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantConfiguration {
  pub participant_name: String,
  pub sync_type: SyncType,
}

impl ParticipantConfiguration {
  pub fn new(participant_name: impl Into<String>, sync_type: SyncType) -> Self {
    ParticipantConfiguration {
      participant_name: participant_name.into(),
      sync_type,
    }
  }
}

/// The simulation-wide tick period — only meaningful in `DiscreteTime`
/// mode, shared by every DT participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSyncConfiguration {
  pub tick_period: Nanoseconds,
}

impl TimeSyncConfiguration {
  pub fn new(tick_period: Nanoseconds) -> Self {
    TimeSyncConfiguration { tick_period }
  }
}

/// The full set of configuration this crate's core consumes for one
/// simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfiguration {
  pub participants: Vec<ParticipantConfiguration>,
  pub time_sync: TimeSyncConfiguration,
}

impl SimulationConfiguration {
  pub fn new(participants: Vec<ParticipantConfiguration>, time_sync: TimeSyncConfiguration) -> Self {
    SimulationConfiguration { participants, time_sync }
  }

  pub fn discrete_time_participants(&self) -> impl Iterator<Item = &ParticipantConfiguration> {
    self
      .participants
      .iter()
      .filter(|p| p.sync_type == SyncType::DiscreteTime)
  }

  pub fn time_quantum_participants(&self) -> impl Iterator<Item = &ParticipantConfiguration> {
    self
      .participants
      .iter()
      .filter(|p| p.sync_type == SyncType::TimeQuantum)
  }
}

/// Validate a required-participant set: non-empty, no duplicates.
pub fn validate_required_participants(required: &[String]) -> Result<(), ConfigurationError> {
  if required.is_empty() {
    return Err(ConfigurationError::EmptyRequiredParticipants);
  }
  let mut seen = HashSet::with_capacity(required.len());
  for name in required {
    if !seen.insert(name.as_str()) {
      return Err(ConfigurationError::DuplicateRequiredParticipant(name.clone()));
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_empty_required_set() {
    assert_eq!(
      validate_required_participants(&[]),
      Err(ConfigurationError::EmptyRequiredParticipants)
    );
  }

  #[test]
  fn rejects_duplicate_names() {
    let names = vec!["A".to_string(), "B".to_string(), "A".to_string()];
    assert_eq!(
      validate_required_participants(&names),
      Err(ConfigurationError::DuplicateRequiredParticipant("A".to_string()))
    );
  }

  #[test]
  fn accepts_distinct_non_empty_set() {
    let names = vec!["A".to_string(), "B".to_string()];
    assert!(validate_required_participants(&names).is_ok());
  }
}
