//! `SyncMaster`: the global time-orchestration engine that grants each
//! synchronized participant permission to advance, keeping every
//! participant within one quantum of the slowest one.

use std::{
  collections::HashMap,
  sync::{Arc, Condvar, Mutex},
};

use crate::{
  bus::{BusMessage, MessageBus},
  error::ProtocolError,
  logging::Logger,
  messages::{ParticipantState, QuantumGrant, QuantumRequest, SystemState, Tick, TickDone},
  participant_id::{EndpointAddress, ParticipantId},
  config::SimulationConfiguration,
  sync_master::client::{DiscreteTimeClient, SyncClient, TimeQuantumClient},
  system_state::SystemStateTracker,
  time::{Nanoseconds, SimulationStep},
};

type Shared<T> = Arc<Mutex<T>>;

/// The global time-orchestration engine for one simulation run. One
/// `SyncMaster` serves every `TimeQuantum` and `DiscreteTime` participant
/// named in the accepted `WorkflowConfiguration`.
pub struct SyncMaster {
  logger: Logger,
  bus: Arc<dyn MessageBus>,
  own_endpoint: EndpointAddress,
  system_state: Mutex<SystemState>,
  sync_clients: Mutex<Vec<Shared<dyn SyncClient>>>,
  time_quantum_clients: Mutex<HashMap<ParticipantId, (Shared<dyn SyncClient>, Arc<Mutex<Option<EndpointAddress>>>)>>,
  discrete_time_client: Mutex<Option<Shared<DiscreteTimeClient>>>,
  max_granted_end_time: Mutex<Nanoseconds>,
  completion_lock: Mutex<Option<SystemState>>,
  completion_cv: Condvar,
}

impl SyncMaster {
  /// Construct a `SyncMaster` serving the `TimeQuantum`/`DiscreteTime`
  /// participants named in `config`, and subscribe it to `tracker`'s
  /// `SystemState` changes. `participant_ids` maps each configured
  /// participant's name to the `ParticipantId` the registry assigned it —
  /// this crate does not implement the registry itself, so the mapping is
  /// supplied by the caller.
  pub fn new(
    logger: Logger,
    bus: Arc<dyn MessageBus>,
    own_endpoint: EndpointAddress,
    config: &SimulationConfiguration,
    participant_ids: &HashMap<String, ParticipantId>,
    tracker: &Arc<SystemStateTracker>,
  ) -> Arc<SyncMaster> {
    let master = Arc::new(SyncMaster {
      logger,
      bus,
      own_endpoint,
      system_state: Mutex::new(ParticipantState::Invalid),
      sync_clients: Mutex::new(Vec::new()),
      time_quantum_clients: Mutex::new(HashMap::new()),
      discrete_time_client: Mutex::new(None),
      max_granted_end_time: Mutex::new(Nanoseconds::ZERO),
      completion_lock: Mutex::new(None),
      completion_cv: Condvar::new(),
    });

    master.setup_time_quantum_clients(config, participant_ids);
    master.setup_discrete_time_client(config);

    let weak = Arc::downgrade(&master);
    tracker.add_system_state_handler(move |state| {
      if let Some(master) = weak.upgrade() {
        master.system_state_changed(state);
      }
    });

    master
  }

  fn setup_time_quantum_clients(&self, config: &SimulationConfiguration, participant_ids: &HashMap<String, ParticipantId>) {
    for participant in config.time_quantum_participants() {
      let Some(&participant_id) = participant_ids.get(&participant.participant_name) else {
        self
          .logger
          .warn(format!("no ParticipantId registered for {:?}, skipping TimeQuantumClient", participant.participant_name));
        continue;
      };

      let client = Arc::new(Mutex::new(TimeQuantumClient::new()));
      // The address to grant back to: the `from` of whichever `QuantumRequest`
      // is currently pending, recorded by `receive_quantum_request` below
      // (participants are not required to always request from the same
      // endpoint, so this can't be fixed up-front from `participant_id` alone).
      let reply_to: Arc<Mutex<Option<EndpointAddress>>> = Arc::new(Mutex::new(None));
      let bus = Arc::clone(&self.bus);
      let own_endpoint = self.own_endpoint;
      let grant_reply_to = Arc::clone(&reply_to);
      client.lock().unwrap().set_grant_action(move |status, now, duration| {
        let Some(grantee) = *grant_reply_to.lock().unwrap() else {
          return;
        };
        let grant = QuantumGrant { grantee, now, duration, status };
        bus.send_to(own_endpoint, grantee, BusMessage::QuantumGrant(grant));
      });

      let dyn_client: Shared<dyn SyncClient> = client;
      self.time_quantum_clients.lock().unwrap().insert(participant_id, (Arc::clone(&dyn_client), reply_to));
      self.sync_clients.lock().unwrap().push(dyn_client);
    }
    self
      .logger
      .info(format!("serving {} TimeQuantum clients", self.time_quantum_clients.lock().unwrap().len()));
  }

  fn setup_discrete_time_client(&self, config: &SimulationConfiguration) {
    let num_clients = config.discrete_time_participants().count();
    self.logger.info(format!("serving {num_clients} DiscreteTime clients"));
    if num_clients == 0 {
      return;
    }

    let tick_duration = config.time_sync.tick_period;
    let client = Arc::new(Mutex::new(DiscreteTimeClient::new(tick_duration)));
    client.lock().unwrap().set_num_clients(num_clients as u32);

    let bus = Arc::clone(&self.bus);
    let own_endpoint = self.own_endpoint;
    client.lock().unwrap().set_grant_action(move |status, now, duration| {
      use crate::messages::QuantumGrantStatus;
      if status != QuantumGrantStatus::Granted {
        return;
      }
      bus.broadcast(own_endpoint, BusMessage::Tick(Tick { now, duration }));
    });

    let dyn_client: Shared<dyn SyncClient> = client.clone() as Shared<dyn SyncClient>;
    self.sync_clients.lock().unwrap().push(dyn_client);
    *self.discrete_time_client.lock().unwrap() = Some(client);
  }

  /// Handle an incoming quantum request. `UnknownQuantumClient` and
  /// `QuantumRequestAlreadyPending` are rejected outright; a `now`
  /// mismatch against the client's own end-time is logged but does not
  /// block the request from being recorded.
  pub fn receive_quantum_request(&self, from: EndpointAddress, msg: QuantumRequest) -> Result<(), ProtocolError> {
    let entry = {
      let clients = self.time_quantum_clients.lock().unwrap();
      clients.get(&from.participant).cloned()
    };
    let Some((client, reply_to)) = entry else {
      let err = ProtocolError::UnknownQuantumClient(from.participant.0.to_string());
      self.logger.error(&err);
      return Err(err);
    };

    {
      let guard = client.lock().unwrap();
      if guard.has_pending_request() {
        let err = ProtocolError::QuantumRequestAlreadyPending(from.participant.0.to_string());
        self.logger.error(&err);
        return Err(err);
      }
      if guard.end_time() != msg.now {
        let err = ProtocolError::QuantumRequestTimeMismatch {
          participant: from.participant.0.to_string(),
          now: msg.now,
          expected: guard.end_time(),
        };
        self.logger.error(&err);
      }
    }

    *reply_to.lock().unwrap() = Some(from);
    client.lock().unwrap().set_pending_request(msg.now, msg.duration);

    if self.system_state() == ParticipantState::Running {
      self.send_grants();
    }
    Ok(())
  }

  /// Handle an incoming tick-done report. A no-op if no `DiscreteTimeClient`
  /// is configured for this simulation.
  pub fn receive_tick_done(&self, msg: TickDone) {
    let Some(discrete) = self.discrete_time_client.lock().unwrap().clone() else {
      return;
    };

    let has_pending = {
      let mut guard = discrete.lock().unwrap();
      if guard.current_tick() != msg.finished_tick {
        let err = ProtocolError::TickDoneMismatch {
          finished: SimulationStep::new(msg.finished_tick.now, msg.finished_tick.duration),
          current: SimulationStep::new(guard.current_tick().now, guard.current_tick().duration),
        };
        self.logger.error(&err);
      }
      guard.tick_done_received();
      guard.has_pending_request()
    };

    if !has_pending {
      return;
    }
    if self.system_state() == ParticipantState::Running {
      self.send_grants();
    }
  }

  /// Every pending client whose
  /// request either starts at the slowest client's current time, or whose
  /// end-time does not exceed the watermark already granted to someone
  /// else, is granted immediately; everyone else waits for the next round.
  fn send_grants(&self) {
    let sync_clients = self.sync_clients.lock().unwrap();
    let Some(min_now) = sync_clients.iter().map(|c| c.lock().unwrap().now()).min() else {
      return;
    };

    let mut max_granted = self.max_granted_end_time.lock().unwrap();
    for client in sync_clients.iter() {
      let mut guard = client.lock().unwrap();
      if !guard.has_pending_request() {
        continue;
      }
      if guard.now() == min_now || guard.end_time() <= *max_granted {
        let end_time = guard.end_time();
        guard.give_grant();
        *max_granted = (*max_granted).max(end_time);
      }
    }
  }

  fn reset_all_clients(&self) {
    for client in self.sync_clients.lock().unwrap().iter() {
      client.lock().unwrap().reset();
    }
  }

  /// On transition into `Running`, every client is reset unless resuming
  /// from `Paused`, then grants are sent to kick off (or resume) the first
  /// round.
  fn system_state_changed(&self, new_state: SystemState) {
    self.logger.info(format!("new SystemState: {new_state:?}"));
    let old_state = {
      let mut state = self.system_state.lock().unwrap();
      let old = *state;
      *state = new_state;
      old
    };

    if new_state == ParticipantState::Running {
      match old_state {
        ParticipantState::Paused => self.logger.info("continuing simulating"),
        ParticipantState::ReadyToRun | ParticipantState::CommunicationInitialized => {
          self.logger.info("starting simulating");
          self.reset_all_clients();
        }
        _ => {
          self
            .logger
            .warn(format!("switch to Running from unexpected state {old_state:?}; assuming simulation start"));
          self.reset_all_clients();
        }
      }
      self.send_grants();
    }

    if matches!(new_state, ParticipantState::Shutdown | ParticipantState::Error) {
      self.reject_all_pending();
      *self.completion_lock.lock().unwrap() = Some(new_state);
      self.completion_cv.notify_all();
    }
  }

  /// Once the master shuts down, any request still `Pending` is rejected
  /// rather than left to wait forever.
  fn reject_all_pending(&self) {
    for client in self.sync_clients.lock().unwrap().iter() {
      let mut guard = client.lock().unwrap();
      if guard.has_pending_request() {
        guard.reject_grant();
      }
    }
  }

  /// Blocks until the simulation reaches `Shutdown` or `Error`.
  pub fn wait_for_shutdown(&self) -> SystemState {
    let guard = self.completion_lock.lock().unwrap();
    let mut guard = self.completion_cv.wait_while(guard, |completed| completed.is_none()).unwrap();
    guard.take().unwrap()
  }

  pub fn system_state(&self) -> SystemState {
    *self.system_state.lock().unwrap()
  }

  pub fn max_granted_end_time(&self) -> Nanoseconds {
    *self.max_granted_end_time.lock().unwrap()
  }
}
