//! End-to-end coverage for the cross-component scenarios no single
//! module's unit tests can reach: `SyncMaster`, `LifecycleController`,
//! `SystemStateTracker`, `TimeSyncService` and `LoopbackBus` wired together
//! the way an embedding application would wire them, with one master
//! dispatcher thread standing in for that application's own middleware
//! thread (see `demos/two_participant_lockstep.rs` for the same pattern).

use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex,
  },
  thread,
  time::Duration,
};

use synkit::{
  bus::{BusMessage, LoopbackBus, MessageBus},
  config::{ParticipantConfiguration, SimulationConfiguration, SyncType, TimeSyncConfiguration},
  error::UserHandlerFailure,
  lifecycle::LifecycleController,
  logging::Logger,
  messages::{
    ParticipantState, QuantumGrant, QuantumGrantStatus, QuantumRequest, SystemCommandKind, WorkflowConfiguration,
  },
  participant_id::{EndpointAddress, EndpointId, ParticipantId},
  sync_master::SyncMaster,
  sync_service::TimeSyncService,
  system_state::SystemStateTracker,
  time::Nanoseconds,
  workflow_config::WorkflowConfigurationDistributor,
};

const PARTICIPANT_ENDPOINT: EndpointId = EndpointId(1);

struct Harness {
  bus: LoopbackBus,
  tracker: Arc<SystemStateTracker>,
  master: Arc<SyncMaster>,
  controllers: HashMap<String, Arc<LifecycleController>>,
  ids: HashMap<String, ParticipantId>,
  master_endpoint: EndpointAddress,
}

impl Harness {
  fn controller(&self, name: &str) -> &Arc<LifecycleController> {
    self.controllers.get(name).unwrap_or_else(|| panic!("no controller registered for {name:?}"))
  }

  fn endpoint(&self, name: &str) -> EndpointAddress {
    EndpointAddress::new(*self.ids.get(name).unwrap(), PARTICIPANT_ENDPOINT)
  }
}

/// Wires one `SyncMaster` and one `LifecycleController` per name together
/// over a shared `LoopbackBus`, exactly as `two_participant_lockstep`
/// does for its own two participants.
fn build_harness(names: &[&str], sync_type: SyncType, period: Nanoseconds) -> Harness {
  let tracker = Arc::new(SystemStateTracker::new(Logger::new("system_monitor")));
  tracker.set_required_participants(names.iter().map(|n| n.to_string()).collect());

  let bus = LoopbackBus::new();
  let bus_dyn: Arc<dyn MessageBus> = Arc::new(bus.clone());

  let ids: HashMap<String, ParticipantId> =
    names.iter().enumerate().map(|(i, n)| (n.to_string(), ParticipantId::new(i as i32 + 1))).collect();
  let master_endpoint = EndpointAddress::sync_master(ParticipantId::new(0));

  let config = SimulationConfiguration::new(
    names.iter().map(|n| ParticipantConfiguration::new(*n, sync_type)).collect(),
    TimeSyncConfiguration::new(period),
  );

  let master = SyncMaster::new(Logger::new("sync_master"), Arc::clone(&bus_dyn), master_endpoint, &config, &ids, &tracker);
  spawn_master_dispatcher(Arc::clone(&master), bus.clone(), master_endpoint);

  let controllers = names
    .iter()
    .map(|name| {
      let controller = Arc::new(LifecycleController::new(*name, Logger::new("lifecycle").scoped(name), Arc::clone(&tracker)));
      (name.to_string(), controller)
    })
    .collect();

  Harness { bus, tracker, master, controllers, ids, master_endpoint }
}

/// The master's own middleware thread: drains its inbox and feeds
/// `QuantumRequest`/`TickDone` into the grant algorithm.
fn spawn_master_dispatcher(master: Arc<SyncMaster>, bus: LoopbackBus, master_endpoint: EndpointAddress) {
  let inbox = bus.register(master_endpoint);
  thread::spawn(move || loop {
    let Some(envelope) = inbox.recv() else { return };
    match envelope.message {
      BusMessage::QuantumRequest(request) => {
        let _ = master.receive_quantum_request(envelope.from, request);
      }
      BusMessage::TickDone(tick_done) => master.receive_tick_done(tick_done),
      _ => {}
    }
  });
}

fn run_all(harness: &Harness, names: &[&str]) {
  for name in names {
    harness.controller(name).start().unwrap();
  }
  for name in names {
    harness.controller(name).handle_system_command(SystemCommandKind::Run).unwrap();
  }
}

/// S1: two `TimeQuantum` participants lock-step through a fixed number of
/// quanta, each only ever seeing grants in order and in step with the
/// other.
#[test]
fn s1_time_quantum_participants_lock_step_through_quanta() {
  let period = Nanoseconds::new(10);
  let harness = build_harness(&["A", "B"], SyncType::TimeQuantum, period);
  run_all(&harness, &["A", "B"]);
  assert_eq!(harness.tracker.system_state(), ParticipantState::Running);

  let steps = 5u32;
  let services: Vec<_> = ["A", "B"]
    .iter()
    .map(|name| {
      let own_endpoint = harness.endpoint(name);
      let inbox = harness.bus.register(own_endpoint);
      let bus: Arc<dyn MessageBus> = Arc::new(harness.bus.clone());
      let service = TimeSyncService::new(
        Logger::new("time_sync").scoped(name),
        bus,
        own_endpoint,
        harness.master_endpoint,
        SyncType::TimeQuantum,
        period,
      );

      let remaining = Arc::new(AtomicU32::new(steps));
      let remaining_for_handler = Arc::clone(&remaining);
      let observed = Arc::new(Mutex::new(Vec::new()));
      let observed_for_handler = Arc::clone(&observed);
      let service_for_handler = Arc::clone(&service);
      service.set_simulation_task(Box::new(move |step| {
        observed_for_handler.lock().unwrap().push(step.now);
        if remaining_for_handler.fetch_sub(1, Ordering::SeqCst) == 1 {
          service_for_handler.cancel();
        }
        Ok(())
      }));
      service.start(inbox);
      (service, observed)
    })
    .collect();

  for (service, _) in &services {
    service.join().expect("simulation step should not fail");
  }

  for (_, observed) in &services {
    let observed = observed.lock().unwrap();
    assert_eq!(observed.len(), steps as usize);
    for (k, now) in observed.iter().enumerate() {
      assert_eq!(*now, Nanoseconds::new(k as u64 * period.as_u64()));
    }
  }
}

/// S2: pausing withholds grants until `continue_` is called, even though
/// the participant keeps sending requests.
#[test]
fn s2_pause_withholds_grants_until_continue() {
  let period = Nanoseconds::new(10);
  let harness = build_harness(&["A"], SyncType::TimeQuantum, period);
  run_all(&harness, &["A"]);
  assert_eq!(harness.tracker.system_state(), ParticipantState::Running);

  let own = harness.endpoint("A");
  let inbox = harness.bus.register(own);

  harness
    .bus
    .send_to(own, harness.master_endpoint, BusMessage::QuantumRequest(QuantumRequest { now: Nanoseconds::ZERO, duration: period }));
  let first = inbox.recv_timeout(Duration::from_millis(200)).expect("expected the first grant");
  assert!(matches!(
    first.message,
    BusMessage::QuantumGrant(QuantumGrant { status: QuantumGrantStatus::Granted, .. })
  ));

  harness.controller("A").pause("operator request").unwrap();
  assert_eq!(harness.tracker.system_state(), ParticipantState::Paused);

  harness
    .bus
    .send_to(own, harness.master_endpoint, BusMessage::QuantumRequest(QuantumRequest { now: period, duration: period }));
  assert!(
    inbox.recv_timeout(Duration::from_millis(200)).is_none(),
    "no grant should be issued while the system is paused"
  );

  harness.controller("A").continue_().unwrap();
  assert_eq!(harness.tracker.system_state(), ParticipantState::Running);

  let second = inbox.recv_timeout(Duration::from_millis(200)).expect("grant should resume after continue");
  assert!(matches!(
    second.message,
    BusMessage::QuantumGrant(QuantumGrant { status: QuantumGrantStatus::Granted, .. })
  ));
}

/// S3: a `SimulationStep` failure, reported through
/// `LifecycleController::report_failure`, drives the failing participant to
/// `Error`, drives the aggregated `SystemState` to `Error`, and the master
/// stops issuing grants to everyone else.
#[test]
fn s3_user_handler_failure_halts_further_grants() {
  let period = Nanoseconds::new(10);
  let harness = build_harness(&["A", "B"], SyncType::TimeQuantum, period);
  run_all(&harness, &["A", "B"]);
  assert_eq!(harness.tracker.system_state(), ParticipantState::Running);

  let a = harness.endpoint("A");
  let b = harness.endpoint("B");
  let inbox_a = harness.bus.register(a);
  let inbox_b = harness.bus.register(b);

  // Round 1: both at now=0, both granted immediately.
  harness
    .bus
    .send_to(a, harness.master_endpoint, BusMessage::QuantumRequest(QuantumRequest { now: Nanoseconds::ZERO, duration: period }));
  harness
    .bus
    .send_to(b, harness.master_endpoint, BusMessage::QuantumRequest(QuantumRequest { now: Nanoseconds::ZERO, duration: period }));
  inbox_a.recv_timeout(Duration::from_millis(200)).expect("A's first grant");
  inbox_b.recv_timeout(Duration::from_millis(200)).expect("B's first grant");

  // A's SimulationStep handler throws; the embedding application reports
  // that failure to A's own controller, since the sync service that ran
  // the step has no direct line into the lifecycle state machine.
  let waiter = Arc::clone(&harness.master);
  let shutdown_handle = thread::spawn(move || waiter.wait_for_shutdown());
  harness.controller("A").report_failure(UserHandlerFailure::new("model diverged"));

  assert_eq!(harness.tracker.system_state(), ParticipantState::Error);
  assert_eq!(harness.tracker.participant_status("A").unwrap().state, ParticipantState::Error);
  assert_eq!(shutdown_handle.join().unwrap(), ParticipantState::Error);

  // B asks for its next quantum; the master must not grant it.
  harness
    .bus
    .send_to(b, harness.master_endpoint, BusMessage::QuantumRequest(QuantumRequest { now: period, duration: period }));
  assert!(
    inbox_b.recv_timeout(Duration::from_millis(200)).is_none(),
    "no further grants should be issued once the system has entered Error"
  );
}

/// S4: the orderly Run -> Stop -> Shutdown sequence reaches `Shutdown` on
/// both the participant's own lifecycle and the master's aggregated view.
#[test]
fn s4_orderly_shutdown_completes_both_controller_and_master() {
  let harness = build_harness(&["A"], SyncType::TimeQuantum, Nanoseconds::new(10));
  run_all(&harness, &["A"]);

  let waiter = Arc::clone(&harness.master);
  let shutdown_handle = thread::spawn(move || waiter.wait_for_shutdown());

  harness.controller("A").handle_system_command(SystemCommandKind::Stop).unwrap();
  harness.controller("A").handle_system_command(SystemCommandKind::Shutdown).unwrap();

  assert_eq!(harness.controller("A").wait_for_lifecycle_to_complete(), ParticipantState::Shutdown);
  assert_eq!(shutdown_handle.join().unwrap(), ParticipantState::Shutdown);
}

/// S5: a conflicting `WorkflowConfiguration` sender is rejected, and the
/// simulation proceeds on the already-accepted configuration regardless.
#[test]
fn s5_conflicting_workflow_configuration_is_rejected_and_ignored() {
  let distributor = WorkflowConfigurationDistributor::new();
  distributor.set("registry", WorkflowConfiguration::new(vec!["A".into(), "B".into()])).unwrap();

  let err = distributor
    .set("operator", WorkflowConfiguration::new(vec!["A".into()]))
    .expect_err("a different required-participant set from another sender must be rejected");
  assert_eq!(err.to_string(), "WorkflowConfiguration was already set by \"registry\"; received a conflicting set from \"operator\"");

  let harness = build_harness(
    &distributor.required_participant_names().iter().map(String::as_str).collect::<Vec<_>>(),
    SyncType::TimeQuantum,
    Nanoseconds::new(10),
  );
  run_all(&harness, &["A", "B"]);
  assert_eq!(harness.tracker.system_state(), ParticipantState::Running);
}

/// S6: an observer that registers after the system has already reached a
/// steady state sees only the current value, not the transitions that led
/// to it — exercised through the full controller/tracker/master wiring
/// rather than a bare `SystemStateTracker`.
#[test]
fn s6_late_observer_sees_only_current_state_across_full_wiring() {
  let harness = build_harness(&["A"], SyncType::TimeQuantum, Nanoseconds::new(10));
  run_all(&harness, &["A"]);
  assert_eq!(harness.tracker.system_state(), ParticipantState::Running);

  let seen = Arc::new(Mutex::new(Vec::new()));
  let seen_for_handler = Arc::clone(&seen);
  harness.tracker.add_system_state_handler(move |state| seen_for_handler.lock().unwrap().push(state));

  assert_eq!(*seen.lock().unwrap(), vec![ParticipantState::Running]);

  harness.controller("A").handle_system_command(SystemCommandKind::Stop).unwrap();
  assert_eq!(
    *seen.lock().unwrap(),
    vec![ParticipantState::Running, ParticipantState::Stopping, ParticipantState::Stopped]
  );
}
