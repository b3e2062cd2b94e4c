//! Runs two `TimeQuantum` participants, `A` and `B`, lock-stepping through a
//! fixed number of quanta over a [`LoopbackBus`], coordinated by one
//! [`SyncMaster`]. Plays the same role for this crate's protocol that the
//! teacher's own `examples/` binaries (`ddsperf`, `no_key_async_usage_example`)
//! play for RTPS pub/sub.
//!
//! ```text
//! cargo run --example two_participant_lockstep -- --steps 5 --period-ms 1
//! ```

use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  thread,
};

use anyhow::{anyhow, Result};
use clap::Parser;

use synkit::{
  bus::{BusMessage, LoopbackBus, MessageBus},
  config::{ParticipantConfiguration, SimulationConfiguration, SyncType, TimeSyncConfiguration},
  lifecycle::LifecycleController,
  logging::Logger,
  messages::{SystemCommandKind, WorkflowConfiguration},
  participant_id::{EndpointAddress, EndpointId, ParticipantId},
  sync_master::SyncMaster,
  sync_service::TimeSyncService,
  system_state::SystemStateTracker,
  time::Nanoseconds,
  workflow_config::WorkflowConfigurationDistributor,
};

const PARTICIPANT_ENDPOINT: EndpointId = EndpointId(1);

#[derive(Parser)]
struct Args {
  /// Number of quanta each participant advances through.
  #[arg(long, default_value_t = 5)]
  steps: u32,

  /// Quantum length, in milliseconds.
  #[arg(long, default_value_t = 1)]
  period_ms: u64,
}

fn main() -> Result<()> {
  env_logger::init();
  let args = Args::parse();
  let period = Nanoseconds::new(args.period_ms * 1_000_000);

  let interrupted = Arc::new(AtomicBool::new(false));
  {
    let interrupted = Arc::clone(&interrupted);
    ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))?;
  }

  let tracker = Arc::new(SystemStateTracker::new(Logger::new("system_monitor")));
  let workflow = WorkflowConfigurationDistributor::new();
  workflow.set("operator", WorkflowConfiguration::new(vec!["A".into(), "B".into()]))?;
  tracker.set_required_participants(workflow.required_participant_names());

  let loopback = LoopbackBus::new();
  let bus: Arc<dyn MessageBus> = Arc::new(loopback.clone());

  let ids: std::collections::HashMap<String, ParticipantId> =
    [("A".to_string(), ParticipantId::new(1)), ("B".to_string(), ParticipantId::new(2))].into();
  let master_endpoint = EndpointAddress::sync_master(ParticipantId::new(0));

  let config = SimulationConfiguration::new(
    vec![
      ParticipantConfiguration::new("A", SyncType::TimeQuantum),
      ParticipantConfiguration::new("B", SyncType::TimeQuantum),
    ],
    TimeSyncConfiguration::new(period),
  );

  let master = SyncMaster::new(Logger::new("sync_master"), Arc::clone(&bus), master_endpoint, &config, &ids, &tracker);
  spawn_master_dispatcher(Arc::clone(&master), loopback.clone(), master_endpoint);

  let controllers: Vec<Arc<LifecycleController>> = ["A", "B"]
    .iter()
    .map(|name| Arc::new(LifecycleController::new(*name, Logger::new("lifecycle").scoped(name), Arc::clone(&tracker))))
    .collect();
  for controller in &controllers {
    controller.start()?;
  }
  for controller in &controllers {
    controller.handle_system_command(SystemCommandKind::Run)?;
  }
  println!("SystemState after Run: {:?}", tracker.system_state());

  let services: Vec<_> = ["A", "B"]
    .iter()
    .map(|name| {
      let participant_id = *ids.get(*name).unwrap();
      let own_endpoint = EndpointAddress::new(participant_id, PARTICIPANT_ENDPOINT);
      let inbox = loopback.register(own_endpoint);

      let service = TimeSyncService::new(
        Logger::new("time_sync").scoped(name),
        Arc::clone(&bus),
        own_endpoint,
        master_endpoint,
        SyncType::TimeQuantum,
        period,
      );
      let step_name = name.to_string();
      let steps_remaining = Arc::new(std::sync::atomic::AtomicU32::new(args.steps));
      let steps_for_handler = Arc::clone(&steps_remaining);
      let service_for_handler = Arc::clone(&service);
      service.set_simulation_task(Box::new(move |step| {
        println!("{step_name}: simulating [{:?}, {:?})", step.now, step.end_time());
        if steps_for_handler.fetch_sub(1, Ordering::SeqCst) == 1 {
          service_for_handler.cancel();
        }
        Ok(())
      }));
      service.start(inbox);
      service
    })
    .collect();

  let interrupt_watcher = {
    let services = services.clone();
    let interrupted = Arc::clone(&interrupted);
    thread::spawn(move || {
      while !interrupted.load(Ordering::SeqCst) {
        thread::sleep(std::time::Duration::from_millis(50));
      }
      for service in &services {
        service.cancel();
      }
    })
  };

  for service in &services {
    service.join().map_err(|failure| anyhow!("simulation step failed: {failure}"))?;
  }
  interrupted.store(true, Ordering::SeqCst);
  let _ = interrupt_watcher.join();

  for controller in &controllers {
    controller.handle_system_command(SystemCommandKind::Stop)?;
  }
  for controller in &controllers {
    controller.handle_system_command(SystemCommandKind::Shutdown)?;
  }
  for controller in &controllers {
    let final_state = controller.wait_for_lifecycle_to_complete();
    println!("{} reached {final_state:?}", controller_name(&controllers, controller));
  }
  println!("SyncMaster.wait_for_shutdown() -> {:?}", master.wait_for_shutdown());

  Ok(())
}

fn controller_name<'a>(controllers: &'a [Arc<LifecycleController>], target: &Arc<LifecycleController>) -> &'a str {
  if Arc::ptr_eq(&controllers[0], target) {
    "A"
  } else {
    "B"
  }
}

/// The master's own "middleware thread": drains its inbox and feeds
/// `QuantumRequest`/`TickDone` into the grant algorithm. Left unjoined,
/// same as the teacher's own demo binaries leave their receiver threads
/// running until the process exits.
fn spawn_master_dispatcher(master: Arc<SyncMaster>, bus: LoopbackBus, master_endpoint: EndpointAddress) {
  let inbox = bus.register(master_endpoint);
  thread::spawn(move || loop {
    let Some(envelope) = inbox.recv() else { return };
    match envelope.message {
      BusMessage::QuantumRequest(request) => {
        if let Err(err) = master.receive_quantum_request(envelope.from, request) {
          log::warn!("rejected QuantumRequest from {:?}: {err}", envelope.from);
        }
      }
      BusMessage::TickDone(tick_done) => master.receive_tick_done(tick_done),
      _ => {}
    }
  });
}
