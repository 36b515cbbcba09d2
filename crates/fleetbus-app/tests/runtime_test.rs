//! Runtime integration tests.
//!
//! Drive the real runtime against a simulated fleet on an in-memory bus.
//! Most tests pause Tokio's clock so sweeps and timeouts run in virtual time;
//! the rest drive the runtime from a hand-advanced [`SimEnv`].

use std::time::Duration;

use fleetbus_app::{Handle, Runtime, RuntimeConfig, RuntimeError, SystemEnv};
use fleetbus_core::{ChecksumStatus, CommandError, MasterConfig, MasterEvent, ProvisioningState};
use fleetbus_harness::{SimBus, SimEnv, SimFleet, SimNode, WriteBehavior};
use fleetbus_proto::{MessageIds, NodeId, Telemetry};
use tokio::{
    sync::{broadcast, oneshot},
    task::JoinHandle,
};

const NODE: NodeId = NodeId::new(0x25A5_6D84);

fn node() -> SimNode {
    SimNode::new(NODE)
        .with_submodule(0x701, [0x00, 0x01, 0x07], Telemetry { frame_id: 0x210, dlc: 8, persist: false })
        .with_submodule(0x705, [0x0A, 0x00, 0x00], Telemetry { frame_id: 0x211, dlc: 2, persist: true })
}

struct Running {
    handle: Handle<SimBus, SystemEnv>,
    events: broadcast::Receiver<MasterEvent>,
    fleet: SimFleet,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), RuntimeError>>,
}

impl Running {
    fn start(nodes: Vec<SimNode>) -> Self {
        let fleet = SimFleet::new(MessageIds::default(), nodes);
        let (bus, peer) = SimBus::pair();
        fleet.spawn(peer);

        let runtime =
            Runtime::new(MasterConfig::default(), bus, SystemEnv::new(), RuntimeConfig::default());
        let handle = runtime.handle();
        let events = handle.subscribe();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(runtime.run(async move {
            let _ = stopped.await;
        }));

        Self { handle, events, fleet, stop, task }
    }

    async fn next_matching(&mut self, pred: impl Fn(&MasterEvent) -> bool) -> MasterEvent {
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                let event = self.events.recv().await.expect("event channel closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    async fn interviewed(&mut self) -> ChecksumStatus {
        match self.next_matching(|e| matches!(e, MasterEvent::InterviewComplete { .. })).await {
            MasterEvent::InterviewComplete { status, .. } => status,
            other => unreachable!("{other:?}"),
        }
    }

    async fn provisioning(&mut self) -> ProvisioningState {
        match self.next_matching(|e| matches!(e, MasterEvent::ProvisioningChanged { .. })).await {
            MasterEvent::ProvisioningChanged { state, .. } => state,
            other => unreachable!("{other:?}"),
        }
    }

    async fn shutdown(self) {
        self.stop.send(()).unwrap();
        self.task.await.unwrap().unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn discovery_commit_and_rediscovery() {
    let mut rt = Running::start(vec![node()]);

    rt.handle.trigger_discovery().await.unwrap();
    assert_eq!(rt.interviewed().await, ChecksumStatus::NeedsConfig);

    rt.handle.commit(NODE).await.unwrap();
    assert_eq!(rt.provisioning().await, ProvisioningState::Writing);
    assert_eq!(rt.provisioning().await, ProvisioningState::Success);

    // Reboot follows the success reply
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(rt.fleet.node(NODE).unwrap().reboots(), 1);

    rt.handle.trigger_discovery().await.unwrap();
    assert_eq!(rt.interviewed().await, ChecksumStatus::Match);

    let snapshot = rt.handle.snapshot();
    let record = snapshot.node(NODE).unwrap();
    assert_eq!(record.submodules.len(), 2);
    assert_eq!(record.provisioning, ProvisioningState::Success);
    assert_eq!(rt.handle.stats().discovery_cycles, 2);

    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn silent_write_times_out_on_sweep() {
    let mut rt = Running::start(vec![node().with_write_behavior(WriteBehavior::Silent)]);

    rt.handle.trigger_discovery().await.unwrap();
    rt.interviewed().await;

    rt.handle.commit(NODE).await.unwrap();
    assert_eq!(rt.provisioning().await, ProvisioningState::Writing);

    // No bus traffic; only the periodic sweep can notice
    assert_eq!(rt.provisioning().await, ProvisioningState::TimedOut);
    assert_eq!(rt.handle.stats().provisioning_timeouts, 1);

    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn send_failure_keeps_transition_and_is_counted() {
    let fleet = SimFleet::new(MessageIds::default(), vec![node()]);
    let (bus, peer) = SimBus::pair();
    let faults = bus.faults();
    fleet.spawn(peer);

    let runtime =
        Runtime::new(MasterConfig::default(), bus, SystemEnv::new(), RuntimeConfig::default());
    let handle = runtime.handle();
    let mut events = handle.subscribe();
    let task = tokio::spawn(runtime.run(std::future::pending()));

    handle.trigger_discovery().await.unwrap();
    loop {
        if let MasterEvent::InterviewComplete { .. } = events.recv().await.unwrap() {
            break;
        }
    }

    faults.set_fail_sends(true);
    let err = handle.erase(NODE).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Send(_)));
    assert_eq!(handle.stats().send_failures, 1);

    // The erase still happened on the master side
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.node(NODE).unwrap().provisioning, ProvisioningState::Erasing);

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn refused_command_sends_nothing() {
    let rt = Running::start(vec![node()]);

    let err = rt.handle.reboot(NODE).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Command(CommandError::UnknownNode(n)) if n == NODE));
    assert_eq!(rt.fleet.node(NODE).unwrap().frames_sent(), 0);

    let err = rt.handle.raw_command(NODE, 0x123, &[1, 2, 3, 4, 5]).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Command(_)));

    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn run_returns_when_bus_closes() {
    let (bus, peer) = SimBus::pair();
    drop(peer);

    let runtime =
        Runtime::new(MasterConfig::default(), bus, SystemEnv::new(), RuntimeConfig::default());
    runtime.run(std::future::pending()).await.unwrap();
}

async fn recv_matching(
    events: &mut broadcast::Receiver<MasterEvent>,
    pred: impl Fn(&MasterEvent) -> bool,
) -> MasterEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn idle_runtime_leaves_virtual_clock_alone() {
    let fleet =
        SimFleet::new(MessageIds::default(), vec![node().with_write_behavior(WriteBehavior::Silent)]);
    let (bus, peer) = SimBus::pair();
    fleet.spawn(peer);

    let env = SimEnv::new();
    let runtime =
        Runtime::new(MasterConfig::default(), bus, env.clone(), RuntimeConfig::default());
    let handle = runtime.handle();
    let mut events = handle.subscribe();
    let task = tokio::spawn(runtime.run(std::future::pending()));

    handle.trigger_discovery().await.unwrap();
    recv_matching(&mut events, |e| matches!(e, MasterEvent::InterviewComplete { .. })).await;
    handle.commit(NODE).await.unwrap();
    recv_matching(&mut events, |e| {
        matches!(e, MasterEvent::ProvisioningChanged { state: ProvisioningState::Writing, .. })
    })
    .await;

    // Many idle loop passes in real time; none of them may move the clock
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(env.elapsed(), Duration::ZERO);
    assert_eq!(handle.snapshot().node(NODE).unwrap().provisioning, ProvisioningState::Writing);
    assert_eq!(handle.stats().provisioning_timeouts, 0);

    env.advance(Duration::from_secs(6));
    recv_matching(&mut events, |e| {
        matches!(e, MasterEvent::ProvisioningChanged { state: ProvisioningState::TimedOut, .. })
    })
    .await;
    assert_eq!(env.elapsed(), Duration::from_secs(6));
    assert_eq!(handle.stats().provisioning_timeouts, 1);

    task.abort();
}
