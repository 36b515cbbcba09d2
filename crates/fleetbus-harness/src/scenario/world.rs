//! World state for scenario execution.
//!
//! The World owns the master, the simulated nodes and a single shared bus
//! queue. Frames in both directions go through the same FIFO, which mirrors
//! a real bus: one frame on the wire at a time, in arbitration order.

use std::collections::VecDeque;

use fleetbus_core::{
    CommandError, Environment, Master, MasterAction, MasterConfig, MasterEvent, MasterSnapshot,
};
use fleetbus_proto::{Frame, NodeId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use crate::{sim_env::SimEnv, sim_node::SimNode};

/// Upper bound on frames delivered by one pump, so a livelock fails the
/// scenario instead of hanging it.
const MAX_PUMP_FRAMES: usize = 100_000;

#[derive(Debug, Clone, Copy)]
enum BusFrame {
    ToMaster(Frame),
    ToNodes(Frame),
}

/// World state containing the master, the nodes and bus metrics.
pub struct World {
    env: SimEnv,
    master: Master,
    nodes: Vec<SimNode>,
    bus: VecDeque<BusFrame>,
    loss_rate: f64,
    rng: ChaCha8Rng,
    events: Vec<MasterEvent>,
    command_errors: Vec<CommandError>,
    frames_delivered: usize,
    frames_lost: usize,
}

impl World {
    /// World with the given master configuration and loss model.
    pub fn new(config: MasterConfig, nodes: Vec<SimNode>, loss_rate: f64, seed: u64) -> Self {
        Self {
            env: SimEnv::new(),
            master: Master::new(config),
            nodes,
            bus: VecDeque::new(),
            loss_rate: loss_rate.clamp(0.0, 1.0),
            rng: ChaCha8Rng::seed_from_u64(seed),
            events: Vec::new(),
            command_errors: Vec::new(),
            frames_delivered: 0,
            frames_lost: 0,
        }
    }

    /// The master under test.
    pub fn master(&self) -> &Master {
        &self.master
    }

    /// Mutable master, for issuing commands.
    pub fn master_mut(&mut self) -> &mut Master {
        &mut self.master
    }

    /// Virtual clock.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Snapshot at the current virtual time.
    pub fn snapshot(&self) -> MasterSnapshot {
        self.master.snapshot(self.env.now())
    }

    /// Simulated node by identity.
    pub fn node(&self, id: NodeId) -> Option<&SimNode> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    /// All simulated nodes.
    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    /// Every event the master emitted, in order.
    pub fn events(&self) -> &[MasterEvent] {
        &self.events
    }

    /// Commands the master refused.
    pub fn command_errors(&self) -> &[CommandError] {
        &self.command_errors
    }

    /// Frames that reached their destination.
    pub fn frames_delivered(&self) -> usize {
        self.frames_delivered
    }

    /// Frames dropped by the loss model.
    pub fn frames_lost(&self) -> usize {
        self.frames_lost
    }

    /// Whether every node finished its interview this cycle.
    pub fn all_interviewed(&self) -> bool {
        self.nodes.iter().all(|n| {
            self.master.node(n.id()).is_some_and(fleetbus_core::NodeRecord::interview_complete)
        })
    }

    /// Record the outcome of an operator command.
    pub fn command(&mut self, result: Result<Vec<MasterAction>, CommandError>) {
        match result {
            Ok(actions) => self.apply(actions),
            Err(e) => self.command_errors.push(e),
        }
    }

    /// Record commands refused as part of a batch.
    pub fn refused(&mut self, errors: impl IntoIterator<Item = CommandError>) {
        self.command_errors.extend(errors);
    }

    /// Run a processing pass without new traffic.
    pub fn tick(&mut self) {
        let actions = self.master.tick(self.env.now());
        self.apply(actions);
    }

    /// Deliver frames until the bus is quiet.
    pub fn pump(&mut self) -> Result<(), String> {
        for _ in 0..MAX_PUMP_FRAMES {
            self.tick();
            let Some(next) = self.bus.pop_front() else {
                return Ok(());
            };
            self.frames_delivered += 1;

            match next {
                BusFrame::ToMaster(frame) => {
                    if let Ok(actions) = self.master.handle_frame(&frame, self.env.now()) {
                        self.apply(actions);
                    }
                },
                BusFrame::ToNodes(frame) => {
                    let ids = self.master.config().ids.clone();
                    let replies: Vec<Frame> =
                        self.nodes.iter_mut().flat_map(|n| n.handle(&ids, &frame)).collect();
                    for reply in replies {
                        self.put(BusFrame::ToMaster(reply));
                    }
                },
            }
        }
        Err(format!("bus still busy after {MAX_PUMP_FRAMES} frames"))
    }

    fn apply(&mut self, actions: Vec<MasterAction>) {
        for action in actions {
            match action {
                MasterAction::SendFrame(frame) => self.put(BusFrame::ToNodes(frame)),
                MasterAction::Emit(event) => self.events.push(event),
            }
        }
    }

    fn put(&mut self, frame: BusFrame) {
        if self.loss_rate > 0.0 && self.rng.gen_bool(self.loss_rate) {
            self.frames_lost += 1;
            trace!(?frame, "frame lost");
            return;
        }
        self.bus.push_back(frame);
    }
}
