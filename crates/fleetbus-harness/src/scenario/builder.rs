//! Scenario builder API.
//!
//! Provides a declarative API for constructing scenario tests that enforce
//! the Oracle Pattern.

use std::time::Duration;

use fleetbus_core::{Environment, MasterConfig};
use fleetbus_proto::NodeId;

use crate::{
    scenario::{OracleFn, World},
    sim_node::SimNode,
};

/// One operator action or clock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Broadcast discovery
    Discover,
    /// Commit the reconstructed configuration
    Commit(NodeId),
    /// Commit every node that qualifies; refusals land in the world's errors
    CommitAll,
    /// Erase persisted configuration
    Erase(NodeId),
    /// Reboot without changing configuration
    Reboot(NodeId),
    /// Move a submodule to a new hardware type and pin
    Reassign {
        /// Target node
        node: NodeId,
        /// Slot index
        index: u8,
        /// New hardware type id
        type_id: u16,
        /// New pin
        pin: u8,
    },
    /// Advance virtual time, then run a processing pass
    Advance(Duration),
}

/// Scenario builder.
///
/// Construct a scenario by adding nodes, fault settings and steps. Must call
/// `.oracle()` to get a [`RunnableScenario`] that can be executed; a bare
/// scenario has no `run`:
///
/// ```compile_fail
/// use fleetbus_harness::scenario::{Scenario, Step};
///
/// let _ = Scenario::new("unchecked").step(Step::Discover).run();
/// ```
pub struct Scenario {
    name: String,
    config: MasterConfig,
    nodes: Vec<SimNode>,
    steps: Vec<Step>,
    loss_rate: f64,
    seed: u64,
}

impl Scenario {
    /// Create a new scenario with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: MasterConfig::default(),
            nodes: Vec::new(),
            steps: Vec::new(),
            loss_rate: 0.0,
            seed: 0,
        }
    }

    /// Use a custom master configuration.
    pub fn config(mut self, config: MasterConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a node to the bus.
    pub fn node(mut self, node: SimNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Drop each frame with probability `rate`, seeded for reproducibility.
    pub fn loss(mut self, rate: f64, seed: u64) -> Self {
        self.loss_rate = rate;
        self.seed = seed;
        self
    }

    /// Append a step. The bus is pumped until quiet after every step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute every step, then run the oracle against the final world.
    pub fn run(self) -> Result<(), String> {
        let Scenario { name, config, nodes, steps, loss_rate, seed } = self.scenario;
        let mut world = World::new(config, nodes, loss_rate, seed);

        for (i, step) in steps.into_iter().enumerate() {
            if let Step::Advance(by) = step {
                world.env().advance(by);
            }

            let now = world.env().now();
            let master = world.master_mut();
            let result = match step {
                Step::Discover => master.trigger_discovery(),
                Step::Commit(node) => master.commit(node, now),
                Step::CommitAll => {
                    let (actions, refused) = master.commit_all(now);
                    world.refused(refused);
                    Ok(actions)
                },
                Step::Erase(node) => master.erase(node, now),
                Step::Reboot(node) => master.reboot(node),
                Step::Reassign { node, index, type_id, pin } => {
                    master.reassign_submodule(node, index, type_id, pin)
                },
                Step::Advance(_) => Ok(Vec::new()),
            };
            world.command(result);
            world.pump().map_err(|e| format!("Scenario '{name}': step {i} ({step:?}): {e}"))?;
        }

        (self.oracle)(&world).map_err(|e| format!("Scenario '{name}': {e}"))
    }
}
