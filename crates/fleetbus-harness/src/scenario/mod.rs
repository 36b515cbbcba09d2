//! Scenario testing framework with the Oracle Pattern.
//!
//! A scenario declares nodes, fault settings and a sequence of operator
//! steps, then must supply an oracle before it can run. The oracle checks the
//! final [`World`] and returns `Err` with a description of the violated
//! property.
//!
//! Scenarios are synchronous and deterministic: the master is driven directly
//! through its sans-IO interface, time is virtual, and frame loss comes from
//! a seeded RNG.

mod builder;
mod world;

pub use builder::{RunnableScenario, Scenario, Step};
pub use world::World;

/// Oracle function verifying the final world state.
pub type OracleFn = Box<dyn Fn(&World) -> Result<(), String>>;
