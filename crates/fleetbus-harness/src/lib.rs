//! Deterministic simulation harness for the fleetbus protocol.
//!
//! In-memory implementations of the Environment and BusTransport traits, a
//! firmware model that speaks the node side of the protocol, and a scenario
//! framework for reproducible tests under frame loss.
//!
//! # Components
//!
//! - [`SimEnv`]: virtual clock
//! - [`SimBus`] / [`BusPeer`]: two ends of an in-memory bus with seeded loss
//! - [`SimNode`]: node firmware model
//! - [`SimFleet`]: async pump connecting nodes to a [`BusPeer`]
//! - [`scenario`]: synchronous scenarios with mandatory oracles

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod scenario;
pub mod sim_bus;
pub mod sim_env;
pub mod sim_fleet;
pub mod sim_node;

pub use sim_bus::{BusFaults, BusPeer, SimBus, sim_bus};
pub use sim_env::SimEnv;
pub use sim_fleet::SimFleet;
pub use sim_node::{DEFAULT_IDENTITY_FRAME_ID, SimNode, SimSubmodule, WriteBehavior};
