//! Async runtime for the fleetbus master
//!
//! Executes the actions returned by the pure [`fleetbus_core::Master`] against
//! a real [`BusTransport`](fleetbus_core::BusTransport).
//!
//! # Architecture
//!
//! ```text
//!   transport.recv() ──> reader task ──> bounded FIFO ──> processing loop
//!                                                             │
//!   Handle (operator commands) ──┐                            │ tick + handle_frame
//!                                ▼                            ▼
//!                          Arc<Mutex<Master>> ──> actions ──> transport.send()
//!                                                        └──> event broadcast
//! ```
//!
//! The reader never touches the master, so a slow command or sweep can never
//! stall bus reads. Frames are processed strictly in arrival order.
//!
//! # Components
//!
//! - [`Runtime`]: reader task plus processing loop
//! - [`Handle`]: cloneable command surface and snapshot access
//! - [`SystemEnv`]: tokio-backed [`Environment`](fleetbus_core::Environment)
//! - [`RuntimeConfig`]: FIFO and sweep tuning

mod config;
mod error;
mod handle;
mod runtime;
mod system_env;

pub use config::RuntimeConfig;
pub use error::RuntimeError;
pub use handle::Handle;
pub use runtime::Runtime;
pub use system_env::SystemEnv;
