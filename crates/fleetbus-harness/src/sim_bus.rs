//! In-memory bus with seeded fault injection.
//!
//! [`SimBus`] is the master's end and implements
//! [`BusTransport`]; [`BusPeer`] is the fleet's end. Frames travel over
//! unbounded channels so neither side can deadlock the other.

use std::{
    io,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use fleetbus_core::BusTransport;
use fleetbus_proto::Frame;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tracing::trace;

/// Fault knobs shared by both ends of a bus.
#[derive(Debug)]
pub struct BusFaults {
    loss_rate: f64,
    rng: Mutex<ChaCha8Rng>,
    fail_sends: AtomicBool,
    dropped: AtomicU64,
}

impl BusFaults {
    fn new(seed: u64, loss_rate: f64) -> Self {
        Self {
            loss_rate: loss_rate.clamp(0.0, 1.0),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            fail_sends: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Make the master's sends fail with `BrokenPipe` until cleared.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Frames lost in either direction so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    fn lose(&self, frame: &Frame) -> bool {
        if self.loss_rate <= 0.0 {
            return false;
        }
        let lost = self.rng.lock().unwrap_or_else(PoisonError::into_inner).gen_bool(self.loss_rate);
        if lost {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            trace!(?frame, "frame lost");
        }
        lost
    }
}

/// Create a connected bus.
///
/// `loss_rate` is the probability each frame is dropped, drawn from a
/// ChaCha8 stream seeded with `seed`.
pub fn sim_bus(seed: u64, loss_rate: f64) -> (SimBus, BusPeer) {
    let (to_fleet, from_master) = mpsc::unbounded_channel();
    let (to_master, from_fleet) = mpsc::unbounded_channel();
    let faults = Arc::new(BusFaults::new(seed, loss_rate));

    let bus = SimBus {
        to_fleet,
        from_fleet: tokio::sync::Mutex::new(from_fleet),
        faults: Arc::clone(&faults),
    };
    let peer = BusPeer { to_master, from_master, faults };
    (bus, peer)
}

/// Master side of a simulated bus.
#[derive(Debug)]
pub struct SimBus {
    to_fleet: mpsc::UnboundedSender<Frame>,
    from_fleet: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
    faults: Arc<BusFaults>,
}

impl SimBus {
    /// Lossless bus.
    pub fn pair() -> (Self, BusPeer) {
        sim_bus(0, 0.0)
    }

    /// Fault controls.
    pub fn faults(&self) -> Arc<BusFaults> {
        Arc::clone(&self.faults)
    }
}

#[async_trait]
impl BusTransport for SimBus {
    async fn send(&self, frame: Frame) -> io::Result<()> {
        if self.faults.fail_sends.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated send failure"));
        }
        if self.faults.lose(&frame) {
            return Ok(());
        }
        // A fleet that has gone away behaves like an empty bus
        let _ = self.to_fleet.send(frame);
        Ok(())
    }

    async fn recv(&self) -> io::Result<Option<Frame>> {
        Ok(self.from_fleet.lock().await.recv().await)
    }
}

/// Fleet side of a simulated bus.
#[derive(Debug)]
pub struct BusPeer {
    to_master: mpsc::UnboundedSender<Frame>,
    from_master: mpsc::UnboundedReceiver<Frame>,
    faults: Arc<BusFaults>,
}

impl BusPeer {
    /// Put a frame on the bus towards the master, subject to loss.
    pub fn send(&self, frame: Frame) {
        if !self.faults.lose(&frame) {
            let _ = self.to_master.send(frame);
        }
    }

    /// Next frame from the master; `None` once the master side is dropped.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_master.recv().await
    }

    /// Fault controls.
    pub fn faults(&self) -> Arc<BusFaults> {
        Arc::clone(&self.faults)
    }
}
