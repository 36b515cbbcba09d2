//! Reader task and processing loop.

use std::{
    future::Future,
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use fleetbus_core::{BusTransport, Environment, Master, MasterAction, MasterConfig, MasterEvent};
use fleetbus_proto::Frame;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, trace, warn};

use crate::{config::RuntimeConfig, error::RuntimeError, handle::Handle};

/// State shared by the processing loop and every [`Handle`].
pub(crate) struct Shared<T, E> {
    master: Mutex<Master>,
    pub(crate) transport: Arc<T>,
    pub(crate) env: E,
    pub(crate) events: broadcast::Sender<MasterEvent>,
}

impl<T: BusTransport, E: Environment> Shared<T, E> {
    /// Lock the master.
    ///
    /// A panic while holding the lock cannot leave a record half-written in a
    /// way later frames depend on, so poisoning is ignored.
    pub(crate) fn master(&self) -> MutexGuard<'_, Master> {
        self.master.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute master actions in order.
    ///
    /// Every send is attempted; failures are counted and logged, and the
    /// first one is returned. The transition that produced a frame is never
    /// undone.
    pub(crate) async fn execute(&self, actions: Vec<MasterAction>) -> io::Result<()> {
        let mut first_error = None;

        for action in actions {
            match action {
                MasterAction::SendFrame(frame) => {
                    if let Err(e) = self.transport.send(frame).await {
                        warn!(?frame, error = %e, "bus send failed");
                        self.master().record_send_failure();
                        first_error.get_or_insert(e);
                    }
                },
                MasterAction::Emit(event) => {
                    trace!(?event, "event");
                    if self.events.send(event).is_err() {
                        trace!("no event subscribers");
                    }
                },
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Drives a [`Master`] over a bus transport.
///
/// Construct, grab a [`Handle`] for operator commands, then [`run`](Self::run)
/// until shutdown.
pub struct Runtime<T, E> {
    shared: Arc<Shared<T, E>>,
    config: RuntimeConfig,
}

impl<T: BusTransport, E: Environment> Runtime<T, E> {
    /// Create a runtime with an empty registry.
    pub fn new(master: MasterConfig, transport: T, env: E, config: RuntimeConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let shared = Shared {
            master: Mutex::new(Master::new(master)),
            transport: Arc::new(transport),
            env,
            events,
        };
        Self { shared: Arc::new(shared), config }
    }

    /// Command handle. Remains usable after the runtime stops.
    pub fn handle(&self) -> Handle<T, E> {
        Handle::new(Arc::clone(&self.shared))
    }

    /// Run until `shutdown` resolves or the bus closes.
    ///
    /// Returns an error only if reading from the bus fails.
    pub async fn run<S>(self, shutdown: S) -> Result<(), RuntimeError>
    where
        S: Future<Output = ()> + Send,
    {
        let (tx, mut rx) = mpsc::channel(self.config.fifo_capacity.max(1));
        let reader = spawn_reader(Arc::clone(&self.shared.transport), tx);
        tokio::pin!(shutdown);

        info!(
            fifo = self.config.fifo_capacity,
            sweep = ?self.config.sweep_interval,
            "runtime started"
        );

        loop {
            let now = self.shared.env.now();
            let actions = self.shared.master().tick(now);
            // Send failures are already logged and counted
            let _ = self.shared.execute(actions).await;

            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!("runtime shutting down");
                    reader.abort();
                    return Ok(());
                },

                frame = rx.recv() => match frame {
                    Some(frame) => self.process(frame).await,
                    None => break,
                },

                () = self.shared.env.sleep(self.config.sweep_interval) => {},
            }
        }

        match reader.await {
            Ok(Ok(())) => {
                info!("bus closed, runtime stopped");
                Ok(())
            },
            Ok(Err(e)) => Err(RuntimeError::Receive(e)),
            Err(e) => Err(RuntimeError::Reader(e.to_string())),
        }
    }

    async fn process(&self, frame: Frame) {
        let now = self.shared.env.now();
        let result = self.shared.master().handle_frame(&frame, now);
        match result {
            Ok(actions) => {
                let _ = self.shared.execute(actions).await;
            },
            Err(e) => debug!(?frame, error = %e, "frame dropped"),
        }
    }
}

/// Pump the transport into the FIFO.
///
/// Exits cleanly when the bus closes or the processing loop goes away.
fn spawn_reader<T: BusTransport>(
    transport: Arc<T>,
    tx: mpsc::Sender<Frame>,
) -> JoinHandle<io::Result<()>> {
    tokio::spawn(async move {
        loop {
            let Some(frame) = transport.recv().await? else {
                debug!("bus closed");
                return Ok(());
            };
            if tx.send(frame).await.is_err() {
                return Ok(());
            }
        }
    })
}
