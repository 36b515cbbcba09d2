//! Runs one CLI command against a live runtime.

use std::{collections::BTreeMap, io::Write, time::Duration};

use fleetbus_app::{Handle, Runtime, RuntimeConfig, SystemEnv};
use fleetbus_core::{BusTransport, MasterConfig, MasterEvent, NodeSnapshot, ProvisioningState};
use fleetbus_proto::NodeId;
use tokio::sync::{
    broadcast::error::{RecvError, TryRecvError},
    oneshot,
};
use tracing::{info, warn};

use crate::{cli::Command, error::CliError, report};

/// Grace period on top of the provisioning timeout before giving up.
const OUTCOME_GRACE: Duration = Duration::from_secs(1);

pub struct Session<T> {
    handle: Handle<T, SystemEnv>,
    settle: Duration,
    outcome_wait: Duration,
}

/// Start a runtime on `transport`, run `command`, then shut the runtime down.
pub async fn run<T: BusTransport>(
    transport: T,
    config: MasterConfig,
    settle: Duration,
    command: &Command,
) -> Result<(), CliError> {
    let outcome_wait = config.provisioning.timeout + OUTCOME_GRACE;
    let runtime = Runtime::new(config, transport, SystemEnv::new(), RuntimeConfig::default());
    let session = Session { handle: runtime.handle(), settle, outcome_wait };

    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(runtime.run(async move {
        let _ = stopped.await;
    }));

    let result = session.execute(command).await;

    let _ = stop.send(());
    match task.await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => warn!(error = %e, "runtime stopped with an error"),
        Err(e) => warn!(error = %e, "runtime task failed"),
    }
    result
}

impl<T: BusTransport> Session<T> {
    async fn execute(&self, command: &Command) -> Result<(), CliError> {
        if let Command::Monitor { interval_secs } = command {
            return self.monitor(Duration::from_secs(*interval_secs)).await;
        }

        self.discover().await?;
        if let Command::Commit { all: true, .. } = command {
            return self.commit_all().await;
        }
        let Some(node) = command.target() else {
            if let Command::Snapshot { out: Some(path) } = command {
                std::fs::write(path, self.handle.snapshot().to_cbor()?)?;
                info!(path = %path.display(), "snapshot written");
            }
            return self.print_snapshot();
        };

        if !self.handle.snapshot().node(node).is_some_and(NodeSnapshot::interview_complete) {
            return Err(CliError::NotInterviewed(node));
        }

        let mut events = self.handle.subscribe();
        match command {
            Command::Commit { .. } => {
                self.handle.commit(node).await?;
                self.await_outcome(&mut events, node).await
            },
            Command::Erase { .. } => Ok(self.handle.erase(node).await?),
            Command::Reboot { .. } => Ok(self.handle.reboot(node).await?),
            Command::Raw { id, data, .. } => {
                let extra = hex::decode(data)?;
                Ok(self.handle.raw_command(node, *id, &extra).await?)
            },
            Command::Reassign { index, type_id, pin, .. } => {
                Ok(self.handle.reassign_submodule(node, *index, *type_id, *pin).await?)
            },
            Command::Monitor { .. } | Command::Snapshot { .. } => Ok(()),
        }
    }

    /// Broadcast discovery and give the fleet `settle` to answer.
    async fn discover(&self) -> Result<(), CliError> {
        self.handle.trigger_discovery().await?;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    /// Commit every qualifying node and wait for each outcome.
    async fn commit_all(&self) -> Result<(), CliError> {
        let mut events = self.handle.subscribe();
        let refused = self.handle.commit_all().await?;
        for refusal in &refused {
            self.write_line(&format!("skipped: {refusal}"))?;
        }

        // Writing transitions were broadcast before commit_all returned; a
        // fast reply may already have been handled as well.
        let mut outcomes = BTreeMap::new();
        loop {
            match events.try_recv() {
                Ok(MasterEvent::ProvisioningChanged { node, state }) => {
                    record_outcome(&mut outcomes, node, state);
                },
                Ok(_) | Err(TryRecvError::Lagged(_)) => {},
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        let wait = async {
            while outcomes.values().any(|s| *s == ProvisioningState::Writing) {
                match events.recv().await {
                    Ok(MasterEvent::ProvisioningChanged { node, state }) => {
                        if outcomes.contains_key(&node) {
                            record_outcome(&mut outcomes, node, state);
                        }
                    },
                    Ok(_) | Err(RecvError::Lagged(_)) => {},
                    Err(RecvError::Closed) => return,
                }
            }
        };
        let _ = tokio::time::timeout(self.outcome_wait, wait).await;

        info!(committed = outcomes.len(), skipped = refused.len(), "batch commit finished");
        let mut failed = None;
        for (node, state) in outcomes {
            self.write_line(&format!("{node}: provisioning {state}"))?;
            if state != ProvisioningState::Success && failed.is_none() {
                failed = Some(CliError::Provisioning { node, state });
            }
        }
        failed.map_or(Ok(()), Err)
    }

    /// Wait for a commit to leave `Writing`.
    async fn await_outcome(
        &self,
        events: &mut tokio::sync::broadcast::Receiver<MasterEvent>,
        node: NodeId,
    ) -> Result<(), CliError> {
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(MasterEvent::ProvisioningChanged { node: n, state })
                        if n == node && state != ProvisioningState::Writing =>
                    {
                        return state;
                    },
                    Ok(_) | Err(RecvError::Lagged(_)) => {},
                    Err(RecvError::Closed) => return ProvisioningState::Writing,
                }
            }
        };
        let state =
            tokio::time::timeout(self.outcome_wait, wait).await.unwrap_or(ProvisioningState::Writing);

        self.write_line(&format!("{node}: provisioning {state}"))?;
        if state == ProvisioningState::Success {
            Ok(())
        } else {
            Err(CliError::Provisioning { node, state })
        }
    }

    async fn monitor(&self, interval: Duration) -> Result<(), CliError> {
        let mut events = self.handle.subscribe();
        let mut ticker = tokio::time::interval(interval);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                result = &mut ctrl_c => {
                    result?;
                    info!("interrupted");
                    return self.print_snapshot();
                },
                _ = ticker.tick() => self.handle.trigger_discovery().await?,
                event = events.recv() => match event {
                    Ok(event) => report::write_event(&mut std::io::stdout().lock(), &event)?,
                    Err(RecvError::Lagged(missed)) => warn!(missed, "event stream lagged"),
                    Err(RecvError::Closed) => return Ok(()),
                },
            }
        }
    }

    fn print_snapshot(&self) -> Result<(), CliError> {
        report::write_snapshot(&mut std::io::stdout().lock(), &self.handle.snapshot())?;
        Ok(())
    }

    fn write_line(&self, line: &str) -> Result<(), CliError> {
        writeln!(std::io::stdout().lock(), "{line}")?;
        Ok(())
    }
}

/// Keep the first terminal state seen for `node`; `Writing` never overwrites
/// one.
fn record_outcome(
    outcomes: &mut BTreeMap<NodeId, ProvisioningState>,
    node: NodeId,
    state: ProvisioningState,
) {
    let entry = outcomes.entry(node).or_insert(state);
    if *entry == ProvisioningState::Writing {
        *entry = state;
    }
}
