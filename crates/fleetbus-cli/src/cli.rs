//! Command-line arguments.

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use fleetbus_core::{MasterConfig, ProvisioningConfig};
use fleetbus_proto::{MessageIds, NodeId};

use crate::error::CliError;

#[derive(Debug, Parser)]
#[command(name = "fleetbus")]
#[command(about = "Discover, interview and provision fleetbus nodes")]
#[command(version)]
pub struct Cli {
    /// CAN interface to attach to (needs the socketcan feature)
    #[arg(long, conflicts_with = "simulate")]
    pub iface: Option<String>,

    /// Run against N simulated nodes instead of a real bus
    #[arg(long, value_name = "N")]
    pub simulate: Option<usize>,

    /// Seed for the simulated bus
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Frame loss probability on the simulated bus
    #[arg(long, default_value_t = 0.0)]
    pub loss: f64,

    /// Log filter, overrides RUST_LOG (e.g. "info", "fleetbus_core=debug")
    #[arg(long)]
    pub log_level: Option<String>,

    /// How long a configuration write may go unanswered
    #[arg(long, default_value_t = 5000)]
    pub provisioning_timeout_ms: u64,

    /// How long to wait for interviews after a discovery broadcast
    #[arg(long, default_value_t = 2000)]
    pub settle_ms: u64,

    #[command(flatten)]
    pub ids: IdOverrides,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Master configuration from the flags.
    pub fn master_config(&self) -> Result<MasterConfig, CliError> {
        let ids = self.ids.apply(MessageIds::default());
        ids.validate()?;

        Ok(MasterConfig {
            ids,
            provisioning: ProvisioningConfig {
                timeout: Duration::from_millis(self.provisioning_timeout_ms),
                ..ProvisioningConfig::default()
            },
        })
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Arbitration id overrides, in hex.
#[derive(Debug, Args)]
pub struct IdOverrides {
    #[arg(long, value_parser = parse_hex_id, value_name = "ID")]
    pub ack_id: Option<u16>,
    #[arg(long, value_parser = parse_hex_id, value_name = "ID")]
    pub discovery_id: Option<u16>,
    #[arg(long, value_parser = parse_hex_id, value_name = "ID")]
    pub erase_id: Option<u16>,
    #[arg(long, value_parser = parse_hex_id, value_name = "ID")]
    pub reboot_id: Option<u16>,
    #[arg(long, value_parser = parse_hex_id, value_name = "ID")]
    pub write_config_id: Option<u16>,
    #[arg(long, value_parser = parse_hex_id, value_name = "ID")]
    pub write_ack_id: Option<u16>,
    #[arg(long, value_parser = parse_hex_id, value_name = "ID")]
    pub write_failed_id: Option<u16>,
    /// First id of the interview band
    #[arg(long, value_parser = parse_hex_id, value_name = "ID")]
    pub interview_start: Option<u16>,
    /// Last id of the interview band (inclusive)
    #[arg(long, value_parser = parse_hex_id, value_name = "ID")]
    pub interview_end: Option<u16>,
}

impl IdOverrides {
    fn apply(&self, mut ids: MessageIds) -> MessageIds {
        let singles = [
            (self.ack_id, &mut ids.ack),
            (self.discovery_id, &mut ids.discovery),
            (self.erase_id, &mut ids.erase_config),
            (self.reboot_id, &mut ids.reboot),
            (self.write_config_id, &mut ids.write_config),
            (self.write_ack_id, &mut ids.write_config_ack),
            (self.write_failed_id, &mut ids.write_config_failed),
        ];
        for (value, slot) in singles {
            if let Some(value) = value {
                *slot = value;
            }
        }

        let start = self.interview_start.unwrap_or(*ids.interview.start());
        let end = self.interview_end.unwrap_or(*ids.interview.end());
        ids.interview = start..=end;
        ids
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rediscover the fleet periodically and print every event
    Monitor {
        /// Seconds between discovery broadcasts
        #[arg(long, default_value_t = 10)]
        interval_secs: u64,
    },

    /// Discover once and print the fleet
    Snapshot {
        /// Also write the snapshot as CBOR
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Persist a node's reconstructed configuration
    Commit {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        node: Option<NodeId>,
        /// Commit every interviewed node whose checksum needs it
        #[arg(long)]
        all: bool,
    },

    /// Wipe a node's persisted configuration
    Erase { node: NodeId },

    /// Restart a node
    Reboot { node: NodeId },

    /// Send the node identity plus up to 4 bytes on an arbitrary id
    Raw {
        node: NodeId,
        #[arg(value_parser = parse_hex_id)]
        id: u16,
        /// Extra payload bytes in hex
        #[arg(default_value = "")]
        data: String,
    },

    /// Move a submodule to another hardware type and pin
    Reassign {
        node: NodeId,
        #[arg(long)]
        index: u8,
        #[arg(long, value_parser = parse_hex_id)]
        type_id: u16,
        #[arg(long)]
        pin: u8,
    },
}

impl Command {
    /// Node the command targets, if any.
    pub fn target(&self) -> Option<NodeId> {
        match self {
            Self::Monitor { .. } | Self::Snapshot { .. } => None,
            Self::Commit { node, .. } => *node,
            Self::Erase { node }
            | Self::Reboot { node }
            | Self::Raw { node, .. }
            | Self::Reassign { node, .. } => Some(*node),
        }
    }
}

/// Parse an arbitration id written in hex, with or without `0x`.
pub fn parse_hex_id(s: &str) -> Result<u16, String> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex id {s:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn hex_ids_accept_optional_prefix() {
        assert_eq!(parse_hex_id("0x400"), Ok(0x400));
        assert_eq!(parse_hex_id("7FF"), Ok(0x7FF));
        assert!(parse_hex_id("0xZZ").is_err());
    }

    #[test]
    fn overrides_replace_defaults() {
        let cli = Cli::try_parse_from([
            "fleetbus",
            "--simulate",
            "3",
            "--ack-id",
            "0x410",
            "--interview-start",
            "0x780",
            "commit",
            "25A56D84",
        ])
        .unwrap();

        let config = cli.master_config().unwrap();
        assert_eq!(config.ids.ack, 0x410);
        assert_eq!(config.ids.discovery, MessageIds::default().discovery);
        assert_eq!(config.ids.interview, 0x780..=0x7FF);
        assert_eq!(cli.command.target(), Some(NodeId::new(0x25A5_6D84)));
    }

    #[test]
    fn commit_takes_a_node_or_all() {
        let all = Cli::try_parse_from(["fleetbus", "commit", "--all"]).unwrap();
        assert!(matches!(all.command, Command::Commit { node: None, all: true }));
        assert_eq!(all.command.target(), None);

        assert!(Cli::try_parse_from(["fleetbus", "commit"]).is_err());
        assert!(Cli::try_parse_from(["fleetbus", "commit", "25A56D84", "--all"]).is_err());
    }

    #[test]
    fn extended_ids_are_rejected() {
        let cli = Cli::try_parse_from(["fleetbus", "--ack-id", "0x800", "snapshot"]).unwrap();
        assert!(matches!(cli.master_config(), Err(CliError::Ids(_))));
    }

    #[test]
    fn overlapping_or_inverted_bands_are_rejected() {
        let cli = Cli::try_parse_from(["fleetbus", "--ack-id", "0x7A0", "snapshot"]).unwrap();
        assert!(matches!(cli.master_config(), Err(CliError::Ids(_))));

        let cli = Cli::try_parse_from([
            "fleetbus",
            "--interview-start",
            "0x7FF",
            "--interview-end",
            "0x700",
            "snapshot",
        ])
        .unwrap();
        assert!(matches!(cli.master_config(), Err(CliError::Ids(_))));
    }

    #[test]
    fn iface_and_simulate_conflict() {
        let result =
            Cli::try_parse_from(["fleetbus", "--iface", "can0", "--simulate", "2", "snapshot"]);
        assert!(result.is_err());
    }
}
