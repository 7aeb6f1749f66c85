//! Lantern station daemon
//!
//! Opens (or joins) a room on the mesh and keeps it alive: archives every
//! message, forwards what peers missed, answers presence, and optionally
//! serves the HTTP bridge for browser consoles on the same LAN.

mod config;
mod console;
mod keystore;
mod sequence;
mod station;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lantern_core::{Role, TeamUnit};
use lantern_mesh::RoomTicket;

use crate::config::NodeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum RoleArg {
    Civilian,
    Team,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Civilian => Role::Civilian,
            RoleArg::Team => Role::Team,
        }
    }
}

/// Offline-first emergency mesh station
#[derive(Debug, Parser)]
#[command(name = "lantern-node", version, about)]
struct Cli {
    /// Room to open (default "commons")
    #[arg(long)]
    room: Option<String>,

    /// Join an existing room via its invite ticket
    #[arg(long, value_name = "TICKET", conflicts_with = "room")]
    join: Option<String>,

    /// Nickname shown to other stations
    #[arg(long)]
    nick: Option<String>,

    /// Which side of the conversation this station speaks for
    #[arg(long, value_enum)]
    role: Option<RoleArg>,

    /// Responder unit (medical, fire, police, logistics, general)
    #[arg(long)]
    unit: Option<String>,

    /// Serve the HTTP bridge for browser consoles
    #[arg(long)]
    http: bool,

    /// Bridge bind address (implies --http)
    #[arg(long, value_name = "ADDR")]
    http_addr: Option<SocketAddr>,

    /// Where the identity key and logs live
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Keep nothing on disk: fresh identity, no logs
    #[arg(long)]
    ephemeral: bool,

    /// TOML configuration file; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the invite ticket on startup
    #[arg(long)]
    ticket: bool,
}

impl Cli {
    /// Resolve flags on top of the file (or defaults)
    fn into_config(self) -> anyhow::Result<(NodeConfig, Option<RoomTicket>, bool)> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };

        let ticket = self
            .join
            .as_deref()
            .map(|raw| raw.parse::<RoomTicket>().context("invalid room ticket"))
            .transpose()?;

        if let Some(room) = self.room {
            config.room = room;
        }
        if let Some(nick) = self.nick {
            config.nick = Some(nick);
        }
        if let Some(role) = self.role {
            config.role = role.into();
        }
        if let Some(raw) = self.unit.as_deref() {
            let Some(unit) = TeamUnit::parse(raw) else {
                bail!("unknown unit '{raw}' (medical, fire, police, logistics, general)");
            };
            config.unit = Some(unit);
        }
        if self.http {
            config.http = true;
        }
        if let Some(addr) = self.http_addr {
            config.http = true;
            config.http_addr = addr;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if self.ephemeral {
            config.ephemeral = true;
        }

        Ok((config, ticket, self.ticket))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (config, ticket, print_ticket) = Cli::parse().into_config()?;
    station::run(config, ticket, print_ticket).await
}
