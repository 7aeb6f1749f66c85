//! Station configuration
//!
//! A [`NodeConfig`] can come from a TOML file, from builder calls, or from
//! nothing at all (the defaults run a usable civilian station). Command-line
//! flags are applied on top by `main`, so the precedence is
//! flags > file > defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use lantern_core::{Role, TeamUnit};
use lantern_courier::CourierConfig;

/// Default bind address for the HTTP bridge
///
/// All interfaces, so phones on the same LAN can reach a station's bridge.
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:3001";

/// Configuration for a Lantern station
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Room to open or join
    pub room: String,
    /// Nickname shown to other stations; derived from the station id when
    /// absent
    pub nick: Option<String>,
    /// Which side of the conversation this station speaks for
    pub role: Role,
    /// Responder unit advertised with team presence
    pub unit: Option<TeamUnit>,
    /// Whether to serve the HTTP bridge for browser consoles
    pub http: bool,
    /// Bridge bind address
    pub http_addr: SocketAddr,
    /// Where the identity key, archive log, and report log live
    pub data_dir: PathBuf,
    /// Keep nothing on disk: fresh identity, no logs
    pub ephemeral: bool,
    /// Seconds between presence beacons
    pub announce_interval_secs: u64,
    /// Seconds of silence before a peer leaves the roster
    pub peer_timeout_secs: u64,
    /// Store-and-forward settings
    pub courier: CourierSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            room: "commons".to_string(),
            nick: None,
            role: Role::Civilian,
            unit: None,
            http: false,
            http_addr: DEFAULT_HTTP_ADDR.parse().expect("valid default address"),
            data_dir: default_data_dir(),
            ephemeral: false,
            announce_interval_secs: 30,
            peer_timeout_secs: 90,
            courier: CourierSettings::default(),
        }
    }
}

/// Platform data directory plus `lantern`, falling back to the working
/// directory when the platform offers none
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("lantern"))
        .unwrap_or_else(|| PathBuf::from("./lantern-data"))
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Write configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let text = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write config file {}", path.display()))
    }

    /// Set the room name
    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = room.into();
        self
    }

    /// Set the nickname
    pub fn with_nick(mut self, nick: impl Into<String>) -> Self {
        self.nick = Some(nick.into());
        self
    }

    /// Set the conversation role
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Set the responder unit
    pub fn with_unit(mut self, unit: TeamUnit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Enable the bridge on the given address
    pub fn with_http_addr(mut self, addr: SocketAddr) -> Self {
        self.http = true;
        self.http_addr = addr;
        self
    }

    /// Set the data directory
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// How often this station announces itself
    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs)
    }

    /// How long a silent peer stays on the roster
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }

    /// Surface configurations that will run but behave strangely
    pub fn validate(&self) -> Vec<String> {
        let mut warnings: Vec<String> = self
            .courier
            .to_config()
            .validate()
            .into_iter()
            .map(|warning| format!("courier: {:?}", warning))
            .collect();

        if self.room.trim().is_empty() {
            warnings.push("room name is empty".to_string());
        }
        if self.peer_timeout_secs <= self.announce_interval_secs {
            warnings.push(
                "peer timeout does not outlast the announce interval; \
                 the roster will flap"
                    .to_string(),
            );
        }
        if self.unit.is_some() && self.role != Role::Team {
            warnings.push("a unit is set but the role is not team".to_string());
        }
        warnings
    }
}

/// Store-and-forward preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CourierPreset {
    /// Balanced defaults
    #[default]
    Default,
    /// Long lifetimes and patient retries for sparse connectivity
    FieldDeployment,
    /// Everything short, for exercises
    Drill,
}

/// Serializable courier settings: a preset plus per-field overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CourierSettings {
    pub preset: CourierPreset,
    pub max_queued: Option<usize>,
    pub max_attempts: Option<u32>,
    pub lifetime_secs: Option<u64>,
    pub ack_deadline_secs: Option<u64>,
    pub seen_ttl_secs: Option<u64>,
}

impl CourierSettings {
    /// Resolve the preset and overrides into a courier configuration
    pub fn to_config(&self) -> CourierConfig {
        let mut config = match self.preset {
            CourierPreset::Default => CourierConfig::default(),
            CourierPreset::FieldDeployment => CourierConfig::field_deployment(),
            CourierPreset::Drill => CourierConfig::drill(),
        };
        if let Some(value) = self.max_queued {
            config.max_queued = value;
        }
        if let Some(value) = self.max_attempts {
            config.max_attempts = value;
        }
        if let Some(value) = self.lifetime_secs {
            config.default_lifetime = Duration::from_secs(value);
        }
        if let Some(value) = self.ack_deadline_secs {
            config.ack_deadline = Duration::from_secs(value);
        }
        if let Some(value) = self.seen_ttl_secs {
            config.seen_ttl = Duration::from_secs(value);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_quiet() {
        let config = NodeConfig::default();
        assert_eq!(config.room, "commons");
        assert_eq!(config.role, Role::Civilian);
        assert!(!config.http);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_toml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lantern.toml");

        let config = NodeConfig::default()
            .with_room("rescue-7")
            .with_nick("Medical Team 3")
            .with_role(Role::Team)
            .with_unit(TeamUnit::Medical)
            .with_http_addr("127.0.0.1:4000".parse().unwrap());
        config.save(&path).unwrap();

        let loaded = NodeConfig::load(&path).unwrap();
        assert_eq!(loaded.room, "rescue-7");
        assert_eq!(loaded.nick.as_deref(), Some("Medical Team 3"));
        assert_eq!(loaded.role, Role::Team);
        assert_eq!(loaded.unit, Some(TeamUnit::Medical));
        assert!(loaded.http);
        assert_eq!(loaded.http_addr.port(), 4000);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: NodeConfig = toml::from_str("room = \"harbor\"").unwrap();
        assert_eq!(config.room, "harbor");
        assert_eq!(config.announce_interval_secs, 30);
        assert_eq!(config.courier.preset, CourierPreset::Default);
    }

    #[test]
    fn test_courier_preset_and_overrides() {
        let settings = CourierSettings {
            preset: CourierPreset::Drill,
            max_queued: Some(128),
            ..Default::default()
        };
        let config = settings.to_config();
        assert_eq!(config.max_queued, 128);
        assert_eq!(config.max_attempts, CourierConfig::drill().max_attempts);
    }

    #[test]
    fn test_validate_flags_roster_flap() {
        let mut config = NodeConfig::default();
        config.announce_interval_secs = 120;
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("roster will flap")));
    }

    #[test]
    fn test_validate_flags_unit_without_team_role() {
        let mut config = NodeConfig::default();
        config.unit = Some(TeamUnit::Fire);
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("role is not team")));
    }
}
