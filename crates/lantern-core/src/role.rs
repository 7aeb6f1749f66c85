//! Conversation roles and team-unit classification
//!
//! Every message on the mesh is tagged with the [`Role`] of its sender.
//! The wire value is the lowercase string the HTTP clients already send
//! (`"civilian"` / `"team"`); anything else degrades to [`Role::Unknown`]
//! rather than failing, since untyped traffic (terminal input, older
//! stations) is still worth displaying.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side of the conversation a sender is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A person requesting help or reporting conditions
    #[default]
    Civilian,
    /// A rescue-team responder
    Team,
    /// Untyped legacy traffic
    #[serde(other)]
    Unknown,
}

impl Role {
    /// The label shown to readers when no nickname is available
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Civilian => "Civilian",
            Role::Team => "Rescue Team",
            Role::Unknown => "Unknown",
        }
    }

    /// The lowercase wire form
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Civilian => "civilian",
            Role::Team => "team",
            Role::Unknown => "unknown",
        }
    }

    /// Parse a wire string, coercing unrecognized values to `Unknown`
    pub fn parse(s: &str) -> Self {
        match s {
            "civilian" => Role::Civilian,
            "team" => Role::Team,
            _ => Role::Unknown,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Responder unit, inferred from a sender label
///
/// The team console routes traffic into unit tabs by matching keywords in
/// the sender name ("Medical Team 3", "Fire Station West"). The same
/// keyword table lives here so server-side filtering agrees with what the
/// console shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamUnit {
    Medical,
    Fire,
    Police,
    Logistics,
    /// No unit keyword matched
    General,
}

impl TeamUnit {
    /// Classify a sender label by its unit keywords
    pub fn classify(sender: &str) -> Self {
        let lower = sender.to_lowercase();
        if lower.contains("medical") || lower.contains("ambulance") {
            TeamUnit::Medical
        } else if lower.contains("fire") {
            TeamUnit::Fire
        } else if lower.contains("police") {
            TeamUnit::Police
        } else if lower.contains("logistics") || lower.contains("supply") {
            TeamUnit::Logistics
        } else {
            TeamUnit::General
        }
    }

    /// The lowercase query-string form
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamUnit::Medical => "medical",
            TeamUnit::Fire => "fire",
            TeamUnit::Police => "police",
            TeamUnit::Logistics => "logistics",
            TeamUnit::General => "general",
        }
    }

    /// Parse a query-string value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "medical" => Some(TeamUnit::Medical),
            "fire" => Some(TeamUnit::Fire),
            "police" => Some(TeamUnit::Police),
            "logistics" => Some(TeamUnit::Logistics),
            "general" => Some(TeamUnit::General),
            _ => None,
        }
    }
}

impl fmt::Display for TeamUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_roundtrip() {
        let json = serde_json::to_string(&Role::Team).unwrap();
        assert_eq!(json, "\"team\"");
        let parsed: Role = serde_json::from_str("\"civilian\"").unwrap();
        assert_eq!(parsed, Role::Civilian);
    }

    #[test]
    fn test_unrecognized_role_becomes_unknown() {
        let parsed: Role = serde_json::from_str("\"dispatcher\"").unwrap();
        assert_eq!(parsed, Role::Unknown);
        assert_eq!(Role::parse("whatever"), Role::Unknown);
    }

    #[test]
    fn test_role_display_names() {
        assert_eq!(Role::Civilian.display_name(), "Civilian");
        assert_eq!(Role::Team.display_name(), "Rescue Team");
    }

    #[test]
    fn test_unit_classification_keywords() {
        assert_eq!(TeamUnit::classify("Medical Team 3"), TeamUnit::Medical);
        assert_eq!(TeamUnit::classify("city AMBULANCE 7"), TeamUnit::Medical);
        assert_eq!(TeamUnit::classify("Fire Station West"), TeamUnit::Fire);
        assert_eq!(TeamUnit::classify("police unit 12"), TeamUnit::Police);
        assert_eq!(TeamUnit::classify("Logistics Hub"), TeamUnit::Logistics);
        assert_eq!(TeamUnit::classify("Supply Depot B"), TeamUnit::Logistics);
        assert_eq!(TeamUnit::classify("Rescue Team"), TeamUnit::General);
    }

    #[test]
    fn test_unit_query_parse() {
        assert_eq!(TeamUnit::parse("fire"), Some(TeamUnit::Fire));
        assert_eq!(TeamUnit::parse("submarine"), None);
    }
}
