//! Role and correction vocabulary shared by both peers

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which side of the room this peer plays
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Local playback is authoritative; emits sync events
    Host,
    /// Reconciles local playback against the host
    Follower,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::Follower => write!(f, "follower"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(Role::Host),
            "follower" => Ok(Role::Follower),
            other => Err(format!("unknown role '{}' (expected host or follower)", other)),
        }
    }
}

/// Outcome class of a drift evaluation, exposed for diagnostics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    /// Drift within tolerance
    NoOp,
    /// Temporary rate offset
    Nudge,
    /// Direct seek to the expected position
    HardSeek,
}

impl std::fmt::Display for CorrectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorrectionKind::NoOp => write!(f, "NoOp"),
            CorrectionKind::Nudge => write!(f, "Nudge"),
            CorrectionKind::HardSeek => write!(f, "HardSeek"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("host".parse::<Role>().unwrap(), Role::Host);
        assert_eq!(" Follower ".parse::<Role>().unwrap(), Role::Follower);
        assert!("observer".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_display_matches_serde() {
        for role in [Role::Host, Role::Follower] {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role));
        }
    }

    #[test]
    fn test_correction_kind_serde() {
        assert_eq!(serde_json::to_string(&CorrectionKind::HardSeek).unwrap(), "\"hard_seek\"");
        assert_eq!(CorrectionKind::Nudge.to_string(), "Nudge");
    }
}
