//! Core type definitions shared by every stage of the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Sentinel used for bots and for any identifier that cannot be resolved.
pub const BOT_IDENTITY: &str = "BOT";

/// Canonical player key: a normalized SteamID, or the [`BOT_IDENTITY`] sentinel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub String);

impl Identity {
    /// Wrap an already-normalized identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The bot / unresolvable sentinel.
    #[must_use]
    pub fn bot() -> Self {
        Self(BOT_IDENTITY.to_string())
    }

    /// Whether this is the bot sentinel.
    #[must_use]
    pub fn is_bot(&self) -> bool {
        self.0 == BOT_IDENTITY
    }

    /// Borrow the underlying identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Sides
// ---------------------------------------------------------------------------

/// The side a player is playing on in a given round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Terrorists (attacking, plant the bomb).
    T,
    /// Counter-terrorists (defending, defuse the bomb).
    CT,
}

impl Side {
    /// The other side.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::T => Self::CT,
            Self::CT => Self::T,
        }
    }

    /// Map the engine's numeric team id (2 = T, 3 = CT) to a side.
    ///
    /// Spectator / unassigned ids (0, 1) have no side.
    #[must_use]
    pub fn from_team_num(team_num: i64) -> Option<Self> {
        match team_num {
            2 => Some(Self::T),
            3 => Some(Self::CT),
            _ => None,
        }
    }

    /// Parse a textual side label such as `"T"`, `"TERRORIST"` or `"CT"`.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "T" | "TERRORIST" | "TERRORISTS" => Some(Self::T),
            "CT" | "COUNTER-TERRORIST" | "COUNTERTERRORIST" | "COUNTER-TERRORISTS" => {
                Some(Self::CT)
            }
            other => other.parse::<i64>().ok().and_then(Self::from_team_num),
        }
    }

    /// Dense index (T = 0, CT = 1) for per-side arrays.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::T => 0,
            Self::CT => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::T => write!(f, "T"),
            Self::CT => write!(f, "CT"),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Discrete simulation step used for event timestamps.
pub type Tick = i64;

/// Convert a tick distance to seconds at the given tick rate.
#[must_use]
pub fn ticks_to_secs(ticks: Tick, tick_rate: f64) -> f64 {
    if tick_rate <= 0.0 {
        return 0.0;
    }
    ticks as f64 / tick_rate
}

/// Convert seconds to a (rounded) tick count at the given tick rate.
#[must_use]
pub fn secs_to_ticks(secs: f64, tick_rate: f64) -> Tick {
    (secs * tick_rate).round() as Tick
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_labels_parse() {
        assert_eq!(Side::from_label("terrorist"), Some(Side::T));
        assert_eq!(Side::from_label(" CT "), Some(Side::CT));
        assert_eq!(Side::from_label("3"), Some(Side::CT));
        assert_eq!(Side::from_label("spectator"), None);
    }

    #[test]
    fn team_nums_map_to_sides() {
        assert_eq!(Side::from_team_num(2), Some(Side::T));
        assert_eq!(Side::from_team_num(3), Some(Side::CT));
        assert_eq!(Side::from_team_num(1), None);
    }

    #[test]
    fn tick_conversion_is_inverse() {
        let ticks = secs_to_ticks(4.0, 64.0);
        assert_eq!(ticks, 256);
        assert!((ticks_to_secs(ticks, 64.0) - 4.0).abs() < f64::EPSILON);
        assert!(ticks_to_secs(100, 0.0).abs() < f64::EPSILON);
    }
}
