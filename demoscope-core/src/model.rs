//! Output model: the reconciled [`Match`] and its parts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stats::{PlayerMatchStats, PlayerRoundStats};
use crate::team::StrategyKind;
use crate::types::{Identity, Side};

/// Caller-supplied identity of a parsed match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchLabel {
    /// Unique id.
    pub id: String,
    /// Source tag, e.g. the importing tool or file origin.
    pub source: String,
    /// ISO-8601 import date.
    pub date: String,
}

impl MatchLabel {
    /// A fixed label.
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            date: date.into(),
        }
    }

    /// A fresh random id stamped with the current time.
    #[must_use]
    pub fn generate(source: impl Into<String>) -> Self {
        let now: DateTime<Utc> = Utc::now();
        Self::new(Uuid::new_v4().to_string(), source, now.to_rfc3339())
    }
}

/// Final score from our perspective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    /// Rounds we won.
    pub us: u32,
    /// Rounds they won.
    pub them: u32,
    /// First-half rounds we won.
    pub half1_us: u32,
    /// First-half rounds they won.
    pub half1_them: u32,
    /// Second-half rounds we won.
    pub half2_us: u32,
    /// Second-half rounds they won.
    pub half2_them: u32,
}

impl Score {
    /// Record a finalized round.
    pub fn record(&mut self, we_won: bool, first_half: bool) {
        match (we_won, first_half) {
            (true, true) => self.half1_us += 1,
            (false, true) => self.half1_them += 1,
            (true, false) => self.half2_us += 1,
            (false, false) => self.half2_them += 1,
        }
        if we_won {
            self.us += 1;
        } else {
            self.them += 1;
        }
    }

    /// Total rounds recorded.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.us + self.them
    }
}

/// Kind of a timeline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineKind {
    /// A death.
    Kill {
        /// Killer, absent for world damage.
        attacker: Option<Identity>,
        /// Victim.
        victim: Identity,
        /// Weapon code.
        weapon: String,
        /// Headshot.
        headshot: bool,
    },
    /// Bomb planted.
    Plant {
        /// Planter.
        player: Identity,
    },
    /// Bomb defused.
    Defuse {
        /// Defuser.
        player: Identity,
    },
    /// Bomb exploded.
    Explode,
    /// A grenade detonated.
    Utility {
        /// Thrower.
        player: Identity,
        /// Grenade kind.
        kind: crate::event::UtilityKind,
    },
    /// Round-ending condition.
    RoundEnd {
        /// Winning side.
        winner: Side,
    },
}

/// One replayable timeline entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    /// Seconds since the round anchor.
    pub time: f64,
    /// What happened.
    #[serde(flatten)]
    pub kind: TimelineKind,
    /// P(T wins) after the event.
    pub t_win_probability: f64,
}

/// A finalized round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRound {
    /// 1-based round number.
    pub number: u32,
    /// Winning side.
    pub winner: Side,
    /// Win-reason code, if logged.
    pub reason: Option<i64>,
    /// Anchor to round end, in seconds (never negative).
    pub duration: f64,
    /// Per-player stats for this round.
    pub players: BTreeMap<Identity, PlayerRoundStats>,
    /// Events relative to the round anchor.
    pub timeline: Vec<TimelineEntry>,
}

/// The reconciled output of one event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    /// Caller-supplied id.
    pub id: String,
    /// Source tag.
    pub source: String,
    /// Import date.
    pub date: String,
    /// Map id.
    pub map: Option<String>,
    /// Server display name.
    pub server: Option<String>,
    /// Side our roster started on.
    pub starting_side: Side,
    /// Final score.
    pub score: Score,
    /// Our players.
    pub players: Vec<PlayerMatchStats>,
    /// Their players.
    pub enemy_players: Vec<PlayerMatchStats>,
    /// Finalized rounds, in order.
    pub rounds: Vec<MatchRound>,
}

/// Bookkeeping returned next to a [`Match`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseDiagnostics {
    /// Raw records seen.
    pub records_read: usize,
    /// Records skipped as malformed or unknown.
    pub records_skipped: usize,
    /// Unknown event names with counts.
    pub unknown_events: BTreeMap<String, usize>,
    /// Rounds finalized.
    pub rounds_finalized: usize,
    /// Events processed while a round end was pending.
    pub garbage_time_events: usize,
    /// Round ends ignored for lack of a winner.
    pub ignored_round_ends: usize,
    /// Rounds anchored on their first gameplay event.
    pub lazily_anchored_rounds: usize,
    /// Gameplay events seen before the first match start.
    pub warmup_events: usize,
    /// Roster strategy that succeeded.
    pub roster_strategy: Option<StrategyKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_keeps_halves_consistent() {
        let mut score = Score::default();
        score.record(true, true);
        score.record(false, true);
        score.record(false, false);
        assert_eq!(score.total(), 3);
        assert_eq!(
            score.half1_us + score.half1_them + score.half2_us + score.half2_them,
            score.total()
        );
    }

    #[test]
    fn score_serializes_snake_case() {
        let json = serde_json::to_value(Score::default()).expect("serialize");
        assert!(json.get("half1_us").is_some());
        assert!(json.get("half2_them").is_some());
    }

    #[test]
    fn generated_labels_are_unique() {
        let a = MatchLabel::generate("cli");
        let b = MatchLabel::generate("cli");
        assert_ne!(a.id, b.id);
        assert!(DateTime::parse_from_rfc3339(&a.date).is_ok());
    }
}
