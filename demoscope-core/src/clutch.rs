//! Clutch detection.
//!
//! An attempt opens the moment a side is down to exactly one alive player
//! while the other side still has someone standing. The opponent count is
//! frozen at that instant. Every attempt is resolved exactly once, when the
//! round is finalized.

use serde::{Deserialize, Serialize};

use crate::round::{RoundClose, RoundHook, RoundOpen, RoundRoster};
use crate::types::{Identity, Side, Tick};

/// An open 1vN situation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClutchAttempt {
    /// The lone survivor.
    pub identity: Identity,
    /// Their side.
    pub side: Side,
    /// Opponents alive when the attempt opened.
    pub opponents: usize,
    /// Kills made by the survivor since the attempt opened.
    pub kills: u32,
    /// When the attempt opened.
    pub opened_at: Tick,
}

/// How a clutch attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClutchOutcome {
    /// The survivor's side won the round.
    Won,
    /// The round was lost but the survivor lived.
    Saved,
    /// The survivor died and the round was lost.
    Lost,
}

/// A resolved attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClutchResolution {
    /// The attempt that was resolved.
    pub attempt: ClutchAttempt,
    /// The outcome.
    pub outcome: ClutchOutcome,
}

/// At most one open attempt per side per round.
#[derive(Debug, Clone, Default)]
pub struct ClutchTracker {
    attempts: [Option<ClutchAttempt>; 2],
}

impl ClutchTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open attempts for any side that has just dropped to a single survivor.
    /// Call after every change to the alive sets.
    pub fn check(&mut self, roster: &RoundRoster, tick: Tick) {
        for side in [Side::T, Side::CT] {
            if self.attempts[side.index()].is_some() {
                continue;
            }
            let alive = roster.alive(side);
            let opponents = roster.alive_count(side.opposite());
            if alive.len() != 1 || opponents == 0 {
                continue;
            }
            if let Some(survivor) = alive.iter().next() {
                self.attempts[side.index()] = Some(ClutchAttempt {
                    identity: survivor.clone(),
                    side,
                    opponents,
                    kills: 0,
                    opened_at: tick,
                });
            }
        }
    }

    /// Credit a kill to the attacker's open attempt, if they have one.
    pub fn record_kill(&mut self, attacker: &Identity) {
        for attempt in self.attempts.iter_mut().flatten() {
            if attempt.identity == *attacker {
                attempt.kills += 1;
            }
        }
    }

    /// The open attempt for `side`, if any.
    #[must_use]
    pub fn open_attempt(&self, side: Side) -> Option<&ClutchAttempt> {
        self.attempts[side.index()].as_ref()
    }

    /// Resolve and drain every open attempt.
    pub fn resolve(&mut self, winner: Side, roster: &RoundRoster) -> Vec<ClutchResolution> {
        self.attempts
            .iter_mut()
            .filter_map(Option::take)
            .map(|attempt| {
                let outcome = if attempt.side == winner {
                    ClutchOutcome::Won
                } else if roster.is_alive(&attempt.identity) {
                    ClutchOutcome::Saved
                } else {
                    ClutchOutcome::Lost
                };
                ClutchResolution { attempt, outcome }
            })
            .collect()
    }
}

impl RoundHook for ClutchTracker {
    fn on_round_open(&mut self, _round: &RoundOpen<'_>) {
        self.attempts = [None, None];
    }

    fn on_round_close(&mut self, _round: &RoundClose<'_>) {
        self.attempts = [None, None];
    }
}

/// Bucket key such as `"1v3"`.
#[must_use]
pub fn bucket(opponents: usize) -> String {
    format!("1v{}", opponents.clamp(1, 5))
}
