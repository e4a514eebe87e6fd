//! Team/side resolution, run once per match before the event pass.
//!
//! Three steps:
//!   1. Roster identification through an ordered strategy list
//!      ([`roster::STRATEGIES`]); the first strategy that returns a
//!      non-empty set wins.
//!   2. Interaction propagation over kills, repairing membership for players
//!      who are not in the roster table.
//!   3. Starting side from weighted plant/defuse and weapon evidence.

pub mod roster;
pub mod side;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::event::{GameEvent, TimedEvent};
use crate::normalize::NormalizedLog;
use crate::types::{Identity, Side};

pub use roster::StrategyKind;

/// Everything the resolver strategies look at.
#[derive(Debug, Clone, Default)]
pub struct TeamEvidence {
    /// Non-bot identities that played (fought, or joined team 2 or 3).
    pub participants: BTreeSet<Identity>,
    /// Resolved display names.
    pub names: BTreeMap<Identity, String>,
    /// How often each numeric team id was seen per identity.
    pub team_counts: BTreeMap<Identity, BTreeMap<i64, usize>>,
}

impl TeamEvidence {
    /// Gather participants and team-id observations from the event stream.
    #[must_use]
    pub fn collect(events: &[TimedEvent], names: &BTreeMap<Identity, String>) -> Self {
        let mut evidence = Self {
            names: names.clone(),
            ..Self::default()
        };

        for timed in events {
            for (id, team) in &timed.team_hints {
                evidence.observe_team(id, *team);
            }
            match &timed.event {
                GameEvent::TeamChange { player, team_num } => {
                    evidence.observe_team(player, *team_num);
                }
                GameEvent::Kill {
                    attacker,
                    victim,
                    assister,
                    ..
                } => {
                    evidence.add(attacker.as_ref());
                    evidence.add(Some(victim));
                    evidence.add(assister.as_ref());
                }
                GameEvent::Damage { attacker, victim, .. } => {
                    evidence.add(attacker.as_ref());
                    evidence.add(Some(victim));
                }
                GameEvent::Blind { attacker, victim, .. } => {
                    evidence.add(Some(attacker));
                    evidence.add(Some(victim));
                }
                GameEvent::Detonate { owner, .. }
                | GameEvent::Plant { owner }
                | GameEvent::Defuse { owner } => evidence.add(Some(owner)),
                _ => {}
            }
        }
        evidence
    }

    fn add(&mut self, id: Option<&Identity>) {
        if let Some(id) = id.filter(|id| !id.is_bot()) {
            self.participants.insert(id.clone());
        }
    }

    fn observe_team(&mut self, id: &Identity, team: i64) {
        if id.is_bot() || Side::from_team_num(team).is_none() {
            return;
        }
        self.participants.insert(id.clone());
        *self
            .team_counts
            .entry(id.clone())
            .or_default()
            .entry(team)
            .or_insert(0) += 1;
    }

    /// Most frequently seen team id for `id`; the lower id wins a tie.
    #[must_use]
    pub fn dominant_team(&self, id: &Identity) -> Option<i64> {
        self.team_counts.get(id).and_then(|counts| {
            counts
                .iter()
                .max_by(|(ta, ca), (tb, cb)| ca.cmp(cb).then(tb.cmp(ta)))
                .map(|(team, _)| *team)
        })
    }

    /// Participants grouped by dominant team id.
    #[must_use]
    pub fn team_groups(&self) -> BTreeMap<i64, BTreeSet<Identity>> {
        let mut groups: BTreeMap<i64, BTreeSet<Identity>> = BTreeMap::new();
        for id in &self.participants {
            if let Some(team) = self.dominant_team(id) {
                groups.entry(team).or_default().insert(id.clone());
            }
        }
        groups
    }
}

/// Result of team/side resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamResolution {
    /// "Our" identities.
    pub ours: BTreeSet<Identity>,
    /// Known opponents.
    pub enemies: BTreeSet<Identity>,
    /// Everyone who played.
    pub participants: BTreeSet<Identity>,
    /// Numeric team id most common among our players.
    pub our_team_num: Option<i64>,
    /// Which strategy produced the roster, if any.
    pub strategy: Option<StrategyKind>,
    /// Side our roster started the match on.
    pub starting_side: Side,
    /// First round of the second half.
    pub side_swap_round: u32,
}

impl TeamResolution {
    /// Whether `id` belongs to our roster.
    #[must_use]
    pub fn is_ours(&self, id: &Identity) -> bool {
        self.ours.contains(id)
    }

    /// Our side in a 1-based round.
    #[must_use]
    pub fn our_side(&self, round: u32) -> Side {
        if round < self.side_swap_round {
            self.starting_side
        } else {
            self.starting_side.opposite()
        }
    }

    /// Inferred side of any participant for a round.
    #[must_use]
    pub fn inferred_side(&self, id: &Identity, round: u32) -> Side {
        if self.is_ours(id) {
            self.our_side(round)
        } else {
            self.our_side(round).opposite()
        }
    }
}

/// Run the full resolution over a normalized log.
#[must_use]
pub fn resolve(log: &NormalizedLog, config: &EngineConfig) -> TeamResolution {
    let evidence = TeamEvidence::collect(&log.events, &log.names);

    let (strategy, seed) = roster::identify(&evidence, &config.roster)
        .map_or((None, BTreeSet::new()), |(kind, ours)| (Some(kind), ours));

    let our_team_num = roster::majority_team(&evidence, &seed);
    let (ours, enemies) = if seed.is_empty() {
        (BTreeSet::new(), evidence.participants.clone())
    } else {
        let initial_enemies: BTreeSet<Identity> = evidence
            .participants
            .iter()
            .filter(|id| !seed.contains(*id))
            .filter(|id| {
                our_team_num.is_some()
                    && evidence
                        .dominant_team(id)
                        .is_some_and(|t| Some(t) != our_team_num)
            })
            .cloned()
            .collect();
        roster::propagate(&log.events, seed, initial_enemies)
    };

    let starting_side = side::starting_side(&log.events, &ours, config.timing.side_swap_round);

    info!(
        strategy = ?strategy,
        ours = ours.len(),
        enemies = enemies.len(),
        participants = evidence.participants.len(),
        starting_side = %starting_side,
        "team resolution complete"
    );
    debug!(our_team_num = ?our_team_num, "dominant team id");

    TeamResolution {
        ours,
        enemies,
        participants: evidence.participants,
        our_team_num,
        strategy,
        starting_side,
        side_swap_round: config.timing.side_swap_round,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominant_team_prefers_count_then_lower_id() {
        let mut evidence = TeamEvidence::default();
        let id = Identity::new("1");
        evidence.observe_team(&id, 3);
        evidence.observe_team(&id, 2);
        assert_eq!(evidence.dominant_team(&id), Some(2));
        evidence.observe_team(&id, 3);
        assert_eq!(evidence.dominant_team(&id), Some(3));
    }

    #[test]
    fn spectators_and_bots_are_not_participants() {
        let events = vec![
            TimedEvent::new(
                0,
                GameEvent::TeamChange {
                    player: Identity::new("spec"),
                    team_num: 1,
                },
            ),
            TimedEvent::new(
                1,
                GameEvent::Kill {
                    attacker: Some(Identity::bot()),
                    victim: Identity::new("v"),
                    assister: None,
                    flash_assist: false,
                    weapon: "ak47".into(),
                    headshot: false,
                    wallbang: false,
                    blind: false,
                    through_smoke: false,
                },
            ),
        ];
        let evidence = TeamEvidence::collect(&events, &BTreeMap::new());
        assert_eq!(
            evidence.participants.iter().cloned().collect::<Vec<_>>(),
            vec![Identity::new("v")]
        );
    }

    #[test]
    fn our_side_swaps_at_second_half() {
        let resolution = TeamResolution {
            ours: [Identity::new("a")].into_iter().collect(),
            enemies: BTreeSet::new(),
            participants: BTreeSet::new(),
            our_team_num: None,
            strategy: None,
            starting_side: Side::CT,
            side_swap_round: 13,
        };
        assert_eq!(resolution.our_side(12), Side::CT);
        assert_eq!(resolution.our_side(13), Side::T);
        assert_eq!(resolution.inferred_side(&Identity::new("b"), 1), Side::T);
    }
}
