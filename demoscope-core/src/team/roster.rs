//! Roster identification strategies and kill-graph propagation.
//!
//! Strategies are tried in this order:
//!
//! | # | Strategy         | Applies when                              |
//! |---|------------------|-------------------------------------------|
//! | 1 | `RosterMatch`    | a participant's name is a roster member   |
//! | 2 | `TeamIdMajority` | exactly 10 participants, a team-id group of 5 |
//! | 3 | `LargestGroup`   | exactly 10 participants, teams split      |
//! | 4 | `FirstFive`      | exactly 10 participants                   |
//!
//! Groups of equal standing are broken by their lexicographically first
//! identity.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::RosterConfig;
use crate::event::{GameEvent, TimedEvent};
use crate::team::TeamEvidence;
use crate::types::Identity;

/// Lobby size the fallbacks assume.
const FULL_LOBBY: usize = 10;
/// Team size in a full lobby.
const TEAM_SIZE: usize = 5;
/// Upper bound on propagation passes.
const MAX_PROPAGATION_PASSES: usize = 5;

/// Which strategy identified the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Resolved names matched the roster table.
    RosterMatch,
    /// A team-id group of exactly five.
    TeamIdMajority,
    /// The largest team-id group.
    LargestGroup,
    /// The first five sorted identities.
    FirstFive,
}

/// A pure roster strategy.
pub type RosterStrategy = fn(&TeamEvidence, &RosterConfig) -> Option<BTreeSet<Identity>>;

/// The fallback chain, in priority order.
pub const STRATEGIES: &[(StrategyKind, RosterStrategy)] = &[
    (StrategyKind::RosterMatch, roster_match),
    (StrategyKind::TeamIdMajority, team_id_majority),
    (StrategyKind::LargestGroup, largest_group),
    (StrategyKind::FirstFive, first_five),
];

/// Run the chain and return the first non-empty roster.
#[must_use]
pub fn identify(
    evidence: &TeamEvidence,
    roster: &RosterConfig,
) -> Option<(StrategyKind, BTreeSet<Identity>)> {
    STRATEGIES.iter().find_map(|(kind, strategy)| {
        strategy(evidence, roster)
            .filter(|ours| !ours.is_empty())
            .map(|ours| (*kind, ours))
    })
}

/// Participants whose resolved name is a roster member.
#[must_use]
pub fn roster_match(evidence: &TeamEvidence, roster: &RosterConfig) -> Option<BTreeSet<Identity>> {
    let ours: BTreeSet<Identity> = evidence
        .participants
        .iter()
        .filter(|id| {
            evidence
                .names
                .get(*id)
                .is_some_and(|name| roster.contains_name(name))
        })
        .cloned()
        .collect();
    (!ours.is_empty()).then_some(ours)
}

/// A dominant-team-id group of exactly five in a ten-player lobby.
#[must_use]
pub fn team_id_majority(
    evidence: &TeamEvidence,
    _roster: &RosterConfig,
) -> Option<BTreeSet<Identity>> {
    if evidence.participants.len() != FULL_LOBBY {
        return None;
    }
    evidence
        .team_groups()
        .into_values()
        .filter(|group| group.len() == TEAM_SIZE)
        .min_by(|a, b| a.first().cmp(&b.first()))
}

/// The largest dominant-team-id group, as long as it does not cover the
/// whole lobby.
#[must_use]
pub fn largest_group(
    evidence: &TeamEvidence,
    _roster: &RosterConfig,
) -> Option<BTreeSet<Identity>> {
    if evidence.participants.len() != FULL_LOBBY {
        return None;
    }
    evidence
        .team_groups()
        .into_values()
        .filter(|group| group.len() < FULL_LOBBY)
        .max_by(|a, b| a.len().cmp(&b.len()).then(b.first().cmp(&a.first())))
}

/// The first five identities of a ten-player lobby, sorted.
#[must_use]
pub fn first_five(evidence: &TeamEvidence, _roster: &RosterConfig) -> Option<BTreeSet<Identity>> {
    if evidence.participants.len() != FULL_LOBBY {
        return None;
    }
    Some(evidence.participants.iter().take(TEAM_SIZE).cloned().collect())
}

/// Most common dominant team id among `ours`; lower id wins a tie.
#[must_use]
pub fn majority_team(evidence: &TeamEvidence, ours: &BTreeSet<Identity>) -> Option<i64> {
    let mut counts = std::collections::BTreeMap::<i64, usize>::new();
    for id in ours {
        if let Some(team) = evidence.dominant_team(id) {
            *counts.entry(team).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|(ta, ca), (tb, cb)| ca.cmp(cb).then(tb.cmp(ta)))
        .map(|(team, _)| team)
}

/// Grow friend and enemy sets over kills until nothing changes.
///
/// An unknown player who kills (or is killed by) a friend becomes an enemy;
/// one who kills (or is killed by) an enemy becomes a friend.
#[must_use]
pub fn propagate(
    events: &[TimedEvent],
    mut friends: BTreeSet<Identity>,
    mut enemies: BTreeSet<Identity>,
) -> (BTreeSet<Identity>, BTreeSet<Identity>) {
    let kills: Vec<(&Identity, &Identity)> = events
        .iter()
        .filter_map(|timed| match &timed.event {
            GameEvent::Kill {
                attacker: Some(attacker),
                victim,
                ..
            } if !attacker.is_bot() && !victim.is_bot() && attacker != victim => {
                Some((attacker, victim))
            }
            _ => None,
        })
        .collect();

    for _ in 0..MAX_PROPAGATION_PASSES {
        let mut changed = false;
        for (attacker, victim) in &kills {
            for (known, unknown) in [(*victim, *attacker), (*attacker, *victim)] {
                if friends.contains(unknown) || enemies.contains(unknown) {
                    continue;
                }
                if friends.contains(known) {
                    enemies.insert(unknown.clone());
                    changed = true;
                } else if enemies.contains(known) {
                    friends.insert(unknown.clone());
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    (friends, enemies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RosterMember;

    fn id(s: &str) -> Identity {
        Identity::new(s)
    }

    fn lobby(team_of: impl Fn(usize) -> i64) -> TeamEvidence {
        let mut evidence = TeamEvidence::default();
        for i in 0..10 {
            let player = id(&format!("p{i}"));
            evidence.participants.insert(player.clone());
            evidence
                .team_counts
                .entry(player)
                .or_default()
                .insert(team_of(i), 1);
        }
        evidence
    }

    fn kill(attacker: &str, victim: &str) -> TimedEvent {
        TimedEvent::new(
            0,
            GameEvent::Kill {
                attacker: Some(id(attacker)),
                victim: id(victim),
                assister: None,
                flash_assist: false,
                weapon: "ak47".into(),
                headshot: false,
                wallbang: false,
                blind: false,
                through_smoke: false,
            },
        )
    }

    #[test]
    fn roster_names_take_priority() {
        let mut evidence = lobby(|i| if i < 5 { 2 } else { 3 });
        evidence.names.insert(id("p7"), "Alpha".into());
        let roster = RosterConfig {
            members: vec![RosterMember {
                name: "alpha".into(),
                aliases: Vec::new(),
            }],
        };
        let (kind, ours) = identify(&evidence, &roster).expect("roster found");
        assert_eq!(kind, StrategyKind::RosterMatch);
        assert_eq!(ours.into_iter().collect::<Vec<_>>(), vec![id("p7")]);
    }

    #[test]
    fn five_five_split_uses_first_identity_group() {
        let evidence = lobby(|i| if i % 2 == 0 { 3 } else { 2 });
        let (kind, ours) = identify(&evidence, &RosterConfig::default()).expect("roster found");
        assert_eq!(kind, StrategyKind::TeamIdMajority);
        assert!(ours.contains(&id("p0")));
        assert_eq!(ours.len(), 5);
    }

    #[test]
    fn uneven_split_falls_back_to_largest_group() {
        let evidence = lobby(|i| if i < 6 { 2 } else { 3 });
        let (kind, ours) = identify(&evidence, &RosterConfig::default()).expect("roster found");
        assert_eq!(kind, StrategyKind::LargestGroup);
        assert_eq!(ours.len(), 6);
    }

    #[test]
    fn single_team_falls_back_to_first_five() {
        let evidence = lobby(|_| 2);
        let (kind, ours) = identify(&evidence, &RosterConfig::default()).expect("roster found");
        assert_eq!(kind, StrategyKind::FirstFive);
        assert_eq!(
            ours.into_iter().collect::<Vec<_>>(),
            vec![id("p0"), id("p1"), id("p2"), id("p3"), id("p4")]
        );
    }

    #[test]
    fn small_lobby_has_no_fallback() {
        let mut evidence = TeamEvidence::default();
        evidence.participants.insert(id("solo"));
        assert!(identify(&evidence, &RosterConfig::default()).is_none());
    }

    #[test]
    fn propagation_reaches_fixed_point() {
        let events = vec![kill("x", "friend"), kill("y", "x"), kill("z", "y")];
        let friends: BTreeSet<_> = [id("friend")].into_iter().collect();
        let (friends, enemies) = propagate(&events, friends, BTreeSet::new());
        assert!(enemies.contains(&id("x")));
        assert!(friends.contains(&id("y")));
        assert!(enemies.contains(&id("z")));
    }
}
