//! Starting-side inference.
//!
//! Evidence comes from our roster only. A plant or defuse is unambiguous
//! and weighs 100; a kill or damage with a side-locked weapon weighs 1.
//! Evidence is bucketed by half using a pre-pass round count. A round
//! advances on the first round end with a decidable winner after a round
//! marker; repeated ends before the next marker are ignored.

use std::collections::BTreeSet;

use tracing::debug;

use crate::economy::normalize_item_code;
use crate::event::{GameEvent, TimedEvent};
use crate::round::decide_winner;
use crate::types::{Identity, Side};

const OBJECTIVE_WEIGHT: u32 = 100;
const WEAPON_WEIGHT: u32 = 1;

/// Weapons only one side can buy. Shared weapons are absent.
const SIDE_WEAPONS: &[(&str, Side)] = &[
    ("glock", Side::T),
    ("tec9", Side::T),
    ("mac10", Side::T),
    ("sawedoff", Side::T),
    ("galilar", Side::T),
    ("ak47", Side::T),
    ("sg556", Side::T),
    ("g3sg1", Side::T),
    ("molotov", Side::T),
    ("hkp2000", Side::CT),
    ("usp_silencer", Side::CT),
    ("fiveseven", Side::CT),
    ("mp9", Side::CT),
    ("mag7", Side::CT),
    ("famas", Side::CT),
    ("m4a1", Side::CT),
    ("m4a1_silencer", Side::CT),
    ("aug", Side::CT),
    ("scar20", Side::CT),
    ("incgrenade", Side::CT),
];

/// Side a weapon code locks its user to, if any.
#[must_use]
pub fn weapon_side(weapon: &str) -> Option<Side> {
    let code = normalize_item_code(weapon);
    SIDE_WEAPONS
        .iter()
        .find(|(w, _)| *w == code)
        .map(|(_, side)| *side)
}

/// Weighted evidence for one half, indexed by [`Side::index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HalfEvidence([u32; 2]);

impl HalfEvidence {
    fn add(&mut self, side: Side, weight: u32) {
        self.0[side.index()] += weight;
    }

    /// The side with strictly more evidence.
    #[must_use]
    pub fn majority(&self) -> Option<Side> {
        let [t, ct] = self.0;
        match t.cmp(&ct) {
            std::cmp::Ordering::Greater => Some(Side::T),
            std::cmp::Ordering::Less => Some(Side::CT),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Accumulate first-half and second-half evidence for `ours`.
#[must_use]
pub fn collect_evidence(
    events: &[TimedEvent],
    ours: &BTreeSet<Identity>,
    side_swap_round: u32,
) -> (HalfEvidence, HalfEvidence) {
    let mut halves = (HalfEvidence::default(), HalfEvidence::default());
    let mut round: u32 = 1;
    let mut ended = false;

    for timed in events {
        let half = if round < side_swap_round {
            &mut halves.0
        } else {
            &mut halves.1
        };
        match &timed.event {
            GameEvent::MatchStart => {
                round = 1;
                ended = false;
            }
            GameEvent::RoundStart | GameEvent::FreezeEnd => ended = false,
            GameEvent::RoundEnd { winner, reason } => {
                if !ended && decide_winner(*winner, *reason).is_some() {
                    round += 1;
                    ended = true;
                }
            }
            GameEvent::Plant { owner } if ours.contains(owner) => {
                half.add(Side::T, OBJECTIVE_WEIGHT);
            }
            GameEvent::Defuse { owner } if ours.contains(owner) => {
                half.add(Side::CT, OBJECTIVE_WEIGHT);
            }
            GameEvent::Kill {
                attacker: Some(attacker),
                weapon,
                ..
            }
            | GameEvent::Damage {
                attacker: Some(attacker),
                weapon,
                ..
            } if ours.contains(attacker) => {
                if let Some(side) = weapon_side(weapon) {
                    half.add(side, WEAPON_WEIGHT);
                }
            }
            _ => {}
        }
    }
    halves
}

/// Our starting side: the first half's majority, else the opposite of the
/// second half's majority, else T.
#[must_use]
pub fn starting_side(
    events: &[TimedEvent],
    ours: &BTreeSet<Identity>,
    side_swap_round: u32,
) -> Side {
    let (first, second) = collect_evidence(events, ours, side_swap_round);
    let side = first
        .majority()
        .or_else(|| second.majority().map(Side::opposite))
        .unwrap_or(Side::T);
    debug!(
        first_half = ?first,
        second_half = ?second,
        starting_side = %side,
        "starting side inferred"
    );
    side
}
