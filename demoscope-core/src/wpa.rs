//! Win-probability model and Win Probability Added attribution.
//!
//! P(T wins) is read from a pre-plant or post-plant matrix indexed by
//! `[t_alive][ct_alive]`, then adjusted by:
//!   - the round-start economy modifier (reduced after the plant)
//!   - the HP differential between the sides
//!   - time pressure: a cubic panic ramp before the plant, and an
//!     acceleration toward T after it
//!
//! Every discrete transition turns the change in P into per-player deltas
//! that sum to zero: the benefiting side is credited and the losing side is
//! debited by the same magnitude.

use std::collections::BTreeMap;

use crate::config::{EngineConfig, WpaConfig};
use crate::economy::{self, MIN_LOADOUT_VALUE};
use crate::health::FULL_HEALTH;
use crate::round::{RoundClose, RoundHook, RoundOpen, RoundRoster};
use crate::types::{ticks_to_secs, Identity, Side, Tick};

/// Pre-plant P(T wins), `[t_alive][ct_alive]`.
const PRE_PLANT: [[f64; 6]; 6] = [
    [0.00, 0.00, 0.00, 0.00, 0.00, 0.00],
    [1.00, 0.50, 0.22, 0.09, 0.03, 0.01],
    [1.00, 0.78, 0.50, 0.27, 0.12, 0.05],
    [1.00, 0.91, 0.73, 0.50, 0.29, 0.14],
    [1.00, 0.97, 0.88, 0.71, 0.50, 0.30],
    [1.00, 0.99, 0.95, 0.86, 0.69, 0.47],
];

/// Post-plant P(T wins), `[t_alive][ct_alive]`.
const POST_PLANT: [[f64; 6]; 6] = [
    [1.00, 0.30, 0.25, 0.20, 0.15, 0.10],
    [1.00, 0.62, 0.40, 0.25, 0.15, 0.08],
    [1.00, 0.82, 0.62, 0.42, 0.27, 0.16],
    [1.00, 0.92, 0.78, 0.60, 0.42, 0.28],
    [1.00, 0.96, 0.88, 0.75, 0.58, 0.42],
    [1.00, 0.98, 0.94, 0.85, 0.72, 0.56],
];

/// Matrix lookup with alive counts clamped to the 5v5 range.
#[must_use]
pub fn base_probability(t_alive: usize, ct_alive: usize, planted: bool) -> f64 {
    let t = t_alive.min(5);
    let ct = ct_alive.min(5);
    if planted { POST_PLANT[t][ct] } else { PRE_PLANT[t][ct] }
}

/// One player's share of a probability swing, in scaled points.
#[derive(Debug, Clone, PartialEq)]
pub struct WpaDelta {
    /// Credited (positive) or debited (negative) player.
    pub identity: Identity,
    /// Signed amount.
    pub amount: f64,
}

/// Who caused a transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct Actors<'a> {
    /// Killer, damager, planter or defuser.
    pub actor: Option<&'a Identity>,
    /// Flash assister sharing the actor's credit.
    pub flash_assister: Option<&'a Identity>,
    /// Single player on the losing end, if any.
    pub victim: Option<&'a Identity>,
}

/// Live round state plus the last published probability.
#[derive(Debug, Clone)]
pub struct WinProbabilityEngine {
    config: WpaConfig,
    tick_rate: f64,
    round_time_secs: f64,
    bomb_time_secs: f64,
    anchor: Tick,
    hp: [i64; 2],
    economy: f64,
    ct_kits: usize,
    planted_at: Option<Tick>,
    resolved: Option<Side>,
    probability: f64,
    frozen: bool,
}

impl WinProbabilityEngine {
    /// Build an engine from engine configuration.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.wpa.clone(),
            tick_rate: config.timing.tick_rate,
            round_time_secs: config.timing.round_time_secs,
            bomb_time_secs: config.timing.bomb_time_secs,
            anchor: 0,
            hp: [0, 0],
            economy: 0.0,
            ct_kits: 0,
            planted_at: None,
            resolved: None,
            probability: 0.5,
            frozen: false,
        }
    }

    /// Last published P(T wins).
    #[must_use]
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Whether the round's outcome has been reconciled.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Round-start economy modifier.
    #[must_use]
    pub fn economy_modifier(&self) -> f64 {
        self.economy
    }

    /// Update the number of alive CTs carrying a kit.
    pub fn set_ct_kits(&mut self, kits: usize) {
        self.ct_kits = kits;
    }

    /// Applied damage to a player on `victim_side`.
    pub fn on_damage(
        &mut self,
        tick: Tick,
        roster: &RoundRoster,
        victim_side: Side,
        applied: u32,
        actors: Actors<'_>,
    ) -> Vec<WpaDelta> {
        self.hp[victim_side.index()] -= i64::from(applied);
        self.transition(tick, roster, actors)
    }

    /// A death; `remaining_hp` is what the victim still had. Call after the
    /// victim has been removed from the alive sets.
    pub fn on_kill(
        &mut self,
        tick: Tick,
        roster: &RoundRoster,
        victim_side: Side,
        remaining_hp: u32,
        actors: Actors<'_>,
    ) -> Vec<WpaDelta> {
        self.hp[victim_side.index()] -= i64::from(remaining_hp);
        self.transition(tick, roster, actors)
    }

    /// The bomb was planted by `planter`.
    pub fn on_plant(
        &mut self,
        tick: Tick,
        roster: &RoundRoster,
        planter: &Identity,
    ) -> Vec<WpaDelta> {
        self.planted_at.get_or_insert(tick);
        self.transition(
            tick,
            roster,
            Actors {
                actor: Some(planter),
                ..Actors::default()
            },
        )
    }

    /// The bomb was defused by `defuser`.
    pub fn on_defuse(
        &mut self,
        tick: Tick,
        roster: &RoundRoster,
        defuser: &Identity,
    ) -> Vec<WpaDelta> {
        self.resolved = Some(Side::CT);
        self.transition(
            tick,
            roster,
            Actors {
                actor: Some(defuser),
                ..Actors::default()
            },
        )
    }

    /// The bomb exploded.
    pub fn on_explode(&mut self, tick: Tick, roster: &RoundRoster) -> Vec<WpaDelta> {
        self.resolved = Some(Side::T);
        self.transition(tick, roster, Actors::default())
    }

    /// Force P to exactly 0 or 1 for the winner and freeze the engine.
    pub fn reconcile(&mut self, winner: Side, roster: &RoundRoster) -> Vec<WpaDelta> {
        if self.frozen {
            return Vec::new();
        }
        let target = match winner {
            Side::T => 1.0,
            Side::CT => 0.0,
        };
        let deltas = self.attribute(target - self.probability, roster, Actors::default());
        self.probability = target;
        self.frozen = true;
        deltas
    }

    /// Current estimate of P(T wins) at `tick`.
    #[must_use]
    pub fn estimate(&self, tick: Tick, roster: &RoundRoster) -> f64 {
        match self.resolved {
            Some(Side::T) => return 1.0,
            Some(Side::CT) => return 0.0,
            None => {}
        }
        let t_alive = roster.alive_count(Side::T);
        let ct_alive = roster.alive_count(Side::CT);
        let planted = self.planted_at.is_some();

        if ct_alive == 0 && (t_alive > 0 || planted) {
            return 1.0;
        }
        if t_alive == 0 && !planted {
            return 0.0;
        }

        let mut p = base_probability(t_alive, ct_alive, planted);

        p += if planted {
            self.economy * self.config.post_plant_econ_factor
        } else {
            self.economy
        };

        if self.config.hp_divisor > 0.0 {
            let diff = (self.hp[Side::T.index()] - self.hp[Side::CT.index()]) as f64;
            p += self.config.hp_weight * (diff / self.config.hp_divisor).clamp(-1.0, 1.0);
        }

        match self.planted_at {
            None => {
                let elapsed = ticks_to_secs(tick - self.anchor, self.tick_rate);
                let remaining = (self.round_time_secs - elapsed).max(0.0);
                let window = self.config.panic_window_secs;
                if window > 0.0 && remaining < window {
                    let ramp = ((window - remaining) / window).powi(3);
                    p *= 1.0 - ramp;
                }
            }
            Some(planted_at) => {
                let elapsed = ticks_to_secs(tick - planted_at, self.tick_rate).max(0.0);
                if self.bomb_time_secs > 0.0 {
                    let progress = (elapsed / self.bomb_time_secs).clamp(0.0, 1.0);
                    p += (1.0 - p) * progress.powi(2) * self.config.post_plant_acceleration;
                }
                let left = self.bomb_time_secs - elapsed;
                if self.ct_kits == 0 && left < self.config.no_kit_defuse_secs {
                    p = 1.0;
                }
            }
        }

        p.clamp(0.0, 1.0)
    }

    fn transition(
        &mut self,
        tick: Tick,
        roster: &RoundRoster,
        actors: Actors<'_>,
    ) -> Vec<WpaDelta> {
        if self.frozen {
            return Vec::new();
        }
        let next = self.estimate(tick, roster);
        let deltas = self.attribute(next - self.probability, roster, actors);
        self.probability = next;
        deltas
    }

    /// Split `change` (in probability units) into zero-sum deltas.
    fn attribute(&self, change: f64, roster: &RoundRoster, actors: Actors<'_>) -> Vec<WpaDelta> {
        if change.abs() < f64::EPSILON {
            return Vec::new();
        }
        let gaining = if change > 0.0 { Side::T } else { Side::CT };
        let losing = gaining.opposite();
        let magnitude = change.abs() * self.config.scale;

        fn on<'a>(
            roster: &RoundRoster,
            id: Option<&'a Identity>,
            side: Side,
        ) -> Option<&'a Identity> {
            id.filter(|p| roster.side_of(p) == Some(side))
        }

        let mut credits: BTreeMap<Identity, f64> = BTreeMap::new();
        if let Some(actor) = on(roster, actors.actor, gaining) {
            match on(roster, actors.flash_assister, gaining).filter(|a| *a != actor) {
                Some(assister) => {
                    let share = self.config.flash_assist_share.clamp(0.0, 1.0);
                    *credits.entry(actor.clone()).or_default() += magnitude * (1.0 - share);
                    *credits.entry(assister.clone()).or_default() += magnitude * share;
                }
                None => {
                    credits.insert(actor.clone(), magnitude);
                }
            }
        } else {
            spread(&mut credits, &roster.spread_targets(gaining), magnitude);
        }

        let mut debits: BTreeMap<Identity, f64> = BTreeMap::new();
        if let Some(victim) = on(roster, actors.victim, losing) {
            debits.insert(victim.clone(), magnitude);
        } else {
            spread(&mut debits, &roster.spread_targets(losing), magnitude);
        }

        if credits.is_empty() || debits.is_empty() {
            return Vec::new();
        }

        credits
            .into_iter()
            .map(|(identity, amount)| WpaDelta { identity, amount })
            .chain(
                debits
                    .into_iter()
                    .map(|(identity, amount)| WpaDelta { identity, amount: -amount }),
            )
            .collect()
    }
}

fn spread(into: &mut BTreeMap<Identity, f64>, targets: &[Identity], magnitude: f64) {
    if targets.is_empty() {
        return;
    }
    let share = magnitude / targets.len() as f64;
    for id in targets {
        *into.entry(id.clone()).or_default() += share;
    }
}

impl RoundHook for WinProbabilityEngine {
    fn on_round_open(&mut self, round: &RoundOpen<'_>) {
        self.anchor = round.tick;
        self.planted_at = None;
        self.resolved = None;
        self.frozen = false;
        self.ct_kits = round.ct_kits;

        let full = i64::from(FULL_HEALTH);
        self.hp = [
            round.roster.alive_count(Side::T) as i64 * full,
            round.roster.alive_count(Side::CT) as i64 * full,
        ];

        let side_value = |side: Side| -> u32 {
            round
                .roster
                .members_of(side)
                .map(|id| round.start_values.get(id).copied().unwrap_or(MIN_LOADOUT_VALUE))
                .sum()
        };
        self.economy = economy::economy_modifier(
            side_value(Side::T),
            side_value(Side::CT),
            self.config.econ_divisor,
            self.config.econ_weight,
        );

        self.probability = self.estimate(round.tick, round.roster);
    }

    fn on_round_close(&mut self, _round: &RoundClose<'_>) {
        self.frozen = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s)
    }

    fn roster() -> RoundRoster {
        RoundRoster::new(
            ["t1", "t2", "t3", "t4", "t5"]
                .iter()
                .map(|s| (id(s), Side::T))
                .chain(["c1", "c2", "c3", "c4", "c5"].iter().map(|s| (id(s), Side::CT))),
        )
    }

    fn opened(roster: &RoundRoster) -> WinProbabilityEngine {
        let mut engine = WinProbabilityEngine::new(&EngineConfig::default());
        let values = BTreeMap::new();
        engine.on_round_open(&RoundOpen {
            number: 1,
            tick: 0,
            roster,
            start_values: &values,
            ct_kits: 1,
        });
        engine
    }

    fn sum(deltas: &[WpaDelta]) -> f64 {
        deltas.iter().map(|d| d.amount).sum()
    }

    #[test]
    fn matrix_corners() {
        assert!((base_probability(5, 5, false) - 0.47).abs() < 1e-12);
        assert!(base_probability(0, 3, false).abs() < 1e-12);
        assert!((base_probability(2, 0, false) - 1.0).abs() < 1e-12);
        assert!((base_probability(0, 1, true) - 0.30).abs() < 1e-12);
        assert!((base_probability(9, 9, true) - 0.56).abs() < 1e-12);
    }

    #[test]
    fn even_round_starts_at_matrix_value() {
        let roster = roster();
        let engine = opened(&roster);
        assert!((engine.probability() - 0.47).abs() < 1e-9);
    }

    #[test]
    fn kill_credits_killer_and_debits_victim() {
        let mut roster = roster();
        let mut engine = opened(&roster);
        roster.kill(&id("c1"));
        let deltas = engine.on_kill(
            64,
            &roster,
            Side::CT,
            100,
            Actors {
                actor: Some(&id("t1")),
                flash_assister: Some(&id("t2")),
                victim: Some(&id("c1")),
            },
        );
        assert_eq!(deltas.len(), 3);
        assert!(sum(&deltas).abs() < 1e-6);
        let killer = deltas.iter().find(|d| d.identity == id("t1")).expect("killer");
        let assister = deltas.iter().find(|d| d.identity == id("t2")).expect("assister");
        assert!((killer.amount - assister.amount * 3.0).abs() < 1e-9);
        assert!(deltas.iter().any(|d| d.identity == id("c1") && d.amount < 0.0));
    }

    #[test]
    fn plant_spreads_debit_over_defenders() {
        let roster = roster();
        let mut engine = opened(&roster);
        let deltas = engine.on_plant(640, &roster, &id("t3"));
        assert!(sum(&deltas).abs() < 1e-6);
        assert_eq!(deltas.iter().filter(|d| d.amount < 0.0).count(), 5);
        assert!(engine.probability() > 0.47);
    }

    #[test]
    fn teamkill_credit_is_spread() {
        let mut roster = roster();
        let mut engine = opened(&roster);
        roster.kill(&id("t2"));
        let deltas = engine.on_kill(
            10,
            &roster,
            Side::T,
            100,
            Actors {
                actor: Some(&id("t1")),
                victim: Some(&id("t2")),
                ..Actors::default()
            },
        );
        assert!(sum(&deltas).abs() < 1e-6);
        assert!(deltas.iter().all(|d| d.identity != id("t1") || d.amount < 0.0));
    }

    #[test]
    fn reconcile_reaches_certainty_and_freezes() {
        let roster = roster();
        let mut engine = opened(&roster);
        let deltas = engine.reconcile(Side::CT, &roster);
        assert!(sum(&deltas).abs() < 1e-6);
        assert!(engine.probability().abs() < f64::EPSILON);
        assert!(engine.is_frozen());
        assert!(engine.on_plant(100, &roster, &id("t1")).is_empty());
        assert!(engine.reconcile(Side::T, &roster).is_empty());
    }

    #[test]
    fn no_kit_late_bomb_is_certain() {
        let roster = roster();
        let mut engine = opened(&roster);
        engine.set_ct_kits(0);
        engine.on_plant(0, &roster, &id("t1"));
        let late = 64 * 35;
        assert!((engine.estimate(late, &roster) - 1.0).abs() < f64::EPSILON);
        engine.set_ct_kits(1);
        assert!(engine.estimate(late, &roster) < 1.0);
    }

    #[test]
    fn panic_ramp_favours_defenders_late() {
        let roster = roster();
        let engine = opened(&roster);
        let early = engine.estimate(64, &roster);
        let late = engine.estimate(64 * 110, &roster);
        assert!(late < early);
        assert!(engine.estimate(64 * 200, &roster).abs() < 1e-12);
    }
}
