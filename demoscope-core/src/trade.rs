//! Trade detection.
//!
//! A trade happens when player A kills V within the trade window after V
//! killed A's teammate B. A is flagged `traded` and pays a small penalty
//! (B softened V up); B is flagged `was_traded` and earns a bonus that
//! decays linearly across the window. Both magnitudes scale with the damage
//! B dealt to V, capped at `damage_cap`.

use std::collections::{BTreeMap, VecDeque};

use crate::config::EngineConfig;
use crate::round::{RoundClose, RoundHook, RoundOpen};
use crate::types::{Identity, Side, Tick};

/// A recent death kept for trade lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct DeathRecord {
    /// Who died.
    pub victim: Identity,
    /// Their side at the time.
    pub victim_side: Option<Side>,
    /// Who killed them.
    pub killer: Option<Identity>,
    /// When.
    pub tick: Tick,
    /// Whether this death has already been avenged.
    pub traded: bool,
}

/// A detected trade.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeOutcome {
    /// The player who got the avenging kill.
    pub trader: Identity,
    /// The teammate whose death was avenged.
    pub avenged: Identity,
    /// Penalty charged to the trader.
    pub penalty: f64,
    /// Bonus credited to the avenged teammate.
    pub bonus: f64,
}

/// Bounded recent-death history plus per-round damage dealt between pairs.
#[derive(Debug, Clone)]
pub struct TradeDetector {
    window_ticks: Tick,
    history_len: usize,
    penalty_weight: f64,
    bonus_weight: f64,
    damage_cap: u32,
    recent: VecDeque<DeathRecord>,
    damage: BTreeMap<(Identity, Identity), u32>,
}

impl TradeDetector {
    /// Build a detector from engine configuration.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            window_ticks: config.trade_window_ticks().max(1),
            history_len: config.trade.history_len.max(1),
            penalty_weight: config.trade.penalty_weight,
            bonus_weight: config.trade.bonus_weight,
            damage_cap: config.trade.damage_cap.max(1),
            recent: VecDeque::new(),
            damage: BTreeMap::new(),
        }
    }

    /// Record applied damage from `attacker` to `victim`.
    pub fn record_damage(&mut self, attacker: &Identity, victim: &Identity, applied: u32) {
        *self
            .damage
            .entry((attacker.clone(), victim.clone()))
            .or_insert(0) += applied;
    }

    /// Process a kill: detect trades it completes, then remember the death.
    pub fn on_kill(
        &mut self,
        tick: Tick,
        attacker: Option<(&Identity, Side)>,
        victim: &Identity,
        victim_side: Option<Side>,
    ) -> Vec<TradeOutcome> {
        let mut outcomes = Vec::new();

        if let Some((trader, trader_side)) = attacker {
            let cap = f64::from(self.damage_cap);
            for record in &mut self.recent {
                let elapsed = tick - record.tick;
                let avenges = !record.traded
                    && record.killer.as_ref() == Some(victim)
                    && record.victim_side == Some(trader_side)
                    && record.victim != *trader
                    && (0..=self.window_ticks).contains(&elapsed);
                if !avenges {
                    continue;
                }
                record.traded = true;

                let dealt = self
                    .damage
                    .get(&(record.victim.clone(), victim.clone()))
                    .copied()
                    .unwrap_or(0)
                    .min(self.damage_cap);
                let ratio = f64::from(dealt) / cap;
                let decay = 1.0 - elapsed as f64 / self.window_ticks as f64;

                outcomes.push(TradeOutcome {
                    trader: trader.clone(),
                    avenged: record.victim.clone(),
                    penalty: ratio * self.penalty_weight,
                    bonus: ratio * self.bonus_weight * decay.clamp(0.0, 1.0),
                });
            }
        }

        self.recent.push_back(DeathRecord {
            victim: victim.clone(),
            victim_side,
            killer: attacker.map(|(id, _)| id.clone()),
            tick,
            traded: false,
        });
        while self.recent.len() > self.history_len {
            self.recent.pop_front();
        }

        outcomes
    }

    /// Clear all round-scoped state.
    pub fn reset(&mut self) {
        self.recent.clear();
        self.damage.clear();
    }
}

impl RoundHook for TradeDetector {
    fn on_round_open(&mut self, _round: &RoundOpen<'_>) {
        self.reset();
    }

    fn on_round_close(&mut self, _round: &RoundClose<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s)
    }

    fn detector() -> TradeDetector {
        TradeDetector::new(&EngineConfig::default())
    }

    #[test]
    fn trade_within_window_flags_both_players() {
        let mut trades = detector();
        // B hits V for 60, V kills B, A kills V two seconds later.
        trades.record_damage(&id("b"), &id("v"), 60);
        assert!(trades
            .on_kill(1000, Some((&id("v"), Side::CT)), &id("b"), Some(Side::T))
            .is_empty());
        let outcomes = trades.on_kill(1128, Some((&id("a"), Side::T)), &id("v"), Some(Side::CT));

        assert_eq!(outcomes.len(), 1);
        let trade = &outcomes[0];
        assert_eq!(trade.trader, id("a"));
        assert_eq!(trade.avenged, id("b"));
        assert!((trade.penalty - 0.6 * 0.15).abs() < 1e-9);
        assert!((trade.bonus - 0.6 * 0.20 * 0.5).abs() < 1e-9);
    }

    #[test]
    fn kill_outside_window_is_not_a_trade() {
        let mut trades = detector();
        trades.on_kill(0, Some((&id("v"), Side::CT)), &id("b"), Some(Side::T));
        let outcomes = trades.on_kill(257, Some((&id("a"), Side::T)), &id("v"), Some(Side::CT));
        assert!(outcomes.is_empty());
    }

    #[test]
    fn avenging_an_enemy_is_not_a_trade() {
        let mut trades = detector();
        trades.on_kill(0, Some((&id("v"), Side::CT)), &id("b"), Some(Side::CT));
        let outcomes = trades.on_kill(10, Some((&id("a"), Side::T)), &id("v"), Some(Side::CT));
        assert!(outcomes.is_empty());
    }

    #[test]
    fn damage_is_capped() {
        let mut trades = detector();
        trades.record_damage(&id("b"), &id("v"), 90);
        trades.record_damage(&id("b"), &id("v"), 90);
        trades.on_kill(0, Some((&id("v"), Side::CT)), &id("b"), Some(Side::T));
        let outcomes = trades.on_kill(0, Some((&id("a"), Side::T)), &id("v"), Some(Side::CT));
        assert!((outcomes[0].penalty - 0.15).abs() < 1e-9);
        assert!((outcomes[0].bonus - 0.20).abs() < 1e-9);
    }

    #[test]
    fn history_is_bounded() {
        let mut trades = detector();
        for i in 0..50 {
            trades.on_kill(i, None, &id(&format!("p{i}")), Some(Side::T));
        }
        assert_eq!(trades.recent.len(), 10);
    }
}
