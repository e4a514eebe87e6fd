//! Round and match rating.
//!
//! Round = Kill + Survival + Damage + Impact + KAST + Economy + TradeAdj
//!
//! Where:
//!   Kill     = kills / kill_divisor · kill_weight
//!   Survival = survival_score if alive at round end
//!   Damage   = applied damage / damage_divisor · damage_weight
//!   Impact   = step(kills, entry) / impact_divisor · impact_weight
//!   KAST     = kast_score on a kill, assist, survival or trade
//!   Economy  = log2(1 + kill_value / (start_value + econ_base_value)) · econ_weight
//!   TradeAdj = trade_bonus − trade_penalty
//!
//! Match rating = mean(round) · calibration.

use crate::config::RatingConfig;
use crate::stats::PlayerRoundStats;

/// Per-term breakdown of a round rating.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RatingBreakdown {
    /// Kill term.
    pub kill: f64,
    /// Survival term.
    pub survival: f64,
    /// Damage term.
    pub damage: f64,
    /// Raw impact step before scaling.
    pub impact_steps: f64,
    /// Scaled impact term.
    pub impact: f64,
    /// KAST term.
    pub kast: f64,
    /// Economy-efficiency term.
    pub economy: f64,
    /// Trade bonus minus trade penalty.
    pub trade: f64,
}

impl RatingBreakdown {
    /// Sum of all terms.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.kill
            + self.survival
            + self.damage
            + self.impact
            + self.kast
            + self.economy
            + self.trade
    }
}

/// Impact step table on kill count, plus the entry-kill bonus.
#[must_use]
pub fn impact_steps(kills: u32, entry_kill: bool) -> f64 {
    let base = match kills {
        0 => 0.0,
        1 => 1.0,
        2 => 2.2,
        _ => 3.5,
    };
    if entry_kill { base + 0.5 } else { base }
}

/// Compute the rating breakdown for one player's round.
#[must_use]
pub fn compute_breakdown(
    stats: &PlayerRoundStats,
    start_value: u32,
    config: &RatingConfig,
) -> RatingBreakdown {
    let kill = ratio(f64::from(stats.kills), config.kill_divisor) * config.kill_weight;
    let survival = if stats.survived { config.survival_score } else { 0.0 };
    let damage = ratio(f64::from(stats.damage), config.damage_divisor) * config.damage_weight;

    let steps = impact_steps(stats.kills, stats.entry_kill);
    let impact = ratio(steps, config.impact_divisor) * config.impact_weight;

    let kast = if stats.has_kast() { config.kast_score } else { 0.0 };

    let economy = if stats.kills > 0 && stats.kill_value > 0 {
        let denominator = f64::from(start_value) + config.econ_base_value;
        (1.0 + ratio(f64::from(stats.kill_value), denominator)).log2() * config.econ_weight
    } else {
        0.0
    };

    RatingBreakdown {
        kill,
        survival,
        damage,
        impact_steps: steps,
        impact,
        kast,
        economy,
        trade: stats.trade_bonus - stats.trade_penalty,
    }
}

/// `sum / rounds · calibration`, zero for a player with no rounds.
#[must_use]
pub fn match_rating(rating_sum: f64, rounds: u32, calibration: f64) -> f64 {
    if rounds == 0 {
        return 0.0;
    }
    rating_sum / f64::from(rounds) * calibration
}

/// Derived WE score.
#[must_use]
pub fn we_score(rating: f64) -> f64 {
    rating * 0.9 + 0.1
}

/// Average applied damage per round.
#[must_use]
pub fn adr(damage: u32, rounds: u32) -> f64 {
    if rounds == 0 {
        return 0.0;
    }
    f64::from(damage) / f64::from(rounds)
}

/// Headshot-kill percentage, zero without kills.
#[must_use]
pub fn hs_rate(headshots: u32, kills: u32) -> f64 {
    if kills == 0 {
        return 0.0;
    }
    f64::from(headshots) / f64::from(kills) * 100.0
}

fn ratio(value: f64, divisor: f64) -> f64 {
    if divisor <= 0.0 { 0.0 } else { value / divisor }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn idle_dead_player_scores_zero() {
        let stats = PlayerRoundStats::new(Side::T);
        let b = compute_breakdown(&stats, 800, &RatingConfig::default());
        assert!(approx(b.total(), 0.0));
    }

    #[test]
    fn survivor_gets_survival_and_kast() {
        let mut stats = PlayerRoundStats::new(Side::CT);
        stats.survived = true;
        let b = compute_breakdown(&stats, 800, &RatingConfig::default());
        assert!(approx(b.total(), 0.30 + 0.20));
    }

    #[test]
    fn entry_double_kill() {
        let mut stats = PlayerRoundStats::new(Side::T);
        stats.kills = 2;
        stats.entry_kill = true;
        stats.damage = 160;
        stats.kill_value = 1500;
        let b = compute_breakdown(&stats, 1000, &RatingConfig::default());

        assert!(approx(b.kill, 2.0 / 0.75 * 0.25));
        assert!(approx(b.damage, 2.0 * 0.15));
        assert!(approx(b.impact_steps, 2.7));
        assert!(approx(b.impact, 2.7 / 1.3 * 0.25));
        assert!(approx(b.kast, 0.20));
        assert!(approx(b.economy, 2.0_f64.log2() * 0.10));
    }

    #[test]
    fn trade_adjustment_is_bonus_minus_penalty() {
        let mut stats = PlayerRoundStats::new(Side::T);
        stats.traded = true;
        stats.trade_penalty = 0.09;
        let b = compute_breakdown(&stats, 0, &RatingConfig::default());
        assert!(approx(b.trade, -0.09));
        assert!(approx(b.kast, 0.20));
    }

    #[test]
    fn ratios_guard_zero_denominators() {
        assert!(approx(match_rating(3.0, 0, 1.3), 0.0));
        assert!(approx(match_rating(2.0, 2, 1.3), 1.3));
        assert!(approx(adr(0, 0), 0.0));
        assert!(approx(hs_rate(0, 0), 0.0));
        assert!(approx(hs_rate(1, 4), 25.0));
        assert!(approx(we_score(1.0), 1.0));
    }
}
