//! Configuration for the demoscope engine.
//!
//! Maps directly to `demoscope.toml`. Every field has a serde default, so an
//! empty document yields the stock tuning.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tick rate, round clock and side-swap settings.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Trade detection tuning.
    #[serde(default)]
    pub trade: TradeConfig,
    /// Rating formula constants.
    #[serde(default)]
    pub rating: RatingConfig,
    /// Win-probability model constants.
    #[serde(default)]
    pub wpa: WpaConfig,
    /// "Our" roster and display-name aliases.
    #[serde(default)]
    pub roster: RosterConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `DemoError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::DemoError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Trade window expressed in ticks.
    #[must_use]
    pub fn trade_window_ticks(&self) -> crate::types::Tick {
        crate::types::secs_to_ticks(self.trade.window_secs, self.timing.tick_rate)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Clock and round-structure settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Simulation ticks per second.
    #[serde(default = "default_64")]
    pub tick_rate: f64,
    /// Round clock after freeze time, in seconds.
    #[serde(default = "default_115")]
    pub round_time_secs: f64,
    /// Bomb fuse after plant, in seconds.
    #[serde(default = "default_40")]
    pub bomb_time_secs: f64,
    /// How far back a freeze-end may lie before a match start and still be
    /// re-synthesized as the first round's anchor.
    #[serde(default = "default_20_0")]
    pub freeze_sync_tolerance_secs: f64,
    /// Lowest relative time a timeline entry may carry.
    #[serde(default = "default_20_0")]
    pub timeline_slack_secs: f64,
    /// First round of the second half.
    #[serde(default = "default_13")]
    pub side_swap_round: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_rate: 64.0,
            round_time_secs: 115.0,
            bomb_time_secs: 40.0,
            freeze_sync_tolerance_secs: 20.0,
            timeline_slack_secs: 20.0,
            side_swap_round: 13,
        }
    }
}

/// Trade detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeConfig {
    /// Maximum delay between the two deaths, in seconds.
    #[serde(default = "default_4_0")]
    pub window_secs: f64,
    /// How many recent deaths are searched.
    #[serde(default = "default_10")]
    pub history_len: usize,
    /// Penalty weight applied to the trading player.
    #[serde(default = "default_0_15")]
    pub penalty_weight: f64,
    /// Bonus weight applied to the avenged player.
    #[serde(default = "default_0_2")]
    pub bonus_weight: f64,
    /// Damage above this value does not increase trade magnitudes.
    #[serde(default = "default_100")]
    pub damage_cap: u32,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            window_secs: 4.0,
            history_len: 10,
            penalty_weight: 0.15,
            bonus_weight: 0.20,
            damage_cap: 100,
        }
    }
}

/// Rating formula constants.
///
/// `round = kills/kill_divisor·kill_weight + survival + damage/damage_divisor·damage_weight
///  + impact/impact_divisor·impact_weight + kast + econ + trade_adj`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingConfig {
    /// Kills-per-round baseline.
    #[serde(default = "default_0_75")]
    pub kill_divisor: f64,
    /// Weight of the kill term.
    #[serde(default = "default_0_25")]
    pub kill_weight: f64,
    /// Flat credit for surviving the round.
    #[serde(default = "default_0_3")]
    pub survival_score: f64,
    /// Damage-per-round baseline.
    #[serde(default = "default_80")]
    pub damage_divisor: f64,
    /// Weight of the damage term.
    #[serde(default = "default_0_15")]
    pub damage_weight: f64,
    /// Impact baseline.
    #[serde(default = "default_1_3")]
    pub impact_divisor: f64,
    /// Weight of the impact term.
    #[serde(default = "default_0_25")]
    pub impact_weight: f64,
    /// Flat credit for KAST participation.
    #[serde(default = "default_0_2")]
    pub kast_score: f64,
    /// Weight of the economy-efficiency term.
    #[serde(default = "default_0_1")]
    pub econ_weight: f64,
    /// Added to the start loadout value in the economy term.
    #[serde(default = "default_500")]
    pub econ_base_value: f64,
    /// Match-level calibration multiplier.
    #[serde(default = "default_1_3")]
    pub calibration: f64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            kill_divisor: 0.75,
            kill_weight: 0.25,
            survival_score: 0.30,
            damage_divisor: 80.0,
            damage_weight: 0.15,
            impact_divisor: 1.3,
            impact_weight: 0.25,
            kast_score: 0.20,
            econ_weight: 0.10,
            econ_base_value: 500.0,
            calibration: 1.30,
        }
    }
}

/// Win-probability model constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WpaConfig {
    /// Probability deltas are multiplied by this before attribution.
    #[serde(default = "default_100_f64")]
    pub scale: f64,
    /// Share of a kill's credit that goes to the flash assister.
    #[serde(default = "default_0_25")]
    pub flash_assist_share: f64,
    /// Economy modifier weight (`sign(diff)·ln(1+|diff|/econ_divisor)·econ_weight`).
    #[serde(default = "default_0_15")]
    pub econ_weight: f64,
    /// Economy modifier divisor.
    #[serde(default = "default_5000")]
    pub econ_divisor: f64,
    /// Fraction of the economy modifier still applied after the plant.
    #[serde(default = "default_0_3")]
    pub post_plant_econ_factor: f64,
    /// HP differential weight.
    #[serde(default = "default_0_05")]
    pub hp_weight: f64,
    /// HP differential normalizer.
    #[serde(default = "default_500")]
    pub hp_divisor: f64,
    /// Pre-plant panic window, in seconds before the round clock expires.
    #[serde(default = "default_30")]
    pub panic_window_secs: f64,
    /// Strength of the post-plant acceleration toward a T win.
    #[serde(default = "default_0_5")]
    pub post_plant_acceleration: f64,
    /// Without a defuse kit, the bomb cannot be defused below this many seconds.
    #[serde(default = "default_10_0")]
    pub no_kit_defuse_secs: f64,
}

impl Default for WpaConfig {
    fn default() -> Self {
        Self {
            scale: 100.0,
            flash_assist_share: 0.25,
            econ_weight: 0.15,
            econ_divisor: 5000.0,
            post_plant_econ_factor: 0.3,
            hp_weight: 0.05,
            hp_divisor: 500.0,
            panic_window_secs: 30.0,
            post_plant_acceleration: 0.5,
            no_kit_defuse_secs: 10.0,
        }
    }
}

/// "Our" roster plus display-name aliases.
///
/// This is external data; the engine only reads it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterConfig {
    /// Roster members.
    #[serde(default)]
    pub members: Vec<RosterMember>,
}

/// A single roster entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterMember {
    /// Canonical roster name.
    pub name: String,
    /// In-game names that resolve to `name`.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl RosterConfig {
    /// Whether `resolved_name` names a roster member (case-insensitive).
    #[must_use]
    pub fn contains_name(&self, resolved_name: &str) -> bool {
        self.members
            .iter()
            .any(|m| m.name.eq_ignore_ascii_case(resolved_name.trim()))
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_13() -> u32 { 13 }
fn default_10() -> usize { 10 }
fn default_100() -> u32 { 100 }
fn default_0_05() -> f64 { 0.05 }
fn default_0_1() -> f64 { 0.1 }
fn default_0_15() -> f64 { 0.15 }
fn default_0_2() -> f64 { 0.2 }
fn default_0_25() -> f64 { 0.25 }
fn default_0_3() -> f64 { 0.3 }
fn default_0_5() -> f64 { 0.5 }
fn default_0_75() -> f64 { 0.75 }
fn default_1_3() -> f64 { 1.3 }
fn default_4_0() -> f64 { 4.0 }
fn default_10_0() -> f64 { 10.0 }
fn default_20_0() -> f64 { 20.0 }
fn default_30() -> f64 { 30.0 }
fn default_40() -> f64 { 40.0 }
fn default_64() -> f64 { 64.0 }
fn default_80() -> f64 { 80.0 }
fn default_100_f64() -> f64 { 100.0 }
fn default_115() -> f64 { 115.0 }
fn default_500() -> f64 { 500.0 }
fn default_5000() -> f64 { 5000.0 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = EngineConfig::from_toml("").expect("empty config parses");
        assert!((config.timing.tick_rate - 64.0).abs() < f64::EPSILON);
        assert_eq!(config.timing.side_swap_round, 13);
        assert!((config.rating.calibration - 1.30).abs() < f64::EPSILON);
        assert!(config.roster.members.is_empty());
    }

    #[test]
    fn partial_toml_overrides_single_fields() {
        let config = EngineConfig::from_toml(
            r#"
            [timing]
            tick_rate = 128.0

            [[roster.members]]
            name = "alpha"
            aliases = ["a1pha", "ALPHA_TV"]
            "#,
        )
        .expect("valid config");
        assert!((config.timing.tick_rate - 128.0).abs() < f64::EPSILON);
        assert!((config.timing.round_time_secs - 115.0).abs() < f64::EPSILON);
        assert!(config.roster.contains_name("Alpha"));
        assert_eq!(config.trade_window_ticks(), 512);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        assert!(matches!(
            EngineConfig::from_toml("timing = 5"),
            Err(crate::DemoError::Config(_))
        ));
    }
}
