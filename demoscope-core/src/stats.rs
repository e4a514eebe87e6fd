//! Per-round and per-match player statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clutch::{self, ClutchOutcome, ClutchResolution};
use crate::rating::{self, RatingBreakdown};
use crate::types::{Identity, Side};

/// Grenade usage and flash effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtilityCounts {
    /// Smokes detonated.
    pub smokes: u32,
    /// Flashbangs detonated.
    pub flashes: u32,
    /// HE grenades detonated.
    pub he: u32,
    /// Molotovs / incendiaries detonated.
    pub molotovs: u32,
    /// Opponents blinded.
    pub enemies_flashed: u32,
    /// Total opponent blind time inflicted, in seconds.
    pub blind_time: f64,
    /// Kills assisted with a flash.
    pub flash_assists: u32,
}

impl UtilityCounts {
    fn absorb(&mut self, other: &Self) {
        self.smokes += other.smokes;
        self.flashes += other.flashes;
        self.he += other.he;
        self.molotovs += other.molotovs;
        self.enemies_flashed += other.enemies_flashed;
        self.blind_time += other.blind_time;
        self.flash_assists += other.flash_assists;
    }
}

/// One player's contribution to one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRoundStats {
    /// Side played this round.
    pub side: Side,
    /// Kills.
    pub kills: u32,
    /// Deaths (0 or 1).
    pub deaths: u32,
    /// Assists.
    pub assists: u32,
    /// Applied damage to opponents.
    pub damage: u32,
    /// Applied damage dealt with grenades.
    pub utility_damage: u32,
    /// Headshot kills.
    pub headshots: u32,
    /// Got the first kill of the round.
    pub entry_kill: bool,
    /// Was the first death of the round.
    pub entry_death: bool,
    /// Avenged a teammate.
    pub traded: bool,
    /// Was avenged by a teammate.
    pub was_traded: bool,
    /// Penalty from trades made.
    pub trade_penalty: f64,
    /// Bonus from being traded.
    pub trade_bonus: f64,
    /// Impact step value (before scaling).
    pub impact: f64,
    /// Alive at round end.
    pub survived: bool,
    /// Planted the bomb.
    pub planted: bool,
    /// Defused the bomb.
    pub defused: bool,
    /// Combined loadout value of the players killed.
    pub kill_value: u32,
    /// Win probability added, in scaled points.
    pub wpa: f64,
    /// Round rating.
    pub rating: f64,
    /// Grenade usage.
    pub utility: UtilityCounts,
}

impl PlayerRoundStats {
    /// Fresh, all-zero stats for a player on `side`.
    #[must_use]
    pub fn new(side: Side) -> Self {
        Self {
            side,
            kills: 0,
            deaths: 0,
            assists: 0,
            damage: 0,
            utility_damage: 0,
            headshots: 0,
            entry_kill: false,
            entry_death: false,
            traded: false,
            was_traded: false,
            trade_penalty: 0.0,
            trade_bonus: 0.0,
            impact: 0.0,
            survived: false,
            planted: false,
            defused: false,
            kill_value: 0,
            wpa: 0.0,
            rating: 0.0,
            utility: UtilityCounts::default(),
        }
    }

    /// Kill, assist, survival or trade involvement.
    #[must_use]
    pub fn has_kast(&self) -> bool {
        self.kills > 0 || self.assists > 0 || self.survived || self.traded || self.was_traded
    }
}

// ---------------------------------------------------------------------------
// Match-level aggregates
// ---------------------------------------------------------------------------

/// 2K..5K round counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Multikills {
    /// Rounds with exactly two kills.
    pub k2: u32,
    /// Rounds with exactly three kills.
    pub k3: u32,
    /// Rounds with exactly four kills.
    pub k4: u32,
    /// Rounds with five or more kills.
    pub k5: u32,
}

impl Multikills {
    fn record(&mut self, kills: u32) {
        match kills {
            0 | 1 => {}
            2 => self.k2 += 1,
            3 => self.k3 += 1,
            4 => self.k4 += 1,
            _ => self.k5 += 1,
        }
    }
}

/// Won / saved / lost counts for one clutch bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClutchTally {
    /// Clutches won.
    pub won: u32,
    /// Lost but survived.
    pub saved: u32,
    /// Lost and died.
    pub lost: u32,
}

/// A resolved clutch in the player's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClutchRecord {
    /// Round number.
    pub round: u32,
    /// Opponents alive when it started.
    pub opponents: usize,
    /// Kills during the attempt.
    pub kills: u32,
    /// How it ended.
    pub outcome: ClutchOutcome,
}

/// Head-to-head record against one opponent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuelRecord {
    /// Times this player killed the opponent.
    pub kills: u32,
    /// Times the opponent killed this player.
    pub deaths: u32,
}

/// One player's statistics accumulated over the match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMatchStats {
    /// Canonical identity.
    pub steam_id: Identity,
    /// Latest resolved display name.
    pub name: String,
    /// Kills.
    pub kills: u32,
    /// Deaths.
    pub deaths: u32,
    /// Assists.
    pub assists: u32,
    /// Applied damage.
    pub damage: u32,
    /// Applied grenade damage.
    pub utility_damage: u32,
    /// Headshot kills.
    pub headshots: u32,
    /// Rounds with a stats entry.
    pub rounds_played: u32,
    /// Entry kills.
    pub entry_kills: u32,
    /// Entry deaths.
    pub entry_deaths: u32,
    /// Rounds with KAST credit.
    pub kast_rounds: u32,
    /// Match rating.
    pub rating: f64,
    /// Derived WE score.
    pub we: f64,
    /// Average damage per round.
    pub adr: f64,
    /// Headshot-kill percentage.
    pub hs_rate: f64,
    /// KAST percentage.
    pub kast: f64,
    /// Total win probability added.
    pub wpa: f64,
    /// Multikill histogram.
    pub multikills: Multikills,
    /// Clutch tallies keyed `"1v1"`..`"1v5"`.
    pub clutches: BTreeMap<String, ClutchTally>,
    /// Every resolved clutch.
    pub clutch_history: Vec<ClutchRecord>,
    /// Head-to-head records keyed by opponent.
    pub duels: BTreeMap<Identity, DuelRecord>,
    /// Grenade totals.
    pub utility: UtilityCounts,
    /// Sum of round ratings, kept for re-averaging.
    #[serde(skip)]
    pub rating_sum: f64,
}

impl PlayerMatchStats {
    /// Empty stats for a player.
    #[must_use]
    pub fn new(steam_id: Identity, name: impl Into<String>) -> Self {
        Self {
            steam_id,
            name: name.into(),
            kills: 0,
            deaths: 0,
            assists: 0,
            damage: 0,
            utility_damage: 0,
            headshots: 0,
            rounds_played: 0,
            entry_kills: 0,
            entry_deaths: 0,
            kast_rounds: 0,
            rating: 0.0,
            we: 0.0,
            adr: 0.0,
            hs_rate: 0.0,
            kast: 0.0,
            wpa: 0.0,
            multikills: Multikills::default(),
            clutches: BTreeMap::new(),
            clutch_history: Vec::new(),
            duels: BTreeMap::new(),
            utility: UtilityCounts::default(),
            rating_sum: 0.0,
        }
    }

    /// Fold a finalized round into the totals and refresh derived ratios.
    pub fn absorb_round(&mut self, round: &PlayerRoundStats, calibration: f64) {
        self.kills += round.kills;
        self.deaths += round.deaths;
        self.assists += round.assists;
        self.damage += round.damage;
        self.utility_damage += round.utility_damage;
        self.headshots += round.headshots;
        self.rounds_played += 1;
        self.entry_kills += u32::from(round.entry_kill);
        self.entry_deaths += u32::from(round.entry_death);
        self.kast_rounds += u32::from(round.has_kast());
        self.wpa += round.wpa;
        self.rating_sum += round.rating;
        self.multikills.record(round.kills);
        self.utility.absorb(&round.utility);
        self.refresh(calibration);
    }

    /// Record a resolved clutch.
    pub fn absorb_clutch(&mut self, round: u32, resolution: &ClutchResolution) {
        let tally = self
            .clutches
            .entry(clutch::bucket(resolution.attempt.opponents))
            .or_default();
        match resolution.outcome {
            ClutchOutcome::Won => tally.won += 1,
            ClutchOutcome::Saved => tally.saved += 1,
            ClutchOutcome::Lost => tally.lost += 1,
        }
        self.clutch_history.push(ClutchRecord {
            round,
            opponents: resolution.attempt.opponents,
            kills: resolution.attempt.kills,
            outcome: resolution.outcome,
        });
    }

    /// Record a kill of `opponent`.
    pub fn record_duel_kill(&mut self, opponent: &Identity) {
        self.duels.entry(opponent.clone()).or_default().kills += 1;
    }

    /// Record a death to `opponent`.
    pub fn record_duel_death(&mut self, opponent: &Identity) {
        self.duels.entry(opponent.clone()).or_default().deaths += 1;
    }

    fn refresh(&mut self, calibration: f64) {
        self.rating = rating::match_rating(self.rating_sum, self.rounds_played, calibration);
        self.we = rating::we_score(self.rating);
        self.adr = rating::adr(self.damage, self.rounds_played);
        self.hs_rate = rating::hs_rate(self.headshots, self.kills);
        self.kast = if self.rounds_played == 0 {
            0.0
        } else {
            f64::from(self.kast_rounds) / f64::from(self.rounds_played) * 100.0
        };
    }
}

/// Apply a rating breakdown to round stats.
pub fn apply_rating(stats: &mut PlayerRoundStats, breakdown: &RatingBreakdown) {
    stats.impact = breakdown.impact_steps;
    stats.rating = breakdown.total();
}
