//! Round Lifecycle Controller.
//!
//! The single owner of cross-round state. It consumes the tick-ordered
//! event stream, opens and closes rounds, keeps the alive sets, and drives
//! every sub-engine through [`RoundHook`] plus its typed per-event methods.
//!
//! ```text
//!  AwaitingMatchStart ──MatchStart──▶ RoundActive ──RoundEnd──▶ RoundPendingEnd
//!                                        ▲                           │
//!                                        └──RoundStart / FreezeEnd───┘
//!                                              (finalize, then open)
//! ```
//!
//! Events that arrive while a round end is pending ("garbage time") are
//! still attributed to the round that just ended, but no longer move its
//! win probability.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clutch::ClutchTracker;
use crate::config::EngineConfig;
use crate::economy::{self, InventoryTracker};
use crate::error::Result;
use crate::event::{GameEvent, TimedEvent, UtilityKind};
use crate::health::HealthTracker;
use crate::model::{
    Match, MatchLabel, MatchRound, ParseDiagnostics, Score, TimelineEntry, TimelineKind,
};
use crate::normalize::{self, AliasTable, NormalizedLog};
use crate::rating;
use crate::round::{
    decide_winner, PendingRoundEnd, RoundClose, RoundHook, RoundOpen, RoundRoster,
};
use crate::stats::{self, PlayerMatchStats, PlayerRoundStats};
use crate::team::{self, TeamResolution};
use crate::trade::TradeDetector;
use crate::types::{ticks_to_secs, Identity, Side, Tick};
use crate::wpa::{Actors, WinProbabilityEngine, WpaDelta};

/// Weapons whose damage counts as utility damage.
const UTILITY_WEAPONS: &[&str] = &["hegrenade", "inferno", "molotov", "incgrenade"];

/// Controller phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    /// Warmup: gameplay is ignored until the match goes live.
    AwaitingMatchStart,
    /// The match is live; a round is open or will be opened on demand.
    RoundActive,
    /// The round-ending condition was met; finalize on the next round start.
    RoundPendingEnd(PendingRoundEnd),
}

/// State of the round currently being played.
#[derive(Debug, Clone)]
struct RoundContext {
    number: u32,
    anchor: Tick,
    roster: RoundRoster,
    stats: BTreeMap<Identity, PlayerRoundStats>,
    timeline: Vec<TimelineEntry>,
    first_death_seen: bool,
    planted: bool,
    gameplay_events: usize,
    /// Players observed in this round (spawns, team events, gameplay).
    seen: BTreeSet<Identity>,
    /// A spawn or team event arrived since the round opened.
    spawned: bool,
    /// Carried-over players absent from this round have been dropped.
    settled: bool,
}

impl RoundContext {
    fn stats_mut(&mut self, id: &Identity) -> &mut PlayerRoundStats {
        let side = self.roster.side_of(id).unwrap_or(Side::T);
        self.stats
            .entry(id.clone())
            .or_insert_with(|| PlayerRoundStats::new(side))
    }

    /// Make sure `id` is on the roster, returning their side.
    fn ensure_member(&mut self, id: &Identity, fallback: Side) -> Side {
        self.seen.insert(id.clone());
        if let Some(side) = self.roster.side_of(id) {
            return side;
        }
        self.roster.place(id, fallback, true);
        fallback
    }

    fn apply_wpa(&mut self, deltas: Vec<WpaDelta>) {
        for delta in deltas {
            self.stats_mut(&delta.identity).wpa += delta.amount;
        }
    }
}

/// Owns everything one parse needs. Build a fresh controller per log.
#[derive(Debug)]
pub struct RoundLifecycleController {
    config: EngineConfig,
    teams: TeamResolution,
    names: BTreeMap<Identity, String>,
    phase: Phase,
    round: Option<RoundContext>,
    side_map: BTreeMap<Identity, Side>,
    /// Members of the last finalized round; seeds the next roster.
    carry: BTreeSet<Identity>,
    last_freeze_tick: Option<Tick>,
    match_stats: BTreeMap<Identity, PlayerMatchStats>,
    rounds: Vec<MatchRound>,
    score: Score,
    health: HealthTracker,
    inventory: InventoryTracker,
    trades: TradeDetector,
    clutches: ClutchTracker,
    wpa: WinProbabilityEngine,
    diagnostics: ParseDiagnostics,
}

impl RoundLifecycleController {
    /// Create a controller for one match.
    #[must_use]
    pub fn new(
        config: &EngineConfig,
        teams: TeamResolution,
        names: BTreeMap<Identity, String>,
    ) -> Self {
        let diagnostics = ParseDiagnostics {
            roster_strategy: teams.strategy,
            ..ParseDiagnostics::default()
        };
        Self {
            config: config.clone(),
            teams,
            names,
            phase: Phase::AwaitingMatchStart,
            round: None,
            side_map: BTreeMap::new(),
            carry: BTreeSet::new(),
            last_freeze_tick: None,
            match_stats: BTreeMap::new(),
            rounds: Vec::new(),
            score: Score::default(),
            health: HealthTracker::new(),
            inventory: InventoryTracker::new(),
            trades: TradeDetector::new(config),
            clutches: ClutchTracker::new(),
            wpa: WinProbabilityEngine::new(config),
            diagnostics,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Finalized rounds so far.
    #[must_use]
    pub fn rounds(&self) -> &[MatchRound] {
        &self.rounds
    }

    /// Score so far.
    #[must_use]
    pub fn score(&self) -> Score {
        self.score
    }

    /// Return to the warmup state, dropping everything including the side map.
    pub fn reset(&mut self) {
        self.reset_match();
        self.side_map.clear();
        self.last_freeze_tick = None;
        self.phase = Phase::AwaitingMatchStart;
    }

    fn reset_match(&mut self) {
        self.round = None;
        self.carry.clear();
        self.match_stats.clear();
        self.rounds.clear();
        self.score = Score::default();
        self.inventory.clear_all();
        self.health.reset();
        self.trades.reset();
    }

    // -----------------------------------------------------------------------
    // Event dispatch
    // -----------------------------------------------------------------------

    /// Feed one event. Events must arrive in tick order.
    pub fn handle_event(&mut self, timed: &TimedEvent) {
        for (id, team) in &timed.team_hints {
            if let Some(side) = Side::from_team_num(*team) {
                self.assign_side(id, side);
            }
        }

        let tick = timed.tick;
        match &timed.event {
            GameEvent::MatchStart => self.on_match_start(tick),
            GameEvent::RoundStart => self.on_round_boundary(tick, false),
            GameEvent::FreezeEnd => self.on_round_boundary(tick, true),
            GameEvent::RoundEnd { winner, reason } => self.on_round_end(tick, *winner, *reason),
            GameEvent::TeamChange { player, team_num } => {
                self.on_team_change(tick, player, *team_num);
            }
            GameEvent::ItemTransaction { player, item, action } => {
                if self.phase != Phase::AwaitingMatchStart {
                    self.inventory.apply(player, item, *action);
                }
            }
            gameplay => {
                if self.phase == Phase::AwaitingMatchStart {
                    self.diagnostics.warmup_events += 1;
                    return;
                }
                self.on_gameplay(tick, gameplay);
            }
        }
    }

    fn on_gameplay(&mut self, tick: Tick, event: &GameEvent) {
        self.ensure_round(tick);
        let first = self.round.as_ref().is_some_and(|r| r.gameplay_events == 0);
        if first && self.phase == Phase::RoundActive {
            self.settle_roster(true);
            self.reopen_wpa();
        }
        if matches!(self.phase, Phase::RoundPendingEnd(_)) {
            self.diagnostics.garbage_time_events += 1;
        }
        if let Some(round) = self.round.as_mut() {
            round.gameplay_events += 1;
        }

        match event {
            GameEvent::Kill {
                attacker,
                victim,
                assister,
                flash_assist,
                weapon,
                headshot,
                ..
            } => self.on_kill(
                tick,
                attacker.as_ref(),
                victim,
                assister.as_ref(),
                *flash_assist,
                weapon,
                *headshot,
            ),
            GameEvent::Damage {
                attacker,
                victim,
                amount_raw,
                weapon,
                ..
            } => self.on_damage(tick, attacker.as_ref(), victim, *amount_raw, weapon),
            GameEvent::Blind {
                attacker,
                victim,
                duration,
            } => self.on_blind(attacker, victim, *duration),
            GameEvent::Detonate { owner, kind } => self.on_detonate(tick, owner, *kind),
            GameEvent::Plant { owner } => self.on_plant(tick, owner),
            GameEvent::Defuse { owner } => self.on_defuse(tick, owner),
            GameEvent::Explode => self.on_explode(tick),
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle events
    // -----------------------------------------------------------------------

    fn on_match_start(&mut self, tick: Tick) {
        if self.phase != Phase::AwaitingMatchStart {
            info!(tick, rounds_discarded = self.rounds.len(), "match restarted");
        }
        self.reset_match();
        self.phase = Phase::RoundActive;

        let tolerance = crate::types::secs_to_ticks(
            self.config.timing.freeze_sync_tolerance_secs,
            self.config.timing.tick_rate,
        );
        let recent_freeze = self
            .last_freeze_tick
            .filter(|f| *f <= tick && tick - *f <= tolerance);
        if let Some(freeze) = recent_freeze {
            debug!(freeze_tick = freeze, match_start = tick, "re-synthesized freeze end");
            self.open_round(freeze);
        }
    }

    fn on_round_boundary(&mut self, tick: Tick, freeze_end: bool) {
        if freeze_end {
            self.last_freeze_tick = Some(tick);
        }
        match self.phase {
            Phase::AwaitingMatchStart => {}
            Phase::RoundPendingEnd(pending) => {
                self.finalize_round(pending);
                self.open_round(tick);
            }
            Phase::RoundActive => {
                let idle = self.round.as_ref().map(|r| r.gameplay_events == 0);
                match idle {
                    None => self.open_round(tick),
                    Some(true) if freeze_end => self.reanchor(tick),
                    Some(true) => self.open_round(tick),
                    Some(false) => {
                        warn!(
                            tick,
                            round = self.rounds.len() + 1,
                            "round abandoned without a decidable end"
                        );
                        self.open_round(tick);
                    }
                }
            }
        }
    }

    fn on_round_end(&mut self, tick: Tick, winner: Option<Side>, reason: Option<i64>) {
        match self.phase {
            Phase::AwaitingMatchStart => return,
            Phase::RoundPendingEnd(_) => {
                debug!(tick, "duplicate round end ignored");
                return;
            }
            Phase::RoundActive => {}
        }
        let Some(winner) = decide_winner(winner, reason) else {
            self.diagnostics.ignored_round_ends += 1;
            warn!(tick, ?reason, "round end without a determinable winner ignored");
            return;
        };
        self.ensure_round(tick);
        self.close_round(tick, winner, reason);
    }

    /// Record the round-ending condition and enter garbage time.
    fn close_round(&mut self, tick: Tick, winner: Side, reason: Option<i64>) {
        self.phase = Phase::RoundPendingEnd(PendingRoundEnd {
            winner,
            reason,
            end_tick: tick,
        });
        self.inventory.snapshot_end(&self.teams.participants);

        let slack = self.config.timing.timeline_slack_secs;
        let rate = self.config.timing.tick_rate;
        if let Some(round) = self.round.as_mut() {
            let deltas = self.wpa.reconcile(winner, &round.roster);
            round.apply_wpa(deltas);
            round.timeline.push(TimelineEntry {
                time: relative_time(tick, round.anchor, rate, slack),
                kind: TimelineKind::RoundEnd { winner },
                t_win_probability: self.wpa.probability(),
            });
        }
    }

    fn on_team_change(&mut self, tick: Tick, player: &Identity, team_num: i64) {
        if player.is_bot() {
            return;
        }
        match Side::from_team_num(team_num) {
            Some(side) => {
                self.assign_side(player, side);
                if let Some(round) = self.round.as_mut() {
                    round.spawned = true;
                }
            }
            None => {
                self.side_map.remove(player);
                let live = self.phase == Phase::RoundActive;
                if let Some(round) = self.round.as_mut() {
                    round.roster.remove(player);
                    if live {
                        self.clutches.check(&round.roster, tick);
                    }
                }
            }
        }
    }

    /// Persist a side observation and move the player on the live roster.
    fn assign_side(&mut self, player: &Identity, side: Side) {
        if player.is_bot() {
            return;
        }
        self.side_map.insert(player.clone(), side);
        if let Some(round) = self.round.as_mut() {
            round.seen.insert(player.clone());
            match round.roster.side_of(player) {
                Some(current) if current == side => {}
                Some(_) => {
                    let alive = round.roster.is_alive(player);
                    round.roster.place(player, side, alive);
                    if let Some(stats) = round.stats.get_mut(player) {
                        stats.side = side;
                    }
                }
                None => {
                    let dead = round.stats.get(player).is_some_and(|s| s.deaths > 0);
                    round.roster.place(player, side, !dead);
                }
            }
        }
    }

    fn side_for(&self, id: &Identity, round: u32) -> Side {
        self.side_map
            .get(id)
            .copied()
            .unwrap_or_else(|| self.teams.inferred_side(id, round))
    }

    fn next_round_number(&self) -> u32 {
        u32::try_from(self.rounds.len()).unwrap_or(u32::MAX).saturating_add(1)
    }

    /// Open a round lazily at the first gameplay event when none is open.
    fn ensure_round(&mut self, tick: Tick) {
        if self.round.is_none() {
            self.diagnostics.lazily_anchored_rounds += 1;
            debug!(
                tick,
                round = self.next_round_number(),
                "round anchored on first gameplay event"
            );
            self.open_round(tick);
        }
    }

    /// Open round `n + 1`. Its roster starts from the previous round's
    /// members (or every side observation so far, for the first round);
    /// spawns then add newcomers and [`Self::settle_roster`] drops leavers.
    fn open_round(&mut self, tick: Tick) {
        let number = self.next_round_number();
        let seed: Vec<Identity> = if self.carry.is_empty() {
            self.side_map.keys().cloned().collect()
        } else {
            self.carry.iter().cloned().collect()
        };
        let roster = RoundRoster::new(seed.into_iter().map(|id| {
            let side = self.side_for(&id, number);
            (id, side)
        }));

        self.inventory.snapshot_start(&self.teams.participants);
        let start_values = self.inventory.start_values().clone();
        let open = RoundOpen {
            number,
            tick,
            roster: &roster,
            start_values: &start_values,
            ct_kits: self.ct_kits(&roster),
        };
        self.health.on_round_open(&open);
        self.trades.on_round_open(&open);
        self.clutches.on_round_open(&open);
        self.wpa.on_round_open(&open);
        self.inventory.on_round_open(&open);

        debug!(
            round = number,
            tick,
            t = roster.alive_count(Side::T),
            ct = roster.alive_count(Side::CT),
            p_t = self.wpa.probability(),
            econ = self.wpa.economy_modifier(),
            "round opened"
        );

        self.round = Some(RoundContext {
            number,
            anchor: tick,
            roster,
            stats: BTreeMap::new(),
            timeline: Vec::new(),
            first_death_seen: false,
            planted: false,
            gameplay_events: 0,
            seen: BTreeSet::new(),
            spawned: false,
            settled: false,
        });
        self.phase = Phase::RoundActive;
    }

    /// Move an idle round's anchor to the freeze end and re-take the start
    /// snapshot now that buys are done.
    fn reanchor(&mut self, tick: Tick) {
        self.inventory.snapshot_start(&self.teams.participants);
        if let Some(round) = self.round.as_mut() {
            round.anchor = tick;
        }
        self.settle_roster(false);
        self.reopen_wpa();
    }

    /// Drop carried-over players that never showed up in this round. Runs
    /// once spawns have been seen; `last_chance` closes the window anyway.
    fn settle_roster(&mut self, last_chance: bool) {
        let Some(round) = self.round.as_mut() else {
            return;
        };
        if round.settled {
            return;
        }
        if !round.spawned {
            round.settled = last_chance;
            return;
        }
        round.settled = true;
        let absent: Vec<Identity> = round
            .roster
            .members()
            .keys()
            .filter(|id| !round.seen.contains(*id))
            .cloned()
            .collect();
        for id in &absent {
            round.roster.remove(id);
        }
        if !absent.is_empty() {
            debug!(
                round = round.number,
                dropped = absent.len(),
                "absent players left the roster"
            );
        }
    }

    /// Re-run the win-probability open over the current roster.
    fn reopen_wpa(&mut self) {
        if let Some(round) = self.round.as_ref() {
            let open = RoundOpen {
                number: round.number,
                tick: round.anchor,
                roster: &round.roster,
                start_values: self.inventory.start_values(),
                ct_kits: Self::kits_in(&self.inventory, &round.roster),
            };
            self.wpa.on_round_open(&open);
        }
    }

    fn ct_kits(&self, roster: &RoundRoster) -> usize {
        Self::kits_in(&self.inventory, roster)
    }

    /// Alive CT players carrying a defuse kit.
    fn kits_in(inventory: &InventoryTracker, roster: &RoundRoster) -> usize {
        roster
            .alive(Side::CT)
            .iter()
            .filter(|id| inventory.has_kit(id))
            .count()
    }

    // -----------------------------------------------------------------------
    // Gameplay events
    // -----------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn on_kill(
        &mut self,
        tick: Tick,
        attacker: Option<&Identity>,
        victim: &Identity,
        assister: Option<&Identity>,
        flash_assist: bool,
        weapon: &str,
        headshot: bool,
    ) {
        if victim.is_bot() {
            return;
        }
        let Some(number) = self.round.as_ref().map(|r| r.number) else {
            return;
        };
        let victim_fallback = self.side_for(victim, number);
        let attacker = attacker.filter(|a| !a.is_bot() && *a != victim);
        let attacker_fallback = attacker.map(|a| self.side_for(a, number));
        let assister = assister.filter(|a| !a.is_bot() && *a != victim && Some(*a) != attacker);
        let assister_fallback = assister.map(|a| self.side_for(a, number));
        let victim_value = self.inventory.value_of(victim);
        let slack = self.config.timing.timeline_slack_secs;
        let rate = self.config.timing.tick_rate;
        let live = self.phase == Phase::RoundActive;

        let Some(round) = self.round.as_mut() else {
            return;
        };
        let victim_side = round.ensure_member(victim, victim_fallback);
        if !round.roster.kill(victim) {
            debug!(tick, victim = %victim, "death of a player already dead ignored");
            return;
        }
        let remaining = self.health.record_death(victim);

        let attacker_side = attacker
            .zip(attacker_fallback)
            .map(|(a, fallback)| round.ensure_member(a, fallback));
        let enemy_attacker = attacker
            .zip(attacker_side)
            .filter(|(_, side)| *side != victim_side);

        let entry = !round.first_death_seen;
        round.first_death_seen = true;
        {
            let stats = round.stats_mut(victim);
            stats.deaths += 1;
            stats.entry_death |= entry;
        }

        if let Some((killer, _)) = enemy_attacker {
            let stats = round.stats_mut(killer);
            stats.kills += 1;
            stats.headshots += u32::from(headshot);
            stats.entry_kill |= entry;
            stats.kill_value += victim_value;
            if live {
                self.clutches.record_kill(killer);
            }
            Self::match_entry(&mut self.match_stats, &self.names, killer).record_duel_kill(victim);
            Self::match_entry(&mut self.match_stats, &self.names, victim).record_duel_death(killer);
        }

        if let Some((helper, fallback)) = assister.zip(assister_fallback) {
            if round.ensure_member(helper, fallback) != victim_side {
                let stats = round.stats_mut(helper);
                stats.assists += 1;
                stats.utility.flash_assists += u32::from(flash_assist);
            }
        }

        for trade in self.trades.on_kill(tick, enemy_attacker, victim, Some(victim_side)) {
            let trader = round.stats_mut(&trade.trader);
            trader.traded = true;
            trader.trade_penalty += trade.penalty;
            let avenged = round.stats_mut(&trade.avenged);
            avenged.was_traded = true;
            avenged.trade_bonus += trade.bonus;
        }

        if live {
            self.clutches.check(&round.roster, tick);
        }

        self.wpa.set_ct_kits(Self::kits_in(&self.inventory, &round.roster));
        let deltas = self.wpa.on_kill(
            tick,
            &round.roster,
            victim_side,
            remaining,
            Actors {
                actor: attacker,
                flash_assister: assister.filter(|_| flash_assist),
                victim: Some(victim),
            },
        );
        round.apply_wpa(deltas);

        round.timeline.push(TimelineEntry {
            time: relative_time(tick, round.anchor, rate, slack),
            kind: TimelineKind::Kill {
                attacker: attacker.cloned(),
                victim: victim.clone(),
                weapon: weapon.to_string(),
                headshot,
            },
            t_win_probability: self.wpa.probability(),
        });
    }

    fn on_damage(
        &mut self,
        tick: Tick,
        attacker: Option<&Identity>,
        victim: &Identity,
        amount_raw: u32,
        weapon: &str,
    ) {
        if victim.is_bot() {
            return;
        }
        let Some(number) = self.round.as_ref().map(|r| r.number) else {
            return;
        };
        let victim_fallback = self.side_for(victim, number);
        let attacker = attacker.filter(|a| !a.is_bot() && *a != victim);
        let attacker_fallback = attacker.map(|a| self.side_for(a, number));

        let Some(round) = self.round.as_mut() else {
            return;
        };
        let victim_side = round.ensure_member(victim, victim_fallback);
        let applied = self.health.record_damage(victim, amount_raw);

        if let Some((a, fallback)) = attacker.zip(attacker_fallback) {
            if round.ensure_member(a, fallback) != victim_side {
                let code = economy::normalize_item_code(weapon);
                let utility = UTILITY_WEAPONS.contains(&code.as_str());
                let stats = round.stats_mut(a);
                stats.damage += applied;
                if utility {
                    stats.utility_damage += applied;
                }
                self.trades.record_damage(a, victim, applied);
            }
        }

        let deltas = self.wpa.on_damage(
            tick,
            &round.roster,
            victim_side,
            applied,
            Actors {
                actor: attacker,
                victim: Some(victim),
                ..Actors::default()
            },
        );
        round.apply_wpa(deltas);
    }

    fn on_blind(&mut self, attacker: &Identity, victim: &Identity, duration: f64) {
        if attacker.is_bot() || victim.is_bot() || attacker == victim {
            return;
        }
        let Some(round) = self.round.as_mut() else {
            return;
        };
        let sides = (round.roster.side_of(attacker), round.roster.side_of(victim));
        let (Some(a), Some(v)) = sides else {
            return;
        };
        if a != v {
            let stats = round.stats_mut(attacker);
            stats.utility.enemies_flashed += 1;
            stats.utility.blind_time += duration.max(0.0);
        }
    }

    fn on_detonate(&mut self, tick: Tick, owner: &Identity, kind: UtilityKind) {
        if owner.is_bot() {
            return;
        }
        let slack = self.config.timing.timeline_slack_secs;
        let rate = self.config.timing.tick_rate;
        let p = self.wpa.probability();
        let Some(round) = self.round.as_mut() else {
            return;
        };
        if round.roster.side_of(owner).is_none() {
            return;
        }
        let utility = &mut round.stats_mut(owner).utility;
        match kind {
            UtilityKind::Smoke => utility.smokes += 1,
            UtilityKind::Flash => utility.flashes += 1,
            UtilityKind::HighExplosive => utility.he += 1,
            UtilityKind::Molotov => utility.molotovs += 1,
        }
        round.timeline.push(TimelineEntry {
            time: relative_time(tick, round.anchor, rate, slack),
            kind: TimelineKind::Utility {
                player: owner.clone(),
                kind,
            },
            t_win_probability: p,
        });
    }

    fn on_plant(&mut self, tick: Tick, owner: &Identity) {
        let slack = self.config.timing.timeline_slack_secs;
        let rate = self.config.timing.tick_rate;
        let Some(round) = self.round.as_mut() else {
            return;
        };
        round.planted = true;
        if !owner.is_bot() && round.roster.side_of(owner).is_some() {
            round.stats_mut(owner).planted = true;
        }
        let deltas = self.wpa.on_plant(tick, &round.roster, owner);
        round.apply_wpa(deltas);
        round.timeline.push(TimelineEntry {
            time: relative_time(tick, round.anchor, rate, slack),
            kind: TimelineKind::Plant { player: owner.clone() },
            t_win_probability: self.wpa.probability(),
        });
    }

    fn on_defuse(&mut self, tick: Tick, owner: &Identity) {
        let slack = self.config.timing.timeline_slack_secs;
        let rate = self.config.timing.tick_rate;
        let Some(round) = self.round.as_mut() else {
            return;
        };
        if !owner.is_bot() && round.roster.side_of(owner).is_some() {
            round.stats_mut(owner).defused = true;
        }
        let deltas = self.wpa.on_defuse(tick, &round.roster, owner);
        round.apply_wpa(deltas);
        round.timeline.push(TimelineEntry {
            time: relative_time(tick, round.anchor, rate, slack),
            kind: TimelineKind::Defuse { player: owner.clone() },
            t_win_probability: self.wpa.probability(),
        });
    }

    fn on_explode(&mut self, tick: Tick) {
        let slack = self.config.timing.timeline_slack_secs;
        let rate = self.config.timing.tick_rate;
        let Some(round) = self.round.as_mut() else {
            return;
        };
        let deltas = self.wpa.on_explode(tick, &round.roster);
        round.apply_wpa(deltas);
        round.timeline.push(TimelineEntry {
            time: relative_time(tick, round.anchor, rate, slack),
            kind: TimelineKind::Explode,
            t_win_probability: self.wpa.probability(),
        });
    }

    // -----------------------------------------------------------------------
    // Finalization
    // -----------------------------------------------------------------------

    fn match_entry<'a>(
        match_stats: &'a mut BTreeMap<Identity, PlayerMatchStats>,
        names: &BTreeMap<Identity, String>,
        id: &Identity,
    ) -> &'a mut PlayerMatchStats {
        match_stats.entry(id.clone()).or_insert_with(|| {
            let name = names.get(id).cloned().unwrap_or_else(|| id.to_string());
            PlayerMatchStats::new(id.clone(), name)
        })
    }

    /// Close the open round: fill in every member's stats, resolve clutches,
    /// rate, update the score, and notify the sub-engines.
    pub fn finalize_round(&mut self, pending: PendingRoundEnd) {
        let Some(mut round) = self.round.take() else {
            self.phase = Phase::RoundActive;
            return;
        };

        let members: Vec<(Identity, Side)> = round
            .roster
            .members()
            .iter()
            .map(|(id, side)| (id.clone(), *side))
            .collect();
        for (id, side) in &members {
            let survived = round.roster.is_alive(id);
            let stats = round.stats_mut(id);
            stats.side = *side;
            stats.survived = survived;
        }

        let resolutions = self.clutches.resolve(pending.winner, &round.roster);

        let rating_config = &self.config.rating;
        for (id, stats) in &mut round.stats {
            let start_value = self.inventory.start_value(id);
            let breakdown = rating::compute_breakdown(stats, start_value, rating_config);
            stats::apply_rating(stats, &breakdown);
        }

        let calibration = self.config.rating.calibration;
        for (id, stats) in &round.stats {
            Self::match_entry(&mut self.match_stats, &self.names, id)
                .absorb_round(stats, calibration);
        }
        for resolution in &resolutions {
            Self::match_entry(&mut self.match_stats, &self.names, &resolution.attempt.identity)
                .absorb_clutch(round.number, resolution);
        }

        let our_side = self.our_side_in(&round);
        let first_half = round.number < self.config.timing.side_swap_round;
        self.score.record(pending.winner == our_side, first_half);

        let next_is_side_swap = round.number + 1 == self.config.timing.side_swap_round;
        let close = RoundClose {
            number: round.number,
            tick: pending.end_tick,
            winner: pending.winner,
            roster: &round.roster,
            next_is_side_swap,
        };
        let t_saved = economy::side_value(&self.inventory, &round.roster, Side::T);
        let ct_saved = economy::side_value(&self.inventory, &round.roster, Side::CT);
        self.health.on_round_close(&close);
        self.trades.on_round_close(&close);
        self.clutches.on_round_close(&close);
        self.wpa.on_round_close(&close);
        self.inventory.on_round_close(&close);

        if next_is_side_swap {
            for side in self.side_map.values_mut() {
                *side = side.opposite();
            }
        }

        let elapsed = pending.end_tick - round.anchor;
        let duration = ticks_to_secs(elapsed, self.config.timing.tick_rate).max(0.0);
        self.carry = round.roster.members().keys().cloned().collect();
        info!(
            round = round.number,
            winner = %pending.winner,
            reason = ?pending.reason,
            duration,
            t_saved,
            ct_saved,
            clutches = resolutions.len(),
            "round finalized"
        );

        self.rounds.push(MatchRound {
            number: round.number,
            winner: pending.winner,
            reason: pending.reason,
            duration,
            players: round.stats,
            timeline: round.timeline,
        });
        self.diagnostics.rounds_finalized += 1;
        self.phase = Phase::RoundActive;
    }

    /// Our side for a round: where the roster actually stood, else the
    /// resolver's inference.
    fn our_side_in(&self, round: &RoundContext) -> Side {
        let mut counts = [0usize; 2];
        for (id, side) in round.roster.members() {
            if self.teams.is_ours(id) {
                counts[side.index()] += 1;
            }
        }
        match counts[0].cmp(&counts[1]) {
            std::cmp::Ordering::Greater => Side::T,
            std::cmp::Ordering::Less => Side::CT,
            std::cmp::Ordering::Equal => self.teams.our_side(round.number),
        }
    }

    /// Best-effort winner for a round the log never closed.
    fn inferred_winner(round: &RoundContext) -> Side {
        let t = round.roster.alive_count(Side::T);
        let ct = round.roster.alive_count(Side::CT);
        match t.cmp(&ct) {
            std::cmp::Ordering::Greater => Side::T,
            std::cmp::Ordering::Less => Side::CT,
            std::cmp::Ordering::Equal if round.planted => Side::T,
            std::cmp::Ordering::Equal => Side::CT,
        }
    }

    /// Drain the end of the log and assemble the [`Match`].
    #[must_use]
    pub fn finish(mut self, log: &NormalizedLog, label: MatchLabel) -> (Match, ParseDiagnostics) {
        match self.phase {
            Phase::RoundPendingEnd(pending) => self.finalize_round(pending),
            Phase::RoundActive => {
                let unfinished = self
                    .round
                    .as_ref()
                    .filter(|r| r.gameplay_events > 0)
                    .map(Self::inferred_winner);
                if let Some(winner) = unfinished {
                    let tick = log.events.last().map_or(0, |e| e.tick);
                    warn!(tick, winner = %winner, "log ended mid-round; winner inferred");
                    self.close_round(tick, winner, None);
                    if let Phase::RoundPendingEnd(pending) = self.phase {
                        self.finalize_round(pending);
                    }
                }
            }
            Phase::AwaitingMatchStart => {}
        }

        self.diagnostics.records_read = log.records_read;
        self.diagnostics.records_skipped = log.records_skipped;
        self.diagnostics.unknown_events = log.unknown_events.clone();

        let (players, enemy_players): (Vec<_>, Vec<_>) = self
            .match_stats
            .into_values()
            .partition(|p| self.teams.is_ours(&p.steam_id));

        let record = Match {
            id: label.id,
            source: label.source,
            date: label.date,
            map: log.meta.map_name.clone(),
            server: log.meta.server_name.clone(),
            starting_side: self.teams.starting_side,
            score: self.score,
            players,
            enemy_players,
            rounds: self.rounds,
        };
        (record, self.diagnostics)
    }
}

fn relative_time(tick: Tick, anchor: Tick, tick_rate: f64, slack_secs: f64) -> f64 {
    ticks_to_secs(tick - anchor, tick_rate).max(-slack_secs)
}

/// Parse one raw event log into a reconciled [`Match`].
///
/// Every call builds its own controller, so independent logs can be parsed
/// concurrently. A log without a match-start announcement is treated as live
/// from its first record.
///
/// # Errors
/// Returns [`crate::DemoError::Structural`] when the top-level layout is not
/// recognized. Nothing else in the log is fatal.
pub fn parse_match(
    raw: &Value,
    config: &EngineConfig,
    label: MatchLabel,
) -> Result<(Match, ParseDiagnostics)> {
    let aliases = AliasTable::from_roster(&config.roster);
    let log = normalize::normalize(raw, &aliases)?;
    let teams = team::resolve(&log, config);

    let mut controller = RoundLifecycleController::new(config, teams, log.names.clone());
    if !log.events.iter().any(|e| e.event == GameEvent::MatchStart) {
        let tick = log.events.first().map_or(0, |e| e.tick);
        controller.handle_event(&TimedEvent::new(tick, GameEvent::MatchStart));
    }
    for event in &log.events {
        controller.handle_event(event);
    }
    Ok(controller.finish(&log, label))
}
