//! Property-Based Tests for the round engine.
//!
//! Random event sequences are wrapped in a valid match start and fed through
//! `parse_match`. Whatever the sequence, the reconciled match must keep its
//! accounting invariants.

use proptest::prelude::*;
use serde_json::{json, Value};

use demoscope_core::config::{EngineConfig, RosterConfig, RosterMember};
use demoscope_core::{parse_match, Match, MatchLabel};

const PLAYERS: usize = 10;
const REASONS: [i64; 5] = [7, 8, 9, 12, 10];

fn steam_id(index: usize) -> String {
    format!("7656119800000{index:04}")
}

fn config() -> EngineConfig {
    EngineConfig {
        roster: RosterConfig {
            members: (0..5)
                .map(|i| RosterMember {
                    name: format!("p{i}"),
                    aliases: Vec::new(),
                })
                .collect(),
        },
        ..EngineConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

/// (kind, attacker, victim, amount, gap in ticks)
type RawStep = (u8, usize, usize, u32, i64);

fn arb_steps() -> impl Strategy<Value = Vec<RawStep>> {
    prop::collection::vec(
        (0u8..5, 0..PLAYERS, 0..PLAYERS, 0u32..300, 0i64..200),
        0..120,
    )
}

fn spawn(tick: i64, index: usize) -> Value {
    json!({
        "event_name": "player_spawn", "tick": tick,
        "user_steamid": steam_id(index), "user_name": format!("p{index}"),
        "team_num": if index < 5 { 2 } else { 3 },
    })
}

fn build_log(steps: &[RawStep]) -> Value {
    let mut events = vec![json!({ "event_name": "begin_new_match", "tick": 0 })];
    events.extend((0..PLAYERS).map(|i| spawn(1, i)));

    let mut tick = 2;
    for &(kind, attacker, victim, amount, gap) in steps {
        tick += gap;
        let event = match kind {
            0 => json!({
                "event_name": "player_death", "tick": tick,
                "attacker_steamid": steam_id(attacker), "user_steamid": steam_id(victim),
                "weapon": "ak47", "headshot": amount % 2 == 0,
            }),
            1 => json!({
                "event_name": "player_hurt", "tick": tick,
                "attacker_steamid": steam_id(attacker), "user_steamid": steam_id(victim),
                "dmg_health": amount, "weapon": "hegrenade",
            }),
            2 => json!({
                "event_name": "round_end", "tick": tick,
                "reason": REASONS[amount as usize % REASONS.len()],
            }),
            3 => json!({ "event_name": "round_start", "tick": tick }),
            _ => json!({
                "event_name": "bomb_planted", "tick": tick,
                "user_steamid": steam_id(attacker % 5),
            }),
        };
        events.push(event);
    }
    Value::Array(events)
}

fn parse(steps: &[RawStep]) -> Match {
    let label = MatchLabel::new("prop", "proptest", "2024-01-01T00:00:00Z");
    let (record, _) = parse_match(&build_log(steps), &config(), label).expect("log parses");
    record
}

// ---------------------------------------------------------------------------
// Property: the score accounts for every finalized round
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn score_is_conserved(steps in arb_steps()) {
        let record = parse(&steps);
        let rounds = u32::try_from(record.rounds.len()).expect("small");
        let s = record.score;
        prop_assert_eq!(s.us + s.them, rounds);
        prop_assert_eq!(s.half1_us + s.half1_them + s.half2_us + s.half2_them, rounds);
    }
}

// ---------------------------------------------------------------------------
// Property: win-probability credit sums to zero within each round
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn wpa_is_zero_sum_per_round(steps in arb_steps()) {
        let record = parse(&steps);
        for round in &record.rounds {
            let total: f64 = round.players.values().map(|p| p.wpa).sum();
            prop_assert!(total.abs() < 1e-6, "round {} sums to {}", round.number, total);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: derived rates stay finite
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn rates_are_never_nan(steps in arb_steps()) {
        let record = parse(&steps);
        for player in record.players.iter().chain(&record.enemy_players) {
            prop_assert!(player.hs_rate.is_finite());
            prop_assert!(player.adr.is_finite());
            prop_assert!(player.kast.is_finite());
            prop_assert!(player.rating.is_finite());
            prop_assert!((0.0..=100.0).contains(&player.hs_rate));
        }
    }
}

// ---------------------------------------------------------------------------
// Property: damage is capped by the health on the field
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn damage_is_bounded_per_round(steps in arb_steps()) {
        let record = parse(&steps);
        for round in &record.rounds {
            let total: u32 = round.players.values().map(|p| p.damage).sum();
            let cap = u32::try_from(round.players.len() * 100).expect("small");
            prop_assert!(total <= cap, "round {} dealt {} over cap {}", round.number, total, cap);
            for player in round.players.values() {
                prop_assert!(player.utility_damage <= player.damage);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Property: same input, same output
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn parsing_is_deterministic(steps in arb_steps()) {
        let a = serde_json::to_string(&parse(&steps)).expect("serialize");
        let b = serde_json::to_string(&parse(&steps)).expect("serialize");
        prop_assert_eq!(a, b);
    }
}
