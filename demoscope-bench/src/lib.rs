//! Synthetic event logs for the benchmark suite.
//!
//! [`synthetic_match`] writes a deterministic, full-length match: ten
//! players, buy events, utility, a kill sequence per round and a
//! plant or defuse every few rounds.

use serde_json::{json, Value};

const OURS: [&str; 5] = ["101", "102", "103", "104", "105"];
const THEIRS: [&str; 5] = ["201", "202", "203", "204", "205"];
const ROUND_TICKS: i64 = 64 * 120;

fn event(name: &str, tick: i64) -> Value {
    json!({ "event_name": name, "tick": tick })
}

fn spawn(tick: i64, steamid: &str, name: &str, team: i64) -> Value {
    json!({
        "event_name": "player_spawn", "tick": tick,
        "user_steamid": steamid, "user_name": name, "team_num": team,
    })
}

fn push_round(events: &mut Vec<Value>, number: i64, swap_at: i64) {
    let start = number * ROUND_TICKS;
    let (our_team, their_team) = if number < swap_at { (3, 2) } else { (2, 3) };
    let ours_win = number % 3 != 0;

    events.push(event("round_start", start));
    for (i, id) in OURS.iter().enumerate() {
        events.push(spawn(start, id, &format!("a{}", i + 1), our_team));
        events.push(json!({
            "event_name": "item_purchase", "tick": start + 5,
            "user_steamid": id, "item": if our_team == 2 { "ak47" } else { "m4a1" },
        }));
    }
    for (i, id) in THEIRS.iter().enumerate() {
        events.push(spawn(start, id, &format!("e{}", i + 1), their_team));
        events.push(json!({
            "event_name": "item_purchase", "tick": start + 5,
            "user_steamid": id, "item": if their_team == 2 { "ak47" } else { "m4a1" },
        }));
    }
    events.push(event("round_freeze_end", start + 64 * 15));

    let (winners, losers) = if ours_win { (OURS, THEIRS) } else { (THEIRS, OURS) };
    let mut tick = start + 64 * 30;
    events.push(json!({
        "event_name": "flashbang_detonate", "tick": tick,
        "user_steamid": winners[0], "x": 0.0, "y": 0.0, "z": 0.0,
    }));
    for (k, victim) in losers.iter().enumerate() {
        let shooter = winners[k % 2];
        tick += 64 * 3;
        events.push(json!({
            "event_name": "player_hurt", "tick": tick,
            "attacker_steamid": shooter, "user_steamid": victim,
            "dmg_health": 60, "weapon": "ak47", "hitgroup": 2,
        }));
        events.push(json!({
            "event_name": "player_death", "tick": tick + 16,
            "attacker_steamid": shooter, "user_steamid": victim,
            "weapon": "ak47", "headshot": k % 2 == 0,
        }));
    }

    let winners_are_t = (ours_win && our_team == 2) || (!ours_win && their_team == 2);
    events.push(json!({
        "event_name": "round_end", "tick": tick + 64,
        "reason": if winners_are_t { 9 } else { 7 },
    }));
}

/// A deterministic match log of `rounds` rounds with a side swap after 12.
#[must_use]
pub fn synthetic_match(rounds: u32) -> Value {
    let mut events = vec![event("begin_new_match", 0)];
    for number in 1..=i64::from(rounds) {
        push_round(&mut events, number, 13);
    }
    json!({
        "meta": { "map_name": "de_mirage", "server_name": "bench" },
        "events": events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_match_parses_every_round() {
        let config = demoscope_core::EngineConfig::default();
        let label = demoscope_core::MatchLabel::new("bench", "bench", "2024-01-01T00:00:00Z");
        let (record, _) =
            demoscope_core::parse_match(&synthetic_match(24), &config, label).expect("parses");
        assert_eq!(record.rounds.len(), 24);
        assert_eq!(record.score.total(), 24);
    }
}
