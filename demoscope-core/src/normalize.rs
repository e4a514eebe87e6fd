//! Event Normalizer: raw JSON records into typed [`GameEvent`]s.
//!
//! Accepts either a bare array of records or `{ meta, events: [...] }`.
//! Records that cannot be interpreted are skipped and counted; only a wrong
//! top-level shape is an error.
//!
//! Identifier rules:
//!   - numeric `0`, `"0"`, empty, `null` or missing → `"BOT"`
//!   - any other number → its decimal string
//!   - strings → trimmed
//!
//! Names have zero-width characters stripped, are trimmed, and are then
//! resolved through the roster alias table.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::RosterConfig;
use crate::error::{DemoError, Result};
use crate::event::{GameEvent, ItemAction, ItemRef, TimedEvent, UtilityKind};
use crate::types::{Identity, Side, Tick};

/// Characters removed from display names before alias lookup.
const ZERO_WIDTH: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

/// Match metadata carried by the `{meta, events}` layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemoMeta {
    /// Map identifier, e.g. `de_mirage`.
    pub map_name: Option<String>,
    /// Server display name.
    pub server_name: Option<String>,
}

/// Output of the normalizer.
#[derive(Debug, Clone, Default)]
pub struct NormalizedLog {
    /// Metadata, empty for the bare-array layout.
    pub meta: DemoMeta,
    /// Typed events, stable-sorted by tick.
    pub events: Vec<TimedEvent>,
    /// Latest alias-resolved display name per identity.
    pub names: BTreeMap<Identity, String>,
    /// Number of raw records seen.
    pub records_read: usize,
    /// Records skipped because they were malformed or of an unknown kind.
    pub records_skipped: usize,
    /// Unknown `event_name`s and how often each occurred.
    pub unknown_events: BTreeMap<String, usize>,
}

// ---------------------------------------------------------------------------
// Aliases
// ---------------------------------------------------------------------------

/// Case-insensitive `raw name → canonical roster name` table.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    map: BTreeMap<String, String>,
}

impl AliasTable {
    /// Build the table from roster configuration. Canonical names map to
    /// themselves so differently-cased spellings also resolve.
    #[must_use]
    pub fn from_roster(roster: &RosterConfig) -> Self {
        let mut map = BTreeMap::new();
        for member in &roster.members {
            let canonical = clean_name(&member.name);
            map.insert(canonical.to_lowercase(), canonical.clone());
            for alias in &member.aliases {
                let key = clean_name(alias).to_lowercase();
                if !key.is_empty() {
                    map.insert(key, canonical.clone());
                }
            }
        }
        Self { map }
    }

    /// Resolve a cleaned display name to its canonical form.
    #[must_use]
    pub fn resolve(&self, cleaned: &str) -> String {
        self.map
            .get(&cleaned.to_lowercase())
            .cloned()
            .unwrap_or_else(|| cleaned.to_string())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Strip zero-width characters and surrounding whitespace from a name.
#[must_use]
pub fn clean_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !ZERO_WIDTH.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Normalize a SteamID-like value into an [`Identity`].
#[must_use]
pub fn normalize_identity(value: Option<&Value>) -> Identity {
    match value {
        Some(Value::Number(n)) => {
            if n.as_u64() == Some(0) || n.as_i64() == Some(0) || n.as_f64() == Some(0.0) {
                Identity::bot()
            } else {
                Identity::new(n.to_string())
            }
        }
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed == "0" {
                Identity::bot()
            } else {
                Identity::new(trimmed)
            }
        }
        _ => Identity::bot(),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Normalize a raw demo value.
///
/// # Errors
/// Returns [`DemoError::Structural`] if `raw` is neither an array nor an
/// object with an `events` array.
pub fn normalize(raw: &Value, aliases: &AliasTable) -> Result<NormalizedLog> {
    let (meta, records) = split_layout(raw)?;

    let mut log = NormalizedLog {
        meta,
        records_read: records.len(),
        ..NormalizedLog::default()
    };

    let mut last_tick: Tick = 0;
    for record in records {
        let Some(obj) = record.as_object() else {
            log.records_skipped += 1;
            continue;
        };
        let Some(name) = obj.get("event_name").and_then(Value::as_str) else {
            log.records_skipped += 1;
            continue;
        };

        let tick = field_i64(obj, "tick").unwrap_or(last_tick);
        last_tick = tick;

        record_names(obj, aliases, &mut log.names);

        match convert(name, obj) {
            Some(event) => log.events.push(TimedEvent {
                tick,
                event,
                team_hints: team_hints(obj),
            }),
            None => {
                log.records_skipped += 1;
                *log.unknown_events.entry(name.to_string()).or_insert(0) += 1;
            }
        }
    }

    // Input is expected sorted already; a stable sort keeps same-tick order.
    log.events.sort_by_key(|e| e.tick);

    if !log.unknown_events.is_empty() {
        debug!(
            kinds = log.unknown_events.len(),
            skipped = log.records_skipped,
            "Dropped unknown or malformed event records"
        );
    }

    Ok(log)
}

fn split_layout(raw: &Value) -> Result<(DemoMeta, &[Value])> {
    match raw {
        Value::Array(records) => Ok((DemoMeta::default(), records.as_slice())),
        Value::Object(obj) => {
            let Some(Value::Array(records)) = obj.get("events") else {
                return Err(DemoError::Structural(
                    "expected an array of events or an object with an `events` array".to_string(),
                ));
            };
            let meta = obj
                .get("meta")
                .and_then(Value::as_object)
                .map(|m| DemoMeta {
                    map_name: field_string(m, "map_name"),
                    server_name: field_string(m, "server_name"),
                })
                .unwrap_or_default();
            Ok((meta, records.as_slice()))
        }
        other => Err(DemoError::Structural(format!(
            "expected an array or object at the top level, found {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Record conversion
// ---------------------------------------------------------------------------

fn convert(name: &str, obj: &Map<String, Value>) -> Option<GameEvent> {
    let user = || normalize_identity(obj.get("user_steamid"));
    let attacker = || optional_identity(obj, "attacker_steamid");

    let event = match name {
        "begin_new_match" | "round_announce_match_started" | "round_announce_match_start"
        | "match_start" => GameEvent::MatchStart,
        "round_start" => GameEvent::RoundStart,
        "round_freeze_end" => GameEvent::FreezeEnd,
        "round_end" => GameEvent::RoundEnd {
            winner: obj.get("winner").and_then(parse_winner),
            reason: field_i64(obj, "reason"),
        },
        "player_death" | "kill" => GameEvent::Kill {
            attacker: attacker(),
            victim: user(),
            assister: optional_identity(obj, "assister_steamid"),
            flash_assist: field_bool(obj, "assistedflash"),
            weapon: field_string(obj, "weapon").unwrap_or_default(),
            headshot: field_bool(obj, "headshot"),
            wallbang: field_i64(obj, "penetrated").unwrap_or(0) > 0,
            blind: field_bool(obj, "attackerblind"),
            through_smoke: field_bool(obj, "thrusmoke"),
        },
        "player_hurt" => GameEvent::Damage {
            attacker: attacker(),
            victim: user(),
            amount_raw: field_i64(obj, "dmg_health")
                .map_or(0, |v| u32::try_from(v.max(0)).unwrap_or(u32::MAX)),
            weapon: field_string(obj, "weapon").unwrap_or_default(),
            hitgroup: field_i64(obj, "hitgroup"),
        },
        "player_blind" => GameEvent::Blind {
            attacker: normalize_identity(obj.get("attacker_steamid")),
            victim: user(),
            duration: field_f64(obj, "blind_duration").unwrap_or(0.0),
        },
        "smokegrenade_detonate" => detonate(obj, UtilityKind::Smoke),
        "flashbang_detonate" => detonate(obj, UtilityKind::Flash),
        "hegrenade_detonate" => detonate(obj, UtilityKind::HighExplosive),
        "molotov_detonate" | "inferno_startburn" => detonate(obj, UtilityKind::Molotov),
        "bomb_planted" => GameEvent::Plant { owner: user() },
        "bomb_defused" => GameEvent::Defuse { owner: user() },
        "bomb_exploded" => GameEvent::Explode,
        "player_team" | "player_spawn" => GameEvent::TeamChange {
            player: user(),
            team_num: field_i64(obj, "team")
                .or_else(|| field_i64(obj, "team_num"))
                .or_else(|| field_i64(obj, "user_team_num"))?,
        },
        "item_pickup" => item(obj, ItemAction::Pickup)?,
        "item_purchase" => item(obj, ItemAction::Purchase)?,
        "item_drop" | "item_remove" => item(obj, ItemAction::Drop)?,
        _ => return None,
    };
    Some(event)
}

fn detonate(obj: &Map<String, Value>, kind: UtilityKind) -> GameEvent {
    GameEvent::Detonate {
        owner: normalize_identity(obj.get("user_steamid")),
        kind,
    }
}

fn item(obj: &Map<String, Value>, action: ItemAction) -> Option<GameEvent> {
    let item = ItemRef {
        code: field_string(obj, "item"),
        display_name: field_string(obj, "item_name"),
    };
    if item.code.is_none() && item.display_name.is_none() {
        return None;
    }
    Some(GameEvent::ItemTransaction {
        player: normalize_identity(obj.get("user_steamid")),
        item,
        action,
    })
}

fn parse_winner(value: &Value) -> Option<Side> {
    match value {
        Value::Number(n) => n.as_i64().and_then(Side::from_team_num),
        Value::String(s) => Side::from_label(s),
        _ => None,
    }
}

fn team_hints(obj: &Map<String, Value>) -> Vec<(Identity, i64)> {
    let mut hints = Vec::new();
    for (id_key, team_key) in [
        ("user_steamid", "user_team_num"),
        ("attacker_steamid", "attacker_team_num"),
    ] {
        if let (Some(id_value), Some(team)) = (obj.get(id_key), field_i64(obj, team_key)) {
            let id = normalize_identity(Some(id_value));
            if !id.is_bot() {
                hints.push((id, team));
            }
        }
    }
    hints
}

fn record_names(
    obj: &Map<String, Value>,
    aliases: &AliasTable,
    names: &mut BTreeMap<Identity, String>,
) {
    for (id_key, name_key) in [
        ("user_steamid", "user_name"),
        ("attacker_steamid", "attacker_name"),
        ("assister_steamid", "assister_name"),
    ] {
        let Some(raw_name) = obj.get(name_key).and_then(Value::as_str) else {
            continue;
        };
        let id = normalize_identity(obj.get(id_key));
        if id.is_bot() {
            continue;
        }
        let cleaned = clean_name(raw_name);
        if cleaned.is_empty() {
            continue;
        }
        names.insert(id, aliases.resolve(&cleaned));
    }
}

// ---------------------------------------------------------------------------
// Field helpers: every field is optional and loosely typed
// ---------------------------------------------------------------------------

fn optional_identity(obj: &Map<String, Value>, key: &str) -> Option<Identity> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        value => Some(normalize_identity(value)),
    }
}

fn field_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    let s = obj.get(key)?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn field_i64(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn field_f64(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn field_bool(obj: &Map<String, Value>, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => matches!(s.trim(), "true" | "True" | "1"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RosterMember;
    use serde_json::json;

    fn aliases() -> AliasTable {
        AliasTable::from_roster(&RosterConfig {
            members: vec![RosterMember {
                name: "Alpha".to_string(),
                aliases: vec!["a1pha".to_string()],
            }],
        })
    }

    #[test]
    fn identities_normalize_to_bot_sentinel() {
        assert!(normalize_identity(Some(&json!(0))).is_bot());
        assert!(normalize_identity(Some(&json!("0"))).is_bot());
        assert!(normalize_identity(Some(&json!("  "))).is_bot());
        assert!(normalize_identity(None).is_bot());
        assert_eq!(
            normalize_identity(Some(&json!(76_561_198_000_000_001_u64))).as_str(),
            "76561198000000001"
        );
        assert_eq!(normalize_identity(Some(&json!(" 7656 "))).as_str(), "7656");
    }

    #[test]
    fn names_strip_zero_width_and_resolve_aliases() {
        assert_eq!(clean_name("\u{200B} a1pha\u{FEFF} "), "a1pha");
        assert_eq!(aliases().resolve("A1PHA"), "Alpha");
        assert_eq!(aliases().resolve("stranger"), "stranger");
    }

    #[test]
    fn rejects_unsupported_top_level_shapes() {
        let table = AliasTable::default();
        assert!(matches!(
            normalize(&json!("nope"), &table),
            Err(DemoError::Structural(_))
        ));
        assert!(matches!(
            normalize(&json!({"meta": {}}), &table),
            Err(DemoError::Structural(_))
        ));
    }

    #[test]
    fn unknown_and_malformed_records_are_skipped() {
        let raw = json!([
            {"event_name": "round_start", "tick": 10},
            {"event_name": "weapon_fire", "tick": 11},
            {"tick": 12},
            42,
        ]);
        let log = normalize(&raw, &AliasTable::default()).expect("array layout");
        assert_eq!(log.events.len(), 1);
        assert_eq!(log.records_read, 4);
        assert_eq!(log.records_skipped, 3);
        assert_eq!(log.unknown_events.get("weapon_fire"), Some(&1));
    }

    #[test]
    fn object_layout_reads_meta_and_names() {
        let raw = json!({
            "meta": {"map_name": "de_mirage", "server_name": "scrim #1"},
            "events": [{
                "event_name": "player_death", "tick": 500,
                "user_steamid": "222", "user_name": "victim",
                "attacker_steamid": "111", "attacker_name": "a1pha\u{200B}",
                "weapon": "ak47", "headshot": true, "penetrated": 1,
                "user_team_num": 3, "attacker_team_num": 2
            }]
        });
        let log = normalize(&raw, &aliases()).expect("object layout");
        assert_eq!(log.meta.map_name.as_deref(), Some("de_mirage"));
        assert_eq!(log.names.get(&Identity::new("111")).map(String::as_str), Some("Alpha"));
        assert_eq!(log.events[0].team_hints.len(), 2);
        match &log.events[0].event {
            GameEvent::Kill { attacker, headshot, wallbang, .. } => {
                assert_eq!(attacker.as_ref().map(Identity::as_str), Some("111"));
                assert!(*headshot);
                assert!(*wallbang);
            }
            other => panic!("expected kill, got {other:?}"),
        }
    }

    #[test]
    fn round_end_winner_accepts_numbers_and_labels() {
        let raw = json!([
            {"event_name": "round_end", "tick": 1, "winner": 3, "reason": 7},
            {"event_name": "round_end", "tick": 2, "winner": "TERRORIST"},
            {"event_name": "round_end", "tick": 3, "reason": "9"},
        ]);
        let log = normalize(&raw, &AliasTable::default()).expect("array layout");
        let winners: Vec<_> = log
            .events
            .iter()
            .map(|e| match &e.event {
                GameEvent::RoundEnd { winner, reason } => (*winner, *reason),
                _ => (None, None),
            })
            .collect();
        assert_eq!(
            winners,
            vec![(Some(Side::CT), Some(7)), (Some(Side::T), None), (None, Some(9))]
        );
    }

    #[test]
    fn missing_tick_inherits_previous_and_sort_is_stable() {
        let raw = json!([
            {"event_name": "round_start", "tick": 100},
            {"event_name": "round_freeze_end"},
            {"event_name": "bomb_exploded", "tick": 50},
        ]);
        let log = normalize(&raw, &AliasTable::default()).expect("array layout");
        let ticks: Vec<_> = log.events.iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![50, 100, 100]);
        assert_eq!(log.events[1].event, GameEvent::RoundStart);
        assert_eq!(log.events[2].event, GameEvent::FreezeEnd);
    }

    #[test]
    fn item_events_need_a_code_or_a_name() {
        let raw = json!([
            {"event_name": "item_purchase", "tick": 1, "user_steamid": "1", "item_name": "AK-47"},
            {"event_name": "item_drop", "tick": 2, "user_steamid": "1"},
        ]);
        let log = normalize(&raw, &AliasTable::default()).expect("array layout");
        assert_eq!(log.events.len(), 1);
        assert_eq!(log.records_skipped, 1);
    }
}
