//! Inventory & economy tracking.
//!
//! Each player carries a list of item codes mutated by pickup / purchase
//! (append) and drop (remove first match). Loadout value is the sum of a
//! static price table, floored at the default pistol price. Two snapshots
//! are taken per round: at round open and at round end.

use std::collections::BTreeMap;

use tracing::debug;

use crate::event::{ItemAction, ItemRef};
use crate::round::{RoundClose, RoundHook, RoundOpen};
use crate::types::{Identity, Side};

/// Value assumed for a player holding nothing priced (the default pistol).
pub const MIN_LOADOUT_VALUE: u32 = 200;

/// Item code of the defuse kit.
pub const DEFUSE_KIT: &str = "defuser";

/// Static price table keyed by normalized item code.
const PRICES: &[(&str, u32)] = &[
    // Pistols
    ("glock", 200),
    ("hkp2000", 200),
    ("usp_silencer", 200),
    ("p250", 300),
    ("elite", 300),
    ("tec9", 500),
    ("fiveseven", 500),
    ("cz75a", 500),
    ("deagle", 700),
    ("revolver", 600),
    // SMGs
    ("mac10", 1050),
    ("mp9", 1250),
    ("mp7", 1500),
    ("mp5sd", 1500),
    ("ump45", 1200),
    ("p90", 2350),
    ("bizon", 1400),
    // Heavy
    ("nova", 1050),
    ("xm1014", 2000),
    ("mag7", 1300),
    ("sawedoff", 1100),
    ("m249", 5200),
    ("negev", 1700),
    // Rifles
    ("galilar", 1800),
    ("famas", 2050),
    ("ak47", 2700),
    ("m4a1", 3100),
    ("m4a1_silencer", 2900),
    ("sg556", 3000),
    ("aug", 3300),
    ("ssg08", 1700),
    ("awp", 4750),
    ("g3sg1", 5000),
    ("scar20", 5000),
    // Grenades
    ("hegrenade", 300),
    ("flashbang", 200),
    ("smokegrenade", 300),
    ("molotov", 400),
    ("incgrenade", 500),
    ("decoy", 50),
    // Equipment
    ("vest", 650),
    ("vesthelm", 1000),
    ("defuser", 400),
    ("taser", 200),
];

/// Display name → item code, for logs that only carry `item_name`.
const DISPLAY_NAMES: &[(&str, &str)] = &[
    ("glock-18", "glock"),
    ("p2000", "hkp2000"),
    ("usp-s", "usp_silencer"),
    ("p250", "p250"),
    ("dual berettas", "elite"),
    ("tec-9", "tec9"),
    ("five-seven", "fiveseven"),
    ("cz75-auto", "cz75a"),
    ("desert eagle", "deagle"),
    ("r8 revolver", "revolver"),
    ("mac-10", "mac10"),
    ("mp9", "mp9"),
    ("mp7", "mp7"),
    ("mp5-sd", "mp5sd"),
    ("ump-45", "ump45"),
    ("p90", "p90"),
    ("pp-bizon", "bizon"),
    ("nova", "nova"),
    ("xm1014", "xm1014"),
    ("mag-7", "mag7"),
    ("sawed-off", "sawedoff"),
    ("m249", "m249"),
    ("negev", "negev"),
    ("galil ar", "galilar"),
    ("famas", "famas"),
    ("ak-47", "ak47"),
    ("m4a4", "m4a1"),
    ("m4a1-s", "m4a1_silencer"),
    ("sg 553", "sg556"),
    ("aug", "aug"),
    ("ssg 08", "ssg08"),
    ("awp", "awp"),
    ("g3sg1", "g3sg1"),
    ("scar-20", "scar20"),
    ("high explosive grenade", "hegrenade"),
    ("he grenade", "hegrenade"),
    ("flashbang", "flashbang"),
    ("smoke grenade", "smokegrenade"),
    ("molotov", "molotov"),
    ("incendiary grenade", "incgrenade"),
    ("decoy grenade", "decoy"),
    ("kevlar vest", "vest"),
    ("kevlar + helmet", "vesthelm"),
    ("defuse kit", "defuser"),
    ("zeus x27", "taser"),
];

/// Normalize a machine item code: lowercase, strip `weapon_` / `item_`
/// prefixes, and fold the equipment aliases.
#[must_use]
pub fn normalize_item_code(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    let stripped = lower
        .strip_prefix("weapon_")
        .or_else(|| lower.strip_prefix("item_"))
        .unwrap_or(&lower);
    match stripped {
        "kevlar" => "vest".to_string(),
        "assaultsuit" => "vesthelm".to_string(),
        "cutters" => DEFUSE_KIT.to_string(),
        "usp" => "usp_silencer".to_string(),
        "m4a1s" => "m4a1_silencer".to_string(),
        other => other.to_string(),
    }
}

/// Resolve an item reference to a normalized code.
///
/// The machine code wins; a display name is only consulted when the code is
/// missing.
#[must_use]
pub fn resolve_item(item: &ItemRef) -> Option<String> {
    if let Some(code) = item.code.as_deref() {
        let code = normalize_item_code(code);
        if !code.is_empty() {
            return Some(code);
        }
    }
    let name = item.display_name.as_deref()?.trim().to_lowercase();
    DISPLAY_NAMES
        .iter()
        .find(|(display, _)| *display == name)
        .map(|(_, code)| (*code).to_string())
}

/// Price of a normalized item code.
#[must_use]
pub fn item_price(code: &str) -> Option<u32> {
    PRICES.iter().find(|(c, _)| *c == code).map(|(_, p)| *p)
}

/// Total loadout value of `items`, floored at [`MIN_LOADOUT_VALUE`].
#[must_use]
pub fn calculate_value(items: &[String]) -> u32 {
    let total: u32 = items.iter().filter_map(|code| item_price(code)).sum();
    total.max(MIN_LOADOUT_VALUE)
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Carried items per player plus the per-round value snapshots.
#[derive(Debug, Clone, Default)]
pub struct InventoryTracker {
    items: BTreeMap<Identity, Vec<String>>,
    start: BTreeMap<Identity, u32>,
    end: BTreeMap<Identity, u32>,
}

impl InventoryTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an item transaction. Unresolvable items are ignored.
    pub fn apply(&mut self, player: &Identity, item: &ItemRef, action: ItemAction) {
        if player.is_bot() {
            return;
        }
        let Some(code) = resolve_item(item) else {
            debug!(player = %player, ?item, "unresolvable item ignored");
            return;
        };
        let held = self.items.entry(player.clone()).or_default();
        match action {
            ItemAction::Pickup | ItemAction::Purchase => held.push(code),
            ItemAction::Drop => {
                if let Some(pos) = held.iter().position(|c| *c == code) {
                    held.remove(pos);
                }
            }
        }
    }

    /// Current loadout value of a player.
    #[must_use]
    pub fn value_of(&self, player: &Identity) -> u32 {
        self.items
            .get(player)
            .map_or(MIN_LOADOUT_VALUE, |items| calculate_value(items))
    }

    /// Whether the player currently carries a defuse kit.
    #[must_use]
    pub fn has_kit(&self, player: &Identity) -> bool {
        self.items
            .get(player)
            .is_some_and(|items| items.iter().any(|c| c == DEFUSE_KIT))
    }

    /// Take the round-start snapshot over the tracked identities plus `extra`.
    pub fn snapshot_start<'a>(&mut self, extra: impl IntoIterator<Item = &'a Identity>) {
        self.start = self.snapshot(extra);
    }

    /// Take the round-end snapshot over the tracked identities plus `extra`.
    pub fn snapshot_end<'a>(&mut self, extra: impl IntoIterator<Item = &'a Identity>) {
        self.end = self.snapshot(extra);
    }

    fn snapshot<'a>(
        &self,
        extra: impl IntoIterator<Item = &'a Identity>,
    ) -> BTreeMap<Identity, u32> {
        let mut values: BTreeMap<Identity, u32> = self
            .items
            .keys()
            .map(|id| (id.clone(), self.value_of(id)))
            .collect();
        for id in extra {
            values.entry(id.clone()).or_insert_with(|| self.value_of(id));
        }
        values
    }

    /// Round-start values.
    #[must_use]
    pub fn start_values(&self) -> &BTreeMap<Identity, u32> {
        &self.start
    }

    /// Round-start value of a player.
    #[must_use]
    pub fn start_value(&self, player: &Identity) -> u32 {
        self.start.get(player).copied().unwrap_or(MIN_LOADOUT_VALUE)
    }

    /// Round-end value of a player.
    #[must_use]
    pub fn end_value(&self, player: &Identity) -> u32 {
        self.end.get(player).copied().unwrap_or(MIN_LOADOUT_VALUE)
    }

    /// Drop everything (fresh loadouts after the side swap, or a new match).
    pub fn clear_all(&mut self) {
        self.items.clear();
        self.start.clear();
        self.end.clear();
    }

    /// Drop one player's inventory.
    pub fn clear_player(&mut self, player: &Identity) {
        self.items.remove(player);
    }
}

impl RoundHook for InventoryTracker {
    fn on_round_open(&mut self, _round: &RoundOpen<'_>) {}

    fn on_round_close(&mut self, round: &RoundClose<'_>) {
        if round.next_is_side_swap {
            self.clear_all();
            return;
        }
        let dead: Vec<Identity> = round
            .roster
            .members()
            .keys()
            .filter(|id| !round.roster.is_alive(id))
            .cloned()
            .collect();
        for id in &dead {
            self.clear_player(id);
        }
    }
}

/// Economy modifier fed to the win-probability engine.
///
/// `sign(t − ct) · ln(1 + |t − ct| / divisor) · weight`
#[must_use]
pub fn economy_modifier(t_value: u32, ct_value: u32, divisor: f64, weight: f64) -> f64 {
    let diff = f64::from(t_value) - f64::from(ct_value);
    if diff == 0.0 || divisor <= 0.0 {
        return 0.0;
    }
    diff.signum() * (1.0 + diff.abs() / divisor).ln() * weight
}

/// Value of one side's alive loadouts, helper for logging.
#[must_use]
pub fn side_value(
    tracker: &InventoryTracker,
    roster: &crate::round::RoundRoster,
    side: Side,
) -> u32 {
    roster
        .alive(side)
        .iter()
        .map(|id| tracker.end_value(id))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round::RoundRoster;

    fn code(c: &str) -> ItemRef {
        ItemRef {
            code: Some(c.to_string()),
            display_name: None,
        }
    }

    fn named(n: &str) -> ItemRef {
        ItemRef {
            code: None,
            display_name: Some(n.to_string()),
        }
    }

    #[test]
    fn item_codes_normalize() {
        assert_eq!(normalize_item_code("weapon_AK47"), "ak47");
        assert_eq!(normalize_item_code("item_assaultsuit"), "vesthelm");
        assert_eq!(normalize_item_code("item_kevlar"), "vest");
    }

    #[test]
    fn display_names_resolve_when_code_missing() {
        assert_eq!(resolve_item(&named("AK-47")).as_deref(), Some("ak47"));
        assert_eq!(resolve_item(&named("Kevlar + Helmet")).as_deref(), Some("vesthelm"));
        assert_eq!(resolve_item(&named("Golden Knife")), None);
    }

    #[test]
    fn value_is_floored_at_default_pistol() {
        assert_eq!(calculate_value(&[]), MIN_LOADOUT_VALUE);
        assert_eq!(calculate_value(&["decoy".to_string()]), MIN_LOADOUT_VALUE);
        assert_eq!(
            calculate_value(&["ak47".to_string(), "vesthelm".to_string()]),
            3700
        );
    }

    #[test]
    fn drop_removes_first_match_only() {
        let mut inv = InventoryTracker::new();
        let p = Identity::new("1");
        inv.apply(&p, &code("flashbang"), ItemAction::Purchase);
        inv.apply(&p, &code("flashbang"), ItemAction::Purchase);
        inv.apply(&p, &code("awp"), ItemAction::Pickup);
        inv.apply(&p, &code("weapon_flashbang"), ItemAction::Drop);
        assert_eq!(inv.value_of(&p), 4750 + 200);
    }

    #[test]
    fn kit_detection() {
        let mut inv = InventoryTracker::new();
        let p = Identity::new("1");
        assert!(!inv.has_kit(&p));
        inv.apply(&p, &named("Defuse Kit"), ItemAction::Purchase);
        assert!(inv.has_kit(&p));
    }

    #[test]
    fn round_close_clears_dead_or_everything_on_swap() {
        let mut inv = InventoryTracker::new();
        let alive = Identity::new("alive");
        let dead = Identity::new("dead");
        inv.apply(&alive, &code("ak47"), ItemAction::Purchase);
        inv.apply(&dead, &code("m4a1"), ItemAction::Purchase);

        let mut roster = RoundRoster::new([(alive.clone(), Side::T), (dead.clone(), Side::CT)]);
        roster.kill(&dead);

        let close = RoundClose {
            number: 3,
            tick: 0,
            winner: Side::T,
            roster: &roster,
            next_is_side_swap: false,
        };
        inv.on_round_close(&close);
        assert_eq!(inv.value_of(&alive), 2700);
        assert_eq!(inv.value_of(&dead), MIN_LOADOUT_VALUE);

        let swap = RoundClose {
            next_is_side_swap: true,
            ..close
        };
        inv.on_round_close(&swap);
        assert_eq!(inv.value_of(&alive), MIN_LOADOUT_VALUE);
    }

    #[test]
    fn snapshots_cover_extra_identities() {
        let mut inv = InventoryTracker::new();
        let buyer = Identity::new("buyer");
        let idle = Identity::new("idle");
        inv.apply(&buyer, &code("awp"), ItemAction::Purchase);
        inv.snapshot_start([&idle]);
        assert_eq!(inv.start_value(&buyer), 4750);
        assert_eq!(inv.start_values().get(&idle), Some(&MIN_LOADOUT_VALUE));
    }

    #[test]
    fn economy_modifier_is_signed_and_logarithmic() {
        assert!(economy_modifier(10_000, 10_000, 5000.0, 0.15).abs() < f64::EPSILON);
        let t_rich = economy_modifier(20_000, 5_000, 5000.0, 0.15);
        let ct_rich = economy_modifier(5_000, 20_000, 5000.0, 0.15);
        assert!(t_rich > 0.0);
        assert!((t_rich + ct_rich).abs() < 1e-12);
        assert!((t_rich - 4.0_f64.ln() * 0.15).abs() < 1e-12);
    }
}
