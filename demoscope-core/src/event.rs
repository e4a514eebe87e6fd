//! Typed game events produced by the normalizer.
//!
//! Every downstream stage matches exhaustively on [`GameEvent`]; nothing after
//! normalization looks at raw `event_name` strings.

use serde::{Deserialize, Serialize};

use crate::types::{Identity, Side, Tick};

/// Grenade categories tracked as utility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UtilityKind {
    /// Smoke grenade.
    Smoke,
    /// Flashbang.
    Flash,
    /// High-explosive grenade.
    HighExplosive,
    /// Molotov or incendiary grenade.
    Molotov,
}

/// What happened to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemAction {
    /// Picked up from the ground.
    Pickup,
    /// Dropped or removed.
    Drop,
    /// Bought during freeze time.
    Purchase,
}

/// An item as it appears in the log: a machine code, a display name, or both.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemRef {
    /// Machine code such as `weapon_ak47`.
    pub code: Option<String>,
    /// Human-readable name such as `AK-47`.
    pub display_name: Option<String>,
}

/// A typed game event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    /// The live match begins; everything before it is warmup.
    MatchStart,
    /// A round begins (freeze time starts).
    RoundStart,
    /// Freeze time ends and players may move.
    FreezeEnd,
    /// The round-ending condition was met.
    RoundEnd {
        /// Explicit winner, when the log carries one.
        winner: Option<Side>,
        /// Engine win-reason code.
        reason: Option<i64>,
    },
    /// A player died.
    Kill {
        /// Killer, absent for world / fall damage.
        attacker: Option<Identity>,
        /// The player who died.
        victim: Identity,
        /// Assisting player.
        assister: Option<Identity>,
        /// Whether the assist was a flash assist.
        flash_assist: bool,
        /// Weapon code.
        weapon: String,
        /// Headshot kill.
        headshot: bool,
        /// Kill through a wall.
        wallbang: bool,
        /// Killer was blind.
        blind: bool,
        /// Kill through smoke.
        through_smoke: bool,
    },
    /// A player took damage.
    Damage {
        /// Attacker, absent for world damage.
        attacker: Option<Identity>,
        /// The player who was hurt.
        victim: Identity,
        /// Health damage as reported by the log (may exceed remaining HP).
        amount_raw: u32,
        /// Weapon code.
        weapon: String,
        /// Hitgroup code.
        hitgroup: Option<i64>,
    },
    /// A player was flashed.
    Blind {
        /// Flash thrower.
        attacker: Identity,
        /// Flashed player.
        victim: Identity,
        /// Blind duration in seconds.
        duration: f64,
    },
    /// A grenade went off.
    Detonate {
        /// Thrower.
        owner: Identity,
        /// Grenade category.
        kind: UtilityKind,
    },
    /// The bomb was planted.
    Plant {
        /// Planter.
        owner: Identity,
    },
    /// The bomb was defused.
    Defuse {
        /// Defuser.
        owner: Identity,
    },
    /// The bomb exploded.
    Explode,
    /// A player joined a team or spawned on one.
    TeamChange {
        /// The player.
        player: Identity,
        /// Numeric team id (2 = T, 3 = CT).
        team_num: i64,
    },
    /// An item changed hands.
    ItemTransaction {
        /// The player.
        player: Identity,
        /// The item.
        item: ItemRef,
        /// What happened.
        action: ItemAction,
    },
}

impl GameEvent {
    /// Whether this event is round-lifecycle bookkeeping rather than gameplay.
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::MatchStart | Self::RoundStart | Self::FreezeEnd | Self::RoundEnd { .. }
        )
    }

    /// Short stable label used in logs and diagnostics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::MatchStart => "match_start",
            Self::RoundStart => "round_start",
            Self::FreezeEnd => "freeze_end",
            Self::RoundEnd { .. } => "round_end",
            Self::Kill { .. } => "kill",
            Self::Damage { .. } => "damage",
            Self::Blind { .. } => "blind",
            Self::Detonate { .. } => "detonate",
            Self::Plant { .. } => "plant",
            Self::Defuse { .. } => "defuse",
            Self::Explode => "explode",
            Self::TeamChange { .. } => "team_change",
            Self::ItemTransaction { .. } => "item",
        }
    }
}

/// A typed event with its tick and any side hints carried alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    /// When the event happened.
    pub tick: Tick,
    /// What happened.
    pub event: GameEvent,
    /// `(identity, numeric team id)` pairs read from `*_team_num` fields.
    pub team_hints: Vec<(Identity, i64)>,
}

impl TimedEvent {
    /// An event without team hints.
    #[must_use]
    pub fn new(tick: Tick, event: GameEvent) -> Self {
        Self {
            tick,
            event,
            team_hints: Vec::new(),
        }
    }
}
