//! # Demoscope Core Library
//!
//! Match-demo analytics for 5v5 bomb-defusal event logs.
//!
//! A raw, tick-stamped event log goes in; a fully reconciled [`Match`] comes
//! out: final score, per-player match statistics, per-round breakdowns and a
//! replayable timeline carrying the live win probability.
//!
//! ## Pipeline
//!
//! ```text
//! raw JSON ──▶ normalize ──▶ team::resolve ──▶ RoundLifecycleController ──▶ Match
//!                                                 │
//!                       health · economy · trade · clutch · rating · wpa
//! ```
//!
//! - **normalize**: raw records into typed [`GameEvent`]s
//! - **team**: our roster and our starting side, decided once per match
//! - **lifecycle**: the round state machine, sole driver of the sub-engines
//!
//! The engine is synchronous and keeps no global state. [`parse_match`]
//! builds a fresh controller per call, so callers may parse many logs in
//! parallel.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clutch;
pub mod config;
pub mod economy;
pub mod error;
pub mod event;
pub mod health;
pub mod lifecycle;
pub mod model;
pub mod normalize;
pub mod rating;
pub mod round;
pub mod stats;
pub mod team;
pub mod trade;
pub mod types;
pub mod wpa;

pub use config::EngineConfig;
pub use error::{DemoError, Result};
pub use event::{GameEvent, TimedEvent};
pub use lifecycle::{parse_match, RoundLifecycleController};
pub use model::{Match, MatchLabel, MatchRound, ParseDiagnostics, Score};
pub use stats::{PlayerMatchStats, PlayerRoundStats};
pub use types::*;
