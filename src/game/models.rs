use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::game::odds::OddsBundle;
use crate::game::phase::GamePhase;

/// One immutable observation of a game, captured by a single poll.
/// Snapshots are append-only; "latest state" is the most recent row per game id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub game_id: String,
    /// Local calendar date of the game under the fixed Central Standard Time policy.
    pub game_date: NaiveDate,
    pub start_time: Option<DateTime<Utc>>,
    pub home_team: String,
    pub away_team: String,
    pub home_abbr: String,
    pub away_abbr: String,
    pub home_score: i64,
    pub away_score: i64,
    pub quarter: i64,
    pub clock: Option<String>,
    pub phase: GamePhase,
    /// Provider's raw status description, retained for display.
    pub status_detail: Option<String>,
    pub venue: Option<String>,
    pub broadcast: Option<String>,
    /// Flat stat name → display value maps. Compound values ("20/28", "5-40")
    /// stay opaque here; decomposition is the export surface's job.
    pub home_stats: BTreeMap<String, String>,
    pub away_stats: BTreeMap<String, String>,
    pub odds: Option<OddsBundle>,
    pub play_by_play: Vec<Drive>,
    pub home_power: Option<TeamPowerRating>,
    pub away_power: Option<TeamPowerRating>,
    pub home_standing: Option<TeamStanding>,
    pub away_standing: Option<TeamStanding>,
    pub created_at: DateTime<Utc>,
}

impl GameSnapshot {
    /// Whether the odds bundle came from the multi-bookmaker secondary source.
    pub fn has_secondary_odds(&self) -> bool {
        self.odds
            .as_ref()
            .map(|o| o.is_secondary() && !o.bookmakers.is_empty())
            .unwrap_or(false)
    }

    /// Whether the bundle carries a non-empty second-half section.
    pub fn has_second_half_odds(&self) -> bool {
        self.odds
            .as_ref()
            .and_then(|o| o.second_half.as_ref())
            .map(|h| !h.bookmakers.is_empty())
            .unwrap_or(false)
    }
}

/// An offensive possession and its ordered plays, in provider order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drive {
    pub id: String,
    pub team: Option<String>,
    pub description: Option<String>,
    pub plays: Vec<Play>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Play {
    pub id: String,
    pub play_type: Option<String>,
    pub text: Option<String>,
    pub away_score: i64,
    pub home_score: i64,
    pub period: Option<i64>,
    pub clock: Option<String>,
    pub scoring_play: bool,
    pub yards: i64,
    pub down: Option<i64>,
    pub distance: Option<i64>,
    pub yard_line: Option<i64>,
}

/// Power-index rating for one team, sourced independently of odds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamPowerRating {
    pub rating: Option<f64>,
    pub rank: Option<i64>,
    pub projected_wins: Option<f64>,
    pub projected_losses: Option<f64>,
}

/// Conference standing derived from the scoreboard's team records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamStanding {
    /// e.g. "3 (NFC)"
    pub rank: String,
    pub record: String,
    pub wins: i64,
    pub losses: i64,
    pub ties: i64,
    pub win_pct: f64,
}
