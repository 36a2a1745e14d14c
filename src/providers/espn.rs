//! ESPN NFL data client.
//!
//! Fetches the scoreboard, per-game summaries (box score + drives), and the
//! FPI power index from ESPN's public site API. Pure I/O: responses are parsed
//! into tolerant typed structures and handed to the pipeline untouched.
//!
//! Every optional upstream field is `#[serde(default)]` so a sparse payload
//! deserializes to defaults instead of failing the poll.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub struct EspnClient {
    base_url: String,
    client: reqwest::Client,
}

impl EspnClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Current scoreboard: every game of the active slate with embedded
    /// competitor records, coarse statistics, and inline odds.
    pub async fn fetch_scoreboard(&self) -> Result<Scoreboard> {
        let url = format!("{}/scoreboard", self.base_url);
        let scoreboard: Scoreboard = self
            .client
            .get(&url)
            .send()
            .await
            .context("ESPN scoreboard request failed")?
            .error_for_status()
            .context("ESPN scoreboard returned error status")?
            .json()
            .await
            .context("Failed to parse ESPN scoreboard")?;
        Ok(scoreboard)
    }

    /// Detailed per-game summary: full box score and drive/play history.
    pub async fn fetch_summary(&self, event_id: &str) -> Result<GameSummary> {
        let url = format!("{}/summary", self.base_url);
        let summary: GameSummary = self
            .client
            .get(&url)
            .query(&[("event", event_id)])
            .send()
            .await
            .context("ESPN summary request failed")?
            .error_for_status()
            .context("ESPN summary returned error status")?
            .json()
            .await
            .context("Failed to parse ESPN summary")?;
        Ok(summary)
    }

    /// FPI power index for all teams. Not always published; callers treat an
    /// empty result as "unavailable".
    pub async fn fetch_power_index(&self) -> Result<PowerIndex> {
        let url = format!("{}/fpi", self.base_url);
        let index: PowerIndex = self
            .client
            .get(&url)
            .send()
            .await
            .context("ESPN FPI request failed")?
            .error_for_status()
            .context("ESPN FPI returned error status")?
            .json()
            .await
            .context("Failed to parse ESPN FPI response")?;
        Ok(index)
    }
}

// --- Scoreboard response types ---

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scoreboard {
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Event {
    pub id: String,
    pub date: String,
    pub competitions: Vec<Competition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Competition {
    pub competitors: Vec<Competitor>,
    pub status: Status,
    pub venue: Option<Venue>,
    pub broadcasts: Vec<Broadcast>,
    pub odds: Vec<InlineOdds>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Competitor {
    pub team: Team,
    pub score: Option<String>,
    #[serde(rename = "homeAway")]
    pub home_away: String,
    pub records: Vec<TeamRecord>,
    pub statistics: Vec<StatEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Team {
    pub display_name: String,
    pub abbreviation: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TeamRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub summary: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatEntry {
    pub name: String,
    pub display_value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Status {
    #[serde(rename = "type")]
    pub status_type: StatusType,
    pub period: i64,
    #[serde(rename = "displayClock")]
    pub display_clock: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatusType {
    pub state: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Venue {
    pub full_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Broadcast {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InlineOdds {
    pub details: Option<String>,
    pub over_under: Option<f64>,
    pub spread: Option<f64>,
    pub home_team_odds: Option<TeamOdds>,
    pub away_team_odds: Option<TeamOdds>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TeamOdds {
    pub money_line: Option<f64>,
}

// --- Summary response types ---

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GameSummary {
    pub boxscore: BoxScore,
    pub drives: DrivesSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BoxScore {
    pub teams: Vec<BoxScoreTeam>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BoxScoreTeam {
    #[serde(rename = "homeAway")]
    pub home_away: String,
    pub statistics: Vec<StatEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DrivesSection {
    /// Completed drives, oldest first.
    pub previous: Vec<RawDrive>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawDrive {
    pub id: String,
    pub team: Option<DriveTeam>,
    pub description: Option<String>,
    pub plays: Vec<RawPlay>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DriveTeam {
    pub abbreviation: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawPlay {
    pub id: String,
    #[serde(rename = "type")]
    pub play_type: Option<PlayType>,
    pub text: Option<String>,
    pub away_score: Option<i64>,
    pub home_score: Option<i64>,
    pub period: Option<PlayPeriod>,
    pub clock: Option<PlayClock>,
    pub scoring_play: Option<bool>,
    pub stat_yardage: Option<i64>,
    pub start: Option<PlayStart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlayType {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlayPeriod {
    pub number: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayClock {
    pub display_value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayStart {
    pub down: Option<i64>,
    pub distance: Option<i64>,
    pub yard_line: Option<i64>,
}

// --- FPI response types ---

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PowerIndex {
    pub teams: Vec<PowerIndexTeam>,
}

/// The FPI feed has shipped the abbreviation both at the top level and nested
/// under `team` across revisions; both are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PowerIndexTeam {
    pub abbreviation: Option<String>,
    pub team: Option<Team>,
    pub fpi: Option<f64>,
    pub rank: Option<i64>,
    pub projected_wins: Option<f64>,
    pub projected_losses: Option<f64>,
}

impl PowerIndexTeam {
    pub fn abbr(&self) -> Option<&str> {
        self.abbreviation
            .as_deref()
            .or(self.team.as_ref().map(|t| t.abbreviation.as_str()))
            .filter(|a| !a.is_empty())
    }
}
