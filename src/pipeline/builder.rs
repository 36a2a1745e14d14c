//! Snapshot builder.
//!
//! Orchestrates one poll: scoreboard → per-game summary → odds reconciliation
//! → one immutable snapshot row per game. Failures are isolated per game; a
//! bad summary or insert never takes down the rest of the slate. Only a
//! failure of the scoreboard call itself aborts the poll, because there is
//! nothing left to process.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::ProvidersConfig;
use crate::db::store::Store;
use crate::game::models::{GameSnapshot, TeamPowerRating, TeamStanding};
use crate::game::odds::{reconcile, team_pair_key, EspnOdds, SecondHalfOdds, SecondaryGameOdds};
use crate::game::phase::{classify, GamePhase};
use crate::pipeline::{extract, rankings};
use crate::providers::espn::{Competition, Event, EspnClient};
use crate::providers::odds_api::OddsApiClient;

/// Calendar-date policy: fixed UTC−6 (Central Standard Time), no DST.
const CENTRAL_OFFSET_SECONDS: i32 = -6 * 3600;

#[derive(Debug, Default)]
pub struct PollOutcome {
    pub games: usize,
    pub inserted: usize,
}

pub struct SnapshotBuilder<'a> {
    espn: &'a EspnClient,
    odds_api: Option<&'a OddsApiClient>,
    store: &'a Store,
    config: &'a ProvidersConfig,
}

/// ESPN timestamps come in two shapes across endpoints: minute precision
/// ("2025-11-02T18:00Z") and full RFC 3339.
pub fn parse_espn_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%MZ")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Which day a game belongs to, under the fixed Central offset. Keeps a
/// late-night kickoff grouped with the evening slate it belongs to.
pub fn central_calendar_date(ts: DateTime<Utc>) -> NaiveDate {
    let central = FixedOffset::east_opt(CENTRAL_OFFSET_SECONDS)
        .expect("fixed offset is in range");
    ts.with_timezone(&central).date_naive()
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(
        espn: &'a EspnClient,
        odds_api: Option<&'a OddsApiClient>,
        store: &'a Store,
        config: &'a ProvidersConfig,
    ) -> Self {
        Self {
            espn,
            odds_api,
            store,
            config,
        }
    }

    /// One full poll of the scoreboard. Returns how many games were seen and
    /// how many snapshots committed.
    pub async fn run_poll(&self) -> Result<PollOutcome> {
        let scoreboard = self
            .espn
            .fetch_scoreboard()
            .await
            .context("Scoreboard poll failed")?;

        let now = Utc::now();
        let mut outcome = PollOutcome {
            games: scoreboard.events.len(),
            ..Default::default()
        };
        info!(games = outcome.games, "Scoreboard fetched");

        let odds_map = self.fetch_secondary_odds(&scoreboard.events, now).await;

        let power = match self.espn.fetch_power_index().await {
            Ok(index) => rankings::power_ratings(&index),
            Err(e) => {
                warn!(error = %e, "Power index unavailable");
                HashMap::new()
            }
        };
        let standings = rankings::standings(&scoreboard);

        for event in &scoreboard.events {
            match self.build_snapshot(event, &odds_map, &power, &standings, now).await {
                Ok(snapshot) => match self.store.insert_snapshot(&snapshot).await {
                    Ok(_) => {
                        debug!(game_id = %snapshot.game_id, phase = %snapshot.phase,
                            "Snapshot saved");
                        outcome.inserted += 1;
                    }
                    Err(e) => {
                        warn!(game_id = %event.id, error = %e, "Snapshot insert failed");
                    }
                },
                Err(e) => {
                    warn!(game_id = %event.id, error = %e, "Skipping game");
                }
            }
        }

        info!(
            inserted = outcome.inserted,
            games = outcome.games,
            "Poll complete"
        );
        Ok(outcome)
    }

    /// The scoreboard-wide secondary fetch is gated on halftime presence:
    /// calling the quota-limited provider is only worth it when a halftime
    /// game still lacks fresh multi-bookmaker data.
    async fn fetch_secondary_odds(
        &self,
        events: &[Event],
        now: DateTime<Utc>,
    ) -> HashMap<String, SecondaryGameOdds> {
        let Some(client) = self.odds_api else {
            return HashMap::new();
        };

        let halftime_ids: Vec<&str> = events
            .iter()
            .filter_map(|event| {
                let competition = event.competitions.first()?;
                let phase = classify_competition(competition);
                (phase == GamePhase::Halftime).then_some(event.id.as_str())
            })
            .collect();

        if halftime_ids.is_empty() {
            debug!("No halftime games; skipping secondary odds fetch");
            return HashMap::new();
        }

        let since = now - Duration::seconds(self.config.second_half_freshness_seconds);
        let mut needs_fetch = false;
        for game_id in &halftime_ids {
            match self.store.has_fresh_secondary_odds(game_id, since).await {
                Ok(true) => {}
                Ok(false) => {
                    needs_fetch = true;
                    break;
                }
                Err(e) => {
                    warn!(game_id, error = %e, "Freshness check failed");
                    needs_fetch = true;
                    break;
                }
            }
        }

        if !needs_fetch {
            info!("All halftime games already carry fresh secondary odds; conserving quota");
            return HashMap::new();
        }

        match client.fetch_game_odds().await {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "Secondary odds fetch failed; continuing with primary only");
                HashMap::new()
            }
        }
    }

    async fn build_snapshot(
        &self,
        event: &Event,
        odds_map: &HashMap<String, SecondaryGameOdds>,
        power: &HashMap<String, TeamPowerRating>,
        standings: &HashMap<String, TeamStanding>,
        now: DateTime<Utc>,
    ) -> Result<GameSnapshot> {
        let competition = event
            .competitions
            .first()
            .context("Event has no competition")?;
        let home = competition
            .competitors
            .iter()
            .find(|c| c.home_away == "home")
            .context("Event has no home competitor")?;
        let away = competition
            .competitors
            .iter()
            .find(|c| c.home_away == "away")
            .context("Event has no away competitor")?;

        let phase = classify_competition(competition);

        // Detailed summary when available, scoreboard stats as the coarser
        // fallback. A summary failure must not fail the game.
        let (home_stats, away_stats, play_by_play) = match self.espn.fetch_summary(&event.id).await
        {
            Ok(summary) => {
                let mut home_stats = Default::default();
                let mut away_stats = Default::default();
                for team in &summary.boxscore.teams {
                    let stats = extract::stat_map(&team.statistics);
                    if team.home_away == "home" {
                        home_stats = stats;
                    } else if team.home_away == "away" {
                        away_stats = stats;
                    }
                }
                (home_stats, away_stats, extract::drives(&summary.drives.previous))
            }
            Err(e) => {
                warn!(game_id = %event.id, error = %e,
                    "Summary unavailable; using scoreboard stats");
                (
                    extract::stat_map(&home.statistics),
                    extract::stat_map(&away.statistics),
                    Vec::new(),
                )
            }
        };

        let espn_odds = competition.odds.first().map(|inline| EspnOdds {
            spread: inline.spread,
            over_under: inline.over_under,
            home_moneyline: inline.home_team_odds.as_ref().and_then(|o| o.money_line),
            away_moneyline: inline.away_team_odds.as_ref().and_then(|o| o.money_line),
            details: inline.details.clone(),
        });

        let key = team_pair_key(&away.team.display_name, &home.team.display_name);
        let secondary = odds_map.get(&key).cloned();

        let second_half = match &secondary {
            Some(sec) if phase == GamePhase::Halftime => {
                self.second_half_odds(&event.id, &sec.event_id, now).await
            }
            _ => None,
        };

        let odds = reconcile(espn_odds, secondary, second_half, now);
        if odds.is_none() {
            debug!(game_id = %event.id, "No odds available from either source");
        }

        let start_time = parse_espn_timestamp(&event.date);
        let game_date = central_calendar_date(start_time.unwrap_or(now));

        let home_abbr = home.team.abbreviation.to_uppercase();
        let away_abbr = away.team.abbreviation.to_uppercase();

        Ok(GameSnapshot {
            game_id: event.id.clone(),
            game_date,
            start_time,
            home_team: home.team.display_name.clone(),
            away_team: away.team.display_name.clone(),
            home_abbr: home.team.abbreviation.clone(),
            away_abbr: away.team.abbreviation.clone(),
            home_score: extract::parse_score(home.score.as_deref()),
            away_score: extract::parse_score(away.score.as_deref()),
            quarter: competition.status.period,
            clock: competition.status.display_clock.clone(),
            phase,
            status_detail: Some(competition.status.status_type.description.clone()),
            venue: competition.venue.as_ref().map(|v| v.full_name.clone()),
            broadcast: competition
                .broadcasts
                .first()
                .and_then(|b| b.names.first().cloned()),
            home_stats,
            away_stats,
            odds,
            play_by_play,
            home_power: power.get(&home_abbr).cloned(),
            away_power: power.get(&away_abbr).cloned(),
            home_standing: standings.get(&home_abbr).cloned(),
            away_standing: standings.get(&away_abbr).cloned(),
            created_at: now,
        })
    }

    /// Second-half markets for a halftime game. A recent snapshot that
    /// already carries them is reused instead of another upstream call;
    /// stale-but-present odds are acceptable.
    async fn second_half_odds(
        &self,
        game_id: &str,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Option<SecondHalfOdds> {
        let since = now - Duration::seconds(self.config.second_half_freshness_seconds);
        match self.store.fresh_second_half_odds(game_id, since).await {
            Ok(Some(half)) => {
                debug!(game_id, "Reusing recent second-half odds");
                return Some(half);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(game_id, error = %e, "Second-half reuse check failed");
            }
        }

        let client = self.odds_api?;
        match client.fetch_second_half(event_id).await {
            Ok(half) => half,
            Err(e) => {
                warn!(game_id, error = %e, "Second-half odds fetch failed");
                None
            }
        }
    }
}

fn classify_competition(competition: &Competition) -> GamePhase {
    classify(
        &competition.status.status_type.description,
        competition.status.period,
        competition.status.display_clock.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn espn_minute_precision_timestamp_parses() {
        let ts = parse_espn_timestamp("2025-11-02T18:00Z").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 11, 2, 18, 0, 0).unwrap());
    }

    #[test]
    fn rfc3339_timestamp_parses() {
        let ts = parse_espn_timestamp("2025-11-02T18:00:00Z").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 11, 2, 18, 0, 0).unwrap());
    }

    #[test]
    fn garbage_timestamp_is_none() {
        assert!(parse_espn_timestamp("tonight-ish").is_none());
    }

    #[test]
    fn late_night_kickoff_groups_with_previous_day() {
        // 02:30 UTC Monday is 20:30 Sunday in Central Standard Time.
        let ts = Utc.with_ymd_and_hms(2025, 11, 3, 2, 30, 0).unwrap();
        assert_eq!(
            central_calendar_date(ts),
            NaiveDate::from_ymd_opt(2025, 11, 2).unwrap()
        );
    }

    #[test]
    fn afternoon_kickoff_keeps_its_day() {
        let ts = Utc.with_ymd_and_hms(2025, 11, 2, 18, 0, 0).unwrap();
        assert_eq!(
            central_calendar_date(ts),
            NaiveDate::from_ymd_opt(2025, 11, 2).unwrap()
        );
    }
}
