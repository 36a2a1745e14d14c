//! The Odds API client.
//!
//! Secondary odds source: multi-bookmaker full-game markets from the sport
//! odds endpoint, and second-half markets from the per-event endpoint once a
//! game reaches halftime. All requests pass through a rate limiter sized to
//! the subscription's requests-per-minute ceiling.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::ProvidersConfig;
use crate::game::odds::{consensus_of, team_pair_key, BookmakerQuote, SecondHalfOdds, SecondaryGameOdds};

/// The Odds API event structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OddsApiEvent {
    pub id: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: Option<DateTime<Utc>>,
    pub bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Bookmaker {
    pub key: String,
    pub title: String,
    pub last_update: Option<DateTime<Utc>>,
    pub markets: Vec<Market>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Market {
    pub key: String,
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Outcome {
    pub name: String,
    pub price: Option<f64>,
    pub point: Option<f64>,
}

pub struct OddsApiClient {
    base_url: String,
    api_key: String,
    sport_key: String,
    regions: String,
    full_game_markets: String,
    second_half_markets: String,
    client: reqwest::Client,
    rate_limiter: DefaultDirectRateLimiter,
}

impl OddsApiClient {
    pub fn new(config: &ProvidersConfig, api_key: String) -> Self {
        let per_minute = NonZeroU32::new(config.odds_requests_per_minute.max(1))
            .expect("clamped above zero");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            base_url: config.odds_api_base_url.trim_end_matches('/').to_string(),
            api_key,
            sport_key: config.sport_key.clone(),
            regions: config.regions.clone(),
            full_game_markets: config.full_game_markets.clone(),
            second_half_markets: config.second_half_markets.clone(),
            client,
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }

    /// Fetch full-game odds for the whole slate, keyed by normalized
    /// away/home team pair for matching against the primary provider.
    pub async fn fetch_game_odds(&self) -> Result<HashMap<String, SecondaryGameOdds>> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/sports/{}/odds", self.base_url, self.sport_key);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("regions", self.regions.as_str()),
                ("markets", self.full_game_markets.as_str()),
                ("oddsFormat", "american"),
            ])
            .send()
            .await
            .context("The Odds API request failed")?;

        if let Some(remaining) = response.headers().get("x-requests-remaining") {
            info!(remaining = remaining.to_str().unwrap_or("?"), "Odds API quota");
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read Odds API response body")?;

        if !status.is_success() {
            anyhow::bail!("The Odds API error (status {status}): {body}");
        }

        let events: Vec<OddsApiEvent> =
            serde_json::from_str(&body).context("Failed to parse Odds API events")?;

        info!(events = events.len(), "Fetched full-game odds");

        Ok(events
            .into_iter()
            .map(|event| {
                let key = team_pair_key(&event.away_team, &event.home_team);
                let odds = SecondaryGameOdds {
                    event_id: event.id.clone(),
                    commence_time: event.commence_time,
                    bookmakers: extract_quotes(&event),
                };
                (key, odds)
            })
            .collect())
    }

    /// Fetch second-half markets for one event. Returns `Ok(None)` when the
    /// endpoint has nothing for this event; only transport and parse problems
    /// surface as errors.
    pub async fn fetch_second_half(&self, event_id: &str) -> Result<Option<SecondHalfOdds>> {
        self.rate_limiter.until_ready().await;

        let url = format!(
            "{}/sports/{}/events/{}/odds",
            self.base_url, self.sport_key, event_id
        );
        let response = self
            .client
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("regions", self.regions.as_str()),
                ("markets", self.second_half_markets.as_str()),
                ("oddsFormat", "american"),
            ])
            .send()
            .await
            .context("The Odds API event request failed")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read Odds API event response body")?;

        if !status.is_success() {
            warn!(event_id, %status, "Second-half odds unavailable");
            return Ok(None);
        }

        let event: OddsApiEvent =
            serde_json::from_str(&body).context("Failed to parse Odds API event odds")?;

        Ok(extract_second_half(&event))
    }
}

/// Flatten one event's bookmakers into full-game quotes.
pub(crate) fn extract_quotes(event: &OddsApiEvent) -> Vec<BookmakerQuote> {
    event
        .bookmakers
        .iter()
        .map(|bookmaker| {
            let mut quote = BookmakerQuote {
                name: bookmaker.title.clone(),
                last_update: bookmaker.last_update,
                ..Default::default()
            };

            for market in &bookmaker.markets {
                match market.key.as_str() {
                    "h2h" => {
                        for outcome in &market.outcomes {
                            if outcome.name == event.home_team {
                                quote.home_moneyline = outcome.price;
                            } else if outcome.name == event.away_team {
                                quote.away_moneyline = outcome.price;
                            }
                        }
                    }
                    "spreads" => {
                        for outcome in &market.outcomes {
                            if outcome.name == event.home_team {
                                quote.home_spread = outcome.point;
                                quote.home_spread_price = outcome.price;
                            } else if outcome.name == event.away_team {
                                quote.away_spread = outcome.point;
                                quote.away_spread_price = outcome.price;
                            }
                        }
                    }
                    "totals" => {
                        for outcome in &market.outcomes {
                            if outcome.name == "Over" {
                                quote.total = outcome.point;
                                quote.over_price = outcome.price;
                            } else if outcome.name == "Under" {
                                if quote.total.is_none() {
                                    quote.total = outcome.point;
                                }
                                quote.under_price = outcome.price;
                            }
                        }
                    }
                    _ => {}
                }
            }

            quote
        })
        .collect()
}

/// Flatten one event's bookmakers into second-half quotes with their own
/// consensus. Bookmakers quoting none of the half markets are dropped; an
/// event with no quoting bookmaker yields `None`.
pub(crate) fn extract_second_half(event: &OddsApiEvent) -> Option<SecondHalfOdds> {
    let quotes: Vec<BookmakerQuote> = event
        .bookmakers
        .iter()
        .filter_map(|bookmaker| {
            let mut quote = BookmakerQuote {
                name: bookmaker.title.clone(),
                last_update: bookmaker.last_update,
                ..Default::default()
            };
            let mut has_market = false;

            for market in &bookmaker.markets {
                match market.key.as_str() {
                    "h2h_h2" => {
                        for outcome in &market.outcomes {
                            if outcome.name == event.home_team {
                                quote.home_moneyline = outcome.price;
                                has_market = true;
                            } else if outcome.name == event.away_team {
                                quote.away_moneyline = outcome.price;
                                has_market = true;
                            }
                        }
                    }
                    "spreads_h2" => {
                        for outcome in &market.outcomes {
                            if outcome.name == event.home_team {
                                quote.home_spread = outcome.point;
                                quote.home_spread_price = outcome.price;
                                has_market = true;
                            }
                        }
                    }
                    "totals_h2" => {
                        for outcome in &market.outcomes {
                            if outcome.name == "Over" {
                                quote.total = outcome.point;
                                quote.over_price = outcome.price;
                                has_market = true;
                            }
                        }
                    }
                    _ => {}
                }
            }

            has_market.then_some(quote)
        })
        .collect();

    if quotes.is_empty() {
        return None;
    }

    Some(SecondHalfOdds {
        consensus: consensus_of(&quotes),
        bookmakers: quotes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> OddsApiEvent {
        serde_json::from_str(
            r#"{
                "id": "ev123",
                "home_team": "Buffalo Bills",
                "away_team": "Miami Dolphins",
                "bookmakers": [{
                    "key": "draftkings",
                    "title": "DraftKings",
                    "markets": [
                        {"key": "h2h", "outcomes": [
                            {"name": "Buffalo Bills", "price": -150.0},
                            {"name": "Miami Dolphins", "price": 130.0}
                        ]},
                        {"key": "spreads", "outcomes": [
                            {"name": "Buffalo Bills", "price": -110.0, "point": -3.5},
                            {"name": "Miami Dolphins", "price": -110.0, "point": 3.5}
                        ]},
                        {"key": "totals", "outcomes": [
                            {"name": "Over", "price": -105.0, "point": 47.5},
                            {"name": "Under", "price": -115.0, "point": 47.5}
                        ]}
                    ]
                }]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn extracts_full_game_quote() {
        let quotes = extract_quotes(&sample_event());
        assert_eq!(quotes.len(), 1);
        let q = &quotes[0];
        assert_eq!(q.name, "DraftKings");
        assert_eq!(q.home_moneyline, Some(-150.0));
        assert_eq!(q.away_moneyline, Some(130.0));
        assert_eq!(q.home_spread, Some(-3.5));
        assert_eq!(q.total, Some(47.5));
        assert_eq!(q.under_price, Some(-115.0));
    }

    #[test]
    fn second_half_drops_bookmakers_without_half_markets() {
        let event: OddsApiEvent = serde_json::from_str(
            r#"{
                "id": "ev123",
                "home_team": "Buffalo Bills",
                "away_team": "Miami Dolphins",
                "bookmakers": [
                    {"key": "dk", "title": "DraftKings", "markets": [
                        {"key": "spreads_h2", "outcomes": [
                            {"name": "Buffalo Bills", "price": -110.0, "point": -1.5}
                        ]}
                    ]},
                    {"key": "fd", "title": "FanDuel", "markets": [
                        {"key": "h2h", "outcomes": [
                            {"name": "Buffalo Bills", "price": -150.0}
                        ]}
                    ]}
                ]
            }"#,
        )
        .unwrap();

        let half = extract_second_half(&event).unwrap();
        assert_eq!(half.bookmakers.len(), 1);
        assert_eq!(half.bookmakers[0].home_spread, Some(-1.5));
        assert_eq!(half.consensus.spread, Some(-1.5));
    }

    #[test]
    fn second_half_with_no_quotes_is_none() {
        let event = OddsApiEvent {
            id: "ev1".to_string(),
            home_team: "A".to_string(),
            away_team: "B".to_string(),
            ..Default::default()
        };
        assert!(extract_second_half(&event).is_none());
    }

    #[test]
    fn unparsed_market_keys_are_ignored() {
        let event: OddsApiEvent = serde_json::from_str(
            r#"{
                "id": "ev1",
                "home_team": "A",
                "away_team": "B",
                "bookmakers": [{"key": "x", "title": "X", "markets": [
                    {"key": "alternate_spreads", "outcomes": [{"name": "A", "point": -7.0}]}
                ]}]
            }"#,
        )
        .unwrap();
        let quotes = extract_quotes(&event);
        assert!(quotes[0].home_spread.is_none());
    }
}
