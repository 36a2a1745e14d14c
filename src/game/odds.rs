//! Odds reconciliation.
//!
//! Merges ESPN's single inline odds object with The Odds API's per-bookmaker
//! quotes into one bundle per game. Consensus values are arithmetic means over
//! the bookmakers that actually quoted a market; silent bookmakers are
//! excluded from that market's average, not treated as zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OddsSource {
    #[serde(rename = "ESPN")]
    Espn,
    #[serde(rename = "TheOddsAPI")]
    TheOddsApi,
}

/// One bookmaker's quotes for a game. Second-half quotes reuse this shape
/// with the markets the provider doesn't offer left unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookmakerQuote {
    pub name: String,
    pub last_update: Option<DateTime<Utc>>,
    pub home_moneyline: Option<f64>,
    pub away_moneyline: Option<f64>,
    pub home_spread: Option<f64>,
    pub home_spread_price: Option<f64>,
    pub away_spread: Option<f64>,
    pub away_spread_price: Option<f64>,
    pub total: Option<f64>,
    pub over_price: Option<f64>,
    pub under_price: Option<f64>,
}

/// Cross-bookmaker averages. A market nobody quoted stays `None` and must
/// render as unavailable, never as zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketConsensus {
    pub home_moneyline: Option<f64>,
    pub away_moneyline: Option<f64>,
    pub spread: Option<f64>,
    pub spread_price: Option<f64>,
    pub total: Option<f64>,
    pub over_price: Option<f64>,
    pub under_price: Option<f64>,
}

/// Second-half markets fetched per event once a game reaches halftime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondHalfOdds {
    pub consensus: MarketConsensus,
    pub bookmakers: Vec<BookmakerQuote>,
}

/// ESPN's inline odds object, kept verbatim as the primary source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EspnOdds {
    pub spread: Option<f64>,
    pub over_under: Option<f64>,
    pub home_moneyline: Option<f64>,
    pub away_moneyline: Option<f64>,
    pub details: Option<String>,
}

impl EspnOdds {
    pub fn is_empty(&self) -> bool {
        self.spread.is_none()
            && self.over_under.is_none()
            && self.home_moneyline.is_none()
            && self.away_moneyline.is_none()
            && self.details.is_none()
    }
}

/// Full-game odds for one event as parsed from the secondary provider,
/// before reconciliation.
#[derive(Debug, Clone)]
pub struct SecondaryGameOdds {
    pub event_id: String,
    pub commence_time: Option<DateTime<Utc>>,
    pub bookmakers: Vec<BookmakerQuote>,
}

/// The reconciled odds attached to a snapshot.
///
/// When the secondary source wins the tag, the primary's inline odds are
/// retained unchanged under `espn_fallback` — callers that want single-source
/// numbers must never be handed averaged consensus silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsBundle {
    pub source: OddsSource,
    pub last_update: DateTime<Utc>,
    pub consensus: Option<MarketConsensus>,
    pub bookmakers: Vec<BookmakerQuote>,
    pub second_half: Option<SecondHalfOdds>,
    pub espn_fallback: Option<EspnOdds>,
}

impl OddsBundle {
    pub fn is_secondary(&self) -> bool {
        self.source == OddsSource::TheOddsApi
    }
}

/// Lookup key matching ESPN games to secondary-provider events:
/// lower-cased display names, whitespace collapsed to underscores, away first.
pub fn team_pair_key(away: &str, home: &str) -> String {
    let norm = |name: &str| {
        name.trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
    };
    format!("{}_{}", norm(away), norm(home))
}

fn mean(values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Average each market over the bookmakers that reported it.
pub fn consensus_of(quotes: &[BookmakerQuote]) -> MarketConsensus {
    let collect = |f: fn(&BookmakerQuote) -> Option<f64>| {
        mean(quotes.iter().filter_map(f).collect())
    };

    MarketConsensus {
        home_moneyline: collect(|q| q.home_moneyline),
        away_moneyline: collect(|q| q.away_moneyline),
        spread: collect(|q| q.home_spread),
        spread_price: collect(|q| q.home_spread_price),
        total: collect(|q| q.total),
        over_price: collect(|q| q.over_price),
        under_price: collect(|q| q.under_price),
    }
}

/// Build the reconciled bundle for one game.
///
/// Secondary data present → tagged `TheOddsAPI` with per-bookmaker quotes and
/// consensus, primary retained as fallback. Only primary present → tagged
/// `ESPN`. Neither → `None`, which must render as unavailable.
pub fn reconcile(
    espn: Option<EspnOdds>,
    secondary: Option<SecondaryGameOdds>,
    second_half: Option<SecondHalfOdds>,
    now: DateTime<Utc>,
) -> Option<OddsBundle> {
    let espn = espn.filter(|e| !e.is_empty());

    match secondary {
        Some(sec) => Some(OddsBundle {
            source: OddsSource::TheOddsApi,
            last_update: now,
            consensus: Some(consensus_of(&sec.bookmakers)),
            bookmakers: sec.bookmakers,
            second_half,
            espn_fallback: espn,
        }),
        None => espn.map(|e| OddsBundle {
            source: OddsSource::Espn,
            last_update: now,
            consensus: None,
            bookmakers: Vec::new(),
            second_half: None,
            espn_fallback: Some(e),
        }),
    }
}
