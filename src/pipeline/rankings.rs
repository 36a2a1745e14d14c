//! Power ratings and standings.
//!
//! The power index comes from its own provider endpoint. Standings are not
//! published directly, so they are derived from the team records embedded in
//! the scoreboard: win percentage within each conference, ranked descending.

use std::collections::HashMap;

use crate::game::models::{TeamPowerRating, TeamStanding};
use crate::providers::espn::{PowerIndex, Scoreboard};

/// NFL team abbreviations mapped to conferences.
const TEAM_CONFERENCES: &[(&str, &str)] = &[
    // AFC
    ("BAL", "AFC"), ("BUF", "AFC"), ("CIN", "AFC"), ("CLE", "AFC"),
    ("DEN", "AFC"), ("HOU", "AFC"), ("IND", "AFC"), ("JAX", "AFC"),
    ("KC", "AFC"), ("LV", "AFC"), ("LAC", "AFC"), ("MIA", "AFC"),
    ("NE", "AFC"), ("NYJ", "AFC"), ("PIT", "AFC"), ("TEN", "AFC"),
    // NFC
    ("ARI", "NFC"), ("ATL", "NFC"), ("CAR", "NFC"), ("CHI", "NFC"),
    ("DAL", "NFC"), ("DET", "NFC"), ("GB", "NFC"), ("LAR", "NFC"),
    ("MIN", "NFC"), ("NO", "NFC"), ("NYG", "NFC"), ("PHI", "NFC"),
    ("SEA", "NFC"), ("SF", "NFC"), ("TB", "NFC"), ("WSH", "NFC"),
];

fn conference_of(abbr: &str) -> &'static str {
    TEAM_CONFERENCES
        .iter()
        .find(|(team, _)| *team == abbr)
        .map(|(_, conf)| *conf)
        .unwrap_or("Unknown")
}

/// Index power ratings by upper-cased team abbreviation.
pub fn power_ratings(index: &PowerIndex) -> HashMap<String, TeamPowerRating> {
    index
        .teams
        .iter()
        .filter_map(|team| {
            let abbr = team.abbr()?;
            Some((
                abbr.to_uppercase(),
                TeamPowerRating {
                    rating: team.fpi,
                    rank: team.rank,
                    projected_wins: team.projected_wins,
                    projected_losses: team.projected_losses,
                },
            ))
        })
        .collect()
}

struct RecordLine {
    abbr: String,
    conference: &'static str,
    record: String,
    wins: i64,
    losses: i64,
    ties: i64,
    win_pct: f64,
}

/// Derive conference standings from the overall records carried on the
/// scoreboard's competitors.
pub fn standings(scoreboard: &Scoreboard) -> HashMap<String, TeamStanding> {
    let mut by_conference: HashMap<&'static str, Vec<RecordLine>> = HashMap::new();

    for event in &scoreboard.events {
        for competition in &event.competitions {
            for competitor in &competition.competitors {
                let abbr = competitor.team.abbreviation.to_uppercase();
                if abbr.is_empty() {
                    continue;
                }

                let Some(overall) = competitor
                    .records
                    .iter()
                    .find(|r| r.record_type == "total")
                else {
                    continue;
                };

                let mut parts = overall.summary.split('-');
                let wins: i64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
                let losses: i64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
                let ties: i64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);

                let total = wins + losses + ties;
                let win_pct = if total > 0 {
                    (wins as f64 + ties as f64 * 0.5) / total as f64
                } else {
                    0.0
                };

                let conference = conference_of(&abbr);
                let lines = by_conference.entry(conference).or_default();
                if lines.iter().any(|l| l.abbr == abbr) {
                    continue;
                }
                lines.push(RecordLine {
                    abbr,
                    conference,
                    record: overall.summary.clone(),
                    wins,
                    losses,
                    ties,
                    win_pct,
                });
            }
        }
    }

    let mut standings = HashMap::new();
    for (_, mut lines) in by_conference {
        lines.sort_by(|a, b| {
            b.win_pct
                .partial_cmp(&a.win_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for (index, line) in lines.into_iter().enumerate() {
            standings.insert(
                line.abbr.clone(),
                TeamStanding {
                    rank: format!("{} ({})", index + 1, line.conference),
                    record: line.record,
                    wins: line.wins,
                    losses: line.losses,
                    ties: line.ties,
                    win_pct: line.win_pct,
                },
            );
        }
    }

    standings
}
