//! CSV generation for emails and the export surface.
//!
//! Three documents are produced here: the halftime email attachment (metadata,
//! odds, flattened plays), the per-game play-by-play download, and the
//! per-team snapshot rows for bulk export. Compound stat strings are
//! decomposed only here, using one canonical separator per field name.

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};

use crate::game::models::GameSnapshot;
use crate::game::odds::{BookmakerQuote, MarketConsensus, OddsSource};

/// Canonical separator per compound stat field. Fields absent from this table
/// are exported verbatim, never guessed at.
const COMPOUND_FIELDS: &[(&str, char)] = &[
    ("completionAttempts", '/'),
    ("thirdDownEff", '-'),
    ("fourthDownEff", '-'),
    ("redZoneAttempts", '-'),
    ("totalPenaltiesYards", '-'),
    ("sacksYardsLost", '-'),
];

/// Split a compound display value by its field's canonical separator.
pub fn split_compound(field: &str, value: &str) -> Option<(f64, f64)> {
    let (_, separator) = COMPOUND_FIELDS.iter().find(|(name, _)| *name == field)?;
    let (left, right) = value.trim().split_once(*separator)?;
    Some((left.trim().parse().ok()?, right.trim().parse().ok()?))
}

/// Season week from the configured week-1 start date; weeks run 7 days and
/// anything before the opener counts as week 1.
pub fn season_week(game_date: NaiveDate, week1_start: NaiveDate) -> i64 {
    let days = (game_date - week1_start).num_days();
    (days.div_euclid(7) + 1).max(1)
}

/// Deterministic attachment name: `NFL{yy}_{ww}_{HOME}v{AWAY}_plays.csv`.
pub fn halftime_filename(game: &GameSnapshot, week1_start: NaiveDate) -> String {
    let year = game.game_date.year() % 100;
    let week = season_week(game.game_date, week1_start);
    format!(
        "NFL{year:02}_{week:02}_{}v{}_plays.csv",
        game.home_abbr, game.away_abbr
    )
}

/// Download name for the per-game play export.
pub fn play_filename(game: &GameSnapshot) -> String {
    format!(
        "play_by_play_{}_vs_{}_{}.csv",
        game.away_abbr, game.home_abbr, game.game_date
    )
}

struct CsvDoc {
    writer: csv::Writer<Vec<u8>>,
}

impl CsvDoc {
    fn new() -> Self {
        Self {
            writer: csv::WriterBuilder::new().flexible(true).from_writer(Vec::new()),
        }
    }

    fn row<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        self.writer
            .write_record(fields)
            .expect("writing to an in-memory buffer cannot fail");
    }

    fn line(&mut self, text: &str) {
        self.row([text]);
    }

    fn kv(&mut self, key: &str, value: &str) {
        self.row([key, value]);
    }

    fn blank(&mut self) {
        self.row([""]);
    }

    fn finish(self) -> String {
        let bytes = self
            .writer
            .into_inner()
            .expect("writing to an in-memory buffer cannot fail");
        String::from_utf8(bytes).expect("csv output is valid UTF-8")
    }
}

fn or_na(value: Option<&str>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or("N/A")
        .to_string()
}

/// American-odds rendering: rounded, explicit sign on positives.
fn fmt_price(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:+}", v.round() as i64),
        None => "N/A".to_string(),
    }
}

fn fmt_signed_point(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:+.1}"),
        None => "N/A".to_string(),
    }
}

fn fmt_point(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}"),
        None => "N/A".to_string(),
    }
}

fn consensus_rows(doc: &mut CsvDoc, consensus: &MarketConsensus) {
    doc.kv("Home Moneyline", &fmt_price(consensus.home_moneyline));
    doc.kv("Away Moneyline", &fmt_price(consensus.away_moneyline));
    doc.kv("Spread", &fmt_signed_point(consensus.spread));
    doc.kv("Total (Over/Under)", &fmt_point(consensus.total));
}

fn full_game_quote_row(doc: &mut CsvDoc, quote: &BookmakerQuote) {
    doc.row([
        quote.name.clone(),
        fmt_price(quote.home_moneyline),
        fmt_price(quote.away_moneyline),
        fmt_signed_point(quote.home_spread),
        fmt_price(quote.home_spread_price),
        fmt_point(quote.total),
        fmt_price(quote.over_price),
        fmt_price(quote.under_price),
    ]);
}

fn odds_section(doc: &mut CsvDoc, game: &GameSnapshot) {
    doc.line("Betting Odds");

    let Some(odds) = &game.odds else {
        doc.line("No betting odds available for this game");
        doc.blank();
        return;
    };

    match (&odds.source, &odds.consensus) {
        (OddsSource::TheOddsApi, Some(consensus)) => {
            doc.kv("Odds Source", "TheOddsAPI");
            doc.kv("Game State", game.phase.as_str());
            doc.kv(
                "Last Updated",
                &odds.last_update.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
            doc.blank();
            doc.line("Consensus Odds (Average of Multiple Sportsbooks)");
            consensus_rows(doc, consensus);
            doc.blank();

            if !odds.bookmakers.is_empty() {
                doc.line("Individual Sportsbook Odds (Full Game)");
                doc.row([
                    "Sportsbook",
                    "Home ML",
                    "Away ML",
                    "Spread",
                    "Home Spread Odds",
                    "Total",
                    "Over Odds",
                    "Under Odds",
                ]);
                for quote in &odds.bookmakers {
                    full_game_quote_row(doc, quote);
                }
            }

            match &odds.second_half {
                Some(half) if !half.bookmakers.is_empty() => {
                    doc.blank();
                    doc.line("Second Half Odds (LIVE - Key for Betting!)");
                    doc.line("Second Half Consensus");
                    consensus_rows(doc, &half.consensus);
                    doc.blank();
                    doc.line("Individual Sportsbook Odds (Second Half)");
                    doc.row([
                        "Sportsbook",
                        "Home ML",
                        "Away ML",
                        "Spread",
                        "Spread Odds",
                        "Total",
                        "Over Odds",
                    ]);
                    for quote in &half.bookmakers {
                        doc.row([
                            quote.name.clone(),
                            fmt_price(quote.home_moneyline),
                            fmt_price(quote.away_moneyline),
                            fmt_signed_point(quote.home_spread),
                            fmt_price(quote.home_spread_price),
                            fmt_point(quote.total),
                            fmt_price(quote.over_price),
                        ]);
                    }
                }
                _ => {
                    doc.blank();
                    doc.line("Second Half Odds");
                    doc.line("No second half odds available at this time");
                }
            }
        }
        _ => {
            // Primary-only bundle: ESPN's inline lines.
            let espn = odds.espn_fallback.clone().unwrap_or_default();
            doc.kv("Odds Source", "ESPN (Limited)");
            doc.kv("Game State", game.phase.as_str());
            doc.kv("Spread", &fmt_signed_point(espn.spread));
            doc.kv("Over/Under", &fmt_point(espn.over_under));
            doc.kv("Home Moneyline", &fmt_price(espn.home_moneyline));
            doc.kv("Away Moneyline", &fmt_price(espn.away_moneyline));
            doc.kv("Details", &or_na(espn.details.as_deref()));
        }
    }

    doc.blank();
}

fn metadata_section(doc: &mut CsvDoc, game: &GameSnapshot, exported_at: DateTime<Utc>) {
    doc.line("Game Metadata");
    doc.kv("Game ID", &game.game_id);
    doc.kv("Date", &game.game_date.to_string());
    doc.kv("Home Team", &game.home_team);
    doc.kv("Away Team", &game.away_team);
    doc.kv("Status", game.phase.as_str());
    doc.kv("Venue", &or_na(game.venue.as_deref()));
    doc.kv("Broadcast", &or_na(game.broadcast.as_deref()));
    doc.kv(
        "Export Time",
        &exported_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    doc.blank();
}

fn fmt_opt_i64(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn plays_section(doc: &mut CsvDoc, game: &GameSnapshot) {
    doc.line("Play-by-Play Data");

    let mut rows = 0usize;
    for drive in &game.play_by_play {
        rows += drive.plays.len();
    }

    if rows == 0 {
        doc.line("No plays available");
        return;
    }

    doc.row([
        "Drive Team",
        "Drive Description",
        "Quarter",
        "Clock",
        "Down",
        "Distance",
        "Yard Line",
        "Play Description",
        "Play Type",
        "Scored",
        "Home Score",
        "Away Score",
    ]);

    for drive in &game.play_by_play {
        for play in &drive.plays {
            doc.row([
                drive.team.clone().unwrap_or_default(),
                drive.description.clone().unwrap_or_default(),
                fmt_opt_i64(play.period),
                play.clock.clone().unwrap_or_default(),
                fmt_opt_i64(play.down),
                fmt_opt_i64(play.distance),
                fmt_opt_i64(play.yard_line),
                play.text.clone().unwrap_or_default(),
                play.play_type.clone().unwrap_or_default(),
                if play.scoring_play { "Yes" } else { "No" }.to_string(),
                play.home_score.to_string(),
                play.away_score.to_string(),
            ]);
        }
    }
}

/// The halftime email attachment: metadata, whichever odds survived
/// reconciliation, and every play up to the half.
pub fn halftime_csv(game: &GameSnapshot, exported_at: DateTime<Utc>) -> String {
    let mut doc = CsvDoc::new();
    metadata_section(&mut doc, game, exported_at);
    odds_section(&mut doc, game);
    plays_section(&mut doc, game);
    doc.finish()
}

/// The per-game play-by-play download: metadata block then the play table.
pub fn play_by_play_csv(game: &GameSnapshot, exported_at: DateTime<Utc>) -> String {
    let mut doc = CsvDoc::new();
    metadata_section(&mut doc, game, exported_at);
    plays_section(&mut doc, game);
    doc.finish()
}

const TEAM_ROW_HEADER: &[&str] = &[
    "game_id",
    "captured_at",
    "game_date",
    "team",
    "opponent",
    "side",
    "score",
    "opponent_score",
    "quarter",
    "clock",
    "phase",
    "total_yards",
    "passing_yards",
    "rushing_yards",
    "completions",
    "attempts",
    "yards_per_completion",
    "third_down_conversions",
    "third_down_attempts",
    "penalties",
    "penalty_yards",
    "turnovers",
    "possession_time",
    "completion_attempts_raw",
    "third_down_raw",
    "penalties_raw",
];

/// Guard raw fraction-like values against spreadsheet date auto-coercion.
fn coerce_guard(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!("'{value}")
    }
}

fn team_row(game: &GameSnapshot, home: bool) -> Vec<String> {
    let (team, opponent, side, score, opponent_score, stats) = if home {
        (
            &game.home_team,
            &game.away_team,
            "home",
            game.home_score,
            game.away_score,
            &game.home_stats,
        )
    } else {
        (
            &game.away_team,
            &game.home_team,
            "away",
            game.away_score,
            game.home_score,
            &game.away_stats,
        )
    };

    let stat = |name: &str| stats.get(name).cloned().unwrap_or_default();
    let compound = |name: &str| stats.get(name).and_then(|v| split_compound(name, v));

    let completion_attempts = compound("completionAttempts");
    let third_down = compound("thirdDownEff");
    let penalties = compound("totalPenaltiesYards");

    let passing_yards: Option<f64> = stats.get("netPassingYards").and_then(|v| v.parse().ok());
    let yards_per_completion = match (passing_yards, completion_attempts) {
        (Some(yards), Some((completions, _))) if completions > 0.0 => {
            format!("{:.2}", yards / completions)
        }
        _ => String::new(),
    };

    let pair_left = |pair: Option<(f64, f64)>| {
        pair.map(|(left, _)| format!("{left}")).unwrap_or_default()
    };
    let pair_right = |pair: Option<(f64, f64)>| {
        pair.map(|(_, right)| format!("{right}")).unwrap_or_default()
    };

    vec![
        game.game_id.clone(),
        game.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        game.game_date.to_string(),
        team.clone(),
        opponent.clone(),
        side.to_string(),
        score.to_string(),
        opponent_score.to_string(),
        game.quarter.to_string(),
        game.clock.clone().unwrap_or_default(),
        game.phase.to_string(),
        stat("totalYards"),
        stat("netPassingYards"),
        stat("rushingYards"),
        pair_left(completion_attempts),
        pair_right(completion_attempts),
        yards_per_completion,
        pair_left(third_down),
        pair_right(third_down),
        pair_left(penalties),
        pair_right(penalties),
        stat("turnovers"),
        stat("possessionTime"),
        coerce_guard(&stat("completionAttempts")),
        coerce_guard(&stat("thirdDownEff")),
        coerce_guard(&stat("totalPenaltiesYards")),
    ]
}

/// Bulk export: one row per team per snapshot, fixed column order, derived
/// stats decomposed from the opaque compound strings.
pub fn team_rows_csv(snapshots: &[GameSnapshot]) -> String {
    let mut doc = CsvDoc::new();
    doc.row(TEAM_ROW_HEADER.iter().copied());
    for game in snapshots {
        doc.row(team_row(game, true));
        doc.row(team_row(game, false));
    }
    doc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::models::{Drive, Play};
    use crate::game::odds::{EspnOdds, OddsBundle, SecondHalfOdds};
    use crate::game::phase::GamePhase;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn base_game() -> GameSnapshot {
        GameSnapshot {
            game_id: "401547418".to_string(),
            game_date: NaiveDate::from_ymd_opt(2025, 11, 2).unwrap(),
            start_time: None,
            home_team: "Buffalo Bills".to_string(),
            away_team: "Miami Dolphins".to_string(),
            home_abbr: "BUF".to_string(),
            away_abbr: "MIA".to_string(),
            home_score: 17,
            away_score: 10,
            quarter: 2,
            clock: Some("0:00".to_string()),
            phase: GamePhase::Halftime,
            status_detail: Some("Halftime".to_string()),
            venue: Some("Highmark Stadium".to_string()),
            broadcast: Some("CBS".to_string()),
            home_stats: BTreeMap::new(),
            away_stats: BTreeMap::new(),
            odds: None,
            play_by_play: Vec::new(),
            home_power: None,
            away_power: None,
            home_standing: None,
            away_standing: None,
            created_at: Utc.with_ymd_and_hms(2025, 11, 2, 19, 5, 0).unwrap(),
        }
    }

    fn exported_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 2, 19, 6, 0).unwrap()
    }

    #[test]
    fn no_plays_yields_explicit_marker() {
        let csv = halftime_csv(&base_game(), exported_at());
        assert!(csv.contains("No plays available"));
        assert!(csv.contains("No betting odds available for this game"));
    }

    #[test]
    fn plays_are_flattened_with_drive_context() {
        let mut game = base_game();
        game.play_by_play = vec![Drive {
            id: "d1".to_string(),
            team: Some("MIA".to_string()),
            description: Some("5 plays, 32 yards".to_string()),
            plays: vec![Play {
                id: "p1".to_string(),
                play_type: Some("Rush".to_string()),
                text: Some("D.Achane left guard for 6 yards".to_string()),
                away_score: 3,
                home_score: 0,
                period: Some(1),
                clock: Some("12:30".to_string()),
                scoring_play: false,
                yards: 6,
                down: Some(1),
                distance: Some(10),
                yard_line: Some(25),
            }],
        }];

        let csv = play_by_play_csv(&game, exported_at());
        assert!(csv.contains("Drive Team,Drive Description,Quarter,Clock"));
        assert!(csv.contains("MIA,\"5 plays, 32 yards\",1,12:30,1,10,25"));
        assert!(csv.contains("D.Achane left guard for 6 yards"));
        assert!(!csv.contains("No plays available"));
    }

    #[test]
    fn consensus_odds_render_signed_and_rounded() {
        let mut game = base_game();
        game.odds = Some(OddsBundle {
            source: OddsSource::TheOddsApi,
            last_update: exported_at(),
            consensus: Some(MarketConsensus {
                home_moneyline: Some(-145.0),
                away_moneyline: Some(123.3),
                spread: Some(-2.5),
                total: Some(47.5),
                ..Default::default()
            }),
            bookmakers: vec![BookmakerQuote {
                name: "DraftKings".to_string(),
                home_moneyline: Some(-150.0),
                ..Default::default()
            }],
            second_half: None,
            espn_fallback: None,
        });

        let csv = halftime_csv(&game, exported_at());
        assert!(csv.contains("Odds Source,TheOddsAPI"));
        assert!(csv.contains("Home Moneyline,-145"));
        assert!(csv.contains("Away Moneyline,+123"));
        assert!(csv.contains("Spread,-2.5"));
        assert!(csv.contains("Total (Over/Under),47.5"));
        assert!(csv.contains("No second half odds available at this time"));
    }

    #[test]
    fn second_half_section_renders_when_present() {
        let mut game = base_game();
        game.odds = Some(OddsBundle {
            source: OddsSource::TheOddsApi,
            last_update: exported_at(),
            consensus: Some(MarketConsensus::default()),
            bookmakers: vec![],
            second_half: Some(SecondHalfOdds {
                consensus: MarketConsensus {
                    spread: Some(-1.5),
                    total: Some(23.5),
                    ..Default::default()
                },
                bookmakers: vec![BookmakerQuote {
                    name: "FanDuel".to_string(),
                    home_spread: Some(-1.5),
                    total: Some(23.5),
                    ..Default::default()
                }],
            }),
            espn_fallback: None,
        });

        let csv = halftime_csv(&game, exported_at());
        assert!(csv.contains("Second Half Odds (LIVE - Key for Betting!)"));
        assert!(csv.contains("FanDuel"));
        assert!(!csv.contains("No second half odds available at this time"));
    }

    #[test]
    fn espn_fallback_section_renders_primary_lines() {
        let mut game = base_game();
        game.odds = Some(OddsBundle {
            source: OddsSource::Espn,
            last_update: exported_at(),
            consensus: None,
            bookmakers: vec![],
            second_half: None,
            espn_fallback: Some(EspnOdds {
                spread: Some(-3.0),
                over_under: Some(47.5),
                home_moneyline: Some(-160.0),
                away_moneyline: Some(140.0),
                details: Some("BUF -3.0".to_string()),
            }),
        });

        let csv = halftime_csv(&game, exported_at());
        assert!(csv.contains("Odds Source,ESPN (Limited)"));
        assert!(csv.contains("Details,BUF -3.0"));
        assert!(csv.contains("Home Moneyline,-160"));
    }

    #[test]
    fn week_counts_from_configured_opener() {
        let week1 = NaiveDate::from_ymd_opt(2025, 9, 9).unwrap();
        assert_eq!(season_week(NaiveDate::from_ymd_opt(2025, 9, 9).unwrap(), week1), 1);
        assert_eq!(season_week(NaiveDate::from_ymd_opt(2025, 9, 15).unwrap(), week1), 1);
        assert_eq!(season_week(NaiveDate::from_ymd_opt(2025, 9, 16).unwrap(), week1), 2);
        assert_eq!(season_week(NaiveDate::from_ymd_opt(2025, 11, 2).unwrap(), week1), 8);
        // Preseason dates never go below week 1.
        assert_eq!(season_week(NaiveDate::from_ymd_opt(2025, 8, 20).unwrap(), week1), 1);
    }

    #[test]
    fn halftime_filename_encodes_season_and_teams() {
        let week1 = NaiveDate::from_ymd_opt(2025, 9, 9).unwrap();
        assert_eq!(
            halftime_filename(&base_game(), week1),
            "NFL25_08_BUFvMIA_plays.csv"
        );
    }

    #[test]
    fn compound_split_uses_per_field_separator() {
        assert_eq!(split_compound("completionAttempts", "15/20"), Some((15.0, 20.0)));
        assert_eq!(split_compound("totalPenaltiesYards", "7-56"), Some((7.0, 56.0)));
        assert_eq!(split_compound("thirdDownEff", "4-10"), Some((4.0, 10.0)));
        // Wrong separator for the field: not decomposed.
        assert_eq!(split_compound("completionAttempts", "15-20"), None);
        // Unknown fields are never decomposed.
        assert_eq!(split_compound("possessionTime", "28:15"), None);
    }

    #[test]
    fn team_rows_derive_stats_and_guard_fractions() {
        let mut game = base_game();
        game.home_stats = [
            ("completionAttempts".to_string(), "15/20".to_string()),
            ("netPassingYards".to_string(), "180".to_string()),
            ("totalYards".to_string(), "245".to_string()),
            ("totalPenaltiesYards".to_string(), "7-56".to_string()),
        ]
        .into();

        let csv = team_rows_csv(&[game]);
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("game_id,captured_at,game_date,team"));

        let home_row = lines.next().unwrap();
        assert!(home_row.contains("Buffalo Bills"));
        assert!(home_row.contains(",15,20,12.00,"));
        assert!(home_row.contains(",7,56,"));
        assert!(home_row.contains("'15/20"));

        // Away team has no stats: derived columns stay empty, row still present.
        let away_row = lines.next().unwrap();
        assert!(away_row.contains("Miami Dolphins"));
    }

    #[test]
    fn two_rows_per_game() {
        let csv = team_rows_csv(&[base_game(), base_game()]);
        assert_eq!(csv.lines().count(), 1 + 4);
    }
}
