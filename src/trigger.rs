//! Halftime trigger and retention sweep.
//!
//! Runs on its own schedule, independent of the poll cadence. All
//! coordination happens through the store: deduplication reads the snapshot
//! table, idempotency reads the export audit table, and every attempt writes
//! an audit row before the next game is touched.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::TriggerConfig;
use crate::db::store::{ExportRecord, Store};
use crate::export::csv::{halftime_csv, halftime_filename, season_week};
use crate::game::models::GameSnapshot;
use crate::mailer::{Mailer, OutboundEmail};

const SWEEP_BATCH: i64 = 10_000;

#[derive(Debug, Default)]
pub struct TriggerOutcome {
    /// Games emailed (or attempted) this pass.
    pub processed: usize,
    /// Games waiting inside the grace window for complete odds.
    pub deferred: usize,
    /// Games skipped by the idempotency gate.
    pub skipped: usize,
}

#[derive(Debug, Error)]
pub enum ManualEmailError {
    #[error("No active email recipients")]
    NoRecipients,
    #[error("No halftime snapshot found for this game")]
    NoHalftimeSnapshot,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug)]
pub struct ManualOutcome {
    pub game: String,
    pub recipients: usize,
    pub filename: String,
}

fn week1_start(config: &TriggerConfig) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&config.season_week1_start, "%Y-%m-%d")
        .context("Invalid trigger.season_week1_start in config")
}

fn email_html(game: &GameSnapshot) -> String {
    format!(
        "<h2>Halftime Play-by-Play Export</h2>\
         <p>Game has reached halftime. Attached is the play-by-play data and betting odds for:</p>\
         <ul>\
         <li><strong>Game:</strong> {away} @ {home}</li>\
         <li><strong>Score:</strong> {away_abbr} {away_score} - {home_abbr} {home_score}</li>\
         <li><strong>Date:</strong> {date}</li>\
         <li><strong>Venue:</strong> {venue}</li>\
         <li><strong>Broadcast:</strong> {broadcast}</li>\
         </ul>\
         <p>The attached CSV file contains all play-by-play data up to halftime and \
         sportsbook odds comparisons for moneyline, spread, and totals.</p>\
         <p><small>Odds are captured at the time of halftime and represent the most \
         recent available data from multiple sportsbooks.</small></p>",
        away = game.away_team,
        home = game.home_team,
        away_abbr = game.away_abbr,
        away_score = game.away_score,
        home_abbr = game.home_abbr,
        home_score = game.home_score,
        date = game.game_date,
        venue = game.venue.as_deref().unwrap_or("N/A"),
        broadcast = game.broadcast.as_deref().unwrap_or("N/A"),
    )
}

fn audit_row(
    game: &GameSnapshot,
    recipient_email: String,
    filename: String,
    csv_content: Option<String>,
    error_message: Option<String>,
    opener: NaiveDate,
) -> ExportRecord {
    ExportRecord {
        id: None,
        game_id: game.game_id.clone(),
        recipient_email,
        csv_filename: filename,
        csv_content,
        email_status: if error_message.is_none() {
            "success".to_string()
        } else {
            "failed".to_string()
        },
        error_message,
        year: Some(game.game_date.year() as i64),
        week: Some(season_week(game.game_date, opener)),
        home_team: Some(game.home_team.clone()),
        away_team: Some(game.away_team.clone()),
        game_date: Some(game.game_date.to_string()),
        created_at: None,
    }
}

/// Deduplicate halftime snapshots by game id.
///
/// Preference order: a snapshot carrying secondary-provider odds beats one
/// without; otherwise the most recent wins. Also tracks each game's EARLIEST
/// halftime timestamp, which measures how long the game has been waiting, not
/// how fresh the chosen snapshot is.
fn dedup_halftime(
    snapshots: Vec<GameSnapshot>,
) -> (Vec<GameSnapshot>, HashMap<String, DateTime<Utc>>) {
    let mut chosen: HashMap<String, GameSnapshot> = HashMap::new();
    let mut earliest: HashMap<String, DateTime<Utc>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    // Input arrives newest-first, so the first sighting is the most recent.
    for snap in snapshots {
        let first_seen = earliest
            .entry(snap.game_id.clone())
            .or_insert(snap.created_at);
        if snap.created_at < *first_seen {
            *first_seen = snap.created_at;
        }

        match chosen.get(&snap.game_id) {
            None => {
                order.push(snap.game_id.clone());
                chosen.insert(snap.game_id.clone(), snap);
            }
            Some(existing) => {
                if snap.has_secondary_odds() && !existing.has_secondary_odds() {
                    chosen.insert(snap.game_id.clone(), snap);
                }
            }
        }
    }

    let games = order
        .into_iter()
        .filter_map(|id| chosen.remove(&id))
        .collect();
    (games, earliest)
}

/// One scheduled pass: find newly-halftime games, gate, email, audit.
/// Strictly sequential across games to respect the email provider's rate
/// limit.
pub async fn run_halftime_pass(
    store: &Store,
    mailer: &dyn Mailer,
    config: &TriggerConfig,
    now: DateTime<Utc>,
) -> Result<TriggerOutcome> {
    let mut outcome = TriggerOutcome::default();

    if !mailer.is_enabled() {
        warn!("Mailer not configured; skipping halftime pass");
        return Ok(outcome);
    }

    let recipients = store.active_recipients().await?;
    if recipients.is_empty() {
        info!("No active email recipients");
        return Ok(outcome);
    }
    let recipient_emails: Vec<String> = recipients.into_iter().map(|r| r.email).collect();

    let records = store.halftime_snapshots().await?;
    if records.is_empty() {
        return Ok(outcome);
    }

    let snapshots: Vec<GameSnapshot> = records
        .iter()
        .filter_map(|record| match record.to_snapshot() {
            Ok(snap) => Some(snap),
            Err(e) => {
                warn!(error = %e, "Skipping undecodable snapshot row");
                None
            }
        })
        .collect();

    let (games, earliest) = dedup_halftime(snapshots);
    info!(unique_games = games.len(), "Halftime games found");

    let already_exported = store.exported_game_ids().await?;
    let opener = week1_start(config)?;
    let mut sent_any = false;

    for game in games {
        if already_exported.contains(&game.game_id) {
            outcome.skipped += 1;
            continue;
        }

        let halftime_age = earliest
            .get(&game.game_id)
            .map(|first| (now - *first).num_minutes())
            .unwrap_or(0);

        let complete = game.has_secondary_odds() && game.has_second_half_odds();
        if !complete {
            if halftime_age < config.grace_minutes {
                info!(
                    game_id = %game.game_id,
                    halftime_age,
                    "Waiting for complete odds; deferring"
                );
                outcome.deferred += 1;
                continue;
            }
            warn!(
                game_id = %game.game_id,
                halftime_age,
                "Grace window elapsed without complete odds; sending with available data"
            );
        }

        if sent_any {
            tokio::time::sleep(std::time::Duration::from_millis(config.email_delay_ms)).await;
        }
        sent_any = true;

        let csv = halftime_csv(&game, now);
        let filename = halftime_filename(&game, opener);
        let email = OutboundEmail {
            to: recipient_emails.clone(),
            subject: format!(
                "{}: {} @ {}",
                config.subject_prefix, game.away_abbr, game.home_abbr
            ),
            html_body: email_html(&game),
            attachment_name: filename.clone(),
            attachment_csv: csv.clone(),
        };

        let joined_recipients = recipient_emails.join(", ");
        let record = match mailer.send(&email).await {
            Ok(()) => {
                info!(game_id = %game.game_id, %filename, "Halftime email sent");
                audit_row(&game, joined_recipients, filename, Some(csv), None, opener)
            }
            Err(e) => {
                warn!(game_id = %game.game_id, error = %e, "Halftime email failed");
                audit_row(
                    &game,
                    joined_recipients,
                    filename,
                    None,
                    Some(e.to_string()),
                    opener,
                )
            }
        };

        // The audit row lands before the next game so a crash mid-pass never
        // double-sends.
        if let Err(e) = store.insert_export(&record).await {
            warn!(game_id = %game.game_id, error = %e, "Failed to record export audit row");
        }
        outcome.processed += 1;
    }

    info!(
        processed = outcome.processed,
        deferred = outcome.deferred,
        skipped = outcome.skipped,
        "Halftime pass complete"
    );
    Ok(outcome)
}

/// Operator-initiated email for one game. Bypasses the dedup, grace, and
/// idempotency gates but still records one audit row per recipient.
pub async fn send_manual_email(
    store: &Store,
    mailer: &dyn Mailer,
    config: &TriggerConfig,
    game_id: &str,
    now: DateTime<Utc>,
) -> Result<ManualOutcome, ManualEmailError> {
    let recipients = store.active_recipients().await?;
    if recipients.is_empty() {
        return Err(ManualEmailError::NoRecipients);
    }

    let record = store
        .latest_halftime_snapshot(game_id)
        .await?
        .ok_or(ManualEmailError::NoHalftimeSnapshot)?;
    let game = record.to_snapshot()?;

    let opener = week1_start(config)?;
    let week = season_week(game.game_date, opener);
    let csv = halftime_csv(&game, now);
    let filename = format!(
        "{}_Week{:02}_{}_at_{}_Halftime.csv",
        game.game_date.year(),
        week,
        game.away_abbr,
        game.home_abbr
    );

    for (index, recipient) in recipients.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(config.email_delay_ms)).await;
        }

        let email = OutboundEmail {
            to: vec![recipient.email.clone()],
            subject: format!(
                "{}: {} @ {} - Week {}",
                config.subject_prefix, game.away_team, game.home_team, week
            ),
            html_body: email_html(&game),
            attachment_name: filename.clone(),
            attachment_csv: csv.clone(),
        };

        let record = match mailer.send(&email).await {
            Ok(()) => audit_row(
                &game,
                recipient.email.clone(),
                filename.clone(),
                Some(csv.clone()),
                None,
                opener,
            ),
            Err(e) => {
                warn!(game_id = %game.game_id, recipient = %recipient.email, error = %e,
                    "Manual email failed");
                audit_row(
                    &game,
                    recipient.email.clone(),
                    filename.clone(),
                    None,
                    Some(e.to_string()),
                    opener,
                )
            }
        };
        store.insert_export(&record).await?;
    }

    Ok(ManualOutcome {
        game: format!("{} @ {}", game.away_abbr, game.home_abbr),
        recipients: recipients.len(),
        filename,
    })
}

/// Delete snapshots older than the retention window, in batches. Unrelated to
/// the correctness of any single snapshot.
pub async fn run_retention_sweep(
    store: &Store,
    retention_days: i64,
    now: DateTime<Utc>,
) -> Result<u64> {
    let cutoff = now - Duration::days(retention_days);
    let mut total = 0u64;

    loop {
        let deleted = store.delete_snapshots_before(cutoff, SWEEP_BATCH).await?;
        total += deleted;
        if deleted < SWEEP_BATCH as u64 {
            break;
        }
        // Brief pause between batches to keep the writer from starving reads.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    if total > 0 {
        let remaining = store.count_snapshots().await?;
        info!(deleted = total, remaining, "Retention sweep complete");
    }
    Ok(total)
}
